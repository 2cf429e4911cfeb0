//! Deployment configuration.
//!
//! Every value the stacks need is read once, validated eagerly, and handed to
//! the stack constructors as a typed object. Sections are parsed only for the
//! stacks that are actually selected, so synthesizing the registry alone does
//! not demand batch settings. A required key is never defaulted.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use thiserror::Error;

use crate::app::StackSelection;

pub const DEFAULT_COMPUTE_MAX_VCPUS: u32 = 64;
pub const DEFAULT_JOB_RETRY_ATTEMPTS: u32 = 1;
pub const MAX_JOB_RETRY_ATTEMPTS: u32 = 10;

pub mod keys {
    pub const AWS_ACCOUNT_ID: &str = "AWS_ACCOUNT_ID";
    pub const AWS_REGION: &str = "AWS_REGION";

    pub const ECR_REPOSITORY_NAME: &str = "ECR_REPOSITORY_NAME";
    pub const ECR_IAM_USERNAME: &str = "ECR_IAM_USERNAME";

    pub const RESULTS_BUCKET_NAME: &str = "RESULTS_BUCKET_NAME";
    pub const COMPUTE_ENVIRONMENT_NAME: &str = "COMPUTE_ENVIRONMENT_NAME";
    pub const JOB_QUEUE_NAME: &str = "JOB_QUEUE_NAME";
    pub const JOB_DEFINITION_NAME: &str = "JOB_DEFINITION_NAME";
    pub const JOB_IMAGE: &str = "JOB_IMAGE";
    pub const JOB_COMMAND: &str = "JOB_COMMAND";
    pub const JOB_VCPU: &str = "JOB_VCPU";
    pub const JOB_MEMORY_MB: &str = "JOB_MEMORY_MB";
    pub const COMPUTE_MAX_VCPUS: &str = "COMPUTE_MAX_VCPUS";
    pub const JOB_RETRY_ATTEMPTS: &str = "JOB_RETRY_ATTEMPTS";
    pub const JOB_CPU_ARCHITECTURE: &str = "JOB_CPU_ARCHITECTURE";
}

/// A single problem found while reading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigIssue {
    #[error("{key} is required but not set")]
    Missing { key: &'static str },
    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("failed to read env file {path}: {reason}")]
    EnvFile { path: String, reason: String },
}

/// All issues found in one pass; configuration loading never stops at the first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {}", render_issues(.issues))]
pub struct ConfigError {
    issues: Vec<ConfigIssue>,
}

impl ConfigError {
    pub fn issues(&self) -> &[ConfigIssue] {
        &self.issues
    }

    pub fn is_missing(&self, key: &str) -> bool {
        self.issues
            .iter()
            .any(|issue| matches!(issue, ConfigIssue::Missing { key: missing } if *missing == key))
    }

    pub fn is_invalid(&self, key: &str) -> bool {
        self.issues
            .iter()
            .any(|issue| matches!(issue, ConfigIssue::Invalid { key: invalid, .. } if *invalid == key))
    }
}

fn render_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    pub account: String,
    pub region: String,
}

impl DeploymentTarget {
    pub fn environment_uri(&self) -> String {
        format!("aws://{}/{}", self.account, self.region)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub repository_name: String,
    pub push_user_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuArchitecture {
    X86_64,
    Arm64,
}

impl CpuArchitecture {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "X86_64",
            Self::Arm64 => "ARM64",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "X86_64" => Some(Self::X86_64),
            "ARM64" => Some(Self::Arm64),
            _ => None,
        }
    }
}

/// Settings for the batch stack. `job_vcpu` and `job_memory_mb` are checked
/// for shape but kept as the exact strings supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    pub results_bucket_name: String,
    pub compute_environment_name: String,
    pub job_queue_name: String,
    pub job_definition_name: String,
    pub job_image: String,
    pub job_command: String,
    pub job_vcpu: String,
    pub job_memory_mb: String,
    pub max_vcpus: u32,
    pub retry_attempts: u32,
    pub cpu_architecture: CpuArchitecture,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub target: DeploymentTarget,
    pub registry: Option<RegistryConfig>,
    pub batch: Option<BatchConfig>,
}

impl Config {
    /// Loads `env_file` (when it exists) into the process environment, then
    /// reads the sections `selection` needs.
    pub fn from_env(env_file: Option<&Path>, selection: &StackSelection) -> Result<Self, ConfigError> {
        if let Some(path) = env_file {
            match dotenvy::from_path(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "loaded env file"),
                Err(dotenvy::Error::Io(error)) if error.kind() == ErrorKind::NotFound => {
                    tracing::debug!(path = %path.display(), "env file not found, using process environment");
                }
                Err(error) => {
                    return Err(ConfigError {
                        issues: vec![ConfigIssue::EnvFile {
                            path: path.display().to_string(),
                            reason: error.to_string(),
                        }],
                    });
                }
            }
        }

        Self::from_vars(std::env::vars(), selection)
    }

    pub fn from_vars<I, K, V>(vars: I, selection: &StackSelection) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut reader = VarReader::new(vars);

        let target = reader.deployment_target();
        let registry = selection
            .needs_registry_config()
            .then(|| reader.registry_config());
        let batch = selection.needs_batch_config().then(|| reader.batch_config());

        if !reader.issues.is_empty() {
            return Err(ConfigError {
                issues: reader.issues,
            });
        }

        // Every section is fully populated once no issue was recorded.
        match (target, registry.flatten(), batch.flatten()) {
            (Some(target), registry, batch) => Ok(Self {
                target,
                registry,
                batch,
            }),
            (None, _, _) => Err(ConfigError {
                issues: vec![ConfigIssue::Missing {
                    key: keys::AWS_ACCOUNT_ID,
                }],
            }),
        }
    }
}

enum Lookup {
    Unset,
    Value(String),
    Rejected,
}

struct VarReader {
    vars: BTreeMap<String, String>,
    issues: Vec<ConfigIssue>,
}

impl VarReader {
    fn new<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            issues: Vec::new(),
        }
    }

    /// Values are never trimmed: they flow into templates verbatim, so
    /// surrounding whitespace is reported instead of silently dropped.
    fn lookup(&mut self, key: &'static str) -> Lookup {
        let Some(value) = self.vars.get(key) else {
            return Lookup::Unset;
        };
        if value.trim().is_empty() {
            return Lookup::Unset;
        }
        if value.trim() != value {
            self.issues.push(ConfigIssue::Invalid {
                key,
                reason: format!("'{value}' has leading or trailing whitespace"),
            });
            return Lookup::Rejected;
        }
        Lookup::Value(value.clone())
    }

    fn required(&mut self, key: &'static str) -> Option<String> {
        match self.lookup(key) {
            Lookup::Value(value) => Some(value),
            Lookup::Unset => {
                self.issues.push(ConfigIssue::Missing { key });
                None
            }
            Lookup::Rejected => None,
        }
    }

    fn validated(
        &mut self,
        key: &'static str,
        check: impl Fn(&str) -> Result<(), String>,
    ) -> Option<String> {
        let value = self.required(key)?;
        match check(&value) {
            Ok(()) => Some(value),
            Err(reason) => {
                self.issues.push(ConfigIssue::Invalid { key, reason });
                None
            }
        }
    }

    fn optional_u32(&mut self, key: &'static str, default: u32, max: u32) -> Option<u32> {
        let raw = match self.lookup(key) {
            Lookup::Value(raw) => raw,
            Lookup::Unset => return Some(default),
            Lookup::Rejected => return None,
        };
        match raw.parse::<u32>() {
            Ok(value) if (1..=max).contains(&value) => Some(value),
            _ => {
                self.issues.push(ConfigIssue::Invalid {
                    key,
                    reason: format!("expected an integer between 1 and {max}, got '{raw}'"),
                });
                None
            }
        }
    }

    fn deployment_target(&mut self) -> Option<DeploymentTarget> {
        let account = self.validated(keys::AWS_ACCOUNT_ID, validate_account_id);
        let region = self.validated(keys::AWS_REGION, validate_region);
        Some(DeploymentTarget {
            account: account?,
            region: region?,
        })
    }

    fn registry_config(&mut self) -> Option<RegistryConfig> {
        let repository_name = self.validated(keys::ECR_REPOSITORY_NAME, validate_repository_name);
        let push_user_name = self.validated(keys::ECR_IAM_USERNAME, validate_iam_user_name);
        Some(RegistryConfig {
            repository_name: repository_name?,
            push_user_name: push_user_name?,
        })
    }

    fn batch_config(&mut self) -> Option<BatchConfig> {
        let results_bucket_name = self.validated(keys::RESULTS_BUCKET_NAME, validate_bucket_name);
        let compute_environment_name =
            self.validated(keys::COMPUTE_ENVIRONMENT_NAME, validate_batch_name);
        let job_queue_name = self.validated(keys::JOB_QUEUE_NAME, validate_batch_name);
        let job_definition_name = self.validated(keys::JOB_DEFINITION_NAME, validate_batch_name);
        let job_image = self.validated(keys::JOB_IMAGE, validate_image_reference);
        let job_command = self.required(keys::JOB_COMMAND);
        let job_vcpu = self.validated(keys::JOB_VCPU, validate_vcpu);
        let job_memory_mb = self.validated(keys::JOB_MEMORY_MB, validate_memory_mb);
        let max_vcpus =
            self.optional_u32(keys::COMPUTE_MAX_VCPUS, DEFAULT_COMPUTE_MAX_VCPUS, 10_000);
        let retry_attempts = self.optional_u32(
            keys::JOB_RETRY_ATTEMPTS,
            DEFAULT_JOB_RETRY_ATTEMPTS,
            MAX_JOB_RETRY_ATTEMPTS,
        );
        let cpu_architecture = match self.lookup(keys::JOB_CPU_ARCHITECTURE) {
            Lookup::Unset => Some(CpuArchitecture::Arm64),
            Lookup::Rejected => None,
            Lookup::Value(raw) => {
                let parsed = CpuArchitecture::parse(&raw);
                if parsed.is_none() {
                    self.issues.push(ConfigIssue::Invalid {
                        key: keys::JOB_CPU_ARCHITECTURE,
                        reason: format!("expected X86_64 or ARM64, got '{raw}'"),
                    });
                }
                parsed
            }
        };

        Some(BatchConfig {
            results_bucket_name: results_bucket_name?,
            compute_environment_name: compute_environment_name?,
            job_queue_name: job_queue_name?,
            job_definition_name: job_definition_name?,
            job_image: job_image?,
            job_command: job_command?,
            job_vcpu: job_vcpu?,
            job_memory_mb: job_memory_mb?,
            max_vcpus: max_vcpus?,
            retry_attempts: retry_attempts?,
            cpu_architecture: cpu_architecture?,
        })
    }
}

fn validate_account_id(value: &str) -> Result<(), String> {
    if value.len() == 12 && value.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(format!("expected a 12-digit account id, got '{value}'"))
    }
}

fn validate_region(value: &str) -> Result<(), String> {
    let well_formed = value.contains('-')
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && value.chars().last().is_some_and(|c| c.is_ascii_digit());
    if well_formed {
        Ok(())
    } else {
        Err(format!("expected a region such as eu-west-1, got '{value}'"))
    }
}

fn validate_repository_name(value: &str) -> Result<(), String> {
    if !(2..=256).contains(&value.len()) {
        return Err("repository names must be 2 to 256 characters".to_string());
    }
    for segment in value.split('/') {
        let mut previous_separator = true;
        for c in segment.chars() {
            let separator = matches!(c, '.' | '_' | '-');
            if !(c.is_ascii_lowercase() || c.is_ascii_digit() || separator) {
                return Err(format!("'{c}' is not allowed in repository names"));
            }
            if separator && previous_separator {
                return Err(format!("segment '{segment}' has a misplaced separator"));
            }
            previous_separator = separator;
        }
        if previous_separator {
            return Err(format!("segment '{segment}' must end with a letter or digit"));
        }
    }
    Ok(())
}

fn validate_iam_user_name(value: &str) -> Result<(), String> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || "+=,.@_-".contains(c);
    if value.len() <= 64 && value.chars().all(allowed) {
        Ok(())
    } else {
        Err("user names are at most 64 characters of [A-Za-z0-9+=,.@_-]".to_string())
    }
}

fn validate_bucket_name(value: &str) -> Result<(), String> {
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-';
    let edges_ok = value
        .chars()
        .next()
        .zip(value.chars().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());
    if (3..=63).contains(&value.len()) && value.chars().all(allowed) && edges_ok {
        Ok(())
    } else {
        Err(format!("'{value}' is not a valid bucket name"))
    }
}

fn validate_batch_name(value: &str) -> Result<(), String> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
    if value.len() <= 128 && value.chars().all(allowed) {
        Ok(())
    } else {
        Err("batch names are at most 128 characters of [A-Za-z0-9_-]".to_string())
    }
}

fn validate_image_reference(value: &str) -> Result<(), String> {
    if value.chars().any(char::is_whitespace) {
        Err("image references cannot contain whitespace".to_string())
    } else {
        Ok(())
    }
}

fn validate_vcpu(value: &str) -> Result<(), String> {
    match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() && parsed > 0.0 => Ok(()),
        _ => Err(format!("expected a positive vCPU count, got '{value}'")),
    }
}

fn validate_memory_mb(value: &str) -> Result<(), String> {
    match value.parse::<u32>() {
        Ok(parsed) if parsed > 0 => Ok(()),
        _ => Err(format!("expected a positive memory size in MiB, got '{value}'")),
    }
}
