//! Composition of the stacks into one app and the cloud assembly it writes.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{Config, DeploymentTarget};
use crate::stacks::{
    BatchStack, FunctionStack, RegistryRef, RegistryStack, StackDefinition, StackKind,
    SynthesizedStack,
};
use crate::template::SynthError;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ASSEMBLY_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackSelection {
    kinds: BTreeSet<StackKind>,
}

impl Default for StackSelection {
    fn default() -> Self {
        Self::all()
    }
}

impl StackSelection {
    pub fn all() -> Self {
        Self::only(StackKind::ALL)
    }

    pub fn only(kinds: impl IntoIterator<Item = StackKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    /// An empty list of names means every stack.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        if names.is_empty() {
            return Ok(Self::all());
        }
        names
            .iter()
            .map(|name| name.as_ref().parse::<StackKind>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map(|kinds| Self { kinds })
    }

    pub fn contains(&self, kind: StackKind) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = StackKind> + '_ {
        self.kinds.iter().copied()
    }

    pub fn needs_registry_config(&self) -> bool {
        self.contains(StackKind::Registry) || self.contains(StackKind::Function)
    }

    pub fn needs_batch_config(&self) -> bool {
        self.contains(StackKind::Batch)
    }
}

pub struct App {
    target: DeploymentTarget,
    stacks: Vec<Box<dyn StackDefinition>>,
}

impl App {
    /// Instantiates the selected stacks in deployment order. The function
    /// stack receives the registry reference from the registry stack when both
    /// are selected, and resolves the configured name on its own otherwise.
    pub fn new(config: &Config, selection: &StackSelection) -> Result<Self, SynthError> {
        let mut stacks: Vec<Box<dyn StackDefinition>> = Vec::new();

        let registry_config = || {
            config.registry.clone().ok_or(SynthError::MissingConfigSection {
                stack: "registry",
                section: "registry",
            })
        };

        let mut registry_ref: Option<RegistryRef> = None;
        if selection.contains(StackKind::Registry) {
            let registry = RegistryStack::new(registry_config()?);
            registry_ref = Some(registry.registry_ref());
            stacks.push(Box::new(registry));
        }

        if selection.contains(StackKind::Function) {
            let function = match registry_ref {
                Some(registry) => {
                    FunctionStack::new(registry).after_stack(StackKind::Registry.stack_name())
                }
                None => FunctionStack::new(RegistryRef::from_name(
                    registry_config()?.repository_name,
                )),
            };
            stacks.push(Box::new(function));
        }

        if selection.contains(StackKind::Batch) {
            let batch = config.batch.clone().ok_or(SynthError::MissingConfigSection {
                stack: "batch",
                section: "batch",
            })?;
            stacks.push(Box::new(BatchStack::new(batch)));
        }

        Ok(Self {
            target: config.target.clone(),
            stacks,
        })
    }

    pub fn stack_names(&self) -> Vec<&str> {
        self.stacks.iter().map(|stack| stack.stack_name()).collect()
    }

    pub fn synth(&self) -> Result<Vec<SynthesizedStack>, SynthError> {
        self.stacks
            .iter()
            .map(|stack| {
                let template = stack.synthesize()?;
                tracing::debug!(
                    stack = stack.stack_name(),
                    resources = template.resources().len(),
                    "synthesized stack"
                );
                Ok(SynthesizedStack {
                    name: stack.stack_name().to_string(),
                    kind: stack.kind(),
                    target: self.target.clone(),
                    dependencies: stack.dependencies(),
                    template,
                })
            })
            .collect()
    }

    /// Writes one template per stack plus a manifest into `dir`.
    pub fn write_assembly(&self, dir: &Path) -> Result<CloudAssembly, SynthError> {
        let stacks = self.synth()?;
        fs::create_dir_all(dir).map_err(|error| io_error(dir, error))?;

        let mut artifacts = BTreeMap::new();
        for stack in &stacks {
            let template_file = format!("{}.template.json", stack.name);
            let path = dir.join(&template_file);
            fs::write(&path, stack.template.to_json_pretty()?).map_err(|error| io_error(&path, error))?;

            artifacts.insert(
                stack.name.clone(),
                ArtifactEntry {
                    kind: stack.kind.as_str().to_string(),
                    template_file,
                    environment: stack.target.environment_uri(),
                    dependencies: stack.dependencies.clone(),
                },
            );
        }

        let manifest = Manifest {
            version: ASSEMBLY_VERSION.to_string(),
            artifacts,
        };
        let manifest_path = dir.join(MANIFEST_FILE);
        let manifest_json = serde_json::to_string_pretty(&manifest)
            .map_err(|error| SynthError::Serialization(error.to_string()))?;
        fs::write(&manifest_path, manifest_json).map_err(|error| io_error(&manifest_path, error))?;

        tracing::info!(dir = %dir.display(), stacks = stacks.len(), "wrote cloud assembly");
        Ok(CloudAssembly {
            dir: dir.to_path_buf(),
            manifest,
            stacks,
        })
    }
}

fn io_error(path: &Path, error: std::io::Error) -> SynthError {
    SynthError::Io(format!("{}: {error}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub kind: String,
    pub template_file: String,
    pub environment: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    pub artifacts: BTreeMap<String, ArtifactEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CloudAssembly {
    pub dir: PathBuf,
    pub manifest: Manifest,
    pub stacks: Vec<SynthesizedStack>,
}
