//! Stack definitions and the typed references passed between them.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::config::DeploymentTarget;
use crate::template::intrinsic::sub;
use crate::template::{SynthError, Template};

pub mod batch;
pub mod function;
pub mod registry;

pub use batch::BatchStack;
pub use function::FunctionStack;
pub use registry::RegistryStack;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StackKind {
    Registry,
    Function,
    Batch,
}

impl StackKind {
    pub const ALL: [StackKind; 3] = [Self::Registry, Self::Function, Self::Batch];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registry => "registry",
            Self::Function => "function",
            Self::Batch => "batch",
        }
    }

    pub fn stack_name(self) -> &'static str {
        match self {
            Self::Registry => "EcrStack",
            Self::Function => "LambdaStack",
            Self::Batch => "BatchStack",
        }
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StackKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "registry" | "ecr" => Ok(Self::Registry),
            "function" | "lambda" => Ok(Self::Function),
            "batch" => Ok(Self::Batch),
            other => Err(format!(
                "unknown stack '{other}', expected one of registry, function, batch"
            )),
        }
    }
}

/// A stack that can produce its template.
pub trait StackDefinition {
    fn kind(&self) -> StackKind;

    fn stack_name(&self) -> &str {
        self.kind().stack_name()
    }

    /// Names of stacks that must be deployed first.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn synthesize(&self) -> Result<Template, SynthError>;
}

/// Output of synthesizing one stack for one deployment target.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedStack {
    pub name: String,
    pub kind: StackKind,
    pub target: DeploymentTarget,
    pub dependencies: Vec<String>,
    pub template: Template,
}

/// A container registry addressed by name. The ARN and image URI are resolved
/// against the account and region the referencing stack deploys into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryRef {
    name: String,
}

impl RegistryRef {
    pub fn from_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arn(&self) -> Value {
        sub(format!(
            "arn:${{AWS::Partition}}:ecr:${{AWS::Region}}:${{AWS::AccountId}}:repository/{}",
            self.name
        ))
    }

    pub fn image_uri(&self, tag: &str) -> Value {
        sub(format!(
            "${{AWS::AccountId}}.dkr.ecr.${{AWS::Region}}.${{AWS::URLSuffix}}/{}:{tag}",
            self.name
        ))
    }
}

/// An S3 bucket that exists outside this app, addressed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketRef {
    name: String,
}

impl BucketRef {
    pub fn from_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arn(&self) -> Value {
        sub(format!("arn:${{AWS::Partition}}:s3:::{}", self.name))
    }

    pub fn objects_arn(&self) -> Value {
        sub(format!("arn:${{AWS::Partition}}:s3:::{}/*", self.name))
    }
}
