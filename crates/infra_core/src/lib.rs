//! Declarative definitions of the registry, function and batch stacks.
//!
//! This crate turns a validated [`config::Config`] into CloudFormation
//! templates and a cloud assembly on disk. It has no AWS SDK or async runtime
//! dependency; deploying and post-deploy reconciliation live in `infra_aws`.

pub mod app;
pub mod config;
pub mod iam;
pub mod network;
pub mod stacks;
pub mod template;

pub use app::{App, CloudAssembly, StackSelection};
pub use config::{Config, ConfigError, DeploymentTarget};
pub use stacks::{StackKind, SynthesizedStack};
pub use template::{SynthError, Template};
