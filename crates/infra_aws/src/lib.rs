//! Deployment side of the infrastructure app.
//!
//! `adapters` wraps the AWS SDK clients behind small async traits so the
//! deploy driver and the monitoring reconciler can be tested with in-memory
//! fakes. The `provision` binary wires the real clients together.

pub mod adapters;
pub mod deploy;
pub mod reconcile;
pub mod retry;

pub use deploy::{
    deploy_app, deploy_stack, verify_target_account, DeployError, DeployFailure, DeployReport,
    DeploySettings, DeployedStack,
};
pub use reconcile::{enable_cluster_monitoring, MonitoringEnabled, ReconcileError};
pub use retry::RetryConfig;
