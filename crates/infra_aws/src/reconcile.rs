//! Post-deploy reconciliation of the batch compute environment's cluster.
//!
//! Creating a Fargate compute environment creates an ECS cluster whose ARN
//! the template cannot reference. The reconciler describes the compute
//! environment until the ARN shows up, then turns Container Insights on for
//! that cluster. A missing ARN means "not ready yet" and is retried with
//! backoff; running the whole step again leaves the cluster unchanged.

use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;
use tracing::info;

use crate::adapters::cluster_settings::ClusterSettingsClient;
use crate::adapters::compute_pool::{ComputePoolDescriber, ComputePoolStatus};
use crate::retry::{retry_with_backoff, retry_with_backoff_when, RetryConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringEnabled {
    pub compute_environment: String,
    pub cluster_arn: String,
    pub discovery_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error(
        "compute environment '{compute_environment}' did not report a cluster after {attempts} attempts (last observation: {last_observation})"
    )]
    NotReady {
        compute_environment: String,
        attempts: u32,
        last_observation: String,
    },
    #[error("compute environment '{compute_environment}' is INVALID: {reason}")]
    PoolInvalid {
        compute_environment: String,
        reason: String,
    },
    #[error("compute environment '{compute_environment}' is being deleted")]
    PoolDeleting { compute_environment: String },
    #[error("failed to enable container insights on {cluster_arn}: {message}")]
    Patch { cluster_arn: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
enum Discovery {
    #[error("compute environment not found")]
    Missing,
    #[error("compute environment is still {0:?}")]
    NotReady(ComputePoolStatus),
    #[error("compute environment status is {0:?} without a cluster")]
    NoCluster(ComputePoolStatus),
    #[error("{0}")]
    Describe(String),
    #[error("{0}")]
    Invalid(String),
    #[error("compute environment is being deleted")]
    Deleting,
}

impl Discovery {
    fn is_retryable(&self) -> bool {
        !matches!(self, Self::Invalid(_) | Self::Deleting)
    }
}

async fn discover_cluster_arn(
    pools: &dyn ComputePoolDescriber,
    compute_environment: &str,
) -> Result<String, Discovery> {
    let state = pools
        .describe_compute_pool(compute_environment)
        .await
        .map_err(Discovery::Describe)?
        .ok_or(Discovery::Missing)?;

    match state.status {
        ComputePoolStatus::Invalid => Err(Discovery::Invalid(
            state
                .status_reason
                .unwrap_or_else(|| "no reason reported".to_string()),
        )),
        ComputePoolStatus::Deleting | ComputePoolStatus::Deleted => Err(Discovery::Deleting),
        // The ARN can show up before the pool settles; patch only a settled pool.
        status @ (ComputePoolStatus::Creating | ComputePoolStatus::Updating) => {
            Err(Discovery::NotReady(status))
        }
        status => state.cluster_arn.ok_or(Discovery::NoCluster(status)),
    }
}

pub async fn enable_cluster_monitoring(
    pools: &dyn ComputePoolDescriber,
    clusters: &dyn ClusterSettingsClient,
    compute_environment: &str,
    retry: &RetryConfig,
) -> Result<MonitoringEnabled, ReconcileError> {
    let attempts = AtomicU32::new(0);
    let counter = &attempts;

    let cluster_arn = retry_with_backoff_when(
        retry,
        "discover_cluster_arn",
        Discovery::is_retryable,
        move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            discover_cluster_arn(pools, compute_environment).await
        },
    )
    .await
    .map_err(|observation| match observation {
        Discovery::Invalid(reason) => ReconcileError::PoolInvalid {
            compute_environment: compute_environment.to_string(),
            reason,
        },
        Discovery::Deleting => ReconcileError::PoolDeleting {
            compute_environment: compute_environment.to_string(),
        },
        other => ReconcileError::NotReady {
            compute_environment: compute_environment.to_string(),
            attempts: attempts.load(Ordering::SeqCst),
            last_observation: other.to_string(),
        },
    })?;

    info!(
        compute_environment = %compute_environment,
        cluster_arn = %cluster_arn,
        "discovered compute environment cluster"
    );

    retry_with_backoff(retry, "enable_container_insights", || {
        clusters.enable_container_insights(&cluster_arn)
    })
    .await
    .map_err(|message| ReconcileError::Patch {
        cluster_arn: cluster_arn.clone(),
        message,
    })?;

    info!(cluster_arn = %cluster_arn, "container insights enabled");
    Ok(MonitoringEnabled {
        compute_environment: compute_environment.to_string(),
        cluster_arn,
        discovery_attempts: attempts.load(Ordering::SeqCst),
    })
}
