use async_trait::async_trait;
use aws_sdk_batch::error::DisplayErrorContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComputePoolStatus {
    Creating,
    Updating,
    Deleting,
    Deleted,
    Valid,
    Invalid,
    Unknown(String),
}

impl ComputePoolStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "CREATING" => Self::Creating,
            "UPDATING" => Self::Updating,
            "DELETING" => Self::Deleting,
            "DELETED" => Self::Deleted,
            "VALID" => Self::Valid,
            "INVALID" => Self::Invalid,
            other => Self::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputePoolState {
    pub name: String,
    pub status: ComputePoolStatus,
    pub status_reason: Option<String>,
    /// ARN of the cluster the compute environment created implicitly.
    pub cluster_arn: Option<String>,
}

#[async_trait]
pub trait ComputePoolDescriber: Send + Sync {
    /// `Ok(None)` when no compute environment with that name exists (yet).
    async fn describe_compute_pool(&self, name: &str) -> Result<Option<ComputePoolState>, String>;
}

pub struct AwsBatchComputePools {
    client: aws_sdk_batch::Client,
}

impl AwsBatchComputePools {
    pub fn new(client: aws_sdk_batch::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ComputePoolDescriber for AwsBatchComputePools {
    async fn describe_compute_pool(&self, name: &str) -> Result<Option<ComputePoolState>, String> {
        let output = self
            .client
            .describe_compute_environments()
            .compute_environments(name)
            .send()
            .await
            .map_err(|error| {
                format!(
                    "failed to describe compute environment: {}",
                    DisplayErrorContext(&error)
                )
            })?;

        Ok(output.compute_environments().first().map(|detail| ComputePoolState {
            name: detail
                .compute_environment_name()
                .unwrap_or(name)
                .to_string(),
            status: detail
                .status()
                .map(|status| ComputePoolStatus::parse(status.as_str()))
                .unwrap_or_else(|| ComputePoolStatus::Unknown("UNREPORTED".to_string())),
            status_reason: detail.status_reason().map(str::to_string),
            cluster_arn: detail
                .ecs_cluster_arn()
                .filter(|arn| !arn.is_empty())
                .map(str::to_string),
        }))
    }
}
