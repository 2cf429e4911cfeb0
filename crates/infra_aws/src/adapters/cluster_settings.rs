use async_trait::async_trait;
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::types::{ClusterSetting, ClusterSettingName};

pub const CONTAINER_INSIGHTS_ENABLED: &str = "enabled";

#[async_trait]
pub trait ClusterSettingsClient: Send + Sync {
    /// Sets `containerInsights=enabled`; applying it twice is harmless.
    async fn enable_container_insights(&self, cluster_arn: &str) -> Result<(), String>;
}

pub struct AwsEcsClusterSettings {
    client: aws_sdk_ecs::Client,
}

impl AwsEcsClusterSettings {
    pub fn new(client: aws_sdk_ecs::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterSettingsClient for AwsEcsClusterSettings {
    async fn enable_container_insights(&self, cluster_arn: &str) -> Result<(), String> {
        let setting = ClusterSetting::builder()
            .name(ClusterSettingName::ContainerInsights)
            .value(CONTAINER_INSIGHTS_ENABLED)
            .build();

        self.client
            .update_cluster_settings()
            .cluster(cluster_arn)
            .settings(setting)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                format!(
                    "failed to update cluster settings: {}",
                    DisplayErrorContext(&error)
                )
            })
    }
}
