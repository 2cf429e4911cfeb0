use async_trait::async_trait;
use aws_sdk_sts::error::DisplayErrorContext;

#[async_trait]
pub trait CallerIdentity: Send + Sync {
    /// Account the loaded credentials belong to.
    async fn account_id(&self) -> Result<String, String>;
}

pub struct AwsStsIdentity {
    client: aws_sdk_sts::Client,
}

impl AwsStsIdentity {
    pub fn new(client: aws_sdk_sts::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CallerIdentity for AwsStsIdentity {
    async fn account_id(&self) -> Result<String, String> {
        let output = self
            .client
            .get_caller_identity()
            .send()
            .await
            .map_err(|error| {
                format!(
                    "failed to resolve the caller identity: {}",
                    DisplayErrorContext(&error)
                )
            })?;
        output
            .account()
            .map(str::to_string)
            .ok_or_else(|| "caller identity did not include an account".to_string())
    }
}
