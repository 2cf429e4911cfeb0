use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_cloudformation::types::{Capability, Stack};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDescription {
    pub name: String,
    pub status: String,
    pub status_reason: Option<String>,
    pub outputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStarted {
    Started,
    NoChanges,
}

#[async_trait]
pub trait StackDeployer: Send + Sync {
    /// `Ok(None)` when the stack does not exist.
    async fn describe_stack(&self, name: &str) -> Result<Option<StackDescription>, String>;
    async fn create_stack(&self, name: &str, template_body: &str) -> Result<(), String>;
    async fn update_stack(&self, name: &str, template_body: &str) -> Result<UpdateStarted, String>;
}

pub struct AwsCloudFormation {
    client: aws_sdk_cloudformation::Client,
}

impl AwsCloudFormation {
    pub fn new(client: aws_sdk_cloudformation::Client) -> Self {
        Self { client }
    }
}

fn describe(stack: &Stack) -> StackDescription {
    StackDescription {
        name: stack.stack_name().unwrap_or_default().to_string(),
        status: stack
            .stack_status()
            .map(|status| status.as_str().to_string())
            .unwrap_or_default(),
        status_reason: stack.stack_status_reason().map(str::to_string),
        outputs: stack
            .outputs()
            .iter()
            .filter_map(|output| {
                Some((
                    output.output_key()?.to_string(),
                    output.output_value()?.to_string(),
                ))
            })
            .collect(),
    }
}

/// CloudFormation reports both a missing stack and a no-op update as a
/// `ValidationError`; only the service message tells them apart. Transport
/// and credential failures never carry that code.
fn is_validation_error(error: &impl ProvideErrorMetadata, message_fragment: &str) -> bool {
    error.code() == Some("ValidationError")
        && error
            .message()
            .is_some_and(|message| message.contains(message_fragment))
}

fn is_missing_stack(error: &impl ProvideErrorMetadata) -> bool {
    is_validation_error(error, "does not exist")
}

fn is_no_op_update(error: &impl ProvideErrorMetadata) -> bool {
    is_validation_error(error, "No updates are to be performed")
}

#[async_trait]
impl StackDeployer for AwsCloudFormation {
    async fn describe_stack(&self, name: &str) -> Result<Option<StackDescription>, String> {
        match self.client.describe_stacks().stack_name(name).send().await {
            Ok(output) => Ok(output.stacks().first().map(describe)),
            Err(error) if is_missing_stack(&error) => Ok(None),
            Err(error) => Err(format!(
                "failed to describe stack {name}: {}",
                DisplayErrorContext(&error)
            )),
        }
    }

    async fn create_stack(&self, name: &str, template_body: &str) -> Result<(), String> {
        self.client
            .create_stack()
            .stack_name(name)
            .template_body(template_body)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| {
                format!(
                    "failed to create stack {name}: {}",
                    DisplayErrorContext(&error)
                )
            })
    }

    async fn update_stack(&self, name: &str, template_body: &str) -> Result<UpdateStarted, String> {
        match self
            .client
            .update_stack()
            .stack_name(name)
            .template_body(template_body)
            .capabilities(Capability::CapabilityNamedIam)
            .send()
            .await
        {
            Ok(_) => Ok(UpdateStarted::Started),
            Err(error) if is_no_op_update(&error) => Ok(UpdateStarted::NoChanges),
            Err(error) => Err(format!(
                "failed to update stack {name}: {}",
                DisplayErrorContext(&error)
            )),
        }
    }
}
