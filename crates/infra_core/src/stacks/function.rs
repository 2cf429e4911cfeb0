//! Container-image function with a public invocation URL.

use serde_json::json;

use crate::iam::{
    ecr_pull_statements, managed_policies, managed_policy_arn, principals, trust_policy,
    PolicyDocument,
};
use crate::stacks::{RegistryRef, StackDefinition, StackKind};
use crate::template::intrinsic::{get_att, reference};
use crate::template::{logical_id, Output, Resource, StackScope, SynthError, Template};

pub const IMAGE_TAG: &str = "latest";
pub const FUNCTION_URL_OUTPUT: &str = "FunctionUrl";
pub const FUNCTION_ARN_OUTPUT: &str = "FunctionArn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub registry: RegistryRef,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionStack {
    image: ImageSource,
    /// Set when the registry stack is deployed by the same app.
    registry_stack: Option<String>,
}

impl FunctionStack {
    pub fn new(registry: RegistryRef) -> Self {
        Self {
            image: ImageSource {
                registry,
                tag: IMAGE_TAG.to_string(),
            },
            registry_stack: None,
        }
    }

    pub fn after_stack(mut self, stack_name: impl Into<String>) -> Self {
        self.registry_stack = Some(stack_name.into());
        self
    }

    pub fn image_source(&self) -> &ImageSource {
        &self.image
    }
}

impl StackDefinition for FunctionStack {
    fn kind(&self) -> StackKind {
        StackKind::Function
    }

    fn dependencies(&self) -> Vec<String> {
        self.registry_stack.iter().cloned().collect()
    }

    fn synthesize(&self) -> Result<Template, SynthError> {
        let mut scope = StackScope::new(
            self.stack_name(),
            "Container image function with a public URL",
        );
        let registry = &self.image.registry;

        let role = scope.add(
            &["MockPythonLambda", "ServiceRole", "Resource"],
            Resource::new(
                "AWS::IAM::Role",
                json!({
                    "AssumeRolePolicyDocument": trust_policy(principals::LAMBDA),
                    "ManagedPolicyArns": [managed_policy_arn(managed_policies::LAMBDA_BASIC_EXECUTION)],
                }),
            ),
        )?;

        let pull_policy = PolicyDocument::new(ecr_pull_statements(registry.arn()));
        let policy = scope.add(
            &["MockPythonLambda", "ServiceRole", "DefaultPolicy", "Resource"],
            Resource::new(
                "AWS::IAM::Policy",
                json!({
                    "PolicyDocument": pull_policy.to_value()?,
                    "PolicyName": logical_id(&["MockPythonLambda", "ServiceRole", "DefaultPolicy"]),
                    "Roles": [reference(&role)],
                }),
            ),
        )?;

        // The role must be able to pull before the function is created.
        let function = scope.add(
            &["MockPythonLambda", "Resource"],
            Resource::new(
                "AWS::Lambda::Function",
                json!({
                    "Code": { "ImageUri": registry.image_uri(&self.image.tag) },
                    "PackageType": "Image",
                    "Role": get_att(&role, "Arn"),
                }),
            )
            .depends_on(role.clone())
            .depends_on(policy),
        )?;

        let url = scope.add(
            &["MockPythonLambda", "FunctionUrl", "Resource"],
            Resource::new(
                "AWS::Lambda::Url",
                json!({
                    "AuthType": "NONE",
                    "TargetFunctionArn": get_att(&function, "Arn"),
                    "Cors": {
                        "AllowHeaders": ["*"],
                        "AllowMethods": ["*"],
                        "AllowOrigins": ["*"],
                    },
                }),
            ),
        )?;

        scope.add(
            &["MockPythonLambda", "invoke-function-url"],
            Resource::new(
                "AWS::Lambda::Permission",
                json!({
                    "Action": "lambda:InvokeFunctionUrl",
                    "FunctionName": get_att(&function, "Arn"),
                    "FunctionUrlAuthType": "NONE",
                    "Principal": "*",
                }),
            ),
        )?;

        scope.output(FUNCTION_URL_OUTPUT, Output::new(get_att(&url, "FunctionUrl")))?;
        scope.output(FUNCTION_ARN_OUTPUT, Output::new(get_att(&function, "Arn")))?;

        scope.finish()
    }
}
