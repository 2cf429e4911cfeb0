//! Container registry plus the restricted identity allowed to push into it.

use serde::Serialize;
use serde_json::json;

use crate::config::RegistryConfig;
use crate::iam::{
    PolicyDocument, PolicyStatement, StatementResources, ECR_AUTH_TOKEN_ACTION, ECR_PUSH_ACTIONS,
};
use crate::stacks::{RegistryRef, StackDefinition, StackKind};
use crate::template::intrinsic::{get_att, reference};
use crate::template::{Output, RemovalPolicy, Resource, StackScope, SynthError, Template};

/// Images beyond this count are expired, oldest first.
pub const MAX_IMAGE_COUNT: u32 = 5;

pub const REPOSITORY_NAME_OUTPUT: &str = "EcrRepositoryName";
pub const ACCESS_KEY_ID_OUTPUT: &str = "AccessKeyIdOutput";
pub const SECRET_ACCESS_KEY_OUTPUT: &str = "SecretAccessKeyOutput";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleRule {
    pub description: &'static str,
    pub max_image_count: u32,
}

impl LifecycleRule {
    pub fn retain_latest() -> Self {
        Self {
            description: "Keep only the latest 5 images",
            max_image_count: MAX_IMAGE_COUNT,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LifecyclePolicyText<'a> {
    rules: Vec<LifecyclePolicyRule<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LifecyclePolicyRule<'a> {
    rule_priority: u32,
    description: &'a str,
    selection: LifecycleSelection,
    action: LifecycleAction,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LifecycleSelection {
    tag_status: &'static str,
    count_type: &'static str,
    count_number: u32,
}

#[derive(Serialize)]
struct LifecycleAction {
    #[serde(rename = "type")]
    action_type: &'static str,
}

fn lifecycle_policy_text(rules: &[LifecycleRule]) -> Result<String, SynthError> {
    let text = LifecyclePolicyText {
        rules: rules
            .iter()
            .enumerate()
            .map(|(index, rule)| LifecyclePolicyRule {
                rule_priority: index as u32 + 1,
                description: rule.description,
                selection: LifecycleSelection {
                    tag_status: "any",
                    count_type: "imageCountMoreThan",
                    count_number: rule.max_image_count,
                },
                action: LifecycleAction {
                    action_type: "expire",
                },
            })
            .collect(),
    };
    serde_json::to_string(&text).map_err(|error| SynthError::Serialization(error.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStack {
    config: RegistryConfig,
    lifecycle_rules: Vec<LifecycleRule>,
}

impl RegistryStack {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            lifecycle_rules: vec![LifecycleRule::retain_latest()],
        }
    }

    /// Reference handed to stacks that pull from this registry.
    pub fn registry_ref(&self) -> RegistryRef {
        RegistryRef::from_name(self.config.repository_name.clone())
    }
}

impl StackDefinition for RegistryStack {
    fn kind(&self) -> StackKind {
        StackKind::Registry
    }

    fn synthesize(&self) -> Result<Template, SynthError> {
        let mut scope = StackScope::new(
            self.stack_name(),
            "Container registry and push identity",
        );

        // Emptied and removed together with the stack.
        let repository = scope.add(
            &["DemoLambdaRepo", "Resource"],
            Resource::new(
                "AWS::ECR::Repository",
                json!({
                    "RepositoryName": self.config.repository_name,
                    "EmptyOnDelete": true,
                    "LifecyclePolicy": {
                        "LifecyclePolicyText": lifecycle_policy_text(&self.lifecycle_rules)?,
                    },
                }),
            )
            .removal_policy(RemovalPolicy::Delete),
        )?;

        let user = scope.add(
            &["EcrPushUser", "Resource"],
            Resource::new(
                "AWS::IAM::User",
                json!({ "UserName": self.config.push_user_name }),
            ),
        )?;

        let policy = PolicyDocument::new(vec![
            PolicyStatement::allow(
                ECR_PUSH_ACTIONS,
                StatementResources::Arns(vec![get_att(&repository, "Arn")]),
            ),
            PolicyStatement::allow([ECR_AUTH_TOKEN_ACTION], StatementResources::Any),
        ]);
        let policy_name = crate::template::logical_id(&["EcrPushUser", "DefaultPolicy"]);
        scope.add(
            &["EcrPushUser", "DefaultPolicy", "Resource"],
            Resource::new(
                "AWS::IAM::Policy",
                json!({
                    "PolicyDocument": policy.to_value()?,
                    "PolicyName": policy_name,
                    "Users": [reference(&user)],
                }),
            ),
        )?;

        let access_key = scope.add(
            &["AccessKey"],
            Resource::new(
                "AWS::IAM::AccessKey",
                json!({ "UserName": reference(&user) }),
            ),
        )?;

        scope.output(
            REPOSITORY_NAME_OUTPUT,
            Output::new(reference(&repository)).description("Name of the ECR repository"),
        )?;
        scope.output(
            ACCESS_KEY_ID_OUTPUT,
            Output::new(reference(&access_key)).description("Access key id of the push user"),
        )?;
        scope.output(
            SECRET_ACCESS_KEY_OUTPUT,
            Output::new(get_att(&access_key, "SecretAccessKey"))
                .description("Secret access key of the push user")
                .sensitive(),
        )?;

        scope.finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn stack() -> RegistryStack {
        RegistryStack::new(RegistryConfig {
            repository_name: "demo-repo".to_string(),
            push_user_name: "ecr-push-user".to_string(),
        })
    }

    #[test]
    fn lifecycle_text_expires_images_past_the_retention_count() {
        let text = lifecycle_policy_text(&[LifecycleRule::retain_latest()]).expect("text");
        let parsed: Value = serde_json::from_str(&text).expect("valid json");

        assert_eq!(parsed["rules"][0]["rulePriority"], 1);
        assert_eq!(parsed["rules"][0]["selection"]["countType"], "imageCountMoreThan");
        assert_eq!(parsed["rules"][0]["selection"]["countNumber"], MAX_IMAGE_COUNT);
        assert_eq!(parsed["rules"][0]["action"]["type"], "expire");
    }

    #[test]
    fn repository_is_deleted_with_the_stack() {
        let template = stack().synthesize().expect("synth");
        let (_, repository) = template
            .single_of_type("AWS::ECR::Repository")
            .expect("one repository");

        assert_eq!(repository.deletion_policy, Some(RemovalPolicy::Delete));
        assert_eq!(repository.update_replace_policy, Some(RemovalPolicy::Delete));
        assert_eq!(repository.property("EmptyOnDelete"), Some(&json!(true)));
        assert_eq!(repository.property("RepositoryName"), Some(&json!("demo-repo")));
    }

    #[test]
    fn only_the_secret_output_is_sensitive() {
        let template = stack().synthesize().expect("synth");

        let sensitive: Vec<&str> = template
            .outputs()
            .iter()
            .filter(|(_, output)| output.sensitive)
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(sensitive, vec![SECRET_ACCESS_KEY_OUTPUT]);
    }

    #[test]
    fn registry_ref_carries_the_configured_name() {
        assert_eq!(stack().registry_ref().name(), "demo-repo");
    }
}
