//! IAM policy documents, trust policies and grant action sets.

use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::{json, Value};

use crate::template::intrinsic::sub;
use crate::template::SynthError;

pub const POLICY_VERSION: &str = "2012-10-17";

/// Actions needed to push an image into one repository.
pub const ECR_PUSH_ACTIONS: [&str; 5] = [
    "ecr:BatchCheckLayerAvailability",
    "ecr:PutImage",
    "ecr:InitiateLayerUpload",
    "ecr:UploadLayerPart",
    "ecr:CompleteLayerUpload",
];

/// Actions needed to pull an image from one repository.
pub const ECR_PULL_ACTIONS: [&str; 3] = [
    "ecr:BatchCheckLayerAvailability",
    "ecr:GetDownloadUrlForLayer",
    "ecr:BatchGetImage",
];

/// Has no per-repository ARN, so it is always granted on `*`.
pub const ECR_AUTH_TOKEN_ACTION: &str = "ecr:GetAuthorizationToken";

pub const S3_WRITE_ACTIONS: [&str; 7] = [
    "s3:DeleteObject*",
    "s3:PutObject",
    "s3:PutObjectLegalHold",
    "s3:PutObjectRetention",
    "s3:PutObjectTagging",
    "s3:PutObjectVersionTagging",
    "s3:Abort*",
];

pub mod principals {
    pub const LAMBDA: &str = "lambda.amazonaws.com";
    pub const BATCH: &str = "batch.amazonaws.com";
    pub const ECS_TASKS: &str = "ecs-tasks.amazonaws.com";
}

pub mod managed_policies {
    pub const LAMBDA_BASIC_EXECUTION: &str = "service-role/AWSLambdaBasicExecutionRole";
    pub const BATCH_SERVICE: &str = "service-role/AWSBatchServiceRole";
    pub const ECS_TASK_EXECUTION: &str = "service-role/AmazonECSTaskExecutionRolePolicy";
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementResources {
    /// Serialized as the bare string `"*"`.
    Any,
    Arns(Vec<Value>),
}

impl Serialize for StatementResources {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Any => serializer.serialize_str("*"),
            Self::Arns(arns) => {
                let mut seq = serializer.serialize_seq(Some(arns.len()))?;
                for arn in arns {
                    seq.serialize_element(arn)?;
                }
                seq.end()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: &'static str,
    pub action: Vec<String>,
    pub resource: StatementResources,
}

impl PolicyStatement {
    pub fn allow<A>(actions: A, resource: StatementResources) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            effect: "Allow",
            action: actions.into_iter().map(Into::into).collect(),
            resource,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: &'static str,
    pub statement: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new(statement: Vec<PolicyStatement>) -> Self {
        Self {
            version: POLICY_VERSION,
            statement,
        }
    }

    pub fn to_value(&self) -> Result<Value, SynthError> {
        serde_json::to_value(self).map_err(|error| SynthError::Serialization(error.to_string()))
    }
}

/// Trust policy allowing `service` to assume a role.
pub fn trust_policy(service: &str) -> Value {
    json!({
        "Version": POLICY_VERSION,
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole",
        }],
    })
}

pub fn managed_policy_arn(name: &str) -> Value {
    sub(format!("arn:${{AWS::Partition}}:iam::aws:policy/{name}"))
}

/// Statements granting pull access to one repository.
pub fn ecr_pull_statements(repository_arn: Value) -> Vec<PolicyStatement> {
    vec![
        PolicyStatement::allow(ECR_PULL_ACTIONS, StatementResources::Arns(vec![repository_arn])),
        PolicyStatement::allow([ECR_AUTH_TOKEN_ACTION], StatementResources::Any),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_resource_serializes_as_wildcard_string() {
        let statement = PolicyStatement::allow([ECR_AUTH_TOKEN_ACTION], StatementResources::Any);
        let value = serde_json::to_value(&statement).expect("serialize");

        assert_eq!(value["Effect"], "Allow");
        assert_eq!(value["Resource"], "*");
        assert_eq!(value["Action"], json!(["ecr:GetAuthorizationToken"]));
    }

    #[test]
    fn multiple_arns_serialize_as_a_list() {
        let statement = PolicyStatement::allow(
            S3_WRITE_ACTIONS,
            StatementResources::Arns(vec![json!("arn:a"), json!("arn:b")]),
        );
        let value = serde_json::to_value(&statement).expect("serialize");
        assert_eq!(value["Resource"], json!(["arn:a", "arn:b"]));
    }

    #[test]
    fn trust_policy_names_the_service_principal() {
        let value = trust_policy(principals::ECS_TASKS);
        assert_eq!(
            value["Statement"][0]["Principal"]["Service"],
            "ecs-tasks.amazonaws.com"
        );
        assert_eq!(value["Statement"][0]["Action"], "sts:AssumeRole");
    }

    #[test]
    fn managed_policy_arn_uses_the_partition() {
        assert_eq!(
            managed_policy_arn(managed_policies::BATCH_SERVICE),
            json!({ "Fn::Sub": "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSBatchServiceRole" })
        );
    }
}
