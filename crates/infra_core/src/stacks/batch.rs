//! Fargate batch environment: network, identities, compute environment,
//! job queue and job definition.
//!
//! The compute environment creates an ECS cluster whose ARN is not available
//! to the template. Enabling monitoring on that cluster happens after deploy,
//! see the cluster monitoring reconciler in the AWS crate.

use serde_json::{json, Value};

use crate::config::BatchConfig;
use crate::iam::{
    managed_policies, managed_policy_arn, principals, trust_policy, PolicyDocument,
    PolicyStatement, StatementResources, S3_WRITE_ACTIONS,
};
use crate::network::{build_network, outbound_only_security_group};
use crate::stacks::{BucketRef, StackDefinition, StackKind};
use crate::template::intrinsic::{get_att, reference};
use crate::template::{logical_id, Output, Resource, StackScope, SynthError, Template};

pub const RESULTS_BUCKET_ENV_VAR: &str = "S3_BUCKET";
pub const COMPUTE_ENVIRONMENT_ARN_OUTPUT: &str = "ComputeEnvironmentArn";
pub const COMPUTE_ENVIRONMENT_NAME_OUTPUT: &str = "ComputeEnvironmentName";
pub const JOB_QUEUE_ARN_OUTPUT: &str = "JobQueueArn";
pub const JOB_DEFINITION_ARN_OUTPUT: &str = "JobDefinitionArn";
const JOB_QUEUE_PRIORITY: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStack {
    config: BatchConfig,
    results_bucket: BucketRef,
}

impl BatchStack {
    pub fn new(config: BatchConfig) -> Self {
        let results_bucket = BucketRef::from_name(config.results_bucket_name.clone());
        Self {
            config,
            results_bucket,
        }
    }

    pub fn compute_environment_name(&self) -> &str {
        &self.config.compute_environment_name
    }

    fn add_role(
        scope: &mut StackScope,
        id: &str,
        service: &str,
        managed_policy: Option<&str>,
    ) -> Result<String, SynthError> {
        let mut properties = json!({ "AssumeRolePolicyDocument": trust_policy(service) });
        if let Some(name) = managed_policy {
            properties["ManagedPolicyArns"] = json!([managed_policy_arn(name)]);
        }
        scope.add(&[id, "Resource"], Resource::new("AWS::IAM::Role", properties))
    }

    fn container_properties(&self, task_role: &str, execution_role: &str) -> Value {
        let config = &self.config;
        json!({
            "Image": config.job_image,
            "Command": [config.job_command],
            "JobRoleArn": get_att(task_role, "Arn"),
            "ExecutionRoleArn": get_att(execution_role, "Arn"),
            "Environment": [{
                "Name": RESULTS_BUCKET_ENV_VAR,
                "Value": self.results_bucket.name(),
            }],
            "ResourceRequirements": [
                { "Type": "VCPU", "Value": config.job_vcpu },
                { "Type": "MEMORY", "Value": config.job_memory_mb },
            ],
            "NetworkConfiguration": { "AssignPublicIp": "ENABLED" },
            "RuntimePlatform": {
                "CpuArchitecture": config.cpu_architecture.as_str(),
                "OperatingSystemFamily": "LINUX",
            },
        })
    }
}

impl StackDefinition for BatchStack {
    fn kind(&self) -> StackKind {
        StackKind::Batch
    }

    fn synthesize(&self) -> Result<Template, SynthError> {
        let config = &self.config;
        let mut scope = StackScope::new(self.stack_name(), "Fargate batch environment");

        let network = build_network(&mut scope, "Vpc")?;
        let security_group = outbound_only_security_group(
            &mut scope,
            "BatchSecurityGroup",
            &network,
            "Security group for AWS Batch",
        )?;

        let service_role = Self::add_role(
            &mut scope,
            "BatchServiceRole",
            principals::BATCH,
            Some(managed_policies::BATCH_SERVICE),
        )?;
        let task_role = Self::add_role(&mut scope, "BatchTaskRole", principals::ECS_TASKS, None)?;
        let execution_role = Self::add_role(
            &mut scope,
            "BatchExecutionRole",
            principals::ECS_TASKS,
            Some(managed_policies::ECS_TASK_EXECUTION),
        )?;

        let write_results = PolicyDocument::new(vec![PolicyStatement::allow(
            S3_WRITE_ACTIONS,
            StatementResources::Arns(vec![
                self.results_bucket.arn(),
                self.results_bucket.objects_arn(),
            ]),
        )]);
        scope.add(
            &["BatchTaskRole", "DefaultPolicy", "Resource"],
            Resource::new(
                "AWS::IAM::Policy",
                json!({
                    "PolicyDocument": write_results.to_value()?,
                    "PolicyName": logical_id(&["BatchTaskRole", "DefaultPolicy"]),
                    "Roles": [reference(&task_role)],
                }),
            ),
        )?;

        // Tasks in private subnets need the NAT routes before the pool scales up.
        let mut compute_environment = Resource::new(
            "AWS::Batch::ComputeEnvironment",
            json!({
                "ComputeEnvironmentName": config.compute_environment_name,
                "Type": "MANAGED",
                "State": "ENABLED",
                "ComputeResources": {
                    "Type": "FARGATE",
                    "MaxvCpus": config.max_vcpus,
                    "Subnets": network.private_subnets,
                    "SecurityGroupIds": [security_group.group_id()],
                },
                "ServiceRole": get_att(&service_role, "Arn"),
            }),
        );
        for route in &network.private_route_ids {
            compute_environment = compute_environment.depends_on(route.clone());
        }
        let compute_environment = scope.add(&["FargateComputeEnv"], compute_environment)?;

        let job_queue = scope.add(
            &["FargateJobQueue"],
            Resource::new(
                "AWS::Batch::JobQueue",
                json!({
                    "JobQueueName": config.job_queue_name,
                    "State": "ENABLED",
                    "Priority": JOB_QUEUE_PRIORITY,
                    "ComputeEnvironmentOrder": [{
                        "Order": 1,
                        "ComputeEnvironment": reference(&compute_environment),
                    }],
                }),
            ),
        )?;

        let job_definition = scope.add(
            &["JobDefinition"],
            Resource::new(
                "AWS::Batch::JobDefinition",
                json!({
                    "JobDefinitionName": config.job_definition_name,
                    "Type": "container",
                    "PlatformCapabilities": ["FARGATE"],
                    "ContainerProperties": self.container_properties(&task_role, &execution_role),
                    "RetryStrategy": { "Attempts": config.retry_attempts },
                }),
            ),
        )?;

        scope.output(
            COMPUTE_ENVIRONMENT_ARN_OUTPUT,
            Output::new(reference(&compute_environment)),
        )?;
        scope.output(
            COMPUTE_ENVIRONMENT_NAME_OUTPUT,
            Output::new(json!(config.compute_environment_name)),
        )?;
        scope.output(JOB_QUEUE_ARN_OUTPUT, Output::new(reference(&job_queue)))?;
        scope.output(JOB_DEFINITION_ARN_OUTPUT, Output::new(reference(&job_definition)))?;

        scope.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CpuArchitecture;

    fn config() -> BatchConfig {
        BatchConfig {
            results_bucket_name: "results-bucket".to_string(),
            compute_environment_name: "FargateEnv".to_string(),
            job_queue_name: "FargateQueue".to_string(),
            job_definition_name: "LoadJob".to_string(),
            job_image: "agrumi/cpuloadgenerator:latest".to_string(),
            job_command: "-c 0 -l 1 -d 60".to_string(),
            job_vcpu: "1".to_string(),
            job_memory_mb: "2048".to_string(),
            max_vcpus: 64,
            retry_attempts: 1,
            cpu_architecture: CpuArchitecture::Arm64,
        }
    }

    fn template() -> Template {
        BatchStack::new(config()).synthesize().expect("synth")
    }

    fn role_trusting<'a>(template: &'a Template, service: &str) -> Vec<&'a Resource> {
        template
            .resources_of_type("AWS::IAM::Role")
            .map(|(_, role)| role)
            .filter(|role| {
                role.properties["AssumeRolePolicyDocument"]["Statement"][0]["Principal"]["Service"]
                    == service
            })
            .collect()
    }

    #[test]
    fn identities_have_distinct_trust_relationships() {
        let template = template();
        assert_eq!(template.count_of_type("AWS::IAM::Role"), 3);
        assert_eq!(role_trusting(&template, principals::BATCH).len(), 1);
        assert_eq!(role_trusting(&template, principals::ECS_TASKS).len(), 2);
    }

    #[test]
    fn task_role_may_write_to_the_results_bucket() {
        let template = template();
        let (_, policy) = template
            .single_of_type("AWS::IAM::Policy")
            .expect("one policy");
        let statement = &policy.properties["PolicyDocument"]["Statement"][0];

        assert_eq!(statement["Action"], json!(S3_WRITE_ACTIONS));
        assert_eq!(
            statement["Resource"],
            json!([
                { "Fn::Sub": "arn:${AWS::Partition}:s3:::results-bucket" },
                { "Fn::Sub": "arn:${AWS::Partition}:s3:::results-bucket/*" },
            ])
        );
    }

    #[test]
    fn compute_environment_uses_fargate_in_private_subnets() {
        let template = template();
        let (_, environment) = template
            .single_of_type("AWS::Batch::ComputeEnvironment")
            .expect("one compute environment");

        let resources = &environment.properties["ComputeResources"];
        assert_eq!(resources["Type"], "FARGATE");
        assert_eq!(resources["MaxvCpus"], 64);
        assert_eq!(resources["Subnets"].as_array().map(Vec::len), Some(2));
        assert_eq!(environment.properties["ComputeEnvironmentName"], "FargateEnv");
        assert_eq!(environment.depends_on.len(), 2);
    }

    #[test]
    fn queue_binds_the_compute_environment_in_order() {
        let template = template();
        let (environment_id, _) = template
            .single_of_type("AWS::Batch::ComputeEnvironment")
            .expect("one compute environment");
        let (_, queue) = template
            .single_of_type("AWS::Batch::JobQueue")
            .expect("one queue");

        assert_eq!(queue.properties["Priority"], 1);
        assert_eq!(
            queue.properties["ComputeEnvironmentOrder"],
            json!([{ "Order": 1, "ComputeEnvironment": { "Ref": environment_id } }])
        );
    }

    #[test]
    fn job_definition_carries_the_configured_job() {
        let template = template();
        let (_, definition) = template
            .single_of_type("AWS::Batch::JobDefinition")
            .expect("one job definition");
        let container = &definition.properties["ContainerProperties"];

        assert_eq!(container["Image"], "agrumi/cpuloadgenerator:latest");
        assert_eq!(container["Command"], json!(["-c 0 -l 1 -d 60"]));
        assert_eq!(
            container["Environment"],
            json!([{ "Name": "S3_BUCKET", "Value": "results-bucket" }])
        );
        assert_eq!(container["NetworkConfiguration"]["AssignPublicIp"], "ENABLED");
        assert_eq!(container["RuntimePlatform"]["CpuArchitecture"], "ARM64");
        assert_eq!(definition.properties["RetryStrategy"]["Attempts"], 1);
        assert_eq!(definition.properties["PlatformCapabilities"], json!(["FARGATE"]));
    }

    #[test]
    fn network_is_ordered_before_the_compute_environment() {
        let template = template();
        let order = template.deployment_order().expect("acyclic");
        let position = |resource_type: &str| {
            let (id, _) = template.single_of_type(resource_type).expect("present");
            order.iter().position(|entry| entry == id).expect("ordered")
        };

        let environment = position("AWS::Batch::ComputeEnvironment");
        assert!(position("AWS::EC2::VPC") < environment);
        assert!(position("AWS::EC2::SecurityGroup") < environment);
        assert!(environment < position("AWS::Batch::JobQueue"));
    }
}
