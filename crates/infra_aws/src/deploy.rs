//! Deploys synthesized stacks in order and runs the monitoring reconciler
//! once the batch stack is up.

use std::collections::{BTreeMap, BTreeSet};

use infra_core::stacks::batch::COMPUTE_ENVIRONMENT_NAME_OUTPUT;
use infra_core::{StackKind, SynthError, SynthesizedStack};
use thiserror::Error;
use tracing::info;

use crate::adapters::cloudformation::{StackDeployer, StackDescription, UpdateStarted};
use crate::adapters::cluster_settings::ClusterSettingsClient;
use crate::adapters::compute_pool::ComputePoolDescriber;
use crate::adapters::identity::CallerIdentity;
use crate::reconcile::{enable_cluster_monitoring, MonitoringEnabled, ReconcileError};
use crate::retry::{retry_with_backoff_when, RetryConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackPhase {
    InProgress,
    Succeeded,
    Failed,
}

impl StackPhase {
    pub fn classify(status: &str) -> Self {
        if status.ends_with("_IN_PROGRESS") {
            Self::InProgress
        } else if status.ends_with("_COMPLETE")
            && !status.contains("ROLLBACK")
            && status != "DELETE_COMPLETE"
        {
            Self::Succeeded
        } else {
            Self::Failed
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployError {
    #[error(transparent)]
    Synth(#[from] SynthError),
    #[error("{stack}: {message}")]
    Provider { stack: String, message: String },
    #[error("{stack} is busy ({status}); wait for the running operation to finish")]
    StackBusy { stack: String, status: String },
    #[error("{stack} is in {status} and must be deleted before it can be deployed again")]
    NeedsCleanup { stack: String, status: String },
    #[error("{stack} ended in {status}: {}", .reason.as_deref().unwrap_or("no reason reported"))]
    StackFailed {
        stack: String,
        status: String,
        reason: Option<String>,
    },
    #[error("{stack} still in {status} after polling gave up")]
    Timeout { stack: String, status: String },
    #[error("{stack} did not report the {output} output")]
    MissingOutput { stack: String, output: String },
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("credentials belong to account {actual}, but the configuration targets {expected}")]
    AccountMismatch { expected: String, actual: String },
    #[error("{0}")]
    Identity(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedStack {
    pub name: String,
    pub kind: StackKind,
    /// False when the provider reported nothing to update.
    pub changed: bool,
    pub outputs: BTreeMap<String, String>,
    /// Output names whose values must not be printed by default.
    pub sensitive_outputs: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub stacks: Vec<DeployedStack>,
    pub monitoring: Option<MonitoringEnabled>,
}

/// A failed run together with everything deployed before the failure, so
/// the caller can still report the outputs of the stacks that made it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct DeployFailure {
    pub partial: DeployReport,
    #[source]
    pub error: DeployError,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeploySettings {
    pub stack_polling: RetryConfig,
    pub reconcile: RetryConfig,
}

impl DeploySettings {
    pub fn for_aws() -> Self {
        Self {
            stack_polling: RetryConfig::stack_polling(),
            reconcile: RetryConfig::with_max_attempts(30),
        }
    }
}

#[derive(Debug, Error)]
enum Poll {
    #[error("status {0}")]
    Pending(String),
    #[error("stack disappeared while polling")]
    Vanished,
    #[error("{0}")]
    Describe(String),
    #[error("ended in {}", .0.status)]
    Failed(StackDescription),
}

impl Poll {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Pending(_) | Self::Describe(_))
    }
}

async fn wait_for_terminal(
    deployer: &dyn StackDeployer,
    name: &str,
    polling: &RetryConfig,
) -> Result<StackDescription, DeployError> {
    retry_with_backoff_when(
        polling,
        "wait_for_stack",
        Poll::is_retryable,
        move || async move {
            let description = deployer
                .describe_stack(name)
                .await
                .map_err(Poll::Describe)?
                .ok_or(Poll::Vanished)?;
            match StackPhase::classify(&description.status) {
                StackPhase::InProgress => Err(Poll::Pending(description.status)),
                StackPhase::Succeeded => Ok(description),
                StackPhase::Failed => Err(Poll::Failed(description)),
            }
        },
    )
    .await
    .map_err(|poll| match poll {
        Poll::Pending(status) => DeployError::Timeout {
            stack: name.to_string(),
            status,
        },
        Poll::Failed(description) => DeployError::StackFailed {
            stack: name.to_string(),
            status: description.status,
            reason: description.status_reason,
        },
        other => DeployError::Provider {
            stack: name.to_string(),
            message: other.to_string(),
        },
    })
}

/// Creates the stack when absent, updates it otherwise, and waits for the
/// operation to settle.
pub async fn deploy_stack(
    deployer: &dyn StackDeployer,
    stack: &SynthesizedStack,
    polling: &RetryConfig,
) -> Result<DeployedStack, DeployError> {
    let name = stack.name.as_str();
    let body = stack.template.to_json()?;
    let provider = |message: String| DeployError::Provider {
        stack: name.to_string(),
        message,
    };

    let existing = deployer.describe_stack(name).await.map_err(provider)?;
    let (changed, description) = match existing {
        None => {
            info!(stack = name, "creating stack");
            deployer.create_stack(name, &body).await.map_err(provider)?;
            (true, wait_for_terminal(deployer, name, polling).await?)
        }
        Some(current) => {
            if StackPhase::classify(&current.status) == StackPhase::InProgress {
                return Err(DeployError::StackBusy {
                    stack: name.to_string(),
                    status: current.status,
                });
            }
            if matches!(
                current.status.as_str(),
                "ROLLBACK_COMPLETE" | "ROLLBACK_FAILED" | "DELETE_FAILED"
            ) {
                return Err(DeployError::NeedsCleanup {
                    stack: name.to_string(),
                    status: current.status,
                });
            }

            info!(stack = name, status = %current.status, "updating stack");
            match deployer.update_stack(name, &body).await.map_err(provider)? {
                UpdateStarted::NoChanges => {
                    info!(stack = name, "no changes to deploy");
                    (false, current)
                }
                UpdateStarted::Started => {
                    (true, wait_for_terminal(deployer, name, polling).await?)
                }
            }
        }
    };

    info!(stack = name, status = %description.status, changed, "stack deployed");
    Ok(DeployedStack {
        name: stack.name.clone(),
        kind: stack.kind,
        changed,
        outputs: description.outputs,
        sensitive_outputs: stack
            .template
            .outputs()
            .iter()
            .filter(|(_, output)| output.sensitive)
            .map(|(name, _)| name.clone())
            .collect(),
    })
}

/// Fails unless the active credentials belong to `expected`.
pub async fn verify_target_account(
    identity: &dyn CallerIdentity,
    expected: &str,
) -> Result<(), DeployError> {
    let actual = identity.account_id().await.map_err(DeployError::Identity)?;
    if actual != expected {
        return Err(DeployError::AccountMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    info!(account = %actual, "credentials match the target account");
    Ok(())
}

async fn enable_monitoring_for(
    deployed: &DeployedStack,
    pools: &dyn ComputePoolDescriber,
    clusters: &dyn ClusterSettingsClient,
    retry: &RetryConfig,
) -> Result<MonitoringEnabled, DeployError> {
    let compute_environment = deployed
        .outputs
        .get(COMPUTE_ENVIRONMENT_NAME_OUTPUT)
        .ok_or_else(|| DeployError::MissingOutput {
            stack: deployed.name.clone(),
            output: COMPUTE_ENVIRONMENT_NAME_OUTPUT.to_string(),
        })?;
    Ok(enable_cluster_monitoring(pools, clusters, compute_environment, retry).await?)
}

/// Deploys `stacks` in the given order, stopping at the first failure.
/// Nothing is touched unless the credentials belong to every stack's target
/// account. After the batch stack, Container Insights is enabled on the
/// cluster its compute environment created.
pub async fn deploy_app(
    deployer: &dyn StackDeployer,
    identity: &dyn CallerIdentity,
    pools: &dyn ComputePoolDescriber,
    clusters: &dyn ClusterSettingsClient,
    stacks: &[SynthesizedStack],
    settings: &DeploySettings,
) -> Result<DeployReport, Box<DeployFailure>> {
    let mut report = DeployReport {
        stacks: Vec::with_capacity(stacks.len()),
        monitoring: None,
    };

    let accounts: BTreeSet<&str> = stacks
        .iter()
        .map(|stack| stack.target.account.as_str())
        .collect();
    for account in accounts {
        if let Err(error) = verify_target_account(identity, account).await {
            return Err(Box::new(DeployFailure {
                partial: report,
                error,
            }));
        }
    }

    for stack in stacks {
        let deployed = match deploy_stack(deployer, stack, &settings.stack_polling).await {
            Ok(deployed) => deployed,
            Err(error) => {
                return Err(Box::new(DeployFailure {
                    partial: report,
                    error,
                }))
            }
        };
        let monitoring = if deployed.kind == StackKind::Batch {
            Some(enable_monitoring_for(&deployed, pools, clusters, &settings.reconcile).await)
        } else {
            None
        };
        // The batch stack is deployed even when the reconciler fails.
        report.stacks.push(deployed);

        match monitoring {
            Some(Ok(enabled)) => report.monitoring = Some(enabled),
            Some(Err(error)) => {
                return Err(Box::new(DeployFailure {
                    partial: report,
                    error,
                }))
            }
            None => {}
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use infra_core::config::DeploymentTarget;
    use infra_core::template::{Output, Resource};
    use infra_core::Template;
    use serde_json::json;

    use super::*;
    use crate::adapters::compute_pool::{ComputePoolState, ComputePoolStatus};
    use crate::retry::fast_retry;

    struct FakeStack {
        statuses: VecDeque<String>,
        outputs: BTreeMap<String, String>,
    }

    /// In-memory provider: each create or update plays back `script`.
    #[derive(Default)]
    struct FakeDeployer {
        stacks: Mutex<BTreeMap<String, FakeStack>>,
        script: Vec<&'static str>,
        outputs: BTreeMap<String, String>,
        calls: Mutex<Vec<String>>,
        no_changes: bool,
    }

    impl FakeDeployer {
        fn scripted(script: Vec<&'static str>) -> Self {
            Self {
                script,
                ..Default::default()
            }
        }

        fn with_existing(self, name: &str, status: &str) -> Self {
            self.stacks.lock().expect("poisoned mutex").insert(
                name.to_string(),
                FakeStack {
                    statuses: VecDeque::from([status.to_string()]),
                    outputs: self.outputs.clone(),
                },
            );
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("poisoned mutex").clone()
        }

        fn start(&self, name: &str) {
            self.stacks.lock().expect("poisoned mutex").insert(
                name.to_string(),
                FakeStack {
                    statuses: self.script.iter().map(|s| s.to_string()).collect(),
                    outputs: self.outputs.clone(),
                },
            );
        }
    }

    #[async_trait]
    impl StackDeployer for FakeDeployer {
        async fn describe_stack(&self, name: &str) -> Result<Option<StackDescription>, String> {
            let mut stacks = self.stacks.lock().expect("poisoned mutex");
            Ok(stacks.get_mut(name).map(|stack| {
                let status = if stack.statuses.len() > 1 {
                    stack.statuses.pop_front().expect("non-empty")
                } else {
                    stack.statuses.front().cloned().expect("scripted status")
                };
                StackDescription {
                    name: name.to_string(),
                    status,
                    status_reason: Some("scripted".to_string()),
                    outputs: stack.outputs.clone(),
                }
            }))
        }

        async fn create_stack(&self, name: &str, _template_body: &str) -> Result<(), String> {
            self.calls.lock().expect("poisoned mutex").push(format!("create {name}"));
            self.start(name);
            Ok(())
        }

        async fn update_stack(
            &self,
            name: &str,
            _template_body: &str,
        ) -> Result<UpdateStarted, String> {
            self.calls.lock().expect("poisoned mutex").push(format!("update {name}"));
            if self.no_changes {
                return Ok(UpdateStarted::NoChanges);
            }
            self.start(name);
            Ok(UpdateStarted::Started)
        }
    }

    struct FixedIdentity(Result<&'static str, &'static str>);

    const TARGET_ACCOUNT: FixedIdentity = FixedIdentity(Ok("123456789012"));

    #[async_trait]
    impl CallerIdentity for FixedIdentity {
        async fn account_id(&self) -> Result<String, String> {
            self.0.map(str::to_string).map_err(str::to_string)
        }
    }

    struct ReadyPool;

    #[async_trait]
    impl ComputePoolDescriber for ReadyPool {
        async fn describe_compute_pool(
            &self,
            name: &str,
        ) -> Result<Option<ComputePoolState>, String> {
            Ok(Some(ComputePoolState {
                name: name.to_string(),
                status: ComputePoolStatus::Valid,
                status_reason: None,
                cluster_arn: Some(format!("arn:aws:ecs:eu-south-1:123456789012:cluster/{name}")),
            }))
        }
    }

    #[derive(Default)]
    struct RecordingClusters {
        patched: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ClusterSettingsClient for RecordingClusters {
        async fn enable_container_insights(&self, cluster_arn: &str) -> Result<(), String> {
            self.patched
                .lock()
                .expect("poisoned mutex")
                .push(cluster_arn.to_string());
            Ok(())
        }
    }

    fn synthesized(kind: StackKind) -> SynthesizedStack {
        let mut template = Template::new();
        template
            .add_resource(
                "Queue".to_string(),
                Resource::new("AWS::SQS::Queue", json!({})),
            )
            .expect("resource");
        template
            .add_output("Secret", Output::new(json!("x")).sensitive())
            .expect("output");
        SynthesizedStack {
            name: kind.stack_name().to_string(),
            kind,
            target: DeploymentTarget {
                account: "123456789012".to_string(),
                region: "eu-south-1".to_string(),
            },
            dependencies: Vec::new(),
            template,
        }
    }

    fn settings() -> DeploySettings {
        DeploySettings {
            stack_polling: fast_retry(5),
            reconcile: fast_retry(3),
        }
    }

    #[test]
    fn classifies_provider_statuses() {
        assert_eq!(StackPhase::classify("CREATE_IN_PROGRESS"), StackPhase::InProgress);
        assert_eq!(
            StackPhase::classify("UPDATE_COMPLETE_CLEANUP_IN_PROGRESS"),
            StackPhase::InProgress
        );
        assert_eq!(StackPhase::classify("CREATE_COMPLETE"), StackPhase::Succeeded);
        assert_eq!(StackPhase::classify("UPDATE_COMPLETE"), StackPhase::Succeeded);
        assert_eq!(StackPhase::classify("ROLLBACK_COMPLETE"), StackPhase::Failed);
        assert_eq!(StackPhase::classify("UPDATE_ROLLBACK_COMPLETE"), StackPhase::Failed);
        assert_eq!(StackPhase::classify("CREATE_FAILED"), StackPhase::Failed);
        assert_eq!(StackPhase::classify("DELETE_COMPLETE"), StackPhase::Failed);
    }

    #[tokio::test]
    async fn creates_a_missing_stack_and_waits_for_completion() {
        let deployer = FakeDeployer::scripted(vec!["CREATE_IN_PROGRESS", "CREATE_COMPLETE"]);
        let stack = synthesized(StackKind::Registry);

        let deployed = deploy_stack(&deployer, &stack, &fast_retry(5))
            .await
            .expect("deploy should succeed");

        assert!(deployed.changed);
        assert_eq!(deployed.sensitive_outputs, BTreeSet::from(["Secret".to_string()]));
        assert_eq!(deployer.calls(), vec!["create EcrStack"]);
    }

    #[tokio::test]
    async fn unchanged_stack_is_not_an_error() {
        let deployer = FakeDeployer {
            no_changes: true,
            outputs: BTreeMap::from([("Name".to_string(), "demo".to_string())]),
            ..Default::default()
        }
        .with_existing("EcrStack", "CREATE_COMPLETE");

        let deployed = deploy_stack(&deployer, &synthesized(StackKind::Registry), &fast_retry(5))
            .await
            .expect("deploy should succeed");

        assert!(!deployed.changed);
        assert_eq!(deployed.outputs["Name"], "demo");
        assert_eq!(deployer.calls(), vec!["update EcrStack"]);
    }

    #[tokio::test]
    async fn rolled_back_update_is_a_failure() {
        let deployer = FakeDeployer::scripted(vec![
            "UPDATE_IN_PROGRESS",
            "UPDATE_ROLLBACK_IN_PROGRESS",
            "UPDATE_ROLLBACK_COMPLETE",
        ])
        .with_existing("LambdaStack", "UPDATE_COMPLETE");

        let error = deploy_stack(&deployer, &synthesized(StackKind::Function), &fast_retry(10))
            .await
            .expect_err("rollback should fail the deploy");

        assert_eq!(
            error,
            DeployError::StackFailed {
                stack: "LambdaStack".to_string(),
                status: "UPDATE_ROLLBACK_COMPLETE".to_string(),
                reason: Some("scripted".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn refuses_busy_and_rolled_back_stacks() {
        let busy = FakeDeployer::default().with_existing("EcrStack", "UPDATE_IN_PROGRESS");
        assert!(matches!(
            deploy_stack(&busy, &synthesized(StackKind::Registry), &fast_retry(2)).await,
            Err(DeployError::StackBusy { .. })
        ));

        let dead = FakeDeployer::default().with_existing("EcrStack", "ROLLBACK_COMPLETE");
        assert!(matches!(
            deploy_stack(&dead, &synthesized(StackKind::Registry), &fast_retry(2)).await,
            Err(DeployError::NeedsCleanup { .. })
        ));
        assert!(dead.calls().is_empty());
    }

    #[tokio::test]
    async fn gives_up_polling_after_the_cap() {
        let deployer = FakeDeployer::scripted(vec!["CREATE_IN_PROGRESS"]);

        let error = deploy_stack(&deployer, &synthesized(StackKind::Batch), &fast_retry(3))
            .await
            .expect_err("polling should time out");

        assert_eq!(
            error,
            DeployError::Timeout {
                stack: "BatchStack".to_string(),
                status: "CREATE_IN_PROGRESS".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn enables_monitoring_after_the_batch_stack() {
        let deployer = FakeDeployer {
            script: vec!["CREATE_IN_PROGRESS", "CREATE_COMPLETE"],
            outputs: BTreeMap::from([(
                COMPUTE_ENVIRONMENT_NAME_OUTPUT.to_string(),
                "FargateEnv".to_string(),
            )]),
            ..Default::default()
        };
        let clusters = RecordingClusters::default();
        let stacks = vec![
            synthesized(StackKind::Registry),
            synthesized(StackKind::Function),
            synthesized(StackKind::Batch),
        ];

        let report = deploy_app(
            &deployer,
            &TARGET_ACCOUNT,
            &ReadyPool,
            &clusters,
            &stacks,
            &settings(),
        )
        .await
        .expect("deploy should succeed");

        assert_eq!(
            deployer.calls(),
            vec!["create EcrStack", "create LambdaStack", "create BatchStack"]
        );
        assert_eq!(report.stacks.len(), 3);
        let monitoring = report.monitoring.expect("monitoring enabled");
        assert_eq!(monitoring.compute_environment, "FargateEnv");
        assert_eq!(
            *clusters.patched.lock().expect("poisoned mutex"),
            vec!["arn:aws:ecs:eu-south-1:123456789012:cluster/FargateEnv"]
        );
    }

    #[tokio::test]
    async fn skips_monitoring_without_the_batch_stack() {
        let deployer = FakeDeployer::scripted(vec!["CREATE_COMPLETE"]);
        let clusters = RecordingClusters::default();

        let report = deploy_app(
            &deployer,
            &TARGET_ACCOUNT,
            &ReadyPool,
            &clusters,
            &[synthesized(StackKind::Registry)],
            &settings(),
        )
        .await
        .expect("deploy should succeed");

        assert!(report.monitoring.is_none());
        assert!(clusters.patched.lock().expect("poisoned mutex").is_empty());
    }

    #[tokio::test]
    async fn stops_at_the_first_failed_stack() {
        let deployer = FakeDeployer::scripted(vec!["ROLLBACK_COMPLETE"]);
        let clusters = RecordingClusters::default();
        let stacks = vec![
            synthesized(StackKind::Registry),
            synthesized(StackKind::Function),
        ];

        let failure = deploy_app(
            &deployer,
            &TARGET_ACCOUNT,
            &ReadyPool,
            &clusters,
            &stacks,
            &settings(),
        )
        .await
        .expect_err("first stack fails");

        assert!(
            matches!(failure.error, DeployError::StackFailed { ref stack, .. } if stack == "EcrStack")
        );
        assert!(failure.partial.stacks.is_empty());
        assert_eq!(deployer.calls(), vec!["create EcrStack"]);
    }

    #[tokio::test]
    async fn failure_keeps_the_stacks_deployed_before_it() {
        let deployer = FakeDeployer {
            script: vec!["CREATE_IN_PROGRESS", "CREATE_COMPLETE"],
            outputs: BTreeMap::from([("Secret".to_string(), "push-key".to_string())]),
            ..Default::default()
        }
        .with_existing("LambdaStack", "ROLLBACK_COMPLETE");
        let clusters = RecordingClusters::default();
        let stacks = vec![
            synthesized(StackKind::Registry),
            synthesized(StackKind::Function),
        ];

        let failure = deploy_app(
            &deployer,
            &TARGET_ACCOUNT,
            &ReadyPool,
            &clusters,
            &stacks,
            &settings(),
        )
        .await
        .expect_err("second stack needs cleanup");

        assert!(matches!(failure.error, DeployError::NeedsCleanup { .. }));
        assert_eq!(failure.partial.stacks.len(), 1);
        let registry = &failure.partial.stacks[0];
        assert_eq!(registry.name, "EcrStack");
        assert_eq!(registry.outputs["Secret"], "push-key");
        assert!(registry.sensitive_outputs.contains("Secret"));
    }

    #[tokio::test]
    async fn refuses_to_deploy_with_credentials_for_another_account() {
        let deployer = FakeDeployer::scripted(vec!["CREATE_COMPLETE"]);
        let clusters = RecordingClusters::default();

        let failure = deploy_app(
            &deployer,
            &FixedIdentity(Ok("999999999999")),
            &ReadyPool,
            &clusters,
            &[synthesized(StackKind::Registry)],
            &settings(),
        )
        .await
        .expect_err("account mismatch");

        assert_eq!(
            failure.error,
            DeployError::AccountMismatch {
                expected: "123456789012".to_string(),
                actual: "999999999999".to_string(),
            }
        );
        assert!(failure.partial.stacks.is_empty());
        assert!(deployer.calls().is_empty());
    }

    #[tokio::test]
    async fn unresolvable_credentials_stop_before_any_change() {
        let error = verify_target_account(&FixedIdentity(Err("no credentials")), "123456789012")
            .await
            .expect_err("identity lookup fails");

        assert_eq!(error, DeployError::Identity("no credentials".to_string()));
        assert!(verify_target_account(&TARGET_ACCOUNT, "123456789012")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn batch_stack_without_the_compute_environment_output_fails() {
        let deployer = FakeDeployer::scripted(vec!["CREATE_COMPLETE"]);
        let clusters = RecordingClusters::default();

        let failure = deploy_app(
            &deployer,
            &TARGET_ACCOUNT,
            &ReadyPool,
            &clusters,
            &[synthesized(StackKind::Batch)],
            &settings(),
        )
        .await
        .expect_err("output is required");

        assert_eq!(
            failure.error,
            DeployError::MissingOutput {
                stack: "BatchStack".to_string(),
                output: COMPUTE_ENVIRONMENT_NAME_OUTPUT.to_string(),
            }
        );
        // The stack itself deployed, so it is still reported.
        assert_eq!(failure.partial.stacks.len(), 1);
        assert!(failure.partial.monitoring.is_none());
    }
}
