use std::path::PathBuf;

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use clap::{Parser, Subcommand};
use infra_aws::adapters::cloudformation::AwsCloudFormation;
use infra_aws::adapters::cluster_settings::AwsEcsClusterSettings;
use infra_aws::adapters::compute_pool::AwsBatchComputePools;
use infra_aws::adapters::identity::AwsStsIdentity;
use infra_aws::{
    deploy_app, enable_cluster_monitoring, verify_target_account, DeployReport, DeploySettings,
};
use infra_core::{App, Config, StackKind, StackSelection};
use tracing::info;
use tracing_subscriber::EnvFilter;

const REDACTED: &str = "<redacted, pass --show-secrets to print>";

#[derive(Parser)]
#[command(
    name = "provision",
    about = "Synthesize and deploy the registry, function and batch stacks"
)]
struct Cli {
    /// Env file loaded before reading configuration; missing files are ignored
    #[arg(long, global = true, default_value = ".env", env = "PROVISION_ENV_FILE")]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write templates and a manifest without touching the cloud
    Synth {
        /// Output directory for the cloud assembly
        #[arg(long, default_value = "cdk.out")]
        out: PathBuf,
        /// Stacks to include (registry, function, batch); all when omitted
        #[arg(long = "stack")]
        stacks: Vec<String>,
    },
    /// Deploy stacks in order, then enable cluster monitoring for batch
    Deploy {
        #[arg(long = "stack")]
        stacks: Vec<String>,
        /// Print sensitive stack outputs such as the push secret key
        #[arg(long)]
        show_secrets: bool,
    },
    /// Enable Container Insights on an already deployed compute environment
    ReconcileMonitoring {
        /// Defaults to COMPUTE_ENVIRONMENT_NAME from the configuration
        #[arg(long)]
        compute_environment: Option<String>,
    },
}

fn selection(names: &[String]) -> Result<StackSelection> {
    StackSelection::from_names(names).map_err(anyhow::Error::msg)
}

/// Credentials come from the default chain, so callers check the account
/// with `verify_target_account` before changing anything.
async fn sdk_config(config: &Config) -> aws_config::SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.target.region.clone()))
        .load()
        .await
}

fn print_report(report: &DeployReport, show_secrets: bool) {
    for stack in &report.stacks {
        let state = if stack.changed { "deployed" } else { "unchanged" };
        println!("{} ({state})", stack.name);
        for (key, value) in &stack.outputs {
            if stack.sensitive_outputs.contains(key) && !show_secrets {
                println!("  {key} = {REDACTED}");
            } else {
                println!("  {key} = {value}");
            }
        }
    }
    if let Some(monitoring) = &report.monitoring {
        println!(
            "Container Insights enabled on {} ({})",
            monitoring.cluster_arn, monitoring.compute_environment
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Synth { out, stacks } => {
            let selection = selection(&stacks)?;
            let config = Config::from_env(Some(&cli.env_file), &selection)?;
            let assembly = App::new(&config, &selection)?.write_assembly(&out)?;
            for stack in &assembly.stacks {
                println!(
                    "{} -> {}",
                    stack.name,
                    out.join(format!("{}.template.json", stack.name)).display()
                );
            }
        }
        Commands::Deploy {
            stacks,
            show_secrets,
        } => {
            let selection = selection(&stacks)?;
            let config = Config::from_env(Some(&cli.env_file), &selection)?;
            let synthesized = App::new(&config, &selection)?.synth()?;

            let sdk = sdk_config(&config).await;
            info!(
                account = %config.target.account,
                region = %config.target.region,
                stacks = synthesized.len(),
                "deploying"
            );
            let outcome = deploy_app(
                &AwsCloudFormation::new(aws_sdk_cloudformation::Client::new(&sdk)),
                &AwsStsIdentity::new(aws_sdk_sts::Client::new(&sdk)),
                &AwsBatchComputePools::new(aws_sdk_batch::Client::new(&sdk)),
                &AwsEcsClusterSettings::new(aws_sdk_ecs::Client::new(&sdk)),
                &synthesized,
                &DeploySettings::for_aws(),
            )
            .await;
            match outcome {
                Ok(report) => print_report(&report, show_secrets),
                Err(failure) => {
                    print_report(&failure.partial, show_secrets);
                    return Err(failure.error.into());
                }
            }
        }
        Commands::ReconcileMonitoring {
            compute_environment,
        } => {
            let selection = if compute_environment.is_some() {
                StackSelection::only(std::iter::empty())
            } else {
                StackSelection::only([StackKind::Batch])
            };
            let config = Config::from_env(Some(&cli.env_file), &selection)?;
            let compute_environment = match compute_environment {
                Some(name) => name,
                None => config
                    .batch
                    .as_ref()
                    .map(|batch| batch.compute_environment_name.clone())
                    .context("batch configuration is required to find the compute environment")?,
            };

            let sdk = sdk_config(&config).await;
            verify_target_account(
                &AwsStsIdentity::new(aws_sdk_sts::Client::new(&sdk)),
                &config.target.account,
            )
            .await?;
            let enabled = enable_cluster_monitoring(
                &AwsBatchComputePools::new(aws_sdk_batch::Client::new(&sdk)),
                &AwsEcsClusterSettings::new(aws_sdk_ecs::Client::new(&sdk)),
                &compute_environment,
                &DeploySettings::for_aws().reconcile,
            )
            .await?;
            println!(
                "Container Insights enabled on {} ({})",
                enabled.cluster_arn, enabled.compute_environment
            );
        }
    }

    Ok(())
}
