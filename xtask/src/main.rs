use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the infrastructure workspace",
    long_about = "A unified CLI for synthesizing and deploying the registry,\n\
                  function and batch stacks, and for running CI checks."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write CloudFormation templates and a manifest to an output directory
    Synth {
        #[arg(long, default_value = "cdk.out")]
        out: String,
        /// Stacks to include; all when omitted
        #[arg(long = "stack")]
        stacks: Vec<String>,
    },
    /// Deploy stacks and enable cluster monitoring
    Deploy {
        #[arg(long = "stack")]
        stacks: Vec<String>,
        #[arg(long)]
        show_secrets: bool,
    },
    /// Re-run the Container Insights step against a deployed compute environment
    ReconcileMonitoring {
        /// Defaults to COMPUTE_ENVIRONMENT_NAME from the configuration
        #[arg(long)]
        compute_environment: Option<String>,
    },
    /// Run CI checks (fmt, clippy, tests)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Synthesize every stack from the sample environment
    Synth,
    /// Run check + synth
    All,
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn cargo(args: &[&str]) -> ExitStatus {
    eprintln!("+ cargo {}", args.join(" "));
    Command::new("cargo")
        .args(args)
        .status()
        .expect("failed to execute cargo")
}

fn run_cargo(args: &[&str]) {
    let status = cargo(args);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_provision(args: &[&str]) {
    let mut cargo_args = vec!["run", "-p", "infra_aws", "--bin", "provision", "--"];
    cargo_args.extend_from_slice(args);
    run_cargo(&cargo_args);
}

fn stack_flags(stacks: &[String]) -> Vec<&str> {
    stacks
        .iter()
        .flat_map(|stack| ["--stack", stack.as_str()])
        .collect()
}

fn reconcile_args(compute_environment: Option<&str>) -> Vec<&str> {
    let mut args = vec!["reconcile-monitoring"];
    if let Some(name) = compute_environment {
        args.extend(["--compute-environment", name]);
    }
    args
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test infra_core");
    run_cargo(&["test", "-p", "infra_core"]);

    step("Test infra_aws");
    run_cargo(&["test", "-p", "infra_aws"]);
}

fn ci_synth() {
    step("Synthesize all stacks from .env.example");
    run_provision(&[
        "--env-file",
        ".env.example",
        "synth",
        "--out",
        "target/cdk.out",
    ]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Synth { out, stacks } => {
            let mut args = vec!["synth", "--out", out.as_str()];
            args.extend(stack_flags(&stacks));
            run_provision(&args);
        }
        Commands::Deploy {
            stacks,
            show_secrets,
        } => {
            let mut args = vec!["deploy"];
            args.extend(stack_flags(&stacks));
            if show_secrets {
                args.push("--show-secrets");
            }
            run_provision(&args);
        }
        Commands::ReconcileMonitoring {
            compute_environment,
        } => {
            run_provision(&reconcile_args(compute_environment.as_deref()));
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Synth => ci_synth(),
                CiJob::All => {
                    ci_check();
                    ci_synth();
                }
            }
            eprintln!("\nCI job passed.");
        }
    }
}
