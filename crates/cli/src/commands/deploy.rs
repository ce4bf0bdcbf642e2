//! `deploy`: validate, build, ensure capabilities, apply and wait

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use kedaflow_lib::{
    AutoscaleConfig, ConfigError, ConfigValidator, ContainerResources, DeploymentOrchestrator,
    DeploymentResult, InstallMode, Installable, ManifestBuilder, WorkloadSpec,
};
use std::path::PathBuf;
use std::sync::Arc;
use tabled::Tabled;
use tracing::debug;

use super::Session;
use crate::output::{color_status, print_info, print_json, print_success, print_table, yes_no, OutputFormat};

#[derive(Debug, Args)]
pub struct DeployArgs {
    /// Workload name (DNS label)
    pub name: String,

    /// Container image, optionally with a tag or digest
    pub image: String,

    /// Autoscaling configuration (YAML or JSON); deploys without KEDA if omitted
    #[arg(long)]
    pub keda_config: Option<PathBuf>,

    /// Image tag used when the image reference has none
    #[arg(long, default_value = "latest")]
    pub tag: String,

    /// Initial replica count
    #[arg(long, default_value_t = 1)]
    pub replicas: i32,

    /// Exposed container ports, comma separated
    #[arg(long, value_delimiter = ',', default_value = "80")]
    pub ports: Vec<u16>,

    #[arg(long, default_value = "100m")]
    pub cpu_request: String,

    #[arg(long, default_value = "500m")]
    pub cpu_limit: String,

    #[arg(long, default_value = "128Mi")]
    pub memory_request: String,

    #[arg(long, default_value = "512Mi")]
    pub memory_limit: String,

    /// Print the manifests instead of applying them
    #[arg(long)]
    pub dry_run: bool,
}

impl DeployArgs {
    fn workload(&self, namespace: &str) -> WorkloadSpec {
        let mut spec = WorkloadSpec::new(&self.name, &self.image)
            .with_namespace(namespace)
            .with_tag(&self.tag)
            .with_replicas(self.replicas)
            .with_ports(self.ports.clone());
        spec.resources = ContainerResources {
            cpu_request: self.cpu_request.clone(),
            cpu_limit: self.cpu_limit.clone(),
            memory_request: self.memory_request.clone(),
            memory_limit: self.memory_limit.clone(),
        };
        spec
    }
}

/// Validate the workload and the autoscaling document together
///
/// Violations from both are reported in one error.
fn validate(args: &DeployArgs, workload: &WorkloadSpec) -> Result<Option<AutoscaleConfig>, ConfigError> {
    let mut errors = ConfigError::new();
    let checked = match args.keda_config {
        Some(_) => workload.validate_autoscaled(),
        None => workload.validate(),
    };
    if let Err(e) = checked {
        errors.extend(e);
    }

    let autoscale = match &args.keda_config {
        Some(path) => match ConfigValidator::default().load(path) {
            Ok(config) => {
                if let Some(target) = &config.workload {
                    if target != &workload.name {
                        errors.push(
                            "workload",
                            format!("config is for '{}', not '{}'", target, workload.name),
                        );
                    }
                }
                Some(config)
            }
            Err(e) => {
                errors.extend(e);
                None
            }
        },
        None => None,
    };

    errors.into_result().map(|()| autoscale)
}

/// Row for the applied manifests table
#[derive(Tabled)]
struct AppliedRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Manifest")]
    manifest: String,
}

fn print_result(result: &DeploymentResult) {
    let rows: Vec<AppliedRow> = result
        .applied
        .iter()
        .enumerate()
        .map(|(i, manifest)| AppliedRow {
            index: i + 1,
            manifest: manifest.clone(),
        })
        .collect();
    print_table(&rows, "No manifests applied");

    let elapsed = result.finished_at - result.started_at;
    println!(
        "Phase:    {}",
        color_status(result.phase().as_str())
    );
    println!(
        "Replicas: {}/{} ready",
        result.ready_replicas, result.desired_replicas
    );
    println!("Policy:   {}", yes_no(result.policy_active));
    println!("Elapsed:  {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0);
}

pub async fn run(session: &Session, args: DeployArgs) -> Result<()> {
    let workload = args.workload(&session.namespace);
    let autoscale = validate(&args, &workload)?;

    let plan = ManifestBuilder::default().build(&workload, autoscale.as_ref());
    debug!(
        workload = %workload.name,
        manifests = plan.manifests().len(),
        "Deployment plan built"
    );

    if args.dry_run {
        print!("{}", plan.to_yaml().context("Failed to render manifests")?);
        return Ok(());
    }

    let handle = session.connect().await?;

    if plan.has_policy() {
        let items: Vec<Arc<dyn Installable>> = vec![session.helm(), session.keda()];
        session
            .installer()
            .ensure_all(&items, &handle, InstallMode::IfNeeded)
            .await?;
    } else {
        print_info("No autoscaling config given, deploying without KEDA");
    }

    let settings = &session.settings;
    let orchestrator = DeploymentOrchestrator::new(
        settings.cluster.apply_timeout(),
        settings.convergence.policy(),
        session.logger.clone(),
        session.metrics.clone(),
    );
    let result = orchestrator.apply(plan, &handle, &session.cancel).await?;

    match session.format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            print_success(&format!(
                "Deployed {} to namespace {}",
                result.workload.cyan(),
                result.namespace.cyan()
            ));
            print_result(&result);
        }
    }
    Ok(())
}
