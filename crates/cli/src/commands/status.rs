//! `status`: live view of a deployed workload

use anyhow::{bail, Result};
use colored::Colorize;
use kedaflow_lib::{workload_status, PodStatus, PolicyStatus};
use tabled::Tabled;

use super::Session;
use crate::output::{color_status, print_json, print_table, yes_no, OutputFormat};

/// Row for the pods table
#[derive(Tabled)]
struct PodRow {
    #[tabled(rename = "Pod")]
    name: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Ready")]
    ready: String,
    #[tabled(rename = "Restarts")]
    restarts: i64,
    #[tabled(rename = "Node")]
    node: String,
}

impl From<&PodStatus> for PodRow {
    fn from(pod: &PodStatus) -> Self {
        Self {
            name: pod.name.clone(),
            phase: color_status(&pod.phase),
            ready: yes_no(Some(pod.ready)),
            restarts: pod.restarts,
            node: pod.node.clone().unwrap_or_else(|| "-".to_string()),
        }
    }
}

fn bound(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn print_policy(policy: Option<&PolicyStatus>) {
    match policy {
        Some(p) => println!(
            "ScaledObject {}: ready {}, active {}, replicas {}..{}",
            p.name.cyan(),
            yes_no(p.ready),
            yes_no(p.active),
            bound(p.min_replicas),
            bound(p.max_replicas)
        ),
        None => println!("{}", "No ScaledObject attached".dimmed()),
    }
}

pub async fn run(session: &Session, name: &str) -> Result<()> {
    let handle = session.connect().await?;

    let Some(status) = workload_status(&handle, &session.namespace, name).await? else {
        bail!("Workload '{}' not found in namespace '{}'", name, session.namespace);
    };

    match session.format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            let readiness = if status.is_ready() { "ready" } else { "pending" };
            println!(
                "{} {}/{}: {}/{} replicas ready ({})",
                "Deployment".bold(),
                status.namespace,
                status.name.cyan(),
                status.ready_replicas,
                status.desired_replicas,
                color_status(readiness)
            );
            for (kind, value) in &status.conditions {
                println!("  {:<16} {}", kind, color_status(value));
            }
            println!();

            let rows: Vec<PodRow> = status.pods.iter().map(PodRow::from).collect();
            print_table(&rows, "No pods found");
            print_policy(status.policy.as_ref());
        }
    }
    Ok(())
}
