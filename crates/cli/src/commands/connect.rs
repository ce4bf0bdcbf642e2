//! `connect`: resolve the cluster and probe it

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

use super::Session;
use crate::config::kubeconfig_path;
use crate::output::{print_json, print_success, OutputFormat};

#[derive(Serialize)]
struct ConnectionInfo {
    endpoint: String,
    server_version: String,
    credentials: String,
    kubeconfig: Option<String>,
}

pub async fn run(session: &Session, kubeconfig: Option<&Path>) -> Result<()> {
    let handle = session.connect().await?;

    let info = ConnectionInfo {
        endpoint: handle.endpoint().to_string(),
        server_version: handle.server_version().to_string(),
        credentials: handle.credentials().to_string(),
        kubeconfig: kubeconfig_path(kubeconfig).map(|p| p.display().to_string()),
    };

    match session.format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            print_success(&format!("Connected to {}", info.endpoint.cyan()));
            println!("Server version: {}", info.server_version);
            println!("Credentials:    {}", info.credentials);
            if let Some(path) = &info.kubeconfig {
                println!("Kubeconfig:     {}", path);
            }
        }
    }
    Ok(())
}
