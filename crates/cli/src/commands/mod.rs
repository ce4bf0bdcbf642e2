//! CLI command implementations

pub mod connect;
pub mod deploy;
pub mod install;
pub mod status;

use crate::output::OutputFormat;
use kedaflow_lib::capability::CommandRunner;
use kedaflow_lib::{
    connect_with_retry, Cancellation, CapabilityInstaller, ClusterConnector, ClusterHandle,
    ConnectivityError, EndpointHint, HelmRuntime, KedaOperator, OrchestratorMetrics, Settings,
    StructuredLogger, SystemRunner,
};
use std::sync::Arc;

/// Everything a command needs for one invocation
pub struct Session {
    pub settings: Settings,
    pub hint: EndpointHint,
    pub namespace: String,
    pub format: OutputFormat,
    pub cancel: Cancellation,
    pub logger: StructuredLogger,
    pub metrics: OrchestratorMetrics,
}

impl Session {
    /// Connect with the configured probe backoff
    pub async fn connect(&self) -> Result<ClusterHandle, ConnectivityError> {
        let cluster = &self.settings.cluster;
        let connector = ClusterConnector::new(
            cluster.probe_timeout(),
            cluster.request_timeout(),
            cluster.field_manager.clone(),
        );
        connect_with_retry(&connector, &self.hint, &self.settings.retry.policy(), &self.cancel).await
    }

    /// Installer that stops at the next wait once Ctrl-C is pressed
    pub fn installer(&self) -> CapabilityInstaller {
        CapabilityInstaller::new(self.logger.clone(), self.metrics.clone())
            .with_cancellation(self.cancel.clone())
    }

    pub fn helm(&self) -> Arc<HelmRuntime> {
        Arc::new(HelmRuntime::new(runner(), &self.settings.helm))
    }

    pub fn keda(&self) -> Arc<KedaOperator> {
        Arc::new(KedaOperator::new(
            runner(),
            self.settings.helm.binary.clone(),
            &self.settings.keda,
            self.settings.helm.command_timeout(),
        ))
    }
}

fn runner() -> Arc<dyn CommandRunner> {
    Arc::new(SystemRunner)
}
