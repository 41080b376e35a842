pub mod tasks;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::hub::Connector;

/// Cron jobs that watch over a running connector
pub struct Scheduler {
    inner: JobScheduler,
    connector: Arc<dyn Connector>,
}

impl Scheduler {
    pub async fn new(connector: Arc<dyn Connector>) -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self { inner, connector })
    }

    /// Report the event stream's health on every `cron_expr` tick.
    pub async fn register_heartbeat(&self, cron_expr: &str) -> Result<()> {
        let connector = self.connector.clone();
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let connector = connector.clone();
            Box::pin(async move { tasks::report_heartbeat(connector.as_ref()) })
        })
        .with_context(|| format!("Invalid heartbeat schedule {:?}", cron_expr))?;

        self.inner
            .add(job)
            .await
            .context("Failed to add heartbeat job")?;

        info!("Heartbeat scheduled with cron: {}", cron_expr);
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        info!("Scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .context("Failed to shutdown scheduler")?;
        info!("Scheduler stopped");
        Ok(())
    }
}
