use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::info;

use org_migration_engine::cloud::{CloudClients, SandboxCloud, SandboxState};
use org_migration_engine::config::MigrationConfig;
use org_migration_engine::notify::LogNotifier;
use org_migration_engine::steps::StepContext;
use org_migration_engine::store::open_store;
use org_migration_engine::telemetry::init_telemetry;

pub mod classify;
pub mod cleanup;
pub mod step;

/// Process-wide state shared by every command.
pub struct Engine {
    pub ctx: StepContext,
    sandbox: Arc<SandboxCloud>,
    sandbox_path: Option<PathBuf>,
}

impl Engine {
    /// Load configuration, start logging, open the account store and the
    /// cloud backend.
    pub async fn start(config_file: Option<&Path>, sandbox_path: Option<&Path>, validate: bool) -> Result<Self> {
        let extra: Vec<PathBuf> = config_file.map(Path::to_path_buf).into_iter().collect();
        let config = MigrationConfig::load(&extra)?;
        if validate {
            config.validate()?;
        }
        init_telemetry(&config.observability)?;

        let store = open_store(&config.store).await?;

        let sandbox = match sandbox_path {
            Some(path) if path.exists() => SandboxCloud::load(path)
                .await
                .with_context(|| format!("failed to load sandbox state from {}", path.display()))?,
            _ => SandboxCloud::new(SandboxState::default()),
        };
        let sandbox = Arc::new(sandbox);

        let notifier = Arc::new(LogNotifier::new(
            config.notifications.topic.clone(),
            config.notifications.slack_topic.clone(),
        ));
        let ctx = StepContext::new(
            Arc::new(config),
            store,
            CloudClients::from_backend(sandbox.clone()),
            notifier,
        );

        Ok(Self {
            ctx,
            sandbox,
            sandbox_path: sandbox_path.map(Path::to_path_buf),
        })
    }

    /// Persist the sandbox so the next invocation sees this one's effects.
    pub async fn finish(self) -> Result<()> {
        if let Some(path) = &self.sandbox_path {
            self.sandbox.save(path).await?;
            info!(path = %path.display(), "sandbox state saved");
        }
        Ok(())
    }
}

/// Read a JSON document from `path`, or stdin when no path is given.
pub async fn read_json(path: Option<&Path>) -> Result<serde_json::Value> {
    let raw = match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut raw = String::new();
            tokio::io::stdin().read_to_string(&mut raw).await?;
            raw
        }
    };
    serde_json::from_str(&raw).context("input is not valid JSON")
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
