use anyhow::Result;

use super::{print_json, Engine};
use org_migration_engine::cleanup::CompletionWatcher;

pub struct CleanupCommand {
    pub company: String,
}

impl CleanupCommand {
    pub fn new(company: String) -> Self {
        Self { company }
    }

    pub async fn execute(&self, engine: &Engine) -> Result<()> {
        let watcher = CompletionWatcher::new(engine.ctx.clone());
        print_json(&watcher.check(&self.company).await?)
    }
}

pub struct PendingCommand {
    pub company: String,
}

impl PendingCommand {
    pub fn new(company: String) -> Self {
        Self { company }
    }

    pub async fn execute(&self, engine: &Engine) -> Result<()> {
        let watcher = CompletionWatcher::new(engine.ctx.clone());
        print_json(&watcher.pending_accounts(&self.company).await?)
    }
}
