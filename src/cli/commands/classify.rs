use anyhow::Result;
use std::path::PathBuf;

use super::{print_json, read_json, Engine};
use org_migration_engine::notify::{Notification, NotificationClassifier};

pub struct ClassifyCommand {
    pub input: Option<PathBuf>,
}

impl ClassifyCommand {
    pub fn new(input: Option<PathBuf>) -> Self {
        Self { input }
    }

    pub async fn execute(&self, engine: &Engine) -> Result<()> {
        let notification: Notification = serde_json::from_value(read_json(self.input.as_deref()).await?)?;
        let classifier = NotificationClassifier::new(engine.ctx.store.clone(), engine.ctx.reporter.clone());
        print_json(&classifier.classify(notification).await?)
    }
}
