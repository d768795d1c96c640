use anyhow::Result;
use std::path::PathBuf;

use super::{print_json, read_json, Engine};
use org_migration_engine::steps::execute;
use org_migration_engine::workflow::{StepEnvelope, StepKind};

pub struct StepCommand {
    pub kind: StepKind,
    pub input: Option<PathBuf>,
}

impl StepCommand {
    pub fn new(kind: StepKind, input: Option<PathBuf>) -> Self {
        Self { kind, input }
    }

    pub async fn execute(&self, engine: &Engine) -> Result<()> {
        let envelope = StepEnvelope::from_value(read_json(self.input.as_deref()).await?)?;
        let result = execute(&engine.ctx, self.kind, envelope).await?;
        print_json(&result)
    }
}
