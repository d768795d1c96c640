use clap::{Parser, Subcommand};
use std::path::PathBuf;

use org_migration_engine::workflow::StepKind;

pub mod commands;

#[derive(Parser)]
#[command(name = "org-migration-engine")]
#[command(about = "Move cloud accounts of an acquired company into the target organization")]
#[command(long_about = "Runs one step of the account migration workflow per invocation. An external \
                       scheduler feeds each step the envelope returned by the previous one and re-invokes \
                       steps that answer Wait until they complete.")]
pub struct Cli {
    /// Sandbox state file used instead of a live cloud backend
    #[arg(long, global = true, help = "Sandbox state file, loaded before and saved after the command")]
    pub sandbox: Option<PathBuf>,

    /// Additional configuration file
    #[arg(long, global = true, help = "Configuration file layered over migration-engine.toml")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one workflow step on an envelope and print the resulting envelope
    Step {
        /// Step to run
        #[arg(value_enum)]
        kind: StepKind,
        /// Envelope file (reads stdin if not specified)
        #[arg(long, help = "JSON envelope to run the step on; stdin when omitted")]
        input: Option<PathBuf>,
    },
    /// Chase decommissioned accounts and detect the end of a company's migration
    Cleanup {
        /// Company whose accounts are checked
        #[arg(long, help = "Company name as stored in the account table")]
        company: String,
    },
    /// List envelopes for every account that still has to be migrated
    Pending {
        /// Company whose accounts are listed
        #[arg(long, help = "Company name as stored in the account table")]
        company: String,
    },
    /// Classify a published notification and repair the account record when possible
    Classify {
        /// Notification file (reads stdin if not specified)
        #[arg(long, help = "JSON notification payload; stdin when omitted")]
        input: Option<PathBuf>,
    },
}
