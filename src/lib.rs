// Org Migration Engine - moves the accounts of an acquired company into a target organization
// This exposes the step contracts and their collaborators for the CLI and for integration tests

pub mod account;
pub mod cleanup;
pub mod cloud;
pub mod config;
pub mod error;
pub mod notify;
pub mod steps;
pub mod store;
pub mod telemetry;
pub mod workflow;

// Re-export key types for easy access
pub use account::{AccountId, AccountRecord, AccountStatus, AccountType, DecommissionState, MigrationState};
pub use cleanup::CompletionWatcher;
pub use cloud::{ApiError, ApiErrorKind, CloudClients, SandboxCloud, SandboxState};
pub use config::MigrationConfig;
pub use error::{MigrationError, MigrationResult};
pub use notify::{ErrorReporter, ErrorType, Notification, NotificationClassifier, Notifier};
pub use steps::{execute, StepContext};
pub use store::{open_store, AccountStore, StoreError};
pub use telemetry::{generate_correlation_id, init_telemetry};
pub use workflow::{Signal, StepEnvelope, StepKind};
