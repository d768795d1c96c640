use config::{Config, Environment, File};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::account::AccountId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to read .env file: {0}")]
    DotEnv(#[from] dotenvy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure for the migration engine
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Organization the accounts migrate into
    pub target: TargetConfig,
    /// Roles provisioned in every migrated account
    pub roles: RolesConfig,
    /// Account compatibility checks run before leaving the source organization
    pub validation: ValidationConfig,
    /// Billing support case settings
    pub support_case: SupportCaseConfig,
    /// Notification routing
    pub notifications: NotificationConfig,
    /// Account table settings
    pub store: StoreConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Management account of the target organization
    pub management_account_id: AccountId,
    /// Organizational unit every migrated account is moved into
    pub default_ou_id: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            management_account_id: AccountId::unset(),
            default_ou_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RolesConfig {
    /// Administrative role used for all cross-account access after bootstrap
    pub access_role: String,
    /// Read-only companion role
    pub read_only_role: String,
    pub access_policy_arn: String,
    pub read_only_policy_arn: String,
    /// How long to wait for a freshly created access role to become assumable
    pub propagation: RetryConfig,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            access_role: "MasterRole".to_string(),
            read_only_role: "MasterReadOnlyRole".to_string(),
            access_policy_arn: "arn:aws:iam::aws:policy/AdministratorAccess".to_string(),
            read_only_policy_arn: "arn:aws:iam::aws:policy/ReadOnlyAccess".to_string(),
            propagation: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub retries: usize,
    pub interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            interval_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub email_enabled: bool,
    pub name_enabled: bool,
    pub email_pattern: String,
    pub name_pattern: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            email_enabled: false,
            name_enabled: false,
            email_pattern: r"^\S+@AWS.com$".to_string(),
            name_pattern: r"^([a-z]{2})(\d{7})\s{1}\w+\s{1}\w+$".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SupportCaseConfig {
    pub enabled: bool,
    pub cc_email_addresses: Vec<String>,
    /// Name of the acquiring company quoted in the case body
    pub acquirer_name: String,
    pub po_number: String,
    pub billing_address: String,
    pub contact_phone: String,
    pub invoice_email: String,
    pub net_term_days: u32,
}

impl Default for SupportCaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cc_email_addresses: Vec::new(),
            acquirer_name: "<CompanyName>".to_string(),
            po_number: "<PO Number>".to_string(),
            billing_address: "<Address>".to_string(),
            contact_phone: "<contact phone>".to_string(),
            invoice_email: "aws-inv-notices@AWS.com".to_string(),
            net_term_days: 45,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub title: String,
    /// Default notification topic
    pub topic: Option<String>,
    /// Topic for notifications that carry a Slack handle
    pub slack_topic: Option<String>,
    /// Footer appended to operator notifications
    pub notes: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "Migration Engine".to_string(),
            topic: None,
            slack_topic: None,
            notes: "Note: For more info please check the account table's Error column and the step logs"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    JsonFile,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Logical table name, used for the default file and database names
    pub table_name: String,
    /// Path of the JSON account table
    pub path: PathBuf,
    /// Database URL (SQLite file path or connection string)
    pub database_url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::JsonFile,
            table_name: "MigrationEngineTable".to_string(),
            path: PathBuf::from(".migration-engine/MigrationEngineTable.json"),
            database_url: "sqlite://.migration-engine/MigrationEngineTable.db".to_string(),
            max_connections: 5,
            auto_migrate: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON log lines instead of the plain formatter
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

/// Environment names used by deployments that predate the prefixed variables.
const LEGACY_STRING_VARS: &[(&str, &str)] = &[
    ("MASTER_ACCOUNT_ID", "target.management_account_id"),
    ("_DEFAULT_OU_ID", "target.default_ou_id"),
    ("NOTIFICATION_TOPIC", "notifications.topic"),
    ("SLACK_TOPIC", "notifications.slack_topic"),
    ("LOG_LEVEL", "observability.log_level"),
    ("TARGET_ACCOUNT_TABLE_NAME", "store.table_name"),
];

const LEGACY_FLAG_VARS: &[(&str, &str)] = &[
    ("ACCOUNT_EMAIL_VALIDATION", "validation.email_enabled"),
    ("ACCOUNT_NAME_VALIDATION", "validation.name_enabled"),
    ("CREATE_SUPPORT_CASE", "support_case.enabled"),
];

impl MigrationConfig {
    /// Load configuration from `.env`, the process environment, the default
    /// files and `extra_files`.
    pub fn load(extra_files: &[PathBuf]) -> Result<Self, ConfigError> {
        Self::load_env_file()?;
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_from(extra_files, &env)
    }

    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (migration-engine.toml, .migration-engine-rc, then `extra_files`)
    /// 3. Environment variables (prefixed with MIGRATION_ENGINE__)
    /// 4. Legacy deployment variables
    pub fn load_from(extra_files: &[PathBuf], env: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&MigrationConfig::default())?);

        if Path::new("migration-engine.toml").exists() {
            builder = builder.add_source(File::with_name("migration-engine"));
        }

        if Path::new(".migration-engine-rc").exists() {
            builder = builder.add_source(
                File::with_name(".migration-engine-rc").format(config::FileFormat::Toml),
            );
        }

        for path in extra_files {
            builder = builder.add_source(File::from(path.as_path()));
        }

        builder = builder.add_source(
            Environment::with_prefix("MIGRATION_ENGINE")
                .prefix_separator("__")
                .separator("__")
                .source(Some(env.clone())),
        );

        for (var, key) in LEGACY_STRING_VARS {
            if let Some(value) = env.get(*var).filter(|v| !v.is_empty()) {
                builder = builder.set_override(*key, value.as_str())?;
            }
        }
        for (var, key) in LEGACY_FLAG_VARS {
            if let Some(value) = env.get(*var).filter(|v| !v.is_empty()) {
                builder = builder.set_override(*key, value.eq_ignore_ascii_case("TRUE"))?;
            }
        }

        let mut loaded: MigrationConfig = builder.build()?.try_deserialize()?;

        if let Some(list) = env.get("CASE_CC_EMAIL_ADDRESSES").filter(|v| !v.is_empty()) {
            loaded.support_case.cc_email_addresses = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(loaded)
    }

    /// Reject settings no step can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.management_account_id.is_unset() {
            return Err(ConfigError::Invalid(
                "target.management_account_id (MASTER_ACCOUNT_ID) is not set".to_string(),
            ));
        }
        if self.target.default_ou_id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "target.default_ou_id (_DEFAULT_OU_ID) is not set".to_string(),
            ));
        }
        for (name, pattern) in [
            ("validation.email_pattern", &self.validation.email_pattern),
            ("validation.name_pattern", &self.validation.name_pattern),
        ] {
            Regex::new(pattern).map_err(|e| ConfigError::Invalid(format!("{name}: {e}")))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<(), ConfigError> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_need_a_target() {
        let config = MigrationConfig::load_from(&[], &env(&[])).unwrap();
        assert_eq!(config.roles.access_role, "MasterRole");
        assert_eq!(config.notifications.title, "Migration Engine");
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_layer_deserializes_on_its_own() {
        let config: MigrationConfig = Config::builder()
            .add_source(Config::try_from(&MigrationConfig::default()).unwrap())
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.support_case.cc_email_addresses.is_empty());
        assert_eq!(config.support_case.net_term_days, 45);
        assert_eq!(config.notifications.topic, None);
        assert_eq!(config.roles.propagation.retries, 5);
        assert!(config.target.management_account_id.is_unset());
        assert_eq!(config.store.backend, StoreBackend::JsonFile);
    }

    #[test]
    fn partial_files_keep_the_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[target]\nmanagement_account_id = \"111122223333\"\ndefault_ou_id = \"ou-abcd-12345678\"\n\n[support_case]\nenabled = true\n",
        )
        .unwrap();

        let config = MigrationConfig::load_from(&[path], &env(&[])).unwrap();
        assert!(config.support_case.enabled);
        assert!(config.support_case.cc_email_addresses.is_empty());
        assert_eq!(config.support_case.invoice_email, "aws-inv-notices@AWS.com");
        assert_eq!(config.roles.access_role, "MasterRole");
        config.validate().unwrap();
    }

    #[test]
    fn legacy_variables_override_defaults() {
        let config = MigrationConfig::load_from(
            &[],
            &env(&[
                ("MASTER_ACCOUNT_ID", "111122223333"),
                ("_DEFAULT_OU_ID", "ou-abcd-12345678"),
                ("ACCOUNT_EMAIL_VALIDATION", "TRUE"),
                ("CREATE_SUPPORT_CASE", "FALSE"),
                ("CASE_CC_EMAIL_ADDRESSES", "a@example.com, b@example.com"),
            ]),
        )
        .unwrap();

        assert_eq!(config.target.management_account_id.as_str(), "111122223333");
        assert_eq!(config.target.default_ou_id, "ou-abcd-12345678");
        assert!(config.validation.email_enabled);
        assert!(!config.validation.name_enabled);
        assert!(!config.support_case.enabled);
        assert_eq!(config.support_case.cc_email_addresses, vec!["a@example.com", "b@example.com"]);
        config.validate().unwrap();
    }

    #[test]
    fn prefixed_variables_reach_nested_sections() {
        let config = MigrationConfig::load_from(
            &[],
            &env(&[
                ("MIGRATION_ENGINE__STORE__BACKEND", "memory"),
                ("MIGRATION_ENGINE__ROLES__PROPAGATION__RETRIES", "2"),
            ]),
        )
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.roles.propagation.retries, 2);
    }

    #[test]
    fn files_round_trip_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");

        let mut config = MigrationConfig::default();
        config.target.default_ou_id = "ou-root-target".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = MigrationConfig::load_from(&[path], &env(&[])).unwrap();
        assert_eq!(loaded.target.default_ou_id, "ou-root-target");
    }

    #[test]
    fn rejects_invalid_patterns() {
        let mut config = MigrationConfig::default();
        config.target.management_account_id = "111122223333".parse().unwrap();
        config.target.default_ou_id = "ou-1".to_string();
        config.validation.name_pattern = "([".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
