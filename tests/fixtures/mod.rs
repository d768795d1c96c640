//! Shared world for the integration tests: a target organization, an acquired
//! company's source organization, and the engine wired to the sandbox.
#![allow(dead_code)]

use std::sync::Arc;

use org_migration_engine::cloud::{CloudClients, SandboxCloud, SandboxState};
use org_migration_engine::config::MigrationConfig;
use org_migration_engine::notify::MemoryNotifier;
use org_migration_engine::store::InMemoryAccountStore;
use org_migration_engine::{AccountId, AccountRecord, AccountType, StepContext, StepEnvelope};

pub const COMPANY: &str = "Acme";
pub const TARGET_ORG: &str = "o-target";
pub const SOURCE_ORG: &str = "o-acme";
pub const DEFAULT_OU: &str = "ou-target-migrated";
pub const SOURCE_ADMIN_ROLE: &str = "OrganizationAccountAccessRole";
pub const ACCESS_ROLE: &str = "MasterRole";

pub fn account_id(raw: &str) -> AccountId {
    raw.parse().expect("valid account id")
}

pub fn management_id() -> AccountId {
    account_id("999999999999")
}

pub fn master_id() -> AccountId {
    account_id("111111111111")
}

pub struct TestWorld {
    pub ctx: StepContext,
    pub cloud: Arc<SandboxCloud>,
    pub store: Arc<InMemoryAccountStore>,
    pub notifier: Arc<MemoryNotifier>,
}

impl TestWorld {
    pub fn envelope(&self, raw_id: &str) -> StepEnvelope {
        StepEnvelope::for_account(COMPANY, account_id(raw_id))
    }
}

pub fn test_config() -> MigrationConfig {
    let mut config = MigrationConfig::default();
    config.target.management_account_id = management_id();
    config.target.default_ou_id = DEFAULT_OU.to_string();
    config.roles.propagation.retries = 2;
    config.roles.propagation.interval_ms = 1;
    config
}

/// Target organization with its default OU, plus the source organization
/// whose master exposes its admin role.
pub fn base_state() -> SandboxState {
    let mut state = SandboxState::default();
    state
        .add_organization(TARGET_ORG, &management_id())
        .add_unit(TARGET_ORG, DEFAULT_OU)
        .add_organization(SOURCE_ORG, &master_id())
        .add_role(&master_id(), SOURCE_ADMIN_ROLE)
        .add_role(&master_id(), ACCESS_ROLE);
    state.regions = vec!["us-east-1".to_string(), "eu-west-1".to_string()];
    state
}

/// Add a linked member of the source organization reachable through both roles.
pub fn add_linked_member(state: &mut SandboxState, raw_id: &str, email: &str) {
    let id = account_id(raw_id);
    state
        .add_account(&id, email, "member")
        .place(&id, SOURCE_ORG, None)
        .add_role(&id, SOURCE_ADMIN_ROLE)
        .add_role(&id, ACCESS_ROLE);
}

pub fn master_record() -> AccountRecord {
    AccountRecord::new(COMPANY, master_id(), AccountType::Master, SOURCE_ADMIN_ROLE)
}

pub fn linked_record(raw_id: &str) -> AccountRecord {
    AccountRecord::new(COMPANY, account_id(raw_id), AccountType::Linked, SOURCE_ADMIN_ROLE)
        .with_slack_handle("https://hooks.example/acme")
}

pub fn world(state: SandboxState, records: Vec<AccountRecord>, config: MigrationConfig) -> TestWorld {
    let cloud = Arc::new(SandboxCloud::new(state));
    let store = Arc::new(InMemoryAccountStore::with_records(records));
    let notifier = Arc::new(MemoryNotifier::default());
    let ctx = StepContext::new(
        Arc::new(config),
        store.clone(),
        CloudClients::from_backend(cloud.clone()),
        notifier.clone(),
    );
    TestWorld {
        ctx,
        cloud,
        store,
        notifier,
    }
}
