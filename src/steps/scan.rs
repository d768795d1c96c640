// Organization-level permission scan.
//
// Resource policies that grant access to "every principal of organization X"
// break silently when an account changes organization. The analyzer reports
// such grants as findings keyed by the organization id or path; a resource
// granted to the account's current organization but not to the engine's
// organization still needs an owner to update its policy.

use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::{AccountStep, StepContext};
use crate::account::AccountRecord;
use crate::cloud::{Analyzer, ApiResult, FindingFilter, FindingStatus, OrgCondition, Session};
use crate::error::MigrationResult;
use crate::notify::{ErrorType, Incident};
use crate::workflow::{Signal, StepEnvelope, StepKind};

/// Regions from the envelope, or every enabled region of the session's account.
async fn regions_for(ctx: &StepContext, session: &Session, envelope: &StepEnvelope) -> ApiResult<Vec<String>> {
    match &envelope.regions {
        Some(regions) => Ok(regions.clone()),
        None => ctx.cloud.regions.enabled_regions(session).await,
    }
}

/// Resolve the account's enabled regions into the envelope.
pub struct EnabledRegions;

#[async_trait]
impl AccountStep for EnabledRegions {
    fn kind(&self) -> StepKind {
        StepKind::EnabledRegions
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::OrgPermissionScan
    }

    async fn run(
        &self,
        ctx: &StepContext,
        account: &mut AccountRecord,
        envelope: &mut StepEnvelope,
    ) -> MigrationResult<Signal> {
        let session = ctx.access_session(&account.account_id).await?;
        let regions = ctx.cloud.regions.enabled_regions(&session).await?;
        debug!(account_id = %account.account_id, count = regions.len(), "resolved enabled regions");
        envelope.regions = Some(regions);
        Ok(Signal::Completed)
    }
}

/// Create an account-scoped analyzer in every region that has none.
pub struct ActivateAnalyzer;

#[async_trait]
impl AccountStep for ActivateAnalyzer {
    fn kind(&self) -> StepKind {
        StepKind::ActivateAnalyzer
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::OrgPermissionScan
    }

    async fn run(
        &self,
        ctx: &StepContext,
        account: &mut AccountRecord,
        envelope: &mut StepEnvelope,
    ) -> MigrationResult<Signal> {
        let session = ctx.access_session(&account.account_id).await?;
        for region in regions_for(ctx, &session, envelope).await? {
            if !ctx.cloud.analyzer.list_analyzers(&session, &region).await?.is_empty() {
                debug!(region = %region, "analyzer already exists");
                continue;
            }
            let name = format!("default_analyzer_{region}");
            let analyzer = ctx.cloud.analyzer.create_analyzer(&session, &region, &name).await?;
            info!(account_id = %account.account_id, region = %region, analyzer = %analyzer.arn, "created analyzer");
        }
        Ok(Signal::Completed)
    }
}

/// Flag resources still granting organization-wide access to the account's
/// current organization.
pub struct ScanOrgPermissions;

/// Outcome of scanning one region.
enum RegionScan {
    NoAnalyzer,
    Scanned(BTreeSet<String>),
}

#[async_trait]
impl AccountStep for ScanOrgPermissions {
    fn kind(&self) -> StepKind {
        StepKind::ScanOrgPermissions
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::OrgPermissionScan
    }

    async fn run(
        &self,
        ctx: &StepContext,
        account: &mut AccountRecord,
        envelope: &mut StepEnvelope,
    ) -> MigrationResult<Signal> {
        let session = ctx.access_session(&account.account_id).await?;
        let organizations = &ctx.cloud.organizations;
        let account_org = organizations.describe_organization(&session).await?.id;
        let engine_org = organizations.describe_organization(&ctx.engine_session()).await?.id;

        let mut waiting = false;
        let mut flagged = Vec::new();
        for region in regions_for(ctx, &session, envelope).await? {
            match scan_region(ctx, &session, &region, &account_org, &engine_org).await? {
                RegionScan::NoAnalyzer => {
                    let message = format!("No Analyzer found in region {region}");
                    ctx.reporter
                        .report(Incident::for_account(ErrorType::OrgPermissionScan, account, message))
                        .await;
                    waiting = true;
                }
                RegionScan::Scanned(resources) if resources.is_empty() => {
                    debug!(region = %region, "no organization level permissions");
                }
                RegionScan::Scanned(resources) => {
                    for resource in &resources {
                        let message =
                            format!("Resource {resource} is using organization level permission to access resource");
                        ctx.reporter
                            .report(Incident::for_account(ErrorType::OrgPermissionScan, account, message))
                            .await;
                    }
                    flagged.extend(resources);
                    waiting = true;
                }
            }
        }

        if waiting {
            info!(account_id = %account.account_id, flagged = flagged.len(), "permission scan incomplete");
            account.org_level_permissions = flagged;
            return Ok(Signal::Wait);
        }

        account.org_level_permissions.clear();
        account.is_permissions_scanned = true;
        Ok(Signal::Completed)
    }
}

async fn scan_region(
    ctx: &StepContext,
    session: &Session,
    region: &str,
    account_org: &str,
    engine_org: &str,
) -> ApiResult<RegionScan> {
    let analyzers = ctx.cloud.analyzer.list_analyzers(session, region).await?;
    let Some(analyzer) = analyzers.into_iter().next() else {
        return Ok(RegionScan::NoAnalyzer);
    };

    let mut flagged = BTreeSet::new();
    for condition in OrgCondition::ALL {
        let granted = active_resources(ctx, session, region, &analyzer, condition, account_org).await?;
        if granted.is_empty() {
            continue;
        }
        let resolved = active_resources(ctx, session, region, &analyzer, condition, engine_org).await?;
        flagged.extend(granted.difference(&resolved).cloned());
    }
    Ok(RegionScan::Scanned(flagged))
}

async fn active_resources(
    ctx: &StepContext,
    session: &Session,
    region: &str,
    analyzer: &Analyzer,
    condition: OrgCondition,
    org_id: &str,
) -> ApiResult<BTreeSet<String>> {
    let filter = FindingFilter {
        condition,
        contains: org_id.to_string(),
    };
    Ok(ctx
        .cloud
        .analyzer
        .list_findings(session, region, &analyzer.arn, &filter)
        .await?
        .into_iter()
        .filter(|f| f.status == FindingStatus::Active)
        .map(|f| f.resource)
        .collect())
}

/// Gate on the result of a previous permission scan.
pub struct CheckScanStatus;

#[async_trait]
impl AccountStep for CheckScanStatus {
    fn kind(&self) -> StepKind {
        StepKind::CheckScanStatus
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::OrgPermissionScan
    }

    async fn run(
        &self,
        _ctx: &StepContext,
        account: &mut AccountRecord,
        _envelope: &mut StepEnvelope,
    ) -> MigrationResult<Signal> {
        Ok(if account.is_permissions_scanned {
            Signal::Completed
        } else {
            Signal::Wait
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use crate::cloud::{SandboxFinding, SandboxState};
    use crate::steps::testing::*;

    const ACCOUNT: &str = "200000000040";

    fn linked() -> AccountRecord {
        AccountRecord::new("Acme", id(ACCOUNT), AccountType::Linked, "OrganizationAccountAccessRole")
    }

    fn member_state() -> SandboxState {
        let mut state = base_state();
        state
            .add_account(&id(ACCOUNT), "dev@AWS.com", "dev")
            .place(&id(ACCOUNT), SOURCE_ORG, None)
            .add_role(&id(ACCOUNT), "MasterRole");
        state
    }

    fn finding(region: &str, resource: &str, org_ids: &[&str]) -> SandboxFinding {
        SandboxFinding {
            region: region.to_string(),
            resource: resource.to_string(),
            status: FindingStatus::Active,
            org_ids: org_ids.iter().map(|s| s.to_string()).collect(),
            org_paths: Vec::new(),
        }
    }

    #[tokio::test]
    async fn enabled_regions_fill_the_envelope() {
        let h = harness(member_state(), vec![], config());

        let mut envelope = StepEnvelope::for_account("Acme", id(ACCOUNT));
        let signal = EnabledRegions.run(&h.ctx, &mut linked(), &mut envelope).await.unwrap();

        assert_eq!(signal, Signal::Completed);
        assert_eq!(
            envelope.regions,
            Some(vec!["us-east-1".to_string(), "eu-west-1".to_string()])
        );
    }

    #[tokio::test]
    async fn analyzers_are_created_only_where_missing() {
        let mut state = member_state();
        state.add_analyzer(&id(ACCOUNT), "us-east-1");
        let h = harness(state, vec![], config());

        let signal = ActivateAnalyzer
            .run(&h.ctx, &mut linked(), &mut StepEnvelope::default())
            .await
            .unwrap();

        assert_eq!(signal, Signal::Completed);
        assert_eq!(h.cloud.calls_to("create_analyzer"), 1);
        let analyzers = &h.cloud.snapshot().accounts[&id(ACCOUNT)].analyzers;
        assert_eq!(analyzers["eu-west-1"][0].name, "default_analyzer_eu-west-1");
    }

    #[tokio::test]
    async fn missing_analyzer_waits() {
        let mut state = member_state();
        state.add_analyzer(&id(ACCOUNT), "us-east-1");
        let h = harness(state, vec![], config());

        let mut record = linked();
        let signal = ScanOrgPermissions
            .run(&h.ctx, &mut record, &mut StepEnvelope::default())
            .await
            .unwrap();

        assert_eq!(signal, Signal::Wait);
        assert!(!record.is_permissions_scanned);
        let published = h.notifier.published();
        assert_eq!(published[0].message, "No Analyzer found in region eu-west-1");
    }

    #[tokio::test]
    async fn grants_shared_with_the_engine_org_are_resolved() {
        let mut state = member_state();
        state
            .add_analyzer(&id(ACCOUNT), "us-east-1")
            .add_finding(&id(ACCOUNT), finding("us-east-1", "arn:aws:s3:::shared", &[SOURCE_ORG, TARGET_ORG]));
        let h = harness(state, vec![], config());

        let mut record = linked();
        let mut envelope = StepEnvelope::default();
        envelope.regions = Some(vec!["us-east-1".to_string()]);
        let signal = ScanOrgPermissions.run(&h.ctx, &mut record, &mut envelope).await.unwrap();

        assert_eq!(signal, Signal::Completed);
        assert!(record.is_permissions_scanned);
        assert!(record.org_level_permissions.is_empty());
    }

    #[tokio::test]
    async fn scan_status_follows_the_record() {
        let h = harness(base_state(), vec![], config());

        let mut record = linked();
        let waiting = CheckScanStatus
            .run(&h.ctx, &mut record, &mut StepEnvelope::default())
            .await
            .unwrap();
        record.is_permissions_scanned = true;
        let done = CheckScanStatus
            .run(&h.ctx, &mut record, &mut StepEnvelope::default())
            .await
            .unwrap();

        assert_eq!(waiting, Signal::Wait);
        assert_eq!(done, Signal::Completed);
    }
}
