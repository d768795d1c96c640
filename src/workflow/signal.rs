use serde::{Deserialize, Serialize};
use std::fmt;

/// What a step tells the scheduler to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    /// Goal reached, or already true before the call.
    Completed,
    /// Transient condition; invoke the same step again later.
    Wait,
    /// The organization rejected a concurrent modification; same as `Wait`.
    ConcurrencyWait,
    #[serde(alias = "LinkedAccountFlow")]
    LinkedFlow,
    #[serde(alias = "StandaloneAccountFlow")]
    StandaloneFlow,
    /// The account joined the target organization out of band; skip to the
    /// join check.
    #[serde(alias = "JoinCH")]
    JoinCheck,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Completed => "Completed",
            Signal::Wait => "Wait",
            Signal::ConcurrencyWait => "ConcurrencyWait",
            Signal::LinkedFlow => "LinkedFlow",
            Signal::StandaloneFlow => "StandaloneFlow",
            Signal::JoinCheck => "JoinCheck",
        }
    }

    /// `Wait` and `ConcurrencyWait`.
    pub fn is_wait(&self) -> bool {
        matches!(self, Signal::Wait | Signal::ConcurrencyWait)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every operation the scheduler can invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum StepKind {
    LeaveOrganization,
    JoinOrganization,
    CreateMasterRoles,
    CreateRoles,
    UpdateOu,
    CheckBillingAccess,
    EnabledRegions,
    ActivateAnalyzer,
    ScanOrgPermissions,
    CheckScanStatus,
    SupportCase,
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::LeaveOrganization => "leave_organization",
            StepKind::JoinOrganization => "join_organization",
            StepKind::CreateMasterRoles => "create_master_roles",
            StepKind::CreateRoles => "create_roles",
            StepKind::UpdateOu => "update_ou",
            StepKind::CheckBillingAccess => "check_billing_access",
            StepKind::EnabledRegions => "enabled_regions",
            StepKind::ActivateAnalyzer => "activate_analyzer",
            StepKind::ScanOrgPermissions => "scan_org_permissions",
            StepKind::CheckScanStatus => "check_scan_status",
            StepKind::SupportCase => "support_case",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
