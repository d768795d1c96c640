use async_trait::async_trait;
use tracing::info;

use super::{CompanyStep, StepContext};
use crate::account::{AccountId, AccountRecord};
use crate::cloud::{ApiResult, CaseRequest};
use crate::config::SupportCaseConfig;
use crate::error::MigrationResult;
use crate::notify::{ErrorType, Incident};
use crate::workflow::{Signal, StepEnvelope, StepKind};

/// Ask the provider to move the payer account to the acquirer's payment
/// method, then wait for the case to be resolved.
pub struct SupportCaseGate;

#[async_trait]
impl CompanyStep for SupportCaseGate {
    fn kind(&self) -> StepKind {
        StepKind::SupportCase
    }

    fn error_type(&self) -> ErrorType {
        ErrorType::SupportCase
    }

    async fn run(&self, ctx: &StepContext, envelope: &mut StepEnvelope) -> MigrationResult<Signal> {
        if !ctx.config.support_case.enabled {
            return Ok(Signal::Completed);
        }
        let Some(mut master) = ctx.store.master_account(&envelope.company_name).await? else {
            info!(company = %envelope.company_name, "no master account, no payment method to update");
            return Ok(Signal::Completed);
        };

        let signal = match advance_case(ctx, &mut master).await {
            Ok(signal) => signal,
            Err(err) => {
                let incident = Incident::for_account(ErrorType::SupportCase, &master, err.to_string())
                    .with_api_error(&err);
                master.error = Some(ctx.reporter.report(incident).await);
                Signal::Wait
            }
        };

        ctx.store.upsert(&master).await?;
        Ok(signal)
    }
}

async fn advance_case(ctx: &StepContext, master: &mut AccountRecord) -> ApiResult<Signal> {
    let engine = ctx.engine_session();
    let support = &ctx.cloud.support;

    if let Some(case_id) = &master.support_case_id {
        let case = support.describe_case(&engine, case_id).await?;
        if case.is_resolved() {
            info!(case_id = %case.case_id, "support case resolved");
            master.support_case_status = Some("resolved".to_string());
            return Ok(Signal::Completed);
        }
        master.support_case_status = Some(case.status);
        return Ok(Signal::Wait);
    }

    let request = case_request(&ctx.config.support_case, &master.account_id);
    let case_id = support.create_case(&engine, &request).await?;
    let case = support.describe_case(&engine, &case_id).await?;
    info!(
        account_id = %master.account_id,
        case_id = %case.case_id,
        "opened payment method support case"
    );
    master.support_case_id = Some(case.case_id);
    master.support_case_display_id = case.display_id;
    master.support_case_status = Some(case.status);
    Ok(Signal::Wait)
}

/// Case asking for the payer account and its linked accounts to switch
/// payment method.
pub fn case_request(config: &SupportCaseConfig, payer: &AccountId) -> CaseRequest {
    let acquirer = &config.acquirer_name;
    let subject =
        format!("Please update this payer account i.e. {payer} and all linked accounts payment method");
    let body = format!(
        "This company has been acquired by {acquirer}. \
         This payer account i.e.{payer} and all linked accounts will be migrated into the AWS {acquirer} Organization. \
         To facilitate this migration, we need the payment method updated for this payer account({payer}) and all linked accounts. \
         The phone number verification may be needed for each account too. \
         This is necessary to allow linked accounts to leave this AWS Organization and join the {acquirer} AWS Organization. \
         If invoice info is presently on any of the accounts we understand you cannot update the info so please leave as it is.\
         \r\n \r\nPlease update this payer account({payer}) and all linked accounts with the below details:\r\n \r\n\
         PO Number: {po}\r\n\
         Company Name: {acquirer}\r\n\
         Billing Contact Name: Accounts Payable\r\n\
         Billing address / Default payment method address: {address}\r\n\
         Billing contact phone: {phone}\r\n\
         Contact email for invoice: {invoice}\r\n \r\n\
         Net Term (to match new payer): {net} days\r\n \r\n\
         Please close this case once the payment method for the payer account({payer}) and all linked accounts have been updated. \
         This support request has been opened via automation. \
         This automation will check the status of the request periodically to see if this request has been closed \
         and will then proceed with its next tasks.\r\n \r\n",
        po = config.po_number,
        address = config.billing_address,
        phone = config.contact_phone,
        invoice = config.invoice_email,
        net = config.net_term_days,
    );

    CaseRequest {
        subject,
        communication_body: body,
        severity_code: "normal".to_string(),
        category_code: "update-billing-details".to_string(),
        service_code: "billing".to_string(),
        language: "en".to_string(),
        issue_type: "customer-service".to_string(),
        cc_email_addresses: config.cc_email_addresses.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountType;
    use crate::steps::testing::*;
    use crate::store::AccountStore;

    fn master() -> AccountRecord {
        AccountRecord::new("Acme", source_master(), AccountType::Master, "OrganizationAccountAccessRole")
    }

    fn enabled() -> crate::config::MigrationConfig {
        let mut cfg = config();
        cfg.support_case.enabled = true;
        cfg.support_case.acquirer_name = "Initech".to_string();
        cfg
    }

    #[test]
    fn request_names_the_payer_and_acquirer() {
        let request = case_request(&enabled().support_case, &source_master());
        assert!(request.subject.contains("100000000000"));
        assert!(request.communication_body.contains("acquired by Initech"));
        assert!(request.communication_body.contains("Net Term (to match new payer): 45 days"));
        assert_eq!(request.category_code, "update-billing-details");
    }

    #[tokio::test]
    async fn disabled_gate_completes_immediately() {
        let h = harness(base_state(), vec![master()], config());

        let signal = SupportCaseGate
            .run(&h.ctx, &mut StepEnvelope::for_company("Acme"))
            .await
            .unwrap();

        assert_eq!(signal, Signal::Completed);
        assert!(h.cloud.journal().is_empty());
    }

    #[tokio::test]
    async fn opens_a_case_then_waits_for_resolution() {
        let h = harness(base_state(), vec![master()], enabled());
        let mut envelope = StepEnvelope::for_company("Acme");

        let opened = SupportCaseGate.run(&h.ctx, &mut envelope).await.unwrap();
        assert_eq!(opened, Signal::Wait);
        let stored = h.store.get_account("Acme", &source_master()).await.unwrap().unwrap();
        let case_id = stored.support_case_id.clone().unwrap();
        assert_eq!(stored.support_case_status.as_deref(), Some("opened"));
        assert!(stored.support_case_display_id.is_some());

        let pending = SupportCaseGate.run(&h.ctx, &mut envelope).await.unwrap();
        assert_eq!(pending, Signal::Wait);
        assert_eq!(h.cloud.calls_to("create_case"), 1);

        h.cloud.set_case_status(&case_id, "resolved");
        let resolved = SupportCaseGate.run(&h.ctx, &mut envelope).await.unwrap();
        assert_eq!(resolved, Signal::Completed);
        let stored = h.store.get_account("Acme", &source_master()).await.unwrap().unwrap();
        assert_eq!(stored.support_case_status.as_deref(), Some("resolved"));
    }

    #[tokio::test]
    async fn remote_failures_are_recorded_and_wait() {
        let mut state = base_state();
        state.fail("create_case", None, "SubscriptionRequiredException", 1);
        let h = harness(state, vec![master()], enabled());

        let signal = SupportCaseGate
            .run(&h.ctx, &mut StepEnvelope::for_company("Acme"))
            .await
            .unwrap();

        assert_eq!(signal, Signal::Wait);
        let stored = h.store.get_account("Acme", &source_master()).await.unwrap().unwrap();
        assert!(stored.error.unwrap().starts_with("SubscriptionRequiredException"));
        assert_eq!(h.notifier.count_of(ErrorType::SupportCase), 1);
    }
}
