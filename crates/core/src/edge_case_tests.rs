// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Activation Workflow
//!
//! Exercises the orchestrator against mocked billing, provisioning, vault and
//! mail collaborators:
//! - create vs. update branch selection from remote state
//! - eligibility rejections before any external write
//! - billing-committed / provisioning-failed partial outcomes
//! - credential lifecycle (generation, reuse, delivery warnings)

#[cfg(test)]
mod activation_tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use crate::activation::ActivationService;
    use serde_json::json;

    use crate::billing::{
        BillingClient, Contact, IdentityFields, InvoiceLine, PaidInvoice, PlanInfo,
        SettlementDetails,
    };
    use crate::catalog::{PLAN_PREMIUM, PLAN_STANDARD};
    use crate::error::{CoreError, CoreResult};
    use crate::notify::{CredentialNotice, CredentialNotifier};
    use crate::provisioning::{
        CreateCustomerPayload, CustomerRecord, ProvisioningAck, ProvisioningClient,
        ServiceMenuRef, SubscribedService, UpdateCustomerPayload,
    };
    use crate::requests::{ActivationBody, ActivationRequest, PaymentMethod};
    use crate::vault::{LocalAccount, NewLocalAccount, VaultStore};

    const CONTACT_ID: i64 = 77;
    const EXISTING_USER_ID: i64 = 4001;
    const FRESH_USER_ID: i64 = 5001;
    const INVOICE_ID: i64 = 9100;
    const PAYMENT_ID: i64 = 9200;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    // ----- mocks ------------------------------------------------------------

    struct MockBilling {
        paid_invoices: Vec<PaidInvoice>,
        calls: Mutex<Vec<String>>,
        last_settlement: Mutex<Option<SettlementDetails>>,
    }

    impl MockBilling {
        fn new() -> Self {
            Self {
                paid_invoices: Vec::new(),
                calls: Mutex::new(Vec::new()),
                last_settlement: Mutex::new(None),
            }
        }

        fn with_paid_invoice(mut self, issue_date: NaiveDate) -> Self {
            self.paid_invoices.push(PaidInvoice {
                id: 8000,
                issue_date,
                amount_total: 100.0,
            });
            self
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn called(&self, call: &str) -> bool {
            self.calls.lock().unwrap().iter().any(|c| c == call)
        }
    }

    #[async_trait]
    impl BillingClient for MockBilling {
        async fn read_contact(&self, contact_id: i64) -> CoreResult<Contact> {
            self.record("read_contact");
            if contact_id != CONTACT_ID {
                return Err(CoreError::NotFound(format!("contact {}", contact_id)));
            }
            Ok(Contact {
                id: CONTACT_ID,
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                mobile: "70000000".to_string(),
            })
        }

        async fn write_contact(&self, _contact_id: i64, _fields: &IdentityFields) -> CoreResult<()> {
            self.record("write_contact");
            Ok(())
        }

        async fn read_plan(&self, plan_id: i64) -> CoreResult<PlanInfo> {
            self.record("read_plan");
            Ok(PlanInfo {
                id: plan_id,
                name: format!("plan {}", plan_id),
                list_price: 100.0,
            })
        }

        async fn create_portal_user(
            &self,
            _contact_id: i64,
            _name: &str,
            _email: &str,
            _mobile: &str,
        ) -> CoreResult<i64> {
            self.record("create_portal_user");
            Ok(FRESH_USER_ID)
        }

        async fn create_invoice(
            &self,
            _contact_id: i64,
            _lines: &[InvoiceLine],
            settlement: &SettlementDetails,
            _identity: &IdentityFields,
        ) -> CoreResult<i64> {
            self.record("create_invoice");
            *self.last_settlement.lock().unwrap() = Some(settlement.clone());
            Ok(INVOICE_ID)
        }

        async fn post_invoice(&self, _invoice_id: i64) -> CoreResult<()> {
            self.record("post_invoice");
            Ok(())
        }

        async fn register_payment(&self, _invoice_id: i64, _amount: f64) -> CoreResult<i64> {
            self.record("register_payment");
            Ok(PAYMENT_ID)
        }

        async fn find_paid_invoices_for_contact(
            &self,
            _contact_id: i64,
        ) -> CoreResult<Vec<PaidInvoice>> {
            self.record("find_paid_invoices");
            Ok(self.paid_invoices.clone())
        }
    }

    #[derive(Default)]
    struct MockProvisioning {
        customer: Option<CustomerRecord>,
        fail_create: bool,
        fail_update: bool,
        calls: Mutex<Vec<String>>,
        last_create: Mutex<Option<CreateCustomerPayload>>,
    }

    impl MockProvisioning {
        fn with_customer(services: Vec<SubscribedService>) -> Self {
            Self {
                customer: Some(CustomerRecord {
                    customer_id: format!("sb{}", EXISTING_USER_ID),
                    subscribe_service: services,
                }),
                ..Self::default()
            }
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn called(&self, call: &str) -> bool {
            self.calls.lock().unwrap().iter().any(|c| c == call)
        }
    }

    #[async_trait]
    impl ProvisioningClient for MockProvisioning {
        async fn get_customer(&self, _customer_id: &str) -> CoreResult<Option<CustomerRecord>> {
            self.record("get_customer");
            Ok(self.customer.clone())
        }

        async fn create_customer(
            &self,
            payload: &CreateCustomerPayload,
        ) -> CoreResult<ProvisioningAck> {
            self.record("create_customer");
            if self.fail_create {
                return Err(CoreError::provisioning("platform is down"));
            }
            *self.last_create.lock().unwrap() = Some(payload.clone());
            Ok(ProvisioningAck {
                response: json!({ "status": "customer created" }),
            })
        }

        async fn update_customer(
            &self,
            _customer_id: &str,
            _payload: &UpdateCustomerPayload,
        ) -> CoreResult<ProvisioningAck> {
            self.record("update_customer");
            if self.fail_update {
                return Err(CoreError::provisioning("platform is down"));
            }
            Ok(ProvisioningAck {
                response: json!({ "status": "customer updated" }),
            })
        }

        async fn delete_entitlements(&self, _customer_id: &str) -> CoreResult<ProvisioningAck> {
            self.record("delete_entitlements");
            Ok(ProvisioningAck::default())
        }

        async fn update_password(
            &self,
            _customer_id: &str,
            _new_password: &str,
        ) -> CoreResult<ProvisioningAck> {
            self.record("update_password");
            Ok(ProvisioningAck::default())
        }
    }

    #[derive(Default)]
    struct MockNotifier {
        fail: bool,
        sent: Mutex<Vec<CredentialNotice>>,
    }

    #[async_trait]
    impl CredentialNotifier for MockNotifier {
        async fn send_credentials(&self, notice: &CredentialNotice) -> CoreResult<()> {
            if self.fail {
                return Err(CoreError::Notification("mail api timeout".to_string()));
            }
            self.sent.lock().unwrap().push(notice.clone());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockVault {
        accounts: Mutex<HashMap<i64, (LocalAccount, String)>>,
        store_count: Mutex<u32>,
    }

    impl MockVault {
        fn with_account(user_id: i64, contact_id: i64, password: &str) -> Self {
            let vault = Self::default();
            vault.accounts.lock().unwrap().insert(
                user_id,
                (
                    LocalAccount {
                        user_id,
                        contact_id,
                        first_name: "Ana".to_string(),
                        last_name: String::new(),
                        email: "ana@example.com".to_string(),
                        mobile: "70000000".to_string(),
                        policy_accepted_at: None,
                    },
                    password.to_string(),
                ),
            );
            vault
        }

        fn policy_accepted_at(&self, user_id: i64) -> Option<time::OffsetDateTime> {
            self.accounts
                .lock()
                .unwrap()
                .get(&user_id)
                .and_then(|(a, _)| a.policy_accepted_at)
        }

        fn stored_password(&self, user_id: i64) -> Option<String> {
            self.accounts
                .lock()
                .unwrap()
                .get(&user_id)
                .map(|(_, p)| p.clone())
        }
    }

    #[async_trait]
    impl VaultStore for MockVault {
        async fn find_by_contact(&self, contact_id: i64) -> CoreResult<Option<LocalAccount>> {
            Ok(self
                .accounts
                .lock()
                .unwrap()
                .values()
                .find(|(a, _)| a.contact_id == contact_id)
                .map(|(a, _)| a.clone()))
        }

        async fn store(&self, account: &NewLocalAccount, plaintext: &str) -> CoreResult<()> {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(&account.user_id) {
                return Err(CoreError::DuplicateUser(account.user_id));
            }
            *self.store_count.lock().unwrap() += 1;
            accounts.insert(
                account.user_id,
                (
                    LocalAccount {
                        user_id: account.user_id,
                        contact_id: account.contact_id,
                        first_name: account.first_name.clone(),
                        last_name: account.last_name.clone(),
                        email: account.email.clone(),
                        mobile: account.mobile.clone(),
                        policy_accepted_at: None,
                    },
                    plaintext.to_string(),
                ),
            );
            Ok(())
        }

        async fn reveal(&self, user_id: i64) -> CoreResult<String> {
            self.accounts
                .lock()
                .unwrap()
                .get(&user_id)
                .map(|(_, p)| p.clone())
                .ok_or_else(|| CoreError::NotFound(format!("no vault record for user {}", user_id)))
        }

        async fn mark_policy_accepted(&self, user_id: i64) -> CoreResult<bool> {
            let mut accounts = self.accounts.lock().unwrap();
            match accounts.get_mut(&user_id) {
                Some((account, _)) if account.policy_accepted_at.is_none() => {
                    account.policy_accepted_at = Some(time::OffsetDateTime::now_utc());
                    Ok(true)
                }
                _ => Ok(false),
            }
        }
    }

    // ----- fixtures ---------------------------------------------------------

    fn body() -> ActivationBody {
        ActivationBody {
            contact_id: CONTACT_ID,
            plan_id: PLAN_PREMIUM,
            second_plan_id: None,
            payment_ref: "TX-100".to_string(),
            payment_method: PaymentMethod::Qr,
            card_number: None,
            identity: IdentityFields {
                document_type: "1".to_string(),
                document_number: "1234567".to_string(),
                extension: "LP".to_string(),
                legal_name: "Ana Quispe".to_string(),
            },
        }
    }

    fn new_request() -> ActivationRequest {
        ActivationRequest::New(body())
    }

    fn renewal_request() -> ActivationRequest {
        ActivationRequest::Renewal(body())
    }

    fn expired_service() -> SubscribedService {
        SubscribedService {
            effective_dt: "01/01/2025".to_string(),
            expire_dt: "01/02/2025".to_string(),
            service_menu: ServiceMenuRef {
                service_menu_id: "6212".to_string(),
            },
        }
    }

    fn active_service() -> SubscribedService {
        SubscribedService {
            effective_dt: "01/06/2025".to_string(),
            expire_dt: "01/07/2025".to_string(),
            service_menu: ServiceMenuRef {
                service_menu_id: "6212".to_string(),
            },
        }
    }

    fn service(
        billing: MockBilling,
        provisioning: MockProvisioning,
        notifier: MockNotifier,
        vault: MockVault,
    ) -> ActivationService<MockBilling, MockProvisioning, MockNotifier, MockVault> {
        ActivationService::new(billing, provisioning, notifier, vault, "sb".to_string())
    }

    // =========================================================================
    // Brand-new customer: portal user created, customer created on the
    // platform, credential stored and emailed
    // =========================================================================
    #[tokio::test]
    async fn test_new_customer_runs_the_full_create_flow() {
        let billing = MockBilling::new();
        let provisioning = MockProvisioning::default();
        let notifier = MockNotifier::default();
        let vault = MockVault::default();
        let svc = service(billing, provisioning, notifier, vault);

        let outcome = svc.activate(&new_request(), today()).await.unwrap();

        assert_eq!(outcome.user_id, FRESH_USER_ID);
        assert_eq!(outcome.customer_id, format!("sb{}", FRESH_USER_ID));
        assert_eq!(outcome.invoice_id, INVOICE_ID);
        assert_eq!(outcome.payment_id, PAYMENT_ID);
        assert!(outcome.provisioning.created_remote_customer);
        assert_eq!(
            outcome.provisioning.response,
            json!({ "status": "customer created" })
        );
        assert!(outcome.warnings.is_empty());
    }

    // =========================================================================
    // The emailed password is exactly the one stored in the vault and pushed
    // to the platform
    // =========================================================================
    #[tokio::test]
    async fn test_emailed_password_matches_vault_and_payload() {
        let svc = service(
            MockBilling::new(),
            MockProvisioning::default(),
            MockNotifier::default(),
            MockVault::default(),
        );

        svc.activate(&new_request(), today()).await.unwrap();

        let sent = svc.notifier().sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let emailed = sent[0].password.clone();
        drop(sent);

        assert_eq!(
            svc.vault().stored_password(FRESH_USER_ID),
            Some(emailed.clone())
        );
        let payload = svc.provisioning().last_create.lock().unwrap();
        assert_eq!(
            payload.as_ref().unwrap().customer_account.password,
            emailed
        );
    }

    // =========================================================================
    // Lapsed customer renewal: entitlements wiped and re-granted, password
    // untouched, no email
    // =========================================================================
    #[tokio::test]
    async fn test_renewal_updates_without_touching_credentials() {
        let provisioning = MockProvisioning::with_customer(vec![expired_service()]);
        let vault = MockVault::with_account(EXISTING_USER_ID, CONTACT_ID, "Old1pass");
        let svc = service(
            MockBilling::new(),
            provisioning,
            MockNotifier::default(),
            vault,
        );

        let outcome = svc.activate(&renewal_request(), today()).await.unwrap();

        assert!(!outcome.provisioning.created_remote_customer);
        assert_eq!(
            outcome.provisioning.response,
            json!({ "status": "customer updated" })
        );
        assert_eq!(outcome.user_id, EXISTING_USER_ID);
        assert!(svc.provisioning().called("delete_entitlements"));
        assert!(svc.provisioning().called("update_customer"));
        assert!(!svc.provisioning().called("create_customer"));
        assert_eq!(
            svc.vault().stored_password(EXISTING_USER_ID),
            Some("Old1pass".to_string())
        );
        assert_eq!(*svc.vault().store_count.lock().unwrap(), 0);
        assert!(svc.notifier().sent.lock().unwrap().is_empty());
    }

    // =========================================================================
    // Remote record says active: reject before any billing write
    // =========================================================================
    #[tokio::test]
    async fn test_active_remote_subscription_rejects_before_writes() {
        let provisioning = MockProvisioning::with_customer(vec![active_service()]);
        let vault = MockVault::with_account(EXISTING_USER_ID, CONTACT_ID, "Old1pass");
        let svc = service(
            MockBilling::new(),
            provisioning,
            MockNotifier::default(),
            vault,
        );

        let err = svc.activate(&renewal_request(), today()).await.unwrap_err();

        assert!(matches!(err, CoreError::BusinessRule(_)));
        assert!(err.is_pre_write());
        assert!(!svc.billing().called("create_invoice"));
        assert!(!svc.billing().called("write_contact"));
        assert!(!svc.provisioning().called("delete_entitlements"));
    }

    // =========================================================================
    // A paid invoice inside the 30-day window also rejects, without even
    // asking the platform
    // =========================================================================
    #[tokio::test]
    async fn test_recent_paid_invoice_rejects_before_writes() {
        let billing =
            MockBilling::new().with_paid_invoice(today() - chrono::Duration::days(10));
        let vault = MockVault::with_account(EXISTING_USER_ID, CONTACT_ID, "Old1pass");
        let svc = service(
            billing,
            MockProvisioning::default(),
            MockNotifier::default(),
            vault,
        );

        let err = svc.activate(&renewal_request(), today()).await.unwrap_err();

        assert!(matches!(err, CoreError::BusinessRule(_)));
        assert!(!svc.billing().called("create_invoice"));
        assert!(!svc.provisioning().called("get_customer"));
    }

    // =========================================================================
    // A paid invoice just outside the window does not block renewal
    // =========================================================================
    #[tokio::test]
    async fn test_invoice_older_than_window_allows_renewal() {
        let billing =
            MockBilling::new().with_paid_invoice(today() - chrono::Duration::days(31));
        let provisioning = MockProvisioning::with_customer(vec![expired_service()]);
        let vault = MockVault::with_account(EXISTING_USER_ID, CONTACT_ID, "Old1pass");
        let svc = service(billing, provisioning, MockNotifier::default(), vault);

        let outcome = svc.activate(&renewal_request(), today()).await.unwrap();
        assert!(!outcome.provisioning.created_remote_customer);
    }

    // =========================================================================
    // Provisioning failure after payment: partial outcome carrying the
    // committed billing ids, billing untouched afterwards
    // =========================================================================
    #[tokio::test]
    async fn test_provisioning_failure_after_payment_is_partial() {
        let provisioning = MockProvisioning {
            fail_create: true,
            ..MockProvisioning::default()
        };
        let svc = service(
            MockBilling::new(),
            provisioning,
            MockNotifier::default(),
            MockVault::default(),
        );

        let err = svc.activate(&new_request(), today()).await.unwrap_err();

        match err {
            CoreError::PartiallyFailed {
                invoice_id,
                payment_id,
                ..
            } => {
                assert_eq!(invoice_id, INVOICE_ID);
                assert_eq!(payment_id, PAYMENT_ID);
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
        // The payment stays registered; no compensating billing call exists
        assert!(svc.billing().called("register_payment"));
        // No credential email for an activation that did not complete
        assert!(svc.notifier().sent.lock().unwrap().is_empty());
    }

    // =========================================================================
    // Mail failure downgrades to a warning on a successful activation
    // =========================================================================
    #[tokio::test]
    async fn test_failed_credential_email_is_a_warning() {
        let notifier = MockNotifier {
            fail: true,
            ..MockNotifier::default()
        };
        let svc = service(
            MockBilling::new(),
            MockProvisioning::default(),
            notifier,
            MockVault::default(),
        );

        let outcome = svc.activate(&new_request(), today()).await.unwrap();

        assert!(outcome.provisioning.created_remote_customer);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("credential email"));
    }

    // =========================================================================
    // Renewal for a contact we have no account for is a not-found, pre-write
    // =========================================================================
    #[tokio::test]
    async fn test_renewal_without_local_account_is_not_found() {
        let svc = service(
            MockBilling::new(),
            MockProvisioning::default(),
            MockNotifier::default(),
            MockVault::default(),
        );

        let err = svc.activate(&renewal_request(), today()).await.unwrap_err();

        assert!(matches!(err, CoreError::NotFound(_)));
        assert!(!svc.billing().called("create_invoice"));
    }

    // =========================================================================
    // Malformed request never reaches a collaborator
    // =========================================================================
    #[tokio::test]
    async fn test_invalid_request_rejects_before_any_call() {
        let mut bad = body();
        bad.payment_method = PaymentMethod::Card;
        bad.card_number = Some("123".to_string());
        let svc = service(
            MockBilling::new(),
            MockProvisioning::default(),
            MockNotifier::default(),
            MockVault::default(),
        );

        let err = svc
            .activate(&ActivationRequest::New(bad), today())
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Validation(_)));
        assert!(svc.billing().calls.lock().unwrap().is_empty());
        assert!(svc.provisioning().calls.lock().unwrap().is_empty());
    }

    // =========================================================================
    // Local account exists but the platform lost the customer: re-create with
    // the stored password, no regeneration, no email
    // =========================================================================
    #[tokio::test]
    async fn test_missing_remote_customer_is_recreated_with_stored_password() {
        let vault = MockVault::with_account(EXISTING_USER_ID, CONTACT_ID, "Keep1pwd");
        let svc = service(
            MockBilling::new(),
            MockProvisioning::default(),
            MockNotifier::default(),
            vault,
        );

        let outcome = svc.activate(&new_request(), today()).await.unwrap();

        assert!(outcome.provisioning.created_remote_customer);
        assert_eq!(outcome.user_id, EXISTING_USER_ID);
        assert!(!svc.billing().called("create_portal_user"));
        let payload = svc.provisioning().last_create.lock().unwrap();
        assert_eq!(
            payload.as_ref().unwrap().customer_account.password,
            "Keep1pwd"
        );
        assert!(svc.notifier().sent.lock().unwrap().is_empty());
    }

    // =========================================================================
    // Policy acceptance is stamped on activation and the first stamp wins
    // =========================================================================
    #[tokio::test]
    async fn test_policy_acceptance_timestamp_is_never_overwritten() {
        let svc = service(
            MockBilling::new(),
            MockProvisioning::default(),
            MockNotifier::default(),
            MockVault::default(),
        );

        svc.activate(&new_request(), today()).await.unwrap();
        let first = svc.vault().policy_accepted_at(FRESH_USER_ID);
        assert!(first.is_some());

        let again = svc.vault().mark_policy_accepted(FRESH_USER_ID).await.unwrap();
        assert!(!again);
        assert_eq!(svc.vault().policy_accepted_at(FRESH_USER_ID), first);
    }

    // =========================================================================
    // Bundle activation bills one line per plan
    // =========================================================================
    #[tokio::test]
    async fn test_bundle_bills_both_plans() {
        let mut b = body();
        b.second_plan_id = Some(PLAN_STANDARD);
        let svc = service(
            MockBilling::new(),
            MockProvisioning::default(),
            MockNotifier::default(),
            MockVault::default(),
        );

        svc.activate(&ActivationRequest::New(b), today())
            .await
            .unwrap();

        let calls = svc.billing().calls.lock().unwrap();
        let plan_reads = calls.iter().filter(|c| *c == "read_plan").count();
        assert_eq!(plan_reads, 2);
    }

    // =========================================================================
    // The payment method and card number from the request land on the invoice
    // =========================================================================
    #[tokio::test]
    async fn test_settlement_details_reach_the_invoice() {
        let mut b = body();
        b.payment_method = PaymentMethod::Card;
        b.card_number = Some("41234567".to_string());
        let svc = service(
            MockBilling::new(),
            MockProvisioning::default(),
            MockNotifier::default(),
            MockVault::default(),
        );

        svc.activate(&ActivationRequest::New(b), today())
            .await
            .unwrap();

        let settlement = svc.billing().last_settlement.lock().unwrap();
        assert_eq!(
            settlement.as_ref().unwrap(),
            &SettlementDetails {
                payment_ref: "TX-100".to_string(),
                method: PaymentMethod::Card,
                card_number: Some("41234567".to_string()),
            }
        );
    }
}
