//! Subscription activity evaluation
//!
//! Two independent signals can tell us whether a subscription is live: the
//! issue date of the last paid invoice (billing side), or the expiry dates the
//! provisioning platform returns per entitlement (OTT side). The orchestrator
//! picks whichever system it already has fresh data from; both paths live
//! here so each can be tested on its own.

use chrono::NaiveDate;

use crate::catalog::{SUBSCRIPTION_WINDOW_DAYS, WATCHED_SERVICES};
use crate::provisioning::SubscribedService;

/// Wire date format the provisioning platform uses for expiry fields
pub const REMOTE_DATE_FORMAT: &str = "%d/%m/%Y";

/// What the remote entitlement list says about the customer's plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemotePlanStatus {
    /// At least one watched service is open-ended or not yet expired
    Active,
    /// Watched services exist but all have expired
    Expired,
    /// No watched service present at all. Distinct from `Expired`: this is
    /// what drives the create (rather than update) branch upstream.
    NoPlan,
}

/// Invoice-window path: active iff `issue_date <= today <= issue_date + 30d`.
/// Both boundaries are inclusive.
pub fn invoice_window_active(issue_date: NaiveDate, today: NaiveDate) -> bool {
    let expires = issue_date + chrono::Duration::days(SUBSCRIPTION_WINDOW_DAYS);
    issue_date <= today && today <= expires
}

/// Remote-entitlement path: scan the watched service ids in the customer's
/// returned service list.
///
/// An empty expiry string means open-ended and therefore active. An
/// unparseable expiry also counts as active: failing open here errs toward
/// not double-charging a customer whose record we cannot read.
pub fn remote_plan_status(services: &[SubscribedService], today: NaiveDate) -> RemotePlanStatus {
    let mut saw_watched = false;

    for service in services {
        let Some(service_id) = service.service_id() else {
            continue;
        };
        if !WATCHED_SERVICES.contains(&service_id) {
            continue;
        }
        saw_watched = true;

        if service.expire_dt.trim().is_empty() {
            return RemotePlanStatus::Active;
        }
        match NaiveDate::parse_from_str(service.expire_dt.trim(), REMOTE_DATE_FORMAT) {
            Ok(expiry) if expiry >= today => return RemotePlanStatus::Active,
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(
                    expire_dt = %service.expire_dt,
                    service_id = service_id,
                    "Unparseable expiry from provisioning platform, treating as active"
                );
                return RemotePlanStatus::Active;
            }
        }
    }

    if saw_watched {
        RemotePlanStatus::Expired
    } else {
        RemotePlanStatus::NoPlan
    }
}
