//! Plan catalog and entitlement mapping
//!
//! Maps a billing-system plan id to the set of provisioning entitlements the
//! OTT platform understands. Pure and deterministic given `(plan, today)`:
//! ordinary plans get a 30-day window starting today, the event promo plans
//! carry hard-coded calendar windows that do not depend on when the request
//! arrives. That is the agreed business rule for one-shot event passes, not a
//! bug; the dates pass and the plans die with them.

use chrono::NaiveDate;

use crate::error::{CoreError, CoreResult};

/// Billing-system plan identifier (the ERP product id)
pub type PlanId = i64;

pub const PLAN_STANDARD: PlanId = 6;
pub const PLAN_PREMIUM: PlanId = 8;
pub const PLAN_PREMIUM_PLUS: PlanId = 9;
pub const PLAN_EVENT_MAR_20: PlanId = 46;
pub const PLAN_EVENT_MAR_21: PlanId = 47;
pub const PLAN_EVENT_MAR_25: PlanId = 49;

/// Service menu ids granted to every customer and never expired once given
pub const ALWAYS_OPEN_SERVICES: [u32; 3] = [6213, 6214, 6215];

/// Plan-bound service menu ids whose expiry determines subscription activity
pub const WATCHED_SERVICES: [u32; 4] = [6212, 6217, 6293, 6294];

/// Days an ordinary (non-promo) plan stays active after activation
pub const SUBSCRIPTION_WINDOW_DAYS: i64 = 30;

/// A single service grant with its validity window.
/// `expiry == None` means open-ended (never gates activity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlement {
    pub service_id: u32,
    pub effective: NaiveDate,
    pub expiry: Option<NaiveDate>,
}

/// Max concurrent device counts pushed to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAllowance {
    pub stationary: u8,
    pub mobile: u8,
}

impl DeviceAllowance {
    /// Element-wise maximum, used when two plans are combined
    pub fn merged(self, other: DeviceAllowance) -> DeviceAllowance {
        DeviceAllowance {
            stationary: self.stationary.max(other.stationary),
            mobile: self.mobile.max(other.mobile),
        }
    }
}

/// Everything the provisioning payload builder needs for one activation
#[derive(Debug, Clone)]
pub struct ProvisionProfile {
    pub allowance: DeviceAllowance,
    pub entitlements: Vec<Entitlement>,
}

/// Static definition of one sellable plan
#[derive(Debug, Clone)]
struct PlanSpec {
    id: PlanId,
    /// Plan-bound service ids this plan grants (subset of [`WATCHED_SERVICES`])
    services: &'static [u32],
    allowance: DeviceAllowance,
    /// Fixed calendar window for event promos; `None` = rolling 30-day window
    promo_window: Option<(NaiveDate, NaiveDate)>,
}

// Promo windows are literal one-time event dates. Keep them as named
// constants keyed by plan id; do not generalize into a scheduling table.
fn plan_specs() -> Vec<PlanSpec> {
    let event_window =
        |day: u32| NaiveDate::from_ymd_opt(2025, 3, day).map(|d| (d, d));
    vec![
        PlanSpec {
            id: PLAN_STANDARD,
            services: &[6212, 6294],
            allowance: DeviceAllowance {
                stationary: 1,
                mobile: 2,
            },
            promo_window: None,
        },
        PlanSpec {
            id: PLAN_PREMIUM,
            services: &[6212, 6217, 6294],
            allowance: DeviceAllowance {
                stationary: 2,
                mobile: 3,
            },
            promo_window: None,
        },
        PlanSpec {
            id: PLAN_PREMIUM_PLUS,
            services: &[6212, 6217, 6293, 6294],
            allowance: DeviceAllowance {
                stationary: 2,
                mobile: 3,
            },
            promo_window: None,
        },
        PlanSpec {
            id: PLAN_EVENT_MAR_20,
            services: &[6294],
            allowance: DeviceAllowance {
                stationary: 1,
                mobile: 2,
            },
            promo_window: event_window(20),
        },
        PlanSpec {
            id: PLAN_EVENT_MAR_21,
            services: &[6294],
            allowance: DeviceAllowance {
                stationary: 1,
                mobile: 2,
            },
            promo_window: event_window(21),
        },
        PlanSpec {
            id: PLAN_EVENT_MAR_25,
            services: &[6294],
            allowance: DeviceAllowance {
                stationary: 1,
                mobile: 2,
            },
            promo_window: event_window(25),
        },
    ]
}

/// Catalog of sellable plans and their entitlement mappings
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: Vec<PlanSpec>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanCatalog {
    pub fn new() -> Self {
        Self {
            plans: plan_specs(),
        }
    }

    pub fn contains(&self, plan: PlanId) -> bool {
        self.plans.iter().any(|p| p.id == plan)
    }

    fn spec(&self, plan: PlanId) -> CoreResult<&PlanSpec> {
        self.plans
            .iter()
            .find(|p| p.id == plan)
            .ok_or_else(|| CoreError::NotFound(format!("plan {} is not in the catalog", plan)))
    }

    /// Resolve the entitlement set for a plan (optionally unioned with a
    /// second plan for bundles), as of `today`.
    ///
    /// The always-open services are emitted exactly once regardless of how
    /// many plans are combined. Device allowances merge element-wise.
    pub fn entitlements_for(
        &self,
        plan: PlanId,
        second_plan: Option<PlanId>,
        today: NaiveDate,
    ) -> CoreResult<ProvisionProfile> {
        let primary = self.spec(plan)?;
        let secondary = match second_plan {
            Some(id) => Some(self.spec(id)?),
            None => None,
        };

        let (effective, _) = primary.window(today);

        let mut entitlements: Vec<Entitlement> = ALWAYS_OPEN_SERVICES
            .iter()
            .map(|&service_id| Entitlement {
                service_id,
                effective,
                expiry: None,
            })
            .collect();

        let mut allowance = primary.allowance;
        Self::push_plan_services(&mut entitlements, primary, today);
        if let Some(spec) = secondary {
            allowance = allowance.merged(spec.allowance);
            Self::push_plan_services(&mut entitlements, spec, today);
        }

        Ok(ProvisionProfile {
            allowance,
            entitlements,
        })
    }

    fn push_plan_services(out: &mut Vec<Entitlement>, spec: &PlanSpec, today: NaiveDate) {
        let (effective, expiry) = spec.window(today);
        for &service_id in spec.services {
            if out.iter().any(|e| e.service_id == service_id) {
                continue;
            }
            out.push(Entitlement {
                service_id,
                effective,
                expiry: Some(expiry),
            });
        }
    }
}

impl PlanSpec {
    /// Validity window for this plan's plan-bound services
    fn window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self.promo_window {
            Some((effective, expiry)) => (effective, expiry),
            None => (today, today + chrono::Duration::days(SUBSCRIPTION_WINDOW_DAYS)),
        }
    }
}
