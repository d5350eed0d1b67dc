//! Plan-based limits and feature gates.
//!
//! Everything here is a pure function of a subscription row. A subscription
//! that is not active is treated as the free tier no matter which plan it
//! stores.

use crate::entities::subscription;
use crate::model::{BillingInterval, Feature, PlanId, SubscriptionStatus};

const FREE_GOAL_LIMIT: u64 = 3;
const PRO_GOAL_LIMIT: u64 = 25;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GoalLimit {
    Limited(u64),
    Unlimited,
}

impl GoalLimit {
    pub fn allows(&self, active_goals: u64) -> bool {
        match self {
            Self::Limited(limit) => active_goals < *limit,
            Self::Unlimited => true,
        }
    }
}

pub fn is_active(sub: &subscription::Model) -> bool {
    sub.status == SubscriptionStatus::Active.as_str()
}

pub fn is_paid(sub: &subscription::Model) -> bool {
    sub.plan_id != PlanId::Free.as_str() && is_active(sub)
}

pub fn goal_limit(sub: &subscription::Model) -> GoalLimit {
    if !is_active(sub) {
        return GoalLimit::Limited(FREE_GOAL_LIMIT);
    }
    match PlanId::parse(&sub.plan_id) {
        Some(PlanId::Pro) => GoalLimit::Limited(PRO_GOAL_LIMIT),
        Some(PlanId::Enterprise) => GoalLimit::Unlimited,
        Some(PlanId::Free) | None => GoalLimit::Limited(FREE_GOAL_LIMIT),
    }
}

fn plan_features(plan: PlanId) -> &'static [Feature] {
    match plan {
        PlanId::Free => &[],
        PlanId::Pro => &[Feature::Export],
        PlanId::Enterprise => &[Feature::Export, Feature::PrioritySupport],
    }
}

pub fn has_feature(sub: &subscription::Model, feature: Feature) -> bool {
    if !is_active(sub) {
        return false;
    }
    PlanId::parse(&sub.plan_id)
        .map(|plan| plan_features(plan).contains(&feature))
        .unwrap_or(false)
}

/// Renders e.g. `$9/month`; empty when there is no price.
pub fn format_price(sub: &subscription::Model) -> String {
    let Some(amount) = sub.amount.filter(|amount| *amount != 0) else {
        return String::new();
    };
    let symbol = match sub.currency.as_str() {
        "eur" => "€",
        "gbp" => "£",
        _ => "$",
    };
    let interval = match sub.interval.as_deref() {
        Some(value) if value == BillingInterval::Yearly.as_str() => "year",
        _ => "month",
    };
    format!("{symbol}{:.0}/{interval}", f64::from(amount) / 100.0)
}
