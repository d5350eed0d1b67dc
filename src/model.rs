use serde::{Deserialize, Serialize};

/// Number of steps every goal is created with.
pub const TRACK_LENGTH: i32 = 100;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum GoalStatus {
    Active,
    Completed,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum GoalSort {
    /// Most recently updated first.
    #[default]
    Recent,
    /// Highest `current_step` first, ties broken by most recently updated.
    Progress,
    /// Case-insensitive title, ascending.
    Title,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PlanId {
    Free,
    Pro,
    Enterprise,
}

impl PlanId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Provider {
    Polar,
    Stripe,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Polar => "polar",
            Self::Stripe => "stripe",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum BillingInterval {
    Monthly,
    Yearly,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Feature {
    Export,
    PrioritySupport,
}

impl Feature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Export => "export",
            Self::PrioritySupport => "priority_support",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GoalInput {
    pub title: String,
    pub description: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GoalChanges {
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanChange {
    pub plan: PlanId,
    pub provider: Provider,
    pub provider_subscription_id: Option<String>,
    pub interval: Option<BillingInterval>,
    pub amount: Option<i32>,
    pub currency: String,
}
