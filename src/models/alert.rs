use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Direction of a price alert relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCondition {
    Above,
    Below,
}

impl AlertCondition {
    /// Inclusive at the boundary: an alert set exactly at the current
    /// price counts as reached.
    pub fn is_met(self, current_price: f64, target_price: f64) -> bool {
        match self {
            AlertCondition::Above => current_price >= target_price,
            AlertCondition::Below => current_price <= target_price,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertCondition::Above => "above",
            AlertCondition::Below => "below",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "above" => Some(AlertCondition::Above),
            "below" => Some(AlertCondition::Below),
            _ => None,
        }
    }
}

/// Stored field names stay camelCase (`userId`, `targetPrice`, `isActive`,
/// `createdAt`) to match the documents the original collection was seeded
/// with.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub user_id: ObjectId,
    pub symbol: String,

    pub condition: AlertCondition,
    pub target_price: f64,

    pub is_active: bool,

    pub created_at: i64,
    pub triggered_at: Option<i64>,
}
