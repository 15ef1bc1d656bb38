use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};

use crate::error::StoreError;
use crate::models::{Alert, AlertCondition};
use crate::services::alert_engine::AlertStore;

/// MongoDB-backed alert collection. The evaluation engine only sees the
/// `AlertStore` trait; the HTTP surface uses the inherent CRUD methods.
#[derive(Clone)]
pub struct MongoAlertStore {
    alerts: Collection<Alert>,
}

impl MongoAlertStore {
    pub fn new(db: &Database) -> Self {
        Self {
            alerts: db.collection::<Alert>("alerts"),
        }
    }

    pub async fn create(
        &self,
        user_id: ObjectId,
        symbol: &str,
        condition: AlertCondition,
        target_price: f64,
    ) -> Result<Alert, StoreError> {
        let alert = Alert {
            id: ObjectId::new(),
            user_id,
            symbol: symbol.to_uppercase(),
            condition,
            target_price,
            is_active: true,
            created_at: Utc::now().timestamp(),
            triggered_at: None,
        };

        self.alerts.insert_one(&alert, None).await?;

        Ok(alert)
    }

    /// Exact-match duplicate among a user's *active* alerts. Creation-time
    /// check only; the engine never suppresses duplicates at evaluation.
    pub async fn find_duplicate_active(
        &self,
        user_id: ObjectId,
        symbol: &str,
        condition: AlertCondition,
        target_price: f64,
    ) -> Result<Option<Alert>, StoreError> {
        let existing = self
            .alerts
            .find_one(
                doc! {
                    "userId": user_id,
                    "symbol": symbol.to_uppercase(),
                    "condition": condition.as_str(),
                    "targetPrice": target_price,
                    "isActive": true,
                },
                None,
            )
            .await?;

        Ok(existing)
    }

    pub async fn list_for_user(&self, user_id: ObjectId) -> Result<Vec<Alert>, StoreError> {
        let find_opts = FindOptions::builder()
            .sort(doc! { "createdAt": -1 })
            .build();

        let mut cursor = self
            .alerts
            .find(doc! { "userId": user_id }, find_opts)
            .await?;

        let mut items: Vec<Alert> = Vec::new();
        while let Some(res) = cursor.next().await {
            items.push(res?);
        }

        Ok(items)
    }

    /// Returns true if an alert was actually removed.
    pub async fn delete(&self, user_id: ObjectId, alert_id: ObjectId) -> Result<bool, StoreError> {
        let res = self
            .alerts
            .delete_one(doc! { "_id": alert_id, "userId": user_id }, None)
            .await?;

        Ok(res.deleted_count > 0)
    }
}

#[async_trait]
impl AlertStore for MongoAlertStore {
    async fn list_active(&self) -> Result<Vec<Alert>, StoreError> {
        let mut cursor = self.alerts.find(doc! { "isActive": true }, None).await?;

        let mut items: Vec<Alert> = Vec::new();
        while let Some(res) = cursor.next().await {
            items.push(res?);
        }

        Ok(items)
    }

    async fn deactivate(&self, alert_id: ObjectId) -> Result<bool, StoreError> {
        let now = Utc::now().timestamp();

        // isActive in the filter makes this a compare-and-set: of two
        // overlapping cycles firing the same alert, only one write matches.
        let res = self
            .alerts
            .update_one(
                doc! { "_id": alert_id, "isActive": true },
                doc! { "$set": { "isActive": false, "triggeredAt": now } },
                None,
            )
            .await?;

        Ok(res.matched_count > 0)
    }
}
