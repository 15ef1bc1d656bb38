use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{stream, StreamExt};
use mongodb::bson::oid::ObjectId;

use crate::error::{DispatchError, EngineError, StoreError};
use crate::models::{Alert, AlertCondition, UserRef};

/// Upper bound on simultaneous quote requests per cycle, so a large batch
/// of distinct symbols does not hammer the quote API all at once.
const MAX_CONCURRENT_QUOTES: usize = 4;

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Alert>, StoreError>;

    /// Flip one alert to inactive. Keyed by id with the active flag in the
    /// filter, so overlapping cycles racing on the same alert resolve to a
    /// single winner. Returns false when the alert was already inactive.
    async fn deactivate(&self, alert_id: ObjectId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, user_id: ObjectId) -> Result<Option<UserRef>, StoreError>;
}

#[async_trait]
pub trait PriceGateway: Send + Sync {
    /// Current price for a symbol, or `None` when no usable quote is
    /// available right now. Never an error: a missing price is a normal
    /// per-cycle condition, not a fault.
    async fn get_price(&self, symbol: &str) -> Option<f64>;
}

/// Everything the notification email needs, already resolved.
#[derive(Debug, Clone)]
pub struct PriceAlertEmail {
    pub email: String,
    pub symbol: String,
    /// Company label, best effort. Falls back to the symbol itself.
    pub company: String,
    pub target_price: f64,
    pub current_price: f64,
    pub condition: AlertCondition,
    pub generated_at: String,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send_price_alert(&self, alert: &PriceAlertEmail) -> Result<(), DispatchError>;
}

/// What happened to a single alert during one cycle. Exactly one of these
/// is produced per loaded alert; failure isolation is carried by the value,
/// not by catching panics across alert boundaries.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertOutcome {
    /// Condition met, notification dispatched, alert deactivated.
    Fired,
    /// Condition not met; the alert stays active for future cycles.
    Holding,
    /// Owning user could not be resolved; the alert sat this cycle out.
    SkippedNoUser,
    /// No usable price for the symbol this cycle; retried next cycle.
    DeferredNoPrice,
    /// Condition met but the notification failed to send; the alert stays
    /// active so a later cycle can retry the send.
    DeferredDispatch(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSummary {
    pub evaluated: usize,
    pub fired: usize,
}

impl CycleSummary {
    pub fn message(&self) -> String {
        format!(
            "Evaluated {} alerts. Triggered {} emails.",
            self.evaluated, self.fired
        )
    }
}

pub struct AlertEngine {
    store: Arc<dyn AlertStore>,
    directory: Arc<dyn UserDirectory>,
    gateway: Arc<dyn PriceGateway>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl AlertEngine {
    pub fn new(
        store: Arc<dyn AlertStore>,
        directory: Arc<dyn UserDirectory>,
        gateway: Arc<dyn PriceGateway>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            directory,
            gateway,
            dispatcher,
        }
    }

    /// Process every active alert once. Per-alert problems (missing price,
    /// missing user, failed send) are logged and isolated; only a failure
    /// to load the active set at all aborts the cycle.
    pub async fn run_evaluation_cycle(&self) -> Result<CycleSummary, EngineError> {
        let alerts = self.store.list_active().await?;

        if alerts.is_empty() {
            return Ok(CycleSummary {
                evaluated: 0,
                fired: 0,
            });
        }

        let users = self.resolve_users(&alerts).await;
        let prices = self.fetch_prices(&alerts, &users).await;

        let mut fired = 0usize;
        for alert in &alerts {
            let outcome = self.evaluate_alert(alert, &users, &prices).await;
            match &outcome {
                AlertOutcome::Fired => {
                    fired += 1;
                    tracing::info!(
                        alert_id = %alert.id,
                        symbol = %alert.symbol,
                        "alert fired"
                    );
                }
                AlertOutcome::Holding => {}
                AlertOutcome::SkippedNoUser => {
                    tracing::warn!(
                        alert_id = %alert.id,
                        user_id = %alert.user_id,
                        "skipping alert: user not found"
                    );
                }
                AlertOutcome::DeferredNoPrice => {
                    tracing::warn!(
                        alert_id = %alert.id,
                        symbol = %alert.symbol,
                        "deferring alert: no price this cycle"
                    );
                }
                AlertOutcome::DeferredDispatch(reason) => {
                    tracing::warn!(
                        alert_id = %alert.id,
                        symbol = %alert.symbol,
                        "deferring alert: notification failed: {reason}"
                    );
                }
            }
        }

        Ok(CycleSummary {
            evaluated: alerts.len(),
            fired,
        })
    }

    /// One directory lookup per distinct user id, not per alert.
    async fn resolve_users(&self, alerts: &[Alert]) -> HashMap<ObjectId, UserRef> {
        let user_ids: HashSet<ObjectId> = alerts.iter().map(|a| a.user_id).collect();

        let mut users = HashMap::with_capacity(user_ids.len());
        for user_id in user_ids {
            match self.directory.find_user(user_id).await {
                Ok(Some(user)) => {
                    users.insert(user_id, user);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(user_id = %user_id, "user lookup failed: {e}");
                }
            }
        }

        users
    }

    /// One quote per distinct symbol, fetched with bounded fan-out.
    /// Symbols whose owners all failed user resolution are not fetched.
    async fn fetch_prices(
        &self,
        alerts: &[Alert],
        users: &HashMap<ObjectId, UserRef>,
    ) -> HashMap<String, f64> {
        let symbols: BTreeSet<String> = alerts
            .iter()
            .filter(|a| users.contains_key(&a.user_id))
            .map(|a| a.symbol.clone())
            .collect();

        let gateway = Arc::clone(&self.gateway);
        let mut quotes = stream::iter(symbols)
            .map(move |symbol| {
                let gateway = Arc::clone(&gateway);
                async move {
                    let price = gateway.get_price(&symbol).await;
                    (symbol, price)
                }
            })
            .buffer_unordered(MAX_CONCURRENT_QUOTES);

        let mut prices = HashMap::new();
        while let Some((symbol, price)) = quotes.next().await {
            match price {
                Some(p) => {
                    prices.insert(symbol, p);
                }
                None => tracing::warn!(symbol = %symbol, "price unavailable this cycle"),
            }
        }

        prices
    }

    async fn evaluate_alert(
        &self,
        alert: &Alert,
        users: &HashMap<ObjectId, UserRef>,
        prices: &HashMap<String, f64>,
    ) -> AlertOutcome {
        let Some(user) = users.get(&alert.user_id) else {
            return AlertOutcome::SkippedNoUser;
        };

        let Some(&current_price) = prices.get(&alert.symbol) else {
            return AlertOutcome::DeferredNoPrice;
        };

        if !alert.condition.is_met(current_price, alert.target_price) {
            return AlertOutcome::Holding;
        }

        let email = PriceAlertEmail {
            email: user.email.clone(),
            symbol: alert.symbol.clone(),
            company: alert.symbol.clone(),
            target_price: alert.target_price,
            current_price,
            condition: alert.condition,
            generated_at: Utc::now().format("%A, %B %d, %Y at %H:%M UTC").to_string(),
        };

        if let Err(e) = self.dispatcher.send_price_alert(&email).await {
            return AlertOutcome::DeferredDispatch(e.to_string());
        }

        // Deactivate only once the send is confirmed. If this write is lost
        // the user may get the same email again next cycle, but a fired
        // alert is never silently dropped without its notification.
        match self.store.deactivate(alert.id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(alert_id = %alert.id, "alert was already inactive");
            }
            Err(e) => {
                tracing::error!(alert_id = %alert.id, "failed to deactivate fired alert: {e}");
            }
        }

        AlertOutcome::Fired
    }
}
