use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;

use signalwatch::error::{DispatchError, EngineError, StoreError};
use signalwatch::models::{Alert, AlertCondition, UserRef};
use signalwatch::services::alert_engine::{
    AlertEngine, AlertStore, NotificationDispatcher, PriceAlertEmail, PriceGateway, UserDirectory,
};

// ---------------- In-memory collaborators ----------------

struct MemoryStore {
    alerts: Mutex<Vec<Alert>>,
    fail_list: bool,
}

impl MemoryStore {
    fn new(alerts: Vec<Alert>) -> Arc<Self> {
        Arc::new(Self {
            alerts: Mutex::new(alerts),
            fail_list: false,
        })
    }

    fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            alerts: Mutex::new(Vec::new()),
            fail_list: true,
        })
    }

    fn is_active(&self, id: ObjectId) -> bool {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.is_active)
            .unwrap_or(false)
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn list_active(&self) -> Result<Vec<Alert>, StoreError> {
        if self.fail_list {
            return Err(StoreError::Database("connection refused".to_string()));
        }

        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.is_active)
            .cloned()
            .collect())
    }

    async fn deactivate(&self, alert_id: ObjectId) -> Result<bool, StoreError> {
        let mut alerts = self.alerts.lock().unwrap();
        match alerts.iter_mut().find(|a| a.id == alert_id && a.is_active) {
            Some(a) => {
                a.is_active = false;
                a.triggered_at = Some(0);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

struct MemoryDirectory {
    users: HashMap<ObjectId, UserRef>,
}

impl MemoryDirectory {
    fn new(users: Vec<UserRef>) -> Arc<Self> {
        Arc::new(Self {
            users: users.into_iter().map(|u| (u.id, u)).collect(),
        })
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn find_user(&self, user_id: ObjectId) -> Result<Option<UserRef>, StoreError> {
        Ok(self.users.get(&user_id).cloned())
    }
}

struct QuoteFeed {
    prices: HashMap<String, f64>,
    calls: Mutex<Vec<String>>,
}

impl QuoteFeed {
    fn new(prices: &[(&str, f64)]) -> Arc<Self> {
        Arc::new(Self {
            prices: prices
                .iter()
                .map(|(s, p)| (s.to_string(), *p))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl PriceGateway for QuoteFeed {
    async fn get_price(&self, symbol: &str) -> Option<f64> {
        self.calls.lock().unwrap().push(symbol.to_string());
        self.prices.get(symbol).copied()
    }
}

struct MailLog {
    sent: Mutex<Vec<PriceAlertEmail>>,
    fail: AtomicBool,
}

impl MailLog {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        })
    }

    fn failing() -> Arc<Self> {
        let log = Self::new();
        log.fail.store(true, Ordering::SeqCst);
        log
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationDispatcher for MailLog {
    async fn send_price_alert(&self, alert: &PriceAlertEmail) -> Result<(), DispatchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DispatchError::Transport("smtp timeout".to_string()));
        }

        self.sent.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

// ---------------- Helpers ----------------

fn alert(user_id: ObjectId, symbol: &str, condition: AlertCondition, target: f64) -> Alert {
    Alert {
        id: ObjectId::new(),
        user_id,
        symbol: symbol.to_string(),
        condition,
        target_price: target,
        is_active: true,
        created_at: 0,
        triggered_at: None,
    }
}

fn user(id: ObjectId, email: &str) -> UserRef {
    UserRef {
        id,
        email: email.to_string(),
        name: None,
    }
}

fn engine(
    store: &Arc<MemoryStore>,
    directory: &Arc<MemoryDirectory>,
    feed: &Arc<QuoteFeed>,
    mail: &Arc<MailLog>,
) -> AlertEngine {
    AlertEngine::new(
        store.clone(),
        directory.clone(),
        feed.clone(),
        mail.clone(),
    )
}

// ---------------- Cycle behavior ----------------

#[tokio::test]
async fn above_alert_fires_and_deactivates() {
    let uid = ObjectId::new();
    let a = alert(uid, "MSFT", AlertCondition::Above, 300.0);
    let a_id = a.id;

    let store = MemoryStore::new(vec![a]);
    let directory = MemoryDirectory::new(vec![user(uid, "one@example.com")]);
    let feed = QuoteFeed::new(&[("MSFT", 305.0)]);
    let mail = MailLog::new();

    let summary = engine(&store, &directory, &feed, &mail)
        .run_evaluation_cycle()
        .await
        .unwrap();

    assert_eq!(summary.evaluated, 1);
    assert_eq!(summary.fired, 1);
    assert!(!store.is_active(a_id));
    assert_eq!(mail.sent_count(), 1);

    let sent = mail.sent.lock().unwrap();
    assert_eq!(sent[0].email, "one@example.com");
    assert_eq!(sent[0].symbol, "MSFT");
    assert_eq!(sent[0].target_price, 300.0);
    assert_eq!(sent[0].current_price, 305.0);
    assert_eq!(sent[0].condition, AlertCondition::Above);
}

#[tokio::test]
async fn target_touching_price_fires() {
    let uid = ObjectId::new();
    let a = alert(uid, "MSFT", AlertCondition::Above, 300.0);
    let a_id = a.id;

    let store = MemoryStore::new(vec![a]);
    let directory = MemoryDirectory::new(vec![user(uid, "one@example.com")]);
    let feed = QuoteFeed::new(&[("MSFT", 300.0)]);
    let mail = MailLog::new();

    let summary = engine(&store, &directory, &feed, &mail)
        .run_evaluation_cycle()
        .await
        .unwrap();

    assert_eq!(summary.fired, 1);
    assert!(!store.is_active(a_id));
}

#[tokio::test]
async fn below_alert_fires_and_deactivates() {
    let uid = ObjectId::new();
    let a = alert(uid, "AAPL", AlertCondition::Below, 150.0);
    let a_id = a.id;

    let store = MemoryStore::new(vec![a]);
    let directory = MemoryDirectory::new(vec![user(uid, "one@example.com")]);
    let feed = QuoteFeed::new(&[("AAPL", 148.5)]);
    let mail = MailLog::new();

    let summary = engine(&store, &directory, &feed, &mail)
        .run_evaluation_cycle()
        .await
        .unwrap();

    assert_eq!(summary.fired, 1);
    assert!(!store.is_active(a_id));
    assert_eq!(mail.sent_count(), 1);
}

#[tokio::test]
async fn non_triggering_alert_stays_active_without_email() {
    let uid = ObjectId::new();
    let a = alert(uid, "MSFT", AlertCondition::Above, 300.0);
    let a_id = a.id;

    let store = MemoryStore::new(vec![a]);
    let directory = MemoryDirectory::new(vec![user(uid, "one@example.com")]);
    let feed = QuoteFeed::new(&[("MSFT", 299.99)]);
    let mail = MailLog::new();

    let summary = engine(&store, &directory, &feed, &mail)
        .run_evaluation_cycle()
        .await
        .unwrap();

    assert_eq!(summary.evaluated, 1);
    assert_eq!(summary.fired, 0);
    assert!(store.is_active(a_id));
    assert_eq!(mail.sent_count(), 0);
}

#[tokio::test]
async fn duplicate_alerts_both_fire_and_quotes_are_deduplicated() {
    let u1 = ObjectId::new();
    let u2 = ObjectId::new();

    let a = alert(u1, "MSFT", AlertCondition::Above, 300.0);
    let b = alert(u2, "MSFT", AlertCondition::Above, 300.0);
    let c = alert(u1, "AAPL", AlertCondition::Below, 150.0);
    let c_id = c.id;

    let store = MemoryStore::new(vec![a, b, c]);
    let directory = MemoryDirectory::new(vec![
        user(u1, "one@example.com"),
        user(u2, "two@example.com"),
    ]);
    let feed = QuoteFeed::new(&[("MSFT", 305.0), ("AAPL", 160.0)]);
    let mail = MailLog::new();

    let summary = engine(&store, &directory, &feed, &mail)
        .run_evaluation_cycle()
        .await
        .unwrap();

    assert_eq!(summary.evaluated, 3);
    assert_eq!(summary.fired, 2);

    // AAPL at 160 is above the 150 "below" target: stays active.
    assert!(store.is_active(c_id));

    // Two distinct symbols => exactly two gateway calls, never three.
    assert_eq!(feed.call_count(), 2);
    let mut calls = feed.calls.lock().unwrap().clone();
    calls.sort();
    assert_eq!(calls, vec!["AAPL".to_string(), "MSFT".to_string()]);

    assert_eq!(mail.sent_count(), 2);
}

#[tokio::test]
async fn unresolved_user_is_skipped_and_alert_survives() {
    let known = ObjectId::new();
    let orphan = ObjectId::new();

    let a = alert(known, "MSFT", AlertCondition::Above, 300.0);
    let b = alert(orphan, "TSLA", AlertCondition::Above, 100.0);
    let b_id = b.id;

    let store = MemoryStore::new(vec![a, b]);
    let directory = MemoryDirectory::new(vec![user(known, "one@example.com")]);
    let feed = QuoteFeed::new(&[("MSFT", 305.0), ("TSLA", 500.0)]);
    let mail = MailLog::new();

    let summary = engine(&store, &directory, &feed, &mail)
        .run_evaluation_cycle()
        .await
        .unwrap();

    assert_eq!(summary.evaluated, 2);
    assert_eq!(summary.fired, 1);

    // The orphaned alert is not fired, not deleted, and its symbol is not
    // even worth a quote request this cycle.
    assert!(store.is_active(b_id));
    assert_eq!(feed.call_count(), 1);
    assert_eq!(mail.sent_count(), 1);
}

#[tokio::test]
async fn missing_price_defers_alert_to_next_cycle() {
    let uid = ObjectId::new();
    let a = alert(uid, "MSFT", AlertCondition::Above, 300.0);
    let a_id = a.id;

    let store = MemoryStore::new(vec![a]);
    let directory = MemoryDirectory::new(vec![user(uid, "one@example.com")]);
    let mail = MailLog::new();

    // Cycle 1: feed knows nothing about MSFT.
    let empty_feed = QuoteFeed::new(&[]);
    let summary = engine(&store, &directory, &empty_feed, &mail)
        .run_evaluation_cycle()
        .await
        .unwrap();

    assert_eq!(summary.evaluated, 1);
    assert_eq!(summary.fired, 0);
    assert!(store.is_active(a_id));
    assert_eq!(mail.sent_count(), 0);

    // Cycle 2: price is back, the alert fires normally.
    let feed = QuoteFeed::new(&[("MSFT", 310.0)]);
    let summary = engine(&store, &directory, &feed, &mail)
        .run_evaluation_cycle()
        .await
        .unwrap();

    assert_eq!(summary.fired, 1);
    assert!(!store.is_active(a_id));
}

#[tokio::test]
async fn rerun_after_fire_is_a_no_op() {
    let uid = ObjectId::new();
    let a = alert(uid, "MSFT", AlertCondition::Above, 300.0);
    let a_id = a.id;

    let store = MemoryStore::new(vec![a]);
    let directory = MemoryDirectory::new(vec![user(uid, "one@example.com")]);
    let feed = QuoteFeed::new(&[("MSFT", 305.0)]);
    let mail = MailLog::new();

    let eng = engine(&store, &directory, &feed, &mail);

    let first = eng.run_evaluation_cycle().await.unwrap();
    assert_eq!(first.fired, 1);

    let second = eng.run_evaluation_cycle().await.unwrap();
    assert_eq!(second.evaluated, 0);
    assert_eq!(second.fired, 0);

    assert!(!store.is_active(a_id));
    assert_eq!(mail.sent_count(), 1);
}

#[tokio::test]
async fn empty_alert_set_makes_no_external_calls() {
    let store = MemoryStore::new(vec![]);
    let directory = MemoryDirectory::new(vec![]);
    let feed = QuoteFeed::new(&[("MSFT", 305.0)]);
    let mail = MailLog::new();

    let summary = engine(&store, &directory, &feed, &mail)
        .run_evaluation_cycle()
        .await
        .unwrap();

    assert_eq!(summary.evaluated, 0);
    assert_eq!(summary.fired, 0);
    assert_eq!(feed.call_count(), 0);
    assert_eq!(mail.sent_count(), 0);
}

#[tokio::test]
async fn partial_quote_outage_only_defers_affected_alerts() {
    let uid = ObjectId::new();

    // Three alerts share DOWN (no quote available), seven are spread over
    // symbols the feed knows, all set to fire.
    let mut alerts = vec![
        alert(uid, "DOWN", AlertCondition::Above, 10.0),
        alert(uid, "DOWN", AlertCondition::Below, 500.0),
        alert(uid, "DOWN", AlertCondition::Above, 20.0),
    ];
    let down_ids: Vec<ObjectId> = alerts.iter().map(|a| a.id).collect();

    let live = ["A1", "A2", "A3", "A4", "A5", "A6", "A7"];
    for sym in live {
        alerts.push(alert(uid, sym, AlertCondition::Above, 50.0));
    }

    let store = MemoryStore::new(alerts);
    let directory = MemoryDirectory::new(vec![user(uid, "one@example.com")]);

    let quoted: Vec<(&str, f64)> = live.iter().map(|s| (*s, 60.0)).collect();
    let feed = QuoteFeed::new(&quoted);
    let mail = MailLog::new();

    let summary = engine(&store, &directory, &feed, &mail)
        .run_evaluation_cycle()
        .await
        .unwrap();

    assert_eq!(summary.evaluated, 10);
    assert_eq!(summary.fired, 7);
    assert_eq!(mail.sent_count(), 7);

    for id in down_ids {
        assert!(store.is_active(id));
    }

    // 8 distinct symbols (DOWN + 7 live), one lookup each.
    assert_eq!(feed.call_count(), 8);
}

#[tokio::test]
async fn failed_dispatch_keeps_alert_active_for_retry() {
    let uid = ObjectId::new();
    let a = alert(uid, "MSFT", AlertCondition::Above, 300.0);
    let a_id = a.id;

    let store = MemoryStore::new(vec![a]);
    let directory = MemoryDirectory::new(vec![user(uid, "one@example.com")]);
    let feed = QuoteFeed::new(&[("MSFT", 305.0)]);

    // Cycle 1: SMTP is down. The condition holds but the alert must stay
    // active — deactivation happens only after a confirmed send.
    let mail = MailLog::failing();
    let summary = engine(&store, &directory, &feed, &mail)
        .run_evaluation_cycle()
        .await
        .unwrap();

    assert_eq!(summary.evaluated, 1);
    assert_eq!(summary.fired, 0);
    assert!(store.is_active(a_id));
    assert_eq!(mail.sent_count(), 0);

    // Cycle 2: SMTP is back, the send goes out and the alert retires.
    mail.fail.store(false, Ordering::SeqCst);
    let summary = engine(&store, &directory, &feed, &mail)
        .run_evaluation_cycle()
        .await
        .unwrap();

    assert_eq!(summary.fired, 1);
    assert!(!store.is_active(a_id));
    assert_eq!(mail.sent_count(), 1);
}

#[tokio::test]
async fn store_outage_aborts_the_cycle() {
    let store = MemoryStore::unavailable();
    let directory = MemoryDirectory::new(vec![]);
    let feed = QuoteFeed::new(&[]);
    let mail = MailLog::new();

    let err = engine(&store, &directory, &feed, &mail)
        .run_evaluation_cycle()
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::LoadAlerts(_)));
    assert_eq!(feed.call_count(), 0);
    assert_eq!(mail.sent_count(), 0);
}
