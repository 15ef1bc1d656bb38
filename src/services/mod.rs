pub mod finnhub;
pub mod db_init;

pub mod alert_store;
pub mod user_directory;
pub mod mailer;

pub mod alert_engine;
pub mod alert_monitor;
