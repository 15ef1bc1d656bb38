//! Library entrypoint for Signalwatch.
//!
//! This file exists mainly to make controller and engine tests easy
//! (integration tests under `tests/` can import the app state, routers,
//! controllers, services).

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod models;

pub mod services;

pub mod controllers;
pub mod routes;

use services::alert_engine::AlertEngine;
use services::alert_store::MongoAlertStore;

#[derive(Clone)]
pub struct AppState {
    pub db: mongodb::Database,
    pub settings: config::Settings,
    pub alerts: Arc<MongoAlertStore>,
    pub engine: Arc<AlertEngine>,
}
