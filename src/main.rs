use std::net::SocketAddr;
use std::sync::Arc;

use mongodb::Client;

use signalwatch::services::alert_engine::AlertEngine;
use signalwatch::services::alert_store::MongoAlertStore;
use signalwatch::services::finnhub::FinnhubClient;
use signalwatch::services::mailer::SmtpMailer;
use signalwatch::services::user_directory::MongoUserDirectory;
use signalwatch::{config, routes, services, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let settings = config::load();

    // Mongo connection
    let client = Client::with_uri_str(&settings.mongodb_uri)
        .await
        .expect("Failed to connect to MongoDB");
    let db = client.database(&settings.mongodb_db);

    if let Err(e) = services::db_init::ensure_indexes(&db).await {
        tracing::warn!("index setup failed: {e}");
    }

    let alerts = Arc::new(MongoAlertStore::new(&db));
    let directory = Arc::new(MongoUserDirectory::new(&db));
    let gateway = Arc::new(FinnhubClient::new(settings.finnhub_api_key.clone()));
    let mailer = Arc::new(SmtpMailer::new(&settings).expect("SMTP transport setup"));

    let engine = Arc::new(AlertEngine::new(
        alerts.clone(),
        directory,
        gateway,
        mailer,
    ));

    let state = AppState {
        db,
        settings: settings.clone(),
        alerts,
        engine,
    };

    services::alert_monitor::spawn_alert_scheduler(state.clone());

    let app = routes::app(state);

    let addr = SocketAddr::from((settings.host.parse::<std::net::IpAddr>().unwrap(), settings.port));
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
