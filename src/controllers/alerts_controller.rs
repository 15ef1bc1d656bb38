use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::json;

use crate::{models::{Alert, AlertCondition}, AppState};

fn alert_json(a: &Alert) -> serde_json::Value {
    json!({
        "id": a.id.to_hex(),
        "userId": a.user_id.to_hex(),
        "symbol": a.symbol,
        "condition": a.condition.as_str(),
        "targetPrice": a.target_price,
        "isActive": a.is_active,
        "createdAt": a.created_at,
        "triggeredAt": a.triggered_at,
    })
}

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
}

fn db_error(e: impl std::fmt::Display) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("db error: {e}") })),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct CreateAlertBody {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub symbol: String,
    pub condition: String,
    #[serde(rename = "targetPrice")]
    pub target_price: f64,
}

// POST /alerts
pub async fn post_create_alert(
    State(state): State<AppState>,
    Json(body): Json<CreateAlertBody>,
) -> Response {
    let Ok(user_id) = ObjectId::parse_str(&body.user_id) else {
        return bad_request("userId is not a valid id");
    };

    let symbol = body.symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return bad_request("symbol must not be empty");
    }

    let Some(condition) = AlertCondition::parse(&body.condition) else {
        return bad_request("condition must be \"above\" or \"below\"");
    };

    if !body.target_price.is_finite() || body.target_price <= 0.0 {
        return bad_request("targetPrice must be a positive number");
    }

    match state
        .alerts
        .find_duplicate_active(user_id, &symbol, condition, body.target_price)
        .await
    {
        Ok(Some(_)) => {
            return (
                StatusCode::CONFLICT,
                Json(json!({ "error": "An identical active alert already exists." })),
            )
                .into_response();
        }
        Ok(None) => {}
        Err(e) => return db_error(e),
    }

    match state
        .alerts
        .create(user_id, &symbol, condition, body.target_price)
        .await
    {
        Ok(alert) => (StatusCode::CREATED, Json(alert_json(&alert))).into_response(),
        Err(e) => db_error(e),
    }
}

#[derive(Deserialize)]
pub struct UserScope {
    #[serde(rename = "userId")]
    pub user_id: String,
}

// GET /alerts?userId=...
pub async fn get_alerts(
    State(state): State<AppState>,
    Query(scope): Query<UserScope>,
) -> Response {
    let Ok(user_id) = ObjectId::parse_str(&scope.user_id) else {
        return bad_request("userId is not a valid id");
    };

    match state.alerts.list_for_user(user_id).await {
        Ok(alerts) => {
            let items: Vec<serde_json::Value> = alerts.iter().map(alert_json).collect();
            (StatusCode::OK, Json(json!({ "alerts": items }))).into_response()
        }
        Err(e) => db_error(e),
    }
}

// DELETE /alerts/:id?userId=...
pub async fn delete_alert(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(scope): Query<UserScope>,
) -> Response {
    let Ok(alert_id) = ObjectId::parse_str(&id) else {
        return bad_request("bad id");
    };
    let Ok(user_id) = ObjectId::parse_str(&scope.user_id) else {
        return bad_request("userId is not a valid id");
    };

    match state.alerts.delete(user_id, alert_id).await {
        Ok(true) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "alert not found" })),
        )
            .into_response(),
        Err(e) => db_error(e),
    }
}

// POST /alerts/check — on-demand evaluation cycle, same entry point the
// hourly scheduler uses.
pub async fn post_check_alerts(State(state): State<AppState>) -> Response {
    match state.engine.run_evaluation_cycle().await {
        Ok(summary) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": summary.message() })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "success": false, "message": e.to_string() })),
        )
            .into_response(),
    }
}
