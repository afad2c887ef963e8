//! Liveness and readiness probes.
//!
//! `/healthz` answers as long as the process serves requests. `/readyz`
//! additionally proves the catalog answers queries and the content store
//! accepts a write.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::BTreeMap;

/// `GET /healthz`: no I/O, always 200.
pub async fn healthz() -> impl IntoResponse {
    Json(Probe {
        status: "ok",
        checks: BTreeMap::new(),
    })
}

/// `GET /readyz`: 200 when every dependency check passes, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert("sqlite", catalog_check(&state).await);
    checks.insert(
        "storage",
        Check::from_result(state.store.ready().await.map_err(|e| e.to_string())),
    );

    let ready = checks.values().all(|c| c.ok);
    let code = if ready {
        StatusCode::OK
    } else {
        tracing::warn!(?checks, "readiness check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };
    let status = if ready { "ok" } else { "error" };
    (code, Json(Probe { status, checks }))
}

async fn catalog_check(state: &AppState) -> Check {
    let probe = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*state.db)
        .await;
    Check::from_result(match probe {
        Ok(1) => Ok(()),
        Ok(other) => Err(format!("unexpected probe result {other}")),
        Err(err) => Err(err.to_string()),
    })
}

#[derive(Serialize)]
struct Probe {
    status: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    checks: BTreeMap<&'static str, Check>,
}

#[derive(Serialize, Debug)]
struct Check {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl Check {
    fn from_result(result: Result<(), String>) -> Self {
        Self {
            ok: result.is_ok(),
            error: result.err(),
        }
    }
}
