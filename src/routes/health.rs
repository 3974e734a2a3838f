use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub provider: ComponentHealth,
    pub store: ComponentHealth,
    pub analyzer: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    fn from_check(kind: String, check: Result<(), String>) -> Self {
        match check {
            Ok(()) => Self {
                status: "ok".to_string(),
                kind,
                detail: None,
            },
            Err(detail) => Self {
                status: "unconfigured".to_string(),
                kind,
                detail: Some(detail),
            },
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// GET /health: configuration readiness of provider, store and analyzer.
///
/// No outbound calls are made; an unconfigured analyzer does not degrade
/// the service since matching analysis is optional.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let provider = ComponentHealth::from_check(
        state.provider.kind().to_string(),
        state.provider.check_configuration().map_err(|e| e.to_string()),
    );
    let store = ComponentHealth::from_check(
        state.store.kind().to_string(),
        state.store.check_configuration().map_err(|e| e.to_string()),
    );
    let analyzer = ComponentHealth::from_check(
        "workers_ai".to_string(),
        if state.analyzer.is_configured() {
            Ok(())
        } else {
            Err("CF_ACCOUNT_ID / CF_API_TOKEN not set".to_string())
        },
    );

    let all_healthy = provider.is_ok() && store.is_ok();
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            provider,
            store,
            analyzer,
        },
    };

    (status_code, Json(response))
}
