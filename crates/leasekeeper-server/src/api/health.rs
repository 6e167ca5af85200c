//! Health and metrics endpoints

use actix_web::{HttpResponse, get, web};
use serde::Serialize;
use tracing::warn;

use leasekeeper_common::{Moment, Tick};

use crate::model::{AppState, Result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub running: bool,
    pub current_tick: Tick,
    pub last_tick: Option<Tick>,
    pub last_heartbeat_moment: Option<Moment>,
    pub active_leases: usize,
    pub storage: String,
    pub storage_healthy: bool,
}

/// GET /v1/health
#[get("/health")]
pub async fn health(data: web::Data<AppState>) -> HttpResponse {
    let manager = &data.manager;
    let storage_healthy = match manager.store().health_check().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Lease store health check failed");
            false
        }
    };
    let running = manager.is_running();
    let up = running && storage_healthy;
    let response = HealthResponse {
        status: if up { "UP" } else { "DOWN" },
        running,
        current_tick: manager.current_tick(),
        last_tick: manager.last_tick(),
        last_heartbeat_moment: manager.last_heartbeat_moment(),
        active_leases: manager.schedule().len(),
        storage: manager.store().storage_mode().to_string(),
        storage_healthy,
    };

    if up {
        Result::<HealthResponse>::http_success(response)
    } else {
        Result::<HealthResponse>::http_response(503, 0, "unhealthy".to_string(), response)
    }
}

/// GET /metrics
#[get("/metrics")]
pub async fn metrics(data: web::Data<AppState>) -> HttpResponse {
    match &data.prometheus {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::NotFound().finish(),
    }
}
