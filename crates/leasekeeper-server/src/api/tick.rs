//! External tick intake

use actix_web::{HttpResponse, post, web};
use serde::Deserialize;
use tracing::warn;

use leasekeeper_common::Tick;
use leasekeeper_common::error::EVENT_QUEUE_CLOSED;
use leasekeeper_lease::LeaseEvent;

use crate::metrics::record_request;
use crate::model::{AppState, Result};

#[derive(Debug, Deserialize)]
pub struct TickBody {
    pub index: Tick,
}

/// POST /v1/ticks
///
/// Stale or repeated indexes are accepted here and dropped by the manager.
#[post("/ticks")]
pub async fn push_tick(data: web::Data<AppState>, body: web::Json<TickBody>) -> HttpResponse {
    record_request("tick");
    let index = body.index;
    if data.events.send(LeaseEvent::Tick { index }).await.is_err() {
        warn!(index, "Tick rejected, event loop stopped");
        return Result::<()>::http_error(503, &EVENT_QUEUE_CLOSED, EVENT_QUEUE_CLOSED.message);
    }
    Result::<Tick>::http_response(202, 0, "accepted".to_string(), index)
}
