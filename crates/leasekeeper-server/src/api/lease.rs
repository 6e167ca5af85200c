//! Lease endpoints
//!
//! - `POST /v1/leases` queues an acquire request
//! - `GET /v1/leases/{reference}` returns one record
//! - `GET /v1/leases?tenant=&status=` lists records

use actix_web::{HttpResponse, Responder, Scope, get, post, web};
use tracing::{info, warn};

use leasekeeper_common::error::{EVENT_QUEUE_CLOSED, LEASE_NOT_FOUND, PARAMETER_VALIDATE_ERROR};
use leasekeeper_common::utils::is_valid_reference;
use leasekeeper_lease::{AcquireRequest, LeaseEvent};
use leasekeeper_persistence::{LeaseFilter, LeaseRecord};

use crate::metrics::record_request;
use crate::model::response::error_response;
use crate::model::{AppState, Result};

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListParam {
    #[serde(default)]
    tenant: Option<String>,
    #[serde(default)]
    status: Option<leasekeeper_common::LeaseStatus>,
}

/// POST /v1/leases
#[post("")]
async fn acquire(data: web::Data<AppState>, body: web::Json<AcquireRequest>) -> impl Responder {
    record_request("acquire");
    let request = body.into_inner();

    if !is_valid_reference(&request.reference) {
        return Result::<()>::http_error(
            400,
            &PARAMETER_VALIDATE_ERROR,
            format!("invalid reference '{}'", request.reference),
        );
    }
    if request.duration == 0 {
        return Result::<()>::http_error(
            400,
            &PARAMETER_VALIDATE_ERROR,
            "duration must be greater than 0",
        );
    }

    let reference = request.reference.clone();
    if data.events.send(LeaseEvent::Acquire(request)).await.is_err() {
        warn!(reference = %reference, "Acquire rejected, event loop stopped");
        return Result::<()>::http_error(503, &EVENT_QUEUE_CLOSED, EVENT_QUEUE_CLOSED.message);
    }

    info!(reference = %reference, "Acquire request queued");
    Result::<String>::http_response(202, 0, "accepted".to_string(), reference)
}

/// GET /v1/leases/{reference}
#[get("/{reference}")]
async fn get_lease(data: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    record_request("get_lease");
    let reference = path.into_inner();

    match data.manager.lease(&reference).await {
        Ok(Some(record)) => Result::<LeaseRecord>::http_success(record),
        Ok(None) => Result::<()>::http_error(
            404,
            &LEASE_NOT_FOUND,
            format!("lease '{}' not found", reference),
        ),
        Err(e) => error_response(e),
    }
}

/// GET /v1/leases
#[get("")]
async fn list_leases(data: web::Data<AppState>, params: web::Query<ListParam>) -> HttpResponse {
    record_request("list_leases");
    let params = params.into_inner();
    let filter = LeaseFilter {
        reference: None,
        tenant: params.tenant.filter(|t| !t.is_empty()),
        status: params.status,
    };

    match data.manager.leases(&filter).await {
        Ok(records) => Result::<Vec<LeaseRecord>>::http_success(records),
        Err(e) => error_response(e),
    }
}

pub fn routes() -> Scope {
    web::scope("/leases")
        .service(acquire)
        .service(list_leases)
        .service(get_lease)
}
