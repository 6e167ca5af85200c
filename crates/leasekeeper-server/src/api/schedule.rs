//! Expiry schedule inspection

use actix_web::{HttpResponse, Scope, get, web};

use leasekeeper_lease::ExpiryEntry;
use leasekeeper_persistence::LeaseRecord;

use crate::metrics::record_request;
use crate::model::response::error_response;
use crate::model::{AppState, Result};

/// GET /v1/schedule
///
/// Entries ordered by expiry moment, then reference.
#[get("")]
async fn list_schedule(data: web::Data<AppState>) -> HttpResponse {
    record_request("schedule");
    Result::<Vec<ExpiryEntry>>::http_success(data.manager.schedule())
}

/// GET /v1/schedule/orphaned
///
/// Acquired records with no schedule entry: expiry was attempted but the
/// resource could not be destroyed.
#[get("/orphaned")]
async fn list_orphaned(data: web::Data<AppState>) -> HttpResponse {
    record_request("orphaned");
    match data.manager.orphaned().await {
        Ok(records) => Result::<Vec<LeaseRecord>>::http_success(records),
        Err(e) => error_response(e),
    }
}

pub fn routes() -> Scope {
    web::scope("/schedule")
        .service(list_schedule)
        .service(list_orphaned)
}
