// HTTP API
// Lease intake and inspection, tick intake, expiry schedule, health and metrics

pub mod health;
pub mod lease;
pub mod schedule;
pub mod tick;

use actix_web::{Scope, web};

/// All `/v1` routes
pub fn routes() -> Scope {
    web::scope("/v1")
        .service(lease::routes())
        .service(schedule::routes())
        .service(tick::push_tick)
        .service(health::health)
}

/// Register every API service on an app
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(routes()).service(health::metrics);
}
