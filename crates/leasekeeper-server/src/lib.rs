//! Leasekeeper Server - HTTP surface and collaborator wiring for the lease engine
//!
//! This crate provides:
//! - Configuration loading (file, environment, command line)
//! - HTTP clients for the provisioner, notification and heartbeat endpoints
//! - The local tick source
//! - The lease API and Prometheus metrics endpoint
//! - Logging and graceful shutdown

pub mod adapter;
pub mod api;
pub mod metrics;
pub mod model;
pub mod startup;
