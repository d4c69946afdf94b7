//! # devicehub-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve the JSON REST Surface under `/api/hdp` (devices, commands,
//!   refresh, integrations, pairing)
//! - Map HTTP requests into application service calls (driving adapter)
//! - Map application results into HTTP responses (JSON)
//!
//! ## Dependency rule
//! Depends on `devicehub-app` (for port traits and services) and
//! `devicehub-domain` (for domain types used in request/response mapping).
//! Never leaks axum types into the domain.

pub mod api;
mod error;
pub mod router;
pub mod state;
