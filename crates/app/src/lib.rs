//! # devicehub-app
//!
//! Application layer — port definitions (traits) and the three orchestrating
//! services that implement the hub's hard concerns.
//!
//! ## Responsibilities
//! - Define **port traits** that adapters implement (driven/outbound ports):
//!   - `Repository` — CRUD for devices and device state
//!   - `MqttClient` — publish/subscribe against the HDP topic space
//! - Provide the three core services:
//!   - `AdapterRegistry` — live catalog of online protocol adapters
//!   - `HdpIngest` — subscribes the HDP topic table and dispatches frames
//!   - `PairingCoordinator` — the per-protocol pairing session state machine
//!
//! ## Dependency rule
//! Depends on `devicehub-domain` only (plus `tokio`/`tokio-util` for
//! channels, timers, and cancellation). Never imports adapter crates.
//! Adapters depend on *this* crate, not the reverse.

pub mod adapter_registry;
pub mod ingest;
pub mod pairing_coordinator;
pub mod ports;
