//! # devicehub-domain
//!
//! Pure domain model for the Device Hub — the MQTT/HDP-to-REST translation
//! and coordination core that sits between an MQTT broker speaking the Home
//! Device Protocol and north-bound REST/JSON clients.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, the error taxonomy, timestamps
//! - The canonical device identity codec (`identity`)
//! - `Device` and `DeviceState`, the two persisted aggregates
//! - `AdapterInfo` and its derived catalog views, the Adapter Registry's
//!   data model
//! - `PairingSession` and its status vocabulary, the Pairing Coordinator's
//!   data model
//! - HDP v1 wire envelopes, both incoming (lenient) and outgoing (typed)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies** and performs no IO. All
//! boundaries to MQTT, HTTP, and storage are expressed as traits in the
//! `devicehub-app` crate (ports).

pub mod adapter;
pub mod device;
pub mod device_state;
pub mod envelope;
pub mod error;
pub mod id;
pub mod identity;
pub mod pairing;
pub mod time;
