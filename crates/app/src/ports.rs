//! Port definitions — traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside
//! world. They are defined here (in `app`) so that both the core services
//! and the adapter layer can depend on them without creating circular
//! dependencies.

pub mod mqtt_client;
pub mod repository;

pub use mqtt_client::{MessageHandler, MqttClient};
pub use repository::Repository;
