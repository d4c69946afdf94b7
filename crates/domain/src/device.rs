//! Device — a thing known to the hub through a protocol adapter, identified
//! by its `(protocol, external_id)` pair.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{DeviceHubError, ValidationError};
use crate::id::DeviceId;
use crate::identity;
use crate::time::{self, Timestamp};

/// A device known to the hub. `protocol` and `external_id` are always
/// stored lower-cased and trimmed; together they are unique, and
/// `external_id` never starts with `protocol/` (the identity codec strips
/// that prefix before a `Device` is ever constructed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub protocol: String,
    pub external_id: String,
    pub name: String,
    pub icon: String,
    pub manufacturer: String,
    pub model: String,
    pub capabilities: Json,
    pub inputs: Json,
    pub online: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// The canonical device id, `protocol + "/" + external_id`.
    #[must_use]
    pub fn canonical_id(&self) -> String {
        identity::build(&self.protocol, &self.external_id)
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceHubError::Validation`] if `protocol` or `external_id`
    /// is empty, or if `external_id` starts with `protocol/`.
    pub fn validate(&self) -> Result<(), DeviceHubError> {
        if self.protocol.is_empty() || self.external_id.is_empty() {
            return Err(ValidationError::ProtocolExternalRequired.into());
        }
        let prefix = format!("{}/", self.protocol);
        if self.external_id.starts_with(&prefix) {
            return Err(ValidationError::ProtocolExternalRequired.into());
        }
        Ok(())
    }

    /// Apply a field-by-field "non-empty trimmed string wins" merge from a
    /// metadata frame, per §4.5.a. Returns `true` if anything actually
    /// changed, so callers can skip a write for an already-persisted,
    /// unchanged device.
    pub fn merge_metadata(&mut self, update: &DeviceMetadataUpdate) -> bool {
        let mut changed = false;

        if let Some(name) = trimmed_non_empty(update.name.as_deref())
            && name != self.name
        {
            self.name = name;
            changed = true;
        }
        if let Some(icon) = trimmed_non_empty(update.icon.as_deref())
            && icon != self.icon
        {
            self.icon = icon;
            changed = true;
        }
        if let Some(manufacturer) = trimmed_non_empty(update.manufacturer.as_deref())
            && manufacturer != self.manufacturer
        {
            self.manufacturer = manufacturer;
            changed = true;
        }
        if let Some(model) = trimmed_non_empty(update.model.as_deref())
            && model != self.model
        {
            self.model = model;
            changed = true;
        }
        if let Some(capabilities) = update.capabilities.clone()
            && capabilities != self.capabilities
        {
            self.capabilities = capabilities;
            changed = true;
        }
        if let Some(inputs) = update.inputs.clone()
            && inputs != self.inputs
        {
            self.inputs = inputs;
            changed = true;
        }

        if changed {
            self.updated_at = time::now();
        }
        changed
    }
}

/// Trim a string and return it only if non-empty.
fn trimmed_non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Sparse update extracted from a metadata ingest frame or a `POST
/// /devices` / `PATCH /devices/<id>` request body. Every field is optional;
/// absent means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct DeviceMetadataUpdate {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub capabilities: Option<Json>,
    pub inputs: Option<Json>,
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    protocol: Option<String>,
    external_id: Option<String>,
    name: Option<String>,
    icon: Option<String>,
    manufacturer: Option<String>,
    model: Option<String>,
    capabilities: Option<Json>,
    inputs: Option<Json>,
    online: bool,
    created_at: Option<Timestamp>,
    updated_at: Option<Timestamp>,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: DeviceId) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    #[must_use]
    pub fn external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    #[must_use]
    pub fn manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub fn capabilities(mut self, capabilities: Json) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    #[must_use]
    pub fn inputs(mut self, inputs: Json) -> Self {
        self.inputs = Some(inputs);
        self
    }

    #[must_use]
    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    #[must_use]
    pub fn created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`DeviceHubError::Validation`] if `protocol` or
    /// `external_id` is missing or empty.
    pub fn build(self) -> Result<Device, DeviceHubError> {
        let now = time::now();
        let device = Device {
            id: self.id.unwrap_or_default(),
            protocol: self.protocol.unwrap_or_default(),
            external_id: self.external_id.unwrap_or_default(),
            name: self.name.unwrap_or_default(),
            icon: self.icon.unwrap_or_default(),
            manufacturer: self.manufacturer.unwrap_or_default(),
            model: self.model.unwrap_or_default(),
            capabilities: self.capabilities.unwrap_or(Json::Null),
            inputs: self.inputs.unwrap_or(Json::Null),
            online: self.online,
            created_at: self.created_at.unwrap_or(now),
            updated_at: self.updated_at.unwrap_or(now),
        };
        device.validate()?;
        Ok(device)
    }
}
