//! Loads server settings from JSON.
//!
//! Every field is optional; missing ones take the defaults below.
//!
//! ```json
//! {
//!   "class_context": 1,
//!   "registration_flags": 1,
//!   "apartment": "sta",
//!   "factory": { "lifetime": "process" },
//!   "instances": { "lifetime": "destroy_at_zero", "over_release": "trap" },
//!   "log_filter": "dyncom=debug"
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::object::ObjectPolicy;
use crate::registry::{CLSCTX_INPROC_SERVER, REGCLS_MULTIPLEUSE};

/// COM threading model requested at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Apartment {
    /// `COINIT_APARTMENTTHREADED`.
    #[default]
    Sta,
    /// `COINIT_MULTITHREADED`.
    Mta,
}

impl Apartment {
    /// The `COINIT` value for this model.
    pub fn coinit(self) -> u32 {
        match self {
            Apartment::Sta => 0x2,
            Apartment::Mta => 0x0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `CLSCTX` used for registration and creation.
    pub class_context: u32,
    /// `REGCLS` used for registration.
    pub registration_flags: u32,
    pub apartment: Apartment,
    /// Policy of the published class factory objects.
    pub factory: ObjectPolicy,
    /// Policy of the instances those factories create.
    pub instances: ObjectPolicy,
    /// `tracing-subscriber` filter directive, overridden by `RUST_LOG`.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            class_context: CLSCTX_INPROC_SERVER,
            registration_flags: REGCLS_MULTIPLEUSE,
            apartment: Apartment::default(),
            factory: ObjectPolicy::default(),
            instances: ObjectPolicy::destroy_at_zero(),
            log_filter: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&text)?;
        tracing::debug!(path = %path.as_ref().display(), ?config, "loaded config");
        Ok(config)
    }
}
