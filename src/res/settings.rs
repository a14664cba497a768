//! Functions for loading resource settings.

use std::io::Read;

use serde::{Deserialize, Serialize};

use super::background::{self, DecompressionParams};
use super::manager::ResourceParams;
use crate::errors::*;
use crate::io::{self, prelude::IoParams};

/// Configuration of the resource layer. Every field falls back to its
/// default when missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Parameters for new managers.
    pub resource: ResourceParams,
    pub io: IoParams,
    pub decompression: DecompressionParams,
}

impl Settings {
    /// Parses settings from JSON.
    pub fn load_from<R: Read>(reader: R) -> Result<Settings> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Pushes the process-wide parts: the async read table, and background
    /// decompression. The read table can only be configured before the
    /// first read is issued.
    pub fn apply(&self) -> Result<()> {
        io::setup(self.io)?;
        background::set_background_decompression(self.decompression)
    }
}
