//! LOB locators
//!
//! LOB columns never carry their content inline; rows hold an opaque locator
//! and content moves through separate LOB operations that read or write
//! chunks against the locator. The codec here only understands enough of the
//! locator layout to classify it.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Byte offset of the first flag byte inside a locator
const FLAG_OFFSET_1: usize = 4;
/// Byte offset of the fourth flag byte inside a locator
const FLAG_OFFSET_4: usize = 7;

const FLAG_BLOB: u8 = 0x01;
const FLAG_TEMP: u8 = 0x01;

/// Minimum plausible locator length
pub const MIN_LOCATOR_LENGTH: usize = 16;

/// An opaque server-side handle referencing LOB content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobLocator {
    raw: Bytes,
}

impl LobLocator {
    /// Wrap raw locator bytes, validating the minimum length
    pub fn from_bytes(raw: impl Into<Bytes>) -> Result<Self> {
        let raw = raw.into();
        if raw.len() < MIN_LOCATOR_LENGTH {
            return Err(Error::UnsupportedConversion(format!(
                "LOB locator of {} bytes is too short",
                raw.len()
            )));
        }
        Ok(Self { raw })
    }

    /// The raw locator bytes as sent on the wire
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Locator length in bytes
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Whether the locator is empty (never true for a validated locator)
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Whether this locator references binary content
    pub fn is_blob(&self) -> bool {
        self.raw[FLAG_OFFSET_1] & FLAG_BLOB != 0
    }

    /// Whether this locator references a temporary LOB
    pub fn is_temporary(&self) -> bool {
        self.raw[FLAG_OFFSET_4] & FLAG_TEMP != 0
    }
}
