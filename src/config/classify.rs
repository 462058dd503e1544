//! `[classify]` section configuration.
//!
//! Holds the image extension list and the versioned magic-number table.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};

/// One magic-number signature: `magic` must appear at byte `offset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Signature {
    pub ext: String,
    #[serde(default)]
    pub offset: usize,
    pub magic: Vec<u8>,
}

impl Signature {
    pub fn new(ext: &str, offset: usize, magic: &[u8]) -> Self {
        Self {
            ext: ext.into(),
            offset,
            magic: magic.to_vec(),
        }
    }

    /// Whether `bytes` carries this signature.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        bytes
            .get(self.offset..self.offset + self.magic.len())
            .is_some_and(|window| window == self.magic.as_slice())
    }
}

/// `[classify]` section in md2article.toml.
///
/// Configured signatures replace the built-in table entirely, so a table
/// can be pinned to a known revision.
///
/// # Example
/// ```toml
/// [classify]
/// probe_bytes = 16
/// signatures_version = "site-1"
///
/// [[classify.signatures]]
/// ext = "png"
/// magic = [0x89, 0x50, 0x4E, 0x47]
///
/// [[classify.signatures]]
/// ext = "webp"
/// offset = 8
/// magic = [0x57, 0x45, 0x42, 0x50]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifyConfig {
    /// Extensions (lowercase, no dot) treated as images without probing.
    #[serde(default = "defaults::classify::image_extensions")]
    #[educe(Default = defaults::classify::image_extensions())]
    pub image_extensions: Vec<String>,

    /// Upper bound on bytes read from a remote URL for a magic probe.
    #[serde(default = "defaults::classify::probe_bytes")]
    #[educe(Default = defaults::classify::probe_bytes())]
    pub probe_bytes: usize,

    #[serde(default = "defaults::classify::signatures_version")]
    #[educe(Default = defaults::classify::signatures_version())]
    pub signatures_version: String,

    #[serde(default = "defaults::classify::signatures")]
    #[educe(Default = defaults::classify::signatures())]
    pub signatures: Vec<Signature>,
}
