//! Content digests for model integrity verification
//!
//! Every loaded model is content-addressed by four SHA-1 digests:
//! `schemaSHA1` and `modelSHA1` over the raw bytes of the meta-schema and
//! the model document, `cvSHA1` over the concatenated lines of every
//! external CV file in load-encounter order, and `fullmodelSHA1` over the
//! model bytes followed by the same CV bytes. The digests are independent
//! of the load path: a plain file and a packaged archive with identical
//! bytes produce identical digests.

use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fmt;

use crate::error::{ModelError, Result};

/// Lowercase hex SHA-1 digest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Sha1Hex(String);

impl Sha1Hex {
    /// Compute digest from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha1::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that content matches this digest
    pub fn verify(&self, data: &[u8]) -> bool {
        let computed = Self::from_bytes(data);
        self.0 == computed.0
    }
}

impl fmt::Display for Sha1Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Sha1Hex {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Sha1Hex {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The four content digests of a loaded model
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestSet {
    /// SHA-1 of the raw meta-schema bytes
    pub schema: Sha1Hex,
    /// SHA-1 of the raw model document bytes, before any reformatting
    pub model: Sha1Hex,
    /// SHA-1 of the concatenated external-CV bytes in encounter order
    pub cv: Sha1Hex,
    /// SHA-1 of model bytes followed by the CV bytes
    pub full: Sha1Hex,
}

/// Running digest over the external-CV byte stream
///
/// Seeded with the model bytes for the full-model digest; every byte read
/// from an external CV file is fed to both hashers exactly as read.
pub struct CvStream {
    cv: Sha1,
    full: Sha1,
}

impl CvStream {
    /// Start a stream; `model_bytes` seeds the full-model digest
    pub fn new(model_bytes: &[u8]) -> Self {
        let mut full = Sha1::new();
        full.update(model_bytes);
        Self {
            cv: Sha1::new(),
            full,
        }
    }

    /// Feed bytes read from an external CV file
    pub fn update(&mut self, bytes: &[u8]) {
        self.cv.update(bytes);
        self.full.update(bytes);
    }

    /// Finish the stream, producing (cvSHA1, fullmodelSHA1)
    pub fn finish(self) -> (Sha1Hex, Sha1Hex) {
        (
            Sha1Hex(format!("{:x}", self.cv.finalize())),
            Sha1Hex(format!("{:x}", self.full.finalize())),
        )
    }
}

/// Signature manifest keys, in the fixed order they appear in the file
pub const SIGNATURE_KEYS: [&str; 3] = ["schemaSHA1", "modelSHA1", "cvSHA1"];

/// Render the `signatures.txt` manifest (`key: value\n` lines, fixed order)
pub fn write_signatures(digests: &DigestSet) -> String {
    let mut out = String::new();
    for (key, value) in SIGNATURE_KEYS.iter().zip([
        digests.schema.as_str(),
        digests.model.as_str(),
        digests.cv.as_str(),
    ]) {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Parse a `signatures.txt` manifest into a key/value map
pub fn parse_signatures(text: &str) -> Result<HashMap<String, Sha1Hex>> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(ModelError::corrupt(
                "signatures.txt",
                format!("malformed line: {line}"),
            ));
        };
        map.insert(
            key.trim().to_string(),
            Sha1Hex::from(value.trim().to_string()),
        );
    }
    for key in SIGNATURE_KEYS {
        if !map.contains_key(key) {
            return Err(ModelError::corrupt(
                "signatures.txt",
                format!("missing key: {key}"),
            ));
        }
    }
    Ok(map)
}
