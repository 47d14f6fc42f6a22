//! Content fingerprints used to detect unchanged backup targets.

use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::str::FromStr;

const FINGERPRINT_LEN: usize = 64;

/// Lowercase hex SHA-256 digest of an archive blob
#[derive(Clone, Debug, Display, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut hasher = Sha256::new();
        std::io::copy(&mut reader, &mut hasher)?;
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn of_bytes<B: AsRef<[u8]>>(bytes: B) -> Self {
        Self(hex::encode(Sha256::digest(bytes.as_ref())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Fingerprint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() == FINGERPRINT_LEN
            && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidFingerprint(s.to_string()))
        }
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}
