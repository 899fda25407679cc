//! CNPJ normalization and validation.
//!
//! A CNPJ is the 14-digit Brazilian business registration number. Users type it
//! with punctuation (`14.665.903/0001-04`), CRMs store it however they like, so
//! every entry point normalizes to bare digits before validating.

use crate::errors::ValidationError;
use serde::Serialize;
use std::fmt;

/// Number of digits in a canonical CNPJ.
pub const CNPJ_LEN: usize = 14;

/// A validated CNPJ in canonical form (14 ASCII digits, not all identical).
///
/// Only [`validate`] builds one. Serializes as the bare digit string; there is
/// no `Deserialize`, raw input goes through `validate`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Cnpj(String);

impl Cnpj {
    /// Canonical digit string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display form `NN.NNN.NNN/NNNN-NN`.
    pub fn formatted(&self) -> String {
        let d = &self.0;
        format!(
            "{}.{}.{}/{}-{}",
            &d[0..2],
            &d[2..5],
            &d[5..8],
            &d[8..12],
            &d[12..14]
        )
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Cnpj {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Cnpj {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Strip every non-digit character.
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Normalize and validate a raw CNPJ.
///
/// Check digits are not verified: the registry answers 404 for numbers that
/// do not exist, which covers the same ground.
pub fn validate(raw: &str) -> Result<Cnpj, ValidationError> {
    let digits = normalize(raw);

    if digits.len() != CNPJ_LEN {
        return Err(ValidationError::WrongLength {
            found: digits.len(),
        });
    }

    let first = digits.as_bytes()[0];
    if digits.bytes().all(|b| b == first) {
        return Err(ValidationError::RepeatedDigits);
    }

    Ok(Cnpj(digits))
}

/// Whether `raw` normalizes to exactly 14 digits. Used by the fallback scan
/// over arbitrary CRM properties, before full validation.
pub fn looks_like_cnpj(raw: &str) -> bool {
    normalize(raw).len() == CNPJ_LEN
}
