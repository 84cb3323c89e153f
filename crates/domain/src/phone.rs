//! Phone numbers as session keys.
//!
//! A [`PhoneNumber`] is always 8–15 ASCII digits with no `+` and no
//! separators. Construction is the only validation point, so everything
//! downstream can treat the value as trusted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const MIN_DIGITS: usize = 8;
pub const MAX_DIGITS: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalize free-form input (`"+1 (555) 123-4567"`) into a phone number.
    ///
    /// A leading `+` and every non-digit character are stripped; the result
    /// must be 8–15 digits.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
        let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();

        if !(MIN_DIGITS..=MAX_DIGITS).contains(&digits.len()) {
            return Err(Error::InvalidInput(format!(
                "phone number must have {MIN_DIGITS}-{MAX_DIGITS} digits, got {} in {raw:?}",
                digits.len()
            )));
        }
        Ok(Self(digits))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the per-number credential directory.
    ///
    /// The value is digits-only by construction, so it can never escape the
    /// sessions root (`..`, `/`, and friends are impossible).
    pub fn dir_name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PhoneNumber {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(p: PhoneNumber) -> Self {
        p.0
    }
}
