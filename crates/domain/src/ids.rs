//! Admin-channel identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A user on the admin channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminId(pub i64);

/// A conversation on the admin channel. In private chats this equals the
/// sender's [`AdminId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl From<AdminId> for ChatId {
    fn from(id: AdminId) -> Self {
        ChatId(id.0)
    }
}

impl fmt::Display for AdminId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AdminId {
    type Err = Error;

    /// Lenient parse used for command arguments: every non-digit is
    /// dropped, so `"@ 1234-5"` reads as `12345`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(Error::InvalidInput(format!("not a user id: {raw:?}")));
        }
        digits
            .parse::<i64>()
            .map(AdminId)
            .map_err(|_| Error::InvalidInput(format!("user id out of range: {raw:?}")))
    }
}
