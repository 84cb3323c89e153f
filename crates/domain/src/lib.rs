//! Shared types for PairBridge: identifiers, phone numbers, configuration,
//! the error taxonomy, and structured trace events.

pub mod config;
pub mod error;
pub mod ids;
pub mod phone;
pub mod trace;

pub use error::{Error, Result};
pub use ids::{AdminId, ChatId};
pub use phone::PhoneNumber;
