//! Session lifecycle for PairBridge.
//!
//! Owns everything with state: the crash-safe JSON document store, the
//! access registry (administrators, resellers, entitled users, and the
//! chat → phone ownership mapping), the per-identity rate limiter, and the
//! [`SessionManager`] that drives one messaging-network connection per
//! phone number.

pub mod access;
pub mod credentials;
pub mod manager;
pub mod network;
pub mod notify;
pub mod pairing;
pub mod rate_limit;
pub mod reconnect;
pub mod store;

pub use access::{AccessRegistry, Membership};
pub use credentials::CredentialStore;
pub use manager::{InitiateOutcome, SessionManager, SessionState, TerminateOutcome};
pub use network::{
    Connection, ConnectionEvent, ConnectionHandle, ConnectRequest, DisconnectReason,
    MessagingNetwork,
};
pub use notify::{SessionNotice, SessionNotifier};
pub use rate_limit::{RateLimited, RateLimiter};
pub use reconnect::ReconnectScheduler;
pub use store::JsonStore;
