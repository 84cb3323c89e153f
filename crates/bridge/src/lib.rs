//! WebSocket client for the messaging-network sidecar.
//!
//! [`BridgeNetwork`] implements [`pb_sessions::MessagingNetwork`] by opening
//! one WebSocket per phone number to a sidecar process that hosts the real
//! network client.  Requests are correlated by id and time out; connection
//! updates from the sidecar become [`pb_sessions::ConnectionEvent`]s.

pub mod connection;
pub mod error;
pub mod network;

pub use connection::BridgeHandle;
pub use error::BridgeError;
pub use network::BridgeNetwork;
