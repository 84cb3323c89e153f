//! PairBridge gateway: the Telegram admin channel, command dispatch, and
//! process wiring for the `pairbridge` binary.

pub mod bootstrap;
pub mod cli;
pub mod dispatch;
pub mod listing;
pub mod notifier;
pub mod state;
pub mod telegram;
pub mod transport;
