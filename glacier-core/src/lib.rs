//! Core of the Glacier hashtag wall relay.
//!
//! - [`service::SubscriptionRegistry`] keeps one upstream listener per (wall, hashtag)
//! - [`service::EventRelay`] turns upstream events into notifications, gated by the
//!   embeddability policy in [`service::embed_policy`]
//! - [`service::DisconnectReconciler`] reclaims subscriptions of walls that stay disconnected

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod service;
pub mod upstream;

#[cfg(test)]
pub mod test_helpers;

pub use config::Config;
pub use error::{Error, Result};
