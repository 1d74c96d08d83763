#![warn(clippy::all, clippy::pedantic)]

//! Contract deployment and transaction confirmation.
//!
//! A [`builder::NetworkProviderBuilder`] resolves the target network, the
//! ledger API dialect, the explorer and the signing mechanism for one
//! invocation. The resulting [`provider::NetworkProvider`] opens contracts,
//! routes their messages through the selected signer and verifies
//! deployments until they reach a verdict.

use std::time::{SystemTime, UNIX_EPOCH};

pub mod address;
pub mod api;
pub mod builder;
pub mod config;
pub mod contract;
pub mod error;
pub mod network;
pub mod prompt;
pub mod provider;
pub mod send;
pub mod storage;
pub mod verify;

pub use builder::{NetworkProviderBuilder, ProviderFlags};
pub use error::DeployError;
pub use provider::{Deployment, NetworkProvider};

#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis().try_into().unwrap_or(u64::MAX))
        .unwrap_or_default()
}
