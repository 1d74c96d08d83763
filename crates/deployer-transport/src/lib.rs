#![warn(clippy::all, clippy::pedantic)]

//! Wire formats shared by the deployer send providers.
//!
//! Nothing in this crate performs I/O: it only builds, encodes, encrypts and
//! validates the payloads exchanged with wallets.

pub mod bridge;
pub mod deep_link;
