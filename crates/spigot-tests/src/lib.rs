//! Integration test suite for the Spigot faucet.
//!
//! Exercises the payout coordinator end to end, under concurrent load and
//! over a real JSON-RPC wallet connection.

pub mod helpers;
pub mod mock_wallet;
