//! Core types for the tallyscan secondary-ledger engine.
//!
//! This crate provides the foundational types used throughout the engine:
//!
//! - **Primitives**: Hash and the double-SHA-256 helpers
//! - **Identifiers**: BlockHeight, PropertyId, Address
//! - **Chain types**: Transaction, OutputScript, Block, BlockHeader
//! - **Overlay types**: Intent, PacketClass, transaction type codes
//!
//! It does not depend on any other workspace crate.

mod block;
mod hash;
mod identifiers;
mod intent;
mod property;
mod script;
mod transaction;

pub mod tx_type;

pub use block::{Block, BlockHeader};
pub use hash::{Hash, HexError};
pub use identifiers::{Address, AddressError, BlockHeight, PropertyId};
pub use intent::{Intent, PacketClass};
pub use property::{
    format_amount, format_divisible, format_divisible_short, format_indivisible, Ecosystem, COIN,
};
pub use script::{OutputScript, ScriptKind};
pub use transaction::{OutPoint, Transaction, TxIn, TxOut};

/// Test utilities.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils {
    use super::*;

    /// Create a test address from a short label.
    pub fn test_address(label: &str) -> Address {
        Address::new(format!("addr{label}")).expect("test label must be a valid address")
    }

    /// Create a deterministic hash from a seed byte.
    pub fn test_hash(seed: u8) -> Hash {
        Hash::from_bytes([seed; 32])
    }
}
