//! Parsed transaction intent handed to the downstream interpreter.

use crate::{Address, BlockHeight, Hash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Encoding scheme used to embed the overlay payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketClass {
    /// Legacy multi-output encoding marked by a payment to the system address.
    Legacy,
    /// Single null-data output tagged with the protocol magic.
    MarkerTagged,
}

impl fmt::Display for PacketClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketClass::Legacy => f.write_str("legacy"),
            PacketClass::MarkerTagged => f.write_str("marker-tagged"),
        }
    }
}

/// The canonical (sender, reference, payload) triple extracted from a
/// base-chain transaction.
///
/// A transaction whose sender cannot be determined never becomes an intent;
/// the classifier rejects it instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub txid: Hash,
    pub block_height: BlockHeight,
    pub block_time: u64,
    pub index_in_block: u32,
    pub sender: Address,
    pub reference: Option<Address>,
    pub reference_amount: Option<i64>,
    pub payload: Vec<u8>,
    /// Previous-output values minus output values.
    pub net_amount: i64,
    pub packet_class: PacketClass,
}
