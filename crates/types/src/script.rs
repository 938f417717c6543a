//! Output script model.
//!
//! The engine never executes scripts. It only needs the script template and,
//! where the template has one, the single destination address.

use crate::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Standard script templates recognised by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    PubKey,
    PubKeyHash,
    ScriptHash,
    Multisig,
    NullData,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScriptKind::PubKey => "pubkey",
            ScriptKind::PubKeyHash => "pubkeyhash",
            ScriptKind::ScriptHash => "scripthash",
            ScriptKind::Multisig => "multisig",
            ScriptKind::NullData => "nulldata",
        };
        f.write_str(s)
    }
}

/// A decoded output script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputScript {
    PubKey { address: Address },
    PubKeyHash { address: Address },
    ScriptHash { address: Address },
    Multisig { required: u8, keys: Vec<String> },
    /// Provably unspendable data carrier. Holds the pushed data items in order.
    NullData { pushes: Vec<Vec<u8>> },
    NonStandard { raw: Vec<u8> },
}

impl OutputScript {
    pub fn pay_to(address: Address) -> Self {
        OutputScript::PubKeyHash { address }
    }

    /// Template of this script, `None` if it matches no standard template.
    pub fn kind(&self) -> Option<ScriptKind> {
        match self {
            OutputScript::PubKey { .. } => Some(ScriptKind::PubKey),
            OutputScript::PubKeyHash { .. } => Some(ScriptKind::PubKeyHash),
            OutputScript::ScriptHash { .. } => Some(ScriptKind::ScriptHash),
            OutputScript::Multisig { .. } => Some(ScriptKind::Multisig),
            OutputScript::NullData { .. } => Some(ScriptKind::NullData),
            OutputScript::NonStandard { .. } => None,
        }
    }

    /// The single destination address, if the template has one.
    pub fn destination(&self) -> Option<&Address> {
        match self {
            OutputScript::PubKey { address }
            | OutputScript::PubKeyHash { address }
            | OutputScript::ScriptHash { address } => Some(address),
            _ => None,
        }
    }

    /// Data pushes of a null-data output.
    pub fn pushes(&self) -> Option<&[Vec<u8>]> {
        match self {
            OutputScript::NullData { pushes } => Some(pushes),
            _ => None,
        }
    }
}
