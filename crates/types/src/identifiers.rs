//! Identifier newtypes: block heights, property ids and addresses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Height of a block in the base chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    pub const GENESIS: BlockHeight = BlockHeight(0);

    pub fn next(self) -> Self {
        BlockHeight(self.0 + 1)
    }

    /// The previous height, or `None` at genesis.
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(BlockHeight)
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a fungible asset tracked by the overlay protocol.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PropertyId(pub u32);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PropertyId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(PropertyId)
    }
}

/// Error constructing an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("address contains reserved character {0:?}")]
    ReservedCharacter(char),
}

/// An encoded base-chain address.
///
/// Addresses are opaque strings to the engine. Characters used as field
/// separators in the persisted formats are refused at construction so every
/// address round-trips through a checkpoint line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    const RESERVED: [char; 6] = ['=', ';', ':', ',', '|', '!'];

    pub fn new(s: impl Into<String>) -> Result<Self, AddressError> {
        let s = s.into();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        if let Some(c) = s
            .chars()
            .find(|c| c.is_whitespace() || Self::RESERVED.contains(c))
        {
            return Err(AddressError::ReservedCharacter(c));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_rejects_separator_characters() {
        assert_eq!(Address::new(""), Err(AddressError::Empty));
        assert_eq!(
            Address::new("a=b"),
            Err(AddressError::ReservedCharacter('='))
        );
        assert_eq!(
            Address::new("a b"),
            Err(AddressError::ReservedCharacter(' '))
        );
        assert!(Address::new("aHvR3c9vLk4c").is_ok());
    }

    #[test]
    fn test_height_prev_at_genesis() {
        assert_eq!(BlockHeight::GENESIS.prev(), None);
        assert_eq!(BlockHeight(5).prev(), Some(BlockHeight(4)));
        assert_eq!(BlockHeight(5).next(), BlockHeight(6));
    }
}
