//! Property ecosystems, naming and amount formatting.

use crate::PropertyId;
use serde::{Deserialize, Serialize};

/// Number of base units in one divisible token.
pub const COIN: i64 = 100_000_000;

/// Ecosystem a property belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Main,
    Test,
}

impl PropertyId {
    /// The base chain's own currency. Never stored in the tally.
    pub const BASE: PropertyId = PropertyId(0);
    /// Native overlay token of the main ecosystem.
    pub const NATIVE: PropertyId = PropertyId(1);
    /// Native overlay token of the test ecosystem.
    pub const TEST_NATIVE: PropertyId = PropertyId(2);
    pub const FIRST_MAIN_ISSUED: PropertyId = PropertyId(3);
    pub const FIRST_TEST_ISSUED: PropertyId = PropertyId(0x8000_0003);

    const TEST_FLAG: u32 = 0x8000_0000;

    pub fn is_test_ecosystem(self) -> bool {
        self == Self::TEST_NATIVE || self >= Self::FIRST_TEST_ISSUED
    }

    pub fn is_main_ecosystem(self) -> bool {
        self != Self::BASE && !self.is_test_ecosystem()
    }

    /// Ecosystem of this property, `None` for the base currency.
    pub fn ecosystem(self) -> Option<Ecosystem> {
        if self.is_test_ecosystem() {
            Some(Ecosystem::Test)
        } else if self.is_main_ecosystem() {
            Some(Ecosystem::Main)
        } else {
            None
        }
    }

    /// Human readable name used in logs.
    pub fn display_name(self) -> String {
        if self.0 & Self::TEST_FLAG != 0 {
            return format!("Test token: {} : 0x{:08X}", self.0 & !Self::TEST_FLAG, self.0);
        }
        match self {
            Self::BASE => "BASE".to_string(),
            Self::NATIVE => "NATIVE".to_string(),
            Self::TEST_NATIVE => "TNATIVE".to_string(),
            other => format!("SP token: {}", other.0),
        }
    }
}

impl Ecosystem {
    /// First id handed out to issued properties in this ecosystem.
    pub fn first_issued(self) -> PropertyId {
        match self {
            Ecosystem::Main => PropertyId::FIRST_MAIN_ISSUED,
            Ecosystem::Test => PropertyId::FIRST_TEST_ISSUED,
        }
    }
}

/// Format a divisible amount as `units.fraction` with eight decimals.
///
/// With `signed`, a leading `+` or `-` is always written; otherwise the sign
/// is dropped.
pub fn format_divisible(amount: i64, signed: bool) -> String {
    let abs = amount.unsigned_abs();
    let coin = COIN as u64;
    let s = format!("{}.{:08}", abs / coin, abs % coin);
    if !signed {
        return s;
    }
    if amount < 0 {
        format!("-{s}")
    } else {
        format!("+{s}")
    }
}

/// Divisible amount with trailing zeros and a bare trailing dot removed.
pub fn format_divisible_short(amount: i64) -> String {
    let s = format_divisible(amount, false);
    let trimmed = s.trim_end_matches('0');
    trimmed.strip_suffix('.').unwrap_or(trimmed).to_string()
}

pub fn format_indivisible(amount: i64) -> String {
    amount.to_string()
}

/// Format an amount according to the property's divisibility.
pub fn format_amount(amount: i64, divisible: bool) -> String {
    if divisible {
        format_divisible(amount, false)
    } else {
        format_indivisible(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecosystem_boundaries() {
        assert_eq!(PropertyId(0).ecosystem(), None);
        assert_eq!(PropertyId(1).ecosystem(), Some(Ecosystem::Main));
        assert_eq!(PropertyId(2).ecosystem(), Some(Ecosystem::Test));
        assert_eq!(PropertyId(3).ecosystem(), Some(Ecosystem::Main));
        // Reserved gap between the main range and the first issued test id.
        assert_eq!(PropertyId(0x8000_0002).ecosystem(), Some(Ecosystem::Main));
        assert_eq!(PropertyId(0x8000_0003).ecosystem(), Some(Ecosystem::Test));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(PropertyId(1).display_name(), "NATIVE");
        assert_eq!(PropertyId(7).display_name(), "SP token: 7");
        assert_eq!(
            PropertyId(0x8000_0005).display_name(),
            "Test token: 5 : 0x80000005"
        );
    }

    #[test]
    fn test_divisible_formatting() {
        assert_eq!(format_divisible(100_000_000, false), "1.00000000");
        assert_eq!(format_divisible(-150_000_000, true), "-1.50000000");
        assert_eq!(format_divisible(1, true), "+0.00000001");
        assert_eq!(format_divisible(i64::MIN, false), "92233720368.54775808");
        assert_eq!(format_divisible_short(150_000_000), "1.5");
        assert_eq!(format_divisible_short(200_000_000), "2");
        assert_eq!(format_amount(42, false), "42");
    }
}
