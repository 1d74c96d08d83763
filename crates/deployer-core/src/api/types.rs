use serde::{Deserialize, Deserializer};

use crate::address::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Uninit,
    Frozen,
    Nonexist,
}

impl AccountStatus {
    /// Maps the status names used by all three dialects.
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match value {
            "active" => Self::Active,
            "uninit" | "uninitialized" => Self::Uninit,
            "frozen" => Self::Frozen,
            _ => Self::Nonexist,
        }
    }
}

/// Logical time and hash of an account's latest transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionId {
    pub lt: u64,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountState {
    pub status: AccountStatus,
    pub balance: u64,
    pub last_transaction: Option<TransactionId>,
}

impl AccountState {
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, AccountStatus::Active)
    }
}

/// The parts of a transaction the verifier classifies on.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionInfo {
    pub hash: String,
    pub lt: u64,
    pub utime: u64,
    /// Compute phase exit code; `None` when the compute phase was skipped.
    pub exit_code: Option<i32>,
    pub aborted: bool,
    /// Explicit status, only reported by some dialects.
    pub success: Option<bool>,
    pub total_fees: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackItem {
    Int(i128),
    Cell(Cell),
    Null,
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetMethodResult {
    pub exit_code: i32,
    pub stack: Vec<StackItem>,
}

impl GetMethodResult {
    #[must_use]
    pub fn first_int(&self) -> Option<i128> {
        match self.stack.first()? {
            StackItem::Int(value) => Some(*value),
            _ => None,
        }
    }
}

/// Parses `"0x1f"`, `"-0x1"` or plain decimal integers.
pub(crate) fn parse_int(value: &str) -> Option<i128> {
    let trimmed = value.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let parsed = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex_digits) => i128::from_str_radix(hex_digits, 16).ok()?,
        None => digits.parse::<i128>().ok()?,
    };
    Some(if negative { -parsed } else { parsed })
}

/// Dialects disagree on whether large integers are JSON numbers or strings.
pub(crate) fn de_u64_flexible<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flexible {
        Number(u64),
        Text(String),
    }

    match Flexible::deserialize(deserializer)? {
        Flexible::Number(value) => Ok(value),
        Flexible::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_in_every_notation() {
        assert_eq!(parse_int("0x1f"), Some(31));
        assert_eq!(parse_int("-0x1"), Some(-1));
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("zz"), None);
    }

    #[test]
    fn status_names_are_normalized() {
        assert_eq!(AccountStatus::from_wire("uninitialized"), AccountStatus::Uninit);
        assert_eq!(AccountStatus::from_wire("active"), AccountStatus::Active);
        assert_eq!(AccountStatus::from_wire("whatever"), AccountStatus::Nonexist);
    }
}
