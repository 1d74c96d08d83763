//! Account addresses, opaque payload cells and contract constructor payloads.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

const CRC16: crc::Crc<u16> = crc::Crc::<u16>::new(&crc::CRC_16_XMODEM);

const FRIENDLY_TAG_BOUNCEABLE: u8 = 0x11;
const FRIENDLY_TAG_NON_BOUNCEABLE: u8 = 0x51;
const FRIENDLY_FLAG_TESTNET: u8 = 0x80;
const FRIENDLY_LEN: usize = 36;

/// Nano units per whole coin.
pub const NANO_PER_COIN: u64 = 1_000_000_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address '{0}'")]
    Malformed(String),

    #[error("address checksum mismatch for '{0}'")]
    Checksum(String),

    #[error("invalid amount '{0}'")]
    Amount(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    pub workchain: i8,
    pub hash: [u8; 32],
}

impl Address {
    #[must_use]
    pub const fn new(workchain: i8, hash: [u8; 32]) -> Self {
        Self { workchain, hash }
    }

    /// User-friendly form: tag, workchain, hash and CRC16, base64url encoded.
    #[must_use]
    pub fn to_friendly(&self, bounceable: bool, testnet: bool) -> String {
        let mut tag = if bounceable {
            FRIENDLY_TAG_BOUNCEABLE
        } else {
            FRIENDLY_TAG_NON_BOUNCEABLE
        };
        if testnet {
            tag |= FRIENDLY_FLAG_TESTNET;
        }

        let mut bytes = Vec::with_capacity(FRIENDLY_LEN);
        bytes.push(tag);
        bytes.push(self.workchain.to_be_bytes()[0]);
        bytes.extend_from_slice(&self.hash);
        bytes.extend_from_slice(&CRC16.checksum(&bytes).to_be_bytes());

        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn parse_raw(value: &str) -> Option<Self> {
        let (workchain, hash_hex) = value.split_once(':')?;
        let workchain = workchain.parse::<i8>().ok()?;
        let decoded = hex::decode(hash_hex).ok()?;
        let hash: [u8; 32] = decoded.try_into().ok()?;
        Some(Self { workchain, hash })
    }

    fn parse_friendly(value: &str) -> Result<Self, AddressError> {
        let normalized = value.replace('-', "+").replace('_', "/");
        let bytes = STANDARD
            .decode(normalized.as_bytes())
            .map_err(|_| AddressError::Malformed(value.to_string()))?;

        if bytes.len() != FRIENDLY_LEN {
            return Err(AddressError::Malformed(value.to_string()));
        }

        let tag = bytes[0] & !FRIENDLY_FLAG_TESTNET;
        if tag != FRIENDLY_TAG_BOUNCEABLE && tag != FRIENDLY_TAG_NON_BOUNCEABLE {
            return Err(AddressError::Malformed(value.to_string()));
        }

        let expected = CRC16.checksum(&bytes[..34]).to_be_bytes();
        if bytes[34..] != expected {
            return Err(AddressError::Checksum(value.to_string()));
        }

        let mut hash = [0_u8; 32];
        hash.copy_from_slice(&bytes[2..34]);
        Ok(Self {
            workchain: i8::from_be_bytes([bytes[1]]),
            hash,
        })
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.contains(':') {
            return Self::parse_raw(trimmed).ok_or_else(|| AddressError::Malformed(value.into()));
        }
        Self::parse_friendly(trimmed)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.workchain, hex::encode(self.hash))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Serialized payload produced by the contract compiler. Carried as-is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Cell(Vec<u8>);

impl Cell {
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_base64(encoded: &str) -> Result<Self, base64::DecodeError> {
        STANDARD.decode(encoded.trim()).map(Self)
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        Sha256::digest(&self.0).into()
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::from_base64(&raw).map_err(serde::de::Error::custom)
    }
}

/// Code and initial data attached to the message that first activates a
/// contract address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInit {
    pub code: Cell,
    pub data: Cell,
}

impl ContractInit {
    #[must_use]
    pub const fn new(code: Cell, data: Cell) -> Self {
        Self { code, data }
    }

    /// The address is a pure function of code and data, so the same payload
    /// always lands on the same account.
    #[must_use]
    pub fn address(&self, workchain: i8) -> Address {
        let mut hasher = Sha256::new();
        hasher.update(b"contract-init");
        hasher.update(self.code.hash());
        hasher.update(self.data.hash());
        Address::new(workchain, hasher.finalize().into())
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Parses a decimal coin amount (`"0.05"`) into nano units.
pub fn parse_coins(value: &str) -> Result<u64, AddressError> {
    let invalid = || AddressError::Amount(value.to_string());
    let trimmed = value.trim();

    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if fraction.len() > 9 || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole = if whole.is_empty() {
        0
    } else {
        whole.parse::<u64>().map_err(|_| invalid())?
    };
    let fraction = if fraction.is_empty() {
        0
    } else {
        format!("{fraction:0<9}").parse::<u64>().map_err(|_| invalid())?
    };

    whole
        .checked_mul(NANO_PER_COIN)
        .and_then(|nano| nano.checked_add(fraction))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "0:2cf55953e92efbeadab7ba725c3f93a0b23f842cbba72d7b8e6f510a70e422e3";

    #[test]
    fn friendly_form_parses_back_to_raw() {
        let address: Address = RAW.parse().expect("raw");
        let friendly = address.to_friendly(true, false);

        assert_eq!(friendly, "EQAs9VlT6S776tq3unJcP5Ogsj-ELLunLXuOb1EKcOQi4wJB");
        assert_eq!(friendly.parse::<Address>().expect("friendly"), address);
        assert_eq!(address.to_string(), RAW);
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let err = "EQAs9VlT6S776tq3unJcP5Ogsj-ELLunLXuOb1EKcOQi4wJC"
            .parse::<Address>()
            .expect_err("must fail");
        assert!(matches!(err, AddressError::Checksum(_)));
    }

    #[test]
    fn contract_address_depends_on_data() {
        let code = Cell::new(vec![1, 2, 3]);
        let first = ContractInit::new(code.clone(), Cell::new(vec![0]));
        let second = ContractInit::new(code, Cell::new(vec![1]));

        assert_eq!(first.address(0), first.address(0));
        assert_ne!(first.address(0), second.address(0));
    }

    #[test]
    fn coins_are_parsed_into_nano() {
        assert_eq!(parse_coins("0.05"), Ok(50_000_000));
        assert_eq!(parse_coins("2"), Ok(2_000_000_000));
        assert_eq!(parse_coins(".5"), Ok(500_000_000));
        assert!(parse_coins("0.0000000001").is_err());
        assert!(parse_coins("abc").is_err());
    }
}
