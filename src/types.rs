//! Fixed-width identifiers: selectors and facet addresses

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width of a selector in bytes
pub const SELECTOR_LEN: usize = 4;

/// Width of a facet address in bytes
pub const ADDRESS_LEN: usize = 20;

/// Opaque 4-byte key identifying a routable operation
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector([u8; SELECTOR_LEN]);

impl Selector {
    pub const fn new(bytes: [u8; SELECTOR_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SELECTOR_LEN] {
        &self.0
    }

    /// An all-zero selector marks an unused cell inside a slot word.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; SELECTOR_LEN]
    }
}

impl From<u32> for Selector {
    fn from(value: u32) -> Self {
        Self(value.to_be_bytes())
    }
}

impl From<Selector> for u32 {
    fn from(selector: Selector) -> Self {
        u32::from_be_bytes(selector.0)
    }
}

/// Opaque 20-byte identifier of the facet a selector is bound to
///
/// The all-zero address is a sentinel: it is never stored, lookups
/// report it as "not found", and a cut group carrying it removes selectors.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FacetAddress([u8; ADDRESS_LEN]);

impl FacetAddress {
    /// The "no facet" sentinel
    pub const ZERO: FacetAddress = FacetAddress([0u8; ADDRESS_LEN]);

    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Address with every byte set to `byte` (handy for fixtures: `0xAA..`)
    pub const fn repeat(byte: u8) -> Self {
        Self([byte; ADDRESS_LEN])
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// Where a live selector is bound and where it sits in the slot array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub facet: FacetAddress,
    /// Index of the group holding the selector
    pub slot: u64,
    /// Cell within the group, 0..8
    pub position: u8,
}

impl Entry {
    pub fn new(facet: FacetAddress, slot: u64, position: u8) -> Self {
        Self {
            facet,
            slot,
            position,
        }
    }

    /// `(slot, position)` pair
    pub fn location(&self) -> (u64, u8) {
        (self.slot, self.position)
    }
}

pub(crate) fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    write!(f, "0x")?;
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

pub(crate) fn parse_hex<const N: usize>(input: &str, what: &str) -> Result<[u8; N]> {
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);

    if digits.len() != N * 2 {
        return Err(Error::InvalidArgument(format!(
            "{} '{}' must be {} hex digits, got {}",
            what,
            input,
            N * 2,
            digits.len()
        )));
    }

    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::InvalidArgument(format!(
            "{} '{}' is not valid hex",
            what, input
        )));
    }

    let mut out = [0u8; N];
    for (i, pair) in digits.as_bytes().chunks(2).enumerate() {
        out[i] = (hex_value(pair[0]) << 4) | hex_value(pair[1]);
    }
    Ok(out)
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({})", self)
    }
}

impl fmt::Display for FacetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Debug for FacetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FacetAddress({})", self)
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_hex::<SELECTOR_LEN>(s.trim(), "Selector").map(Self)
    }
}

impl FromStr for FacetAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_hex::<ADDRESS_LEN>(s.trim(), "Facet address").map(Self)
    }
}

impl TryFrom<String> for Selector {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.to_string()
    }
}

impl TryFrom<String> for FacetAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<FacetAddress> for String {
    fn from(address: FacetAddress) -> Self {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_parse_and_display() -> Result<()> {
        let selector: Selector = "0x1f931c1c".parse()?;
        assert_eq!(selector.as_bytes(), &[0x1f, 0x93, 0x1c, 0x1c]);
        assert_eq!(selector.to_string(), "0x1f931c1c");

        // Prefix is optional
        let bare: Selector = "1F931C1C".parse()?;
        assert_eq!(bare, selector);
        Ok(())
    }

    #[test]
    fn test_selector_rejects_bad_input() {
        assert!("0x1234".parse::<Selector>().is_err());
        assert!("0xzzzzzzzz".parse::<Selector>().is_err());
        assert!("".parse::<Selector>().is_err());
    }

    #[test]
    fn test_selector_u32_conversion() {
        let selector = Selector::from(0xcdffacc6u32);
        assert_eq!(selector.to_string(), "0xcdffacc6");
        assert_eq!(u32::from(selector), 0xcdffacc6);
    }

    #[test]
    fn test_facet_address_sentinel() -> Result<()> {
        assert!(FacetAddress::ZERO.is_zero());
        assert!(FacetAddress::default().is_zero());
        assert!(!FacetAddress::repeat(0xaa).is_zero());

        let zero: FacetAddress = "0x0000000000000000000000000000000000000000".parse()?;
        assert!(zero.is_zero());
        Ok(())
    }

    #[test]
    fn test_facet_address_json() -> Result<()> {
        let address = FacetAddress::repeat(0xab);
        let json = serde_json::to_string(&address)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(20)));

        let parsed: FacetAddress =
            serde_json::from_str(&json).map_err(|e| Error::Serialization(e.to_string()))?;
        assert_eq!(parsed, address);

        let bad: std::result::Result<FacetAddress, _> = serde_json::from_str("\"0x12\"");
        assert!(bad.is_err());
        Ok(())
    }
}
