//! Provides the 128-bit identifier used to name classes and interfaces.
//!
//! The binary layout matches the native `GUID` structure so a `&Guid` can be
//! handed to native code as `REFIID`/`REFCLSID` without conversion.
//!
//! # Examples
//! ```
//! use dyncom::guid::Guid;
//!
//! let clsid: Guid = "D6D16AB8-F65F-4152-8CF6-4F5E00E8AAA7".parse().unwrap();
//! assert_eq!(clsid.to_string(), "d6d16ab8-f65f-4152-8cf6-4f5e00e8aaa7");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Interface identifier of `IUnknown`, the base of every interface.
pub const IID_IUNKNOWN: Guid = Guid::from_u128(0x00000000_0000_0000_c000_000000000046);

/// Interface identifier of `IClassFactory`.
pub const IID_ICLASSFACTORY: Guid = Guid::from_u128(0x00000001_0000_0000_c000_000000000046);

/// Represents a GUID in its native `{u32, u16, u16, [u8; 8]}` layout.
///
/// # Examples
/// ```
/// use dyncom::guid::{Guid, IID_IUNKNOWN};
///
/// let iid = Guid::parse("00000000-0000-0000-c000-000000000046").unwrap();
/// assert_eq!(iid, IID_IUNKNOWN);
/// ```
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    /// The all-zero identifier.
    pub const NIL: Guid = Guid::from_u128(0);

    /// Builds a GUID from its big-endian 128-bit value, i.e. the order the
    /// hex digits appear in the canonical string.
    ///
    /// # Examples
    /// ```
    /// use dyncom::guid::Guid;
    ///
    /// let g = Guid::from_u128(0x6531d857_c22f_4add_b2d5_e9785e39fc46);
    /// assert_eq!(g.data1, 0x6531d857);
    /// assert_eq!(g.data4, [0xb2, 0xd5, 0xe9, 0x78, 0x5e, 0x39, 0xfc, 0x46]);
    /// ```
    pub const fn from_u128(value: u128) -> Self {
        Self {
            data1: (value >> 96) as u32,
            data2: (value >> 80) as u16,
            data3: (value >> 64) as u16,
            data4: (value as u64).to_be_bytes(),
        }
    }

    /// Returns the 128-bit value in canonical digit order.
    pub const fn to_u128(&self) -> u128 {
        ((self.data1 as u128) << 96)
            | ((self.data2 as u128) << 80)
            | ((self.data3 as u128) << 64)
            | (u64::from_be_bytes(self.data4) as u128)
    }

    /// Parses the textual form.
    ///
    /// Hyphens are ignored and one pair of surrounding braces is accepted, so
    /// `{D6D16AB8-...}` and `d6d16ab8f65f...` both parse. Exactly 32 hex digits
    /// must remain.
    ///
    /// # Errors
    /// Returns [`Error::Format`] for a wrong digit count or a non-hex character.
    ///
    /// # Examples
    /// ```
    /// use dyncom::guid::Guid;
    ///
    /// assert!(Guid::parse("{6531d857-c22f-4add-b2d5-e9785e39fc46}").is_ok());
    /// assert!(Guid::parse("6531d857-c22f-4add-b2d5").is_err());
    /// assert!(Guid::parse("6531d857-c22f-4add-b2d5-e9785e39fcxx").is_err());
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let body = trimmed
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(trimmed);

        let mut value: u128 = 0;
        let mut digits = 0usize;
        for ch in body.chars().filter(|&c| c != '-') {
            let nibble = ch.to_digit(16).ok_or_else(|| Error::Format {
                input: text.to_string(),
                reason: format!("'{ch}' is not a hex digit"),
            })?;
            digits += 1;
            value = (value << 4) | nibble as u128;
        }

        if digits != 32 {
            return Err(Error::Format {
                input: text.to_string(),
                reason: format!("expected 32 hex digits, found {digits}"),
            });
        }

        Ok(Self::from_u128(value))
    }

    /// Encodes the native in-memory layout: the first three fields
    /// little-endian, `data4` verbatim.
    pub fn to_bytes_le(&self) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&self.data1.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.data2.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.data3.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.data4);
        bytes
    }

    /// Decodes the layout written by [`Guid::to_bytes_le`].
    pub fn from_bytes_le(bytes: [u8; 16]) -> Self {
        let mut data4 = [0u8; 8];
        data4.copy_from_slice(&bytes[8..16]);
        Self {
            data1: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            data2: u16::from_le_bytes([bytes[4], bytes[5]]),
            data3: u16::from_le_bytes([bytes[6], bytes[7]]),
            data4,
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({self})")
    }
}

impl FromStr for Guid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Guid {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Guid> for String {
    fn from(value: Guid) -> Self {
        value.to_string()
    }
}

#[cfg(windows)]
impl From<Guid> for windows_core::GUID {
    fn from(value: Guid) -> Self {
        windows_core::GUID::from_u128(value.to_u128())
    }
}

#[cfg(windows)]
impl From<windows_core::GUID> for Guid {
    fn from(value: windows_core::GUID) -> Self {
        Guid::from_u128(value.to_u128())
    }
}
