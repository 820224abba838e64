//! LE-specific types.

use std::fmt::{Debug, Display, Formatter};

/// Advertiser address ([Vol 6] Part B, Section 1.3) of a broadcast source.
#[allow(clippy::exhaustive_enums)]
#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub enum Addr {
    Public(RawAddr),
    Random(RawAddr),
}

impl Addr {
    /// Constructs an address from the Advertiser_Address_Type and raw
    /// components. Returns `None` if the type is neither public (`0x00`) nor
    /// random (`0x01`).
    #[inline]
    #[must_use]
    pub const fn new(typ: u8, raw: RawAddr) -> Option<Self> {
        match typ {
            0x00 => Some(Self::Public(raw)),
            0x01 => Some(Self::Random(raw)),
            _ => None,
        }
    }

    /// Returns the Advertiser_Address_Type value.
    #[inline]
    #[must_use]
    pub const fn typ(self) -> u8 {
        match self {
            Self::Public(_) => 0x00,
            Self::Random(_) => 0x01,
        }
    }

    /// Returns the raw 48-bit address.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> RawAddr {
        match self {
            Self::Public(addr) | Self::Random(addr) => addr,
        }
    }
}

impl Default for Addr {
    #[inline]
    fn default() -> Self {
        Self::Public(RawAddr::default())
    }
}

impl Display for Addr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Public(raw) => write!(f, "{raw} (public)"),
            Self::Random(raw) => write!(f, "{raw} (random)"),
        }
    }
}

/// 48-bit untyped device address stored in little-endian byte order, which is
/// also the order in which it is transmitted.
#[derive(
    Clone, Copy, Default, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[repr(transparent)]
pub struct RawAddr([u8; 6]);

impl RawAddr {
    /// Returns the address bytes in little-endian order.
    #[inline(always)]
    #[must_use]
    pub const fn to_le_bytes(self) -> [u8; 6] {
        self.0
    }
}

impl From<[u8; 6]> for RawAddr {
    #[inline]
    fn from(v: [u8; 6]) -> Self {
        Self(v)
    }
}

impl AsRef<[u8]> for RawAddr {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl Debug for RawAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // [Vol 3] Part C, Section 3.2.1.3
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[5], self.0[4], self.0[3], self.0[2], self.0[1], self.0[0]
        )
    }
}

impl Display for RawAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}
