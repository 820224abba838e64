use std::fmt::{Debug, Formatter};

use serde::{Deserialize, Serialize};

use crate::gatt::Cccd;

use super::*;

/// Client Characteristic Configuration of one Broadcast Receive State
/// characteristic. Unlike a raw CCCD value, it distinguishes a configuration
/// that the client never wrote from one that it explicitly disabled.
#[derive(Clone, Copy, Eq, Hash, PartialEq, Deserialize, Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Ccc(u16);

impl Ccc {
    /// Configuration that was never written by the client.
    pub const UNWRITTEN: Self = Self(0xFFFF);
    /// Notifications disabled.
    pub const DISABLED: Self = Self(0);
    /// Notifications enabled.
    pub const NOTIFY: Self = Self(Cccd::NOTIFY.bits());

    /// Creates a configuration from a raw CCCD value.
    #[inline(always)]
    #[must_use]
    pub const fn from_raw(v: u16) -> Self {
        Self(v)
    }

    /// Returns the raw value, which is `0xFFFF` if the configuration was never
    /// written.
    #[inline(always)]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns the CCCD value seen by the client.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u16 {
        if self.is_written() {
            self.0
        } else {
            0
        }
    }

    /// Returns whether the client wrote the configuration.
    #[inline(always)]
    #[must_use]
    pub const fn is_written(self) -> bool {
        self.0 != Self::UNWRITTEN.0
    }

    /// Returns whether notifications are enabled.
    #[inline(always)]
    #[must_use]
    pub const fn is_notify(self) -> bool {
        self.0 == Self::NOTIFY.0
    }

    /// Returns whether indications are requested, which Broadcast Receive
    /// State characteristics do not support.
    #[inline]
    #[must_use]
    pub const fn is_indicate(self) -> bool {
        self.is_written() && Cccd::from_bits_retain(self.0).contains(Cccd::INDICATE)
    }
}

impl Default for Ccc {
    #[inline]
    fn default() -> Self {
        Self::UNWRITTEN
    }
}

impl Debug for Ccc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::UNWRITTEN => f.write_str("Ccc(Unwritten)"),
            Self::DISABLED => f.write_str("Ccc(Disabled)"),
            Self::NOTIFY => f.write_str("Ccc(Notify)"),
            Self(v) => write!(f, "Ccc({v:#06X})"),
        }
    }
}

/// Per-client configuration with one [`Ccc`] per receive state slot.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ClientConfig(Vec<Ccc>);

impl ClientConfig {
    /// Creates a configuration of `n` slots set to `v`.
    #[inline]
    #[must_use]
    pub fn new(n: usize, v: Ccc) -> Self {
        Self(vec![v; n])
    }

    /// Returns the number of slots.
    #[inline(always)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the configuration has no slots.
    #[inline(always)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the configuration of slot `i`.
    #[inline]
    #[must_use]
    pub fn get(&self, i: usize) -> Option<Ccc> {
        self.0.get(i).copied()
    }

    /// Sets the configuration of slot `i`. Returns whether the value changed.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    #[inline]
    pub fn set(&mut self, i: usize, v: Ccc) -> bool {
        std::mem::replace(&mut self.0[i], v) != v
    }

    /// Returns an iterator over slot configurations.
    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = Ccc> + '_ {
        self.0.iter().copied()
    }

    /// Returns whether the client wrote the configuration of every slot.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.0.iter().all(|c| c.is_written())
    }

    /// Verifies that the configuration fits a server with `n` slots.
    pub(super) fn validate(&self, n: usize) -> Result<()> {
        if self.0.len() != n {
            return Err(Error::InvalidParameter);
        }
        if self.0.iter().any(|c| c.is_indicate()) {
            return Err(Error::ImproperCcc);
        }
        Ok(())
    }
}

impl FromIterator<Ccc> for ClientConfig {
    #[inline]
    fn from_iter<I: IntoIterator<Item = Ccc>>(it: I) -> Self {
        Self(it.into_iter().collect())
    }
}

impl From<Vec<Ccc>> for ClientConfig {
    #[inline]
    fn from(v: Vec<Ccc>) -> Self {
        Self(v)
    }
}
