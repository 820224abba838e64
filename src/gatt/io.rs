use std::fmt::{Debug, Formatter};
use std::num::NonZeroU32;

use crate::att::{ErrorCode, Handle};
use crate::util::name_of;

/// I/O callback result type.
pub type IoResult<T = ()> = std::result::Result<T, ErrorCode>;

/// Connection identifier assigned by the GATT transport. Zero is reserved.
#[derive(
    Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ConnId(NonZeroU32);

impl ConnId {
    /// Wraps a raw connection identifier. Returns `None` if the identifier is
    /// zero.
    #[inline]
    #[must_use]
    pub const fn new(id: u32) -> Option<Self> {
        match NonZeroU32::new(id) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }
}

impl Debug for ConnId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", name_of!(ConnId), self.0.get())
    }
}

impl From<ConnId> for u32 {
    #[inline]
    fn from(id: ConnId) -> Self {
        id.0.get()
    }
}

crate::util::impl_display_via_debug! { ConnId }

/// Outbound half of the GATT transport.
pub trait Transport {
    /// Sends a Handle Value Notification with value `val` for attribute `hdl`
    /// to connection `cid`. Delivery is best-effort.
    fn notify(&mut self, cid: ConnId, hdl: Handle, val: &[u8]);
}

/// Notification recorded by the [`Vec`] transport.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NotifyVal {
    pub cid: ConnId,
    pub hdl: Handle,
    pub val: Vec<u8>,
}

/// A transport that records notifications instead of sending them.
impl Transport for Vec<NotifyVal> {
    #[inline]
    fn notify(&mut self, cid: ConnId, hdl: Handle, val: &[u8]) {
        self.push(NotifyVal {
            cid,
            hdl,
            val: val.to_vec(),
        });
    }
}

/// Server characteristic or descriptor read request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadReq {
    pub(crate) cid: ConnId,
    pub(crate) hdl: Handle,
    pub(crate) off: u16,
    pub(crate) mtu: u16,
}

impl ReadReq {
    /// Minimum ATT_MTU ([Vol 3] Part F, Section 3.2.8).
    pub const MIN_MTU: u16 = 23;

    /// Creates a read request for the value of `hdl` starting at offset `off`.
    /// The response is limited by `mtu`, which is clamped to
    /// [`Self::MIN_MTU`].
    #[inline]
    #[must_use]
    pub const fn new(cid: ConnId, hdl: Handle, off: u16, mtu: u16) -> Self {
        Self {
            cid,
            hdl,
            off,
            mtu: if mtu < Self::MIN_MTU { Self::MIN_MTU } else { mtu },
        }
    }

    /// Returns the connection identifier.
    #[inline(always)]
    #[must_use]
    pub const fn conn(&self) -> ConnId {
        self.cid
    }

    /// Returns the attribute handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Returns the value offset.
    #[inline(always)]
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.off as _
    }

    /// Returns the portion of the complete attribute value `v` requested by
    /// the client. Returns `InvalidOffset` if the offset is past the end of the
    /// value. The result is truncated to fit in an ATT_READ_RSP PDU.
    #[inline]
    pub fn complete<'a>(&self, v: &'a [u8]) -> IoResult<&'a [u8]> {
        let v = v.get(self.offset()..).ok_or(ErrorCode::InvalidOffset)?;
        Ok(&v[..v.len().min(usize::from(self.mtu) - 1)])
    }
}

/// Server characteristic or descriptor write request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WriteReq<'a> {
    pub(crate) cid: ConnId,
    pub(crate) hdl: Handle,
    pub(crate) val: &'a [u8],
}

impl<'a> WriteReq<'a> {
    /// Creates a write request of `val` to the attribute `hdl`.
    #[inline]
    #[must_use]
    pub const fn new(cid: ConnId, hdl: Handle, val: &'a [u8]) -> Self {
        Self { cid, hdl, val }
    }

    /// Returns the connection identifier.
    #[inline(always)]
    #[must_use]
    pub const fn conn(&self) -> ConnId {
        self.cid
    }

    /// Returns the attribute handle.
    #[inline(always)]
    #[must_use]
    pub const fn handle(&self) -> Handle {
        self.hdl
    }

    /// Returns the written value.
    #[inline(always)]
    #[must_use]
    pub const fn value(&self) -> &'a [u8] {
        self.val
    }
}

impl<'a> AsRef<[u8]> for WriteReq<'a> {
    #[inline(always)]
    fn as_ref(&self) -> &'a [u8] {
        self.val
    }
}
