use std::fmt::{Debug, Display, Formatter};
use std::num::NonZeroU16;
use std::ops::{Bound, RangeBounds};

use crate::util::name_of;

/// Attribute handle ([Vol 3] Part F, Section 3.2.2).
#[derive(
    Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Handle(NonZeroU16);

impl Handle {
    /// Minimum handle value.
    pub const MIN: Self = match Self::new(0x0001) {
        Some(h) => h,
        None => unreachable!(),
    };

    /// Wraps a raw handle. Returns `None` if the handle is invalid.
    #[inline]
    #[must_use]
    pub const fn new(h: u16) -> Option<Self> {
        match NonZeroU16::new(h) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns the handle `n` positions after this one or `None` if the
    /// result would overflow the handle space.
    #[inline]
    #[must_use]
    pub const fn offset(self, n: u16) -> Option<Self> {
        match self.0.get().checked_add(n) {
            Some(h) => Self::new(h),
            None => None,
        }
    }

    /// Returns the distance from `base` to this handle or `None` if this handle
    /// precedes `base`.
    #[inline]
    #[must_use]
    pub(crate) const fn since(self, base: Self) -> Option<u16> {
        self.0.get().checked_sub(base.0.get())
    }
}

impl Debug for Handle {
    #[allow(clippy::use_self)]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#06X})", name_of!(Handle), self.0.get())
    }
}

impl Display for Handle {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<Handle> for u16 {
    #[inline]
    fn from(h: Handle) -> Self {
        h.0.get()
    }
}

/// Inclusive range of attribute handles occupied by a service.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[must_use]
pub struct HandleRange {
    start: Handle,
    end: Handle,
}

impl HandleRange {
    /// Creates a new handle range `start..=end`.
    #[inline]
    pub const fn new(start: Handle, end: Handle) -> Self {
        assert!(start.0.get() <= end.0.get());
        Self { start, end }
    }

    /// Returns the starting handle.
    #[inline(always)]
    #[must_use]
    pub const fn start(self) -> Handle {
        self.start
    }

    /// Returns the ending handle.
    #[inline(always)]
    #[must_use]
    pub const fn end(self) -> Handle {
        self.end
    }

    /// Returns the number of handles in the range.
    #[inline]
    #[must_use]
    pub const fn len(self) -> usize {
        (self.end.0.get() - self.start.0.get()) as usize + 1
    }

    /// Returns whether the range contains `hdl`.
    #[inline]
    #[must_use]
    pub const fn has(self, hdl: Handle) -> bool {
        self.start.0.get() <= hdl.0.get() && hdl.0.get() <= self.end.0.get()
    }
}

impl RangeBounds<Handle> for HandleRange {
    #[inline]
    fn start_bound(&self) -> Bound<&Handle> {
        Bound::Included(&self.start)
    }

    #[inline]
    fn end_bound(&self) -> Bound<&Handle> {
        Bound::Included(&self.end)
    }
}
