/// Unpacker of little-endian values from a byte slice. Each read either
/// consumes exactly the requested number of bytes or fails without consuming
/// anything, so a decoder can never observe bytes past the end of its input.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[must_use]
#[repr(transparent)]
pub(crate) struct Unpkr<'a>(&'a [u8]);

/// Error returned when the input is shorter than a read requires.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unexpected end of input (need {need} bytes, have {have})")]
pub(crate) struct ShortRead {
    pub need: usize,
    pub have: usize,
}

type Result<T> = std::result::Result<T, ShortRead>;

impl<'a> Unpkr<'a> {
    /// Creates a new unpacker.
    #[inline]
    pub const fn new(b: &'a [u8]) -> Self {
        Self(b)
    }

    /// Returns the number of remaining bytes.
    #[inline(always)]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether all bytes were consumed.
    #[inline(always)]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes and returns the next `n` bytes.
    #[inline]
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.0.len() {
            return Err(ShortRead {
                need: n,
                have: self.0.len(),
            });
        }
        let (v, rest) = self.0.split_at(n);
        self.0 = rest;
        Ok(v)
    }

    /// Consumes and returns the next `N` bytes as an array.
    #[inline]
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut v = [0; N];
        v.copy_from_slice(self.bytes(N)?);
        Ok(v)
    }

    /// Returns the next `u8`.
    #[inline]
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    /// Returns the next `u16`.
    #[inline]
    pub fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    /// Returns the next 24-bit value.
    #[inline]
    pub fn u24(&mut self) -> Result<u32> {
        let [a, b, c] = self.array()?;
        Ok(u32::from_le_bytes([a, b, c, 0]))
    }

    /// Returns the next `u32`.
    #[inline]
    pub fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }
}

impl<'a> AsRef<[u8]> for Unpkr<'a> {
    #[inline(always)]
    fn as_ref(&self) -> &'a [u8] {
        self.0
    }
}

/// Returns a copy of `v` with the byte order reversed.
#[inline]
#[must_use]
pub(crate) fn reversed<const N: usize>(mut v: [u8; N]) -> [u8; N] {
    v.reverse();
    v
}
