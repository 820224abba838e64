use crate::att::{Handle, HandleRange};
use crate::gatt::{CharProps, Declaration};

use super::*;

/// Server configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Config {
    /// Handle of the service declaration. The remaining attributes occupy the
    /// following handles (see [`Layout`]).
    pub start_handle: Handle,
    /// Number of Broadcast Receive State characteristics.
    pub receive_states: u8,
    /// Maximum number of simultaneously connected clients.
    pub max_clients: u8,
    /// Configuration of a client that registers without one.
    pub default_ccc: Ccc,
}

impl Config {
    /// Creates a configuration with `n` receive states.
    #[inline]
    #[must_use]
    pub fn new(n: u8) -> Self {
        Self {
            receive_states: n,
            ..Self::default()
        }
    }

    /// Sets the handle of the service declaration.
    #[inline]
    #[must_use]
    pub const fn with_start_handle(mut self, h: Handle) -> Self {
        self.start_handle = h;
        self
    }

    /// Sets the maximum number of connected clients.
    #[inline]
    #[must_use]
    pub const fn with_max_clients(mut self, n: u8) -> Self {
        self.max_clients = n;
        self
    }

    /// Sets the default client configuration.
    #[inline]
    #[must_use]
    pub const fn with_default_ccc(mut self, v: Ccc) -> Self {
        self.default_ccc = v;
        self
    }

    /// Returns the attribute layout of the service.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    #[inline]
    pub fn layout(&self) -> Layout {
        assert!(self.receive_states > 0, "at least one receive state required");
        assert!(self.max_clients > 0, "at least one client required");
        assert!(!self.default_ccc.is_indicate(), "invalid default CCC");
        let end = (self.start_handle)
            .offset(2 + 3 * u16::from(self.receive_states))
            .expect("service handle range overflow");
        Layout {
            range: HandleRange::new(self.start_handle, end),
        }
    }
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            start_handle: Handle::MIN,
            receive_states: 1,
            max_clients: 1,
            default_ccc: Ccc::UNWRITTEN,
        }
    }
}

/// Service attribute that maps to a server operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum Attr {
    Declaration,
    ControlPoint,
    ReceiveState(usize),
    Cccd(usize),
}

/// Attribute entry for registering the service with the GATT transport.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Entry {
    /// Primary service declaration.
    Service { hdl: Handle, uuid: u16 },
    /// Characteristic declaration and value.
    Characteristic {
        hdl: Handle,
        props: CharProps,
        value: Handle,
        uuid: u16,
    },
    /// Client Characteristic Configuration descriptor.
    Cccd { hdl: Handle },
}

impl Entry {
    /// Returns the attribute type of the declaration.
    #[inline]
    #[must_use]
    pub const fn typ(&self) -> Declaration {
        match *self {
            Self::Service { .. } => Declaration::PrimaryService,
            Self::Characteristic { .. } => Declaration::Characteristic,
            Self::Cccd { .. } => Declaration::ClientCharacteristicConfiguration,
        }
    }
}

/// Attribute handle assignment:
///
/// ```text
/// start + 0       Primary service declaration
/// start + 1       Control Point declaration
/// start + 2       Control Point value
/// start + 3 + 3i  Broadcast Receive State i declaration
/// start + 4 + 3i  Broadcast Receive State i value
/// start + 5 + 3i  Broadcast Receive State i CCCD
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Layout {
    range: HandleRange,
}

impl Layout {
    /// Returns the handle range of the service.
    #[inline(always)]
    pub const fn range(&self) -> HandleRange {
        self.range
    }

    /// Returns the Control Point value handle.
    #[inline]
    #[must_use]
    pub fn control_point(&self) -> Handle {
        self.handle(2)
    }

    /// Returns the value handle of receive state `i`.
    #[inline]
    #[must_use]
    pub fn receive_state(&self, i: usize) -> Handle {
        self.handle(4 + 3 * i)
    }

    /// Returns the CCCD handle of receive state `i`.
    #[inline]
    #[must_use]
    pub fn cccd(&self, i: usize) -> Handle {
        self.handle(5 + 3 * i)
    }

    /// Returns the number of receive states.
    #[inline]
    #[must_use]
    pub const fn receive_states(&self) -> usize {
        (self.range.len() - 3) / 3
    }

    /// Returns the attribute entries of the service in handle order.
    pub fn entries(&self) -> impl Iterator<Item = Entry> + '_ {
        let hdr = [
            Entry::Service {
                hdl: self.handle(0),
                uuid: SERVICE_UUID,
            },
            Entry::Characteristic {
                hdl: self.handle(1),
                props: CharProps::WRITE | CharProps::WRITE_WITHOUT_RESPONSE,
                value: self.control_point(),
                uuid: CONTROL_POINT_UUID,
            },
        ];
        let brs = (0..self.receive_states()).flat_map(move |i| {
            [
                Entry::Characteristic {
                    hdl: self.handle(3 + 3 * i),
                    props: CharProps::READ | CharProps::NOTIFY,
                    value: self.receive_state(i),
                    uuid: RECEIVE_STATE_UUID,
                },
                Entry::Cccd { hdl: self.cccd(i) },
            ]
        });
        hdr.into_iter().chain(brs)
    }

    /// Returns the attribute at `hdl`.
    pub(super) fn attr(&self, hdl: Handle) -> Option<Attr> {
        if !self.range.has(hdl) {
            return None;
        }
        let off = usize::from(hdl.since(self.range.start())?);
        Some(match off {
            0 | 1 => Attr::Declaration,
            2 => Attr::ControlPoint,
            _ => match (off - 3) % 3 {
                0 => Attr::Declaration,
                1 => Attr::ReceiveState((off - 3) / 3),
                _ => Attr::Cccd((off - 3) / 3),
            },
        })
    }

    /// Returns the handle at offset `off` from the service declaration, which
    /// is always within the range checked by [`Config::layout`].
    #[allow(clippy::cast_possible_truncation)]
    fn handle(&self, off: usize) -> Handle {
        debug_assert!(off < self.range.len());
        (self.range.start().offset(off as u16)).unwrap_or_else(|| self.range.end())
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use super::*;

    #[test]
    fn layout() {
        let h = |v| Handle::new(v).unwrap();
        let l = Config::new(2).with_start_handle(h(0x10)).layout();
        assert_eq!(l.range(), HandleRange::new(h(0x10), h(0x18)));
        assert_eq!(l.receive_states(), 2);
        assert_eq!(l.control_point(), h(0x12));
        assert_eq!((l.receive_state(0), l.cccd(0)), (h(0x14), h(0x15)));
        assert_eq!((l.receive_state(1), l.cccd(1)), (h(0x17), h(0x18)));

        assert_eq!(l.attr(h(0x0F)), None);
        assert_eq!(l.attr(h(0x10)), Some(Attr::Declaration));
        assert_eq!(l.attr(h(0x12)), Some(Attr::ControlPoint));
        assert_eq!(l.attr(h(0x16)), Some(Attr::Declaration));
        assert_eq!(l.attr(h(0x17)), Some(Attr::ReceiveState(1)));
        assert_eq!(l.attr(h(0x18)), Some(Attr::Cccd(1)));
        assert_eq!(l.attr(h(0x19)), None);
    }

    #[test]
    fn entries() {
        let l = Config::new(1).layout();
        let e: Vec<_> = l.entries().collect();
        assert_eq!(e.len(), 4);
        assert_eq!(e[0].typ(), Declaration::PrimaryService);
        assert_matches!(
            e[2],
            Entry::Characteristic { uuid: RECEIVE_STATE_UUID, props, .. } if props.contains(CharProps::NOTIFY)
        );
        assert_eq!(e[3], Entry::Cccd { hdl: l.cccd(0) });
    }

    #[test]
    #[should_panic]
    fn no_receive_states() {
        let _ = Config::new(0).layout();
    }
}
