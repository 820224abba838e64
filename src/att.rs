//! Attribute Protocol ([Vol 3] Part F) types shared with the GATT transport.

pub use {consts::*, handle::*};

mod consts;
mod handle;
