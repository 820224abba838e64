//! Generic Attribute Profile ([Vol 3] Part G) glue between a service and the
//! GATT transport.
//!
//! The transport owns the ATT bearers, attribute discovery, and PDU encoding.
//! A service receives decoded [`ReadReq`]s and [`WriteReq`]s and sends values
//! back through the [`Transport`] trait.

pub use {consts::*, io::*};

mod consts;
mod io;
