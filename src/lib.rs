//! Blackrock User-Mode Bluetooth LE Audio: Broadcast Audio Scan Service.
//!
//! A GATT server implementation of the scan delegator role of [BASS]. The
//! crate owns the Broadcast Receive State table, validates Broadcast Audio Scan
//! Control Point writes, fans out notifications to subscribed clients, and
//! transfers its state between two cooperating radios during handover.
//!
//! The GATT transport and the application layer that performs PA/BIG
//! synchronization are external collaborators. The transport delivers reads
//! and writes via [`bass::Server::read`] and [`bass::Server::write`] and
//! receives notifications through [`gatt::Transport`]. The application
//! consumes [`bass::Indication`]s and updates the table through the
//! [`bass::Server`] mutation API once the radio state is real.
//!
//! [BASS]: https://www.bluetooth.com/specifications/specs/broadcast-audio-scan-service-1-0/

pub mod att;
pub mod bass;
pub mod gatt;
pub mod le;

mod util;
