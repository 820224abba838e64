//! Broadcast Audio Scan Service ([BASS]) server.
//!
//! [`Server`] owns a fixed number of Broadcast Receive State slots and the
//! configuration of every connected client. Control Point writes are validated
//! and turned into [`Indication`]s for the application, which performs the
//! requested PA/BIG synchronization and reports the outcome back through the
//! mutation API (`add_or_update_source`, `modify_source`, `remove_source`).
//! Only the mutation API changes the table, and every change is notified to
//! subscribed clients after it is applied.
//!
//! The handover methods transfer the table and client configurations to a
//! peer radio in multiple steps (see [`Server::handover_marshal`]).
//!
//! [BASS]: https://www.bluetooth.com/specifications/specs/broadcast-audio-scan-service-1-0/

use crate::att::ErrorCode;
use crate::gatt::ConnId;

pub use {client::*, config::*, consts::*, cp::*, handover::*, server::*, state::*};

mod client;
mod config;
mod consts;
mod cp;
mod handover;
mod server;
mod state;

/// Error type returned by the BASS mutation API.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("invalid source ID {0}")]
    InvalidSourceId(u8),
    #[error("source {0} is synchronized to PA or BIS")]
    SourceInSync(u8),
    #[error("no empty receive state slot")]
    NoEmptySlot,
    #[error("insufficient resources")]
    InsufficientResources,
    #[error("client characteristic configuration not allowed")]
    ImproperCcc,
}

impl From<Error> for ErrorCode {
    fn from(e: Error) -> Self {
        match e {
            Error::InvalidParameter => Self::WriteRequestRejected,
            Error::InvalidSourceId(_) => Self::InvalidSourceId,
            Error::SourceInSync(_) => Self::SourceInSync,
            Error::NoEmptySlot | Error::InsufficientResources => Self::InsufficientResources,
            Error::ImproperCcc => Self::CccdImproperlyConfigured,
        }
    }
}

/// Common BASS result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a successful receive state update.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[must_use]
pub enum Update {
    /// The state was changed and clients were notified.
    Changed,
    /// The new state was identical to the existing one.
    Unchanged,
}

/// Event sent to the application.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Indication {
    /// The client started or stopped scanning on behalf of the server.
    ScanningState { cid: ConnId, scanning: bool },
    /// The client requested synchronization to a new source.
    AddSource { cid: ConnId, req: AddSource },
    /// The client requested a change to an existing source.
    ModifySource { cid: ConnId, req: ModifySource },
    /// The client requested removal of an unsynchronized source.
    RemoveSource { cid: ConnId, source_id: u8 },
    /// The client provided the Broadcast_Code of a source. The code was stored
    /// before this indication was sent.
    BroadcastCode {
        cid: ConnId,
        source_id: u8,
        code: BroadcastCode,
    },
    /// The client changed a Broadcast Receive State CCCD. `complete` is set
    /// once every CCCD of the client has been written.
    ConfigChanged { cid: ConnId, complete: bool },
}
