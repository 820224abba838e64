use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::att::ErrorCode;
use crate::gatt::{Cccd, ConnId, IoResult, ReadReq, Transport, WriteReq};

use super::config::Attr;
use super::handover::Session;
use super::state::Source;
use super::*;

/// Connected client.
#[derive(Clone, Debug)]
pub(super) struct Client {
    pub cid: ConnId,
    pub cfg: ClientConfig,
}

/// Broadcast Audio Scan Service server.
#[derive(Debug)]
pub struct Server<T> {
    pub(super) cfg: Config,
    pub(super) layout: Layout,
    /// Receive state slots. A source in slot `i` has ID `i + 1`.
    pub(super) srcs: Vec<Option<Source>>,
    /// Connected clients, in registration order.
    pub(super) clients: Vec<Client>,
    pub(super) ho: Option<Session>,
    ind: mpsc::UnboundedSender<Indication>,
    io: T,
}

impl<T: Transport> Server<T> {
    /// Creates a new server that sends notifications via `io` and application
    /// events via `ind`.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid.
    #[must_use]
    pub fn new(cfg: Config, io: T, ind: mpsc::UnboundedSender<Indication>) -> Self {
        let layout = cfg.layout();
        Self {
            cfg,
            layout,
            srcs: vec![None; usize::from(cfg.receive_states)],
            clients: Vec::with_capacity(usize::from(cfg.max_clients)),
            ho: None,
            ind,
            io,
        }
    }

    /// Returns the server configuration.
    #[inline(always)]
    pub const fn config(&self) -> &Config {
        &self.cfg
    }

    /// Returns the attribute layout.
    #[inline(always)]
    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns the transport.
    #[inline(always)]
    pub const fn transport(&self) -> &T {
        &self.io
    }

    /// Returns the transport.
    #[inline(always)]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.io
    }

    /// Registers a connected client. If `cfg` is `None`, the default
    /// configuration is used. Otherwise, the client is notified of every
    /// occupied slot that it has configured for notifications. A client that
    /// is already registered has its configuration replaced.
    pub fn add_client(&mut self, cid: ConnId, cfg: Option<ClientConfig>) -> Result<()> {
        let n = self.srcs.len();
        let restored = cfg.is_some();
        let cfg = cfg.unwrap_or_else(|| ClientConfig::new(n, self.cfg.default_ccc));
        cfg.validate(n).map_err(|e| {
            warn!("Invalid configuration for {cid}: {e}");
            e
        })?;
        let ci = if let Some(ci) = self.client_index(cid) {
            debug!("Replacing configuration of {cid}");
            self.clients[ci].cfg = cfg;
            ci
        } else if self.clients.len() < usize::from(self.cfg.max_clients) {
            debug!("Adding client {cid}");
            self.clients.push(Client { cid, cfg });
            self.clients.len() - 1
        } else {
            warn!("No room for client {cid}");
            return Err(Error::InsufficientResources);
        };
        if restored {
            for i in 0..n {
                if self.srcs[i].is_some() {
                    self.notify_client(ci, i);
                }
            }
        }
        Ok(())
    }

    /// Unregisters a disconnected client, returning its last configuration.
    pub fn remove_client(&mut self, cid: ConnId) -> Option<ClientConfig> {
        let ci = self.client_index(cid)?;
        debug!("Removing client {cid}");
        Some(self.clients.remove(ci).cfg)
    }

    /// Returns the configuration of a client.
    #[must_use]
    pub fn client_config(&self, cid: ConnId) -> Option<ClientConfig> {
        (self.client_index(cid)).map(|ci| self.clients[ci].cfg.clone())
    }

    /// Returns whether any client is registered.
    #[inline]
    #[must_use]
    pub fn is_any_client_connected(&self) -> bool {
        !self.clients.is_empty()
    }

    /// Returns the source ID of every slot, which is 0 for empty slots.
    #[must_use]
    pub fn source_ids(&self) -> Vec<u8> {
        (self.srcs.iter())
            .map(|s| s.as_ref().map_or(0, |s| s.id))
            .collect()
    }

    /// Adds a new source if `source_id` is 0, returning the assigned ID.
    /// Otherwise, replaces the state and Broadcast_Code of an existing source.
    /// The old source is subject to the same guard as [`Self::remove_source`],
    /// so a synchronized source cannot be replaced this way. Clients are
    /// notified of the cleared slot and then of the new state.
    pub fn add_or_update_source(&mut self, source_id: u8, st: ReceiveState) -> Result<u8> {
        validate(&st)?;
        if source_id == 0 {
            let Some(i) = self.srcs.iter().position(Option::is_none) else {
                warn!("No empty slot for {}", st.addr);
                return Err(Error::NoEmptySlot);
            };
            #[allow(clippy::cast_possible_truncation)]
            let id = i as u8 + 1;
            debug!("Adding source {id}: {st:?}");
            self.srcs[i] = Some(Source {
                id,
                st,
                code: BroadcastCode::default(),
            });
            self.notify_slot(i);
            return Ok(id);
        }
        let i = self.slot_index(source_id)?;
        let Some(src) = self.srcs[i].as_ref() else {
            return Err(Error::InvalidSourceId(source_id));
        };
        if !src.st.differs(&st) {
            return Ok(source_id);
        }
        if src.st.is_synchronized() {
            warn!("Cannot replace synchronized source {source_id}");
            return Err(Error::SourceInSync(source_id));
        }
        debug!("Replacing source {source_id}: {st:?}");
        self.srcs[i] = None;
        self.notify_slot(i);
        self.srcs[i] = Some(Source {
            id: source_id,
            st,
            code: BroadcastCode::default(),
        });
        self.notify_slot(i);
        Ok(source_id)
    }

    /// Changes the state of an existing source. Clients are notified only if
    /// the state is different.
    pub fn modify_source(&mut self, source_id: u8, st: ReceiveState) -> Result<Update> {
        validate(&st)?;
        let i = self.slot_index(source_id)?;
        let Some(src) = self.srcs[i].as_mut() else {
            return Err(Error::InvalidSourceId(source_id));
        };
        if !src.st.differs(&st) {
            return Ok(Update::Unchanged);
        }
        debug!("Modifying source {source_id}: {st:?}");
        src.st = st;
        self.notify_slot(i);
        Ok(Update::Changed)
    }

    /// Removes an unsynchronized source.
    pub fn remove_source(&mut self, source_id: u8) -> Result<()> {
        let i = self.slot_index(source_id)?;
        if (self.srcs[i].as_ref()).map_or(false, |s| s.st.is_synchronized()) {
            warn!("Cannot remove synchronized source {source_id}");
            return Err(Error::SourceInSync(source_id));
        }
        debug!("Removing source {source_id}");
        self.srcs[i] = None;
        self.notify_slot(i);
        Ok(())
    }

    /// Returns the state of a source.
    pub fn receive_state(&self, source_id: u8) -> Result<&ReceiveState> {
        let i = self.slot_index(source_id)?;
        (self.srcs[i].as_ref())
            .map(|s| &s.st)
            .ok_or(Error::InvalidSourceId(source_id))
    }

    /// Returns the Broadcast_Code of a source, which is all zeros if it was
    /// never set.
    pub fn broadcast_code(&self, source_id: u8) -> Result<BroadcastCode> {
        let i = self.slot_index(source_id)?;
        (self.srcs[i].as_ref())
            .map(|s| s.code)
            .ok_or(Error::InvalidSourceId(source_id))
    }

    /// Sets the Broadcast_Code of a source. The code is never sent to clients.
    pub fn set_broadcast_code(&mut self, source_id: u8, code: BroadcastCode) -> Result<()> {
        let i = self.slot_index(source_id)?;
        let src = (self.srcs[i].as_mut()).ok_or(Error::InvalidSourceId(source_id))?;
        src.code = code;
        Ok(())
    }

    /// Handles an attribute read request.
    pub fn read(&self, r: &ReadReq) -> IoResult<Vec<u8>> {
        match self.layout.attr(r.handle()) {
            None | Some(Attr::Declaration) => Err(ErrorCode::InvalidHandle),
            Some(Attr::ControlPoint) => Err(ErrorCode::RequestNotSupported),
            Some(Attr::ReceiveState(i)) => {
                let v = self.srcs[i].as_ref().map(Source::encode);
                (r.complete(v.as_deref().unwrap_or_default())).map(<[u8]>::to_vec)
            }
            Some(Attr::Cccd(i)) => {
                let Some(ci) = self.client_index(r.conn()) else {
                    warn!("CCCD read from unknown client {}", r.conn());
                    return Err(ErrorCode::InvalidHandle);
                };
                let ccc = self.clients[ci].cfg.get(i).unwrap_or_default();
                r.complete(&ccc.value().to_le_bytes()).map(<[u8]>::to_vec)
            }
        }
    }

    /// Handles an attribute write request.
    pub fn write(&mut self, w: &WriteReq) -> IoResult {
        match self.layout.attr(w.handle()) {
            None | Some(Attr::Declaration) => Err(ErrorCode::InvalidHandle),
            Some(Attr::ReceiveState(_)) => Err(ErrorCode::RequestNotSupported),
            Some(Attr::ControlPoint) => self.write_control_point(w.conn(), w.value()),
            Some(Attr::Cccd(i)) => self.write_cccd(w.conn(), i, w.value()),
        }
    }

    /// Handles a Broadcast Audio Scan Control Point write. Valid requests are
    /// forwarded to the application without changing the table, except for
    /// the Broadcast_Code, which is stored immediately.
    fn write_control_point(&mut self, cid: ConnId, v: &[u8]) -> IoResult {
        let req = match Request::decode(v) {
            Ok(req) => req,
            // Unknown Source_ID takes precedence over invalid parameters
            Err(e @ CpError::InvalidParameter(Opcode::ModifySource, _)) => {
                let id = v.get(1).copied().unwrap_or_default();
                warn!("Invalid control point write from {cid}: {e}");
                return Err(self.slot_index(id).map_or(ErrorCode::InvalidSourceId, |_| e.code()));
            }
            Err(e) => {
                warn!("Invalid control point write from {cid}: {e}");
                return Err(e.code());
            }
        };
        debug!("Control point write from {cid}: {req:?}");
        let ind = match req {
            Request::RemoteScanStopped => Indication::ScanningState {
                cid,
                scanning: false,
            },
            Request::RemoteScanStarted => Indication::ScanningState {
                cid,
                scanning: true,
            },
            Request::AddSource(req) => Indication::AddSource { cid, req },
            Request::ModifySource(req) => {
                self.slot_index(req.source_id).map_err(|e| {
                    warn!("Modify Source from {cid}: {e}");
                    ErrorCode::from(e)
                })?;
                Indication::ModifySource { cid, req }
            }
            Request::SetBroadcastCode { source_id, code } => {
                self.set_broadcast_code(source_id, code).map_err(|e| {
                    warn!("Set Broadcast_Code from {cid}: {e}");
                    ErrorCode::from(e)
                })?;
                Indication::BroadcastCode {
                    cid,
                    source_id,
                    code,
                }
            }
            Request::RemoveSource { source_id } => {
                let i = self.slot_index(source_id).map_err(|e| {
                    warn!("Remove Source from {cid}: {e}");
                    ErrorCode::from(e)
                })?;
                if (self.srcs[i].as_ref()).map_or(false, |s| s.st.is_synchronized()) {
                    warn!("Remove Source from {cid}: source {source_id} is synchronized");
                    return Err(ErrorCode::SourceInSync);
                }
                Indication::RemoveSource { cid, source_id }
            }
        };
        self.indicate(ind);
        Ok(())
    }

    /// Handles a Broadcast Receive State CCCD write.
    fn write_cccd(&mut self, cid: ConnId, i: usize, v: &[u8]) -> IoResult {
        let Some(ci) = self.client_index(cid) else {
            warn!("CCCD write from unknown client {cid}");
            return Err(ErrorCode::InvalidHandle);
        };
        let Ok(v) = <[u8; 2]>::try_from(v) else {
            return Err(ErrorCode::InvalidAttributeValueLength);
        };
        let v = Cccd::from_bits_retain(u16::from_le_bytes(v));
        let ccc = if v == Cccd::INDICATE {
            warn!("{cid} requested indications for receive state {i}");
            return Err(ErrorCode::CccdImproperlyConfigured);
        } else if v == Cccd::NOTIFY {
            Ccc::NOTIFY
        } else if v.is_empty() {
            Ccc::DISABLED
        } else {
            debug!("Ignoring CCCD value {:#06X} from {cid}", v.bits());
            return Ok(());
        };
        let cfg = &mut self.clients[ci].cfg;
        if cfg.set(i, ccc) {
            let complete = cfg.is_complete();
            debug!("{cid} configured receive state {i}: {ccc:?}");
            self.indicate(Indication::ConfigChanged { cid, complete });
        }
        Ok(())
    }

    /// Returns the index of the slot containing `source_id`.
    pub(super) fn slot_index(&self, source_id: u8) -> Result<usize> {
        (self.srcs.iter())
            .position(|s| s.as_ref().map_or(false, |s| s.id == source_id))
            .ok_or(Error::InvalidSourceId(source_id))
    }

    /// Returns the index of a registered client.
    pub(super) fn client_index(&self, cid: ConnId) -> Option<usize> {
        self.clients.iter().position(|c| c.cid == cid)
    }

    /// Notifies all subscribed clients of the current value of slot `i`, which
    /// is empty if the slot is not occupied.
    pub(super) fn notify_slot(&mut self, i: usize) {
        for ci in 0..self.clients.len() {
            self.notify_client(ci, i);
        }
    }

    /// Notifies client `ci` of the current value of slot `i` if the client is
    /// subscribed. Each notification encodes its own copy of the value.
    pub(super) fn notify_client(&mut self, ci: usize, i: usize) {
        let c = &self.clients[ci];
        if !c.cfg.get(i).map_or(false, Ccc::is_notify) {
            return;
        }
        let v = self.srcs[i].as_ref().map(Source::encode);
        (self.io).notify(c.cid, self.layout.receive_state(i), v.as_deref().unwrap_or_default());
    }

    /// Sends an event to the application.
    fn indicate(&self, ind: Indication) {
        if let Err(e) = self.ind.send(ind) {
            warn!("Application indication dropped: {:?}", e.0);
        }
    }
}

/// Validates a receive state provided by the application.
fn validate(st: &ReceiveState) -> Result<()> {
    st.validate().map_err(|e| {
        warn!("Invalid receive state: {st:?}");
        e
    })
}
