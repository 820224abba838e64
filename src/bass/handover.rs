use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::gatt::{ConnId, Transport};

use super::server::Client;
use super::state::Source;
use super::*;

/// Maximum encoded snapshot length.
const MAX_SNAPSHOT_LEN: usize = 64 * 1024;

/// Length of the snapshot length prefix.
const HDR_LEN: usize = 4;

/// Handover error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HandoverError {
    #[error("snapshot codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("invalid snapshot length: {0}")]
    InvalidLength(usize),
    #[error("snapshot of {cid} is incomplete")]
    Truncated { cid: ConnId },
    #[error("step {step} transfer for {cur} is in progress, not {cid}")]
    StepMismatch { step: u8, cur: ConnId, cid: ConnId },
    #[error("snapshot has {0} receive states, expected {1}")]
    Incompatible(usize, usize),
    #[error("unknown connection {0}")]
    UnknownConnection(ConnId),
    #[error("no room for {0}")]
    NoRoom(ConnId),
}

/// Result of one marshal or unmarshal call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Progress {
    /// Number of bytes written or consumed by this call.
    pub len: usize,
    /// Whether the object of the current step was completely transferred and
    /// the session advanced to the next step.
    pub done: bool,
}

/// Snapshot transferred with the first connection: its configuration and the
/// entire receive state table, including broadcast codes.
#[derive(Clone, Debug, Deserialize, Serialize)]
struct TableSnapshot {
    cfg: ClientConfig,
    srcs: Vec<Option<Source>>,
}

/// State of one handover attempt. Created by the first marshal or unmarshal
/// call and destroyed by [`Server::handover_complete`] or
/// [`Server::handover_abort`].
#[derive(Debug, Default)]
pub(super) struct Session {
    step: u8,
    /// Connection whose object is being transferred.
    cur: Option<ConnId>,
    /// Framed object being marshaled or the bytes unmarshaled so far.
    buf: Vec<u8>,
    /// Number of marshaled bytes already written.
    pos: usize,
    /// Snapshot received in step 0.
    table: Option<(ConnId, TableSnapshot)>,
    /// Configurations received in later steps.
    clients: Vec<Client>,
    /// Slot indices that differed between the two tables. Every migrated
    /// client is notified of these slots on commit.
    pending: Vec<usize>,
    /// Whether the received table was compared with the local one.
    reconciled: bool,
}

impl Session {
    /// Returns the connection whose transfer is in progress, which must be
    /// `cid`.
    fn check_cur(&self, cid: ConnId) -> std::result::Result<(), HandoverError> {
        match self.cur {
            Some(cur) if cur != cid => Err(HandoverError::StepMismatch {
                step: self.step,
                cur,
                cid,
            }),
            _ => Ok(()),
        }
    }

    /// Finishes the current step.
    fn advance(&mut self) {
        debug!("Handover step {} complete", self.step);
        self.cur = None;
        self.buf = Vec::new();
        self.pos = 0;
        self.step = self.step.saturating_add(1);
    }

    /// Discards a partially transferred object.
    fn reset_step(&mut self) {
        self.cur = None;
        self.buf = Vec::new();
        self.pos = 0;
    }

    /// Starts marshaling `payload` for `cid`.
    fn start(&mut self, cid: ConnId, payload: &[u8]) -> std::result::Result<(), HandoverError> {
        if payload.len() > MAX_SNAPSHOT_LEN {
            return Err(HandoverError::InvalidLength(payload.len()));
        }
        #[allow(clippy::cast_possible_truncation)]
        let n = payload.len() as u32;
        self.buf = Vec::with_capacity(HDR_LEN + payload.len());
        self.buf.extend_from_slice(&n.to_le_bytes());
        self.buf.extend_from_slice(payload);
        self.pos = 0;
        self.cur = Some(cid);
        debug!("Handover step {} marshaling {} bytes for {cid}", self.step, self.buf.len());
        Ok(())
    }

    /// Copies as much of the current object into `out` as possible.
    fn marshal(&mut self, out: &mut [u8]) -> Progress {
        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        let done = self.pos == self.buf.len();
        if done {
            self.advance();
        }
        Progress { len: n, done }
    }

    /// Accumulates bytes of the current object from `v`. Returns the number of
    /// consumed bytes and whether the object is complete.
    fn fill(&mut self, v: &[u8]) -> std::result::Result<(usize, bool), HandoverError> {
        let mut used = 0;
        if self.buf.len() < HDR_LEN {
            used = (HDR_LEN - self.buf.len()).min(v.len());
            self.buf.extend_from_slice(&v[..used]);
            if self.buf.len() < HDR_LEN {
                return Ok((used, false));
            }
        }
        let mut hdr = [0; HDR_LEN];
        hdr.copy_from_slice(&self.buf[..HDR_LEN]);
        let want = u32::from_le_bytes(hdr) as usize;
        if want > MAX_SNAPSHOT_LEN {
            return Err(HandoverError::InvalidLength(want));
        }
        let n = (HDR_LEN + want - self.buf.len()).min(v.len() - used);
        self.buf.extend_from_slice(&v[used..used + n]);
        used += n;
        Ok((used, self.buf.len() == HDR_LEN + want))
    }

    /// Decodes the complete object of the current step.
    fn finish(
        &mut self,
        cid: ConnId,
        n: usize,
        max_clients: usize,
    ) -> std::result::Result<(), HandoverError> {
        let payload = &self.buf[HDR_LEN..];
        if self.step == 0 {
            let t: TableSnapshot = bincode::deserialize(payload)?;
            if t.cfg.len() != n || t.srcs.len() != n {
                return Err(HandoverError::Incompatible(t.srcs.len(), n));
            }
            t.cfg.validate(n).map_err(|_| HandoverError::Incompatible(t.cfg.len(), n))?;
            info!(
                "Handover table received for {cid} with {} sources",
                t.srcs.iter().flatten().count()
            );
            self.table = Some((cid, t));
        } else {
            let cfg: ClientConfig = bincode::deserialize(payload)?;
            cfg.validate(n).map_err(|_| HandoverError::Incompatible(cfg.len(), n))?;
            if self.clients.len() + 1 >= max_clients {
                return Err(HandoverError::NoRoom(cid));
            }
            info!("Handover configuration received for {cid}");
            self.clients.push(Client { cid, cfg });
        }
        Ok(())
    }

    /// Records slots where the received table differs from `local`. Slots
    /// that match adopt the received Broadcast_Code, which is never sent to
    /// clients.
    fn reconcile(&mut self, local: &mut [Option<Source>]) {
        let Some((_, t)) = &self.table else { return };
        if self.reconciled {
            return;
        }
        self.reconciled = true;
        let mut diff = Vec::new();
        for (i, (r, l)) in t.srcs.iter().zip(local).enumerate() {
            match (r, l) {
                (Some(r), Some(l)) if r.id == l.id && !r.st.differs(&l.st) => l.code = r.code,
                (None, None) => {}
                _ => {
                    debug!("Handover slot {i} differs between radios");
                    diff.push(i);
                }
            }
        }
        for i in diff {
            if !self.pending.contains(&i) {
                self.pending.push(i);
            }
        }
    }
}

impl<T: Transport> Server<T> {
    /// Writes the next part of the handover object for connection `cid` into
    /// `out`. The first completed object (step 0) contains the configuration
    /// of `cid` and the entire receive state table. Every later object
    /// contains only the configuration of its connection. The caller repeats
    /// the call with a fresh buffer until [`Progress::done`] is set before
    /// moving on to the next connection.
    ///
    /// On error, the partial object is discarded and the caller is expected to
    /// call [`Self::handover_abort`].
    pub fn handover_marshal(
        &mut self,
        cid: ConnId,
        out: &mut [u8],
    ) -> std::result::Result<Progress, HandoverError> {
        let ho = self.ho.get_or_insert_with(Session::default);
        ho.check_cur(cid)?;
        if ho.cur.is_none() {
            let Some(c) = self.clients.iter().find(|c| c.cid == cid) else {
                warn!("Handover of unknown connection {cid}");
                return Err(HandoverError::UnknownConnection(cid));
            };
            let payload = if ho.step == 0 {
                bincode::serialize(&TableSnapshot {
                    cfg: c.cfg.clone(),
                    srcs: self.srcs.clone(),
                })
            } else {
                bincode::serialize(&c.cfg)
            };
            ho.start(cid, &payload?)?;
        }
        Ok(ho.marshal(out))
    }

    /// Consumes the next part of the handover object for connection `cid`
    /// from `v`. Bytes past the end of the current object are not consumed.
    ///
    /// On error, the partial object is discarded and the caller is expected to
    /// call [`Self::handover_abort`].
    pub fn handover_unmarshal(
        &mut self,
        cid: ConnId,
        v: &[u8],
    ) -> std::result::Result<Progress, HandoverError> {
        let (n, max_clients) = (self.srcs.len(), usize::from(self.cfg.max_clients));
        let ho = self.ho.get_or_insert_with(Session::default);
        ho.check_cur(cid)?;
        ho.cur = Some(cid);
        let r = ho.fill(v).and_then(|(len, done)| {
            if done {
                ho.finish(cid, n, max_clients)?;
            }
            Ok(Progress { len, done })
        });
        match &r {
            Ok(p) if p.done => ho.advance(),
            Ok(_) => {}
            Err(e) => {
                warn!("Handover step {} unmarshal failed for {cid}: {e}", ho.step);
                ho.reset_step();
            }
        }
        r
    }

    /// Applies the received state for connection `cid` once this radio
    /// becomes the primary. The local table remains authoritative. The first
    /// commit of the session, for any connection, records every slot that
    /// differs between the two radios and copies the Broadcast_Code of every
    /// slot that does not. A connection that is not registered yet is
    /// installed with its received configuration and notified of all recorded
    /// slots. Connections that are already registered are left unchanged.
    pub fn handover_commit(
        &mut self,
        cid: ConnId,
        is_new_primary: bool,
    ) -> std::result::Result<(), HandoverError> {
        if !is_new_primary {
            return Ok(());
        }
        let Some(mut ho) = self.ho.take() else {
            warn!("Handover commit for {cid} without a session");
            return Err(HandoverError::UnknownConnection(cid));
        };
        let r = self.commit(&mut ho, cid);
        self.ho = Some(ho);
        r
    }

    fn commit(&mut self, ho: &mut Session, cid: ConnId) -> std::result::Result<(), HandoverError> {
        if let Some(cur) = ho.cur {
            return Err(HandoverError::Truncated { cid: cur });
        }
        ho.reconcile(&mut self.srcs);
        let first = matches!(&ho.table, Some((c, _)) if *c == cid);
        let cfg = match &ho.table {
            Some((_, t)) if first => t.cfg.clone(),
            _ => match ho.clients.iter().find(|c| c.cid == cid) {
                Some(c) => c.cfg.clone(),
                None => return Err(HandoverError::UnknownConnection(cid)),
            },
        };
        if self.client_index(cid).is_some() {
            debug!("Handover commit for {cid}: already registered");
            return Ok(());
        }
        if self.clients.len() >= usize::from(self.cfg.max_clients) {
            return Err(HandoverError::NoRoom(cid));
        }
        info!("Handover commit for {cid}");
        self.clients.push(Client { cid, cfg });
        let ci = self.clients.len() - 1;
        for &i in &ho.pending {
            self.notify_client(ci, i);
        }
        Ok(())
    }

    /// Ends a successful handover, releasing all session state.
    pub fn handover_complete(&mut self) {
        if self.ho.take().is_some() {
            info!("Handover complete");
        }
    }

    /// Ends a failed handover, releasing all session state.
    pub fn handover_abort(&mut self) {
        if let Some(ho) = self.ho.take() {
            info!("Handover aborted at step {}", ho.step);
        }
    }

    /// Returns the current handover step or `None` if there is no session.
    #[inline]
    #[must_use]
    pub fn handover_step(&self) -> Option<u8> {
        self.ho.as_ref().map(|ho| ho.step)
    }
}

/// Returns whether a handover must be refused, which is the case when the
/// service instance does not exist.
#[inline]
#[must_use]
pub fn handover_veto<T>(srv: Option<&Server<T>>) -> bool {
    srv.is_none()
}
