use crate::att::ErrorCode;
use crate::le::{Addr, RawAddr};
use crate::util::{reversed, Unpkr};

use super::state::is_bis_sync_unique;
use super::*;

/// Broadcast Audio Scan Control Point operation ([BASS] Section 3.1).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Request {
    RemoteScanStopped,
    RemoteScanStarted,
    AddSource(AddSource),
    ModifySource(ModifySource),
    /// Broadcast_Code in the order used by the application.
    SetBroadcastCode {
        source_id: u8,
        code: BroadcastCode,
    },
    RemoveSource {
        source_id: u8,
    },
}

/// Add Source operation parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AddSource {
    pub addr: Addr,
    pub adv_sid: u8,
    pub broadcast_id: u32,
    pub pa_sync: PaSync,
    pub pa_interval: u16,
    pub subgroups: Vec<Subgroup>,
}

impl AddSource {
    /// Returns the initial receive state of the requested source before any
    /// synchronization takes place.
    #[must_use]
    pub fn receive_state(&self) -> ReceiveState {
        ReceiveState {
            subgroups: (self.subgroups.iter())
                .map(|sg| Subgroup::new(0, sg.metadata.clone()))
                .collect(),
            ..ReceiveState::new(self.addr, self.adv_sid, self.broadcast_id)
        }
    }
}

/// Modify Source operation parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ModifySource {
    pub source_id: u8,
    pub pa_sync: PaSync,
    pub pa_interval: u16,
    pub subgroups: Vec<Subgroup>,
}

/// Control Point decoding error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum CpError {
    #[error("empty write")]
    Empty,
    #[error("unsupported opcode {0:#04X}")]
    UnsupportedOpcode(u8),
    #[error("invalid {0} length: {1}")]
    InvalidLength(Opcode, usize),
    #[error("invalid {0} parameter: {1}")]
    InvalidParameter(Opcode, &'static str),
}

impl CpError {
    /// Returns the error code sent to the client.
    #[inline]
    #[must_use]
    pub const fn code(self) -> ErrorCode {
        match self {
            Self::UnsupportedOpcode(_) => ErrorCode::OpcodeNotSupported,
            Self::Empty | Self::InvalidLength(..) | Self::InvalidParameter(..) => {
                ErrorCode::WriteRequestRejected
            }
        }
    }
}

impl Request {
    /// Decodes and validates a Control Point write. Structural errors are
    /// reported before any field values are checked.
    pub fn decode(v: &[u8]) -> std::result::Result<Self, CpError> {
        let Some(&op) = v.first() else {
            return Err(CpError::Empty);
        };
        let op = Opcode::try_from(op).map_err(|_| CpError::UnsupportedOpcode(op))?;
        match op {
            Opcode::AddSource => decode_add_source(v).map(Self::AddSource),
            Opcode::ModifySource => decode_modify_source(v).map(Self::ModifySource),
            _ if v.len() != op.fixed_len() => Err(CpError::InvalidLength(op, v.len())),
            Opcode::RemoteScanStopped => Ok(Self::RemoteScanStopped),
            Opcode::RemoteScanStarted => Ok(Self::RemoteScanStarted),
            Opcode::SetBroadcastCode => {
                let mut code = BroadcastCode::default();
                code.copy_from_slice(&v[2..]);
                Ok(Self::SetBroadcastCode {
                    source_id: v[1],
                    code: reversed(code),
                })
            }
            Opcode::RemoveSource => Ok(Self::RemoveSource { source_id: v[1] }),
        }
    }

    /// Returns the operation opcode.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match *self {
            Self::RemoteScanStopped => Opcode::RemoteScanStopped,
            Self::RemoteScanStarted => Opcode::RemoteScanStarted,
            Self::AddSource(_) => Opcode::AddSource,
            Self::ModifySource(_) => Opcode::ModifySource,
            Self::SetBroadcastCode { .. } => Opcode::SetBroadcastCode,
            Self::RemoveSource { .. } => Opcode::RemoveSource,
        }
    }
}

/// Decodes an Add Source operation, including the opcode.
pub fn decode_add_source(v: &[u8]) -> std::result::Result<AddSource, CpError> {
    const OP: Opcode = Opcode::AddSource;
    let short = CpError::InvalidLength(OP, v.len());
    let mut p = Unpkr::new(v);
    if p.u8().map_err(|_| short)? != u8::from(OP) {
        return Err(CpError::InvalidParameter(OP, "Opcode"));
    }
    let typ = p.u8().map_err(|_| short)?;
    let raw = p.array::<6>().map_err(|_| short)?;
    let adv_sid = p.u8().map_err(|_| short)?;
    let broadcast_id = p.u24().map_err(|_| short)?;
    let pa_sync = p.u8().map_err(|_| short)?;
    let pa_interval = p.u16().map_err(|_| short)?;
    let subgroups = unpack_subgroups(&mut p, short)?;

    let addr = Addr::new(typ, RawAddr::from(raw))
        .ok_or(CpError::InvalidParameter(OP, "Advertiser_Address_Type"))?;
    if adv_sid > MAX_ADV_SID {
        return Err(CpError::InvalidParameter(OP, "Advertising_SID"));
    }
    Ok(AddSource {
        addr,
        adv_sid,
        broadcast_id,
        pa_sync: check_pa_sync(OP, pa_sync)?,
        pa_interval,
        subgroups: check_bis_sync(OP, subgroups)?,
    })
}

/// Decodes a Modify Source operation, including the opcode. The Source_ID is
/// not checked.
pub fn decode_modify_source(v: &[u8]) -> std::result::Result<ModifySource, CpError> {
    const OP: Opcode = Opcode::ModifySource;
    let short = CpError::InvalidLength(OP, v.len());
    let mut p = Unpkr::new(v);
    if p.u8().map_err(|_| short)? != u8::from(OP) {
        return Err(CpError::InvalidParameter(OP, "Opcode"));
    }
    let source_id = p.u8().map_err(|_| short)?;
    let pa_sync = p.u8().map_err(|_| short)?;
    let pa_interval = p.u16().map_err(|_| short)?;
    let subgroups = unpack_subgroups(&mut p, short)?;
    Ok(ModifySource {
        source_id,
        pa_sync: check_pa_sync(OP, pa_sync)?,
        pa_interval,
        subgroups: check_bis_sync(OP, subgroups)?,
    })
}

/// Reads the Num_Subgroups field and the subgroup parameters, which must end
/// exactly at the end of the write.
fn unpack_subgroups(p: &mut Unpkr, short: CpError) -> std::result::Result<Vec<Subgroup>, CpError> {
    let n = p.u8().map_err(|_| short)?;
    let sgs = (0..n)
        .map(|_| Subgroup::unpack(p))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| short)?;
    if p.is_empty() {
        Ok(sgs)
    } else {
        Err(short)
    }
}

#[inline]
fn check_pa_sync(op: Opcode, v: u8) -> std::result::Result<PaSync, CpError> {
    PaSync::try_from(v).map_err(|_| CpError::InvalidParameter(op, "PA_Sync"))
}

#[inline]
fn check_bis_sync(
    op: Opcode,
    sgs: Vec<Subgroup>,
) -> std::result::Result<Vec<Subgroup>, CpError> {
    if is_bis_sync_unique(sgs.iter().map(|sg| sg.bis_sync)) {
        Ok(sgs)
    } else {
        Err(CpError::InvalidParameter(op, "BIS_Sync"))
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use super::*;

    const ADDR: [u8; 6] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];

    fn add_source(num_subgroups: u8) -> Vec<u8> {
        let mut v = vec![0x02, 0x00];
        v.extend_from_slice(&ADDR);
        v.extend_from_slice(&[0x03, 0x56, 0x34, 0x12, 0x01, 0xFF, 0xFF, num_subgroups]);
        v
    }

    #[test]
    fn scan() {
        assert_eq!(Request::decode(&[0x00]), Ok(Request::RemoteScanStopped));
        assert_eq!(Request::decode(&[0x01]), Ok(Request::RemoteScanStarted));
        assert_eq!(
            Request::decode(&[0x01, 0x00]),
            Err(CpError::InvalidLength(Opcode::RemoteScanStarted, 2))
        );
        assert_eq!(Request::decode(&[]), Err(CpError::Empty));
        assert_eq!(Request::decode(&[0x06]), Err(CpError::UnsupportedOpcode(0x06)));
        assert_eq!(CpError::UnsupportedOpcode(0xFF).code(), ErrorCode::OpcodeNotSupported);
    }

    #[test]
    fn add_source_no_subgroups() {
        let v = add_source(0);
        assert_eq!(v.len(), Opcode::AddSource.fixed_len());
        let Ok(Request::AddSource(req)) = Request::decode(&v) else {
            panic!("invalid decode");
        };
        assert_eq!(req.addr, Addr::Public(RawAddr::from(ADDR)));
        assert_eq!(req.adv_sid, 0x03);
        assert_eq!(req.broadcast_id, 0x12_3456);
        assert_eq!(req.pa_sync, PaSync::SyncPastAvailable);
        assert_eq!(req.pa_interval, 0xFFFF);
        assert!(req.subgroups.is_empty());
        assert_eq!(req.receive_state(), ReceiveState::new(req.addr, 3, 0x12_3456));
    }

    #[test]
    fn add_source_subgroups() {
        let mut v = add_source(2);
        v.extend_from_slice(&[0x01, 0x00, 0x00, 0x00, 0x02, 0xAA, 0xBB]);
        v.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
        let req = decode_add_source(&v).unwrap();
        assert_eq!(
            req.subgroups,
            [
                Subgroup::new(1, [0xBB, 0xAA]),
                Subgroup::new(BIS_SYNC_NO_PREFERENCE, Vec::new())
            ]
        );

        // Short by one metadata byte
        let mut short = add_source(2);
        short.extend_from_slice(&[0x01, 0x00, 0x00, 0x00, 0x02, 0xAA]);
        short.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0x00]);
        assert_eq!(
            decode_add_source(&short),
            Err(CpError::InvalidLength(Opcode::AddSource, short.len()))
        );

        // Trailing byte
        v.push(0);
        assert_matches!(decode_add_source(&v), Err(CpError::InvalidLength(..)));
        assert_matches!(decode_add_source(&v[..15]), Err(CpError::InvalidLength(..)));
    }

    #[test]
    fn add_source_invalid() {
        let mut v = add_source(0);
        v[1] = 0x02;
        assert_eq!(
            Request::decode(&v),
            Err(CpError::InvalidParameter(Opcode::AddSource, "Advertiser_Address_Type"))
        );
        let mut v = add_source(0);
        v[8] = MAX_ADV_SID + 1;
        assert_matches!(Request::decode(&v), Err(CpError::InvalidParameter(_, "Advertising_SID")));
        let mut v = add_source(0);
        v[12] = 0x03;
        assert_matches!(Request::decode(&v), Err(CpError::InvalidParameter(_, "PA_Sync")));
        v[12] = 0x09;
        assert_matches!(Request::decode(&v), Err(CpError::InvalidParameter(_, "PA_Sync")));
        v[12] = 0xFF;
        assert_matches!(Request::decode(&v), Err(CpError::InvalidParameter(_, "PA_Sync")));

        let mut v = add_source(2);
        v.extend_from_slice(&[0x03, 0x00, 0x00, 0x00, 0x00]);
        v.extend_from_slice(&[0x06, 0x00, 0x00, 0x00, 0x00]);
        let e = Request::decode(&v).unwrap_err();
        assert_eq!(e, CpError::InvalidParameter(Opcode::AddSource, "BIS_Sync"));
        assert_eq!(e.code(), ErrorCode::WriteRequestRejected);
    }

    #[test]
    fn modify_source() {
        let v = [0x03, 0x01, 0x00, 0x10, 0x00, 0x01, 0x04, 0x00, 0x00, 0x00, 0x01, 0x7F];
        assert_eq!(
            Request::decode(&v),
            Ok(Request::ModifySource(ModifySource {
                source_id: 1,
                pa_sync: PaSync::DoNotSync,
                pa_interval: 0x0010,
                subgroups: vec![Subgroup::new(4, [0x7F])],
            }))
        );
        assert_matches!(Request::decode(&v[..5]), Err(CpError::InvalidLength(..)));
        assert_matches!(Request::decode(&v[..11]), Err(CpError::InvalidLength(..)));
    }

    #[test]
    fn broadcast_code() {
        let mut v = vec![0x04, 0x07];
        v.extend(1..=16);
        let Ok(Request::SetBroadcastCode { source_id, code }) = Request::decode(&v) else {
            panic!("invalid decode");
        };
        assert_eq!(source_id, 7);
        assert_eq!((code[0], code[15]), (16, 1));
        assert_matches!(Request::decode(&v[..17]), Err(CpError::InvalidLength(..)));
    }

    #[test]
    fn remove_source() {
        assert_eq!(
            Request::decode(&[0x05, 0x02]),
            Ok(Request::RemoveSource { source_id: 2 })
        );
        assert_eq!(
            Request::decode(&[0x05]),
            Err(CpError::InvalidLength(Opcode::RemoveSource, 1))
        );
        assert_eq!(
            Request::decode(&[0x05, 0x02]).map(|r| r.opcode()),
            Ok(Opcode::RemoveSource)
        );
    }
}
