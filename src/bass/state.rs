use serde::{Deserialize, Serialize};
use structbuf::{Pack, StructBuf};

use crate::att::MAX_VAL_LEN;
use crate::le::{Addr, RawAddr};
use crate::util::{reversed, ShortRead, Unpkr};

use super::*;

/// Length of the fixed part of a Broadcast Receive State value.
pub const RECEIVE_STATE_HDR_LEN: usize = 15;

/// BIS synchronization state and metadata of one subgroup.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Deserialize, Serialize)]
pub struct Subgroup {
    /// BIS index bitmap. When written by a client, [`BIS_SYNC_NO_PREFERENCE`]
    /// means that any BIS may be selected. When reported by the server,
    /// [`BIS_SYNC_FAILED`] means that BIG synchronization failed.
    pub bis_sync: u32,
    /// LTV-formatted metadata in the order used by the application.
    pub metadata: Vec<u8>,
}

impl Subgroup {
    /// Creates a new subgroup.
    #[inline]
    #[must_use]
    pub fn new(bis_sync: u32, metadata: impl Into<Vec<u8>>) -> Self {
        Self {
            bis_sync,
            metadata: metadata.into(),
        }
    }

    /// Returns whether the subgroup is synchronized to at least one BIS.
    #[inline]
    #[must_use]
    pub const fn is_synchronized(&self) -> bool {
        self.bis_sync != 0 && self.bis_sync != BIS_SYNC_FAILED
    }

    /// Returns the encoded length of the subgroup.
    #[inline]
    fn encoded_len(&self) -> usize {
        4 + 1 + self.metadata.len()
    }

    /// Reads one subgroup from the BIS_Sync, Metadata_Length, and Metadata
    /// fields. Metadata byte order is reversed.
    pub(super) fn unpack(p: &mut Unpkr) -> std::result::Result<Self, ShortRead> {
        let bis_sync = p.u32()?;
        let n = p.u8()?;
        let mut metadata = p.bytes(usize::from(n))?.to_vec();
        metadata.reverse();
        Ok(Self { bis_sync, metadata })
    }
}

/// Returns whether no two BIS sync bitmaps share a set bit. Bitmaps without a
/// BIS preference are ignored.
pub(super) fn is_bis_sync_unique(it: impl IntoIterator<Item = u32>) -> bool {
    let mut all = 0;
    for v in it {
        if v == BIS_SYNC_NO_PREFERENCE {
            continue;
        }
        if all & v != 0 {
            return false;
        }
        all |= v;
    }
    true
}

/// Broadcast Receive State of one source ([BASS] Section 3.2), excluding the
/// server-assigned Source_ID.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct ReceiveState {
    pub addr: Addr,
    pub adv_sid: u8,
    pub broadcast_id: u32,
    pub pa_sync_state: PaSyncState,
    pub big_encryption: BigEncryption,
    /// Code that failed to decrypt the BIG. Present iff `big_encryption` is
    /// [`BigEncryption::BadCode`].
    pub bad_code: Option<BroadcastCode>,
    pub subgroups: Vec<Subgroup>,
}

impl ReceiveState {
    /// Creates the state of an unsynchronized, unencrypted source without
    /// subgroups.
    #[inline]
    #[must_use]
    pub fn new(addr: Addr, adv_sid: u8, broadcast_id: u32) -> Self {
        Self {
            addr,
            adv_sid,
            broadcast_id,
            ..Self::default()
        }
    }

    /// Sets the PA synchronization state.
    #[inline]
    #[must_use]
    pub const fn with_pa_sync_state(mut self, v: PaSyncState) -> Self {
        self.pa_sync_state = v;
        self
    }

    /// Sets the BIG encryption state. `bad_code` is recorded only for
    /// [`BigEncryption::BadCode`].
    #[inline]
    #[must_use]
    pub fn with_encryption(mut self, v: BigEncryption, bad_code: BroadcastCode) -> Self {
        self.big_encryption = v;
        self.bad_code = (v == BigEncryption::BadCode).then_some(bad_code);
        self
    }

    /// Adds a subgroup.
    #[inline]
    #[must_use]
    pub fn with_subgroup(mut self, sg: Subgroup) -> Self {
        self.subgroups.push(sg);
        self
    }

    /// Returns whether the source is synchronized to its PA or to any BIS.
    /// Synchronized sources cannot be removed.
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.pa_sync_state == PaSyncState::Synchronized
            || self.subgroups.iter().any(Subgroup::is_synchronized)
    }

    /// Validates field ranges and internal consistency.
    pub fn validate(&self) -> Result<()> {
        let ok = self.adv_sid <= MAX_ADV_SID
            && self.broadcast_id <= MAX_BROADCAST_ID
            && self.bad_code.is_some() == (self.big_encryption == BigEncryption::BadCode)
            && self.subgroups.len() <= usize::from(u8::MAX)
            && (self.subgroups.iter()).all(|sg| sg.metadata.len() <= usize::from(u8::MAX))
            && is_bis_sync_unique(self.subgroups.iter().map(|sg| sg.bis_sync))
            && self.encoded_len() <= MAX_VAL_LEN;
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidParameter)
        }
    }

    /// Returns the exact length of the value produced by [`Self::encode`].
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        RECEIVE_STATE_HDR_LEN
            + self.bad_code.map_or(0, |c| c.len())
            + (self.subgroups.iter()).map(Subgroup::encoded_len).sum::<usize>()
    }

    /// Encodes the Broadcast Receive State characteristic value. The bad code
    /// and metadata are transmitted in reverse byte order.
    ///
    /// The state must have passed [`Self::validate`].
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn encode(&self, source_id: u8) -> StructBuf {
        debug_assert!(self.validate().is_ok(), "encoding invalid {self:?}");
        let mut b = StructBuf::new(self.encoded_len());
        {
            let mut p = b.append();
            (p.u8(source_id).u8(self.addr.typ()).put(self.addr.raw()))
                .u8(self.adv_sid)
                .put(&self.broadcast_id.to_le_bytes()[..3])
                .u8(self.pa_sync_state)
                .u8(self.big_encryption);
            if let Some(code) = self.bad_code {
                p.put(reversed(code));
            }
            p.u8(self.subgroups.len() as u8);
            for sg in &self.subgroups {
                p.u32(sg.bis_sync).u8(sg.metadata.len() as u8);
                for &v in sg.metadata.iter().rev() {
                    p.u8(v);
                }
            }
        }
        b
    }

    /// Decodes a Broadcast Receive State characteristic value, returning the
    /// Source_ID and the state.
    pub fn decode(v: &[u8]) -> std::result::Result<(u8, Self), DecodeError> {
        let mut p = Unpkr::new(v);
        let source_id = p.u8()?;
        let typ = p.u8()?;
        let addr = Addr::new(typ, RawAddr::from(p.array::<6>()?))
            .ok_or(DecodeError::InvalidField("Advertiser_Address_Type", typ))?;
        let adv_sid = p.u8()?;
        let broadcast_id = p.u24()?;
        let v = p.u8()?;
        let pa_sync_state = PaSyncState::try_from(v)
            .map_err(|_| DecodeError::InvalidField("PA_Sync_State", v))?;
        let v = p.u8()?;
        let big_encryption = BigEncryption::try_from(v)
            .map_err(|_| DecodeError::InvalidField("BIG_Encryption", v))?;
        let bad_code = if big_encryption == BigEncryption::BadCode {
            Some(reversed(p.array()?))
        } else {
            None
        };
        let n = p.u8()?;
        let subgroups = (0..n)
            .map(|_| Subgroup::unpack(&mut p))
            .collect::<std::result::Result<_, _>>()?;
        if !p.is_empty() {
            return Err(DecodeError::TrailingBytes(p.len()));
        }
        let st = Self {
            addr,
            adv_sid,
            broadcast_id,
            pa_sync_state,
            big_encryption,
            bad_code,
            subgroups,
        };
        Ok((source_id, st))
    }

    /// Returns whether `other` would produce a different characteristic
    /// value. Every field is compared, including metadata bytes.
    #[inline]
    #[must_use]
    pub(super) fn differs(&self, other: &Self) -> bool {
        self != other
    }
}

/// Broadcast Receive State decoding error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("truncated value")]
    Truncated,
    #[error("invalid {0}: {1:#04X}")]
    InvalidField(&'static str, u8),
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

impl From<ShortRead> for DecodeError {
    #[inline]
    fn from(_: ShortRead) -> Self {
        Self::Truncated
    }
}

/// Occupied receive state slot.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub(super) struct Source {
    pub id: u8,
    pub st: ReceiveState,
    /// Broadcast_Code written by the client in the order used by the
    /// application. Never included in the characteristic value.
    pub code: BroadcastCode,
}

impl Source {
    /// Encodes the characteristic value of the slot.
    #[inline]
    pub fn encode(&self) -> StructBuf {
        self.st.encode(self.id)
    }
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;
    use proptest::prelude::*;

    use super::*;

    /// Subgroups with disjoint BIS sync bitmaps and arbitrary metadata.
    fn subgroups() -> impl Strategy<Value = Vec<Subgroup>> {
        let sg = (any::<u8>(), any::<bool>(), prop::collection::vec(any::<u8>(), 0..=255));
        prop::collection::vec(sg, 0..=4).prop_map(|v| {
            (v.into_iter().enumerate())
                .map(|(i, (bis, failed, md))| {
                    let bis_sync = if failed {
                        BIS_SYNC_FAILED
                    } else {
                        u32::from(bis) << (8 * i)
                    };
                    Subgroup::new(bis_sync, md)
                })
                .collect()
        })
    }

    /// States that pass [`ReceiveState::validate`].
    fn receive_state() -> impl Strategy<Value = ReceiveState> {
        use PaSyncState::*;
        let pa = prop::sample::select(vec![
            NotSynchronized,
            SyncInfoRequest,
            Synchronized,
            FailedToSynchronize,
            NoPast,
        ]);
        let enc = prop::sample::select(vec![
            BigEncryption::NotEncrypted,
            BigEncryption::BroadcastCodeRequired,
            BigEncryption::Decrypting,
            BigEncryption::BadCode,
        ]);
        (
            0..=1_u8,
            any::<[u8; 6]>(),
            0..=MAX_ADV_SID,
            0..=MAX_BROADCAST_ID,
            pa,
            enc,
            any::<BroadcastCode>(),
            subgroups(),
        )
            .prop_map(|(typ, raw, adv_sid, broadcast_id, pa, enc, code, sgs)| {
                let addr = Addr::new(typ, RawAddr::from(raw)).unwrap();
                let mut st = ReceiveState::new(addr, adv_sid, broadcast_id)
                    .with_pa_sync_state(pa)
                    .with_encryption(enc, code);
                st.subgroups = sgs;
                while st.encoded_len() > MAX_VAL_LEN {
                    st.subgroups.pop();
                }
                st
            })
    }

    proptest! {
        #[test]
        fn encode_decode(st in receive_state(), id in 1..=u8::MAX) {
            prop_assert_eq!(st.validate(), Ok(()));
            let v = st.encode(id);
            prop_assert_eq!(v.len(), st.encoded_len());
            prop_assert_eq!(ReceiveState::decode(v.as_ref()), Ok((id, st)));
        }
    }

    fn addr() -> Addr {
        Addr::Random(RawAddr::from([0x11, 0x22, 0x33, 0x44, 0x55, 0xC6]))
    }

    #[test]
    fn encode_header() {
        let st = ReceiveState::new(addr(), 0x0A, 0x12_3456)
            .with_pa_sync_state(PaSyncState::SyncInfoRequest);
        let v = st.encode(3);
        assert_eq!(
            v.as_ref(),
            &[3, 0x01, 0x11, 0x22, 0x33, 0x44, 0x55, 0xC6, 0x0A, 0x56, 0x34, 0x12, 0x01, 0x00, 0]
        );
        assert_eq!(v.len(), RECEIVE_STATE_HDR_LEN);
        assert_eq!(st.encoded_len(), RECEIVE_STATE_HDR_LEN);
    }

    #[test]
    fn encode_bad_code_and_subgroups() {
        let mut code = [0; BROADCAST_CODE_LEN];
        code[0] = 0xAA;
        code[15] = 0xBB;
        let st = ReceiveState::new(addr(), 1, 2)
            .with_encryption(BigEncryption::BadCode, code)
            .with_subgroup(Subgroup::new(0b0011, [0x02, 0x01, 0x7F]))
            .with_subgroup(Subgroup::new(BIS_SYNC_FAILED, Vec::new()));
        let v = st.encode(1);
        assert_eq!(v.len(), st.encoded_len());
        assert_eq!(v.len(), 15 + 16 + (5 + 3) + 5);
        assert_eq!(v[13], u8::from(BigEncryption::BadCode));
        assert_eq!((v[14], v[29]), (0xBB, 0xAA));
        assert_eq!(v[30], 2);
        assert_eq!(&v[31..39], &[0x03, 0x00, 0x00, 0x00, 3, 0x7F, 0x01, 0x02]);
        assert_eq!(&v[39..], &[0xFF, 0xFF, 0xFF, 0xFF, 0]);

        assert_eq!(ReceiveState::decode(v.as_ref()), Ok((1, st)));
    }

    #[test]
    fn decode_errors() {
        let st = ReceiveState::new(addr(), 1, 2).with_subgroup(Subgroup::new(1, [9, 8]));
        let v = st.encode(5);
        assert_eq!(ReceiveState::decode(&v[..v.len() - 1]), Err(DecodeError::Truncated));
        assert_eq!(ReceiveState::decode(&v[..10]), Err(DecodeError::Truncated));

        let mut long = v.as_ref().to_vec();
        long.push(0);
        assert_eq!(ReceiveState::decode(&long), Err(DecodeError::TrailingBytes(1)));

        let mut bad = v.as_ref().to_vec();
        bad[1] = 0x02;
        assert_matches!(
            ReceiveState::decode(&bad),
            Err(DecodeError::InvalidField(_, 0x02))
        );
        bad[1] = 0x00;
        bad[12] = 0x05;
        assert_matches!(
            ReceiveState::decode(&bad),
            Err(DecodeError::InvalidField("PA_Sync_State", 0x05))
        );
        bad[12] = 0x00;
        bad[13] = 0x04;
        assert_matches!(
            ReceiveState::decode(&bad),
            Err(DecodeError::InvalidField("BIG_Encryption", 0x04))
        );
        bad[13] = 0xFF;
        assert_matches!(
            ReceiveState::decode(&bad),
            Err(DecodeError::InvalidField("BIG_Encryption", 0xFF))
        );
    }

    #[test]
    fn reserved_values() {
        assert!(PaSyncState::try_from(0x05).is_err());
        assert!(BigEncryption::try_from(0x09).is_err());
        assert_eq!(PaSyncState::default(), PaSyncState::NotSynchronized);
        assert_eq!(BigEncryption::default(), BigEncryption::NotEncrypted);
    }

    #[test]
    fn validate() {
        let ok = ReceiveState::new(addr(), MAX_ADV_SID, MAX_BROADCAST_ID);
        assert_eq!(ok.validate(), Ok(()));

        let mut st = ok.clone();
        st.adv_sid = MAX_ADV_SID + 1;
        assert_eq!(st.validate(), Err(Error::InvalidParameter));

        let mut st = ok.clone();
        st.broadcast_id = MAX_BROADCAST_ID + 1;
        assert_eq!(st.validate(), Err(Error::InvalidParameter));

        let mut st = ok.clone();
        st.big_encryption = BigEncryption::BadCode;
        assert_eq!(st.validate(), Err(Error::InvalidParameter));
        st.bad_code = Some([1; BROADCAST_CODE_LEN]);
        assert_eq!(st.validate(), Ok(()));
        st.big_encryption = BigEncryption::Decrypting;
        assert_eq!(st.validate(), Err(Error::InvalidParameter));

        let st = ok.clone().with_subgroup(Subgroup::new(0, vec![0; 256]));
        assert_eq!(st.validate(), Err(Error::InvalidParameter));
    }

    #[test]
    fn bis_sync_unique() {
        assert!(is_bis_sync_unique([0b01, 0b10, 0]));
        assert!(is_bis_sync_unique([BIS_SYNC_NO_PREFERENCE, BIS_SYNC_NO_PREFERENCE, 1]));
        assert!(!is_bis_sync_unique([0b011, 0b110]));

        let st = ReceiveState::new(addr(), 0, 0)
            .with_subgroup(Subgroup::new(0b0101, Vec::new()))
            .with_subgroup(Subgroup::new(0b0100, Vec::new()));
        assert_eq!(st.validate(), Err(Error::InvalidParameter));
    }

    #[test]
    fn synchronized() {
        let st = ReceiveState::new(addr(), 0, 0);
        assert!(!st.is_synchronized());
        assert!(st.clone().with_pa_sync_state(PaSyncState::Synchronized).is_synchronized());
        assert!(!(st.clone().with_pa_sync_state(PaSyncState::FailedToSynchronize)).is_synchronized());
        assert!(!st.clone().with_subgroup(Subgroup::new(BIS_SYNC_FAILED, Vec::new())).is_synchronized());
        assert!(!st.clone().with_subgroup(Subgroup::new(0, Vec::new())).is_synchronized());
        assert!(st.with_subgroup(Subgroup::new(0b1000, Vec::new())).is_synchronized());
    }
}
