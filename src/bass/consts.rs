/// Broadcast Audio Scan Service UUID ([Assigned Numbers] Section 3.4.2).
pub const SERVICE_UUID: u16 = 0x184F;

/// Broadcast Audio Scan Control Point characteristic UUID
/// ([Assigned Numbers] Section 3.8.1).
pub const CONTROL_POINT_UUID: u16 = 0x2BC7;

/// Broadcast Receive State characteristic UUID
/// ([Assigned Numbers] Section 3.8.1).
pub const RECEIVE_STATE_UUID: u16 = 0x2BC8;

/// Length of Broadcast_Code and Bad_Code values.
pub const BROADCAST_CODE_LEN: usize = 16;

/// Broadcast code or bad code in the order used by the application.
pub type BroadcastCode = [u8; BROADCAST_CODE_LEN];

/// Maximum Advertising_SID value.
pub const MAX_ADV_SID: u8 = 0x0F;

/// Maximum Broadcast_ID value.
pub const MAX_BROADCAST_ID: u32 = 0x00FF_FFFF;

/// BIS_Sync value written by a client that has no BIS preference.
pub const BIS_SYNC_NO_PREFERENCE: u32 = u32::MAX;

/// BIS_Sync_State value reported when synchronization to the BIG failed.
pub const BIS_SYNC_FAILED: u32 = u32::MAX;

/// Broadcast Audio Scan Control Point opcodes ([BASS] Section 3.1).
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum Opcode {
    RemoteScanStopped = 0x00,
    RemoteScanStarted = 0x01,
    AddSource = 0x02,
    ModifySource = 0x03,
    SetBroadcastCode = 0x04,
    RemoveSource = 0x05,
}

impl Opcode {
    /// Returns the length of the fixed part of the operation, including the
    /// opcode.
    #[inline]
    #[must_use]
    pub const fn fixed_len(self) -> usize {
        match self {
            Self::RemoteScanStopped | Self::RemoteScanStarted => 1,
            Self::AddSource => 16,
            Self::ModifySource => 6,
            Self::SetBroadcastCode => 2 + BROADCAST_CODE_LEN,
            Self::RemoveSource => 2,
        }
    }
}

/// PA_Sync parameter of Add Source and Modify Source operations
/// ([BASS] Table 3.5).
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    serde::Deserialize,
    serde::Serialize,
)]
#[repr(u8)]
pub enum PaSync {
    /// Do not synchronize to PA.
    DoNotSync = 0x00,
    /// Synchronize to PA, PAST available.
    SyncPastAvailable = 0x01,
    /// Synchronize to PA, PAST not available.
    SyncPastNotAvailable = 0x02,
}

impl Default for PaSync {
    #[inline]
    fn default() -> Self {
        Self::DoNotSync
    }
}

/// PA_Sync_State field of a Broadcast Receive State ([BASS] Table 3.9).
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    serde::Deserialize,
    serde::Serialize,
)]
#[repr(u8)]
pub enum PaSyncState {
    NotSynchronized = 0x00,
    SyncInfoRequest = 0x01,
    Synchronized = 0x02,
    FailedToSynchronize = 0x03,
    NoPast = 0x04,
}

impl Default for PaSyncState {
    #[inline]
    fn default() -> Self {
        Self::NotSynchronized
    }
}

/// BIG_Encryption field of a Broadcast Receive State ([BASS] Table 3.9).
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    serde::Deserialize,
    serde::Serialize,
)]
#[repr(u8)]
pub enum BigEncryption {
    NotEncrypted = 0x00,
    BroadcastCodeRequired = 0x01,
    /// The BIG is encrypted and is being decrypted with the received code.
    Decrypting = 0x02,
    /// The received code failed to decrypt the BIG. A Bad_Code field follows.
    BadCode = 0x03,
}

impl Default for BigEncryption {
    #[inline]
    fn default() -> Self {
        Self::NotEncrypted
    }
}

crate::util::impl_display_via_debug! { Opcode, PaSync, PaSyncState, BigEncryption }
