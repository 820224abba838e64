/// Maximum attribute value length ([Vol 3] Part F, Section 3.2.9).
pub const MAX_VAL_LEN: usize = 512;

/// ATT, Common Profile and Service, and BASS application error codes
/// ([Vol 3] Part F, Section 3.4.1.1, \[CSS\] Part B, Section 1.2, and
/// [BASS] Section 1.6).
///
/// Only the codes that this server can return are defined.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
    thiserror::Error,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum ErrorCode {
    /// The attribute handle given was not valid on this server.
    InvalidHandle = 0x01,
    /// ATT Server does not support the request received from the client.
    RequestNotSupported = 0x06,
    /// Offset specified was past the end of the attribute.
    InvalidOffset = 0x07,
    /// The attribute value length is invalid for the operation.
    InvalidAttributeValueLength = 0x0D,
    /// Insufficient Resources to complete the request.
    InsufficientResources = 0x11,
    /// The control point opcode is not supported by the server.
    OpcodeNotSupported = 0x80,
    /// The Source_ID written by the client does not identify a receive state.
    InvalidSourceId = 0x81,
    /// The source cannot be removed while it is synchronized to a PA or BIS.
    SourceInSync = 0x82,
    /// Write operation cannot be fulfilled for reasons other than permissions.
    WriteRequestRejected = 0xFC,
    /// Client Characteristic Configuration descriptor is not configured
    /// according to the requirements of the profile or service.
    CccdImproperlyConfigured = 0xFD,
}

crate::util::impl_display_via_debug! { ErrorCode }
