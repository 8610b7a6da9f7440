use std::{collections::TryReserveError, fmt::Display, io};

use thiserror::Error;

use crate::protocol::Version;

/// Status word transferred in response headers and link responses.
///
/// The numeric values are part of the wire format and must not be reordered.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum AnsStatus {
    Ok = 0,
    InvalidPeerId = 1,
    InvalidLinkType = 2,
    ClientRegistrationFailure = 3,
    InvalidCmdFrame = 4,
    InvalidHeader = 5,
    InvalidTransactionNo = 6,
    InvalidFunctionId = 7,
    OutOfMemory = 8,
    ReadFrameError = 9,
    SendFrameError = 10,
    InvalidModuleIndex = 11,
    Error = 12,
    SocketDisconnected = 13,
    SocketCreateError = 14,
    SocketConnectError = 15,
    SocketReadError = 16,
    SocketWriteError = 17,
    IncompatibleProtVer = 18,
    Timeout = 19,
}

impl AnsStatus {
    const ALL: [AnsStatus; 20] = [
        AnsStatus::Ok,
        AnsStatus::InvalidPeerId,
        AnsStatus::InvalidLinkType,
        AnsStatus::ClientRegistrationFailure,
        AnsStatus::InvalidCmdFrame,
        AnsStatus::InvalidHeader,
        AnsStatus::InvalidTransactionNo,
        AnsStatus::InvalidFunctionId,
        AnsStatus::OutOfMemory,
        AnsStatus::ReadFrameError,
        AnsStatus::SendFrameError,
        AnsStatus::InvalidModuleIndex,
        AnsStatus::Error,
        AnsStatus::SocketDisconnected,
        AnsStatus::SocketCreateError,
        AnsStatus::SocketConnectError,
        AnsStatus::SocketReadError,
        AnsStatus::SocketWriteError,
        AnsStatus::IncompatibleProtVer,
        AnsStatus::Timeout,
    ];

    /// Decodes a raw status word. Unknown values yield `None`.
    pub fn from_raw(raw: u32) -> Option<AnsStatus> {
        Self::ALL.get(raw as usize).copied()
    }

    pub fn raw(self) -> u32 {
        self as u32
    }

    pub fn is_ok(self) -> bool {
        self == AnsStatus::Ok
    }
}

impl Display for AnsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} ({})", self, self.raw())
    }
}

/// Errors produced by the protocol engine.
///
/// Every variant maps onto an [`AnsStatus`] through [`AnsError::status`], which
/// is what ends up on the wire when a server reports a failure to a client.
#[derive(Debug, Error)]
pub enum AnsError {
    #[error("peer disconnected")]
    Disconnected,

    #[error("operation timed out")]
    Timeout,

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("transaction id mismatch: expected {expected}, got {got}")]
    InvalidTransactionNo { expected: u32, got: u32 },

    #[error("no handler for function id {0}")]
    InvalidFunctionId(u32),

    #[error("invalid link type {0}")]
    InvalidLinkType(u32),

    #[error("unknown peer id {0}")]
    InvalidPeerId(i32),

    #[error("incompatible protocol version {0}")]
    IncompatibleVersion(Version),

    #[error("frame too large! Maximum is {max}, but got {got}")]
    TooManyBytes { max: usize, got: usize },

    #[error("out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),

    #[error("failed to create socket: {0}")]
    SocketCreate(#[source] io::Error),

    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),

    #[error("failed to read from socket: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write to socket: {0}")]
    Write(#[source] io::Error),

    #[error("malformed payload: {0}")]
    Payload(String),

    #[error("peer reported status {0}")]
    Status(AnsStatus),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl AnsError {
    /// The status word that represents this error on the wire.
    pub fn status(&self) -> AnsStatus {
        match self {
            AnsError::Disconnected => AnsStatus::SocketDisconnected,
            AnsError::Timeout => AnsStatus::Timeout,
            AnsError::InvalidHeader(_) | AnsError::TooManyBytes { .. } => AnsStatus::InvalidHeader,
            AnsError::InvalidTransactionNo { .. } => AnsStatus::InvalidTransactionNo,
            AnsError::InvalidFunctionId(_) => AnsStatus::InvalidFunctionId,
            AnsError::InvalidLinkType(_) => AnsStatus::InvalidLinkType,
            AnsError::InvalidPeerId(_) => AnsStatus::InvalidPeerId,
            AnsError::IncompatibleVersion(_) => AnsStatus::IncompatibleProtVer,
            AnsError::OutOfMemory(_) => AnsStatus::OutOfMemory,
            AnsError::SocketCreate(_) => AnsStatus::SocketCreateError,
            AnsError::Connect(_) => AnsStatus::SocketConnectError,
            AnsError::Read(_) => AnsStatus::SocketReadError,
            AnsError::Write(_) => AnsStatus::SocketWriteError,
            AnsError::Payload(_) => AnsStatus::InvalidCmdFrame,
            AnsError::Status(status) => *status,
            AnsError::Io(_) => AnsStatus::Error,
        }
    }

    /// A normal end of a session rather than a failure worth reporting.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, AnsError::Disconnected)
    }
}

impl From<AnsStatus> for AnsError {
    fn from(status: AnsStatus) -> Self {
        AnsError::Status(status)
    }
}

pub type AnsResult<T> = Result<T, AnsError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_round_trips_through_raw_value() {
        for raw in 0..20 {
            let status = AnsStatus::from_raw(raw).unwrap();
            assert_eq!(status.raw(), raw);
        }
        assert_eq!(AnsStatus::from_raw(20), None);
        assert_eq!(AnsStatus::from_raw(u32::MAX), None);
    }

    #[test]
    fn wire_values_are_stable() {
        assert_eq!(AnsStatus::Ok.raw(), 0);
        assert_eq!(AnsStatus::InvalidTransactionNo.raw(), 6);
        assert_eq!(AnsStatus::SocketDisconnected.raw(), 13);
        assert_eq!(AnsStatus::IncompatibleProtVer.raw(), 18);
        assert_eq!(AnsStatus::Timeout.raw(), 19);
    }

    #[test]
    fn errors_map_to_status() {
        assert_eq!(AnsError::Disconnected.status(), AnsStatus::SocketDisconnected);
        assert_eq!(
            AnsError::InvalidTransactionNo {
                expected: 1,
                got: 2
            }
            .status(),
            AnsStatus::InvalidTransactionNo
        );
        assert_eq!(
            AnsError::from(AnsStatus::InvalidModuleIndex).status(),
            AnsStatus::InvalidModuleIndex
        );
        assert!(AnsError::Disconnected.is_disconnect());
        assert!(!AnsError::Timeout.is_disconnect());
    }
}
