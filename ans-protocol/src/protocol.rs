use std::{fmt::Display, time::Duration};

/// The version of the protocol.
/// A version always consists of a major and a minor part.
/// Peers can only talk to each other when the major parts match.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Version {
    major: u32,
    minor: u32,
}

impl Version {
    /// Version 2.2 of the protocol
    pub const V2_2: Version = Version { major: 2, minor: 2 };

    pub const fn new(major: u32, minor: u32) -> Version {
        Version { major, minor }
    }

    /// The major part of the version
    pub fn major(&self) -> u32 {
        self.major
    }

    /// The minor part of the version
    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Whether a peer speaking `other` can be served.
    pub fn is_compatible_with(&self, other: Version) -> bool {
        self.major == other.major
    }
}

#[test]
fn version_ordering() {
    assert!(Version::new(2, 1) < Version::new(2, 2));
    assert!(Version::new(3, 0) > Version::new(2, 9));
    assert!(Version::V2_2.is_compatible_with(Version::new(2, 7)));
    assert!(!Version::V2_2.is_compatible_with(Version::new(1, 2)));
}

impl Default for Version {
    fn default() -> Self {
        Self::V2_2
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Identifies the board protocol carried on top of the generic engine.
///
/// The magic value is sent in every link-init frame. Its upper 16 bits are
/// advertised as the protocol id in discovery responses.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Protocol {
    pub magic: u32,
    pub version: Version,
}

impl Protocol {
    /// MIL-STD-1553 board access
    pub const ANS1553: Protocol = Protocol {
        magic: 0x1553_09B0,
        version: Version::V2_2,
    };

    pub fn discovery_id(&self) -> u32 {
        (self.magic >> 16) & 0xFFFF
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::ANS1553
    }
}

/// TCP port the server listens on. The discovery responder uses the same port number on UDP.
pub const DEFAULT_SERVER_PORT: u16 = 1553;
/// UDP port clients listen on for discovery broadcasts.
pub const DEFAULT_CLIENT_PORT: u16 = 11553;

/// Bound for a complete command round trip.
pub const CMD_RESP_TIMEOUT: Duration = Duration::from_secs(60);
/// How long the server waits for a client to connect to a freshly opened event stream.
pub const BOARD_EVENT_STREAM_TIMEOUT: Duration = Duration::from_secs(10);
/// How long the server waits for the link-init frame of a new connection.
pub const SERVER_LINK_INIT_TIMEOUT: Duration = Duration::from_secs(20);
/// How long a client waits for the link response of the server.
pub const CLIENT_LINK_INIT_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound for the transaction size announced by a frame header.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Namespace a command frame belongs to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum CommandType {
    Admin = 0,
    Board = 1,
}

impl CommandType {
    pub fn from_raw(raw: u32) -> Option<CommandType> {
        match raw {
            0 => Some(CommandType::Admin),
            1 => Some(CommandType::Board),
            _ => None,
        }
    }
}

/// Kind of channel requested by a link-init frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum LinkType {
    Admin = 0,
    Board = 1,
}

impl LinkType {
    pub fn from_raw(raw: u32) -> Option<LinkType> {
        match raw {
            0 => Some(LinkType::Admin),
            1 => Some(LinkType::Board),
            _ => None,
        }
    }
}

/// Function ids of administrative commands.
pub mod admin_id {
    pub const GET_NUM_BOARDS: u32 = 0;
    pub const GET_SERVER_INFO: u32 = 1;
    /// First id reserved for protocol-specific administrative commands.
    pub const EXTENSION_BASE: u32 = 256;
}

/// Function ids of board commands.
pub mod board_id {
    pub const OPEN: u32 = 0;
    pub const CLOSE: u32 = 1;
    pub const READ_MEMORY: u32 = 2;
    pub const WRITE_MEMORY: u32 = 3;
    pub const IO_COMMAND: u32 = 4;
    pub const IO_COMMAND_STRUCT: u32 = 5;
    pub const GET_DRIVER_VERSION: u32 = 6;
    pub const GET_SOFTWARE_VERSIONS: u32 = 7;
    pub const GET_DRIVER_INFO: u32 = 8;
    pub const GET_BOARD_MEM_SIZE: u32 = 9;
    pub const OPEN_BOARD_EVENT_STREAM: u32 = 10;
    pub const CLOSE_BOARD_EVENT_STREAM: u32 = 11;
    pub const REGISTER_CALLBACK: u32 = 12;
    pub const UNREGISTER_CALLBACK: u32 = 13;
    /// First id reserved for protocol-specific board commands.
    pub const EXTENSION_BASE: u32 = 256;
}

/// Opaque board handle assigned by the hardware-access layer.
pub type BoardHandle = u32;

/// Server-assigned peer id. [`PEER_ID_UNKNOWN`] requests a new peer.
pub type PeerId = i32;
pub const PEER_ID_UNKNOWN: PeerId = -1;

#[test]
fn ans1553_discovery_id() {
    assert_eq!(Protocol::ANS1553.discovery_id(), 0x1553);
}
