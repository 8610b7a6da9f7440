//! Link initialisation exchanged at the start of every TCP connection.
//!
//! The client announces protocol magic, version, the kind of channel it wants and the
//! peer id it already owns ([`PEER_ID_UNKNOWN`](crate::protocol::PEER_ID_UNKNOWN) for a
//! new peer). The server answers with the same fields, the peer id it assigned and a status.

use std::time::Duration;

use crate::{
    connection::Channel,
    error::{AnsError, AnsResult, AnsStatus},
    payload::{PayloadReader, PayloadWriter},
    protocol::{LinkType, PeerId, Protocol, Version},
};

/// First frame sent by a client on a new connection.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinkInit {
    pub magic: u32,
    pub version: Version,
    /// Raw [`LinkType`], validated by the server
    pub link_type: u32,
    pub peer_id: PeerId,
}

impl LinkInit {
    pub const SIZE: usize = 20;

    pub fn new(protocol: Protocol, link_type: LinkType, peer_id: PeerId) -> LinkInit {
        LinkInit {
            magic: protocol.magic,
            version: protocol.version,
            link_type: link_type as u32,
            peer_id,
        }
    }

    pub fn link_type(&self) -> Option<LinkType> {
        LinkType::from_raw(self.link_type)
    }

    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(Self::SIZE)
            .u32(self.magic)
            .u32(self.version.major())
            .u32(self.version.minor())
            .u32(self.link_type)
            .i32(self.peer_id)
            .finish()
    }

    pub fn decode(data: &[u8]) -> AnsResult<LinkInit> {
        let mut reader = PayloadReader::new(data);
        Ok(LinkInit {
            magic: reader.u32()?,
            version: Version::new(reader.u32()?, reader.u32()?),
            link_type: reader.u32()?,
            peer_id: reader.i32()?,
        })
    }

    pub fn read(channel: &mut impl Channel, timeout: Option<Duration>) -> AnsResult<LinkInit> {
        let mut buf = [0u8; Self::SIZE];
        channel.receive(&mut buf, timeout)?;
        LinkInit::decode(&buf)
    }

    pub fn send(&self, channel: &mut impl Channel) -> AnsResult<()> {
        channel.send(&self.encode())
    }
}

/// Server answer to a [`LinkInit`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LinkResponse {
    pub magic: u32,
    pub version: Version,
    pub link_type: u32,
    pub peer_id: PeerId,
    /// Raw [`AnsStatus`] word
    pub status: u32,
}

impl LinkResponse {
    pub const SIZE: usize = 24;

    /// Response to `init` from a server speaking `protocol`.
    pub fn to(
        init: &LinkInit,
        protocol: Protocol,
        peer_id: PeerId,
        status: AnsStatus,
    ) -> LinkResponse {
        LinkResponse {
            magic: protocol.magic,
            version: protocol.version,
            link_type: init.link_type,
            peer_id,
            status: status.raw(),
        }
    }

    pub fn status(&self) -> AnsStatus {
        AnsStatus::from_raw(self.status).unwrap_or(AnsStatus::Error)
    }

    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(Self::SIZE)
            .u32(self.magic)
            .u32(self.version.major())
            .u32(self.version.minor())
            .u32(self.link_type)
            .i32(self.peer_id)
            .u32(self.status)
            .finish()
    }

    pub fn decode(data: &[u8]) -> AnsResult<LinkResponse> {
        let mut reader = PayloadReader::new(data);
        Ok(LinkResponse {
            magic: reader.u32()?,
            version: Version::new(reader.u32()?, reader.u32()?),
            link_type: reader.u32()?,
            peer_id: reader.i32()?,
            status: reader.u32()?,
        })
    }

    pub fn read(channel: &mut impl Channel, timeout: Option<Duration>) -> AnsResult<LinkResponse> {
        let mut buf = [0u8; Self::SIZE];
        channel.receive(&mut buf, timeout)?;
        LinkResponse::decode(&buf)
    }

    pub fn send(&self, channel: &mut impl Channel) -> AnsResult<()> {
        channel.send(&self.encode())
    }
}

/// Client side of the link handshake. Returns the peer id assigned by the server.
pub fn establish(
    channel: &mut impl Channel,
    protocol: Protocol,
    link_type: LinkType,
    peer_id: PeerId,
    timeout: Duration,
) -> AnsResult<PeerId> {
    LinkInit::new(protocol, link_type, peer_id).send(channel)?;
    let response = LinkResponse::read(channel, Some(timeout))?;
    if response.magic != protocol.magic {
        return Err(AnsError::InvalidHeader(format!(
            "link response carries magic {:#010x}, expected {:#010x}",
            response.magic, protocol.magic
        )));
    }
    match response.status() {
        AnsStatus::Ok => Ok(response.peer_id),
        AnsStatus::IncompatibleProtVer => Err(AnsError::IncompatibleVersion(response.version)),
        status => Err(AnsError::Status(status)),
    }
}
