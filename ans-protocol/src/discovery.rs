//! UDP discovery packets.
//!
//! Clients broadcast a `BING` request carrying the UDP port they listen on; servers
//! answer with a `BONG` response describing where and what they serve.

use crate::{
    error::{AnsError, AnsResult},
    payload::{PayloadReader, PayloadWriter},
    protocol::{Protocol, Version},
};

/// Magic value of a discovery request: ASCII `BING`
pub const REQUEST_MAGIC: u32 = 0x4249_4E47;
/// Magic value of a discovery response: ASCII `BONG`
pub const RESPONSE_MAGIC: u32 = 0x424F_4E47;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoveryRequest {
    /// UDP port the response should be sent to
    pub port: i32,
    pub info: String,
}

impl DiscoveryRequest {
    pub const SIZE: usize = 40;
    const INFO_SIZE: usize = 32;

    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(Self::SIZE)
            .u32(REQUEST_MAGIC)
            .i32(self.port)
            .fixed_str(&self.info, Self::INFO_SIZE)
            .finish()
    }

    /// Parses a datagram. Only complete packets with the request magic are accepted.
    pub fn decode(datagram: &[u8]) -> AnsResult<DiscoveryRequest> {
        if datagram.len() != Self::SIZE {
            return Err(AnsError::Payload(format!(
                "discovery request of {} bytes, expected {}",
                datagram.len(),
                Self::SIZE
            )));
        }
        let mut reader = PayloadReader::new(datagram);
        let magic = reader.u32()?;
        if magic != REQUEST_MAGIC {
            return Err(AnsError::Payload(format!(
                "unexpected discovery magic {:#010x}",
                magic
            )));
        }
        Ok(DiscoveryRequest {
            port: reader.i32()?,
            info: reader.fixed_str(Self::INFO_SIZE)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoveryResponse {
    /// Upper 16 bits of the protocol magic
    pub protocol: u32,
    /// TCP port of the server
    pub port: u32,
    pub board_count: u32,
    pub version: Version,
    pub host_name: String,
}

impl DiscoveryResponse {
    pub const SIZE: usize = 152;
    const HOST_NAME_SIZE: usize = 128;

    pub fn new(protocol: Protocol, port: u16, board_count: u32, host_name: String) -> Self {
        DiscoveryResponse {
            protocol: protocol.discovery_id(),
            port: port as u32,
            board_count,
            version: protocol.version,
            host_name,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(Self::SIZE)
            .u32(RESPONSE_MAGIC)
            .u32(self.protocol)
            .u32(self.port)
            .u32(self.board_count)
            .u32(self.version.major())
            .u32(self.version.minor())
            .fixed_str(&self.host_name, Self::HOST_NAME_SIZE)
            .finish()
    }

    pub fn decode(datagram: &[u8]) -> AnsResult<DiscoveryResponse> {
        if datagram.len() != Self::SIZE {
            return Err(AnsError::Payload(format!(
                "discovery response of {} bytes, expected {}",
                datagram.len(),
                Self::SIZE
            )));
        }
        let mut reader = PayloadReader::new(datagram);
        let magic = reader.u32()?;
        if magic != RESPONSE_MAGIC {
            return Err(AnsError::Payload(format!(
                "unexpected discovery magic {:#010x}",
                magic
            )));
        }
        Ok(DiscoveryResponse {
            protocol: reader.u32()?,
            port: reader.u32()?,
            board_count: reader.u32()?,
            version: Version::new(reader.u32()?, reader.u32()?),
            host_name: reader.fixed_str(Self::HOST_NAME_SIZE)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_layout() {
        let request = DiscoveryRequest {
            port: 11553,
            info: "scan".to_string(),
        };
        let encoded = request.encode();
        assert_eq!(encoded.len(), DiscoveryRequest::SIZE);
        assert_eq!(&encoded[..4], b"GNIB");
        assert_eq!(DiscoveryRequest::decode(&encoded).unwrap(), request);
    }

    #[test]
    fn response_advertises_protocol_id() {
        let response =
            DiscoveryResponse::new(Protocol::ANS1553, 1553, 2, "bench-01".to_string());
        let encoded = response.encode();
        assert_eq!(encoded.len(), DiscoveryResponse::SIZE);
        assert_eq!(&encoded[4..8], &0x1553u32.to_le_bytes());
        assert_eq!(DiscoveryResponse::decode(&encoded).unwrap(), response);
    }

    #[test]
    fn foreign_datagrams_are_rejected() {
        assert!(DiscoveryRequest::decode(b"hello").is_err());
        let mut wrong_magic = DiscoveryRequest {
            port: 1,
            info: String::new(),
        }
        .encode();
        wrong_magic[0] ^= 0xFF;
        assert!(DiscoveryRequest::decode(&wrong_magic).is_err());
    }
}
