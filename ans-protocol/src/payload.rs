//! Little-endian field access for fixed-layout payloads, plus the payloads
//! understood by the protocol engine itself.

use crate::{
    error::{AnsError, AnsResult},
    protocol::Version,
};

/// Sequential reader over a payload.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> PayloadReader<'a> {
        PayloadReader { data, position: 0 }
    }

    pub fn bytes(&mut self, len: usize) -> AnsResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                AnsError::Payload(format!(
                    "need {} bytes at offset {}, payload has {}",
                    len,
                    self.position,
                    self.data.len()
                ))
            })?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> AnsResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> AnsResult<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> AnsResult<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> AnsResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> AnsResult<i32> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    /// A NUL-padded string field of `len` bytes.
    pub fn fixed_str(&mut self, len: usize) -> AnsResult<String> {
        let raw = self.bytes(len)?;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// Everything that has not been read yet.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.position..];
        self.position = self.data.len();
        rest
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }
}

/// Builder for fixed-layout payloads.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    data: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> PayloadWriter {
        PayloadWriter::default()
    }

    pub fn with_capacity(capacity: usize) -> PayloadWriter {
        PayloadWriter {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn u8(mut self, value: u8) -> Self {
        self.data.push(value);
        self
    }

    pub fn u16(mut self, value: u16) -> Self {
        self.data.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.data.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn i32(mut self, value: i32) -> Self {
        self.data.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn bytes(mut self, value: &[u8]) -> Self {
        self.data.extend_from_slice(value);
        self
    }

    /// Writes `value` into a field of `len` bytes, truncating so that a terminating NUL
    /// always fits.
    pub fn fixed_str(mut self, value: &str, len: usize) -> Self {
        let bytes = value.as_bytes();
        let used = bytes.len().min(len.saturating_sub(1));
        self.data.extend_from_slice(&bytes[..used]);
        self.data.resize(self.data.len() + (len - used), 0);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// Response to `GetNumBoards`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NumBoards {
    pub num_boards: u32,
}

impl NumBoards {
    pub const SIZE: usize = 4;

    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(Self::SIZE)
            .u32(self.num_boards)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<NumBoards> {
        Ok(NumBoards {
            num_boards: PayloadReader::new(payload).u32()?,
        })
    }
}

/// Version of the server software.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SoftwareVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub version_string: String,
}

/// Response to `GetServerInfo`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ServerInfo {
    pub name: String,
    pub description: String,
    pub server_version: SoftwareVersion,
    pub protocol_version: Version,
    pub host_name: String,
    pub os_info: String,
}

impl ServerInfo {
    pub const STRING_SIZE: usize = 128;
    pub const SIZE: usize = 5 * Self::STRING_SIZE + 5 * 4;

    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(Self::SIZE)
            .fixed_str(&self.name, Self::STRING_SIZE)
            .fixed_str(&self.description, Self::STRING_SIZE)
            .u32(self.server_version.major)
            .u32(self.server_version.minor)
            .u32(self.server_version.patch)
            .fixed_str(&self.server_version.version_string, Self::STRING_SIZE)
            .u32(self.protocol_version.major())
            .u32(self.protocol_version.minor())
            .fixed_str(&self.host_name, Self::STRING_SIZE)
            .fixed_str(&self.os_info, Self::STRING_SIZE)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<ServerInfo> {
        let mut reader = PayloadReader::new(payload);
        let name = reader.fixed_str(Self::STRING_SIZE)?;
        let description = reader.fixed_str(Self::STRING_SIZE)?;
        let server_version = SoftwareVersion {
            major: reader.u32()?,
            minor: reader.u32()?,
            patch: reader.u32()?,
            version_string: reader.fixed_str(Self::STRING_SIZE)?,
        };
        let protocol_version = Version::new(reader.u32()?, reader.u32()?);
        Ok(ServerInfo {
            name,
            description,
            server_version,
            protocol_version,
            host_name: reader.fixed_str(Self::STRING_SIZE)?,
            os_info: reader.fixed_str(Self::STRING_SIZE)?,
        })
    }
}

/// Response to `OpenBoardEventStream`.
///
/// `handle` is the port of the listening socket widened to 32 bits.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EventStreamOpened {
    pub handle: u32,
    pub port: u16,
}

impl EventStreamOpened {
    pub const SIZE: usize = 6;

    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(Self::SIZE)
            .u32(self.handle)
            .u16(self.port)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<EventStreamOpened> {
        let mut reader = PayloadReader::new(payload);
        Ok(EventStreamOpened {
            handle: reader.u32()?,
            port: reader.u16()?,
        })
    }
}

/// Payload of `CloseBoardEventStream`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CloseEventStream {
    pub handle: u32,
}

impl CloseEventStream {
    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::new().u32(self.handle).finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<CloseEventStream> {
        Ok(CloseEventStream {
            handle: PayloadReader::new(payload).u32()?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fixed_strings_are_padded_and_terminated() {
        let data = PayloadWriter::new()
            .fixed_str("abc", 5)
            .fixed_str("truncated", 4)
            .finish();
        assert_eq!(data, b"abc\0\0tru\0".to_vec());

        let mut reader = PayloadReader::new(&data);
        assert_eq!(reader.fixed_str(5).unwrap(), "abc");
        assert_eq!(reader.fixed_str(4).unwrap(), "tru");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn short_payload_is_an_error() {
        let mut reader = PayloadReader::new(&[1, 2]);
        match reader.u32() {
            Err(AnsError::Payload(_)) => {}
            other => panic!("expected Payload error, got {:?}", other),
        }
    }

    #[test]
    fn server_info_layout() {
        let info = ServerInfo {
            name: "ANS1553".to_string(),
            description: "MIL-STD-1553 boards".to_string(),
            server_version: SoftwareVersion {
                major: 1,
                minor: 2,
                patch: 3,
                version_string: "1.2.3".to_string(),
            },
            protocol_version: Version::V2_2,
            host_name: "bench-01".to_string(),
            os_info: "6.1.0 #1 SMP x86_64".to_string(),
        };
        let encoded = info.encode();
        assert_eq!(encoded.len(), ServerInfo::SIZE);
        assert_eq!(encoded.len(), 660);
        // protocol version follows name, description and the server version block
        assert_eq!(&encoded[396..404], &[2, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(ServerInfo::decode(&encoded).unwrap(), info);
    }

    #[test]
    fn event_stream_port_is_little_endian() {
        let encoded = EventStreamOpened {
            handle: 0xC350,
            port: 0xC350,
        }
        .encode();
        assert_eq!(encoded, vec![0x50, 0xC3, 0, 0, 0x50, 0xC3]);
    }
}
