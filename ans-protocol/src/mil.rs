//! Payloads of the MIL-STD-1553 board protocol.
//!
//! These ride as opaque payloads through the generic engine; only the hardware layer on
//! the server and the application on the client interpret them.

use crate::{
    error::{AnsError, AnsResult},
    payload::{PayloadReader, PayloadWriter},
    protocol::BoardHandle,
};

/// `OpenBoardID` request
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OpenRequest {
    pub module: u32,
    pub stream: u32,
}

impl OpenRequest {
    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(8)
            .u32(self.module)
            .u32(self.stream)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<OpenRequest> {
        let mut reader = PayloadReader::new(payload);
        Ok(OpenRequest {
            module: reader.u32()?,
            stream: reader.u32()?,
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OpenResponse {
    pub module_handle: BoardHandle,
    pub rc: i32,
}

impl OpenResponse {
    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(8)
            .u32(self.module_handle)
            .i32(self.rc)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<OpenResponse> {
        let mut reader = PayloadReader::new(payload);
        Ok(OpenResponse {
            module_handle: reader.u32()?,
            rc: reader.i32()?,
        })
    }
}

/// Payload of every request that only names the module, e.g. `CloseBoardID`
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ModuleRequest {
    pub module_handle: BoardHandle,
}

impl ModuleRequest {
    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(4)
            .u32(self.module_handle)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<ModuleRequest> {
        Ok(ModuleRequest {
            module_handle: PayloadReader::new(payload).u32()?,
        })
    }
}

/// Response carrying only the return code of the board API
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReturnCode {
    pub rc: i32,
}

impl ReturnCode {
    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(4).i32(self.rc).finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<ReturnCode> {
        Ok(ReturnCode {
            rc: PayloadReader::new(payload).i32()?,
        })
    }
}

/// Location of a memory access on the board.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MemoryRange {
    pub module_handle: BoardHandle,
    pub memtype: u32,
    /// Byte offset relative to the start of the memory type
    pub offset: u32,
    /// Width of one element in bytes
    pub width: u32,
    pub num_elements: u32,
}

impl MemoryRange {
    /// Number of bytes covered, `None` on overflow.
    pub fn byte_len(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.num_elements as usize)
    }

    fn write(&self, writer: PayloadWriter) -> PayloadWriter {
        writer
            .u32(self.module_handle)
            .u32(self.memtype)
            .u32(self.offset)
            .u32(self.width)
            .u32(self.num_elements)
    }

    fn read(reader: &mut PayloadReader<'_>) -> AnsResult<MemoryRange> {
        Ok(MemoryRange {
            module_handle: reader.u32()?,
            memtype: reader.u32()?,
            offset: reader.u32()?,
            width: reader.u32()?,
            num_elements: reader.u32()?,
        })
    }
}

/// `ReadMemoryID` request
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReadMemRequest {
    pub range: MemoryRange,
}

impl ReadMemRequest {
    pub fn encode(&self) -> Vec<u8> {
        self.range.write(PayloadWriter::with_capacity(20)).finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<ReadMemRequest> {
        Ok(ReadMemRequest {
            range: MemoryRange::read(&mut PayloadReader::new(payload))?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadMemResponse {
    pub rc: i32,
    pub bytes_read: u32,
    pub data: Vec<u8>,
}

impl ReadMemResponse {
    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(8 + self.data.len())
            .i32(self.rc)
            .u32(self.bytes_read)
            .bytes(&self.data)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<ReadMemResponse> {
        let mut reader = PayloadReader::new(payload);
        let rc = reader.i32()?;
        let bytes_read = reader.u32()?;
        Ok(ReadMemResponse {
            rc,
            bytes_read,
            data: reader.rest().to_vec(),
        })
    }
}

/// `WriteMemoryID` request
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteMemRequest {
    pub range: MemoryRange,
    pub data: Vec<u8>,
}

impl WriteMemRequest {
    pub fn encode(&self) -> Vec<u8> {
        self.range
            .write(PayloadWriter::with_capacity(20 + self.data.len()))
            .bytes(&self.data)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<WriteMemRequest> {
        let mut reader = PayloadReader::new(payload);
        let range = MemoryRange::read(&mut reader)?;
        Ok(WriteMemRequest {
            range,
            data: reader.rest().to_vec(),
        })
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WriteMemResponse {
    pub rc: i32,
    pub bytes_written: u32,
}

impl WriteMemResponse {
    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(8)
            .i32(self.rc)
            .u32(self.bytes_written)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<WriteMemResponse> {
        let mut reader = PayloadReader::new(payload);
        Ok(WriteMemResponse {
            rc: reader.i32()?,
            bytes_written: reader.u32()?,
        })
    }
}

/// Upper bound of each data array of an `IoCommandID` exchange, in bytes
pub const MAX_IO_DATA: usize = 12 * 1024;

/// Element count field of a variable-length payload.
fn count(value: i32, field: &str) -> AnsResult<usize> {
    usize::try_from(value)
        .map_err(|_| AnsError::Payload(format!("negative {}: {}", field, value)))
}

fn read_words(reader: &mut PayloadReader<'_>, count: usize) -> AnsResult<Vec<u16>> {
    let len = count
        .checked_mul(2)
        .ok_or_else(|| AnsError::Payload(format!("{} words overflow", count)))?;
    Ok(reader
        .bytes(len)?
        .chunks_exact(2)
        .map(|word| u16::from_le_bytes([word[0], word[1]]))
        .collect())
}

fn read_lwords(reader: &mut PayloadReader<'_>, count: usize) -> AnsResult<Vec<u32>> {
    let len = count
        .checked_mul(4)
        .ok_or_else(|| AnsError::Payload(format!("{} long words overflow", count)))?;
    Ok(reader
        .bytes(len)?
        .chunks_exact(4)
        .map(|lword| u32::from_le_bytes([lword[0], lword[1], lword[2], lword[3]]))
        .collect())
}

/// `IoCommandID` request: a raw target command with word and byte arguments.
///
/// On the wire the words precede the bytes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IoCommand {
    pub module_handle: BoardHandle,
    pub biu: u32,
    pub cmd: u32,
    pub expect_ack: i32,
    pub out_words: Vec<u16>,
    pub out_bytes: Vec<u8>,
}

impl IoCommand {
    pub fn encode(&self) -> Vec<u8> {
        let capacity = 24 + 2 * self.out_words.len() + self.out_bytes.len();
        let writer = PayloadWriter::with_capacity(capacity)
            .u32(self.module_handle)
            .u32(self.biu)
            .u32(self.cmd)
            .i32(self.expect_ack)
            .i32(self.out_bytes.len() as i32)
            .i32(self.out_words.len() as i32);
        self.out_words
            .iter()
            .fold(writer, |writer, word| writer.u16(*word))
            .bytes(&self.out_bytes)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<IoCommand> {
        let mut reader = PayloadReader::new(payload);
        let module_handle = reader.u32()?;
        let biu = reader.u32()?;
        let cmd = reader.u32()?;
        let expect_ack = reader.i32()?;
        let byte_count = count(reader.i32()?, "byte count")?;
        let word_count = count(reader.i32()?, "word count")?;
        let out_words = read_words(&mut reader, word_count)?;
        let out_bytes = reader.bytes(byte_count)?.to_vec();
        Ok(IoCommand {
            module_handle,
            biu,
            cmd,
            expect_ack,
            out_words,
            out_bytes,
        })
    }
}

/// Acknowledge of an `IoCommandID` request.
///
/// On the wire the long words come first, then the words, then the bytes.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IoResponse {
    pub rc: i32,
    pub in_lwords: Vec<u32>,
    pub in_words: Vec<u16>,
    pub in_bytes: Vec<u8>,
}

impl IoResponse {
    pub fn encode(&self) -> Vec<u8> {
        let capacity =
            16 + 4 * self.in_lwords.len() + 2 * self.in_words.len() + self.in_bytes.len();
        let writer = PayloadWriter::with_capacity(capacity)
            .i32(self.rc)
            .i32(self.in_bytes.len() as i32)
            .i32(self.in_words.len() as i32)
            .i32(self.in_lwords.len() as i32);
        let writer = self
            .in_lwords
            .iter()
            .fold(writer, |writer, lword| writer.u32(*lword));
        self.in_words
            .iter()
            .fold(writer, |writer, word| writer.u16(*word))
            .bytes(&self.in_bytes)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<IoResponse> {
        let mut reader = PayloadReader::new(payload);
        let rc = reader.i32()?;
        let byte_count = count(reader.i32()?, "byte count")?;
        let word_count = count(reader.i32()?, "word count")?;
        let lword_count = count(reader.i32()?, "long word count")?;
        let in_lwords = read_lwords(&mut reader, lword_count)?;
        let in_words = read_words(&mut reader, word_count)?;
        let in_bytes = reader.bytes(byte_count)?.to_vec();
        Ok(IoResponse {
            rc,
            in_lwords,
            in_words,
            in_bytes,
        })
    }
}

/// `IoCommandStructID` request carrying a complete target command structure
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IoStructCommand {
    pub module_handle: BoardHandle,
    /// Buffer size the caller reserved for the acknowledge structure
    pub expected_ack_size: u32,
    pub command: Vec<u8>,
}

impl IoStructCommand {
    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(12 + self.command.len())
            .u32(self.module_handle)
            .u32(self.command.len() as u32)
            .u32(self.expected_ack_size)
            .bytes(&self.command)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<IoStructCommand> {
        let mut reader = PayloadReader::new(payload);
        let module_handle = reader.u32()?;
        let size = reader.u32()? as usize;
        let expected_ack_size = reader.u32()?;
        Ok(IoStructCommand {
            module_handle,
            expected_ack_size,
            command: reader.bytes(size)?.to_vec(),
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IoStructResponse {
    pub rc: i32,
    pub ack: Vec<u8>,
}

impl IoStructResponse {
    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(8 + self.ack.len())
            .i32(self.rc)
            .u32(self.ack.len() as u32)
            .bytes(&self.ack)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<IoStructResponse> {
        let mut reader = PayloadReader::new(payload);
        let rc = reader.i32()?;
        let size = reader.u32()? as usize;
        Ok(IoStructResponse {
            rc,
            ack: reader.bytes(size)?.to_vec(),
        })
    }
}

/// `GetDriverVersionID` response
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DriverVersion {
    pub rc: i32,
    pub version: u32,
    pub build: u32,
}

impl DriverVersion {
    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(12)
            .i32(self.rc)
            .u32(self.version)
            .u32(self.build)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<DriverVersion> {
        let mut reader = PayloadReader::new(payload);
        Ok(DriverVersion {
            rc: reader.i32()?,
            version: reader.u32()?,
            build: reader.u32()?,
        })
    }
}

/// `GetSoftwareVersionsID` request
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReadVersionRequest {
    pub module_handle: BoardHandle,
    /// Component the version is asked for, see [`version_id`]
    pub version_id: u32,
}

impl ReadVersionRequest {
    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(8)
            .u32(self.module_handle)
            .u32(self.version_id)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<ReadVersionRequest> {
        let mut reader = PayloadReader::new(payload);
        Ok(ReadVersionRequest {
            module_handle: reader.u32()?,
            version_id: reader.u32()?,
        })
    }
}

/// Component ids of [`ReadVersionRequest`].
pub mod version_id {
    pub const SYSTEM_DRIVER: u32 = 0;
    pub const ANS: u32 = 1;
    pub const TARGET_SOFTWARE: u32 = 4;
}

/// Version of one software component of a board.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct VersionInfo {
    pub version_type: u32,
    pub description: String,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u32,
    /// Dot-separated `major.minor.patch.build`, optionally followed by an extension
    pub full_version: String,
}

impl VersionInfo {
    pub const STRING_LEN: usize = 256;
    pub const SIZE: usize = 20 + 2 * Self::STRING_LEN;

    fn write(&self, writer: PayloadWriter) -> PayloadWriter {
        writer
            .u32(self.version_type)
            .fixed_str(&self.description, Self::STRING_LEN)
            .u32(self.major)
            .u32(self.minor)
            .u32(self.patch)
            .u32(self.build)
            .fixed_str(&self.full_version, Self::STRING_LEN)
    }

    fn read(reader: &mut PayloadReader<'_>) -> AnsResult<VersionInfo> {
        Ok(VersionInfo {
            version_type: reader.u32()?,
            description: reader.fixed_str(Self::STRING_LEN)?,
            major: reader.u32()?,
            minor: reader.u32()?,
            patch: reader.u32()?,
            build: reader.u32()?,
            full_version: reader.fixed_str(Self::STRING_LEN)?,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadVersionResponse {
    pub rc: i32,
    pub version: VersionInfo,
}

impl ReadVersionResponse {
    pub const SIZE: usize = 4 + VersionInfo::SIZE;

    pub fn encode(&self) -> Vec<u8> {
        self.version
            .write(PayloadWriter::with_capacity(Self::SIZE).i32(self.rc))
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<ReadVersionResponse> {
        let mut reader = PayloadReader::new(payload);
        let rc = reader.i32()?;
        Ok(ReadVersionResponse {
            rc,
            version: VersionInfo::read(&mut reader)?,
        })
    }
}

/// `GetDriverInfoID` response. Reserved fields are sent as zero.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DriverInfo {
    pub rc: i32,
    pub device_group: u8,
    pub driver_flags: u32,
    pub serial_number: u32,
    pub board_config: u32,
    pub board_type: u32,
    /// Connections currently holding the board open
    pub open_connections: u32,
}

impl DriverInfo {
    pub const SIZE: usize = 44;

    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(Self::SIZE)
            .i32(self.rc)
            .u8(self.device_group)
            .bytes(&[0; 3])
            .u16(0)
            .u16(0)
            .u32(self.driver_flags)
            .u32(self.serial_number)
            .u32(self.board_config)
            .u32(self.board_type)
            .u32(self.open_connections)
            .bytes(&[0; 12])
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<DriverInfo> {
        let mut reader = PayloadReader::new(payload);
        let rc = reader.i32()?;
        let device_group = reader.u8()?;
        reader.bytes(7)?;
        let info = DriverInfo {
            rc,
            device_group,
            driver_flags: reader.u32()?,
            serial_number: reader.u32()?,
            board_config: reader.u32()?,
            board_type: reader.u32()?,
            open_connections: reader.u32()?,
        };
        reader.bytes(12)?;
        Ok(info)
    }
}

/// `GetBoardMemSizeID` response
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BoardMemSize {
    pub rc: i32,
    /// Size of the board memory in bytes
    pub size: u32,
}

impl BoardMemSize {
    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(8)
            .i32(self.rc)
            .u32(self.size)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<BoardMemSize> {
        let mut reader = PayloadReader::new(payload);
        Ok(BoardMemSize {
            rc: reader.i32()?,
            size: reader.u32()?,
        })
    }
}

/// `RegisterCallbackID` and `UnregisterCallbackID` request
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CallbackRequest {
    pub module_handle: BoardHandle,
    pub biu: u32,
    pub kind: u32,
}

impl CallbackRequest {
    pub fn encode(&self) -> Vec<u8> {
        PayloadWriter::with_capacity(12)
            .u32(self.module_handle)
            .u32(self.biu)
            .u32(self.kind)
            .finish()
    }

    pub fn decode(payload: &[u8]) -> AnsResult<CallbackRequest> {
        let mut reader = PayloadReader::new(payload);
        Ok(CallbackRequest {
            module_handle: reader.u32()?,
            biu: reader.u32()?,
            kind: reader.u32()?,
        })
    }
}

/// Event pushed through an event stream.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Event {
    pub module_handle: BoardHandle,
    pub biu: u32,
    pub kind: u32,
    pub data: [u32; 4],
}

impl Event {
    pub const SIZE: usize = 28;

    pub fn encode(&self) -> Vec<u8> {
        self.data
            .iter()
            .fold(
                PayloadWriter::with_capacity(Self::SIZE)
                    .u32(self.module_handle)
                    .u32(self.biu)
                    .u32(self.kind),
                |writer, word| writer.u32(*word),
            )
            .finish()
    }

    pub fn decode(data: &[u8]) -> AnsResult<Event> {
        let mut reader = PayloadReader::new(data);
        let module_handle = reader.u32()?;
        let biu = reader.u32()?;
        let kind = reader.u32()?;
        let mut words = [0u32; 4];
        for word in words.iter_mut() {
            *word = reader.u32()?;
        }
        Ok(Event {
            module_handle,
            biu,
            kind,
            data: words,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn read_memory_request_layout() {
        let request = ReadMemRequest {
            range: MemoryRange {
                module_handle: 7,
                memtype: 0,
                offset: 0x100,
                width: 2,
                num_elements: 4,
            },
        };
        let encoded = request.encode();
        assert_eq!(encoded.len(), 20);
        assert_eq!(request.range.byte_len(), Some(8));
        assert_eq!(ReadMemRequest::decode(&encoded).unwrap(), request);
    }

    #[test]
    fn write_memory_carries_trailing_data() {
        let request = WriteMemRequest {
            range: MemoryRange {
                module_handle: 1,
                memtype: 1,
                offset: 0,
                width: 1,
                num_elements: 3,
            },
            data: vec![1, 2, 3],
        };
        let encoded = request.encode();
        assert_eq!(encoded.len(), 23);
        assert_eq!(WriteMemRequest::decode(&encoded).unwrap(), request);
    }

    #[test]
    fn event_layout() {
        let event = Event {
            module_handle: 7,
            biu: 1,
            kind: 2,
            data: [3, 4, 5, 6],
        };
        let encoded = event.encode();
        assert_eq!(encoded.len(), Event::SIZE);
        assert_eq!(&encoded[12..16], &[3, 0, 0, 0]);
        assert_eq!(Event::decode(&encoded).unwrap(), event);
    }

    #[test]
    fn io_command_sends_words_before_bytes() {
        let command = IoCommand {
            module_handle: 2,
            biu: 1,
            cmd: 0x40,
            expect_ack: 1,
            out_words: vec![0x1122],
            out_bytes: vec![0xAA, 0xBB],
        };
        let encoded = command.encode();
        assert_eq!(encoded.len(), 28);
        assert_eq!(&encoded[16..24], &[2, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(&encoded[24..], &[0x22, 0x11, 0xAA, 0xBB]);
        assert_eq!(IoCommand::decode(&encoded).unwrap(), command);
    }

    #[test]
    fn io_command_rejects_bad_counts() {
        let mut encoded = IoCommand {
            module_handle: 0,
            biu: 0,
            cmd: 0,
            expect_ack: 0,
            out_words: Vec::new(),
            out_bytes: vec![1],
        }
        .encode();
        encoded[16..20].copy_from_slice(&(-1i32).to_le_bytes());
        assert!(IoCommand::decode(&encoded).is_err());

        encoded[16..20].copy_from_slice(&4i32.to_le_bytes());
        assert!(IoCommand::decode(&encoded).is_err());
    }

    #[test]
    fn io_response_orders_long_words_first() {
        let response = IoResponse {
            rc: 0,
            in_lwords: vec![0x0102_0304],
            in_words: vec![0x0506],
            in_bytes: vec![7],
        };
        let encoded = response.encode();
        assert_eq!(&encoded[4..16], &[1, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(&encoded[16..], &[4, 3, 2, 1, 6, 5, 7]);
        assert_eq!(IoResponse::decode(&encoded).unwrap(), response);
    }

    #[test]
    fn version_response_layout() {
        let response = ReadVersionResponse {
            rc: 0,
            version: VersionInfo {
                version_type: version_id::SYSTEM_DRIVER,
                description: "System Driver".to_string(),
                major: 15,
                minor: 3,
                patch: 0,
                build: 1,
                full_version: "15.3.0.1".to_string(),
            },
        };
        let encoded = response.encode();
        assert_eq!(encoded.len(), ReadVersionResponse::SIZE);
        assert_eq!(&encoded[264..268], &[15, 0, 0, 0]);
        assert_eq!(ReadVersionResponse::decode(&encoded).unwrap(), response);
    }

    #[test]
    fn driver_info_layout() {
        let info = DriverInfo {
            rc: 0,
            device_group: 3,
            serial_number: 77,
            open_connections: 2,
            ..Default::default()
        };
        let encoded = info.encode();
        assert_eq!(encoded.len(), DriverInfo::SIZE);
        assert_eq!(encoded[4], 3);
        assert_eq!(&encoded[28..32], &[2, 0, 0, 0]);
        assert_eq!(DriverInfo::decode(&encoded).unwrap(), info);
    }
}
