/// Read and write implementations for the frames of the command channel
use std::{
    io::{self, Write},
    time::Duration,
};

use crate::{
    connection::Channel,
    error::{AnsError, AnsResult, AnsStatus},
    frame::{CmdFrame, CmdHeader, CmdRspFrame, Header, RspHeader},
    mem_chunk::MemChunk,
    protocol::DEFAULT_MAX_FRAME_SIZE,
};

pub(crate) fn le_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(word)
}

impl Header {
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        writer.write_all(&self.transaction_id.to_le_bytes())?;
        writer.write_all(&self.transaction_size.to_le_bytes())?;
        writer.write_all(&self.fragment_index.to_le_bytes())?;
        writer.write_all(&self.fragment_payload_size.to_le_bytes())?;
        writer.write_all(&self.client_id.to_le_bytes())
    }

    pub fn from_bytes(bytes: &[u8; Header::SIZE]) -> Header {
        Header {
            transaction_id: le_u32(bytes, 0),
            transaction_size: le_u32(bytes, 4),
            fragment_index: le_u32(bytes, 8),
            fragment_payload_size: le_u32(bytes, 12),
            client_id: le_u32(bytes, 16),
        }
    }

    /// Parses the header at the start of `bytes`, which must hold at least [`Header::SIZE`] bytes.
    pub fn parse(bytes: &[u8]) -> AnsResult<Header> {
        let head = bytes.first_chunk::<{ Header::SIZE }>().ok_or_else(|| {
            AnsError::InvalidHeader(format!("frame of {} bytes has no header", bytes.len()))
        })?;
        Ok(Header::from_bytes(head))
    }

    /// Rejects announced sizes that exceed `max_size` before anything gets allocated.
    pub fn check_size(&self, max_size: usize) -> AnsResult<()> {
        let size = self.transaction_size as usize;
        if size > max_size {
            return Err(AnsError::TooManyBytes {
                max: max_size,
                got: size,
            });
        }
        Ok(())
    }
}

/// Reads one frame into `rx` and returns its generic header.
///
/// The header is read first; if it announces a payload, `rx` is grown and exactly that
/// many bytes are read. After a successful read, `rx[..header.frame_size()]` holds the frame.
pub fn read_frame(
    channel: &mut impl Channel,
    timeout: Option<Duration>,
    max_size: usize,
    rx: &mut MemChunk,
) -> AnsResult<Header> {
    rx.reallocate(Header::SIZE)?;
    channel.receive(&mut rx.as_mut_slice()[..Header::SIZE], timeout)?;
    let header = Header::parse(rx.as_slice())?;
    log::trace!("Received frame header {:?}", header);

    if header.transaction_size > 0 {
        header.check_size(max_size)?;
        let frame_size = header.frame_size()?;
        rx.reallocate(frame_size)?;
        channel.receive(&mut rx.as_mut_slice()[Header::SIZE..frame_size], timeout)?;
    }
    Ok(header)
}

/// Sends the first `header.frame_size()` bytes of `tx` in one go.
pub fn send_frame(channel: &mut impl Channel, tx: &MemChunk) -> AnsResult<()> {
    let frame_size = Header::parse(tx.as_slice())?.frame_size()?;
    let frame = tx.as_slice().get(..frame_size).ok_or_else(|| {
        AnsError::InvalidHeader(format!(
            "header announces {} bytes, buffer holds {}",
            frame_size,
            tx.capacity()
        ))
    })?;
    log::trace!("Sending frame {:02x?}", frame);
    channel.send(frame).map_err(|e| match e {
        AnsError::Io(err) => AnsError::Write(err),
        other => other,
    })
}

impl CmdFrame {
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        self.header.ans.write_to(writer)?;
        writer.write_all(&self.header.command_type.to_le_bytes())?;
        writer.write_all(&self.header.function_id.to_le_bytes())?;
        writer.write_all(&self.payload)
    }

    /// Decodes a complete frame, header included.
    pub fn from_frame_bytes(bytes: &[u8]) -> AnsResult<CmdFrame> {
        let ans = Header::parse(bytes)?;
        if ans.transaction_size < CmdHeader::EXTRA {
            return Err(AnsError::InvalidHeader(format!(
                "command frame announces {} bytes, at least {} required",
                ans.transaction_size,
                CmdHeader::EXTRA
            )));
        }
        let frame = bytes.get(..ans.frame_size()?).ok_or_else(|| {
            AnsError::InvalidHeader(format!("truncated command frame of {} bytes", bytes.len()))
        })?;
        Ok(CmdFrame {
            header: CmdHeader {
                ans,
                command_type: le_u32(frame, Header::SIZE),
                function_id: le_u32(frame, Header::SIZE + 4),
            },
            payload: frame[CmdHeader::SIZE..].to_vec(),
        })
    }

    pub fn read(
        channel: &mut impl Channel,
        timeout: Option<Duration>,
        rx: &mut MemChunk,
    ) -> AnsResult<CmdFrame> {
        Self::read_limited(channel, timeout, DEFAULT_MAX_FRAME_SIZE, rx)
    }

    pub fn read_limited(
        channel: &mut impl Channel,
        timeout: Option<Duration>,
        max_size: usize,
        rx: &mut MemChunk,
    ) -> AnsResult<CmdFrame> {
        let header = read_frame(channel, timeout, max_size, rx)?;
        CmdFrame::from_frame_bytes(&rx.as_slice()[..header.frame_size()?])
    }

    /// Encodes the frame into `tx` and sends it.
    pub fn send(&self, channel: &mut impl Channel, tx: &mut MemChunk) -> AnsResult<()> {
        if self.header.ans.transaction_size != CmdHeader::EXTRA + self.payload.len() as u32 {
            return Err(AnsError::InvalidHeader(format!(
                "command header announces {} bytes for a payload of {}",
                self.header.ans.transaction_size,
                self.payload.len()
            )));
        }
        encode_into(tx, self.header.ans.frame_size()?, |out| self.write_to(out))?;
        send_frame(channel, tx)
    }
}

impl CmdRspFrame {
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        self.header.ans.write_to(writer)?;
        writer.write_all(&self.header.function_id.to_le_bytes())?;
        writer.write_all(&self.header.status.to_le_bytes())?;
        writer.write_all(&self.payload)
    }

    /// Decodes a complete frame, header included. The status word is not interpreted.
    pub fn from_frame_bytes(bytes: &[u8]) -> AnsResult<CmdRspFrame> {
        let ans = Header::parse(bytes)?;
        if ans.transaction_size < RspHeader::EXTRA {
            return Err(AnsError::InvalidHeader(format!(
                "response frame announces {} bytes, at least {} required",
                ans.transaction_size,
                RspHeader::EXTRA
            )));
        }
        let frame = bytes.get(..ans.frame_size()?).ok_or_else(|| {
            AnsError::InvalidHeader(format!("truncated response frame of {} bytes", bytes.len()))
        })?;
        Ok(CmdRspFrame {
            header: RspHeader {
                ans,
                function_id: le_u32(frame, Header::SIZE),
                status: le_u32(frame, Header::SIZE + 4),
            },
            payload: frame[RspHeader::SIZE..].to_vec(),
        })
    }

    /// Reads the response to the command with `transaction_id`.
    ///
    /// Fails with [`AnsError::InvalidTransactionNo`] when the response belongs to another
    /// request and with [`AnsError::Status`] when the server reported a non-OK status.
    pub fn read(
        channel: &mut impl Channel,
        timeout: Option<Duration>,
        transaction_id: u32,
        rx: &mut MemChunk,
    ) -> AnsResult<CmdRspFrame> {
        let header = read_frame(channel, timeout, DEFAULT_MAX_FRAME_SIZE, rx)?;
        let response = CmdRspFrame::from_frame_bytes(&rx.as_slice()[..header.frame_size()?])?;
        response.check(transaction_id)?;
        Ok(response)
    }

    /// Transaction correlation and status check applied to every received response.
    pub fn check(&self, transaction_id: u32) -> AnsResult<()> {
        if self.transaction_id() != transaction_id {
            return Err(AnsError::InvalidTransactionNo {
                expected: transaction_id,
                got: self.transaction_id(),
            });
        }
        match self.status() {
            AnsStatus::Ok => Ok(()),
            status => Err(AnsError::Status(status)),
        }
    }

    pub fn send(&self, channel: &mut impl Channel, tx: &mut MemChunk) -> AnsResult<()> {
        if self.header.ans.transaction_size != RspHeader::EXTRA + self.payload.len() as u32 {
            return Err(AnsError::InvalidHeader(format!(
                "response header announces {} bytes for a payload of {}",
                self.header.ans.transaction_size,
                self.payload.len()
            )));
        }
        encode_into(tx, self.header.ans.frame_size()?, |out| self.write_to(out))?;
        send_frame(channel, tx)
    }
}

fn encode_into(
    tx: &mut MemChunk,
    size: usize,
    write: impl FnOnce(&mut &mut [u8]) -> io::Result<()>,
) -> AnsResult<()> {
    tx.reallocate(size)?;
    let mut out = &mut tx.as_mut_slice()[..size];
    write(&mut out)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test {
    use std::collections::VecDeque;

    use super::*;
    use crate::protocol::{CommandType, board_id};

    /// In-memory channel: everything sent can be received again.
    #[derive(Default)]
    pub(crate) struct Loopback {
        pub(crate) data: VecDeque<u8>,
    }

    impl Channel for Loopback {
        fn send(&mut self, data: &[u8]) -> AnsResult<()> {
            self.data.extend(data);
            Ok(())
        }

        fn receive(&mut self, buf: &mut [u8], _timeout: Option<Duration>) -> AnsResult<()> {
            if self.data.len() < buf.len() {
                return Err(AnsError::Disconnected);
            }
            for b in buf.iter_mut() {
                *b = self.data.pop_front().unwrap_or_default();
            }
            Ok(())
        }
    }

    #[test]
    fn write_header() {
        let header = Header {
            transaction_id: 1,
            transaction_size: 2,
            fragment_index: 3,
            fragment_payload_size: 4,
            client_id: 5,
        };
        let mut out = Vec::new();
        header.write_to(&mut out).unwrap();
        assert_eq!(
            out,
            b"\x01\0\0\0\x02\0\0\0\x03\0\0\0\x04\0\0\0\x05\0\0\0".to_vec()
        );
        assert_eq!(Header::parse(&out).unwrap(), header);
    }

    #[test]
    fn oversized_announcement_is_not_sliced() {
        let header = Header {
            transaction_size: u32::MAX,
            ..Default::default()
        };
        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();
        bytes.extend_from_slice(&[0; 8]);
        assert!(matches!(
            CmdFrame::from_frame_bytes(&bytes),
            Err(AnsError::InvalidHeader(_))
        ));
        assert!(matches!(
            CmdRspFrame::from_frame_bytes(&bytes),
            Err(AnsError::InvalidHeader(_))
        ));
    }

    #[test]
    fn command_frame_round_trip() {
        let mut loopback = Loopback::default();
        let mut tx = MemChunk::new();
        let mut rx = MemChunk::new();

        let mut frame = CmdFrame::board(board_id::WRITE_MEMORY, vec![0xAA; 13]);
        frame.prepare(0x1234, 9);
        frame.send(&mut loopback, &mut tx).unwrap();
        assert_eq!(loopback.data.len(), CmdHeader::SIZE + 13);

        let read = CmdFrame::read(&mut loopback, None, &mut rx).unwrap();
        assert_eq!(read, frame);
        assert_eq!(read.command_type(), Some(CommandType::Board));
    }

    #[test]
    fn buffer_reuse_does_not_leak_old_bytes() {
        let mut loopback = Loopback::default();
        let mut tx = MemChunk::new();
        let mut rx = MemChunk::new();

        CmdFrame::admin(1, vec![7; 64])
            .send(&mut loopback, &mut tx)
            .unwrap();
        CmdFrame::admin(0, vec![1, 2])
            .send(&mut loopback, &mut tx)
            .unwrap();
        assert_eq!(
            loopback.data.len(),
            2 * CmdHeader::SIZE + 64 + 2,
            "only the declared bytes are sent"
        );

        let first = CmdFrame::read(&mut loopback, None, &mut rx).unwrap();
        let second = CmdFrame::read(&mut loopback, None, &mut rx).unwrap();
        assert_eq!(first.payload.len(), 64);
        assert_eq!(second.payload, vec![1, 2]);
        assert!(rx.capacity() >= CmdHeader::SIZE + 64);
    }

    #[test]
    fn short_command_header_is_rejected() {
        let mut loopback = Loopback::default();
        Header::unfragmented(1, 4, 0)
            .write_to(&mut loopback.data)
            .unwrap();
        loopback.data.extend([0u8; 4]);
        match CmdFrame::read(&mut loopback, None, &mut MemChunk::new()) {
            Err(AnsError::InvalidHeader(_)) => {}
            other => panic!("expected InvalidHeader, got {:?}", other),
        }
    }

    #[test]
    fn oversized_frame_is_rejected_before_reading_payload() {
        let mut loopback = Loopback::default();
        Header::unfragmented(1, 1024, 0)
            .write_to(&mut loopback.data)
            .unwrap();
        match CmdFrame::read_limited(&mut loopback, None, 512, &mut MemChunk::new()) {
            Err(AnsError::TooManyBytes { max, got }) => {
                assert_eq!(max, 512);
                assert_eq!(got, 1024);
            }
            other => panic!("expected TooManyBytes, got {:?}", other),
        }
    }

    #[test]
    fn response_with_other_transaction_is_rejected() {
        let mut loopback = Loopback::default();
        let mut tx = MemChunk::new();
        let mut command = CmdFrame::admin(1, Vec::new());
        command.prepare(10, 0);
        CmdRspFrame::ok(&command, vec![1, 2, 3])
            .send(&mut loopback, &mut tx)
            .unwrap();

        match CmdRspFrame::read(&mut loopback, None, 11, &mut MemChunk::new()) {
            Err(AnsError::InvalidTransactionNo { expected, got }) => {
                assert_eq!(expected, 11);
                assert_eq!(got, 10);
            }
            other => panic!("expected InvalidTransactionNo, got {:?}", other),
        }
    }

    #[test]
    fn response_status_is_propagated() {
        let mut loopback = Loopback::default();
        let mut tx = MemChunk::new();
        let mut command = CmdFrame::board(board_id::READ_MEMORY, Vec::new());
        command.prepare(3, 0);
        CmdRspFrame::error(&command, AnsStatus::InvalidModuleIndex)
            .send(&mut loopback, &mut tx)
            .unwrap();

        match CmdRspFrame::read(&mut loopback, None, 3, &mut MemChunk::new()) {
            Err(AnsError::Status(AnsStatus::InvalidModuleIndex)) => {}
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[test]
    fn inconsistent_header_is_not_sent() {
        let mut loopback = Loopback::default();
        let mut frame = CmdFrame::admin(0, vec![0; 4]);
        frame.header.ans.transaction_size = 100;
        assert!(frame.send(&mut loopback, &mut MemChunk::new()).is_err());
        assert!(loopback.data.is_empty());
    }
}
