//! Frame layouts of the command channel.
//!
//! Every frame starts with the 20 byte generic [`Header`]. Its `transaction_size`
//! counts all bytes that follow the generic header, including the command or
//! response specific header fields. Frames are never terminated by a delimiter.

use crate::{
    error::{AnsError, AnsResult, AnsStatus},
    protocol::CommandType,
};

/// Generic header in front of every frame.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Header {
    pub transaction_id: u32,
    /// Number of bytes following the generic header
    pub transaction_size: u32,
    pub fragment_index: u32,
    pub fragment_payload_size: u32,
    pub client_id: u32,
}

impl Header {
    pub const SIZE: usize = 20;

    /// Header of an unfragmented frame carrying `size` bytes after the generic header.
    pub fn unfragmented(transaction_id: u32, size: u32, client_id: u32) -> Header {
        Header {
            transaction_id,
            transaction_size: size,
            fragment_index: 0,
            fragment_payload_size: size,
            client_id,
        }
    }

    /// Total number of bytes the frame occupies on the wire.
    ///
    /// Fails if the announced size does not fit into `usize`.
    pub fn frame_size(&self) -> AnsResult<usize> {
        usize::try_from(self.transaction_size)
            .ok()
            .and_then(|size| size.checked_add(Self::SIZE))
            .ok_or_else(|| {
                AnsError::InvalidHeader(format!(
                    "transaction size {} exceeds the address space",
                    self.transaction_size
                ))
            })
    }
}

/// Command type and function id following the generic header of a command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CmdHeader {
    pub ans: Header,
    /// Raw [`CommandType`]. Kept raw so that workers can reject unknown values themselves.
    pub command_type: u32,
    pub function_id: u32,
}

impl CmdHeader {
    pub const SIZE: usize = Header::SIZE + 8;
    /// Minimum transaction size of a valid command frame
    pub const EXTRA: u32 = 8;
}

/// A command sent from client to server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CmdFrame {
    pub header: CmdHeader,
    pub payload: Vec<u8>,
}

impl CmdFrame {
    /// A command with zeroed transaction fields. The sender fills those in at transmission.
    pub fn new(command_type: CommandType, function_id: u32, payload: Vec<u8>) -> CmdFrame {
        let mut frame = CmdFrame {
            header: CmdHeader {
                ans: Header::default(),
                command_type: command_type as u32,
                function_id,
            },
            payload,
        };
        frame.header.ans = Header::unfragmented(0, frame.transaction_size(), 0);
        frame
    }

    pub fn admin(function_id: u32, payload: Vec<u8>) -> CmdFrame {
        CmdFrame::new(CommandType::Admin, function_id, payload)
    }

    pub fn board(function_id: u32, payload: Vec<u8>) -> CmdFrame {
        CmdFrame::new(CommandType::Board, function_id, payload)
    }

    pub fn command_type(&self) -> Option<CommandType> {
        CommandType::from_raw(self.header.command_type)
    }

    pub fn function_id(&self) -> u32 {
        self.header.function_id
    }

    pub fn transaction_id(&self) -> u32 {
        self.header.ans.transaction_id
    }

    /// Stamps transaction and client id and recomputes the size fields from the payload.
    pub fn prepare(&mut self, transaction_id: u32, client_id: u32) {
        self.header.ans = Header::unfragmented(transaction_id, self.transaction_size(), client_id);
    }

    fn transaction_size(&self) -> u32 {
        CmdHeader::EXTRA + self.payload.len() as u32
    }
}

/// Function id and status following the generic header of a response.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RspHeader {
    pub ans: Header,
    pub function_id: u32,
    /// Raw [`AnsStatus`] word
    pub status: u32,
}

impl RspHeader {
    pub const SIZE: usize = Header::SIZE + 8;
    pub const EXTRA: u32 = 8;
}

/// A response sent from server to client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CmdRspFrame {
    pub header: RspHeader,
    pub payload: Vec<u8>,
}

impl CmdRspFrame {
    /// Response to `command`, copying its transaction id, client id and function id.
    pub fn for_command(command: &CmdFrame, status: AnsStatus, payload: Vec<u8>) -> CmdRspFrame {
        let size = RspHeader::EXTRA + payload.len() as u32;
        CmdRspFrame {
            header: RspHeader {
                ans: Header::unfragmented(
                    command.header.ans.transaction_id,
                    size,
                    command.header.ans.client_id,
                ),
                function_id: command.header.function_id,
                status: status.raw(),
            },
            payload,
        }
    }

    pub fn ok(command: &CmdFrame, payload: Vec<u8>) -> CmdRspFrame {
        CmdRspFrame::for_command(command, AnsStatus::Ok, payload)
    }

    /// Response carrying only a status word.
    pub fn error(command: &CmdFrame, status: AnsStatus) -> CmdRspFrame {
        CmdRspFrame::for_command(command, status, Vec::new())
    }

    /// Decoded status. Unknown status words are reported as [`AnsStatus::Error`].
    pub fn status(&self) -> AnsStatus {
        AnsStatus::from_raw(self.header.status).unwrap_or(AnsStatus::Error)
    }

    /// Replaces status and payload, keeping the header sizes consistent.
    pub fn set_status(&mut self, status: AnsStatus, payload: Vec<u8>) {
        self.header.status = status.raw();
        self.payload = payload;
        let size = RspHeader::EXTRA + self.payload.len() as u32;
        self.header.ans.transaction_size = size;
        self.header.ans.fragment_payload_size = size;
    }

    pub fn transaction_id(&self) -> u32 {
        self.header.ans.transaction_id
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::protocol::board_id;

    #[test]
    fn command_sizes_follow_payload() {
        let mut frame = CmdFrame::board(board_id::READ_MEMORY, vec![0; 20]);
        assert_eq!(frame.header.ans.transaction_size, 28);
        assert_eq!(frame.header.ans.frame_size().unwrap(), 48);
        frame.payload.truncate(4);
        frame.prepare(7, 3);
        assert_eq!(frame.header.ans.transaction_size, 12);
        assert_eq!(frame.header.ans.fragment_payload_size, 12);
        assert_eq!(frame.transaction_id(), 7);
        assert_eq!(frame.header.ans.client_id, 3);
    }

    #[test]
    fn response_copies_request_identity() {
        let mut command = CmdFrame::board(board_id::CLOSE, vec![1, 0, 0, 0]);
        command.prepare(42, 5);
        let mut response = CmdRspFrame::ok(&command, vec![0; 4]);
        assert_eq!(response.transaction_id(), 42);
        assert_eq!(response.header.ans.client_id, 5);
        assert_eq!(response.header.function_id, board_id::CLOSE);
        assert_eq!(response.header.ans.transaction_size, 12);

        response.set_status(AnsStatus::Error, Vec::new());
        assert_eq!(response.status(), AnsStatus::Error);
        assert_eq!(response.header.ans.transaction_size, 8);
    }

    #[test]
    fn largest_announced_size() {
        let header = Header {
            transaction_size: u32::MAX,
            ..Default::default()
        };
        #[cfg(target_pointer_width = "64")]
        assert_eq!(
            header.frame_size().unwrap(),
            u32::MAX as usize + Header::SIZE
        );
        #[cfg(not(target_pointer_width = "64"))]
        assert!(matches!(
            header.frame_size(),
            Err(AnsError::InvalidHeader(_))
        ));
    }
}
