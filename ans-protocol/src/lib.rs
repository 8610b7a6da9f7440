//! # ANS Protocol Library
//!
//! This crate implements the ANS network board-access protocol, which lets clients operate
//! MIL-STD-1553 adapters installed in a remote machine as if they were local.
//!
//! ## Overview
//!
//! A client talks to a server over TCP. Every connection starts with a link handshake
//! ([`link`]) that either creates a new peer or attaches the connection to an existing one.
//! After that the connection carries request/response frames ([`frame`], [`codec`]).
//! Administrative commands go to one admin connection per peer, board commands to one
//! connection per open board. Asynchronous board events flow over separate event-stream
//! connections ([`board::EventObserver`]). Servers can be found on the local network with a
//! UDP broadcast ([`discovery`]).
//!
//! The engine itself is agnostic of the board API: payloads of board commands are opaque
//! bytes. The payloads of the MIL-STD-1553 board protocol live in [`mil`].
//!
//! ## Basic Usage
//!
//! ### Encoding a command
//!
//! ```
//! use ans_protocol::{board_id, frame::CmdFrame, mil::ModuleRequest};
//!
//! let mut frame = CmdFrame::board(board_id::CLOSE, ModuleRequest { module_handle: 3 }.encode());
//! frame.prepare(1, 0);
//! let mut buffer = Vec::new();
//! frame.write_to(&mut buffer).expect("Writing to vector shouldn't fail");
//! assert_eq!(buffer.len(), 32);
//! assert_eq!(&buffer[4..8], &12u32.to_le_bytes());
//! ```
//!
//! ### Reading a response
//!
//! ```
//! use ans_protocol::{admin_id, frame::{CmdFrame, CmdRspFrame}, payload::NumBoards};
//!
//! let mut command = CmdFrame::admin(admin_id::GET_NUM_BOARDS, Vec::new());
//! command.prepare(9, 0);
//! let mut wire = Vec::new();
//! CmdRspFrame::ok(&command, NumBoards { num_boards: 2 }.encode())
//!     .write_to(&mut wire)
//!     .expect("Writing to vector shouldn't fail");
//!
//! let response = CmdRspFrame::from_frame_bytes(&wire).expect("Response should parse");
//! response.check(9).expect("Response belongs to the command");
//! assert_eq!(NumBoards::decode(&response.payload).unwrap().num_boards, 2);
//! ```
//!
//! ## Frame Format
//!
//! All integers are little-endian.
//!
//! - **Header**: `transaction_id, transaction_size, fragment_index, fragment_payload_size,
//!   client_id`
//!   (5 x u32). `transaction_size` counts every byte after these 20.
//! - **Command**: header, `command_type: u32`, `function_id: u32`, payload
//! - **Response**: header, `function_id: u32`, `status: u32`, payload
//!
//! ## Error Handling
//!
//! Fallible operations return [`error::AnsResult`]. Every [`error::AnsError`] maps onto the
//! [`error::AnsStatus`] word that is reported on the wire.
//!
//! ## Features
//!
//! - `tokio`: [`async_codec`] with `tokio_util` codecs for the command channel.

pub mod protocol;
pub use protocol::*;
#[cfg(feature = "tokio")]
pub mod async_codec;
pub mod board;
pub mod codec;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod link;
pub mod mem_chunk;
pub mod mil;
pub mod payload;
pub mod registry;
