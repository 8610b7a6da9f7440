//! # ANS Client
//!
//! A client library for operating boards hosted by a remote ANS server.
//!
//! ## Overview
//!
//! A [`ClientContext`] keeps track of the servers a process talks to. Each server is a
//! [`ClientPeer`] with one admin connection. Boards opened on a peer get a command
//! connection of their own, linked to the peer during the handshake, and may subscribe
//! to asynchronous events over event streams.
//!
//! Board command payloads are opaque to this crate. The MIL-STD-1553 payloads live in
//! [`ans_protocol::mil`].
//!
//! ## Basic Usage
//!
//! ### Connecting to a Server
//!
//! ```no_run
//! use ans_client::ClientContext;
//!
//! let context = ClientContext::default();
//! let peer = context.connect_peer("192.168.0.10", 1553)?;
//! println!("Server hosts {} boards", peer.request_board_count()?);
//! println!("Running on {}", peer.get_server_info()?.os_info);
//! # Ok::<(), ans_protocol::error::AnsError>(())
//! ```
//!
//! ### Opening a Board
//!
//! ```no_run
//! use ans_client::ClientContext;
//! use ans_protocol::mil::{OpenRequest, OpenResponse};
//!
//! let context = ClientContext::default();
//! let peer = context.connect_peer("192.168.0.10", 1553)?;
//! let board = peer.create_board(0).expect("board 0 is new");
//! peer.connect_board(&board)?;
//! let response = peer.open_board(&board, OpenRequest { module: 0, stream: 1 }.encode())?;
//! let opened = OpenResponse::decode(&response.payload)?;
//! println!("Module handle {}", opened.module_handle);
//! # Ok::<(), ans_protocol::error::AnsError>(())
//! ```
//!
//! ### Finding Servers
//!
//! ```no_run
//! use std::time::Duration;
//!
//! for server in ans_client::discover(Duration::from_secs(1))? {
//!     println!("{} at {}", server.response.host_name, server.addr);
//! }
//! # Ok::<(), ans_protocol::error::AnsError>(())
//! ```
//!
//! ## Related Crates
//!
//! - `ans_server` - Server implementation
//! - `ans_protocol` - Frame encoding and decoding
mod context;
mod discovery;
mod peer;

pub use context::ClientContext;
pub use discovery::{DiscoveredServer, discover, discover_at};
pub use peer::ClientPeer;
