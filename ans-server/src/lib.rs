//! # ANS Server Library
//!
//! This crate provides the server side of the ANS network board-access protocol: it hosts
//! the boards of one machine for any number of remote clients.
//!
//! ## Overview
//!
//! The server accepts TCP connections, performs the link handshake and hands every
//! connection to a worker thread. Admin connections answer administrative commands, board
//! connections serve exactly one open board each. Asynchronous board events are pushed to
//! subscribers over dedicated event-stream connections, and a UDP responder lets clients
//! find the server on the local network.
//!
//! The engine knows nothing about the hardware. What a command does is decided by the
//! [`handlers::Handlers`] tables the server is built with.
//!
//! ## Architecture
//!
//! - **[`server::Server`]**: binds the sockets and runs the accept loop
//! - **[`context::ServerContext`]**: peer and board registries shared by every worker
//! - **[`peer::ServerPeer`]**: one client process and the connections it owns
//! - **[`handlers::Handlers`]**: function-id dispatch tables
//!
//! ## How It Works
//!
//! 1. A client connects and sends a link-init frame
//! 2. The server checks magic and version and assigns the connection to a peer
//! 3. The admin or board worker reads commands until the client disconnects
//! 4. Each command is dispatched to its handler, board commands under the board lock
//! 5. The handler's response is sent back with the transaction id of the command
//!
//! When the admin connection of a peer ends, every other connection of that peer is closed.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use ans_protocol::{board_id, frame::CmdRspFrame, mil::{OpenRequest, OpenResponse}};
//! use ans_server::{handlers::{Handlers, Opened}, server::Builder};
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! let handlers = Handlers::new().open(|_context, frame| {
//!     let request = OpenRequest::decode(&frame.payload)?;
//!     let response = OpenResponse { module_handle: request.module, rc: 0 };
//!     Ok(Opened {
//!         response: CmdRspFrame::ok(frame, response.encode()),
//!         handle: Some(request.module),
//!     })
//! });
//!
//! let server = Builder::new().build(handlers);
//! server.listen(IpAddr::V4(Ipv4Addr::UNSPECIFIED))?;
//! # Ok::<(), ans_protocol::error::AnsError>(())
//! ```
//!
//! ## Configuration
//!
//! Server behavior can be customized via [`server::Config`] or [`server::Builder`]:
//!
//! - **port**: TCP port, also used by the discovery responder (default: 1553)
//! - **link_init_timeout**: how long a new connection may stay silent (default: 20 seconds)
//! - **event_stream_timeout**: how long to wait for an event subscriber (default: 10 seconds)
//! - **max_frame_size**: largest transaction accepted from a client (default: 16 MiB)
//!
//! ## Logging
//!
//! This crate uses the `log` crate for diagnostics. Configure logging with an
//! implementation like `env_logger`.
//!
//! ## Thread Model
//!
//! Every connection is served on its own thread. Discovery runs on one more thread.
pub mod context;
mod discovery;
mod event_stream;
pub mod handlers;
mod multiplexer;
pub mod peer;
pub mod server;
mod worker;

pub use context::ServerContext;
pub use handlers::Handlers;
pub use server::{Builder, Config, Server};
