//! # ANS Server for simulated MIL-STD-1553 boards
//!
//! Hosts memory-backed MIL-STD-1553 adapters over the ANS protocol, so that clients can
//! be developed and tested without hardware.
//!
//! ## Example Usage
//!
//! ```no_run
//! use ans1553_server::simulated::{SimulatedBoards, handlers};
//! use ans_server::server::Builder;
//! use std::{net::{IpAddr, Ipv4Addr}, sync::Arc};
//!
//! let boards = Arc::new(SimulatedBoards::new(2, 0x10000));
//! let count = boards.count();
//! let server = Builder::new().build(handlers(boards)).bind(IpAddr::V4(Ipv4Addr::UNSPECIFIED))?;
//! server.context().set_board_count(count);
//! server.run()?;
//! # Ok::<(), ans_protocol::error::AnsError>(())
//! ```
pub mod simulated;
