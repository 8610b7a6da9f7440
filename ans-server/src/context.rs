//! State shared by every worker of a server.

use std::sync::{
    Arc,
    atomic::{AtomicI32, AtomicU32, Ordering},
};

use ans_protocol::{
    BoardHandle, PeerId, Protocol,
    board::Board,
    error::{AnsError, AnsResult, AnsStatus},
    payload::ServerInfo,
    registry::Registry,
};

use crate::{peer::ServerPeer, server::Config};

/// Peers, boards and server identity.
///
/// One instance exists per server and is handed to every worker through an [`Arc`].
#[derive(Debug)]
pub struct ServerContext {
    protocol: Protocol,
    config: Config,
    board_count: AtomicU32,
    boards: Registry<BoardHandle, Board>,
    peers: Registry<PeerId, ServerPeer>,
    next_peer_id: AtomicI32,
}

impl ServerContext {
    pub fn new(protocol: Protocol, config: Config) -> ServerContext {
        ServerContext {
            protocol,
            config,
            board_count: AtomicU32::new(0),
            boards: Registry::new(),
            peers: Registry::new(),
            next_peer_id: AtomicI32::new(0),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of boards the hardware layer hosts, as reported by `GetNumBoards` and discovery.
    pub fn board_count(&self) -> u32 {
        self.board_count.load(Ordering::Relaxed)
    }

    pub fn set_board_count(&self, count: u32) {
        self.board_count.store(count, Ordering::Relaxed);
    }

    /// Creates a peer with a fresh, non-negative id.
    pub fn create_peer(&self) -> Arc<ServerPeer> {
        loop {
            let id = self.next_peer_id.fetch_add(1, Ordering::Relaxed) & i32::MAX;
            if let Some(peer) = self.peers.create(id, ServerPeer::new(id)) {
                log::info!("Created peer {}", id);
                return peer;
            }
        }
    }

    /// Takes a reference to an existing peer.
    pub fn request_peer(&self, id: PeerId) -> Option<Arc<ServerPeer>> {
        self.peers.request(&id)
    }

    /// Drops a peer reference. The last release closes every connection of the peer.
    pub fn release_peer(&self, id: PeerId) {
        if let Some(peer) = self.peers.release(&id) {
            peer.close_connections();
            log::info!("Peer {} removed", id);
        }
    }

    pub fn peer_ref_count(&self, id: PeerId) -> usize {
        self.peers.ref_count(&id)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn request_board(&self, handle: BoardHandle) -> Option<Arc<Board>> {
        self.boards.request(&handle)
    }

    /// Looks a board up without taking a reference.
    pub fn board(&self, handle: BoardHandle) -> Option<Arc<Board>> {
        self.boards.peek(&handle)
    }

    /// Adds a board with a reference count of one. `None` if the handle is taken.
    pub fn create_board(&self, handle: BoardHandle) -> Option<Arc<Board>> {
        self.boards.create(handle, Board::new(handle))
    }

    /// Takes a reference to the board, creating it when nobody holds it yet.
    pub fn attach_board(&self, handle: BoardHandle) -> Arc<Board> {
        self.boards.request_or_create(handle, || Board::new(handle))
    }

    /// Drops a board reference. The last release tears the board down.
    pub fn release_board(&self, handle: BoardHandle) {
        if let Some(board) = self.boards.release(&handle) {
            board.teardown();
        }
    }

    pub fn board_ref_count(&self, handle: BoardHandle) -> usize {
        self.boards.ref_count(&handle)
    }

    /// Sends `data` to every event observer of the board. Returns the number of observers reached.
    pub fn publish_event(&self, handle: BoardHandle, data: &[u8]) -> AnsResult<usize> {
        let board = self
            .board(handle)
            .ok_or(AnsError::Status(AnsStatus::InvalidModuleIndex))?;
        Ok(board.publish_event(data))
    }

    /// Server description returned by `GetServerInfo`.
    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.config.name.clone(),
            description: self.config.description.clone(),
            server_version: self.config.version.clone(),
            protocol_version: self.protocol.version,
            host_name: host_name(),
            os_info: os_info(),
        }
    }
}

pub(crate) fn host_name() -> String {
    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            log::error!("Failed to determine host name: {}", e);
            String::new()
        }
    }
}

fn os_info() -> String {
    match nix::sys::utsname::uname() {
        Ok(uts) => [uts.release(), uts.version(), uts.machine()]
            .iter()
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" "),
        Err(e) => {
            log::error!("Failed to determine OS info: {}", e);
            String::new()
        }
    }
}
