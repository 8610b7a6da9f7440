//! Server-side view of a client.
//!
//! A client process owns one peer. All its connections (admin and board channels)
//! are registered on the peer so they can be shut down together.

use std::sync::{Mutex, MutexGuard, PoisonError};

use ans_protocol::{
    BoardHandle, PeerId,
    connection::{Connection, ConnectionCloser, ConnectionId},
    error::AnsResult,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct ServerPeer {
    id: PeerId,
    connections: Mutex<Vec<ConnectionCloser>>,
    boards: Mutex<Vec<BoardHandle>>,
}

impl ServerPeer {
    pub fn new(id: PeerId) -> ServerPeer {
        ServerPeer {
            id,
            connections: Mutex::new(Vec::new()),
            boards: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn register_connection(&self, connection: &Connection) -> AnsResult<()> {
        let closer = connection.closer()?;
        log::debug!("Peer {}: registered connection {}", self.id, closer.id());
        lock(&self.connections).push(closer);
        Ok(())
    }

    /// Forgets the connection without closing it.
    pub fn remove_connection(&self, id: ConnectionId) {
        lock(&self.connections).retain(|closer| closer.id() != id);
    }

    /// Shuts down every registered connection, unblocking the workers that serve them.
    pub fn close_connections(&self) {
        let connections: Vec<_> = lock(&self.connections).drain(..).collect();
        for closer in connections {
            log::debug!("Peer {}: closing connection {}", self.id, closer.id());
            closer.close();
        }
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.connections).len()
    }

    pub fn attach_board(&self, handle: BoardHandle) {
        lock(&self.boards).push(handle);
    }

    pub fn detach_board(&self, handle: BoardHandle) {
        let mut boards = lock(&self.boards);
        if let Some(index) = boards.iter().position(|h| *h == handle) {
            boards.remove(index);
        }
    }

    /// Handles of the boards currently attached by the workers of this peer.
    pub fn open_boards(&self) -> Vec<BoardHandle> {
        lock(&self.boards).clone()
    }
}

#[cfg(test)]
mod test {
    use std::{net::TcpListener, time::Duration};

    use ans_protocol::{connection::Channel, error::AnsError};

    use super::*;

    #[test]
    fn closing_the_peer_closes_its_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = Connection::connect(listener.local_addr().unwrap()).unwrap();
        let server = Connection::accept(&listener, None).unwrap();

        let peer = ServerPeer::new(1);
        peer.register_connection(&server).unwrap();
        assert_eq!(peer.connection_count(), 1);

        peer.close_connections();
        assert_eq!(peer.connection_count(), 0);
        let mut buf = [0u8; 1];
        match client.receive(&mut buf, Some(Duration::from_secs(5))) {
            Err(AnsError::Disconnected) => {}
            other => panic!("expected Disconnected, got {:?}", other),
        }
    }

    #[test]
    fn removed_connections_stay_open() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let _client = Connection::connect(listener.local_addr().unwrap()).unwrap();
        let server = Connection::accept(&listener, None).unwrap();

        let peer = ServerPeer::new(2);
        peer.register_connection(&server).unwrap();
        peer.remove_connection(server.id());
        assert_eq!(peer.connection_count(), 0);
        assert!(!server.is_closed());
    }

    #[test]
    fn board_tracking() {
        let peer = ServerPeer::new(3);
        peer.attach_board(7);
        peer.attach_board(9);
        peer.attach_board(7);
        peer.detach_board(7);
        assert_eq!(peer.open_boards(), vec![9, 7]);
    }
}
