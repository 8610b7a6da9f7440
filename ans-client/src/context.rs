use std::{
    sync::{Arc, atomic::AtomicU32},
    time::Duration,
};

use ans_protocol::{CMD_RESP_TIMEOUT, Protocol, error::AnsResult, registry::Registry};

use crate::peer::ClientPeer;

type PeerKey = (String, u16);

/// Servers a client process talks to.
///
/// Peers are keyed by host and port and shared through reference counting, so that
/// independent parts of a program end up on the same admin connection. All peers of a
/// context draw their transaction ids from one counter.
#[derive(Debug)]
pub struct ClientContext {
    protocol: Protocol,
    transactions: Arc<AtomicU32>,
    response_timeout: Duration,
    peers: Registry<PeerKey, ClientPeer>,
}

impl Default for ClientContext {
    fn default() -> Self {
        ClientContext::new(Protocol::default())
    }
}

impl ClientContext {
    pub fn new(protocol: Protocol) -> ClientContext {
        ClientContext {
            protocol,
            transactions: Arc::new(AtomicU32::new(1)),
            response_timeout: CMD_RESP_TIMEOUT,
            peers: Registry::new(),
        }
    }

    /// Bound for one command round trip of every peer created afterwards.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn new_peer(&self, host: &str, port: u16) -> ClientPeer {
        ClientPeer::with_counter(
            self.protocol,
            host.to_string(),
            port,
            self.transactions.clone(),
        )
        .with_response_timeout(self.response_timeout)
    }

    /// Looks a peer up and takes a reference.
    pub fn request_peer(&self, host: &str, port: u16) -> Option<Arc<ClientPeer>> {
        self.peers.request(&(host.to_string(), port))
    }

    /// Registers a disconnected peer. `None` if it exists already.
    pub fn create_peer(&self, host: &str, port: u16) -> Option<Arc<ClientPeer>> {
        self.peers
            .create((host.to_string(), port), self.new_peer(host, port))
    }

    /// Takes a reference to the peer, creating it if needed, and makes sure it is connected.
    ///
    /// The reference is dropped again if connecting fails.
    pub fn connect_peer(&self, host: &str, port: u16) -> AnsResult<Arc<ClientPeer>> {
        let peer = self
            .peers
            .request_or_create((host.to_string(), port), || self.new_peer(host, port));
        match peer.connect() {
            Ok(_) => Ok(peer),
            Err(e) => {
                self.release_peer(host, port);
                Err(e)
            }
        }
    }

    /// Drops one reference. The last one disconnects the peer.
    pub fn release_peer(&self, host: &str, port: u16) {
        if let Some(peer) = self.peers.release(&(host.to_string(), port)) {
            peer.disconnect();
        }
    }

    pub fn peer_ref_count(&self, host: &str, port: u16) -> usize {
        self.peers.ref_count(&(host.to_string(), port))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn peers_are_shared_per_address() {
        let context = ClientContext::default();
        let peer = context.create_peer("127.0.0.1", 1553).unwrap();
        assert!(context.create_peer("127.0.0.1", 1553).is_none());
        let same = context.request_peer("127.0.0.1", 1553).unwrap();
        assert!(Arc::ptr_eq(&peer, &same));
        assert!(context.request_peer("127.0.0.1", 1554).is_none());
        assert_eq!(context.peer_ref_count("127.0.0.1", 1553), 2);

        context.release_peer("127.0.0.1", 1553);
        context.release_peer("127.0.0.1", 1553);
        assert!(context.request_peer("127.0.0.1", 1553).is_none());
    }

    #[test]
    fn failed_connect_leaves_no_peer() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let context = ClientContext::default();
        assert!(context.connect_peer("127.0.0.1", port).is_err());
        assert_eq!(context.peer_ref_count("127.0.0.1", port), 0);
    }
}
