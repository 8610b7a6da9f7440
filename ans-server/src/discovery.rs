//! UDP discovery responder.
//!
//! Answers `BING` requests with a `BONG` response sent to the requesting host at the port
//! named in the request, and announces the server once at startup. Failures are only
//! logged; discovery never stops the TCP service.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};

use ans_protocol::{
    discovery::{DiscoveryRequest, DiscoveryResponse},
    error::{AnsError, AnsResult},
};

use crate::context::{ServerContext, host_name};

/// Datagrams larger than any valid request are truncated and then rejected.
const RECEIVE_BUFFER_SIZE: usize = 256;

/// Binds the responder socket on all interfaces so that broadcasts are received.
pub(crate) fn bind(port: u16) -> AnsResult<UdpSocket> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
        .map_err(AnsError::SocketCreate)?;
    socket.set_broadcast(true).map_err(AnsError::SocketCreate)?;
    Ok(socket)
}

fn response(context: &ServerContext, server_port: u16) -> DiscoveryResponse {
    DiscoveryResponse::new(
        context.protocol(),
        server_port,
        context.board_count(),
        host_name(),
    )
}

/// Broadcasts one response to the discovery port of every client on the network.
pub(crate) fn announce(socket: &UdpSocket, context: &ServerContext, server_port: u16) {
    let target = SocketAddrV4::new(Ipv4Addr::BROADCAST, context.config().client_port);
    match socket.send_to(&response(context, server_port).encode(), target) {
        Ok(_) => log::debug!("Announced server on {}", target),
        Err(e) => log::warn!("Failed to announce server on {}: {}", target, e),
    }
}

/// Answers a single datagram received from `from`.
pub(crate) fn answer(
    socket: &UdpSocket,
    context: &ServerContext,
    server_port: u16,
    datagram: &[u8],
    from: SocketAddr,
) -> AnsResult<()> {
    let request = DiscoveryRequest::decode(datagram)?;
    let port = u16::try_from(request.port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| AnsError::Payload(format!("invalid response port {}", request.port)))?;
    let target = SocketAddr::new(from.ip(), port);
    socket
        .send_to(&response(context, server_port).encode(), target)
        .map_err(AnsError::Write)?;
    log::debug!("Answered discovery request from {} on {}", from, target);
    Ok(())
}

/// Serves discovery requests forever.
pub(crate) fn run(socket: UdpSocket, context: &ServerContext, server_port: u16) {
    announce(&socket, context, server_port);
    let mut buf = [0u8; RECEIVE_BUFFER_SIZE];
    loop {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                if let Err(e) = answer(&socket, context, server_port, &buf[..len], from) {
                    log::debug!("Ignoring datagram from {}: {}", from, e);
                }
            }
            Err(e) => log::error!("Discovery receive failed: {}", e),
        }
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use ans_protocol::Protocol;

    use super::*;
    use crate::server::Config;

    #[test]
    fn request_is_answered_at_the_requested_port() {
        let context = ServerContext::new(Protocol::ANS1553, Config::default());
        context.set_board_count(2);
        let responder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let client_port = client.local_addr().unwrap().port();

        let request = DiscoveryRequest {
            port: client_port as i32,
            info: String::new(),
        };
        // the source port differs from the port the client asked to be answered at
        let from = SocketAddr::from(([127, 0, 0, 1], 9));
        answer(&responder, &context, 1553, &request.encode(), from).unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = client.recv_from(&mut buf).unwrap();
        let response = DiscoveryResponse::decode(&buf[..len]).unwrap();
        assert_eq!(response.port, 1553);
        assert_eq!(response.board_count, 2);
        assert_eq!(response.protocol, 0x1553);
    }

    #[test]
    fn foreign_datagrams_are_ignored() {
        let context = ServerContext::new(Protocol::ANS1553, Config::default());
        let responder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let from = SocketAddr::from(([127, 0, 0, 1], 9));
        assert!(answer(&responder, &context, 1553, b"hello", from).is_err());

        let request = DiscoveryRequest {
            port: -1,
            info: String::new(),
        };
        assert!(answer(&responder, &context, 1553, &request.encode(), from).is_err());
    }
}
