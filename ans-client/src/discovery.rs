//! Finding servers on the local network.

use std::{
    io::ErrorKind,
    net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket},
    time::{Duration, Instant},
};

use ans_protocol::{
    DEFAULT_SERVER_PORT,
    discovery::{DiscoveryRequest, DiscoveryResponse},
    error::{AnsError, AnsResult},
};

/// A server that answered a discovery request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoveredServer {
    /// TCP address of the server
    pub addr: SocketAddr,
    pub response: DiscoveryResponse,
}

/// Broadcasts a request to the default server port and collects answers until `timeout`.
pub fn discover(timeout: Duration) -> AnsResult<Vec<DiscoveredServer>> {
    discover_at(
        SocketAddrV4::new(Ipv4Addr::BROADCAST, DEFAULT_SERVER_PORT).into(),
        timeout,
    )
}

/// Sends a request to `target`, which may be a broadcast or a unicast address.
pub fn discover_at(target: SocketAddr, timeout: Duration) -> AnsResult<Vec<DiscoveredServer>> {
    let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
        .map_err(AnsError::SocketCreate)?;
    socket.set_broadcast(true).map_err(AnsError::SocketCreate)?;
    let port = socket.local_addr().map_err(AnsError::SocketCreate)?.port();

    let request = DiscoveryRequest {
        port: i32::from(port),
        info: String::new(),
    };
    socket
        .send_to(&request.encode(), target)
        .map_err(AnsError::Write)?;
    log::debug!("Sent discovery request to {}, answers on port {}", target, port);

    let deadline = Instant::now() + timeout;
    let mut servers = Vec::new();
    let mut buf = [0u8; DiscoveryResponse::SIZE + 1];
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        socket
            .set_read_timeout(Some(deadline - now))
            .map_err(AnsError::Read)?;
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(AnsError::Read(e)),
        };
        match DiscoveryResponse::decode(&buf[..len]) {
            Ok(response) => {
                let addr = SocketAddr::new(from.ip(), response.port as u16);
                log::info!("Found server {} at {}", response.host_name, addr);
                servers.push(DiscoveredServer { addr, response });
            }
            Err(e) => log::debug!("Ignoring datagram from {}: {}", from, e),
        }
    }
    Ok(servers)
}

#[cfg(test)]
mod test {
    use std::thread;

    use ans_protocol::Protocol;

    use super::*;

    #[test]
    fn collects_answers_until_timeout() {
        let responder = UdpSocket::bind("127.0.0.1:0").unwrap();
        let target = responder.local_addr().unwrap();
        let answer = thread::spawn(move || {
            let mut buf = [0u8; 64];
            let (len, from) = responder.recv_from(&mut buf).unwrap();
            let request = DiscoveryRequest::decode(&buf[..len]).unwrap();
            let to = SocketAddr::new(from.ip(), request.port as u16);
            responder.send_to(b"noise", to).unwrap();
            let response = DiscoveryResponse::new(Protocol::ANS1553, 4242, 3, "bench".to_string());
            responder.send_to(&response.encode(), to).unwrap();
        });

        let servers = discover_at(target, Duration::from_millis(500)).unwrap();
        answer.join().unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].addr, SocketAddr::from(([127, 0, 0, 1], 4242)));
        assert_eq!(servers[0].response.board_count, 3);
        assert_eq!(servers[0].response.host_name, "bench");
    }
}
