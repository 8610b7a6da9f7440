//! TCP connections carrying one logical ANS channel each.

use std::{
    fmt::Display,
    io::{ErrorKind, Read, Write},
    net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    thread,
    time::{Duration, Instant},
};

use crate::error::{AnsError, AnsResult};

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Byte transport used by the frame codecs.
///
/// `receive` fills the whole buffer or fails. A `timeout` of `None` blocks until
/// data arrives or the peer goes away.
pub trait Channel {
    fn send(&mut self, data: &[u8]) -> AnsResult<()>;
    fn receive(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> AnsResult<()>;
}

/// Local and remote endpoint of a connection.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ConnectionId {
    pub local: SocketAddr,
    pub peer: SocketAddr,
}

impl Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <-> {}", self.local, self.peer)
    }
}

/// One TCP socket serving exactly one logical channel.
///
/// A connection is closed at most once; [`Connection::close`] is idempotent and
/// dropping the connection closes it.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    id: ConnectionId,
    closed: bool,
}

impl Connection {
    pub fn from_stream(stream: TcpStream) -> AnsResult<Connection> {
        let id = ConnectionId {
            local: stream.local_addr().map_err(AnsError::SocketCreate)?,
            peer: stream.peer_addr().map_err(AnsError::SocketCreate)?,
        };
        stream.set_nodelay(true).map_err(AnsError::SocketCreate)?;
        Ok(Connection {
            stream,
            id,
            closed: false,
        })
    }

    /// Connects to a server, using the socket layer's own connect timeout.
    pub fn connect(addr: impl ToSocketAddrs) -> AnsResult<Connection> {
        let stream = TcpStream::connect(addr).map_err(AnsError::Connect)?;
        let connection = Connection::from_stream(stream)?;
        log::debug!("Connected {}", connection.id);
        Ok(connection)
    }

    pub fn connect_timeout(addr: &SocketAddr, timeout: Duration) -> AnsResult<Connection> {
        let stream = TcpStream::connect_timeout(addr, timeout).map_err(|e| {
            if e.kind() == ErrorKind::TimedOut {
                AnsError::Timeout
            } else {
                AnsError::Connect(e)
            }
        })?;
        Connection::from_stream(stream)
    }

    /// Waits for a peer to connect on `listener`.
    ///
    /// With a timeout, the listener is polled and [`AnsError::Timeout`] is returned when
    /// nobody connects in time. The listener is left in blocking mode either way.
    pub fn accept(listener: &TcpListener, timeout: Option<Duration>) -> AnsResult<Connection> {
        let Some(timeout) = timeout else {
            let (stream, _) = listener.accept().map_err(AnsError::Read)?;
            return Connection::from_stream(stream);
        };

        listener
            .set_nonblocking(true)
            .map_err(AnsError::SocketCreate)?;
        let deadline = Instant::now() + timeout;
        let accepted = loop {
            match listener.accept() {
                Ok((stream, _)) => break Ok(stream),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        break Err(AnsError::Timeout);
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => break Err(AnsError::Read(e)),
            }
        };
        listener
            .set_nonblocking(false)
            .map_err(AnsError::SocketCreate)?;

        let stream = accepted?;
        stream
            .set_nonblocking(false)
            .map_err(AnsError::SocketCreate)?;
        Connection::from_stream(stream)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.id.peer
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.id.local
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// A handle that can shut this connection down from another thread.
    pub fn closer(&self) -> AnsResult<ConnectionCloser> {
        Ok(ConnectionCloser {
            stream: self.stream.try_clone().map_err(AnsError::SocketCreate)?,
            id: self.id,
        })
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        // the peer may already be gone
        let _ = self.stream.shutdown(Shutdown::Both);
        log::debug!("Closed connection {}", self.id);
    }

    fn set_read_timeout(&self, timeout: Option<Duration>) -> AnsResult<()> {
        // a zero duration is rejected by the socket layer
        let timeout = timeout.map(|t| t.max(Duration::from_millis(1)));
        self.stream
            .set_read_timeout(timeout)
            .map_err(AnsError::Read)
    }
}

impl Channel for Connection {
    fn send(&mut self, data: &[u8]) -> AnsResult<()> {
        if self.closed {
            return Err(AnsError::Disconnected);
        }
        log::trace!("Sending {} bytes on {}", data.len(), self.id);
        self.stream.write_all(data).map_err(AnsError::Write)?;
        self.stream.flush().map_err(AnsError::Write)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> AnsResult<()> {
        if self.closed {
            return Err(AnsError::Disconnected);
        }
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut filled = 0;
        while filled < buf.len() {
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(AnsError::Timeout);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            self.set_read_timeout(remaining)?;

            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(AnsError::Disconnected),
                Ok(n) => filled += n,
                Err(e) => match e.kind() {
                    ErrorKind::Interrupted => continue,
                    ErrorKind::WouldBlock | ErrorKind::TimedOut => return Err(AnsError::Timeout),
                    ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::UnexpectedEof
                    | ErrorKind::BrokenPipe
                    | ErrorKind::NotConnected => return Err(AnsError::Disconnected),
                    _ => return Err(AnsError::Read(e)),
                },
            }
        }
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// Shuts down a connection owned by someone else, e.g. a blocked worker thread.
#[derive(Debug)]
pub struct ConnectionCloser {
    stream: TcpStream,
    id: ConnectionId,
}

impl ConnectionCloser {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn close(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
