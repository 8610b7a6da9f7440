use std::{
    net::{IpAddr, SocketAddr, TcpListener, UdpSocket},
    sync::Arc,
    thread,
    time::Duration,
};

use ans_protocol::{
    BOARD_EVENT_STREAM_TIMEOUT, DEFAULT_CLIENT_PORT, DEFAULT_MAX_FRAME_SIZE, DEFAULT_SERVER_PORT,
    Protocol, SERVER_LINK_INIT_TIMEOUT,
    connection::Connection,
    error::{AnsError, AnsResult},
    payload::SoftwareVersion,
};

use crate::{context::ServerContext, discovery, handlers::Handlers, multiplexer};

#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port of the command channels. The discovery responder uses the same number on UDP.
    pub port: u16,
    /// UDP port the startup announcement is broadcast to
    pub client_port: u16,
    pub link_init_timeout: Duration,
    pub event_stream_timeout: Duration,
    /// Largest transaction size a client may announce
    pub max_frame_size: usize,
    pub discovery: bool,
    pub name: String,
    pub description: String,
    pub version: SoftwareVersion,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERVER_PORT,
            client_port: DEFAULT_CLIENT_PORT,
            link_init_timeout: SERVER_LINK_INIT_TIMEOUT,
            event_stream_timeout: BOARD_EVENT_STREAM_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            discovery: true,
            name: "ANS Server".to_string(),
            description: "ANS network board-access server".to_string(),
            version: SoftwareVersion {
                major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
                minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
                patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
                version_string: env!("CARGO_PKG_VERSION").to_string(),
            },
        }
    }
}

/// Hosts boards for remote clients.
#[derive(Debug)]
pub struct Server {
    handlers: Handlers,
    config: Config,
    protocol: Protocol,
}

/// Builder to create a [Server] instance and modify configuration options
///
/// # Example
///
/// ```
/// use ans_server::{handlers::Handlers, server::Builder};
/// use std::time::Duration;
///
/// let server = Builder::new()
///     .port(0)
///     .discovery(false)
///     .event_stream_timeout(Duration::from_secs(5))
///     .build(Handlers::new());
/// ```
#[derive(Default)]
pub struct Builder {
    config: Config,
    protocol: Protocol,
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Set the TCP port. `0` picks a free port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the UDP port clients listen on for the startup announcement
    pub fn client_port(mut self, port: u16) -> Self {
        self.config.client_port = port;
        self
    }

    /// Set how long a new connection may take to send its link-init frame
    pub fn link_init_timeout(mut self, timeout: Duration) -> Self {
        self.config.link_init_timeout = timeout;
        self
    }

    /// Set how long the server waits for a client to connect to an event stream
    pub fn event_stream_timeout(mut self, timeout: Duration) -> Self {
        self.config.event_stream_timeout = timeout;
        self
    }

    /// Set the highest transaction size this server accepts.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Enable or disable the UDP discovery responder
    pub fn discovery(mut self, enabled: bool) -> Self {
        self.config.discovery = enabled;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.config.description = description.into();
        self
    }

    pub fn version(mut self, version: SoftwareVersion) -> Self {
        self.config.version = version;
        self
    }

    /// Set the board protocol the server speaks
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Build and return the server
    pub fn build(self, handlers: Handlers) -> Server {
        Server::new(handlers, self.config).with_protocol(self.protocol)
    }
}

impl Server {
    pub fn new(handlers: Handlers, config: Config) -> Server {
        Server {
            handlers,
            config,
            protocol: Protocol::default(),
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Binds the TCP listener on `ip` at the configured port and, if enabled, the discovery socket.
    pub fn bind(self, ip: IpAddr) -> AnsResult<BoundServer> {
        let listener = TcpListener::bind(SocketAddr::new(ip, self.config.port))
            .map_err(AnsError::SocketCreate)?;
        let local_addr = listener.local_addr().map_err(AnsError::SocketCreate)?;
        log::info!("Server listening for connections on {}", local_addr);

        let discovery = if self.config.discovery {
            match discovery::bind(local_addr.port()) {
                Ok(socket) => Some(socket),
                Err(e) => {
                    log::error!("Discovery disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(BoundServer {
            listener,
            local_addr,
            discovery,
            context: Arc::new(ServerContext::new(self.protocol, self.config)),
            handlers: Arc::new(self.handlers),
        })
    }

    /// Binds and serves until the listener fails.
    pub fn listen(self, ip: IpAddr) -> AnsResult<()> {
        self.bind(ip)?.run()
    }
}

/// A server whose sockets are bound but which does not accept connections yet.
#[derive(Debug)]
pub struct BoundServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    discovery: Option<UdpSocket>,
    context: Arc<ServerContext>,
    handlers: Arc<Handlers>,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address of the discovery responder, if it is running.
    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.discovery
            .as_ref()
            .and_then(|socket| socket.local_addr().ok())
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.context
    }

    /// Accepts connections and serves each on its own thread.
    pub fn run(self) -> AnsResult<()> {
        if let Some(socket) = self.discovery {
            let context = self.context.clone();
            let port = self.local_addr.port();
            thread::Builder::new()
                .name("ans-discovery".to_string())
                .spawn(move || discovery::run(socket, &context, port))
                .map_err(AnsError::SocketCreate)?;
        }

        for stream in self.listener.incoming() {
            let connection = match stream
                .map_err(AnsError::Connect)
                .and_then(Connection::from_stream)
            {
                Ok(connection) => connection,
                Err(e) => {
                    log::error!("Connection error: {}", e);
                    continue;
                }
            };
            log::info!("New client connection from {}", connection.peer_addr());

            let context = self.context.clone();
            let handlers = self.handlers.clone();
            let spawned = thread::Builder::new()
                .name(format!("ans-{}", connection.peer_addr()))
                .spawn(move || multiplexer::serve(&context, &handlers, connection));
            if let Err(e) = spawned {
                log::error!("Failed to spawn connection thread: {}", e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use super::*;

    #[test]
    fn config_defaults() {
        let config = Config::default();
        assert_eq!(config.port, 1553);
        assert_eq!(config.client_port, 11553);
        assert_eq!(config.link_init_timeout, Duration::from_secs(20));
        assert_eq!(config.event_stream_timeout, Duration::from_secs(10));
        assert!(config.discovery);
        assert_eq!(config.version.version_string, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn bind_to_ephemeral_port() {
        let server = Builder::new()
            .port(0)
            .discovery(false)
            .name("bench")
            .build(Handlers::new())
            .bind(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert!(server.discovery_addr().is_none());
        assert_eq!(server.context().server_info().name, "bench");
        assert_eq!(server.context().peer_count(), 0);
    }
}
