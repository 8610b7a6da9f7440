//! Helpers for the end-to-end tests of the ANS workspace.
//!
//! Servers started here listen on an ephemeral loopback port and serve simulated
//! MIL-STD-1553 boards. They run on a background thread until the test process exits.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use ans1553_server::simulated::{SimulatedBoards, handlers};
use ans_client::{ClientContext, ClientPeer};
use ans_protocol::{
    board::Board,
    mil::{OpenRequest, OpenResponse},
};
use ans_server::{
    context::ServerContext,
    handlers::Handlers,
    server::{BoundServer, Builder},
};

pub const BOARD_COUNT: u32 = 8;
pub const MEMORY_SIZE: usize = 0x1000;

pub struct TestServer {
    pub addr: SocketAddr,
    pub context: Arc<ServerContext>,
}

impl TestServer {
    /// Host and port for [`ClientContext::connect_peer`].
    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

/// Builder for loopback servers without discovery.
pub fn builder() -> Builder {
    Builder::new().port(0).discovery(false)
}

/// Starts `server` on a background thread.
pub fn run(server: BoundServer, board_count: u32) -> TestServer {
    server.context().set_board_count(board_count);
    let test_server = TestServer {
        addr: server.local_addr(),
        context: server.context().clone(),
    };
    log::debug!("Test server listening on {}", test_server.addr);
    thread::spawn(move || server.run());
    test_server
}

/// A server with custom handlers.
pub fn start_with(builder: Builder, handlers: Handlers, board_count: u32) -> TestServer {
    let server = builder
        .build(handlers)
        .bind(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .expect("Loopback server should bind");
    run(server, board_count)
}

/// A server hosting [`BOARD_COUNT`] simulated boards.
pub fn start() -> TestServer {
    let boards = Arc::new(SimulatedBoards::new(BOARD_COUNT, MEMORY_SIZE));
    start_with(builder(), handlers(boards), BOARD_COUNT)
}

/// Handlers serving [`BOARD_COUNT`] simulated boards.
pub fn simulated_handlers() -> Handlers {
    handlers(Arc::new(SimulatedBoards::new(BOARD_COUNT, MEMORY_SIZE)))
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Creates, connects and opens `module` on `peer`.
pub fn open_module(peer: &ClientPeer, module: u32) -> Arc<Board> {
    let board = peer
        .create_board(module)
        .expect("Board should not be registered yet");
    peer.connect_board(&board).expect("Board should connect");
    let response = peer
        .open_board(&board, OpenRequest { module, stream: 1 }.encode())
        .expect("Open should succeed");
    let opened = OpenResponse::decode(&response.payload).expect("Open response should parse");
    assert_eq!(opened.module_handle, module);
    assert_eq!(opened.rc, 0);
    board
}

/// A client connected to `server`.
pub fn connect(server: &TestServer) -> (ClientContext, Arc<ClientPeer>) {
    let client = ClientContext::default();
    let peer = client
        .connect_peer(&server.host(), server.port())
        .expect("Client should connect");
    (client, peer)
}
