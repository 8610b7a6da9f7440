//! Connection to one remote server.

use std::{
    net::SocketAddr,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicI32, AtomicU32, Ordering},
    },
    time::Duration,
};

use ans_protocol::{
    BoardHandle, CLIENT_LINK_INIT_TIMEOUT, CMD_RESP_TIMEOUT, LinkType, PEER_ID_UNKNOWN, PeerId,
    Protocol, admin_id,
    board::{Board, EventObserver},
    board_id,
    connection::Connection,
    error::{AnsError, AnsResult, AnsStatus},
    frame::{CmdFrame, CmdRspFrame},
    link,
    mem_chunk::MemChunk,
    payload::{CloseEventStream, EventStreamOpened, NumBoards, ServerInfo},
    registry::Registry,
};

/// Admin connection of a peer together with its frame buffers.
#[derive(Debug)]
struct AdminChannel {
    connection: Connection,
    rx: MemChunk,
    tx: MemChunk,
}

/// A server as seen from the client, identified by host and port.
///
/// The peer owns one admin connection and the boards opened on the server. Each board
/// carries its own command connection. Commands on one connection are strictly
/// request/response; different boards can be driven from different threads.
#[derive(Debug)]
pub struct ClientPeer {
    host: String,
    port: u16,
    protocol: Protocol,
    transactions: Arc<AtomicU32>,
    response_timeout: Duration,
    peer_id: AtomicI32,
    admin: Mutex<Option<AdminChannel>>,
    boards: Registry<BoardHandle, Board>,
}

impl ClientPeer {
    /// A disconnected peer with its own transaction counter.
    pub fn new(protocol: Protocol, host: impl Into<String>, port: u16) -> ClientPeer {
        ClientPeer::with_counter(protocol, host.into(), port, Arc::new(AtomicU32::new(1)))
    }

    pub(crate) fn with_counter(
        protocol: Protocol,
        host: String,
        port: u16,
        transactions: Arc<AtomicU32>,
    ) -> ClientPeer {
        ClientPeer {
            host,
            port,
            protocol,
            transactions,
            response_timeout: CMD_RESP_TIMEOUT,
            peer_id: AtomicI32::new(PEER_ID_UNKNOWN),
            admin: Mutex::new(None),
            boards: Registry::new(),
        }
    }

    /// Bound for one command round trip. Defaults to 60 seconds.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Id the server assigned on connect, [`PEER_ID_UNKNOWN`] before that.
    pub fn peer_id(&self) -> PeerId {
        self.peer_id.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.admin_channel().is_some()
    }

    fn admin_channel(&self) -> MutexGuard<'_, Option<AdminChannel>> {
        self.admin.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_transaction_id(&self) -> u32 {
        self.transactions.fetch_add(1, Ordering::Relaxed)
    }

    fn client_id(&self) -> u32 {
        self.peer_id().max(0) as u32
    }

    /// Opens the admin connection and asks the server for a new peer id.
    ///
    /// Does nothing if the peer is connected already.
    pub fn connect(&self) -> AnsResult<PeerId> {
        let mut admin = self.admin_channel();
        if admin.is_some() {
            return Ok(self.peer_id());
        }
        let mut connection = Connection::connect((self.host.as_str(), self.port))?;
        let peer_id = link::establish(
            &mut connection,
            self.protocol,
            LinkType::Admin,
            PEER_ID_UNKNOWN,
            CLIENT_LINK_INIT_TIMEOUT,
        )?;
        self.peer_id.store(peer_id, Ordering::Relaxed);
        *admin = Some(AdminChannel {
            connection,
            rx: MemChunk::new(),
            tx: MemChunk::new(),
        });
        log::info!("Connected to {}:{} as peer {}", self.host, self.port, peer_id);
        Ok(peer_id)
    }

    /// Closes the admin connection and every board connection of this peer.
    pub fn disconnect(&self) {
        for board in self.boards.drain() {
            board.teardown();
        }
        if let Some(mut channel) = self.admin_channel().take() {
            channel.connection.close();
            log::info!("Disconnected from {}:{}", self.host, self.port);
        }
        self.peer_id.store(PEER_ID_UNKNOWN, Ordering::Relaxed);
    }

    /// Sends one command and waits for the response that carries its transaction id.
    fn exchange(
        &self,
        connection: &mut Connection,
        frame: &mut CmdFrame,
        rx: &mut MemChunk,
        tx: &mut MemChunk,
    ) -> AnsResult<CmdRspFrame> {
        let transaction_id = self.next_transaction_id();
        frame.prepare(transaction_id, self.client_id());
        log::debug!(
            "Sending function {} (transaction {}) to {}",
            frame.function_id(),
            transaction_id,
            connection.peer_addr()
        );
        log::trace!("Command payload: {:02x?}", frame.payload);
        frame.send(connection, tx)?;
        let response =
            CmdRspFrame::read(connection, Some(self.response_timeout), transaction_id, rx)?;
        log::trace!("Response payload: {:02x?}", response.payload);
        Ok(response)
    }

    /// Transmits an administrative command on the admin connection.
    pub fn transmit_command(&self, mut frame: CmdFrame) -> AnsResult<CmdRspFrame> {
        let mut admin = self.admin_channel();
        let channel = admin.as_mut().ok_or(AnsError::Disconnected)?;
        self.exchange(
            &mut channel.connection,
            &mut frame,
            &mut channel.rx,
            &mut channel.tx,
        )
    }

    /// Transmits a board command on the command connection of `board`.
    ///
    /// The board lock is held for the whole round trip.
    pub fn transmit_board_command(
        &self,
        board: &Board,
        mut frame: CmdFrame,
    ) -> AnsResult<CmdRspFrame> {
        self.with_board_connection(board, |connection| {
            self.exchange(connection, &mut frame, &mut MemChunk::new(), &mut MemChunk::new())
        })
    }

    fn with_board_connection<T>(
        &self,
        board: &Board,
        f: impl FnOnce(&mut Connection) -> AnsResult<T>,
    ) -> AnsResult<T> {
        let mut guard = board.lock();
        let connection = guard.as_mut().ok_or(AnsError::Disconnected)?;
        f(connection)
    }

    /// Number of boards the server hosts.
    pub fn request_board_count(&self) -> AnsResult<u32> {
        let response =
            self.transmit_command(CmdFrame::admin(admin_id::GET_NUM_BOARDS, Vec::new()))?;
        Ok(NumBoards::decode(&response.payload)?.num_boards)
    }

    pub fn get_server_info(&self) -> AnsResult<ServerInfo> {
        let response =
            self.transmit_command(CmdFrame::admin(admin_id::GET_SERVER_INFO, Vec::new()))?;
        ServerInfo::decode(&response.payload)
    }

    /// Looks up a board of this peer and takes a reference.
    pub fn request_board(&self, handle: BoardHandle) -> Option<Arc<Board>> {
        self.boards.request(&handle)
    }

    /// Registers a new board. `None` if the handle is known already.
    pub fn create_board(&self, handle: BoardHandle) -> Option<Arc<Board>> {
        self.boards.create(handle, Board::new(handle))
    }

    /// Drops one reference. The last one closes the board's connections.
    pub fn release_board(&self, handle: BoardHandle) {
        if let Some(board) = self.boards.release(&handle) {
            board.teardown();
        }
    }

    pub fn board_ref_count(&self, handle: BoardHandle) -> usize {
        self.boards.ref_count(&handle)
    }

    /// Opens the command connection of `board` and links it to this peer.
    pub fn connect_board(&self, board: &Board) -> AnsResult<()> {
        let peer_id = self.peer_id();
        if peer_id == PEER_ID_UNKNOWN {
            return Err(AnsError::Disconnected);
        }
        let mut connection = Connection::connect((self.host.as_str(), self.port))?;
        link::establish(
            &mut connection,
            self.protocol,
            LinkType::Board,
            peer_id,
            CLIENT_LINK_INIT_TIMEOUT,
        )?;
        log::debug!("Board {} connected on {}", board.handle(), connection.id());
        board.register_connection(connection);
        Ok(())
    }

    pub fn disconnect_board(&self, board: &Board) {
        if let Some(mut connection) = board.remove_connection() {
            connection.close();
            log::debug!("Board {} disconnected", board.handle());
        }
    }

    /// Sends `OpenBoardID` with a protocol-specific payload.
    pub fn open_board(&self, board: &Board, payload: Vec<u8>) -> AnsResult<CmdRspFrame> {
        self.transmit_board_command(board, CmdFrame::board(board_id::OPEN, payload))
    }

    /// Subscribes to the events of `board` and returns the stream handle.
    pub fn open_board_event_stream(&self, board: &Board) -> AnsResult<u32> {
        let mut frame = CmdFrame::board(board_id::OPEN_BOARD_EVENT_STREAM, Vec::new());
        let (response, server_ip) = self.with_board_connection(board, |connection| {
            let response =
                self.exchange(connection, &mut frame, &mut MemChunk::new(), &mut MemChunk::new())?;
            Ok((response, connection.peer_addr().ip()))
        })?;
        let opened = EventStreamOpened::decode(&response.payload)?;
        let addr = SocketAddr::new(server_ip, opened.port);
        let observer = EventObserver::connect(opened.handle, addr, CLIENT_LINK_INIT_TIMEOUT)?;
        board.register_observer(Arc::new(observer));
        log::debug!("Board {}: event stream {} open", board.handle(), opened.handle);
        Ok(opened.handle)
    }

    /// Ends an event stream on the server and closes the local end.
    pub fn close_board_event_stream(&self, board: &Board, handle: u32) -> AnsResult<()> {
        let result = self.transmit_board_command(
            board,
            CmdFrame::board(
                board_id::CLOSE_BOARD_EVENT_STREAM,
                CloseEventStream { handle }.encode(),
            ),
        );
        if let Some(observer) = board.unregister_observer(handle) {
            observer.close();
        }
        result.map(|_| ())
    }

    /// Blocks until `buf` is filled with event data of stream `handle`.
    pub fn wait_event(
        &self,
        board: &Board,
        handle: u32,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> AnsResult<()> {
        let observer = board
            .event_observer(handle)
            .ok_or(AnsError::Status(AnsStatus::Error))?;
        observer.wait_event(buf, timeout)
    }
}

impl Drop for ClientPeer {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn commands_need_a_connection() {
        let peer = ClientPeer::new(Protocol::ANS1553, "127.0.0.1", 1);
        assert!(!peer.is_connected());
        assert_eq!(peer.peer_id(), PEER_ID_UNKNOWN);
        assert!(matches!(
            peer.request_board_count(),
            Err(AnsError::Disconnected)
        ));

        let board = peer.create_board(3).unwrap();
        assert!(matches!(
            peer.connect_board(&board),
            Err(AnsError::Disconnected)
        ));
        assert!(matches!(
            peer.open_board(&board, Vec::new()),
            Err(AnsError::Disconnected)
        ));
    }

    #[test]
    fn boards_are_reference_counted() {
        let peer = ClientPeer::new(Protocol::ANS1553, "127.0.0.1", 1);
        assert!(peer.request_board(5).is_none());
        let board = peer.create_board(5).unwrap();
        assert!(peer.create_board(5).is_none());
        let again = peer.request_board(5).unwrap();
        assert!(Arc::ptr_eq(&board, &again));
        assert_eq!(peer.board_ref_count(5), 2);

        peer.release_board(5);
        peer.release_board(5);
        assert_eq!(peer.board_ref_count(5), 0);
        assert!(peer.request_board(5).is_none());
    }

    #[test]
    fn waiting_on_unknown_stream_fails() {
        let peer = ClientPeer::new(Protocol::ANS1553, "127.0.0.1", 1);
        let board = Board::new(1);
        let mut buf = [0u8; 4];
        assert!(matches!(
            peer.wait_event(&board, 99, &mut buf, Some(Duration::from_millis(10))),
            Err(AnsError::Status(AnsStatus::Error))
        ));
    }
}
