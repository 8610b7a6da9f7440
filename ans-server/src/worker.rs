//! Admin and board workers serving one connection each.

use std::sync::Arc;

use ans_protocol::{
    BoardHandle, CommandType,
    board::{Board, EventObserver},
    board_id,
    connection::Connection,
    error::{AnsError, AnsResult, AnsStatus},
    frame::{CmdFrame, CmdRspFrame},
    mem_chunk::MemChunk,
};

use crate::{
    context::ServerContext,
    event_stream,
    handlers::{BoardRequest, Handlers, Opened, Reply},
    peer::ServerPeer,
};

/// Reads the next command. `None` once the client has gone away.
fn next_command(
    connection: &mut Connection,
    expected: CommandType,
    max_frame_size: usize,
    rx: &mut MemChunk,
) -> AnsResult<Option<CmdFrame>> {
    let frame = match CmdFrame::read_limited(connection, None, max_frame_size, rx) {
        Ok(frame) => frame,
        Err(e) if e.is_disconnect() => {
            log::debug!("Client {} disconnected", connection.id());
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    if frame.command_type() != Some(expected) {
        return Err(AnsError::InvalidHeader(format!(
            "command type {} on a {:?} channel",
            frame.header.command_type, expected
        )));
    }
    log::debug!(
        "{:?} command {} (transaction {})",
        expected,
        frame.function_id(),
        frame.transaction_id()
    );
    log::trace!("Command payload: {:02x?}", frame.payload);
    Ok(Some(frame))
}

fn error_response(frame: &CmdFrame, error: &AnsError) -> CmdRspFrame {
    log::error!("Function {} failed: {}", frame.function_id(), error);
    CmdRspFrame::error(frame, error.status())
}

fn missing_handler(frame: &CmdFrame) -> CmdRspFrame {
    log::error!("No handler for function id {}", frame.function_id());
    CmdRspFrame::error(frame, AnsStatus::InvalidFunctionId)
}

/// Serves administrative commands until the client disconnects.
///
/// When the worker ends, every connection of its peer is closed.
pub(crate) fn admin_worker(
    context: &ServerContext,
    handlers: &Handlers,
    peer: &ServerPeer,
    connection: &mut Connection,
) -> AnsResult<()> {
    let result = serve_admin(context, handlers, connection);
    peer.close_connections();
    result
}

fn serve_admin(
    context: &ServerContext,
    handlers: &Handlers,
    connection: &mut Connection,
) -> AnsResult<()> {
    let max_frame_size = context.config().max_frame_size;
    let mut rx = MemChunk::new();
    let mut tx = MemChunk::new();
    while let Some(frame) = next_command(connection, CommandType::Admin, max_frame_size, &mut rx)? {
        let response = match handlers.dispatch_admin(context, &frame) {
            Some(Ok(response)) => response,
            Some(Err(e)) => error_response(&frame, &e),
            None => missing_handler(&frame),
        };
        log::debug!("Returning status {}", response.status());
        response.send(connection, &mut tx)?;
    }
    Ok(())
}

/// The board a board worker has opened.
///
/// Holds one reference in the board registry, which is dropped again on close or
/// when the worker ends. Event streams opened through the worker go away with it.
struct AttachedBoard<'a> {
    context: &'a ServerContext,
    peer: &'a ServerPeer,
    board: Option<Arc<Board>>,
    streams: Vec<Arc<EventObserver>>,
}

impl<'a> AttachedBoard<'a> {
    fn new(context: &'a ServerContext, peer: &'a ServerPeer) -> AttachedBoard<'a> {
        AttachedBoard {
            context,
            peer,
            board: None,
            streams: Vec::new(),
        }
    }

    fn get(&self) -> Option<Arc<Board>> {
        self.board.clone()
    }

    /// Attaches `handle`. Fails if a different board is attached already.
    fn attach(&mut self, handle: BoardHandle) -> bool {
        match &self.board {
            Some(board) => board.handle() == handle,
            None => {
                self.board = Some(self.context.attach_board(handle));
                self.peer.attach_board(handle);
                log::debug!(
                    "Peer {} attached board {} (references: {})",
                    self.peer.id(),
                    handle,
                    self.context.board_ref_count(handle)
                );
                true
            }
        }
    }

    fn track_stream(&mut self, observer: Arc<EventObserver>) {
        self.streams.push(observer);
    }

    /// Forgets streams that were closed or dropped from the board in the meantime.
    fn prune_streams(&mut self) {
        if let Some(board) = &self.board {
            self.streams.retain(|observer| board.is_registered(observer));
        }
    }

    fn release(&mut self) {
        if let Some(board) = self.board.take() {
            for observer in self.streams.drain(..) {
                if board.remove_observer(&observer) {
                    log::debug!(
                        "Board {}: closing event stream {} of peer {}",
                        board.handle(),
                        observer.handle(),
                        self.peer.id()
                    );
                }
                observer.close();
            }
            self.peer.detach_board(board.handle());
            self.context.release_board(board.handle());
            log::debug!("Peer {} released board {}", self.peer.id(), board.handle());
        }
    }
}

impl Drop for AttachedBoard<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Serves board commands until the client disconnects.
pub(crate) fn board_worker(
    context: &ServerContext,
    handlers: &Handlers,
    peer: &ServerPeer,
    connection: &mut Connection,
) -> AnsResult<()> {
    let max_frame_size = context.config().max_frame_size;
    let mut rx = MemChunk::new();
    let mut tx = MemChunk::new();
    let mut attached = AttachedBoard::new(context, peer);

    while let Some(frame) = next_command(connection, CommandType::Board, max_frame_size, &mut rx)? {
        let response = match frame.function_id() {
            board_id::OPEN => Some(open_board(context, handlers, &frame, &mut attached)),
            board_id::CLOSE => {
                let board = attached.get();
                let result = run_locked(context, handlers, &frame, board.as_ref(), connection);
                if board.is_some() && matches!(result, Some(Ok(_))) {
                    attached.release();
                }
                to_response(&frame, result)
            }
            board_id::OPEN_BOARD_EVENT_STREAM => {
                let board = attached.get();
                let result = event_stream::open(BoardRequest {
                    context,
                    frame: &frame,
                    board: board.as_ref(),
                    connection,
                })
                .map(|opened| {
                    if let Some(observer) = opened.observer {
                        attached.track_stream(observer);
                    }
                    opened.reply
                });
                to_response(&frame, Some(result))
            }
            board_id::CLOSE_BOARD_EVENT_STREAM => {
                let board = attached.get();
                let result = event_stream::close(BoardRequest {
                    context,
                    frame: &frame,
                    board: board.as_ref(),
                    connection,
                });
                attached.prune_streams();
                to_response(&frame, Some(result))
            }
            _ => {
                let board = attached.get();
                let result = run_locked(context, handlers, &frame, board.as_ref(), connection);
                to_response(&frame, result)
            }
        };

        if let Some(response) = response {
            log::debug!("Returning status {}", response.status());
            response.send(connection, &mut tx)?;
        }
    }
    Ok(())
}

/// Runs the open handler and attaches the board it opened.
fn open_board(
    context: &ServerContext,
    handlers: &Handlers,
    frame: &CmdFrame,
    attached: &mut AttachedBoard<'_>,
) -> CmdRspFrame {
    match handlers.dispatch_open(context, frame) {
        Some(Ok(Opened {
            mut response,
            handle: Some(handle),
        })) => {
            if !attached.attach(handle) {
                log::error!("Refusing to attach board {}: a different board is open", handle);
                response.set_status(AnsStatus::Error, Vec::new());
            }
            response
        }
        Some(Ok(Opened {
            response,
            handle: None,
        })) => response,
        Some(Err(e)) => error_response(frame, &e),
        None => missing_handler(frame),
    }
}

/// Dispatches a board command while holding the lock of the attached board.
fn run_locked(
    context: &ServerContext,
    handlers: &Handlers,
    frame: &CmdFrame,
    board: Option<&Arc<Board>>,
    connection: &mut Connection,
) -> Option<AnsResult<Reply>> {
    let _guard = board.map(|board| board.lock());
    handlers.dispatch_board(BoardRequest {
        context,
        frame,
        board,
        connection,
    })
}

fn to_response(frame: &CmdFrame, result: Option<AnsResult<Reply>>) -> Option<CmdRspFrame> {
    match result {
        Some(Ok(Reply::Frame(response))) => Some(response),
        Some(Ok(Reply::Sent)) => None,
        Some(Err(e)) => Some(error_response(frame, &e)),
        None => Some(missing_handler(frame)),
    }
}
