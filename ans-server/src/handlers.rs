//! Handler tables the workers dispatch commands through.
//!
//! Tables are assembled once with [`Handlers`] and stay fixed while the server runs.
//! Administrative and board commands each have one handler per function id and an
//! optional extension handler for ids without one. A handler that returns an error
//! produces a response carrying the error's status and an empty payload.

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use ans_protocol::{
    BoardHandle, admin_id,
    board::Board,
    connection::Connection,
    error::AnsResult,
    frame::{CmdFrame, CmdRspFrame},
    payload::NumBoards,
};

use crate::context::ServerContext;

/// Result of an open handler.
#[derive(Debug)]
pub struct Opened {
    pub response: CmdRspFrame,
    /// Handle of the board that was opened. `None` when the open failed.
    pub handle: Option<BoardHandle>,
}

/// A board command together with everything a handler may need to serve it.
pub struct BoardRequest<'a> {
    pub context: &'a ServerContext,
    pub frame: &'a CmdFrame,
    /// The board attached to the worker, if any
    pub board: Option<&'a Arc<Board>>,
    /// Command connection, for handlers that answer on their own
    pub connection: &'a mut Connection,
}

/// What a board handler produced.
#[derive(Debug)]
pub enum Reply {
    Frame(CmdRspFrame),
    /// The handler already sent its response on the connection.
    Sent,
}

type AdminFn = Box<dyn Fn(&ServerContext, &CmdFrame) -> AnsResult<CmdRspFrame> + Send + Sync>;
type OpenFn = Box<dyn Fn(&ServerContext, &CmdFrame) -> AnsResult<Opened> + Send + Sync>;
type BoardFn = Box<dyn Fn(BoardRequest<'_>) -> AnsResult<Reply> + Send + Sync>;

/// Handler tables of a server.
///
/// # Example
///
/// ```
/// use ans_protocol::{board_id, frame::CmdRspFrame, mil::ReturnCode};
/// use ans_server::handlers::{Handlers, Reply};
///
/// let handlers = Handlers::new().board(board_id::GET_DRIVER_VERSION, |request| {
///     Ok(Reply::Frame(CmdRspFrame::ok(request.frame, ReturnCode { rc: 0 }.encode())))
/// });
/// assert!(handlers.has_board_handler(board_id::GET_DRIVER_VERSION));
/// ```
pub struct Handlers {
    admin: HashMap<u32, AdminFn>,
    admin_extension: Option<AdminFn>,
    open: Option<OpenFn>,
    board: HashMap<u32, BoardFn>,
    board_extension: Option<BoardFn>,
}

impl Default for Handlers {
    fn default() -> Self {
        Handlers {
            admin: HashMap::new(),
            admin_extension: None,
            open: None,
            board: HashMap::new(),
            board_extension: None,
        }
        .admin(admin_id::GET_NUM_BOARDS, get_num_boards)
        .admin(admin_id::GET_SERVER_INFO, get_server_info)
    }
}

impl Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut admin: Vec<_> = self.admin.keys().collect();
        admin.sort();
        let mut board: Vec<_> = self.board.keys().collect();
        board.sort();
        f.debug_struct("Handlers")
            .field("admin", &admin)
            .field("admin_extension", &self.admin_extension.is_some())
            .field("open", &self.open.is_some())
            .field("board", &board)
            .field("board_extension", &self.board_extension.is_some())
            .finish()
    }
}

impl Handlers {
    /// Tables with the built-in administrative handlers (`GetNumBoards`, `GetServerInfo`).
    pub fn new() -> Handlers {
        Handlers::default()
    }

    /// Sets the handler for an administrative function id, replacing a built-in one.
    pub fn admin<F>(mut self, function_id: u32, handler: F) -> Self
    where
        F: Fn(&ServerContext, &CmdFrame) -> AnsResult<CmdRspFrame> + Send + Sync + 'static,
    {
        self.admin.insert(function_id, Box::new(handler));
        self
    }

    /// Handles administrative function ids without a dedicated handler.
    pub fn admin_extension<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ServerContext, &CmdFrame) -> AnsResult<CmdRspFrame> + Send + Sync + 'static,
    {
        self.admin_extension = Some(Box::new(handler));
        self
    }

    /// Handler for `OpenBoardID`. The returned handle is attached to the worker.
    pub fn open(
        mut self,
        handler: impl Fn(&ServerContext, &CmdFrame) -> AnsResult<Opened> + Send + Sync + 'static,
    ) -> Self {
        self.open = Some(Box::new(handler));
        self
    }

    /// Sets the handler for a board function id.
    ///
    /// Board handlers run while the board lock is held and must not take it themselves.
    pub fn board(
        mut self,
        function_id: u32,
        handler: impl Fn(BoardRequest<'_>) -> AnsResult<Reply> + Send + Sync + 'static,
    ) -> Self {
        self.board.insert(function_id, Box::new(handler));
        self
    }

    /// Handles board function ids without a dedicated handler.
    pub fn board_extension(
        mut self,
        handler: impl Fn(BoardRequest<'_>) -> AnsResult<Reply> + Send + Sync + 'static,
    ) -> Self {
        self.board_extension = Some(Box::new(handler));
        self
    }

    pub fn has_admin_handler(&self, function_id: u32) -> bool {
        self.admin.contains_key(&function_id)
    }

    pub fn has_board_handler(&self, function_id: u32) -> bool {
        self.board.contains_key(&function_id)
    }

    /// Runs the administrative handler of `frame`, falling back to the extension handler.
    /// `None` when neither exists.
    pub(crate) fn dispatch_admin(
        &self,
        context: &ServerContext,
        frame: &CmdFrame,
    ) -> Option<AnsResult<CmdRspFrame>> {
        self.admin
            .get(&frame.function_id())
            .or(self.admin_extension.as_ref())
            .map(|handler| handler(context, frame))
    }

    pub(crate) fn dispatch_open(
        &self,
        context: &ServerContext,
        frame: &CmdFrame,
    ) -> Option<AnsResult<Opened>> {
        self.open.as_ref().map(|handler| handler(context, frame))
    }

    /// Runs the board handler of the request, falling back to the extension handler.
    /// `None` when neither exists.
    pub(crate) fn dispatch_board(&self, request: BoardRequest<'_>) -> Option<AnsResult<Reply>> {
        self.board
            .get(&request.frame.function_id())
            .or(self.board_extension.as_ref())
            .map(|handler| handler(request))
    }
}

fn get_num_boards(context: &ServerContext, frame: &CmdFrame) -> AnsResult<CmdRspFrame> {
    let num_boards = context.board_count();
    log::debug!("GetNumBoards: {}", num_boards);
    Ok(CmdRspFrame::ok(frame, NumBoards { num_boards }.encode()))
}

fn get_server_info(context: &ServerContext, frame: &CmdFrame) -> AnsResult<CmdRspFrame> {
    let info = context.server_info();
    log::debug!("GetServerInfo: host {}, os {}", info.host_name, info.os_info);
    Ok(CmdRspFrame::ok(frame, info.encode()))
}
