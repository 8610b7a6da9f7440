//! Built-in handlers of the event-stream sub-protocol.
//!
//! Opening a stream binds an ephemeral listener and answers with its port before the
//! client connects back. The port doubles as the handle of the resulting observer.

use std::{
    net::{SocketAddr, TcpListener},
    sync::Arc,
};

use ans_protocol::{
    board::EventObserver,
    error::{AnsError, AnsResult, AnsStatus},
    frame::CmdRspFrame,
    mem_chunk::MemChunk,
    payload::{CloseEventStream, EventStreamOpened},
};

use crate::handlers::{BoardRequest, Reply};

/// Outcome of an open request. `observer` is set once the client has connected.
pub(crate) struct StreamOpened {
    pub reply: Reply,
    pub observer: Option<Arc<EventObserver>>,
}

impl StreamOpened {
    fn unregistered(reply: Reply) -> StreamOpened {
        StreamOpened {
            reply,
            observer: None,
        }
    }
}

pub(crate) fn open(request: BoardRequest<'_>) -> AnsResult<StreamOpened> {
    let Some(board) = request.board else {
        log::error!("Event stream requested without an open board");
        return Ok(StreamOpened::unregistered(Reply::Frame(
            CmdRspFrame::error(request.frame, AnsStatus::Error),
        )));
    };

    let local = SocketAddr::new(request.connection.local_addr().ip(), 0);
    let listener = TcpListener::bind(local).map_err(AnsError::SocketCreate)?;
    let port = listener
        .local_addr()
        .map_err(AnsError::SocketCreate)?
        .port();
    let handle = u32::from(port);

    let response = CmdRspFrame::ok(request.frame, EventStreamOpened { handle, port }.encode());
    if let Err(e) = response.send(request.connection, &mut MemChunk::new()) {
        log::error!("Failed to announce event stream {}: {}", handle, e);
        return Ok(StreamOpened::unregistered(Reply::Sent));
    }
    log::debug!(
        "Board {}: waiting for event stream client on port {}",
        board.handle(),
        port
    );

    let timeout = request.context.config().event_stream_timeout;
    match EventObserver::wait_connect(handle, &listener, timeout) {
        Ok(observer) => {
            let observer = Arc::new(observer);
            board.register_observer(observer.clone());
            Ok(StreamOpened {
                reply: Reply::Sent,
                observer: Some(observer),
            })
        }
        Err(e) => {
            log::error!(
                "Board {}: event stream client did not connect to port {}: {}",
                board.handle(),
                port,
                e
            );
            Ok(StreamOpened::unregistered(Reply::Sent))
        }
    }
}

pub(crate) fn close(request: BoardRequest<'_>) -> AnsResult<Reply> {
    let Some(board) = request.board else {
        return Ok(Reply::Frame(CmdRspFrame::error(
            request.frame,
            AnsStatus::Error,
        )));
    };
    let CloseEventStream { handle } = CloseEventStream::decode(&request.frame.payload)?;
    let status = match board.unregister_observer(handle) {
        Some(observer) => {
            observer.close();
            log::debug!("Board {}: closed event stream {}", board.handle(), handle);
            AnsStatus::Ok
        }
        None => {
            log::error!("Board {}: no event stream {}", board.handle(), handle);
            AnsStatus::Error
        }
    };
    Ok(Reply::Frame(CmdRspFrame::for_command(
        request.frame,
        status,
        Vec::new(),
    )))
}
