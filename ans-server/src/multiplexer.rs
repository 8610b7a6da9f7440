//! Link handshake of accepted connections and hand-over to the matching worker.

use ans_protocol::{
    LinkType, PEER_ID_UNKNOWN, PeerId,
    connection::Connection,
    error::{AnsResult, AnsStatus},
    link::{LinkInit, LinkResponse},
};

use crate::{
    context::ServerContext,
    handlers::Handlers,
    peer::ServerPeer,
    worker::{admin_worker, board_worker},
};

/// Serves one accepted connection until it ends. Runs on its own thread.
pub(crate) fn serve(context: &ServerContext, handlers: &Handlers, mut connection: Connection) {
    let id = connection.id();
    let init = match LinkInit::read(&mut connection, Some(context.config().link_init_timeout)) {
        Ok(init) => init,
        Err(e) => {
            log::error!("No link init from {}: {}", id, e);
            return;
        }
    };
    log::debug!("Link init from {}: {:?}", id, init);

    let protocol = context.protocol();
    if init.magic != protocol.magic {
        log::error!(
            "Dropping {}: protocol magic {:#010x} is not {:#010x}",
            id,
            init.magic,
            protocol.magic
        );
        return;
    }
    if !protocol.version.is_compatible_with(init.version) {
        log::error!(
            "Client {} speaks protocol {}, server speaks {}",
            id,
            init.version,
            protocol.version
        );
        reject(context, &init, &mut connection, AnsStatus::IncompatibleProtVer);
        return;
    }
    if init.version.minor() > protocol.version.minor() {
        log::warn!(
            "Client {} uses newer protocol version {} than the server ({})",
            id,
            init.version,
            protocol.version
        );
    }
    let Some(link_type) = init.link_type() else {
        log::error!("Client {} requested unknown link type {}", id, init.link_type);
        reject(context, &init, &mut connection, AnsStatus::InvalidLinkType);
        return;
    };

    let peer = if init.peer_id == PEER_ID_UNKNOWN {
        context.create_peer()
    } else {
        match context.request_peer(init.peer_id) {
            Some(peer) => peer,
            None => {
                log::error!("Client {} referenced unknown peer {}", id, init.peer_id);
                reject(context, &init, &mut connection, AnsStatus::InvalidPeerId);
                return;
            }
        }
    };

    let result = run_session(context, handlers, &peer, link_type, &init, &mut connection);
    connection.close();
    peer.remove_connection(id);
    context.release_peer(peer.id());
    match result {
        Ok(()) => log::info!("{:?} session {} of peer {} ended", link_type, id, peer.id()),
        Err(e) => log::error!(
            "{:?} session {} of peer {} failed: {}",
            link_type,
            id,
            peer.id(),
            e
        ),
    }
}

fn run_session(
    context: &ServerContext,
    handlers: &Handlers,
    peer: &ServerPeer,
    link_type: LinkType,
    init: &LinkInit,
    connection: &mut Connection,
) -> AnsResult<()> {
    if let Err(e) = peer.register_connection(connection) {
        reject(context, init, connection, AnsStatus::ClientRegistrationFailure);
        return Err(e);
    }
    respond(context, init, connection, peer.id(), AnsStatus::Ok)?;
    log::info!(
        "{:?} link established with {} for peer {}",
        link_type,
        connection.peer_addr(),
        peer.id()
    );
    match link_type {
        LinkType::Admin => admin_worker(context, handlers, peer, connection),
        LinkType::Board => board_worker(context, handlers, peer, connection),
    }
}

fn respond(
    context: &ServerContext,
    init: &LinkInit,
    connection: &mut Connection,
    peer_id: PeerId,
    status: AnsStatus,
) -> AnsResult<()> {
    LinkResponse::to(init, context.protocol(), peer_id, status).send(connection)
}

fn reject(
    context: &ServerContext,
    init: &LinkInit,
    connection: &mut Connection,
    status: AnsStatus,
) {
    if let Err(e) = respond(context, init, connection, init.peer_id, status) {
        log::debug!("Could not report {} to {}: {}", status, connection.id(), e);
    }
}
