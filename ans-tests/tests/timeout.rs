use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use ans_client::ClientContext;
use ans_protocol::{
    admin_id,
    connection::{Channel, Connection},
    error::AnsError,
    frame::{CmdFrame, CmdRspFrame},
};
use ans_server::handlers::Handlers;
use ans_tests::{builder, start_with};

const SLOW_RESPONSE: Duration = Duration::from_millis(500);
const RESPONSE_TIMEOUT: Duration = Duration::from_millis(400);

#[test]
fn late_response_is_not_taken_for_the_next_one() {
    let slow_once = AtomicBool::new(true);
    let handlers = Handlers::new().admin(admin_id::EXTENSION_BASE, move |_, frame| {
        if slow_once.swap(false, Ordering::Relaxed) {
            thread::sleep(SLOW_RESPONSE);
        }
        Ok(CmdRspFrame::ok(frame, Vec::new()))
    });
    let server = start_with(builder(), handlers, 0);

    let client = ClientContext::default().with_response_timeout(RESPONSE_TIMEOUT);
    let peer = client
        .connect_peer(&server.host(), server.port())
        .unwrap();

    match peer.transmit_command(CmdFrame::admin(admin_id::EXTENSION_BASE, Vec::new())) {
        Err(AnsError::Timeout) => {}
        other => panic!("expected Timeout, got {:?}", other),
    }
    // a timeout is not a disconnect: the late answer still arrives and is rejected
    match peer.request_board_count() {
        Err(AnsError::InvalidTransactionNo { expected, got }) => assert_eq!(got + 1, expected),
        other => panic!("expected InvalidTransactionNo, got {:?}", other),
    }
    assert!(peer.is_connected());
}

#[test]
fn silent_connections_are_dropped() {
    let server = start_with(
        builder().link_init_timeout(Duration::from_millis(100)),
        Handlers::new(),
        0,
    );
    let mut connection = Connection::connect(server.addr).unwrap();
    let mut buf = [0u8; 1];
    match connection.receive(&mut buf, Some(Duration::from_secs(5))) {
        Err(AnsError::Disconnected) => {}
        other => panic!("expected Disconnected, got {:?}", other),
    }
}
