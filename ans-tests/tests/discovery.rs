use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use ans_client::discover_at;
use ans_tests::{BOARD_COUNT, builder, run, simulated_handlers};

#[test]
fn server_answers_unicast_discovery() {
    let server = builder()
        .discovery(true)
        .build(simulated_handlers())
        .bind(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .unwrap();
    let discovery_port = server
        .discovery_addr()
        .expect("Discovery should be bound")
        .port();
    let server = run(server, BOARD_COUNT);
    assert_eq!(discovery_port, server.port());

    let target = SocketAddr::from(([127, 0, 0, 1], discovery_port));
    let found = discover_at(target, Duration::from_millis(500)).unwrap();
    let answer = found
        .iter()
        .find(|found| found.addr == server.addr)
        .expect("Server should answer");
    assert_eq!(answer.response.board_count, BOARD_COUNT);
    assert_eq!(answer.response.protocol, 0x1553);
    assert!(!answer.response.host_name.is_empty());
}
