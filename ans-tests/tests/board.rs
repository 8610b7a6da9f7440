use std::{
    sync::{Arc, Barrier},
    thread,
    time::Duration,
};

use ans1553_server::simulated::{DRIVER_VERSION, RC_OK, RC_OUT_OF_RANGE, RC_UNSUPPORTED};
use ans_protocol::{
    board_id,
    error::{AnsError, AnsStatus},
    frame::CmdFrame,
    mil::{
        BoardMemSize, DriverInfo, DriverVersion, IoCommand, IoResponse, IoStructCommand,
        IoStructResponse, MemoryRange, ModuleRequest, OpenRequest, ReadMemRequest,
        ReadMemResponse, ReadVersionRequest, ReadVersionResponse, ReturnCode, WriteMemRequest,
        WriteMemResponse, version_id,
    },
};
use ans_tests::{MEMORY_SIZE, connect, open_module, start, wait_until};

const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);
/// Below the extension range and not assigned to any board command
const UNASSIGNED_FUNCTION: u32 = 200;

fn range(module_handle: u32, offset: u32, width: u32, num_elements: u32) -> MemoryRange {
    MemoryRange {
        module_handle,
        memtype: 0,
        offset,
        width,
        num_elements,
    }
}

#[test]
fn read_memory_on_an_opened_board() {
    let server = start();
    let (_client, peer) = connect(&server);
    assert_eq!(server.context.board_ref_count(7), 0);

    let board = open_module(&peer, 7);
    assert_eq!(server.context.board_ref_count(7), 1);

    let request = ReadMemRequest {
        range: range(7, 0x10, 2, 4),
    };
    let response = peer
        .transmit_board_command(&board, CmdFrame::board(board_id::READ_MEMORY, request.encode()))
        .unwrap();
    let read = ReadMemResponse::decode(&response.payload).unwrap();
    assert_eq!(read.rc, 0);
    assert_eq!(read.bytes_read, 8);
    assert_eq!(read.data, vec![0; 8]);

    let response = peer
        .transmit_board_command(
            &board,
            CmdFrame::board(board_id::CLOSE, ModuleRequest { module_handle: 7 }.encode()),
        )
        .unwrap();
    assert_eq!(ReturnCode::decode(&response.payload).unwrap().rc, 0);
    assert_eq!(server.context.board_ref_count(7), 0);
}

#[test]
fn written_memory_reads_back() {
    let server = start();
    let (_client, peer) = connect(&server);
    let board = open_module(&peer, 1);

    let write = WriteMemRequest {
        range: range(1, 0x20, 4, 2),
        data: vec![1, 2, 3, 4, 5, 6, 7, 8],
    };
    let response = peer
        .transmit_board_command(&board, CmdFrame::board(board_id::WRITE_MEMORY, write.encode()))
        .unwrap();
    let written = WriteMemResponse::decode(&response.payload).unwrap();
    assert_eq!(written.bytes_written, 8);

    let read = ReadMemRequest {
        range: range(1, 0x22, 1, 4),
    };
    let response = peer
        .transmit_board_command(&board, CmdFrame::board(board_id::READ_MEMORY, read.encode()))
        .unwrap();
    assert_eq!(
        ReadMemResponse::decode(&response.payload).unwrap().data,
        vec![3, 4, 5, 6]
    );

    let outside = ReadMemRequest {
        range: range(1, MEMORY_SIZE as u32 - 2, 1, 4),
    };
    let response = peer
        .transmit_board_command(&board, CmdFrame::board(board_id::READ_MEMORY, outside.encode()))
        .unwrap();
    let read = ReadMemResponse::decode(&response.payload).unwrap();
    assert_eq!(read.rc, RC_OUT_OF_RANGE);
    assert_eq!(read.bytes_read, 0);
}

#[test]
fn driver_queries() {
    let server = start();
    let (_client, peer) = connect(&server);
    let board = open_module(&peer, 0);

    let response = peer
        .transmit_board_command(&board, CmdFrame::board(board_id::GET_DRIVER_VERSION, Vec::new()))
        .unwrap();
    assert_eq!(
        DriverVersion::decode(&response.payload).unwrap().version,
        DRIVER_VERSION
    );

    let response = peer
        .transmit_board_command(
            &board,
            CmdFrame::board(
                board_id::GET_BOARD_MEM_SIZE,
                ModuleRequest { module_handle: 0 }.encode(),
            ),
        )
        .unwrap();
    assert_eq!(
        BoardMemSize::decode(&response.payload).unwrap().size as usize,
        MEMORY_SIZE
    );
}

#[test]
fn commands_for_other_modules_are_rejected() {
    let server = start();
    let (_client, peer) = connect(&server);
    let board = open_module(&peer, 2);

    let request = ReadMemRequest {
        range: range(3, 0, 1, 1),
    };
    let frame = CmdFrame::board(board_id::READ_MEMORY, request.encode());
    match peer.transmit_board_command(&board, frame) {
        Err(AnsError::Status(AnsStatus::InvalidModuleIndex)) => {}
        other => panic!("expected InvalidModuleIndex, got {:?}", other),
    }
}

#[test]
fn unhandled_board_function_is_reported() {
    let server = start();
    let (_client, peer) = connect(&server);
    let board = open_module(&peer, 0);

    match peer.transmit_board_command(&board, CmdFrame::board(UNASSIGNED_FUNCTION, vec![0; 8])) {
        Err(AnsError::Status(AnsStatus::InvalidFunctionId)) => {}
        other => panic!("expected InvalidFunctionId, got {:?}", other),
    }
    // the worker keeps serving
    let response = peer
        .transmit_board_command(&board, CmdFrame::board(board_id::GET_DRIVER_VERSION, Vec::new()))
        .unwrap();
    assert!(response.status().is_ok());
}

#[test]
fn io_commands_reach_the_target() {
    let server = start();
    let (_client, peer) = connect(&server);
    let board = open_module(&peer, 1);

    let command = IoCommand {
        module_handle: 1,
        biu: 1,
        cmd: 0x30,
        expect_ack: 1,
        out_words: vec![0xBEEF, 0x0102],
        out_bytes: vec![9, 8, 7],
    };
    let response = peer
        .transmit_board_command(&board, CmdFrame::board(board_id::IO_COMMAND, command.encode()))
        .unwrap();
    let ack = IoResponse::decode(&response.payload).unwrap();
    assert_eq!(ack.rc, RC_OK);
    assert_eq!(ack.in_lwords, vec![0x30]);
    assert_eq!(ack.in_words, command.out_words);
    assert_eq!(ack.in_bytes, command.out_bytes);

    let command = IoStructCommand {
        module_handle: 1,
        expected_ack_size: 4,
        command: vec![1, 2, 3, 4, 5, 6],
    };
    let frame = CmdFrame::board(board_id::IO_COMMAND_STRUCT, command.encode());
    let response = peer.transmit_board_command(&board, frame).unwrap();
    let ack = IoStructResponse::decode(&response.payload).unwrap();
    assert_eq!(ack.rc, RC_OK);
    assert_eq!(ack.ack, vec![1, 2, 3, 4]);
}

#[test]
fn software_versions_by_component() {
    let server = start();
    let (_client, peer) = connect(&server);
    let board = open_module(&peer, 0);

    let read_version = |version_id| {
        let request = ReadVersionRequest {
            module_handle: 0,
            version_id,
        };
        let frame = CmdFrame::board(board_id::GET_SOFTWARE_VERSIONS, request.encode());
        let response = peer.transmit_board_command(&board, frame).unwrap();
        ReadVersionResponse::decode(&response.payload).unwrap()
    };

    let driver = read_version(version_id::SYSTEM_DRIVER);
    assert_eq!(driver.rc, RC_OK);
    assert_eq!(driver.version.version_type, version_id::SYSTEM_DRIVER);
    assert_eq!((driver.version.major, driver.version.minor), (15, 3));
    assert!(!driver.version.description.is_empty());

    let unknown = read_version(99);
    assert_eq!(unknown.rc, RC_UNSUPPORTED);
    assert_eq!(unknown.version.version_type, 99);
}

#[test]
fn driver_info_counts_open_connections() {
    let server = start();
    let (_first_client, first) = connect(&server);
    let (_second_client, second) = connect(&server);
    let board = open_module(&first, 6);
    let _other = open_module(&second, 6);

    let frame = CmdFrame::board(
        board_id::GET_DRIVER_INFO,
        ModuleRequest { module_handle: 6 }.encode(),
    );
    let response = first.transmit_board_command(&board, frame).unwrap();
    let info = DriverInfo::decode(&response.payload).unwrap();
    assert_eq!(info.rc, RC_OK);
    assert_eq!(info.serial_number, 6);
    assert_eq!(info.open_connections, 2);
}

#[test]
fn failed_open_attaches_nothing() {
    let server = start();
    let (_client, peer) = connect(&server);
    let board = peer.create_board(42).unwrap();
    peer.connect_board(&board).unwrap();

    match peer.open_board(&board, OpenRequest { module: 42, stream: 1 }.encode()) {
        Err(AnsError::Status(AnsStatus::InvalidModuleIndex)) => {}
        other => panic!("expected InvalidModuleIndex, got {:?}", other),
    }
    assert_eq!(server.context.board_ref_count(42), 0);
}

#[test]
fn second_open_of_another_board_is_refused() {
    let server = start();
    let (_client, peer) = connect(&server);
    let board = open_module(&peer, 4);

    match peer.open_board(&board, OpenRequest { module: 5, stream: 1 }.encode()) {
        Err(AnsError::Status(AnsStatus::Error)) => {}
        other => panic!("expected Error, got {:?}", other),
    }
    assert_eq!(server.context.board_ref_count(4), 1);
    assert_eq!(server.context.board_ref_count(5), 0);
}

#[test]
fn concurrent_opens_share_one_board() {
    let server = Arc::new(start());
    let barrier = Arc::new(Barrier::new(2));

    let clients: Vec<_> = (0..2)
        .map(|_| {
            let server = server.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let (client, peer) = connect(&server);
                let board = peer.create_board(3).unwrap();
                peer.connect_board(&board).unwrap();
                barrier.wait();
                peer.open_board(&board, OpenRequest { module: 3, stream: 1 }.encode())
                    .unwrap();
                (client, peer)
            })
        })
        .collect();
    let mut clients: Vec<_> = clients
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(server.context.board_ref_count(3), 2);

    let (_client, peer) = clients.remove(0);
    peer.disconnect();
    assert!(wait_until(CLEANUP_TIMEOUT, || {
        server.context.board_ref_count(3) == 1
    }));

    let (_client, peer) = clients.remove(0);
    peer.disconnect();
    assert!(wait_until(CLEANUP_TIMEOUT, || {
        server.context.board_ref_count(3) == 0 && server.context.peer_count() == 0
    }));
}
