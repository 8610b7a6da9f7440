//! # Simulated Boards
//!
//! Memory-backed stand-ins for MIL-STD-1553 adapters. Every module owns a flat block
//! of zeroed memory; all memory types map onto that block. Writes raise an event on
//! every callback registered for the module, which is pushed to the event streams of
//! the board.
//!
//! Module indices double as board handles.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ans_protocol::{
    BoardHandle, board_id,
    board::Board,
    error::{AnsError, AnsResult, AnsStatus},
    frame::CmdRspFrame,
    mil::{
        BoardMemSize, CallbackRequest, DriverInfo, DriverVersion, Event, IoCommand, IoResponse,
        IoStructCommand, IoStructResponse, MAX_IO_DATA, ModuleRequest, OpenRequest, OpenResponse,
        ReadMemRequest, ReadMemResponse, ReadVersionRequest, ReadVersionResponse, ReturnCode,
        VersionInfo, WriteMemRequest, WriteMemResponse, version_id,
    },
};
use ans_server::handlers::{BoardRequest, Handlers, Opened, Reply};

/// Return code of a successful board call
pub const RC_OK: i32 = 0;
/// Return code of an access outside the board memory
pub const RC_OUT_OF_RANGE: i32 = -2;
/// Return code for a component the simulation has no version for
pub const RC_UNSUPPORTED: i32 = -3;

/// Reported by `GetDriverVersion`
pub const DRIVER_VERSION: u32 = 0x0015_0300;
pub const DRIVER_BUILD: u32 = 1;

/// Device group reported by `GetDriverInfo`
pub const DEVICE_GROUP: u8 = 0;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Module {
    memory: Mutex<Vec<u8>>,
    callbacks: Mutex<Vec<(u32, u32)>>,
}

/// The modules of one simulated server.
#[derive(Debug)]
pub struct SimulatedBoards {
    modules: Vec<Module>,
}

impl SimulatedBoards {
    pub fn new(count: u32, memory_size: usize) -> SimulatedBoards {
        log::debug!(
            "Simulating {} boards with {:#x} bytes of memory each",
            count,
            memory_size
        );
        SimulatedBoards {
            modules: (0..count)
                .map(|_| Module {
                    memory: Mutex::new(vec![0; memory_size]),
                    callbacks: Mutex::new(Vec::new()),
                })
                .collect(),
        }
    }

    pub fn count(&self) -> u32 {
        self.modules.len() as u32
    }

    fn module(&self, handle: BoardHandle) -> AnsResult<&Module> {
        self.modules
            .get(handle as usize)
            .ok_or(AnsError::Status(AnsStatus::InvalidModuleIndex))
    }

    /// Copies `len` bytes at `offset`. `None` if the range leaves the memory.
    pub fn read(
        &self,
        handle: BoardHandle,
        offset: usize,
        len: usize,
    ) -> AnsResult<Option<Vec<u8>>> {
        let memory = lock(&self.module(handle)?.memory);
        let range = offset..offset.saturating_add(len);
        Ok(memory.get(range).map(<[u8]>::to_vec))
    }

    /// Stores `data` at `offset`. `false` if the range leaves the memory.
    pub fn write(&self, handle: BoardHandle, offset: usize, data: &[u8]) -> AnsResult<bool> {
        let mut memory = lock(&self.module(handle)?.memory);
        let range = offset..offset.saturating_add(data.len());
        match memory.get_mut(range) {
            Some(target) => {
                target.copy_from_slice(data);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn memory_size(&self, handle: BoardHandle) -> AnsResult<usize> {
        Ok(lock(&self.module(handle)?.memory).len())
    }

    pub fn register_callback(&self, handle: BoardHandle, biu: u32, kind: u32) -> AnsResult<()> {
        let mut callbacks = lock(&self.module(handle)?.callbacks);
        if !callbacks.contains(&(biu, kind)) {
            callbacks.push((biu, kind));
        }
        Ok(())
    }

    /// `false` if no such callback was registered.
    pub fn unregister_callback(&self, handle: BoardHandle, biu: u32, kind: u32) -> AnsResult<bool> {
        let mut callbacks = lock(&self.module(handle)?.callbacks);
        let before = callbacks.len();
        callbacks.retain(|callback| *callback != (biu, kind));
        Ok(callbacks.len() != before)
    }

    /// Events raised by a write of `len` bytes at `offset`.
    fn write_events(&self, handle: BoardHandle, offset: u32, len: u32) -> AnsResult<Vec<Event>> {
        Ok(lock(&self.module(handle)?.callbacks)
            .iter()
            .map(|&(biu, kind)| Event {
                module_handle: handle,
                biu,
                kind,
                data: [offset, len, 0, 0],
            })
            .collect())
    }
}

/// Version of a board component, `None` for components the simulation lacks.
pub fn component_version(id: u32) -> Option<VersionInfo> {
    let (description, major, minor, patch, build) = match id {
        version_id::SYSTEM_DRIVER => ("Simulated System Driver", 15, 3, 0, DRIVER_BUILD),
        version_id::TARGET_SOFTWARE => ("Simulated Target Software", 15, 3, 0, DRIVER_BUILD),
        version_id::ANS => (
            "ANS1553 Server",
            env!("CARGO_PKG_VERSION_MAJOR").parse::<u32>().unwrap_or(0),
            env!("CARGO_PKG_VERSION_MINOR").parse::<u32>().unwrap_or(0),
            env!("CARGO_PKG_VERSION_PATCH").parse::<u32>().unwrap_or(0),
            0,
        ),
        _ => return None,
    };
    Some(VersionInfo {
        version_type: id,
        description: description.to_string(),
        major,
        minor,
        patch,
        build,
        full_version: format!("{}.{}.{}.{}", major, minor, patch, build),
    })
}

/// The simulated target acknowledges an IO command by echoing its arguments,
/// preceded by the command code.
fn execute_io(command: &IoCommand) -> IoResponse {
    if command.out_bytes.len() > MAX_IO_DATA || 2 * command.out_words.len() > MAX_IO_DATA {
        log::error!(
            "IO command {:#x} exceeds {} bytes of arguments",
            command.cmd,
            MAX_IO_DATA
        );
        return IoResponse {
            rc: RC_OUT_OF_RANGE,
            ..Default::default()
        };
    }
    IoResponse {
        rc: RC_OK,
        in_lwords: vec![command.cmd],
        in_words: command.out_words.clone(),
        in_bytes: command.out_bytes.clone(),
    }
}

/// The board attached to the worker. Commands for any other module are rejected.
fn attached<'a>(
    request: &BoardRequest<'a>,
    module_handle: BoardHandle,
) -> AnsResult<&'a Arc<Board>> {
    match request.board {
        Some(board) if board.handle() == module_handle => Ok(board),
        Some(board) => {
            log::error!(
                "Command for module {} on the connection of board {}",
                module_handle,
                board.handle()
            );
            Err(AnsError::Status(AnsStatus::InvalidModuleIndex))
        }
        None => {
            log::error!("Command for module {} without an open board", module_handle);
            Err(AnsError::Status(AnsStatus::InvalidModuleIndex))
        }
    }
}

fn reply(request: &BoardRequest<'_>, payload: Vec<u8>) -> AnsResult<Reply> {
    Ok(Reply::Frame(CmdRspFrame::ok(request.frame, payload)))
}

/// Handler tables serving `boards`.
pub fn handlers(boards: Arc<SimulatedBoards>) -> Handlers {
    let open = boards.clone();
    let read = boards.clone();
    let write = boards.clone();
    let mem_size = boards.clone();
    let register = boards.clone();
    let unregister = boards;

    Handlers::new()
        .open(move |_, frame| {
            let request = OpenRequest::decode(&frame.payload)?;
            if open.module(request.module).is_err() {
                log::error!("Open of unknown module {}", request.module);
                let response = OpenResponse {
                    module_handle: request.module,
                    rc: -1,
                };
                return Ok(Opened {
                    response: CmdRspFrame::for_command(
                        frame,
                        AnsStatus::InvalidModuleIndex,
                        response.encode(),
                    ),
                    handle: None,
                });
            }
            log::info!("Opened module {} (stream {})", request.module, request.stream);
            let response = OpenResponse {
                module_handle: request.module,
                rc: RC_OK,
            };
            Ok(Opened {
                response: CmdRspFrame::ok(frame, response.encode()),
                handle: Some(request.module),
            })
        })
        .board(board_id::CLOSE, |request| {
            let ModuleRequest { module_handle } = ModuleRequest::decode(&request.frame.payload)?;
            attached(&request, module_handle)?;
            log::info!("Closed module {}", module_handle);
            reply(&request, ReturnCode { rc: RC_OK }.encode())
        })
        .board(board_id::READ_MEMORY, move |request| {
            let ReadMemRequest { range } = ReadMemRequest::decode(&request.frame.payload)?;
            attached(&request, range.module_handle)?;
            let len = range
                .byte_len()
                .ok_or_else(|| AnsError::Payload("read length overflows".to_string()))?;
            let response = match read.read(range.module_handle, range.offset as usize, len)? {
                Some(data) => ReadMemResponse {
                    rc: RC_OK,
                    bytes_read: data.len() as u32,
                    data,
                },
                None => ReadMemResponse {
                    rc: RC_OUT_OF_RANGE,
                    bytes_read: 0,
                    data: Vec::new(),
                },
            };
            log::debug!(
                "Read {} bytes at {:#x} of module {}",
                response.bytes_read,
                range.offset,
                range.module_handle
            );
            reply(&request, response.encode())
        })
        .board(board_id::WRITE_MEMORY, move |request| {
            let WriteMemRequest { range, data } = WriteMemRequest::decode(&request.frame.payload)?;
            let board = attached(&request, range.module_handle)?;
            if range.byte_len() != Some(data.len()) {
                return Err(AnsError::Payload(format!(
                    "{} bytes of data for {} elements of width {}",
                    data.len(),
                    range.num_elements,
                    range.width
                )));
            }
            let response = if write.write(range.module_handle, range.offset as usize, &data)? {
                let events =
                    write.write_events(range.module_handle, range.offset, data.len() as u32)?;
                for event in events {
                    board.publish_event(&event.encode());
                }
                WriteMemResponse {
                    rc: RC_OK,
                    bytes_written: data.len() as u32,
                }
            } else {
                WriteMemResponse {
                    rc: RC_OUT_OF_RANGE,
                    bytes_written: 0,
                }
            };
            reply(&request, response.encode())
        })
        .board(board_id::GET_DRIVER_VERSION, |request| {
            let response = DriverVersion {
                rc: RC_OK,
                version: DRIVER_VERSION,
                build: DRIVER_BUILD,
            };
            reply(&request, response.encode())
        })
        .board(board_id::IO_COMMAND, |request| {
            let command = IoCommand::decode(&request.frame.payload)?;
            attached(&request, command.module_handle)?;
            log::debug!(
                "IO command {:#x} on biu {} of module {}",
                command.cmd,
                command.biu,
                command.module_handle
            );
            reply(&request, execute_io(&command).encode())
        })
        .board(board_id::IO_COMMAND_STRUCT, |request| {
            let command = IoStructCommand::decode(&request.frame.payload)?;
            attached(&request, command.module_handle)?;
            let ack_len = command.command.len().min(command.expected_ack_size as usize);
            let response = IoStructResponse {
                rc: RC_OK,
                ack: command.command[..ack_len].to_vec(),
            };
            reply(&request, response.encode())
        })
        .board(board_id::GET_SOFTWARE_VERSIONS, |request| {
            let ReadVersionRequest {
                module_handle,
                version_id,
            } = ReadVersionRequest::decode(&request.frame.payload)?;
            attached(&request, module_handle)?;
            let response = match component_version(version_id) {
                Some(version) => ReadVersionResponse { rc: RC_OK, version },
                None => {
                    log::warn!("No version for component {}", version_id);
                    ReadVersionResponse {
                        rc: RC_UNSUPPORTED,
                        version: VersionInfo {
                            version_type: version_id,
                            ..Default::default()
                        },
                    }
                }
            };
            reply(&request, response.encode())
        })
        .board(board_id::GET_DRIVER_INFO, |request| {
            let ModuleRequest { module_handle } = ModuleRequest::decode(&request.frame.payload)?;
            attached(&request, module_handle)?;
            let response = DriverInfo {
                rc: RC_OK,
                device_group: DEVICE_GROUP,
                serial_number: module_handle,
                open_connections: request.context.board_ref_count(module_handle) as u32,
                ..Default::default()
            };
            reply(&request, response.encode())
        })
        .board(board_id::GET_BOARD_MEM_SIZE, move |request| {
            let ModuleRequest { module_handle } = ModuleRequest::decode(&request.frame.payload)?;
            attached(&request, module_handle)?;
            let size = mem_size.memory_size(module_handle)?;
            let response = BoardMemSize {
                rc: RC_OK,
                size: size as u32,
            };
            reply(&request, response.encode())
        })
        .board(board_id::REGISTER_CALLBACK, move |request| {
            let callback = CallbackRequest::decode(&request.frame.payload)?;
            attached(&request, callback.module_handle)?;
            register.register_callback(callback.module_handle, callback.biu, callback.kind)?;
            log::debug!("Registered callback {:?}", callback);
            reply(&request, ReturnCode { rc: RC_OK }.encode())
        })
        .board(board_id::UNREGISTER_CALLBACK, move |request| {
            let callback = CallbackRequest::decode(&request.frame.payload)?;
            attached(&request, callback.module_handle)?;
            let removed = unregister.unregister_callback(
                callback.module_handle,
                callback.biu,
                callback.kind,
            )?;
            let rc = if removed { RC_OK } else { -1 };
            reply(&request, ReturnCode { rc }.encode())
        })
}
