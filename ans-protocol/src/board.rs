//! Boards and their event observers.
//!
//! A [`Board`] represents one hardware unit. Command traffic to a board is serialised by
//! [`Board::lock`], while event observers live behind a separate lock so that events can be
//! published while a command is in flight.

use std::{
    net::{SocketAddr, TcpListener},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::{
    connection::{Channel, Connection},
    error::{AnsError, AnsResult},
    protocol::BoardHandle,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Subscriber receiving the asynchronous events of one board over its own connection.
#[derive(Debug)]
pub struct EventObserver {
    handle: u32,
    connection: Mutex<Connection>,
}

impl EventObserver {
    pub fn new(handle: u32, connection: Connection) -> EventObserver {
        EventObserver {
            handle,
            connection: Mutex::new(connection),
        }
    }

    /// Server side: waits for the subscriber to connect on `listener`.
    pub fn wait_connect(
        handle: u32,
        listener: &TcpListener,
        timeout: Duration,
    ) -> AnsResult<EventObserver> {
        let connection = Connection::accept(listener, Some(timeout))?;
        log::debug!(
            "Event observer {} connected from {}",
            handle,
            connection.peer_addr()
        );
        Ok(EventObserver::new(handle, connection))
    }

    /// Client side: connects to the event stream offered by the server.
    pub fn connect(handle: u32, addr: SocketAddr, timeout: Duration) -> AnsResult<EventObserver> {
        let connection = Connection::connect_timeout(&addr, timeout)?;
        Ok(EventObserver::new(handle, connection))
    }

    pub fn handle(&self) -> u32 {
        self.handle
    }

    pub fn send_event(&self, data: &[u8]) -> AnsResult<()> {
        lock(&self.connection).send(data)
    }

    /// Blocks until `buf` is filled with event data, the peer disconnects or `timeout` elapses.
    pub fn wait_event(&self, buf: &mut [u8], timeout: Option<Duration>) -> AnsResult<()> {
        lock(&self.connection).receive(buf, timeout)
    }

    pub fn close(&self) {
        lock(&self.connection).close();
    }
}

/// One hardware unit, shared by every worker that opened it.
#[derive(Debug)]
pub struct Board {
    handle: BoardHandle,
    command_connection: Mutex<Option<Connection>>,
    observers: Mutex<Vec<Arc<EventObserver>>>,
}

impl Board {
    pub fn new(handle: BoardHandle) -> Board {
        Board {
            handle,
            command_connection: Mutex::new(None),
            observers: Mutex::new(Vec::new()),
        }
    }

    pub fn handle(&self) -> BoardHandle {
        self.handle
    }

    /// Serialises command traffic to this board.
    ///
    /// The guard gives access to the command connection, which is only set on the client side.
    pub fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        lock(&self.command_connection)
    }

    /// Sets the command connection, closing a previous one.
    pub fn register_connection(&self, connection: Connection) {
        if let Some(mut previous) = self.lock().replace(connection) {
            previous.close();
        }
    }

    pub fn remove_connection(&self) -> Option<Connection> {
        self.lock().take()
    }

    pub fn has_connection(&self) -> bool {
        self.lock().is_some()
    }

    pub fn register_observer(&self, observer: Arc<EventObserver>) {
        log::debug!(
            "Registering event observer {} on board {}",
            observer.handle(),
            self.handle
        );
        lock(&self.observers).push(observer);
    }

    pub fn event_observer(&self, handle: u32) -> Option<Arc<EventObserver>> {
        lock(&self.observers)
            .iter()
            .find(|observer| observer.handle() == handle)
            .cloned()
    }

    /// Removes the observer from the board. The caller closes it afterwards.
    pub fn unregister_observer(&self, handle: u32) -> Option<Arc<EventObserver>> {
        let mut observers = lock(&self.observers);
        let index = observers
            .iter()
            .position(|observer| observer.handle() == handle)?;
        Some(observers.remove(index))
    }

    /// Removes exactly this observer, even if another one reuses its handle.
    pub fn remove_observer(&self, observer: &Arc<EventObserver>) -> bool {
        let mut observers = lock(&self.observers);
        let before = observers.len();
        observers.retain(|registered| !Arc::ptr_eq(registered, observer));
        observers.len() != before
    }

    pub fn is_registered(&self, observer: &Arc<EventObserver>) -> bool {
        lock(&self.observers)
            .iter()
            .any(|registered| Arc::ptr_eq(registered, observer))
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    /// Sends `data` to every observer.
    ///
    /// Delivery is best effort: a failing observer is logged and skipped. Observers whose
    /// connection is gone are closed and removed. Returns the number of observers the
    /// event reached.
    pub fn publish_event(&self, data: &[u8]) -> usize {
        let mut observers = lock(&self.observers);
        let mut delivered = 0;
        observers.retain(|observer| match observer.send_event(data) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(e @ (AnsError::Disconnected | AnsError::Write(_))) => {
                log::warn!(
                    "Removing observer {} of board {}: {}",
                    observer.handle(),
                    self.handle,
                    e
                );
                observer.close();
                false
            }
            Err(e) => {
                log::warn!(
                    "Dropping event for observer {} of board {}: {}",
                    observer.handle(),
                    self.handle,
                    e
                );
                true
            }
        });
        log::trace!("Event {:02x?} reached {} observers", data, delivered);
        delivered
    }

    /// Closes the command connection and every observer.
    pub fn teardown(&self) {
        if let Some(mut connection) = self.remove_connection() {
            connection.close();
        }
        let observers: Vec<_> = lock(&self.observers).drain(..).collect();
        for observer in observers {
            observer.close();
        }
        log::debug!("Board {} torn down", self.handle);
    }
}
