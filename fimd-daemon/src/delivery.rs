//! Delivery channel to the local message queue.
//!
//! Every event leaves the daemon through [`DeliveryChannel`]. A failed send
//! reopens the queue once and retries once; if the queue cannot be reopened
//! the error is fatal ([`DaemonError::QueueReopen`]). A second failure after a
//! successful reopen drops the event.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde_json::json;

use crate::error::{io_err, DaemonError};

/// Location tag attached to every message produced by the integrity monitor.
pub const SYSCHECK_LOCATION: &str = "syscheck";

/// One-character queue class used by the downstream consumer for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingClass {
    /// Inventory/database synchronization.
    Sync,
    /// File change or addition.
    Change,
    /// Plain log line.
    Log,
}

impl RoutingClass {
    pub fn tag(self) -> char {
        match self {
            RoutingClass::Sync => '5',
            RoutingClass::Change => '8',
            RoutingClass::Log => '1',
        }
    }
}

/// Wire form of a queued message: `<class>:<location>:<payload>`.
pub fn format_message(class: RoutingClass, location: &str, payload: &str) -> String {
    format!("{}:{}:{}", class.tag(), location, payload)
}

/// Opens connections to the local queue.
pub trait QueueConnector: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<Box<dyn QueueConnection>>;
}

/// An open queue handle.
pub trait QueueConnection: Send {
    fn send(&mut self, class: RoutingClass, location: &str, payload: &str) -> io::Result<()>;
}

/// Unix datagram socket transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixQueue;

struct UnixQueueConnection {
    socket: UnixDatagram,
}

impl QueueConnector for UnixQueue {
    fn open(&self, path: &Path) -> io::Result<Box<dyn QueueConnection>> {
        let socket = UnixDatagram::unbound()?;
        socket.connect(path)?;
        Ok(Box::new(UnixQueueConnection { socket }))
    }
}

impl QueueConnection for UnixQueueConnection {
    fn send(&mut self, class: RoutingClass, location: &str, payload: &str) -> io::Result<()> {
        let message = format_message(class, location, payload);
        self.socket.send(message.as_bytes()).map(|_| ())
    }
}

/// Scan lifecycle marker emitted around every baseline scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanInfo {
    Start { timestamp: i64 },
    End { timestamp: i64 },
}

impl ScanInfo {
    pub fn to_json(self) -> String {
        let (kind, timestamp) = match self {
            ScanInfo::Start { timestamp } => ("scan_start", timestamp),
            ScanInfo::End { timestamp } => ("scan_end", timestamp),
        };
        json!({ "type": kind, "data": { "timestamp": timestamp } }).to_string()
    }
}

type Pacer = Box<dyn Fn(Duration) + Send + Sync>;

pub struct DeliveryChannel {
    connector: Box<dyn QueueConnector>,
    path: PathBuf,
    handle: Mutex<Option<Box<dyn QueueConnection>>>,
    send_delay: Duration,
    pacer: Pacer,
}

impl DeliveryChannel {
    /// Open the queue at `path`. The initial open is not retried.
    pub fn open(
        connector: impl QueueConnector + 'static,
        path: impl Into<PathBuf>,
        send_delay: Duration,
    ) -> Result<Self, DaemonError> {
        let path = path.into();
        let handle = connector.open(&path).map_err(|e| io_err(&path, e))?;
        Ok(Self {
            connector: Box::new(connector),
            path,
            handle: Mutex::new(Some(handle)),
            send_delay,
            pacer: Box::new(std::thread::sleep),
        })
    }

    /// Replace the pacing sleep (tests record the requested delays instead).
    pub fn with_pacer(mut self, pacer: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.pacer = Box::new(pacer);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Send with one reconnect-and-retry.
    ///
    /// Only a failed reopen is reported as an error; a failed retry is logged
    /// and the payload is dropped.
    pub fn send(
        &self,
        class: RoutingClass,
        location: &str,
        payload: &str,
    ) -> Result<(), DaemonError> {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);

        let first = match handle.as_mut() {
            Some(conn) => conn.send(class, location, payload),
            None => Err(io::Error::new(io::ErrorKind::NotConnected, "queue closed")),
        };
        let Err(err) = first else {
            return Ok(());
        };

        tracing::error!(
            queue = %self.path.display(),
            error = %err,
            "error sending message to queue",
        );
        *handle = None;

        let mut reopened = self.connector.open(&self.path).map_err(|source| {
            tracing::error!(queue = %self.path.display(), error = %source, "unable to reopen queue");
            DaemonError::QueueReopen {
                path: self.path.clone(),
                source,
            }
        })?;

        if let Err(err) = reopened.send(class, location, payload) {
            tracing::warn!(
                queue = %self.path.display(),
                error = %err,
                "retry after reopen failed, message dropped",
            );
        }
        *handle = Some(reopened);
        Ok(())
    }

    /// Inventory sync payload; paced.
    pub fn send_sync(&self, payload: &str) -> Result<(), DaemonError> {
        tracing::debug!(payload, "sending sync message");
        self.send(RoutingClass::Sync, SYSCHECK_LOCATION, payload)?;
        self.pace();
        Ok(())
    }

    /// Change/addition payload; paced.
    pub fn send_change(&self, payload: &str) -> Result<(), DaemonError> {
        tracing::debug!(payload, "sending change message");
        self.send(RoutingClass::Change, SYSCHECK_LOCATION, payload)?;
        self.pace();
        Ok(())
    }

    /// Plain log payload; not paced.
    pub fn send_log(&self, payload: &str) -> Result<(), DaemonError> {
        self.send(RoutingClass::Log, SYSCHECK_LOCATION, payload)
    }

    pub fn send_scan_info(&self, info: ScanInfo) -> Result<(), DaemonError> {
        self.send_change(&info.to_json())
    }

    fn pace(&self) {
        (self.pacer)(self.send_delay);
    }
}
