//! The control-interface connection.
//!
//! A [`ControlConnection`] binds a private datagram socket next to the
//! daemon's control sockets, associates it with the daemon socket, and hands
//! the socket to a dedicated reader task. Every operation is a message to
//! that task.
//!
//! The protocol has no correlation identifiers: a reply is simply the next
//! non-event datagram after a command. Operations that wait for a reply take
//! `&mut self`, so at most one request is ever outstanding per connection.
//! Callers sharing a connection between tasks must wrap it in a mutex.

use std::io;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wpactrl_config::{ClientConfig, ConnectionConfig, ScanConfig};

use crate::error::{ExchangeError, WpaCtrlError};
use crate::event::Event;
use crate::reader::{Command, Limits, Reader};

const ATTACH: &[u8] = b"ATTACH";
const DETACH: &[u8] = b"DETACH";

/// Per-process counter making local socket names unique.
static LOCAL_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Handles to the running reader task.
struct Channel {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<Event>,
    reader: JoinHandle<()>,
}

/// A client connection to a wpa_supplicant or hostapd control socket.
pub struct ControlConnection {
    socket_path: PathBuf,
    local_path: PathBuf,
    config: ConnectionConfig,
    scan: ScanConfig,
    channel: Option<Channel>,
    attached: bool,
}

impl ControlConnection {
    /// Connect to the daemon control socket at `path` with default settings.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, WpaCtrlError> {
        Self::open_with(path, &ClientConfig::default()).await
    }

    /// Connect to the daemon control socket at `path`.
    ///
    /// Binds `<local_dir>/<local_prefix><pid>-<n>` so the daemon has an
    /// address to reply to. Fails with [`WpaCtrlError::Open`] if the local
    /// socket cannot be bound or the daemon socket cannot be reached, and
    /// with [`WpaCtrlError::Config`] if `config` does not validate.
    pub async fn open_with(
        path: impl Into<PathBuf>,
        config: &ClientConfig,
    ) -> Result<Self, WpaCtrlError> {
        config.validate()?;
        let socket_path = path.into();
        let conn = &config.connection;
        let local_path = next_local_path(conn);

        let socket = bind_local(&local_path).map_err(|source| WpaCtrlError::Open {
            path: local_path.clone(),
            source,
        })?;

        if let Err(source) = socket
            .connect(&socket_path)
            .and_then(|()| socket.set_nonblocking(true))
        {
            remove_local(&local_path);
            return Err(WpaCtrlError::Open {
                path: socket_path,
                source,
            });
        }

        let (command_tx, command_rx) = mpsc::channel(1);
        let (event_tx, _) = broadcast::channel(conn.event_channel_capacity);
        let limits = Limits {
            max_reply: conn.max_reply_size,
            max_event: conn.max_event_size,
            queue_capacity: conn.event_queue_capacity,
        };

        let reader = match Reader::new(socket, command_rx, event_tx.clone(), limits) {
            Ok(reader) => reader,
            Err(source) => {
                remove_local(&local_path);
                return Err(WpaCtrlError::Open {
                    path: socket_path,
                    source,
                });
            }
        };

        info!(
            path = %socket_path.display(),
            local = %local_path.display(),
            "control interface opened"
        );

        Ok(Self {
            socket_path,
            local_path,
            config: conn.clone(),
            scan: config.scan.clone(),
            channel: Some(Channel {
                commands: command_tx,
                events: event_tx,
                reader: tokio::spawn(reader.run()),
            }),
            attached: false,
        })
    }

    /// Path of the daemon's control socket.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Path of this connection's own bound socket.
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_none()
    }

    pub(crate) fn scan_config(&self) -> &ScanConfig {
        &self.scan
    }

    /// Send `cmd` and return the daemon's reply.
    ///
    /// Events that arrive while waiting are queued for [`recv`](Self::recv)
    /// rather than returned. Replies longer than `max_reply_size` are
    /// silently truncated, so very long replies may be incomplete.
    pub async fn request(&mut self, cmd: impl AsRef<[u8]>) -> Result<Vec<u8>, WpaCtrlError> {
        self.exchange(cmd.as_ref(), WpaCtrlError::Request).await
    }

    /// Register for unsolicited events. A no-op if already attached.
    pub async fn attach(&mut self) -> Result<(), WpaCtrlError> {
        self.channel()?;
        if self.attached {
            return Ok(());
        }

        let ack = self.exchange(ATTACH, WpaCtrlError::Attach).await?;
        check_ack(&ack).map_err(WpaCtrlError::Attach)?;
        self.attached = true;
        info!(path = %self.socket_path.display(), "attached to event stream");
        Ok(())
    }

    /// Unregister from unsolicited events. A no-op if not attached.
    pub async fn detach(&mut self) -> Result<(), WpaCtrlError> {
        self.channel()?;
        if !self.attached {
            return Ok(());
        }

        let ack = self.exchange(DETACH, WpaCtrlError::Detach).await?;
        check_ack(&ack).map_err(WpaCtrlError::Detach)?;
        self.attached = false;
        info!(path = %self.socket_path.display(), "detached from event stream");
        Ok(())
    }

    /// Whether an unsolicited message is waiting to be [`recv`](Self::recv)'d.
    ///
    /// Never blocks. Only meaningful once no request is outstanding.
    pub async fn pending(&mut self) -> Result<bool, WpaCtrlError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Pending { reply }).await?;
        match rx.await {
            Ok(result) => result.map_err(WpaCtrlError::Pending),
            Err(_) => Err(WpaCtrlError::Pending(reader_gone())),
        }
    }

    /// Take the next unsolicited message, waiting until one arrives.
    ///
    /// Messages are returned as received, truncated to `max_event_size`.
    /// Pair with [`pending`](Self::pending) to avoid waiting indefinitely.
    pub async fn recv(&mut self) -> Result<Vec<u8>, WpaCtrlError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Recv { reply }).await?;
        match rx.await {
            Ok(result) => result.map_err(WpaCtrlError::Recv),
            Err(_) => Err(WpaCtrlError::Recv(reader_gone())),
        }
    }

    /// Subscribe to every unsolicited event from now on.
    ///
    /// Independent of the `pending`/`recv` queue: each event is delivered to
    /// both. Slow subscribers observe `RecvError::Lagged`.
    pub fn subscribe(&self) -> Result<broadcast::Receiver<Event>, WpaCtrlError> {
        Ok(self.channel()?.events.subscribe())
    }

    /// Detach if attached, release the socket and remove the local path.
    ///
    /// A failed detach is logged and does not stop the close. Calling this
    /// on a closed connection does nothing.
    pub async fn close(&mut self) {
        if self.channel.is_none() {
            return;
        }

        if self.attached {
            if let Err(e) = self.detach().await {
                warn!(error = %e, "detach during close failed");
            }
            self.attached = false;
        }

        if let Some(channel) = self.channel.take() {
            drop(channel.commands);
            if let Err(e) = channel.reader.await {
                warn!(error = %e, "control socket reader ended abnormally");
            }
        }

        remove_local(&self.local_path);
        info!(path = %self.socket_path.display(), "control interface closed");
    }

    fn channel(&self) -> Result<&Channel, WpaCtrlError> {
        self.channel.as_ref().ok_or(WpaCtrlError::Closed)
    }

    async fn submit(&self, command: Command) -> Result<(), WpaCtrlError> {
        let channel = self.channel()?;
        // the reader only stops once `commands` is dropped, so a send error
        // means it died; the caller's dropped oneshot reports that
        let _ = channel.commands.send(command).await;
        Ok(())
    }

    /// Send one datagram and wait for the reply, classifying failures with
    /// `wrap`.
    async fn exchange(
        &mut self,
        payload: &[u8],
        wrap: fn(ExchangeError) -> WpaCtrlError,
    ) -> Result<Vec<u8>, WpaCtrlError> {
        let timeout = self.config.request_timeout();
        let (reply, rx) = oneshot::channel();

        debug!(command = %verb(payload), "sending command");
        self.submit(Command::Request {
            payload: payload.to_vec(),
            reply,
        })
        .await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(reply))) => Ok(reply),
            Ok(Ok(Err(source))) => Err(wrap(ExchangeError::Failed(source))),
            Ok(Err(_)) => Err(wrap(ExchangeError::Unknown(
                "control socket reader stopped without replying".to_string(),
            ))),
            Err(_) => {
                debug!(command = %verb(payload), ?timeout, "command timed out");
                Err(wrap(ExchangeError::Timeout(timeout)))
            }
        }
    }
}

impl Drop for ControlConnection {
    fn drop(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        if self.attached {
            warn!(
                path = %self.socket_path.display(),
                "connection dropped while attached; call close() to detach"
            );
        }
        channel.reader.abort();
        remove_local(&self.local_path);
    }
}

impl std::fmt::Debug for ControlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlConnection")
            .field("socket_path", &self.socket_path)
            .field("local_path", &self.local_path)
            .field("attached", &self.attached)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn next_local_path(config: &ConnectionConfig) -> PathBuf {
    let n = LOCAL_COUNTER.fetch_add(1, Ordering::Relaxed);
    config.local_dir().join(format!(
        "{}{}-{}",
        config.local_prefix,
        std::process::id(),
        n
    ))
}

/// Bind the client socket, replacing a stale entry left by a dead process
/// that happened to have the same pid.
fn bind_local(path: &Path) -> io::Result<UnixDatagram> {
    match UnixDatagram::bind(path) {
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            debug!(path = %path.display(), "removing stale local socket");
            std::fs::remove_file(path)?;
            UnixDatagram::bind(path)
        }
        result => result,
    }
}

fn remove_local(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove local socket"),
    }
}

/// ATTACH and DETACH are acknowledged with exactly `OK\n`.
fn check_ack(ack: &[u8]) -> Result<(), ExchangeError> {
    if ack == b"OK\n" || ack == b"OK" {
        return Ok(());
    }
    Err(ExchangeError::Failed(io::Error::other(format!(
        "unexpected acknowledgement {:?}",
        String::from_utf8_lossy(ack).trim_end()
    ))))
}

/// First word of a command, safe to log (no credentials).
fn verb(payload: &[u8]) -> String {
    let end = payload
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).into_owned()
}

fn reader_gone() -> io::Error {
    io::Error::new(
        io::ErrorKind::BrokenPipe,
        "control socket reader stopped without replying",
    )
}
