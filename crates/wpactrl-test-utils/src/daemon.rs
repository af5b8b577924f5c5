//! A simulated wpa_supplicant control interface.
//!
//! [`MockDaemon`] binds a real UNIX datagram socket inside an owned temp
//! directory and answers commands the way the daemon does: each command
//! datagram gets its reply datagrams sent back to the sender's bound path.
//! It records every command it receives, tracks which clients are attached,
//! and lets tests push unsolicited events.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::net::UnixDatagram;
use tokio::task::JoinHandle;
use tracing::debug;

/// Decides the reply datagrams for a command.
///
/// Return `None` to fall back to the built-in behaviour (ATTACH, DETACH,
/// PING, otherwise `UNKNOWN COMMAND`). Return `Some(vec![])` to stay silent.
/// Returning several datagrams sends them in order, which is how tests
/// interleave events ahead of a reply.
pub type Responder = dyn Fn(&[u8]) -> Option<Vec<Vec<u8>>> + Send + Sync;

#[derive(Default)]
struct State {
    received: Vec<Vec<u8>>,
    monitors: Vec<PathBuf>,
    last_client: Option<PathBuf>,
}

/// A test-scoped daemon peer. The socket and temp directory are removed
/// when this value is dropped.
pub struct MockDaemon {
    socket_path: PathBuf,
    socket: Arc<UnixDatagram>,
    state: Arc<Mutex<State>>,
    task: JoinHandle<()>,
    temp_dir: TempDir,
}

impl MockDaemon {
    /// Start a daemon with only the built-in command handling.
    pub async fn start() -> Self {
        Self::with_responder(|_| None).await
    }

    /// Start a daemon that consults `responder` before the built-ins.
    pub async fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&[u8]) -> Option<Vec<Vec<u8>>> + Send + Sync + 'static,
    {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join("wlan0");
        let socket =
            Arc::new(UnixDatagram::bind(&socket_path).expect("failed to bind mock daemon socket"));
        let state = Arc::new(Mutex::new(State::default()));

        let task = tokio::spawn(serve(
            Arc::clone(&socket),
            Arc::clone(&state),
            Box::new(responder),
        ));

        Self {
            socket_path,
            socket,
            state,
            task,
            temp_dir,
        }
    }

    /// The daemon's control socket, to pass to `ControlConnection::open`.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// A writable directory for client-side sockets.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Every command received so far, in arrival order.
    pub fn received(&self) -> Vec<Vec<u8>> {
        self.state().received.clone()
    }

    /// How many times exactly `command` was received.
    pub fn count(&self, command: &[u8]) -> usize {
        self.state()
            .received
            .iter()
            .filter(|c| c.as_slice() == command)
            .count()
    }

    /// Number of clients currently attached.
    pub fn monitor_count(&self) -> usize {
        self.state().monitors.len()
    }

    /// Send `event` to every attached client.
    pub async fn send_event(&self, event: &[u8]) {
        let monitors = self.state().monitors.clone();
        for monitor in monitors {
            self.socket
                .send_to(event, &monitor)
                .await
                .expect("failed to send event");
        }
    }

    /// Send an arbitrary datagram to whichever client spoke last,
    /// attached or not. Used to simulate late replies.
    pub async fn send_to_last_client(&self, datagram: &[u8]) {
        let client = self
            .state()
            .last_client
            .clone()
            .expect("no client has sent a command yet");
        self.socket
            .send_to(datagram, &client)
            .await
            .expect("failed to send datagram");
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("mock daemon state poisoned")
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(socket: Arc<UnixDatagram>, state: Arc<Mutex<State>>, responder: Box<Responder>) {
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let (len, addr) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                debug!(error = %e, "mock daemon receive failed, stopping");
                return;
            }
        };
        let Some(peer) = addr.as_pathname().map(Path::to_path_buf) else {
            debug!("ignoring datagram from unbound client");
            continue;
        };
        let command = buf[..len].to_vec();

        let replies = {
            let mut state = state.lock().expect("mock daemon state poisoned");
            state.received.push(command.clone());
            state.last_client = Some(peer.clone());
            match responder(&command) {
                Some(replies) => replies,
                None => builtin(&command, &peer, &mut state),
            }
        };

        for reply in replies {
            if let Err(e) = socket.send_to(&reply, &peer).await {
                debug!(error = %e, peer = %peer.display(), "mock daemon reply failed");
            }
        }
    }
}

fn builtin(command: &[u8], peer: &Path, state: &mut State) -> Vec<Vec<u8>> {
    let reply: &[u8] = match command {
        b"ATTACH" => {
            if !state.monitors.iter().any(|m| m == peer) {
                state.monitors.push(peer.to_path_buf());
            }
            b"OK\n"
        }
        b"DETACH" => {
            let before = state.monitors.len();
            state.monitors.retain(|m| m != peer);
            if state.monitors.len() < before {
                b"OK\n"
            } else {
                b"FAIL\n"
            }
        }
        b"PING" => b"PONG\n",
        _ => b"UNKNOWN COMMAND\n",
    };
    vec![reply.to_vec()]
}
