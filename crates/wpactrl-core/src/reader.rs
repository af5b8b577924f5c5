//! Socket reader task.
//!
//! A single task owns the datagram socket. Replies and unsolicited events
//! share that socket, so every incoming datagram is routed here: events go
//! to the `recv` queue and to broadcast subscribers, anything else answers
//! the outstanding request. Public operations talk to the task through
//! [`Command`]s with oneshot replies.
//!
//! Before a command is handled the task drains everything the kernel has
//! already queued, so a datagram that arrived before a request was sent is
//! never taken as that request's reply.

use std::collections::VecDeque;
use std::io;
use std::os::unix::net::UnixDatagram as StdUnixDatagram;

use tokio::net::UnixDatagram;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::event::{self, Event};

pub(crate) type Reply<T> = oneshot::Sender<io::Result<T>>;

/// Work submitted by the connection handle.
#[derive(Debug)]
pub(crate) enum Command {
    /// Send a datagram and answer with the next non-event datagram.
    Request { payload: Vec<u8>, reply: Reply<Vec<u8>> },
    /// Report whether an unsolicited message is ready for `Recv`.
    Pending { reply: Reply<bool> },
    /// Hand over the next unsolicited message, waiting if none is queued.
    Recv { reply: Reply<Vec<u8>> },
}

/// Buffer limits applied per message class.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub max_reply: usize,
    pub max_event: usize,
    pub queue_capacity: usize,
}

pub(crate) struct Reader {
    socket: UnixDatagram,
    /// Non-blocking clone of `socket` used to drain without waiting on
    /// reactor readiness.
    probe: StdUnixDatagram,
    commands: mpsc::Receiver<Command>,
    events: broadcast::Sender<Event>,
    limits: Limits,
    buf: Vec<u8>,
    awaiting_reply: Option<Reply<Vec<u8>>>,
    awaiting_recv: Option<Reply<Vec<u8>>>,
    queue: VecDeque<Vec<u8>>,
    broken: Option<io::ErrorKind>,
}

impl Reader {
    /// `socket` must already be connected and in non-blocking mode.
    pub(crate) fn new(
        socket: StdUnixDatagram,
        commands: mpsc::Receiver<Command>,
        events: broadcast::Sender<Event>,
        limits: Limits,
    ) -> io::Result<Self> {
        let probe = socket.try_clone()?;
        let socket = UnixDatagram::from_std(socket)?;
        let buf = vec![0; limits.max_reply.max(limits.max_event)];
        Ok(Self {
            socket,
            probe,
            commands,
            events,
            limits,
            buf,
            awaiting_reply: None,
            awaiting_recv: None,
            queue: VecDeque::new(),
            broken: None,
        })
    }

    /// Run until the connection handle drops its command sender.
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                received = self.socket.recv(&mut self.buf), if self.broken.is_none() => {
                    match received {
                        Ok(len) => self.route(len),
                        Err(e) => self.fail(e),
                    }
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }
        debug!(queued = self.queue.len(), "control socket reader stopped");
    }

    async fn handle(&mut self, command: Command) {
        if self.broken.is_none() {
            if let Err(e) = self.drain() {
                self.fail(e);
            }
        }

        match command {
            Command::Request { payload, reply } => {
                if let Some(kind) = self.broken {
                    let _ = reply.send(Err(io::Error::from(kind)));
                    return;
                }
                match self.socket.send(&payload).await {
                    Ok(_) => {
                        // the previous waiter, if any, already timed out
                        self.awaiting_reply = Some(reply);
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::Pending { reply } => {
                let result = match self.broken {
                    _ if !self.queue.is_empty() => Ok(true),
                    Some(kind) => Err(io::Error::from(kind)),
                    None => Ok(false),
                };
                let _ = reply.send(result);
            }
            Command::Recv { reply } => {
                if let Some(message) = self.queue.pop_front() {
                    let _ = reply.send(Ok(message));
                } else if let Some(kind) = self.broken {
                    let _ = reply.send(Err(io::Error::from(kind)));
                } else {
                    self.awaiting_recv = Some(reply);
                }
            }
        }
    }

    /// Route every datagram the kernel has queued right now.
    fn drain(&mut self) -> io::Result<()> {
        loop {
            match self.probe.recv(&mut self.buf) {
                Ok(len) => self.route(len),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Classify the datagram held in the first `len` bytes of `buf`.
    fn route(&mut self, len: usize) {
        let datagram = &self.buf[..len];

        if event::is_event(datagram) {
            let message = truncate(datagram, self.limits.max_event);
            debug!(len, "event received");
            let _ = self.events.send(Event::parse(message.clone()));
            self.deliver(message);
            return;
        }

        match self.awaiting_reply.take() {
            Some(waiter) if !waiter.is_closed() => {
                debug!(len, "reply received");
                let reply = truncate(datagram, self.limits.max_reply);
                if waiter.send(Ok(reply)).is_err() {
                    debug!("request abandoned before its reply was delivered");
                }
            }
            _ => {
                // late reply to a timed-out request, or a stray message
                debug!(len, "unsolicited non-event datagram queued");
                let message = truncate(datagram, self.limits.max_event);
                self.deliver(message);
            }
        }
    }

    fn deliver(&mut self, message: Vec<u8>) {
        let message = match self.awaiting_recv.take() {
            Some(waiter) => match waiter.send(Ok(message)) {
                Ok(()) => return,
                Err(Ok(message)) => message,
                Err(Err(_)) => return,
            },
            None => message,
        };

        if self.queue.len() >= self.limits.queue_capacity {
            warn!(
                capacity = self.limits.queue_capacity,
                "event queue full, dropping oldest message"
            );
            self.queue.pop_front();
        }
        self.queue.push_back(message);
    }

    /// Fail whoever is waiting and stop reading from the socket.
    fn fail(&mut self, error: io::Error) {
        warn!(error = %error, "control socket receive failed");
        let kind = error.kind();
        self.broken = Some(kind);
        if let Some(waiter) = self.awaiting_reply.take() {
            let _ = waiter.send(Err(error));
        }
        if let Some(waiter) = self.awaiting_recv.take() {
            let _ = waiter.send(Err(io::Error::from(kind)));
        }
    }
}

/// Copy at most `max` bytes; longer datagrams are silently cut.
pub(crate) fn truncate(datagram: &[u8], max: usize) -> Vec<u8> {
    datagram[..datagram.len().min(max)].to_vec()
}
