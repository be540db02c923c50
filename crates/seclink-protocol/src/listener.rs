//! Inbound connections: accept loop with TLS handshakes and bind recovery.
//!
//! The accept loop runs on one task per started listener. Each accepted
//! socket is handshaken on its own task, bounded by a timeout, and the
//! resulting channel is handed to the [`ConnectionObserver`]. When accepting
//! fails the listening socket is closed and, after a backoff, bound again.
//! Stopping wakes the loop wherever it waits and always wins over a rebind.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use seclink_types::Endpoint;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::channel::SecureChannel;
use crate::error::ProtocolError;
use crate::observer::ConnectionObserver;
use crate::tls::{self, ServerIdentity};
use crate::wire::WireProtocol;

/// A bound listening socket.
#[async_trait]
pub trait ListenSocket: Send {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Creates listening sockets. The listener calls it for the initial bind and
/// for every rebind after an accept failure.
#[async_trait]
pub trait SocketBinder: Send + Sync + 'static {
    async fn bind(&self, addr: SocketAddr) -> io::Result<Box<dyn ListenSocket>>;
}

/// Binds real tokio TCP listeners.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpBinder;

#[async_trait]
impl SocketBinder for TcpBinder {
    async fn bind(&self, addr: SocketAddr) -> io::Result<Box<dyn ListenSocket>> {
        Ok(Box::new(TcpListener::bind(addr).await?))
    }
}

#[async_trait]
impl ListenSocket for TcpListener {
    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerOptions {
    /// Pause between an accept failure and the rebind attempt.
    pub backoff: Duration,
    /// Upper bound for one server-side TLS handshake.
    pub handshake_timeout: Duration,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

/// Accepts TLS connections on an endpoint and reports each one as a
/// [`SecureChannel`].
pub struct ConnectionListener<P: WireProtocol> {
    endpoint: Endpoint,
    acceptor: TlsAcceptor,
    protocol: P,
    options: ListenerOptions,
    binder: Arc<dyn SocketBinder>,
    observer: Arc<dyn ConnectionObserver<P>>,
    /// Control block of the current accept loop, if started.
    current: Mutex<Option<Arc<LoopControl>>>,
    /// Serialises start and stop; holds the accept loop task.
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

struct LoopControl {
    running: AtomicBool,
    stop: Notify,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl LoopControl {
    fn new(local_addr: Option<SocketAddr>) -> Self {
        Self {
            running: AtomicBool::new(true),
            stop: Notify::new(),
            local_addr: Mutex::new(local_addr),
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.stop.notify_one();
    }

    fn set_local_addr(&self, addr: Option<SocketAddr>) {
        *lock(&self.local_addr) = addr;
    }
}

impl<P: WireProtocol> ConnectionListener<P> {
    /// `protocol` is the prototype cloned for every accepted connection.
    pub fn new<O>(
        endpoint: Endpoint,
        identity: ServerIdentity,
        protocol: P,
        observer: O,
    ) -> Result<Self, ProtocolError>
    where
        O: ConnectionObserver<P>,
    {
        Ok(Self {
            endpoint,
            acceptor: TlsAcceptor::from(tls::server_config(identity)?),
            protocol,
            options: ListenerOptions::default(),
            binder: Arc::new(TcpBinder),
            observer: Arc::new(observer),
            current: Mutex::new(None),
            task: tokio::sync::Mutex::new(None),
        })
    }

    #[must_use]
    pub fn with_options(mut self, options: ListenerOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_binder<B: SocketBinder>(mut self, binder: B) -> Self {
        self.binder = Arc::new(binder);
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn is_running(&self) -> bool {
        lock(&self.current)
            .as_ref()
            .is_some_and(|control| control.is_running())
    }

    /// Address currently bound. `None` when stopped or while recovering.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.current)
            .as_ref()
            .and_then(|control| *lock(&control.local_addr))
    }

    /// Bind the endpoint and spawn the accept loop.
    ///
    /// The initial bind failure is returned; later failures are handled by
    /// the loop itself.
    pub async fn start(&self) -> Result<(), ProtocolError> {
        let mut task = self.task.lock().await;
        if self.is_running() {
            return Err(ProtocolError::AlreadyRunning);
        }
        if let Some(previous) = task.take() {
            let _ = previous.await;
        }

        let addr = self.endpoint.bind_addr();
        let socket = self
            .binder
            .bind(addr)
            .await
            .map_err(|e| ProtocolError::Bind(format!("{addr}: {e}")))?;
        let local = socket.local_addr().ok();
        info!(endpoint = %self.endpoint, local = ?local, "listener bound");

        let control = Arc::new(LoopControl::new(local));
        *lock(&self.current) = Some(Arc::clone(&control));

        let accept_loop = AcceptLoop {
            control,
            bind_addr: addr,
            binder: Arc::clone(&self.binder),
            acceptor: self.acceptor.clone(),
            protocol: self.protocol.clone(),
            observer: Arc::clone(&self.observer),
            options: self.options,
        };
        *task = Some(tokio::spawn(accept_loop.run(socket)));
        Ok(())
    }

    /// Stop accepting and close the listening socket. Waits for the accept
    /// loop to exit. Calling it on a stopped listener does nothing.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        if let Some(control) = lock(&self.current).take() {
            control.stop();
        }
        if let Some(handle) = task.take() {
            let _ = handle.await;
        }
    }
}

impl<P: WireProtocol> Drop for ConnectionListener<P> {
    fn drop(&mut self) {
        if let Some(control) = lock(&self.current).take() {
            control.stop();
        }
    }
}

struct AcceptLoop<P: WireProtocol> {
    control: Arc<LoopControl>,
    bind_addr: SocketAddr,
    binder: Arc<dyn SocketBinder>,
    acceptor: TlsAcceptor,
    protocol: P,
    observer: Arc<dyn ConnectionObserver<P>>,
    options: ListenerOptions,
}

impl<P: WireProtocol> AcceptLoop<P> {
    async fn run(self, socket: Box<dyn ListenSocket>) {
        let mut socket = Some(socket);
        while self.control.is_running() {
            let Some(listener) = socket.as_mut() else {
                socket = self.recover().await;
                continue;
            };

            let accepted = tokio::select! {
                biased;
                () = self.control.stop.notified() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((tcp, peer)) => self.spawn_handshake(tcp, peer),
                Err(e) => {
                    warn!(addr = %self.bind_addr, error = %e, "accept failed, closing listening socket");
                    socket = None;
                    self.control.set_local_addr(None);
                }
            }
        }
        drop(socket);
        info!(addr = %self.bind_addr, "listener stopped");
    }

    /// Sleep the backoff, then try to bind again. `None` keeps the loop in
    /// recovery.
    async fn recover(&self) -> Option<Box<dyn ListenSocket>> {
        tokio::select! {
            biased;
            () = self.control.stop.notified() => return None,
            () = tokio::time::sleep(self.options.backoff) => {}
        }
        if !self.control.is_running() {
            return None;
        }

        match self.binder.bind(self.bind_addr).await {
            Ok(socket) => {
                let local = socket.local_addr().ok();
                self.control.set_local_addr(local);
                info!(addr = %self.bind_addr, local = ?local, "listener rebound");
                Some(socket)
            }
            Err(e) => {
                warn!(addr = %self.bind_addr, error = %e, "rebind failed");
                None
            }
        }
    }

    fn spawn_handshake(&self, tcp: TcpStream, peer: SocketAddr) {
        let acceptor = self.acceptor.clone();
        let protocol = self.protocol.clone();
        let observer = Arc::clone(&self.observer);
        let control = Arc::clone(&self.control);
        let timeout = self.options.handshake_timeout;

        tokio::spawn(async move {
            if let Err(e) = tcp.set_nodelay(true) {
                debug!(peer = %peer, error = %e, "failed to set TCP_NODELAY");
            }
            let stream = match tokio::time::timeout(timeout, acceptor.accept(tcp)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    debug!(peer = %peer, error = %e, "server handshake failed");
                    return;
                }
                Err(_) => {
                    debug!(peer = %peer, "server handshake timed out");
                    return;
                }
            };
            if !control.is_running() {
                debug!(peer = %peer, "listener stopped during handshake");
                return;
            }
            debug!(peer = %peer, "accepted secure channel");
            observer.on_channel_connected(SecureChannel::new(stream, Endpoint::from(peer), protocol));
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
