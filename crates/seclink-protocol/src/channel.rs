//! Secure channel: framed messages over one authenticated stream.
//!
//! A channel is created by a completed handshake and so starts out
//! connected. [`SecureChannel::start`] spawns the read loop, which keeps at
//! most one read outstanding and re-arms only after the previous read has
//! been handled. Writers take an exclusive lock, so frames from concurrent
//! senders never interleave. The channel becomes disconnected exactly once,
//! either on request or when the read loop hits an error or end of stream.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, SystemTime};

use seclink_types::Endpoint;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::error::ProtocolError;
use crate::observer::ChannelObserver;
use crate::wire::WireProtocol;

/// Size of the buffer each read is issued with.
pub const RECEIVE_BUFFER_SIZE: usize = 4 * 1024;

/// Upper bound on the TLS close exchange while disconnecting.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommunicationState {
    /// Handshake in progress. Channels are never observed in this state;
    /// it belongs to the connector and listener.
    Connecting,
    Connected,
    /// Terminal.
    Disconnected,
}

impl CommunicationState {
    fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Connected => 1,
            Self::Disconnected => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for CommunicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Handle to one established connection. Cloning shares the connection.
pub struct SecureChannel<P: WireProtocol> {
    inner: Arc<ChannelInner<P>>,
}

struct ChannelInner<P: WireProtocol> {
    remote: Endpoint,
    state: AtomicU8,
    /// Cleared on disconnect; the read loop checks it before re-arming.
    running: AtomicBool,
    /// Wakes a read loop parked on a pending read.
    stop: Notify,
    /// Aborts a write in flight when the channel disconnects.
    closed: Notify,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    encoder: P,
    /// Read half and decoder, moved into the read loop by `start`.
    reader: Mutex<Option<(BoxedReader, P)>>,
    observer: OnceLock<Arc<dyn ChannelObserver<P::Message>>>,
    last_sent: Mutex<Option<SystemTime>>,
    last_received: Mutex<Option<SystemTime>>,
}

impl<P: WireProtocol> SecureChannel<P> {
    /// Wrap an authenticated stream. `protocol` must be unused; the channel
    /// keeps one copy for encoding and one for decoding.
    pub fn new<S>(stream: S, remote: Endpoint, protocol: P) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let decoder = protocol.clone();
        Self {
            inner: Arc::new(ChannelInner {
                remote,
                state: AtomicU8::new(CommunicationState::Connected.as_u8()),
                running: AtomicBool::new(false),
                stop: Notify::new(),
                closed: Notify::new(),
                writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
                encoder: protocol,
                reader: Mutex::new(Some((Box::new(reader), decoder))),
                observer: OnceLock::new(),
                last_sent: Mutex::new(None),
                last_received: Mutex::new(None),
            }),
        }
    }

    pub fn remote_endpoint(&self) -> Endpoint {
        self.inner.remote
    }

    pub fn state(&self) -> CommunicationState {
        self.inner.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == CommunicationState::Connected
    }

    pub fn last_sent_at(&self) -> Option<SystemTime> {
        *lock(&self.inner.last_sent)
    }

    pub fn last_received_at(&self) -> Option<SystemTime> {
        *lock(&self.inner.last_received)
    }

    /// Register `observer` and issue the first read.
    ///
    /// Valid once per channel, while connected. Must be called from within a
    /// tokio runtime.
    pub fn start<O>(&self, observer: O) -> Result<(), ProtocolError>
    where
        O: ChannelObserver<P::Message>,
    {
        if !self.is_connected() {
            return Err(ProtocolError::NotConnected);
        }
        let (reader, decoder) = lock(&self.inner.reader)
            .take()
            .ok_or(ProtocolError::AlreadyStarted)?;
        let _ = self.inner.observer.set(Arc::new(observer));
        self.inner.running.store(true, Ordering::Release);

        debug!(remote = %self.inner.remote, "channel started");
        tokio::spawn(read_loop(Arc::clone(&self.inner), reader, decoder));
        Ok(())
    }

    /// Encode and write one message.
    ///
    /// Concurrent callers wait for each other. A failed write is reported to
    /// the caller but leaves the channel connected; only the read side
    /// tears a channel down. A write still in flight when the channel
    /// disconnects is abandoned and fails with `SendFailed`.
    pub async fn send(&self, message: &P::Message) -> Result<(), ProtocolError> {
        let inner = &self.inner;
        let mut writer = inner.writer.lock().await;

        // Registered before the state check so a disconnect cannot slip
        // between the check and the write.
        let closed = inner.closed.notified();
        tokio::pin!(closed);
        closed.as_mut().enable();

        if !self.is_connected() {
            shutdown_writer(&mut writer).await;
            return Err(ProtocolError::NotConnected);
        }
        let Some(stream) = writer.as_mut() else {
            return Err(ProtocolError::NotConnected);
        };

        let bytes = inner.encoder.encode(message)?;
        let written = tokio::select! {
            biased;
            () = &mut closed => None,
            written = write_frame(stream, &bytes) => Some(written),
        };
        match written {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!(remote = %inner.remote, error = %e, "send failed");
                return Err(ProtocolError::SendFailed(e.to_string()));
            }
            None => {
                // The peer may not be draining; a close exchange could block.
                drop(writer.take());
                debug!(remote = %inner.remote, "send abandoned by disconnect");
                return Err(ProtocolError::SendFailed(
                    "channel disconnected during write".to_string(),
                ));
            }
        }
        trace!(remote = %inner.remote, len = bytes.len(), "sent message");

        *lock(&inner.last_sent) = Some(SystemTime::now());
        if let Some(observer) = inner.observer.get() {
            observer.on_message_sent(message);
        }

        // Disconnected mid-write: the disconnect left the writer to us.
        if !self.is_connected() {
            shutdown_writer(&mut writer).await;
        }
        Ok(())
    }

    /// Close the channel. Safe to call any number of times; only the first
    /// call has an effect.
    pub async fn disconnect(&self) {
        self.inner.disconnect().await;
    }
}

impl<P: WireProtocol> ChannelInner<P> {
    fn state(&self) -> CommunicationState {
        CommunicationState::from_u8(self.state.load(Ordering::Acquire))
    }

    async fn disconnect(&self) {
        if self
            .state
            .compare_exchange(
                CommunicationState::Connected.as_u8(),
                CommunicationState::Disconnected.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        self.running.store(false, Ordering::Release);
        self.stop.notify_one();
        self.closed.notify_waiters();

        // Never started: nobody else will drop the read half.
        drop(lock(&self.reader).take());
        // A send in flight holds the writer; it drops it once woken above.
        if let Ok(mut writer) = self.writer.try_lock() {
            shutdown_writer(&mut writer).await;
        }

        debug!(remote = %self.remote, "channel disconnected");
        if let Some(observer) = self.observer.get() {
            observer.on_disconnected();
        }
    }

    /// Handle one completed read.
    fn on_read(
        &self,
        read: io::Result<usize>,
        buffer: &[u8],
        decoder: &mut P,
    ) -> Result<(), ProtocolError> {
        let n = read?;
        if n == 0 {
            return Err(ProtocolError::Connection(
                "connection closed by peer".to_string(),
            ));
        }
        *lock(&self.last_received) = Some(SystemTime::now());

        let received = buffer[..n].to_vec();
        let messages = decoder.decode(&received)?;
        trace!(remote = %self.remote, bytes = n, messages = messages.len(), "received");

        if let Some(observer) = self.observer.get() {
            for message in messages {
                observer.on_message_received(message);
            }
        }
        Ok(())
    }
}

async fn read_loop<P: WireProtocol>(
    inner: Arc<ChannelInner<P>>,
    mut reader: BoxedReader,
    mut decoder: P,
) {
    let mut buffer = vec![0u8; RECEIVE_BUFFER_SIZE];
    loop {
        let read = tokio::select! {
            biased;
            () = inner.stop.notified() => return,
            read = reader.read(&mut buffer) => read,
        };
        if !inner.running.load(Ordering::Acquire) {
            return;
        }

        if let Err(e) = inner.on_read(read, &buffer, &mut decoder) {
            debug!(remote = %inner.remote, error = %e, "receive failed");
            inner.disconnect().await;
            return;
        }

        if !inner.running.load(Ordering::Acquire) {
            return;
        }
    }
}

async fn write_frame(stream: &mut BoxedWriter, bytes: &[u8]) -> io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}

/// Best-effort close; errors are irrelevant once the channel is going away.
async fn shutdown_writer(writer: &mut Option<BoxedWriter>) {
    if let Some(mut stream) = writer.take() {
        let _ = tokio::time::timeout(CLOSE_TIMEOUT, stream.shutdown()).await;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<P: WireProtocol> Clone for SecureChannel<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P: WireProtocol> fmt::Debug for SecureChannel<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannel")
            .field("remote", &self.inner.remote)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::atomic::AtomicUsize;
    use std::task::{Context, Poll};

    use seclink_types::Message;
    use tokio::io::{DuplexStream, ReadBuf};
    use tokio::sync::mpsc;

    use super::*;
    use crate::observer::ChannelEvent;
    use crate::wire::BincodeWireProtocol;

    type Protocol = BincodeWireProtocol<Message>;

    fn remote() -> Endpoint {
        "127.0.0.1:10085".parse().unwrap()
    }

    fn channel_pair(buffer: usize) -> (SecureChannel<Protocol>, DuplexStream) {
        let (local, peer) = tokio::io::duplex(buffer);
        (SecureChannel::new(local, remote(), Protocol::new()), peer)
    }

    fn observe() -> (
        mpsc::UnboundedSender<ChannelEvent<Message>>,
        mpsc::UnboundedReceiver<ChannelEvent<Message>>,
    ) {
        mpsc::unbounded_channel()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ChannelEvent<Message>>) -> Vec<ChannelEvent<Message>> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    async fn next_event(
        rx: &mut mpsc::UnboundedReceiver<ChannelEvent<Message>>,
    ) -> ChannelEvent<Message> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("observer dropped")
    }

    #[tokio::test]
    async fn starts_connected() {
        let (channel, _peer) = channel_pair(1024);
        assert_eq!(channel.state(), CommunicationState::Connected);
        assert!(channel.last_sent_at().is_none());
        assert!(channel.last_received_at().is_none());
        assert_eq!(channel.remote_endpoint(), remote());
    }

    #[tokio::test]
    async fn received_frames_are_delivered_in_order() {
        let (channel, mut peer) = channel_pair(64 * 1024);
        let (tx, mut rx) = observe();
        channel.start(tx).unwrap();

        let protocol = Protocol::new();
        let sent: Vec<Message> = (0..5).map(|i| Message::text(format!("m{i}"))).collect();
        let mut bytes = Vec::new();
        for msg in &sent {
            bytes.extend(protocol.encode(msg).unwrap());
        }
        // Split mid-frame to exercise reassembly across reads.
        let (head, tail) = bytes.split_at(bytes.len() / 2 + 1);
        peer.write_all(head).await.unwrap();
        peer.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        peer.write_all(tail).await.unwrap();

        for expected in sent {
            assert_eq!(next_event(&mut rx).await, ChannelEvent::MessageReceived(expected));
        }
        assert!(channel.last_received_at().is_some());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (channel, _peer) = channel_pair(1024);
        let (tx, mut rx) = observe();
        channel.start(tx).unwrap();

        for _ in 0..4 {
            channel.disconnect().await;
        }
        assert_eq!(channel.state(), CommunicationState::Disconnected);
        assert_eq!(drain(&mut rx), vec![ChannelEvent::Disconnected]);
    }

    #[tokio::test]
    async fn disconnect_from_many_tasks_notifies_once() {
        let (channel, _peer) = channel_pair(1024);
        let (tx, mut rx) = observe();
        channel.start(tx).unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let channel = channel.clone();
                tokio::spawn(async move { channel.disconnect().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(drain(&mut rx), vec![ChannelEvent::Disconnected]);
    }

    #[tokio::test]
    async fn peer_close_disconnects_once() {
        let (channel, peer) = channel_pair(1024);
        let (tx, mut rx) = observe();
        channel.start(tx).unwrap();

        drop(peer);
        assert_eq!(next_event(&mut rx).await, ChannelEvent::Disconnected);
        assert_eq!(channel.state(), CommunicationState::Disconnected);

        channel.disconnect().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn undecodable_input_disconnects() {
        let (channel, mut peer) = channel_pair(1024);
        let (tx, mut rx) = observe();
        channel.start(tx).unwrap();

        peer.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        assert_eq!(next_event(&mut rx).await, ChannelEvent::Disconnected);
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let (channel, _peer) = channel_pair(1024);
        let (tx, _rx) = observe();
        channel.start(tx.clone()).unwrap();
        assert!(matches!(channel.start(tx), Err(ProtocolError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn disconnected_channel_refuses_start_and_send() {
        let (channel, _peer) = channel_pair(1024);
        channel.disconnect().await;

        let (tx, _rx) = observe();
        assert!(matches!(channel.start(tx), Err(ProtocolError::NotConnected)));
        assert!(matches!(
            channel.send(&Message::ping()).await,
            Err(ProtocolError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn send_writes_one_frame_and_notifies() {
        let (channel, mut peer) = channel_pair(64 * 1024);
        let (tx, mut rx) = observe();
        channel.start(tx).unwrap();

        let msg = Message::text("hello");
        channel.send(&msg).await.unwrap();
        assert_eq!(next_event(&mut rx).await, ChannelEvent::MessageSent(msg.clone()));
        assert!(channel.last_sent_at().is_some());

        let mut buf = vec![0u8; 1024];
        let n = peer.read(&mut buf).await.unwrap();
        let decoded = Protocol::new().decode(&buf[..n]).unwrap();
        assert_eq!(decoded, vec![msg]);
    }

    #[tokio::test]
    async fn concurrent_sends_do_not_interleave() {
        const SENDERS: u8 = 8;
        const PAYLOAD: usize = 16 * 1024;

        // Small pipe so every write is split into many partial writes.
        let (channel, mut peer) = channel_pair(512);

        let senders: Vec<_> = (0..SENDERS)
            .map(|i| {
                let channel = channel.clone();
                tokio::spawn(async move {
                    channel.send(&Message::raw(vec![i; PAYLOAD])).await.unwrap();
                })
            })
            .collect();

        let mut decoder = Protocol::new();
        let mut received = Vec::new();
        let mut buf = vec![0u8; 4096];
        while received.len() < usize::from(SENDERS) {
            let n = tokio::time::timeout(Duration::from_secs(5), peer.read(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_ne!(n, 0);
            received.extend(decoder.decode(&buf[..n]).unwrap());
        }
        for sender in senders {
            sender.await.unwrap();
        }

        let mut seen: Vec<u8> = received
            .iter()
            .map(|msg| match &msg.body {
                seclink_types::MessageBody::RawData(data) => {
                    assert_eq!(data.len(), PAYLOAD);
                    assert!(data.iter().all(|b| *b == data[0]), "frame interleaved");
                    data[0]
                }
                other => panic!("unexpected body {other:?}"),
            })
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..SENDERS).collect::<Vec<_>>());
    }

    /// Stream whose writes always fail and whose reads never complete.
    struct BrokenPipe;

    impl AsyncRead for BrokenPipe {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Pending
        }
    }

    impl AsyncWrite for BrokenPipe {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn send_failure_leaves_channel_connected() {
        let channel = SecureChannel::new(BrokenPipe, remote(), Protocol::new());
        let (tx, mut rx) = observe();
        channel.start(tx).unwrap();

        let err = channel.send(&Message::text("lost")).await.unwrap_err();
        assert!(matches!(err, ProtocolError::SendFailed(_)));
        assert!(err.to_string().starts_with("message could not be sent"));

        // Receive failures disconnect; send failures deliberately do not.
        assert_eq!(channel.state(), CommunicationState::Connected);
        assert!(channel.last_sent_at().is_none());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn disconnect_aborts_blocked_send_and_closes_stream() {
        const PAYLOAD: usize = 16 * 1024;

        // The peer never reads, so the write stalls once the pipe is full.
        let (channel, mut peer) = channel_pair(64);
        let sender = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.send(&Message::raw(vec![7u8; PAYLOAD])).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sender.is_finished());

        channel.disconnect().await;
        assert_eq!(channel.state(), CommunicationState::Disconnected);

        let result = tokio::time::timeout(Duration::from_secs(2), sender)
            .await
            .expect("send still blocked after disconnect")
            .unwrap();
        assert!(matches!(result, Err(ProtocolError::SendFailed(_))), "{result:?}");

        // Both halves are released: the peer sees end of stream after the
        // bytes already in the pipe.
        let mut drained = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), peer.read_to_end(&mut drained))
            .await
            .expect("stream left open after disconnect")
            .unwrap();
        assert!(drained.len() < PAYLOAD);

        assert!(matches!(
            channel.send(&Message::ping()).await,
            Err(ProtocolError::NotConnected)
        ));
    }

    #[derive(Default)]
    struct ReadStats {
        issued: AtomicUsize,
        completed: AtomicUsize,
        max_outstanding: AtomicUsize,
    }

    /// Counts reads the way the channel issues them: a read is outstanding
    /// from its first poll until it returns `Ready`.
    struct CountingStream {
        inner: DuplexStream,
        in_flight: bool,
        stats: Arc<ReadStats>,
    }

    impl AsyncRead for CountingStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if !self.in_flight {
                self.in_flight = true;
                let issued = self.stats.issued.fetch_add(1, Ordering::SeqCst) + 1;
                let outstanding = issued - self.stats.completed.load(Ordering::SeqCst);
                self.stats
                    .max_outstanding
                    .fetch_max(outstanding, Ordering::SeqCst);
            }
            let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
            if poll.is_ready() {
                self.in_flight = false;
                self.stats.completed.fetch_add(1, Ordering::SeqCst);
            }
            poll
        }
    }

    impl AsyncWrite for CountingStream {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    #[tokio::test]
    async fn at_most_one_read_outstanding() {
        let (local, mut peer) = tokio::io::duplex(64 * 1024);
        let stats = Arc::new(ReadStats::default());
        let stream = CountingStream {
            inner: local,
            in_flight: false,
            stats: Arc::clone(&stats),
        };
        let channel = SecureChannel::new(stream, remote(), Protocol::new());
        let (tx, mut rx) = observe();
        channel.start(tx).unwrap();

        let protocol = Protocol::new();
        for i in 0..20 {
            peer.write_all(&protocol.encode(&Message::text(format!("{i}"))).unwrap())
                .await
                .unwrap();
        }
        for _ in 0..20 {
            assert!(matches!(
                next_event(&mut rx).await,
                ChannelEvent::MessageReceived(_)
            ));
        }
        assert_eq!(stats.max_outstanding.load(Ordering::SeqCst), 1);

        channel.disconnect().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let issued = stats.issued.load(Ordering::SeqCst);
        let _ = peer
            .write_all(&protocol.encode(&Message::ping()).unwrap())
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stats.issued.load(Ordering::SeqCst), issued);
        assert_eq!(drain(&mut rx), vec![ChannelEvent::Disconnected]);
    }

    #[test]
    fn state_display() {
        assert_eq!(CommunicationState::Connected.to_string(), "Connected");
        assert_eq!(
            CommunicationState::from_u8(CommunicationState::Disconnected.as_u8()),
            CommunicationState::Disconnected
        );
    }
}
