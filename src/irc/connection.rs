use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Notify, mpsc};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, warn};

use crate::state::Caps;

use super::codec::{CodecError, IrcCodec, MessageParser};
use super::handler::Handler;
use super::parser::{CMD_PING, CMD_PONG, CMD_QUIT, IrcMessage};

/// Liveness settings for one connection.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// Gateway identity, sent as the PING trailing text.
    pub name: String,
    pub ping_frequency: Duration,
    /// How long to wait for a PONG. Also the read deadline for the parser.
    pub pong_max_latency: Duration,
}

/// Cloneable handle used by handlers and other connections to reach one
/// connection's loops.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    outbox: mpsc::Sender<IrcMessage>,
    inject: mpsc::Sender<IrcMessage>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Queue a message for the write loop. Waits until the loop accepts it;
    /// dropped once the connection has been killed.
    ///
    /// Must not be called from the write loop itself.
    pub async fn send(&self, msg: IrcMessage) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => debug!("send after kill dropped"),
            res = self.outbox.send(msg) => {
                if res.is_err() {
                    debug!("write loop gone, message dropped");
                }
            }
        }
    }

    /// Place a synthetic message on the read loop's inject queue. Injected
    /// messages are handled ahead of wire input.
    pub async fn inject(&self, msg: IrcMessage) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => debug!("inject after kill dropped"),
            res = self.inject.send(msg) => {
                if res.is_err() {
                    debug!("read loop gone, injected message dropped");
                }
            }
        }
    }

    /// Queue a message without waiting. Returns false when the outbox is
    /// full or the connection has been killed.
    pub fn try_send(&self, msg: IrcMessage) -> bool {
        !self.is_killed() && self.outbox.try_send(msg).is_ok()
    }

    /// Non-blocking [`inject`](Self::inject).
    pub fn try_inject(&self, msg: IrcMessage) -> bool {
        !self.is_killed() && self.inject.try_send(msg).is_ok()
    }

    /// Stop all three loops. Safe to call any number of times.
    pub fn kill(&self) {
        self.cancel.cancel();
    }

    pub fn is_killed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        outbox: mpsc::Sender<IrcMessage>,
        inject: mpsc::Sender<IrcMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            outbox,
            inject,
            cancel,
        }
    }
}

/// A user's outbound sink: the connection's `send`, filtered by the
/// capabilities the user negotiated.
#[derive(Debug, Clone)]
pub struct MessageSink {
    conn: ConnectionHandle,
    caps: Caps,
}

impl MessageSink {
    pub fn new(conn: ConnectionHandle, caps: Caps) -> Self {
        Self { conn, caps }
    }

    pub async fn send(&self, msg: IrcMessage) {
        let msg = if self.caps.contains(Caps::MESSAGE_TAGS) {
            msg
        } else {
            msg.without_tags()
        };
        self.conn.send(msg).await;
    }
}

/// One client connection: a stream plus the read, write and ping loops that
/// drive it.
pub struct Connection<S> {
    stream: S,
    handler: Handler,
    config: Arc<LivenessConfig>,
    handle: ConnectionHandle,
    outbox_rx: mpsc::Receiver<IrcMessage>,
    inject_rx: mpsc::Receiver<IrcMessage>,
    pong: Arc<Notify>,
    span: Span,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// `span` is the observability context every loop logs under.
    pub fn new(stream: S, config: Arc<LivenessConfig>, handler: Handler, span: Span) -> Self {
        let (outbox, outbox_rx) = mpsc::channel(1);
        let (inject, inject_rx) = mpsc::channel(1);
        Self {
            stream,
            handler,
            config,
            handle: ConnectionHandle {
                outbox,
                inject,
                cancel: CancellationToken::new(),
            },
            outbox_rx,
            inject_rx,
            pong: Arc::new(Notify::new()),
            span,
        }
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Start the read and write loops and run the ping loop on the caller.
    ///
    /// Returns once the connection has been killed and all three loops have
    /// exited, by which point the stream is closed.
    pub async fn run(self) {
        let Connection {
            stream,
            handler,
            config,
            handle,
            outbox_rx,
            inject_rx,
            pong,
            span,
        } = self;

        let (reader, writer) = tokio::io::split(stream);

        let write_task = tokio::spawn(
            write_loop(writer, outbox_rx, handle.cancel.clone()).instrument(span.clone()),
        );

        let read_task = tokio::spawn(
            ReadLoop {
                parser: MessageParser::new(reader),
                handler,
                handle: handle.clone(),
                inject_rx,
                pong: pong.clone(),
                read_timeout: config.pong_max_latency,
            }
            .run()
            .instrument(span.clone()),
        );

        ping_loop(handle, pong, config).instrument(span.clone()).await;

        if let Err(e) = read_task.await {
            warn!(parent: &span, error = %e, "read loop panicked");
        }
        if let Err(e) = write_task.await {
            warn!(parent: &span, error = %e, "write loop panicked");
        }
        debug!(parent: &span, "connection closed");
    }
}

struct ReadLoop<R> {
    parser: MessageParser<R>,
    handler: Handler,
    handle: ConnectionHandle,
    inject_rx: mpsc::Receiver<IrcMessage>,
    pong: Arc<Notify>,
    read_timeout: Duration,
}

impl<R: AsyncRead + Unpin> ReadLoop<R> {
    async fn run(self) {
        let ReadLoop {
            mut parser,
            mut handler,
            handle,
            mut inject_rx,
            pong,
            read_timeout,
        } = self;
        let mut did_quit = false;

        loop {
            tokio::select! {
                biased;
                _ = handle.cancel.cancelled() => break,
                Some(msg) = inject_rx.recv() => {
                    debug!(?msg, "inject");
                    did_quit |= msg.is(CMD_QUIT);
                    handler = handler.handle(&handle, msg).await;
                }
                next = time::timeout(read_timeout, parser.next_message()) => {
                    let msg = match next {
                        // Deadline passed with nothing to read.
                        Err(_) => continue,
                        Ok(None) => break,
                        Ok(Some(msg)) if msg.is_empty() => continue,
                        Ok(Some(msg)) => msg,
                    };

                    debug!(?msg, "recv");

                    if msg.is(CMD_PONG) {
                        pong.notify_one();
                    }

                    did_quit |= msg.is(CMD_QUIT);
                    handler = handler.handle(&handle, msg).await;
                }
            }
        }

        // Closes our half of the stream.
        drop(parser);

        if !did_quit {
            debug!(
                nick = handler.nick(),
                "injecting QUIT for prematurely disconnected client"
            );
            let quit = IrcMessage::new(CMD_QUIT).with_trailing("QUITing");
            handler = handler.handle(&handle, quit).await;
        }

        if !handler.is_null() {
            handler.closed(&handle).await;
        }

        handle.kill();
        debug!("closing read loop");
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(
    writer: W,
    mut outbox: mpsc::Receiver<IrcMessage>,
    cancel: CancellationToken,
) {
    let mut frames = FramedWrite::new(writer, IrcCodec::default());

    loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            msg = outbox.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        debug!(?msg, "send");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            res = frames.send(msg) => match res {
                Ok(()) => {}
                Err(CodecError::Unrepresentable) => debug!("dropping unrepresentable message"),
                // Not fatal: the connection may still recover.
                Err(e) => warn!(error = %e, "error sending message to client"),
            },
        }
    }

    debug!("closing write loop");
    let mut writer = frames.into_inner();
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "shutdown after close");
    }
}

/// Never waits on the peer: a PING that does not fit in the outbox counts
/// as unanswered. A client that times out is sent QUIT through the inject
/// queue, and killed if it has not gone one more latency period later.
async fn ping_loop(handle: ConnectionHandle, pong: Arc<Notify>, config: Arc<LivenessConfig>) {
    let mut ticker = time::interval_at(
        Instant::now() + config.ping_frequency,
        config.ping_frequency,
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pong_deadline: Option<Instant> = None;
    let mut kill_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => break,
            _ = sleep_until(kill_deadline) => {
                warn!("timed out client still connected, killing");
                handle.kill();
                break;
            }
            _ = pong.notified() => pong_deadline = None,
            _ = sleep_until(pong_deadline) => {
                pong_deadline = None;
                debug!("pong timeout");
                if !handle.try_inject(IrcMessage::new(CMD_QUIT).with_trailing("Timed out")) {
                    debug!("inject queue full, waiting for kill deadline");
                }
                kill_deadline.get_or_insert(Instant::now() + config.pong_max_latency);
            }
            _ = ticker.tick() => {
                if !handle.try_send(IrcMessage::new(CMD_PING).with_trailing(config.name.clone())) {
                    debug!("outbox full, PING skipped");
                }
                pong_deadline.get_or_insert(Instant::now() + config.pong_max_latency);
            }
        }
    }

    debug!("closing ping loop");
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
