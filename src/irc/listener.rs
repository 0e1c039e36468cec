use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use crate::state::SharedState;

use super::connection::{Connection, LivenessConfig};
use super::handler::Handler;
use super::parser::{CMD_QUIT, IrcMessage};

/// How long a connection gets to act on the shutdown QUIT before it is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Start the IRC TCP listener. Accepts connections and spawns a task per
/// connection until `cancel` fires, then waits for every connection to close.
pub async fn start_irc_listener(
    bind_addr: &str,
    config: Arc<LivenessConfig>,
    state: SharedState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;

    let connections = TaskTracker::new();

    info!("IRC listener started on {}", bind_addr);

    loop {
        let accepted = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, addr)) => {
                let id = Uuid::new_v4();
                let span = info_span!("connection", %id, peer = %addr);
                span.in_scope(|| info!("IRC client connected"));

                let conn = Connection::new(
                    stream,
                    config.clone(),
                    Handler::fresh(state.clone()),
                    span.clone(),
                );
                let shutdown = cancel.clone();
                connections.spawn(async move {
                    serve_connection(conn, shutdown, SHUTDOWN_GRACE).await;
                    span.in_scope(|| info!("IRC client disconnected"));
                });
            }
            Err(e) => {
                error!(error = %e, "failed to accept IRC connection");
            }
        }
    }

    connections.close();
    info!(open = connections.len(), "IRC listener stopped, draining connections");
    connections.wait().await;
    Ok(())
}

/// Drive one connection to completion. Once `shutdown` fires the client is
/// sent QUIT through the inject queue; if it is still up after `grace` (for
/// example because the peer stopped reading) it is killed.
async fn serve_connection<S>(conn: Connection<S>, shutdown: CancellationToken, grace: Duration)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let handle = conn.handle();
    let run = conn.run();
    tokio::pin!(run);

    tokio::select! {
        _ = &mut run => return,
        _ = shutdown.cancelled() => {}
    }

    let quit = IrcMessage::new(CMD_QUIT).with_trailing("Gateway shutting down");
    let drained = time::timeout(grace, async {
        handle.inject(quit).await;
        (&mut run).await;
    })
    .await;

    if drained.is_err() {
        warn!("connection did not close after shutdown QUIT, killing");
        handle.kill();
        run.await;
    }
}
