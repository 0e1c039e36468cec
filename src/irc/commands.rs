use std::time::Duration;

use tokio::time;
use tracing::{debug, warn};

use crate::state::SharedState;

use super::connection::{ConnectionHandle, MessageSink};
use super::formatter;
use super::handler::{Handler, send_all};
use super::parser::{
    CMD_CAP, CMD_NICK, CMD_PASS, CMD_PING, CMD_PONG, CMD_PRIVMSG, CMD_QUIT, CMD_USER, IrcMessage,
};

/// How long a PRIVMSG waits on the recipient's outbox before it is dropped.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Handler for a fully registered user.
pub struct Active {
    state: SharedState,
    nick: String,
}

impl Active {
    pub fn new(state: SharedState, nick: String) -> Self {
        Self { state, nick }
    }

    pub(crate) fn nick(&self) -> &str {
        &self.nick
    }

    pub(super) async fn handle(self, conn: &ConnectionHandle, msg: IrcMessage) -> Handler {
        if msg.is(CMD_QUIT) {
            self.state.lock().await.remove_user(&self.nick);
            conn.kill();
            return Handler::Null;
        }

        let (replies, delivery) = {
            let state = self.state.lock().await;
            let server = state.server_name();
            let nick = self.nick.as_str();

            match msg.command.as_str() {
                CMD_PRIVMSG => {
                    let target = msg.params.first();
                    let text = msg.lax_trailing(1);
                    match target {
                        Some(target) if !text.is_empty() => {
                            match state.user(target).and_then(|u| u.sink()) {
                                Some(sink) => {
                                    let mut out = formatter::privmsg(server, nick, target, text);
                                    out.tags = msg.tags.clone();
                                    (vec![], Some((sink.clone(), out)))
                                }
                                None => (vec![formatter::err_nosuchnick(server, nick, target)], None),
                            }
                        }
                        _ => (
                            vec![formatter::err_needmoreparams(server, nick, &msg.command)],
                            None,
                        ),
                    }
                }
                CMD_PING => {
                    let token = msg.lax_trailing(0);
                    let token = if token.is_empty() { server } else { token };
                    (vec![formatter::pong(server, token)], None)
                }
                // Liveness is tracked by the connection's ping loop.
                CMD_PONG | CMD_CAP => (vec![], None),
                CMD_NICK | CMD_USER | CMD_PASS => {
                    (vec![formatter::err_alreadyregistered(server, nick)], None)
                }
                _ => {
                    warn!(command = %msg.command, "unknown IRC command");
                    (
                        vec![formatter::err_unknowncommand(server, nick, &msg.command)],
                        None,
                    )
                }
            }
        };

        send_all(conn, replies).await;
        if let Some((sink, out)) = delivery {
            deliver(&sink, out).await;
        }

        Handler::Active(self)
    }

    pub(super) async fn closed(self, conn: &ConnectionHandle) {
        self.state.lock().await.remove_user(&self.nick);
        conn.kill();
    }
}

/// Best effort: a recipient that is not draining its outbox must not stall
/// the sender's read loop.
async fn deliver(sink: &MessageSink, msg: IrcMessage) {
    debug!(?msg, "delivering to user");
    if time::timeout(DELIVERY_TIMEOUT, sink.send(msg)).await.is_err() {
        warn!("recipient not reading, message dropped");
    }
}
