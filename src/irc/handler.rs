use tracing::debug;

use crate::state::{Caps, SharedState, State};

use super::commands::Active;
use super::connection::{ConnectionHandle, MessageSink};
use super::formatter::{self, ErrorReply};
use super::parser::{CMD_CAP, CMD_NICK, CMD_PASS, CMD_QUIT, CMD_USER, IrcMessage};

/// Per-connection registration state machine.
///
/// Each variant consumes one message and yields the next variant. Side
/// effects (state store calls, replies) happen during the transition.
pub enum Handler {
    /// Brand new connection, no nickname yet.
    Fresh(Fresh),
    /// Nickname accepted, waiting for USER.
    FreshWithNick(FreshWithNick),
    /// Registration complete.
    Active(Active),
    /// Connection has quit; all further input is ignored.
    Null,
}

impl Handler {
    pub fn fresh(state: SharedState) -> Self {
        Handler::Fresh(Fresh::new(state))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Handler::Null)
    }

    /// Nickname bound to the connection, once NICK has been accepted.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Handler::FreshWithNick(h) => Some(h.nick()),
            Handler::Active(h) => Some(h.nick()),
            Handler::Fresh(_) | Handler::Null => None,
        }
    }

    pub async fn handle(self, conn: &ConnectionHandle, msg: IrcMessage) -> Handler {
        match self {
            Handler::Fresh(h) => h.handle(conn, msg).await,
            Handler::FreshWithNick(h) => h.handle(conn, msg).await,
            Handler::Active(h) => h.handle(conn, msg).await,
            Handler::Null => Handler::Null,
        }
    }

    /// Tear-down hook for connections that end outside the message path.
    /// Leaves no half-registered user behind.
    pub async fn closed(self, conn: &ConnectionHandle) {
        match self {
            Handler::Fresh(_) => conn.kill(),
            Handler::FreshWithNick(h) => h.closed(conn).await,
            Handler::Active(h) => h.closed(conn).await,
            Handler::Null => {}
        }
    }
}

/// Send replies computed under the state lock, after it has been released.
pub(crate) async fn send_all(conn: &ConnectionHandle, replies: Vec<IrcMessage>) {
    for reply in replies {
        conn.send(reply).await;
    }
}

pub struct Fresh {
    state: SharedState,
    pass: Option<String>,
    /// Client sent CAP, so it speaks IRCv3.
    v3_cap_client: bool,
    cap_end: bool,
    caps: Caps,
}

impl Fresh {
    fn new(state: SharedState) -> Self {
        Self {
            state,
            pass: None,
            v3_cap_client: false,
            cap_end: false,
            caps: Caps::empty(),
        }
    }

    async fn handle(self, conn: &ConnectionHandle, msg: IrcMessage) -> Handler {
        if msg.is(CMD_QUIT) {
            conn.kill();
            return Handler::Null;
        }

        if !(msg.is(CMD_NICK) || msg.is(CMD_PASS) || msg.is(CMD_CAP)) {
            return Handler::Fresh(self);
        }

        let shared = self.state.clone();
        let mut state = shared.lock().await;
        let (next, replies) = match msg.command.as_str() {
            CMD_NICK => self.handle_nick(&mut state, conn, &msg),
            CMD_PASS => self.handle_pass(&state, &msg),
            _ => self.handle_cap(&state, &msg),
        };
        drop(state);

        send_all(conn, replies).await;
        next
    }

    fn handle_cap(mut self, state: &State, msg: &IrcMessage) -> (Handler, Vec<IrcMessage>) {
        if msg.params.is_empty() {
            let reply = formatter::error_reply(
                state.server_name(),
                "*",
                ErrorReply::NeedMoreParams,
                msg,
            );
            return (Handler::Fresh(self), vec![reply]);
        }

        debug!(?msg, "capability negotiation");
        self.v3_cap_client = true;
        self.cap_end = true;
        self.caps.insert(Caps::MESSAGE_TAGS);
        (Handler::Fresh(self), vec![])
    }

    fn handle_pass(mut self, state: &State, msg: &IrcMessage) -> (Handler, Vec<IrcMessage>) {
        match msg.params.first() {
            Some(pass) => {
                self.pass = Some(pass.clone());
                (Handler::Fresh(self), vec![])
            }
            None => {
                let reply = formatter::error_reply(
                    state.server_name(),
                    "*",
                    ErrorReply::NeedMoreParams,
                    msg,
                );
                (Handler::Fresh(self), vec![reply])
            }
        }
    }

    fn handle_nick(
        self,
        state: &mut State,
        conn: &ConnectionHandle,
        msg: &IrcMessage,
    ) -> (Handler, Vec<IrcMessage>) {
        let reject = |state: &State, err: ErrorReply| {
            vec![formatter::error_reply(state.server_name(), "*", err, msg)]
        };

        let Some(nick) = msg.params.first() else {
            let replies = reject(&*state, ErrorReply::NoNicknameGiven);
            return (Handler::Fresh(self), replies);
        };
        let Some(pass) = self.pass.as_deref() else {
            let replies = reject(&*state, ErrorReply::PasswdMismatch);
            return (Handler::Fresh(self), replies);
        };

        let caller = match state.auth(nick, pass) {
            Ok(caller) => caller,
            Err(e) => {
                debug!(%nick, error = %e, "login failed");
                let replies = reject(&*state, ErrorReply::PasswdMismatch);
                return (Handler::Fresh(self), replies);
            }
        };
        if caller.name != *nick {
            let replies = reject(&*state, ErrorReply::NickCollision);
            return (Handler::Fresh(self), replies);
        }

        if state.new_user(nick).is_none() {
            let replies = reject(&*state, ErrorReply::NicknameInUse);
            return (Handler::Fresh(self), replies);
        }

        if self.cap_end {
            state.set_user_cap(nick, self.caps);
        }

        if let Some(user) = state.user_mut(nick) {
            user.add_roles(caller.roles);
            let sink = MessageSink::new(conn.clone(), user.caps());
            user.set_send_fn(sink);
        }

        debug!(%nick, v3_cap_client = self.v3_cap_client, "nickname accepted");
        (
            Handler::FreshWithNick(FreshWithNick {
                state: self.state,
                nick: nick.clone(),
            }),
            vec![],
        )
    }
}

pub struct FreshWithNick {
    state: SharedState,
    nick: String,
}

impl FreshWithNick {
    pub(crate) fn nick(&self) -> &str {
        &self.nick
    }

    async fn handle(self, conn: &ConnectionHandle, msg: IrcMessage) -> Handler {
        if msg.is(CMD_QUIT) {
            self.state.lock().await.remove_user(&self.nick);
            conn.kill();
            return Handler::Null;
        }
        if !msg.is(CMD_USER) {
            return Handler::FreshWithNick(self);
        }

        let shared = self.state.clone();
        let state = shared.lock().await;
        let (next, replies) = self.handle_user(&state, &msg);
        drop(state);

        send_all(conn, replies).await;
        next
    }

    fn handle_user(self, state: &State, msg: &IrcMessage) -> (Handler, Vec<IrcMessage>) {
        let trailing = msg.lax_trailing(3);
        if msg.params.len() < 3 || trailing.is_empty() {
            let reply = formatter::error_reply(
                state.server_name(),
                &self.nick,
                ErrorReply::NeedMoreParams,
                msg,
            );
            return (Handler::FreshWithNick(self), vec![reply]);
        }

        let replies = formatter::intro(state.server_name(), &self.nick);
        (Handler::Active(Active::new(self.state, self.nick)), replies)
    }

    async fn closed(self, conn: &ConnectionHandle) {
        self.state.lock().await.remove_user(&self.nick);
        conn.kill();
    }
}
