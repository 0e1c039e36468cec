//! End-to-end tests driving full connections over in-memory streams.
//!
//! Each test client talks to a real `Connection` (read, write and ping
//! loops) backed by a shared state store, the same way a TCP client would.
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tracing::Span;

use channels_gateway::irc::connection::{Connection, ConnectionHandle, LivenessConfig};
use channels_gateway::irc::handler::Handler;
use channels_gateway::irc::parser::IrcMessage;
use channels_gateway::state::credentials::hash_password_with;
use channels_gateway::state::{Account, Caps, Role, SharedState, State};

struct TestClient {
    reader: BufReader<ReadHalf<DuplexStream>>,
    writer: WriteHalf<DuplexStream>,
    handle: ConnectionHandle,
    task: JoinHandle<()>,
}

impl TestClient {
    fn connect(state: &SharedState) -> Self {
        let config = Arc::new(LivenessConfig {
            name: "channels".into(),
            ping_frequency: Duration::from_secs(10),
            pong_max_latency: Duration::from_secs(5),
        });
        let (client, server) = tokio::io::duplex(8192);
        let conn = Connection::new(server, config, Handler::fresh(state.clone()), Span::none());
        let handle = conn.handle();
        let task = tokio::spawn(conn.run());
        let (reader, writer) = tokio::io::split(client);
        Self {
            reader: BufReader::new(reader),
            writer,
            handle,
            task,
        }
    }

    async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    /// Next line from the gateway, without the terminator. Empty at EOF.
    async fn line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    /// Wait for all three connection loops to exit.
    async fn closed(&mut self) {
        (&mut self.task).await.unwrap();
    }

    async fn register(&mut self, nick: &str) {
        self.send("PASS secret").await;
        self.send(&format!("NICK {nick}")).await;
        self.send(&format!("USER {nick} 0 * :{nick} Exampleton")).await;
        for code in ["001", "002", "003", "004", "422"] {
            let line = self.line().await;
            assert!(
                line.starts_with(&format!(":channels {code} {nick}")),
                "expected {code}, got {line:?}"
            );
        }
    }
}

fn test_state() -> SharedState {
    let params = argon2::Params::new(1024, 1, 1, None).unwrap();
    let mut state = State::new("channels");
    for name in ["alice", "bob"] {
        state.add_account(Account {
            name: name.into(),
            password_hash: hash_password_with("secret", params.clone()).unwrap(),
            roles: vec![Role::Member],
        });
    }
    state.shared()
}

#[tokio::test]
async fn registration_reaches_active_user() {
    let state = test_state();
    let mut client = TestClient::connect(&state);

    client.register("alice").await;

    {
        let s = state.lock().await;
        let user = s.user("alice").expect("alice registered");
        assert_eq!(user.roles(), &[Role::Member]);
        assert!(!user.caps().contains(Caps::MESSAGE_TAGS));
    }

    client.send("NICK again").await;
    assert_eq!(client.line().await, ":channels 462 alice :You may not reregister");

    client.send("QUIT :bye").await;
    client.closed().await;
    assert_eq!(client.line().await, "");
    assert!(state.lock().await.user("alice").is_none());
}

#[tokio::test]
async fn nick_before_pass_is_rejected_without_mutation() {
    let state = test_state();
    let mut client = TestClient::connect(&state);

    client.send("NICK alice").await;
    assert_eq!(client.line().await, ":channels 464 * :Password incorrect");
    assert_eq!(state.lock().await.user_count(), 0);

    client.handle.kill();
    client.closed().await;
}

#[tokio::test]
async fn second_connection_cannot_take_active_nick() {
    let state = test_state();
    let mut first = TestClient::connect(&state);
    first.register("alice").await;

    let mut second = TestClient::connect(&state);
    second.send("PASS secret").await;
    second.send("NICK alice").await;
    assert_eq!(
        second.line().await,
        ":channels 433 * alice :Nickname is already in use"
    );

    second.handle.kill();
    second.closed().await;
    assert!(state.lock().await.user("alice").is_some());

    first.handle.kill();
    first.closed().await;
    assert!(state.lock().await.user("alice").is_none());
}

#[tokio::test]
async fn premature_disconnect_removes_half_registered_user() {
    let state = test_state();
    let mut client = TestClient::connect(&state);

    client.send("PASS secret").await;
    client.send("NICK alice").await;
    // Too few params: proves the nickname was accepted.
    client.send("USER alice").await;
    assert_eq!(
        client.line().await,
        ":channels 461 alice USER :Not enough parameters"
    );
    assert!(state.lock().await.user("alice").is_some());

    let TestClient {
        reader,
        writer,
        handle,
        task,
    } = client;
    drop(reader);
    drop(writer);
    task.await.unwrap();

    assert!(handle.is_killed());
    assert!(state.lock().await.user("alice").is_none());
}

#[tokio::test]
async fn forced_kill_removes_active_user() {
    let state = test_state();
    let mut client = TestClient::connect(&state);
    client.register("alice").await;

    client.handle.kill();
    client.closed().await;

    assert_eq!(client.line().await, "");
    assert!(state.lock().await.user("alice").is_none());
}

#[tokio::test(start_paused = true)]
async fn ping_timeout_removes_user() {
    let state = test_state();
    let mut client = TestClient::connect(&state);
    client.register("alice").await;

    assert_eq!(client.line().await, "PING :channels");
    client.send("PONG :channels").await;
    assert_eq!(client.line().await, "PING :channels");
    assert!(state.lock().await.user("alice").is_some());

    // No PONG this time.
    client.closed().await;
    assert!(client.handle.is_killed());
    assert!(state.lock().await.user("alice").is_none());
}

#[tokio::test]
async fn message_tags_follow_negotiated_caps() {
    let state = test_state();

    let mut alice = TestClient::connect(&state);
    alice.register("alice").await;

    let mut bob = TestClient::connect(&state);
    bob.send("CAP REQ :message-tags").await;
    bob.register("bob").await;
    assert!(
        state
            .lock()
            .await
            .user("bob")
            .unwrap()
            .caps()
            .contains(Caps::MESSAGE_TAGS)
    );

    alice.send("@+typing=done PRIVMSG bob :hi bob").await;
    assert_eq!(
        bob.line().await,
        "@+typing=done :alice!alice@channels PRIVMSG bob :hi bob"
    );

    bob.send("@+typing=done PRIVMSG alice :hi alice").await;
    assert_eq!(alice.line().await, ":bob!bob@channels PRIVMSG alice :hi alice");

    for mut client in [alice, bob] {
        client.handle.kill();
        client.closed().await;
    }
    assert_eq!(state.lock().await.user_count(), 0);
}

#[tokio::test]
async fn injected_quit_is_handled_like_client_quit() {
    let state = test_state();
    let mut client = TestClient::connect(&state);
    client.register("alice").await;

    client
        .handle
        .inject(IrcMessage::new("QUIT").with_trailing("Gateway shutting down"))
        .await;
    client.closed().await;

    assert!(state.lock().await.user("alice").is_none());
}
