use chat_relay::config::{Config, LineEnding};
use chat_relay::error::{AppResult, DecodeError, HandshakeError, SessionError};
use chat_relay::net::{AppCtx, tcp};
use chat_relay::router::FixedClock;
use chat_relay::{BannedWords, Registry};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(2);

fn app(banned: &[&str]) -> Arc<AppCtx> {
    let cfg = Config {
        line_ending: LineEnding::Lf,
        ..Config::default()
    };
    let ctx = AppCtx::new(
        Arc::new(Registry::new()),
        Arc::new(BannedWords::new(banned.iter().copied())),
        Arc::new(cfg),
    )
    .with_clock(Arc::new(FixedClock("12:00:00".into())));
    Arc::new(ctx)
}

struct Client {
    tx: WriteHalf<DuplexStream>,
    rx: BufReader<ReadHalf<DuplexStream>>,
    task: JoinHandle<AppResult<()>>,
}

impl Client {
    async fn open(app: &Arc<AppCtx>, first_line: &str) -> Self {
        let (client, server) = tokio::io::duplex(8192);
        let (server_rx, server_tx) = tokio::io::split(server);
        let (client_rx, client_tx) = tokio::io::split(client);

        let task = tokio::spawn(tcp::handle_connection(server_rx, server_tx, None, app.clone()));
        let mut c = Self {
            tx: client_tx,
            rx: BufReader::new(client_rx),
            task,
        };
        c.send(first_line).await;
        c
    }

    /// Connects and waits until the relay has registered the name.
    async fn join(app: &Arc<AppCtx>, name: &str) -> Self {
        let mut c = Self::open(app, name).await;
        c.expect(&format!("Welcome to the chat, {name}!")).await;
        c
    }

    async fn send(&mut self, line: &str) {
        self.tx.write_all(line.as_bytes()).await.unwrap();
        self.tx.write_all(b"\n").await.unwrap();
    }

    /// Next line without its terminator; `None` on EOF.
    async fn line(&mut self) -> Option<String> {
        let mut buf = String::new();
        let n = tokio::time::timeout(WAIT, self.rx.read_line(&mut buf))
            .await
            .expect("timed out waiting for a line")
            .unwrap();
        (n > 0).then(|| buf.trim_end_matches('\n').to_string())
    }

    /// Skips lines until one contains `needle`.
    async fn expect(&mut self, needle: &str) -> String {
        loop {
            match self.line().await {
                Some(l) if l.contains(needle) => return l,
                Some(_) => continue,
                None => panic!("connection closed before {needle:?}"),
            }
        }
    }

    async fn expect_eof(&mut self) {
        while self.line().await.is_some() {}
    }

    async fn finish(self) -> AppResult<()> {
        tokio::time::timeout(WAIT, self.task).await.expect("session did not end").unwrap()
    }
}

#[tokio::test]
async fn list_shows_everyone_but_the_requester() {
    let app = app(&[]);
    let mut amy = Client::join(&app, "amy").await;
    let _bob = Client::join(&app, "bob").await;
    let _cy = Client::join(&app, "cy").await;

    amy.send("/list amy").await;
    amy.expect("Active Users: ").await;
    assert_eq!(amy.line().await.as_deref(), Some("bob"));
    assert_eq!(amy.line().await.as_deref(), Some("cy"));
}

#[tokio::test]
async fn alone_notice() {
    let app = app(&[]);
    let mut amy = Client::join(&app, "amy").await;

    amy.send("/list").await;
    assert_eq!(amy.expect("only user").await, "You are the only user in the chat server!");
}

#[tokio::test]
async fn broadcast_is_censored_for_everyone() {
    let app = app(&["curse", "bad"]);
    let mut amy = Client::join(&app, "amy").await;
    let mut bob = Client::join(&app, "bob").await;

    amy.send("this is a curse word").await;
    let expected = "12:00:00 amy: this is a ***** word";
    assert_eq!(amy.expect("12:00:00").await, expected);
    assert_eq!(bob.expect("12:00:00").await, expected);
}

#[tokio::test]
async fn direct_message_reaches_only_the_pair() {
    let app = app(&[]);
    let mut amy = Client::join(&app, "amy").await;
    let mut bob = Client::join(&app, "bob").await;
    let mut cy = Client::join(&app, "cy").await;

    amy.send("/msg bob hi there").await;
    let expected = "12:00:00 amy -> bob: hi there";
    assert_eq!(amy.expect("12:00:00").await, expected);
    assert_eq!(bob.expect("12:00:00").await, expected);

    // cy's first chat line must be the later broadcast, not the whisper
    amy.send("ping").await;
    assert_eq!(cy.expect("12:00:00").await, "12:00:00 amy: ping");
}

#[tokio::test]
async fn direct_message_to_names_inside_the_command_word() {
    let app = app(&[]);
    let mut amy = Client::join(&app, "amy").await;
    let mut m = Client::join(&app, "m").await;
    let mut msg = Client::join(&app, "msg").await;

    amy.send("/msg m hello").await;
    assert_eq!(m.expect("12:00:00").await, "12:00:00 amy -> m: hello");

    amy.send("/msg msg hello again").await;
    assert_eq!(msg.expect("12:00:00").await, "12:00:00 amy -> msg: hello again");
}

#[tokio::test]
async fn versioned_json_envelopes_are_routed() {
    let app = app(&[]);
    let mut amy = Client::open(&app, r#"{"v":1,"name":"amy"}"#).await;
    amy.expect("Welcome to the chat, amy!").await;
    let mut bob = Client::join(&app, "bob").await;

    amy.send(r#"{"v":1,"kind":"directed","sender":"amy","recipient":"bob","body":"/msg bob json works"}"#)
        .await;
    assert_eq!(bob.expect("12:00:00").await, "12:00:00 amy -> bob: json works");
}

#[tokio::test]
async fn duplicate_name_is_rejected() {
    let app = app(&[]);
    let _amy = Client::join(&app, "amy").await;

    let mut imposter = Client::open(&app, "AMY").await;
    assert_eq!(imposter.line().await.as_deref(), Some("Username has already been taken!"));
    imposter.expect_eof().await;

    let res = imposter.finish().await;
    assert!(matches!(res, Err(SessionError::Handshake(HandshakeError::DuplicateName(_)))));
    assert_eq!(app.registry.names(), vec!["amy"]);
}

#[tokio::test]
async fn invalid_name_is_rejected() {
    let app = app(&[]);
    let mut c = Client::open(&app, "two words").await;
    assert!(c.line().await.unwrap().starts_with("Rejected:"));
    c.expect_eof().await;

    let res = c.finish().await;
    assert!(matches!(res, Err(SessionError::Handshake(HandshakeError::InvalidName(_)))));
    assert!(app.registry.is_empty());
}

#[tokio::test]
async fn logout_closes_and_unregisters() {
    let app = app(&[]);
    let mut amy = Client::join(&app, "amy").await;
    let _bob = Client::join(&app, "bob").await;

    amy.send("/logout").await;
    amy.expect_eof().await;
    assert!(amy.finish().await.is_ok());
    assert_eq!(app.registry.names(), vec!["bob"]);
}

#[tokio::test]
async fn disconnect_unregisters() {
    let app = app(&[]);
    let amy = Client::join(&app, "amy").await;
    let Client { tx, rx, task } = amy;
    drop(tx);
    drop(rx);

    let res = tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(matches!(res, Err(SessionError::ConnectionLost(_))));
    assert!(app.registry.is_empty());
}

#[tokio::test]
async fn malformed_envelope_closes_session() {
    let app = app(&[]);
    let mut amy = Client::join(&app, "amy").await;

    amy.send("{not json").await;
    amy.expect_eof().await;
    let res = amy.finish().await;
    assert!(matches!(res, Err(SessionError::Decode(DecodeError::Json(_)))));
    assert!(app.registry.is_empty());
}

#[tokio::test]
async fn usage_error_keeps_session_open() {
    let app = app(&[]);
    let mut amy = Client::join(&app, "amy").await;

    amy.send("/msg bob").await;
    amy.expect("usage: /msg <user> <message>").await;
    amy.send("/list").await;
    amy.expect("only user").await;
}

#[tokio::test]
async fn shutdown_unblocks_every_session() {
    let app = app(&[]);
    let mut amy = Client::join(&app, "amy").await;
    let mut bob = Client::join(&app, "bob").await;

    assert_eq!(app.registry.shutdown(), 2);
    amy.expect_eof().await;
    bob.expect_eof().await;
    assert!(amy.finish().await.is_ok());
    assert!(bob.finish().await.is_ok());
}

#[tokio::test]
async fn serves_over_tcp() {
    let app = app(&["bad"]);
    let listener = tcp::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(tcp::serve(listener, app.clone()));

    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let (r, mut w) = stream.into_split();
    let mut r = BufReader::new(r);

    w.write_all(b"amy\r\n").await.unwrap();
    w.write_all(b"BAD news\r\n").await.unwrap();

    let mut buf = String::new();
    loop {
        buf.clear();
        tokio::time::timeout(WAIT, r.read_line(&mut buf)).await.unwrap().unwrap();
        if buf.starts_with("12:00:00") {
            break;
        }
    }
    assert_eq!(buf, "12:00:00 amy: *** news\n");

    server.abort();
}
