//! Integration tests for the spamd client.
//!
//! These tests run a minimal fake spamd on a loopback listener and drive
//! whole message sessions against it over real sockets.

use std::io::Read;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use spamwire_client::connection::SystemDialer;
use spamwire_client::transport::StaticResolver;
use spamwire_client::{
    Command, ConnectionManager, Error, InputMode, MessageClass, MessageSession, Outcome,
    SessionConfig, SessionState, TellRequest, TransportSpec,
};

const MESSAGE: &[u8] = b"From: a@example.com\r\nSubject: hi\r\n\r\nHello there\r\n";

/// A request as seen by the fake daemon.
#[derive(Debug)]
struct Received {
    head: Vec<String>,
    body: Vec<u8>,
}

impl Received {
    fn header(&self, name: &str) -> Option<&str> {
        let prefix = format!("{name}: ");
        self.head.iter().find_map(|l| l.strip_prefix(prefix.as_str()))
    }
}

/// Accepts one connection per response, records the request and answers
/// with the response built from it.
async fn fake_spamd<F>(responses: usize, respond: F) -> (u16, JoinHandle<Vec<Received>>)
where
    F: Fn(&Received) -> Vec<u8> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let mut seen = Vec::new();
        for _ in 0..responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            let received = read_request(&mut socket).await;
            let response = respond(&received);
            socket.write_all(&response).await.unwrap();
            socket.shutdown().await.unwrap();
            seen.push(received);
        }
        seen
    });
    (port, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> Received {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let split = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before finishing the request head");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head: Vec<String> = String::from_utf8(buf[..split].to_vec())
        .unwrap()
        .split("\r\n")
        .map(String::from)
        .collect();
    let declared = head
        .iter()
        .find_map(|l| l.strip_prefix("Content-length: "))
        .map_or(0, |v| v.parse::<usize>().unwrap());

    let mut body = buf[split + 4..].to_vec();
    while body.len() < declared {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before finishing the body");
        body.extend_from_slice(&chunk[..n]);
    }

    if head.iter().any(|l| l == "Compress: zlib") {
        let mut inflated = Vec::new();
        flate2::read::ZlibDecoder::new(body.as_slice())
            .read_to_end(&mut inflated)
            .unwrap();
        body = inflated;
    }
    Received { head, body }
}

fn session(port: u16, config: SessionConfig) -> MessageSession<SystemDialer, StaticResolver> {
    let mut spec = TransportSpec::tcp("spamd.test");
    spec.port = port;
    spec.retry_sleep = Duration::ZERO;
    let resolver =
        StaticResolver::new().with_host("spamd.test", vec![IpAddr::V4(Ipv4Addr::LOCALHOST)]);
    let connections = ConnectionManager::new(
        spec,
        resolver,
        SystemDialer,
        None,
        config.connect_timeout,
    )
    .unwrap();
    MessageSession::new(config, connections)
}

async fn run(
    port: u16,
    config: SessionConfig,
    input: &[u8],
) -> (spamwire_client::Result<Outcome>, Vec<u8>, SessionState) {
    let mut session = session(port, config);
    let mut output = Vec::new();
    let result = session.run(&mut &input[..], &mut output).await;
    (result, output, session.state())
}

fn with_body(status: &str, headers: &str, body: &[u8]) -> Vec<u8> {
    let mut response =
        format!("SPAMD/1.5 {status}\r\n{headers}Content-length: {}\r\n\r\n", body.len())
            .into_bytes();
    response.extend_from_slice(body);
    response
}

#[tokio::test]
async fn test_check_spam() {
    let (port, daemon) = fake_spamd(1, |_| {
        b"SPAMD/1.5 0 EX_OK\r\nSpam: True ; 15.2 / 5.0\r\n\r\n".to_vec()
    })
    .await;
    let config = SessionConfig::builder()
        .command(Command::Check)
        .build()
        .unwrap();

    let (result, output, state) = run(port, config, MESSAGE).await;
    assert!(result.unwrap().is_spam());
    assert_eq!(output, b"15.2/5.0\n");
    assert_eq!(state, SessionState::Done);

    let seen = daemon.await.unwrap();
    assert_eq!(seen[0].head[0], "CHECK SPAMC/1.5");
    assert_eq!(seen[0].body, MESSAGE);
}

#[tokio::test]
async fn test_process_returns_rewritten_message() {
    let rewritten = b"X-Spam-Flag: NO\r\nFrom: a@example.com\r\n\r\nHello there\r\n";
    let (port, daemon) = fake_spamd(1, move |_| {
        with_body("0 EX_OK", "Spam: False ; 0.4 / 5.0\r\n", rewritten)
    })
    .await;
    let config = SessionConfig::builder().user("alice").build().unwrap();

    let (result, output, _) = run(port, config, MESSAGE).await;
    assert!(!result.unwrap().is_spam());
    assert_eq!(output, rewritten);

    let seen = daemon.await.unwrap();
    assert_eq!(seen[0].head[0], "PROCESS SPAMC/1.5");
    assert_eq!(seen[0].header("User"), Some("alice"));
    assert_eq!(
        seen[0].header("Content-length"),
        Some(MESSAGE.len().to_string().as_str())
    );
}

#[tokio::test]
async fn test_report_echoes_summary_and_report() {
    let (port, _daemon) = fake_spamd(1, |_| {
        with_body(
            "0 EX_OK",
            "Spam: True ; 7.0 / 5.0\r\n",
            b"Content analysis details:\n",
        )
    })
    .await;
    let config = SessionConfig::builder()
        .command(Command::Report)
        .build()
        .unwrap();

    let (result, output, _) = run(port, config, MESSAGE).await;
    result.unwrap();
    assert_eq!(output, b"7.0/5.0\nContent analysis details:\n");
}

#[tokio::test]
async fn test_report_if_spam_on_ham_prints_nothing_extra() {
    let (port, _daemon) = fake_spamd(1, |_| {
        with_body("0 EX_OK", "Spam: False ; 1.0 / 5.0\r\n", b"")
    })
    .await;
    let config = SessionConfig::builder()
        .command(Command::ReportIfSpam)
        .build()
        .unwrap();

    let (result, output, _) = run(port, config, MESSAGE).await;
    assert!(!result.unwrap().is_spam());
    assert!(output.is_empty());
}

#[tokio::test]
async fn test_headers_mode_keeps_original_body() {
    let (port, _daemon) = fake_spamd(1, |_| {
        with_body(
            "0 EX_OK",
            "Spam: False ; 0.0 / 5.0\r\n",
            b"X-Spam-Status: No\r\nSubject: hi\r\n\r\n",
        )
    })
    .await;
    let config = SessionConfig::builder()
        .command(Command::Headers)
        .build()
        .unwrap();

    let (result, output, _) = run(port, config, MESSAGE).await;
    result.unwrap();
    assert_eq!(output, b"X-Spam-Status: No\r\nSubject: hi\r\n\r\nHello there\r\n");
}

#[tokio::test]
async fn test_ping() {
    let (port, daemon) = fake_spamd(1, |_| b"SPAMD/1.5 0 PONG\r\n".to_vec()).await;
    let config = SessionConfig::builder()
        .command(Command::Ping)
        .build()
        .unwrap();

    let (result, output, _) = run(port, config, b"").await;
    assert!(matches!(result.unwrap(), Outcome::Pong));
    assert_eq!(output, b"SPAMD/1.5 0 PONG\n");

    let seen = daemon.await.unwrap();
    assert_eq!(seen[0].head, vec!["PING SPAMC/1.5"]);
    assert!(seen[0].body.is_empty());
}

#[tokio::test]
async fn test_tell_learn_spam() {
    let (port, daemon) = fake_spamd(1, |_| {
        with_body("0 EX_OK", "DidSet: local\r\n", b"")
    })
    .await;
    let config = SessionConfig::builder()
        .command(Command::Tell(TellRequest::learn(MessageClass::Spam)))
        .user("bob")
        .build()
        .unwrap();

    let (result, output, _) = run(port, config, MESSAGE).await;
    let Outcome::Told(ack) = result.unwrap() else {
        panic!("Expected Told outcome");
    };
    assert!(ack.changed_anything());
    assert!(output.is_empty());

    let seen = daemon.await.unwrap();
    assert_eq!(seen[0].head[0], "TELL SPAMC/1.5");
    assert_eq!(seen[0].header("Message-class"), Some("spam"));
    assert_eq!(seen[0].header("Set"), Some("local"));
}

#[tokio::test]
async fn test_compressed_request() {
    let (port, daemon) = fake_spamd(1, |req| with_body("0 EX_OK", "", &req.body)).await;
    let config = SessionConfig::builder().compress(true).build().unwrap();

    let (result, output, _) = run(port, config, MESSAGE).await;
    result.unwrap();
    assert_eq!(output, MESSAGE);

    let seen = daemon.await.unwrap();
    assert_eq!(seen[0].header("Compress"), Some("zlib"));
    assert_eq!(seen[0].body, MESSAGE);
}

#[tokio::test]
async fn test_bsmtp_round_trip() {
    let (port, daemon) = fake_spamd(1, |req| {
        let mut body = b"X-Spam: yes\r\n".to_vec();
        body.extend_from_slice(&req.body);
        with_body("0 EX_OK", "", &body)
    })
    .await;
    let config = SessionConfig::builder()
        .input_mode(InputMode::Bsmtp)
        .build()
        .unwrap();
    let transcript =
        b"HELO mx\r\nMAIL FROM:<a@example.com>\r\nDATA\r\nSubject: x\r\n\r\n..hidden\r\n.\r\nQUIT\r\n";

    let (result, output, _) = run(port, config, transcript).await;
    result.unwrap();
    assert_eq!(
        output,
        b"HELO mx\r\nMAIL FROM:<a@example.com>\r\nDATA\r\nX-Spam: yes\r\nSubject: x\r\n\r\n..hidden\r\n.\r\nQUIT\r\n"
    );

    let seen = daemon.await.unwrap();
    assert_eq!(seen[0].body, b"Subject: x\r\n\r\n.hidden\r\n");
}

#[tokio::test]
async fn test_length_mismatch_falls_back() {
    let (port, _daemon) = fake_spamd(1, |_| {
        b"SPAMD/1.5 0 EX_OK\r\nContent-length: 100\r\n\r\ntruncated".to_vec()
    })
    .await;

    let (result, output, state) = run(port, SessionConfig::default(), MESSAGE).await;
    assert!(matches!(
        result.unwrap(),
        Outcome::Fallback {
            cause: Error::Protocol(_)
        }
    ));
    assert_eq!(output, MESSAGE);
    assert!(matches!(state, SessionState::Failed(_)));
}

#[tokio::test]
async fn test_unreachable_daemon_falls_back_to_original() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (result, output, _) = run(port, SessionConfig::default(), b"hello").await;
    assert!(matches!(
        result.unwrap(),
        Outcome::Fallback {
            cause: Error::ConnectUnavailable(_)
        }
    ));
    assert_eq!(output, b"hello");
}

#[tokio::test]
async fn test_unreachable_daemon_without_fallback() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = SessionConfig::builder()
        .command(Command::Check)
        .safe_fallback(false)
        .build()
        .unwrap();
    let (result, output, _) = run(port, config, MESSAGE).await;
    let err = result.unwrap_err();
    assert!(matches!(err, Error::ConnectUnavailable(_)));
    assert_eq!(err.exit_code(), spamwire_client::exit::UNAVAILABLE);
    assert_eq!(output, b"0/0\n");
}

#[tokio::test]
async fn test_daemon_error_code() {
    let (port, _daemon) = fake_spamd(1, |_| b"SPAMD/1.5 76 Bad header line\r\n".to_vec()).await;
    let config = SessionConfig::builder()
        .safe_fallback(false)
        .build()
        .unwrap();

    let (result, output, _) = run(port, config, MESSAGE).await;
    let err = result.unwrap_err();
    assert!(matches!(err, Error::Daemon { code: 76, .. }));
    assert_eq!(err.exit_code(), 76);
    assert!(output.is_empty());
}

#[tokio::test]
async fn test_oversized_message_is_not_sent() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let input = vec![b'x'; 2048];
    let config = SessionConfig::builder().max_len(1024).build().unwrap();

    let (result, output, _) = run(port, config, &input).await;
    assert!(matches!(result.unwrap(), Outcome::TooBig));
    assert_eq!(output, input);

    let accepted = tokio::time::timeout(Duration::from_millis(50), listener.accept()).await;
    assert!(accepted.is_err(), "oversized message must not be sent");
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_socket_transport() {
    let path = std::env::temp_dir().join(format!("spamwire-test-{}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let listener = tokio::net::UnixListener::bind(&path).unwrap();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 256];
        let n = socket.read(&mut buf).await.unwrap();
        assert!(buf[..n].starts_with(b"PING SPAMC/1.5\r\n"));
        socket.write_all(b"SPAMD/1.5 0 PONG\r\n").await.unwrap();
    });

    let config = SessionConfig::builder()
        .command(Command::Ping)
        .build()
        .unwrap();
    let connections = ConnectionManager::system(
        TransportSpec::unix(&path),
        None,
        config.connect_timeout,
    )
    .unwrap();
    let mut session = MessageSession::new(config, connections);
    let mut output = Vec::new();
    let outcome = session.run(&mut &b""[..], &mut output).await.unwrap();

    assert!(matches!(outcome, Outcome::Pong));
    assert_eq!(output, b"SPAMD/1.5 0 PONG\n");
    server.await.unwrap();
    let _ = std::fs::remove_file(&path);
}
