//! Both front ends over real sockets, with a scripted transmitter behind them.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flexgate_device::{AtPort, DeviceResult, ScriptedPort};
use flexgate_flex::FlexEncoder;
use flexgate_runner::server::CLIENT_READ_TIMEOUT;
use flexgate_runner::{
    CredentialStore, GatewayServer, PipelineSettings, ServerContext, TransmissionPipeline,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

struct Gateway {
    tcp: SocketAddr,
    http: SocketAddr,
    opens: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Gateway {
    async fn start(debug: bool) -> Self {
        Self::start_with(debug, CLIENT_READ_TIMEOUT).await
    }

    async fn start_with(debug: bool, read_timeout: Duration) -> Self {
        let opens = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&opens);
        let opener = move || -> DeviceResult<Box<dyn AtPort + Send>> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedPort::responsive()))
        };
        let pipeline = TransmissionPipeline::new(
            Arc::new(FlexEncoder::new()),
            Arc::new(opener),
            PipelineSettings {
                power: 2,
                default_frequency: 916_000_000,
                debug,
            },
        );
        let credentials = CredentialStore::parse("admin:passw0rd\n");
        let context =
            Arc::new(ServerContext::new(pipeline, credentials).with_read_timeout(read_timeout));

        let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = GatewayServer::new(Some(tcp), Some(http), context);
        let tcp = server.tcp_addr().unwrap();
        let http = server.http_addr().unwrap();

        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(server.run(Arc::clone(&running)));

        Gateway {
            tcp,
            http,
            opens,
            running,
            task,
        }
    }

    async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        self.task.await.unwrap();
    }
}

async fn exchange(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    reply
}

fn post(body: &str, auth: Option<(&str, &str)>) -> Vec<u8> {
    let mut request = format!(
        "POST / HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n",
        body.len()
    );
    if let Some((user, password)) = auth {
        let token = STANDARD.encode(format!("{}:{}", user, password));
        request.push_str(&format!("Authorization: Basic {}\r\n", token));
    }
    request.push_str("\r\n");
    request.push_str(body);
    request.into_bytes()
}

#[tokio::test]
async fn test_tcp_page_is_transmitted() {
    let gateway = Gateway::start(false).await;

    let reply = exchange(gateway.tcp, b"1122334|Hello|916000000").await;
    assert_eq!(reply, "Message sent successfully!");
    assert_eq!(gateway.opens.load(Ordering::SeqCst), 1);

    gateway.stop().await;
}

#[tokio::test]
async fn test_tcp_bad_requests() {
    let gateway = Gateway::start(false).await;

    let reply = exchange(gateway.tcp, b"1234|Hello").await;
    assert_eq!(
        reply,
        "Invalid input format. Expected: CAPCODE|MESSAGE|FREQUENCY"
    );
    let reply = exchange(gateway.tcp, b"abc|Hello|916000000").await;
    assert_eq!(reply, "Invalid capcode or frequency format");
    let reply = exchange(gateway.tcp, b"0|Hello|916000000").await;
    assert_eq!(reply, "Failed to process message");
    assert_eq!(gateway.opens.load(Ordering::SeqCst), 0);

    gateway.stop().await;
}

#[tokio::test]
async fn test_http_page_is_transmitted() {
    let gateway = Gateway::start(false).await;

    let body = r#"{"capcode":1234567,"message":"Hello World","frequency":916000000}"#;
    let reply = exchange(gateway.http, &post(body, Some(("admin", "passw0rd")))).await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{}", reply);
    assert!(reply.ends_with(
        r#"{"status":"success","message":"Message transmitted successfully"}"#
    ));
    assert_eq!(gateway.opens.load(Ordering::SeqCst), 1);

    gateway.stop().await;
}

#[tokio::test]
async fn test_http_frequency_defaults() {
    let gateway = Gateway::start(false).await;

    let body = r#"{"capcode":1234567,"message":"no frequency"}"#;
    let reply = exchange(gateway.http, &post(body, Some(("admin", "passw0rd")))).await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{}", reply);

    gateway.stop().await;
}

#[tokio::test]
async fn test_http_rejections() {
    let gateway = Gateway::start(false).await;
    let auth = Some(("admin", "passw0rd"));

    let reply = exchange(gateway.http, &post(r#"{"capcode":1,"message":"x"}"#, None)).await;
    assert!(reply.starts_with("HTTP/1.1 401 Unauthorized\r\n"), "{}", reply);
    assert!(reply.contains("WWW-Authenticate: Basic realm=\"FLEX Paging Gateway\"\r\n"));

    let wrong = Some(("admin", "wrong"));
    let reply = exchange(gateway.http, &post(r#"{"capcode":1,"message":"x"}"#, wrong)).await;
    assert!(reply.starts_with("HTTP/1.1 401 "), "{}", reply);

    let reply = exchange(gateway.http, &post(r#"{"capcode":0,"message":"x"}"#, auth)).await;
    assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{}", reply);
    assert!(reply.ends_with(r#"{"error":"Missing required field: capcode must be specified","code":400}"#), "{}", reply);

    let reply = exchange(gateway.http, &post("{not json", auth)).await;
    assert!(reply.starts_with("HTTP/1.1 400 "), "{}", reply);

    let reply = exchange(
        gateway.http,
        b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n",
    )
    .await;
    assert!(reply.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{}", reply);

    assert_eq!(gateway.opens.load(Ordering::SeqCst), 0);
    gateway.stop().await;
}

#[tokio::test]
async fn test_debug_mode_replies_without_device() {
    let gateway = Gateway::start(true).await;

    let reply = exchange(gateway.tcp, b"1122334|Hello|916000000").await;
    assert_eq!(reply, "Message sent successfully!");
    let body = r#"{"capcode":1234567,"message":"Hello"}"#;
    let reply = exchange(gateway.http, &post(body, Some(("admin", "passw0rd")))).await;
    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{}", reply);
    assert_eq!(gateway.opens.load(Ordering::SeqCst), 0);

    gateway.stop().await;
}

#[tokio::test]
async fn test_idle_clients_do_not_block_shutdown() {
    let gateway = Gateway::start_with(false, Duration::from_millis(200)).await;

    let mut idle_tcp = TcpStream::connect(gateway.tcp).await.unwrap();
    let mut idle_http = TcpStream::connect(gateway.http).await.unwrap();
    // Let the accept loop pick both connections up before stopping it
    tokio::time::sleep(Duration::from_millis(50)).await;

    gateway.running.store(false, Ordering::SeqCst);
    tokio::time::timeout(Duration::from_secs(5), gateway.task)
        .await
        .expect("server kept waiting on idle clients")
        .unwrap();

    let mut reply = Vec::new();
    idle_tcp.read_to_end(&mut reply).await.unwrap();
    assert!(reply.is_empty());

    let mut reply = String::new();
    idle_http.read_to_string(&mut reply).await.unwrap();
    assert!(reply.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{}", reply);
    assert_eq!(gateway.opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_slow_client_within_timeout_is_served() {
    let gateway = Gateway::start_with(false, Duration::from_secs(2)).await;

    let mut stream = TcpStream::connect(gateway.tcp).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    stream.write_all(b"1122334|Hello|0").await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    assert_eq!(reply, "Message sent successfully!");

    gateway.stop().await;
}
