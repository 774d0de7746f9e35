//! [`CockpitServer`] – HTTP + WebSocket server for the operator page.
//!
//! Listens on `0.0.0.0:8080` (configurable via [`CockpitServer::with_port`]).
//!
//! | Path | Protocol | Effect |
//! |---|---|---|
//! | `/control` | WebSocket, text | one JSON envelope per frame, handled by the [`Dispatcher`] |
//! | `/audiostream` | WebSocket, binary | microphone chunks out, speaker buffers in |
//! | `/videostream` | HTTP | `multipart/x-mixed-replace` JPEG stream |
//! | `/` | HTTP | embedded operator page |
//!
//! Everything else is a 404.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rover_middleware::{AudioPipeline, Frame, VideoPipeline};
use rover_runtime::Rover;
use rover_types::{ControlMsg, RoverError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::dispatcher::Dispatcher;

/// Default TCP port for the cockpit server.
pub const DEFAULT_PORT: u16 = 8080;

/// The compiled-in operator page.
const COCKPIT_HTML: &str = include_str!("cockpit.html");

const MJPEG_BOUNDARY: &str = "frame";

/// Longest request head read before a plain HTTP response.
const MAX_HEAD_BYTES: usize = 8 * 1024;

/// How long a client may take to send its request head.
const HEAD_WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// CockpitServer
// ---------------------------------------------------------------------------

/// Serves the operator page and the control, audio and video endpoints for
/// one [`Rover`].
pub struct CockpitServer {
    rover: Arc<Rover>,
    port: u16,
    ack: bool,
}

struct Shared {
    rover: Arc<Rover>,
    dispatcher: Dispatcher,
}

impl CockpitServer {
    /// Create a server for `rover` on the [`DEFAULT_PORT`].
    pub fn new(rover: Arc<Rover>) -> Self {
        Self {
            rover,
            port: DEFAULT_PORT,
            ack: false,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Answer successful control commands with an OK envelope.
    pub fn with_ack(mut self, ack: bool) -> Self {
        self.ack = ack;
        self
    }

    /// Return the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind `0.0.0.0:<port>` and serve until `shutdown` turns `true`.
    ///
    /// # Errors
    ///
    /// [`RoverError::Device`] if the listener cannot bind.
    pub async fn run_until(self, shutdown: watch::Receiver<bool>) -> Result<(), RoverError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RoverError::device("cockpit", format!("bind error on {addr}: {e}")))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` turns `true`.
    ///
    /// Open connections are told to close as well; their tasks are not
    /// awaited.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), RoverError> {
        let local = listener
            .local_addr()
            .map_err(|e| RoverError::device("cockpit", e))?;
        info!(addr = %local, "cockpit listening");

        let shared = Arc::new(Shared {
            dispatcher: Dispatcher::new(Arc::clone(&self.rover)).with_ack(self.ack),
            rover: self.rover,
        });

        loop {
            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let shared = Arc::clone(&shared);
                        let shutdown = shutdown.clone();
                        let span = info_span!("conn", id = %Uuid::new_v4(), %peer);
                        tokio::spawn(
                            async move {
                                if let Err(e) = handle_connection(stream, shared, shutdown).await {
                                    warn!(error = %e, "connection ended with error");
                                }
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
        }

        info!("cockpit stopped");
        Ok(())
    }
}

/// Resolves once `shutdown` is `true` or its sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn io_error(e: impl std::fmt::Display) -> RoverError {
    RoverError::TransientIo {
        component: "cockpit".to_string(),
        details: e.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Request routing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Control,
    AudioStream,
    VideoStream,
    Index,
    NotFound,
}

#[derive(Debug, PartialEq, Eq)]
struct RequestHead {
    route: Route,
    upgrade: bool,
}

/// Read the route and the websocket-upgrade flag from the start of a
/// request. Query strings are ignored.
fn parse_head(raw: &str) -> Option<RequestHead> {
    let mut lines = raw.lines();
    let mut parts = lines.next()?.split_whitespace();
    let _method = parts.next()?;
    let target = parts.next()?;
    let path = target.split('?').next().unwrap_or(target);

    let route = match path {
        "/control" => Route::Control,
        "/audiostream" => Route::AudioStream,
        "/videostream" => Route::VideoStream,
        "/" | "/index.html" => Route::Index,
        _ => Route::NotFound,
    };
    let upgrade = lines.any(|line| {
        let line = line.to_ascii_lowercase();
        line.starts_with("upgrade:") && line.contains("websocket")
    });
    Some(RequestHead { route, upgrade })
}

fn head_complete(bytes: &[u8]) -> bool {
    bytes.windows(4).any(|w| w == b"\r\n\r\n")
}

/// Peek until the whole request head is buffered, the buffer is full, the
/// client hangs up, or [`HEAD_WAIT`] runs out.
///
/// `peek` leaves the bytes in place so the websocket handshake still sees
/// the full request.
async fn peek_head(stream: &TcpStream) -> Result<Vec<u8>, RoverError> {
    let mut buf = vec![0u8; MAX_HEAD_BYTES];
    let deadline = Instant::now() + HEAD_WAIT;
    let mut seen = 0;
    loop {
        let n = stream.peek(&mut buf).await.map_err(io_error)?;
        if n == 0 || n == buf.len() || head_complete(&buf[..n]) {
            buf.truncate(n);
            return Ok(buf);
        }
        if n == seen {
            if Instant::now() >= deadline {
                debug!(bytes = n, "request head incomplete");
                buf.truncate(n);
                return Ok(buf);
            }
            // peek returns at once while any bytes are queued
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        seen = n;
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    shared: Arc<Shared>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), RoverError> {
    let peeked = peek_head(&stream).await?;
    let Some(head) = parse_head(&String::from_utf8_lossy(&peeked)) else {
        return respond(&mut stream, "400 Bad Request", "text/plain", "bad request").await;
    };
    debug!(route = ?head.route, upgrade = head.upgrade, "request");

    match (head.route, head.upgrade) {
        (Route::Control, true) => control_socket(stream, &shared.dispatcher, shutdown).await,
        (Route::AudioStream, true) => match shared.rover.audio() {
            Some(audio) => audio_socket(stream, audio, shutdown).await,
            None => respond(&mut stream, "404 Not Found", "text/plain", "no audio").await,
        },
        (Route::Control | Route::AudioStream, false) => {
            respond(
                &mut stream,
                "426 Upgrade Required",
                "text/plain",
                "websocket upgrade required",
            )
            .await
        }
        (Route::VideoStream, _) => match shared.rover.video() {
            Some(video) => mjpeg_stream(stream, video, shutdown).await,
            None => respond(&mut stream, "404 Not Found", "text/plain", "no camera").await,
        },
        (Route::Index, _) => {
            respond(
                &mut stream,
                "200 OK",
                "text/html; charset=utf-8",
                COCKPIT_HTML,
            )
            .await
        }
        (Route::NotFound, _) => {
            respond(&mut stream, "404 Not Found", "text/plain", "not found").await
        }
    }
}

// ---------------------------------------------------------------------------
// Plain HTTP
// ---------------------------------------------------------------------------

/// Consume the request head so closing the socket does not reset it.
async fn drain_head(stream: &mut TcpStream) -> Result<(), RoverError> {
    let mut head = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    while !head_complete(&head) && head.len() < MAX_HEAD_BYTES {
        let n = stream.read(&mut chunk).await.map_err(io_error)?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}

async fn respond(
    stream: &mut TcpStream,
    status: &str,
    content_type: &str,
    body: &str,
) -> Result<(), RoverError> {
    drain_head(stream).await?;
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len(),
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(io_error)?;
    let _ = stream.shutdown().await;
    Ok(())
}

// ---------------------------------------------------------------------------
// MJPEG
// ---------------------------------------------------------------------------

fn mjpeg_header() -> String {
    format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: close\r\n\
         \r\n"
    )
}

/// One multipart section carrying `frame`.
fn mjpeg_part(frame: &Frame) -> Vec<u8> {
    let mut part = Vec::with_capacity(frame.jpeg.len() + 96);
    part.extend_from_slice(
        format!(
            "--{MJPEG_BOUNDARY}\r\n\
             Content-Type: image/jpeg\r\n\
             Content-Length: {}\r\n\
             X-Sequence: {}\r\n\
             \r\n",
            frame.jpeg.len(),
            frame.seq
        )
        .as_bytes(),
    );
    part.extend_from_slice(&frame.jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

async fn mjpeg_stream(
    mut stream: TcpStream,
    video: &VideoPipeline,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), RoverError> {
    drain_head(&mut stream).await?;
    stream
        .write_all(mjpeg_header().as_bytes())
        .await
        .map_err(io_error)?;
    info!("video viewer connected");

    let mut frames = video.frames().subscribe();
    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            frame = frames.next() => {
                let Some(frame) = frame else { break };
                if let Err(e) = stream.write_all(&mjpeg_part(&frame)).await {
                    debug!(error = %e, "video viewer went away");
                    break;
                }
            }
        }
    }
    info!("video viewer disconnected");
    Ok(())
}

// ---------------------------------------------------------------------------
// WebSockets
// ---------------------------------------------------------------------------

async fn control_socket(
    stream: TcpStream,
    dispatcher: &Dispatcher,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), RoverError> {
    let ws = accept_async(stream)
        .await
        .map_err(|e| io_error(format!("control handshake: {e}")))?;
    let (mut ws_tx, mut ws_rx) = ws.split();
    info!("operator connected");

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    // Commands run inline: a drive pulse holds this
                    // connection until it ends.
                    let Some(reply) = dispatcher.handle_text(text.as_str()).await else {
                        continue;
                    };
                    match serde_json::to_string(&ControlMsg::from(reply)) {
                        Ok(json) => {
                            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "reply serialization failed"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(error = %e, "control socket error");
                    break;
                }
                _ => {}
            }
        }
    }

    let _ = ws_tx.close().await;
    info!("operator disconnected");
    Ok(())
}

async fn audio_socket(
    stream: TcpStream,
    audio: &AudioPipeline,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), RoverError> {
    let ws = accept_async(stream)
        .await
        .map_err(|e| io_error(format!("audio handshake: {e}")))?;
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut chunks = audio.subscribe();
    info!("audio listener connected");

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => break,
            chunk = chunks.recv() => {
                let Some(chunk) = chunk else { break };
                if ws_tx.send(Message::Binary(chunk.to_vec().into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    if let Err(err) = audio.push_playback(data.to_vec()) {
                        warn!(error = %err, "playback upload refused");
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(error = %e, "audio socket error");
                    break;
                }
                _ => {}
            }
        }
    }

    let _ = ws_tx.close().await;
    info!("audio listener disconnected");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use rover_hal::sim::{SimHardware, SimProbes};
    use rover_runtime::RoverConfig;
    use rover_types::CmdType;
    use serde_json::json;
    use tokio::task::JoinHandle;

    struct Running {
        addr: SocketAddr,
        rover: Arc<Rover>,
        probes: SimProbes,
        stop: watch::Sender<bool>,
        task: JoinHandle<Result<(), RoverError>>,
    }

    async fn start(builder: SimHardware) -> Running {
        let (hw, probes) = builder.build();
        let mut config = RoverConfig::default();
        config.actuators.servo_settle_ms = 1;
        let rover = Arc::new(Rover::assemble(hw, config).await.unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stop_rx) = watch::channel(false);
        let server = CockpitServer::new(Arc::clone(&rover));
        let task = tokio::spawn(server.serve(listener, stop_rx));
        Running {
            addr,
            rover,
            probes,
            stop,
            task,
        }
    }

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(format!("GET {path} HTTP/1.1\r\nHost: rover\r\n\r\n").as_bytes())
            .await
            .unwrap();
        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut out))
            .await
            .unwrap()
            .unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    // ── Routing ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn port_defaults_and_overrides() {
        let (hw, _) = SimHardware::new().build();
        let rover = Arc::new(Rover::assemble(hw, RoverConfig::default()).await.unwrap());
        assert_eq!(CockpitServer::new(Arc::clone(&rover)).port(), DEFAULT_PORT);
        assert_eq!(CockpitServer::new(rover).with_port(9999).port(), 9999);
    }

    #[test]
    fn parses_routes_and_upgrade() {
        let head = parse_head(
            "GET /control HTTP/1.1\r\nHost: x\r\nUpgrade: WebSocket\r\nConnection: Upgrade\r\n\r\n",
        )
        .unwrap();
        assert_eq!(
            head,
            RequestHead {
                route: Route::Control,
                upgrade: true
            }
        );

        let head = parse_head("GET /videostream?t=1 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(head.route, Route::VideoStream);
        assert!(!head.upgrade);

        assert_eq!(parse_head("GET / HTTP/1.1\r\n").unwrap().route, Route::Index);
        assert_eq!(
            parse_head("GET /etc/passwd HTTP/1.1\r\n").unwrap().route,
            Route::NotFound
        );
        assert!(parse_head("").is_none());
        assert!(parse_head("GET\r\n").is_none());
    }

    #[test]
    fn mjpeg_part_layout() {
        let frame = Frame {
            seq: 7,
            jpeg: Arc::from(&b"\xFF\xD8jpeg\xFF\xD9"[..]),
        };
        let part = mjpeg_part(&frame);
        let text = String::from_utf8_lossy(&part);
        assert!(text.starts_with("--frame\r\nContent-Type: image/jpeg\r\n"));
        assert!(text.contains("Content-Length: 8\r\n"));
        assert!(text.contains("X-Sequence: 7\r\n\r\n"));
        assert!(part.ends_with(b"\xFF\xD9\r\n"));
        assert!(mjpeg_header().contains("multipart/x-mixed-replace; boundary=frame"));
    }

    #[test]
    fn cockpit_html_talks_to_every_endpoint() {
        assert!(COCKPIT_HTML.contains("WebSocket"));
        assert!(COCKPIT_HTML.contains("/control"));
        assert!(COCKPIT_HTML.contains("/audiostream"));
        assert!(COCKPIT_HTML.contains("/videostream"));
        assert!(COCKPIT_HTML.contains("KeyW"));
    }

    // ── Live server ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn request_head_split_across_writes_is_routed_whole() {
        let srv = start(SimHardware::new()).await;

        let mut stream = TcpStream::connect(srv.addr).await.unwrap();
        stream.write_all(b"GET /ind").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stream
            .write_all(b"ex.html HTTP/1.1\r\nHost: rover\r\n\r\n")
            .await
            .unwrap();

        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut out))
            .await
            .unwrap()
            .unwrap();
        assert!(String::from_utf8_lossy(&out).starts_with("HTTP/1.1 200 OK"));

        srv.stop.send(true).unwrap();
        srv.task.await.unwrap().unwrap();
    }

    #[test]
    fn head_completion() {
        assert!(head_complete(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"));
        assert!(!head_complete(b"GET / HTTP/1.1\r\nHost: x\r\n"));
    }

    #[tokio::test]
    async fn serves_page_and_404s() {
        let srv = start(SimHardware::new()).await;

        let page = http_get(srv.addr, "/").await;
        assert!(page.starts_with("HTTP/1.1 200 OK"));
        assert!(page.contains("text/html"));

        assert!(http_get(srv.addr, "/missing").await.starts_with("HTTP/1.1 404"));
        // No camera in this build.
        assert!(http_get(srv.addr, "/videostream").await.starts_with("HTTP/1.1 404"));
        assert!(http_get(srv.addr, "/control").await.starts_with("HTTP/1.1 426"));

        srv.stop.send(true).unwrap();
        srv.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn control_socket_round_trip() {
        let srv = start(SimHardware::new().with_servo()).await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/control", srv.addr))
            .await
            .unwrap();

        let abs = serde_json::to_string(&ControlMsg::new(CmdType::ServoAbs, json!(45))).unwrap();
        ws.send(Message::Text(abs.into())).await.unwrap();
        let status = serde_json::to_string(&ControlMsg::new(CmdType::Status, json!(null))).unwrap();
        ws.send(Message::Text(status.into())).await.unwrap();

        let reply = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let msg: ControlMsg = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(msg.cmd_type, CmdType::Status.code());
        assert_eq!(msg.data["actuators"]["servo_angle"], json!(45));

        ws.send(Message::Text("nonsense".to_string().into())).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let msg: ControlMsg = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(msg.cmd_type, CmdType::Err.code());

        srv.stop.send(true).unwrap();
        srv.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn closing_one_operator_leaves_others_working() {
        let srv = start(SimHardware::new().with_headlight()).await;
        let url = format!("ws://{}/control", srv.addr);
        let (mut first, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        let (mut second, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

        first.close(None).await.unwrap();

        let on = serde_json::to_string(&ControlMsg::new(CmdType::HeadlightOn, json!(null))).unwrap();
        second.send(Message::Text(on.into())).await.unwrap();
        let status = serde_json::to_string(&ControlMsg::new(CmdType::Status, json!(null))).unwrap();
        second.send(Message::Text(status.into())).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(2), second.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let msg: ControlMsg = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(msg.data["headlight"], json!(true));
        assert!(srv.rover.actuators().headlight_on());

        srv.stop.send(true).unwrap();
        srv.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn audio_socket_streams_capture() {
        let srv = start(SimHardware::new().with_audio_cadence(Duration::from_millis(2))).await;
        let (mut ws, _) =
            tokio_tungstenite::connect_async(format!("ws://{}/audiostream", srv.addr))
                .await
                .unwrap();
        // Let the server subscribe before capture produces anything.
        tokio::time::sleep(Duration::from_millis(50)).await;
        srv.rover.audio().unwrap().start_capture().await.unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        match msg {
            Message::Binary(bytes) => assert_eq!(bytes.len(), 512 * 2),
            other => panic!("expected binary chunk, got {other:?}"),
        }

        ws.send(Message::Binary(vec![0u8; 740 * 2].into())).await.unwrap();
        srv.stop.send(true).unwrap();
        srv.task.await.unwrap().unwrap();
        assert!(srv.probes.audio.samples_read() > 0);
    }

    #[tokio::test]
    async fn video_stream_delivers_jpeg_parts() {
        let srv = start(SimHardware::new().with_camera()).await;
        let video = srv.rover.video().unwrap();
        video.set_fps(20).await.unwrap();
        video.start_stream().await.unwrap();

        let mut stream = TcpStream::connect(srv.addr).await.unwrap();
        stream
            .write_all(b"GET /videostream HTTP/1.1\r\nHost: rover\r\n\r\n")
            .await
            .unwrap();

        let mut seen = Vec::new();
        let mut chunk = [0u8; 1024];
        let found = tokio::time::timeout(Duration::from_secs(3), async {
            loop {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "stream closed early");
                seen.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&seen);
                if text.contains("--frame\r\nContent-Type: image/jpeg") && text.contains("frame-")
                {
                    return text.into_owned();
                }
            }
        })
        .await
        .unwrap();
        assert!(found.starts_with("HTTP/1.1 200 OK"));
        assert!(found.contains("boundary=frame"));

        srv.stop.send(true).unwrap();
        srv.task.await.unwrap().unwrap();
    }
}
