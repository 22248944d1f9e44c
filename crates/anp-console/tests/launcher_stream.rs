use anp_console::console::COMMAND_QUEUE_CAPACITY;
use anp_console::{event_stream_loop, Console, StreamConfig, StreamEvent, ViewSync};
use anp_core::{InboundEvent, InstanceRole, LaunchParams, DEFAULT_MAX_FRAME_BYTES};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::Url;

const RECONNECT_DELAY: Duration = Duration::from_millis(300);

struct FakeLauncher {
    connections: AtomicUsize,
    frames: mpsc::UnboundedSender<Value>,
}

fn instance(id: &str, command: &str, status: &str) -> Value {
    json!({
        "id": id,
        "command": command,
        "name": null,
        "port": "",
        "status": status,
        "start_time": "2024-01-01T00:00:00Z",
        "output": []
    })
}

async fn send_json(socket: &mut WebSocket, value: Value) {
    socket
        .send(Message::Text(value.to_string()))
        .await
        .expect("send frame");
}

impl FakeLauncher {
    async fn serve(self: Arc<Self>, mut socket: WebSocket) {
        let attempt = self.connections.fetch_add(1, Ordering::SeqCst);
        if attempt > 0 {
            send_json(&mut socket, json!({"type": "init", "instances": [instance("fresh", "client", "running")]})).await;
            while let Some(Ok(_)) = socket.recv().await {}
            return;
        }

        socket
            .send(Message::Text("{not json".to_string()))
            .await
            .expect("garbage");
        send_json(&mut socket, json!({"type": "metrics", "cpu": 0.5})).await;
        send_json(&mut socket, json!({"type": "init", "instances": [instance("old", "server", "running")]})).await;

        while let Some(Ok(message)) = socket.recv().await {
            let Message::Text(text) = message else {
                continue;
            };
            let value: Value = serde_json::from_str(&text).expect("client frame");
            let _ = self.frames.send(value.clone());
            if value["type"] == "start" {
                send_json(&mut socket, json!({"type": "start_result", "success": true, "instance_id": "i1"})).await;
                let mut added = instance("i1", "agent", "running");
                added["name"] = json!("foo");
                send_json(&mut socket, json!({"type": "instance_added", "instance": added})).await;
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        }
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(launcher): State<Arc<FakeLauncher>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| launcher.serve(socket))
}

async fn launch_fake() -> (SocketAddr, mpsc::UnboundedReceiver<Value>) {
    let (frames, frames_rx) = mpsc::unbounded_channel();
    let launcher = Arc::new(FakeLauncher {
        connections: AtomicUsize::new(0),
        frames,
    });
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .with_state(launcher);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (addr, frames_rx)
}

async fn next_event(rx: &mut mpsc::Receiver<StreamEvent>) -> StreamEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event in time")
        .expect("stream open")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn start_flow_then_reconnect_replaces_registry() {
    let (addr, mut frames) = launch_fake().await;
    let config = StreamConfig {
        url: Url::parse(&format!("ws://{addr}/ws")).expect("url"),
        reconnect_delay: RECONNECT_DELAY,
        max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
    };
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let (stream_tx, mut stream_rx) = mpsc::channel(64);
    tokio::spawn(event_stream_loop(config, stream_tx, command_rx));
    let mut console = Console::new(command_tx, ViewSync::new());

    let connected = next_event(&mut stream_rx).await;
    assert_eq!(connected, StreamEvent::Connected);
    console.apply_stream_event(connected);

    // Garbage and unknown frames are skipped, init is the first event through.
    let init = next_event(&mut stream_rx).await;
    assert!(matches!(init, StreamEvent::Event(InboundEvent::Init { .. })));
    console.apply_stream_event(init);
    assert_eq!(console.registry().ids().collect::<Vec<_>>(), vec!["old"]);

    let mut params = LaunchParams::new(InstanceRole::Agent);
    params.name = Some("foo".to_string());
    assert!(console.start_instance(params));
    let sent = timeout(Duration::from_secs(5), frames.recv())
        .await
        .expect("frame in time")
        .expect("frame");
    assert_eq!(sent, json!({"type": "start", "command": "agent", "name": "foo"}));

    for _ in 0..2 {
        let event = next_event(&mut stream_rx).await;
        console.apply_stream_event(event);
    }
    let started = console.registry().get("i1").expect("i1 mirrored");
    assert_eq!(started.status, "running");
    assert_eq!(started.name.as_deref(), Some("foo"));
    assert_eq!(console.registry().len(), 2);
    assert_eq!(console.view().rows().len(), 2);

    let disconnected = next_event(&mut stream_rx).await;
    assert!(matches!(
        disconnected,
        StreamEvent::Disconnected { retry_in, .. } if retry_in == RECONNECT_DELAY
    ));
    let dropped_at = Instant::now();
    console.apply_stream_event(disconnected);
    assert!(!console.is_connected());

    let reconnected = next_event(&mut stream_rx).await;
    assert_eq!(reconnected, StreamEvent::Connected);
    assert!(dropped_at.elapsed() >= RECONNECT_DELAY - Duration::from_millis(50));
    console.apply_stream_event(reconnected);

    let init = next_event(&mut stream_rx).await;
    console.apply_stream_event(init);
    assert_eq!(console.registry().ids().collect::<Vec<_>>(), vec!["fresh"]);
    assert_eq!(console.view().rows().len(), 1);
    assert!(console.registry().get("i1").is_none());
}
