use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use bugsus_core::net::messages::{ClientMessage, ServerMessage};
use bugsus_core::net::protocol::{decode_server_message, encode_client_message};

use bugsus_server::build_app;
use bugsus_server::config::ServerConfig;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    _shutdown: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with default config.
    pub async fn new() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, _state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

/// Connect a WebSocket client to the given URL.
pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Send a raw text frame.
pub async fn ws_send_text(stream: &mut WsStream, text: &str) {
    stream.send(Message::Text(text.into())).await.unwrap();
}

/// Send a ClientMessage.
pub async fn ws_send_client_msg(stream: &mut WsStream, msg: &ClientMessage) {
    let encoded = encode_client_message(msg).unwrap();
    ws_send_text(stream, &encoded).await;
}

/// Read the next text frame (5s timeout).
pub async fn ws_read_text(stream: &mut WsStream) -> String {
    let deadline = Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for WebSocket message")
}

/// Read the next ServerMessage (5s timeout).
pub async fn ws_read_server_msg(stream: &mut WsStream) -> ServerMessage {
    let text = ws_read_text(stream).await;
    decode_server_message(&text).unwrap()
}

/// Try to read a ServerMessage, returning None on timeout.
pub async fn ws_try_read_server_msg(stream: &mut WsStream, timeout_ms: u64) -> Option<ServerMessage> {
    tokio::time::timeout(Duration::from_millis(timeout_ms), ws_read_server_msg(stream))
        .await
        .ok()
}

/// Skip messages until one of the given kind arrives.
pub async fn ws_read_until(stream: &mut WsStream, kind: &str) -> ServerMessage {
    loop {
        let msg = ws_read_server_msg(stream).await;
        if msg.kind() == kind {
            return msg;
        }
    }
}

/// Create a room. Returns the room code.
pub async fn ws_create_room(stream: &mut WsStream, username: &str) -> String {
    let msg = ClientMessage::CreateRoom {
        username: username.to_string(),
    };
    ws_send_client_msg(stream, &msg).await;

    match ws_read_server_msg(stream).await {
        ServerMessage::RoomCreated { room_id, players } => {
            assert_eq!(players.len(), 1);
            room_id
        },
        other => panic!("Expected RoomCreated, got: {other:?}"),
    }
}

/// Send a join request and return the first reply.
pub async fn ws_join_room(stream: &mut WsStream, room_id: &str, username: &str) -> ServerMessage {
    let msg = ClientMessage::JoinRoom {
        room_id: room_id.to_string(),
        username: username.to_string(),
    };
    ws_send_client_msg(stream, &msg).await;
    ws_read_server_msg(stream).await
}

/// Create a room with `n` connected players. The first stream is the host.
/// Every stream has consumed the join traffic.
pub async fn ws_full_room(server: &TestServer, n: usize) -> (String, Vec<WsStream>) {
    let mut host = ws_connect(&server.ws_url()).await;
    let code = ws_create_room(&mut host, "Player1").await;
    let mut streams = vec![host];

    for i in 2..=n {
        let mut stream = ws_connect(&server.ws_url()).await;
        match ws_join_room(&mut stream, &code, &format!("Player{i}")).await {
            ServerMessage::RoomJoined { players, .. } => assert_eq!(players.len(), i),
            other => panic!("Expected RoomJoined, got: {other:?}"),
        }
        // Everyone already seated sees the new player list.
        for earlier in &mut streams {
            match ws_read_server_msg(earlier).await {
                ServerMessage::PlayerListUpdate { players, .. } => assert_eq!(players.len(), i),
                other => panic!("Expected PlayerListUpdate, got: {other:?}"),
            }
        }
        streams.push(stream);
    }
    (code, streams)
}
