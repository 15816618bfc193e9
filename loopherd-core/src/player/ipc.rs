//! Line-framed JSON control channel to a player process over its unix
//! socket. One connection per exchange; any transport failure is
//! reported as "no reply" and the caller moves on.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
struct WireRequest {
    command: Vec<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireReply {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Property-level control surface of a running player.
#[allow(async_fn_in_trait)]
pub trait PlayerControl: Send + Sync {
    /// Current value of a player property, or `None` when the player is
    /// unreachable or returned no data.
    async fn get_property(&self, loop_id: &str, name: &str) -> Option<Value>;

    async fn set_property(&self, loop_id: &str, name: &str, value: Value) -> Option<Value>;

    async fn seek_absolute(&self, loop_id: &str, seconds: f64) -> Option<Value>;
}

pub struct IpcBridge {
    socket_dir: PathBuf,
}

impl IpcBridge {
    pub fn new(socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
        }
    }

    pub fn socket_path(&self, loop_id: &str) -> PathBuf {
        self.socket_dir.join(loop_id)
    }

    /// One request, one reply line. `None` covers every failure mode:
    /// socket missing, connection refused, short read, bad JSON.
    pub async fn send(&self, loop_id: &str, command: Vec<Value>) -> Option<WireReply> {
        let path = self.socket_path(loop_id);
        let request = WireRequest { command };
        let mut line = serde_json::to_string(&request).ok()?;
        line.push('\n');

        let stream = match UnixStream::connect(&path).await {
            Ok(s) => s,
            Err(e) => {
                debug!(loop_id, error = %e, "player socket unreachable");
                return None;
            }
        };
        let (read_half, mut write_half) = stream.into_split();
        if write_half.write_all(line.as_bytes()).await.is_err() {
            return None;
        }
        let mut reply_line = String::new();
        let mut reader = BufReader::new(read_half);
        match reader.read_line(&mut reply_line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => serde_json::from_str(&reply_line).ok(),
        }
    }
}

impl PlayerControl for IpcBridge {
    async fn get_property(&self, loop_id: &str, name: &str) -> Option<Value> {
        let reply = self
            .send(loop_id, vec![json!("get_property"), json!(name)])
            .await?;
        reply.data
    }

    async fn set_property(&self, loop_id: &str, name: &str, value: Value) -> Option<Value> {
        let reply = self
            .send(loop_id, vec![json!("set_property"), json!(name), value])
            .await?;
        reply.data
    }

    async fn seek_absolute(&self, loop_id: &str, seconds: f64) -> Option<Value> {
        let reply = self
            .send(
                loop_id,
                vec![json!("seek"), json!(seconds), json!("absolute")],
            )
            .await?;
        reply.data
    }
}
