use std::{collections::HashMap, net::SocketAddr};

use {
    serde_json::Value,
    tokio::sync::{RwLock, mpsc},
    tracing::debug,
};

use encore_protocol::ServerFrame;

// ── Observer channel ─────────────────────────────────────────────────────────

/// One connected client's outbound link.
#[derive(Debug)]
pub struct ObserverChannel {
    pub conn_id: String,
    pub remote_addr: Option<SocketAddr>,
    /// Feeds the client's write loop with serialized frames.
    sender: mpsc::UnboundedSender<String>,
}

impl ObserverChannel {
    pub fn new(
        conn_id: impl Into<String>,
        sender: mpsc::UnboundedSender<String>,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            conn_id: conn_id.into(),
            remote_addr,
            sender,
        }
    }

    /// Queue a serialized frame. False when the write loop is gone.
    pub fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

// ── Relay ────────────────────────────────────────────────────────────────────

/// Mirrors playback state from one client to every other connected client.
///
/// No ordering, no persistence, no validation of the payload.
#[derive(Default)]
pub struct Relay {
    channels: RwLock<HashMap<String, ObserverChannel>>,
}

impl Relay {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn on_connect(&self, channel: ObserverChannel) {
        debug!(
            conn_id = %channel.conn_id,
            remote_addr = ?channel.remote_addr,
            "observer attached"
        );
        self.channels
            .write()
            .await
            .insert(channel.conn_id.clone(), channel);
    }

    /// Detach a channel. Returns false if it was already gone.
    pub async fn on_disconnect(&self, conn_id: &str) -> bool {
        let removed = self.channels.write().await.remove(conn_id).is_some();
        if removed {
            debug!(conn_id, "observer detached");
        }
        removed
    }

    /// Forward `payload` to every channel except `origin`.
    ///
    /// Returns how many channels the frame was queued to. Channels whose
    /// write loop already ended are skipped.
    pub async fn on_state_update(&self, origin: &str, payload: Value) -> usize {
        let frame = ServerFrame::StateUpdate { payload }.to_text();
        let channels = self.channels.read().await;
        let mut delivered = 0;
        for (conn_id, channel) in channels.iter() {
            if conn_id == origin {
                continue;
            }
            if channel.send(&frame) {
                delivered += 1;
            } else {
                debug!(conn_id = %conn_id, "skipping closed observer");
            }
        }
        delivered
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Send a frame to a single channel.
    pub async fn send_to(&self, conn_id: &str, frame: &ServerFrame) -> bool {
        match self.channels.read().await.get(conn_id) {
            Some(channel) => channel.send(&frame.to_text()),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn channel(id: &str) -> (ObserverChannel, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ObserverChannel::new(id, tx, None), rx)
    }

    #[tokio::test]
    async fn update_reaches_everyone_but_the_sender() {
        let relay = Relay::new();
        let (a, mut rx_a) = channel("a");
        let (b, mut rx_b) = channel("b");
        let (c, mut rx_c) = channel("c");
        relay.on_connect(a).await;
        relay.on_connect(b).await;
        relay.on_connect(c).await;

        let payload = json!({"isPlaying": true, "track": {"name": "Song"}});
        let delivered = relay.on_state_update("a", payload.clone()).await;
        assert_eq!(delivered, 2);

        let expected = ServerFrame::StateUpdate { payload }.to_text();
        assert_eq!(rx_b.try_recv().unwrap(), expected);
        assert_eq!(rx_c.try_recv().unwrap(), expected);
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_channel_does_not_block_others() {
        let relay = Relay::new();
        let (a, _rx_a) = channel("a");
        let (b, rx_b) = channel("b");
        let (c, mut rx_c) = channel("c");
        relay.on_connect(a).await;
        relay.on_connect(b).await;
        relay.on_connect(c).await;

        // b's write loop went away without a disconnect yet.
        drop(rx_b);
        let delivered = relay.on_state_update("a", json!({"n": 1})).await;
        assert_eq!(delivered, 1);
        assert!(rx_c.try_recv().is_ok());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let relay = Relay::new();
        let (a, _rx) = channel("a");
        relay.on_connect(a).await;
        assert_eq!(relay.channel_count().await, 1);

        assert!(relay.on_disconnect("a").await);
        assert!(!relay.on_disconnect("a").await);
        assert_eq!(relay.channel_count().await, 0);
        assert_eq!(relay.on_state_update("a", json!(null)).await, 0);
    }

    #[tokio::test]
    async fn unknown_origin_reaches_all() {
        let relay = Relay::new();
        let (a, mut rx_a) = channel("a");
        relay.on_connect(a).await;
        assert_eq!(relay.on_state_update("ghost", json!([1, 2])).await, 1);
        assert!(rx_a.try_recv().unwrap().contains("state-update"));
    }

    #[tokio::test]
    async fn send_to_targets_one_channel() {
        let relay = Relay::new();
        let (a, mut rx_a) = channel("a");
        let (b, mut rx_b) = channel("b");
        relay.on_connect(a).await;
        relay.on_connect(b).await;

        assert!(relay.send_to("b", &ServerFrame::error("bad frame")).await);
        assert!(!relay.send_to("zzz", &ServerFrame::error("x")).await);
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().unwrap().contains("bad frame"));
    }
}
