use anyhow::{Context, Result};
use futures_util::StreamExt;
use redis::{AsyncCommands, Client, Msg};
use rentloop_core::{OutboundEvent, RealtimeEvent};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let _: i64 = connection.publish(channel, serialized).await?;
        Ok(())
    }
}

/// Bridges the socket relay's Redis channels: inbound frames become
/// [`RealtimeEvent`]s, outbound events are published as `{event, data}`.
#[derive(Clone)]
pub struct RealtimeRelay {
    bus: RedisBus,
    inbound_channel: String,
    emit_channel: String,
}

impl RealtimeRelay {
    pub fn new(
        bus: RedisBus,
        inbound_channel: impl Into<String>,
        emit_channel: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            inbound_channel: inbound_channel.into(),
            emit_channel: emit_channel.into(),
        }
    }

    pub async fn emit(&self, event: &OutboundEvent) -> Result<()> {
        self.bus
            .publish_json(&self.emit_channel, event)
            .await
            .with_context(|| format!("failed to publish to {}", self.emit_channel))
    }

    /// Subscribes to the inbound channel and forwards decoded events until
    /// the stream ends or the receiver is dropped.
    pub async fn spawn_listener(&self, events: mpsc::Sender<RealtimeEvent>) -> Result<JoinHandle<()>> {
        let mut pubsub = self.bus.client().get_async_pubsub().await?;
        pubsub.subscribe(&self.inbound_channel).await?;
        info!("realtime relay subscribed to {}", self.inbound_channel);

        let channel = self.inbound_channel.clone();
        Ok(tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            while let Some(msg) = messages.next().await {
                let Some(event) = decode_message(&msg) else {
                    continue;
                };
                debug!("realtime {:?} on {channel}", event.kind);
                if events.send(event).await.is_err() {
                    info!("realtime consumer dropped, stopping relay");
                    return;
                }
            }
            error!("{channel} stream ended unexpectedly");
        }))
    }
}

fn decode_message(msg: &Msg) -> Option<RealtimeEvent> {
    let payload: String = match msg.get_payload() {
        Ok(payload) => payload,
        Err(err) => {
            warn!("unreadable realtime payload: {err}");
            return None;
        }
    };
    decode_frame(&payload)
}

fn decode_frame(payload: &str) -> Option<RealtimeEvent> {
    let event = RealtimeEvent::from_frame(payload);
    if event.is_none() {
        debug!("ignoring realtime frame: {payload}");
    }
    event
}

#[cfg(test)]
mod tests {
    use rentloop_core::RealtimeEventKind;

    use super::*;

    #[test]
    fn known_frames_decode() {
        let event = decode_frame(
            r#"{"event":"contractSigned","data":{"contractId":"c-1","propertyId":"p-1"}}"#,
        )
        .unwrap();
        assert_eq!(event.kind, RealtimeEventKind::ContractSigned);
        assert_eq!(event.property_id(), Some("p-1"));
    }

    #[test]
    fn garbage_frames_are_ignored() {
        assert!(decode_frame("not json").is_none());
        assert!(decode_frame(r#"{"event":"somethingElse","data":{}}"#).is_none());
    }

    #[test]
    fn relay_accepts_redis_urls() {
        let bus = RedisBus::connect("redis://127.0.0.1:6379/").unwrap();
        let relay = RealtimeRelay::new(bus, "in", "out");
        assert_eq!(relay.inbound_channel, "in");
        assert_eq!(relay.emit_channel, "out");
    }
}
