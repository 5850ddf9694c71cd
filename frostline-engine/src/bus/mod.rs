//! Message-bus subscriber task.
//!
//! Connects to the broker, subscribes to the single telemetry topic, and
//! forwards raw payloads to the engine task. Connection errors back off
//! for a fixed period and the event loop reconnects on its own; the
//! subscription is re-issued on every ConnAck because the broker may have
//! dropped the session.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::BusConfig;
use crate::tracing::prelude::*;

/// Delay before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Broker keep-alive interval.
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Event-loop request queue depth.
const REQUEST_QUEUE: usize = 32;

/// Run the bus subscription until cancellation.
pub async fn run(cfg: BusConfig, payload_tx: mpsc::Sender<Vec<u8>>, cancellation: CancellationToken) {
    let mut options = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
    options.set_keep_alive(KEEP_ALIVE);
    options.set_clean_session(false);

    if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
        options.set_credentials(user.clone(), pass.clone());
        info!("bus: using password authentication");
    }

    let (client, mut event_loop) = AsyncClient::new(options, REQUEST_QUEUE);

    if let Err(e) = client.subscribe(cfg.topic.as_str(), QoS::AtLeastOnce).await {
        error!(topic = %cfg.topic, "initial subscribe failed: {e}");
    }

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => {
                let _ = client.disconnect().await;
                break;
            }
            event = event_loop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        if payload_tx.send(publish.payload.to_vec()).await.is_err() {
                            // Engine gone; nothing left to do.
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(topic = %cfg.topic, "bus connected, (re)subscribing");
                        if let Err(e) = client.subscribe(cfg.topic.as_str(), QoS::AtLeastOnce).await {
                            error!(topic = %cfg.topic, "re-subscribe failed: {e}");
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("bus disconnected by broker");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("bus connection error, retrying in {}s: {e}", RECONNECT_DELAY.as_secs());
                        tokio::select! {
                            _ = cancellation.cancelled() => break,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                }
            }
        }
    }

    trace!("bus task stopped");
}
