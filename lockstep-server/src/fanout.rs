use std::{sync::Arc, thread, time::Duration};

use crossbeam::channel::{unbounded, Sender};
use log::{info, warn};
use redis::Commands;
use serde::{Deserialize, Serialize};

use lockstep_collab::{random_string, PrimaryKey};

use crate::gateway::{RoomGateway, ServerMessage};

/// The pub/sub channel all instances share
pub const FANOUT_CHANNEL: &str = "lockstep:rooms";

const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Relays room broadcasts between server instances through redis pub/sub, so
/// members of the same room connected to different instances stay in sync.
///
/// Without a redis connection the fanout is a no-op and rooms only span a
/// single instance, which is fine for a lone deployment.
#[derive(Clone)]
pub struct Fanout {
    /// A random id distinguishing this process, so it can ignore its own
    /// publishes coming back around
    instance: String,
    publisher: Option<Sender<Envelope>>,
    client: Option<redis::Client>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    instance: String,
    room_id: PrimaryKey,
    message: ServerMessage,
}

impl Fanout {
    pub fn connect(redis_url: &str) -> Self {
        let instance = random_string(16);

        let client = match redis::Client::open(redis_url) {
            Ok(client) => client,
            Err(e) => {
                warn!("Invalid redis url, fanout is disabled: {}", e);
                return Self::disabled();
            }
        };

        // Probe the connection now so a dead redis degrades at boot instead
        // of surfacing as silent message loss later
        if let Err(e) = client.get_connection() {
            warn!("Could not reach redis, fanout is disabled: {}", e);
            return Self::disabled();
        }

        let (sender, receiver) = unbounded::<Envelope>();
        let publish_client = client.clone();

        thread::spawn(move || {
            while let Ok(envelope) = receiver.recv() {
                let payload = match serde_json::to_string(&envelope) {
                    Ok(payload) => payload,
                    Err(_) => continue,
                };

                let result = publish_client
                    .get_connection()
                    .and_then(|mut conn| conn.publish::<_, _, ()>(FANOUT_CHANNEL, payload));

                if let Err(e) = result {
                    warn!("Failed to publish to redis: {}", e);
                }
            }
        });

        info!("Fanout connected to redis");

        Self {
            instance,
            publisher: Some(sender),
            client: Some(client),
        }
    }

    /// A fanout that never leaves this process
    pub fn disabled() -> Self {
        Self {
            instance: random_string(16),
            publisher: None,
            client: None,
        }
    }

    /// Publishes a room broadcast to the other instances
    pub fn publish(&self, room_id: PrimaryKey, message: &ServerMessage) {
        if let Some(publisher) = &self.publisher {
            let envelope = Envelope {
                instance: self.instance.clone(),
                room_id,
                message: message.clone(),
            };

            publisher.send(envelope).ok();
        }
    }

    /// Starts the subscriber loop, delivering messages published by other
    /// instances to the local gateway
    pub fn start(&self, gateway: Arc<RoomGateway>) {
        let Some(client) = self.client.clone() else {
            return;
        };

        let instance = self.instance.clone();

        thread::spawn(move || loop {
            let result = client.get_connection().and_then(|mut conn| -> redis::RedisResult<()> {
                let mut pubsub = conn.as_pubsub();
                pubsub.subscribe(FANOUT_CHANNEL)?;

                loop {
                    let message = pubsub.get_message()?;
                    let payload: String = message.get_payload()?;

                    let Ok(envelope) = serde_json::from_str::<Envelope>(&payload) else {
                        continue;
                    };

                    if envelope.instance != instance {
                        gateway.broadcast_local(envelope.room_id, envelope.message);
                    }
                }
            });

            if let Err(e) = result {
                warn!("Fanout subscription dropped, retrying: {}", e);
            }

            thread::sleep(RETRY_INTERVAL);
        });
    }
}
