use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Weak,
};

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use log::debug;
use parking_lot::Mutex;
use tokio::{
    spawn,
    sync::mpsc,
    task::JoinHandle,
    time::{interval, Duration, MissedTickBehavior},
};

use lockstep_collab::{
    now_ms, Collab, CollabEvent, NewQueueEntry, PlaybackControl, PrimaryKey, StateSync,
};

use crate::{
    context::ServerContext,
    errors::ServerError,
    fanout::Fanout,
    serialized::ToSerialized,
    Router,
};

mod messages;
pub use messages::*;

/// How often the authoritative playback target is re-broadcast to a room,
/// correcting any drift that built up on clients in between
pub const SYNC_INTERVAL: Duration = Duration::from_secs(7);

/// The realtime surface of the server. Keeps track of which socket belongs to
/// which room, turns client commands into collab operations, and pushes the
/// resulting broadcasts back out.
pub struct RoomGateway {
    me: Weak<RoomGateway>,
    collab: Arc<Collab>,
    fanout: Fanout,
    next_connection_id: AtomicUsize,
    connections: Mutex<Vec<GatewayConnection>>,
    sync_timers: DashMap<PrimaryKey, JoinHandle<()>>,
    /// The last sync each room was sent, which the resync timer advances
    /// along the server clock
    last_syncs: DashMap<PrimaryKey, StateSync>,
}

struct GatewayConnection {
    id: usize,
    room_id: PrimaryKey,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

/// The identity a socket acquires by joining a room. Dropping it removes the
/// connection from the gateway.
pub struct SocketSession {
    user_id: PrimaryKey,
    _handle: ConnectionHandle,
}

struct ConnectionHandle {
    gateway: Weak<RoomGateway>,
    id: usize,
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if let Some(gateway) = self.gateway.upgrade() {
            gateway.unregister(self.id);
        }
    }
}

impl RoomGateway {
    pub fn new(collab: Arc<Collab>, fanout: Fanout) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            collab,
            fanout,
            next_connection_id: Default::default(),
            connections: Default::default(),
            sync_timers: Default::default(),
            last_syncs: Default::default(),
        })
    }

    /// Handles one command from a socket. The first command must be a join,
    /// everything else is rejected until the socket has a session.
    pub async fn handle_command(
        &self,
        command: ClientCommand,
        session: &mut Option<SocketSession>,
        sender: &mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<(), ServerError> {
        if let ClientCommand::Join { room_id, user_id } = command {
            self.collab.rooms.assert_member(room_id, user_id).await?;

            let handle = self.register(room_id, sender.clone());
            *session = Some(SocketSession {
                user_id,
                _handle: handle,
            });

            // The joiner privately receives the current queue and playback
            // state, so they can render the room before any broadcast happens
            let items = self.collab.queues.items(room_id).await?;
            sender.send(ServerMessage::QueueSync(items.to_serialized())).ok();

            let state = self.collab.playback.state(room_id).await?;
            sender
                .send(ServerMessage::PlaybackState(state.to_serialized()))
                .ok();

            return Ok(());
        }

        let user_id = session
            .as_ref()
            .map(|s| s.user_id)
            .ok_or(ServerError::SessionRequired)?;

        let room_id = command.room_id();

        match command {
            ClientCommand::Join { .. } => unreachable!("handled above"),
            ClientCommand::PlaybackLoad { video_id, .. } => {
                self.collab.rooms.assert_host(room_id, user_id).await?;

                let state = self.collab.playback.load(room_id, video_id).await?;
                self.broadcast_state(room_id, &state);
            }
            ClientCommand::PlaybackPlay {
                video_id,
                position_ms,
                playback_rate,
                ..
            } => {
                self.collab.rooms.assert_host(room_id, user_id).await?;

                let control = PlaybackControl {
                    video_id,
                    position_ms,
                    playback_rate,
                };

                let state = self.collab.playback.play(room_id, control).await?;
                self.broadcast_state(room_id, &state);
            }
            ClientCommand::PlaybackPause {
                video_id,
                position_ms,
                playback_rate,
                ..
            } => {
                self.collab.rooms.assert_host(room_id, user_id).await?;

                let control = PlaybackControl {
                    video_id,
                    position_ms,
                    playback_rate,
                };

                let state = self.collab.playback.pause(room_id, control).await?;
                self.broadcast_state(room_id, &state);
            }
            ClientCommand::PlaybackSeek {
                video_id,
                position_ms,
                playback_rate,
                ..
            } => {
                self.collab.rooms.assert_host(room_id, user_id).await?;

                let control = PlaybackControl {
                    video_id,
                    position_ms,
                    playback_rate,
                };

                let state = self.collab.playback.seek(room_id, control).await?;
                self.broadcast_state(room_id, &state);
            }
            ClientCommand::QueueAdd {
                video_id,
                title,
                duration_seconds,
                ..
            } => {
                let entry = NewQueueEntry {
                    video_id,
                    title,
                    duration_seconds,
                };

                // The resulting broadcast comes through the event channel
                self.collab.queues.add(room_id, user_id, entry).await?;
            }
            ClientCommand::QueueRemove { item_id, .. } => {
                self.collab.queues.remove(room_id, item_id, user_id).await?;
            }
            ClientCommand::QueueNext { .. } => {
                self.collab.rooms.assert_host(room_id, user_id).await?;

                if let Some((_, state)) = self.collab.queues.take_next(room_id).await? {
                    self.broadcast_state(room_id, &state);
                }
            }
        }

        Ok(())
    }

    /// Translates a collab event into a room broadcast
    pub fn dispatch_event(&self, event: CollabEvent) {
        match event {
            CollabEvent::QueueUpdated { room_id, items } => {
                self.broadcast(room_id, ServerMessage::QueueUpdated(items.to_serialized()));
            }
            CollabEvent::SettingsUpdated {
                room_id,
                allow_guest_enqueue,
            } => {
                self.broadcast(
                    room_id,
                    ServerMessage::SettingsUpdated {
                        room_id,
                        allow_guest_enqueue,
                    },
                );
            }
        }
    }

    /// Sends a message to every local member of a room and to the other
    /// instances through the fanout
    pub fn broadcast(&self, room_id: PrimaryKey, message: ServerMessage) {
        self.fanout.publish(room_id, &message);
        self.broadcast_local(room_id, message);
    }

    /// Sends a message to every member of a room connected to this instance
    pub fn broadcast_local(&self, room_id: PrimaryKey, message: ServerMessage) {
        let connections = self.connections.lock();

        for connection in connections.iter().filter(|c| c.room_id == room_id) {
            connection.sender.send(message.clone()).ok();
        }
    }

    /// Stops all sync timers. Connections close with the sockets they serve.
    pub fn shutdown(&self) {
        for entry in self.sync_timers.iter() {
            entry.value().abort();
        }

        self.sync_timers.clear();
    }

    fn broadcast_state(&self, room_id: PrimaryKey, state: &lockstep_collab::PlaybackStateData) {
        let sync = StateSync::from_state(state, now_ms());
        self.last_syncs.insert(room_id, sync.clone());

        self.broadcast(room_id, ServerMessage::StateSync(sync));
        self.ensure_sync_timer(room_id);
    }

    fn register(&self, room_id: PrimaryKey, sender: mpsc::UnboundedSender<ServerMessage>) -> ConnectionHandle {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);

        self.connections.lock().push(GatewayConnection {
            id,
            room_id,
            sender,
        });

        ConnectionHandle {
            gateway: self.me.clone(),
            id,
        }
    }

    fn unregister(&self, id: usize) {
        self.connections.lock().retain(|c| c.id != id);
    }

    fn has_connections(&self, room_id: PrimaryKey) -> bool {
        self.connections.lock().iter().any(|c| c.room_id == room_id)
    }

    /// Starts the periodic resync for a room, if it isn't running already.
    /// The entry is claimed atomically so two broadcasts racing each other
    /// cannot end up with a second, unstoppable timer.
    /// The timer stops itself once the room has no local members left.
    fn ensure_sync_timer(&self, room_id: PrimaryKey) {
        self.sync_timers.entry(room_id).or_insert_with(|| {
            let me = self.me.clone();

            spawn(async move {
                let mut timer = interval(SYNC_INTERVAL);
                timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

                // The first tick completes immediately and would double up
                // with the broadcast that started the timer
                timer.tick().await;

                loop {
                    timer.tick().await;

                    let Some(gateway) = me.upgrade() else {
                        break;
                    };

                    if !gateway.has_connections(room_id) {
                        gateway.sync_timers.remove(&room_id);
                        gateway.last_syncs.remove(&room_id);
                        break;
                    }

                    let resync = gateway
                        .last_syncs
                        .get(&room_id)
                        .map(|sync| sync.advanced_to(now_ms()));

                    if let Some(resync) = resync {
                        gateway.broadcast_local(room_id, ServerMessage::StateSync(resync));
                    }
                }
            })
        });
    }
}

/// Serves one gateway socket until it closes
pub async fn handle_socket(gateway: Arc<RoomGateway>, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (sender, mut receiver) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = spawn(async move {
        while let Some(message) = receiver.recv().await {
            let Ok(text) = serde_json::to_string(&message) else {
                continue;
            };

            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let mut session: Option<SocketSession> = None;

    while let Some(Ok(message)) = stream.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let command: ClientCommand = match serde_json::from_str(&text) {
            Ok(command) => command,
            Err(e) => {
                debug!("Discarding malformed gateway message: {}", e);

                sender
                    .send(ServerMessage::Error {
                        code: "BAD_MESSAGE".to_string(),
                        message: "Could not parse message".to_string(),
                    })
                    .ok();

                continue;
            }
        };

        if let Err(e) = gateway.handle_command(command, &mut session, &sender).await {
            sender
                .send(ServerMessage::Error {
                    code: e.code().to_string(),
                    message: e.to_string(),
                })
                .ok();
        }
    }

    writer.abort();
}

async fn gateway_handler(context: ServerContext, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(context.gateway.clone(), socket))
}

pub fn router() -> Router {
    Router::new().route("/rooms/gateway", get(gateway_handler))
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use lockstep_collab::{Collab, MemoryDatabase};
    use serde_json::Value;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use super::*;

    struct TestClient {
        session: Option<SocketSession>,
        sender: mpsc::UnboundedSender<ServerMessage>,
        receiver: UnboundedReceiver<ServerMessage>,
    }

    impl TestClient {
        fn new() -> Self {
            let (sender, receiver) = mpsc::unbounded_channel();

            Self {
                session: None,
                sender,
                receiver,
            }
        }

        async fn send(
            &mut self,
            gateway: &RoomGateway,
            command: ClientCommand,
        ) -> Result<(), ServerError> {
            gateway
                .handle_command(command, &mut self.session, &self.sender)
                .await
        }

        fn next_message(&mut self) -> ServerMessage {
            self.receiver.try_recv().expect("a message was pushed")
        }

        fn next_json(&mut self) -> Value {
            serde_json::to_value(self.next_message()).expect("message serializes")
        }
    }

    async fn setup() -> (Arc<Collab>, Arc<RoomGateway>, PrimaryKey, PrimaryKey, PrimaryKey) {
        let collab = Arc::new(Collab::new(Arc::new(MemoryDatabase::new()), None));
        let gateway = RoomGateway::new(collab.clone(), Fanout::disabled());

        let host = collab.auth.get_or_create_user(None).await.unwrap();
        let room = collab.rooms.create_room(host.id).await.unwrap();
        let guest = collab.auth.get_or_create_user(None).await.unwrap();
        collab.rooms.join_room(&room.code, guest.id).await.unwrap();

        (collab, gateway, room.id, host.id, guest.id)
    }

    #[tokio::test]
    async fn test_join_replies_with_queue_and_playback() {
        let (_, gateway, room_id, host_id, _) = setup().await;
        let mut client = TestClient::new();

        client
            .send(
                &gateway,
                ClientCommand::Join {
                    room_id,
                    user_id: host_id,
                },
            )
            .await
            .expect("join succeeds");

        let queue = client.next_json();
        assert_eq!(queue["event"], "queue.sync");

        let playback = client.next_json();
        assert_eq!(playback["event"], "playback.state");
        assert_eq!(playback["data"]["isPlaying"], false);
    }

    #[tokio::test]
    async fn test_commands_require_a_join_first() {
        let (_, gateway, room_id, _, _) = setup().await;
        let mut client = TestClient::new();

        let result = client
            .send(&gateway, ClientCommand::QueueNext { room_id })
            .await;

        assert!(matches!(result, Err(ServerError::SessionRequired)));
    }

    #[tokio::test]
    async fn test_nonmember_cannot_join() {
        let (collab, gateway, room_id, _, _) = setup().await;
        let outsider = collab.auth.get_or_create_user(None).await.unwrap();

        let mut client = TestClient::new();

        let result = client
            .send(
                &gateway,
                ClientCommand::Join {
                    room_id,
                    user_id: outsider.id,
                },
            )
            .await;

        assert!(matches!(result, Err(ServerError::NotAMember)));
    }

    #[tokio::test]
    async fn test_host_controls_reach_everyone_in_the_room() {
        let (_, gateway, room_id, host_id, guest_id) = setup().await;

        let mut host = TestClient::new();
        let mut guest = TestClient::new();

        host.send(
            &gateway,
            ClientCommand::Join {
                room_id,
                user_id: host_id,
            },
        )
        .await
        .expect("host joins");

        guest
            .send(
                &gateway,
                ClientCommand::Join {
                    room_id,
                    user_id: guest_id,
                },
            )
            .await
            .expect("guest joins");

        // Drain the private join replies
        host.next_message();
        host.next_message();
        guest.next_message();
        guest.next_message();

        host.send(
            &gateway,
            ClientCommand::PlaybackLoad {
                room_id,
                video_id: "video".to_string(),
            },
        )
        .await
        .expect("host loads a video");

        host.send(
            &gateway,
            ClientCommand::PlaybackPlay {
                room_id,
                video_id: None,
                position_ms: 1_000,
                playback_rate: None,
            },
        )
        .await
        .expect("host starts playback");

        // Both clients got the load sync and the play sync
        for client in [&mut host, &mut guest] {
            let load = client.next_json();
            assert_eq!(load["event"], "state.sync");
            assert_eq!(load["data"]["isPlaying"], false);
            assert_eq!(load["data"]["videoId"], "video");

            let play = client.next_json();
            assert_eq!(play["event"], "state.sync");
            assert_eq!(play["data"]["isPlaying"], true);
            assert_eq!(play["data"]["positionAtEmitMs"], 1_000);
        }
    }

    #[tokio::test]
    async fn test_guests_cannot_control_playback() {
        let (_, gateway, room_id, _, guest_id) = setup().await;
        let mut guest = TestClient::new();

        guest
            .send(
                &gateway,
                ClientCommand::Join {
                    room_id,
                    user_id: guest_id,
                },
            )
            .await
            .expect("guest joins");

        let result = guest
            .send(
                &gateway,
                ClientCommand::PlaybackPlay {
                    room_id,
                    video_id: Some("video".to_string()),
                    position_ms: 0,
                    playback_rate: None,
                },
            )
            .await;

        assert!(matches!(result, Err(ServerError::OnlyHost)));

        let result = guest
            .send(&gateway, ClientCommand::QueueNext { room_id })
            .await;

        assert!(matches!(result, Err(ServerError::OnlyHost)));
    }

    #[tokio::test]
    async fn test_queue_changes_broadcast_through_events() {
        let (collab, gateway, room_id, host_id, guest_id) = setup().await;
        let events = collab.events();

        let mut guest = TestClient::new();
        guest
            .send(
                &gateway,
                ClientCommand::Join {
                    room_id,
                    user_id: guest_id,
                },
            )
            .await
            .expect("guest joins");

        guest.next_message();
        guest.next_message();

        collab
            .queues
            .add(
                room_id,
                host_id,
                NewQueueEntry {
                    video_id: "video".to_string(),
                    title: "Title".to_string(),
                    duration_seconds: None,
                },
            )
            .await
            .expect("item is added");

        gateway.dispatch_event(events.try_recv().expect("an event was emitted"));

        let update = guest.next_json();
        assert_eq!(update["event"], "queue.updated");
        assert_eq!(update["data"][0]["videoId"], "video");
    }

    #[tokio::test]
    async fn test_queue_next_broadcasts_a_paused_start() {
        let (collab, gateway, room_id, host_id, _) = setup().await;

        let mut host = TestClient::new();
        host.send(
            &gateway,
            ClientCommand::Join {
                room_id,
                user_id: host_id,
            },
        )
        .await
        .expect("host joins");

        host.next_message();
        host.next_message();

        collab
            .queues
            .add(
                room_id,
                host_id,
                NewQueueEntry {
                    video_id: "next-up".to_string(),
                    title: "Title".to_string(),
                    duration_seconds: None,
                },
            )
            .await
            .expect("item is added");

        host.send(&gateway, ClientCommand::QueueNext { room_id })
            .await
            .expect("host advances the queue");

        let sync = host.next_json();
        assert_eq!(sync["event"], "state.sync");
        assert_eq!(sync["data"]["videoId"], "next-up");
        assert_eq!(sync["data"]["isPlaying"], false);
        assert_eq!(sync["data"]["positionAtEmitMs"], 0);

        // An empty queue is a silent no-op
        host.send(&gateway, ClientCommand::QueueNext { room_id })
            .await
            .expect("advancing an empty queue is fine");

        assert!(host.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_repeated_broadcasts_keep_a_single_timer() {
        let (_, gateway, room_id, host_id, _) = setup().await;

        let mut host = TestClient::new();
        host.send(
            &gateway,
            ClientCommand::Join {
                room_id,
                user_id: host_id,
            },
        )
        .await
        .expect("host joins");

        host.send(
            &gateway,
            ClientCommand::PlaybackLoad {
                room_id,
                video_id: "video".to_string(),
            },
        )
        .await
        .expect("host loads a video");

        host.send(
            &gateway,
            ClientCommand::PlaybackPlay {
                room_id,
                video_id: None,
                position_ms: 500,
                playback_rate: None,
            },
        )
        .await
        .expect("host starts playback");

        assert_eq!(gateway.sync_timers.len(), 1);

        // The resync source follows the latest broadcast
        let sync = gateway
            .last_syncs
            .get(&room_id)
            .map(|s| s.clone())
            .expect("a sync was cached");

        assert!(sync.is_playing);
        assert_eq!(sync.position_at_emit_ms, 500);
    }

    #[tokio::test]
    async fn test_disconnect_unregisters_the_connection() {
        let (_, gateway, room_id, host_id, _) = setup().await;

        let mut client = TestClient::new();
        client
            .send(
                &gateway,
                ClientCommand::Join {
                    room_id,
                    user_id: host_id,
                },
            )
            .await
            .expect("join succeeds");

        assert!(gateway.has_connections(room_id));

        client.session = None;
        assert!(!gateway.has_connections(room_id));
    }
}
