mod auth;
mod db;
mod events;
mod names;
mod playback;
mod queues;
mod rooms;
mod search;
mod settings;
mod util;

pub use auth::*;
pub use db::*;
pub use events::*;
pub use playback::*;
pub use queues::*;
pub use rooms::*;
pub use search::*;
pub use settings::*;
pub use util::*;

use crossbeam::channel::unbounded;

/// The lockstep collab system, facilitating room coordination, playback state, and more.
pub struct Collab {
    pub auth: Auth,
    pub rooms: RoomManager,
    pub queues: QueueCoordinator,
    pub playback: PlaybackManager,
    pub settings: SettingsManager,
    pub search: VideoSearch,

    events: EventReceiver,
}

/// A type passed to the various managers of the collab system, to access state and emit events.
#[derive(Clone)]
pub struct CollabContext {
    pub database: ArcedDatabase,
    events: EventSender,
}

impl Collab {
    pub fn new(database: ArcedDatabase, youtube_api_key: Option<String>) -> Self {
        let (sender, receiver) = unbounded();

        let context = CollabContext {
            database,
            events: sender,
        };

        Self {
            auth: Auth::new(&context),
            rooms: RoomManager::new(&context),
            queues: QueueCoordinator::new(&context),
            playback: PlaybackManager::new(&context),
            settings: SettingsManager::new(&context),
            search: VideoSearch::new(youtube_api_key),
            events: receiver,
        }
    }

    /// Returns a receiver of the events emitted by the collab system.
    /// The server listens on this to turn domain events into room broadcasts.
    pub fn events(&self) -> EventReceiver {
        self.events.clone()
    }
}

impl CollabContext {
    pub fn emit(&self, event: CollabEvent) {
        // The receiver only disconnects on shutdown, so a failed send is fine to ignore
        self.events.send(event).ok();
    }
}
