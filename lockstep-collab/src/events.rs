use crossbeam::channel::{Receiver, Sender};

use crate::{PrimaryKey, QueueItemData};

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// Events emitted by the collab system, to be consumed by the server
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// A room's queue changed, and everyone in the room should hear about it
    QueueUpdated {
        room_id: PrimaryKey,
        items: Vec<QueueItemData>,
    },
    /// A room's settings changed
    SettingsUpdated {
        room_id: PrimaryKey,
        allow_guest_enqueue: bool,
    },
}
