use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::auth::User;

use super::message::{Content, Message, MessageKind, Presence};

/// Serialized frames waiting for a client's write pump.
pub type Outbound = mpsc::Receiver<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The hub's side of a connection. Dropping it closes the client's queue.
#[derive(Debug)]
pub struct ClientHandle {
    pub id: ClientId,
    pub user: User,
    queue: mpsc::Sender<String>,
}

enum HubEvent {
    Register(ClientHandle),
    Unregister(ClientId),
    Broadcast(String),
    SendToUser { user_id: String, message: Message },
    Snapshot(oneshot::Sender<Presence>),
}

/// Handle to the hub loop. Cloning is cheap; every clone feeds the same loop.
#[derive(Debug, Clone)]
pub struct Hub {
    events: mpsc::UnboundedSender<HubEvent>,
    next_id: Arc<AtomicU64>,
    send_buffer: usize,
}

impl Hub {
    /// Starts the hub loop on the current runtime. It runs until every handle is dropped.
    pub fn spawn(send_buffer: usize) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        tokio::spawn(HubState::default().run(rx));

        Self {
            events,
            next_id: Arc::new(AtomicU64::new(1)),
            send_buffer: send_buffer.max(1),
        }
    }

    pub fn new_client(&self, user: User) -> (ClientHandle, Outbound) {
        let (queue, outbound) = mpsc::channel(self.send_buffer);
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        (ClientHandle { id, user, queue }, outbound)
    }

    pub fn register(&self, client: ClientHandle) {
        self.submit(HubEvent::Register(client));
    }

    pub fn unregister(&self, id: ClientId) {
        self.submit(HubEvent::Unregister(id));
    }

    pub fn broadcast(&self, frame: String) {
        self.submit(HubEvent::Broadcast(frame));
    }

    pub fn broadcast_message(&self, message: &Message) {
        match message.to_json() {
            Ok(frame) => self.broadcast(frame),
            Err(err) => warn!(event = "encode_failed", kind = message.kind.as_str(), error = %err),
        }
    }

    /// Delivers to the user's current connection only. Unknown users are ignored.
    pub fn send_to_user(&self, user_id: &str, message: Message) {
        self.submit(HubEvent::SendToUser {
            user_id: user_id.to_owned(),
            message,
        });
    }

    /// Roster and live connection count as seen after every event queued before this call.
    pub async fn snapshot(&self) -> Presence {
        let (reply, rx) = oneshot::channel();
        self.submit(HubEvent::Snapshot(reply));
        rx.await.unwrap_or_default()
    }

    pub async fn online_users(&self) -> Vec<User> {
        self.snapshot().await.online_users
    }

    fn submit(&self, event: HubEvent) {
        if self.events.send(event).is_err() {
            warn!(event = "hub_stopped");
        }
    }
}

#[derive(Default)]
struct HubState {
    clients: HashMap<ClientId, ClientHandle>,
    users: BTreeMap<String, ClientId>,
}

impl HubState {
    async fn run(mut self, mut events: mpsc::UnboundedReceiver<HubEvent>) {
        info!(event = "hub_started");
        while let Some(event) = events.recv().await {
            match event {
                HubEvent::Register(client) => self.register(client),
                HubEvent::Unregister(id) => self.unregister(id),
                HubEvent::Broadcast(frame) => self.fan_out(&frame),
                HubEvent::SendToUser { user_id, message } => self.send_to_user(&user_id, &message),
                HubEvent::Snapshot(reply) => {
                    let _ = reply.send(self.presence());
                }
            }
        }
        info!(event = "hub_stopped", clients = self.clients.len());
    }

    fn register(&mut self, client: ClientHandle) {
        let user = client.user.clone();
        if !user.id.is_empty() {
            if let Some(previous) = self.users.insert(user.id.clone(), client.id) {
                debug!(event = "user_shadowed", user_id = %user.id, previous = %previous, client_id = %client.id);
            }
        }
        info!(event = "client_connected", client_id = %client.id, user_id = %user.id, clients = self.clients.len() + 1);
        self.clients.insert(client.id, client);

        self.announce(MessageKind::Join, user);
    }

    fn unregister(&mut self, id: ClientId) {
        let Some(client) = self.remove(id) else {
            return;
        };
        info!(event = "client_disconnected", client_id = %id, user_id = %client.user.id, clients = self.clients.len());

        self.announce(MessageKind::Leave, client.user);
    }

    /// Takes a client out of both collections. The user mapping only goes if it still points here.
    fn remove(&mut self, id: ClientId) -> Option<ClientHandle> {
        let client = self.clients.remove(&id)?;
        if self.users.get(&client.user.id) == Some(&id) {
            self.users.remove(&client.user.id);
        }
        Some(client)
    }

    fn announce(&mut self, kind: MessageKind, user: User) {
        let message = Message::new(kind, user, Content::Presence(self.presence()));
        match message.to_json() {
            Ok(frame) => self.fan_out(&frame),
            Err(err) => warn!(event = "encode_failed", kind = message.kind.as_str(), error = %err),
        }
    }

    fn fan_out(&mut self, frame: &str) {
        let stalled: Vec<ClientId> = self
            .clients
            .values()
            .filter(|client| client.queue.try_send(frame.to_owned()).is_err())
            .map(|client| client.id)
            .collect();

        for id in stalled {
            if let Some(client) = self.remove(id) {
                warn!(event = "client_dropped", client_id = %id, user_id = %client.user.id, reason = "queue_full");
            }
        }
    }

    fn send_to_user(&mut self, user_id: &str, message: &Message) {
        let Some(&id) = self.users.get(user_id) else {
            debug!(event = "recipient_offline", user_id);
            return;
        };
        let frame = match message.to_json() {
            Ok(frame) => frame,
            Err(err) => {
                warn!(event = "encode_failed", kind = message.kind.as_str(), error = %err);
                return;
            }
        };

        let delivered = self
            .clients
            .get(&id)
            .is_some_and(|client| client.queue.try_send(frame).is_ok());
        if !delivered {
            self.remove(id);
            warn!(event = "client_dropped", client_id = %id, user_id, reason = "queue_full");
        }
    }

    fn presence(&self) -> Presence {
        let online_users = self
            .users
            .values()
            .filter_map(|id| self.clients.get(id))
            .map(|client| client.user.clone())
            .collect();

        Presence {
            user_count: self.clients.len(),
            online_users,
        }
    }
}
