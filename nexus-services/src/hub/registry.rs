//! Connection registry and fan-out
//!
//! A single mutex guards the registry and is held only to insert, remove or
//! iterate. Sends never block: each queue is offered the frame with
//! `try_send`, and a full queue is handled according to [`OverflowPolicy`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use nexus_core::{
    Match, Need, NeedAcceptedPayload, NewMatchPayload, NewNeedPayload, ServerEvent, Task,
    TaskStatusPayload,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{HubConfig, HubError, HubResult, OverflowPolicy};

/// Unique identifier for a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        ConnectionId(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handed to the connection driver on successful registration
#[derive(Debug)]
pub struct Registration {
    pub connection_id: ConnectionId,
    /// Outbound frames for this connection; closes on unregister or shutdown
    pub queue: mpsc::Receiver<Message>,
}

struct Connection {
    user_id: String,
    sender: mpsc::Sender<Message>,
}

/// Owns every live client connection
pub struct Hub {
    config: HubConfig,
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    shut_down: AtomicBool,
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            connections: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Add a connection for `user_id` and hand back its outbound queue
    pub fn register(&self, user_id: impl Into<String>) -> HubResult<Registration> {
        let user_id = user_id.into();
        let (sender, queue) = mpsc::channel(self.config.queue_capacity.max(1));
        let connection_id = ConnectionId::new();

        {
            let mut connections = self.connections.lock();
            if self.shut_down.load(Ordering::SeqCst) {
                return Err(HubError::ShuttingDown);
            }
            connections.insert(
                connection_id,
                Connection {
                    user_id: user_id.clone(),
                    sender,
                },
            );
        }

        info!("Connection {} registered for user {}", connection_id, user_id);
        Ok(Registration {
            connection_id,
            queue,
        })
    }

    /// Remove a connection; dropping its sender closes the queue
    ///
    /// Returns false if the connection was already gone (evicted, shut down
    /// or unregistered twice).
    pub fn unregister(&self, connection_id: ConnectionId) -> bool {
        let removed = self.connections.lock().remove(&connection_id);
        match removed {
            Some(connection) => {
                info!(
                    "Connection {} unregistered (user {})",
                    connection_id, connection.user_id
                );
                true
            }
            None => false,
        }
    }

    /// Send to every connection of one user; no connections is a no-op
    pub fn send_to_user(&self, user_id: &str, event: &ServerEvent) -> usize {
        self.dispatch(event, Some(user_id), |_, conn| conn.user_id == user_id)
    }

    /// Send to every connection whose user is in `user_ids`
    pub fn send_to_users<S: AsRef<str>>(&self, user_ids: &[S], event: &ServerEvent) -> usize {
        let targets: HashSet<&str> = user_ids.iter().map(AsRef::as_ref).collect();
        if targets.is_empty() {
            return 0;
        }
        self.dispatch(event, None, |_, conn| targets.contains(conn.user_id.as_str()))
    }

    /// Send to every connection
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        self.dispatch(event, None, |_, _| true)
    }

    /// Send to a single connection
    pub fn send_to_connection(&self, connection_id: ConnectionId, event: &ServerEvent) -> bool {
        self.dispatch(event, None, |id, _| *id == connection_id) == 1
    }

    pub fn is_user_connected(&self, user_id: &str) -> bool {
        self.connections
            .lock()
            .values()
            .any(|conn| conn.user_id == user_id)
    }

    /// Users with at least one live connection, deduplicated and sorted
    pub fn connected_user_ids(&self) -> Vec<String> {
        let users: BTreeSet<String> = self
            .connections
            .lock()
            .values()
            .map(|conn| conn.user_id.clone())
            .collect();
        users.into_iter().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Close every queue and refuse further registrations
    pub fn shutdown(&self) {
        let drained = {
            let mut connections = self.connections.lock();
            self.shut_down.store(true, Ordering::SeqCst);
            std::mem::take(&mut *connections)
        };
        info!("Hub shut down, closed {} connections", drained.len());
    }

    /// Tell volunteers' users about a new Need
    pub fn notify_new_need<S: AsRef<str>>(&self, need: &Need, volunteer_user_ids: &[S]) -> usize {
        match NewNeedPayload::from_need(need) {
            Ok(payload) => self.send_to_users(volunteer_user_ids, &ServerEvent::NewNeed(payload)),
            Err(e) => {
                warn!("Not notifying new need {}: {}", need.id, e);
                0
            }
        }
    }

    /// Tell a Need's owner that a volunteer accepted it
    pub fn notify_need_accepted(
        &self,
        need_owner: &str,
        need_id: &str,
        volunteer_id: &str,
        volunteer_name: &str,
    ) -> usize {
        match NeedAcceptedPayload::new(need_id, volunteer_id, volunteer_name) {
            Ok(payload) => self.send_to_user(need_owner, &ServerEvent::NeedAccepted(payload)),
            Err(e) => {
                warn!("Not notifying acceptance of need {}: {}", need_id, e);
                0
            }
        }
    }

    pub fn notify_task_status_update<S: AsRef<str>>(&self, task: &Task, user_ids: &[S]) -> usize {
        match TaskStatusPayload::from_task(task) {
            Ok(payload) => self.send_to_users(user_ids, &ServerEvent::TaskStatusUpdate(payload)),
            Err(e) => {
                warn!("Not notifying status of task {}: {}", task.id, e);
                0
            }
        }
    }

    pub fn notify_new_match<S: AsRef<str>>(&self, m: &Match, user_ids: &[S]) -> usize {
        match NewMatchPayload::from_match(m) {
            Ok(payload) => self.send_to_users(user_ids, &ServerEvent::NewMatch(payload)),
            Err(e) => {
                warn!(
                    "Not notifying match {}/{}: {}",
                    m.need_id, m.volunteer_id, e
                );
                0
            }
        }
    }

    /// Serialize once, then offer the frame to every matching connection
    fn dispatch<F>(&self, event: &ServerEvent, user_id: Option<&str>, is_target: F) -> usize
    where
        F: Fn(&ConnectionId, &Connection) -> bool,
    {
        let frame = match encode_frame(event, user_id) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Dropping {} event: {}", event.kind(), e);
                return 0;
            }
        };

        let mut delivered = 0;
        let mut evicted = Vec::new();
        {
            let mut connections = self.connections.lock();
            connections.retain(|id, conn| {
                if !is_target(id, conn) {
                    return true;
                }
                match conn.sender.try_send(frame.clone()) {
                    Ok(()) => {
                        delivered += 1;
                        true
                    }
                    Err(TrySendError::Full(_)) => match self.config.overflow {
                        OverflowPolicy::Evict => {
                            evicted.push((*id, conn.user_id.clone()));
                            false
                        }
                        OverflowPolicy::DropMessage => {
                            debug!("Queue full for {}, dropped {} event", id, event.kind());
                            true
                        }
                    },
                    // writer already gone, the driver is tearing down
                    Err(TrySendError::Closed(_)) => false,
                }
            });
        }

        for (id, user_id) in evicted {
            warn!(
                "Evicted slow connection {} (user {}): queue full",
                id, user_id
            );
        }
        debug!("Delivered {} event to {} connections", event.kind(), delivered);
        delivered
    }
}

/// Wrap an event in its envelope and render it as a text frame
fn encode_frame(event: &ServerEvent, user_id: Option<&str>) -> HubResult<Message> {
    let envelope = event.clone().into_envelope(user_id.map(str::to_string));
    let json = serde_json::to_string(&envelope)?;
    Ok(Message::Text(json.into()))
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("connections", &self.connection_count())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nexus_core::{ConnectedPayload, Location, TaskStatus, Urgency};

    fn hub_with_capacity(queue_capacity: usize, overflow: OverflowPolicy) -> Hub {
        Hub::new(HubConfig {
            queue_capacity,
            overflow,
            ..HubConfig::default()
        })
    }

    fn greeting(user: &str) -> ServerEvent {
        ServerEvent::Connected(ConnectedPayload::new(user).unwrap())
    }

    fn drain(queue: &mut mpsc::Receiver<Message>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(Message::Text(text)) = queue.try_recv() {
            out.push(serde_json::from_str(text.as_str()).unwrap());
        }
        out
    }

    #[test]
    fn test_register_and_unregister() {
        let hub = Hub::default();
        let reg = hub.register("alice").unwrap();
        assert_eq!(hub.connection_count(), 1);
        assert!(hub.is_user_connected("alice"));

        assert!(hub.unregister(reg.connection_id));
        assert!(!hub.unregister(reg.connection_id));
        assert_eq!(hub.connection_count(), 0);
        assert!(!hub.is_user_connected("alice"));
    }

    #[test]
    fn test_unregister_closes_queue() {
        let hub = Hub::default();
        let mut reg = hub.register("alice").unwrap();
        hub.unregister(reg.connection_id);
        assert!(matches!(
            reg.queue.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_encode_frame_envelope() {
        let targeted = match encode_frame(&greeting("alice"), Some("alice")).unwrap() {
            Message::Text(text) => serde_json::from_str::<serde_json::Value>(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        };
        assert_eq!(targeted["type"], "connected");
        assert_eq!(targeted["user_id"], "alice");

        let untargeted = match encode_frame(&greeting("alice"), None).unwrap() {
            Message::Text(text) => serde_json::from_str::<serde_json::Value>(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        };
        assert!(untargeted.get("user_id").is_none());
    }

    #[test]
    fn test_send_to_user_reaches_all_of_their_connections() {
        let hub = Hub::default();
        let mut phone = hub.register("alice").unwrap();
        let mut laptop = hub.register("alice").unwrap();
        let mut other = hub.register("bob").unwrap();

        assert_eq!(hub.send_to_user("alice", &greeting("alice")), 2);

        let phone_frames = drain(&mut phone.queue);
        assert_eq!(phone_frames.len(), 1);
        assert_eq!(phone_frames[0]["type"], "connected");
        assert_eq!(phone_frames[0]["user_id"], "alice");
        assert_eq!(drain(&mut laptop.queue).len(), 1);
        assert!(drain(&mut other.queue).is_empty());
    }

    #[test]
    fn test_send_to_unknown_user_is_noop() {
        let hub = Hub::default();
        let mut reg = hub.register("alice").unwrap();
        assert_eq!(hub.send_to_user("nobody", &greeting("nobody")), 0);
        assert!(drain(&mut reg.queue).is_empty());
        assert_eq!(hub.connection_count(), 1);
    }

    #[test]
    fn test_send_to_users_filters_by_set() {
        let hub = Hub::default();
        let mut a = hub.register("a").unwrap();
        let mut b = hub.register("b").unwrap();
        let mut c = hub.register("c").unwrap();

        let delivered = hub.send_to_users(&["a", "c", "ghost"], &greeting("x"));
        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut a.queue).len(), 1);
        assert!(drain(&mut b.queue).is_empty());
        assert_eq!(drain(&mut c.queue).len(), 1);

        let none: [&str; 0] = [];
        assert_eq!(hub.send_to_users(&none, &greeting("x")), 0);
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let hub = Hub::default();
        let mut regs: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|u| hub.register(*u).unwrap())
            .collect();
        assert_eq!(hub.broadcast(&greeting("all")), 3);
        for reg in regs.iter_mut() {
            let frames = drain(&mut reg.queue);
            assert_eq!(frames.len(), 1);
            assert!(frames[0].get("user_id").is_none());
        }
    }

    #[test]
    fn test_overflow_evicts_only_the_slow_connection() {
        let hub = hub_with_capacity(2, OverflowPolicy::Evict);
        let mut slow = hub.register("slow").unwrap();
        let mut fast = hub.register("fast").unwrap();

        for _ in 0..3 {
            hub.broadcast(&greeting("x"));
            drain(&mut fast.queue);
        }

        assert!(!hub.is_user_connected("slow"));
        assert!(hub.is_user_connected("fast"));

        // two buffered frames survive, then the queue reports closed
        assert!(slow.queue.try_recv().is_ok());
        assert!(slow.queue.try_recv().is_ok());
        assert!(matches!(
            slow.queue.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));

        assert_eq!(hub.send_to_user("fast", &greeting("fast")), 1);
    }

    #[test]
    fn test_overflow_drop_message_keeps_connection() {
        let hub = hub_with_capacity(1, OverflowPolicy::DropMessage);
        let mut reg = hub.register("alice").unwrap();

        assert_eq!(hub.send_to_user("alice", &greeting("alice")), 1);
        assert_eq!(hub.send_to_user("alice", &greeting("alice")), 0);
        assert!(hub.is_user_connected("alice"));
        assert_eq!(drain(&mut reg.queue).len(), 1);
    }

    #[test]
    fn test_connected_user_ids_are_deduplicated_and_sorted() {
        let hub = Hub::default();
        let _r1 = hub.register("carol").unwrap();
        let _r2 = hub.register("alice").unwrap();
        let _r3 = hub.register("carol").unwrap();
        assert_eq!(hub.connected_user_ids(), vec!["alice", "carol"]);
        assert_eq!(hub.connection_count(), 3);
    }

    #[test]
    fn test_shutdown_closes_queues_and_rejects_registration() {
        let hub = Hub::default();
        let mut reg = hub.register("alice").unwrap();
        hub.shutdown();

        assert_eq!(hub.connection_count(), 0);
        assert!(matches!(
            reg.queue.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(matches!(hub.register("bob"), Err(HubError::ShuttingDown)));
    }

    #[test]
    fn test_dropped_receiver_is_pruned_on_send() {
        let hub = Hub::default();
        let reg = hub.register("alice").unwrap();
        drop(reg.queue);
        assert_eq!(hub.send_to_user("alice", &greeting("alice")), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_domain_notifications() {
        let hub = Hub::default();
        let mut owner = hub.register("owner").unwrap();
        let mut helper = hub.register("helper").unwrap();

        let need = Need::new(
            "owner",
            "Walk my dog",
            "Twice a day",
            "pets",
            Urgency::Medium,
            Location::new(40.0, -74.0),
        );
        assert_eq!(hub.notify_new_need(&need, &["helper"]), 1);
        let frames = drain(&mut helper.queue);
        assert_eq!(frames[0]["type"], "new_need");
        assert_eq!(frames[0]["payload"]["need_id"], need.id.as_str());
        assert_eq!(frames[0]["payload"]["urgency"], "medium");

        assert_eq!(hub.notify_need_accepted("owner", &need.id, "vol-1", "Sam"), 1);
        let frames = drain(&mut owner.queue);
        assert_eq!(frames[0]["type"], "need_accepted");
        assert_eq!(frames[0]["payload"]["volunteer_name"], "Sam");

        let now = Utc::now();
        let task = Task {
            id: "task-1".into(),
            need_id: need.id.clone(),
            volunteer_id: "vol-1".into(),
            status: TaskStatus::InProgress,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(hub.notify_task_status_update(&task, &["owner", "helper"]), 2);
        let frames = drain(&mut owner.queue);
        assert_eq!(frames[0]["type"], "task_status_update");
        assert_eq!(frames[0]["payload"]["status"], "in_progress");
        drain(&mut helper.queue);

        let m = Match {
            need_id: need.id.clone(),
            volunteer_id: "vol-1".into(),
            score: 0.74,
            distance: 2000.0,
            created_at: now,
        };
        assert_eq!(hub.notify_new_match(&m, &["helper"]), 1);
        let frames = drain(&mut helper.queue);
        assert_eq!(frames[0]["type"], "new_match");
        assert_eq!(frames[0]["payload"]["match_id"], need.id.as_str());
    }

    #[test]
    fn test_invalid_payload_is_not_sent() {
        let hub = Hub::default();
        let mut reg = hub.register("owner").unwrap();
        assert_eq!(hub.notify_need_accepted("owner", "need-1", "vol-1", "  "), 0);
        assert!(drain(&mut reg.queue).is_empty());
    }
}
