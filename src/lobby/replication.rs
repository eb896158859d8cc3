//! Replication layer
//!
//! `Replica` is the participant-side handle onto a room's replicated key/value
//! store: one shared namespace, one namespace per participant (written only by
//! its owner), change subscriptions and broadcast calls. Writes are
//! last-writer-wins; reads may be stale.
//!
//! `InMemoryHub` is a process-local room used by the headless runner and tests.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::lobby::player::ParticipantId;

/// Shared key holding the serialized session state
pub const SESSION_KEY: &str = "session";
/// Per-participant key holding the round score
pub const SCORE_KEY: &str = "score";
/// Broadcast call that ends the session everywhere
pub const END_SESSION_CALL: &str = "end_session";

/// A broadcast call received from another participant (or ourselves)
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCall {
    pub from: ParticipantId,
    pub name: String,
    pub payload: Value,
}

/// Participant-side view of the replicated room
pub trait Replica: Send + Sync {
    fn local_id(&self) -> ParticipantId;

    /// Currently connected participants
    fn roster(&self) -> Vec<ParticipantId>;

    fn get_shared(&self, key: &str) -> Option<Value>;
    fn set_shared(&self, key: &str, value: Value);

    fn get_participant(&self, id: ParticipantId, key: &str) -> Option<Value>;
    /// Write into the local participant's own namespace
    fn set_local(&self, key: &str, value: Value);

    /// Receive every later write of a shared key
    fn subscribe(&self, key: &str) -> Receiver<Value>;

    /// Deliver a call to every connected participant, the sender included
    fn broadcast(&self, name: &str, payload: Value);
    /// Take the calls received since the last drain
    fn drain_calls(&self) -> Vec<RemoteCall>;
}

/// Typed read of a shared key. Undecodable values are logged and ignored.
pub fn read_shared<T: DeserializeOwned>(replica: &dyn Replica, key: &str) -> Option<T> {
    decode(key, replica.get_shared(key)?)
}

/// Typed read of a participant key
pub fn read_participant<T: DeserializeOwned>(
    replica: &dyn Replica,
    id: ParticipantId,
    key: &str,
) -> Option<T> {
    decode(key, replica.get_participant(id, key)?)
}

/// Typed write of a shared key
pub fn write_shared<T: Serialize>(replica: &dyn Replica, key: &str, value: &T) {
    match serde_json::to_value(value) {
        Ok(value) => replica.set_shared(key, value),
        Err(e) => tracing::warn!("Failed to encode shared {}: {}", key, e),
    }
}

/// Typed write of the local participant's key
pub fn write_local<T: Serialize>(replica: &dyn Replica, key: &str, value: &T) {
    match serde_json::to_value(value) {
        Ok(value) => replica.set_local(key, value),
        Err(e) => tracing::warn!("Failed to encode {}: {}", key, e),
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("Ignoring malformed replicated value {}: {}", key, e);
            None
        }
    }
}

#[derive(Default)]
struct HubState {
    /// Join order
    roster: Vec<ParticipantId>,
    shared: HashMap<String, Value>,
    participants: HashMap<ParticipantId, HashMap<String, Value>>,
    inboxes: HashMap<ParticipantId, Vec<RemoteCall>>,
    subscribers: HashMap<String, Vec<Sender<Value>>>,
}

/// Process-local replicated room
#[derive(Clone, Default)]
pub struct InMemoryHub {
    inner: Arc<Mutex<HubState>>,
}

impl InMemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a new participant with a fresh id
    pub fn join(&self) -> InMemoryReplica {
        self.join_as(Uuid::new_v4())
    }

    /// Connect (or reconnect) a participant with a known id
    pub fn join_as(&self, id: ParticipantId) -> InMemoryReplica {
        let mut state = self.inner.lock();
        if !state.roster.contains(&id) {
            state.roster.push(id);
        }
        state.inboxes.entry(id).or_default();
        tracing::debug!("Participant {} joined ({} connected)", id, state.roster.len());
        InMemoryReplica {
            id,
            hub: self.clone(),
        }
    }

    /// Disconnect a participant. Its namespace stays readable.
    pub fn leave(&self, id: ParticipantId) {
        let mut state = self.inner.lock();
        state.roster.retain(|p| *p != id);
        state.inboxes.remove(&id);
        tracing::debug!("Participant {} left ({} connected)", id, state.roster.len());
    }

    pub fn roster(&self) -> Vec<ParticipantId> {
        self.inner.lock().roster.clone()
    }

    pub fn participant_count(&self) -> usize {
        self.inner.lock().roster.len()
    }
}

/// One participant's handle onto an `InMemoryHub`
#[derive(Clone)]
pub struct InMemoryReplica {
    id: ParticipantId,
    hub: InMemoryHub,
}

impl InMemoryReplica {
    pub fn hub(&self) -> &InMemoryHub {
        &self.hub
    }
}

impl Replica for InMemoryReplica {
    fn local_id(&self) -> ParticipantId {
        self.id
    }

    fn roster(&self) -> Vec<ParticipantId> {
        self.hub.roster()
    }

    fn get_shared(&self, key: &str) -> Option<Value> {
        self.hub.inner.lock().shared.get(key).cloned()
    }

    fn set_shared(&self, key: &str, value: Value) {
        let mut state = self.hub.inner.lock();
        if let Some(subscribers) = state.subscribers.get_mut(key) {
            subscribers.retain(|tx| tx.send(value.clone()).is_ok());
        }
        state.shared.insert(key.to_string(), value);
    }

    fn get_participant(&self, id: ParticipantId, key: &str) -> Option<Value> {
        self.hub
            .inner
            .lock()
            .participants
            .get(&id)
            .and_then(|ns| ns.get(key))
            .cloned()
    }

    fn set_local(&self, key: &str, value: Value) {
        self.hub
            .inner
            .lock()
            .participants
            .entry(self.id)
            .or_default()
            .insert(key.to_string(), value);
    }

    fn subscribe(&self, key: &str) -> Receiver<Value> {
        let (tx, rx) = unbounded();
        self.hub
            .inner
            .lock()
            .subscribers
            .entry(key.to_string())
            .or_default()
            .push(tx);
        rx
    }

    fn broadcast(&self, name: &str, payload: Value) {
        let mut state = self.hub.inner.lock();
        let call = RemoteCall {
            from: self.id,
            name: name.to_string(),
            payload,
        };
        for inbox in state.inboxes.values_mut() {
            inbox.push(call.clone());
        }
    }

    fn drain_calls(&self) -> Vec<RemoteCall> {
        self.hub
            .inner
            .lock()
            .inboxes
            .get_mut(&self.id)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_and_leave_update_roster() {
        let hub = InMemoryHub::new();
        let a = hub.join();
        let b = hub.join();
        assert_eq!(a.roster(), vec![a.local_id(), b.local_id()]);

        hub.leave(a.local_id());
        assert_eq!(b.roster(), vec![b.local_id()]);
    }

    #[test]
    fn test_shared_state_is_last_writer_wins() {
        let hub = InMemoryHub::new();
        let a = hub.join();
        let b = hub.join();

        a.set_shared("k", json!(1));
        b.set_shared("k", json!(2));
        assert_eq!(a.get_shared("k"), Some(json!(2)));
    }

    #[test]
    fn test_participant_namespaces() {
        let hub = InMemoryHub::new();
        let a = hub.join();
        let b = hub.join();

        a.set_local(SCORE_KEY, json!(10));
        assert_eq!(b.get_participant(a.local_id(), SCORE_KEY), Some(json!(10)));
        assert_eq!(b.get_participant(b.local_id(), SCORE_KEY), None);
    }

    #[test]
    fn test_subscribe_receives_writes() {
        let hub = InMemoryHub::new();
        let a = hub.join();
        let b = hub.join();
        let rx = b.subscribe("k");

        a.set_shared("k", json!("x"));
        a.set_shared("other", json!("y"));
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![json!("x")]);
    }

    #[test]
    fn test_broadcast_reaches_everyone_including_sender() {
        let hub = InMemoryHub::new();
        let a = hub.join();
        let b = hub.join();

        a.broadcast(END_SESSION_CALL, Value::Null);
        let calls = b.drain_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].from, a.local_id());
        assert_eq!(a.drain_calls().len(), 1);
        assert!(b.drain_calls().is_empty());
    }

    #[test]
    fn test_departed_participant_gets_no_calls() {
        let hub = InMemoryHub::new();
        let a = hub.join();
        let b = hub.join();
        hub.leave(b.local_id());

        a.broadcast(END_SESSION_CALL, Value::Null);
        assert!(b.drain_calls().is_empty());
    }

    #[test]
    fn test_typed_helpers_ignore_malformed_values() {
        let hub = InMemoryHub::new();
        let a = hub.join();
        write_shared(&a, "n", &5u32);
        assert_eq!(read_shared::<u32>(&a, "n"), Some(5));

        a.set_shared("n", json!("not a number"));
        assert_eq!(read_shared::<u32>(&a, "n"), None);
    }
}
