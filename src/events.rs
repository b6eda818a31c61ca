//! Registry event notification
//!
//! Observers subscribe a handler to a [`Topic`]. Handlers run synchronously in
//! subscription order. Dispatch works on a copy of the subscriber list, so a
//! handler may subscribe or unsubscribe without disturbing the current round.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};

use crate::version::RegistrationEntry;

/// Registry state transitions observers can react to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Topic {
    /// First registration for a qualified name
    NewSchema,
    /// Content identical to an existing version was resubmitted
    OldSchema,
    /// A new distinct minor version was appended
    UpdatedSchema,
    /// A new major version was started
    NewMajorSchema,
    /// The current major version was replaced by a compatible successor
    UpdatedMajorSchema,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::NewSchema,
        Topic::OldSchema,
        Topic::UpdatedSchema,
        Topic::NewMajorSchema,
        Topic::UpdatedMajorSchema,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::NewSchema => "newSchema",
            Topic::OldSchema => "oldSchema",
            Topic::UpdatedSchema => "updatedSchema",
            Topic::NewMajorSchema => "newMajorSchema",
            Topic::UpdatedMajorSchema => "updatedMajorSchema",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown topic `{}`", s))
    }
}

/// Payload delivered to handlers
#[derive(Debug, Clone)]
pub struct SchemaEvent {
    pub topic: Topic,
    /// Qualified name of the schema
    pub name: String,
    /// The entry involved (for `oldSchema`, the existing entry)
    pub entry: Arc<RegistrationEntry>,
    /// Entry this one supersedes: the previous latest version for
    /// `updatedSchema`, the previous major representative for the major topics
    pub previous: Option<Arc<RegistrationEntry>>,
}

pub type Handler = Arc<dyn Fn(&SchemaEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    handlers: HashMap<Topic, Vec<(u64, Handler)>>,
}

/// Topic-based publish/subscribe owned by one registry
#[derive(Default)]
pub struct EventDispatcher {
    inner: Arc<Mutex<Subscribers>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `topic`. Dropping the returned [`Subscription`]
    /// keeps the handler; call [`Subscription::unsubscribe`] to remove it.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&SchemaEvent) + Send + Sync + 'static,
    {
        let mut subs = self.inner.lock();
        let id = subs.next_id;
        subs.next_id += 1;
        subs.handlers
            .entry(topic)
            .or_default()
            .push((id, Arc::new(handler)));

        Subscription {
            topic,
            id,
            subscribers: Arc::downgrade(&self.inner),
        }
    }

    /// Call every handler of `event.topic` in subscription order
    pub fn emit(&self, event: &SchemaEvent) {
        let handlers: Vec<Handler> = {
            let subs = self.inner.lock();
            subs.handlers
                .get(&event.topic)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        for handler in handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner
            .lock()
            .handlers
            .get(&topic)
            .map_or(0, Vec::len)
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subs = self.inner.lock();
        let counts: HashMap<Topic, usize> =
            subs.handlers.iter().map(|(t, l)| (*t, l.len())).collect();
        f.debug_struct("EventDispatcher")
            .field("subscribers", &counts)
            .finish()
    }
}

/// Handle for removing exactly one handler
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    id: u64,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Remove the handler. Calling it again, or after the dispatcher is gone, does nothing.
    pub fn unsubscribe(&self) {
        let Some(subscribers) = self.subscribers.upgrade() else {
            return;
        };
        let mut subs = subscribers.lock();
        if let Some(list) = subs.handlers.get_mut(&self.topic) {
            list.retain(|(id, _)| *id != self.id);
        }
    }
}
