//! Cache-change notifications.
//!
//! Events are immutable values published whenever a cached resource is updated or
//! removed. Their JSON form is what external consumers (the admin event stream)
//! receive:
//!
//! ```
//! use etch_core::{CacheEvent, ResourceId};
//!
//! let id = ResourceId::new("toro.2ch.net", "/book/dat/1.dat");
//! let event = CacheEvent::update(id.clone(), 12);
//! assert_eq!(
//!     event.to_json().unwrap(),
//!     r#"{"event":"cacheUpdate","url":"http://toro.2ch.net/book/dat/1.dat","since":12}"#
//! );
//!
//! let event = CacheEvent::delete(id);
//! assert_eq!(
//!     event.to_json().unwrap(),
//!     r#"{"event":"cacheDelete","url":"http://toro.2ch.net/book/dat/1.dat"}"#
//! );
//! ```

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::ResourceId;

/// Kind of change an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEventKind {
    /// New content was written.
    Update,
    /// The entry was removed.
    Delete,
}

impl CacheEventKind {
    /// Wire name of the kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            CacheEventKind::Update => "cacheUpdate",
            CacheEventKind::Delete => "cacheDelete",
        }
    }
}

/// Notification describing an update or deletion of a cached resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Content was written for `resource`.
    Update {
        /// Updated resource.
        resource: ResourceId,
        /// Number of lines already known before the update.
        since: usize,
    },
    /// `resource` was removed from the store.
    Delete {
        /// Removed resource.
        resource: ResourceId,
    },
}

impl CacheEvent {
    /// Creates an update event.
    pub fn update(resource: ResourceId, since: usize) -> Self {
        CacheEvent::Update { resource, since }
    }

    /// Creates a delete event.
    pub fn delete(resource: ResourceId) -> Self {
        CacheEvent::Delete { resource }
    }

    /// Kind of the event.
    pub fn kind(&self) -> CacheEventKind {
        match self {
            CacheEvent::Update { .. } => CacheEventKind::Update,
            CacheEvent::Delete { .. } => CacheEventKind::Delete,
        }
    }

    /// Resource the event is about.
    pub fn resource(&self) -> &ResourceId {
        match self {
            CacheEvent::Update { resource, .. } | CacheEvent::Delete { resource } => resource,
        }
    }

    /// Serializes the event to its JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for CacheEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = match self {
            CacheEvent::Update { .. } => 3,
            CacheEvent::Delete { .. } => 2,
        };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("event", self.kind().as_str())?;
        map.serialize_entry("url", &self.resource().url())?;
        if let CacheEvent::Update { since, .. } = self {
            map.serialize_entry("since", since)?;
        }
        map.end()
    }
}
