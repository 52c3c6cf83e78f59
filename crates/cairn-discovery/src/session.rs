//! Session registry — the live map of peer id → open connection handle.
//!
//! Single source of truth for "who am I currently connected to". At most
//! one handle per peer id is retained; a superseded handle is shut down
//! when it is replaced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Notify;

use cairn_core::PeerId;

use crate::signaling::LinkHandle;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// An entry in the session registry.
///
/// The token ties the entry to the listener task that owns the connection:
/// cleanup removes the entry only if the token still matches, so a
/// replacement handle inserted for the same peer is never torn down by the
/// task of the handle it superseded.
pub struct SessionHandle {
    token: u64,
    link: LinkHandle,
    stop: Arc<Notify>,
}

impl SessionHandle {
    pub fn new(link: LinkHandle) -> Self {
        Self {
            token: NEXT_TOKEN.fetch_add(1, Ordering::Relaxed),
            link,
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn link(&self) -> &LinkHandle {
        &self.link
    }

    /// Signal observed by this entry's listener task to exit silently.
    pub fn stop_signal(&self) -> Arc<Notify> {
        self.stop.clone()
    }

    /// Close the connection and stop its listener without emitting events.
    pub fn shutdown(&self) {
        self.link.close();
        self.stop.notify_one();
    }
}

/// The session registry — shared between the service surface, the accept
/// task, and the per-connection listener tasks.
pub type SessionTable = Arc<DashMap<PeerId, SessionHandle>>;

/// Create a new empty session table.
pub fn new_session_table() -> SessionTable {
    Arc::new(DashMap::new())
}
