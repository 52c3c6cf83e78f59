//! Inbound accept policy.
//!
//! The demo accepts every inbound connection; deployments that want
//! "accept only expected peers" plug in their own policy here. The policy
//! is consulted before the handle is registered — a rejected connection is
//! closed and leaves no trace in the registries.

use std::collections::HashSet;

use cairn_core::PeerId;

/// Decides whether an inbound connection from `remote` is registered.
pub trait AcceptPolicy: Send + Sync {
    fn should_accept(&self, remote: &PeerId) -> bool;
}

/// Accept everything. Default, matches the demo behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl AcceptPolicy for AcceptAll {
    fn should_accept(&self, _remote: &PeerId) -> bool {
        true
    }
}

/// Accept only a fixed set of peer ids (config `policy.allowed_peers`).
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    allowed: HashSet<PeerId>,
}

impl AllowList {
    pub fn new(peers: impl IntoIterator<Item = PeerId>) -> Self {
        Self {
            allowed: peers.into_iter().collect(),
        }
    }

    pub fn allow(&mut self, peer: PeerId) {
        self.allowed.insert(peer);
    }
}

impl AcceptPolicy for AllowList {
    fn should_accept(&self, remote: &PeerId) -> bool {
        self.allowed.contains(remote)
    }
}
