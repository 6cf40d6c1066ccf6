use crate::types::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Peer {
    pub id: PeerId,
    pub address: String,
}

impl std::fmt::Display for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

/// Static cluster membership, resolved once at startup. Includes the local
/// node; `others()` yields the broadcast targets.
#[derive(Debug, Clone)]
pub struct PeerDirectory {
    local_id: PeerId,
    members: BTreeMap<PeerId, Peer>,
}

impl PeerDirectory {
    pub fn new(local_id: PeerId, members: impl IntoIterator<Item = Peer>) -> Self {
        let mut members: BTreeMap<PeerId, Peer> =
            members.into_iter().map(|p| (p.id, p)).collect();
        members.entry(local_id).or_insert_with(|| Peer {
            id: local_id,
            address: String::new(),
        });
        Self { local_id, members }
    }

    /// Builds a directory from an address list where entry k gets id k+1.
    pub fn from_addresses<S: AsRef<str>>(local_id: PeerId, addrs: &[S]) -> Self {
        let members = addrs.iter().enumerate().map(|(i, addr)| Peer {
            id: i as PeerId + 1,
            address: addr.as_ref().trim().to_string(),
        });
        Self::new(local_id, members)
    }

    pub fn local_id(&self) -> PeerId {
        self.local_id
    }

    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.members.get(&id)
    }

    pub fn others(&self) -> impl Iterator<Item = &Peer> {
        let local = self.local_id;
        self.members.values().filter(move |p| p.id != local)
    }

    pub fn other_ids(&self) -> Vec<PeerId> {
        self.others().map(|p| p.id).collect()
    }

    pub fn cluster_size(&self) -> usize {
        self.members.len()
    }

    pub fn majority(&self) -> usize {
        self.cluster_size() / 2 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_counts_self() {
        let dir = PeerDirectory::from_addresses(1, &["a:1", "b:2", "c:3"]);
        assert_eq!(dir.cluster_size(), 3);
        assert_eq!(dir.majority(), 2);
        assert_eq!(dir.other_ids(), vec![2, 3]);

        let five = PeerDirectory::from_addresses(3, &["a", "b", "c", "d", "e"]);
        assert_eq!(five.majority(), 3);
        assert!(five.others().all(|p| p.id != 3));
    }

    #[test]
    fn local_node_is_always_a_member() {
        let dir = PeerDirectory::new(7, Vec::new());
        assert_eq!(dir.cluster_size(), 1);
        assert_eq!(dir.majority(), 1);
        assert_eq!(dir.others().count(), 0);
    }
}
