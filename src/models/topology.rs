//! AS-level topology derived from the CAIDA relationship feed, plus the
//! input-clique (tier-1 core) and IXP ASN sets.

use std::collections::{HashMap, HashSet};

/// Business relationship of one AS-path edge, read origin-outward.
///
/// For an edge `last -> current`: `Customer` means `last` is a provider of
/// `current`, `Provider` means `last` is a customer of `current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relationship {
    Customer,
    Provider,
    Peer,
}

#[derive(Debug, Clone, Default)]
struct AsNode {
    providers: HashSet<u32>,
    customers: HashSet<u32>,
    peers: HashSet<u32>,
    as_rank: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct AsTopology {
    ases: HashMap<u32, AsNode>,
    input_clique: HashSet<u32>,
    ixps: HashSet<u32>,
}

impl AsTopology {
    pub fn new() -> Self {
        AsTopology::default()
    }

    /// Records a provider-to-customer relationship (CAIDA `-1` rows).
    pub fn add_provider_customer(&mut self, provider: u32, customer: u32) {
        self.ases
            .entry(provider)
            .or_default()
            .customers
            .insert(customer);
        self.ases
            .entry(customer)
            .or_default()
            .providers
            .insert(provider);
    }

    /// Records a peer-to-peer relationship (CAIDA `0` rows).
    pub fn add_peer_peer(&mut self, a: u32, b: u32) {
        self.ases.entry(a).or_default().peers.insert(b);
        self.ases.entry(b).or_default().peers.insert(a);
    }

    /// Marks an ASN as part of the tier-1 input clique. Clique members are
    /// also topology nodes even when no relationship row names them.
    pub fn add_input_clique_asn(&mut self, asn: u32) {
        self.ases.entry(asn).or_default();
        self.input_clique.insert(asn);
    }

    pub fn add_ixp_asn(&mut self, asn: u32) {
        self.ixps.insert(asn);
    }

    pub fn set_as_rank(&mut self, asn: u32, rank: u64) {
        self.ases.entry(asn).or_default().as_rank = Some(rank);
    }

    pub fn contains(&self, asn: u32) -> bool {
        self.ases.contains_key(&asn)
    }

    pub fn is_input_clique(&self, asn: u32) -> bool {
        self.input_clique.contains(&asn)
    }

    pub fn is_ixp(&self, asn: u32) -> bool {
        self.ixps.contains(&asn)
    }

    pub fn as_rank(&self, asn: u32) -> Option<u64> {
        self.ases.get(&asn).and_then(|node| node.as_rank)
    }

    /// Classifies the path edge `last -> current`. Returns `None` when the
    /// topology knows both ASNs but no relationship between them.
    pub fn relationship(&self, last: u32, current: u32) -> Option<Relationship> {
        let node = self.ases.get(&current)?;
        if node.providers.contains(&last) {
            Some(Relationship::Customer)
        } else if node.customers.contains(&last) {
            Some(Relationship::Provider)
        } else if node.peers.contains(&last) {
            Some(Relationship::Peer)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_classification() {
        let mut topology = AsTopology::new();
        topology.add_provider_customer(1, 2);
        topology.add_peer_peer(2, 3);

        // 1 is a provider of 2: walking 1 -> 2 descends to a customer
        assert_eq!(topology.relationship(1, 2), Some(Relationship::Customer));
        assert_eq!(topology.relationship(2, 1), Some(Relationship::Provider));
        assert_eq!(topology.relationship(2, 3), Some(Relationship::Peer));
        assert_eq!(topology.relationship(3, 2), Some(Relationship::Peer));
        // both known, no edge
        assert_eq!(topology.relationship(1, 3), None);
    }

    #[test]
    fn test_clique_members_are_nodes() {
        let mut topology = AsTopology::new();
        topology.add_input_clique_asn(174);
        assert!(topology.contains(174));
        assert!(topology.is_input_clique(174));
        assert!(!topology.is_input_clique(65000));
    }

    #[test]
    fn test_ixp_set_is_not_topology_membership() {
        let mut topology = AsTopology::new();
        topology.add_ixp_asn(6695);
        assert!(topology.is_ixp(6695));
        assert!(!topology.contains(6695));
    }
}
