//! Longest-prefix-match store for Route Origin Authorizations.
//!
//! The trie holds one node per announced-bit along a prefix; each node carries
//! the `(origin_asn, max_length)` pairs of the ROAs registered at exactly that
//! network. A lookup walks the queried prefix's bits and remembers the deepest
//! node with entries, which is the most-specific covering ROA.

use ipnet::IpNet;

/// ROA validity verdicts, emitted as stable integer codes in the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoaValidity {
    Valid,
    Unknown,
    InvalidLength,
    InvalidOrigin,
    InvalidLengthAndOrigin,
}

impl RoaValidity {
    pub const fn code(&self) -> u8 {
        match self {
            RoaValidity::Valid => 0,
            RoaValidity::Unknown => 1,
            RoaValidity::InvalidLength => 2,
            RoaValidity::InvalidOrigin => 3,
            RoaValidity::InvalidLengthAndOrigin => 4,
        }
    }
}

/// Whether the covering ROA authorizes any real origin, or is an ASN-0
/// disavowal. Emitted as stable integer codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoaRouted {
    Routed,
    Unknown,
    NonRouted,
}

impl RoaRouted {
    pub const fn code(&self) -> u8 {
        match self {
            RoaRouted::Routed => 0,
            RoaRouted::Unknown => 1,
            RoaRouted::NonRouted => 2,
        }
    }
}

/// One normalized row from the ROA feed.
///
/// `max_length` of `None` defaults to the ROA prefix's own length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoaRecord {
    pub prefix: IpNet,
    pub origin_asn: u32,
    pub max_length: Option<u8>,
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: [Option<Box<TrieNode>>; 2],
    entries: Vec<(u32, u8)>,
}

/// Address bits left-aligned in a u128 so v4 and v6 walk the same way.
fn addr_bits(net: &IpNet) -> u128 {
    match net {
        IpNet::V4(n) => (u32::from(n.addr()) as u128) << 96,
        IpNet::V6(n) => u128::from(n.addr()),
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoaTrie {
    v4: TrieNode,
    v6: TrieNode,
}

impl RoaTrie {
    pub fn new() -> Self {
        RoaTrie::default()
    }

    pub fn from_records<I: IntoIterator<Item = RoaRecord>>(records: I) -> Self {
        let mut trie = RoaTrie::new();
        for roa in records {
            trie.insert(roa.prefix, roa.origin_asn, roa.max_length);
        }
        trie
    }

    pub fn insert(&mut self, prefix: IpNet, origin_asn: u32, max_length: Option<u8>) {
        let prefix = prefix.trunc();
        let max_length = max_length.unwrap_or_else(|| prefix.prefix_len());
        let bits = addr_bits(&prefix);
        let mut node = match prefix {
            IpNet::V4(_) => &mut self.v4,
            IpNet::V6(_) => &mut self.v6,
        };
        for i in 0..prefix.prefix_len() {
            let bit = ((bits >> (127 - i)) & 1) as usize;
            node = node.children[bit].get_or_insert_with(Default::default).as_mut();
        }
        node.entries.push((origin_asn, max_length));
    }

    /// Returns the `(origin, max_length)` pairs of the most-specific ROA
    /// network covering `prefix`, if any.
    pub fn lookup(&self, prefix: &IpNet) -> Option<&[(u32, u8)]> {
        let bits = addr_bits(prefix);
        let mut node = match prefix {
            IpNet::V4(_) => &self.v4,
            IpNet::V6(_) => &self.v6,
        };
        let mut found = None;
        if !node.entries.is_empty() {
            found = Some(node.entries.as_slice());
        }
        for i in 0..prefix.prefix_len() {
            let bit = ((bits >> (127 - i)) & 1) as usize;
            match &node.children[bit] {
                Some(child) => {
                    node = child.as_ref();
                    if !node.entries.is_empty() {
                        found = Some(node.entries.as_slice());
                    }
                }
                None => break,
            }
        }
        found
    }

    /// Validity of an announcement of `prefix` by `origin`.
    ///
    /// Valid iff some covering pair matches the origin and permits the
    /// length. Otherwise the verdict distinguishes which of the two
    /// conditions failed; origin mismatch is only reported when no pair
    /// matched the origin at all.
    pub fn validity(&self, prefix: &IpNet, origin: u32) -> (RoaValidity, RoaRouted) {
        let pairs = match self.lookup(prefix) {
            Some(pairs) => pairs,
            None => return (RoaValidity::Unknown, RoaRouted::Unknown),
        };
        let routed = match pairs.iter().any(|(asn, _)| *asn != 0) {
            true => RoaRouted::Routed,
            false => RoaRouted::NonRouted,
        };
        let prefix_len = prefix.prefix_len();
        let mut origin_matched = false;
        let mut length_ok = false;
        for (roa_origin, max_length) in pairs {
            let origin_match = *roa_origin == origin;
            let len_ok = prefix_len <= *max_length;
            if origin_match && len_ok {
                return (RoaValidity::Valid, routed);
            }
            origin_matched |= origin_match;
            length_ok |= len_ok;
        }
        let validity = match (origin_matched, length_ok) {
            (true, _) => RoaValidity::InvalidLength,
            (false, true) => RoaValidity::InvalidOrigin,
            (false, false) => RoaValidity::InvalidLengthAndOrigin,
        };
        (validity, routed)
    }
}
