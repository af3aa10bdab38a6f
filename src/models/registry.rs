//! Prefix registry: the deterministic numbering scheme behind the extrapolator
//! block layout.
//!
//! Prefixes are numbered densely in first-seen order across the merged global
//! unique-prefix list. `block_id` and `block_prefix_id` follow directly from
//! `prefix_id` and the configured block size, so the whole assignment is a pure
//! function of the unique-prefix file and `max_block_size`.

use crate::error::CollectorError;
use ipnet::IpNet;
use log::warn;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Identifiers assigned to one unique prefix.
///
/// Invariant: `block_id * max_block_size + block_prefix_id == prefix_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtrapolatorIds {
    pub prefix_id: u64,
    pub block_id: u64,
    pub block_prefix_id: u64,
}

/// Mapping from verbatim prefix strings to [ExtrapolatorIds].
///
/// Prefix strings are kept exactly as the decoder emitted them. IPv6
/// representations may differ across collectors (exploded vs. compressed), so
/// no canonicalization is performed; joins against other data sets must
/// normalize on their side.
#[derive(Debug, Clone)]
pub struct PrefixRegistry {
    ids: HashMap<String, ExtrapolatorIds>,
    max_block_size: u64,
    next_prefix_id: u64,
    next_block_id: u64,
    next_block_prefix_id: u64,
}

impl PrefixRegistry {
    pub fn new(max_block_size: u64) -> Result<Self, CollectorError> {
        if max_block_size == 0 {
            return Err(CollectorError::ConfigError(
                "max_block_size must be at least 1".to_string(),
            ));
        }
        Ok(PrefixRegistry {
            ids: HashMap::new(),
            max_block_size,
            next_prefix_id: 0,
            next_block_id: 0,
            next_block_prefix_id: 0,
        })
    }

    /// Builds the registry from the global unique-prefix file, one prefix per
    /// line, in file order. Header lines (`prefix`) and blanks are skipped.
    pub fn from_unique_prefix_file(
        path: &Path,
        max_block_size: u64,
    ) -> Result<Self, CollectorError> {
        let mut registry = PrefixRegistry::new(max_block_size)?;
        let reader = BufReader::new(File::open(path)?);
        for line in reader.lines() {
            let line = line?;
            let prefix = line.trim();
            if prefix.is_empty() || prefix == "prefix" {
                continue;
            }
            registry.add_prefix(prefix);
        }
        Ok(registry)
    }

    /// Registers one prefix, assigning it the next dense ID. Strings that do
    /// not parse as a network (typically host bits set) are logged and
    /// dropped.
    pub fn add_prefix(&mut self, prefix: &str) {
        match prefix.parse::<IpNet>() {
            Ok(net) if net.trunc() == net => {}
            _ => {
                warn!("prefix {prefix} has host bits set, throwing it out");
                return;
            }
        }

        self.ids.insert(
            prefix.to_string(),
            ExtrapolatorIds {
                prefix_id: self.next_prefix_id,
                block_id: self.next_block_id,
                block_prefix_id: self.next_block_prefix_id,
            },
        );

        self.next_prefix_id += 1;
        self.next_block_prefix_id += 1;
        if self.next_block_prefix_id == self.max_block_size {
            self.next_block_prefix_id = 0;
            self.next_block_id += 1;
        }
    }

    pub fn get(&self, prefix: &str) -> Option<ExtrapolatorIds> {
        self.ids.get(prefix).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn max_block_size(&self) -> u64 {
        self.max_block_size
    }

    /// Number of per-block shard writers the enrichment stage opens. This is
    /// always at least 1 so that an empty registry still produces a
    /// header-only shard.
    pub fn block_count(&self) -> u64 {
        self.next_block_id + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_numbering() {
        let mut registry = PrefixRegistry::new(2).unwrap();
        for prefix in ["10.0.0.0/24", "10.0.1.0/24", "2001:db8::/32", "10.1.0.0/16"] {
            registry.add_prefix(prefix);
        }
        assert_eq!(registry.len(), 4);
        assert_eq!(
            registry.get("10.0.0.0/24").unwrap(),
            ExtrapolatorIds {
                prefix_id: 0,
                block_id: 0,
                block_prefix_id: 0
            }
        );
        assert_eq!(
            registry.get("2001:db8::/32").unwrap(),
            ExtrapolatorIds {
                prefix_id: 2,
                block_id: 1,
                block_prefix_id: 0
            }
        );
        assert_eq!(
            registry.get("10.1.0.0/16").unwrap(),
            ExtrapolatorIds {
                prefix_id: 3,
                block_id: 1,
                block_prefix_id: 1
            }
        );
    }

    #[test]
    fn test_block_arithmetic_invariant() {
        let mut registry = PrefixRegistry::new(3).unwrap();
        for i in 0..10 {
            registry.add_prefix(&format!("10.0.{i}.0/24"));
        }
        for i in 0..10u64 {
            let ids = registry.get(&format!("10.0.{i}.0/24")).unwrap();
            assert_eq!(ids.prefix_id, i);
            assert_eq!(ids.block_id * 3 + ids.block_prefix_id, ids.prefix_id);
            assert!(ids.block_prefix_id < 3);
        }
    }

    #[test]
    fn test_host_bits_dropped() {
        let mut registry = PrefixRegistry::new(10).unwrap();
        registry.add_prefix("10.0.0.1/24");
        registry.add_prefix("not-a-prefix");
        registry.add_prefix("10.0.0.0/24");
        // the two malformed entries consume no IDs
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("10.0.0.0/24").unwrap().prefix_id, 0);
        assert_eq!(registry.get("10.0.0.1/24"), None);
    }

    #[test]
    fn test_block_size_one() {
        let mut registry = PrefixRegistry::new(1).unwrap();
        for i in 0..5 {
            registry.add_prefix(&format!("10.0.{i}.0/24"));
        }
        for i in 0..5u64 {
            let ids = registry.get(&format!("10.0.{i}.0/24")).unwrap();
            assert_eq!(ids.block_id, i);
            assert_eq!(ids.block_prefix_id, 0);
        }
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(PrefixRegistry::new(0).is_err());
    }
}
