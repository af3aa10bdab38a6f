//! Known-incident metadata (hijacks, route leaks, outages) keyed for the
//! enrichment join.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One normalized row from the incident feed.
///
/// Exactly one of the hijack / leak / outage column groups is populated per
/// row; the rest stay `None` and serialize to empty TSV cells.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub event_number: Option<u64>,
    pub event_type: Option<String>,
    pub country: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub url: Option<String>,

    pub hijack_detected_origin_name: Option<String>,
    pub hijack_detected_origin_number: Option<u32>,
    pub hijack_expected_origin_name: Option<String>,
    pub hijack_expected_origin_number: Option<u32>,
    pub hijack_expected_prefix: Option<String>,
    pub hijack_more_specific_prefix: Option<String>,

    pub leak_origin_as_name: Option<String>,
    pub leak_origin_as_number: Option<u32>,
    pub leaked_prefix: Option<String>,
    /// Leaked-to ASNs fan out to one `(prefix, origin)` key each but stay a
    /// single bracketed-list column in the corpus, like the path-analysis
    /// list fields.
    #[serde(default)]
    pub leaked_to_name: Vec<String>,
    #[serde(default)]
    pub leaked_to_number: Vec<u32>,
    pub leaker_as_name: Option<String>,
    pub leaker_as_number: Option<u32>,

    pub outage_as_name: Option<String>,
    pub outage_as_number: Option<u32>,
    pub outage_number_prefixes_affected: Option<u64>,
    pub outage_percent_prefixes_affected: Option<f64>,
}

/// Incident rows indexed two ways: `(prefix, origin)` for hijack and leak
/// pairs, and bare origin for outages. Duplicate keys overwrite; the last
/// feed row wins.
#[derive(Debug, Clone, Default)]
pub struct IncidentStore {
    rows: Vec<IncidentRecord>,
    by_prefix_origin: HashMap<String, HashMap<u32, usize>>,
    by_origin: HashMap<u32, usize>,
}

impl IncidentStore {
    pub fn new() -> Self {
        IncidentStore::default()
    }

    pub fn from_records(rows: Vec<IncidentRecord>) -> Self {
        let mut store = IncidentStore {
            rows,
            by_prefix_origin: HashMap::new(),
            by_origin: HashMap::new(),
        };
        for i in 0..store.rows.len() {
            let row = store.rows[i].clone();
            if let Some(detected) = row.hijack_detected_origin_number {
                if let Some(prefix) = &row.hijack_more_specific_prefix {
                    store.index_pair(prefix, detected, i);
                }
                if let (Some(expected), Some(prefix)) =
                    (row.hijack_expected_origin_number, &row.hijack_expected_prefix)
                {
                    store.index_pair(prefix, expected, i);
                }
            } else if let Some(prefix) = &row.leaked_prefix {
                if let Some(leaker) = row.leaker_as_number {
                    store.index_pair(prefix, leaker, i);
                }
                if let Some(origin) = row.leak_origin_as_number {
                    store.index_pair(prefix, origin, i);
                }
                for leaked_to in &row.leaked_to_number {
                    store.index_pair(prefix, *leaked_to, i);
                }
            }
            if let Some(outage_asn) = row.outage_as_number {
                store.by_origin.insert(outage_asn, i);
            }
        }
        store
    }

    fn index_pair(&mut self, prefix: &str, origin: u32, row: usize) {
        self.by_prefix_origin
            .entry(prefix.to_string())
            .or_default()
            .insert(origin, row);
    }

    /// The `(prefix, origin)` pair map is consulted first, then the
    /// origin-only outage map.
    pub fn lookup(&self, prefix: &str, origin: u32) -> Option<&IncidentRecord> {
        let index = self
            .by_prefix_origin
            .get(prefix)
            .and_then(|origins| origins.get(&origin))
            .or_else(|| self.by_origin.get(&origin))?;
        self.rows.get(*index)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
