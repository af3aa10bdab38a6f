//! Vantage-point analytics over the aggregated corpus.
//!
//! A vantage point is the ASN at position 0 of the collector-reported AS
//! path, which the enrichment core already materialized as `collector_asn`.
//! Stats are accumulated one vantage point at a time and the JSON output is
//! rewritten after each, so a crashed run resumes where it stopped.

use crate::error::CollectorError;
use crate::models::record::ENRICHED_FIELDS;
use crate::models::topology::AsTopology;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VantagePointStats {
    pub asn: u32,
    pub as_rank: Option<u64>,
    pub num_prefixes: u64,
    pub num_anns: u64,
    pub no_path_poisoning_prefix_ids_set: BTreeSet<u64>,
}

// position() over a const array; the names are known at compile time
fn column(name: &str) -> usize {
    ENRICHED_FIELDS
        .iter()
        .position(|field| *field == name)
        .expect("unknown enriched column")
}

/// Computes per-vantage-point statistics over the aggregated block files and
/// maintains them in a single JSON object keyed by ASN at `out_path`.
/// Vantage points already present in the output are skipped.
pub fn collect_vantage_point_stats(
    block_files: &[PathBuf],
    topology: &AsTopology,
    out_path: &Path,
) -> Result<BTreeMap<u32, VantagePointStats>, CollectorError> {
    let mut stats: BTreeMap<u32, VantagePointStats> = match out_path.exists() {
        true => serde_json::from_str(&fs::read_to_string(out_path)?)
            .map_err(|e| CollectorError::RecordError(format!("corrupt stats file: {e}")))?,
        false => BTreeMap::new(),
    };

    let collector_col = column("collector_asn");
    let prefix_id_col = column("prefix_id");
    let invalid_col = column("invalid_as_path_asns");
    let prepending_col = column("prepending");
    let loop_col = column("as_path_loop");
    let clique_split_col = column("input_clique_split");

    let vantage_asns = distinct_collector_asns(block_files, collector_col)?;
    info!("{} vantage points observed", vantage_asns.len());

    for asn in vantage_asns {
        if stats.contains_key(&asn) {
            continue;
        }
        let needle = asn.to_string();
        let mut prefix_ids: HashSet<u64> = HashSet::new();
        let mut clean_prefix_ids: BTreeSet<u64> = BTreeSet::new();
        let mut num_anns = 0u64;

        for block_file in block_files {
            let reader = BufReader::new(File::open(block_file)?);
            for line in reader.lines() {
                let line = line?;
                // cheap pre-filter before paying for the split
                if !line.contains(&needle) {
                    continue;
                }
                let fields: Vec<&str> = line.split('\t').collect();
                if fields.get(collector_col) != Some(&needle.as_str()) {
                    continue;
                }
                let prefix_id = match fields.get(prefix_id_col).and_then(|f| f.parse().ok()) {
                    Some(id) => id,
                    None => continue,
                };
                num_anns += 1;
                prefix_ids.insert(prefix_id);
                let poisoned = fields.get(invalid_col) != Some(&"[]")
                    || fields.get(prepending_col) == Some(&"true")
                    || fields.get(loop_col) == Some(&"true")
                    || fields.get(clique_split_col) == Some(&"true");
                if !poisoned {
                    clean_prefix_ids.insert(prefix_id);
                }
            }
        }

        stats.insert(
            asn,
            VantagePointStats {
                asn,
                as_rank: topology.as_rank(asn),
                num_prefixes: prefix_ids.len() as u64,
                num_anns,
                no_path_poisoning_prefix_ids_set: clean_prefix_ids,
            },
        );
        write_stats(&stats, out_path)?;
    }
    Ok(stats)
}

fn distinct_collector_asns(
    block_files: &[PathBuf],
    collector_col: usize,
) -> Result<BTreeSet<u32>, CollectorError> {
    let mut asns = BTreeSet::new();
    for block_file in block_files {
        let reader = BufReader::new(File::open(block_file)?);
        for line in reader.lines().skip(1) {
            let line = line?;
            if let Some(asn) = line
                .split('\t')
                .nth(collector_col)
                .and_then(|f| f.parse().ok())
            {
                asns.insert(asn);
            }
        }
    }
    Ok(asns)
}

/// Rewrites the stats file through a scratch path so a crash mid-write never
/// loses previously accumulated vantage points.
fn write_stats(
    stats: &BTreeMap<u32, VantagePointStats>,
    out_path: &Path,
) -> Result<(), CollectorError> {
    let body = serde_json::to_string_pretty(stats)
        .map_err(|e| CollectorError::RecordError(format!("serializing stats: {e}")))?;
    let scratch = out_path.with_extension("json.part");
    fs::write(&scratch, body)?;
    fs::rename(&scratch, out_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::enriched_header;

    /// Builds one enriched TSV row with only the analytics-relevant columns
    /// populated.
    fn row(collector: u32, prefix_id: u64, invalid: &str, prepending: bool) -> String {
        let mut fields = vec![String::new(); ENRICHED_FIELDS.len()];
        fields[column("prefix_id")] = prefix_id.to_string();
        fields[column("collector_asn")] = collector.to_string();
        fields[column("invalid_as_path_asns")] = invalid.to_string();
        fields[column("prepending")] = prepending.to_string();
        fields[column("as_path_loop")] = prepending.to_string();
        fields[column("input_clique_split")] = "false".to_string();
        fields.join("\t")
    }

    #[test]
    fn test_vantage_stats_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let block = dir.path().join("0.tsv");
        let content = [
            enriched_header(),
            row(64500, 1, "[]", false),
            row(64500, 1, "[]", false),
            row(64500, 2, "[65535]", false),
            row(64501, 3, "[]", true),
        ]
        .join("\n");
        fs::write(&block, content).unwrap();

        let out = dir.path().join("vantage_point_stats.json");
        let stats =
            collect_vantage_point_stats(&[block], &AsTopology::new(), &out).unwrap();

        let vp = &stats[&64500];
        assert_eq!(vp.num_anns, 3);
        assert_eq!(vp.num_prefixes, 2);
        assert_eq!(
            vp.no_path_poisoning_prefix_ids_set,
            BTreeSet::from([1])
        );
        // prepending poisons the only announcement of 64501
        assert!(stats[&64501].no_path_poisoning_prefix_ids_set.is_empty());
        assert!(out.exists());
    }

    #[test]
    fn test_existing_stats_are_not_recomputed() {
        let dir = tempfile::tempdir().unwrap();
        let block = dir.path().join("0.tsv");
        fs::write(
            &block,
            format!("{}\n{}", enriched_header(), row(64500, 1, "[]", false)),
        )
        .unwrap();
        let out = dir.path().join("vantage_point_stats.json");

        let precomputed = BTreeMap::from([(
            64500u32,
            VantagePointStats {
                asn: 64500,
                as_rank: Some(12),
                num_prefixes: 99,
                num_anns: 99,
                no_path_poisoning_prefix_ids_set: BTreeSet::new(),
            },
        )]);
        write_stats(&precomputed, &out).unwrap();

        let stats =
            collect_vantage_point_stats(&[block], &AsTopology::new(), &out).unwrap();
        // resumed run keeps the stored entry untouched
        assert_eq!(stats[&64500].num_anns, 99);
        assert_eq!(stats[&64500].as_rank, Some(12));
    }
}
