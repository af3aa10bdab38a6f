//! The enrichment core: joins each decoded record with the prefix registry,
//! the ROA trie, the incident maps, and the AS-path analysis, then shards the
//! result by `block_id`.
//!
//! Every worker gets read-only references to the stores; the only mutable
//! state is per-file (the shard writers and the record counter), so workers
//! never coordinate beyond the filesystem.

use crate::collector::mrt_file::MrtFile;
use crate::error::CollectorError;
use crate::models::aspath::{analyze_as_path, parse_as_path, ReservedAsns};
use crate::models::incidents::IncidentStore;
use crate::models::record::{enriched_header, DecodedRecord, EnrichedRecord};
use crate::models::registry::PrefixRegistry;
use crate::models::roa::RoaTrie;
use crate::models::topology::AsTopology;
use ipnet::IpNet;
use log::warn;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};

/// How often the per-file record counter is flushed to `count.txt` so an
/// external progress view can sum the files mid-run.
const PROGRESS_FLUSH_INTERVAL: u64 = 10_000;

/// Everything the enrichment stage reads. Built once, shared immutably by
/// all workers.
#[derive(Debug, Clone)]
pub struct EnrichmentStores {
    pub registry: PrefixRegistry,
    pub roas: RoaTrie,
    pub incidents: IncidentStore,
    pub topology: AsTopology,
    pub reserved: ReservedAsns,
}

/// Enriches one decoded file into its per-block shards, returning the number
/// of records written. Record-level failures are logged and dropped;
/// anything filesystem-level propagates and fails the file.
pub fn enrich_file(
    mrt_file: &MrtFile,
    stores: &EnrichmentStores,
) -> Result<u64, CollectorError> {
    let registry = &stores.registry;
    let max_block_size = registry.max_block_size();
    fs::create_dir_all(mrt_file.shard_dir(max_block_size))?;

    let header = enriched_header();
    let mut writers = Vec::with_capacity(registry.block_count() as usize);
    for block_id in 0..registry.block_count() {
        let mut writer = BufWriter::new(File::create(
            mrt_file.shard_path(max_block_size, block_id),
        )?);
        writeln!(writer, "{header}")?;
        writers.push(writer);
    }

    let count_path = mrt_file.count_path(max_block_size);
    let reader = BufReader::new(File::open(&mrt_file.decoded_path)?);
    let mut count = 0u64;
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() || DecodedRecord::is_header_line(&line) {
            continue;
        }
        let record = match DecodedRecord::from_psv_line(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!("dropping record from {}: {e}", mrt_file.url);
                continue;
            }
        };
        let ids = match registry.get(&record.prefix) {
            Some(ids) => ids,
            // only prefixes the registry rejected as malformed are missing
            None => {
                warn!(
                    "dropping record from {}: prefix {} not in registry",
                    mrt_file.url, record.prefix
                );
                continue;
            }
        };
        let prefix_net: IpNet = match record.prefix.parse() {
            Ok(net) => net,
            Err(_) => {
                warn!(
                    "dropping record from {}: unparseable prefix {}",
                    mrt_file.url, record.prefix
                );
                continue;
            }
        };
        let tokens = match parse_as_path(&record.as_path) {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("dropping record from {}: {e}", mrt_file.url);
                continue;
            }
        };

        let analysis = analyze_as_path(&tokens, &stores.topology, &stores.reserved);
        let (roa_validity, roa_routed) = stores.roas.validity(&prefix_net, analysis.origin_asn);
        let incident = stores.incidents.lookup(&record.prefix, analysis.origin_asn);

        let enriched = EnrichedRecord {
            decoded: &record,
            ids,
            roa_validity,
            roa_routed,
            incident,
            path: &analysis,
            source_url: &mrt_file.url,
        };
        enriched.write_tsv(&mut writers[ids.block_id as usize])?;

        count += 1;
        if count % PROGRESS_FLUSH_INTERVAL == 0 {
            fs::write(&count_path, count.to_string())?;
        }
    }

    for mut writer in writers {
        writer.flush()?;
    }
    fs::write(&count_path, count.to_string())?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::incidents::IncidentRecord;
    use crate::models::roa::RoaRecord;
    use crate::sources::Source;
    use std::path::Path;

    fn stores(max_block_size: u64, prefixes: &[&str]) -> EnrichmentStores {
        let mut registry = PrefixRegistry::new(max_block_size).unwrap();
        for prefix in prefixes {
            registry.add_prefix(prefix);
        }
        EnrichmentStores {
            registry,
            roas: RoaTrie::new(),
            incidents: IncidentStore::new(),
            topology: AsTopology::new(),
            reserved: ReservedAsns::default(),
        }
    }

    fn mrt_file(dir: &Path) -> MrtFile {
        MrtFile::new(
            "http://example.com/rib.bz2".to_string(),
            Source::RouteViews,
            dir,
            dir,
            dir,
            dir,
        )
    }

    fn psv_line(prefix: &str, as_path: &str) -> String {
        format!("||{as_path}|||||IGP|65000|64500|10.0.0.1|{prefix}|1702339200|A")
    }

    #[test]
    fn test_records_land_in_their_block_shard() {
        let dir = tempfile::tempdir().unwrap();
        let file = mrt_file(dir.path());
        let stores = stores(1, &["10.0.0.0/24", "10.0.1.0/24"]);
        let lines = [
            psv_line("10.0.1.0/24", "64500 65000"),
            psv_line("10.0.0.0/24", "64500 65000"),
        ];
        std::fs::write(&file.decoded_path, lines.join("\n")).unwrap();

        let count = enrich_file(&file, &stores).unwrap();
        assert_eq!(count, 2);

        let shard0 = std::fs::read_to_string(file.shard_path(1, 0)).unwrap();
        let shard1 = std::fs::read_to_string(file.shard_path(1, 1)).unwrap();
        assert_eq!(shard0.lines().count(), 2); // header + one record
        assert_eq!(shard1.lines().count(), 2);
        assert!(shard0.contains("10.0.0.0/24"));
        assert!(shard1.contains("10.0.1.0/24"));
        assert_eq!(
            std::fs::read_to_string(file.count_path(1)).unwrap(),
            "2"
        );
    }

    #[test]
    fn test_malformed_records_dropped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let file = mrt_file(dir.path());
        let stores = stores(10, &["10.0.0.0/24"]);
        let lines = [
            "way|too|few|fields".to_string(),
            psv_line("10.0.0.0/24", "64500 junk 65000"),
            psv_line("192.0.2.0/24", "64500 65000"), // not in registry
            psv_line("10.0.0.0/24", "64500 65000"),
        ];
        std::fs::write(&file.decoded_path, lines.join("\n")).unwrap();
        assert_eq!(enrich_file(&file, &stores).unwrap(), 1);
    }

    #[test]
    fn test_empty_decoded_file_emits_headers_only() {
        let dir = tempfile::tempdir().unwrap();
        let file = mrt_file(dir.path());
        let stores = stores(10, &[]);
        std::fs::write(&file.decoded_path, "").unwrap();
        assert_eq!(enrich_file(&file, &stores).unwrap(), 0);
        let shard = std::fs::read_to_string(file.shard_path(10, 0)).unwrap();
        assert_eq!(shard.trim_end(), enriched_header());
    }

    #[test]
    fn test_enrichment_joins_roa_and_incident() {
        let dir = tempfile::tempdir().unwrap();
        let file = mrt_file(dir.path());
        let mut stores = stores(10, &["10.0.0.0/24"]);
        stores.roas = RoaTrie::from_records(vec![RoaRecord {
            prefix: "10.0.0.0/23".parse().unwrap(),
            origin_asn: 65000,
            max_length: Some(24),
        }]);
        stores.incidents = IncidentStore::from_records(vec![IncidentRecord {
            event_number: Some(7),
            event_type: Some("hijack".to_string()),
            hijack_detected_origin_number: Some(65000),
            hijack_more_specific_prefix: Some("10.0.0.0/24".to_string()),
            ..Default::default()
        }]);
        std::fs::write(&file.decoded_path, psv_line("10.0.0.0/24", "64500 65000")).unwrap();
        enrich_file(&file, &stores).unwrap();

        let shard = std::fs::read_to_string(file.shard_path(10, 0)).unwrap();
        let row = shard.lines().nth(1).unwrap();
        let fields: Vec<&str> = row.split('\t').collect();
        assert_eq!(fields[17], "0"); // roa_validity VALID
        assert_eq!(fields[18], "0"); // roa_routed ROUTED
        assert_eq!(fields[19], "7"); // bgpstream_event_number
        assert_eq!(fields[20], "hijack");
    }
}
