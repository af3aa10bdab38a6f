//! Command-line front end for the collection pipeline.
//!
//! Feed inputs (ROAs, incidents, AS topology) are read from local files in
//! their collectors' normalized formats; all of them are optional and default
//! to empty stores.

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::Parser;
use mrt_collector::{
    AsTopology, CollectorConfig, CollectorError, DecoderConfig, IncidentRecord, MrtCollector,
    RoaRecord, Source,
};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Collect, enrich, and aggregate MRT RIB dumps for one snapshot time.
#[derive(Parser)]
#[clap(version, about)]
struct Opts {
    /// Snapshot timestamp, UTC, e.g. 2023-12-12T00:00
    #[clap(long)]
    date: String,

    /// Base directory for all pipeline artifacts
    #[clap(long)]
    base_dir: Option<PathBuf>,

    /// Number of prefixes per output block
    #[clap(long, default_value_t = 2000)]
    max_block_size: u64,

    /// Worker threads per stage (0 = one per core)
    #[clap(long, default_value_t = 0)]
    parallelism: usize,

    /// External MRT decoder program
    #[clap(long, default_value = "bgpkit-parser")]
    decoder: String,

    /// Sources to pull dumps from
    #[clap(long, value_delimiter = ',', default_values_t = vec!["route_views".to_string(), "ripe_ris".to_string()])]
    sources: Vec<String>,

    /// ROA feed file (TSV: prefix, asn, max_length)
    #[clap(long)]
    roas: Option<PathBuf>,

    /// Incident feed file (JSON array of incident rows)
    #[clap(long)]
    incidents: Option<PathBuf>,

    /// AS relationship file (CAIDA serial-2: as1|as2|rel)
    #[clap(long)]
    topology: Option<PathBuf>,

    /// Input clique (tier-1) ASNs, one per line
    #[clap(long)]
    clique: Option<PathBuf>,

    /// IXP ASNs, one per line
    #[clap(long)]
    ixps: Option<PathBuf>,

    /// Also write a single cross-block TSV
    #[clap(long)]
    global_file: bool,

    /// Only process a handful of files (smoke-test mode)
    #[clap(long)]
    quick: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run(Opts::parse()) {
        log::error!("{e}");
        std::process::exit(1);
    }
}

fn run(opts: Opts) -> Result<(), CollectorError> {
    let dl_time = parse_dl_time(&opts.date)?;
    let sources = parse_sources(&opts.sources)?;

    let config = CollectorConfig {
        base_dir: opts.base_dir.clone(),
        max_block_size: opts.max_block_size,
        parallelism: opts.parallelism,
        decoder: DecoderConfig {
            program: opts.decoder.clone(),
            ..DecoderConfig::default()
        },
        write_global_file: opts.global_file,
        ..CollectorConfig::default()
    };

    let roas = match &opts.roas {
        Some(path) => load_roas(path)?,
        None => vec![],
    };
    let incidents = match &opts.incidents {
        Some(path) => load_incidents(path)?,
        None => vec![],
    };
    let topology = load_topology(
        opts.topology.as_deref(),
        opts.clique.as_deref(),
        opts.ixps.as_deref(),
    )?;

    let collector = MrtCollector::new(dl_time, config)?;
    let stats_path = match opts.quick {
        true => {
            let mut mrt_files = collector.get_mrt_files(&sources)?;
            // smoke runs only need a few small files
            let keep = mrt_files.len().saturating_sub(4);
            mrt_files.drain(..keep);
            collector.download_raw_mrts(&mrt_files)?;
            let decoded = collector.decode_mrts(&mrt_files)?;
            collector.store_prefixes(&decoded)?;
            let stores = collector.build_stores(roas, incidents, topology)?;
            let block_count = stores.registry.block_count();
            if collector.enrich_mrts(&decoded, &stores)? {
                collector.aggregate_blocks(&decoded, block_count)?;
            }
            collector.vantage_point_stats(block_count, &stores.topology)?
        }
        false => collector.run(&sources, roas, incidents, topology)?,
    };
    log::info!("vantage point statistics written to {}", stats_path.display());
    Ok(())
}

fn parse_dl_time(input: &str) -> Result<DateTime<Utc>, CollectorError> {
    let naive = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M")
        .map_err(|e| CollectorError::ConfigError(format!("bad --date {input:?}: {e}")))?;
    Ok(naive.and_utc())
}

fn parse_sources(names: &[String]) -> Result<Vec<Source>, CollectorError> {
    names
        .iter()
        .map(|name| match name.as_str() {
            "route_views" => Ok(Source::RouteViews),
            "ripe_ris" => Ok(Source::RipeRis),
            other => Err(CollectorError::ConfigError(format!(
                "unknown source {other:?}"
            ))),
        })
        .collect()
}

/// TSV rows of `prefix<TAB>asn<TAB>max_length`; max_length may be empty.
fn load_roas(path: &Path) -> Result<Vec<RoaRecord>, CollectorError> {
    let mut roas = Vec::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 2 || fields[0] == "prefix" {
            continue;
        }
        let (Ok(prefix), Ok(origin_asn)) = (fields[0].parse(), fields[1].parse()) else {
            log::warn!("skipping malformed ROA row {line:?}");
            continue;
        };
        let max_length = fields.get(2).and_then(|f| f.parse().ok());
        roas.push(RoaRecord {
            prefix,
            origin_asn,
            max_length,
        });
    }
    Ok(roas)
}

fn load_incidents(path: &Path) -> Result<Vec<IncidentRecord>, CollectorError> {
    serde_json::from_reader(BufReader::new(File::open(path)?))
        .map_err(|e| CollectorError::ConfigError(format!("bad incident feed: {e}")))
}

/// CAIDA serial-2 relationship rows (`as1|as2|-1` provider-to-customer,
/// `as1|as2|0` peer-to-peer), plus optional clique and IXP ASN lists.
fn load_topology(
    relationships: Option<&Path>,
    clique: Option<&Path>,
    ixps: Option<&Path>,
) -> Result<AsTopology, CollectorError> {
    let mut topology = AsTopology::new();
    if let Some(path) = relationships {
        for line in BufReader::new(File::open(path)?).lines() {
            let line = line?;
            if line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('|').collect();
            let (Some(Ok(a)), Some(Ok(b)), Some(rel)) = (
                fields.first().map(|f| f.parse::<u32>()),
                fields.get(1).map(|f| f.parse::<u32>()),
                fields.get(2),
            ) else {
                log::warn!("skipping malformed relationship row {line:?}");
                continue;
            };
            match *rel {
                "-1" => topology.add_provider_customer(a, b),
                "0" => topology.add_peer_peer(a, b),
                other => log::warn!("unknown relationship kind {other:?} in {line:?}"),
            }
        }
    }
    if let Some(path) = clique {
        for asn in load_asn_list(path)? {
            topology.add_input_clique_asn(asn);
        }
    }
    if let Some(path) = ixps {
        for asn in load_asn_list(path)? {
            topology.add_ixp_asn(asn);
        }
    }
    Ok(topology)
}

fn load_asn_list(path: &Path) -> Result<Vec<u32>, CollectorError> {
    let mut asns = Vec::new();
    for line in BufReader::new(File::open(path)?).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match trimmed.parse() {
            Ok(asn) => asns.push(asn),
            Err(_) => log::warn!("skipping malformed ASN {trimmed:?}"),
        }
    }
    Ok(asns)
}
