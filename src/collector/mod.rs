/*!
The pipeline coordinator.

[MrtCollector] owns the on-disk layout and drives the stages in dependency
order: URL discovery, raw download, binary decode, prefix harvest, enrichment,
block aggregation, vantage-point analytics. Every stage is a barrier: the next
one starts only after all workers of the previous one returned. Stage-level
resumability rides on sentinel files (write-after-success, match-on-entry);
per-file resumability rides on the artifact paths themselves.
*/
use crate::error::CollectorError;
use crate::models::aspath::ReservedAsns;
use crate::models::incidents::{IncidentRecord, IncidentStore};
use crate::models::registry::PrefixRegistry;
use crate::models::roa::{RoaRecord, RoaTrie};
use crate::models::topology::AsTopology;
use crate::sources::Source;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub mod aggregate;
pub mod analytics;
pub mod decode;
pub mod download;
pub mod enrich;
pub mod mrt_file;
pub mod prefixes;

pub use analytics::VantagePointStats;
pub use decode::DecoderConfig;
pub use enrich::EnrichmentStores;
pub use mrt_file::MrtFile;

const UNIQUE_PREFIXES_FILE: &str = "unique_prefixes.txt";
const PREFIXES_SENTINEL: &str = "completed.txt";
const GLOBAL_TSV_FILE: &str = "parsed.tsv";
const VANTAGE_STATS_FILE: &str = "vantage_point_stats.json";

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Root of the on-disk layout; defaults to `mrt_collector_<date>` under
    /// the working directory.
    pub base_dir: Option<PathBuf>,
    /// Prefixes per block; part of the output identity (the emit directory
    /// is named after it).
    pub max_block_size: u64,
    /// Worker threads per stage; 0 means one per core.
    pub parallelism: usize,
    pub decoder: DecoderConfig,
    pub reserved_asns: ReservedAsns,
    /// Also emit a single cross-block TSV after aggregation.
    pub write_global_file: bool,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            base_dir: None,
            max_block_size: 2000,
            parallelism: 0,
            decoder: DecoderConfig::default(),
            reserved_asns: ReservedAsns::default(),
            write_global_file: false,
        }
    }
}

/// The fixed directory layout under the base directory.
#[derive(Debug, Clone)]
pub struct CollectorDirs {
    pub base: PathBuf,
    pub requests_cache: PathBuf,
    pub raw: PathBuf,
    pub parsed: PathBuf,
    pub prefixes: PathBuf,
    pub formatted: PathBuf,
    pub analysis: PathBuf,
}

impl CollectorDirs {
    fn new(base: PathBuf) -> Self {
        CollectorDirs {
            requests_cache: base.join("requests_cache"),
            raw: base.join("raw"),
            parsed: base.join("parsed"),
            prefixes: base.join("prefixes"),
            formatted: base.join("formatted"),
            analysis: base.join("analysis"),
            base,
        }
    }

    /// Creates the whole tree up front so workers never race on mkdir.
    fn create_all(&self) -> std::io::Result<()> {
        for dir in [
            &self.base,
            &self.requests_cache,
            &self.raw,
            &self.parsed,
            &self.prefixes,
            &self.formatted,
            &self.analysis,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

pub struct MrtCollector {
    dl_time: DateTime<Utc>,
    config: CollectorConfig,
    dirs: CollectorDirs,
    pool: rayon::ThreadPool,
}

impl MrtCollector {
    pub fn new(dl_time: DateTime<Utc>, config: CollectorConfig) -> Result<Self, CollectorError> {
        let base = config.base_dir.clone().unwrap_or_else(|| {
            PathBuf::from(format!("mrt_collector_{}", dl_time.format("%Y-%m-%d")))
        });
        let dirs = CollectorDirs::new(base);
        dirs.create_all()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallelism)
            .build()
            .map_err(|e| CollectorError::ConfigError(e.to_string()))?;
        Ok(MrtCollector {
            dl_time,
            config,
            dirs,
            pool,
        })
    }

    pub fn dirs(&self) -> &CollectorDirs {
        &self.dirs
    }

    /// S1: enumerates dump URLs from every source. A cadence violation is
    /// fatal; an unreachable index fails only that source.
    pub fn get_mrt_files(&self, sources: &[Source]) -> Result<Vec<MrtFile>, CollectorError> {
        let mut mrt_files = Vec::new();
        for source in sources {
            let urls = match source.enumerate_urls(self.dl_time, &self.dirs.requests_cache) {
                Ok(urls) => urls,
                Err(e @ CollectorError::CadenceError(_)) => return Err(e),
                Err(e) => {
                    error!("skipping source {source}: {e}");
                    continue;
                }
            };
            info!("{source}: {} dump URLs", urls.len());
            for url in urls {
                mrt_files.push(MrtFile::new(
                    url,
                    *source,
                    &self.dirs.raw,
                    &self.dirs.parsed,
                    &self.dirs.prefixes,
                    &self.dirs.formatted,
                ));
            }
        }
        Ok(mrt_files)
    }

    /// S2: downloads every raw dump that is not on disk yet.
    pub fn download_raw_mrts(&self, mrt_files: &[MrtFile]) -> Result<(), CollectorError> {
        let client = download::build_client()?;
        self.pool.install(|| {
            mrt_files
                .par_iter()
                .map(|mrt_file| download::download_raw(&client, mrt_file))
                .collect::<Result<(), CollectorError>>()
        })
    }

    /// S3: decodes every successfully downloaded file, largest raw file
    /// first. Decoder failures exclude the file from later stages; the
    /// survivors are returned.
    pub fn decode_mrts(&self, mrt_files: &[MrtFile]) -> Result<Vec<MrtFile>, CollectorError> {
        // a file is eligible if its download succeeded, or if an earlier run
        // already decoded it (raw files are deleted once enrichment is done)
        let mut to_decode: Vec<&MrtFile> = mrt_files
            .iter()
            .filter(|f| f.decoded_path.exists() || f.download_succeeded())
            .collect();
        to_decode.sort();
        info!(
            "decoding {} of {} files",
            to_decode.len(),
            mrt_files.len()
        );

        let results: Vec<(usize, Result<(), CollectorError>)> = self.pool.install(|| {
            to_decode
                .par_iter()
                .enumerate()
                .map(|(i, mrt_file)| (i, decode::decode_file(&self.config.decoder, mrt_file)))
                .collect()
        });

        let mut decoded = Vec::new();
        for (i, result) in results {
            match result {
                Ok(()) => decoded.push(to_decode[i].clone()),
                Err(e) => error!("{e}"),
            }
        }
        Ok(decoded)
    }

    pub fn unique_prefixes_path(&self) -> PathBuf {
        self.dirs.prefixes.join(UNIQUE_PREFIXES_FILE)
    }

    /// S4: harvests per-file prefixes and merges them into the global
    /// unique-prefix file, gated by the `completed.txt` sentinel.
    pub fn store_prefixes(&self, mrt_files: &[MrtFile]) -> Result<PathBuf, CollectorError> {
        let out_path = self.unique_prefixes_path();
        let sentinel = self.dirs.prefixes.join(PREFIXES_SENTINEL);
        let urls = urls_of(mrt_files);
        if out_path.exists() && url_sentinel_matches(&sentinel, &urls) {
            info!("unique prefixes already harvested, skipping");
            return Ok(out_path);
        }

        self.pool.install(|| {
            mrt_files
                .par_iter()
                .map(prefixes::store_unique_prefixes)
                .collect::<Result<(), CollectorError>>()
        })?;
        let count = prefixes::merge_unique_prefixes(mrt_files, &out_path)?;
        info!("{count} unique prefixes");
        write_url_sentinel(&sentinel, &urls)?;
        Ok(out_path)
    }

    /// Builds the read-only enrichment stores from the harvested prefixes
    /// and the feed records.
    pub fn build_stores(
        &self,
        roas: Vec<RoaRecord>,
        incidents: Vec<IncidentRecord>,
        topology: AsTopology,
    ) -> Result<EnrichmentStores, CollectorError> {
        let registry = PrefixRegistry::from_unique_prefix_file(
            &self.unique_prefixes_path(),
            self.config.max_block_size,
        )?;
        info!(
            "prefix registry: {} prefixes in {} blocks",
            registry.len(),
            registry.block_count()
        );
        Ok(EnrichmentStores {
            registry,
            roas: RoaTrie::from_records(roas),
            incidents: IncidentStore::from_records(incidents),
            topology,
            reserved: self.config.reserved_asns.clone(),
        })
    }

    fn enrich_sentinel(&self) -> PathBuf {
        self.dirs
            .formatted
            .join(format!("{}_completed.txt", self.config.max_block_size))
    }

    /// S5: enriches every decoded file into per-block shards, largest
    /// decoded file first, gated by `<max_block_size>_completed.txt`.
    /// Returns false when the sentinel matched and nothing ran.
    pub fn enrich_mrts(
        &self,
        mrt_files: &[MrtFile],
        stores: &EnrichmentStores,
    ) -> Result<bool, CollectorError> {
        let sentinel = self.enrich_sentinel();
        let urls = urls_of(mrt_files);
        if url_sentinel_matches(&sentinel, &urls) {
            info!("enrichment already completed for this input set, skipping");
            return Ok(false);
        }

        let mut ordered: Vec<&MrtFile> = mrt_files.iter().collect();
        ordered.sort();
        let counts = self.pool.install(|| {
            ordered
                .par_iter()
                .map(|mrt_file| enrich::enrich_file(mrt_file, stores))
                .collect::<Result<Vec<u64>, CollectorError>>()
        })?;
        info!("enriched {} records", counts.iter().sum::<u64>());
        write_url_sentinel(&sentinel, &urls)?;
        Ok(true)
    }

    pub fn block_dir(&self) -> PathBuf {
        self.dirs
            .formatted
            .join(self.config.max_block_size.to_string())
    }

    pub fn block_files(&self, block_count: u64) -> Vec<PathBuf> {
        let block_dir = self.block_dir();
        (0..block_count)
            .map(|block_id| block_dir.join(format!("{block_id}.tsv")))
            .collect()
    }

    /// S6: one file per block, plus the optional cross-block file.
    pub fn aggregate_blocks(
        &self,
        mrt_files: &[MrtFile],
        block_count: u64,
    ) -> Result<Vec<PathBuf>, CollectorError> {
        let block_dir = self.block_dir();
        fs::create_dir_all(&block_dir)?;
        let max_block_size = self.config.max_block_size;
        let block_files = self.pool.install(|| {
            (0..block_count)
                .into_par_iter()
                .map(|block_id| {
                    aggregate::aggregate_block(mrt_files, max_block_size, block_id, &block_dir)
                })
                .collect::<Result<Vec<PathBuf>, CollectorError>>()
        })?;
        if self.config.write_global_file {
            aggregate::write_global_file(&block_files, &block_dir.join(GLOBAL_TSV_FILE))?;
        }
        Ok(block_files)
    }

    /// S7: vantage-point statistics over the aggregated corpus.
    pub fn vantage_point_stats(
        &self,
        block_count: u64,
        topology: &AsTopology,
    ) -> Result<PathBuf, CollectorError> {
        let out_path = self.dirs.analysis.join(VANTAGE_STATS_FILE);
        let block_files: Vec<PathBuf> = self
            .block_files(block_count)
            .into_iter()
            .filter(|p| p.exists())
            .collect();
        analytics::collect_vantage_point_stats(&block_files, topology, &out_path)?;
        Ok(out_path)
    }

    /// Runs the whole pipeline. Returns the analysis output path.
    pub fn run(
        &self,
        sources: &[Source],
        roas: Vec<RoaRecord>,
        incidents: Vec<IncidentRecord>,
        topology: AsTopology,
    ) -> Result<PathBuf, CollectorError> {
        let mrt_files = self.get_mrt_files(sources)?;
        info!("{} MRT files to process", mrt_files.len());

        self.download_raw_mrts(&mrt_files)?;
        let decoded = self.decode_mrts(&mrt_files)?;
        self.store_prefixes(&decoded)?;

        let stores = self.build_stores(roas, incidents, topology)?;
        let block_count = stores.registry.block_count();
        let enriched = self.enrich_mrts(&decoded, &stores)?;

        // raw files are only needed by the decoder; drop them once the
        // enrichment pass is done with this input set
        for mrt_file in &mrt_files {
            let _ = fs::remove_file(&mrt_file.raw_path);
        }

        if enriched {
            self.aggregate_blocks(&decoded, block_count)?;
            for mrt_file in &decoded {
                let _ = fs::remove_file(&mrt_file.decoded_path);
            }
        } else {
            warn!("enrichment was skipped; leaving existing block files in place");
        }

        self.vantage_point_stats(block_count, &stores.topology)
    }
}

fn urls_of(mrt_files: &[MrtFile]) -> Vec<String> {
    mrt_files.iter().map(|f| f.url.clone()).collect()
}

/// Writes a stage sentinel listing the URLs that made up the stage's input.
fn write_url_sentinel(path: &Path, urls: &[String]) -> Result<(), CollectorError> {
    let mut body = urls.join("\n");
    body.push('\n');
    fs::write(path, body)?;
    Ok(())
}

/// A sentinel matches iff it lists exactly the current URL set.
fn url_sentinel_matches(path: &Path, urls: &[String]) -> bool {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return false,
    };
    let recorded: HashSet<&str> = content.lines().filter(|l| !l.is_empty()).collect();
    let current: HashSet<&str> = urls.iter().map(String::as_str).collect();
    recorded == current
}
