/*!
`mrt-collector` turns public MRT RIB dumps into an analysis-ready, enriched
tabular corpus.

The pipeline discovers dump URLs from the registered collector networks,
downloads and decodes each dump (decoding is delegated to an external MRT
decoder such as `bgpkit-parser`), numbers every unique prefix into fixed-size
blocks, and joins each announcement with:

- its **ROA verdict** from a longest-prefix-match trie over the ROA feed,
- **known incidents** (hijacks, route leaks, outages) keyed by prefix/origin,
- an **AS-path analysis** covering prepending, loops, reserved-ASN poisoning,
  IXP traversal, input-clique splits, and Gao-Rexford valley-freeness against
  the CAIDA relationship topology.

Enriched records are sharded by block, aggregated into one TSV per block, and
summarized into per-vantage-point statistics.

# Example

```no_run
use chrono::{TimeZone, Utc};
use mrt_collector::{AsTopology, CollectorConfig, MrtCollector, Source};

let dl_time = Utc.with_ymd_and_hms(2023, 12, 12, 0, 0, 0).unwrap();
let collector = MrtCollector::new(dl_time, CollectorConfig::default()).unwrap();
// feed records come from external collectors; empty stores are valid
let stats_path = collector
    .run(&Source::ALL, vec![], vec![], AsTopology::new())
    .unwrap();
println!("vantage stats at {}", stats_path.display());
```

Every stage is resumable: completed stages are gated by sentinel files and
skipped when their recorded input set matches, and per-file artifacts are
never rebuilt when present. Failed downloads are recorded with an error
sentinel so a rerun does not reattempt them within the same input set.
*/
pub mod collector;
pub mod error;
pub mod models;
pub mod sources;

pub use collector::{
    CollectorConfig, DecoderConfig, EnrichmentStores, MrtCollector, MrtFile, VantagePointStats,
};
pub use error::CollectorError;
pub use models::*;
pub use sources::Source;
