//! The per-dump pipeline unit and its on-disk artifact paths.

use crate::sources::Source;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::cmp::Ordering;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Written as the raw file's only content when a download fails for good, so
/// the file is recorded as attempted and later stages skip it.
pub const DOWNLOAD_ERROR_SENTINEL: &str = "ERROR";

/// Percent-encode like a URL path component, but keep `/` so it can be
/// rewritten to `_` afterwards.
const FNAME_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Converts a dump URL into a filename stem. The stem is prefixed with
/// `non_url` so external BGP tools never mistake it for a URL, and `/` maps
/// to `_`. With `ext`, a trailing `.gz`/`.bz2` is replaced by the new
/// extension.
pub fn url_to_fname(url: &str, ext: Option<&str>) -> String {
    let mut fname = format!("non_url{}", utf8_percent_encode(url, FNAME_SET)).replace('/', "_");
    if let Some(ext) = ext {
        for compressed in [".gz", ".bz2"] {
            if let Some(stripped) = fname.strip_suffix(compressed) {
                fname = stripped.to_string();
                break;
            }
        }
        fname = format!("{fname}.{ext}");
    }
    fname
}

/// One MRT dump moving through the pipeline, with deterministic paths for
/// each per-file artifact.
#[derive(Debug, Clone)]
pub struct MrtFile {
    pub url: String,
    pub source: Source,
    pub raw_path: PathBuf,
    pub decoded_path: PathBuf,
    pub prefixes_path: PathBuf,
    formatted_dir: PathBuf,
}

impl MrtFile {
    pub fn new(
        url: String,
        source: Source,
        raw_dir: &Path,
        parsed_dir: &Path,
        prefixes_dir: &Path,
        formatted_dir: &Path,
    ) -> Self {
        let raw_path = raw_dir.join(url_to_fname(&url, None));
        let decoded_path = parsed_dir.join(url_to_fname(&url, Some("psv")));
        let prefixes_path = prefixes_dir.join(url_to_fname(&url, Some("csv")));
        let formatted_dir = formatted_dir.join(url_to_fname(&url, Some("d")));
        MrtFile {
            url,
            source,
            raw_path,
            decoded_path,
            prefixes_path,
            formatted_dir,
        }
    }

    /// True once a download was attempted, successful or not.
    pub fn downloaded(&self) -> bool {
        self.raw_path.exists()
    }

    /// True iff the raw file exists and its first bytes are not the download
    /// error sentinel.
    pub fn download_succeeded(&self) -> bool {
        let mut file = match File::open(&self.raw_path) {
            Ok(f) => f,
            Err(_) => return false,
        };
        let mut head = [0u8; DOWNLOAD_ERROR_SENTINEL.len()];
        match file.read_exact(&mut head) {
            Ok(()) => head != DOWNLOAD_ERROR_SENTINEL.as_bytes(),
            // shorter than the sentinel: not the sentinel, but also nothing
            // a decoder could use
            Err(_) => false,
        }
    }

    pub fn raw_size(&self) -> Option<u64> {
        self.raw_path.metadata().ok().map(|m| m.len())
    }

    pub fn decoded_size(&self) -> Option<u64> {
        self.decoded_path.metadata().ok().map(|m| m.len())
    }

    /// Directory holding this file's per-block shards for one block size.
    pub fn shard_dir(&self, max_block_size: u64) -> PathBuf {
        self.formatted_dir.join(max_block_size.to_string())
    }

    pub fn shard_path(&self, max_block_size: u64, block_id: u64) -> PathBuf {
        self.shard_dir(max_block_size).join(format!("{block_id}.tsv"))
    }

    pub fn count_path(&self, max_block_size: u64) -> PathBuf {
        self.shard_dir(max_block_size).join("count.txt")
    }

    /// Sort key: decoded size when present, then raw size. Stages iterate
    /// files largest-first so the biggest file never runs last.
    fn size_key(&self) -> (u64, u64) {
        (
            self.decoded_size().unwrap_or(0),
            self.raw_size().unwrap_or(0),
        )
    }
}

impl PartialEq for MrtFile {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for MrtFile {}

impl Ord for MrtFile {
    /// Descending by on-disk size, URL as the tie breaker so the order is
    /// stable across runs.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .size_key()
            .cmp(&self.size_key())
            .then_with(|| self.url.cmp(&other.url))
    }
}

impl PartialOrd for MrtFile {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_url_to_fname() {
        let url = "http://archive.routeviews.org/bgpdata/2023.12/RIBS/rib.20231212.0000.bz2";
        let fname = url_to_fname(url, None);
        assert!(fname.starts_with("non_url"));
        assert!(!fname.contains('/'));
        assert_eq!(
            fname,
            "non_urlhttp%3A__archive.routeviews.org_bgpdata_2023.12_RIBS_rib.20231212.0000.bz2"
        );
    }

    #[test]
    fn test_url_to_fname_extension_rewrite() {
        let url = "http://data.ris.ripe.net/rrc00/2023.12/bview.20231212.0000.gz";
        let fname = url_to_fname(url, Some("psv"));
        assert!(fname.ends_with("bview.20231212.0000.psv"));
        // uncompressed URLs just gain the extension
        assert!(url_to_fname("http://x/y.dump", Some("csv")).ends_with("y.dump.csv"));
    }

    #[test]
    fn test_download_succeeded_checks_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let file = MrtFile::new(
            "http://example.com/rib.bz2".to_string(),
            Source::RouteViews,
            dir.path(),
            dir.path(),
            dir.path(),
            dir.path(),
        );
        assert!(!file.downloaded());
        assert!(!file.download_succeeded());

        std::fs::write(&file.raw_path, DOWNLOAD_ERROR_SENTINEL).unwrap();
        assert!(file.downloaded());
        assert!(!file.download_succeeded());

        let mut f = File::create(&file.raw_path).unwrap();
        f.write_all(b"\x0c\x00\x00mrt-bytes").unwrap();
        assert!(file.download_succeeded());
    }

    #[test]
    fn test_size_descending_order() {
        let dir = tempfile::tempdir().unwrap();
        let make = |name: &str, len: usize| {
            let file = MrtFile::new(
                format!("http://example.com/{name}.gz"),
                Source::RipeRis,
                dir.path(),
                dir.path(),
                dir.path(),
                dir.path(),
            );
            std::fs::write(&file.decoded_path, vec![b'x'; len]).unwrap();
            file
        };
        let small = make("small", 10);
        let large = make("large", 1000);
        let mut files = vec![small.clone(), large.clone()];
        files.sort();
        assert_eq!(files[0], large);
        assert_eq!(files[1], small);
    }
}
