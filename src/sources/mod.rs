/*!
MRT dump sources.

Each source knows its collector index page, the cadence at which it publishes
RIB dumps, and how to template a per-collector dump URL for a snapshot
timestamp. The set of sources is a closed enum; adding a source means adding
a variant.

Index pages are fetched through an on-disk cache so repeated runs (and the
per-file workers) never refetch them; the cache key is the percent-encoded
index URL.
*/
use crate::collector::mrt_file::url_to_fname;
use crate::error::CollectorError;
use chrono::{DateTime, Timelike, Utc};
use log::warn;
use regex::Regex;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    RouteViews,
    RipeRis,
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::RouteViews => write!(f, "route_views"),
            Source::RipeRis => write!(f, "ripe_ris"),
        }
    }
}

impl Source {
    pub const ALL: [Source; 2] = [Source::RouteViews, Source::RipeRis];

    pub fn index_url(&self) -> &'static str {
        match self {
            Source::RouteViews => "http://archive.routeviews.org",
            Source::RipeRis => {
                "https://www.ripe.net/analyse/internet-measurements/routing-information-service-ris/ris-raw-data"
            }
        }
    }

    /// Number of collectors the index page is expected to list; a mismatch
    /// is only a warning.
    fn expected_collectors(&self) -> usize {
        match self {
            Source::RouteViews => 40,
            Source::RipeRis => 26,
        }
    }

    fn check_cadence(&self, dl_time: DateTime<Utc>) -> Result<(), CollectorError> {
        let (modulus, name) = match self {
            Source::RouteViews => (2, "Route Views publishes RIBs every two hours"),
            Source::RipeRis => (8, "RIPE RIS publishes RIBs every eight hours"),
        };
        if dl_time.hour() % modulus != 0 || dl_time.minute() != 0 || dl_time.second() != 0 {
            return Err(CollectorError::CadenceError(format!(
                "{name}, got {dl_time}"
            )));
        }
        Ok(())
    }

    /// Collector page links extracted from the index hrefs.
    fn collector_links(&self, hrefs: &[String]) -> Vec<String> {
        let mut links: Vec<String> = match self {
            Source::RouteViews => hrefs
                .iter()
                .filter(|href| href.contains("/bgpdata"))
                .map(|href| format!("{}{}", self.index_url(), href.trim_end_matches('/')))
                .collect(),
            Source::RipeRis => hrefs
                .iter()
                .filter(|href| href.starts_with("http://data.ris.ripe.net/rrc"))
                .map(|href| href.trim_end_matches('/').to_string())
                .collect(),
        };
        links.sort();
        links.dedup();
        links
    }

    /// Dump URL for one collector at the snapshot time.
    fn dump_url(&self, collector_link: &str, dl_time: DateTime<Utc>) -> String {
        let template = match self {
            Source::RouteViews => format!("{collector_link}/%Y.%m/RIBS/rib.%Y%m%d.%H00.bz2"),
            Source::RipeRis => format!("{collector_link}/%Y.%m/bview.%Y%m%d.%H00.gz"),
        };
        dl_time.format(&template).to_string()
    }

    /// Enumerates the MRT dump URLs for this source at `dl_time`. The result
    /// is deterministic for a given (source, timestamp) and index content.
    pub fn enumerate_urls(
        &self,
        dl_time: DateTime<Utc>,
        cache_dir: &Path,
    ) -> Result<Vec<String>, CollectorError> {
        self.check_cadence(dl_time)?;
        let index = fetch_index_cached(self.index_url(), cache_dir)?;
        let links = self.collector_links(&extract_hrefs(&index));
        if links.len() != self.expected_collectors() {
            warn!(
                "expected {} collectors from {self}, got {}",
                self.expected_collectors(),
                links.len()
            );
        }
        Ok(links
            .iter()
            .map(|link| self.dump_url(link, dl_time))
            .collect())
    }
}

/// Fetches an index page, reading from `cache_dir` when the page was fetched
/// before and writing through on a miss.
fn fetch_index_cached(url: &str, cache_dir: &Path) -> Result<String, CollectorError> {
    let cache_path = cache_dir.join(url_to_fname(url, Some("html")));
    if cache_path.exists() {
        return Ok(fs::read_to_string(&cache_path)?);
    }
    let mut body = String::new();
    let mut reader =
        oneio::get_reader(url).map_err(|e| CollectorError::SourceIndexError {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    reader
        .read_to_string(&mut body)
        .map_err(|e| CollectorError::SourceIndexError {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    fs::write(&cache_path, &body)?;
    Ok(body)
}

/// Pulls every `href="…"` attribute out of an index page.
fn extract_hrefs(html: &str) -> Vec<String> {
    // unwrap is fine: the pattern is a compile-time constant
    let re = Regex::new(r#"href="([^"]+)""#).unwrap();
    re.captures_iter(html)
        .map(|caps| caps[1].to_string())
        .collect()
}
