//! Prefix harvesting.
//!
//! RIB dumps group identical prefixes on adjacent lines, so the per-file pass
//! only needs to drop adjacent repeats; the global merge applies a hash-based
//! unique filter that preserves first-occurrence order.

use crate::collector::mrt_file::MrtFile;
use crate::error::CollectorError;
use crate::models::record::PREFIX_COLUMN;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Extracts this file's prefix column with an adjacent-uniq pass. Skipped
/// when the output already exists.
pub fn store_unique_prefixes(mrt_file: &MrtFile) -> Result<(), CollectorError> {
    if mrt_file.prefixes_path.exists() {
        return Ok(());
    }
    let reader = BufReader::new(File::open(&mrt_file.decoded_path)?);
    let mut writer = BufWriter::new(File::create(&mrt_file.prefixes_path)?);
    let mut last: Option<String> = None;
    for line in reader.lines() {
        let line = line?;
        let prefix = match line.split('|').nth(PREFIX_COLUMN) {
            Some(prefix) if !prefix.is_empty() && prefix != "prefix" => prefix,
            _ => continue,
        };
        if last.as_deref() == Some(prefix) {
            continue;
        }
        writeln!(writer, "{prefix}")?;
        last = Some(prefix.to_string());
    }
    writer.flush()?;
    Ok(())
}

/// Merges the per-file prefix lists into the global unique-prefix file,
/// keeping the first occurrence of each prefix. Inputs are read in
/// lexicographic path order so the resulting numbering is stable across
/// runs.
pub fn merge_unique_prefixes(
    mrt_files: &[MrtFile],
    out_path: &Path,
) -> Result<u64, CollectorError> {
    let mut inputs: Vec<&Path> = mrt_files
        .iter()
        .map(|f| f.prefixes_path.as_path())
        .filter(|p| p.exists())
        .collect();
    inputs.sort();

    let mut writer = BufWriter::new(File::create(out_path)?);
    let mut seen: HashSet<String> = HashSet::new();
    let mut written = 0u64;
    for input in inputs {
        let reader = BufReader::new(File::open(input)?);
        for line in reader.lines() {
            let line = line?;
            let prefix = line.trim();
            if prefix.is_empty() || seen.contains(prefix) {
                continue;
            }
            writeln!(writer, "{prefix}")?;
            seen.insert(prefix.to_string());
            written += 1;
        }
    }
    writer.flush()?;
    Ok(written)
}
