//! Block aggregation: per-file shards become one file per block.
//!
//! Shards are concatenated in lexicographic path order; that order carries no
//! meaning and consumers must not rely on it, but it keeps reruns
//! byte-stable. Exactly one header row survives per block file.

use crate::collector::mrt_file::MrtFile;
use crate::error::CollectorError;
use crate::models::record::enriched_header;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Concatenates every file's shard for `block_id` into `<out_dir>/<block_id>.tsv`
/// and deletes the inputs on success.
pub fn aggregate_block(
    mrt_files: &[MrtFile],
    max_block_size: u64,
    block_id: u64,
    out_dir: &Path,
) -> Result<PathBuf, CollectorError> {
    let mut shard_paths: Vec<PathBuf> = mrt_files
        .iter()
        .map(|f| f.shard_path(max_block_size, block_id))
        .filter(|p| p.exists())
        .collect();
    shard_paths.sort();

    let out_path = out_dir.join(format!("{block_id}.tsv"));
    let mut writer = BufWriter::new(File::create(&out_path)?);
    writeln!(writer, "{}", enriched_header())?;
    for shard in &shard_paths {
        let reader = BufReader::new(File::open(shard)?);
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if index == 0 && line == enriched_header() {
                continue;
            }
            writeln!(writer, "{line}")?;
        }
    }
    writer.flush()?;
    drop(writer);

    for shard in &shard_paths {
        fs::remove_file(shard)?;
    }
    Ok(out_path)
}

/// Concatenates the block files into one cross-block file, again keeping a
/// single header. Block inputs are left in place.
pub fn write_global_file(
    block_files: &[PathBuf],
    out_path: &Path,
) -> Result<(), CollectorError> {
    let mut writer = BufWriter::new(File::create(out_path)?);
    writeln!(writer, "{}", enriched_header())?;
    for block_file in block_files {
        let reader = BufReader::new(File::open(block_file)?);
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if index == 0 && line == enriched_header() {
                continue;
            }
            writeln!(writer, "{line}")?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Source;

    #[test]
    fn test_aggregate_keeps_one_header_and_deletes_shards() {
        let dir = tempfile::tempdir().unwrap();
        let make = |name: &str, row: &str| {
            let file = MrtFile::new(
                format!("http://example.com/{name}.gz"),
                Source::RipeRis,
                dir.path(),
                dir.path(),
                dir.path(),
                dir.path(),
            );
            fs::create_dir_all(file.shard_dir(10)).unwrap();
            fs::write(
                file.shard_path(10, 0),
                format!("{}\n{row}\n", enriched_header()),
            )
            .unwrap();
            file
        };
        let a = make("a", "row-from-a");
        let b = make("b", "row-from-b");

        let out_dir = dir.path().join("10");
        fs::create_dir_all(&out_dir).unwrap();
        let out = aggregate_block(&[b.clone(), a.clone()], 10, 0, &out_dir).unwrap();

        let content = fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], enriched_header());
        // lexicographic shard order, not argument order
        assert_eq!(lines[1], "row-from-a");
        assert_eq!(lines[2], "row-from-b");

        assert!(!a.shard_path(10, 0).exists());
        assert!(!b.shard_path(10, 0).exists());
    }

    #[test]
    fn test_block_with_no_shards_gets_header_only_file() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("10");
        fs::create_dir_all(&out_dir).unwrap();
        let out = aggregate_block(&[], 10, 3, &out_dir).unwrap();
        assert_eq!(
            fs::read_to_string(out).unwrap().trim_end(),
            enriched_header()
        );
    }
}
