//! Adapter around the external MRT decoder.
//!
//! The decoder is any program that takes a raw MRT path and writes one
//! pipe-separated record per line to stdout (`bgpkit-parser --psv` by
//! default). The adapter redirects stdout straight to the decoded path.

use crate::collector::mrt_file::MrtFile;
use crate::error::CollectorError;
use std::fs::{self, File};
use std::process::{Command, Stdio};

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub program: String,
    /// Arguments appended after the raw-file path.
    pub args: Vec<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        DecoderConfig {
            program: "bgpkit-parser".to_string(),
            args: vec!["--psv".to_string()],
        }
    }
}

/// Decodes one raw file, skipping files whose decoded output already exists.
pub fn decode_file(config: &DecoderConfig, mrt_file: &MrtFile) -> Result<(), CollectorError> {
    if mrt_file.decoded_path.exists() {
        return Ok(());
    }

    let stdout = File::create(&mrt_file.decoded_path)?;
    let status = Command::new(&config.program)
        .arg(&mrt_file.raw_path)
        .args(&config.args)
        .stdout(Stdio::from(stdout))
        .status()
        .map_err(|e| CollectorError::DecoderError {
            url: mrt_file.url.clone(),
            reason: format!("failed to spawn {}: {e}", config.program),
        })?;

    if !status.success() {
        // leave no partial decode behind
        let _ = fs::remove_file(&mrt_file.decoded_path);
        return Err(CollectorError::DecoderError {
            url: mrt_file.url.clone(),
            reason: format!("{} exited with {status}", config.program),
        });
    }
    if !mrt_file.decoded_path.exists() {
        return Err(CollectorError::DecoderError {
            url: mrt_file.url.clone(),
            reason: "decoder exited successfully but produced no output".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Source;

    fn mrt_file(dir: &std::path::Path) -> MrtFile {
        MrtFile::new(
            "http://example.com/rib.bz2".to_string(),
            Source::RouteViews,
            dir,
            dir,
            dir,
            dir,
        )
    }

    #[test]
    fn test_decode_with_cat_decoder() {
        let dir = tempfile::tempdir().unwrap();
        let file = mrt_file(dir.path());
        fs::write(&file.raw_path, "a|b|c\n").unwrap();
        let config = DecoderConfig {
            program: "cat".to_string(),
            args: vec![],
        };
        decode_file(&config, &file).unwrap();
        assert_eq!(fs::read_to_string(&file.decoded_path).unwrap(), "a|b|c\n");
    }

    #[test]
    fn test_decoder_failure_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let file = mrt_file(dir.path());
        // raw file missing: cat exits non-zero
        let config = DecoderConfig {
            program: "cat".to_string(),
            args: vec![],
        };
        assert!(decode_file(&config, &file).is_err());
        assert!(!file.decoded_path.exists());
    }

    #[test]
    fn test_existing_decode_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = mrt_file(dir.path());
        fs::write(&file.decoded_path, "kept\n").unwrap();
        let config = DecoderConfig {
            program: "false".to_string(),
            args: vec![],
        };
        decode_file(&config, &file).unwrap();
        assert_eq!(fs::read_to_string(&file.decoded_path).unwrap(), "kept\n");
    }
}
