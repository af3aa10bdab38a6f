//! Raw MRT downloader with bounded retry.
//!
//! Transport-level failures (5xx, connect errors, incomplete reads) retry
//! with linear backoff; a 404 is terminal. Either way a file that cannot be
//! fetched ends up holding the error sentinel instead of failing the run, so
//! the pipeline records the attempt and moves on.

use crate::collector::mrt_file::{MrtFile, DOWNLOAD_ERROR_SENTINEL};
use crate::error::CollectorError;
use log::{info, warn};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::fs::{self, File};
use std::time::Duration;

const DOWNLOAD_RETRIES: u64 = 3;
const BACKOFF_STEP: Duration = Duration::from_secs(10);
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub fn build_client() -> Result<Client, CollectorError> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Downloads one raw dump. Skipped when a previous attempt (successful or
/// sentineled) already produced the raw file; the retry budget therefore
/// resets on every fresh invocation, not across them.
pub fn download_raw(client: &Client, mrt_file: &MrtFile) -> Result<(), CollectorError> {
    if mrt_file.downloaded() {
        return Ok(());
    }

    for attempt in 1..=DOWNLOAD_RETRIES {
        match try_download(client, mrt_file) {
            Ok(()) => return Ok(()),
            Err(DownloadFailure::NotFound) => {
                warn!("{} returned 404, writing error sentinel", mrt_file.url);
                return write_error_sentinel(mrt_file);
            }
            Err(DownloadFailure::Transport(reason)) => {
                warn!(
                    "downloading {} failed ({reason}) {attempt}/{DOWNLOAD_RETRIES}",
                    mrt_file.url
                );
                if attempt < DOWNLOAD_RETRIES {
                    std::thread::sleep(BACKOFF_STEP * attempt as u32);
                }
            }
        }
    }

    warn!(
        "{} failed {DOWNLOAD_RETRIES} times, writing error sentinel",
        mrt_file.url
    );
    write_error_sentinel(mrt_file)
}

enum DownloadFailure {
    NotFound,
    Transport(String),
}

fn try_download(client: &Client, mrt_file: &MrtFile) -> Result<(), DownloadFailure> {
    let mut response = client
        .get(&mrt_file.url)
        .send()
        .map_err(|e| DownloadFailure::Transport(e.to_string()))?;
    match response.status() {
        StatusCode::NOT_FOUND => return Err(DownloadFailure::NotFound),
        status if !status.is_success() => {
            return Err(DownloadFailure::Transport(format!("status {status}")))
        }
        _ => {}
    }

    // stream into a scratch path first so an incomplete read never leaves a
    // half-written raw file to be mistaken for a finished download
    let part_path = mrt_file.raw_path.with_extension("part");
    let result = File::create(&part_path)
        .map_err(|e| DownloadFailure::Transport(e.to_string()))
        .and_then(|mut out| {
            response
                .copy_to(&mut out)
                .map_err(|e| DownloadFailure::Transport(e.to_string()))
        });
    match result {
        Ok(bytes) => {
            fs::rename(&part_path, &mrt_file.raw_path)
                .map_err(|e| DownloadFailure::Transport(e.to_string()))?;
            info!("downloaded {} ({bytes} bytes)", mrt_file.url);
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&part_path);
            Err(e)
        }
    }
}

fn write_error_sentinel(mrt_file: &MrtFile) -> Result<(), CollectorError> {
    fs::write(&mrt_file.raw_path, DOWNLOAD_ERROR_SENTINEL)?;
    Ok(())
}
