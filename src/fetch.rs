//! Download of the two source datasets.
//!
//! Fetches are blocking and sequential; the pipeline never streams. A failed
//! download is retried a bounded number of times and then fails the run with
//! a fetch error naming the URL.
use crate::{Context, PipelineError, Result};
use qu::ick_use::*;
use std::{fs, io, path::Path, time::Duration};

pub fn client(timeout_secs: u64) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("could not build the download client")
}

/// Download `url` into `dest`, creating parent directories as needed.
///
/// Returns the number of bytes written.
pub fn download(client: &reqwest::blocking::Client, url: &str, dest: &Path) -> Result<u64> {
    let mut response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|source| PipelineError::Fetch {
            url: url.to_string(),
            source,
        })?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("could not create \"{}\"", parent.display()))?;
    }
    let mut out = fs::File::create(dest)
        .with_context(|| format!("could not create \"{}\"", dest.display()))?;
    let written = io::copy(&mut response, &mut out)
        .with_context(|| format!("while writing \"{}\"", dest.display()))?;
    Ok(written)
}

/// Download with a bounded retry loop. Attempts are logged; only the last
/// error is surfaced.
pub fn download_with_retry(
    client: &reqwest::blocking::Client,
    url: &str,
    dest: &Path,
    retries: u32,
) -> Result<u64> {
    let attempts = retries.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        match download(client, url, dest) {
            Ok(written) => {
                event!(
                    Level::INFO,
                    "downloaded {} ({} bytes) to \"{}\"",
                    url,
                    written,
                    dest.display()
                );
                return Ok(written);
            }
            Err(err) => {
                event!(
                    Level::WARN,
                    "attempt {}/{} failed for {}: {:#}",
                    attempt,
                    attempts,
                    url,
                    err
                );
                last_err = Some(err);
            }
        }
    }
    Err(last_err.expect("at least one attempt ran"))
}
