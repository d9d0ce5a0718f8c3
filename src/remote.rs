use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use curl::easy::Easy;
use tempfile::NamedTempFile;
use url::Url;

/// Download `url` to `destination`. The body is streamed into a temporary
/// file next to `destination` and renamed into place once complete, so an
/// interrupted download never leaves a truncated file at `destination`.
pub fn download_to_path(url: &Url, destination: &Path) -> Result<()> {
    tracing::info!(source = %url, "downloading remote resource");

    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create temporary file in {}", parent.display()))?;

    let mut easy = Easy::new();
    easy.url(url.as_str())?;
    easy.follow_location(true)?;
    easy.accept_encoding("identity")?;
    easy.fail_on_error(true)?;

    let mut write_error: Option<io::Error> = None;
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            if let Err(err) = file.write_all(data) {
                write_error = Some(err);
                return Ok(0);
            }
            Ok(data.len())
        })?;
        transfer
            .perform()
            .with_context(|| format!("failed to download {url}"))?;
    }

    if let Some(err) = write_error {
        return Err(anyhow!(
            "failed to write downloaded data to {}: {err}",
            destination.display()
        ));
    }

    file.flush()?;
    file.persist(destination)
        .map_err(|e| e.error)
        .with_context(|| format!("failed to move download to {}", destination.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_host_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("hg19ToHg38.over.chain.gz");
        let url = Url::parse("http://127.0.0.1:9/hg19ToHg38.over.chain.gz").unwrap();
        assert!(download_to_path(&url, &destination).is_err());
        assert!(!destination.exists());
    }
}
