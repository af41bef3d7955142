use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, trace};

#[derive(Error, Debug)]
pub enum RunFolderError {
    #[error("Failed to create run folder '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Folder name for one run: the tag string with `:` turned into spaces,
/// followed by the run date.
pub fn run_folder_name(tags: &str, date: NaiveDate) -> String {
    let tags = tags.trim();
    let stem: String = if tags.is_empty() {
        "all".to_string()
    } else {
        tags.chars()
            .map(|c| match c {
                ':' => ' ',
                '/' | '\\' => '_',
                other => other,
            })
            .collect()
    };

    format!("{}_{}", stem, date.format("%Y-%m-%d"))
}

/// Create the run folder under `parent` and return its path. Reuses an
/// existing folder from an earlier run on the same day.
pub fn create_run_folder(parent: &Path, tags: &str, date: NaiveDate) -> Result<PathBuf, RunFolderError> {
    let path = parent.join(run_folder_name(tags, date));

    if path.is_dir() {
        trace!("Run folder already exists: {}", path.display());
        return Ok(path);
    }

    fs::create_dir_all(&path).map_err(|source| RunFolderError::Create {
        path: path.clone(),
        source,
    })?;
    info!("Created run folder {}", path.display());

    Ok(path)
}
