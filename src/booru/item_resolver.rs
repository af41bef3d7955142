use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Deserializer};
use tracing::debug;

/// Post id as the index returns it, either a JSON number or a numeric string.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawPostId {
    Number(u64),
    Text(String),
    Other(serde_json::Value),
}

impl RawPostId {
    fn as_identifier(&self) -> Option<String> {
        match self {
            RawPostId::Number(0) => None,
            RawPostId::Number(n) => Some(n.to_string()),
            RawPostId::Text(s) => {
                let s = s.trim();
                match s.parse::<u64>() {
                    Ok(0) | Err(_) => None,
                    Ok(_) => Some(s.to_string()),
                }
            }
            RawPostId::Other(_) => None,
        }
    }
}

/// One raw entry of an index page. Every field is optional; records that
/// lack what a download needs are dropped by [`resolve`]. A field of the
/// wrong JSON type reads as absent without affecting its neighbours.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ItemRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub file_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub md5: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub hash: Option<String>,
    #[serde(default)]
    pub id: Option<RawPostId>,
}

impl ItemRecord {
    /// Decode one list element, falling back to an empty record for
    /// elements that are not objects of the expected shape.
    pub fn from_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    /// Content hash first, numeric post id second.
    fn identifier(&self) -> Option<String> {
        non_empty(&self.md5)
            .or_else(|| non_empty(&self.hash))
            .or_else(|| self.id.as_ref().and_then(RawPostId::as_identifier))
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(Some(s)),
        _ => Ok(None),
    }
}

/// A record that has everything needed to be downloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    pub source_url: String,
    pub identifier: String,
    pub destination_path: PathBuf,
}

/// Turn a record into a download target inside `run_folder`, or `None` when
/// the record has no file URL or no usable identifier.
pub fn resolve(record: &ItemRecord, run_folder: &Path) -> Option<ResolvedItem> {
    let Some(source_url) = non_empty(&record.file_url) else {
        debug!(id = ?record.id, "Dropping record without a file URL");
        return None;
    };

    let Some(identifier) = record.identifier() else {
        debug!(%source_url, "Dropping record without a hash or post id");
        return None;
    };

    if !is_single_file_name(&identifier) {
        debug!(%source_url, %identifier, "Dropping record whose identifier is not a plain file name");
        return None;
    }

    let destination_path = run_folder.join(format!("{}.{}", identifier, extension_of(&source_url)));

    Some(ResolvedItem {
        source_url,
        identifier,
        destination_path,
    })
}

/// The identifier becomes a file name directly under the run folder, so it
/// must be exactly one normal path component.
fn is_single_file_name(identifier: &str) -> bool {
    if identifier.contains(['/', '\\']) || identifier.contains("..") {
        return false;
    }
    let mut components = Path::new(identifier).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Everything after the last `.` of the URL, unvalidated.
fn extension_of(url: &str) -> &str {
    url.rsplit('.').next().unwrap_or(url)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
