//! Search results returned by the search facade.

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Channel name used when the platform does not report one.
pub const UNKNOWN_CHANNEL: &str = "Unknown Channel";

/// One entry of a remote search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub thumbnail: String,
    /// Duration in seconds (0 when unknown)
    pub duration: f64,
    pub views: u64,
    pub description: String,
    /// Formatted like `Mar 07, 2021`, or empty
    #[serde(rename = "uploadDate")]
    pub upload_date: String,
}

impl SearchResult {
    /// Build from one entry of a yt-dlp flat-playlist JSON dump.
    ///
    /// Entries without an `id` are skipped.
    pub fn from_entry(entry: &Value) -> Option<Self> {
        let id = entry.get("id")?.as_str()?.to_string();
        let text = |key: &str| {
            entry
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        Some(Self {
            title: text("title").unwrap_or_default(),
            channel: text("channel")
                .or_else(|| text("uploader"))
                .unwrap_or_else(|| UNKNOWN_CHANNEL.to_string()),
            thumbnail: text("thumbnail")
                .or_else(|| first_thumbnail(entry))
                .unwrap_or_default(),
            duration: entry.get("duration").and_then(Value::as_f64).unwrap_or(0.0),
            views: entry.get("view_count").and_then(Value::as_u64).unwrap_or(0),
            description: text("description").unwrap_or_default(),
            upload_date: text("upload_date")
                .map(|d| format_upload_date(&d))
                .unwrap_or_default(),
            id,
        })
    }
}

fn first_thumbnail(entry: &Value) -> Option<String> {
    entry
        .get("thumbnails")?
        .as_array()?
        .last()?
        .get("url")?
        .as_str()
        .map(str::to_string)
}

/// Reformat a `YYYYMMDD` date as `%b %d, %Y`; anything else becomes empty.
pub fn format_upload_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw, "%Y%m%d")
        .map(|d| d.format("%b %d, %Y").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_full_entry() {
        let entry = json!({
            "id": "abc123",
            "title": "Talk",
            "channel": "Conf",
            "thumbnail": "https://i.ytimg.com/x.jpg",
            "duration": 61.0,
            "view_count": 1200,
            "description": "desc",
            "upload_date": "20210307"
        });
        let result = SearchResult::from_entry(&entry).unwrap();
        assert_eq!(result.channel, "Conf");
        assert_eq!(result.views, 1200);
        assert_eq!(result.upload_date, "Mar 07, 2021");

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["uploadDate"], "Mar 07, 2021");
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let result = SearchResult::from_entry(&json!({"id": "x", "upload_date": "garbage"})).unwrap();
        assert_eq!(result.channel, UNKNOWN_CHANNEL);
        assert_eq!(result.duration, 0.0);
        assert_eq!(result.upload_date, "");
        assert!(SearchResult::from_entry(&json!({"title": "no id"})).is_none());
    }
}
