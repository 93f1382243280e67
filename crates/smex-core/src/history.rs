use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::warn;
use serde::Deserialize;
use url::Url;

/// Query parameters of a Saved Media download link that carry media identifiers.
const LINK_ID_PARAMS: &[&str] = &["sid", "mid", "uid", "sig"];

/// One normalized entry of the record index: when the memory was created,
/// the opaque tokens expected to appear inside its exported file name, and
/// where the record came from (for manual-review annotations).
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub date: DateTime<Utc>,
    /// May be empty; a record without identifiers never matches any file.
    pub identifiers: Vec<String>,
    pub provenance: String,
}

/// `memories_history.json`: `{"Saved Media": [{"Date": ..., "Download Link": ...}]}`
#[derive(Debug, Deserialize)]
struct MemoriesHistory {
    #[serde(rename = "Saved Media", default)]
    saved_media: Vec<SavedMediaEntry>,
}

#[derive(Debug, Deserialize)]
struct SavedMediaEntry {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Download Link")]
    download_link: Option<String>,
}

/// `chat_history.json`: conversation name -> list of messages.
/// BTreeMap keeps traversal order deterministic across runs.
type ChatHistory = BTreeMap<String, Vec<ChatMessage>>;

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(rename = "Media Type")]
    media_type: Option<String>,
    #[serde(rename = "Created")]
    created: Option<String>,
    #[serde(rename = "Media IDs")]
    media_ids: Option<MediaIds>,
}

/// Snapchat writes the media-id field as either one token or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MediaIds {
    One(String),
    Many(Vec<String>),
}

impl MediaIds {
    /// Normalize to a plain list so downstream code never sees the
    /// string-vs-list distinction.
    fn to_vec(&self) -> Vec<String> {
        match self {
            MediaIds::One(id) => vec![id.clone()],
            MediaIds::Many(ids) => ids.clone(),
        }
    }
}

/// Parse a history timestamp: `YYYY-MM-DD HH:MM:SS` with an optional
/// trailing ` UTC` literal, always interpreted as UTC.
pub fn parse_history_date(text: &str) -> anyhow::Result<DateTime<Utc>> {
    let trimmed = text.trim();
    let bare = trimmed.strip_suffix(" UTC").unwrap_or(trimmed);
    let naive = NaiveDateTime::parse_from_str(bare, "%Y-%m-%d %H:%M:%S")
        .with_context(|| format!("unparseable history date: {trimmed:?}"))?;
    Ok(naive.and_utc())
}

/// Build the record index from both history documents. An unloadable or
/// unparseable document is fatal; there is no partial-index fallback.
/// Records whose date text does not parse are dropped with a warning instead
/// of aborting the batch.
pub fn build_index(memories_path: &Path, chat_path: Option<&Path>) -> anyhow::Result<Vec<HistoryRecord>> {
    let mut records = Vec::new();

    let memories: MemoriesHistory = load_json(memories_path)?;
    append_memories_records(&memories, &mut records);

    if let Some(chat_path) = chat_path {
        let chat: ChatHistory = load_json(chat_path)?;
        append_chat_records(&chat, &mut records);
    }

    Ok(records)
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).with_context(|| format!("parsing {}", path.display()))
}

fn append_memories_records(memories: &MemoriesHistory, records: &mut Vec<HistoryRecord>) {
    for (i, entry) in memories.saved_media.iter().enumerate() {
        let provenance = format!("Saved Media entry #{}", i + 1);
        let date = match parse_history_date(&entry.date) {
            Ok(date) => date,
            Err(e) => {
                warn!("dropping {provenance}: {e:#}");
                continue;
            }
        };
        let identifiers = entry
            .download_link
            .as_deref()
            .map(link_identifiers)
            .unwrap_or_default();
        records.push(HistoryRecord {
            date,
            identifiers,
            provenance,
        });
    }
}

fn append_chat_records(chat: &ChatHistory, records: &mut Vec<HistoryRecord>) {
    for (conversation, messages) in chat {
        for (i, message) in messages.iter().enumerate() {
            if !matches!(message.media_type.as_deref(), Some("MEDIA")) {
                continue;
            }
            let Some(media_ids) = &message.media_ids else {
                continue;
            };
            let identifiers: Vec<String> = media_ids
                .to_vec()
                .into_iter()
                .filter(|id| !id.is_empty())
                .collect();
            if identifiers.is_empty() {
                continue;
            }
            let provenance = format!("chat with {conversation:?}, message #{}", i + 1);
            let Some(created) = &message.created else {
                warn!("dropping {provenance}: media message without a Created date");
                continue;
            };
            let date = match parse_history_date(created) {
                Ok(date) => date,
                Err(e) => {
                    warn!("dropping {provenance}: {e:#}");
                    continue;
                }
            };
            records.push(HistoryRecord {
                date,
                identifiers,
                provenance,
            });
        }
    }
}

/// Extract the (up to four) identifier query parameters of a download link.
/// Missing parameters stay absent, never a matchable empty string.
fn link_identifiers(link: &str) -> Vec<String> {
    let Ok(url) = Url::parse(link) else {
        return Vec::new();
    };
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    LINK_ID_PARAMS
        .iter()
        .filter_map(|param| {
            pairs
                .iter()
                .find(|(key, _)| key == param)
                .map(|(_, value)| value.clone())
        })
        .filter(|value| !value.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_history_date() {
        let date = parse_history_date("2021-05-01 10:00:00 UTC").unwrap();
        assert_eq!(date.to_rfc3339(), "2021-05-01T10:00:00+00:00");

        // The timezone literal is optional.
        assert!(parse_history_date("2021-05-01 10:00:00").is_ok());
        assert!(parse_history_date("May 1st 2021").is_err());
    }

    #[test]
    fn test_link_identifiers() {
        let ids = link_identifiers(
            "https://app.snapchat.com/dmd/memories?uid=u-1&sid=s-1&mid=m-1&sig=deadbeef",
        );
        assert_eq!(ids, vec!["s-1", "m-1", "u-1", "deadbeef"]);

        // Missing parameters are simply absent, never empty strings.
        let ids = link_identifiers("https://app.snapchat.com/dmd/memories?mid=m-2");
        assert_eq!(ids, vec!["m-2"]);

        assert!(link_identifiers("not a url").is_empty());
    }

    #[test]
    fn test_memories_records() {
        let doc: MemoriesHistory = serde_json::from_str(
            r#"{"Saved Media": [
                {"Date": "2021-05-01 10:00:00 UTC",
                 "Download Link": "https://example.com/dl?sid=abc&mid=def"},
                {"Date": "not a date",
                 "Download Link": "https://example.com/dl?sid=xyz"},
                {"Date": "2021-06-01 12:00:00 UTC", "Download Link": null}
            ]}"#,
        )
        .unwrap();

        let mut records = Vec::new();
        append_memories_records(&doc, &mut records);

        // The malformed date is dropped, the link-less entry is kept.
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifiers, vec!["abc", "def"]);
        assert_eq!(records[0].provenance, "Saved Media entry #1");
        assert!(records[1].identifiers.is_empty());
    }

    #[test]
    fn test_chat_records_normalize_media_ids() {
        let doc: ChatHistory = serde_json::from_str(
            r#"{
                "alice": [
                    {"Media Type": "TEXT", "Created": "2021-05-01 09:00:00 UTC"},
                    {"Media Type": "MEDIA", "Created": "2021-05-01 10:00:00 UTC",
                     "Media IDs": "single-id"},
                    {"Media Type": "MEDIA", "Created": "2021-05-02 11:00:00 UTC",
                     "Media IDs": ["id-a", "id-b"]},
                    {"Media Type": "MEDIA", "Created": "2021-05-03 12:00:00 UTC",
                     "Media IDs": ""}
                ]
            }"#,
        )
        .unwrap();

        let mut records = Vec::new();
        append_chat_records(&doc, &mut records);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifiers, vec!["single-id"]);
        assert_eq!(records[1].identifiers, vec!["id-a", "id-b"]);
        assert!(records[0].provenance.contains("alice"));
    }
}
