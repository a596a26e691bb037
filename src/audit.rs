//! Tamper-evident edit history for patient records.
//!
//! Every entry is hashed together with the hash of the entry before it, so a
//! patient's history forms a chain that can be re-verified at any time.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditAction {
    Created,
    Updated,
    OutcomeChanged,
    NoteAdded,
    Readmitted,
}

impl EditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditAction::Created => "created",
            EditAction::Updated => "updated",
            EditAction::OutcomeChanged => "outcomeChanged",
            EditAction::NoteAdded => "noteAdded",
            EditAction::Readmitted => "readmitted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditEntry {
    pub at: DateTime<Utc>,
    pub by: String,
    pub action: EditAction,
    pub summary: String,
    pub hash: String,
    pub previous_hash: Option<String>,
}

/// First entry whose stored hash does not match its recomputed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBreak {
    pub index: usize,
    pub reason: &'static str,
}

fn entry_hash(
    at: &DateTime<Utc>,
    by: &str,
    action: EditAction,
    summary: &str,
    previous_hash: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!(
        "{}|{}|{}|{}|",
        at.to_rfc3339_opts(SecondsFormat::Micros, true),
        by,
        action.as_str(),
        summary
    ));
    if let Some(prev) = previous_hash {
        hasher.update(prev);
    }
    format!("{:x}", hasher.finalize())
}

/// Appends an entry to `history`, linking it to the current tail.
pub fn record<'a>(
    history: &'a mut Vec<EditEntry>,
    by: &str,
    action: EditAction,
    summary: impl Into<String>,
    at: DateTime<Utc>,
) -> &'a EditEntry {
    let summary = summary.into();
    let previous_hash = history.last().map(|e| e.hash.clone());
    let hash = entry_hash(&at, by, action, &summary, previous_hash.as_deref());

    debug!(action = action.as_str(), %hash, "edit history entry recorded");

    history.push(EditEntry {
        at,
        by: by.to_string(),
        action,
        summary,
        hash,
        previous_hash,
    });
    &history[history.len() - 1]
}

/// Re-computes every hash in order and checks the back-links.
pub fn verify(history: &[EditEntry]) -> Result<(), ChainBreak> {
    let mut previous: Option<&str> = None;

    for (index, entry) in history.iter().enumerate() {
        if entry.previous_hash.as_deref() != previous {
            return Err(ChainBreak {
                index,
                reason: "previous hash does not link to the preceding entry",
            });
        }

        let expected = entry_hash(
            &entry.at,
            &entry.by,
            entry.action,
            &entry.summary,
            entry.previous_hash.as_deref(),
        );
        if expected != entry.hash {
            return Err(ChainBreak {
                index,
                reason: "entry contents do not match its hash",
            });
        }

        previous = Some(&entry.hash);
    }

    Ok(())
}
