//! Email dataset records consumed by the chunking helpers and the engine

use crate::fingerprint::DatasetItem;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ADDR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^>]+)>").unwrap());

/// A single email as returned by the mail API collaborator.
///
/// Only `id` matters to the core engine (dataset fingerprinting); the rest
/// of the fields feed the chunking and context-building helpers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "threadId")]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
}

impl EmailRecord {
    /// Sender address, lowered, extracted from `Name <addr@host>` forms.
    /// Falls back to the whole `from` field when no angle brackets exist.
    pub fn sender_address(&self) -> String {
        let from = self.from.as_deref().unwrap_or("(Unknown)");
        match ADDR_RE.captures(from) {
            Some(caps) => caps[1].to_lowercase(),
            None => from.trim().to_lowercase(),
        }
    }

    /// Domain portion of the sender address, or `"unknown"`.
    pub fn sender_domain(&self) -> String {
        let addr = self.sender_address();
        match addr.split_once('@') {
            Some((_, domain)) => domain.to_string(),
            None => "unknown".to_string(),
        }
    }
}

impl DatasetItem for EmailRecord {
    fn identifier(&self) -> Option<&str> {
        self.id.as_deref()
    }
}
