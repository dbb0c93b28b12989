//! Pure chunking, grouping, and aggregation helpers
//!
//! Data-reshaping functions fed to the engine: cut an email set into chunks,
//! group it by sender/date/thread, and build bounded context strings for the
//! per-chunk model call. Everything here is pure; grouping uses `BTreeMap` so
//! iteration order is deterministic.

use crate::email::EmailRecord;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{BTreeMap, HashSet};

/// Grouping period for [`group_by_date`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Day,
    Week,
    Month,
}

/// Split emails into fixed-size chunks. A chunk size of 0 is treated as 1.
pub fn chunk_by_size(emails: &[EmailRecord], chunk_size: usize) -> Vec<Vec<EmailRecord>> {
    let size = chunk_size.max(1);
    emails.chunks(size).map(|c| c.to_vec()).collect()
}

/// Group emails by sender address.
pub fn group_by_sender(emails: &[EmailRecord]) -> BTreeMap<String, Vec<EmailRecord>> {
    let mut groups: BTreeMap<String, Vec<EmailRecord>> = BTreeMap::new();
    for email in emails {
        groups
            .entry(email.sender_address())
            .or_default()
            .push(email.clone());
    }
    groups
}

/// Group emails by the sender's domain.
pub fn group_by_sender_domain(emails: &[EmailRecord]) -> BTreeMap<String, Vec<EmailRecord>> {
    let mut groups: BTreeMap<String, Vec<EmailRecord>> = BTreeMap::new();
    for email in emails {
        groups
            .entry(email.sender_domain())
            .or_default()
            .push(email.clone());
    }
    groups
}

/// Group emails by date period. Unparsable or missing dates land under
/// `"unknown_date"`.
pub fn group_by_date(emails: &[EmailRecord], period: Period) -> BTreeMap<String, Vec<EmailRecord>> {
    let mut groups: BTreeMap<String, Vec<EmailRecord>> = BTreeMap::new();
    for email in emails {
        let key = email
            .date
            .as_deref()
            .and_then(|d| date_key(d, period))
            .unwrap_or_else(|| "unknown_date".to_string());
        groups.entry(key).or_default().push(email.clone());
    }
    groups
}

/// Group emails by thread id, falling back to the message id.
pub fn group_by_thread(emails: &[EmailRecord]) -> BTreeMap<String, Vec<EmailRecord>> {
    let mut groups: BTreeMap<String, Vec<EmailRecord>> = BTreeMap::new();
    for email in emails {
        let key = email
            .thread_id
            .clone()
            .or_else(|| email.id.clone())
            .unwrap_or_else(|| "unknown".to_string());
        groups.entry(key).or_default().push(email.clone());
    }
    groups
}

/// Drop duplicate emails by message id, keeping the first occurrence.
/// Records without an id are always kept.
pub fn dedup_by_id(emails: &[EmailRecord]) -> Vec<EmailRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for email in emails {
        match &email.id {
            Some(id) => {
                if seen.insert(id.clone()) {
                    out.push(email.clone());
                }
            }
            None => out.push(email.clone()),
        }
    }
    out
}

/// Top `n` senders by email count, descending. Ties break alphabetically.
pub fn top_senders(emails: &[EmailRecord], n: usize) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = group_by_sender(emails)
        .into_iter()
        .map(|(sender, msgs)| (sender, msgs.len()))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts.truncate(n);
    counts
}

/// Concise single-email summary for model context.
pub fn email_summary(email: &EmailRecord) -> String {
    let mut parts = Vec::new();
    if let Some(from) = &email.from {
        parts.push(format!("From: {from}"));
    }
    if let Some(subject) = &email.subject {
        parts.push(format!("Subject: {subject}"));
    }
    if let Some(date) = &email.date {
        parts.push(format!("Date: {date}"));
    }
    if let Some(snippet) = &email.snippet {
        parts.push(format!("Preview: {snippet}"));
    }
    parts.join("\n")
}

/// Combined, numbered summaries of multiple emails under a character budget.
///
/// Emails that would blow the budget are elided with a
/// `"... and N more emails"` tail so the model knows the context is partial.
pub fn batch_summaries(emails: &[EmailRecord], max_chars: usize) -> String {
    let mut summaries = Vec::new();
    let mut total_chars = 0;

    for (i, email) in emails.iter().enumerate() {
        let summary = format!("[{}] {}", i + 1, email_summary(email));
        let summary_len = summary.len() + 2;

        if total_chars + summary_len > max_chars {
            summaries.push(format!("... and {} more emails", emails.len() - i));
            break;
        }

        summaries.push(summary);
        total_chars += summary_len;
    }

    summaries.join("\n\n")
}

/// Join sub-query results, trimming whitespace and dropping empty entries.
pub fn aggregate_results(results: &[String], separator: &str) -> String {
    results
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

// Date ladder: RFC 2822 first (what mail APIs return), then the common
// bare formats seen in exported mailboxes.
fn date_key(date_str: &str, period: Period) -> Option<String> {
    let trimmed = date_str.trim();

    let naive: NaiveDateTime = DateTime::parse_from_rfc2822(trimmed)
        .or_else(|_| DateTime::parse_from_str(trimmed, "%d %b %Y %H:%M:%S %z"))
        .map(|dt| dt.naive_local())
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map(|d| d.and_time(NaiveTime::MIN))
        })
        .ok()?;

    let key = match period {
        Period::Day => naive.format("%Y-%m-%d"),
        Period::Week => naive.format("%Y-W%W"),
        Period::Month => naive.format("%Y-%m"),
    };
    Some(key.to_string())
}
