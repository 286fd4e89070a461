//! Summary statistics over logged interactions.

use std::collections::BTreeMap;

use serde::Serialize;

use super::traits::FinalizedInteraction;

/// Replies shorter than this many characters count as short.
pub const SHORT_REPLY_CHARS: usize = 50;

/// Replies of at least this many characters count as long.
pub const LONG_REPLY_CHARS: usize = 200;

/// Aggregate view of an interaction log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplyStats {
    pub total_replies: usize,
    pub unique_categories: usize,
    pub unique_intents: usize,
    pub most_common_category: Option<String>,
    pub most_common_intent: Option<String>,
    pub avg_reply_length: f64,
    pub min_reply_length: usize,
    pub max_reply_length: usize,
    /// Sample standard deviation of reply lengths; 0 with fewer than two replies.
    pub reply_length_std_dev: f64,
    pub short_replies: usize,
    pub medium_replies: usize,
    pub long_replies: usize,
    /// Runs where at least one stage fell back to its sentinel.
    pub degraded_runs: usize,
    pub category_counts: BTreeMap<String, usize>,
}

impl ReplyStats {
    pub fn from_records(records: &[FinalizedInteraction]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut intent_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut lengths = Vec::with_capacity(records.len());
        let (mut short, mut medium, mut long) = (0, 0, 0);

        for record in records {
            *category_counts.entry(record.category.clone()).or_default() += 1;
            *intent_counts.entry(record.intent.clone()).or_default() += 1;

            let length = record.reply.chars().count();
            lengths.push(length);
            if length < SHORT_REPLY_CHARS {
                short += 1;
            } else if length < LONG_REPLY_CHARS {
                medium += 1;
            } else {
                long += 1;
            }
        }

        let count = lengths.len() as f64;
        let mean = lengths.iter().sum::<usize>() as f64 / count;
        let std_dev = if lengths.len() < 2 {
            0.0
        } else {
            let squared: f64 = lengths
                .iter()
                .map(|&len| (len as f64 - mean).powi(2))
                .sum();
            (squared / (count - 1.0)).sqrt()
        };

        Self {
            total_replies: records.len(),
            unique_categories: category_counts.len(),
            unique_intents: intent_counts.len(),
            most_common_category: most_common(&category_counts),
            most_common_intent: most_common(&intent_counts),
            avg_reply_length: mean,
            min_reply_length: lengths.iter().copied().min().unwrap_or(0),
            max_reply_length: lengths.iter().copied().max().unwrap_or(0),
            reply_length_std_dev: std_dev,
            short_replies: short,
            medium_replies: medium,
            long_replies: long,
            degraded_runs: records.iter().filter(|r| r.is_degraded()).count(),
            category_counts,
        }
    }
}

/// Highest count wins; ties go to the alphabetically first key.
fn most_common(counts: &BTreeMap<String, usize>) -> Option<String> {
    counts
        .iter()
        .fold(None::<(&String, usize)>, |best, (key, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((key, count)),
        })
        .map(|(key, _)| key.clone())
}
