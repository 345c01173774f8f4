//! Heuristic signal types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a signal's score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Lexical pattern match on the message text.
    #[default]
    Pattern,
    /// Passive behavioral cue (typing bursts, fast follow-ups, edits).
    Behavior,
    /// Externally supplied classifier flag.
    Nlp,
}

/// Per-signal evaluation result for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicSignalDetail {
    pub signal: String,
    pub current_score: f64,
    pub decayed_score: f64,
    /// `max(current_score, decayed_score)`.
    pub effective_score: f64,
    pub last_seen_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub source: SignalSource,
    pub cooldown_active: bool,
    pub turns_since_fired: Option<u64>,
    pub passes_default: bool,
    pub suppressed_by_cooldown: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&SignalSource::Nlp).unwrap(), "\"nlp\"");
        assert_eq!(SignalSource::default(), SignalSource::Pattern);
    }
}
