//! Conversation log and agent turns.
//!
//! The conversation log is the append-only shared transcript of one task.
//! Every agent sees the visible entries of all prior turns. Parallel parts
//! work on seeded clones that are reassembled in part-index order at join.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Parsed hand-off decision from an agent's response tail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// The agent declared the task complete.
    Complete { reason: String },
    /// The agent handed off to another agent.
    Handoff { next: String, reason: String },
}

impl Decision {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    pub fn next_agent(&self) -> Option<&str> {
        match self {
            Self::Complete { .. } => None,
            Self::Handoff { next, .. } => Some(next),
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Complete { reason } | Self::Handoff { reason, .. } => reason,
        }
    }
}

/// Summary of one agent turn carried on its log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSummary {
    pub decision: Decision,
    pub cost_usd: f64,
    pub duration_ms: u64,
}

/// One entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub speaker: String,
    pub text: String,
    /// Entries marked not-visible are kept for audit but excluded from
    /// agent prompts.
    pub visible: bool,
    pub recorded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<TurnSummary>,
}

/// One complete agent invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTurn {
    pub speaker: String,
    pub prompt: String,
    pub response: String,
    pub decision: Decision,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Append-only transcript of a task. Never rewritten; append order is
/// time order within one log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationLog {
    entries: Vec<ConversationEntry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a free-form entry (system notes, test outcomes, warnings).
    pub fn append(&mut self, speaker: impl Into<String>, text: impl Into<String>, visible: bool) {
        self.entries.push(ConversationEntry {
            speaker: speaker.into(),
            text: text.into(),
            visible,
            recorded_at: Utc::now(),
            turn: None,
        });
    }

    /// Append a completed agent turn.
    pub fn append_turn(&mut self, turn: &AgentTurn) {
        self.entries.push(ConversationEntry {
            speaker: turn.speaker.clone(),
            text: turn.response.clone(),
            visible: true,
            recorded_at: turn.finished_at,
            turn: Some(TurnSummary {
                decision: turn.decision.clone(),
                cost_usd: turn.cost_usd,
                duration_ms: turn.duration_ms,
            }),
        });
    }

    /// Clone this log as the seed for a parallel part.
    pub fn seeded_clone(&self) -> Self {
        self.clone()
    }

    /// Append every entry of `part` that is not already present from the
    /// shared seed. Called at join time in part-index order; original
    /// timestamps are preserved for audit.
    pub fn absorb(&mut self, seed_len: usize, part: ConversationLog) {
        self.entries
            .extend(part.entries.into_iter().skip(seed_len));
    }

    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Turns only (entries that carry a turn summary).
    pub fn turns(&self) -> impl Iterator<Item = &ConversationEntry> {
        self.entries.iter().filter(|e| e.turn.is_some())
    }

    /// Render the visible history for inclusion in an agent's prompt,
    /// bounded to roughly `max_chars` of the most recent entries.
    pub fn render_for_agent(&self, agent_name: &str, max_chars: usize) -> String {
        let mut sections: Vec<String> = Vec::new();
        let mut used = 0usize;
        for entry in self.entries.iter().rev() {
            if !entry.visible {
                continue;
            }
            let section = format!("[{}]\n{}", entry.speaker, entry.text);
            used += section.len();
            sections.push(section);
            if used >= max_chars {
                break;
            }
        }
        if sections.is_empty() {
            return format!("(no prior turns; {agent_name} is first)");
        }
        sections.reverse();
        sections.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(speaker: &str, response: &str) -> AgentTurn {
        let now = Utc::now();
        AgentTurn {
            speaker: speaker.to_string(),
            prompt: "do it".to_string(),
            response: response.to_string(),
            decision: Decision::Complete {
                reason: "ok".to_string(),
            },
            cost_usd: 0.01,
            duration_ms: 100,
            started_at: now,
            finished_at: now,
        }
    }

    #[test]
    fn test_append_order_is_preserved() {
        let mut log = ConversationLog::new();
        log.append_turn(&turn("architect", "design"));
        log.append_turn(&turn("coder", "patch"));
        log.append("system", "tests passed", true);
        let speakers: Vec<_> = log.entries().iter().map(|e| e.speaker.as_str()).collect();
        assert_eq!(speakers, vec!["architect", "coder", "system"]);
    }

    #[test]
    fn test_render_filters_invisible_entries() {
        let mut log = ConversationLog::new();
        log.append("system", "internal bookkeeping", false);
        log.append_turn(&turn("coder", "made the change"));
        let rendered = log.render_for_agent("reviewer", 4096);
        assert!(rendered.contains("made the change"));
        assert!(!rendered.contains("internal bookkeeping"));
    }

    #[test]
    fn test_render_empty_log() {
        let log = ConversationLog::new();
        let rendered = log.render_for_agent("architect", 4096);
        assert!(rendered.contains("architect is first"));
    }

    #[test]
    fn test_render_bounds_history() {
        let mut log = ConversationLog::new();
        for i in 0..100 {
            log.append("coder", format!("turn {i} {}", "x".repeat(200)), true);
        }
        let rendered = log.render_for_agent("reviewer", 1000);
        // Most recent entries survive the bound; the oldest do not.
        assert!(rendered.contains("turn 99"));
        assert!(!rendered.contains("turn 0 "));
    }

    #[test]
    fn test_absorb_appends_only_new_entries() {
        let mut parent = ConversationLog::new();
        parent.append_turn(&turn("architect", "plan"));
        let seed_len = parent.len();

        let mut part1 = parent.seeded_clone();
        part1.append_turn(&turn("coder", "part one work"));
        let mut part2 = parent.seeded_clone();
        part2.append_turn(&turn("coder", "part two work"));

        parent.absorb(seed_len, part1);
        parent.absorb(seed_len, part2);

        let texts: Vec<_> = parent.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["plan", "part one work", "part two work"]);
    }
}
