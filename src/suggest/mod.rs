//! Inline suggestion lifecycle: one AI-proposed edit bound to a cursor
//! position.
//!
//! `Idle -> Proposed -> {accepted | rejected | expired} -> Idle`. The two
//! race guards the editor needs — an in-progress accept and a short
//! post-accept cooldown — are modeled here so overlapping accept triggers
//! degrade to no-ops instead of double insertions.

use crate::config::Config;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const DEFAULT_TOLERANCE: u32 = 2;
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(1);
const DEFAULT_DWELL: Duration = Duration::from_secs(5);

/// 1-based editor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

impl CursorPosition {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub id: u64,
    pub text: String,
    pub position: CursorPosition,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionState {
    Idle,
    Proposed(Suggestion),
    /// Transient: an accept is splicing. Guards against re-entrant accepts
    /// triggered from inside the outcome notification.
    Accepting,
}

/// Sent to whoever generates suggestions, so it can fetch the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionOutcome {
    Accepted,
    Rejected,
}

/// Result of a successful accept: the spliced buffer content and where the
/// cursor lands (end of the inserted text).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedEdit {
    pub content: String,
    pub cursor: CursorPosition,
}

pub struct SuggestionEngine {
    state: SuggestionState,
    tolerance: u32,
    cooldown: Duration,
    cooldown_until: Option<Instant>,
    dwell: Duration,
    outside_since: Option<Instant>,
    next_id: u64,
    outcomes: Option<mpsc::UnboundedSender<SuggestionOutcome>>,
}

impl Default for SuggestionEngine {
    fn default() -> Self {
        Self {
            state: SuggestionState::Idle,
            tolerance: DEFAULT_TOLERANCE,
            cooldown: DEFAULT_COOLDOWN,
            cooldown_until: None,
            dwell: DEFAULT_DWELL,
            outside_since: None,
            next_id: 0,
            outcomes: None,
        }
    }
}

impl SuggestionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine tuned by the ambient configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_tolerance(config.suggestion_tolerance)
            .with_cooldown(config.accept_cooldown)
    }

    pub fn with_outcomes(mut self, outcomes: mpsc::UnboundedSender<SuggestionOutcome>) -> Self {
        self.outcomes = Some(outcomes);
        self
    }

    pub fn with_tolerance(mut self, tolerance: u32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_dwell(mut self, dwell: Duration) -> Self {
        self.dwell = dwell;
        self
    }

    pub fn state(&self) -> &SuggestionState {
        &self.state
    }

    /// Propose `text` at `position`. Only taken while the live cursor is
    /// within the tolerance window and no accept is in flight or cooling
    /// down. Carriage returns are stripped up front so line math stays
    /// honest.
    pub fn propose(&mut self, text: &str, position: CursorPosition, cursor: CursorPosition) -> bool {
        if matches!(self.state, SuggestionState::Accepting)
            || self.in_cooldown()
            || !self.in_window(cursor, position)
        {
            return false;
        }
        self.next_id += 1;
        self.state = SuggestionState::Proposed(Suggestion {
            id: self.next_id,
            text: text.replace('\r', ""),
            position,
        });
        self.outside_since = None;
        true
    }

    /// The suggestion to offer at the live cursor position, if any. Outside
    /// the window the proposal is suppressed but not discarded.
    pub fn offered_at(&self, cursor: CursorPosition) -> Option<&Suggestion> {
        if self.in_cooldown() {
            return None;
        }
        match &self.state {
            SuggestionState::Proposed(s) if self.in_window(cursor, s.position) => Some(s),
            _ => None,
        }
    }

    /// Track cursor movement. A cursor that stays outside the window for a
    /// sustained period expires the proposal.
    pub fn note_cursor(&mut self, cursor: CursorPosition) {
        let SuggestionState::Proposed(suggestion) = &self.state else {
            return;
        };
        if self.in_window(cursor, suggestion.position) {
            self.outside_since = None;
            return;
        }
        let since = *self.outside_since.get_or_insert_with(Instant::now);
        if since.elapsed() >= self.dwell {
            self.state = SuggestionState::Idle;
            self.outside_since = None;
            self.notify(SuggestionOutcome::Rejected);
        }
    }

    /// Accept the current proposal at the live cursor. Returns the spliced
    /// content and new cursor, or `None` when any guard fires (no proposal,
    /// cursor out of window, accept in flight, cooldown, stale position) —
    /// races degrade to no-ops, never errors.
    pub fn accept(&mut self, cursor: CursorPosition, content: &str) -> Option<AcceptedEdit> {
        if matches!(self.state, SuggestionState::Accepting) || self.in_cooldown() {
            return None;
        }
        let suggestion = match &self.state {
            SuggestionState::Proposed(s) if self.in_window(cursor, s.position) => s.clone(),
            _ => return None,
        };

        self.state = SuggestionState::Accepting;
        let Some(offset) = byte_offset(content, suggestion.position) else {
            // Stale position: the buffer no longer has that line.
            self.state = SuggestionState::Proposed(suggestion);
            return None;
        };

        let mut spliced = String::with_capacity(content.len() + suggestion.text.len());
        spliced.push_str(&content[..offset]);
        spliced.push_str(&suggestion.text);
        spliced.push_str(&content[offset..]);

        let inserted_lines: Vec<&str> = suggestion.text.split('\n').collect();
        let cursor = if inserted_lines.len() == 1 {
            CursorPosition::new(
                suggestion.position.line,
                suggestion.position.column + suggestion.text.chars().count() as u32,
            )
        } else {
            let last = inserted_lines.last().copied().unwrap_or_default();
            CursorPosition::new(
                suggestion.position.line + inserted_lines.len() as u32 - 1,
                last.chars().count() as u32 + 1,
            )
        };

        self.state = SuggestionState::Idle;
        self.cooldown_until = Some(Instant::now() + self.cooldown);
        self.outside_since = None;
        self.notify(SuggestionOutcome::Accepted);
        Some(AcceptedEdit {
            content: spliced,
            cursor,
        })
    }

    /// Explicit cancel (Escape). The generation collaborator is told so it
    /// can stop offering this one.
    pub fn reject(&mut self) -> bool {
        if matches!(self.state, SuggestionState::Proposed(_)) {
            self.state = SuggestionState::Idle;
            self.outside_since = None;
            self.notify(SuggestionOutcome::Rejected);
            true
        } else {
            false
        }
    }

    /// Silent reset, for buffer close or navigation: back to `Idle` with no
    /// side effects and no outcome signal.
    pub fn cancel(&mut self) {
        self.state = SuggestionState::Idle;
        self.outside_since = None;
    }

    fn in_window(&self, cursor: CursorPosition, position: CursorPosition) -> bool {
        cursor.line == position.line
            && cursor.column >= position.column
            && cursor.column <= position.column + self.tolerance
    }

    fn in_cooldown(&self) -> bool {
        self.cooldown_until
            .is_some_and(|until| Instant::now() < until)
    }

    fn notify(&self, outcome: SuggestionOutcome) {
        if let Some(outcomes) = &self.outcomes {
            let _ = outcomes.send(outcome);
        }
    }
}

/// Byte offset of a 1-based (line, column) position. Columns beyond the end
/// of the line clamp to the line end; a missing line is `None`.
fn byte_offset(content: &str, position: CursorPosition) -> Option<usize> {
    let target_line = position.line.max(1) as usize - 1;
    let target_col = position.column.max(1) as usize - 1;
    let mut offset = 0usize;
    for (index, line) in content.split('\n').enumerate() {
        if index == target_line {
            let in_line = line
                .char_indices()
                .nth(target_col)
                .map(|(byte, _)| byte)
                .unwrap_or(line.len());
            return Some(offset + in_line);
        }
        offset += line.len() + 1;
    }
    None
}
