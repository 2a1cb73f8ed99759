use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An inbound message as received from a transport collaborator. Immutable
/// once received — nothing downstream mutates it in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub body: String,
    pub message_id: String,
    #[serde(default)]
    pub media_paths: Vec<String>,
    pub received_at: DateTime<Utc>,
}

/// Session scope: per-sender keys sessions by `from`, global shares one
/// session across every sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionScope {
    PerSender,
    Global,
}

pub const GLOBAL_SESSION_KEY: &str = "__global__";

impl SessionScope {
    /// The session-store key for a given sender under this scope.
    pub fn key_for(self, from: &str) -> String {
        match self {
            SessionScope::PerSender => from.to_string(),
            SessionScope::Global => GLOBAL_SESSION_KEY.to_string(),
        }
    }
}

/// Thinking/reasoning level requested inline, via session default, or via
/// config default. `off` is the floor — there is no "unset" state once
/// resolution has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkLevel {
    Off,
    Minimal,
    Low,
    Medium,
    High,
}

impl ThinkLevel {
    /// Parses a level token, case-insensitively. `max` and `highest` are
    /// accepted aliases for `high`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" => Some(ThinkLevel::Off),
            "minimal" => Some(ThinkLevel::Minimal),
            "low" => Some(ThinkLevel::Low),
            "medium" => Some(ThinkLevel::Medium),
            "high" | "max" | "highest" => Some(ThinkLevel::High),
            _ => None,
        }
    }

    /// The trailing cue word appended to the body for agent kinds that
    /// don't take a dedicated thinking-level argv flag.
    pub fn cue_word(self) -> Option<&'static str> {
        match self {
            ThinkLevel::Off => None,
            ThinkLevel::Minimal => Some("think"),
            ThinkLevel::Low => Some("think hard"),
            ThinkLevel::Medium => Some("think harder"),
            ThinkLevel::High => Some("ultrathink"),
        }
    }
}

impl Default for ThinkLevel {
    fn default() -> Self {
        ThinkLevel::Off
    }
}

impl fmt::Display for ThinkLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThinkLevel::Off => "off",
            ThinkLevel::Minimal => "minimal",
            ThinkLevel::Low => "low",
            ThinkLevel::Medium => "medium",
            ThinkLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Verbose logging default: whether agent tool-trace results are surfaced
/// as additional reply payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerboseLevel {
    Off,
    On,
}

impl VerboseLevel {
    /// Parses a verbose token, case-insensitively. `full` aliases `on`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" => Some(VerboseLevel::Off),
            "on" | "full" => Some(VerboseLevel::On),
            _ => None,
        }
    }

    pub fn is_on(self) -> bool {
        matches!(self, VerboseLevel::On)
    }
}

impl Default for VerboseLevel {
    fn default() -> Self {
        VerboseLevel::Off
    }
}

impl fmt::Display for VerboseLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VerboseLevel::Off => "off",
            VerboseLevel::On => "on",
        })
    }
}

/// Agent kind. A tagged enum rather than a trait object — per-kind behaviour
/// is a handful of pure functions, not enough state or polymorphism to
/// justify a class hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Claude,
    Opencode,
    Pi,
    Codex,
    Gemini,
}

impl AgentKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "claude" => Some(AgentKind::Claude),
            "opencode" => Some(AgentKind::Opencode),
            "pi" => Some(AgentKind::Pi),
            "codex" => Some(AgentKind::Codex),
            "gemini" => Some(AgentKind::Gemini),
            _ => None,
        }
    }

    /// Checks whether `argv[0]`'s basename identifies this kind.
    pub fn matches(self, argv0: &str) -> bool {
        let base = std::path::Path::new(argv0)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(argv0);
        match self {
            AgentKind::Claude => base == "claude",
            AgentKind::Opencode => base == "opencode",
            AgentKind::Codex => base == "codex",
            AgentKind::Gemini => base == "gemini",
            AgentKind::Pi => base == "pi" || base == "tau",
        }
    }
}

/// Directive set extracted from an inbound body by the directive parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directive {
    pub think: Option<ThinkLevel>,
    pub verbose: Option<VerboseLevel>,
    /// Raw token text when a `/think`-family directive was attempted but its
    /// value didn't match any recognised level (e.g. `/think:ultra`).
    pub think_unknown: Option<String>,
    /// Same as `think_unknown`, for `/verbose`-family directives.
    pub verbose_unknown: Option<String>,
    pub reset_requested: bool,
    pub abort_requested: bool,
    pub directive_only: bool,
    pub stripped_body: String,
}

/// Persistent per-key conversation state. Exclusively owned by the session
/// store — every other component sees either an immutable snapshot or
/// applies an explicit field update through the store's API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub system_sent: bool,
    pub think_default: ThinkLevel,
    pub verbose_default: VerboseLevel,
    pub abort_pending: bool,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>, idle_minutes: i64) -> bool {
        (now - self.updated_at).num_minutes() > idle_minutes
    }
}

/// Metadata describing an agent's own view of an invocation, surfaced
/// verbatim from `parseOutput` through to `CommandReplyMeta`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMeta {
    pub model: Option<String>,
    pub provider: Option<String>,
    pub stop_reason: Option<String>,
    pub usage: Option<serde_json::Value>,
    pub extra: Option<serde_json::Value>,
}

/// Result of parsing an agent's raw stdout.
#[derive(Debug, Clone, Default)]
pub struct AgentParseResult {
    pub texts: Vec<String>,
    pub tool_results: Vec<String>,
    pub meta: Option<AgentMeta>,
}

/// One outbound unit. Emitted in order; a single turn may produce several.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPayload {
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub media_urls: Option<Vec<String>>,
}

impl ReplyPayload {
    pub fn text(s: impl Into<String>) -> Self {
        ReplyPayload {
            text: Some(s.into()),
            media_url: None,
            media_urls: None,
        }
    }
}

/// Metadata about a completed (or timed-out/killed) command invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandReplyMeta {
    pub duration_ms: u64,
    pub queued_ms: Option<u64>,
    pub queued_ahead: Option<usize>,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub killed: bool,
    pub agent_meta: Option<AgentMeta>,
}
