//! Typed configuration covering every key recognised by the core (the
//! recognised-keys table). Loading and validating a config *file* is a
//! collaborator's job; this is the shape the core consumes, plus a
//! `figment`-based loader in the teacher's idiom for embedders that don't
//! want to hand-roll one.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::types::{AgentKind, SessionScope, ThinkLevel, VerboseLevel};

fn default_idle_minutes() -> i64 {
    30
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_transcribe_timeout_seconds() -> u64 {
    30
}

fn default_session_store_path() -> String {
    "relay-sessions.db".to_string()
}

fn default_reset_triggers() -> Vec<String> {
    vec!["new chat".to_string(), "/reset".to_string()]
}

fn default_true() -> bool {
    true
}

/// Either a boolean flag (UTC) or an IANA timezone name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimestampPrefix {
    Enabled(bool),
    Zone(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    Text,
    Command,
}

impl Default for ReplyMode {
    fn default() -> Self {
        ReplyMode::Text
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeAudioConfig {
    pub command: Vec<String>,
    #[serde(default = "default_transcribe_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub kind: AgentKind,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub identity_prefix: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            kind: AgentKind::Claude,
            format: None,
            identity_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "SessionScope::default_scope")]
    pub scope: SessionScope,
    #[serde(default = "default_reset_triggers")]
    pub reset_triggers: Vec<String>,
    #[serde(default = "default_idle_minutes")]
    pub idle_minutes: i64,
    #[serde(default)]
    pub heartbeat_idle_minutes: Option<i64>,
    #[serde(default = "default_session_store_path")]
    pub store: String,
    #[serde(default = "default_true")]
    pub session_arg_before_body: bool,
    #[serde(default)]
    pub send_system_once: bool,
    #[serde(default)]
    pub session_intro: Option<String>,
}

impl SessionScope {
    fn default_scope() -> Self {
        SessionScope::PerSender
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            scope: SessionScope::default_scope(),
            reset_triggers: default_reset_triggers(),
            idle_minutes: default_idle_minutes(),
            heartbeat_idle_minutes: None,
            store: default_session_store_path(),
            session_arg_before_body: true,
            send_system_once: false,
            session_intro: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplyConfig {
    #[serde(default)]
    pub mode: ReplyMode,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub heartbeat_command: Option<Vec<String>>,
    #[serde(default)]
    pub thinking_default: ThinkLevel,
    #[serde(default)]
    pub verbose_default: VerboseLevel,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub body_prefix: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_max_mb: Option<u64>,
    #[serde(default)]
    pub typing_interval_seconds: Option<u64>,
    #[serde(default)]
    pub heartbeat_minutes: Option<u64>,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundConfig {
    #[serde(default)]
    pub allow_from: Vec<String>,
    #[serde(default)]
    pub message_prefix: Option<String>,
    #[serde(default)]
    pub response_prefix: Option<String>,
    #[serde(default)]
    pub timestamp_prefix: Option<TimestampPrefix>,
    #[serde(default)]
    pub transcribe_audio: Option<TranscribeAudioConfig>,
    #[serde(default)]
    pub reply: ReplyConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub inbound: InboundConfig,
}

impl RelayConfig {
    /// Loads configuration from an optional TOML file, overlaid with
    /// `RELAY_`-prefixed environment variables. Absent a file, defaults
    /// apply — an empty config is a valid "do nothing" configuration per
    /// the core's error-handling policy.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }
        figment = figment.merge(Env::prefixed("RELAY_").split("_"));
        figment
            .extract()
            .map_err(|e| RelayError::ConfigInvalid(e.to_string()))
    }

    /// Whether `sender` is admitted, per `inbound.allowFrom`.
    pub fn is_sender_allowed(&self, sender: &str) -> bool {
        crate::allow::is_allowed(&self.inbound.allow_from, sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_extracts_with_defaults() {
        let cfg: RelayConfig = Figment::new().extract().expect("defaults should extract");
        assert_eq!(cfg.inbound.allow_from, Vec::<String>::new());
        assert_eq!(cfg.inbound.reply.session.idle_minutes, 30);
        assert_eq!(cfg.inbound.reply.mode, ReplyMode::Text);
    }

    #[test]
    fn timestamp_prefix_accepts_bool_or_string() {
        let bool_form: TimestampPrefix =
            serde_json::from_str("true").expect("bool form should parse");
        assert_eq!(bool_form, TimestampPrefix::Enabled(true));

        let zone_form: TimestampPrefix =
            serde_json::from_str("\"America/New_York\"").expect("zone form should parse");
        assert_eq!(zone_form, TimestampPrefix::Zone("America/New_York".to_string()));
    }
}
