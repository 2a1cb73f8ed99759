//! Shared types and stateless components for the WhatsApp auto-reply relay:
//! the template engine, directive parser, media splitter, outbound chunker,
//! reconnect policy, admission list, and configuration shape. The stateful
//! pieces (session store, agent invocation, heartbeat scheduling, and the
//! top-level orchestrator) live in their own crates, each depending on this
//! one for its vocabulary.

pub mod allow;
pub mod chunker;
pub mod config;
pub mod directive;
pub mod error;
pub mod media;
pub mod outbound;
pub mod reconnect;
pub mod template;
pub mod types;

pub use error::{RelayError, Result};
pub use types::{
    AgentKind, AgentMeta, AgentParseResult, CommandReplyMeta, Directive, Message, ReplyPayload,
    Session, SessionScope, ThinkLevel, VerboseLevel, GLOBAL_SESSION_KEY,
};
