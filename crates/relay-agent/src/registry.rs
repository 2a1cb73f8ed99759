//! Agent registry: per-kind argv construction and output parsing. Each kind
//! is a pure function pair keyed off the `AgentKind` tag — no trait object,
//! no per-kind state.

use relay_core::types::{AgentKind, AgentMeta, AgentParseResult};

/// Everything `build_args` needs to inject kind-specific flags onto a
/// caller-provided argv.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Caller-provided argv (binary plus any static flags), body not yet
    /// appended.
    pub base_argv: Vec<String>,
    pub body: String,
    pub session_id: String,
    pub is_new_session: bool,
    pub send_system_once: bool,
    pub system_sent: bool,
    pub format: Option<String>,
    pub identity_prefix: Option<String>,
    pub session_arg_before_body: bool,
}

/// Builds the full argv (including the body) for a single invocation of
/// `kind`, following the flag table: claude uses `--session-id`/`--resume`;
/// codex/opencode/pi always use `--session`; gemini only resumes (no
/// new-session flag); pi additionally forces `-p`, adds `--mode json` for
/// JSON output, and prepends an identity prefix to the body unless
/// `sendSystemOnce` has already fired for this session.
pub fn build_args(kind: AgentKind, ctx: &BuildContext) -> Vec<String> {
    let mut argv = ctx.base_argv.clone();

    match kind {
        AgentKind::Claude => {
            if let Some(format) = &ctx.format {
                argv.push("--output-format".to_string());
                argv.push(format.clone());
            }
        }
        AgentKind::Pi => {
            argv.push("-p".to_string());
            if ctx.format.as_deref() == Some("json") {
                argv.push("--mode".to_string());
                argv.push("json".to_string());
            }
        }
        AgentKind::Opencode | AgentKind::Codex | AgentKind::Gemini => {}
    }

    let session_flags: Vec<String> = match kind {
        AgentKind::Claude => {
            if ctx.is_new_session {
                vec!["--session-id".to_string(), ctx.session_id.clone()]
            } else {
                vec!["--resume".to_string(), ctx.session_id.clone()]
            }
        }
        AgentKind::Codex | AgentKind::Opencode | AgentKind::Pi => {
            vec!["--session".to_string(), ctx.session_id.clone()]
        }
        AgentKind::Gemini => {
            if ctx.is_new_session {
                Vec::new()
            } else {
                vec!["--resume".to_string(), ctx.session_id.clone()]
            }
        }
    };

    let mut body = ctx.body.clone();
    if kind == AgentKind::Pi {
        let suppress_identity = ctx.send_system_once && ctx.system_sent;
        if !suppress_identity {
            if let Some(prefix) = &ctx.identity_prefix {
                body = format!("{prefix}{body}");
            }
        }
    }

    if ctx.session_arg_before_body {
        argv.extend(session_flags);
        argv.push(body);
    } else {
        argv.push(body);
        argv.extend(session_flags);
    }

    argv
}

/// Parses an agent's raw stdout. Detects the Claude single-JSON-result
/// shape (`result`/`is_error`/`usage`), falls back to a newline-delimited
/// JSON event stream (assistant/tool blocks, one JSON value per line,
/// malformed lines skipped), and falls back again to a single plain-text
/// element when nothing on the line looks like JSON at all.
pub fn parse_output(_kind: AgentKind, raw: &str) -> AgentParseResult {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return AgentParseResult::default();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.get("result").is_some() || value.get("is_error").is_some() {
            return parse_single_result(&value);
        }
    }

    let mut texts: Vec<String> = Vec::new();
    let mut tool_results = Vec::new();
    let mut meta = AgentMeta::default();
    let mut any_json_line = false;

    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        any_json_line = true;

        let event_type = value.get("type").and_then(|v| v.as_str()).unwrap_or("");
        if event_type.starts_with("tool") {
            tool_results.push(value.to_string());
            continue;
        }
        match event_type {
            "assistant" | "message" => {
                if let Some(text) = extract_text(&value) {
                    if texts.last().map(|last| last != &text).unwrap_or(true) {
                        texts.push(text);
                    }
                }
            }
            "result" => {
                if let Some(text) = value.get("result").and_then(|v| v.as_str()) {
                    if texts.is_empty() {
                        texts.push(text.to_string());
                    }
                }
                if let Some(model) = value.get("model").and_then(|v| v.as_str()) {
                    meta.model = Some(model.to_string());
                }
            }
            _ => {}
        }
    }

    if any_json_line {
        return AgentParseResult {
            texts,
            tool_results,
            meta: Some(meta),
        };
    }

    AgentParseResult {
        texts: vec![trimmed.to_string()],
        tool_results: Vec::new(),
        meta: None,
    }
}

fn parse_single_result(value: &serde_json::Value) -> AgentParseResult {
    let is_error = value.get("is_error").and_then(|v| v.as_bool()).unwrap_or(false);
    let text = value
        .get("result")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let meta = AgentMeta {
        model: value.get("model").and_then(|v| v.as_str()).map(String::from),
        provider: None,
        stop_reason: if is_error { Some("error".to_string()) } else { None },
        usage: value.get("usage").cloned(),
        extra: None,
    };
    AgentParseResult {
        texts: if text.is_empty() { Vec::new() } else { vec![text] },
        tool_results: Vec::new(),
        meta: Some(meta),
    }
}

fn extract_text(value: &serde_json::Value) -> Option<String> {
    if let Some(content) = value.pointer("/message/content").and_then(|v| v.as_array()) {
        let mut combined = String::new();
        for block in content {
            if block.get("type").and_then(|v| v.as_str()) == Some("text") {
                if let Some(text) = block.get("text").and_then(|v| v.as_str()) {
                    combined.push_str(text);
                }
            }
        }
        if !combined.is_empty() {
            return Some(combined);
        }
    }
    value
        .get("text")
        .or_else(|| value.get("content"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(kind_defaults: bool) -> BuildContext {
        BuildContext {
            base_argv: vec!["claude".to_string()],
            body: "hello".to_string(),
            session_id: "sess-1".to_string(),
            is_new_session: kind_defaults,
            send_system_once: false,
            system_sent: false,
            format: None,
            identity_prefix: None,
            session_arg_before_body: true,
        }
    }

    #[test]
    fn claude_new_session_uses_session_id_flag() {
        let argv = build_args(AgentKind::Claude, &ctx(true));
        assert_eq!(argv, vec!["claude", "--session-id", "sess-1", "hello"]);
    }

    #[test]
    fn claude_resume_uses_resume_flag() {
        let argv = build_args(AgentKind::Claude, &ctx(false));
        assert_eq!(argv, vec!["claude", "--resume", "sess-1", "hello"]);
    }

    #[test]
    fn gemini_new_session_has_no_session_flag() {
        let mut c = ctx(true);
        c.base_argv = vec!["gemini".to_string()];
        let argv = build_args(AgentKind::Gemini, &c);
        assert_eq!(argv, vec!["gemini", "hello"]);
    }

    #[test]
    fn gemini_resume_uses_resume_flag() {
        let mut c = ctx(false);
        c.base_argv = vec!["gemini".to_string()];
        let argv = build_args(AgentKind::Gemini, &c);
        assert_eq!(argv, vec!["gemini", "--resume", "sess-1", "hello"]);
    }

    #[test]
    fn pi_adds_print_flag_and_identity_prefix() {
        let mut c = ctx(true);
        c.base_argv = vec!["pi".to_string()];
        c.identity_prefix = Some("[whatsapp] ".to_string());
        let argv = build_args(AgentKind::Pi, &c);
        assert_eq!(
            argv,
            vec!["pi", "-p", "--session", "sess-1", "[whatsapp] hello"]
        );
    }

    #[test]
    fn pi_suppresses_identity_prefix_once_system_sent() {
        let mut c = ctx(true);
        c.base_argv = vec!["pi".to_string()];
        c.identity_prefix = Some("[whatsapp] ".to_string());
        c.send_system_once = true;
        c.system_sent = true;
        let argv = build_args(AgentKind::Pi, &c);
        assert_eq!(argv, vec!["pi", "-p", "--session", "sess-1", "hello"]);
    }

    #[test]
    fn session_args_can_be_appended_after_body() {
        let mut c = ctx(true);
        c.session_arg_before_body = false;
        let argv = build_args(AgentKind::Claude, &c);
        assert_eq!(argv, vec!["claude", "hello", "--session-id", "sess-1"]);
    }

    #[test]
    fn parses_claude_single_json_result() {
        let raw = r#"{"result":"hi there","usage":{"input_tokens":10,"output_tokens":5},"is_error":false}"#;
        let parsed = parse_output(AgentKind::Claude, raw);
        assert_eq!(parsed.texts, vec!["hi there".to_string()]);
        assert!(parsed.meta.unwrap().usage.is_some());
    }

    #[test]
    fn parses_ndjson_stream_with_dedup_and_tool_results() {
        let raw = concat!(
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"working on it"}]}}"#,
            "\n",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"working on it"}]}}"#,
            "\n",
            r#"{"type":"tool_use","name":"search"}"#,
            "\n",
            r#"garbage line not json"#,
            "\n",
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"done"}]}}"#,
        );
        let parsed = parse_output(AgentKind::Claude, raw);
        assert_eq!(parsed.texts, vec!["working on it".to_string(), "done".to_string()]);
        assert_eq!(parsed.tool_results.len(), 1);
    }

    #[test]
    fn falls_back_to_plain_text_when_not_json() {
        let parsed = parse_output(AgentKind::Opencode, "just a plain reply");
        assert_eq!(parsed.texts, vec!["just a plain reply".to_string()]);
        assert!(parsed.tool_results.is_empty());
    }

    #[test]
    fn empty_output_yields_empty_result() {
        let parsed = parse_output(AgentKind::Codex, "   ");
        assert!(parsed.texts.is_empty());
    }
}
