//! The reply engine: the orchestrator sitting between inbound message
//! arrival and outbound dispatch. `reply` is a straight-line sequence of
//! awaited steps end to end, grounded on the overall
//! load-build-invoke-persist-return shape of the teacher's non-streaming
//! message pipeline, even though the concrete steps differ (an external CLI
//! invocation through a command queue, not an in-process tool loop).

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use relay_agent::{build_args, parse_output, run, BuildContext, CommandQueue, RunOpts};
use relay_core::config::RelayConfig;
use relay_core::template::{self, TemplateContext};
use relay_core::types::{
    CommandReplyMeta, Directive, Message, ReplyPayload, Session, ThinkLevel, VerboseLevel,
};
use relay_core::{directive, media};
use relay_session::SessionStore;

const TIMEOUT_EXCERPT_LEN: usize = 800;
const FAILURE_EXCERPT_LEN: usize = 500;

/// Runs the full user-turn algorithm for one inbound message, then decorates
/// every text payload with the configured `inbound.timestampPrefix` and
/// `inbound.responsePrefix` in one pass — applying it here, after
/// `reply_inner` has already picked its return points, means every path
/// (plain text, command success, timeout/non-zero-exit fallback, directive
/// acknowledgement, abort notice) gets it uniformly without threading it
/// through each branch individually.
pub async fn reply(
    message: &Message,
    config: &RelayConfig,
    store: &SessionStore,
    queue: &CommandQueue,
) -> (Vec<ReplyPayload>, CommandReplyMeta) {
    reply_impl(message, config, store, queue, None).await
}

/// Identical to [`reply`], but fires `on_tick` every
/// `reply.typingIntervalSeconds` while a command-mode invocation is queued
/// or running — the hook a collaborator's transport uses to keep a "typing…"
/// indicator alive during a long agent turn. No-op in text mode, or when the
/// key is unset.
pub async fn reply_with_typing_indicator(
    message: &Message,
    config: &RelayConfig,
    store: &SessionStore,
    queue: &CommandQueue,
    on_tick: impl Fn() + Send + Sync,
) -> (Vec<ReplyPayload>, CommandReplyMeta) {
    reply_impl(message, config, store, queue, Some(&on_tick)).await
}

async fn reply_impl(
    message: &Message,
    config: &RelayConfig,
    store: &SessionStore,
    queue: &CommandQueue,
    on_typing_tick: Option<&(dyn Fn() + Send + Sync)>,
) -> (Vec<ReplyPayload>, CommandReplyMeta) {
    let (mut payloads, meta) = reply_inner(message, config, store, queue, on_typing_tick).await;
    let now = chrono::Utc::now();
    for payload in &mut payloads {
        if let Some(text) = payload.text.take() {
            payload.text = Some(relay_core::outbound::decorate(
                &text,
                now,
                config.inbound.timestamp_prefix.as_ref(),
                config.inbound.response_prefix.as_deref(),
            ));
        }
    }
    attach_configured_media(&mut payloads, &config.inbound.reply);
    (payloads, meta)
}

/// Races `fut` against a ticker firing every `interval`, invoking `on_tick`
/// on each tick that fires before `fut` resolves. With no interval
/// configured, just awaits `fut` directly.
async fn run_with_typing_ticks<F, Fut, T>(
    interval: Option<Duration>,
    on_tick: Option<&(dyn Fn() + Send + Sync)>,
    fut: F,
) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let (Some(period), Some(on_tick)) = (interval, on_tick) else {
        return fut().await;
    };
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await; // first tick fires immediately; it marks "start", not "still waiting"
    let future = fut();
    tokio::pin!(future);
    loop {
        tokio::select! {
            result = &mut future => return result,
            _ = ticker.tick() => on_tick(),
        }
    }
}

/// Attaches the operator-configured `reply.mediaUrl` (a fixed attachment
/// distinct from whatever the media splitter pulled out of the agent's own
/// text) to the first outbound payload, subject to the same `mediaMaxMb`
/// cap as agent-extracted media. No-op when unset, or when there is nothing
/// to attach it to (an admission-refused or directive-only turn).
fn attach_configured_media(payloads: &mut [ReplyPayload], reply_cfg: &relay_core::config::ReplyConfig) {
    let Some(media_url) = &reply_cfg.media_url else {
        return;
    };
    let Some(first) = payloads.first_mut() else {
        return;
    };
    let allowed = media::filter_by_size(vec![media_url.clone()], reply_cfg.media_max_mb);
    let Some(url) = allowed.into_iter().next() else {
        return;
    };
    match (&mut first.media_url, &mut first.media_urls) {
        (None, None) => first.media_url = Some(url),
        (Some(_), None) => {
            let existing = first.media_url.take().expect("just matched Some");
            first.media_urls = Some(vec![existing, url]);
        }
        (_, Some(urls)) => urls.push(url),
    }
}

/// Never panics across its boundary; every failure path still yields a
/// payload list (possibly empty only on admission refusal).
#[instrument(skip(message, config, store, queue, on_typing_tick), fields(from = %message.from))]
async fn reply_inner(
    message: &Message,
    config: &RelayConfig,
    store: &SessionStore,
    queue: &CommandQueue,
    on_typing_tick: Option<&(dyn Fn() + Send + Sync)>,
) -> (Vec<ReplyPayload>, CommandReplyMeta) {
    // 1. Admission.
    if !config.is_sender_allowed(&message.from) {
        debug!(from = %message.from, "sender not in allowFrom, admission refused");
        return (Vec::new(), CommandReplyMeta::default());
    }

    let reply_cfg = &config.inbound.reply;
    let session_cfg = &reply_cfg.session;
    let key = session_cfg.scope.key_for(&message.from);

    // 2. Transcription.
    let (body, media_path_for_template) = transcribe_if_audio(message, config).await;

    // 3. Directive parsing.
    let directive = directive::parse(&body, &session_cfg.reset_triggers);

    // 4. Abort handling. Never touches the command queue.
    if directive.abort_requested {
        if let Err(err) = store.get(&key, false, session_cfg.idle_minutes) {
            warn!(error = %err, "session store read failed on abort turn");
        }
        if let Err(err) = store.for_session(&key, |s| s.abort_pending = true) {
            error!(error = %err, "session store write failed: could not persist abort flag");
        }
        let _ = store.touch(&key);
        return (vec![ReplyPayload::text("Agent was aborted.")], CommandReplyMeta::default());
    }

    // 5. Directive-only message.
    if directive.directive_only {
        let _ = store.get(&key, false, session_cfg.idle_minutes);
        let payloads = apply_directive_only(store, &key, &directive);
        let _ = store.touch(&key);
        return (payloads, CommandReplyMeta::default());
    }

    // 6. Session resolution.
    let (session, is_new_session, is_first_turn) =
        match store.get(&key, directive.reset_requested, session_cfg.idle_minutes) {
            Ok(tuple) => tuple,
            Err(err) => {
                warn!(error = %err, "session store read failed, proceeding without persistence");
                (transient_session(&key), true, true)
            }
        };

    // 7. Body composition.
    let body_for_agent = compose_body(
        store,
        &key,
        &session,
        reply_cfg,
        &directive,
        config.inbound.message_prefix.as_deref(),
        is_first_turn,
    );

    let think_level = resolve_think(&directive, &session, reply_cfg);
    let verbose_level = resolve_verbose(&directive, &session, reply_cfg);

    let ctx = TemplateContext {
        body: &body_for_agent,
        body_stripped: &directive.stripped_body,
        from: &message.from,
        to: &message.to,
        message_sid: &message.message_id,
        session_id: &session.id,
        is_new_session,
        media_path: media_path_for_template.as_deref(),
    };

    // 8. Text mode.
    if reply_cfg.mode == relay_core::config::ReplyMode::Text {
        let rendered = template::apply(reply_cfg.text.as_deref().unwrap_or(""), &ctx);
        let payloads = relay_core::chunker::chunk(&rendered, relay_core::chunker::WEB_MAX_LEN)
            .into_iter()
            .map(ReplyPayload::text)
            .collect();
        if is_first_turn {
            let _ = store.set_system_sent(&key);
        }
        let _ = store.touch(&key);
        return (payloads, CommandReplyMeta::default());
    }

    // 9. Command mode: template argv, insert session flags, enqueue.
    let Some(command) = reply_cfg.command.clone() else {
        return (vec![ReplyPayload::text("(no command configured)")], CommandReplyMeta::default());
    };

    let mut base_argv: Vec<String> = command.iter().map(|arg| template::apply(arg, &ctx)).collect();

    if let Some(system_template) = &reply_cfg.template {
        let should_send = !session_cfg.send_system_once || !session.system_sent;
        if should_send && !base_argv.is_empty() {
            let rendered = template::apply(system_template, &ctx);
            base_argv.insert(1, rendered);
        }
    }

    let mut final_body = body_for_agent.clone();
    match (reply_cfg.agent.kind, think_level.cue_word()) {
        (relay_core::types::AgentKind::Pi, _) => {
            if !matches!(think_level, ThinkLevel::Off) {
                base_argv.push("--think".to_string());
                base_argv.push(think_level.to_string());
            }
        }
        (_, Some(cue)) => {
            final_body = format!("{final_body} {cue}");
        }
        _ => {}
    }

    let build_ctx = BuildContext {
        base_argv,
        body: final_body,
        session_id: session.id.clone(),
        is_new_session,
        send_system_once: session_cfg.send_system_once,
        system_sent: session.system_sent,
        format: reply_cfg.agent.format.clone(),
        identity_prefix: reply_cfg.agent.identity_prefix.clone(),
        session_arg_before_body: session_cfg.session_arg_before_body,
    };
    let argv = build_args(reply_cfg.agent.kind, &build_ctx);

    let run_opts = RunOpts {
        startup_timeout: relay_agent::STARTUP_TIMEOUT,
        overall_timeout: std::time::Duration::from_secs(reply_cfg.timeout_seconds),
        cwd: reply_cfg.cwd.clone(),
    };

    let typing_interval = reply_cfg
        .typing_interval_seconds
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs);

    let started = Instant::now();
    let mut queued_ms = None;
    let mut queued_ahead = None;
    let run_result = run_with_typing_ticks(typing_interval, on_typing_tick, || {
        queue.enqueue(
            move || async move { run(&argv, run_opts).await },
            |wait_ms, ahead| {
                queued_ms = Some(wait_ms);
                queued_ahead = Some(ahead as usize);
            },
        )
    })
    .await;
    let duration_ms = started.elapsed().as_millis() as u64;

    let mut meta = CommandReplyMeta {
        duration_ms,
        queued_ms,
        queued_ahead,
        ..Default::default()
    };

    let output = match run_result {
        // 10. Timeout handling.
        Err(relay_agent::AgentError::Timeout { timeout_ms, partial_stdout }) => {
            meta.killed = true;
            warn!(timeout_ms, "command timed out");
            let excerpt = truncate(&partial_stdout, TIMEOUT_EXCERPT_LEN);
            let text = format!(
                "The agent timed out after {}s.{}",
                timeout_ms / 1000,
                if excerpt.is_empty() {
                    String::new()
                } else {
                    format!(" Partial output: {excerpt}")
                }
            );
            let _ = store.touch(&key);
            return (vec![ReplyPayload::text(text)], meta);
        }
        // 11. Non-zero exit / killed.
        Err(relay_agent::AgentError::NonZeroExit { code, partial_stdout }) => {
            meta.exit_code = Some(code);
            warn!(code, "command exited non-zero");
            let excerpt = truncate(&partial_stdout, FAILURE_EXCERPT_LEN);
            let text = format!(
                "The agent exited with code {code}.{}",
                if excerpt.is_empty() { String::new() } else { format!(" Output: {excerpt}") }
            );
            let _ = store.touch(&key);
            return (vec![ReplyPayload::text(text)], meta);
        }
        Err(relay_agent::AgentError::Killed { signal, partial_stdout }) => {
            meta.signal = Some(signal);
            meta.killed = true;
            warn!(signal, "command was killed");
            let excerpt = truncate(&partial_stdout, FAILURE_EXCERPT_LEN);
            let text = format!(
                "The agent was killed by signal {signal}.{}",
                if excerpt.is_empty() { String::new() } else { format!(" Output: {excerpt}") }
            );
            let _ = store.touch(&key);
            return (vec![ReplyPayload::text(text)], meta);
        }
        Err(other) => {
            warn!(error = %other, "process runner failed before producing output");
            let _ = store.touch(&key);
            return (vec![ReplyPayload::text("(command produced no output)")], meta);
        }
        Ok(output) => output,
    };

    meta.exit_code = output.exit_code;
    meta.signal = output.signal;
    meta.killed = output.killed;

    // 12. Output parsing.
    let parsed = parse_output(reply_cfg.agent.kind, &output.stdout);
    meta.agent_meta = parsed.meta.clone();

    let mut payloads = build_payloads(&parsed.texts, reply_cfg.media_max_mb);
    if verbose_level.is_on() {
        payloads.extend(parsed.tool_results.iter().cloned().map(ReplyPayload::text));
    }
    if payloads.is_empty() {
        let fallback = output.stdout.trim();
        if !fallback.is_empty() {
            payloads = build_payloads(&[fallback.to_string()], reply_cfg.media_max_mb);
        }
    }
    if payloads.is_empty() {
        payloads.push(ReplyPayload::text("(command produced no output)"));
    }

    // 14. System-sent tracking.
    if is_first_turn {
        if let Err(err) = store.set_system_sent(&key) {
            error!(error = %err, "session store write failed: could not persist system_sent");
        }
    }
    let _ = store.touch(&key);

    info!(payloads = payloads.len(), duration_ms, "turn completed");
    (payloads, meta)
}

/// Heartbeat variant: identical output shaping to `reply`, but never
/// touches `updated_at` and operates against an existing session only
/// (the heartbeat scheduler enumerates live sessions itself). Returns the
/// agent's parsed, trimmed text for the caller to compare against the
/// `HEARTBEAT_OK` echo.
#[instrument(skip(config, store, queue), fields(session = %session_key))]
pub async fn probe_heartbeat(
    session_key: &str,
    config: &RelayConfig,
    store: &SessionStore,
    queue: &CommandQueue,
    body: &str,
) -> Option<String> {
    let reply_cfg = &config.inbound.reply;
    let session_cfg = &reply_cfg.session;

    let session = store.peek(session_key).ok().flatten()?;
    let directive = directive::parse(body, &session_cfg.reset_triggers);

    let ctx = TemplateContext {
        body,
        body_stripped: &directive.stripped_body,
        from: session_key,
        to: "",
        message_sid: "",
        session_id: &session.id,
        is_new_session: false,
        media_path: None,
    };

    let argv_template = reply_cfg.heartbeat_command.clone().or_else(|| reply_cfg.command.clone())?;
    let base_argv: Vec<String> = argv_template.iter().map(|arg| template::apply(arg, &ctx)).collect();

    let build_ctx = BuildContext {
        base_argv,
        body: body.to_string(),
        session_id: session.id.clone(),
        is_new_session: false,
        send_system_once: session_cfg.send_system_once,
        system_sent: session.system_sent,
        format: reply_cfg.agent.format.clone(),
        identity_prefix: reply_cfg.agent.identity_prefix.clone(),
        session_arg_before_body: session_cfg.session_arg_before_body,
    };
    let argv = build_args(reply_cfg.agent.kind, &build_ctx);
    let run_opts = RunOpts {
        startup_timeout: relay_agent::STARTUP_TIMEOUT,
        overall_timeout: std::time::Duration::from_secs(reply_cfg.timeout_seconds),
        cwd: reply_cfg.cwd.clone(),
    };

    let output = queue
        .enqueue(move || async move { run(&argv, run_opts).await }, |_, _| {})
        .await
        .ok()?;

    let parsed = parse_output(reply_cfg.agent.kind, &output.stdout);
    parsed.texts.first().cloned()
}

fn resolve_think(directive: &Directive, session: &Session, reply_cfg: &relay_core::config::ReplyConfig) -> ThinkLevel {
    directive
        .think
        .or_else(|| if matches!(session.think_default, ThinkLevel::Off) { None } else { Some(session.think_default) })
        .unwrap_or(reply_cfg.thinking_default)
}

fn resolve_verbose(directive: &Directive, session: &Session, reply_cfg: &relay_core::config::ReplyConfig) -> VerboseLevel {
    directive
        .verbose
        .or_else(|| if session.verbose_default.is_on() { Some(VerboseLevel::On) } else { None })
        .unwrap_or(reply_cfg.verbose_default)
}

fn compose_body(
    store: &SessionStore,
    key: &str,
    session: &Session,
    reply_cfg: &relay_core::config::ReplyConfig,
    directive: &Directive,
    message_prefix: Option<&str>,
    is_first_turn: bool,
) -> String {
    let mut body = directive.stripped_body.clone();

    if is_first_turn {
        if let Some(intro) = &reply_cfg.session.session_intro {
            body = format!("{intro}\n{body}");
        }
    }

    if session.abort_pending {
        body = format!("[Note: the previous turn was aborted by the user.] {body}");
        if let Err(err) = store.for_session(key, |s| s.abort_pending = false) {
            error!(error = %err, "session store write failed: could not clear abort_pending");
        }
    }

    if let Some(prefix) = &reply_cfg.body_prefix {
        body = format!("{prefix}{body}");
    }

    if let Some(prefix) = message_prefix {
        body = format!("{prefix}{body}");
    }

    body
}

fn apply_directive_only(store: &SessionStore, key: &str, directive: &Directive) -> Vec<ReplyPayload> {
    let mut payloads = Vec::new();

    if let Some(level) = directive.think {
        if let Err(err) = store.set_think_default(key, level) {
            error!(error = %err, "session store write failed: could not persist think default");
        }
        let text = if matches!(level, ThinkLevel::Off) {
            "Thinking disabled.".to_string()
        } else {
            format!("Thinking level set to {level}.")
        };
        payloads.push(ReplyPayload::text(text));
    } else if let Some(token) = &directive.think_unknown {
        // Unknown value: hint at the valid set, state unchanged.
        payloads.push(ReplyPayload::text(format!(
            "Unrecognised thinking level '{token}'. Use off, minimal, low, medium, or high."
        )));
    }

    if let Some(level) = directive.verbose {
        if let Err(err) = store.set_verbose_default(key, level) {
            error!(error = %err, "session store write failed: could not persist verbose default");
        }
        let text = if level.is_on() {
            "Verbose logging enabled.".to_string()
        } else {
            "Verbose logging disabled.".to_string()
        };
        payloads.push(ReplyPayload::text(text));
    } else if let Some(token) = &directive.verbose_unknown {
        payloads.push(ReplyPayload::text(format!(
            "Unrecognised verbose setting '{token}'. Use on or off."
        )));
    }

    if payloads.is_empty() {
        payloads.push(ReplyPayload::text("No recognised directive."));
    }
    payloads
}

fn build_payloads(texts: &[String], media_max_mb: Option<u64>) -> Vec<ReplyPayload> {
    let mut payloads = Vec::new();
    for text in texts {
        let split = media::split(text);
        let media_urls = media::filter_by_size(split.media_urls, media_max_mb);
        if split.text.is_empty() && media_urls.is_empty() {
            continue;
        }
        let mut payload = if split.text.is_empty() {
            ReplyPayload::default()
        } else {
            ReplyPayload::text(split.text)
        };
        match media_urls.len() {
            0 => {}
            1 => payload.media_url = media_urls.into_iter().next(),
            _ => payload.media_urls = Some(media_urls),
        }
        payloads.push(payload);
    }
    payloads
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

async fn transcribe_if_audio(message: &Message, config: &RelayConfig) -> (String, Option<String>) {
    let Some(transcribe_cfg) = &config.inbound.transcribe_audio else {
        return (message.body.clone(), None);
    };
    let Some(audio_path) = message.media_paths.iter().find(|p| is_audio_path(p)) else {
        return (message.body.clone(), None);
    };

    let ctx = TemplateContext {
        body: &message.body,
        body_stripped: &message.body,
        from: &message.from,
        to: &message.to,
        message_sid: &message.message_id,
        session_id: "",
        is_new_session: false,
        media_path: Some(audio_path.as_str()),
    };
    let argv: Vec<String> = transcribe_cfg.command.iter().map(|arg| template::apply(arg, &ctx)).collect();
    let opts = RunOpts {
        startup_timeout: relay_agent::STARTUP_TIMEOUT,
        overall_timeout: std::time::Duration::from_secs(transcribe_cfg.timeout_seconds),
        cwd: None,
    };

    match run(&argv, opts).await {
        Ok(output) if output.exit_code == Some(0) => {
            let transcript = output.stdout.trim().to_string();
            if transcript.is_empty() {
                (message.body.clone(), Some(audio_path.clone()))
            } else {
                (transcript, Some(audio_path.clone()))
            }
        }
        Ok(_) | Err(_) => {
            warn!(path = %audio_path, "transcription failed, keeping original body");
            (message.body.clone(), None)
        }
    }
}

fn is_audio_path(path: &str) -> bool {
    const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "oga", "m4a"];
    path.rsplit('.')
        .next()
        .map(|ext| AUDIO_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn transient_session(key: &str) -> Session {
    let now = chrono::Utc::now();
    Session {
        id: key.to_string(),
        key: key.to_string(),
        created_at: now,
        updated_at: now,
        system_sent: false,
        think_default: ThinkLevel::Off,
        verbose_default: VerboseLevel::Off,
        abort_pending: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::config::ReplyConfig;

    fn session_with(think: ThinkLevel, verbose: VerboseLevel) -> Session {
        let mut s = transient_session("k");
        s.think_default = think;
        s.verbose_default = verbose;
        s
    }

    #[test]
    fn inline_think_beats_session_and_config_defaults() {
        let mut reply_cfg = ReplyConfig::default();
        reply_cfg.thinking_default = ThinkLevel::Minimal;
        let session = session_with(ThinkLevel::Low, VerboseLevel::Off);
        let mut directive = Directive::default();
        directive.think = Some(ThinkLevel::High);

        assert_eq!(resolve_think(&directive, &session, &reply_cfg), ThinkLevel::High);
    }

    #[test]
    fn session_default_beats_config_default_absent_inline() {
        let mut reply_cfg = ReplyConfig::default();
        reply_cfg.thinking_default = ThinkLevel::Minimal;
        let session = session_with(ThinkLevel::Low, VerboseLevel::Off);
        let directive = Directive::default();

        assert_eq!(resolve_think(&directive, &session, &reply_cfg), ThinkLevel::Low);
    }

    #[test]
    fn config_default_applies_absent_inline_and_session() {
        let mut reply_cfg = ReplyConfig::default();
        reply_cfg.thinking_default = ThinkLevel::Minimal;
        let session = session_with(ThinkLevel::Off, VerboseLevel::Off);
        let directive = Directive::default();

        assert_eq!(resolve_think(&directive, &session, &reply_cfg), ThinkLevel::Minimal);
    }

    #[test]
    fn abort_reminder_is_prepended_once_and_then_cleared() {
        let store = relay_session::SessionStore::open_in_memory().unwrap();
        store.get("k", false, 30).unwrap();
        store.for_session("k", |s| s.abort_pending = true).unwrap();

        let reply_cfg = ReplyConfig::default();
        let (session, _, _) = store.get("k", false, 30).unwrap();
        let directive = Directive {
            stripped_body: "keep going".to_string(),
            ..Default::default()
        };
        let body = compose_body(&store, "k", &session, &reply_cfg, &directive, None, false);
        assert!(body.starts_with("[Note: the previous turn was aborted by the user.]"));

        let (session_after, _, _) = store.get("k", false, 30).unwrap();
        assert!(!session_after.abort_pending);

        let directive2 = Directive {
            stripped_body: "another message".to_string(),
            ..Default::default()
        };
        let body2 = compose_body(&store, "k", &session_after, &reply_cfg, &directive2, None, false);
        assert_eq!(body2, "another message");
    }

    #[test]
    fn message_prefix_is_outermost() {
        let store = relay_session::SessionStore::open_in_memory().unwrap();
        store.get("k", false, 30).unwrap();
        let (session, _, _) = store.get("k", false, 30).unwrap();
        let reply_cfg = ReplyConfig::default();
        let directive = Directive {
            stripped_body: "hi".to_string(),
            ..Default::default()
        };
        let body = compose_body(&store, "k", &session, &reply_cfg, &directive, Some("[sms] "), false);
        assert_eq!(body, "[sms] hi");
    }

    #[test]
    fn session_intro_is_prepended_only_on_first_turn() {
        let store = relay_session::SessionStore::open_in_memory().unwrap();
        let (session, _, _) = store.get("k", false, 30).unwrap();
        let mut reply_cfg = ReplyConfig::default();
        reply_cfg.session.session_intro = Some("You are the support bot.".to_string());
        let directive = Directive {
            stripped_body: "hi".to_string(),
            ..Default::default()
        };

        let first = compose_body(&store, "k", &session, &reply_cfg, &directive, None, true);
        assert_eq!(first, "You are the support bot.\nhi");

        let later = compose_body(&store, "k", &session, &reply_cfg, &directive, None, false);
        assert_eq!(later, "hi");
    }

    #[tokio::test]
    async fn response_and_timestamp_prefixes_decorate_every_outbound_payload() {
        use relay_core::config::{InboundConfig, TimestampPrefix};

        let mut config = RelayConfig::default();
        config.inbound = InboundConfig {
            allow_from: vec!["+1".to_string()],
            response_prefix: Some("[Bot] ".to_string()),
            timestamp_prefix: Some(TimestampPrefix::Enabled(false)),
            reply: ReplyConfig {
                mode: relay_core::config::ReplyMode::Text,
                text: Some("pong".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let store = relay_session::SessionStore::open_in_memory().unwrap();
        let queue = relay_agent::CommandQueue::new();
        let msg = Message {
            from: "+1".to_string(),
            to: "relay".to_string(),
            body: "ping".to_string(),
            message_id: "m1".to_string(),
            media_paths: Vec::new(),
            received_at: chrono::Utc::now(),
        };

        let (payloads, _meta) = reply(&msg, &config, &store, &queue).await;
        assert_eq!(payloads[0].text.as_deref(), Some("[Bot] pong"));
    }

    #[tokio::test]
    async fn configured_media_url_attaches_to_the_first_payload() {
        use relay_core::config::InboundConfig;

        let mut config = RelayConfig::default();
        config.inbound = InboundConfig {
            allow_from: vec!["+1".to_string()],
            reply: ReplyConfig {
                mode: relay_core::config::ReplyMode::Text,
                text: Some("pong".to_string()),
                media_url: Some("https://example.com/card.png".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let store = relay_session::SessionStore::open_in_memory().unwrap();
        let queue = relay_agent::CommandQueue::new();
        let msg = Message {
            from: "+1".to_string(),
            to: "relay".to_string(),
            body: "ping".to_string(),
            message_id: "m1".to_string(),
            media_paths: Vec::new(),
            received_at: chrono::Utc::now(),
        };

        let (payloads, _meta) = reply(&msg, &config, &store, &queue).await;
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].media_url.as_deref(), Some("https://example.com/card.png"));

        config.inbound.reply.media_max_mb = Some(1);
        let msg2 = Message { message_id: "m2".to_string(), ..msg };
        let (payloads2, _meta2) = reply(&msg2, &config, &store, &queue).await;
        assert_eq!(payloads2[0].media_url.as_deref(), Some("https://example.com/card.png"));
    }

    #[test]
    fn admission_refusal_leaves_nothing_to_attach_media_to() {
        let mut payloads: Vec<ReplyPayload> = Vec::new();
        let mut reply_cfg = ReplyConfig::default();
        reply_cfg.media_url = Some("https://example.com/card.png".to_string());
        attach_configured_media(&mut payloads, &reply_cfg);
        assert!(payloads.is_empty());
    }

    #[test]
    fn configured_media_url_appends_alongside_agent_extracted_media() {
        let mut payloads = vec![ReplyPayload {
            text: Some("see this".to_string()),
            media_url: Some("https://example.com/from-agent.jpg".to_string()),
            media_urls: None,
        }];
        let mut reply_cfg = ReplyConfig::default();
        reply_cfg.media_url = Some("https://example.com/card.png".to_string());
        attach_configured_media(&mut payloads, &reply_cfg);
        assert_eq!(
            payloads[0].media_urls.as_deref(),
            Some(&["https://example.com/from-agent.jpg".to_string(), "https://example.com/card.png".to_string()][..])
        );
        assert!(payloads[0].media_url.is_none());
    }

    #[tokio::test]
    async fn no_interval_configured_runs_fut_directly_without_ticking() {
        let ticks = std::sync::atomic::AtomicU64::new(0);
        let on_tick = || {
            ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        };
        let result = run_with_typing_ticks(None, Some(&on_tick), || async { 7 }).await;
        assert_eq!(result, 7);
        assert_eq!(ticks.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ticks_fire_while_the_future_is_still_pending() {
        let ticks = std::sync::atomic::AtomicU64::new(0);
        let on_tick = || {
            ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        };
        let result = run_with_typing_ticks(Some(Duration::from_millis(15)), Some(&on_tick), || {
            tokio::time::sleep(Duration::from_millis(60))
        })
        .await;
        let _: () = result;
        assert!(ticks.load(std::sync::atomic::Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn reply_with_typing_indicator_ticks_during_a_slow_command() {
        use relay_core::config::InboundConfig;
        use relay_core::types::AgentKind;
        use std::sync::atomic::{AtomicU64, Ordering};

        let mut config = RelayConfig::default();
        config.inbound = InboundConfig {
            allow_from: vec!["+1".to_string()],
            reply: ReplyConfig {
                mode: relay_core::config::ReplyMode::Command,
                command: Some(vec!["sh".to_string(), "-c".to_string(), "sleep 0.2".to_string()]),
                typing_interval_seconds: Some(1),
                agent: relay_core::config::AgentConfig { kind: AgentKind::Codex, ..Default::default() },
                ..Default::default()
            },
            ..Default::default()
        };

        let store = relay_session::SessionStore::open_in_memory().unwrap();
        let queue = relay_agent::CommandQueue::new();
        let msg = Message {
            from: "+1".to_string(),
            to: "relay".to_string(),
            body: "go".to_string(),
            message_id: "m1".to_string(),
            media_paths: Vec::new(),
            received_at: chrono::Utc::now(),
        };

        let ticks = AtomicU64::new(0);
        let on_tick = || {
            ticks.fetch_add(1, Ordering::SeqCst);
        };
        let (payloads, _meta) =
            reply_with_typing_indicator(&msg, &config, &store, &queue, on_tick).await;
        assert_eq!(payloads.len(), 1);
    }
}
