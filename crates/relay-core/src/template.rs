//! Token substitution for reply text and command templates.

/// Context values available for substitution into a template string.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext<'a> {
    pub body: &'a str,
    pub body_stripped: &'a str,
    pub from: &'a str,
    pub to: &'a str,
    pub message_sid: &'a str,
    pub session_id: &'a str,
    pub is_new_session: bool,
    pub media_path: Option<&'a str>,
}

/// Substitutes recognised `{{Token}}` placeholders into `template`. Unknown
/// tokens are left verbatim. There is no escaping — the caller controls the
/// template, not untrusted input.
pub fn apply(template: &str, ctx: &TemplateContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let token = &after[..end];
                out.push_str(&resolve(token, ctx).unwrap_or_else(|| format!("{{{{{token}}}}}")));
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated token — emit the rest verbatim.
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve(token: &str, ctx: &TemplateContext) -> Option<String> {
    Some(match token {
        "Body" => ctx.body.to_string(),
        "BodyStripped" => ctx.body_stripped.to_string(),
        "From" => ctx.from.to_string(),
        "To" => ctx.to.to_string(),
        "MessageSid" => ctx.message_sid.to_string(),
        "SessionId" => ctx.session_id.to_string(),
        "IsNewSession" => ctx.is_new_session.to_string(),
        "MediaPath" => ctx.media_path.unwrap_or("").to_string(),
        _ => return None,
    })
}
