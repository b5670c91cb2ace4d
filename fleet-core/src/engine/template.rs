//! Template rendering for `ChainTask.prompt_template`.
//!
//! Placeholders are `{{.key}}` — a dotted accessor over a single context map
//! keyed by task id, plus the synthetic `input` and `system` keys. Missing
//! keys render empty; an unterminated `{{` is a rendering error
//! (`ErrBadRequest`). A scan-and-substitute pass, the same shape as a
//! single-brace `{key}` templating helper but adapted to the `{{.key}}`
//! accessor syntax.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("unterminated placeholder in template: {0:?}")]
    Unterminated(String),
    #[error("malformed placeholder {placeholder:?}: expected a leading '.' accessor")]
    MalformedAccessor { placeholder: String },
}

/// Renders `template` against `context`, substituting every `{{.key}}`
/// occurrence with `context[key]` (empty string if absent). Pure and
/// deterministic: no I/O, no clock, no randomness.
pub fn render(template: &str, context: &HashMap<String, String>) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let end = after_open.find("}}").ok_or_else(|| TemplateError::Unterminated(template.to_string()))?;
        let placeholder = after_open[..end].trim();
        let key = placeholder.strip_prefix('.').ok_or_else(|| TemplateError::MalformedAccessor { placeholder: placeholder.to_string() })?;
        if let Some(value) = context.get(key) {
            output.push_str(value);
        }
        rest = &after_open[end + 2..];
    }
    output.push_str(rest);
    Ok(output)
}
