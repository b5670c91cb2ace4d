//! Hook call argument parsing: `args: key=val, key2=val2 | payload` as a
//! structured prefix of a string input.
//!
//! Parsed args override a hook's defaults; defaults override nothing absent
//! from both. A malformed `args:` prefix is an error; the prefix's absence is
//! not — the whole input is then the payload.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArgsParseError {
    #[error("malformed args prefix: {0:?}")]
    Malformed(String),
}

/// The outcome of parsing a hook input for an optional `args:` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInput {
    pub args: HashMap<String, String>,
    pub payload: String,
}

/// Parses `input` for a leading `args: key=val, key2=val2 | payload` prefix.
/// No `args:` prefix ⇒ the whole string is the payload with no parsed args.
pub fn parse(input: &str) -> Result<ParsedInput, ArgsParseError> {
    let Some(rest) = input.strip_prefix("args:") else {
        return Ok(ParsedInput { args: HashMap::new(), payload: input.to_string() });
    };

    let Some((args_part, payload)) = rest.split_once('|') else {
        return Err(ArgsParseError::Malformed(input.to_string()));
    };

    let mut args = HashMap::new();
    for pair in args_part.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((key, value)) = pair.split_once('=') else {
            return Err(ArgsParseError::Malformed(input.to_string()));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(ArgsParseError::Malformed(input.to_string()));
        }
        args.insert(key.to_string(), value.trim().to_string());
    }

    Ok(ParsedInput { args, payload: payload.trim().to_string() })
}

/// Merges `call_args` over `defaults` — parsed/call args win, defaults fill
/// in anything absent.
pub fn merge(defaults: &HashMap<String, String>, call_args: &HashMap<String, String>) -> HashMap<String, String> {
    let mut merged = defaults.clone();
    merged.extend(call_args.clone());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_prefix_is_not_an_error_and_has_no_args() {
        let parsed = parse("plain payload text").unwrap();
        assert!(parsed.args.is_empty());
        assert_eq!(parsed.payload, "plain payload text");
    }

    #[test]
    fn parses_key_value_pairs_before_the_pipe() {
        let parsed = parse("args: k=v, k2=v2 | the payload").unwrap();
        assert_eq!(parsed.args.get("k").unwrap(), "v");
        assert_eq!(parsed.args.get("k2").unwrap(), "v2");
        assert_eq!(parsed.payload, "the payload");
    }

    #[test]
    fn missing_pipe_after_args_prefix_is_malformed() {
        let err = parse("args: k=v").unwrap_err();
        assert_eq!(err, ArgsParseError::Malformed("args: k=v".to_string()));
    }

    #[test]
    fn pair_without_equals_is_malformed() {
        let err = parse("args: justakey | payload").unwrap_err();
        assert!(matches!(err, ArgsParseError::Malformed(_)));
    }

    #[test]
    fn merge_prefers_call_args_over_defaults() {
        let mut defaults = HashMap::new();
        defaults.insert("top_k".to_string(), "5".to_string());
        defaults.insert("collection".to_string(), "default".to_string());
        let mut call_args = HashMap::new();
        call_args.insert("top_k".to_string(), "10".to_string());

        let merged = merge(&defaults, &call_args);
        assert_eq!(merged.get("top_k").unwrap(), "10");
        assert_eq!(merged.get("collection").unwrap(), "default");
    }
}
