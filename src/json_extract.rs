//! Pulling JSON out of free-form model output
//!
//! Each recovery step is a plain `fn(&str) -> Result<T, String>`; callers list
//! the steps they want and [`first_success`] runs them in order.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::fmt;

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
});

static ARRAY_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("array pattern is valid"));

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("trailing comma pattern is valid"));

/// A named recovery step
pub type Strategy<T> = (&'static str, fn(&str) -> Result<T, String>);

/// Every strategy failed; keeps each step's reason in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub attempts: Vec<(&'static str, String)>,
}

impl std::error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not parse model output")?;
        for (name, reason) in &self.attempts {
            write!(f, "; {}: {}", name, reason)?;
        }
        Ok(())
    }
}

/// Run `strategies` in order and return the first success with its name
pub fn first_success<T>(text: &str, strategies: &[Strategy<T>]) -> Result<(T, &'static str), ParseError> {
    let mut attempts = Vec::with_capacity(strategies.len());
    for (name, strategy) in strategies {
        match strategy(text) {
            Ok(value) => return Ok((value, *name)),
            Err(reason) => attempts.push((*name, reason)),
        }
    }
    Err(ParseError { attempts })
}

/// Body of the first Markdown code fence. An unterminated opening fence is
/// stripped as well, since truncated replies often lose the closing one.
pub fn strip_code_fences(text: &str) -> Option<String> {
    if let Some(caps) = CODE_FENCE.captures(text) {
        return Some(caps[1].trim().to_string());
    }
    let trimmed = text.trim_start();
    if trimmed.starts_with("```") {
        let body = trimmed.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
        return Some(body.trim().to_string());
    }
    None
}

/// Greedy span from the first `[` to the last `]`
pub fn array_span(text: &str) -> Option<&str> {
    ARRAY_SPAN.find(text).map(|m| m.as_str())
}

/// Remove commas directly before a closing brace or bracket
pub fn relax_trailing_commas(text: &str) -> Cow<'_, str> {
    TRAILING_COMMA.replace_all(text, "$1")
}

/// Top-level spans delimited by `open`/`close`, ignoring delimiters inside strings
pub fn balanced_spans(text: &str, open: char, close: char) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        if ch == '"' && depth > 0 {
            in_string = true;
        } else if ch == open {
            if depth == 0 {
                start = Some(idx);
            }
            depth += 1;
        } else if ch == close && depth > 0 {
            depth -= 1;
            if depth == 0 {
                if let Some(s) = start.take() {
                    spans.push(&text[s..idx + ch.len_utf8()]);
                }
            }
        }
    }

    spans
}

/// First top-level span delimited by `open`/`close`
pub fn first_balanced(text: &str, open: char, close: char) -> Option<&str> {
    balanced_spans(text, open, close).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        assert_eq!(strip_code_fences(text).unwrap(), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n[1, 2]\n```").unwrap(), "[1, 2]");
        assert_eq!(strip_code_fences("```json\n{\"a\": 1").unwrap(), "{\"a\": 1");
        assert!(strip_code_fences("no fences here").is_none());
    }

    #[test]
    fn test_balanced_spans_skip_braces_in_strings() {
        let text = r#"first {"a": "}{"} then {"b": {"c": 2}} done"#;
        let spans = balanced_spans(text, '{', '}');
        assert_eq!(spans, vec![r#"{"a": "}{"}"#, r#"{"b": {"c": 2}}"#]);
    }

    #[test]
    fn test_unclosed_span_is_ignored() {
        assert!(first_balanced(r#"{"a": 1"#, '{', '}').is_none());
    }

    #[test]
    fn test_array_span_is_greedy() {
        assert_eq!(array_span("x [1, [2]] y ] z"), Some("[1, [2]] y ]"));
    }

    #[test]
    fn test_relax_trailing_commas() {
        assert_eq!(relax_trailing_commas(r#"{"a": [1, 2, ], }"#), r#"{"a": [1, 2 ] }"#);
    }

    #[test]
    fn test_first_success_reports_all_attempts() {
        fn never(_: &str) -> Result<u8, String> {
            Err("nope".to_string())
        }
        fn len(text: &str) -> Result<u8, String> {
            Ok(text.len() as u8)
        }

        let strategies: [Strategy<u8>; 2] = [("never", never), ("len", len)];
        assert_eq!(first_success("abc", &strategies).unwrap(), (3, "len"));

        let err = first_success("abc", &strategies[..1]).unwrap_err();
        assert_eq!(err.attempts, vec![("never", "nope".to_string())]);
        assert!(err.to_string().contains("never: nope"));
    }
}
