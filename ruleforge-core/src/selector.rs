//! Rule selectors: `rule[id=testing/standards]`, `rule[severity=warn][globs]`.
//!
//! Each bracket is a predicate; all must hold. `key` may be a dotted path
//! (`vendor.cursor.alwaysApply`). `[key]` tests presence, `[key=value]`
//! compares against the attribute's JSON value; for arrays any element may
//! match. Values may be single- or double-quoted.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::dotted;
use crate::error::CoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Present { key: String },
    Equals { key: String, value: String },
}

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    raw: String,
    predicates: Vec<Predicate>,
}

fn shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^rule(\[[^\[\]]+\])+$").expect("static regex"))
}

fn bracket() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\[\]=]+)(?:=([^\[\]]*))?\]").expect("static regex"))
}

fn key_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*(\.[A-Za-z0-9_\-]+)*$").expect("static regex")
    })
}

impl Selector {
    /// Parse `raw`, reporting the offending selector on failure.
    pub fn parse(raw: &str) -> Result<Selector, CoreError> {
        let trimmed = raw.trim();
        let fail = |reason: &str| CoreError::Selector {
            selector: raw.to_string(),
            reason: reason.to_string(),
        };
        if !shape().is_match(trimmed) {
            return Err(fail("expected rule[key=value] with one or more predicates"));
        }

        let mut predicates = Vec::new();
        for caps in bracket().captures_iter(trimmed) {
            let key = caps[1].trim().to_string();
            if !key_shape().is_match(&key) {
                return Err(fail(&format!("invalid attribute name '{key}'")));
            }
            match caps.get(2) {
                None => predicates.push(Predicate::Present { key }),
                Some(v) => {
                    let value = unquote(v.as_str().trim());
                    if value.is_empty() {
                        return Err(fail(&format!("empty value for '{key}'")));
                    }
                    predicates.push(Predicate::Equals { key, value });
                }
            }
        }

        Ok(Selector {
            raw: trimmed.to_string(),
            predicates,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Does the JSON form of a rule satisfy every predicate?
    pub fn matches(&self, rule: &Value) -> bool {
        self.predicates.iter().all(|p| match p {
            Predicate::Present { key } => {
                dotted::get(rule, key).is_some_and(|v| !v.is_null())
            }
            Predicate::Equals { key, value } => {
                dotted::get(rule, key).is_some_and(|v| value_matches(v, value))
            }
        })
    }
}

impl FromStr for Selector {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}

fn unquote(s: &str) -> String {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

fn value_matches(actual: &Value, expected: &str) -> bool {
    match actual {
        Value::String(s) => s == expected,
        Value::Bool(b) => b.to_string() == expected,
        Value::Number(n) => n.to_string() == expected,
        Value::Null => expected == "null",
        Value::Array(items) => items.iter().any(|i| value_matches(i, expected)),
        Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn rule() -> Value {
        json!({
            "id": "t/r",
            "heading": "Testing",
            "severity": "warn",
            "globs": ["**/*.rs", "**/*.toml"],
            "vendor": {"cursor": {"alwaysApply": true}},
            "check": {"inputs": {"threshold": 3}}
        })
    }

    #[rstest]
    #[case("rule[id=t/r]", true)]
    #[case("rule[id='t/r']", true)]
    #[case("rule[id=\"t/r\"]", true)]
    #[case("rule[id=x]", false)]
    #[case("rule[severity=warn][id=t/r]", true)]
    #[case("rule[severity=error][id=t/r]", false)]
    #[case("rule[globs=**/*.toml]", true)]
    #[case("rule[vendor.cursor.alwaysApply=true]", true)]
    #[case("rule[check.inputs.threshold=3]", true)]
    #[case("rule[check]", true)]
    #[case("rule[autofix]", false)]
    fn matching(#[case] selector: &str, #[case] expected: bool) {
        let sel = Selector::parse(selector).expect("parse");
        assert_eq!(sel.matches(&rule()), expected, "{selector}");
    }

    #[rstest]
    #[case("id=t/r")]
    #[case("rule")]
    #[case("rule[]")]
    #[case("rule[id=]")]
    #[case("rule[bad key=x]")]
    #[case("rules[id=x]")]
    fn invalid_syntax_names_selector(#[case] selector: &str) {
        let err = Selector::parse(selector).expect_err("invalid");
        assert!(err.to_string().contains(selector), "{err}");
    }
}
