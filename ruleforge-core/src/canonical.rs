//! Canonical serialization and SHA-256 content hashing.
//!
//! Canonical form: compact JSON, object keys sorted lexicographically at
//! every depth, array order preserved, unicode left unescaped. Floats use
//! the ECMAScript number-to-string rules: shortest round-trip digits, plain
//! notation for magnitudes in `[1e-6, 1e21)` (so `1.0` is `1` and `1e20`
//! is written out in full), exponent notation outside it. Two values that differ only in key order
//! therefore produce identical bytes.

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::dotted;
use crate::error::CanonicalError;
use crate::types::{Document, Rule, INTEGRITY_PLACEHOLDER};

/// Prefix used when hashes are stored in the lockfile and allow-list.
pub const HASH_PREFIX: &str = "sha256:";

// ---------------------------------------------------------------------------
// Canonicalize
// ---------------------------------------------------------------------------

/// Serialize `value` into canonical JSON.
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<String, CanonicalError> {
    let value = serde_json::to_value(value)?;
    Ok(canonical_json(&value))
}

/// Canonical JSON text for an already-built [`Value`].
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&format_number(n)),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[key.as_str()]);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    // serde_json only escapes quotes, backslashes and control characters.
    out.push_str(&Value::from(s).to_string());
}

fn format_number(n: &serde_json::Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    // serde_json prints floats with the shortest round-trip digits already;
    // only the notation is rewritten.
    ecma_float(&n.to_string())
}

/// Rewrite a float literal (`-1.5e-7`, `100.0`) in ECMAScript notation.
fn ecma_float(repr: &str) -> String {
    let (negative, unsigned) = match repr.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, repr),
    };
    let (mantissa, exp) = match unsigned.split_once(['e', 'E']) {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    // value = 0.<digits> * 10^point
    let all = format!("{int_part}{frac_part}");
    let leading = all.len() - all.trim_start_matches('0').len();
    let digits = all.trim_start_matches('0').trim_end_matches('0');
    if digits.is_empty() {
        return "0".to_string();
    }
    let point = int_part.len() as i32 + exp - leading as i32;
    let k = digits.len() as i32;

    let body = if k <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (whole, frac) = digits.split_at(point as usize);
        format!("{whole}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let e = point - 1;
        let sign = if e < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        let rest = if rest.is_empty() { String::new() } else { format!(".{rest}") };
        format!("{first}{rest}e{sign}{}", e.abs())
    };
    if negative {
        format!("-{body}")
    } else {
        body
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Lowercase hex SHA-256 of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// `sha256:<hex>` form of a bare hex digest.
pub fn prefixed(hex_digest: &str) -> String {
    if hex_digest.starts_with(HASH_PREFIX) {
        hex_digest.to_string()
    } else {
        format!("{HASH_PREFIX}{hex_digest}")
    }
}

/// Document hash: integrity replaced with the placeholder, each rule's
/// volatile vendor paths stripped, provenance excluded.
pub fn document_hash(doc: &Document) -> Result<String, CanonicalError> {
    let mut value = serde_json::to_value(doc)?;
    if let Some(integrity) = value.get_mut("integrity").and_then(Value::as_object_mut) {
        integrity.insert(
            "value".to_string(),
            Value::String(INTEGRITY_PLACEHOLDER.to_string()),
        );
    }
    if let Some(rules) = value.get_mut("rules").and_then(Value::as_array_mut) {
        for (rule_value, rule) in rules.iter_mut().zip(&doc.rules) {
            strip_volatile(rule_value, rule);
        }
    }
    Ok(hash_bytes(canonical_json(&value).as_bytes()))
}

/// Store the document hash in `doc.integrity.value` and return it.
pub fn seal(doc: &mut Document) -> Result<String, CanonicalError> {
    let hash = document_hash(doc)?;
    doc.integrity.value = hash.clone();
    Ok(hash)
}

/// Per-rule content hash over the `{front_matter, body}` pair.
///
/// Volatile vendor paths are excluded, so a rule whose only change is a
/// volatile value keeps its hash.
pub fn rule_hash(rule: &Rule) -> Result<String, CanonicalError> {
    let mut front_matter = serde_json::to_value(rule)?;
    strip_volatile(&mut front_matter, rule);
    let body = front_matter
        .as_object_mut()
        .and_then(|m| m.remove("body"))
        .unwrap_or(Value::String(String::new()));
    let mut pair = Map::new();
    pair.insert("front_matter".to_string(), front_matter);
    pair.insert("body".to_string(), body);
    Ok(hash_bytes(canonical_json(&Value::Object(pair)).as_bytes()))
}

fn strip_volatile(rule_value: &mut Value, rule: &Rule) {
    if rule.volatile.is_empty() {
        return;
    }
    if let Some(vendor) = rule_value.get_mut("vendor") {
        for path in &rule.volatile {
            dotted::remove(vendor, path);
        }
    }
}

// ---------------------------------------------------------------------------
// YAML → JSON
// ---------------------------------------------------------------------------

/// Convert a parsed YAML value into JSON.
///
/// Merge keys (`<<`) must already be applied by the caller. Fails on
/// non-finite floats, non-string mapping keys, and tagged values.
pub fn yaml_to_json(value: serde_yaml::Value) -> Result<Value, CanonicalError> {
    convert(value, "$")
}

fn convert(value: serde_yaml::Value, path: &str) -> Result<Value, CanonicalError> {
    use serde_yaml::Value as Y;
    match value {
        Y::Null => Ok(Value::Null),
        Y::Bool(b) => Ok(Value::Bool(b)),
        Y::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::from(u))
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| CanonicalError::NotRepresentable {
                        path: path.to_string(),
                        reason: format!("non-finite number {f}"),
                    })
            }
        }
        Y::String(s) => Ok(Value::String(s)),
        Y::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| convert(item, &format!("{path}[{i}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Y::Mapping(mapping) => {
            let mut out = Map::new();
            for (key, item) in mapping {
                let Y::String(key) = key else {
                    return Err(CanonicalError::NotRepresentable {
                        path: path.to_string(),
                        reason: format!("mapping key {key:?} is not a string"),
                    });
                };
                let child = convert(item, &format!("{path}.{key}"))?;
                out.insert(key, child);
            }
            Ok(Value::Object(out))
        }
        Y::Tagged(tagged) => Err(CanonicalError::NotRepresentable {
            path: path.to_string(),
            reason: format!("tagged value {}", tagged.tag),
        }),
    }
}

/// Parse YAML text (resolving anchors, aliases and merge keys) into JSON.
pub fn parse_yaml(text: &str) -> Result<Value, CanonicalError> {
    let mut value: serde_yaml::Value = serde_yaml::from_str(text)?;
    value.apply_merge()?;
    yaml_to_json(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PackMeta, Rule};
    use serde_json::json;

    fn doc_with(rule: Rule) -> Document {
        Document::new(PackMeta::new("pack", "1.0.0"), vec![rule])
    }

    #[test]
    fn keys_sorted_at_every_depth() {
        let v = json!({"b": 1, "a": {"z": true, "y": [3, {"d": null, "c": "x"}]}});
        assert_eq!(
            canonical_json(&v),
            r#"{"a":{"y":[3,{"c":"x","d":null}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn integral_floats_drop_fraction() {
        assert_eq!(canonical_json(&json!(1.0)), "1");
        assert_eq!(canonical_json(&json!(2.5)), "2.5");
        assert_eq!(canonical_json(&json!(-0.0)), "0");
    }

    #[test]
    fn floats_use_ecmascript_notation() {
        assert_eq!(canonical_json(&json!(1e20)), "100000000000000000000");
        assert_eq!(canonical_json(&json!(9007199254740994.0)), "9007199254740994");
        assert_eq!(canonical_json(&json!(1e21)), "1e+21");
        assert_eq!(canonical_json(&json!(1.5e300)), "1.5e+300");
        assert_eq!(canonical_json(&json!(0.000001)), "0.000001");
        assert_eq!(canonical_json(&json!(1.5e-7)), "1.5e-7");
        assert_eq!(canonical_json(&json!(-123.456)), "-123.456");
        assert_eq!(canonical_json(&json!(0.1)), "0.1");
    }

    #[test]
    fn unicode_is_preserved() {
        assert_eq!(canonical_json(&json!("héllo ✓")), "\"héllo ✓\"");
    }

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn document_hash_ignores_integrity_value() {
        let mut doc = doc_with(Rule::new("a", "A", "body"));
        let before = document_hash(&doc).expect("hash");
        let sealed = seal(&mut doc).expect("seal");
        assert_eq!(before, sealed);
        assert_eq!(document_hash(&doc).expect("hash"), before);
    }

    #[test]
    fn document_hash_ignores_volatile_vendor_fields() {
        let mut rule = Rule::new("a", "A", "body");
        rule.vendor.insert("cursor".into(), json!({"session": "one", "keep": 1}));
        rule.volatile = vec!["cursor.session".to_string()];
        let h1 = document_hash(&doc_with(rule.clone())).expect("hash");

        rule.vendor.insert("cursor".into(), json!({"session": "two", "keep": 1}));
        let h2 = document_hash(&doc_with(rule.clone())).expect("hash");
        assert_eq!(h1, h2);

        rule.vendor.insert("cursor".into(), json!({"session": "two", "keep": 2}));
        let h3 = document_hash(&doc_with(rule)).expect("hash");
        assert_ne!(h1, h3, "non-volatile change must alter the hash");
    }

    #[test]
    fn vendor_key_order_does_not_change_hash() {
        let mut a = Rule::new("a", "A", "body");
        a.vendor.insert("cursor".into(), json!({"x": 1}));
        a.vendor.insert("windsurf".into(), json!({"y": 2}));
        let mut b = Rule::new("a", "A", "body");
        b.vendor.insert("windsurf".into(), json!({"y": 2}));
        b.vendor.insert("cursor".into(), json!({"x": 1}));
        assert_eq!(rule_hash(&a).unwrap(), rule_hash(&b).unwrap());
        assert_eq!(
            document_hash(&doc_with(a)).unwrap(),
            document_hash(&doc_with(b)).unwrap()
        );
    }

    #[test]
    fn yaml_alias_resolves_to_same_json() {
        let aliased = "base: &b {x: 1, y: [a, b]}\ncopy: *b\n";
        let explicit = "base: {x: 1, y: [a, b]}\ncopy: {x: 1, y: [a, b]}\n";
        let a = parse_yaml(aliased).unwrap();
        let e = parse_yaml(explicit).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&e));
    }

    #[test]
    fn yaml_non_finite_float_fails_loudly() {
        let err = parse_yaml("threshold: .nan\n").expect_err("nan");
        assert!(matches!(err, CanonicalError::NotRepresentable { .. }));
        assert!(err.to_string().contains("threshold"));
    }

    #[test]
    fn yaml_non_string_key_fails_loudly() {
        let err = parse_yaml("1: one\n").expect_err("int key");
        assert!(matches!(err, CanonicalError::NotRepresentable { .. }));
    }

    #[test]
    fn yaml_tagged_value_fails_loudly() {
        let err = parse_yaml("x: !custom 3\n").expect_err("tag");
        assert!(err.to_string().contains("tagged"));
    }

    #[test]
    fn non_string_map_keys_fail_in_canonicalize() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(vec![1u8], "x");
        assert!(canonicalize(&map).is_err());
    }

    #[test]
    fn prefixed_is_idempotent() {
        assert_eq!(prefixed("abc"), "sha256:abc");
        assert_eq!(prefixed("sha256:abc"), "sha256:abc");
    }
}
