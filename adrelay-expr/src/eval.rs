//! Pipeline expression evaluator and adapter template renderer.
//!
//! Grounded verbatim on `original_source/app/mapping_dsl.py`: same
//! expression forms (`const:`, `secret_ref()`, `hmac_sha256()`, `join()`,
//! `coalesce()`, `cb_url()`, dotted paths, `a.b | fn() | fn2()` pipelines)
//! and the same parsing shortcuts (single-split `hmac_sha256`/`join`
//! arguments, no nested-bracket awareness in `join`'s array literal).
//! Malformed input degrades to `Value::Null` / an empty string rather
//! than propagating an error, matching the original's broad
//! `except: pass` handling.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use md5::Md5;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use crate::value::Value;

/// Unreserved characters `urllib.parse.quote` always leaves untouched,
/// even with `safe=""`.
const PY_QUOTE_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

static SECRET_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^secret_ref\(['"]([^'"]+)['"]\)"#).expect("valid regex"));

fn quote(s: &str) -> String {
    utf8_percent_encode(s, PY_QUOTE_SAFE).to_string()
}

fn unquote(s: &str) -> String {
    percent_encoding::percent_decode_str(s)
        .decode_utf8()
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| s.to_owned())
}

fn display(val: &Value) -> Option<String> {
    val.as_display()
}

/// Apply one pipeline stage function to a value. Unknown functions pass
/// the value through unchanged.
fn apply_function(val: Value, f: &str) -> Value {
    let f = f.trim();
    let Some(s) = display(&val) else {
        return val;
    };

    match f {
        "to_upper()" => Value::String(s.to_uppercase()),
        "to_lower()" => Value::String(s.to_lowercase()),
        "url_encode()" => Value::String(quote(&s)),
        "normalize_encode()" => {
            let mut cur = s;
            for _ in 0..16 {
                let decoded = unquote(&cur);
                if decoded == cur {
                    break;
                }
                cur = decoded;
            }
            Value::String(quote(&cur))
        }
        "trim()" => Value::String(s.trim().to_owned()),
        _ if f.starts_with("date_format(") => Value::String(s),
        "hash_md5()" => {
            let digest = Md5::digest(s.as_bytes());
            Value::String(hex::encode(digest))
        }
        "hash_sha256()" => {
            let digest = Sha256::digest(s.as_bytes());
            Value::String(hex::encode(digest))
        }
        _ => Value::String(s),
    }
}

/// Evaluate a single DSL expression against the macro context.
#[must_use]
pub fn eval_expr(expr: &str, ctx: &Value, secrets: &HashMap<String, String>, cb_url: &str) -> Value {
    let expr = expr.trim();

    if let Some(rest) = expr.strip_prefix("const:") {
        return Value::String(rest.to_owned());
    }

    if expr.starts_with("secret_ref(") {
        return match SECRET_REF_RE.captures(expr) {
            Some(caps) => Value::String(secrets.get(&caps[1]).cloned().unwrap_or_default()),
            None => Value::String(String::new()),
        };
    }

    if expr.starts_with("hmac_sha256(") && expr.ends_with(')') {
        let inner = &expr["hmac_sha256(".len()..expr.len() - 1];
        if let Some((sec_expr, msg_expr)) = inner.split_once(',') {
            let sec = eval_expr(sec_expr.trim(), ctx, secrets, cb_url);
            let msg = eval_expr(msg_expr.trim(), ctx, secrets, cb_url);
            if let (Some(sec), Some(msg)) = (display(&sec), display(&msg)) {
                type HmacSha256 = Hmac<Sha256>;
                if let Ok(mut mac) = HmacSha256::new_from_slice(sec.as_bytes()) {
                    mac.update(msg.as_bytes());
                    return Value::String(hex::encode(mac.finalize().into_bytes()));
                }
            }
        }
        return Value::String(String::new());
    }

    if expr.starts_with("join(") && expr.ends_with(')') {
        let inner = &expr["join(".len()..expr.len() - 1];
        if let Some(comma_idx) = inner.find(',') {
            let sep_expr = inner[..comma_idx].trim();
            let arr_expr = inner[comma_idx + 1..].trim();
            let sep = sep_expr.trim_matches(|c| c == '\'' || c == '"');
            if let Some(items_str) = arr_expr.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                let parts: Vec<String> = items_str
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| {
                        let v = eval_expr(item, ctx, secrets, cb_url);
                        display(&v).unwrap_or_default()
                    })
                    .collect();
                return Value::String(parts.join(sep));
            }
        }
        return Value::String(String::new());
    }

    if expr.starts_with("coalesce(") && expr.ends_with(')') {
        let inner = &expr["coalesce(".len()..expr.len() - 1];
        let default_value = inner.trim_matches(|c| c == '\'' || c == '"');
        return Value::String(default_value.to_owned());
    }

    if expr.starts_with("cb_url(") {
        return Value::String(cb_url.to_owned());
    }

    if expr.contains('|') {
        let mut parts = expr.split('|').map(str::trim);
        let first = parts.next().unwrap_or("");
        let mut val = eval_expr(first, ctx, secrets, cb_url);

        for stage in parts {
            if let Some(inner) = stage
                .strip_prefix("coalesce(")
                .and_then(|s| s.strip_suffix(')'))
            {
                let is_empty = match &val {
                    Value::Null => true,
                    Value::String(s) => s.is_empty(),
                    _ => false,
                };
                if is_empty {
                    val = Value::String(inner.trim_matches(|c| c == '\'' || c == '"').to_owned());
                }
            } else {
                val = apply_function(val, stage);
            }
        }

        return val;
    }

    if expr.contains('.') {
        return ctx.get_path(expr);
    }

    Value::String(expr.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Value {
        Value::from_json(serde_json::json!({
            "ad": {"ad_id": "67576"},
            "click": {"id": "clk-1"},
        }))
    }

    #[test]
    fn const_prefix_is_literal() {
        let v = eval_expr("const:hello", &ctx(), &HashMap::new(), "");
        assert_eq!(v, Value::String("hello".into()));
    }

    #[test]
    fn secret_ref_looks_up_key() {
        let mut secrets = HashMap::new();
        secrets.insert("api_key".to_owned(), "topsecret".to_owned());
        let v = eval_expr("secret_ref('api_key')", &ctx(), &secrets, "");
        assert_eq!(v, Value::String("topsecret".into()));
    }

    #[test]
    fn secret_ref_missing_key_is_empty() {
        let v = eval_expr("secret_ref('missing')", &ctx(), &HashMap::new(), "");
        assert_eq!(v, Value::String(String::new()));
    }

    #[test]
    fn dotted_path_reads_context() {
        let v = eval_expr("ad.ad_id", &ctx(), &HashMap::new(), "");
        assert_eq!(v, Value::String("67576".into()));
    }

    #[test]
    fn pipeline_applies_stages_in_order() {
        let v = eval_expr("ad.ad_id | to_upper() | trim()", &ctx(), &HashMap::new(), "");
        assert_eq!(v, Value::String("67576".into()));
    }

    #[test]
    fn pipeline_coalesce_fills_missing_value() {
        let v = eval_expr(
            "click.missing | coalesce('none')",
            &ctx(),
            &HashMap::new(),
            "",
        );
        assert_eq!(v, Value::String("none".into()));
    }

    #[test]
    fn join_concatenates_evaluated_items() {
        let v = eval_expr(
            "join('-', [ad.ad_id, click.id])",
            &ctx(),
            &HashMap::new(),
            "",
        );
        assert_eq!(v, Value::String("67576-clk-1".into()));
    }

    #[test]
    fn hmac_sha256_signs_message_with_secret() {
        let mut secrets = HashMap::new();
        secrets.insert("k".to_owned(), "s3cr3t".to_owned());
        let v = eval_expr(
            "hmac_sha256(secret_ref('k'), const:payload)",
            &ctx(),
            &secrets,
            "",
        );
        let Value::String(hex) = v else {
            panic!("expected string");
        };
        assert_eq!(hex.len(), 64);
    }

    #[test]
    fn cb_url_returns_callback_base() {
        let v = eval_expr("cb_url()", &ctx(), &HashMap::new(), "https://cb.example.com/x");
        assert_eq!(v, Value::String("https://cb.example.com/x".into()));
    }

    #[test]
    fn url_encode_matches_python_unreserved_set() {
        let v = eval_expr("const:a b/c~d-e_f.g", &ctx(), &HashMap::new(), "");
        let encoded = apply_function(v, "url_encode()");
        assert_eq!(encoded, Value::String("a%20b%2Fc~d-e_f.g".into()));
    }

    #[test]
    fn normalize_encode_is_idempotent() {
        let once = quote("hello world/slash");
        let twice = quote(&once);
        let normalized_once = {
            let mut cur = once.clone();
            for _ in 0..16 {
                let decoded = unquote(&cur);
                if decoded == cur {
                    break;
                }
                cur = decoded;
            }
            quote(&cur)
        };
        let normalized_twice = {
            let mut cur = twice;
            for _ in 0..16 {
                let decoded = unquote(&cur);
                if decoded == cur {
                    break;
                }
                cur = decoded;
            }
            quote(&cur)
        };
        assert_eq!(normalized_once, normalized_twice);
    }
}
