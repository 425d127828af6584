//! `{{macro}}` URL template rendering and recursive body-template
//! evaluation, grounded on
//! `original_source/app/mapping_dsl.py::render_template` and
//! `eval_body_template`.

use std::collections::HashMap;

use crate::eval::eval_expr;
use crate::value::Value;

/// Render a URL template, replacing each `{{name}}` placeholder with the
/// stringified result of evaluating `macros[name]`. Unevaluated-to-null
/// macros become an empty string, never the literal `null`.
#[must_use]
pub fn render_template(
    url_tmpl: &str,
    macros: &HashMap<String, String>,
    ctx: &Value,
    secrets: &HashMap<String, String>,
    cb_url: &str,
) -> String {
    if url_tmpl.is_empty() {
        return String::new();
    }

    let mut result = url_tmpl.to_owned();
    for (name, expr) in macros {
        let value = eval_expr(expr, ctx, secrets, cb_url);
        let placeholder = format!("{{{{{name}}}}}");
        let rendered = value.as_display().unwrap_or_default();
        result = result.replace(&placeholder, &rendered);
    }
    result
}

/// Recursively evaluate every string leaf of a JSON-shaped body template
/// as a DSL expression, leaving object/array structure intact.
#[must_use]
pub fn eval_body_template(
    body: &Value,
    ctx: &Value,
    secrets: &HashMap<String, String>,
    cb_url: &str,
) -> Value {
    match body {
        Value::Map(m) => Value::Map(
            m.iter()
                .map(|(k, v)| (k.clone(), eval_body_template(v, ctx, secrets, cb_url)))
                .collect(),
        ),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|v| eval_body_template(v, ctx, secrets, cb_url))
                .collect(),
        ),
        Value::String(s) => eval_expr(s, ctx, secrets, cb_url),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_template_substitutes_macros() {
        let ctx = Value::from_json(serde_json::json!({"ad": {"ad_id": "67576"}}));
        let mut macros = HashMap::new();
        macros.insert("AID".to_owned(), "ad.ad_id".to_owned());
        let url = render_template(
            "https://up.example.com/click?aid={{AID}}",
            &macros,
            &ctx,
            &HashMap::new(),
            "",
        );
        assert_eq!(url, "https://up.example.com/click?aid=67576");
    }

    #[test]
    fn render_template_missing_macro_value_is_empty_not_null() {
        let ctx = Value::from_json(serde_json::json!({}));
        let mut macros = HashMap::new();
        macros.insert("AID".to_owned(), "ad.ad_id".to_owned());
        let url = render_template("aid={{AID}}", &macros, &ctx, &HashMap::new(), "");
        assert_eq!(url, "aid=");
    }

    #[test]
    fn eval_body_template_preserves_structure() {
        let ctx = Value::from_json(serde_json::json!({"ad": {"ad_id": "67576"}}));
        let body = Value::from_json(serde_json::json!({
            "aid": "ad.ad_id",
            "nested": {"tag": "const:fixed"},
            "list": ["const:a", "const:b"],
        }));
        let out = eval_body_template(&body, &ctx, &HashMap::new(), "");
        let Value::Map(m) = out else { panic!("expected map") };
        assert_eq!(m["aid"], Value::String("67576".into()));
    }
}
