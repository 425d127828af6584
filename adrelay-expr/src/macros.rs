//! Downstream callback-URL macro substitution: `__NAME__` placeholders
//! and the inbound event-name cleaner. Grounded on
//! `original_source/app/routers/callback.py`'s `_normalize_event_name`
//! (the separator-stripping clean step only, per spec.md §4.7 steps 5
//! and 7 -- the original additionally collapses into four hardcoded
//! categories, which spec.md's `event_name_map`-driven redesign replaces),
//! `build_macro_map`, and `apply_macros`.

use std::sync::LazyLock;

use regex::Regex;

static MACRO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__([A-Za-z0-9_]+)__").expect("valid regex"));

static SEPARATORS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-_\s]+").expect("valid regex"));

/// Plain clean: lowercase and strip `-_\s` separators, nothing else.
/// This is spec.md §4.7's normalization, used for whitelist matching and
/// `event_name_map` key reconciliation so two differently-styled aliases
/// of the same event (`"Custom-Event"`, `"custom_event"`) compare equal.
#[must_use]
pub fn clean_event_name(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    SEPARATORS_RE
        .replace_all(raw.trim().to_lowercase().as_str(), "")
        .into_owned()
}

/// Common macro aliases exposed to a downstream callback template, built
/// from the normalized `Udm`'s hot fields.
#[must_use]
pub fn build_macro_map(udm: &adrelay_core::Udm) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::new();
    let event_name = udm.event.name.clone().unwrap_or_default();
    for key in ["EVENT", "EVENT_TYPE", "EVENTTYPE", "EVT", "TYPE"] {
        map.insert(key.to_owned(), event_name.clone());
    }
    let click_id = udm.click.id.clone().unwrap_or_default();
    for key in ["CLICK_ID", "CLICKID", "CLID", "CLKID"] {
        map.insert(key.to_owned(), click_id.clone());
    }
    let amount = udm.meta.amount.map_or(String::new(), |a| a.to_string());
    for key in ["AMOUNT", "PRICE", "VALUE"] {
        map.insert(key.to_owned(), amount.clone());
    }
    let days = udm.meta.days.map_or(String::new(), |d| d.to_string());
    for key in ["DAYS", "RETENTION", "RETAIN_DAYS"] {
        map.insert(key.to_owned(), days.clone());
    }
    map
}

/// Replace every `__NAME__` placeholder in `tmpl` with its mapped value
/// (case-insensitively matched against uppercased keys). Unmatched
/// placeholders resolve to an empty string rather than being left in
/// place, so a partially-configured template never leaks a dirty URL.
#[must_use]
pub fn apply_macros(tmpl: &str, mapping: &std::collections::HashMap<String, String>) -> String {
    MACRO_RE
        .replace_all(tmpl, |caps: &regex::Captures| {
            let key = caps[1].to_uppercase();
            mapping.get(&key).cloned().unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_event_name_strips_separators_and_case() {
        assert_eq!(clean_event_name("Custom-Event"), clean_event_name("custom_event"));
        assert_eq!(clean_event_name("Custom-Event"), "customevent");
    }

    #[test]
    fn clean_event_name_empty_stays_empty() {
        assert_eq!(clean_event_name(""), "");
    }

    #[test]
    fn apply_macros_substitutes_and_blanks_unmatched() {
        let mut mapping = std::collections::HashMap::new();
        mapping.insert("CLICK_ID".to_owned(), "clk-1".to_owned());
        let out = apply_macros(
            "https://ds.example.com/cb?cid=__CLICK_ID__&unknown=__MISSING__",
            &mapping,
        );
        assert_eq!(out, "https://ds.example.com/cb?cid=clk-1&unknown=");
    }
}
