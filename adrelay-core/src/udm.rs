//! The Unified Data Model (UDM): the canonical in-memory event shape used
//! across the core. Hot fields are typed; the long tail of custom,
//! downstream-specific fields lives in `meta.ext`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event classification. Only `click` and `imp` are valid on inbound
/// track requests; `event.name` is only ever populated on callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Click,
    Imp,
}

impl EventType {
    /// Parse from the `event_type` query parameter, per spec.md §4.8.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "click" => Some(Self::Click),
            "imp" => Some(Self::Imp),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Imp => "imp",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<EventType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Click {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Downstream id that originated the click.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ad {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Device {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idfa: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oaid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imei: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_sha256: Option<String>,
}

/// Transport-layer fields. Per spec.md §3, these are **never** inferred
/// from request headers -- only from explicit `ip`/`ua` query parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Net {
    #[serde(default, skip_serializing_if = "str::is_empty")]
    pub ip: String,
    #[serde(default, skip_serializing_if = "str::is_empty")]
    pub ua: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Time {
    /// Milliseconds since epoch. Server-filled when absent on track.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_event_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days: Option<i64>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub ext: Map<String, Value>,
}

/// The Unified Data Model passed across the core: a nested structured
/// record with a fixed set of hot fields plus a string-keyed `ext` side
/// channel for the long tail (see spec.md §9's re-architecture note).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Udm {
    #[serde(default)]
    pub event: Event,
    #[serde(default)]
    pub click: Click,
    #[serde(default)]
    pub ad: Ad,
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub net: Net,
    #[serde(default)]
    pub time: Time,
    #[serde(default)]
    pub meta: Meta,
}

impl Udm {
    /// Convert to a `serde_json::Value` tree for expression-evaluator
    /// context access (dotted-path walks) and for persistence in
    /// `upload_params`/`callback_params`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_parse() {
        assert_eq!(EventType::parse("click"), Some(EventType::Click));
        assert_eq!(EventType::parse("imp"), Some(EventType::Imp));
        assert_eq!(EventType::parse("bogus"), None);
    }

    #[test]
    fn to_json_roundtrip_hot_fields() {
        let mut udm = Udm::default();
        udm.ad.ad_id = Some("67576".into());
        udm.net.ip = "1.2.3.4".into();
        let json = udm.to_json();
        assert_eq!(json["ad"]["ad_id"], "67576");
        assert_eq!(json["net"]["ip"], "1.2.3.4");
    }

    #[test]
    fn empty_net_is_empty_string_not_null() {
        let udm = Udm::default();
        let json = udm.to_json();
        assert_eq!(json["net"]["ip"], "");
        assert_eq!(json["net"]["ua"], "");
    }
}
