// src/model/event.rs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 用户授权状态
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsentStatus {
    Accepted,
    #[default]
    Denied,
}

impl From<bool> for ConsentStatus {
    fn from(consent: bool) -> Self {
        if consent {
            ConsentStatus::Accepted
        } else {
            ConsentStatus::Denied
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// 自定义事件（CDP 上报）
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub event_properties: Map<String, Value>,
}

impl Event {
    pub fn new(event_type: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            event_properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.event_properties.insert(key.to_string(), value.into());
        self
    }
}

/// 深链接中携带的 UTM 参数
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct UtmParameters {
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
}

impl UtmParameters {
    pub fn is_empty(&self) -> bool {
        self.utm_source.is_none()
            && self.utm_medium.is_none()
            && self.utm_campaign.is_none()
            && self.utm_term.is_none()
            && self.utm_content.is_none()
    }
}
