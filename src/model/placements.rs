// src/model/placements.rs

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

/// 售卖方式：固定价（FIXED）或竞价（CPM）
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(try_from = "String", into = "String")]
pub enum BuyType {
    #[default]
    Fixed,
    Cpm,
}

impl BuyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuyType::Fixed => "FIXED",
            BuyType::Cpm => "CPM",
        }
    }
}

impl TryFrom<String> for BuyType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_ascii_uppercase().as_str() {
            "FIXED" => Ok(BuyType::Fixed),
            "CPM" => Ok(BuyType::Cpm),
            _ => Err(format!("Invalid value for BuyType: {}", value)),
        }
    }
}

impl From<BuyType> for String {
    fn from(buy_type: BuyType) -> Self {
        buy_type.as_str().to_string()
    }
}

impl fmt::Display for BuyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 广告位渲染类型，决定素材按图片还是视频渲染
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SlotType {
    #[default]
    Banner,
    Video,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdSize {
    pub width: u32,
    pub height: u32,
}

/// 宿主侧的广告位描述
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AdSlot {
    pub ad_space_id: String,
    #[serde(default)]
    pub slot_type: SlotType,
    #[serde(default)]
    pub buy_type: BuyType,
    #[serde(default)]
    pub size: Option<AdSize>,
    #[serde(default)]
    pub is_responsive: bool,
}

impl AdSlot {
    pub fn new(ad_space_id: &str, slot_type: SlotType, buy_type: BuyType) -> Self {
        Self {
            ad_space_id: ad_space_id.to_string(),
            slot_type,
            buy_type,
            size: None,
            is_responsive: false,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some(AdSize { width, height });
        self
    }
}
