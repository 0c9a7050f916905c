// src/model/creative.rs

use serde::{Deserialize, Serialize};

use crate::model::context::TrackingContext;
use crate::model::placements::{AdSlot, SlotType};
use crate::model::response::AdResponse;

/// 素材类型
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CreativeKind {
    Image,
    Video,
    Banner,
    Companion,
}

impl CreativeKind {
    /// 视频广告位一律按视频处理，其余以素材声明的类型为准
    pub fn resolve(slot_type: SlotType, declared: Option<&str>) -> Self {
        if slot_type == SlotType::Video {
            return CreativeKind::Video;
        }
        match declared.map(|d| d.to_ascii_lowercase()) {
            Some(d) if d.starts_with("video") => CreativeKind::Video,
            Some(d) if d.starts_with("image") => CreativeKind::Image,
            Some(d) if d == "companion" => CreativeKind::Companion,
            _ => CreativeKind::Banner,
        }
    }

    pub fn is_video(&self) -> bool {
        matches!(self, CreativeKind::Video)
    }
}

/// **已拉取的广告素材**（拉取后不可变，重新拉取时整体替换）
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Creative {
    pub bid_id: String,
    pub campaign_id: String,
    pub media_url: String,
    pub cta_url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub brand_name: Option<String>,
    pub kind: CreativeKind,
}

impl Creative {
    /// 从广告响应中取出首个素材及其上报上下文。
    /// 缺少 bid id、campaign id 或素材地址时返回 `None`。
    pub fn from_response(
        response: &AdResponse,
        slot: &AdSlot,
        is_test_environment: bool,
    ) -> Option<(Creative, TrackingContext)> {
        let (creative, bid_meta) = match response {
            AdResponse::Fixed(fixed) => {
                let first = fixed.creatives.first()?;
                let creative = Creative {
                    bid_id: fixed.id.clone(),
                    campaign_id: fixed.campaign_id.clone()?,
                    media_url: first.file_url.clone()?,
                    cta_url: first.cta_url.clone(),
                    title: first.title.clone(),
                    description: first.description.clone(),
                    brand_name: fixed.advertiser.as_ref().and_then(|a| a.name.clone()),
                    kind: CreativeKind::resolve(slot.slot_type, first.creative_type.as_deref()),
                };
                (creative, fixed.meta_data.clone())
            }
            AdResponse::Cpm(cpm) => {
                let bid = cpm.seat_bid.first()?.bid.first()?;
                let creative = Creative {
                    bid_id: cpm.id.clone(),
                    campaign_id: bid.id.clone(),
                    media_url: bid.ext.creative_url.clone(),
                    cta_url: Some(bid.ext.cta_url.clone()).filter(|u| !u.is_empty()),
                    title: Some(bid.ext.creative_title.clone()),
                    description: Some(bid.ext.creative_description.clone()),
                    brand_name: bid.ext.creative_brand_name.clone(),
                    kind: CreativeKind::resolve(slot.slot_type, None),
                };
                (creative, String::new())
            }
        };

        if creative.bid_id.is_empty() || creative.campaign_id.is_empty() || creative.media_url.is_empty() {
            return None;
        }

        let context = TrackingContext {
            campaign_id: creative.campaign_id.clone(),
            ad_space_id: slot.ad_space_id.clone(),
            bid_id: creative.bid_id.clone(),
            bid_meta,
            buy_type: response.buy_type(),
            is_test_environment,
        };
        Some((creative, context))
    }
}
