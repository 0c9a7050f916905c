// src/model/response.rs

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::Result;
use crate::model::placements::BuyType;

/// 编码结果中的 schema 版本号，消费方据此判断字段集合
pub const RESPONSE_SCHEMA_VERSION: u32 = 1;

/// **固定价（FIXED）投放的广告响应**
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FixedAdResponse {
    pub id: String,
    #[serde(default)]
    pub meta_data: String,
    pub is_test: Option<bool>,
    pub expires_at: Option<String>,
    pub generated_at: Option<String>,
    pub signature: Option<String>,
    pub campaign_id: Option<String>,
    pub advertiser: Option<Advertiser>,
    #[serde(rename = "type")]
    pub response_type: Option<String>,
    pub load_type: Option<String>,
    pub campaign_validity: Option<CampaignValidity>,
    #[serde(default)]
    pub creatives: Vec<FixedCreative>,
    #[serde(default, rename = "creativesV1")]
    pub creatives_v1: Vec<CreativeV1>,
    pub display_options: Option<DisplayOptions>,
    pub frontend_cache_duration_seconds: Option<u32>,
    pub impression_requirements: Option<ImpressionRequirements>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Advertiser {
    pub id: Option<String>,
    pub name: Option<String>,
    pub logo_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CampaignValidity {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FixedCreative {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cta_url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub file_url: Option<String>,
    pub thumbnail_url: Option<String>,
    #[serde(rename = "type")]
    pub creative_type: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
    pub file_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreativeV1 {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cta_url: Option<String>,
    pub primary: Option<MediaItem>,
    pub companions: Option<Vec<MediaItem>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DisplayOptions {
    pub is_responsive: Option<bool>,
    pub responsive_type: Option<String>,
    pub dimensions: Option<Dimensions>,
    pub allowed_formats: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct Dimensions {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImpressionRequirements {
    pub impression_type: Option<Vec<String>>,
    pub min_view_duration_seconds: Option<u32>,
}

/// **竞价（CPM）投放的广告响应**
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CpmAdResponse {
    pub id: String,
    #[serde(default)]
    pub bid_id: String,
    #[serde(default)]
    pub cur: String,
    #[serde(default)]
    pub seat_bid: Vec<SeatBid>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeatBid {
    #[serde(default)]
    pub bid_id: String,
    #[serde(default)]
    pub bid: Vec<Bid>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: String,
    #[serde(default)]
    pub imp_id: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub ext: BidExtension,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BidExtension {
    #[serde(default)]
    pub creative_url: String,
    #[serde(default)]
    pub cta_url: String,
    #[serde(default)]
    pub creative_title: String,
    #[serde(default)]
    pub creative_description: String,
    pub creative_brand_name: Option<String>,
}

/// 广告响应的带标签变体，取代基于反射的字典转换
#[derive(Debug, Clone, PartialEq)]
pub enum AdResponse {
    Fixed(FixedAdResponse),
    Cpm(CpmAdResponse),
}

impl AdResponse {
    /// 按请求时的售卖方式解析服务端返回体
    pub fn decode(buy_type: BuyType, body: Value) -> Result<Self> {
        Ok(match buy_type {
            BuyType::Fixed => AdResponse::Fixed(serde_json::from_value(body)?),
            BuyType::Cpm => AdResponse::Cpm(serde_json::from_value(body)?),
        })
    }

    pub fn buy_type(&self) -> BuyType {
        match self {
            AdResponse::Fixed(_) => BuyType::Fixed,
            AdResponse::Cpm(_) => BuyType::Cpm,
        }
    }

    /// 编码为弱类型的 JSON 字典，交给桥接层消费
    pub fn encode(&self) -> Value {
        let data = match self {
            AdResponse::Fixed(fixed) => fixed.encode(),
            AdResponse::Cpm(cpm) => cpm.encode(),
        };
        json!({
            "schemaVersion": RESPONSE_SCHEMA_VERSION,
            "buyType": self.buy_type().as_str(),
            "data": data,
        })
    }

    /// 服务端返回体原样重建（用于 mock 服务与测试）
    pub fn to_wire(&self) -> Result<Value> {
        Ok(match self {
            AdResponse::Fixed(fixed) => serde_json::to_value(fixed)?,
            AdResponse::Cpm(cpm) => serde_json::to_value(cpm)?,
        })
    }
}

fn put_opt<T: Into<Value>>(map: &mut Map<String, Value>, key: &str, value: Option<T>) {
    if let Some(v) = value {
        map.insert(key.to_string(), v.into());
    }
}

fn encode_media_item(item: &MediaItem) -> Value {
    json!({
        "type": item.media_type,
        "fileName": item.file_name,
        "fileSize": item.file_size.unwrap_or(0),
        "fileUrl": item.file_url,
        "thumbnailUrl": item.thumbnail_url,
    })
}

impl FixedAdResponse {
    pub fn encode(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".into(), json!(self.id));
        map.insert("metaData".into(), json!(self.meta_data));
        put_opt(&mut map, "isTest", self.is_test);
        put_opt(&mut map, "expiresAt", self.expires_at.clone());
        put_opt(&mut map, "generatedAt", self.generated_at.clone());
        put_opt(&mut map, "signature", self.signature.clone());
        put_opt(&mut map, "campaignId", self.campaign_id.clone());
        put_opt(&mut map, "type", self.response_type.clone());
        put_opt(&mut map, "loadType", self.load_type.clone());
        put_opt(&mut map, "frontendCacheDurationSeconds", self.frontend_cache_duration_seconds);

        if let Some(adv) = &self.advertiser {
            map.insert(
                "advertiser".into(),
                json!({ "id": adv.id, "name": adv.name, "logoUrl": adv.logo_url }),
            );
        }
        if let Some(cv) = &self.campaign_validity {
            map.insert(
                "campaignValidity".into(),
                json!({ "startTime": cv.start_time, "endTime": cv.end_time }),
            );
        }

        let creatives: Vec<Value> = self
            .creatives
            .iter()
            .map(|c| {
                json!({
                    "title": c.title,
                    "description": c.description,
                    "ctaUrl": c.cta_url,
                    "fileName": c.file_name,
                    "fileSize": c.file_size.unwrap_or(0),
                    "fileUrl": c.file_url,
                    "thumbnailUrl": c.thumbnail_url,
                    "type": c.creative_type,
                })
            })
            .collect();
        map.insert("creatives".into(), Value::Array(creatives));

        let creatives_v1: Vec<Value> = self
            .creatives_v1
            .iter()
            .map(|c| {
                let mut cv1 = Map::new();
                cv1.insert("title".into(), json!(c.title));
                cv1.insert("description".into(), json!(c.description));
                cv1.insert("ctaUrl".into(), json!(c.cta_url));
                if let Some(primary) = &c.primary {
                    cv1.insert("primary".into(), encode_media_item(primary));
                }
                if let Some(companions) = &c.companions {
                    cv1.insert(
                        "companions".into(),
                        Value::Array(companions.iter().map(encode_media_item).collect()),
                    );
                }
                Value::Object(cv1)
            })
            .collect();
        map.insert("creativesV1".into(), Value::Array(creatives_v1));

        if let Some(opt) = &self.display_options {
            let mut op = Map::new();
            op.insert("isResponsive".into(), json!(opt.is_responsive.unwrap_or(false)));
            op.insert("responsiveType".into(), json!(opt.responsive_type));
            if let Some(dim) = opt.dimensions {
                op.insert(
                    "dimensions".into(),
                    json!({ "width": dim.width.unwrap_or(0), "height": dim.height.unwrap_or(0) }),
                );
            }
            put_opt(&mut op, "allowedFormats", opt.allowed_formats.clone());
            map.insert("displayOptions".into(), Value::Object(op));
        }

        if let Some(ir) = &self.impression_requirements {
            let mut req = Map::new();
            put_opt(&mut req, "impressionType", ir.impression_type.clone());
            req.insert(
                "minViewDurationSeconds".into(),
                json!(ir.min_view_duration_seconds.unwrap_or(0)),
            );
            map.insert("impressionRequirements".into(), Value::Object(req));
        }

        Value::Object(map)
    }
}

impl CpmAdResponse {
    pub fn encode(&self) -> Value {
        let seat_bid: Vec<Value> = self
            .seat_bid
            .iter()
            .map(|seat| {
                let bids: Vec<Value> = seat
                    .bid
                    .iter()
                    .map(|bid| {
                        let mut ext = Map::new();
                        ext.insert("creativeUrl".into(), json!(bid.ext.creative_url));
                        ext.insert("ctaUrl".into(), json!(bid.ext.cta_url));
                        ext.insert("creativeTitle".into(), json!(bid.ext.creative_title));
                        ext.insert("creativeDescription".into(), json!(bid.ext.creative_description));
                        put_opt(&mut ext, "creativeBrandName", bid.ext.creative_brand_name.clone());
                        json!({
                            "id": bid.id,
                            "impId": bid.imp_id,
                            "price": bid.price,
                            "ext": Value::Object(ext),
                        })
                    })
                    .collect();
                json!({ "bidId": seat.bid_id, "bid": bids })
            })
            .collect();

        json!({
            "id": self.id,
            "bidId": self.bid_id,
            "cur": self.cur,
            "seatBid": seat_bid,
        })
    }
}
