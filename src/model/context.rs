// src/model/context.rs

use serde::{Deserialize, Serialize};

use crate::model::placements::BuyType;

/// 单个素材实例的上报上下文，素材拉取成功时创建，之后只读
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingContext {
    pub campaign_id: String,
    pub ad_space_id: String,
    pub bid_id: String,
    /// 固定价响应携带的元数据，CPM 为空串
    pub bid_meta: String,
    pub buy_type: BuyType,
    pub is_test_environment: bool,
}
