// src/gateway/mod.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::context::TrackingContext;
use crate::model::event::Event;
use crate::model::placements::BuyType;
use crate::model::response::AdResponse;
use crate::viewability::state::Quartile;

pub mod bridge;
pub mod http_client;
pub mod legacy;
pub mod memory;

/// 素材拉取请求
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreativeRequest {
    pub ad_space_id: String,
    pub publisher_id: String,
    pub buy_type: BuyType,
    pub is_test: bool,
}

/// **广告投放服务（原生 SDK）暴露给追踪器的能力**
///
/// 所有调用都是异步的，可能各自独立失败。
#[async_trait]
pub trait AnalyticsGateway: Send + Sync {
    async fn fetch_creative(&self, request: &CreativeRequest) -> Result<AdResponse>;

    async fn track_impression(&self, ctx: &TrackingContext, render_time_ms: u64) -> Result<()>;

    async fn track_view(
        &self,
        ctx: &TrackingContext,
        view_time_ms: u64,
        visibility_ratio: f64,
        scroll_depth: f64,
        time_to_visible_ms: u64,
    ) -> Result<()>;

    async fn track_total_view(&self, ctx: &TrackingContext, total_view_time_ms: u64, visibility_ratio: f64) -> Result<()>;

    async fn track_click(&self, ctx: &TrackingContext) -> Result<()>;

    async fn track_video_playback(&self, ctx: &TrackingContext, total_playback_time_ms: u64) -> Result<()>;

    async fn track_video_quartile(&self, ctx: &TrackingContext, quartile: Quartile) -> Result<()>;

    /// CDP 自定义事件，默认不处理
    async fn log_event(&self, _event: &Event) -> Result<()> {
        Ok(())
    }
}

/// 状态机产出的一次上报调用
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingCall {
    Impression {
        render_time_ms: u64,
    },
    View {
        view_time_ms: u64,
        visibility_ratio: f64,
        scroll_depth: f64,
        time_to_visible_ms: u64,
    },
    TotalView {
        total_view_time_ms: u64,
        visibility_ratio: f64,
    },
    Click,
    VideoPlayback {
        total_playback_time_ms: u64,
    },
    VideoQuartile(Quartile),
}

impl TrackingCall {
    pub fn event_type(&self) -> &'static str {
        match self {
            TrackingCall::Impression { .. } => "IMPRESSION",
            TrackingCall::View { .. } => "VIEW",
            TrackingCall::TotalView { .. } => "TOTAL_VIEW",
            TrackingCall::Click => "CLICK",
            TrackingCall::VideoPlayback { .. } => "VIDEO_PLAYBACK",
            TrackingCall::VideoQuartile(_) => "VIDEO_QUARTILE",
        }
    }

    /// 把调用路由到网关对应的方法
    pub async fn send(&self, gateway: &dyn AnalyticsGateway, ctx: &TrackingContext) -> Result<()> {
        match *self {
            TrackingCall::Impression { render_time_ms } => gateway.track_impression(ctx, render_time_ms).await,
            TrackingCall::View {
                view_time_ms,
                visibility_ratio,
                scroll_depth,
                time_to_visible_ms,
            } => {
                gateway
                    .track_view(ctx, view_time_ms, visibility_ratio, scroll_depth, time_to_visible_ms)
                    .await
            }
            TrackingCall::TotalView {
                total_view_time_ms,
                visibility_ratio,
            } => gateway.track_total_view(ctx, total_view_time_ms, visibility_ratio).await,
            TrackingCall::Click => gateway.track_click(ctx).await,
            TrackingCall::VideoPlayback { total_playback_time_ms } => {
                gateway.track_video_playback(ctx, total_playback_time_ms).await
            }
            TrackingCall::VideoQuartile(quartile) => gateway.track_video_quartile(ctx, quartile).await,
        }
    }
}

/// 上报请求的指标部分，只序列化有值的字段
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scroll_depth: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_visible: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_view_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_playback_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quartile: Option<Quartile>,
}

/// **上报请求体**（HTTP 网关与 mock 服务共用）
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackingPayload {
    pub event_type: String,
    pub campaign_id: String,
    pub ad_space_id: String,
    pub bid_id: String,
    pub bid_meta: String,
    pub buy_type: BuyType,
    pub is_test: bool,
    #[serde(default)]
    pub metrics: TrackingMetrics,
}

impl TrackingPayload {
    pub fn new(call: &TrackingCall, ctx: &TrackingContext) -> Self {
        let mut metrics = TrackingMetrics::default();
        match *call {
            TrackingCall::Impression { render_time_ms } => metrics.render_time = Some(render_time_ms),
            TrackingCall::View {
                view_time_ms,
                visibility_ratio,
                scroll_depth,
                time_to_visible_ms,
            } => {
                metrics.view_time = Some(view_time_ms);
                metrics.visibility_ratio = Some(visibility_ratio);
                metrics.scroll_depth = Some(scroll_depth);
                metrics.time_to_visible = Some(time_to_visible_ms);
            }
            TrackingCall::TotalView {
                total_view_time_ms,
                visibility_ratio,
            } => {
                metrics.total_view_time = Some(total_view_time_ms);
                metrics.visibility_ratio = Some(visibility_ratio);
            }
            TrackingCall::Click => {}
            TrackingCall::VideoPlayback { total_playback_time_ms } => {
                metrics.total_playback_time = Some(total_playback_time_ms)
            }
            TrackingCall::VideoQuartile(quartile) => metrics.quartile = Some(quartile),
        }
        Self {
            event_type: call.event_type().to_string(),
            campaign_id: ctx.campaign_id.clone(),
            ad_space_id: ctx.ad_space_id.clone(),
            bid_id: ctx.bid_id.clone(),
            bid_meta: ctx.bid_meta.clone(),
            buy_type: ctx.buy_type,
            is_test: ctx.is_test_environment,
            metrics,
        }
    }
}
