// src/gateway/bridge.rs

use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AdgeistError, Result};
use crate::gateway::{CreativeRequest, TrackingCall};
use crate::model::context::TrackingContext;
use crate::model::placements::BuyType;
use crate::session::AdgeistSession;
use crate::viewability::state::Quartile;

fn parse_buy_type(buy_type: &str) -> Result<BuyType> {
    BuyType::try_from(buy_type.to_string()).map_err(AdgeistError::InvalidEvent)
}

fn millis(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}

/// **当前调用约定的桥接层**
///
/// 宿主以扁平参数调用，拉取返回带版本号的编码字典，上报返回确认字符串。
/// 所有操作都路由到会话持有的同一个 `AnalyticsGateway`。
pub struct ModuleBridge {
    session: Arc<AdgeistSession>,
}

impl ModuleBridge {
    pub fn new(session: Arc<AdgeistSession>) -> Self {
        Self { session }
    }

    pub async fn fetch_creative(&self, ad_space_id: &str, buy_type: &str, is_test: bool) -> Result<Value> {
        let gateway = self.session.gateway()?;
        let request = CreativeRequest {
            ad_space_id: ad_space_id.to_string(),
            publisher_id: self.session.config().adgeist_app_id.clone(),
            buy_type: parse_buy_type(buy_type)?,
            is_test,
        };
        let response = gateway.fetch_creative(&request).await?;
        Ok(response.encode())
    }

    async fn send(&self, call: TrackingCall, ctx: TrackingContext, ack: &'static str) -> Result<String> {
        let gateway = self.session.gateway()?;
        debug!(event_type = call.event_type(), campaign_id = %ctx.campaign_id, "bridge tracking call");
        call.send(gateway.as_ref(), &ctx).await?;
        Ok(ack.to_string())
    }

    fn context(
        campaign_id: &str,
        ad_space_id: &str,
        bid_id: &str,
        bid_meta: &str,
        buy_type: &str,
        is_test: bool,
    ) -> Result<TrackingContext> {
        Ok(TrackingContext {
            campaign_id: campaign_id.to_string(),
            ad_space_id: ad_space_id.to_string(),
            bid_id: bid_id.to_string(),
            bid_meta: bid_meta.to_string(),
            buy_type: parse_buy_type(buy_type)?,
            is_test_environment: is_test,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn track_impression(
        &self,
        campaign_id: &str,
        ad_space_id: &str,
        bid_id: &str,
        bid_meta: &str,
        buy_type: &str,
        is_test: bool,
        render_time: f64,
    ) -> Result<String> {
        let ctx = Self::context(campaign_id, ad_space_id, bid_id, bid_meta, buy_type, is_test)?;
        let call = TrackingCall::Impression {
            render_time_ms: millis(render_time),
        };
        self.send(call, ctx, "Impression event sent").await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn track_view(
        &self,
        campaign_id: &str,
        ad_space_id: &str,
        bid_id: &str,
        bid_meta: &str,
        buy_type: &str,
        is_test: bool,
        view_time: f64,
        visibility_ratio: f64,
        scroll_depth: f64,
        time_to_visible: f64,
    ) -> Result<String> {
        let ctx = Self::context(campaign_id, ad_space_id, bid_id, bid_meta, buy_type, is_test)?;
        let call = TrackingCall::View {
            view_time_ms: millis(view_time),
            visibility_ratio,
            scroll_depth,
            time_to_visible_ms: millis(time_to_visible),
        };
        self.send(call, ctx, "View event sent").await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn track_total_view(
        &self,
        campaign_id: &str,
        ad_space_id: &str,
        bid_id: &str,
        bid_meta: &str,
        buy_type: &str,
        is_test: bool,
        total_view_time: f64,
        visibility_ratio: f64,
    ) -> Result<String> {
        let ctx = Self::context(campaign_id, ad_space_id, bid_id, bid_meta, buy_type, is_test)?;
        let call = TrackingCall::TotalView {
            total_view_time_ms: millis(total_view_time),
            visibility_ratio,
        };
        self.send(call, ctx, "Total view event sent").await
    }

    pub async fn track_click(
        &self,
        campaign_id: &str,
        ad_space_id: &str,
        bid_id: &str,
        bid_meta: &str,
        buy_type: &str,
        is_test: bool,
    ) -> Result<String> {
        let ctx = Self::context(campaign_id, ad_space_id, bid_id, bid_meta, buy_type, is_test)?;
        self.send(TrackingCall::Click, ctx, "Click event sent").await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn track_video_playback(
        &self,
        campaign_id: &str,
        ad_space_id: &str,
        bid_id: &str,
        bid_meta: &str,
        buy_type: &str,
        is_test: bool,
        total_playback_time: f64,
    ) -> Result<String> {
        let ctx = Self::context(campaign_id, ad_space_id, bid_id, bid_meta, buy_type, is_test)?;
        let call = TrackingCall::VideoPlayback {
            total_playback_time_ms: millis(total_playback_time),
        };
        self.send(call, ctx, "Video playback event sent").await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn track_video_quartile(
        &self,
        campaign_id: &str,
        ad_space_id: &str,
        bid_id: &str,
        bid_meta: &str,
        buy_type: &str,
        is_test: bool,
        quartile: &str,
    ) -> Result<String> {
        let ctx = Self::context(campaign_id, ad_space_id, bid_id, bid_meta, buy_type, is_test)?;
        let quartile = Quartile::parse(quartile)
            .ok_or_else(|| AdgeistError::InvalidEvent(format!("unknown video quartile: {}", quartile)))?;
        self.send(TrackingCall::VideoQuartile(quartile), ctx, "Video quartile event sent").await
    }
}
