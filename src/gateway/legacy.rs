// src/gateway/legacy.rs

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{AdgeistError, Result};
use crate::gateway::{CreativeRequest, TrackingCall};
use crate::model::context::TrackingContext;
use crate::model::placements::BuyType;
use crate::session::AdgeistSession;

/// 旧接口只认识的三种事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyEventType {
    Impression,
    View,
    Click,
}

impl TryFrom<&str> for LegacyEventType {
    type Error = AdgeistError;

    fn try_from(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "IMPRESSION" => Ok(LegacyEventType::Impression),
            "VIEW" => Ok(LegacyEventType::View),
            "CLICK" => Ok(LegacyEventType::Click),
            _ => Err(AdgeistError::InvalidEvent(format!("unsupported legacy event type: {}", value))),
        }
    }
}

impl fmt::Display for LegacyEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LegacyEventType::Impression => "IMPRESSION",
            LegacyEventType::View => "VIEW",
            LegacyEventType::Click => "CLICK",
        };
        f.write_str(name)
    }
}

impl LegacyEventType {
    /// 旧接口不带指标，对应调用的指标一律为零
    fn into_call(self) -> TrackingCall {
        match self {
            LegacyEventType::Impression => TrackingCall::Impression { render_time_ms: 0 },
            LegacyEventType::View => TrackingCall::View {
                view_time_ms: 0,
                visibility_ratio: 0.0,
                scroll_depth: 0.0,
                time_to_visible_ms: 0,
            },
            LegacyEventType::Click => TrackingCall::Click,
        }
    }
}

/// **旧调用约定的桥接层**：按广告位与发布者拉取，按事件名上报
pub struct LegacyBridge {
    session: Arc<AdgeistSession>,
}

impl LegacyBridge {
    pub fn new(session: Arc<AdgeistSession>) -> Self {
        Self { session }
    }

    /// 旧接口只支持固定价投放
    pub async fn fetch_creative(&self, ad_space_id: &str, publisher_id: &str) -> Result<Value> {
        let gateway = self.session.gateway()?;
        let request = CreativeRequest {
            ad_space_id: ad_space_id.to_string(),
            publisher_id: publisher_id.to_string(),
            buy_type: BuyType::Fixed,
            is_test: self.session.config().is_test_environment,
        };
        Ok(gateway.fetch_creative(&request).await?.encode())
    }

    pub async fn send_creative_analytic(
        &self,
        campaign_id: &str,
        ad_space_id: &str,
        publisher_id: &str,
        event_type: &str,
    ) -> Result<String> {
        let event_type = LegacyEventType::try_from(event_type)?;
        let gateway = self.session.gateway()?;
        let ctx = TrackingContext {
            campaign_id: campaign_id.to_string(),
            ad_space_id: ad_space_id.to_string(),
            bid_id: String::new(),
            bid_meta: String::new(),
            buy_type: BuyType::Fixed,
            is_test_environment: self.session.config().is_test_environment,
        };
        debug!(%event_type, campaign_id, publisher_id, "legacy analytic");
        event_type.into_call().send(gateway.as_ref(), &ctx).await?;
        Ok(format!("{} event sent", event_type))
    }
}
