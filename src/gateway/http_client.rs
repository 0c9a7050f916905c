// src/gateway/http_client.rs

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::config::config_manager::SdkConfig;
use crate::error::{AdgeistError, Result};
use crate::gateway::{AnalyticsGateway, CreativeRequest, TrackingCall, TrackingPayload};
use crate::model::context::TrackingContext;
use crate::model::event::Event;
use crate::model::response::AdResponse;
use crate::viewability::state::Quartile;

pub const CREATIVE_PATH: &str = "/v1/creative";
pub const TRACK_PATH: &str = "/v1/track";
pub const EVENTS_PATH: &str = "/v1/events";

/// **基于 HTTP 的广告投放服务客户端**
pub struct HttpGateway {
    client: Client,
    base_url: String,
    api_key: String,
    origin: String,
    request_timeout: Duration,
}

impl HttpGateway {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.backend_base_url(),
            api_key: config.api_key.clone(),
            origin: config.package_or_bundle_id.clone(),
            request_timeout: config.request_timeout(),
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let start = Instant::now();
        let request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("origin", &self.origin)
            .json(body)
            .send();
        let response = match timeout(self.request_timeout, request).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(AdgeistError::Fetch(format!(
                    "request to {} timed out after {}ms",
                    url,
                    self.request_timeout.as_millis()
                )))
            }
        };
        debug!(url = %url, status = %response.status(), elapsed_ms = start.elapsed().as_millis() as u64, "backend call");
        Ok(response)
    }

    async fn track(&self, call: TrackingCall, ctx: &TrackingContext) -> Result<()> {
        let payload = TrackingPayload::new(&call, ctx);
        let response = self
            .post(TRACK_PATH, &payload)
            .await
            .map_err(|e| AdgeistError::TrackingDelivery(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AdgeistError::TrackingDelivery(format!(
                "{} rejected with status {}",
                call.event_type(),
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AnalyticsGateway for HttpGateway {
    async fn fetch_creative(&self, request: &CreativeRequest) -> Result<AdResponse> {
        let response = self.post(CREATIVE_PATH, request).await?;
        match response.status() {
            StatusCode::OK => {
                let body = response.json::<Value>().await?;
                // 返回体结构不符同样视为拉取失败
                AdResponse::decode(request.buy_type, body).map_err(|e| AdgeistError::Fetch(e.to_string()))
            }
            // 204 表示无广告可填充
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Err(AdgeistError::NoAd(request.ad_space_id.clone())),
            status => Err(AdgeistError::Fetch(format!("unexpected status {}", status))),
        }
    }

    async fn track_impression(&self, ctx: &TrackingContext, render_time_ms: u64) -> Result<()> {
        self.track(TrackingCall::Impression { render_time_ms }, ctx).await
    }

    async fn track_view(
        &self,
        ctx: &TrackingContext,
        view_time_ms: u64,
        visibility_ratio: f64,
        scroll_depth: f64,
        time_to_visible_ms: u64,
    ) -> Result<()> {
        let call = TrackingCall::View {
            view_time_ms,
            visibility_ratio,
            scroll_depth,
            time_to_visible_ms,
        };
        self.track(call, ctx).await
    }

    async fn track_total_view(&self, ctx: &TrackingContext, total_view_time_ms: u64, visibility_ratio: f64) -> Result<()> {
        let call = TrackingCall::TotalView {
            total_view_time_ms,
            visibility_ratio,
        };
        self.track(call, ctx).await
    }

    async fn track_click(&self, ctx: &TrackingContext) -> Result<()> {
        self.track(TrackingCall::Click, ctx).await
    }

    async fn track_video_playback(&self, ctx: &TrackingContext, total_playback_time_ms: u64) -> Result<()> {
        self.track(TrackingCall::VideoPlayback { total_playback_time_ms }, ctx).await
    }

    async fn track_video_quartile(&self, ctx: &TrackingContext, quartile: Quartile) -> Result<()> {
        self.track(TrackingCall::VideoQuartile(quartile), ctx).await
    }

    async fn log_event(&self, event: &Event) -> Result<()> {
        let response = self.post(EVENTS_PATH, event).await?;
        if !response.status().is_success() {
            return Err(AdgeistError::TrackingDelivery(format!(
                "event {} rejected with status {}",
                event.event_type,
                response.status()
            )));
        }
        Ok(())
    }
}
