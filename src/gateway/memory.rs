// src/gateway/memory.rs

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::time::{sleep, Duration};
use tracing::info;

use crate::error::{AdgeistError, Result};
use crate::gateway::{AnalyticsGateway, CreativeRequest, TrackingCall};
use crate::model::context::TrackingContext;
use crate::model::event::Event;
use crate::model::response::AdResponse;
use crate::viewability::state::Quartile;

/// 一次上报尝试（无论投递成功与否都会记录）
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub call: TrackingCall,
    pub context: TrackingContext,
}

/// **进程内网关**：离线演示模式使用，按广告位返回预置素材并记录全部上报
#[derive(Default)]
pub struct InMemoryGateway {
    inventory: Mutex<HashMap<String, AdResponse>>,
    calls: Mutex<Vec<RecordedCall>>,
    events: Mutex<Vec<Event>>,
    fail_tracking: AtomicBool,
    fetch_delay: Duration,
    tracking_delay: Duration,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_creative(self, ad_space_id: &str, response: AdResponse) -> Self {
        self.set_creative(ad_space_id, response);
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// 每次上报在记录前等待的时长，模拟慢速投递
    pub fn with_tracking_delay(mut self, delay: Duration) -> Self {
        self.tracking_delay = delay;
        self
    }

    pub fn set_creative(&self, ad_space_id: &str, response: AdResponse) {
        guard(&self.inventory).insert(ad_space_id.to_string(), response);
    }

    /// 之后的上报全部返回投递失败
    pub fn fail_tracking(&self, fail: bool) {
        self.fail_tracking.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        guard(&self.calls).clone()
    }

    pub fn count(&self, event_type: &str) -> usize {
        guard(&self.calls)
            .iter()
            .filter(|c| c.call.event_type() == event_type)
            .count()
    }

    pub fn events(&self) -> Vec<Event> {
        guard(&self.events).clone()
    }

    async fn record(&self, call: TrackingCall, ctx: &TrackingContext) -> Result<()> {
        if !self.tracking_delay.is_zero() {
            sleep(self.tracking_delay).await;
        }
        info!(event_type = call.event_type(), campaign_id = %ctx.campaign_id, "tracking call received");
        guard(&self.calls).push(RecordedCall {
            call,
            context: ctx.clone(),
        });
        if self.fail_tracking.load(Ordering::SeqCst) {
            return Err(AdgeistError::TrackingDelivery("in-memory gateway rejecting tracking".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AnalyticsGateway for InMemoryGateway {
    async fn fetch_creative(&self, request: &CreativeRequest) -> Result<AdResponse> {
        if !self.fetch_delay.is_zero() {
            sleep(self.fetch_delay).await;
        }
        guard(&self.inventory)
            .get(&request.ad_space_id)
            .cloned()
            .ok_or_else(|| AdgeistError::NoAd(request.ad_space_id.clone()))
    }

    async fn track_impression(&self, ctx: &TrackingContext, render_time_ms: u64) -> Result<()> {
        self.record(TrackingCall::Impression { render_time_ms }, ctx).await
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
        self.record(call, ctx).await
    }

    async fn track_total_view(&self, ctx: &TrackingContext, total_view_time_ms: u64, visibility_ratio: f64) -> Result<()> {
        let call = TrackingCall::TotalView {
            total_view_time_ms,
            visibility_ratio,
        };
        self.record(call, ctx).await
    }

    async fn track_click(&self, ctx: &TrackingContext) -> Result<()> {
        self.record(TrackingCall::Click, ctx).await
    }

    async fn track_video_playback(&self, ctx: &TrackingContext, total_playback_time_ms: u64) -> Result<()> {
        self.record(TrackingCall::VideoPlayback { total_playback_time_ms }, ctx).await
    }

    async fn track_video_quartile(&self, ctx: &TrackingContext, quartile: Quartile) -> Result<()> {
        self.record(TrackingCall::VideoQuartile(quartile), ctx).await
    }

    async fn log_event(&self, event: &Event) -> Result<()> {
        guard(&self.events).push(event.clone());
        Ok(())
    }
}
