// src/component/banner.rs

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::AdgeistError;
use crate::gateway::{AnalyticsGateway, TrackingCall};
use crate::logging::delivery_log::DeliveryRecord;
use crate::model::creative::Creative;
use crate::model::placements::AdSlot;
use crate::session::AdgeistSession;
use crate::utilities::normalize_url;
use crate::viewability::measurer::{BoundingBox, VisibilitySample};
use crate::viewability::tracker::ImpressionTracker;

/// 宿主提供的布局快照；`element` 为 `None` 表示尚未完成布局
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutSnapshot {
    pub element: Option<BoundingBox>,
    pub viewport_height: f64,
}

impl LayoutSnapshot {
    pub fn unmeasured(viewport_height: f64) -> Self {
        Self {
            element: None,
            viewport_height,
        }
    }

    pub fn at(top: f64, height: f64, viewport_height: f64) -> Self {
        Self {
            element: Some(BoundingBox::new(top, height)),
            viewport_height,
        }
    }
}

/// 组件生命周期事件
#[derive(Debug, Clone, PartialEq)]
pub enum AdEvent {
    Loaded(Creative),
    FailedToLoad { code: &'static str, message: String },
    Impressed { render_time_ms: u64 },
    Viewed { view_time_ms: u64, visibility_ratio: f64 },
    Clicked,
    /// 落地页已打开
    Opened { url: String },
    Closed,
    /// 自动播放控制，只在 IMPRESSED 轮询期间发出；
    /// 进入 VIEWED 后不再跟随可见性，播放与暂停交由宿主处理
    PlaybackChanged { paused: bool },
}

#[derive(Debug)]
enum Command {
    MediaLoaded,
    MediaFailed(String),
    Click,
    TogglePlayPause,
    VideoProgress { position: Duration, duration: Duration },
    Refetch,
    Unmount,
}

enum Exit {
    Refetch,
    Unmount,
}

/// **宿主持有的组件句柄**
///
/// 句柄被丢弃等同于卸载。
pub struct BannerHandle {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl BannerHandle {
    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("banner task already stopped");
        }
    }

    /// 图片/视频解码完成
    pub fn media_loaded(&self) {
        self.send(Command::MediaLoaded);
    }

    pub fn media_failed(&self, reason: impl Into<String>) {
        self.send(Command::MediaFailed(reason.into()));
    }

    /// 点击素材或行动按钮
    pub fn click(&self) {
        self.send(Command::Click);
    }

    pub fn toggle_play_pause(&self) {
        self.send(Command::TogglePlayPause);
    }

    pub fn video_progress(&self, position: Duration, duration: Duration) {
        self.send(Command::VideoProgress { position, duration });
    }

    /// 丢弃当前素材并重新拉取
    pub fn refetch(&self) {
        self.send(Command::Refetch);
    }

    /// 卸载组件，等到收尾上报（TOTAL_VIEW、VIDEO_PLAYBACK）投递结束后返回
    pub async fn unmount(self) {
        self.send(Command::Unmount);
        if let Err(e) = self.task.await {
            warn!(error = %e, "banner task ended abnormally");
        }
    }
}

/// **横幅广告组件**
///
/// 每个挂载实例是一个独立的 tokio 任务，独占自己的 `ImpressionTracker`。
/// 宿主输入经 mpsc 通道到达，布局经 watch 通道读取，轮询定时器只在
/// IMPRESSED 阶段存在。上报调用 spawn 出去后不再回写任何状态。
pub struct BannerAd {
    slot: AdSlot,
    session: Arc<AdgeistSession>,
    tracker: ImpressionTracker,
    gateway: Option<Arc<dyn AnalyticsGateway>>,
    layout: watch::Receiver<LayoutSnapshot>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<AdEvent>,
}

async fn next_tick(poll: &mut Option<Interval>) -> Instant {
    match poll {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}

impl BannerAd {
    pub fn mount(
        session: Arc<AdgeistSession>,
        slot: AdSlot,
        layout: watch::Receiver<LayoutSnapshot>,
    ) -> (BannerHandle, mpsc::UnboundedReceiver<AdEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let tracker = ImpressionTracker::new(session.config().tracker.clone(), Instant::now());
        let banner = BannerAd {
            slot,
            session,
            tracker,
            gateway: None,
            layout,
            commands: command_rx,
            events: event_tx,
        };
        let task = tokio::spawn(banner.run());
        (
            BannerHandle {
                commands: command_tx,
                task,
            },
            event_rx,
        )
    }

    async fn run(mut self) {
        info!(ad_space_id = %self.slot.ad_space_id, slot_type = ?self.slot.slot_type, "banner mounted");
        while let Exit::Refetch = self.lifecycle().await {
            debug!(ad_space_id = %self.slot.ad_space_id, "refetching creative");
            // 重新拉取时收尾上报照常后台投递
            self.teardown();
        }
        for delivery in self.teardown() {
            if let Err(e) = delivery.await {
                warn!(error = %e, "teardown delivery task ended abnormally");
            }
        }
        info!(ad_space_id = %self.slot.ad_space_id, "banner unmounted");
    }

    fn emit(&self, event: AdEvent) {
        // 宿主不再监听时直接丢弃
        let _ = self.events.send(event);
    }

    /// 一次完整的“拉取 → 展示”周期
    async fn lifecycle(&mut self) -> Exit {
        self.tracker.begin_fetch(Instant::now());
        self.gateway = None;

        let gateway = match self.session.gateway() {
            Ok(gateway) => gateway,
            Err(e) => {
                self.fail_fetch(e);
                return self.event_loop().await;
            }
        };

        let request = self.session.creative_request(&self.slot);
        let response = {
            let fetch = gateway.fetch_creative(&request);
            tokio::pin!(fetch);
            loop {
                tokio::select! {
                    result = &mut fetch => break result,
                    command = self.commands.recv() => match command {
                        None | Some(Command::Unmount) => {
                            debug!(ad_space_id = %self.slot.ad_space_id, "unmounted during fetch, response discarded");
                            return Exit::Unmount;
                        }
                        Some(Command::Refetch) => return Exit::Refetch,
                        Some(other) => debug!(command = ?other, "ignored while fetching"),
                    }
                }
            }
        };

        let is_test = self.session.config().is_test_environment;
        let loaded = response.and_then(|r| {
            Creative::from_response(&r, &self.slot, is_test)
                .ok_or_else(|| AdgeistError::NoAd(self.slot.ad_space_id.clone()))
        });
        match loaded {
            Ok((creative, context)) => {
                info!(
                    ad_space_id = %context.ad_space_id,
                    campaign_id = %context.campaign_id,
                    kind = ?creative.kind,
                    "creative loaded"
                );
                self.gateway = Some(gateway);
                self.tracker.creative_loaded(creative.clone(), context);
                self.emit(AdEvent::Loaded(creative));
            }
            Err(e) => self.fail_fetch(e),
        }
        self.event_loop().await
    }

    fn fail_fetch(&mut self, error: AdgeistError) {
        warn!(ad_space_id = %self.slot.ad_space_id, code = error.code(), error = %error, "ad load failed");
        self.tracker.fetch_failed();
        self.emit(AdEvent::FailedToLoad {
            code: error.code(),
            message: error.to_string(),
        });
    }

    async fn event_loop(&mut self) -> Exit {
        let mut poll: Option<Interval> = None;
        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        None | Some(Command::Unmount) => return Exit::Unmount,
                        Some(Command::Refetch) => return Exit::Refetch,
                        Some(command) => self.handle(command),
                    }
                }
                _ = next_tick(&mut poll) => self.tick(),
            }

            if self.tracker.is_polling() {
                if poll.is_none() {
                    poll = Some(self.poll_timer());
                }
            } else if poll.take().is_some() {
                debug!(phase = ?self.tracker.phase(), "visibility polling stopped");
            }
        }
    }

    fn poll_timer(&self) -> Interval {
        let period = self.session.config().tracker.poll_interval();
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::MediaLoaded => {
                if let Some(call) = self.tracker.media_ready(Instant::now()) {
                    if let TrackingCall::Impression { render_time_ms } = call {
                        self.emit(AdEvent::Impressed { render_time_ms });
                    }
                    self.dispatch(call);
                }
            }
            Command::MediaFailed(reason) => {
                if self.tracker.media_failed() {
                    let error = AdgeistError::MediaLoad(reason);
                    warn!(ad_space_id = %self.slot.ad_space_id, error = %error, "media load failed");
                    self.emit(AdEvent::FailedToLoad {
                        code: error.code(),
                        message: error.to_string(),
                    });
                }
            }
            Command::Click => match self.tracker.click() {
                Some(call) => {
                    self.dispatch(call);
                    self.emit(AdEvent::Clicked);
                    let cta = self
                        .tracker
                        .creative()
                        .and_then(|c| c.cta_url.as_deref())
                        .map(normalize_url)
                        .filter(|url| !url.is_empty());
                    if let Some(url) = cta {
                        self.emit(AdEvent::Opened { url });
                    }
                }
                None => debug!("click ignored, no creative loaded"),
            },
            Command::TogglePlayPause => {
                if let Some(paused) = self.tracker.toggle_play_pause() {
                    self.emit(AdEvent::PlaybackChanged { paused });
                }
            }
            Command::VideoProgress { position, duration } => {
                for call in self.tracker.video_progress(position, duration) {
                    self.dispatch(call);
                }
            }
            Command::Refetch | Command::Unmount => {}
        }
    }

    fn tick(&mut self) {
        let snapshot = *self.layout.borrow();
        // 尚未布局时跳过本次采样
        let Some(element) = snapshot.element else {
            return;
        };
        let sample = VisibilitySample::new(element, snapshot.viewport_height, Instant::now());
        let outcome = self.tracker.on_tick(sample);
        if let Some(paused) = outcome.playback {
            self.emit(AdEvent::PlaybackChanged { paused });
        }
        for call in outcome.calls {
            if let TrackingCall::View {
                view_time_ms,
                visibility_ratio,
                ..
            } = call
            {
                self.emit(AdEvent::Viewed {
                    view_time_ms,
                    visibility_ratio,
                });
            }
            self.dispatch(call);
        }
    }

    /// 卸载或重新拉取前的收尾上报，返回各投递任务的句柄
    fn teardown(&mut self) -> Vec<JoinHandle<()>> {
        let had_creative = self.tracker.creative().is_some();
        let deliveries = self
            .tracker
            .teardown()
            .into_iter()
            .filter_map(|call| self.dispatch(call))
            .collect();
        if had_creative {
            self.emit(AdEvent::Closed);
        }
        deliveries
    }

    /// 上报只发不等：失败仅记录日志，不重试也不回退状态
    fn dispatch(&self, call: TrackingCall) -> Option<JoinHandle<()>> {
        let (Some(gateway), Some(ctx)) = (self.gateway.clone(), self.tracker.context().cloned()) else {
            return None;
        };
        let ledger = self.session.delivery_log();
        Some(tokio::spawn(async move {
            let start = std::time::Instant::now();
            let result = call.send(gateway.as_ref(), &ctx).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(()) => debug!(event_type = call.event_type(), campaign_id = %ctx.campaign_id, elapsed_ms, "tracking delivered"),
                Err(e) => warn!(event_type = call.event_type(), campaign_id = %ctx.campaign_id, error = %e, "tracking delivery failed"),
            }
            if let Some(ledger) = ledger {
                let outcome = result.map_err(|e| e.to_string());
                ledger.log(&DeliveryRecord::new(&call, &ctx, outcome, elapsed_ms)).await;
            }
        }))
    }
}
