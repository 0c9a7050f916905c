// src/viewability/tracker.rs

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::config_manager::TrackerConfig;
use crate::gateway::TrackingCall;
use crate::model::context::TrackingContext;
use crate::model::creative::Creative;
use crate::viewability::measurer::VisibilitySample;
use crate::viewability::state::{PlaybackState, Quartile, TrackerPhase, TrackingState};

/// 单次轮询的输出
#[derive(Debug, Default, PartialEq)]
pub struct TickOutcome {
    pub calls: Vec<TrackingCall>,
    /// 视频播放状态发生变化时为 `Some(paused)`
    pub playback: Option<bool>,
}

/// **曝光追踪状态机**
///
/// 纯同步逻辑：输入可见性采样与素材信号，输出需要上报的调用。
/// 上报调用在返回前就已置位对应标记，因此每个阶段至多上报一次，
/// 与投递结果无关。
#[derive(Debug)]
pub struct ImpressionTracker {
    config: TrackerConfig,
    phase: TrackerPhase,
    state: TrackingState,
    playback: PlaybackState,
    creative: Option<Creative>,
    context: Option<TrackingContext>,
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}

impl ImpressionTracker {
    pub fn new(config: TrackerConfig, now: Instant) -> Self {
        Self {
            config,
            phase: TrackerPhase::Idle,
            state: TrackingState::new(now),
            playback: PlaybackState::default(),
            creative: None,
            context: None,
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        self.phase
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    pub fn playback(&self) -> &PlaybackState {
        &self.playback
    }

    pub fn creative(&self) -> Option<&Creative> {
        self.creative.as_ref()
    }

    pub fn context(&self) -> Option<&TrackingContext> {
        self.context.as_ref()
    }

    /// 仅在 IMPRESSED 阶段需要轮询
    pub fn is_polling(&self) -> bool {
        self.phase == TrackerPhase::Impressed
    }

    fn is_video(&self) -> bool {
        self.creative.as_ref().is_some_and(|c| c.kind.is_video())
    }

    /// 开始新一轮拉取：所有标记与累计值全部重置
    pub fn begin_fetch(&mut self, now: Instant) {
        self.state = TrackingState::new(now);
        self.playback = PlaybackState::default();
        self.creative = None;
        self.context = None;
        self.phase = TrackerPhase::Fetching;
    }

    pub fn creative_loaded(&mut self, creative: Creative, context: TrackingContext) -> bool {
        if self.phase != TrackerPhase::Fetching {
            return false;
        }
        self.creative = Some(creative);
        self.context = Some(context);
        self.phase = TrackerPhase::Loaded;
        true
    }

    pub fn fetch_failed(&mut self) {
        if self.phase == TrackerPhase::Fetching {
            self.phase = TrackerPhase::Failed;
        }
    }

    /// **素材解码完成**：LOADED → IMPRESSED，生成曝光上报并开始计时
    pub fn media_ready(&mut self, now: Instant) -> Option<TrackingCall> {
        if self.phase != TrackerPhase::Loaded || self.state.has_impression {
            return None;
        }
        self.state.has_impression = true;
        self.state.last_check = Some(now);
        self.phase = TrackerPhase::Impressed;
        let render_time_ms = millis(now.saturating_duration_since(self.state.render_start));
        debug!(render_time_ms, "creative impressed");
        Some(TrackingCall::Impression { render_time_ms })
    }

    /// 素材加载失败，进入终态；返回是否发生了状态迁移
    pub fn media_failed(&mut self) -> bool {
        match self.phase {
            TrackerPhase::Loaded | TrackerPhase::Impressed => {
                self.phase = TrackerPhase::Failed;
                true
            }
            _ => false,
        }
    }

    /// **处理一次轮询采样**
    pub fn on_tick(&mut self, sample: VisibilitySample) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        if self.phase != TrackerPhase::Impressed {
            return outcome;
        }

        let now = sample.at;
        let ratio = sample.ratio();
        self.state.current_visibility_ratio = ratio;

        let delta = self
            .state
            .last_check
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(Duration::ZERO);
        self.state.last_check = Some(now);

        let visible = ratio >= self.config.visible_ratio;
        if visible && self.state.time_to_visible.is_none() {
            self.state.time_to_visible = Some(now.saturating_duration_since(self.state.render_start));
        }
        // 离开视口不回退已累计的时长
        if visible {
            self.state.view_time_accumulated += delta;
        }

        if self.is_video() {
            if visible && self.playback.paused && !self.playback.manually_controlled {
                self.playback.paused = false;
                outcome.playback = Some(false);
            } else if !visible && !self.playback.paused {
                self.playback.paused = true;
                self.playback.manually_controlled = false;
                outcome.playback = Some(true);
            }
        }

        let threshold = self.config.view_threshold(self.is_video());
        if visible && !self.state.has_view && self.state.view_time_accumulated >= threshold {
            if let Some(time_to_visible) = self.state.time_to_visible {
                self.state.has_view = true;
                self.phase = TrackerPhase::Viewed;
                outcome.calls.push(TrackingCall::View {
                    view_time_ms: self.state.view_time_ms(),
                    visibility_ratio: ratio,
                    scroll_depth: 0.0,
                    time_to_visible_ms: millis(time_to_visible),
                });
            }
        }
        outcome
    }

    /// 点击与曝光状态无关，只要求素材已加载
    pub fn click(&self) -> Option<TrackingCall> {
        if self.phase.has_creative() && self.context.is_some() {
            Some(TrackingCall::Click)
        } else {
            None
        }
    }

    /// 用户手动切换播放/暂停，返回新的 paused 状态
    pub fn toggle_play_pause(&mut self) -> Option<bool> {
        if !self.is_video() || !self.phase.has_creative() {
            return None;
        }
        self.playback.manually_controlled = true;
        self.playback.paused = !self.playback.paused;
        Some(self.playback.paused)
    }

    /// **视频播放进度**：累计播放时长并生成四分位上报
    pub fn video_progress(&mut self, position: Duration, duration: Duration) -> Vec<TrackingCall> {
        let mut calls = Vec::new();
        if !self.is_video() || !self.state.has_impression || self.phase == TrackerPhase::Failed {
            return calls;
        }

        // 位置回退视为循环播放重新开始
        let wrapped = matches!(self.playback.last_position, Some(last) if position < last);
        match self.playback.last_position {
            Some(last) if position >= last => self.playback.playback_time += position - last,
            Some(last) => {
                self.playback.playback_time += duration.saturating_sub(last) + position;
            }
            None => self.playback.playback_time += position,
        }
        self.playback.last_position = Some(position);

        if duration.is_zero() {
            return calls;
        }
        let reached = if wrapped {
            1.0
        } else {
            position.as_secs_f64() / duration.as_secs_f64()
        };
        for quartile in Quartile::ALL {
            if reached >= quartile.fraction() && !self.playback.quartile_sent(quartile) {
                self.playback.mark_quartile(quartile);
                calls.push(TrackingCall::VideoQuartile(quartile));
            }
        }
        calls
    }

    /// **卸载或重新拉取前的收尾**：已曝光时补发总观看时长与视频播放时长
    pub fn teardown(&mut self) -> Vec<TrackingCall> {
        let mut calls = Vec::new();
        // 素材加载失败后该实例不再产生任何上报
        let failed = self.phase == TrackerPhase::Failed;
        if self.state.has_impression && self.context.is_some() && !failed {
            if !self.state.total_view_sent && !self.state.view_time_accumulated.is_zero() {
                self.state.total_view_sent = true;
                calls.push(TrackingCall::TotalView {
                    total_view_time_ms: self.state.view_time_ms(),
                    visibility_ratio: self.state.current_visibility_ratio,
                });
            }
            if self.is_video() && !self.playback.playback_sent && !self.playback.playback_time.is_zero() {
                self.playback.playback_sent = true;
                calls.push(TrackingCall::VideoPlayback {
                    total_playback_time_ms: millis(self.playback.playback_time),
                });
            }
        }
        self.phase = TrackerPhase::Idle;
        calls
    }
}
