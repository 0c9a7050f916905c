// src/viewability/state.rs

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// 单个素材实例的上报阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    Idle,
    Fetching,
    Loaded,
    Impressed,
    Viewed,
    /// 拉取或素材加载失败，终态
    Failed,
}

impl TrackerPhase {
    pub fn has_creative(&self) -> bool {
        matches!(self, TrackerPhase::Loaded | TrackerPhase::Impressed | TrackerPhase::Viewed)
    }
}

/// **曝光/可见性统计状态**
///
/// `has_impression` 至多置位一次，且先于 `has_view`；
/// `time_to_visible` 至多记录一次；`view_time_accumulated` 只增不减。
#[derive(Debug, Clone)]
pub struct TrackingState {
    pub has_impression: bool,
    pub has_view: bool,
    pub view_time_accumulated: Duration,
    pub time_to_visible: Option<Duration>,
    pub render_start: Instant,
    pub current_visibility_ratio: f64,
    /// 上一次轮询的时间点，轮询开始时初始化
    pub last_check: Option<Instant>,
    pub total_view_sent: bool,
}

impl TrackingState {
    pub fn new(render_start: Instant) -> Self {
        Self {
            has_impression: false,
            has_view: false,
            view_time_accumulated: Duration::ZERO,
            time_to_visible: None,
            render_start,
            current_visibility_ratio: 0.0,
            last_check: None,
            total_view_sent: false,
        }
    }

    pub fn view_time_ms(&self) -> u64 {
        self.view_time_accumulated.as_millis() as u64
    }

    pub fn time_to_visible_ms(&self) -> Option<u64> {
        self.time_to_visible.map(|d| d.as_millis() as u64)
    }
}

/// 视频四分位
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quartile {
    FirstQuartile,
    Midpoint,
    ThirdQuartile,
    Complete,
}

impl Quartile {
    pub const ALL: [Quartile; 4] = [
        Quartile::FirstQuartile,
        Quartile::Midpoint,
        Quartile::ThirdQuartile,
        Quartile::Complete,
    ];

    pub fn fraction(&self) -> f64 {
        match self {
            Quartile::FirstQuartile => 0.25,
            Quartile::Midpoint => 0.5,
            Quartile::ThirdQuartile => 0.75,
            Quartile::Complete => 1.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Quartile::FirstQuartile => "FIRST_QUARTILE",
            Quartile::Midpoint => "MIDPOINT",
            Quartile::ThirdQuartile => "THIRD_QUARTILE",
            Quartile::Complete => "COMPLETE",
        }
    }

    /// 按上报名解析，大小写不敏感
    pub fn parse(name: &str) -> Option<Quartile> {
        Quartile::ALL
            .into_iter()
            .find(|q| q.as_str().eq_ignore_ascii_case(name.trim()))
    }

    fn bit(&self) -> u8 {
        1 << (*self as u8)
    }
}

/// 视频播放控制与播放进度统计
#[derive(Debug, Clone)]
pub struct PlaybackState {
    pub paused: bool,
    pub manually_controlled: bool,
    pub playback_time: Duration,
    pub last_position: Option<Duration>,
    quartiles_sent: u8,
    pub playback_sent: bool,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            paused: true,
            manually_controlled: false,
            playback_time: Duration::ZERO,
            last_position: None,
            quartiles_sent: 0,
            playback_sent: false,
        }
    }
}

impl PlaybackState {
    pub fn quartile_sent(&self, quartile: Quartile) -> bool {
        self.quartiles_sent & quartile.bit() != 0
    }

    pub fn mark_quartile(&mut self, quartile: Quartile) {
        self.quartiles_sent |= quartile.bit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quartile_flags_are_independent() {
        let mut playback = PlaybackState::default();
        playback.mark_quartile(Quartile::Midpoint);
        assert!(playback.quartile_sent(Quartile::Midpoint));
        assert!(!playback.quartile_sent(Quartile::FirstQuartile));
        assert!(!playback.quartile_sent(Quartile::Complete));
    }

    #[test]
    fn quartile_wire_names() {
        assert_eq!(serde_json::to_string(&Quartile::ThirdQuartile).unwrap(), "\"THIRD_QUARTILE\"");
        assert_eq!(Quartile::FirstQuartile.as_str(), "FIRST_QUARTILE");
        assert_eq!(Quartile::parse("midpoint"), Some(Quartile::Midpoint));
        assert_eq!(Quartile::parse("HALF"), None);
    }
}
