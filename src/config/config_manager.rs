// src/config/config_manager.rs

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AdgeistError, Result};

pub const DEFAULT_BACKEND_DOMAIN: &str = "beta.v2.bg-services.adgeist.ai";

/// 可见性追踪参数
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfig {
    pub poll_interval_ms: u64,
    /// 达到该占比才计入观看
    pub visible_ratio: f64,
    pub static_view_threshold_ms: u64,
    pub video_view_threshold_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            visible_ratio: 0.5,
            static_view_threshold_ms: 1000,
            video_view_threshold_ms: 2000,
        }
    }
}

impl TrackerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn view_threshold(&self, is_video: bool) -> Duration {
        if is_video {
            Duration::from_millis(self.video_view_threshold_ms)
        } else {
            Duration::from_millis(self.static_view_threshold_ms)
        }
    }
}

/// **SDK 会话配置**
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SdkConfig {
    pub bid_request_backend_domain: String,
    pub package_or_bundle_id: String,
    /// 即 publisher id
    pub adgeist_app_id: String,
    pub api_key: String,
    pub is_test_environment: bool,
    pub request_timeout_ms: u64,
    pub tracker: TrackerConfig,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            bid_request_backend_domain: DEFAULT_BACKEND_DOMAIN.to_string(),
            package_or_bundle_id: String::new(),
            adgeist_app_id: String::new(),
            api_key: String::new(),
            is_test_environment: false,
            request_timeout_ms: 5000,
            tracker: TrackerConfig::default(),
        }
    }
}

impl SdkConfig {
    /// 后端地址：带协议的域名原样使用，否则补 https
    pub fn backend_base_url(&self) -> String {
        let domain = self.bid_request_backend_domain.trim_end_matches('/');
        if domain.contains("://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bid_request_backend_domain.trim().is_empty() {
            return Err(AdgeistError::Config("backend domain must not be empty".into()));
        }
        let ratio = self.tracker.visible_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(AdgeistError::Config(format!("visible ratio {} out of (0, 1]", ratio)));
        }
        Ok(())
    }
}

pub trait ConfigAdapter: Send + Sync {
    fn load(&self) -> Result<SdkConfig>;
}

/// 从 JSON 文件读取配置；文件不存在时使用默认值
pub struct FileConfigAdapter {
    pub path: PathBuf,
}

impl FileConfigAdapter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl ConfigAdapter for FileConfigAdapter {
    fn load(&self) -> Result<SdkConfig> {
        if !self.path.exists() {
            return Ok(SdkConfig::default());
        }
        let content = fs::read_to_string(&self.path)?;
        let config: SdkConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}
