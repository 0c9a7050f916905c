// src/error.rs

use thiserror::Error;

/// **SDK 统一错误类型**
///
/// 拉取与素材加载错误会透出给宿主（`AdEvent::FailedToLoad`），
/// 上报类错误只在分发边界记录日志，不向上传播。
#[derive(Debug, Error)]
pub enum AdgeistError {
    #[error("no ad available for ad space {0}")]
    NoAd(String),

    #[error("SDK not initialized")]
    NotInitialized,

    #[error("creative fetch failed: {0}")]
    Fetch(String),

    #[error("tracking delivery failed: {0}")]
    TrackingDelivery(String),

    #[error("media load failed: {0}")]
    MediaLoad(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl AdgeistError {
    /// 与原生桥接层约定的错误码
    pub fn code(&self) -> &'static str {
        match self {
            AdgeistError::NoAd(_) => "NO_AD",
            AdgeistError::NotInitialized => "NOT_INITIALIZED",
            AdgeistError::Fetch(_) | AdgeistError::Http(_) => "FETCH_FAILED",
            AdgeistError::TrackingDelivery(_) => "TRACKING_FAILED",
            AdgeistError::MediaLoad(_) => "MEDIA_LOAD_FAILED",
            AdgeistError::InvalidEvent(_) => "INVALID_EVENT",
            AdgeistError::Config(_) => "CONFIG_ERROR",
            AdgeistError::Serialization(_) => "JSON_ERROR",
            AdgeistError::Io(_) => "IO_ERROR",
            AdgeistError::Url(_) => "INVALID_URL",
        }
    }
}

pub type Result<T> = std::result::Result<T, AdgeistError>;
