// src/logging/delivery_log.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::oneshot;
use tokio::task;
use tokio::time::{self, Duration};
use tracing::warn;
use tracing_appender::rolling;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::MakeWriter;

use crate::gateway::TrackingCall;
use crate::model::context::TrackingContext;

/// **上报投递记录**
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeliveryRecord {
    pub timestamp: String,      // 记录时间（RFC 3339）
    pub event_type: String,     // IMPRESSION / VIEW / CLICK ...
    pub campaign_id: String,
    pub ad_space_id: String,
    pub bid_id: String,
    pub status: String,         // "success" or "failure"
    pub error: Option<String>,  // 失败原因
    pub elapsed_ms: u64,        // 投递耗时
}

impl DeliveryRecord {
    pub fn new(call: &TrackingCall, ctx: &TrackingContext, outcome: Result<(), String>, elapsed_ms: u64) -> Self {
        let (status, error) = match outcome {
            Ok(()) => ("success", None),
            Err(e) => ("failure", Some(e)),
        };
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event_type: call.event_type().to_string(),
            campaign_id: ctx.campaign_id.clone(),
            ad_space_id: ctx.ad_space_id.clone(),
            bid_id: ctx.bid_id.clone(),
            status: status.to_string(),
            error,
            elapsed_ms,
        }
    }
}

enum LogMessage {
    Record(String),
    Shutdown(oneshot::Sender<()>),
}

/// **投递台账**
///
/// 记录经 mpsc 通道送到后台任务，按条数或定时批量写入按小时滚动的 JSON 文件。
pub struct DeliveryLogger {
    sender: Sender<LogMessage>,
}

impl DeliveryLogger {
    /// - `log_dir`: 日志目录
    /// - `buffer_size`: mpsc 通道缓冲区大小
    /// - `batch_size`: 攒够多少条立即落盘
    /// - `flush_interval`: 定时落盘间隔（毫秒）
    pub fn new(log_dir: &str, buffer_size: usize, batch_size: usize, flush_interval: u64) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        let appender = Arc::new(rolling::hourly(log_dir, "tracking_delivery.json"));
        tokio::spawn(Self::background_log_writer(appender, receiver, batch_size.max(1), flush_interval));
        Arc::new(Self { sender })
    }

    pub async fn log(&self, record: &DeliveryRecord) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode delivery record");
                return;
            }
        };
        if let Err(e) = self.sender.send(LogMessage::Record(line)).await {
            warn!(error = %e, "delivery log writer is gone");
        }
    }

    async fn background_log_writer(
        appender: Arc<RollingFileAppender>,
        mut receiver: Receiver<LogMessage>,
        batch_size: usize,
        flush_interval: u64,
    ) {
        let mut buffer: Vec<String> = Vec::new();
        let mut interval = time::interval(Duration::from_millis(flush_interval.max(1)));
        loop {
            tokio::select! {
                message = receiver.recv() => match message {
                    Some(LogMessage::Record(line)) => {
                        buffer.push(line);
                        if buffer.len() >= batch_size {
                            Self::write_logs_to_disk(appender.clone(), &mut buffer).await;
                        }
                    }
                    Some(LogMessage::Shutdown(done)) => {
                        Self::write_logs_to_disk(appender.clone(), &mut buffer).await;
                        let _ = done.send(());
                        return;
                    }
                    None => {
                        Self::write_logs_to_disk(appender.clone(), &mut buffer).await;
                        return;
                    }
                },
                _ = interval.tick() => {
                    Self::write_logs_to_disk(appender.clone(), &mut buffer).await;
                }
            }
        }
    }

    async fn write_logs_to_disk(appender: Arc<RollingFileAppender>, buffer: &mut Vec<String>) {
        if buffer.is_empty() {
            return;
        }
        let content = buffer.join("\n") + "\n";
        buffer.clear();
        let result = task::spawn_blocking(move || {
            let mut writer = appender.make_writer();
            writer.write_all(content.as_bytes())
        })
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to write delivery log"),
            Err(e) => warn!(error = %e, "delivery log writer task panicked"),
        }
    }

    /// 落盘剩余记录并停止后台任务
    pub async fn shutdown(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(LogMessage::Shutdown(done)).await.is_ok() {
            let _ = wait.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::placements::BuyType;

    fn ctx() -> TrackingContext {
        TrackingContext {
            campaign_id: "camp-1".into(),
            ad_space_id: "space-1".into(),
            bid_id: "bid-1".into(),
            bid_meta: String::new(),
            buy_type: BuyType::Fixed,
            is_test_environment: false,
        }
    }

    #[test]
    fn record_reflects_outcome() {
        let ok = DeliveryRecord::new(&TrackingCall::Click, &ctx(), Ok(()), 12);
        assert_eq!(ok.status, "success");
        assert!(ok.error.is_none());

        let failed = DeliveryRecord::new(&TrackingCall::Impression { render_time_ms: 5 }, &ctx(), Err("timeout".into()), 30);
        assert_eq!(failed.event_type, "IMPRESSION");
        assert_eq!(failed.status, "failure");
        assert_eq!(failed.error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn shutdown_flushes_records_to_disk() {
        let dir = std::env::temp_dir().join(format!("adgeist-delivery-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let logger = DeliveryLogger::new(dir.to_str().unwrap(), 16, 100, 60_000);
        logger
            .log(&DeliveryRecord::new(&TrackingCall::Click, &ctx(), Ok(()), 3))
            .await;
        logger.shutdown().await;

        let mut written = String::new();
        for entry in std::fs::read_dir(&dir).unwrap() {
            written.push_str(&std::fs::read_to_string(entry.unwrap().path()).unwrap());
        }
        assert!(written.contains("\"event_type\":\"CLICK\""));
        std::fs::remove_dir_all(&dir).ok();
    }
}
