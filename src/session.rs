// src/session.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};
use url::Url;

use crate::config::config_manager::SdkConfig;
use crate::error::{AdgeistError, Result};
use crate::gateway::{AnalyticsGateway, CreativeRequest};
use crate::logging::delivery_log::DeliveryLogger;
use crate::model::event::{ConsentStatus, Event, UserDetails, UtmParameters};
use crate::model::placements::AdSlot;

pub const UTM_EVENT_TYPE: &str = "UTM_CONVERSION";

/// **SDK 会话**
///
/// 进程内所有广告组件共享的配置与网关，由宿主显式创建并注入到每个组件。
/// `destroy` 之后新发起的拉取会以 `NOT_INITIALIZED` 失败。
pub struct AdgeistSession {
    config: SdkConfig,
    gateway: Arc<dyn AnalyticsGateway>,
    delivery_log: Option<Arc<DeliveryLogger>>,
    initialized: AtomicBool,
    consent: AtomicBool,
    user_details: RwLock<Option<UserDetails>>,
    last_utm: RwLock<Option<UtmParameters>>,
}

impl AdgeistSession {
    pub fn initialize(config: SdkConfig, gateway: Arc<dyn AnalyticsGateway>) -> Result<Arc<Self>> {
        Self::initialize_with_ledger(config, gateway, None)
    }

    /// 附带上报投递台账
    pub fn initialize_with_ledger(
        config: SdkConfig,
        gateway: Arc<dyn AnalyticsGateway>,
        delivery_log: Option<Arc<DeliveryLogger>>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        info!(
            domain = %config.bid_request_backend_domain,
            app_id = %config.adgeist_app_id,
            test = config.is_test_environment,
            "SDK initialized"
        );
        Ok(Arc::new(Self {
            config,
            gateway,
            delivery_log,
            initialized: AtomicBool::new(true),
            consent: AtomicBool::new(false),
            user_details: RwLock::new(None),
            last_utm: RwLock::new(None),
        }))
    }

    pub fn destroy(&self) {
        if self.initialized.swap(false, Ordering::SeqCst) {
            info!("SDK destroyed");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn gateway(&self) -> Result<Arc<dyn AnalyticsGateway>> {
        if !self.is_initialized() {
            return Err(AdgeistError::NotInitialized);
        }
        Ok(self.gateway.clone())
    }

    pub fn delivery_log(&self) -> Option<Arc<DeliveryLogger>> {
        self.delivery_log.clone()
    }

    pub fn creative_request(&self, slot: &AdSlot) -> CreativeRequest {
        CreativeRequest {
            ad_space_id: slot.ad_space_id.clone(),
            publisher_id: self.config.adgeist_app_id.clone(),
            buy_type: slot.buy_type,
            is_test: self.config.is_test_environment,
        }
    }

    pub fn consent_status(&self) -> ConsentStatus {
        ConsentStatus::from(self.consent.load(Ordering::SeqCst))
    }

    pub fn update_consent(&self, consent: bool) {
        self.consent.store(consent, Ordering::SeqCst);
        info!(consent = ?ConsentStatus::from(consent), "consent updated");
    }

    pub fn set_user_details(&self, details: UserDetails) {
        if let Ok(mut slot) = self.user_details.write() {
            *slot = Some(details);
        }
    }

    pub fn user_details(&self) -> Option<UserDetails> {
        self.user_details.read().ok().and_then(|d| d.clone())
    }

    pub fn last_utm(&self) -> Option<UtmParameters> {
        self.last_utm.read().ok().and_then(|u| u.clone())
    }

    /// **上报自定义事件**，未授权时静默丢弃
    pub async fn log_event(&self, mut event: Event) -> Result<()> {
        if event.event_type.trim().is_empty() {
            return Err(AdgeistError::InvalidEvent("event must have a non-empty eventType".into()));
        }
        let gateway = self.gateway()?;
        if self.consent_status() != ConsentStatus::Accepted {
            debug!(event_type = %event.event_type, "consent not granted, event dropped");
            return Ok(());
        }
        if let Some(user_id) = self.user_details().and_then(|d| d.user_id) {
            event
                .event_properties
                .entry("userId".to_string())
                .or_insert_with(|| user_id.into());
        }
        gateway.log_event(&event).await
    }

    /// **解析深链接中的 UTM 参数**并作为转化事件上报
    pub async fn track_deeplink_utm(&self, uri: &str) -> Result<UtmParameters> {
        let url = Url::parse(uri)?;
        let mut utm = UtmParameters::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "utm_source" => utm.utm_source = value,
                "utm_medium" => utm.utm_medium = value,
                "utm_campaign" => utm.utm_campaign = value,
                "utm_term" => utm.utm_term = value,
                "utm_content" => utm.utm_content = value,
                _ => {}
            }
        }
        if utm.is_empty() {
            debug!(uri, "deeplink carries no utm parameters");
            return Ok(utm);
        }

        if let Ok(mut last) = self.last_utm.write() {
            *last = Some(utm.clone());
        }
        let mut event = Event::new(UTM_EVENT_TYPE).with_property("uri", uri);
        if let serde_json::Value::Object(fields) = serde_json::to_value(&utm)? {
            for (key, value) in fields.into_iter().filter(|(_, v)| !v.is_null()) {
                event.event_properties.insert(key, value);
            }
        }
        self.log_event(event).await?;
        Ok(utm)
    }
}
