use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::serve;
use axum::{routing::post, Json, Router};
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};
use uuid::Uuid;

use crate::gateway::http_client::{CREATIVE_PATH, EVENTS_PATH, TRACK_PATH};
use crate::gateway::{CreativeRequest, TrackingPayload};
use crate::model::event::Event;
use crate::model::placements::BuyType;
use crate::model::response::{
    AdResponse, Advertiser, Bid, BidExtension, CampaignValidity, CpmAdResponse, Dimensions, DisplayOptions,
    FixedAdResponse, FixedCreative, ImpressionRequirements, SeatBid,
};

const IMAGE_URL: &str = "https://cdn.adgeist.example/creatives/summer-sale-300x250.png";
const VIDEO_URL: &str = "https://cdn.adgeist.example/creatives/summer-sale-15s.mp4";

/// 以 `noad` 开头的广告位始终无填充
pub const NO_FILL_PREFIX: &str = "noad";

/// mock 服务收到的请求，供演示程序与测试查看
#[derive(Default)]
pub struct MockDeliveryState {
    pub tracked: Mutex<Vec<TrackingPayload>>,
    pub events: Mutex<Vec<Event>>,
    /// 每次拉取的模拟处理延迟范围（毫秒）
    pub latency_ms: (u64, u64),
}

impl MockDeliveryState {
    pub fn new(latency_ms: (u64, u64)) -> Arc<Self> {
        Arc::new(Self {
            latency_ms,
            ..Default::default()
        })
    }

    pub fn tracked(&self) -> Vec<TrackingPayload> {
        self.tracked.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

/// 生成一份可渲染的示例素材
pub fn sample_response(buy_type: BuyType, video: bool, ad_space_id: &str) -> AdResponse {
    let media_url = if video { VIDEO_URL } else { IMAGE_URL };
    let campaign_id = format!("camp-{}", ad_space_id);
    match buy_type {
        BuyType::Fixed => {
            let now = Utc::now();
            AdResponse::Fixed(FixedAdResponse {
                id: format!("bid-{}", Uuid::new_v4()),
                meta_data: format!("slot={};v=1", ad_space_id),
                is_test: Some(true),
                expires_at: Some((now + ChronoDuration::hours(1)).to_rfc3339()),
                generated_at: Some(now.to_rfc3339()),
                signature: Some(Uuid::new_v4().simple().to_string()),
                campaign_id: Some(campaign_id),
                advertiser: Some(Advertiser {
                    id: Some("adv-1".into()),
                    name: Some("Acme Outdoor".into()),
                    logo_url: Some("https://cdn.adgeist.example/logos/acme.png".into()),
                }),
                response_type: Some("banner".into()),
                load_type: Some("eager".into()),
                campaign_validity: Some(CampaignValidity {
                    start_time: Some(now.to_rfc3339()),
                    end_time: Some((now + ChronoDuration::days(30)).to_rfc3339()),
                }),
                creatives: vec![FixedCreative {
                    title: Some("Summer Sale".into()),
                    description: Some("Up to 50% off tents and packs".into()),
                    cta_url: Some("acme.example/summer".into()),
                    file_name: Some(media_url.rsplit('/').next().unwrap_or_default().to_string()),
                    file_size: Some(if video { 1_843_200 } else { 48_213 }),
                    file_url: Some(media_url.into()),
                    thumbnail_url: None,
                    creative_type: Some(if video { "video/mp4" } else { "image/png" }.into()),
                }],
                creatives_v1: Vec::new(),
                display_options: Some(DisplayOptions {
                    is_responsive: Some(false),
                    responsive_type: None,
                    dimensions: Some(Dimensions {
                        width: Some(300),
                        height: Some(250),
                    }),
                    allowed_formats: Some(vec!["image".into(), "video".into()]),
                }),
                frontend_cache_duration_seconds: Some(60),
                impression_requirements: Some(ImpressionRequirements {
                    impression_type: Some(vec!["VIEW".into()]),
                    min_view_duration_seconds: Some(if video { 2 } else { 1 }),
                }),
            })
        }
        BuyType::Cpm => AdResponse::Cpm(CpmAdResponse {
            id: format!("auction-{}", Uuid::new_v4()),
            bid_id: format!("bid-{}", Uuid::new_v4()),
            cur: "USD".into(),
            seat_bid: vec![SeatBid {
                bid_id: "seat-1".into(),
                bid: vec![Bid {
                    id: campaign_id,
                    imp_id: "1".into(),
                    price: 2.35,
                    ext: BidExtension {
                        creative_url: media_url.into(),
                        cta_url: "https://acme.example/summer".into(),
                        creative_title: "Summer Sale".into(),
                        creative_description: "Up to 50% off tents and packs".into(),
                        creative_brand_name: Some("Acme Outdoor".into()),
                    },
                }],
            }],
        }),
    }
}

/// 模拟素材拉取：随机延迟后返回示例素材，`noad` 广告位返回 204
async fn handle_creative(State(state): State<Arc<MockDeliveryState>>, Json(request): Json<CreativeRequest>) -> Response {
    info!(
        ad_space_id = %request.ad_space_id,
        publisher_id = %request.publisher_id,
        buy_type = %request.buy_type,
        "Mock delivery received creative request"
    );

    let (low, high) = state.latency_ms;
    let delay_ms = if high > low {
        rand::thread_rng().gen_range(low..high)
    } else {
        low
    };
    sleep(Duration::from_millis(delay_ms)).await;

    if request.ad_space_id.is_empty() || request.ad_space_id.starts_with(NO_FILL_PREFIX) {
        return StatusCode::NO_CONTENT.into_response();
    }

    // 广告位名带 video 时必出视频，否则三成概率出视频
    let video = request.ad_space_id.contains("video") || rand::thread_rng().gen_bool(0.3);
    match sample_response(request.buy_type, video, &request.ad_space_id).to_wire() {
        Ok(body) => Json(body).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to encode mock creative");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_track(State(state): State<Arc<MockDeliveryState>>, Json(payload): Json<TrackingPayload>) -> Response {
    if payload.campaign_id.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "campaignId is required" }))).into_response();
    }
    info!(
        event_type = %payload.event_type,
        campaign_id = %payload.campaign_id,
        ad_space_id = %payload.ad_space_id,
        "Mock delivery received tracking"
    );
    let event_type = payload.event_type.clone();
    if let Ok(mut tracked) = state.tracked.lock() {
        tracked.push(payload);
    }
    Json(json!({ "status": "ok", "eventType": event_type })).into_response()
}

async fn handle_event(State(state): State<Arc<MockDeliveryState>>, Json(event): Json<Event>) -> Response {
    info!(event_type = %event.event_type, "Mock delivery received event");
    if let Ok(mut events) = state.events.lock() {
        events.push(event);
    }
    Json(json!({ "status": "ok" })).into_response()
}

pub fn router(state: Arc<MockDeliveryState>) -> Router {
    Router::new()
        .route(CREATIVE_PATH, post(handle_creative))
        .route(TRACK_PATH, post(handle_track))
        .route(EVENTS_PATH, post(handle_event))
        .with_state(state)
}

/// 启动 mock 投放服务，监听由调用方绑定的端口
pub async fn start_mock_delivery_server(listener: TcpListener, state: Arc<MockDeliveryState>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Mock delivery backend running at http://{}", addr);
    }
    serve(listener, router(state)).await
}
