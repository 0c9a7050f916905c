use axum::http::header::CONTENT_TYPE;
use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Duration};

use rust_adgeist::component::{AdEvent, BannerAd, LayoutSnapshot};
use rust_adgeist::config::{SdkConfig, TrackerConfig};
use rust_adgeist::gateway::http_client::{HttpGateway, CREATIVE_PATH};
use rust_adgeist::gateway::{AnalyticsGateway, CreativeRequest};
use rust_adgeist::mock_delivery::{start_mock_delivery_server, MockDeliveryState};
use rust_adgeist::model::context::TrackingContext;
use rust_adgeist::model::event::Event;
use rust_adgeist::model::placements::{AdSlot, BuyType, SlotType};
use rust_adgeist::model::response::AdResponse;
use rust_adgeist::session::AdgeistSession;
use rust_adgeist::viewability::Quartile;

/// 在随机端口上启动 mock 投放服务
async fn spawn_backend(latency_ms: (u64, u64)) -> (SdkConfig, Arc<MockDeliveryState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = MockDeliveryState::new(latency_ms);
    tokio::spawn(start_mock_delivery_server(listener, state.clone()));
    let config = SdkConfig {
        bid_request_backend_domain: format!("http://{}", addr),
        adgeist_app_id: "pub-1".into(),
        api_key: "key-1".into(),
        package_or_bundle_id: "com.example.app".into(),
        ..Default::default()
    };
    (config, state)
}

/// 拉取接口固定返回 200 与给定的原始响应体
async fn spawn_raw_backend(body: &'static str) -> SdkConfig {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route(CREATIVE_PATH, post(move || async move { ([(CONTENT_TYPE, "application/json")], body) }));
    tokio::spawn(async move { axum::serve(listener, app).await });
    SdkConfig {
        bid_request_backend_domain: format!("http://{}", addr),
        ..Default::default()
    }
}

fn request(ad_space_id: &str, buy_type: BuyType) -> CreativeRequest {
    CreativeRequest {
        ad_space_id: ad_space_id.into(),
        publisher_id: "pub-1".into(),
        buy_type,
        is_test: true,
    }
}

fn context() -> TrackingContext {
    TrackingContext {
        campaign_id: "camp-1".into(),
        ad_space_id: "space-1".into(),
        bid_id: "bid-1".into(),
        bid_meta: "meta".into(),
        buy_type: BuyType::Cpm,
        is_test_environment: true,
    }
}

#[tokio::test]
async fn fetches_both_buy_types() {
    let (config, _) = spawn_backend((0, 0)).await;
    let gateway = HttpGateway::new(&config);

    match gateway.fetch_creative(&request("space-1", BuyType::Fixed)).await.unwrap() {
        AdResponse::Fixed(fixed) => {
            assert_eq!(fixed.campaign_id.as_deref(), Some("camp-space-1"));
            assert_eq!(fixed.creatives.len(), 1);
        }
        other => panic!("expected fixed response, got {:?}", other),
    }
    match gateway.fetch_creative(&request("space-1", BuyType::Cpm)).await.unwrap() {
        AdResponse::Cpm(cpm) => assert_eq!(cpm.seat_bid[0].bid[0].id, "camp-space-1"),
        other => panic!("expected cpm response, got {:?}", other),
    }
}

#[tokio::test]
async fn no_fill_maps_to_no_ad() {
    let (config, _) = spawn_backend((0, 0)).await;
    let gateway = HttpGateway::new(&config);
    let err = gateway.fetch_creative(&request("noad-slot", BuyType::Fixed)).await.unwrap_err();
    assert_eq!(err.code(), "NO_AD");
}

#[tokio::test]
async fn slow_backend_times_out() {
    let (mut config, _) = spawn_backend((400, 400)).await;
    config.request_timeout_ms = 50;
    let gateway = HttpGateway::new(&config);
    let err = gateway.fetch_creative(&request("space-1", BuyType::Fixed)).await.unwrap_err();
    assert_eq!(err.code(), "FETCH_FAILED");
}

#[tokio::test]
async fn malformed_creative_body_is_a_fetch_failure() {
    for body in [r#"{"id": 5}"#, "<html>bad gateway</html>"] {
        let gateway = HttpGateway::new(&spawn_raw_backend(body).await);
        for buy_type in [BuyType::Fixed, BuyType::Cpm] {
            let err = gateway.fetch_creative(&request("space-1", buy_type)).await.unwrap_err();
            assert_eq!(err.code(), "FETCH_FAILED", "body {} as {:?}", body, buy_type);
        }
    }
}

#[tokio::test]
async fn tracking_payload_reaches_backend() {
    let (config, state) = spawn_backend((0, 0)).await;
    let gateway = HttpGateway::new(&config);
    let ctx = context();

    gateway.track_impression(&ctx, 87).await.unwrap();
    gateway.track_view(&ctx, 1200, 0.75, 0.0, 300).await.unwrap();
    gateway.track_video_quartile(&ctx, Quartile::ThirdQuartile).await.unwrap();

    let tracked = state.tracked();
    assert_eq!(tracked.len(), 3);
    assert_eq!(tracked[0].event_type, "IMPRESSION");
    assert_eq!(tracked[0].metrics.render_time, Some(87));
    assert_eq!(tracked[0].bid_meta, "meta");
    assert_eq!(tracked[1].metrics.view_time, Some(1200));
    assert_eq!(tracked[1].metrics.time_to_visible, Some(300));
    assert_eq!(tracked[2].metrics.quartile, Some(Quartile::ThirdQuartile));
}

#[tokio::test]
async fn rejected_tracking_is_a_delivery_error() {
    let (config, state) = spawn_backend((0, 0)).await;
    let gateway = HttpGateway::new(&config);
    let mut ctx = context();
    ctx.campaign_id.clear();
    let err = gateway.track_click(&ctx).await.unwrap_err();
    assert_eq!(err.code(), "TRACKING_FAILED");
    assert!(state.tracked().is_empty());
}

#[tokio::test]
async fn consented_events_are_forwarded() {
    let (config, state) = spawn_backend((0, 0)).await;
    let gateway = Arc::new(HttpGateway::new(&config));
    let session = AdgeistSession::initialize(config, gateway).unwrap();

    session.log_event(Event::new("SIGN_UP")).await.unwrap();
    assert!(state.events().is_empty());

    session.update_consent(true);
    session
        .log_event(Event::new("PURCHASE").with_property("value", 42))
        .await
        .unwrap();
    let events = state.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "PURCHASE");
}

#[tokio::test]
async fn banner_round_trip_over_http() {
    let (mut config, state) = spawn_backend((0, 0)).await;
    config.tracker = TrackerConfig {
        poll_interval_ms: 20,
        static_view_threshold_ms: 100,
        ..Default::default()
    };
    let gateway = Arc::new(HttpGateway::new(&config));
    let session = AdgeistSession::initialize(config, gateway).unwrap();
    let (_layout, layout_rx) = watch::channel(LayoutSnapshot::at(0.0, 250.0, 800.0));
    let slot = AdSlot::new("space-1", SlotType::Banner, BuyType::Cpm);
    let (handle, mut events) = BannerAd::mount(session, slot, layout_rx);

    let viewed = timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            match event {
                AdEvent::Loaded(_) => handle.media_loaded(),
                AdEvent::Viewed { .. } => return true,
                AdEvent::FailedToLoad { .. } => return false,
                _ => {}
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(viewed);

    // 卸载返回时收尾上报已经落地
    handle.unmount().await;
    assert!(state.tracked().iter().any(|p| p.event_type == "TOTAL_VIEW"));

    sleep(Duration::from_millis(200)).await;
    let kinds: Vec<String> = state.tracked().into_iter().map(|p| p.event_type).collect();
    assert!(kinds.contains(&"IMPRESSION".to_string()));
    assert!(kinds.contains(&"VIEW".to_string()));
}
