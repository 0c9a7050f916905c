use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout, Duration};

use rust_adgeist::component::{AdEvent, BannerAd, BannerHandle, LayoutSnapshot};
use rust_adgeist::config::SdkConfig;
use rust_adgeist::gateway::memory::InMemoryGateway;
use rust_adgeist::gateway::TrackingCall;
use rust_adgeist::mock_delivery::sample_response;
use rust_adgeist::model::placements::{AdSlot, BuyType, SlotType};
use rust_adgeist::session::AdgeistSession;

const VIEWPORT: f64 = 800.0;

fn visible() -> LayoutSnapshot {
    LayoutSnapshot::at(100.0, 250.0, VIEWPORT)
}

fn hidden() -> LayoutSnapshot {
    LayoutSnapshot::at(VIEWPORT + 100.0, 250.0, VIEWPORT)
}

struct Harness {
    gateway: Arc<InMemoryGateway>,
    session: Arc<AdgeistSession>,
    layout: watch::Sender<LayoutSnapshot>,
    handle: BannerHandle,
    events: mpsc::UnboundedReceiver<AdEvent>,
}

fn mount_with(gateway: InMemoryGateway, slot: AdSlot, layout: LayoutSnapshot) -> Harness {
    let gateway = Arc::new(gateway);
    let session = AdgeistSession::initialize(SdkConfig::default(), gateway.clone()).unwrap();
    let (layout_tx, layout_rx) = watch::channel(layout);
    let (handle, events) = BannerAd::mount(session.clone(), slot, layout_rx);
    Harness {
        gateway,
        session,
        layout: layout_tx,
        handle,
        events,
    }
}

fn mount_image(layout: LayoutSnapshot) -> Harness {
    let gateway = InMemoryGateway::new().with_creative("space-1", sample_response(BuyType::Fixed, false, "space-1"));
    mount_with(gateway, AdSlot::new("space-1", SlotType::Banner, BuyType::Fixed), layout)
}

/// 等到第一个满足条件的事件
async fn wait_for(events: &mut mpsc::UnboundedReceiver<AdEvent>, matches: impl Fn(&AdEvent) -> bool) -> AdEvent {
    timeout(Duration::from_secs(30), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// 让 spawn 出去的上报任务跑完
async fn settle() {
    sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn image_creative_is_impressed_then_viewed_once() {
    let mut h = mount_image(visible());
    let loaded = wait_for(&mut h.events, |e| matches!(e, AdEvent::Loaded(_))).await;
    if let AdEvent::Loaded(creative) = loaded {
        assert_eq!(creative.campaign_id, "camp-space-1");
    }

    h.handle.media_loaded();
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Impressed { .. })).await;
    let viewed = wait_for(&mut h.events, |e| matches!(e, AdEvent::Viewed { .. })).await;
    match viewed {
        AdEvent::Viewed {
            view_time_ms,
            visibility_ratio,
        } => {
            assert!(view_time_ms >= 1000, "view time {}", view_time_ms);
            assert_eq!(visibility_ratio, 1.0);
        }
        other => panic!("unexpected event {:?}", other),
    }

    // 进入 VIEWED 后不再轮询，也不会重复上报
    sleep(Duration::from_secs(3)).await;
    assert_eq!(h.gateway.count("IMPRESSION"), 1);
    assert_eq!(h.gateway.count("VIEW"), 1);

    let calls = h.gateway.calls();
    match calls.iter().find(|c| c.call.event_type() == "VIEW").map(|c| &c.call) {
        Some(TrackingCall::View {
            view_time_ms,
            time_to_visible_ms,
            ..
        }) => {
            assert!(*view_time_ms >= 1000);
            assert!(*time_to_visible_ms <= *view_time_ms);
        }
        other => panic!("missing view call: {:?}", other),
    }

    h.handle.unmount().await;
    settle().await;
    assert_eq!(h.gateway.count("TOTAL_VIEW"), 1);
    let rest: Vec<AdEvent> = std::iter::from_fn(|| h.events.try_recv().ok()).collect();
    assert!(rest.contains(&AdEvent::Closed));
}

#[tokio::test(start_paused = true)]
async fn unmount_before_media_ready_fires_nothing() {
    let mut h = mount_image(visible());
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Loaded(_))).await;
    h.handle.unmount().await;
    settle().await;
    assert!(h.gateway.calls().is_empty());
    assert_eq!(h.events.recv().await, Some(AdEvent::Closed));
    assert_eq!(h.events.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn unmount_during_fetch_discards_response() {
    let gateway = InMemoryGateway::new()
        .with_creative("space-1", sample_response(BuyType::Cpm, false, "space-1"))
        .with_fetch_delay(Duration::from_secs(2));
    let mut h = mount_with(gateway, AdSlot::new("space-1", SlotType::Banner, BuyType::Cpm), visible());
    sleep(Duration::from_millis(500)).await;
    h.handle.unmount().await;
    sleep(Duration::from_secs(3)).await;
    assert_eq!(h.events.recv().await, None);
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_ad_space_fails_with_no_ad() {
    let mut h = mount_with(
        InMemoryGateway::new(),
        AdSlot::new("missing", SlotType::Banner, BuyType::Fixed),
        visible(),
    );
    match wait_for(&mut h.events, |_| true).await {
        AdEvent::FailedToLoad { code, .. } => assert_eq!(code, "NO_AD"),
        other => panic!("unexpected event {:?}", other),
    }
    h.handle.media_loaded();
    h.handle.click();
    sleep(Duration::from_secs(2)).await;
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn destroyed_session_fails_with_not_initialized() {
    let gateway = Arc::new(InMemoryGateway::new().with_creative("space-1", sample_response(BuyType::Fixed, false, "space-1")));
    let session = AdgeistSession::initialize(SdkConfig::default(), gateway.clone()).unwrap();
    session.destroy();
    let (_layout, layout_rx) = watch::channel(visible());
    let (handle, mut events) = BannerAd::mount(session, AdSlot::new("space-1", SlotType::Banner, BuyType::Fixed), layout_rx);
    match wait_for(&mut events, |_| true).await {
        AdEvent::FailedToLoad { code, .. } => assert_eq!(code, "NOT_INITIALIZED"),
        other => panic!("unexpected event {:?}", other),
    }
    handle.unmount().await;
    assert!(gateway.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn hidden_banner_is_impressed_but_not_viewed_until_scrolled_in() {
    let mut h = mount_image(hidden());
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Loaded(_))).await;
    h.handle.media_loaded();
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Impressed { .. })).await;

    sleep(Duration::from_secs(5)).await;
    assert_eq!(h.gateway.count("IMPRESSION"), 1);
    assert_eq!(h.gateway.count("VIEW"), 0);

    h.layout.send(visible()).unwrap();
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Viewed { .. })).await;
    settle().await;
    assert_eq!(h.gateway.count("VIEW"), 1);
    h.handle.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn tracking_failures_do_not_block_later_stages() {
    let mut h = mount_image(visible());
    h.gateway.fail_tracking(true);
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Loaded(_))).await;
    h.handle.media_loaded();
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Viewed { .. })).await;
    sleep(Duration::from_secs(2)).await;
    // 失败的投递同样只尝试一次
    assert_eq!(h.gateway.count("IMPRESSION"), 1);
    assert_eq!(h.gateway.count("VIEW"), 1);
    h.handle.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn every_click_is_tracked_and_opens_cta() {
    let mut h = mount_image(visible());
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Loaded(_))).await;

    // 曝光之前也可以点击
    h.handle.click();
    h.handle.click();
    let opened = wait_for(&mut h.events, |e| matches!(e, AdEvent::Opened { .. })).await;
    assert_eq!(
        opened,
        AdEvent::Opened {
            url: "https://acme.example/summer".into()
        }
    );
    settle().await;
    assert_eq!(h.gateway.count("CLICK"), 2);
    h.handle.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn refetch_resets_tracking_for_the_new_creative() {
    let mut h = mount_image(visible());
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Loaded(_))).await;
    h.handle.media_loaded();
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Viewed { .. })).await;

    h.handle.refetch();
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Closed)).await;
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Loaded(_))).await;
    h.handle.media_loaded();
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Viewed { .. })).await;
    settle().await;

    assert_eq!(h.gateway.count("IMPRESSION"), 2);
    assert_eq!(h.gateway.count("VIEW"), 2);
    assert_eq!(h.gateway.count("TOTAL_VIEW"), 1);
    h.handle.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn media_failure_is_terminal() {
    let mut h = mount_image(visible());
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Loaded(_))).await;
    h.handle.media_failed("decoder error");
    match wait_for(&mut h.events, |e| matches!(e, AdEvent::FailedToLoad { .. })).await {
        AdEvent::FailedToLoad { code, .. } => assert_eq!(code, "MEDIA_LOAD_FAILED"),
        other => panic!("unexpected event {:?}", other),
    }
    h.handle.media_loaded();
    h.handle.click();
    sleep(Duration::from_secs(3)).await;
    assert!(h.gateway.calls().is_empty());
    h.handle.unmount().await;
}

#[tokio::test(start_paused = true)]
async fn video_autoplays_in_view_and_pauses_out_of_view() {
    let gateway = InMemoryGateway::new().with_creative("video-1", sample_response(BuyType::Fixed, true, "video-1"));
    let mut h = mount_with(gateway, AdSlot::new("video-1", SlotType::Video, BuyType::Fixed), visible());
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Loaded(_))).await;
    h.handle.media_loaded();

    let resumed = wait_for(&mut h.events, |e| matches!(e, AdEvent::PlaybackChanged { .. })).await;
    assert_eq!(resumed, AdEvent::PlaybackChanged { paused: false });

    h.layout.send(hidden()).unwrap();
    let paused = wait_for(&mut h.events, |e| matches!(e, AdEvent::PlaybackChanged { .. })).await;
    assert_eq!(paused, AdEvent::PlaybackChanged { paused: true });

    h.handle.video_progress(Duration::from_secs(4), Duration::from_secs(15));
    h.handle.video_progress(Duration::from_secs(8), Duration::from_secs(15));
    settle().await;
    assert_eq!(h.gateway.count("VIDEO_QUARTILE"), 2);

    h.handle.unmount().await;
    settle().await;
    assert_eq!(h.gateway.count("VIDEO_PLAYBACK"), 1);
    assert_eq!(h.gateway.count("VIEW"), 0);
    drop(h.session);
}

#[tokio::test(start_paused = true)]
async fn media_failure_after_impression_suppresses_closing_reports() {
    let gateway = InMemoryGateway::new().with_creative("video-1", sample_response(BuyType::Fixed, true, "video-1"));
    let mut h = mount_with(gateway, AdSlot::new("video-1", SlotType::Video, BuyType::Fixed), visible());
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Loaded(_))).await;
    h.handle.media_loaded();
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Impressed { .. })).await;

    // 累计一段可见时长与播放时长，但不足以触发 VIEW
    sleep(Duration::from_millis(600)).await;
    h.handle.video_progress(Duration::from_secs(1), Duration::from_secs(15));
    h.handle.video_progress(Duration::from_secs(3), Duration::from_secs(15));
    h.handle.media_failed("stream interrupted");
    match wait_for(&mut h.events, |e| matches!(e, AdEvent::FailedToLoad { .. })).await {
        AdEvent::FailedToLoad { code, .. } => assert_eq!(code, "MEDIA_LOAD_FAILED"),
        other => panic!("unexpected event {:?}", other),
    }

    h.handle.unmount().await;
    settle().await;
    assert_eq!(h.gateway.count("IMPRESSION"), 1);
    assert_eq!(h.gateway.count("VIEW"), 0);
    assert_eq!(h.gateway.count("TOTAL_VIEW"), 0);
    assert_eq!(h.gateway.count("VIDEO_PLAYBACK"), 0);
}

#[tokio::test(start_paused = true)]
async fn unmount_returns_after_closing_reports_are_delivered() {
    let gateway = InMemoryGateway::new()
        .with_creative("space-1", sample_response(BuyType::Fixed, false, "space-1"))
        .with_tracking_delay(Duration::from_millis(300));
    let mut h = mount_with(gateway, AdSlot::new("space-1", SlotType::Banner, BuyType::Fixed), visible());
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Loaded(_))).await;
    h.handle.media_loaded();
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Viewed { .. })).await;

    h.handle.unmount().await;
    assert_eq!(h.gateway.count("TOTAL_VIEW"), 1);
}

#[tokio::test(start_paused = true)]
async fn viewed_video_no_longer_follows_visibility() {
    let gateway = InMemoryGateway::new().with_creative("video-1", sample_response(BuyType::Fixed, true, "video-1"));
    let mut h = mount_with(gateway, AdSlot::new("video-1", SlotType::Video, BuyType::Fixed), visible());
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Loaded(_))).await;
    h.handle.media_loaded();
    wait_for(&mut h.events, |e| matches!(e, AdEvent::Viewed { .. })).await;

    h.layout.send(hidden()).unwrap();
    sleep(Duration::from_secs(2)).await;
    let rest: Vec<AdEvent> = std::iter::from_fn(|| h.events.try_recv().ok()).collect();
    assert!(
        !rest.iter().any(|e| matches!(e, AdEvent::PlaybackChanged { .. })),
        "unexpected playback change after view: {:?}",
        rest
    );
    h.handle.unmount().await;
}
