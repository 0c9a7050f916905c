// src/main.rs

use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout, Duration};
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

use rust_adgeist::component::{AdEvent, BannerAd, BannerHandle, LayoutSnapshot};
use rust_adgeist::config::{ConfigAdapter, FileConfigAdapter};
use rust_adgeist::gateway::http_client::HttpGateway;
use rust_adgeist::gateway::memory::InMemoryGateway;
use rust_adgeist::gateway::AnalyticsGateway;
use rust_adgeist::logging::delivery_log::DeliveryLogger;
use rust_adgeist::mock_delivery::{sample_response, start_mock_delivery_server, MockDeliveryState};
use rust_adgeist::model::event::Event;
use rust_adgeist::model::placements::{AdSlot, BuyType, SlotType};
use rust_adgeist::session::AdgeistSession;

const VIEWPORT_HEIGHT: f64 = 800.0;
const BANNER_HEIGHT: f64 = 250.0;

#[derive(Parser, Debug)]
#[command(version = "0.1", about = "Adgeist banner viewability demo host")]
struct CliArgs {
    /// mock 投放服务端口
    #[arg(short, long, default_value_t = 9001)]
    port: u16,
    #[arg(long, default_value = "logs")]
    log_dir: String,
    #[arg(long, default_value = "static/adgeist.json")]
    config: String,
    #[arg(long, default_value = "demo-banner")]
    ad_space_id: String,
    #[arg(long, default_value = "banner", value_parser = ["banner", "video"])]
    slot_type: String,
    #[arg(long, default_value = "FIXED")]
    buy_type: String,
    /// 不启动 mock 服务，使用进程内网关
    #[arg(long)]
    offline: bool,
}

/// 模拟用户把广告从屏幕下方滚入视口
async fn simulate_scroll(layout: watch::Sender<LayoutSnapshot>) {
    let mut top = VIEWPORT_HEIGHT + 50.0;
    while top > 300.0 {
        if layout.send(LayoutSnapshot::at(top, BANNER_HEIGHT, VIEWPORT_HEIGHT)).is_err() {
            return;
        }
        top -= 60.0;
        sleep(Duration::from_millis(150)).await;
    }
}

/// 驱动一次完整的演示：加载、曝光、可见、点击
async fn run_demo(
    handle: &BannerHandle,
    events: &mut mpsc::UnboundedReceiver<AdEvent>,
    layout: watch::Sender<LayoutSnapshot>,
    video: bool,
) {
    let mut layout = Some(layout);
    while let Some(event) = events.recv().await {
        info!(event = ?event, "banner event");
        println!("{:?}", event);
        match event {
            AdEvent::Loaded(_) => {
                // 模拟解码耗时
                sleep(Duration::from_millis(120)).await;
                handle.media_loaded();
                if let Some(layout) = layout.take() {
                    tokio::spawn(simulate_scroll(layout));
                }
            }
            AdEvent::Viewed { .. } => {
                if video {
                    handle.video_progress(Duration::from_secs(8), Duration::from_secs(15));
                }
                handle.click();
            }
            AdEvent::Opened { .. } => {
                sleep(Duration::from_millis(300)).await;
                return;
            }
            AdEvent::FailedToLoad { .. } => return,
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    // 初始化全局 tracing 日志
    let log_file = rolling::hourly(&args.log_dir, "adgeist_log.json");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);
    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().json().with_writer(non_blocking));
    tracing::subscriber::set_global_default(subscriber).expect("Unable to set global tracing subscriber");

    let mut config = FileConfigAdapter::new(&args.config)
        .load()
        .expect("Unable to load SDK config");
    let buy_type = BuyType::try_from(args.buy_type.clone()).expect("Invalid --buy-type");
    let slot_type = if args.slot_type == "video" {
        SlotType::Video
    } else {
        SlotType::Banner
    };

    let mock_server = if args.offline {
        None
    } else {
        let addr = format!("127.0.0.1:{}", args.port);
        let listener = TcpListener::bind(&addr).await.expect("Unable to bind mock delivery port");
        config.bid_request_backend_domain = format!("http://{}", addr);
        let state = MockDeliveryState::new((100, 300));
        Some(tokio::spawn(async move {
            if let Err(e) = start_mock_delivery_server(listener, state).await {
                error!(error = %e, "mock delivery server stopped");
            }
        }))
    };

    let gateway: Arc<dyn AnalyticsGateway> = if args.offline {
        let response = sample_response(buy_type, slot_type == SlotType::Video, &args.ad_space_id);
        Arc::new(InMemoryGateway::new().with_creative(&args.ad_space_id, response))
    } else {
        Arc::new(HttpGateway::new(&config))
    };

    // 上报投递台账
    let delivery_log = DeliveryLogger::new(&args.log_dir, 1000, 100, 1000);
    let session = AdgeistSession::initialize_with_ledger(config, gateway, Some(delivery_log.clone()))
        .expect("Unable to initialize SDK session");
    session.update_consent(true);
    if let Err(e) = session.log_event(Event::new("DEMO_STARTED").with_property("offline", args.offline)).await {
        warn!(error = %e, "failed to log demo event");
    }
    info!(ad_space_id = %args.ad_space_id, buy_type = %buy_type, offline = args.offline, "demo host starting");

    let (layout_tx, layout_rx) = watch::channel(LayoutSnapshot::unmeasured(VIEWPORT_HEIGHT));
    let slot = AdSlot::new(&args.ad_space_id, slot_type, buy_type).with_size(300, 250);
    let (handle, mut events) = BannerAd::mount(session.clone(), slot, layout_rx);

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutting down gracefully...");
        }
        finished = timeout(Duration::from_secs(20), run_demo(&handle, &mut events, layout_tx, slot_type == SlotType::Video)) => {
            if finished.is_err() {
                warn!("demo timed out");
            }
        }
    }

    handle.unmount().await;
    while let Ok(event) = events.try_recv() {
        println!("{:?}", event);
    }
    // 卸载只等待收尾上报，点击等中途上报另留落地时间
    sleep(Duration::from_millis(500)).await;
    session.destroy();
    delivery_log.shutdown().await;
    if let Some(server) = mock_server {
        server.abort();
    }
    info!("demo host shut down");
}
