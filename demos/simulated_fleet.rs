//! Two simulated cameras driven end to end
//!
//! Run with: cargo run --example simulated_fleet [SECONDS]
//!
//! Boots two simulated devices, publishes their colour streams as live
//! views, draws overlays, saves a video event from the first camera and
//! shuts down after SECONDS (default 3). Set `RUST_LOG=camfleet=debug` for
//! per-device logs.
//!
//! ## What it shows
//!
//! - Startup waits for devices before spawning the reporting and polling loops
//! - Frames flow device → live view → stream transport → ring buffer
//! - A watchdog pinged from the application loop, bound to the coordinator's shutdown

use std::sync::Arc;
use std::time::Duration;

use camfleet::coordinator::{CoordinatorConfig, DeviceCoordinator, DeviceEvent};
use camfleet::device::{DeviceDescriptor, SimulatedDevice, SimulatedDriver};
use camfleet::live_view::{LineOverlay, LiveView, LiveViewOptions, StreamKind, StreamSource, TextOverlay};
use camfleet::transport::MemoryHub;
use camfleet::WatchDog;

const FRONT: &str = "18443010A1B2C3D4";
const BACK: &str = "18443010E5F6A7B8";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camfleet=info".into()),
        )
        .init();

    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);

    let driver = Arc::new(SimulatedDriver::new());
    driver.add_device(
        SimulatedDevice::new(FRONT)
            .product_name("OAK-D")
            .with_stream(StreamKind::Camera.default_unique_key(FRONT), 30),
    );
    driver.add_device(
        SimulatedDevice::new(BACK)
            .product_name("OAK-1")
            .with_stream(StreamKind::Camera.default_unique_key(BACK), 15)
            .open_failures(1),
    );

    let hub = MemoryHub::new();
    let config = CoordinatorConfig::default()
        .report_interval(Duration::from_secs(1))
        .connect_interval(Duration::from_millis(500));
    let coordinator = DeviceCoordinator::with_config(config, driver.clone(), hub.context());

    let front = LiveView::create(
        coordinator.context(),
        StreamSource::new(FRONT, StreamKind::Camera, 1920, 1080).fps(30),
        LiveViewOptions::new("Front").max_buffer_seconds(5.0),
    )?;
    let back = LiveView::create(
        coordinator.context(),
        StreamSource::new(BACK, StreamKind::Camera, 1280, 720).fps(15),
        LiveViewOptions::new("Back").max_buffer_seconds(5.0),
    )?;

    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                DeviceEvent::Connected { mxid } => println!("[{mxid}] connected"),
                DeviceEvent::Disconnected { mxid } => println!("[{mxid}] disconnected"),
            }
        }
    });

    coordinator.add_device(DeviceDescriptor::new(FRONT).with_name("front door"))?;
    coordinator.add_device(DeviceDescriptor::new(BACK).with_name("back yard"))?;
    coordinator.start().await?;

    let watchdog = WatchDog::new("app", Duration::from_secs(1));
    let watch_task = watchdog.start(coordinator.shutdown_token());

    let deadline = tokio::time::Instant::now() + Duration::from_secs(seconds);
    let mut event_saved = false;
    while tokio::time::Instant::now() < deadline {
        front.add_rectangle([640, 200, 1100, 900], "person");
        front.add_text(TextOverlay::new("front door", (20, 40)).size(1.5));
        back.add_line(LineOverlay::new((0, 360), (1280, 360)).color([255, 0, 0]));

        if !event_saved && front.buffer().len() >= 30 {
            front.save_video_event(1.0, 0.5, "Person at the front door")?;
            event_saved = true;
        }

        watchdog.ping()?;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    if event_saved {
        let sent = hub.events.wait_for(1, Duration::from_secs(2)).await;
        println!("Video event sent: {sent}");
    }

    let stats = coordinator.stats();
    println!(
        "Stats: routed={} dropped={} rate={:.1}/s reports={} reattached={} failed_attaches={}",
        stats.packets_routed,
        stats.packets_dropped,
        stats.packet_rate(),
        stats.reports_published,
        stats.reattachments,
        stats.failed_attaches,
    );
    for view in [&front, &back] {
        let published = hub
            .streams
            .stream(view.unique_key())
            .map(|s| s.published_count())
            .unwrap_or(0);
        println!("[{}] published {published} frames", view.name());
    }

    coordinator.stop().await?;
    watch_task.await?;
    println!("Watchdog status: {:?}", watchdog.status());

    Ok(())
}
