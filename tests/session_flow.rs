use kle_ble_sdk::{
    platform_channel, Advertisement, BlePlatform, CommandKind, DeviceId, EventStream,
    MatchPolicy, PlatformEvents, SessionConfig, SessionError, SessionEvent, SessionHandle,
    SessionState,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Default)]
struct RecordingPlatform {
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingPlatform {
    fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl BlePlatform for RecordingPlatform {
    fn start_scan(&mut self) {
        self.record("start_scan".to_string());
    }

    fn stop_scan(&mut self) {
        self.record("stop_scan".to_string());
    }

    fn connect(&mut self, device: &DeviceId) {
        self.record(format!("connect {}", device));
    }

    fn disconnect(&mut self, device: &DeviceId) {
        self.record(format!("disconnect {}", device));
    }

    fn write(&mut self, device: &DeviceId, payload: &[u8]) {
        self.record(format!("write {} {:02x?}", device, payload));
    }
}

struct Rig {
    session: SessionHandle,
    platform: RecordingPlatform,
    events: PlatformEvents,
    stream: EventStream,
}

async fn rig() -> Rig {
    let platform = RecordingPlatform::default();
    let (events, inbox) = platform_channel();
    let config = SessionConfig {
        scan_timeout: Duration::from_secs(30),
        match_policy: MatchPolicy::Exact,
    };
    let session = SessionHandle::spawn(config, platform.clone(), inbox);
    let stream = session.subscribe().await.unwrap();
    Rig {
        session,
        platform,
        events,
        stream,
    }
}

fn advert(name: &str, rssi: i16) -> Advertisement {
    Advertisement::new("C0:FF:EE:00:00:01", Some(name), Some(rssi))
}

impl Rig {
    async fn next(&mut self) -> SessionEvent {
        self.stream.recv().await.expect("session closed")
    }

    async fn to_ready(&mut self) {
        self.session.start_scan("DEV123").await.unwrap();
        self.events.advertisement(advert("DEV123", -60));
        assert!(matches!(self.next().await, SessionEvent::TargetFound(_)));
        self.session.start_trip().await.unwrap();
        self.events.link_up();
        assert_eq!(self.next().await, SessionEvent::Connected);
    }
}

#[tokio::test(start_paused = true)]
async fn target_found_within_deadline() {
    let mut rig = rig().await;
    rig.session.start_scan("DEV123").await.unwrap();

    tokio::time::sleep(Duration::from_secs(5)).await;
    rig.events.advertisement(advert("NOT-IT", -40));
    rig.events.advertisement(advert("DEV123", -60));

    match rig.next().await {
        SessionEvent::TargetFound(device) => {
            assert_eq!(device.name, "DEV123");
            assert_eq!(device.rssi, Some(-60));
        }
        other => panic!("unexpected event {:?}", other),
    }

    // the cancelled deadline never fires
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Found);
    assert!(rig.stream.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn scan_times_out_after_deadline() {
    let mut rig = rig().await;
    let started = Instant::now();
    rig.session.start_scan("DEV123").await.unwrap();

    assert_eq!(rig.next().await, SessionEvent::ScanTimeout);
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Idle);
    assert_eq!(rig.platform.entries(), vec!["start_scan", "stop_scan"]);
}

#[tokio::test(start_paused = true)]
async fn second_scan_does_not_reset_deadline() {
    let mut rig = rig().await;
    let started = Instant::now();
    rig.session.start_scan("DEV123").await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(
        rig.session.start_scan("DEV123").await,
        Err(SessionError::AlreadyScanning)
    );

    assert_eq!(rig.next().await, SessionEvent::ScanTimeout);
    assert!(started.elapsed() < Duration::from_secs(31));
}

#[tokio::test(start_paused = true)]
async fn rescan_after_timeout_gets_fresh_deadline() {
    let mut rig = rig().await;
    rig.session.start_scan("DEV123").await.unwrap();
    assert_eq!(rig.next().await, SessionEvent::ScanTimeout);

    let restarted = Instant::now();
    rig.session.start_scan("DEV123").await.unwrap();
    assert_eq!(rig.next().await, SessionEvent::ScanTimeout);
    assert!(restarted.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn trip_enables_commands() {
    let mut rig = rig().await;
    rig.to_ready().await;
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Ready);

    rig.session
        .send_command(CommandKind::IgnitionOn)
        .await
        .unwrap();
    rig.events.write_confirmed();
    assert_eq!(
        rig.next().await,
        SessionEvent::CommandAcknowledged(CommandKind::IgnitionOn)
    );

    let entries = rig.platform.entries();
    assert_eq!(entries[2], "connect C0:FF:EE:00:00:01");
    assert_eq!(entries[3], "write C0:FF:EE:00:00:01 [01, 01]");
}

#[tokio::test(start_paused = true)]
async fn link_loss_resets_once() {
    let mut rig = rig().await;
    rig.to_ready().await;

    rig.events.link_down();
    rig.events.link_down();
    assert_eq!(rig.next().await, SessionEvent::Disconnected);
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Idle);
    assert!(rig.stream.try_recv().is_none());

    assert_eq!(
        rig.session.send_command(CommandKind::IgnitionOn).await,
        Err(SessionError::NotReady)
    );
    assert!(!rig.platform.entries().iter().any(|e| e.starts_with("write")));
}

#[tokio::test(start_paused = true)]
async fn end_trip_disconnects() {
    let mut rig = rig().await;
    rig.to_ready().await;

    rig.session.end_trip().await.unwrap();
    assert_eq!(
        rig.platform.entries().last().map(String::as_str),
        Some("disconnect C0:FF:EE:00:00:01")
    );
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Ready);

    rig.events.link_down();
    assert_eq!(rig.next().await, SessionEvent::Disconnected);
    assert!(rig.session.state().await.unwrap().can_start_scan());
}

#[tokio::test(start_paused = true)]
async fn connect_failure_is_reported() {
    let mut rig = rig().await;
    rig.session.start_scan("DEV123").await.unwrap();
    rig.events.advertisement(advert("DEV123", -60));
    rig.next().await;
    rig.session.start_trip().await.unwrap();

    rig.events.platform_error("peer refused");
    match rig.next().await {
        SessionEvent::Error(err) => assert_eq!(err.reason, "peer refused"),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Idle);
    assert_eq!(
        rig.session.start_trip().await,
        Err(SessionError::NoTarget)
    );
}

#[tokio::test(start_paused = true)]
async fn only_one_subscriber() {
    let rig = rig().await;
    assert_eq!(
        rig.session.subscribe().await.err(),
        Some(SessionError::AlreadySubscribed)
    );

    drop(rig.stream);
    assert!(rig.session.subscribe().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_session() {
    let rig = rig().await;
    rig.session.shutdown();
    assert_eq!(
        rig.session.start_scan("DEV123").await,
        Err(SessionError::Closed)
    );
}

#[tokio::test(start_paused = true)]
async fn late_link_down_after_write_failure_is_absorbed() {
    let mut rig = rig().await;
    rig.to_ready().await;

    rig.session
        .send_command(CommandKind::IgnitionOn)
        .await
        .unwrap();
    rig.events.write_failed("gatt");
    match rig.next().await {
        SessionEvent::Error(err) => assert_eq!(err.reason, "ignition-on write failed: gatt"),
        other => panic!("unexpected event {:?}", other),
    }

    rig.session.start_scan("DEV123").await.unwrap();
    rig.events.link_down();
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Scanning);
    assert!(rig.stream.try_recv().is_none());

    // the rescan still gets its own deadline
    assert_eq!(rig.next().await, SessionEvent::ScanTimeout);
}

#[tokio::test(start_paused = true)]
async fn queued_write_failures_report_once() {
    let mut rig = rig().await;
    rig.to_ready().await;

    rig.session
        .send_command(CommandKind::IgnitionOn)
        .await
        .unwrap();
    rig.session
        .send_command(CommandKind::ImmobilizeOn)
        .await
        .unwrap();
    rig.events.write_failed("gatt");
    rig.events.write_failed("no link to C0:FF:EE:00:00:01");
    rig.events.link_down();

    assert!(matches!(rig.next().await, SessionEvent::Error(_)));
    assert_eq!(rig.session.state().await.unwrap(), SessionState::Idle);
    assert!(rig.stream.try_recv().is_none());
    assert_eq!(
        rig.platform
            .entries()
            .iter()
            .filter(|e| e.starts_with("disconnect"))
            .count(),
        1
    );
}
