mod common;

use std::time::Duration;

use forkvisor::{
    Bus, EventKind, Message, ServerError, ServerState, StopTier, Supervisor, SupervisorConfig,
};

use common::{TestServer, ask, eventually, fast_config, is_gone, started, started_with};

#[tokio::test]
async fn start_talk_stop() {
    let mut sup = started();
    assert!(sup.is_started());
    assert_eq!(sup.state(), ServerState::Started);

    let pid = sup.server_pid().expect("pid after start");
    assert!(!is_gone(pid));
    assert_eq!(ask(&mut sup, "pid", &[]), pid.as_raw().to_string());

    let tier = sup.stop().await.unwrap();
    assert_eq!(tier, StopTier::Closed);
    assert!(!sup.is_started());
    assert_eq!(sup.state(), ServerState::Stopped);
    assert!(is_gone(pid), "child must be reaped after stop");
}

#[tokio::test]
async fn lifecycle_misuse_is_rejected() {
    let mut sup = Supervisor::new(TestServer::default(), fast_config());
    assert!(matches!(sup.stop().await, Err(ServerError::NotStarted)));

    sup.start().unwrap();
    assert!(matches!(sup.start(), Err(ServerError::AlreadyStarted)));

    sup.stop().await.unwrap();
    assert!(matches!(sup.stop().await, Err(ServerError::NotStarted)));
    assert!(matches!(sup.start(), Err(ServerError::AlreadyStarted)));
    assert!(matches!(
        sup.request(&Message::new("echo")),
        Err(ServerError::NotStarted)
    ));
}

#[tokio::test]
async fn liveness_follows_the_child() {
    let mut sup = started();
    assert!(sup.is_running());

    assert_eq!(ask(&mut sup, "quit", &[]), "");
    assert!(eventually(Duration::from_secs(2), || !sup.is_running()).await);

    // Already reaped: stop is immediate and reports the first tier.
    assert_eq!(sup.stop().await.unwrap(), StopTier::Closed);
}

#[tokio::test]
async fn failed_initialize_ends_the_child() {
    let server = TestServer {
        fail_initialize: true,
        ..TestServer::default()
    };
    let mut sup = started_with(server, fast_config());
    let pid = sup.server_pid().unwrap();

    let err = sup.request(&Message::new("echo")).unwrap_err();
    assert!(matches!(err, ServerError::ServerExited { pid: p } if p == pid.as_raw()));
    assert_eq!(sup.stop().await.unwrap(), StopTier::Closed);
}

#[tokio::test]
async fn dropping_a_started_supervisor_kills_the_child() {
    let sup = started();
    let pid = sup.server_pid().unwrap();
    drop(sup);
    assert!(is_gone(pid));
}

#[tokio::test]
async fn lifecycle_events_are_published() {
    let bus = Bus::new(64);
    let mut rx = bus.subscribe();
    let mut sup = Supervisor::new(TestServer::default(), fast_config()).with_bus(bus);

    sup.start().unwrap();
    let pid = sup.server_pid().unwrap().as_raw();
    sup.stop().await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        assert_eq!(ev.server.as_deref(), Some("test-server"));
        if ev.kind == EventKind::ServerStopped {
            assert_eq!(ev.tier, Some(StopTier::Closed));
            assert_eq!(ev.pid, Some(pid));
        }
        kinds.push(ev.kind);
    }
    assert_eq!(
        kinds,
        vec![
            EventKind::ServerStarting,
            EventKind::ServerStarted,
            EventKind::StopRequested,
            EventKind::ServerStopped,
        ]
    );
}

#[tokio::test]
async fn zero_timeouts_still_stop_the_child() {
    let cfg = SupervisorConfig {
        exit_timeout: Duration::ZERO,
        term_timeout: Duration::ZERO,
        ..fast_config()
    };
    let mut sup = started_with(TestServer::default(), cfg);
    let pid = sup.server_pid().unwrap();
    sup.stop().await.unwrap();
    assert!(is_gone(pid));
}

#[tokio::test]
async fn child_outliving_a_zero_kill_timeout_is_still_reaped() {
    let cfg = SupervisorConfig {
        exit_timeout: Duration::ZERO,
        term_timeout: Duration::ZERO,
        kill_timeout: Duration::ZERO,
        ..fast_config()
    };
    let mut sup = started_with(TestServer::default(), cfg);
    let pid = sup.server_pid().unwrap();
    sup.stop().await.unwrap();

    // `stop` may return before the kill lands; the zombie must not be forgotten.
    assert!(eventually(Duration::from_secs(2), || !sup.is_running()).await);
    assert!(is_gone(pid), "child left as a zombie");
    drop(sup);
    assert!(is_gone(pid));
}
