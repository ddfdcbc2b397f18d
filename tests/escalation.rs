mod common;

use std::time::{Duration, Instant};

use forkvisor::{Bus, EventKind, Message, StopTier, Supervisor};

use common::{TestServer, ask, fast_config, is_gone, started};

#[tokio::test]
async fn idle_child_exits_when_the_channel_closes() {
    let mut sup = started();
    let pid = sup.server_pid().unwrap();

    let begun = Instant::now();
    assert_eq!(sup.stop().await.unwrap(), StopTier::Closed);
    assert!(begun.elapsed() < fast_config().exit_timeout + Duration::from_millis(200));
    assert!(is_gone(pid));
}

#[tokio::test]
async fn busy_handler_polling_the_quit_flag_ends_on_termination() {
    let mut sup = started();
    let pid = sup.server_pid().unwrap();
    assert_eq!(
        sup.request(&Message::new("spin")).unwrap().message.name(),
        "spinning"
    );

    assert_eq!(sup.stop().await.unwrap(), StopTier::Terminated);
    assert!(is_gone(pid));
}

#[tokio::test]
async fn stuck_handler_is_killed_within_the_bound() {
    let bus = Bus::new(64);
    let mut rx = bus.subscribe();
    let cfg = fast_config();
    let mut sup = Supervisor::new(TestServer::default(), cfg.clone()).with_bus(bus);
    sup.start().unwrap();
    let pid = sup.server_pid().unwrap();

    ask(&mut sup, "echo", &["ready"]);
    sup.channel()
        .unwrap()
        .send(&Message::new("hang"))
        .unwrap();

    let begun = Instant::now();
    assert_eq!(sup.stop().await.unwrap(), StopTier::Killed);
    assert!(begun.elapsed() < cfg.worst_case_stop() + Duration::from_millis(500));
    assert!(is_gone(pid), "no zombie left behind");

    let mut kinds = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        kinds.push(ev.kind);
    }
    assert!(kinds.contains(&EventKind::TerminationSent));
    assert!(kinds.contains(&EventKind::KillSent));
    assert_eq!(kinds.last(), Some(&EventKind::ServerStopped));
}
