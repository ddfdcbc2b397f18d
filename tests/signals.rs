mod common;

use std::time::Duration;

use nix::sys::signal::{Signal, kill};

use forkvisor::{Message, StopTier};

use common::{ask, eventually, started};

#[tokio::test]
async fn sighup_is_ignored_in_the_child() {
    let mut sup = started();
    assert_eq!(ask(&mut sup, "raise", &["SIGHUP"]), "");
    assert_eq!(ask(&mut sup, "echo", &["still here"]), "still here");
    sup.stop().await.unwrap();
}

#[tokio::test]
async fn deferred_callbacks_run_inside_the_loop() {
    let mut sup = started();
    assert_eq!(ask(&mut sup, "usr1_count", &[]), "0");

    ask(&mut sup, "raise", &["SIGUSR1"]);
    ask(&mut sup, "raise", &["SIGUSR1"]);
    assert_eq!(ask(&mut sup, "usr1_count", &[]), "2");
    sup.stop().await.unwrap();
}

#[tokio::test]
async fn external_signal_between_messages_arrives_while_idle() {
    let mut sup = started();
    let pid = sup.server_pid().unwrap();
    ask(&mut sup, "echo", &["ready"]);

    kill(pid, Signal::SIGUSR1).unwrap();
    // The blocked read returns EINTR; the callback runs before the next message.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ask(&mut sup, "usr1_count", &[]), "1");
    sup.stop().await.unwrap();
}

#[tokio::test]
async fn termination_signal_ends_an_idle_child() {
    for signal in [Signal::SIGTERM, Signal::SIGINT] {
        let mut sup = started();
        let pid = sup.server_pid().unwrap();
        ask(&mut sup, "echo", &["ready"]);

        kill(pid, signal).unwrap();
        assert!(
            eventually(Duration::from_secs(2), || !sup.is_running()).await,
            "{signal:?} must end the loop"
        );
        assert!(sup.request(&Message::new("echo")).is_err());
        assert_eq!(sup.stop().await.unwrap(), StopTier::Closed);
    }
}
