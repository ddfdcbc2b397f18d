mod common;

use forkvisor::{Message, ServerError, StopTier};

use common::{ask, started};

#[tokio::test]
async fn binary_arguments_round_trip_through_the_child() {
    let mut sup = started();
    let sent = Message::new("echo")
        .with_arg("first line\nsecond line")
        .with_arg(b"\0nul\0")
        .with_arg([0xffu8, 0x00, 0x80])
        .with_arg("");

    let reply = sup.request(&sent).unwrap();
    assert_eq!(reply.message, sent);
    assert!(reply.descriptor.is_none());
    sup.stop().await.unwrap();
}

#[tokio::test]
async fn replies_keep_request_order() {
    let mut sup = started();
    let channel = sup.channel().unwrap();
    for i in 0..100 {
        channel
            .send(&Message::new("echo").with_arg(i.to_string()))
            .unwrap();
    }
    for i in 0..100 {
        let reply = channel.receive().unwrap().expect("reply");
        assert_eq!(reply.message.arg_str(0), Some(i.to_string().as_str()));
    }
    sup.stop().await.unwrap();
}

#[tokio::test]
async fn unknown_message_is_fatal_for_the_child() {
    let mut sup = started();
    let pid = sup.server_pid().unwrap().as_raw();

    let err = sup.request(&Message::new("frobnicate")).unwrap_err();
    assert!(matches!(err, ServerError::ServerExited { pid: p } if p == pid));
    assert_eq!(sup.stop().await.unwrap(), StopTier::Closed);
}

#[tokio::test]
async fn handler_error_and_panic_end_the_child() {
    for name in ["boom", "panic"] {
        let mut sup = started();
        let err = sup.request(&Message::new(name)).unwrap_err();
        assert_eq!(err.as_label(), "server_exited", "{name}");
        assert_eq!(sup.stop().await.unwrap(), StopTier::Closed, "{name}");
    }
}

#[tokio::test]
async fn quit_handler_closes_the_channel_after_replying() {
    let mut sup = started();
    let channel = sup.channel().unwrap();
    channel.send(&Message::new("quit")).unwrap();

    let reply = channel.receive().unwrap().expect("bye");
    assert_eq!(reply.message.name(), "bye");
    assert!(channel.receive().unwrap().is_none(), "end of stream after quit");
    assert_eq!(sup.stop().await.unwrap(), StopTier::Closed);
}

#[tokio::test]
async fn each_child_gets_its_own_random_sequence() {
    let mut a = started();
    let mut b = started();
    let ra = ask(&mut a, "random", &[]);
    let rb = ask(&mut b, "random", &[]);
    assert_ne!(ra, rb);
    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn scalar_frames_are_rejected_by_the_message_loop() {
    let mut sup = started();
    sup.channel().unwrap().send_scalar(b"raw").unwrap();
    assert!(sup.channel().unwrap().receive().unwrap().is_none());
    assert_eq!(sup.stop().await.unwrap(), StopTier::Closed);
}
