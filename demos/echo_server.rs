//! # Example: echo_server
//!
//! Runs two echo backends in forked children behind a [`ServerCollection`],
//! prints every lifecycle event with [`LogWriter`] and shows the three stop tiers.
//!
//! ## Flow
//! ```text
//! ServerCollection::with_bus(bus)
//!     ├─► lookup_or_add("fast")  ─► fork ─► ServerAdded
//!     ├─► lookup_or_add("slow")  ─► fork ─► ServerAdded
//!     ├─► request(echo / upper / file)
//!     ├─► spawn_cleaner(50ms)    ─► "fast" idles out ─► IdleCleaned
//!     └─► delete("slow") while its handler sleeps
//!           ├─► close channel (no exit)
//!           ├─► SIGTERM       ─► Terminated
//!           └─► ServerStopped
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example echo_server --features logging
//! ```

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::Duration;

use forkvisor::{
    Bus, DispatchError, Handlers, LogWriter, Message, Server, ServerCollection, Subscribe,
    SubscriberSet, Supervisor, SupervisorConfig, signals,
};

/// Echo backend; `upper` uppercases, `file` returns the arguments in a temp file.
struct Echo {
    served: u64,
}

impl Server for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn register(handlers: &mut Handlers<Self>) {
        handlers
            .on("echo", |srv, ctx, args| {
                srv.served += 1;
                ctx.reply(&Message::with_parts("echo", args))
            })
            .on("upper", |srv, ctx, args| {
                srv.served += 1;
                let upper: Vec<Vec<u8>> = args.iter().map(|a| a.to_ascii_uppercase()).collect();
                ctx.reply(&Message::with_parts("upper", upper))
            })
            .on("file", |_, ctx, args| {
                let mut file = tempfile::tempfile().map_err(DispatchError::fail)?;
                for arg in args {
                    file.write_all(arg).map_err(DispatchError::fail)?;
                }
                ctx.reply_with_descriptor(&Message::new("file"), &file)
            })
            .on("nap", |_, ctx, _| {
                ctx.reply(&Message::new("napping"))?;
                while !signals::quit_requested() {
                    std::thread::sleep(Duration::from_millis(20));
                }
                Ok(())
            });
    }

    fn finalize(&mut self, _ctx: &mut forkvisor::Context) {
        eprintln!("[echo:{}] served {} requests", std::process::id(), self.served);
    }
}

fn echo(max_idle: Duration) -> impl FnOnce() -> Result<Supervisor<Echo>, forkvisor::ServerError> {
    move || {
        let cfg = SupervisorConfig {
            max_idle_time: max_idle,
            exit_timeout: Duration::from_millis(200),
            term_timeout: Duration::from_millis(500),
            ..SupervisorConfig::default()
        };
        Ok(Supervisor::new(Echo { served: 0 }, cfg))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let bus = Bus::new(256);
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let set = Arc::new(SubscriberSet::new(subs, bus.clone()));
    let listener = set.listen();

    let servers = ServerCollection::<Echo>::with_bus(bus);
    let cleaner = servers.spawn_cleaner(Duration::from_millis(50));

    let fast = servers
        .lookup_or_add("fast", echo(Duration::from_millis(200)))
        .await?;
    let slow = servers.lookup_or_add("slow", echo(Duration::ZERO)).await?;

    {
        let mut sup = fast.lock().await;
        let reply = sup.request(&Message::new("echo").with_arg("hello").with_arg(b"\0bin\0"))?;
        println!("[main] echo    -> {:?}", reply.message);

        let reply = sup.request(&Message::new("upper").with_arg("shout"))?;
        println!("[main] upper   -> {:?}", reply.message.arg_str(0));

        let reply = sup.request(&Message::new("file").with_arg("written ").with_arg("by the child"))?;
        if let Some(fd) = reply.descriptor {
            let mut file = std::fs::File::from(fd);
            file.seek(SeekFrom::Start(0))?;
            let mut text = String::new();
            file.read_to_string(&mut text)?;
            println!("[main] file    -> {text:?}");
        }
    }

    // Let the cleaner retire "fast".
    tokio::time::sleep(Duration::from_millis(400)).await;
    println!("[main] remaining servers: {:?}", servers.keys().await);

    let reply = slow.lock().await.request(&Message::new("nap"))?;
    println!("[main] nap     -> {}", reply.message.name());
    if let Some(tier) = servers.delete("slow").await? {
        println!("[main] slow stopped via {}", tier.as_label());
    }

    servers.cleanup().await;
    cleaner.await?;

    // Give the subscriber workers a moment to drain, then stop them.
    tokio::time::sleep(Duration::from_millis(50)).await;
    listener.abort();
    let _ = listener.await;
    if let Ok(set) = Arc::try_unwrap(set) {
        set.shutdown().await;
    }
    Ok(())
}
