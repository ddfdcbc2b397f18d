#![allow(dead_code)]

use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::RawFd;
use std::time::Duration;

use rand::Rng;

use forkvisor::{
    Context, DispatchError, Handlers, Message, Server, ServerError, Signal, SignalTable,
    Supervisor, SupervisorConfig, signals,
};

/// Test server covering every kind of handler behavior.
#[derive(Default)]
pub struct TestServer {
    pub usr1: u32,
    pub fail_initialize: bool,
    pub extra_keep: Option<RawFd>,
}

impl Server for TestServer {
    fn name(&self) -> &str {
        "test-server"
    }

    fn register(handlers: &mut Handlers<Self>) {
        handlers
            .on("echo", |_, ctx, args| {
                ctx.reply(&Message::with_parts("echo", args))
            })
            .on("boom", |_, _, _| Err(DispatchError::fail("boom")))
            .on("panic", |_, _, _| panic!("handler panicked"))
            .on("quit", |_, ctx, _| {
                ctx.reply(&Message::new("bye"))?;
                ctx.quit();
                Ok(())
            })
            .on("pid", |_, ctx, _| {
                ctx.reply(&Message::new("pid").with_arg(std::process::id().to_string()))
            })
            .on("random", |_, ctx, _| {
                let n: u64 = ctx.rng().random();
                ctx.reply(&Message::new("random").with_arg(n.to_string()))
            })
            .on("hang", |_, _, _| loop {
                std::thread::sleep(Duration::from_millis(50));
            })
            .on("spin", |_, ctx, _| {
                ctx.reply(&Message::new("spinning"))?;
                while !signals::quit_requested() {
                    std::thread::sleep(Duration::from_millis(10));
                }
                Ok(())
            })
            .on("send_file", |_, ctx, args| {
                let mut file = tempfile::tempfile().map_err(DispatchError::fail)?;
                file.write_all(&args[0]).map_err(DispatchError::fail)?;
                ctx.reply_with_descriptor(&Message::new("file"), &file)
            })
            .on("read_fd", |_, ctx, _| {
                let fd = ctx
                    .take_descriptor()
                    .ok_or_else(|| DispatchError::fail("no descriptor"))?;
                let mut file = std::fs::File::from(fd);
                file.seek(SeekFrom::Start(0)).map_err(DispatchError::fail)?;
                let mut contents = Vec::new();
                file.read_to_end(&mut contents).map_err(DispatchError::fail)?;
                ctx.reply(&Message::new("contents").with_arg(contents))
            })
            .on("is_open", |_, ctx, args| {
                let fd: RawFd = String::from_utf8_lossy(&args[0])
                    .parse()
                    .map_err(DispatchError::fail)?;
                let open = unsafe { libc::fcntl(fd, libc::F_GETFD) } != -1;
                ctx.reply(&Message::new("is_open").with_arg(if open { "1" } else { "0" }))
            })
            .on("raise", |_, ctx, args| {
                let signal: Signal = String::from_utf8_lossy(&args[0])
                    .parse()
                    .map_err(DispatchError::fail)?;
                nix::sys::signal::raise(signal)?;
                ctx.reply(&Message::new("raised"))
            })
            .on("usr1_count", |srv, ctx, _| {
                ctx.reply(&Message::new("usr1_count").with_arg(srv.usr1.to_string()))
            });
    }

    fn signal_handlers(&self, table: &mut SignalTable<Self>) {
        table.on(Signal::SIGUSR1, |srv, _ctx, _| {
            srv.usr1 += 1;
            Ok(())
        });
    }

    fn before_fork(&mut self, keep: &mut forkvisor::KeepList) -> Result<(), ServerError> {
        if let Some(fd) = self.extra_keep {
            keep.keep_raw(fd);
        }
        Ok(())
    }

    fn initialize(&mut self, _ctx: &mut Context) -> Result<(), DispatchError> {
        if self.fail_initialize {
            return Err(DispatchError::fail("initialize refused"));
        }
        Ok(())
    }
}

/// Short timeouts so escalation tests finish quickly.
pub fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        exit_timeout: Duration::from_millis(300),
        term_timeout: Duration::from_millis(500),
        kill_timeout: Duration::from_secs(2),
        ..SupervisorConfig::default()
    }
}

pub fn started() -> Supervisor<TestServer> {
    started_with(TestServer::default(), fast_config())
}

pub fn started_with(server: TestServer, cfg: SupervisorConfig) -> Supervisor<TestServer> {
    let mut sup = Supervisor::new(server, cfg);
    sup.start().expect("start server");
    sup
}

/// Sends `name` with `args` and returns the reply's first argument as a string.
pub fn ask(sup: &mut Supervisor<TestServer>, name: &str, args: &[&str]) -> String {
    let reply = sup
        .request(&Message::with_parts(name, args))
        .unwrap_or_else(|e| panic!("request {name} failed: {e}"));
    reply.message.arg_str(0).unwrap_or_default().to_string()
}

/// True if `pid` no longer exists (already reaped).
pub fn is_gone(pid: nix::unistd::Pid) -> bool {
    matches!(
        nix::sys::signal::kill(pid, None),
        Err(nix::errno::Errno::ESRCH)
    )
}

/// Polls `cond` for up to `timeout`.
pub async fn eventually(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
