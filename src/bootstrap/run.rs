//! Line-oriented local runtime.
//!
//! Plain lines from the input are capture events. Lines starting with `/`
//! are control commands; their responses and every engine notification are
//! written to the output as JSON lines.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cs_app::CaptureEvent;
use cs_core::ids::ItemId;
use cs_core::messages::{Notification, Request};
use cs_core::ports::WakeTriggerPort;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::wiring::Wired;

const CAPTURE_ORIGIN: &str = "stdin";
const PRINTER_DRAIN: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Capture(String),
    Request(Request),
    Login(String),
    Logout,
    Wake,
    Quit,
    Unknown(String),
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return None;
    }
    if !line.starts_with('/') {
        return Some(Command::Capture(line.to_string()));
    }

    let (name, arg) = match line.split_once(' ') {
        Some((name, arg)) => (name, arg.trim()),
        None => (line, ""),
    };

    let command = match (name, arg.is_empty()) {
        ("/sync", _) => Command::Request(Request::Sync),
        ("/items", _) => Command::Request(Request::GetItems),
        ("/enable", _) => Command::Request(Request::EnableCapture),
        ("/disable", _) => Command::Request(Request::DisableCapture),
        ("/delete", false) => Command::Request(Request::DeleteItem {
            id: ItemId::from(arg),
        }),
        ("/upload", false) => Command::Request(Request::Upload {
            content: arg.to_string(),
            origin: None,
        }),
        ("/login", false) => Command::Login(arg.to_string()),
        ("/logout", _) => Command::Logout,
        ("/wake", _) => Command::Wake,
        ("/quit", _) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    };
    Some(command)
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum OutputLine<'a, T: Serialize> {
    Response { body: &'a T },
    Notification { body: &'a T },
    Error { message: &'a str },
}

type SharedOutput<W> = Arc<Mutex<W>>;

async fn write_line<W, T>(output: &SharedOutput<W>, line: &OutputLine<'_, T>) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut encoded = serde_json::to_string(line).context("encode output line failed")?;
    encoded.push('\n');
    let mut output = output.lock().await;
    output
        .write_all(encoded.as_bytes())
        .await
        .context("write output failed")?;
    output.flush().await.context("flush output failed")
}

fn spawn_notification_printer<W>(
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    output: SharedOutput<W>,
) -> tokio::task::JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            let line = OutputLine::Notification {
                body: &notification,
            };
            if let Err(err) = write_line(&output, &line).await {
                warn!(error = %err, "failed to print notification");
                break;
            }
        }
    })
}

/// Drive the engine from `input` until end of input or `/quit`.
///
/// The wake trigger and the notification printer are registered before
/// initialization starts, so both exist however initialization goes.
pub async fn run<R, W>(
    wired: Wired,
    wake: Arc<dyn WakeTriggerPort>,
    input: R,
    output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let Wired {
        supervisor,
        router,
        cloud,
        notifications,
    } = wired;
    let output: SharedOutput<W> = Arc::new(Mutex::new(output));

    let wake_loop = supervisor.arm_wake(wake.as_ref());
    let printer = spawn_notification_printer(notifications, Arc::clone(&output));

    let init = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            if let Err(err) = supervisor.initialize().await {
                warn!(error = %err, "initial initialization failed, retrying on next trigger");
            }
        })
    };

    let mut captures = Vec::new();
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await.context("read input failed")? {
        let Some(command) = parse_command(&line) else {
            continue;
        };

        match command {
            Command::Capture(content) => {
                captures.retain(|task: &tokio::task::JoinHandle<()>| !task.is_finished());
                captures.push(router.dispatch_capture(CaptureEvent::new(
                    content,
                    CAPTURE_ORIGIN,
                    supervisor.now(),
                )));
            }
            Command::Request(request) => {
                let response = router.handle(request).await;
                write_line(&output, &OutputLine::Response { body: &response }).await?;
            }
            Command::Login(user) => {
                cloud.sign_in(user.as_str());
            }
            Command::Logout => cloud.sign_out(),
            Command::Wake => supervisor.on_wake().await,
            Command::Quit => break,
            Command::Unknown(line) => {
                let message = format!("unknown command: {line}");
                write_line::<W, ()>(&output, &OutputLine::Error { message: &message }).await?;
            }
        }
    }

    info!("input closed, shutting down");
    let _ = init.await;
    for task in captures {
        let _ = task.await;
    }
    wake_loop.abort();
    supervisor.shutdown().await;
    drop(router);
    drop(supervisor);

    // The notifier lives as long as the engine; give the printer a moment to
    // drain what was already queued.
    if tokio::time::timeout(PRINTER_DRAIN, printer).await.is_err() {
        debug!("notification printer still busy at exit");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_captures() {
        assert_eq!(
            parse_command("hello world\n"),
            Some(Command::Capture("hello world".into()))
        );
        assert_eq!(parse_command("   "), None);
    }

    #[test]
    fn slash_lines_are_commands() {
        assert_eq!(parse_command("/sync"), Some(Command::Request(Request::Sync)));
        assert_eq!(
            parse_command("/delete 42"),
            Some(Command::Request(Request::DeleteItem {
                id: ItemId::from("42")
            }))
        );
        assert_eq!(
            parse_command("/upload some text here"),
            Some(Command::Request(Request::Upload {
                content: "some text here".into(),
                origin: None
            }))
        );
        assert_eq!(parse_command("/login alice"), Some(Command::Login("alice".into())));
    }

    #[test]
    fn commands_missing_arguments_are_unknown() {
        assert_eq!(parse_command("/delete"), Some(Command::Unknown("/delete".into())));
        assert_eq!(parse_command("/frobnicate"), Some(Command::Unknown("/frobnicate".into())));
    }
}
