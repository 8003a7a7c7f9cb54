//! Operator console loop

use crate::server::BroadcastServer;
use heresy_proto::Message;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info};

/// Line that stops the console
pub const EXIT_SENTINEL: &str = "exit";

/// What to do with one operator line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleAction {
    /// Broadcast the message to every agent
    Broadcast(Message),
    /// Stop reading input
    Exit,
}

/// Interpret one line of operator input
pub fn interpret_line(line: &str) -> ConsoleAction {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line == EXIT_SENTINEL {
        ConsoleAction::Exit
    } else {
        ConsoleAction::Broadcast(Message::eval(line))
    }
}

/// Read operator lines and broadcast each one as an `eval`
///
/// Returns on `exit` or end of input. The server and its connections
/// keep running either way. Bytes that are not valid UTF-8 are replaced
/// rather than ending the loop.
pub async fn run_console<R>(mut reader: R, server: Arc<BroadcastServer>)
where
    R: AsyncBufRead + Send + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => {
                debug!("Console input closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Failed to read console input: {}", e);
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.strip_suffix('\n').unwrap_or(&line);
        match interpret_line(line) {
            ConsoleAction::Exit => {
                info!("Console stopped");
                break;
            }
            ConsoleAction::Broadcast(message) => match server.broadcast(&message).await {
                Ok(sent) => debug!("Sent to {} agent(s)", sent),
                Err(e) => error!("Broadcast failed: {}", e),
            },
        }
    }
}
