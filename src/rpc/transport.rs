// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Transport helpers for RPC channels.
//!
//! A channel runs over any pair of async byte streams. In production that's
//! a tool server's stdout (incoming) and stdin (outgoing).

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::error::RpcError;

/// Readable half of a transport.
pub trait RpcRead: AsyncRead + Unpin + Send + 'static {}

impl<T> RpcRead for T where T: AsyncRead + Unpin + Send + 'static {}

/// Writable half of a transport.
pub trait RpcWrite: AsyncWrite + Unpin + Send + 'static {}

impl<T> RpcWrite for T where T: AsyncWrite + Unpin + Send + 'static {}

/// Spawn `command` with piped stdin/stdout, ready to be wrapped by a channel.
///
/// Stderr is inherited so server diagnostics stay visible. The process is
/// killed if the returned handle is dropped.
pub fn spawn_stdio(mut command: Command) -> Result<Child, RpcError> {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    command
        .spawn()
        .map_err(|e| RpcError::Transport(format!("Failed to spawn tool server: {}", e)))
}

/// Take a child's stdio handles for use as a transport.
pub fn take_stdio(child: &mut Child) -> Result<(ChildStdout, ChildStdin), RpcError> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RpcError::Transport("Child stdout is not piped".to_string()))?;
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| RpcError::Transport("Child stdin is not piped".to_string()))?;
    Ok((stdout, stdin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_take_stdio_requires_pipes() {
        let mut child = match Command::new("true").spawn() {
            Ok(child) => child,
            // No `true` binary on this platform.
            Err(_) => return,
        };
        let err = take_stdio(&mut child).unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
        let _ = child.wait().await;
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let err = spawn_stdio(Command::new("conductor-no-such-binary-xyz")).unwrap_err();
        assert!(err.to_string().contains("Failed to spawn"));
    }
}
