// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unix-socket listener. Each connection is persistent and
//! request/reply-serial: one spawned task per connection, reading one
//! NDJSON line at a time and writing one JSON line back, until the peer
//! disconnects.

use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

use sv_adapters::DiagnosingAgent;
use sv_core::Clock;
use sv_engine::AdapterFactory;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, warn};

use crate::protocol;
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("refusing to bind over non-socket path {0}")]
    NotASocket(std::path::PathBuf),
    #[error("failed to prepare socket path: {0}")]
    Io(#[from] io::Error),
}

/// Remove any stale socket or regular file at `path` so binding doesn't
/// fail with `AddrInUse`. Any other file type (directory, device, ...) is
/// left alone and rejected.
pub fn prepare_socket_path(path: &Path) -> Result<(), ListenerError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ListenerError::Io(e)),
    };
    let file_type = metadata.file_type();
    if file_type.is_socket() || file_type.is_file() {
        fs::remove_file(path)?;
        Ok(())
    } else {
        Err(ListenerError::NotASocket(path.to_path_buf()))
    }
}

pub async fn run<F, G, C>(socket: UnixListener, state: AppState<F, G, C>)
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    loop {
        match socket.accept().await {
            Ok((stream, _addr)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    handle_connection(stream, &state).await;
                });
            }
            Err(e) => {
                error!(error = %e, "accept error");
            }
        }
    }
}

async fn handle_connection<F, G, C>(stream: UnixStream, state: &AppState<F, G, C>)
where
    F: AdapterFactory,
    G: DiagnosingAgent,
    C: Clock,
{
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("client disconnected");
                return;
            }
            Err(e) => {
                warn!(error = %e, "error reading from client");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = protocol::handle_line(&line, state).await;
        let Ok(mut payload) = serde_json::to_vec(&response) else {
            error!("failed to serialize response");
            return;
        };
        payload.push(b'\n');

        if let Err(e) = writer.write_all(&payload).await {
            warn!(error = %e, "error writing to client");
            return;
        }
    }
}
