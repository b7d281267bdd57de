//! Accept loop and per-connection request handling

use anyhow::Result;
use bytes::BytesMut;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::handler::BirthdayHandler;
use crate::http::{Request, Response};

/// Serve connections until `shutdown` resolves, then drain
///
/// Open connections get `grace` to finish the request they are on; idle
/// keep-alive connections are closed right away.
pub async fn serve<F>(
    listener: TcpListener,
    handler: BirthdayHandler,
    shutdown: F,
    grace: Duration,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let (closing_tx, closing_rx) = watch::channel(false);
    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    let handler = handler.clone();
                    let closing = closing_rx.clone();

                    connections.spawn(
                        async move {
                            if let Err(e) = handle_client(stream, handler, closing).await {
                                error!("Error handling client {}: {}", addr, e);
                            }
                            debug!("Connection closed: {}", addr);
                        }
                        .instrument(info_span!("conn", peer = %addr)),
                    );
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    info!(grace_period = ?grace, open = connections.len(), "shutting down server");
    let _ = closing_tx.send(true);

    let drain = async { while connections.join_next().await.is_some() {} };
    if tokio::time::timeout(grace, drain).await.is_err() {
        warn!(
            remaining = connections.len(),
            "grace period elapsed, aborting open connections"
        );
        connections.shutdown().await;
    }

    Ok(())
}

async fn handle_client(
    mut stream: TcpStream,
    handler: BirthdayHandler,
    mut closing: watch::Receiver<bool>,
) -> Result<()> {
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        // Answer everything already buffered
        loop {
            match Request::parse(&mut buffer) {
                Ok(Some(request)) => {
                    let keep_alive = request.keep_alive();
                    let response = respond(&handler, request).await;
                    stream.write_all(&response.serialize(keep_alive)).await?;

                    if !keep_alive {
                        return Ok(());
                    }
                }
                Ok(None) => {
                    // Need more data
                    break;
                }
                Err(e) => {
                    warn!("Parse error: {}", e);
                    let response = Response::text(e.status(), e.to_string());
                    stream.write_all(&response.serialize(false)).await?;
                    return Ok(());
                }
            }
        }

        let n = tokio::select! {
            read = stream.read_buf(&mut buffer) => read?,
            _ = closing.changed() => return Ok(()),
        };

        if n == 0 {
            // Connection closed
            return Ok(());
        }
    }
}

/// Run the handler off the async workers; a cache miss blocks on the store
async fn respond(handler: &BirthdayHandler, request: Request) -> Response {
    let span = info_span!("request", method = %request.method, path = %request.path);
    let handler = handler.clone();

    let result = tokio::task::spawn_blocking(move || {
        let _enter = span.enter();
        let response = handler.handle(&request);
        info!(
            status = response.status(),
            bytes = response.body().len(),
            "request handled"
        );
        response
    })
    .await;

    match result {
        Ok(response) => response,
        Err(e) => {
            error!("Handler task failed: {}", e);
            Response::text(500, "an unknown error occurred")
        }
    }
}
