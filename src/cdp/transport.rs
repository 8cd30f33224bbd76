//! Websocket transport that feeds a [`CdpSession`].

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::CdpSession;
use crate::{HtmlPdfError, Result};

/// Opens a websocket to a DevTools target and binds a session to it.
///
/// The `ws_url` is of the form `ws://host:port/devtools/page/{target_id}`.
pub async fn connect_websocket(ws_url: &str) -> Result<CdpSession> {
    info!(url = ws_url, "connecting to DevTools websocket");

    let (stream, _) = tokio_tungstenite::connect_async(ws_url)
        .await
        .map_err(|e| HtmlPdfError::Connect {
            url: ws_url.to_string(),
            reason: e.to_string(),
        })?;
    let (mut sink, mut source) = stream.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
    let session = CdpSession::spawn(out_tx, in_rx);
    let shutdown = session.shutdown_signal();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
                frame = out_rx.recv() => match frame {
                    Some(text) => {
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            warn!(error = %e, "websocket write failed");
                            break;
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        break;
                    }
                },
            }
        }
        debug!("websocket writer stopped");
    });

    tokio::spawn(async move {
        while let Some(message) = source.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text.to_string(),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Ok(Message::Close(_)) => {
                    debug!("websocket closed by remote");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "websocket read failed");
                    break;
                }
            };
            if in_tx.send(text).is_err() {
                break;
            }
        }
    });

    Ok(session)
}
