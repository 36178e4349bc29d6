//! Native/Desktop WebSocket implementation using tokio-tungstenite.

use async_trait::async_trait;
use futures_channel::mpsc::unbounded;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::{CloseInfo, Connector, Outgoing, Socket, SocketEvent, TransportError};

/// Opens sockets with `connect_async` and bridges them onto channels.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Socket, TransportError> {
        let (ws_stream, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = unbounded::<Outgoing>();
        let (in_tx, in_rx) = unbounded::<SocketEvent>();

        // Read task
        tokio::spawn(async move {
            let info = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx
                            .unbounded_send(SocketEvent::Text(text.as_str().to_owned()))
                            .is_err()
                        {
                            // Session is gone.
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => CloseInfo {
                                code: u16::from(frame.code),
                                reason: frame.reason.as_str().to_owned(),
                                clean: true,
                            },
                            None => CloseInfo {
                                code: CloseInfo::NORMAL,
                                reason: String::new(),
                                clean: true,
                            },
                        };
                    }
                    Some(Ok(Message::Ping(data))) => {
                        // Pong is handled automatically by tungstenite
                        crate::log_debug!("Received ping: {:?}", data);
                    }
                    Some(Ok(_)) => {
                        // Ignore binary, pong, etc.
                    }
                    Some(Err(e)) => {
                        crate::log_error!("WebSocket read error: {}", e);
                        break CloseInfo::abnormal(e.to_string());
                    }
                    None => break CloseInfo::abnormal("stream ended"),
                }
            };
            let _ = in_tx.unbounded_send(SocketEvent::Closed(info));
        });

        // Write task
        tokio::spawn(async move {
            while let Some(frame) = out_rx.next().await {
                match frame {
                    Outgoing::Text(text) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            crate::log_error!("Send failed: {}", e);
                            return;
                        }
                    }
                    Outgoing::Close { code, reason } => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        };
                        if let Err(e) = write.send(Message::Close(Some(frame))).await {
                            crate::log_debug!("Close frame not delivered: {}", e);
                        }
                        return;
                    }
                }
            }
            // Sender dropped: the session ended without an explicit close.
            let _ = write.close().await;
        });

        Ok(Socket {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}
