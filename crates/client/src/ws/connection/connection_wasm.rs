//! WASM/Web-specific WebSocket implementation using web_sys::WebSocket.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver};
use futures_channel::oneshot;
use futures_util::{select, FutureExt, StreamExt};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;
use web_sys::{js_sys, CloseEvent, ErrorEvent, MessageEvent, WebSocket};

use super::{CloseInfo, Connector, Outgoing, Socket, SocketEvent, TransportError};

const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens sockets with the browser `WebSocket` API.
#[derive(Debug, Clone, Default)]
pub struct BrowserConnector;

/// JS callbacks kept alive for as long as the socket is in use.
struct Handlers {
    _on_open: Closure<dyn FnMut(web_sys::Event)>,
    _on_error: Closure<dyn FnMut(ErrorEvent)>,
    _on_close: Closure<dyn FnMut(CloseEvent)>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
}

#[async_trait(?Send)]
impl Connector for BrowserConnector {
    async fn connect(&self, url: &str) -> Result<Socket, TransportError> {
        let ws = WebSocket::new(url)
            .map_err(|e| TransportError::Connect(format!("Failed to create WebSocket: {:?}", e)))?;

        let (open_tx, open_rx) = oneshot::channel::<Result<(), String>>();
        let open_tx = Rc::new(RefCell::new(Some(open_tx)));
        let (in_tx, in_rx) = unbounded::<SocketEvent>();

        let open_for_open = open_tx.clone();
        let on_open = Closure::wrap(Box::new(move |_: web_sys::Event| {
            if let Some(tx) = open_for_open.borrow_mut().take() {
                let _ = tx.send(Ok(()));
            }
        }) as Box<dyn FnMut(web_sys::Event)>);
        ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));

        let open_for_error = open_tx.clone();
        let on_error = Closure::wrap(Box::new(move |_: ErrorEvent| {
            crate::log_error!("WebSocket onerror fired");
            if let Some(tx) = open_for_error.borrow_mut().take() {
                let _ = tx.send(Err("WebSocket error".to_string()));
            }
        }) as Box<dyn FnMut(ErrorEvent)>);
        ws.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        let open_for_close = open_tx.clone();
        let close_tx = in_tx.clone();
        let on_close = Closure::wrap(Box::new(move |e: CloseEvent| {
            let info = CloseInfo {
                code: e.code(),
                reason: e.reason(),
                clean: e.was_clean(),
            };
            if let Some(tx) = open_for_close.borrow_mut().take() {
                let _ = tx.send(Err(format!("closed before open (code {})", info.code)));
                return;
            }
            let _ = close_tx.unbounded_send(SocketEvent::Closed(info));
        }) as Box<dyn FnMut(CloseEvent)>);
        ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        let on_message = Closure::wrap(Box::new(move |e: MessageEvent| {
            if let Ok(text) = e.data().dyn_into::<js_sys::JsString>() {
                let text: String = text.into();
                let _ = in_tx.unbounded_send(SocketEvent::Text(text));
            }
        }) as Box<dyn FnMut(MessageEvent)>);
        ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

        let handlers = Handlers {
            _on_open: on_open,
            _on_error: on_error,
            _on_close: on_close,
            _on_message: on_message,
        };

        let mut open_rx = open_rx.fuse();
        let mut timeout = Box::pin(gloo_timers::future::sleep(OPEN_TIMEOUT).fuse());
        let opened = select! {
            result = open_rx => match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(reason)) => Err(TransportError::Connect(reason)),
                Err(_) => Err(TransportError::Connect("socket dropped".to_string())),
            },
            () = timeout => Err(TransportError::Timeout),
        };

        if let Err(e) = opened {
            detach(&ws);
            let _ = ws.close();
            return Err(e);
        }

        let (out_tx, out_rx) = unbounded::<Outgoing>();
        spawn_writer(ws, out_rx, handlers);

        Ok(Socket {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

/// Forward outgoing frames to the socket. Owns the JS handlers, so they are
/// released once the session drops its sender.
fn spawn_writer(
    ws: WebSocket,
    mut out_rx: UnboundedReceiver<Outgoing>,
    handlers: Handlers,
) {
    spawn_local(async move {
        while let Some(frame) = out_rx.next().await {
            match frame {
                Outgoing::Text(text) => {
                    // The close event is still on its way to the session.
                    if ws.ready_state() != WebSocket::OPEN {
                        crate::log_info!("WebSocket no longer open, dropping frame");
                        continue;
                    }
                    if let Err(e) = ws.send_with_str(&text) {
                        crate::log_error!("Send failed: {:?}", e);
                    }
                }
                Outgoing::Close { code, reason } => {
                    if let Err(e) = ws.close_with_code_and_reason(code, &reason) {
                        crate::log_error!("Close failed: {:?}", e);
                    }
                    break;
                }
            }
        }
        detach(&ws);
        if ws.ready_state() == WebSocket::OPEN || ws.ready_state() == WebSocket::CONNECTING {
            let _ = ws.close();
        }
        drop(handlers);
    });
}

fn detach(ws: &WebSocket) {
    ws.set_onopen(None);
    ws.set_onerror(None);
    ws.set_onclose(None);
    ws.set_onmessage(None);
}
