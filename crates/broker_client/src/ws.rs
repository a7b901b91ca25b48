//! STOMP over WebSocket connector
//!
//! Talks to the SockJS raw-websocket entry point (`<endpoint>/websocket`).
//! One IO task per session owns the socket; the session handle only queues
//! outbound frames to it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, Interval};
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, trace, warn};

use crate::client::{
    BrokerEvent, BrokerSession, Connection, Connector, InboundMessage, SessionOptions,
    SubscriptionId,
};
use crate::debug::DebugSink;
use crate::error::{BrokerError, Result};
use crate::stomp::{negotiate_heartbeat, Command, Frame, FrameDecoder};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Map a configured endpoint to the WebSocket URL to dial.
///
/// `http(s)://host/path` becomes `ws(s)://host/path/websocket`;
/// `ws(s)://` URLs are used unchanged.
pub fn websocket_url(endpoint: &str) -> Result<String> {
    let endpoint = endpoint.trim();
    let (scheme, rest) = endpoint
        .split_once("://")
        .ok_or_else(|| BrokerError::invalid_endpoint(endpoint, "missing scheme"))?;

    let url = match scheme.to_ascii_lowercase().as_str() {
        "ws" | "wss" => endpoint.to_string(),
        "http" => format!("ws://{}/websocket", rest.trim_end_matches('/')),
        "https" => format!("wss://{}/websocket", rest.trim_end_matches('/')),
        other => {
            return Err(BrokerError::invalid_endpoint(
                endpoint,
                format!("unsupported scheme '{other}'"),
            ))
        }
    };

    url.parse::<Uri>()
        .map_err(|e| BrokerError::invalid_endpoint(endpoint, e.to_string()))?;
    Ok(url)
}

fn host_of(url: &str) -> String {
    url.parse::<Uri>()
        .ok()
        .and_then(|uri| uri.host().map(str::to_string))
        .unwrap_or_else(|| "localhost".to_string())
}

/// Commands from the session handle to the IO task
#[derive(Debug)]
enum Outbound {
    Frame(Frame),
    Disconnect,
}

/// Real connector over `tokio-tungstenite`
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WsConnector {
    #[instrument(name = "broker_connect", skip(self, options), fields(endpoint = %endpoint))]
    async fn connect(&self, endpoint: &str, options: &SessionOptions) -> Result<Connection> {
        let url = websocket_url(endpoint)?;
        let timeout = Duration::from_millis(options.connect_timeout_ms.max(1));

        debug!(url = %url, "Opening websocket");
        let (ws, _response) = tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str()))
            .await
            .map_err(|_| BrokerError::HandshakeTimeout {
                timeout_ms: options.connect_timeout_ms,
            })?
            .map_err(|e| BrokerError::connect_failed(&url, e.to_string()))?;

        let (mut write, mut read) = ws.split();
        let mut decoder = FrameDecoder::new();

        let connect = Frame::connect(&host_of(&url), options.heartbeat_ms, options.heartbeat_ms);
        write_frame(&mut write, &connect, &options.debug).await?;

        let connected = tokio::time::timeout(
            timeout,
            await_connected(&mut read, &mut decoder, &options.debug),
        )
        .await
        .map_err(|_| BrokerError::HandshakeTimeout {
            timeout_ms: options.connect_timeout_ms,
        })??;

        let (heartbeat_out, heartbeat_in) = negotiate_heartbeat(
            options.heartbeat_ms,
            options.heartbeat_ms,
            connected.get("heart-beat"),
        );
        info!(
            version = connected.get("version").unwrap_or("1.0"),
            heartbeat_out,
            heartbeat_in,
            "Broker session established"
        );

        let (events_tx, events_rx) = mpsc::channel(options.event_buffer.max(1));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let is_connected = Arc::new(AtomicBool::new(true));

        let io = SessionIo {
            write,
            read,
            decoder,
            commands: commands_rx,
            events: events_tx,
            connected: Arc::clone(&is_connected),
            heartbeat: (heartbeat_out > 0).then(|| {
                let period = Duration::from_millis(heartbeat_out);
                interval_at(Instant::now() + period, period)
            }),
            debug: options.debug.clone(),
        };
        tokio::spawn(io.run());

        let session = WsSession {
            commands: commands_tx,
            connected: is_connected,
            next_subscription: AtomicU64::new(0),
            debug: options.debug.clone(),
        };

        Ok(Connection {
            session: Arc::new(session),
            events: events_rx,
        })
    }
}

async fn write_frame(write: &mut WsWrite, frame: &Frame, debug: &DebugSink) -> Result<()> {
    debug.emit(|| format!(">>> {}", frame.summary()));
    let text = String::from_utf8_lossy(&frame.encode()).into_owned();
    write
        .send(Message::text(text))
        .await
        .map_err(|e| BrokerError::connect_failed("websocket", e.to_string()))
}

fn feed_message(decoder: &mut FrameDecoder, message: &Message) -> bool {
    match message {
        Message::Text(text) => {
            decoder.feed(text.as_bytes());
            true
        }
        Message::Binary(data) => {
            decoder.feed(&data[..]);
            true
        }
        _ => false,
    }
}

async fn await_connected(
    read: &mut WsRead,
    decoder: &mut FrameDecoder,
    debug: &DebugSink,
) -> Result<Frame> {
    loop {
        while let Some(frame) = decoder.next_frame()? {
            debug.emit(|| format!("<<< {}", frame.summary()));
            match frame.command {
                Command::Connected => return Ok(frame),
                Command::Error => {
                    let message = frame
                        .get("message")
                        .map(str::to_string)
                        .or_else(|| frame.body_str().map(str::to_string))
                        .unwrap_or_else(|| "unknown error".to_string());
                    return Err(BrokerError::Rejected { message });
                }
                other => {
                    warn!(command = other.as_str(), "Unexpected frame before CONNECTED");
                }
            }
        }

        match read.next().await {
            Some(Ok(Message::Close(_))) | None => {
                return Err(BrokerError::connect_failed(
                    "websocket",
                    "closed during handshake",
                ))
            }
            Some(Ok(message)) => {
                feed_message(decoder, &message);
            }
            Some(Err(e)) => return Err(BrokerError::connect_failed("websocket", e.to_string())),
        }
    }
}

/// Session handle returned to the caller
struct WsSession {
    commands: mpsc::UnboundedSender<Outbound>,
    connected: Arc<AtomicBool>,
    next_subscription: AtomicU64,
    debug: DebugSink,
}

impl WsSession {
    fn queue(&self, frame: Frame) -> Result<()> {
        if !self.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        self.commands
            .send(Outbound::Frame(frame))
            .map_err(|_| BrokerError::NotConnected)
    }
}

impl BrokerSession for WsSession {
    fn subscribe(&self, destination: &str) -> Result<SubscriptionId> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.queue(Frame::subscribe(&id.to_string(), destination))?;
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.queue(Frame::unsubscribe(&id.to_string()))
    }

    fn send(&self, destination: &str, body: Bytes) -> Result<()> {
        self.queue(Frame::send(destination, body))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            self.debug.emit(|| "disconnect requested".to_string());
            let _ = self.commands.send(Outbound::Disconnect);
        }
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// IO task state
struct SessionIo {
    write: WsWrite,
    read: WsRead,
    decoder: FrameDecoder,
    commands: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::Sender<BrokerEvent>,
    connected: Arc<AtomicBool>,
    heartbeat: Option<Interval>,
    debug: DebugSink,
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl SessionIo {
    async fn run(mut self) {
        let close_reason = loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = write_frame(&mut self.write, &frame, &self.debug).await {
                            break Some(e.to_string());
                        }
                    }
                    Some(Outbound::Disconnect) | None => {
                        let _ = write_frame(&mut self.write, &Frame::disconnect(), &self.debug).await;
                        let _ = self.write.close().await;
                        break None;
                    }
                },
                _ = tick(&mut self.heartbeat) => {
                    trace!("Sending heart-beat");
                    if let Err(e) = self.write.send(Message::text("\n".to_string())).await {
                        break Some(format!("heart-beat failed: {e}"));
                    }
                }
                message = self.read.next() => match message {
                    Some(Ok(Message::Close(frame))) => {
                        break Some(
                            frame
                                .map(|f| {
                                    let reason: &str = &f.reason;
                                    reason.to_string()
                                })
                                .filter(|r| !r.is_empty())
                                .unwrap_or_else(|| "closed by broker".to_string()),
                        );
                    }
                    Some(Ok(message)) => {
                        if feed_message(&mut self.decoder, &message) && !self.drain_frames().await {
                            break None;
                        }
                    }
                    Some(Err(e)) => break Some(e.to_string()),
                    None => break Some("connection reset".to_string()),
                },
            }
        };

        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        match close_reason {
            Some(reason) if was_connected => {
                warn!(reason = %reason, "Broker connection closed");
                let _ = self.events.send(BrokerEvent::Closed { reason }).await;
            }
            _ => debug!("Broker session closed"),
        }
    }

    /// Dispatch every complete frame; false once the owner is gone or the
    /// session was disconnected locally
    async fn drain_frames(&mut self) -> bool {
        loop {
            let frame = match self.decoder.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return true,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed frame");
                    return true;
                }
            };
            self.debug.emit(|| format!("<<< {}", frame.summary()));

            let event = match frame.command {
                Command::Message => {
                    let Some(subscription) = frame.get("subscription").and_then(SubscriptionId::parse)
                    else {
                        warn!(frame = %frame.summary(), "MESSAGE without a valid subscription header");
                        continue;
                    };
                    BrokerEvent::Message(InboundMessage {
                        subscription,
                        destination: frame.get("destination").unwrap_or_default().to_string(),
                        body: frame.body.clone(),
                    })
                }
                Command::Error => BrokerEvent::Error {
                    message: frame
                        .get("message")
                        .map(str::to_string)
                        .unwrap_or_else(|| String::from_utf8_lossy(&frame.body).into_owned()),
                },
                _ => continue,
            };

            if !self.connected.load(Ordering::Acquire) || self.events.send(event).await.is_err() {
                return false;
            }
        }
    }
}
