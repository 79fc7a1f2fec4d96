//! Line transport
//!
//! Connects the engine to a byte stream: a serial port, a TCP socket, or a
//! `DuplexStream` from `tokio::io::duplex()` for the simulator. The task
//! writes framed commands from the engine, splits received bytes into CR LF
//! lines, drops prompts, reports device errors separately and forwards
//! everything else to the engine in arrival order.

use std::time::Duration;

use dsp_protocol::{classify_line, LineCodec, LineKind};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, trace, warn};

use crate::error::EngineError;

/// What the transport tells the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The stream is open
    Connected,
    /// A candidate response line
    Line(String),
    /// A line reporting a device error
    DeviceError(String),
    /// A prompt or empty line; the link is alive but there is nothing to parse
    Activity,
    /// The stream closed or failed
    Disconnected,
    /// Opening or running the connection failed
    Failed {
        /// Connection that failed
        source: String,
        /// Error message
        message: String,
    },
}

/// Engine end of the transport channels
#[derive(Debug)]
pub struct EngineLink {
    /// Framed text to write
    pub outbound: mpsc::UnboundedSender<String>,
    /// Lines and link state from the transport
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Transport end of the transport channels
///
/// Outlives individual connections: a reconnect loop hands the same link to
/// each new [`LineConnection`].
#[derive(Debug)]
pub struct TransportLink {
    /// Framed text to write
    pub outbound: mpsc::UnboundedReceiver<String>,
    /// Lines and link state for the engine
    pub inbound: mpsc::UnboundedSender<TransportEvent>,
}

impl TransportLink {
    /// Whether the engine end is gone
    pub fn is_closed(&self) -> bool {
        self.inbound.is_closed()
    }

    /// Tell the engine a connection attempt failed
    pub fn report_error(&self, source: impl Into<String>, message: impl Into<String>) {
        let _ = self.inbound.send(TransportEvent::Failed {
            source: source.into(),
            message: message.into(),
        });
    }
}

/// Create a connected pair of link ends
pub fn link() -> (EngineLink, TransportLink) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    (
        EngineLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        },
        TransportLink {
            outbound: outbound_rx,
            inbound: inbound_tx,
        },
    )
}

/// Why a connection's run loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// The peer closed the stream
    Closed,
    /// The engine dropped its end of the link
    EngineGone,
}

/// One open byte stream to the DSP
///
/// Generic over the I/O type; for the simulator use `DuplexStream` from
/// `tokio::io::duplex()`.
pub struct LineConnection<T> {
    name: String,
    io: T,
    codec: LineCodec,
    buffer: Vec<u8>,
}

impl LineConnection<SerialStream> {
    /// Open a serial port
    pub fn open_serial(port_name: &str, baud_rate: u32) -> Result<Self, EngineError> {
        let stream = tokio_serial::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open_native_async()?;

        Ok(Self::new(port_name.to_string(), stream))
    }
}

impl LineConnection<TcpStream> {
    /// Connect to a TCP endpoint
    pub async fn connect_tcp(address: &str, port: u16) -> Result<Self, EngineError> {
        let stream = TcpStream::connect((address, port)).await?;
        stream.set_nodelay(true)?;

        Ok(Self::new(format!("{}:{}", address, port), stream))
    }
}

impl<T> LineConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an already open stream
    pub fn new(name: String, io: T) -> Self {
        Self {
            name,
            io,
            codec: LineCodec::new(),
            buffer: vec![0u8; 1024],
        }
    }

    /// Connection name for logging
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pump the stream until it closes or the engine goes away
    ///
    /// Sends `Connected` on entry and `Disconnected` on every exit path. An
    /// I/O failure is returned after the disconnect has been reported.
    pub async fn run(mut self, link: &mut TransportLink) -> Result<ConnectionEnd, EngineError> {
        info!("Connection to {} open", self.name);
        let _ = link.inbound.send(TransportEvent::Connected);

        let result = self.pump(link).await;

        info!("Connection to {} closed", self.name);
        let _ = link.inbound.send(TransportEvent::Disconnected);
        result
    }

    async fn pump(&mut self, link: &mut TransportLink) -> Result<ConnectionEnd, EngineError> {
        loop {
            tokio::select! {
                text = link.outbound.recv() => {
                    let Some(text) = text else {
                        debug!("Engine link closed for {}", self.name);
                        return Ok(ConnectionEnd::EngineGone);
                    };
                    trace!("Writing {} bytes to {}", text.len(), self.name);
                    self.io.write_all(text.as_bytes()).await?;
                    self.io.flush().await?;
                }

                result = self.io.read(&mut self.buffer) => {
                    let n = result?;
                    if n == 0 {
                        debug!("Stream closed by {}", self.name);
                        return Ok(ConnectionEnd::Closed);
                    }

                    self.codec.push_bytes(&self.buffer[..n]);
                    while let Some(line) = self.codec.next_line() {
                        match line {
                            Ok(line) => {
                                if link.inbound.send(classify(line)).is_err() {
                                    return Ok(ConnectionEnd::EngineGone);
                                }
                            }
                            Err(e) => warn!("Discarding input from {}: {}", self.name, e),
                        }
                    }
                }
            }
        }
    }
}

/// Apply the receive filter to one de-framed line
pub fn classify(line: String) -> TransportEvent {
    match classify_line(&line) {
        LineKind::Noise => {
            trace!("RX prompt: '{}'", line);
            TransportEvent::Activity
        }
        LineKind::Error => TransportEvent::DeviceError(line),
        LineKind::Response => {
            debug!("RX: '{}'", line);
            TransportEvent::Line(line)
        }
    }
}
