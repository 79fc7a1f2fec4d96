//! Virtual DSP actor task
//!
//! Owns a [`VirtualDsp`] and serves it over an async stream. The task uses a
//! select! loop to:
//! - Read CR LF lines from the stream and write the replies back
//! - Handle control commands (silence, announcements, injected lines)
//! - Report every received command on a broadcast channel

use std::io;

use dsp_protocol::{LineCodec, LINE_TERMINATOR};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::VirtualDsp;

/// Commands that can be sent to a virtual DSP task
#[derive(Debug, Clone)]
pub enum VirtualDspCommand {
    /// Stop or resume answering
    SetSilent(bool),
    /// Write one version banner per unit, unsolicited
    Announce,
    /// Write an arbitrary line, e.g. a stray prompt or an `ERROR`
    InjectLine(String),
    /// Shutdown the virtual DSP task
    Shutdown,
}

/// Traffic observed by a virtual DSP task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualDspEvent {
    /// A command line arrived, as written on the wire without the terminator
    CommandReceived(String),
    /// A line was written back
    LineSent(String),
}

/// Run the virtual DSP task until the stream closes or it is told to stop
///
/// Returns the simulator so tests can inspect its final state.
pub async fn run_virtual_dsp_task<S>(
    mut stream: S,
    mut dsp: VirtualDsp,
    mut cmd_rx: mpsc::Receiver<VirtualDspCommand>,
    event_tx: broadcast::Sender<VirtualDspEvent>,
) -> io::Result<VirtualDsp>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut codec = LineCodec::new();
    let mut buf = [0u8; 1024];

    info!(
        "Starting virtual DSP task for {} ({} unit(s))",
        dsp.id(),
        dsp.units().len()
    );

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual DSP stream closed for {}", dsp.id());
                        break;
                    }
                    Ok(n) => {
                        codec.push_bytes(&buf[..n]);
                        while let Some(line) = codec.next_line() {
                            let line = match line {
                                Ok(line) => line,
                                Err(e) => {
                                    warn!("Virtual DSP {} discarding input: {}", dsp.id(), e);
                                    continue;
                                }
                            };
                            let _ = event_tx.send(VirtualDspEvent::CommandReceived(line.clone()));
                            let replies = dsp.process_line(&line);
                            write_lines(&mut stream, &replies, &event_tx).await?;
                        }
                    }
                    Err(e) => {
                        warn!("Virtual DSP {} stream error: {}", dsp.id(), e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(VirtualDspCommand::SetSilent(silent)) => {
                        info!("Virtual DSP {} silent set to {}", dsp.id(), silent);
                        dsp.set_silent(silent);
                    }
                    Some(VirtualDspCommand::Announce) => {
                        let banners = dsp.banner_lines();
                        write_lines(&mut stream, &banners, &event_tx).await?;
                    }
                    Some(VirtualDspCommand::InjectLine(line)) => {
                        write_lines(&mut stream, &[line], &event_tx).await?;
                    }
                    Some(VirtualDspCommand::Shutdown) => {
                        info!("Shutdown requested for virtual DSP {}", dsp.id());
                        break;
                    }
                    None => {
                        debug!("Command channel closed for virtual DSP {}", dsp.id());
                        break;
                    }
                }
            }
        }
    }

    info!("Virtual DSP task ended for {}", dsp.id());
    Ok(dsp)
}

async fn write_lines<S>(
    stream: &mut S,
    lines: &[String],
    event_tx: &broadcast::Sender<VirtualDspEvent>,
) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    if lines.is_empty() {
        return Ok(());
    }
    for line in lines {
        stream.write_all(line.as_bytes()).await?;
        stream.write_all(LINE_TERMINATOR.as_bytes()).await?;
        let _ = event_tx.send(VirtualDspEvent::LineSent(line.clone()));
    }
    stream.flush().await
}
