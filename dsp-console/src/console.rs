//! Operator console
//!
//! Reads commands from stdin and prints engine events as they arrive.

use anyhow::{bail, Result};
use dsp_engine::{ControlAction, EngineError, EngineEvent, EngineHandle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, warn};

const HELP: &str = "\
Commands:
  info                 list units that answered the version query
  status               link, monitor and queue status
  list                 control points and their state
  get <key>            state of one control point
  poll                 query every control point now
  mute <key>           mute a control point
  unmute <key>         unmute a control point
  toggle <key>         invert the mute on the device
  level <key> <0-65535>  set an absolute level
  up <key> / down <key>  step the gain by one dB
  send <text>          transmit raw command text now, outside the queue
  enqueue <text>       queue raw command text
  traffic on|off       print every line sent and received
  quit                 exit";

/// One line of operator input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Info,
    Status,
    List,
    Get(String),
    Poll,
    Control { key: String, action: ControlAction },
    Send(String),
    Enqueue(String),
    Traffic(bool),
    Quit,
}

/// Parse one input line; blank input yields `Ok(None)`
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(word, rest)| (word, rest.trim()));

    let command = match word.to_ascii_lowercase().as_str() {
        "" => return Ok(None),
        "help" | "?" => ConsoleCommand::Help,
        "info" => ConsoleCommand::Info,
        "status" => ConsoleCommand::Status,
        "list" | "ls" => ConsoleCommand::List,
        "poll" => ConsoleCommand::Poll,
        "get" => ConsoleCommand::Get(key_arg(rest)?),
        "mute" => control(rest, ControlAction::MuteOn)?,
        "unmute" => control(rest, ControlAction::MuteOff)?,
        "toggle" => control(rest, ControlAction::MuteToggle)?,
        "up" => control(rest, ControlAction::VolumeUp { pressed: true })?,
        "down" => control(rest, ControlAction::VolumeDown { pressed: true })?,
        "level" => {
            let (key, value) = rest
                .split_once(char::is_whitespace)
                .ok_or("usage: level <key> <0-65535>")?;
            let level: u16 = value
                .trim()
                .parse()
                .map_err(|_| format!("level must be 0-65535, got '{}'", value.trim()))?;
            control(key, ControlAction::SetVolume(level))?
        }
        "send" => ConsoleCommand::Send(text_arg(rest)?),
        "enqueue" => ConsoleCommand::Enqueue(text_arg(rest)?),
        "traffic" => match rest {
            "on" => ConsoleCommand::Traffic(true),
            "off" => ConsoleCommand::Traffic(false),
            _ => return Err("usage: traffic on|off".to_string()),
        },
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

fn key_arg(rest: &str) -> Result<String, String> {
    match rest.split_whitespace().collect::<Vec<_>>().as_slice() {
        [key] => Ok(key.to_string()),
        _ => Err("expected one control point key".to_string()),
    }
}

fn control(rest: &str, action: ControlAction) -> Result<ConsoleCommand, String> {
    Ok(ConsoleCommand::Control {
        key: key_arg(rest)?,
        action,
    })
}

/// Raw command text; a leading `#` is dropped since the engine adds framing
fn text_arg(rest: &str) -> Result<String, String> {
    let text = rest.strip_prefix('#').unwrap_or(rest).trim();
    if text.is_empty() {
        return Err("expected command text".to_string());
    }
    Ok(text.to_string())
}

/// Render an event for the console; traffic only when asked for
pub fn format_event(event: &EngineEvent, traffic: bool) -> Option<String> {
    let text = match event {
        EngineEvent::MuteChanged { key, muted, .. } => {
            format!("{}: {}", key, if *muted { "muted" } else { "unmuted" })
        }
        EngineEvent::LevelChanged { key, level, .. } => format!("{}: level {}", key, level),
        EngineEvent::DeviceInfo { key, record } => format!(
            "Device {}: {} firmware {}",
            key, record.device_type, record.version
        ),
        EngineEvent::DeviceError { line } => format!("Device error: {}", line),
        EngineEvent::CommandTimedOut { text } => format!("No reply to '{}'", text),
        EngineEvent::Connected => "Connected".to_string(),
        EngineEvent::Disconnected => "Disconnected".to_string(),
        EngineEvent::StatusChanged { status } => format!("Status: {}", status),
        EngineEvent::Error { source, message } => format!("{}: {}", source, message),
        EngineEvent::CommandSent { text } if traffic => format!("TX #{}", text),
        EngineEvent::LineReceived { line } if traffic => format!("RX {}", line),
        EngineEvent::CommandSent { .. } | EngineEvent::LineReceived { .. } => return None,
    };
    Some(text)
}

async fn execute(handle: &EngineHandle, command: ConsoleCommand) -> Result<(), EngineError> {
    match command {
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Info => print!("{}", handle.device_report().await?),
        ConsoleCommand::Status => {
            let status = handle.status().await?;
            println!("Connected:  {}", status.connected);
            println!("Monitor:    {}", status.monitor);
            println!(
                "In flight:  {}",
                status.in_flight.as_deref().unwrap_or("-")
            );
            println!("Queued:     {}", status.queued);
            println!("Devices:    {}", status.devices);
        }
        ConsoleCommand::List => {
            for cp in handle.control_points().await? {
                println!(
                    "{:<28} {:<20} muted={:<5} level={}",
                    cp.key, cp.label, cp.state.muted, cp.state.level
                );
            }
        }
        ConsoleCommand::Get(key) => {
            let cp = handle.control_point(&key).await?;
            let state = cp.state().await?;
            println!("{}: muted={} level={}", cp.key(), state.muted, state.level);
        }
        ConsoleCommand::Poll => handle.poll()?,
        ConsoleCommand::Control { key, action } => {
            let cp = handle.control_point(&key).await?;
            handle.control(cp.id(), action)?;
        }
        ConsoleCommand::Send(text) => handle.raw_send(text)?,
        ConsoleCommand::Enqueue(text) => handle.enqueue(text)?,
        ConsoleCommand::Traffic(_) | ConsoleCommand::Quit => {}
    }
    Ok(())
}

/// Run the console until `quit`, end of input, or the engine stops
pub async fn run(handle: EngineHandle) -> Result<()> {
    let mut events = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut traffic = false;

    println!("dspctl ready, type 'help' for commands");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("End of console input");
                    break;
                };

                match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(ConsoleCommand::Quit)) => break,
                    Ok(Some(ConsoleCommand::Traffic(on))) => {
                        traffic = on;
                        println!("Traffic {}", if on { "on" } else { "off" });
                    }
                    Ok(Some(command)) => match execute(&handle, command).await {
                        Ok(()) => {}
                        Err(EngineError::EngineStopped) => bail!("engine stopped"),
                        Err(e) => println!("Error: {}", e),
                    },
                    Err(message) => println!("{}", message),
                }
            }

            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(text) = format_event(&event, traffic) {
                        println!("{}", text);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Console missed {} event(s)", n);
                }
                Err(broadcast::error::RecvError::Closed) => bail!("engine stopped"),
            }
        }
    }

    Ok(())
}
