//! Monitor loop: binds, prints pushes and reacts to stdin commands.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use bizosaas_realtime::{ConnectionEvent, ConnectionPool, RealtimeBinding};

use crate::config::MonitorConfig;

/// A line typed on stdin.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Reconnect,
    Update(String),
    Quit,
}

fn parse_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let cmd = parts.next()?;
    match cmd {
        "r" | "reconnect" => Some(Command::Reconnect),
        "q" | "quit" => Some(Command::Quit),
        "u" | "update" => parts.next().map(|t| Command::Update(t.to_owned())),
        _ => None,
    }
}

/// Runs the monitor until Ctrl-C or `q`.
pub async fn run(config: MonitorConfig) -> anyhow::Result<()> {
    let pool = ConnectionPool::new(config.realtime.clone());
    let mut binding = RealtimeBinding::bind(&pool, &config.tenant_id, &config.user_id)?;
    info!(url = %binding.manager().url(), "bound");

    for msg_type in &config.message_types {
        binding.on_message(msg_type.clone(), |msg| {
            info!(
                msg_type = %msg.msg_type,
                timestamp = ?msg.timestamp,
                agent_id = ?msg.agent_id,
                data = %msg.data,
                "message"
            );
        });
    }

    let mut events = binding.manager().subscribe_events();
    let mut connected = binding.watch_connected();
    if *connected.borrow_and_update() {
        announce(&binding);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    info!("commands: r = reconnect, u <type> = request update, q = quit");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("SIGINT received, shutting down");
                break;
            }

            changed = connected.changed() => {
                if changed.is_err() {
                    break;
                }
                if *connected.borrow_and_update() {
                    info!("connected");
                    announce(&binding);
                } else {
                    warn!("disconnected");
                }
            }

            event = events.recv() => match event {
                Ok(ConnectionEvent::ReconnectScheduled { attempt, delay }) => {
                    info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                }
                Ok(ConnectionEvent::ReconnectExhausted { attempts }) => {
                    warn!(attempts, "reconnect attempts exhausted, type r to retry");
                }
                Ok(ConnectionEvent::OutboundDropped { count }) => {
                    warn!(count, "outbound messages dropped");
                }
                Ok(ConnectionEvent::StateChanged(state)) => debug!(?state, "state changed"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },

            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match parse_command(&line) {
                    Some(Command::Reconnect) => {
                        info!("manual reconnect");
                        binding.manager().reconnect();
                    }
                    Some(Command::Update(update_type)) => {
                        let outcome = binding.manager().request_update(update_type.as_str());
                        info!(update_type = %update_type, ?outcome, "update requested");
                    }
                    Some(Command::Quit) => break,
                    None if line.trim().is_empty() => {}
                    None => warn!(input = %line.trim(), "unknown command"),
                },
                None => {
                    debug!("stdin closed, waiting for Ctrl-C");
                    stdin_open = false;
                }
            },
        }
    }

    binding.unbind();
    Ok(())
}

/// Asks the gateway to start both streams.
fn announce(binding: &RealtimeBinding) {
    let dashboard = binding.connect_dashboard();
    let agents = binding.connect_agents();
    debug!(?dashboard, ?agents, "stream requests sent");
}
