//! Operator console
//!
//! Line-oriented command surface: `send-to-port`, `status`, `help`, `quit`.
//! Output is human-readable, with colors when the terminal supports them.

use std::sync::Arc;

use cardframe_core::command::SEND_COMMAND;
use cardframe_core::ConnectivityState;
use cardframe_hardware::{DeviceStatus, Registry};
use colored::*;
use tabled::{settings::Style, Table, Tabled};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::dispatcher::{DispatchOutcome, PortDispatcher};

const COMMANDS: &str = "\
Commands:
  send-to-port [-i:<chassis>] -p:<port> <payload...>   write a payload to a serial port
  status                                              list devices and their state
  help                                                show this list
  quit                                                leave the console";

/// What the console loop does after a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
    Continue,
    Quit,
}

pub struct Console {
    dispatcher: PortDispatcher,
    registry: Arc<Registry>,
    prompt: String,
}

impl Console {
    pub fn new(dispatcher: PortDispatcher, registry: Arc<Registry>, prompt: impl Into<String>) -> Self {
        Self {
            dispatcher,
            registry,
            prompt: prompt.into(),
        }
    }

    /// Execute one console line, returning the text to show
    pub async fn execute(&self, line: &str) -> (ConsoleAction, String) {
        let line = line.trim();
        let (command, args) = line
            .split_once(char::is_whitespace)
            .unwrap_or((line, ""));

        match command {
            "" => (ConsoleAction::Continue, String::new()),
            SEND_COMMAND => {
                let outcome = self.dispatcher.dispatch(args).await;
                (ConsoleAction::Continue, format_outcome(&outcome))
            }
            "status" => {
                let statuses = self.registry.snapshot().await;
                (ConsoleAction::Continue, format_status(&statuses))
            }
            "help" | "?" => (ConsoleAction::Continue, COMMANDS.to_string()),
            "quit" | "exit" => (ConsoleAction::Quit, String::new()),
            other => (
                ConsoleAction::Continue,
                format!(
                    "{} unknown command '{}' (try 'help')",
                    "✗".red().bold(),
                    other
                ),
            ),
        }
    }

    /// Read commands from `input` until it ends or `quit` is entered
    pub async fn run<R, W>(&self, input: R, output: &mut W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();

        loop {
            output.write_all(self.prompt.as_bytes()).await?;
            output.flush().await?;

            let Some(line) = lines.next_line().await? else {
                debug!("Console input closed");
                break;
            };

            let (action, text) = self.execute(&line).await;
            if !text.is_empty() {
                output.write_all(text.as_bytes()).await?;
                output.write_all(b"\n").await?;
            }
            if action == ConsoleAction::Quit {
                break;
            }
        }

        output.flush().await
    }
}

/// Render a dispatch outcome for the operator
pub fn format_outcome(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Ignored => String::new(),
        DispatchOutcome::Help(usage) => usage.to_string(),
        DispatchOutcome::Sent { port, bytes } => {
            format!("{} sent {} byte(s) to {}", "✓".green().bold(), bytes, port)
        }
        DispatchOutcome::Failed { port_index, error } => {
            let target = match port_index {
                Some(index) => format!("port {}", index),
                None => "port ?".to_string(),
            };
            format!(
                "{} send to {} failed [{}]: {}",
                "✗".red().bold(),
                target,
                error.kind().as_str(),
                error
            )
        }
    }
}

/// Render the device table for `status`
pub fn format_status(statuses: &[DeviceStatus]) -> String {
    if statuses.is_empty() {
        return "No devices".yellow().to_string();
    }

    #[derive(Tabled)]
    struct DeviceRow {
        #[tabled(rename = "Device")]
        device: String,
        #[tabled(rename = "State")]
        state: String,
        #[tabled(rename = "Detail")]
        detail: String,
    }

    let rows: Vec<DeviceRow> = statuses
        .iter()
        .map(|status| DeviceRow {
            device: status.id.to_string(),
            state: color_state(status.state),
            detail: status.detail.clone(),
        })
        .collect();

    let table = Table::new(rows).with(Style::rounded()).to_string();
    format!("{}\n{}", "Devices:".bold(), table)
}

fn color_state(state: ConnectivityState) -> String {
    match state {
        ConnectivityState::Online => state.as_str().green().to_string(),
        ConnectivityState::Offline => state.as_str().yellow().to_string(),
        ConnectivityState::RegistrationFailed => state.as_str().red().to_string(),
        _ => state.as_str().to_string(),
    }
}
