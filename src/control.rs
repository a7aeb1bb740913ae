// src/control.rs

//! Ctrl-C handling.
//!
//! Without `--interactive` the first Ctrl-C cancels the run. With it, a
//! small menu is shown on stderr and the answer is read from stdin:
//! quit, change verbosity, enable debug output, or continue.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};

use crate::logging::{LogControl, parse_level_str};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlChoice {
    Quit,
    Verbosity,
    Debug,
    Continue,
}

/// Parse a menu answer.
pub fn parse_choice(input: &str) -> Option<ControlChoice> {
    match input.trim().to_lowercase().as_str() {
        "q" | "quit" => Some(ControlChoice::Quit),
        "v" | "verbosity" => Some(ControlChoice::Verbosity),
        "d" | "debug" => Some(ControlChoice::Debug),
        "c" | "continue" | "" => Some(ControlChoice::Continue),
        _ => None,
    }
}

/// Spawn the Ctrl-C listener. It stops when `cancel` is cancelled.
pub fn spawn_interrupt_handler(
    cancel: CancellationToken,
    log_control: Option<LogControl>,
    interactive: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                res = tokio::signal::ctrl_c() => {
                    if let Err(e) = res {
                        warn!(error = %e, "failed to listen for Ctrl+C");
                        return;
                    }
                }
            }

            if !interactive {
                warn!("interrupt received; shutting down");
                cancel.cancel();
                return;
            }

            eprintln!();
            eprintln!("What do you want to do?");
            eprintln!("  q) quit");
            eprintln!("  v) change verbosity");
            eprintln!("  d) enable debug output");
            eprintln!("  c) continue execution");

            let answer = match lines.next_line().await {
                Ok(Some(line)) => line,
                // stdin closed: nobody to ask, so stop.
                Ok(None) | Err(_) => "q".to_string(),
            };

            match parse_choice(&answer) {
                Some(ControlChoice::Quit) => {
                    info!("quit requested; shutting down");
                    cancel.cancel();
                    return;
                }
                Some(ControlChoice::Verbosity) => {
                    eprintln!("new level (error, warn, info, debug, trace):");
                    let level = match lines.next_line().await {
                        Ok(Some(l)) => parse_level_str(&l),
                        _ => None,
                    };
                    match level {
                        Some(level) => set_level(&log_control, level),
                        None => eprintln!("unknown level; keeping the current one"),
                    }
                }
                Some(ControlChoice::Debug) => set_level(&log_control, Level::DEBUG),
                Some(ControlChoice::Continue) => info!("continuing"),
                None => eprintln!("unknown choice {answer:?}; continuing"),
            }
        }
    })
}

fn set_level(log_control: &Option<LogControl>, level: Level) {
    match log_control {
        Some(control) => match control.set_level(level) {
            Ok(()) => info!(%level, "log level changed"),
            Err(e) => warn!(error = %e, "cannot change log level"),
        },
        None => warn!("log level cannot be changed in this session"),
    }
}
