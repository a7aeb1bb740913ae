// src/notify/mod.rs

//! Run notifications.
//!
//! The scheduler emits a handful of [`NotifyEvent`]s over the life of a run.
//! A [`Reporter`] turns them into messages for the configured recipient and
//! hands them to a [`Notifier`]. Without a recipient nothing is sent.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::NotifySection;
use crate::errors::{Result, SchedError};
use crate::job::shell_quote;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyEvent {
    RunStarted,
    PeriodicReport,
    ThreadFinished,
    ErrorsFound,
    RunFinished,
}

impl NotifyEvent {
    pub fn key(&self) -> &'static str {
        match self {
            NotifyEvent::RunStarted => "run-started",
            NotifyEvent::PeriodicReport => "periodic-report",
            NotifyEvent::ThreadFinished => "thread-finished",
            NotifyEvent::ErrorsFound => "errors-found",
            NotifyEvent::RunFinished => "run-finished",
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            NotifyEvent::RunStarted => "Your NPR process has started",
            NotifyEvent::PeriodicReport => "Your NPR report",
            NotifyEvent::ThreadFinished => "Finished threads!",
            NotifyEvent::ErrorsFound => "Errors found!",
            NotifyEvent::RunFinished => "Your NPR process has ended",
        }
    }
}

/// Delivers a message.
pub trait Notifier: Send {
    fn notify<'a>(
        &'a mut self,
        recipient: &'a str,
        subject: &'a str,
        body: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Writes messages to the log only.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify<'a>(
        &'a mut self,
        recipient: &'a str,
        subject: &'a str,
        body: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            info!(recipient, subject, lines = body.len(), "notification");
            for line in body {
                debug!("  {line}");
            }
            Ok(())
        })
    }
}

/// Runs a shell command per message, body on stdin.
///
/// `{recipient}` and `{subject}` in the command template are replaced with
/// shell-quoted values.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    template: String,
}

impl CommandNotifier {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn command_line(&self, recipient: &str, subject: &str) -> String {
        self.template
            .replace("{recipient}", &shell_quote(recipient))
            .replace("{subject}", &shell_quote(subject))
    }
}

impl Notifier for CommandNotifier {
    fn notify<'a>(
        &'a mut self,
        recipient: &'a str,
        subject: &'a str,
        body: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let cmd = self.command_line(recipient, subject);
            let mut child = Command::new("sh")
                .arg("-c")
                .arg(&cmd)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
                .with_context(|| format!("failed to spawn notification command `{cmd}`"))?;

            if let Some(mut stdin) = child.stdin.take() {
                let mut text = body.join("\n");
                text.push('\n');
                stdin
                    .write_all(text.as_bytes())
                    .await
                    .context("failed to write notification body")?;
            }

            let status = child.wait().await?;
            if !status.success() {
                return Err(SchedError::Other(anyhow::anyhow!(
                    "notification command `{cmd}` exited with {status}"
                )));
            }
            Ok(())
        })
    }
}

/// Sends run events to one recipient. Delivery failures are logged, never
/// propagated.
pub struct Reporter {
    recipient: Option<String>,
    notifier: Box<dyn Notifier>,
}

impl Reporter {
    pub fn new(recipient: Option<String>, notifier: Box<dyn Notifier>) -> Self {
        Self {
            recipient,
            notifier,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, Box::new(LogNotifier))
    }

    pub fn from_config(cfg: &NotifySection) -> Self {
        let notifier: Box<dyn Notifier> = match &cfg.command {
            Some(cmd) => Box::new(CommandNotifier::new(cmd.clone())),
            None => Box::new(LogNotifier),
        };
        Self::new(cfg.recipient.clone(), notifier)
    }

    pub fn is_enabled(&self) -> bool {
        self.recipient.is_some()
    }

    pub async fn send(&mut self, event: NotifyEvent, body: &[String]) {
        let Some(recipient) = self.recipient.as_deref() else {
            return;
        };
        debug!(event = event.key(), "sending notification");
        if let Err(e) = self.notifier.notify(recipient, event.subject(), body).await {
            warn!(event = event.key(), error = %e, "notification failed");
        }
    }
}
