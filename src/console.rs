//! Operator console
//!
//! Lines starting with the command prefix are parsed as `verb arg1 arg2 ...`;
//! everything else is ignored. Unknown verbs are ignored as well.

use crate::context::ServerContext;
use crate::error::ServerError;
use crate::identity::leading_integer;
use crate::shard::Shard;
use crate::shutdown;

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Spawns simulated players against a shard
pub trait LoadGenerator: Send + Sync {
    fn spawn(&self, shard: Arc<dyn Shard>, count: u32);
}

/// Forward stdin lines from a dedicated thread.
///
/// A blocking stdin read cannot be cancelled, so it stays off the runtime and
/// does not hold up process exit.
pub fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// One parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCommand {
    pub verb: String,
    pub args: Vec<String>,
}

impl AdminCommand {
    /// Parse a raw line. Returns `None` for non-command lines and empty verbs.
    pub fn parse(line: &str, prefix: char) -> Option<Self> {
        let line: String = line.chars().filter(|c| *c != '\r' && *c != '\n').collect();
        let body = line.strip_prefix(prefix)?;

        let mut blocks = body.split(' ');
        let verb = blocks.next().filter(|verb| !verb.is_empty())?;

        Some(Self {
            verb: verb.to_string(),
            args: blocks.map(str::to_string).collect(),
        })
    }
}

/// What the console loop should do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
    Continue,
    /// Shards saved; terminate the process
    Exit,
}

pub struct ControlConsole {
    ctx: Arc<ServerContext>,
    generator: Arc<dyn LoadGenerator>,
    prefix: char,
}

impl ControlConsole {
    pub fn new(ctx: Arc<ServerContext>, generator: Arc<dyn LoadGenerator>, prefix: char) -> Self {
        Self {
            ctx,
            generator,
            prefix,
        }
    }

    /// Handle lines until `stop` or until the sender is dropped.
    pub async fn run(&self, mut lines: mpsc::Receiver<String>) -> ConsoleAction {
        while let Some(line) = lines.recv().await {
            if self.handle_line(&line).await == ConsoleAction::Exit {
                return ConsoleAction::Exit;
            }
        }
        debug!("Console input closed");
        ConsoleAction::Continue
    }

    /// Parse and execute one line. Errors are logged, never returned.
    pub async fn handle_line(&self, line: &str) -> ConsoleAction {
        let Some(command) = AdminCommand::parse(line, self.prefix) else {
            return ConsoleAction::Continue;
        };

        match self.dispatch(&command).await {
            Ok(action) => action,
            Err(e) => {
                error!(verb = %command.verb, error = %e, "Console command failed");
                self.ctx.metrics.record_error(e.error_type_label());
                ConsoleAction::Continue
            }
        }
    }

    pub async fn dispatch(&self, command: &AdminCommand) -> Result<ConsoleAction, ServerError> {
        match command.verb.as_str() {
            "stop" => {
                self.ctx.metrics.record_command("stop");
                info!("Safely shutting down the server...");
                shutdown::save_all(&self.ctx.pool, &self.ctx.metrics).await;
                Ok(ConsoleAction::Exit)
            }
            "saveall" => {
                self.ctx.metrics.record_command("saveall");
                shutdown::save_all(&self.ctx.pool, &self.ctx.metrics).await;
                Ok(ConsoleAction::Continue)
            }
            "alter" => {
                self.ctx.metrics.record_command("alter");
                self.alter(&command.args).await?;
                Ok(ConsoleAction::Continue)
            }
            "bot" => {
                self.ctx.metrics.record_command("bot");
                self.bot(&command.args)?;
                Ok(ConsoleAction::Continue)
            }
            other => {
                debug!(verb = other, "Ignoring unknown console command");
                Ok(ConsoleAction::Continue)
            }
        }
    }

    async fn alter(&self, args: &[String]) -> Result<(), ServerError> {
        let [database, table, kind] = args else {
            return Err(ServerError::CommandValidation(
                "Invalid command format. /alter [database] [table] [type]".to_string(),
            ));
        };

        let store = self.ctx.store.as_ref().ok_or_else(|| {
            ServerError::Config(
                "the database server is not available; enable it in the server configuration"
                    .to_string(),
            )
        })?;

        store.alter(database, table, kind).await?;
        Ok(())
    }

    fn bot(&self, args: &[String]) -> Result<(), ServerError> {
        let count = args
            .first()
            .and_then(|arg| leading_integer(arg))
            .and_then(|count| u32::try_from(count).ok())
            .filter(|count| *count > 0)
            .unwrap_or(1);

        let shard = self
            .ctx
            .pool
            .first()
            .ok_or_else(|| ServerError::Config("no shards in pool".to_string()))?;

        info!(shard_id = shard.index(), count, "Spawning bots");
        self.generator.spawn(Arc::clone(shard), count);
        Ok(())
    }
}
