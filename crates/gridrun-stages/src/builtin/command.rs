//! External program stage.
//!
//! Runs a configured command line in the point directory and waits for it.
//! This is the only place a point blocks; the wait holds one worker slot
//! and nothing else.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use gridrun_core::{GridCoordinate, Params};
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::{PointContext, RegistryError, Slot, Stage, StageConfig, StageError};

const DEFAULT_STDOUT: &str = "RESULT.OUT";

/// Runs an external program; a non-zero exit declines the point.
#[derive(Debug, Clone)]
pub struct CommandStage {
    slot: Slot,
    program: String,
    args: Vec<String>,
    stdout_file: String,
    env_vars: Vec<(String, String)>,
}

impl CommandStage {
    /// Build from the slot namespace.
    ///
    /// Reads `command` (falling back to the run-wide `executable` for the
    /// model slot), `stdout` and an optional `env` mapping.
    pub fn from_config(cfg: &StageConfig) -> Result<Self, RegistryError> {
        let ns = cfg.slot.key();
        let params: &Params = &cfg.params;

        let line = params
            .text_in(ns, "command")
            .or_else(|| match cfg.slot {
                Slot::Model => params.text("executable"),
                _ => None,
            })
            .ok_or_else(|| cfg.invalid("missing 'command'"))?;

        let mut words = line.split_whitespace().map(str::to_string);
        let program = words
            .next()
            .ok_or_else(|| cfg.invalid("'command' is empty"))?;

        let env_vars = match params.get_in(ns, "env") {
            None => Vec::new(),
            Some(Value::Object(vars)) => vars
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect(),
            Some(_) => return Err(cfg.invalid("'env' must be a mapping")),
        };

        Ok(Self {
            slot: cfg.slot,
            program,
            args: words.collect(),
            stdout_file: params
                .text_in(ns, "stdout")
                .unwrap_or_else(|| DEFAULT_STDOUT.to_string()),
            env_vars,
        })
    }

    /// Expand `{lat}`, `{lon}`, `{tlat}` and `{tlon}` in an argument.
    fn expand(arg: &str, coordinate: &GridCoordinate) -> String {
        arg.replace("{lat}", &format!("{:04}", coordinate.point.lat))
            .replace("{lon}", &format!("{:04}", coordinate.point.lon))
            .replace("{tlat}", &format!("{:04}", coordinate.tile.lat))
            .replace("{tlon}", &format!("{:04}", coordinate.tile.lon))
    }
}

#[async_trait]
impl Stage for CommandStage {
    fn class_name(&self) -> &'static str {
        "command"
    }

    async fn run(&self, ctx: &PointContext) -> Result<bool, StageError> {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| Self::expand(a, &ctx.coordinate))
            .collect();

        let mut cmd = Command::new(&self.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(&ctx.work_dir)
            .kill_on_drop(true);
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }

        debug!(slot = %self.slot, program = %self.program, args = ?args, "Spawning command");

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(
                    slot = %self.slot,
                    program = %self.program,
                    error = %e,
                    "Failed to spawn command"
                );
                return Ok(false);
            }
        };

        // Forward stderr to the log while the program runs
        if let Some(stderr) = child.stderr.take() {
            let point = ctx.coordinate.point;
            let slot = self.slot;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => {
                            let trimmed = line.trim();
                            if !trimmed.is_empty() {
                                warn!(
                                    point = %point,
                                    slot = %slot,
                                    stderr = %trimmed,
                                    "Command stderr"
                                );
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            error!(error = %e, "Error reading command stderr");
                            break;
                        }
                    }
                }
            });
        }

        // Capture stdout into the point directory
        if let Some(mut stdout) = child.stdout.take() {
            let mut capture = File::create(ctx.work_dir.join(&self.stdout_file)).await?;
            tokio::io::copy(&mut stdout, &mut capture).await?;
            capture.flush().await?;
        }

        let status = child.wait().await?;
        let exit_code = status.code().unwrap_or(-1);
        info!(
            point = %ctx.coordinate,
            slot = %self.slot,
            exit_code,
            success = status.success(),
            "Command exited"
        );

        Ok(status.success())
    }

    fn verify(&self, _coordinate: &GridCoordinate) -> (bool, String) {
        let program = Path::new(&self.program);
        if program.components().count() > 1 && !program.exists() {
            return (
                false,
                format!("{} program {} does not exist", self.slot, self.program),
            );
        }
        (true, format!("{} command is defined", self.slot))
    }
}
