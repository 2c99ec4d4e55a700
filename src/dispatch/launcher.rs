//! The open capability and its process-launching implementation.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use url::Url;

use crate::dispatch::target::HandlerTarget;

/// Errors from launching a handler.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {code:?}")]
    Exit { program: String, code: Option<i32> },

    #[error("handler {0} refused the reference")]
    Refused(String),
}

/// Opens references with a specific handler.
#[async_trait]
pub trait Opener: Send + Sync + std::fmt::Debug {
    async fn open(&self, references: &[Url], target: &HandlerTarget) -> Result<(), LaunchError>;
}

/// Launches an external program built from an argument template.
///
/// Placeholders: `{url}` (one argument per reference when it is the whole
/// argument, otherwise the references joined by spaces), `{location}` and
/// `{target}`.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Argument list for one launch.
    pub fn render_args(&self, references: &[Url], target: &HandlerTarget) -> Vec<String> {
        let mut rendered = Vec::with_capacity(self.args.len() + references.len());
        for arg in &self.args {
            if arg == "{url}" {
                rendered.extend(references.iter().map(|r| r.to_string()));
                continue;
            }
            let joined = references
                .iter()
                .map(Url::as_str)
                .collect::<Vec<_>>()
                .join(" ");
            rendered.push(
                arg.replace("{location}", &target.location)
                    .replace("{target}", &target.id)
                    .replace("{url}", &joined),
            );
        }
        rendered
    }
}

impl Default for CommandLauncher {
    fn default() -> Self {
        Self::new("open", vec!["-a".into(), "{location}".into(), "{url}".into()])
    }
}

#[async_trait]
impl Opener for CommandLauncher {
    async fn open(&self, references: &[Url], target: &HandlerTarget) -> Result<(), LaunchError> {
        let args = self.render_args(references, target);
        tracing::debug!(program = %self.program, handler = %target.id, "Launching handler");

        let status = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(LaunchError::Exit {
                program: self.program.clone(),
                code: status.code(),
            })
        }
    }
}
