//! linkroute command-line front end
//!
//! # Architecture Overview
//!
//! ```text
//!     reference / envelope
//!     ─────────────────────▶ intake ──▶ decide ──────────────▶ dispatch ──▶ launcher
//!                                        │ legacy engine         │ loop guard
//!                                        │ rule engine + rewrite │ single / failover / fan-out
//!                                        │ shadow comparator     │
//!                                        ▼                       ▼
//!                                    rule store            handler discovery
//!                                 (rules.json + backup)    profiles / workspaces
//! ```

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use url::Url;

use linkroute::config::{load_config, RouterConfig};
use linkroute::observability::{init_logging, DiagnosticsSink, TracingDiagnostics};
use linkroute::routing::{DispatchMode, EvaluationContext, SourceContext, SourceTrigger};
use linkroute::rules::{RuleSource, RuleStore};
use linkroute::service::{HandoffOutcome, LinkRouter, OpenOutcome};

#[derive(Parser)]
#[command(name = "linkroute")]
#[command(about = "Route links, mail addresses and files to the right handler", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Defaults to ~/.linkroute/config.toml when present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide and open one or more references
    Open {
        #[arg(required = true)]
        references: Vec<String>,

        /// Multi-target strategy: single, failover or fanout
        #[arg(long)]
        mode: Option<DispatchMode>,

        /// Explicit handler ids, bypassing the decision
        #[arg(long = "target")]
        targets: Vec<String>,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        context: ContextArgs,
    },
    /// Show how both engines would decide, without opening anything
    Explain {
        reference: String,

        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        context: ContextArgs,
    },
    /// Process a browser-extension envelope ("-" reads stdin)
    Handoff {
        envelope: PathBuf,

        /// Reference opened directly when the envelope is rejected
        #[arg(long)]
        fallback: Option<Url>,
    },
    /// Inspect or edit the rule store
    Rules {
        #[command(subcommand)]
        command: RulesCommand,
    },
    /// List discovered handlers
    Handlers,
}

#[derive(Subcommand)]
enum RulesCommand {
    /// Print every rule
    List,
    /// Always open a host in a handler
    SetHost { host: String, target: String },
    /// Always ask for a host
    AskHost { host: String },
    /// Delete a rule by id
    Remove { rule_id: String },
    /// Print the version-1 projection
    ExportLegacy,
}

#[derive(Args)]
struct SourceArgs {
    /// Identifier of the application the reference came from
    #[arg(long)]
    source_app: Option<String>,

    /// coldStart, warmOpen, extensionToolbar, extensionContextMenu, share, handoff
    #[arg(long, value_parser = parse_trigger, default_value = "warmOpen")]
    trigger: SourceTrigger,
}

impl SourceArgs {
    fn context(&self) -> SourceContext {
        SourceContext::new(self.source_app.clone(), self.trigger, true)
    }
}

#[derive(Args)]
struct ContextArgs {
    /// Modifier key held while opening (repeatable)
    #[arg(long = "modifier")]
    modifiers: Vec<String>,

    #[arg(long)]
    focus: Option<String>,

    #[arg(long = "context")]
    context_tag: Option<String>,
}

impl ContextArgs {
    fn evaluation(&self) -> EvaluationContext {
        EvaluationContext {
            modifier_keys: self.modifiers.clone(),
            focus_hint: self.focus.clone(),
            context_tag: self.context_tag.clone(),
            ..EvaluationContext::default()
        }
    }
}

fn parse_trigger(raw: &str) -> Result<SourceTrigger, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| format!("unknown trigger: {raw}"))
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match resolve_config_path(cli.config.as_deref()) {
        Some(path) => load_config(&path)?,
        None => RouterConfig::default(),
    };
    init_logging(&config.observability.log_level);

    tracing::debug!(
        store = %config.store.path.display(),
        handlers = config.handlers.len(),
        rollout = ?config.rollout.mode(),
        "Configuration loaded"
    );

    let diagnostics: Arc<dyn DiagnosticsSink> = Arc::new(TracingDiagnostics);
    let store = Arc::new(RuleStore::open(config.store.paths(), diagnostics.clone()));
    let router = LinkRouter::from_config(&config, store.clone(), diagnostics);

    match cli.command {
        Commands::Open {
            references,
            mode,
            targets,
            source,
            context,
        } => {
            let mut ok = true;
            let mut results = Vec::with_capacity(references.len());
            for reference in &references {
                if mode.is_some() || !targets.is_empty() {
                    let mode = mode.unwrap_or_default();
                    match router.open_with(reference, source.context(), &targets, mode).await {
                        Ok(result) => {
                            ok &= result.outcome == linkroute::dispatch::MultiOutcome::Success;
                            results.push(serde_json::to_value(result)?);
                        }
                        Err(reason) => {
                            ok = false;
                            results.push(serde_json::to_value(OpenOutcome::Rejected { reason })?);
                        }
                    }
                } else {
                    let outcome = router.open(reference, source.context(), &context.evaluation()).await;
                    ok &= !matches!(outcome, OpenOutcome::Failed { .. } | OpenOutcome::Rejected { .. });
                    results.push(serde_json::to_value(outcome)?);
                }
            }
            print_json(&results)?;
            Ok(exit_code(ok))
        }
        Commands::Explain {
            reference,
            source,
            context,
        } => match router.explain(&reference, source.context(), &context.evaluation()) {
            Ok(explanation) => {
                print_json(&explanation)?;
                Ok(ExitCode::SUCCESS)
            }
            Err(reason) => {
                print_json(&OpenOutcome::Rejected { reason })?;
                Ok(ExitCode::FAILURE)
            }
        },
        Commands::Handoff { envelope, fallback } => {
            let data = read_envelope(&envelope).await?;
            let outcome = router
                .handoff(&data, fallback.as_ref(), &EvaluationContext::default())
                .await;
            let ok = !matches!(outcome, HandoffOutcome::Rejected { .. });
            print_json(&outcome)?;
            Ok(exit_code(ok))
        }
        Commands::Rules { command } => {
            match command {
                RulesCommand::List => print_json(&store.rules())?,
                RulesCommand::SetHost { host, target } => {
                    store.set_always_open_in(&host, &target)?;
                    print_json(&store.action_for_host(&host))?;
                }
                RulesCommand::AskHost { host } => {
                    store.set_always_ask(&host)?;
                    print_json(&store.action_for_host(&host))?;
                }
                RulesCommand::Remove { rule_id } => {
                    let removed = store.remove_rule(&rule_id)?;
                    print_json(&serde_json::json!({ "ruleId": rule_id, "removed": removed }))?;
                }
                RulesCommand::ExportLegacy => {
                    println!("{}", String::from_utf8_lossy(&store.export_legacy()?));
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Handlers => {
            print_json(&router.discovered())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let default = PathBuf::from(std::env::var_os("HOME")?).join(".linkroute").join("config.toml");
    default.exists().then_some(default)
}

async fn read_envelope(path: &Path) -> std::io::Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut data = Vec::new();
        tokio::io::stdin().read_to_end(&mut data).await?;
        return Ok(data);
    }
    tokio::fs::read(path).await
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
