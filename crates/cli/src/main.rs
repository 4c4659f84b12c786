//! Interactive terminal front end for the agent.
//!
//! One session per process. Slash commands control the session
//! (`/mode`, `/clear`, `/quit`); everything else is sent to the agent,
//! with approval prompts answered inline.

mod config;

use std::io::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use agent::{AgentRuntime, ApprovalManager, LlmProvider, OpenAiProvider, ToolRegistry};
use anyhow::Context;
use clap::Parser;
use gateway::SessionManager;
use proto::{AgentEvent, ApprovalDecision, ApprovalRequest, CompletionReason, EditMode, SessionId};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tools::{BashTool, ListDirTool, PatchFileTool, ReadFileTool, WebFetchTool, WriteFileTool};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "agent", about = "Coding agent with policy-gated tool execution")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Edit mode to start in: plan, ask, or allow.
    #[arg(long)]
    mode: Option<String>,

    /// Workspace root the tools operate in.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Model id to request.
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(model) = cli.model {
        config.llm.model = model;
    }
    if let Some(mode) = &cli.mode {
        config.agent.default_mode =
            EditMode::from_str(mode).with_context(|| format!("invalid --mode '{mode}'"))?;
    }
    if let Some(workspace) = cli.workspace {
        config.agent.workspace_root = Some(workspace);
    }
    config.validate()?;

    let workspace_root = match &config.agent.workspace_root {
        Some(path) => path.clone(),
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let api_key = config
        .llm
        .api_key
        .clone()
        .unwrap_or_default();

    let provider: Arc<dyn LlmProvider> = match &config.llm.base_url {
        Some(url) => Arc::new(OpenAiProvider::with_base_url(api_key, url.clone())),
        None => Arc::new(OpenAiProvider::new(api_key)),
    };

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ReadFileTool))?;
    registry.register(Arc::new(ListDirTool))?;
    registry.register(Arc::new(WriteFileTool))?;
    registry.register(Arc::new(PatchFileTool))?;
    registry.register(Arc::new(BashTool::new()))?;
    registry.register(Arc::new(WebFetchTool::new()))?;

    let approvals = Arc::new(ApprovalManager::new());
    let runtime = Arc::new(
        AgentRuntime::new(
            provider,
            Arc::new(registry),
            approvals.clone(),
            workspace_root.clone(),
            config.llm.model.clone(),
        )
        .with_limits(config.limits()),
    );
    let manager = Arc::new(SessionManager::new(
        runtime,
        approvals,
        config.agent.default_mode,
    ));

    let session = SessionId::new();
    info!(
        model = %config.llm.model,
        workspace = %workspace_root.display(),
        mode = %config.agent.default_mode,
        "Agent started"
    );
    println!(
        "agent ready — model {}, workspace {}, mode {}",
        config.llm.model,
        workspace_root.display(),
        config.agent.default_mode
    );
    println!("commands: /mode [plan|ask|allow], /clear, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line {
            "/quit" | "/exit" => break,
            "/clear" => {
                manager.clear_session(&session);
                println!("session cleared");
            }
            "/mode" => {
                let mode = manager.mode(&session).unwrap_or(config.agent.default_mode);
                println!("edit mode: {mode}");
            }
            _ if line.starts_with("/mode ") => {
                let raw = line.trim_start_matches("/mode ").trim();
                match EditMode::from_str(raw) {
                    Ok(mode) => {
                        manager.set_mode(&session, mode);
                        println!("edit mode set to {mode}");
                    }
                    Err(e) => println!("{e}"),
                }
            }
            _ if line.starts_with('/') => {
                println!("unknown command: {line}");
            }
            _ => run_turn(&manager, &session, line, &mut lines).await?,
        }
    }

    Ok(())
}

/// Sends one user message and renders the run's events until it terminates.
async fn run_turn(
    manager: &Arc<SessionManager>,
    session: &SessionId,
    text: &str,
    lines: &mut Lines<BufReader<Stdin>>,
) -> anyhow::Result<()> {
    let mut rx = match manager.submit_message(session.clone(), text, None) {
        Ok(rx) => rx,
        Err(e) => {
            println!("{e}");
            return Ok(());
        }
    };

    while let Some(event) = rx.recv().await {
        match event {
            AgentEvent::TextChunk { text } => {
                print!("{text}");
                std::io::stdout().flush()?;
            }
            AgentEvent::Step(step) => {
                println!();
                for result in &step.tool_results {
                    let tag = if result.is_error { "error" } else { "ok" };
                    let first_line = result.output.lines().next().unwrap_or_default();
                    println!("[{} {tag}] {first_line}", result.tool_name);
                }
            }
            AgentEvent::ApprovalRequired(request) => {
                println!();
                let decision = prompt_for_approval(&request, lines).await?;
                if let Err(e) = manager.respond_to_approval(&request.id, decision) {
                    // The run may have timed out or been cancelled meanwhile.
                    println!("{e}");
                }
            }
            AgentEvent::ModeChanged { mode } => {
                println!("(edit mode is now {mode})");
            }
            AgentEvent::Complete(result) => {
                println!();
                match result.reason {
                    CompletionReason::Done => {}
                    CompletionReason::MaxIterations => {
                        println!("stopped: iteration limit reached")
                    }
                    CompletionReason::TimeLimit => println!("stopped: time limit reached"),
                    CompletionReason::Aborted => println!("stopped"),
                    CompletionReason::Error => println!("stopped: error"),
                }
            }
            AgentEvent::Error { message } => {
                println!();
                eprintln!("run failed: {message}");
            }
        }
    }
    Ok(())
}

/// Asks the user to decide on a suspended tool call.
async fn prompt_for_approval(
    request: &ApprovalRequest,
    lines: &mut Lines<BufReader<Stdin>>,
) -> anyhow::Result<ApprovalDecision> {
    println!(
        "approval needed: {} [{}]",
        request.tool_name, request.category
    );
    if let Ok(args) = serde_json::to_string_pretty(&request.arguments) {
        println!("{args}");
    }
    loop {
        print!("allow? [y]es once / [a]lways / [n]o: ");
        std::io::stdout().flush()?;
        let Some(answer) = lines.next_line().await? else {
            return Ok(ApprovalDecision::Stop);
        };
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(ApprovalDecision::AllowOnce),
            "a" | "always" | "all" => return Ok(ApprovalDecision::AllowAll),
            "n" | "no" => return Ok(ApprovalDecision::Stop),
            _ => println!("please answer y, a, or n"),
        }
    }
}
