// SPDX-License-Identifier: Apache-2.0
mod cli;
mod infra;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands};
use sam_broker::InMemoryBroker;
use sam_checkpoint::CheckpointStore;
use sam_config::AgentConfig;
use sam_core::{AgentCore, AgentDeps, DiscoveryPublisher, TimeoutSweeper};
use sam_interfaces::DefaultAccessValidator;
use sam_types::{A2aMessage, JsonRpcRequest, MessageMetadata, MessagePart, UserProperties};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Completions { shell } => {
            cli::print_completions(shell);
            Ok(())
        }
        Commands::ShowConfig { config } => {
            let config = sam_config::load(config.as_deref())?;
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Commands::Run { config, tools, artifacts_dir } => run_agent(config, tools, artifacts_dir).await,
        Commands::Demo { config, tools, prompt } => run_demo(config, tools, prompt).await,
    }
}

/// Opens the Checkpoint Store at the path named by `checkpoint_backend_url`,
/// matching `sven-config`'s convention of reserving `sqlite::memory:` for
/// an ephemeral in-memory database.
fn open_checkpoint_store(config: &AgentConfig) -> anyhow::Result<CheckpointStore> {
    if config.checkpoint_backend_url == "sqlite::memory:" {
        return Ok(CheckpointStore::open_in_memory()?);
    }
    let path = config
        .checkpoint_backend_url
        .strip_prefix("sqlite://")
        .unwrap_or(&config.checkpoint_backend_url);
    Ok(CheckpointStore::open(std::path::Path::new(path))?)
}

fn build_tool_registry(tools_path: Option<std::path::PathBuf>) -> anyhow::Result<Arc<dyn sam_interfaces::ToolRegistry>> {
    match tools_path {
        Some(path) => Ok(Arc::new(infra::manifest_tools::ManifestToolRegistry::load(&path)?)),
        None => Ok(Arc::new(infra::manifest_tools::ManifestToolRegistry::empty())),
    }
}

/// Starts this agent process: subscribes to its broker topics and runs
/// the turn algorithm, Timeout Sweeper, and Discovery publisher
/// concurrently until interrupted (spec §4.3, §4.5, §4.6).
async fn run_agent(
    config_path: Option<std::path::PathBuf>,
    tools_path: Option<std::path::PathBuf>,
    artifacts_dir: Option<std::path::PathBuf>,
) -> anyhow::Result<()> {
    let config = Arc::new(sam_config::load(config_path.as_deref())?);
    let broker: Arc<dyn sam_broker::BrokerAdapter> = Arc::new(InMemoryBroker::new());
    let checkpoint = Arc::new(open_checkpoint_store(&config)?);
    let llm = Arc::new(infra::http_llm::HttpLlmClient::from_env().context("configuring LLM client")?);
    let tools = build_tool_registry(tools_path)?;
    let artifacts_dir = artifacts_dir.unwrap_or_else(|| std::path::PathBuf::from("./artifacts"));
    let artifacts = Arc::new(infra::fs_artifacts::FilesystemArtifactStore::new(artifacts_dir));
    let access = Arc::new(DefaultAccessValidator { own_agent_name: config.agent_name.clone() });

    let deps = Arc::new(AgentDeps::new(config, broker, checkpoint, llm, tools, artifacts, access));
    let core = AgentCore::new(deps.clone());
    let registry = core.registry();

    let sweeper = TimeoutSweeper::new(deps.clone(), registry.clone());
    let discovery = DiscoveryPublisher::new(deps.clone());

    tracing::info!(agent_name = %deps.config.agent_name, "agent process starting");

    tokio::select! {
        result = core.run() => result.context("agent core loop exited"),
        _ = sweeper.run() => Ok(()),
        _ = discovery.run() => Ok(()),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received interrupt, shutting down");
            Ok(())
        }
    }
}

/// Runs one task through a self-contained agent sharing an in-memory
/// broker with no external model or transport, printing status updates
/// and the terminal response to stdout as they arrive.
async fn run_demo(
    config_path: Option<std::path::PathBuf>,
    tools_path: Option<std::path::PathBuf>,
    prompt: String,
) -> anyhow::Result<()> {
    let mut config = sam_config::load(config_path.as_deref())?;
    if config.agent_name.is_empty() {
        config.agent_name = "demo_agent".to_string();
    }
    if config.namespace.is_empty() {
        config.namespace = "demo".to_string();
    }
    let config = Arc::new(config);

    let broker = Arc::new(InMemoryBroker::new());
    let checkpoint = Arc::new(CheckpointStore::open_in_memory()?);
    let llm = Arc::new(infra::demo_llm::DemoLlmClient::new());
    let tools = match tools_path {
        Some(path) => Arc::new(infra::manifest_tools::ManifestToolRegistry::load(&path)?),
        None => {
            let manifest = std::env::temp_dir().join(format!("sam_demo_tools_{}.yaml", std::process::id()));
            std::fs::write(&manifest, "tools:\n- name: echo\n  description: echoes the given text\n  builtin: echo\n")?;
            let registry = infra::manifest_tools::ManifestToolRegistry::load(&manifest)?;
            let _ = std::fs::remove_file(&manifest);
            Arc::new(registry)
        }
    };
    let artifacts = Arc::new(infra::fs_artifacts::FilesystemArtifactStore::new(std::env::temp_dir().join("sam_demo_artifacts")));
    let access = Arc::new(DefaultAccessValidator { own_agent_name: config.agent_name.clone() });

    let deps = Arc::new(AgentDeps::new(
        config.clone(),
        broker.clone() as Arc<dyn sam_broker::BrokerAdapter>,
        checkpoint,
        llm as Arc<dyn sam_interfaces::LlmClient>,
        tools as Arc<dyn sam_interfaces::ToolRegistry>,
        artifacts as Arc<dyn sam_interfaces::ArtifactStore>,
        access as Arc<dyn sam_interfaces::AccessValidator>,
    ));
    let core = AgentCore::new(deps.clone());
    let core_task = tokio::spawn(core.clone().run());

    let reply_topic = format!("{}/demo/reply", config.namespace);
    let status_topic = format!("{}/demo/status", config.namespace);
    let mut reply_sub = broker.subscribe(&reply_topic).await?;
    let mut status_sub = broker.subscribe(&status_topic).await?;

    let message = A2aMessage {
        role: "user".to_string(),
        message_id: uuid::Uuid::new_v4().to_string(),
        kind: "message".to_string(),
        parts: vec![MessagePart::Text { text: prompt }],
        metadata: MessageMetadata { agent_name: Some(config.agent_name.clone()), parent_task_id: None, extra: Default::default() },
    };
    let request = JsonRpcRequest::new_message_send(uuid::Uuid::new_v4().to_string(), message);
    let request_topic = sam_types::topics::request(&config.namespace, &config.agent_name);
    broker
        .publish(
            &request_topic,
            serde_json::to_value(&request)?,
            UserProperties {
                reply_to: Some(reply_topic.clone()),
                status_to: Some(status_topic.clone()),
                client_id: Some("sam-demo".to_string()),
                user_id: Some("demo-user".to_string()),
            },
        )
        .await?;

    loop {
        tokio::select! {
            Some(msg) = status_sub.recv() => {
                println!("status: {}", serde_json::to_string(&msg.payload)?);
            }
            Some(msg) = reply_sub.recv() => {
                println!("result: {}", serde_json::to_string_pretty(&msg.payload)?);
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_secs(10)) => {
                println!("demo timed out waiting for a terminal response");
                break;
            }
        }
    }

    core_task.abort();
    Ok(())
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry().with(fmt::layer().with_target(true)).with(filter).try_init();
}
