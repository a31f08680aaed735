use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::io;
use tracing_subscriber::EnvFilter;

use vmx_agent::agent::Agent;
use vmx_agent::models::message::Message;
use vmx_agent::providers::configs::{GatewayConfig, ProviderConfig};
use vmx_agent::providers::gateway::GatewayProvider;
use vmx_agent::providers::routing::{ModelOverride, VmxExtension};
use vmx_agent::render::{render_stream, TranscriptRenderer};
use vmx_agent::weather::weather_tool;

const AGENT_PROMPT: &str = "You are a helpful assistant";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Gateway host (can also be set via VMX_AI_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Workspace id (can also be set via VMX_AI_WORKSPACE_ID)
    #[arg(long)]
    workspace_id: Option<String>,

    /// Environment id (can also be set via VMX_AI_ENVIRONMENT_ID)
    #[arg(long)]
    environment_id: Option<String>,

    /// AI resource id (can also be set via VMX_AI_RESOURCE_ID)
    #[arg(long)]
    resource_id: Option<String>,

    /// API key (can also be set via VMX_AI_API_KEY environment variable)
    #[arg(long)]
    api_key: Option<String>,

    /// Model to request; "router" uses the resource's model/routing configuration
    #[arg(short, long)]
    model: Option<String>,

    #[arg(long)]
    temperature: Option<f32>,

    #[arg(long)]
    max_tokens: Option<i32>,

    /// Provider to force for this request, instead of the resource configuration
    #[arg(long)]
    override_provider: Option<String>,

    /// Model to force for this request
    #[arg(long)]
    override_model: Option<String>,

    /// Connection to force for this request
    #[arg(long)]
    override_connection_id: Option<String>,

    /// Correlation id for tracing the request through the gateway
    #[arg(long)]
    correlation_id: Option<String>,

    /// Route to one of the resource's secondary models
    #[arg(long)]
    secondary_model_index: Option<u32>,

    /// System instruction sent ahead of the user message
    #[arg(
        long,
        default_value = "You are a helpful assistant, always provide a fun fact about the asked location"
    )]
    system: String,

    /// User message
    #[arg(long, default_value = "what is the weather in sf")]
    message: String,
}

impl Cli {
    fn extension(&self) -> VmxExtension {
        let mut extension = VmxExtension::default().with_model_override(ModelOverride {
            provider: self.override_provider.clone(),
            model: self.override_model.clone(),
            connection_id: self.override_connection_id.clone(),
        });
        if let Some(correlation_id) = &self.correlation_id {
            extension = extension.with_correlation_id(correlation_id);
        }
        if let Some(index) = self.secondary_model_index {
            extension = extension.with_secondary_model_index(index);
        }
        extension
    }

    /// Flags take precedence over the environment
    fn gateway_config(&self) -> Result<GatewayConfig> {
        let mut config = GatewayConfig::from_env().context("Failed to read gateway settings")?;

        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(workspace_id) = &self.workspace_id {
            config.workspace_id = workspace_id.clone();
        }
        if let Some(environment_id) = &self.environment_id {
            config.environment_id = environment_id.clone();
        }
        if let Some(resource_id) = &self.resource_id {
            config.resource_id = resource_id.clone();
        }
        if let Some(api_key) = &self.api_key {
            config.api_key = Some(api_key.clone());
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        config.temperature = self.temperature.or(config.temperature);
        config.max_tokens = self.max_tokens.or(config.max_tokens);

        Ok(config.with_extension(self.extension()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.gateway_config()?;

    eprintln!(
        "{} {}",
        style("Calling").dim(),
        style(config.base_url()).cyan()
    );
    tracing::info!(model = %config.model, overrides = config.extension.is_some(), "gateway configured");

    let provider = GatewayProvider::new(config)?;
    let agent = Agent::new(Box::new(provider))
        .with_system_prompt(AGENT_PROMPT)
        .with_tool(weather_tool());

    let messages = vec![Message::system(cli.system), Message::user(cli.message)];

    let mut renderer = TranscriptRenderer::new(io::stdout().lock());
    render_stream(agent.stream(&messages), &mut renderer).await?;
    Ok(())
}
