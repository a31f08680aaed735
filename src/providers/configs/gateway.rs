use anyhow::Result;

use super::base::ProviderConfig;
use crate::providers::routing::VmxExtension;

pub const DEFAULT_HOST: &str = "http://localhost:3000";
pub const DEFAULT_WORKSPACE_ID: &str = "8eab8372-a0ae-4856-9d6e-ad8589499c80";
pub const DEFAULT_ENVIRONMENT_ID: &str = "c24ff5a5-40f1-417c-919d-b627f06060b0";
pub const DEFAULT_RESOURCE_ID: &str = "openai";
/// Model name that tells the gateway to use the resource's model/routing configuration
pub const ROUTER_MODEL: &str = "router";

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub host: String,
    pub workspace_id: String,
    pub environment_id: String,
    pub resource_id: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
    pub extension: Option<VmxExtension>,
}

impl GatewayConfig {
    pub fn new<H, W, E, R>(host: H, workspace_id: W, environment_id: E, resource_id: R) -> Self
    where
        H: Into<String>,
        W: Into<String>,
        E: Into<String>,
        R: Into<String>,
    {
        Self {
            host: host.into(),
            workspace_id: workspace_id.into(),
            environment_id: environment_id.into(),
            resource_id: resource_id.into(),
            api_key: None,
            model: ROUTER_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
            extension: None,
        }
    }

    pub fn with_api_key<S: Into<String>>(mut self, api_key: S) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_extension(mut self, extension: VmxExtension) -> Self {
        self.extension = Some(extension).filter(|e| !e.is_empty());
        self
    }

    /// `{host}/v1/completion/{workspace}/{environment}/{resource}`
    pub fn base_url(&self) -> String {
        format!(
            "{}/v1/completion/{}/{}/{}",
            self.host.trim_end_matches('/'),
            self.workspace_id,
            self.environment_id,
            self.resource_id
        )
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url())
    }
}

impl ProviderConfig for GatewayConfig {
    fn from_env() -> Result<Self> {
        let host = Self::get_env("VMX_AI_HOST", false, Some(DEFAULT_HOST.to_string()))?
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let workspace_id = Self::get_env(
            "VMX_AI_WORKSPACE_ID",
            false,
            Some(DEFAULT_WORKSPACE_ID.to_string()),
        )?
        .unwrap_or_else(|| DEFAULT_WORKSPACE_ID.to_string());
        let environment_id = Self::get_env(
            "VMX_AI_ENVIRONMENT_ID",
            false,
            Some(DEFAULT_ENVIRONMENT_ID.to_string()),
        )?
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT_ID.to_string());
        let resource_id = Self::get_env(
            "VMX_AI_RESOURCE_ID",
            false,
            Some(DEFAULT_RESOURCE_ID.to_string()),
        )?
        .unwrap_or_else(|| DEFAULT_RESOURCE_ID.to_string());

        let mut config = Self::new(host, workspace_id, environment_id, resource_id);

        // A missing key is reported by the gateway as an authentication error
        config.api_key = Self::get_env("VMX_AI_API_KEY", false, None)?;
        if config.api_key.is_none() {
            tracing::warn!("VMX_AI_API_KEY is not set; requests will be sent unauthenticated");
        }

        if let Some(model) = Self::get_env("VMX_AI_MODEL", false, None)? {
            config.model = model;
        }

        Ok(config)
    }
}
