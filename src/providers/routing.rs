//! The `vmx` request extension understood by the routing gateway.
//!
//! It rides along in the body of an otherwise standard chat-completions request and lets
//! a single call bypass the resource's configured model and routing.
use serde::{Deserialize, Serialize};

/// Request body key the gateway reads the extension from
pub const EXTENSION_KEY: &str = "vmx";

/// A concrete provider/model/connection to send a request to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

impl ModelOverride {
    pub fn new<P, M, C>(provider: P, model: M, connection_id: C) -> Self
    where
        P: Into<String>,
        M: Into<String>,
        C: Into<String>,
    {
        Self {
            provider: Some(provider.into()),
            model: Some(model.into()),
            connection_id: Some(connection_id.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.provider.is_none() && self.model.is_none() && self.connection_id.is_none()
    }
}

/// Partial resource configuration replacing the stored one for a single request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelOverride>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_models: Option<Vec<ModelOverride>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_models: Option<Vec<ModelOverride>>,
}

impl ResourceConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.model.is_none() && self.fallback_models.is_none() && self.secondary_models.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmxExtension {
    /// Correlation id used by the gateway for tracing and audit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Route to one of the resource's secondary models instead of the primary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_model_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_config_overrides: Option<ResourceConfigOverrides>,
}

impl VmxExtension {
    pub fn with_model_override(mut self, model: ModelOverride) -> Self {
        if model.is_empty() {
            return self;
        }
        self.resource_config_overrides
            .get_or_insert_with(ResourceConfigOverrides::default)
            .model = Some(model);
        self
    }

    /// Models tried in order when the primary fails
    pub fn with_fallback_models(mut self, models: Vec<ModelOverride>) -> Self {
        if models.is_empty() {
            return self;
        }
        self.resource_config_overrides
            .get_or_insert_with(ResourceConfigOverrides::default)
            .fallback_models = Some(models);
        self
    }

    /// Models addressable through `secondary_model_index`
    pub fn with_secondary_models(mut self, models: Vec<ModelOverride>) -> Self {
        if models.is_empty() {
            return self;
        }
        self.resource_config_overrides
            .get_or_insert_with(ResourceConfigOverrides::default)
            .secondary_models = Some(models);
        self
    }

    pub fn with_correlation_id<S: Into<String>>(mut self, correlation_id: S) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_secondary_model_index(mut self, index: u32) -> Self {
        self.secondary_model_index = Some(index);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.correlation_id.is_none()
            && self.secondary_model_index.is_none()
            && self
                .resource_config_overrides
                .as_ref()
                .map_or(true, ResourceConfigOverrides::is_empty)
    }
}
