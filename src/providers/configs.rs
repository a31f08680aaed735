pub mod base;
pub mod gateway;

pub use base::ProviderConfig;
pub use gateway::GatewayConfig;
