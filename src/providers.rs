pub mod base;
pub mod configs;
pub mod gateway;
pub mod routing;
pub mod sse;
pub mod utils;

#[cfg(test)]
pub mod mock;
