//! OPC UA transport for ng-recorder, built on async-opcua.
mod client;
mod convert;
mod supervisor;
pub mod types;

pub use client::OpcUaClient;
pub use types::{ClientOptions, OpcUaAuth, SecurityMode, SecurityPolicy};
