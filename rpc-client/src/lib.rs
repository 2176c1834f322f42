//! Substrate JSON-RPC backend for the fee auditor.

pub mod block;
pub mod client;
pub mod config;
pub mod decode;
pub mod metadata;
pub mod storage;

pub use client::RpcChainClient;
pub use config::RpcConfig;
pub use metadata::RuntimeTypes;
