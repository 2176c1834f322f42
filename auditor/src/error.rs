use thiserror::Error;

use crate::types::{BlockId, BlockNumber};
use crate::verifier::Mismatch;

/// Failures reported by a [`ChainClient`](crate::fetcher::ChainClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("unknown block {0}")]
    UnknownBlock(BlockId),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("invalid block range: {0}")]
    InvalidRange(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to fetch block {block}: {source}")]
    Fetch {
        block: BlockId,
        #[source]
        source: ClientError,
    },

    #[error("chain query failed: {0}")]
    Client(#[from] ClientError),

    #[error("block #{block} extrinsic {index}: missing {event} event")]
    MissingEvent {
        block: BlockNumber,
        index: u32,
        event: &'static str,
    },

    #[error("block #{0} has no timestamp inherent")]
    MissingTimestamp(BlockNumber),

    #[error("historic block search gave up after {0} steps")]
    SearchExhausted(u32),

    #[error("new head notifications stopped before height #{0}")]
    HeadsClosed(BlockNumber),

    #[error("arithmetic overflow while computing {0}")]
    Overflow(&'static str),

    #[error("{0}")]
    Mismatch(Box<Mismatch>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AuditError {
    pub fn fetch(block: BlockId, source: ClientError) -> Self {
        Self::Fetch { block, source }
    }

    pub fn is_mismatch(&self) -> bool {
        matches!(self, AuditError::Mismatch(_))
    }

    pub fn mismatch(&self) -> Option<&Mismatch> {
        match self {
            AuditError::Mismatch(mismatch) => Some(mismatch),
            _ => None,
        }
    }
}

impl From<Mismatch> for AuditError {
    fn from(mismatch: Mismatch) -> Self {
        Self::Mismatch(Box::new(mismatch))
    }
}

pub type AuditResult<T> = Result<T, AuditError>;
pub type ClientResult<T> = Result<T, ClientError>;
