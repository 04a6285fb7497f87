use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::blockchain::{Block, Transaction};

/// Response for the chain endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChainResponse {
    /// The blocks in the chain
    pub chain: Vec<Block>,

    /// The length of the chain
    pub length: usize,
}

/// Response for the mempool endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MempoolResponse {
    pub mempool: Vec<Transaction>,
    pub count: usize,
}

/// Response for an accepted transaction
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TransactionAccepted {
    pub message: String,
    pub tx_id: String,
}

/// Response for the mine endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MineResponse {
    /// The message
    pub message: String,

    /// The newly mined block
    pub block: Block,
}

/// Request for the register endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterNodesRequest {
    /// Peers as `host:port` or full URLs
    pub nodes: Vec<String>,
}

/// Response listing known peers
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NodesResponse {
    pub nodes: Vec<String>,
}

/// Response for the resolve endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ResolveResponse {
    pub message: String,
    pub replaced: bool,
}

/// Response for the balance endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: f64,
}

/// Plain message, also used for errors
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        MessageResponse {
            message: message.into(),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>, error: impl ToString) -> Self {
        MessageResponse {
            message: message.into(),
            error: Some(error.to_string()),
        }
    }
}
