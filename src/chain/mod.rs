//! 链上访问层。
//!
//! `traits` 定义编排核心依赖的读 / 写接口，`evm` 给出基于 alloy
//! Provider 的实现；合约绑定集中在 `abi`。

pub mod abi;
mod evm;
mod traits;

use thiserror::Error;

pub use evm::EvmChainClient;
pub use traits::{ChainReader, ChainWriter, ReceiptSummary};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC 地址无效: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("合约调用失败: {0}")]
    Contract(#[from] alloy::contract::Error),
    #[error("RPC 传输失败: {0}")]
    Transport(#[from] alloy::transports::TransportError),
    #[error("交易提交被节点拒绝: {0}")]
    Submission(String),
}
