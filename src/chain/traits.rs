use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;

use super::ChainError;

/// 已确认交易的回执摘要。
#[derive(Debug, Clone)]
pub struct ReceiptSummary {
    pub tx: B256,
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: u64,
}

/// 链上只读接口。每次调用都重新读取链上状态，调用方不得缓存结果
/// （read-check-act：外部可能并发改写同一份状态）。
#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn decimals(&self, asset: Address) -> Result<u8, ChainError>;
    async fn balance_of(&self, asset: Address, owner: Address) -> Result<U256, ChainError>;
    async fn allowance(
        &self,
        asset: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError>;
    async fn preview_deposit(&self, vault: Address, assets: U256) -> Result<U256, ChainError>;
    async fn preview_redeem(&self, vault: Address, shares: U256) -> Result<U256, ChainError>;
    async fn is_router_allowed(&self, vault: Address, router: Address)
    -> Result<bool, ChainError>;
    async fn user_shares(&self, vault: Address, owner: Address) -> Result<U256, ChainError>;
    async fn assets_of(&self, vault: Address, owner: Address) -> Result<U256, ChainError>;
}

/// 链上写接口：提交交易并等待确认。等待不设内部截止时间，
/// 超时策略由调用方（Transaction Sequencer）决定。
#[async_trait]
pub trait ChainWriter: Send + Sync {
    async fn submit(&self, request: TransactionRequest) -> Result<B256, ChainError>;
    async fn wait_for_confirmation(&self, tx: B256) -> Result<ReceiptSummary, ChainError>;
}
