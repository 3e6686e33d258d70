//! Transaction Sequencer：唯一改写链上状态的组件。
//!
//! 将交易意图编码为 calldata、经 `ChainWriter` 提交，并阻塞到链上
//! 确认为止。依赖交易（如 approve -> deposit）之间的 happens-before
//! 顺序由调用方串行调用保证，这里用单调序号把顺序显式记录下来。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use tracing::{info, warn};

use crate::chain::abi::{IERC20, IRouterVault};
use crate::chain::ChainWriter;

use super::error::WorkflowError;

/// 一笔待提交交易的意图描述。
#[derive(Debug, Clone)]
pub enum TxIntent {
    Approve {
        asset: Address,
        spender: Address,
        amount: U256,
    },
    AuthorizeRouter {
        vault: Address,
        router: Address,
    },
    DepositViaRouter {
        vault: Address,
        assets: U256,
        router: Address,
        payload: Bytes,
        min_out: U256,
        min_shares: U256,
    },
    WithdrawViaRouter {
        vault: Address,
        shares: U256,
        router: Address,
        payload: Bytes,
        min_out: U256,
    },
}

impl TxIntent {
    pub fn label(&self) -> &'static str {
        match self {
            TxIntent::Approve { .. } => "approve",
            TxIntent::AuthorizeRouter { .. } => "authorize_router",
            TxIntent::DepositViaRouter { .. } => "deposit_via_router",
            TxIntent::WithdrawViaRouter { .. } => "withdraw_via_router",
        }
    }

    /// 交易目标合约。
    pub fn to(&self) -> Address {
        match self {
            TxIntent::Approve { asset, .. } => *asset,
            TxIntent::AuthorizeRouter { vault, .. } => *vault,
            TxIntent::DepositViaRouter { vault, .. } => *vault,
            TxIntent::WithdrawViaRouter { vault, .. } => *vault,
        }
    }

    /// ABI 编码后的 calldata。报价给出的 minOut 原样写入，
    /// 不做任何向下调整。
    pub fn calldata(&self) -> Bytes {
        match self {
            TxIntent::Approve {
                spender, amount, ..
            } => IERC20::approveCall {
                spender: *spender,
                amount: *amount,
            }
            .abi_encode()
            .into(),
            TxIntent::AuthorizeRouter { router, .. } => IRouterVault::setRouterAllowedCall {
                router: *router,
                allowed: true,
            }
            .abi_encode()
            .into(),
            TxIntent::DepositViaRouter {
                assets,
                router,
                payload,
                min_out,
                min_shares,
                ..
            } => IRouterVault::depositViaRouterCall {
                assets: *assets,
                router: *router,
                payload: payload.clone(),
                minOut: *min_out,
                minShares: *min_shares,
            }
            .abi_encode()
            .into(),
            TxIntent::WithdrawViaRouter {
                shares,
                router,
                payload,
                min_out,
                ..
            } => IRouterVault::withdrawViaRouterCall {
                shares: *shares,
                router: *router,
                payload: payload.clone(),
                minOut: *min_out,
            }
            .abi_encode()
            .into(),
        }
    }

    pub fn to_request(&self, from: Address) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(from)
            .with_to(self.to())
            .with_input(self.calldata())
    }
}

/// 带序号的确认回执。
#[derive(Debug, Clone)]
pub struct ConfirmedReceipt {
    pub intent: &'static str,
    pub tx: B256,
    pub sequence: u64,
    pub block_number: Option<u64>,
}

pub struct TxSequencer {
    writer: Arc<dyn ChainWriter>,
    sender: Address,
    confirm_timeout: Duration,
    sequence: AtomicU64,
}

impl TxSequencer {
    pub fn new(writer: Arc<dyn ChainWriter>, sender: Address, confirm_timeout: Duration) -> Self {
        Self {
            writer,
            sender,
            confirm_timeout,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    /// 提交一笔交易并阻塞到确认。
    ///
    /// - 节点拒绝 -> `Submission`（可由操作员重跑，不自动重试）
    /// - 链上 revert -> `TransactionReverted`
    /// - 超过配置的确认等待上限 -> `ConfirmationTimeout`
    pub async fn submit_and_confirm(
        &self,
        intent: &TxIntent,
    ) -> Result<ConfirmedReceipt, WorkflowError> {
        let request = intent.to_request(self.sender);
        let label = intent.label();

        let tx = self
            .writer
            .submit(request)
            .await
            .map_err(|err| WorkflowError::Submission(err.to_string()))?;
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        info!(
            target: "engine::sequencer",
            intent = label,
            tx = %tx,
            sequence,
            to = %intent.to(),
            "交易已提交，等待确认"
        );

        let waited = self.confirm_timeout;
        let summary = match tokio::time::timeout(waited, self.writer.wait_for_confirmation(tx))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    target: "engine::sequencer",
                    intent = label,
                    tx = %tx,
                    waited_ms = waited.as_millis() as u64,
                    "确认等待超时"
                );
                return Err(WorkflowError::ConfirmationTimeout {
                    tx,
                    waited_ms: waited.as_millis() as u64,
                });
            }
        };

        if !summary.success {
            warn!(
                target: "engine::sequencer",
                intent = label,
                tx = %tx,
                block = ?summary.block_number,
                "交易被链上回滚"
            );
            return Err(WorkflowError::TransactionReverted { tx });
        }

        info!(
            target: "engine::sequencer",
            intent = label,
            tx = %tx,
            sequence,
            block = ?summary.block_number,
            gas_used = summary.gas_used,
            "交易已确认"
        );

        Ok(ConfirmedReceipt {
            intent: label,
            tx,
            sequence,
            block_number: summary.block_number,
        })
    }
}
