//! Allowance Manager：任何拉取式操作前的额度保障。
//!
//! 读-查-改：先读链上当前额度，足够则零开销返回；不足才发 approve，
//! 且额度精确设置为所需数量（不授无限额度，压缩 spender 被攻破时的
//! 爆炸半径）。

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tracing::{debug, info};

use crate::chain::ChainReader;

use super::error::WorkflowError;
use super::sequencer::{TxIntent, TxSequencer};

pub struct AllowanceManager {
    reader: Arc<dyn ChainReader>,
    sequencer: Arc<TxSequencer>,
}

impl AllowanceManager {
    pub fn new(reader: Arc<dyn ChainReader>, sequencer: Arc<TxSequencer>) -> Self {
        Self { reader, sequencer }
    }

    /// 确保 `allowance(owner, spender) >= required`。
    ///
    /// 返回是否实际发出了 approve 交易。对同一（或更小）数量重复调用
    /// 是幂等的：第二次调用直接命中快速路径，不再发交易。
    pub async fn ensure_allowance(
        &self,
        asset: Address,
        owner: Address,
        spender: Address,
        required: U256,
    ) -> Result<bool, WorkflowError> {
        let current = self.reader.allowance(asset, owner, spender).await?;
        if current >= required {
            debug!(
                target: "engine::allowance",
                asset = %asset,
                spender = %spender,
                current = %current,
                required = %required,
                "现有额度充足，跳过 approve"
            );
            return Ok(false);
        }

        info!(
            target: "engine::allowance",
            asset = %asset,
            spender = %spender,
            current = %current,
            required = %required,
            "额度不足，发送 approve"
        );

        let intent = TxIntent::Approve {
            asset,
            spender,
            amount: required,
        };
        self.sequencer
            .submit_and_confirm(&intent)
            .await
            .map_err(|err| match err {
                // approve 回滚对整条工作流是致命的，单独归类，不重试。
                WorkflowError::TransactionReverted { tx } => {
                    WorkflowError::ApprovalRejected { tx }
                }
                other => other,
            })?;

        Ok(true)
    }
}
