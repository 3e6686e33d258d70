use alloy::primitives::{Address, B256, U256};
use thiserror::Error;

use crate::api::LifiError;
use crate::chain::ChainError;

/// 工作流错误分类。任何一个错误都会终止当前工作流：
/// 盲目重试资金类交易有重复执行风险，这里统一 fail-fast，
/// 由操作员在核对链上状态后重新运行（前置检查幂等，重跑安全）。
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("聚合器未返回可用路由: {from} -> {to}")]
    NoRouteFound { from: Address, to: Address },
    #[error("聚合器响应缺少必要字段: {0}")]
    MalformedQuote(String),
    #[error("approve 交易被链上回滚: {tx}")]
    ApprovalRejected { tx: B256 },
    #[error("路由器 {router} 未被金库授权，且自动授权未开启")]
    RouterNotAuthorized { router: Address },
    #[error("交易执行失败（revert）: {tx}")]
    TransactionReverted { tx: B256 },
    #[error("交易提交被节点拒绝: {0}")]
    Submission(String),
    #[error("等待交易 {tx} 确认超时（{waited_ms}ms）")]
    ConfirmationTimeout { tx: B256, waited_ms: u64 },
    #[error("按 {fraction_bps} bps 计算的赎回份额为零")]
    NothingToRedeem { fraction_bps: u16 },
    #[error("余额不足: 需要 {required}，当前 {available}")]
    InsufficientBalance { required: U256, available: U256 },
    #[error("报价数量必须大于零")]
    ZeroAmount,
    #[error("聚合器请求失败: {0}")]
    Quote(#[source] LifiError),
    #[error("链上读取失败: {0}")]
    Chain(#[from] ChainError),
}

impl WorkflowError {
    /// 自顶向下拼接错误链，便于单行日志输出。
    pub fn describe(&self) -> String {
        use std::error::Error as _;
        let mut parts = vec![self.to_string()];
        let mut current = self.source();
        while let Some(err) = current {
            let text = err.to_string();
            if parts.last().map(|last| last == &text).unwrap_or(false) {
                current = err.source();
                continue;
            }
            parts.push(text);
            current = err.source();
        }
        parts.join(" | caused by: ")
    }
}
