//! 工作流编排：把 Quote Resolver、Allowance Manager、Router Gate 与
//! Transaction Sequencer 串成完整的入金 / 部分赎回流程。
//!
//! 步骤严格串行：后一步的正确性依赖前一步的确认结果（先授权额度再
//! 拉取、先白名单再用路由器、先入金再赎回）。任何一步失败立即中止，
//! 不做补偿回滚；重跑安全性由各前置检查的幂等性保证。

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tracing::info;

use crate::chain::ChainReader;

use super::allowance::AllowanceManager;
use super::error::WorkflowError;
use super::gate::RouterGate;
use super::quote::{RouteIntent, RouteQuote, RouteSource};
use super::sequencer::{ConfirmedReceipt, TxIntent, TxSequencer};

/// 一次运行中不变的工作流参数，启动时构造一次、按引用传入。
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub chain_id: u64,
    pub signer: Address,
    /// 源资产（被兑换、被金库拉取）。
    pub asset: Address,
    /// 目标生息资产。
    pub target_asset: Address,
    /// 托管金库：持有资金并经白名单路由器执行兑换。
    pub vault: Address,
    /// 提供 previewDeposit / previewRedeem 的 ERC-4626 金库。
    pub yield_vault: Address,
}

/// 签名者在金库中的持仓快照。
#[derive(Debug, Clone)]
pub struct Position {
    pub shares: U256,
    pub assets_estimate: U256,
}

#[derive(Debug)]
pub struct DepositOutcome {
    pub receipt: ConfirmedReceipt,
    pub quote: RouteQuote,
    pub min_shares: U256,
    pub position: Position,
}

#[derive(Debug)]
pub struct RedeemOutcome {
    pub receipt: ConfirmedReceipt,
    pub quote: RouteQuote,
    pub shares_redeemed: U256,
    pub remaining_shares: U256,
    pub signer_asset_balance: U256,
}

/// `floor(total × fraction_bps / 10000)`；`fraction_bps >= 10000`
/// 视为全部赎回。拆成商、余两段相乘避免 U256 溢出。
pub fn shares_to_redeem(total: U256, fraction_bps: u16) -> U256 {
    if fraction_bps >= 10_000 {
        return total;
    }
    let bps = U256::from(fraction_bps);
    let denom = U256::from(10_000u64);
    (total / denom) * bps + (total % denom) * bps / denom
}

pub struct VaultWorkflow {
    reader: Arc<dyn ChainReader>,
    resolver: Arc<dyn RouteSource>,
    allowance: AllowanceManager,
    gate: RouterGate,
    sequencer: Arc<TxSequencer>,
    ctx: WorkflowContext,
}

impl VaultWorkflow {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        resolver: Arc<dyn RouteSource>,
        allowance: AllowanceManager,
        gate: RouterGate,
        sequencer: Arc<TxSequencer>,
        ctx: WorkflowContext,
    ) -> Self {
        Self {
            reader,
            resolver,
            allowance,
            gate,
            sequencer,
            ctx,
        }
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.ctx
    }

    /// 入金工作流：额度 -> 报价 -> 路由器门控 -> 份额下界 -> 上链 -> 回读。
    pub async fn deposit(&self, amount: U256) -> Result<DepositOutcome, WorkflowError> {
        if amount.is_zero() {
            return Err(WorkflowError::ZeroAmount);
        }

        let ctx = &self.ctx;
        let balance = self.reader.balance_of(ctx.asset, ctx.signer).await?;
        if balance < amount {
            return Err(WorkflowError::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }

        self.allowance
            .ensure_allowance(ctx.asset, ctx.signer, ctx.vault, amount)
            .await?;

        // 报价两端都填金库地址：兑换在金库内部完成，资金不经过签名者。
        let intent = RouteIntent {
            from_chain: ctx.chain_id,
            to_chain: ctx.chain_id,
            from_token: ctx.asset,
            to_token: ctx.target_asset,
            from_amount: amount,
            from_address: ctx.vault,
            to_address: ctx.vault,
        };
        let quote = self.resolver.resolve_route(&intent).await?;

        if !self
            .gate
            .ensure_router_authorized(ctx.vault, quote.router)
            .await?
        {
            return Err(WorkflowError::RouterNotAuthorized {
                router: quote.router,
            });
        }

        // 用报价的最小到账量换算保守的最小份额下界。
        let min_shares = self
            .reader
            .preview_deposit(ctx.yield_vault, quote.min_out)
            .await?;
        info!(
            target: "workflow::deposit",
            amount = %amount,
            router = %quote.router,
            tool = ?quote.tool,
            min_out = %quote.min_out,
            min_shares = %min_shares,
            "准备提交入金交易"
        );

        let deposit = TxIntent::DepositViaRouter {
            vault: ctx.vault,
            assets: amount,
            router: quote.router,
            payload: quote.payload.clone(),
            min_out: quote.min_out,
            min_shares,
        };
        let receipt = self.sequencer.submit_and_confirm(&deposit).await?;

        let position = self.position().await?;
        info!(
            target: "workflow::deposit",
            tx = %receipt.tx,
            shares = %position.shares,
            assets_estimate = %position.assets_estimate,
            "入金完成"
        );

        Ok(DepositOutcome {
            receipt,
            quote,
            min_shares,
            position,
        })
    }

    /// 部分赎回工作流：按 bps 折算份额 -> 反向报价 -> 门控 -> 上链 -> 回读。
    pub async fn redeem(&self, fraction_bps: u16) -> Result<RedeemOutcome, WorkflowError> {
        let ctx = &self.ctx;
        let total = self.reader.user_shares(ctx.vault, ctx.signer).await?;
        let shares = shares_to_redeem(total, fraction_bps);
        if shares.is_zero() {
            return Err(WorkflowError::NothingToRedeem { fraction_bps });
        }

        // 反向报价按预估可取回的目标资产数量定价。
        let expected_assets = self.reader.preview_redeem(ctx.yield_vault, shares).await?;
        let intent = RouteIntent {
            from_chain: ctx.chain_id,
            to_chain: ctx.chain_id,
            from_token: ctx.target_asset,
            to_token: ctx.asset,
            from_amount: expected_assets,
            from_address: ctx.vault,
            to_address: ctx.vault,
        };
        let quote = self.resolver.resolve_route(&intent).await?;

        if !self
            .gate
            .ensure_router_authorized(ctx.vault, quote.router)
            .await?
        {
            return Err(WorkflowError::RouterNotAuthorized {
                router: quote.router,
            });
        }

        info!(
            target: "workflow::redeem",
            total_shares = %total,
            fraction_bps,
            shares = %shares,
            expected_assets = %expected_assets,
            router = %quote.router,
            min_out = %quote.min_out,
            "准备提交赎回交易"
        );

        let withdraw = TxIntent::WithdrawViaRouter {
            vault: ctx.vault,
            shares,
            router: quote.router,
            payload: quote.payload.clone(),
            min_out: quote.min_out,
        };
        let receipt = self.sequencer.submit_and_confirm(&withdraw).await?;

        let remaining = self.reader.user_shares(ctx.vault, ctx.signer).await?;
        let signer_balance = self.reader.balance_of(ctx.asset, ctx.signer).await?;
        info!(
            target: "workflow::redeem",
            tx = %receipt.tx,
            remaining_shares = %remaining,
            signer_balance = %signer_balance,
            "赎回完成"
        );

        Ok(RedeemOutcome {
            receipt,
            quote,
            shares_redeemed: shares,
            remaining_shares: remaining,
            signer_asset_balance: signer_balance,
        })
    }

    /// 只读预览一条路由（操作员预检），不提交任何交易。
    pub async fn preview_route(
        &self,
        amount: U256,
        reverse: bool,
    ) -> Result<RouteQuote, WorkflowError> {
        let ctx = &self.ctx;
        let (from_token, to_token) = if reverse {
            (ctx.target_asset, ctx.asset)
        } else {
            (ctx.asset, ctx.target_asset)
        };
        let intent = RouteIntent {
            from_chain: ctx.chain_id,
            to_chain: ctx.chain_id,
            from_token,
            to_token,
            from_amount: amount,
            from_address: ctx.vault,
            to_address: ctx.vault,
        };
        self.resolver.resolve_route(&intent).await
    }

    /// 持仓快照。每次都重新读链，不缓存。
    pub async fn position(&self) -> Result<Position, WorkflowError> {
        let ctx = &self.ctx;
        let shares = self.reader.user_shares(ctx.vault, ctx.signer).await?;
        let assets_estimate = self.reader.assets_of(ctx.vault, ctx.signer).await?;
        Ok(Position {
            shares,
            assets_estimate,
        })
    }
}
