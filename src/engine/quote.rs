//! Quote Resolver：把兑换意图解析为可执行路由。
//!
//! 聚合器按优选排序返回路由，这里直接取第一条（first-route-wins，
//! 不做本地重排序）。报价一次性使用、聚合器侧隐式过期，取得后应
//! 立即消费。

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use tracing::info;

use crate::api::{LifiApiClient, LifiError, QuotePayload, QuoteRequest};

use super::error::WorkflowError;

/// 路由来源抽象：生产实现为 LI.FI 聚合器，测试中可注入固定报价。
#[async_trait]
pub trait RouteSource: Send + Sync {
    async fn resolve_route(&self, intent: &RouteIntent) -> Result<RouteQuote, WorkflowError>;
}

/// 一次兑换意图：源/目标资产、数量与两端地址。
#[derive(Debug, Clone)]
pub struct RouteIntent {
    pub from_chain: u64,
    pub to_chain: u64,
    pub from_token: Address,
    pub to_token: Address,
    pub from_amount: U256,
    pub from_address: Address,
    pub to_address: Address,
}

/// 解析后的可执行路由。
#[derive(Debug, Clone)]
pub struct RouteQuote {
    /// 执行 payload 的路由器合约。
    pub router: Address,
    /// 不透明执行 calldata，原样转交金库。
    pub payload: Bytes,
    /// 聚合器担保的最小到账量。
    pub min_out: U256,
    /// 随交易附带的原生币数量（常见为 0）。
    pub value: U256,
    /// 人类可读的路由标签（如 "1inch"、"stargate"）。
    pub tool: Option<String>,
}

impl RouteQuote {
    /// 校验聚合器响应并提取执行要素。缺少路由器地址、payload 或
    /// 最小到账量中的任意一项即视为坏报价。
    pub fn try_from_payload(payload: QuotePayload) -> Result<Self, WorkflowError> {
        let tool = payload.tool.clone();
        let request = payload
            .transaction_request
            .ok_or_else(|| WorkflowError::MalformedQuote("missing transactionRequest".into()))?;
        let router = request
            .to
            .ok_or_else(|| WorkflowError::MalformedQuote("missing transactionRequest.to".into()))?;
        let data = request.data.ok_or_else(|| {
            WorkflowError::MalformedQuote("missing transactionRequest.data".into())
        })?;
        let min_out = payload
            .estimate
            .and_then(|estimate| estimate.to_amount_min)
            .ok_or_else(|| {
                WorkflowError::MalformedQuote("missing estimate.toAmountMin".into())
            })?;

        Ok(Self {
            router,
            payload: data,
            min_out,
            value: request.value.unwrap_or(U256::ZERO),
            tool,
        })
    }
}

pub struct QuoteResolver {
    client: LifiApiClient,
    slippage_bps: u16,
}

impl QuoteResolver {
    pub fn new(client: LifiApiClient, slippage_bps: u16) -> Self {
        Self {
            client,
            slippage_bps,
        }
    }
}

#[async_trait]
impl RouteSource for QuoteResolver {
    /// 只读网络调用，无副作用；每次都取新鲜报价，不缓存。
    async fn resolve_route(&self, intent: &RouteIntent) -> Result<RouteQuote, WorkflowError> {
        if intent.from_amount.is_zero() {
            return Err(WorkflowError::ZeroAmount);
        }

        let mut request = QuoteRequest::new(
            intent.from_chain,
            intent.to_chain,
            intent.from_token,
            intent.to_token,
            intent.from_amount,
        );
        request.from_address = intent.from_address;
        request.to_address = intent.to_address;
        request.slippage_bps = self.slippage_bps;

        let payload = self.client.quote(&request).await.map_err(|err| match err {
            LifiError::NoRoute { .. } => WorkflowError::NoRouteFound {
                from: intent.from_token,
                to: intent.to_token,
            },
            other => WorkflowError::Quote(other),
        })?;

        let quote = RouteQuote::try_from_payload(payload)?;
        info!(
            target: "engine::quote",
            router = %quote.router,
            tool = ?quote.tool,
            min_out = %quote.min_out,
            from_amount = %intent.from_amount,
            "路由解析完成"
        );
        Ok(quote)
    }
}
