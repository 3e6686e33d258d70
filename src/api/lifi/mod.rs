//! LI.FI 聚合器 API 封装。
//!
//! 仅覆盖本项目用到的 `/v1/quote` 只读接口：给定源/目标资产与数量，
//! 返回可执行路由（路由器地址 + 执行 calldata + 最小到账量）。

pub mod quote;

use std::fmt;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::LifiConfig;

pub use quote::{QuoteEstimate, QuotePayload, QuoteRequest, QuoteTransactionRequest};

const API_KEY_HEADER: &str = "x-lifi-api-key";

#[derive(Debug, Error)]
pub enum LifiError {
    #[error("LI.FI API 请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("请求 {endpoint} 超时（{timeout_ms}ms）")]
    Timeout {
        endpoint: String,
        timeout_ms: u64,
        #[source]
        source: reqwest::Error,
    },
    #[error("响应解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("聚合器未找到可用路由: {body}")]
    NoRoute { body: String },
    #[error("请求 {endpoint} 被限流，状态 {status}: {body}")]
    RateLimited {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("请求 {endpoint} 返回状态 {status}: {body}")]
    ApiStatus {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("LI.FI 响应结构不符合预期: {0}")]
    Schema(String),
}

impl LifiError {
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

#[derive(Clone)]
pub struct LifiApiClient {
    quote_url: String,
    client: reqwest::Client,
    api_key: Option<String>,
    integrator: String,
    quote_timeout: Duration,
    slow_quote_warn_ms: u64,
}

impl fmt::Debug for LifiApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifiApiClient")
            .field("quote_url", &self.quote_url)
            .field("integrator", &self.integrator)
            .field("api_key_set", &self.api_key.is_some())
            .field("quote_timeout", &self.quote_timeout)
            .finish()
    }
}

impl LifiApiClient {
    pub fn new(client: reqwest::Client, config: &LifiConfig) -> Self {
        let base = config.endpoint.trim_end_matches('/');
        Self {
            quote_url: format!("{base}/v1/quote"),
            client,
            api_key: config.api_key.clone(),
            integrator: config.integrator.clone(),
            quote_timeout: Duration::from_millis(config.request_timeout_ms),
            slow_quote_warn_ms: config.slow_quote_warn_ms,
        }
    }

    /// 请求一条执行路由。只读调用，不缓存，每次都取新鲜报价。
    pub async fn quote(&self, request: &QuoteRequest) -> Result<QuotePayload, LifiError> {
        let url = self.quote_url.clone();
        let started = Instant::now();

        trace!(
            target: "lifi::quote",
            from_token = %request.from_token,
            to_token = %request.to_token,
            from_amount = %request.from_amount,
            from_chain = request.from_chain,
            to_chain = request.to_chain,
            slippage_bps = request.slippage_bps,
            "开始请求 LI.FI 报价"
        );

        let mut params = request.to_query_params();
        if !params.iter().any(|(key, _)| key == "integrator") && !self.integrator.is_empty() {
            params.push(("integrator".to_string(), self.integrator.clone()));
        }

        let mut builder = self
            .client
            .get(&url)
            .timeout(self.quote_timeout)
            .query(&params)
            .header("accept", "application/json");
        if let Some(key) = self.api_key.as_ref() {
            builder = builder.header(API_KEY_HEADER, key);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                let timeout = self.quote_timeout.as_millis() as u64;
                warn!(
                    target: "lifi::quote",
                    endpoint = %url,
                    timeout_ms = timeout,
                    "LI.FI 报价请求超时"
                );
                LifiError::Timeout {
                    endpoint: url.clone(),
                    timeout_ms: timeout,
                    source: err,
                }
            } else {
                warn!(
                    target: "lifi::quote",
                    endpoint = %url,
                    error = %err,
                    "LI.FI 报价请求发送失败"
                );
                LifiError::from(err)
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(LifiError::from)?;

        if status == StatusCode::NOT_FOUND {
            let summary = summarize_error_body(body);
            warn!(
                target: "lifi::quote",
                endpoint = %url,
                body = %summary,
                "LI.FI 未返回可用路由"
            );
            return Err(LifiError::NoRoute { body: summary });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let summary = summarize_error_body(body);
            warn!(
                target: "lifi::quote",
                endpoint = %url,
                status = status.as_u16(),
                body = %summary,
                "LI.FI 报价命中限流"
            );
            return Err(LifiError::RateLimited {
                endpoint: url,
                status,
                body: summary,
            });
        }

        if !status.is_success() {
            let summary = summarize_error_body(body);
            warn!(
                target: "lifi::quote",
                endpoint = %url,
                status = status.as_u16(),
                body = %summary,
                "LI.FI 报价返回非 200 状态"
            );
            return Err(LifiError::ApiStatus {
                endpoint: url,
                status,
                body: summary,
            });
        }

        let json: Value = serde_json::from_str(&body)?;
        let payload = QuotePayload::try_from_value(json).map_err(|err| {
            warn!(
                target: "lifi::quote",
                endpoint = %url,
                error = %err,
                "LI.FI 报价 schema 校验失败"
            );
            LifiError::Schema(err.to_string())
        })?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
        if elapsed_ms > self.slow_quote_warn_ms as f64 {
            debug!(
                target: "lifi::quote",
                elapsed_ms = format_args!("{elapsed_ms:.3}"),
                threshold_ms = self.slow_quote_warn_ms,
                "LI.FI 报价耗时较长"
            );
        } else {
            debug!(
                target: "lifi::quote",
                elapsed_ms = format_args!("{elapsed_ms:.3}"),
                tool = ?payload.tool,
                "LI.FI 报价完成"
            );
        }

        Ok(payload)
    }
}

fn summarize_error_body(body: String) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "(empty response body)".to_string();
    }
    let mut single_line = trimmed.replace(['\n', '\r'], " ");
    const MAX_LEN: usize = 512;
    if single_line.len() > MAX_LEN {
        single_line.truncate(MAX_LEN);
        single_line.push('…');
    }
    single_line
}
