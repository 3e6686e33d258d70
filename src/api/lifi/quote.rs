use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::serde_helpers::option_field_as_string;

/// `/v1/quote` 请求参数，以查询字符串传参。
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub from_chain: u64,
    pub to_chain: u64,
    pub from_token: Address,
    pub to_token: Address,
    pub from_amount: U256,
    pub from_address: Address,
    pub to_address: Address,
    pub slippage_bps: u16,
    pub integrator: Option<String>,
}

impl QuoteRequest {
    pub fn new(
        from_chain: u64,
        to_chain: u64,
        from_token: Address,
        to_token: Address,
        from_amount: U256,
    ) -> Self {
        Self {
            from_chain,
            to_chain,
            from_token,
            to_token,
            from_amount,
            from_address: Address::ZERO,
            to_address: Address::ZERO,
            slippage_bps: 50,
            integrator: None,
        }
    }

    pub fn to_query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::with_capacity(9);
        params.push(("fromChain".to_string(), self.from_chain.to_string()));
        params.push(("toChain".to_string(), self.to_chain.to_string()));
        params.push(("fromToken".to_string(), self.from_token.to_string()));
        params.push(("toToken".to_string(), self.to_token.to_string()));
        params.push(("fromAmount".to_string(), self.from_amount.to_string()));
        params.push(("fromAddress".to_string(), self.from_address.to_string()));
        params.push(("toAddress".to_string(), self.to_address.to_string()));
        // LI.FI 以小数表示滑点：50 bps -> 0.005
        params.push((
            "slippage".to_string(),
            format!("{}", f64::from(self.slippage_bps) / 10_000.0),
        ));
        if let Some(integrator) = self.integrator.as_ref() {
            let trimmed = integrator.trim();
            if !trimmed.is_empty() {
                params.push(("integrator".to_string(), trimmed.to_string()));
            }
        }
        params
    }
}

/// `/v1/quote` 响应体。字段缺失与否由上层（Quote Resolver）判定，
/// 这里只做宽松反序列化。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotePayload {
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub estimate: Option<QuoteEstimate>,
    #[serde(default)]
    pub transaction_request: Option<QuoteTransactionRequest>,
    #[serde(default)]
    pub included_steps: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteEstimate {
    #[serde(default, with = "option_field_as_string")]
    pub to_amount: Option<U256>,
    #[serde(default, with = "option_field_as_string")]
    pub to_amount_min: Option<U256>,
    #[serde(default)]
    pub execution_duration: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteTransactionRequest {
    #[serde(default, with = "option_field_as_string")]
    pub to: Option<Address>,
    #[serde(default, with = "option_field_as_string")]
    pub data: Option<Bytes>,
    /// 十六进制编码的原生币数量（例如 "0x0"）。
    #[serde(default, with = "option_field_as_string")]
    pub value: Option<U256>,
}

impl QuotePayload {
    pub fn try_from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_params_include_decimal_slippage() {
        let mut request = QuoteRequest::new(
            1,
            1,
            "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"
                .parse()
                .unwrap(),
            "0x9D39A5DE30e57443BfF2A8307A4256c8797A3497"
                .parse()
                .unwrap(),
            U256::from(1_000_000u64),
        );
        request.slippage_bps = 50;
        let params = request.to_query_params();
        let slippage = params
            .iter()
            .find(|(key, _)| key == "slippage")
            .map(|(_, value)| value.as_str());
        assert_eq!(slippage, Some("0.005"));
        let amount = params
            .iter()
            .find(|(key, _)| key == "fromAmount")
            .map(|(_, value)| value.as_str());
        assert_eq!(amount, Some("1000000"));
    }

    #[test]
    fn parses_quote_payload_with_string_amounts() {
        let raw = serde_json::json!({
            "tool": "1inch",
            "estimate": {
                "toAmount": "960000000000000000",
                "toAmountMin": "950000000000000000",
                "executionDuration": 30.0
            },
            "transactionRequest": {
                "to": "0x1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE",
                "data": "0xdeadbeef",
                "value": "0x0"
            }
        });
        let payload = QuotePayload::try_from_value(raw).expect("parse payload");
        let estimate = payload.estimate.expect("estimate");
        assert_eq!(
            estimate.to_amount_min,
            Some(U256::from(950_000_000_000_000_000u64))
        );
        let request = payload.transaction_request.expect("transactionRequest");
        assert_eq!(request.value, Some(U256::ZERO));
        assert_eq!(request.data.unwrap().len(), 4);
    }

    #[test]
    fn missing_fields_deserialize_as_none() {
        let payload =
            QuotePayload::try_from_value(serde_json::json!({ "tool": "stargate" })).unwrap();
        assert!(payload.estimate.is_none());
        assert!(payload.transaction_request.is_none());
    }
}
