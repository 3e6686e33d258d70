use alloy::primitives::Address;
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};

use super::wallet::WalletConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MagellanConfig {
    pub global: GlobalConfig,
    pub lifi: LifiConfig,
    pub workflow: WorkflowConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// EVM 节点 HTTP RPC 地址。
    pub rpc_url: String,
    pub chain_id: u64,
    pub wallet: WalletConfig,
    pub logging: LoggingConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            chain_id: 1,
            wallet: WalletConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// LI.FI 聚合器接入配置。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifiConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    /// 随请求上报的集成方标识。
    pub integrator: String,
    pub request_timeout_ms: u64,
    pub slow_quote_warn_ms: u64,
}

impl Default for LifiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://li.quest".to_string(),
            api_key: None,
            integrator: "magellan".to_string(),
            request_timeout_ms: 10_000,
            slow_quote_warn_ms: 2_000,
        }
    }
}

/// 单次工作流的业务参数。
///
/// 地址在反序列化阶段即完成解析；缺失字段由命令入口统一报错，
/// 编排核心不再接触字符串形式的配置。
#[serde_as]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// 源资产（被兑换、被拉取的 ERC-20）。
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub asset: Option<Address>,
    /// 目标生息资产。
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub target_asset: Option<Address>,
    /// 托管金库（经路由器门控，持有并代为执行兑换）。
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub vault: Option<Address>,
    /// 用于 previewDeposit / previewRedeem 的 ERC-4626 金库。
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub yield_vault: Option<Address>,
    /// 人类可读的投入数量（按源资产精度换算，精度运行时读取）。
    pub amount: Option<String>,
    pub redeem_fraction_bps: u16,
    pub slippage_bps: u16,
    /// 允许自动将报价返回的路由器加入金库白名单。
    /// 关闭时遇到未授权路由器将直接失败（fail closed）。
    pub auto_authorize: bool,
    pub confirm_timeout_ms: u64,
    pub confirm_poll_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            asset: None,
            target_asset: None,
            vault: None,
            yield_vault: None,
            amount: None,
            redeem_fraction_bps: 5_000,
            slippage_bps: 50,
            auto_authorize: false,
            confirm_timeout_ms: 180_000,
            confirm_poll_ms: 2_000,
        }
    }
}
