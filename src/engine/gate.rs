//! Router Gate：路由器进入金库白名单前的安全闸门。
//!
//! 不变式：任何资金移动步骤都不得使用授权读取为 false 且自动授权
//! 未成功的路由器。策略关闭时 fail closed，由调用方中止工作流。

use std::sync::Arc;

use alloy::primitives::Address;
use tracing::{debug, info, warn};

use crate::chain::ChainReader;

use super::error::WorkflowError;
use super::sequencer::{TxIntent, TxSequencer};

pub struct RouterGate {
    reader: Arc<dyn ChainReader>,
    sequencer: Arc<TxSequencer>,
    auto_authorize: bool,
}

impl RouterGate {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        sequencer: Arc<TxSequencer>,
        auto_authorize: bool,
    ) -> Self {
        Self {
            reader,
            sequencer,
            auto_authorize,
        }
    }

    /// 确保 `(vault, router)` 已授权。返回 false 表示未授权且策略
    /// 禁止自动授权，调用方必须放弃该路由器。
    pub async fn ensure_router_authorized(
        &self,
        vault: Address,
        router: Address,
    ) -> Result<bool, WorkflowError> {
        if self.reader.is_router_allowed(vault, router).await? {
            debug!(
                target: "engine::gate",
                vault = %vault,
                router = %router,
                "路由器已在白名单内"
            );
            return Ok(true);
        }

        if !self.auto_authorize {
            warn!(
                target: "engine::gate",
                vault = %vault,
                router = %router,
                "路由器未授权，自动授权未开启，拒绝放行"
            );
            return Ok(false);
        }

        info!(
            target: "engine::gate",
            vault = %vault,
            router = %router,
            "自动授权路由器"
        );
        let intent = TxIntent::AuthorizeRouter { vault, router };
        self.sequencer.submit_and_confirm(&intent).await?;
        Ok(true)
    }
}
