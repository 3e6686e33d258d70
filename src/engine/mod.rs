//! 编排核心：四个组件 + 工作流组合。
//!
//! 依赖自上而下单向：Quote Resolver 产出喂给 Router Gate 与
//! Transaction Sequencer；Allowance Manager 先于任何拉取式操作；
//! 只有 Transaction Sequencer 会改写链上状态。

mod allowance;
mod error;
mod gate;
mod quote;
mod sequencer;
mod workflow;

#[cfg(test)]
mod tests;

pub use allowance::AllowanceManager;
pub use error::WorkflowError;
pub use gate::RouterGate;
pub use quote::{QuoteResolver, RouteIntent, RouteQuote, RouteSource};
pub use sequencer::{ConfirmedReceipt, TxIntent, TxSequencer};
pub use workflow::{
    DepositOutcome, Position, RedeemOutcome, VaultWorkflow, WorkflowContext, shares_to_redeem,
};
