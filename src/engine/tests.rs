use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::chain::abi::{IERC20, IRouterVault};
use crate::chain::{ChainError, ChainReader, ChainWriter, ReceiptSummary};

use super::allowance::AllowanceManager;
use super::error::WorkflowError;
use super::gate::RouterGate;
use super::quote::{RouteIntent, RouteQuote, RouteSource};
use super::sequencer::{TxIntent, TxSequencer};
use super::workflow::{VaultWorkflow, WorkflowContext, shares_to_redeem};

const SIGNER: Address = Address::repeat_byte(0xAA);
const ASSET: Address = Address::repeat_byte(0x01);
const TARGET: Address = Address::repeat_byte(0x02);
const VAULT: Address = Address::repeat_byte(0x03);
const YIELD_VAULT: Address = Address::repeat_byte(0x04);
const ROUTER: Address = Address::repeat_byte(0x05);

#[derive(Default)]
struct MockState {
    decimals: HashMap<Address, u8>,
    balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    routers: HashMap<(Address, Address), bool>,
    shares: HashMap<(Address, Address), U256>,
    submitted: Vec<TransactionRequest>,
    pending: HashMap<B256, TransactionRequest>,
    next_tx: u64,
    revert_selectors: Vec<[u8; 4]>,
    reject_submission: bool,
    stall_confirmation: bool,
}

/// 内存链：确认时按 calldata 推演状态迁移，让前置检查读到
/// 上一步交易造成的效果。
#[derive(Default)]
struct MockChain {
    state: Mutex<MockState>,
}

impl MockChain {
    fn seed_decimals(&self, asset: Address, decimals: u8) {
        self.state.lock().decimals.insert(asset, decimals);
    }

    fn seed_balance(&self, asset: Address, owner: Address, amount: U256) {
        self.state.lock().balances.insert((asset, owner), amount);
    }

    fn seed_allowance(&self, asset: Address, owner: Address, spender: Address, amount: U256) {
        self.state
            .lock()
            .allowances
            .insert((asset, owner, spender), amount);
    }

    fn allow_router(&self, vault: Address, router: Address) {
        self.state.lock().routers.insert((vault, router), true);
    }

    fn seed_shares(&self, vault: Address, owner: Address, amount: U256) {
        self.state.lock().shares.insert((vault, owner), amount);
    }

    fn revert_on(&self, selector: [u8; 4]) {
        self.state.lock().revert_selectors.push(selector);
    }

    fn reject_submissions(&self) {
        self.state.lock().reject_submission = true;
    }

    fn stall_confirmations(&self) {
        self.state.lock().stall_confirmation = true;
    }

    fn submitted(&self) -> Vec<TransactionRequest> {
        self.state.lock().submitted.clone()
    }
}

fn request_calldata(request: &TransactionRequest) -> Bytes {
    request.input.input().cloned().unwrap_or_default()
}

fn request_selector(request: &TransactionRequest) -> [u8; 4] {
    let data = request_calldata(request);
    data[..4].try_into().expect("calldata with selector")
}

fn apply_transitions(state: &mut MockState, request: &TransactionRequest) -> bool {
    let from = request.from.unwrap_or_default();
    let to = match request.to {
        Some(TxKind::Call(addr)) => addr,
        _ => Address::ZERO,
    };
    let data = request_calldata(request);
    if data.len() < 4 {
        return true;
    }
    let selector: [u8; 4] = data[..4].try_into().expect("selector");
    if state.revert_selectors.contains(&selector) {
        return false;
    }

    if selector == IERC20::approveCall::SELECTOR {
        let call = IERC20::approveCall::abi_decode(&data).expect("decode approve");
        state
            .allowances
            .insert((to, from, call.spender), call.amount);
    } else if selector == IRouterVault::setRouterAllowedCall::SELECTOR {
        let call =
            IRouterVault::setRouterAllowedCall::abi_decode(&data).expect("decode setRouterAllowed");
        state.routers.insert((to, call.router), call.allowed);
    } else if selector == IRouterVault::depositViaRouterCall::SELECTOR {
        let call =
            IRouterVault::depositViaRouterCall::abi_decode(&data).expect("decode deposit");
        let entry = state.shares.entry((to, from)).or_insert(U256::ZERO);
        *entry += call.minShares;
    } else if selector == IRouterVault::withdrawViaRouterCall::SELECTOR {
        let call =
            IRouterVault::withdrawViaRouterCall::abi_decode(&data).expect("decode withdraw");
        let entry = state.shares.entry((to, from)).or_insert(U256::ZERO);
        *entry = entry.saturating_sub(call.shares);
    }
    true
}

#[async_trait]
impl ChainReader for MockChain {
    async fn decimals(&self, asset: Address) -> Result<u8, ChainError> {
        Ok(*self.state.lock().decimals.get(&asset).unwrap_or(&18))
    }

    async fn balance_of(&self, asset: Address, owner: Address) -> Result<U256, ChainError> {
        Ok(*self
            .state
            .lock()
            .balances
            .get(&(asset, owner))
            .unwrap_or(&U256::ZERO))
    }

    async fn allowance(
        &self,
        asset: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        Ok(*self
            .state
            .lock()
            .allowances
            .get(&(asset, owner, spender))
            .unwrap_or(&U256::ZERO))
    }

    async fn preview_deposit(&self, _vault: Address, assets: U256) -> Result<U256, ChainError> {
        // 测试用 1:1 换算
        Ok(assets)
    }

    async fn preview_redeem(&self, _vault: Address, shares: U256) -> Result<U256, ChainError> {
        Ok(shares)
    }

    async fn is_router_allowed(
        &self,
        vault: Address,
        router: Address,
    ) -> Result<bool, ChainError> {
        Ok(*self
            .state
            .lock()
            .routers
            .get(&(vault, router))
            .unwrap_or(&false))
    }

    async fn user_shares(&self, vault: Address, owner: Address) -> Result<U256, ChainError> {
        Ok(*self
            .state
            .lock()
            .shares
            .get(&(vault, owner))
            .unwrap_or(&U256::ZERO))
    }

    async fn assets_of(&self, vault: Address, owner: Address) -> Result<U256, ChainError> {
        self.user_shares(vault, owner).await
    }
}

#[async_trait]
impl ChainWriter for MockChain {
    async fn submit(&self, request: TransactionRequest) -> Result<B256, ChainError> {
        let mut state = self.state.lock();
        if state.reject_submission {
            return Err(ChainError::Submission("nonce too low".to_string()));
        }
        state.next_tx += 1;
        let tx = B256::from(U256::from(state.next_tx));
        state.submitted.push(request.clone());
        state.pending.insert(tx, request);
        Ok(tx)
    }

    async fn wait_for_confirmation(&self, tx: B256) -> Result<ReceiptSummary, ChainError> {
        let stalled = self.state.lock().stall_confirmation;
        if stalled {
            std::future::pending::<()>().await;
        }
        let mut state = self.state.lock();
        let request = state.pending.remove(&tx).expect("unknown pending tx");
        let success = apply_transitions(&mut state, &request);
        Ok(ReceiptSummary {
            tx,
            success,
            block_number: Some(1),
            gas_used: 21_000,
        })
    }
}

struct StubRoutes {
    quote: RouteQuote,
    seen: Mutex<Vec<RouteIntent>>,
}

impl StubRoutes {
    fn new(quote: RouteQuote) -> Self {
        Self {
            quote,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn seen(&self) -> Vec<RouteIntent> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl RouteSource for StubRoutes {
    async fn resolve_route(&self, intent: &RouteIntent) -> Result<RouteQuote, WorkflowError> {
        self.seen.lock().push(intent.clone());
        Ok(self.quote.clone())
    }
}

fn sample_quote(min_out: u64) -> RouteQuote {
    RouteQuote {
        router: ROUTER,
        payload: Bytes::from(vec![0xAB, 0xCD, 0xEF]),
        min_out: U256::from(min_out),
        value: U256::ZERO,
        tool: Some("1inch".to_string()),
    }
}

struct Fixture {
    chain: Arc<MockChain>,
    routes: Arc<StubRoutes>,
    workflow: VaultWorkflow,
}

fn fixture(auto_authorize: bool, quote: RouteQuote) -> Fixture {
    let chain = Arc::new(MockChain::default());
    let reader: Arc<dyn ChainReader> = chain.clone();
    let writer: Arc<dyn ChainWriter> = chain.clone();
    let sequencer = Arc::new(TxSequencer::new(writer, SIGNER, Duration::from_secs(5)));
    let allowance = AllowanceManager::new(reader.clone(), sequencer.clone());
    let gate = RouterGate::new(reader.clone(), sequencer.clone(), auto_authorize);
    let routes = Arc::new(StubRoutes::new(quote));
    let ctx = WorkflowContext {
        chain_id: 1,
        signer: SIGNER,
        asset: ASSET,
        target_asset: TARGET,
        vault: VAULT,
        yield_vault: YIELD_VAULT,
    };
    let workflow = VaultWorkflow::new(reader, routes.clone(), allowance, gate, sequencer, ctx);
    Fixture {
        chain,
        routes,
        workflow,
    }
}

fn allowance_manager(chain: &Arc<MockChain>) -> (AllowanceManager, Arc<TxSequencer>) {
    let reader: Arc<dyn ChainReader> = chain.clone();
    let writer: Arc<dyn ChainWriter> = chain.clone();
    let sequencer = Arc::new(TxSequencer::new(writer, SIGNER, Duration::from_secs(5)));
    (AllowanceManager::new(reader, sequencer.clone()), sequencer)
}

#[tokio::test]
async fn ensure_allowance_is_idempotent() {
    let chain = Arc::new(MockChain::default());
    let (manager, _sequencer) = allowance_manager(&chain);

    let required = U256::from(1_000_000u64);
    let first = manager
        .ensure_allowance(ASSET, SIGNER, VAULT, required)
        .await
        .expect("first call");
    assert!(first, "first call must issue an approve");

    let second = manager
        .ensure_allowance(ASSET, SIGNER, VAULT, required)
        .await
        .expect("second call");
    assert!(!second, "second call must hit the fast path");

    let smaller = manager
        .ensure_allowance(ASSET, SIGNER, VAULT, U256::from(500u64))
        .await
        .expect("smaller call");
    assert!(!smaller);

    assert_eq!(chain.submitted().len(), 1, "exactly one approve in total");
}

#[tokio::test]
async fn ensure_allowance_skips_when_sufficient() {
    let chain = Arc::new(MockChain::default());
    chain.seed_allowance(ASSET, SIGNER, VAULT, U256::from(2_000_000u64));
    let (manager, _sequencer) = allowance_manager(&chain);

    let issued = manager
        .ensure_allowance(ASSET, SIGNER, VAULT, U256::from(1_000_000u64))
        .await
        .expect("fast path");
    assert!(!issued);
    assert!(chain.submitted().is_empty());
}

#[tokio::test]
async fn approval_revert_maps_to_approval_rejected() {
    let chain = Arc::new(MockChain::default());
    chain.revert_on(IERC20::approveCall::SELECTOR);
    let (manager, _sequencer) = allowance_manager(&chain);

    let err = manager
        .ensure_allowance(ASSET, SIGNER, VAULT, U256::from(1u64))
        .await
        .expect_err("approval must fail");
    assert!(matches!(err, WorkflowError::ApprovalRejected { .. }));
}

#[tokio::test]
async fn unauthorized_router_blocks_deposit() {
    let fx = fixture(false, sample_quote(950_000));
    fx.chain
        .seed_balance(ASSET, SIGNER, U256::from(1_000_000u64));
    fx.chain
        .seed_allowance(ASSET, SIGNER, VAULT, U256::from(1_000_000u64));

    let err = fx
        .workflow
        .deposit(U256::from(1_000_000u64))
        .await
        .expect_err("gate must fail closed");
    assert!(matches!(
        err,
        WorkflowError::RouterNotAuthorized { router } if router == ROUTER
    ));

    // 未授权路由器绝不能出现在任何资金移动交易里
    for request in fx.chain.submitted() {
        let selector = request_selector(&request);
        assert_ne!(selector, IRouterVault::depositViaRouterCall::SELECTOR);
        assert_ne!(selector, IRouterVault::withdrawViaRouterCall::SELECTOR);
    }
}

#[tokio::test]
async fn auto_authorize_opens_gate_before_deposit() {
    let fx = fixture(true, sample_quote(950_000));
    fx.chain
        .seed_balance(ASSET, SIGNER, U256::from(1_000_000u64));
    fx.chain
        .seed_allowance(ASSET, SIGNER, VAULT, U256::from(1_000_000u64));

    fx.workflow
        .deposit(U256::from(1_000_000u64))
        .await
        .expect("deposit with auto authorize");

    let selectors: Vec<[u8; 4]> = fx
        .chain
        .submitted()
        .iter()
        .map(request_selector)
        .collect();
    let authorize = selectors
        .iter()
        .position(|s| *s == IRouterVault::setRouterAllowedCall::SELECTOR)
        .expect("authorization submitted");
    let deposit = selectors
        .iter()
        .position(|s| *s == IRouterVault::depositViaRouterCall::SELECTOR)
        .expect("deposit submitted");
    assert!(authorize < deposit, "authorization strictly before deposit");
}

#[tokio::test]
async fn approval_confirmed_before_deposit_submitted() {
    let fx = fixture(false, sample_quote(950_000));
    fx.chain
        .seed_balance(ASSET, SIGNER, U256::from(1_000_000u64));
    fx.chain.allow_router(VAULT, ROUTER);

    let outcome = fx
        .workflow
        .deposit(U256::from(1_000_000u64))
        .await
        .expect("deposit");

    let selectors: Vec<[u8; 4]> = fx
        .chain
        .submitted()
        .iter()
        .map(request_selector)
        .collect();
    let approve = selectors
        .iter()
        .position(|s| *s == IERC20::approveCall::SELECTOR)
        .expect("approve submitted");
    let deposit = selectors
        .iter()
        .position(|s| *s == IRouterVault::depositViaRouterCall::SELECTOR)
        .expect("deposit submitted");
    assert!(approve < deposit, "approve strictly before deposit");
    assert_eq!(outcome.receipt.sequence, 1, "deposit carries later sequence");
}

#[tokio::test]
async fn deposit_encodes_quote_min_out_exactly() {
    let fx = fixture(false, sample_quote(950_000));
    fx.chain
        .seed_balance(ASSET, SIGNER, U256::from(1_000_000u64));
    fx.chain
        .seed_allowance(ASSET, SIGNER, VAULT, U256::from(1_000_000u64));
    fx.chain.allow_router(VAULT, ROUTER);

    fx.workflow
        .deposit(U256::from(1_000_000u64))
        .await
        .expect("deposit");

    let submitted = fx.chain.submitted();
    let deposit = submitted
        .iter()
        .find(|request| request_selector(request) == IRouterVault::depositViaRouterCall::SELECTOR)
        .expect("deposit submitted");
    let call = IRouterVault::depositViaRouterCall::abi_decode(&request_calldata(deposit))
        .expect("decode deposit");
    assert_eq!(call.assets, U256::from(1_000_000u64));
    assert_eq!(call.router, ROUTER);
    assert_eq!(call.payload, Bytes::from(vec![0xAB, 0xCD, 0xEF]));
    // 最小到账量必须与报价一致，不允许任何向下调整
    assert_eq!(call.minOut, U256::from(950_000u64));
    assert_eq!(call.minShares, U256::from(950_000u64));
}

#[tokio::test]
async fn deposit_requires_balance() {
    let fx = fixture(false, sample_quote(950_000));
    fx.chain.seed_balance(ASSET, SIGNER, U256::from(1u64));

    let err = fx
        .workflow
        .deposit(U256::from(1_000_000u64))
        .await
        .expect_err("must fail on balance");
    assert!(matches!(err, WorkflowError::InsufficientBalance { .. }));
    assert!(fx.chain.submitted().is_empty());
}

#[tokio::test]
async fn deposit_rejects_zero_amount() {
    let fx = fixture(false, sample_quote(950_000));
    let err = fx
        .workflow
        .deposit(U256::ZERO)
        .await
        .expect_err("zero amount");
    assert!(matches!(err, WorkflowError::ZeroAmount));
}

#[tokio::test]
async fn redeem_rejects_zero_share_result() {
    let fx = fixture(true, sample_quote(100));
    fx.chain.seed_shares(VAULT, SIGNER, U256::from(1u64));

    let err = fx.workflow.redeem(1).await.expect_err("floor rounds to zero");
    assert!(matches!(
        err,
        WorkflowError::NothingToRedeem { fraction_bps: 1 }
    ));
    assert!(fx.chain.submitted().is_empty(), "no zero-amount transaction");
}

#[tokio::test]
async fn redeem_full_when_fraction_at_or_above_limit() {
    let fx = fixture(true, sample_quote(100));
    fx.chain.seed_shares(VAULT, SIGNER, U256::from(1_000u64));

    let outcome = fx.workflow.redeem(12_000).await.expect("redeem all");
    assert_eq!(outcome.shares_redeemed, U256::from(1_000u64));
    assert_eq!(outcome.remaining_shares, U256::ZERO);

    let submitted = fx.chain.submitted();
    let withdraw = submitted
        .iter()
        .find(|request| {
            request_selector(request) == IRouterVault::withdrawViaRouterCall::SELECTOR
        })
        .expect("withdraw submitted");
    let call = IRouterVault::withdrawViaRouterCall::abi_decode(&request_calldata(withdraw))
        .expect("decode withdraw");
    assert_eq!(call.shares, U256::from(1_000u64));
    assert_eq!(call.minOut, U256::from(100u64));
}

#[tokio::test]
async fn redeem_sizes_reverse_quote_from_preview() {
    let fx = fixture(true, sample_quote(100));
    fx.chain.seed_shares(VAULT, SIGNER, U256::from(1_000u64));

    fx.workflow.redeem(5_000).await.expect("partial redeem");

    let seen = fx.routes.seen();
    assert_eq!(seen.len(), 1);
    let intent = &seen[0];
    assert_eq!(intent.from_token, TARGET);
    assert_eq!(intent.to_token, ASSET);
    // preview_redeem 在测试里是 1:1，份额的一半即 500
    assert_eq!(intent.from_amount, U256::from(500u64));
    assert_eq!(intent.from_address, VAULT);
    assert_eq!(intent.to_address, VAULT);
}

#[tokio::test]
async fn sequencer_times_out_on_stalled_confirmation() {
    let chain = Arc::new(MockChain::default());
    chain.stall_confirmations();
    let writer: Arc<dyn ChainWriter> = chain.clone();
    let sequencer = TxSequencer::new(writer, SIGNER, Duration::from_millis(50));

    let intent = TxIntent::Approve {
        asset: ASSET,
        spender: VAULT,
        amount: U256::from(1u64),
    };
    let err = sequencer
        .submit_and_confirm(&intent)
        .await
        .expect_err("must time out");
    assert!(matches!(err, WorkflowError::ConfirmationTimeout { .. }));
}

#[tokio::test]
async fn sequencer_surfaces_node_rejection() {
    let chain = Arc::new(MockChain::default());
    chain.reject_submissions();
    let writer: Arc<dyn ChainWriter> = chain.clone();
    let sequencer = TxSequencer::new(writer, SIGNER, Duration::from_secs(1));

    let intent = TxIntent::Approve {
        asset: ASSET,
        spender: VAULT,
        amount: U256::from(1u64),
    };
    let err = sequencer
        .submit_and_confirm(&intent)
        .await
        .expect_err("submission rejected");
    assert!(matches!(err, WorkflowError::Submission(_)));
}

#[tokio::test]
async fn deposit_revert_surfaces_transaction_reverted() {
    let fx = fixture(true, sample_quote(950_000));
    fx.chain
        .seed_balance(ASSET, SIGNER, U256::from(1_000_000u64));
    fx.chain
        .seed_allowance(ASSET, SIGNER, VAULT, U256::from(1_000_000u64));
    fx.chain.allow_router(VAULT, ROUTER);
    fx.chain
        .revert_on(IRouterVault::depositViaRouterCall::SELECTOR);

    let err = fx
        .workflow
        .deposit(U256::from(1_000_000u64))
        .await
        .expect_err("deposit reverts");
    assert!(matches!(err, WorkflowError::TransactionReverted { .. }));
}

#[tokio::test]
async fn end_to_end_deposit_scenario() {
    // 规模：6 位精度资产 1,000,000 最小单位，现有额度 0
    let fx = fixture(true, sample_quote(950_000));
    fx.chain.seed_decimals(ASSET, 6);
    fx.chain
        .seed_balance(ASSET, SIGNER, U256::from(1_000_000u64));

    let outcome = fx
        .workflow
        .deposit(U256::from(1_000_000u64))
        .await
        .expect("end to end deposit");

    let submitted = fx.chain.submitted();
    let approve = submitted
        .iter()
        .find(|request| request_selector(request) == IERC20::approveCall::SELECTOR)
        .expect("approve issued");
    let approve_call =
        IERC20::approveCall::abi_decode(&request_calldata(approve)).expect("decode approve");
    assert_eq!(approve_call.amount, U256::from(1_000_000u64));
    assert_eq!(approve_call.spender, VAULT);

    assert_eq!(outcome.quote.min_out, U256::from(950_000u64));
    assert_eq!(outcome.min_shares, U256::from(950_000u64));
    assert!(outcome.position.shares > U256::ZERO, "position must reflect shares");
}

#[test]
fn shares_to_redeem_respects_floor_and_bounds() {
    assert_eq!(
        shares_to_redeem(U256::from(1_000u64), 5_000),
        U256::from(500u64)
    );
    assert_eq!(
        shares_to_redeem(U256::from(1_001u64), 5_000),
        U256::from(500u64)
    );
    assert_eq!(shares_to_redeem(U256::from(1u64), 1), U256::ZERO);
    assert_eq!(
        shares_to_redeem(U256::from(1_000u64), 10_000),
        U256::from(1_000u64)
    );
    assert_eq!(
        shares_to_redeem(U256::from(1_000u64), 12_345),
        U256::from(1_000u64)
    );

    for bps in [1u16, 33, 999, 5_000, 9_999, 10_000] {
        let total = U256::from(123_456_789u64);
        assert!(shares_to_redeem(total, bps) <= total);
    }
}

#[test]
fn shares_to_redeem_handles_huge_totals_without_overflow() {
    let result = shares_to_redeem(U256::MAX, 9_999);
    assert!(result < U256::MAX);
    assert!(result > U256::ZERO);
}
