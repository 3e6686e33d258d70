use std::time::Duration;

use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use super::abi::{IERC20, IERC4626, IRouterVault};
use super::traits::{ChainReader, ChainWriter, ReceiptSummary};
use super::ChainError;

/// 基于 alloy Provider 的链访问实现，读写共用同一个带签名器的
/// provider。确认采用回执轮询，与外部 RPC 的兼容性最好。
#[derive(Clone)]
pub struct EvmChainClient {
    provider: DynProvider,
    sender: Address,
    poll_interval: Duration,
}

impl EvmChainClient {
    pub fn connect(
        rpc_url: &str,
        signer: PrivateKeySigner,
        poll_interval: Duration,
    ) -> Result<Self, ChainError> {
        let url: Url = rpc_url.parse()?;
        let sender = signer.address();
        let wallet = EthereumWallet::from(signer);
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url).erased();
        Ok(Self {
            provider,
            sender,
            poll_interval,
        })
    }

    pub fn sender(&self) -> Address {
        self.sender
    }
}

#[async_trait]
impl ChainReader for EvmChainClient {
    async fn decimals(&self, asset: Address) -> Result<u8, ChainError> {
        let erc20 = IERC20::new(asset, self.provider.clone());
        Ok(erc20.decimals().call().await?)
    }

    async fn balance_of(&self, asset: Address, owner: Address) -> Result<U256, ChainError> {
        let erc20 = IERC20::new(asset, self.provider.clone());
        Ok(erc20.balanceOf(owner).call().await?)
    }

    async fn allowance(
        &self,
        asset: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ChainError> {
        let erc20 = IERC20::new(asset, self.provider.clone());
        Ok(erc20.allowance(owner, spender).call().await?)
    }

    async fn preview_deposit(&self, vault: Address, assets: U256) -> Result<U256, ChainError> {
        let vault = IERC4626::new(vault, self.provider.clone());
        Ok(vault.previewDeposit(assets).call().await?)
    }

    async fn preview_redeem(&self, vault: Address, shares: U256) -> Result<U256, ChainError> {
        let vault = IERC4626::new(vault, self.provider.clone());
        Ok(vault.previewRedeem(shares).call().await?)
    }

    async fn is_router_allowed(
        &self,
        vault: Address,
        router: Address,
    ) -> Result<bool, ChainError> {
        let vault = IRouterVault::new(vault, self.provider.clone());
        Ok(vault.isRouterAllowed(router).call().await?)
    }

    async fn user_shares(&self, vault: Address, owner: Address) -> Result<U256, ChainError> {
        let vault = IRouterVault::new(vault, self.provider.clone());
        Ok(vault.userShares(owner).call().await?)
    }

    async fn assets_of(&self, vault: Address, owner: Address) -> Result<U256, ChainError> {
        let vault = IRouterVault::new(vault, self.provider.clone());
        Ok(vault.currentAssetsOf(owner).call().await?)
    }
}

#[async_trait]
impl ChainWriter for EvmChainClient {
    async fn submit(&self, request: TransactionRequest) -> Result<B256, ChainError> {
        let pending = self
            .provider
            .send_transaction(request)
            .await
            .map_err(|err| ChainError::Submission(err.to_string()))?;
        let tx = *pending.tx_hash();
        info!(
            target: "chain::writer",
            tx = %tx,
            sender = %self.sender,
            "transaction submitted"
        );
        Ok(tx)
    }

    async fn wait_for_confirmation(&self, tx: B256) -> Result<ReceiptSummary, ChainError> {
        loop {
            if let Some(receipt) = self.provider.get_transaction_receipt(tx).await? {
                let summary = ReceiptSummary {
                    tx,
                    success: receipt.status(),
                    block_number: receipt.block_number,
                    gas_used: receipt.gas_used,
                };
                debug!(
                    target: "chain::writer",
                    tx = %tx,
                    success = summary.success,
                    block = ?summary.block_number,
                    gas_used = summary.gas_used,
                    "receipt observed"
                );
                return Ok(summary);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
