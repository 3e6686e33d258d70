use alloy::signers::local::PrivateKeySigner;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("未配置签名私钥（global.wallet.private_key）")]
    Missing,
    #[error("私钥格式无效: {0}")]
    Invalid(String),
}

/// 签名身份配置。私钥为 0x 前缀可选的 32 字节十六进制。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub private_key: String,
}

impl WalletConfig {
    pub fn signer(&self) -> Result<PrivateKeySigner, WalletError> {
        let trimmed = self.private_key.trim();
        if trimmed.is_empty() {
            return Err(WalletError::Missing);
        }
        trimmed
            .parse::<PrivateKeySigner>()
            .map_err(|err| WalletError::Invalid(err.to_string()))
    }
}
