//! 配置层：TOML 文件加载与类型定义。
//!
//! 地址、私钥等在此完成解析与校验，编排核心只接收已验证的参数，
//! 不做任何原始配置解析。

mod loader;
mod types;
mod wallet;

pub use loader::{ConfigError, DEFAULT_CONFIG_PATHS, load_config};
pub use types::{GlobalConfig, LifiConfig, LoggingConfig, MagellanConfig, WorkflowConfig};
pub use wallet::{WalletConfig, WalletError};
