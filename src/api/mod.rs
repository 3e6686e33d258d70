//! 外部 HTTP API 封装。

pub mod lifi;
pub mod serde_helpers;

pub use lifi::{LifiApiClient, LifiError, QuotePayload, QuoteRequest};
