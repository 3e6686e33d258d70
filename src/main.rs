use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use anyhow::{Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

mod api;
mod chain;
mod config;
mod engine;

use api::LifiApiClient;
use chain::{ChainReader, ChainWriter, EvmChainClient};
use config::{MagellanConfig, load_config};
use engine::{
    AllowanceManager, QuoteResolver, RouteSource, RouterGate, TxSequencer, VaultWorkflow,
    WorkflowContext,
};

#[derive(Parser, Debug)]
#[command(name = "magellan", version, about = "跨协议金库入金 / 赎回编排器")]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径（默认查找 magellan.toml 或 config/magellan.toml）"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 执行入金工作流：兑换源资产并经白名单路由器存入金库
    Deposit(DepositCmd),
    /// 按基点比例赎回金库份额并兑换回源资产
    Redeem(RedeemCmd),
    /// 只读查询当前持仓与余额
    Status,
    /// 只读解析一条兑换路由（不上链）
    Quote(QuoteCmd),
    /// 初始化配置模版文件
    Init(InitCmd),
}

#[derive(Args, Debug)]
struct DepositCmd {
    #[arg(long, help = "人类可读的投入数量，覆盖配置中的 workflow.amount")]
    amount: Option<String>,
}

#[derive(Args, Debug)]
struct RedeemCmd {
    #[arg(
        long,
        help = "赎回比例（基点，>=10000 表示全部），覆盖配置中的 workflow.redeem_fraction_bps"
    )]
    fraction_bps: Option<u16>,
}

#[derive(Args, Debug)]
struct QuoteCmd {
    #[arg(long, help = "按赎回方向反向报价（target_asset -> asset）")]
    reverse: bool,
}

#[derive(Args, Debug)]
struct InitCmd {
    #[arg(long, value_name = "DIR", help = "可选输出目录（默认当前目录）")]
    output: Option<PathBuf>,
    #[arg(long, help = "若文件存在则覆盖")]
    force: bool,
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.clone())?;
    init_tracing(&config.global.logging)?;

    match cli.command {
        Command::Deposit(args) => {
            let (client, workflow) = build_workflow(&config)?;
            let ctx = workflow.context().clone();
            let decimals = client.decimals(ctx.asset).await?;
            let amount_text = args
                .amount
                .or_else(|| config.workflow.amount.clone())
                .ok_or_else(|| anyhow!("未提供投入数量（--amount 或 workflow.amount）"))?;
            let amount = parse_units(&amount_text, decimals)?;

            info!(
                target: "magellan",
                signer = %ctx.signer,
                vault = %ctx.vault,
                amount = %amount,
                "开始入金工作流"
            );
            let outcome = workflow
                .deposit(amount)
                .await
                .map_err(|err| anyhow!("入金工作流失败: {}", err.describe()))?;

            let target_decimals = client.decimals(ctx.target_asset).await?;
            println!("deposit tx : {}", outcome.receipt.tx);
            println!(
                "route      : {} via {}",
                outcome.quote.tool.as_deref().unwrap_or("?"),
                outcome.quote.router
            );
            println!(
                "min out    : {}",
                format_units(outcome.quote.min_out, target_decimals)
            );
            println!("min shares : {}", outcome.min_shares);
            println!("shares     : {}", outcome.position.shares);
            println!(
                "assets est : {}",
                format_units(outcome.position.assets_estimate, target_decimals)
            );
        }
        Command::Redeem(args) => {
            let (client, workflow) = build_workflow(&config)?;
            let ctx = workflow.context().clone();
            let fraction_bps = args
                .fraction_bps
                .unwrap_or(config.workflow.redeem_fraction_bps);

            info!(
                target: "magellan",
                signer = %ctx.signer,
                vault = %ctx.vault,
                fraction_bps,
                "开始赎回工作流"
            );
            let outcome = workflow
                .redeem(fraction_bps)
                .await
                .map_err(|err| anyhow!("赎回工作流失败: {}", err.describe()))?;

            let decimals = client.decimals(ctx.asset).await?;
            println!("withdraw tx     : {}", outcome.receipt.tx);
            println!(
                "route           : {} via {}",
                outcome.quote.tool.as_deref().unwrap_or("?"),
                outcome.quote.router
            );
            println!("shares redeemed : {}", outcome.shares_redeemed);
            println!("shares left     : {}", outcome.remaining_shares);
            println!(
                "signer balance  : {}",
                format_units(outcome.signer_asset_balance, decimals)
            );
        }
        Command::Status => {
            let (client, workflow) = build_workflow(&config)?;
            let ctx = workflow.context().clone();
            let position = workflow
                .position()
                .await
                .map_err(|err| anyhow!("查询持仓失败: {}", err.describe()))?;
            let decimals = client.decimals(ctx.asset).await?;
            let target_decimals = client.decimals(ctx.target_asset).await?;
            let balance = client.balance_of(ctx.asset, ctx.signer).await?;

            println!("signer     : {}", ctx.signer);
            println!("vault      : {}", ctx.vault);
            println!("shares     : {}", position.shares);
            println!(
                "assets est : {}",
                format_units(position.assets_estimate, target_decimals)
            );
            println!("balance    : {}", format_units(balance, decimals));
        }
        Command::Quote(args) => {
            let (client, workflow) = build_workflow(&config)?;
            let ctx = workflow.context().clone();
            let decimals = if args.reverse {
                client.decimals(ctx.target_asset).await?
            } else {
                client.decimals(ctx.asset).await?
            };
            let amount_text = config
                .workflow
                .amount
                .clone()
                .ok_or_else(|| anyhow!("未提供报价数量（workflow.amount）"))?;
            let amount = parse_units(&amount_text, decimals)?;

            let quote = workflow
                .preview_route(amount, args.reverse)
                .await
                .map_err(|err| anyhow!("路由解析失败: {}", err.describe()))?;
            let out_decimals = if args.reverse {
                client.decimals(ctx.asset).await?
            } else {
                client.decimals(ctx.target_asset).await?
            };
            println!("router  : {}", quote.router);
            println!("tool    : {}", quote.tool.as_deref().unwrap_or("?"));
            println!("min out : {}", format_units(quote.min_out, out_decimals));
            println!("payload : {} bytes", quote.payload.len());
        }
        Command::Init(args) => {
            init_configs(args)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

fn init_tracing(config: &config::LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .init();
    } else {
        fmt().with_env_filter(filter).init();
    }
    Ok(())
}

/// 组装整套编排组件。配置结构体只在这里被消费，
/// 下游组件拿到的都是已验证的参数。
fn build_workflow(config: &MagellanConfig) -> Result<(Arc<EvmChainClient>, VaultWorkflow)> {
    if config.global.rpc_url.trim().is_empty() {
        bail!("未配置 global.rpc_url");
    }
    let signer = config.global.wallet.signer()?;
    let client = Arc::new(EvmChainClient::connect(
        &config.global.rpc_url,
        signer,
        Duration::from_millis(config.workflow.confirm_poll_ms),
    )?);
    let sender = client.sender();

    let reader: Arc<dyn ChainReader> = client.clone();
    let writer: Arc<dyn ChainWriter> = client.clone();
    let sequencer = Arc::new(TxSequencer::new(
        writer,
        sender,
        Duration::from_millis(config.workflow.confirm_timeout_ms),
    ));

    let http = reqwest::Client::builder().build()?;
    let resolver: Arc<dyn RouteSource> = Arc::new(QuoteResolver::new(
        LifiApiClient::new(http, &config.lifi),
        config.workflow.slippage_bps,
    ));
    let allowance = AllowanceManager::new(reader.clone(), sequencer.clone());
    let gate = RouterGate::new(
        reader.clone(),
        sequencer.clone(),
        config.workflow.auto_authorize,
    );

    let workflow = &config.workflow;
    let ctx = WorkflowContext {
        chain_id: config.global.chain_id,
        signer: sender,
        asset: workflow
            .asset
            .ok_or_else(|| anyhow!("配置缺少 workflow.asset"))?,
        target_asset: workflow
            .target_asset
            .ok_or_else(|| anyhow!("配置缺少 workflow.target_asset"))?,
        vault: workflow
            .vault
            .ok_or_else(|| anyhow!("配置缺少 workflow.vault"))?,
        yield_vault: workflow
            .yield_vault
            .ok_or_else(|| anyhow!("配置缺少 workflow.yield_vault"))?,
    };

    let workflow = VaultWorkflow::new(reader, resolver, allowance, gate, sequencer, ctx);
    Ok((client, workflow))
}

fn init_configs(args: InitCmd) -> Result<()> {
    let output_dir = match args.output {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    fs::create_dir_all(&output_dir)?;

    let templates: [(&str, &str); 1] = [(
        "magellan.toml",
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/magellan.toml")),
    )];

    for (filename, contents) in templates {
        let target_path = output_dir.join(filename);
        if target_path.exists() && !args.force {
            println!(
                "跳过 {}（文件已存在，如需覆盖请加 --force）",
                target_path.display()
            );
            continue;
        }

        fs::write(&target_path, contents)?;
        println!("已写入 {}", target_path.display());
    }

    Ok(())
}

/// 人类可读数量 -> 最小单位。精度在运行时从链上读取，不做假设。
fn parse_units(text: &str, decimals: u8) -> Result<U256> {
    if decimals > 28 {
        bail!("资产精度 {decimals} 超出支持范围");
    }
    let value =
        Decimal::from_str(text.trim()).map_err(|err| anyhow!("数量格式无效 {text}: {err}"))?;
    if value.is_sign_negative() {
        bail!("数量不能为负: {text}");
    }
    let scale = Decimal::from_i128_with_scale(10i128.pow(u32::from(decimals)), 0);
    let scaled = value
        .checked_mul(scale)
        .ok_or_else(|| anyhow!("数量超出可表示范围: {text}"))?;
    if scaled.fract() != Decimal::ZERO {
        bail!("数量 {text} 的小数位超过资产精度 {decimals}");
    }
    U256::from_str(&scaled.trunc().normalize().to_string())
        .map_err(|err| anyhow!("数量换算失败 {text}: {err}"))
}

/// 最小单位 -> 人类可读字符串（去掉尾随零）。
fn format_units(value: U256, decimals: u8) -> String {
    let raw = value.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return raw;
    }
    if raw.len() <= decimals {
        let padded = format!("{raw:0>decimals$}");
        let trimmed = padded.trim_end_matches('0');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            format!("0.{trimmed}")
        }
    } else {
        let (int, frac) = raw.split_at(raw.len() - decimals);
        let trimmed = frac.trim_end_matches('0');
        if trimmed.is_empty() {
            int.to_string()
        } else {
            format!("{int}.{trimmed}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_units_scales_by_decimals() {
        assert_eq!(parse_units("1", 6).unwrap(), U256::from(1_000_000u64));
        assert_eq!(parse_units("0.5", 6).unwrap(), U256::from(500_000u64));
        assert_eq!(
            parse_units("0.001", 18).unwrap(),
            U256::from(1_000_000_000_000_000u64)
        );
        assert_eq!(parse_units("42", 0).unwrap(), U256::from(42u64));
    }

    #[test]
    fn parse_units_rejects_excess_precision() {
        assert!(parse_units("0.0000001", 6).is_err());
        assert!(parse_units("-1", 6).is_err());
        assert!(parse_units("abc", 6).is_err());
    }

    #[test]
    fn format_units_round_trips() {
        assert_eq!(format_units(U256::from(1_000_000u64), 6), "1");
        assert_eq!(format_units(U256::from(500_000u64), 6), "0.5");
        assert_eq!(format_units(U256::from(1u64), 6), "0.000001");
        assert_eq!(format_units(U256::ZERO, 18), "0");
        assert_eq!(format_units(U256::from(42u64), 0), "42");
        assert_eq!(format_units(U256::from(1_234_567u64), 6), "1.234567");
    }
}
