use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::SupportedNetwork;
use nft_arena::{
    actions::ActionFees,
    wallets,
};
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

mod client;
mod ui;

const LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "nft-arena.log";

fn print_usage_and_exit() -> ! {
    let defaults = ActionFees::default();
    println!(
        "Usage: nft-arena [--testnet | --ignition | --local] [--rpc-url <url>]\n\
         [--wallet <name>] [--wallet-dir <path>]\n\
         [--creation-fee <amount>] [--combat-fee <amount>] [--heal-fee <amount>]\n\
         [--poll-ms <millis>]\n\
         \n\
         Flags:\n\
           --testnet              Connect to Fuel Testnet (default RPC {})\n\
           --ignition             Connect to Fuel Ignition (default RPC {})\n\
           --local                Connect to a local Fuel node (default RPC {})\n\
           --rpc-url <url>        Override the RPC URL for the selected network\n\
           --wallet <name>        forc-wallet profile to play with (defaults to the first)\n\
           --wallet-dir <path>    Override forc-wallet directory (defaults to ~/.fuel/wallets)\n\
           --creation-fee <n>     Fee attached to character creation (default {})\n\
           --combat-fee <n>       Fee attached to fights and spells (default {})\n\
           --heal-fee <n>         Fee attached to heals (defaults to the combat fee)\n\
           --poll-ms <millis>     Block and event polling interval (default {})",
        SupportedNetwork::Testnet.default_rpc_url(),
        SupportedNetwork::Ignition.default_rpc_url(),
        client::DEFAULT_LOCAL_RPC_URL,
        defaults.creation,
        defaults.combat,
        client::DEFAULT_POLL_MS,
    );
    std::process::exit(0);
}

fn parse_amount(flag: &str, raw: Option<String>) -> Result<u64> {
    let raw = raw.ok_or_else(|| eyre!("{flag} requires a numeric argument"))?;
    raw.parse::<u64>()
        .wrap_err_with(|| format!("{flag} expects a whole number, got {raw:?}"))
}

fn parse_cli_args() -> Result<client::AppConfig> {
    #[derive(Clone, Copy)]
    enum NetworkFlag {
        Testnet,
        Ignition,
        Local,
    }

    let mut args = std::env::args().skip(1);
    let mut network_flag: Option<NetworkFlag> = None;
    let mut custom_url: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut wallet_name: Option<String> = None;
    let mut creation_fee: Option<u64> = None;
    let mut combat_fee: Option<u64> = None;
    let mut heal_fee: Option<u64> = None;
    let mut poll_ms: Option<u64> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--testnet" | "--ignition" | "--local" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --testnet/--ignition/--local"
                    ));
                }
                network_flag = Some(match arg.as_str() {
                    "--testnet" => NetworkFlag::Testnet,
                    "--ignition" => NetworkFlag::Ignition,
                    _ => NetworkFlag::Local,
                });
            }
            "--rpc-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--rpc-url requires a URL argument"))?;
                if custom_url.is_some() {
                    return Err(eyre!("--rpc-url may only be specified once"));
                }
                custom_url = Some(url);
            }
            "--wallet-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet-dir requires a path argument"))?;
                if wallet_dir.is_some() {
                    return Err(eyre!("--wallet-dir may only be specified once"));
                }
                wallet_dir = Some(dir);
            }
            "--wallet" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet requires a wallet name"))?;
                if wallet_name.is_some() {
                    return Err(eyre!("--wallet may only be specified once"));
                }
                wallet_name = Some(name);
            }
            "--creation-fee" => creation_fee = Some(parse_amount(&arg, args.next())?),
            "--combat-fee" => combat_fee = Some(parse_amount(&arg, args.next())?),
            "--heal-fee" => heal_fee = Some(parse_amount(&arg, args.next())?),
            "--poll-ms" => {
                let ms = parse_amount(&arg, args.next())?;
                if ms == 0 {
                    return Err(eyre!("--poll-ms must be greater than zero"));
                }
                poll_ms = Some(ms);
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let rpc_url = match network_flag.unwrap_or(NetworkFlag::Testnet) {
        NetworkFlag::Testnet => custom_url
            .unwrap_or_else(|| SupportedNetwork::Testnet.default_rpc_url().to_string()),
        NetworkFlag::Ignition => custom_url
            .unwrap_or_else(|| SupportedNetwork::Ignition.default_rpc_url().to_string()),
        NetworkFlag::Local => {
            custom_url.unwrap_or_else(|| client::DEFAULT_LOCAL_RPC_URL.to_string())
        }
    };

    let defaults = ActionFees::default();
    let combat = combat_fee.unwrap_or(defaults.combat);
    let fees = ActionFees {
        creation: creation_fee.unwrap_or(defaults.creation),
        combat,
        heal: heal_fee.unwrap_or(combat),
    };

    Ok(client::AppConfig {
        rpc_url,
        wallet: wallet_name,
        wallet_dir: wallets::resolve_wallet_dir(wallet_dir.as_deref())?,
        fees,
        poll_interval: Duration::from_millis(poll_ms.unwrap_or(client::DEFAULT_POLL_MS)),
    })
}

/// The terminal belongs to the UI, so logs go to a daily rolling file.
fn init_tracing() -> WorkerGuard {
    let appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _log_guard = init_tracing();
    tracing::info!("starting nft-arena client");
    deployments::ensure_structure().map_err(|e| eyre!(e))?;
    let app_config = parse_cli_args()?;
    client::run_app(app_config).await
}
