use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentRegistry,
    compute_abi_hash,
};
use nft_arena::{
    NFT_GAME_ABI_JSON,
    actions::ActionFees,
    controller::{
        AppController,
        ControllerConfig,
        DEFAULT_HOST_POLL_INTERVAL,
        Inbound,
    },
    fuel::{
        FuelHost,
        FuelProvider,
    },
    session::WalletHost,
    wallets,
};
use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::sync::mpsc;

pub const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:4000";
pub const DEFAULT_POLL_MS: u64 = 1_000;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub rpc_url: String,
    pub wallet: Option<String>,
    pub wallet_dir: PathBuf,
    pub fees: ActionFees,
    pub poll_interval: Duration,
}

/// Unlocks the starting wallet before the terminal switches to raw mode.
fn unlock_starting_wallet(host: &FuelHost, config: &AppConfig) -> Result<String> {
    let accounts = host
        .discover_accounts()
        .map_err(|e| eyre!(e))
        .wrap_err("listing forc-wallet profiles failed")?;
    let descriptor = match config.wallet.as_deref() {
        Some(name) => accounts.iter().find(|w| w.name == name).ok_or_else(|| {
            eyre!(
                "Wallet '{name}' not found in {}",
                config.wallet_dir.to_string_lossy()
            )
        })?,
        None => accounts.first().ok_or_else(|| {
            eyre!(
                "No forc-wallet profiles found in {}",
                config.wallet_dir.to_string_lossy()
            )
        })?,
    };
    let password = wallets::prompt_wallet_password(descriptor)?;
    host.unlock(descriptor, &password).map_err(|e| eyre!(e))?;
    Ok(descriptor.name.clone())
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let host = FuelHost::new(
        config.rpc_url.clone(),
        config.wallet_dir.clone(),
        config.poll_interval,
    );
    let active = unlock_starting_wallet(&host, &config)?;
    let registry = DeploymentRegistry::new().map_err(|e| eyre!(e))?;
    if let Some(path) = registry.path() {
        tracing::info!("Using deployment registry at {}", path.display());
    }

    let controller_config = ControllerConfig {
        fees: config.fees,
        poll_interval: config.poll_interval,
        host_poll_interval: DEFAULT_HOST_POLL_INTERVAL,
        preferred_account: Some(active),
    };
    let (mut controller, inbound) = AppController::new(
        Arc::new(host),
        registry,
        compute_abi_hash(NFT_GAME_ABI_JSON),
        controller_config,
    );
    controller.rebuild_session();

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    tracing::info!(rpc_url = %config.rpc_url, "Starting UI");
    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(controller, inbound, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    mut controller: AppController<FuelHost>,
    mut inbound: mpsc::UnboundedReceiver<Inbound<FuelProvider>>,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    tracing::info!("Running app loop");
    loop {
        ui::draw(ui_state, controller.state()).wrap_err("draw failed")?;

        tokio::select! {
            maybe_msg = inbound.recv() => {
                let Some(msg) = maybe_msg else {
                    tracing::warn!("inbound channel closed");
                    break;
                };
                controller.handle(msg);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, controller.state(), event) else {
                    continue;
                };
                if !apply_user_event(&mut controller, ui_state, ev) {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// Applies one user intent. Returns false when the app should exit.
fn apply_user_event(
    controller: &mut AppController<FuelHost>,
    ui_state: &mut ui::UiState,
    ev: ui::UserEvent,
) -> bool {
    match ev {
        ui::UserEvent::Quit => return false,
        ui::UserEvent::Redraw => {}
        ui::UserEvent::Dispatch(action) => {
            controller.dispatch(action);
        }
        ui::UserEvent::SelectOwn(id) => controller.select_own(id),
        ui::UserEvent::CycleCreationType => controller.cycle_creation_type(),
        ui::UserEvent::DismissNotification => controller.dismiss_notification(),
        ui::UserEvent::Reconnect => controller.rebuild_session(),
        ui::UserEvent::OpenAccountPicker => {
            let choices = controller.account_choices();
            if choices.is_empty() {
                controller.set_status("No forc-wallet profiles found");
            } else {
                ui_state.open_account_picker(choices, controller.active_account());
            }
        }
        ui::UserEvent::SwitchAccount(name) => controller.switch_account(name),
        ui::UserEvent::UnlockAccount { name, password } => {
            if let Err(e) = controller.unlock_and_switch(&name, &password) {
                tracing::warn!(account = %name, error = %e, "unlock failed");
                controller.set_status(format!("Could not unlock '{name}': {e}"));
            }
        }
    }
    true
}
