#![allow(non_snake_case)]

use super::*;
use crate::{
    character::CharacterType,
    contract::WriteCall,
    fakes::{
        FAKE_PASSWORD,
        FakeHost,
        FakeProvider,
        arb_character,
        fake_abi_hash,
        registry_for,
    },
    events::EventKind,
};
use deployments::{
    SupportedNetwork,
    TESTNET_NETWORK_ID,
};
use tokio::time;

type Rx = mpsc::UnboundedReceiver<Inbound<FakeProvider>>;

fn quiet_config() -> ControllerConfig {
    ControllerConfig {
        host_poll_interval: Duration::from_secs(3_600),
        ..ControllerConfig::default()
    }
}

async fn pump_until(
    controller: &mut AppController<FakeHost>,
    rx: &mut Rx,
    mut done: impl FnMut(&AppController<FakeHost>) -> bool,
) {
    time::timeout(Duration::from_secs(5), async {
        while !done(controller) {
            let msg = rx.recv().await.expect("inbound channel open");
            controller.handle(msg);
        }
    })
    .await
    .expect("controller reached the expected state");
}

async fn connected_controller(
    host: Arc<FakeHost>,
    config: ControllerConfig,
) -> (AppController<FakeHost>, Rx) {
    let registry = registry_for(SupportedNetwork::Testnet);
    let (mut controller, mut rx) =
        AppController::new(host, registry, fake_abi_hash(), config);
    controller.rebuild_session();
    pump_until(&mut controller, &mut rx, |c| {
        c.state().session().is_some() && !c.is_refreshing()
    })
    .await;
    (controller, rx)
}

fn testnet_host() -> Arc<FakeHost> {
    Arc::new(FakeHost::on_network(TESTNET_NETWORK_ID))
}

#[tokio::test]
async fn rebuild_session__binds_subscribes_and_loads_characters() {
    // given
    let host = testnet_host();
    host.ledger().set_characters(
        vec![arb_character(1, 100, 20)],
        vec![arb_character(2, 100, 0)],
    );

    // when
    let (controller, _rx) = connected_controller(host.clone(), quiet_config()).await;

    // then
    let session = controller.state().session().unwrap();
    assert_eq!(session.network, SupportedNetwork::Testnet);
    assert_eq!(session.account_name, "alice");
    assert_eq!(host.ledger().subscribed_kinds(), EventKind::ALL.to_vec());
    assert_eq!(controller.state().characters.mine.len(), 1);
    assert_eq!(controller.state().characters.others.len(), 1);
    assert_eq!(host.ledger().refresh_count(), 1);
}

#[tokio::test]
async fn healed_event__refreshes_once_and_notifies_once() {
    // given
    let host = testnet_host();
    host.ledger()
        .set_characters(vec![arb_character(7, 40, 0)], vec![]);
    let (mut controller, mut rx) = connected_controller(host.clone(), quiet_config()).await;
    let refreshes_before = host.ledger().refresh_count();
    let raised_before = controller.state().notification.raised_count();

    // when
    host.ledger().emit(ContractEvent::Healed { token_id: 7 });
    pump_until(&mut controller, &mut rx, |c| {
        c.state().notification.is_visible() && !c.is_refreshing()
    })
    .await;

    // then
    assert_eq!(host.ledger().refresh_count() - refreshes_before, 1);
    assert_eq!(
        controller.state().notification.raised_count() - raised_before,
        1
    );
    let shown = controller.state().notification.visible().unwrap();
    assert!(shown.body.contains('7'));
    assert!(shown.body.contains("50"));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn fighted_event__notifies_with_all_numbers_and_refreshes_once() {
    // given
    let host = testnet_host();
    let (mut controller, mut rx) = connected_controller(host.clone(), quiet_config()).await;
    let refreshes_before = host.ledger().refresh_count();

    // when
    host.ledger().emit(ContractEvent::Fighted {
        my_token_id: 3,
        rival_token_id: 9,
        damage_to_rival: 20,
        damage_to_me: 15,
    });
    pump_until(&mut controller, &mut rx, |c| {
        c.state().notification.is_visible() && !c.is_refreshing()
    })
    .await;

    // then
    assert_eq!(host.ledger().refresh_count() - refreshes_before, 1);
    let shown = controller.state().notification.visible().unwrap();
    assert_eq!(shown.title, "The Fight Took Place");
    for number in ["3", "9", "20", "15"] {
        assert!(shown.body.contains(number), "missing {number}");
    }
}

#[tokio::test]
async fn character_created_event__notifies_without_refresh() {
    // given
    let host = testnet_host();
    let (mut controller, mut rx) = connected_controller(host.clone(), quiet_config()).await;
    let refreshes_before = host.ledger().refresh_count();

    // when
    host.ledger().emit(ContractEvent::CharacterCreated { id: 12 });
    pump_until(&mut controller, &mut rx, |c| {
        c.state().notification.is_visible()
    })
    .await;

    // then
    assert!(!controller.is_refreshing());
    assert_eq!(host.ledger().refresh_count(), refreshes_before);
    assert_eq!(
        controller.state().notification.visible().unwrap().body,
        "You have a new character #12"
    );
}

#[tokio::test]
async fn subscription_error__notifies_and_keeps_the_feed_alive() {
    // given
    let host = testnet_host();
    let (mut controller, mut rx) = connected_controller(host.clone(), quiet_config()).await;

    // when
    host.ledger().emit_error(EventKind::Healed, "rpc down");
    pump_until(&mut controller, &mut rx, |c| {
        c.state().notification.is_visible()
    })
    .await;

    // then
    let shown = controller.state().notification.visible().unwrap().clone();
    assert_eq!(shown.title, "Error");
    assert!(shown.body.contains("rpc down"));

    controller.dismiss_notification();
    host.ledger().emit(ContractEvent::Healed { token_id: 4 });
    pump_until(&mut controller, &mut rx, |c| {
        c.state().notification.is_visible() && !c.is_refreshing()
    })
    .await;
    assert_eq!(
        controller.state().notification.visible().unwrap().title,
        "Your Character Is Healed"
    );
}

#[tokio::test]
async fn handle__messages_from_previous_epoch__are_ignored() {
    // given
    let host = testnet_host();
    let (mut controller, _rx) = connected_controller(host.clone(), quiet_config()).await;
    let old_epoch = controller.epoch();

    // when
    controller.rebuild_session();
    controller.handle(Inbound::Refreshed {
        epoch: old_epoch,
        result: Ok(CharacterCollections {
            mine: vec![arb_character(1, 100, 50)],
            others: vec![],
        }),
    });
    controller.handle(Inbound::Event {
        epoch: old_epoch,
        result: Ok(ContractEvent::Healed { token_id: 1 }),
    });

    // then
    assert_eq!(controller.epoch(), old_epoch + 1);
    assert!(controller.state().characters.mine.is_empty());
    assert!(!controller.state().notification.is_visible());
    assert_eq!(controller.state().connectivity, Connectivity::Connecting);
}

#[tokio::test]
async fn request_refresh__overlapping_triggers__coalesce_into_one_follow_up() {
    // given
    let host = testnet_host();
    let (mut controller, mut rx) = connected_controller(host.clone(), quiet_config()).await;
    let refreshes_before = host.ledger().refresh_count();

    // when
    controller.request_refresh();
    controller.request_refresh();
    controller.request_refresh();
    pump_until(&mut controller, &mut rx, |c| !c.is_refreshing()).await;

    // then
    assert_eq!(host.ledger().refresh_count() - refreshes_before, 2);
}

#[tokio::test]
async fn new_block__triggers_refresh() {
    // given
    let host = testnet_host();
    let (mut controller, mut rx) = connected_controller(host.clone(), quiet_config()).await;
    let refreshes_before = host.ledger().refresh_count();
    host.ledger()
        .set_characters(vec![arb_character(5, 100, 0)], vec![]);

    // when
    host.ledger().produce_block(10);
    pump_until(&mut controller, &mut rx, |c| {
        !c.state().characters.mine.is_empty() && !c.is_refreshing()
    })
    .await;

    // then
    assert_eq!(host.ledger().refresh_count() - refreshes_before, 1);
    assert_eq!(controller.state().characters.mine[0].id, 5);
}

#[tokio::test]
async fn dispatch__failed_write__notifies_error_and_clears_pending() {
    // given
    let host = testnet_host();
    host.ledger().fail_writes_with("user rejected");
    let (mut controller, mut rx) = connected_controller(host.clone(), quiet_config()).await;

    // when
    let started = controller.dispatch(Action::Create(CharacterType::Elementary));
    pump_until(&mut controller, &mut rx, |c| {
        c.state().notification.is_visible()
    })
    .await;

    // then
    assert!(started);
    let shown = controller.state().notification.visible().unwrap();
    assert_eq!(shown.title, "Error");
    assert!(shown.body.contains("user rejected"));
    assert!(!controller.is_pending());
    assert!(!controller.state().pending);
}

#[tokio::test]
async fn dispatch__while_pending__is_refused() {
    // given
    let host = testnet_host();
    host.ledger().hold_writes();
    let (mut controller, _rx) = connected_controller(host.clone(), quiet_config()).await;
    assert!(controller.dispatch(Action::Create(CharacterType::Berserker)));

    // when
    let second = controller.dispatch(Action::Create(CharacterType::Spiritual));

    // then
    assert!(!second);
    assert!(controller.is_pending());
    assert!(controller.state().status.contains("pending"));
}

#[tokio::test]
async fn dispatch__heal_success__attaches_heal_fee_and_refreshes() {
    // given
    let host = testnet_host();
    host.ledger()
        .set_characters(vec![arb_character(7, 40, 0)], vec![]);
    let (mut controller, mut rx) = connected_controller(host.clone(), quiet_config()).await;
    let refreshes_before = host.ledger().refresh_count();

    // when
    assert!(controller.dispatch(Action::Heal(7)));
    pump_until(&mut controller, &mut rx, |c| {
        c.state().status.contains("confirmed") && !c.is_refreshing()
    })
    .await;

    // then
    assert_eq!(
        host.ledger().writes(),
        vec![(WriteCall::Heal(7), ActionFees::default().heal)]
    );
    assert_eq!(host.ledger().refresh_count() - refreshes_before, 1);
    assert!(!controller.is_pending());
}

#[tokio::test]
async fn dispatch__fight_without_selection__is_refused() {
    // given
    let host = testnet_host();
    host.ledger().set_characters(
        vec![arb_character(1, 100, 50)],
        vec![arb_character(9, 100, 50)],
    );
    let (mut controller, _rx) = connected_controller(host.clone(), quiet_config()).await;
    let fight = Action::Fight {
        my_token_id: 1,
        rival_token_id: 9,
    };

    // then
    assert!(!controller.dispatch(fight));
    controller.select_own(1);
    assert!(controller.dispatch(fight));
}

#[tokio::test]
async fn host_watcher__network_change__rebuilds_into_wrong_network() {
    // given
    let host = testnet_host();
    let config = ControllerConfig {
        host_poll_interval: Duration::from_millis(10),
        ..ControllerConfig::default()
    };
    let (mut controller, mut rx) = connected_controller(host.clone(), config).await;
    let first_epoch = controller.epoch();

    // when
    host.set_network(1337);
    pump_until(&mut controller, &mut rx, |c| {
        matches!(c.state().connectivity, Connectivity::Failed(_))
    })
    .await;

    // then
    assert_eq!(controller.epoch(), first_epoch + 1);
    assert_eq!(host.connects(), 2);
    let shown = controller.state().notification.visible().unwrap();
    assert_eq!(shown.title, "Wrong Network");
    assert!(controller.state().characters.mine.is_empty());
}

#[tokio::test]
async fn host_watcher__new_wallet__rebuilds_session() {
    // given
    let host = testnet_host();
    let config = ControllerConfig {
        host_poll_interval: Duration::from_millis(10),
        ..ControllerConfig::default()
    };
    let (mut controller, mut rx) = connected_controller(host.clone(), config).await;
    let first_epoch = controller.epoch();

    // when
    host.set_accounts(&["alice", "bob"]);
    pump_until(&mut controller, &mut rx, |c| {
        c.epoch() > first_epoch && c.state().session().is_some()
    })
    .await;

    // then
    let session = controller.state().session().unwrap();
    assert_eq!(session.accounts, ["alice", "bob"]);
    assert_eq!(session.account_name, "alice");
}

fn watching_config() -> ControllerConfig {
    ControllerConfig {
        host_poll_interval: Duration::from_millis(10),
        ..ControllerConfig::default()
    }
}

async fn failed_controller(host: Arc<FakeHost>) -> (AppController<FakeHost>, Rx) {
    let registry = registry_for(SupportedNetwork::Testnet);
    let (mut controller, mut rx) =
        AppController::new(host, registry, fake_abi_hash(), watching_config());
    controller.rebuild_session();
    pump_until(&mut controller, &mut rx, |c| {
        matches!(c.state().connectivity, Connectivity::Failed(_))
    })
    .await;
    (controller, rx)
}

#[tokio::test]
async fn failed_session__switch_to_supported_network__reconnects_on_its_own() {
    // given
    let host = Arc::new(FakeHost::on_network(1337));
    let (mut controller, mut rx) = failed_controller(host.clone()).await;
    let failed_epoch = controller.epoch();
    assert_eq!(
        controller.state().notification.visible().unwrap().title,
        "Wrong Network"
    );

    // when
    host.set_network(TESTNET_NETWORK_ID);
    pump_until(&mut controller, &mut rx, |c| {
        matches!(c.state().connectivity, Connectivity::Connected(_))
    })
    .await;

    // then
    assert_eq!(controller.epoch(), failed_epoch + 1);
    let session = controller.state().session().unwrap();
    assert_eq!(session.network, SupportedNetwork::Testnet);
}

#[tokio::test]
async fn failed_session__first_wallet_added__reconnects_on_its_own() {
    // given
    let host = testnet_host();
    host.set_accounts(&[]);
    let (mut controller, mut rx) = failed_controller(host.clone()).await;
    assert_eq!(host.connects(), 0);

    // when
    host.set_accounts(&["alice"]);
    pump_until(&mut controller, &mut rx, |c| {
        matches!(c.state().connectivity, Connectivity::Connected(_))
    })
    .await;

    // then
    assert_eq!(host.connects(), 1);
    assert_eq!(controller.state().session().unwrap().account_name, "alice");
}

#[tokio::test]
async fn failed_session__host_unchanged__stays_down() {
    // given
    let host = Arc::new(FakeHost::on_network(1337));
    let (controller, mut rx) = failed_controller(host.clone()).await;
    let failed_epoch = controller.epoch();

    // when
    let woke = time::timeout(Duration::from_millis(100), rx.recv()).await;

    // then
    assert!(woke.is_err());
    assert_eq!(controller.epoch(), failed_epoch);
    assert_eq!(host.connects(), 1);
}

#[tokio::test]
async fn unlock_and_switch__locked_account__requires_the_right_password() {
    // given
    let host = testnet_host();
    host.set_accounts(&["alice", "bob"]);
    host.lock("bob");
    let (mut controller, mut rx) = connected_controller(host.clone(), quiet_config()).await;
    assert_eq!(
        controller.account_choices(),
        vec![("alice".to_string(), true), ("bob".to_string(), false)]
    );

    // when
    let wrong = controller.unlock_and_switch("bob", "guess");
    let right = controller.unlock_and_switch("bob", FAKE_PASSWORD);
    pump_until(&mut controller, &mut rx, |c| c.state().session().is_some()).await;

    // then
    assert!(matches!(wrong, Err(GameError::Connection(_))));
    assert!(right.is_ok());
    assert_eq!(controller.state().session().unwrap().account_name, "bob");
    assert_eq!(controller.active_account(), Some("bob"));
}
