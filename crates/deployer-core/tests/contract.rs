mod common;

use std::sync::Arc;

use deployer_core::address::{Cell, ContractInit};
use deployer_core::api::types::AccountStatus;
use deployer_core::contract::{ContractProvider, InternalMessage};
use deployer_core::error::{ConfigError, SendError};

use common::{MockLedger, Poll, RecordingSender, sample_init};

#[tokio::test]
async fn init_is_attached_until_the_contract_is_active() {
    let ledger = Arc::new(MockLedger::with_status(AccountStatus::Nonexist));
    let sender = Arc::new(RecordingSender::new(Some(Arc::clone(&ledger))));
    let init = sample_init();
    let address = init.address(0);

    let contract = ContractProvider::new(
        address,
        Some(init.clone()),
        ledger.clone(),
        Some(sender.clone()),
    );

    contract
        .internal(InternalMessage::new(50_000_000))
        .await
        .expect("first send");
    contract
        .internal(InternalMessage::new(1_000).with_body(Some(Cell::new(vec![1, 2, 3]))))
        .await
        .expect("second send");

    let sent = sender.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].init.as_ref(), Some(&init));
    assert_eq!(sent[0].to, address);
    assert!(sent[1].init.is_none());
    assert_eq!(sent[1].body, Some(Cell::new(vec![1, 2, 3])));
    assert_eq!(ledger.state_queries(), 2);
}

#[tokio::test]
async fn contract_without_init_never_queries_state() {
    let ledger = Arc::new(MockLedger::with_status(AccountStatus::Uninit));
    let sender = Arc::new(RecordingSender::new(None));
    let contract = ContractProvider::new(
        sample_init().address(0),
        None,
        ledger.clone(),
        Some(sender.clone()),
    );

    contract
        .internal(InternalMessage::new(1))
        .await
        .expect("send");

    assert!(sender.sent()[0].init.is_none());
    assert_eq!(ledger.state_queries(), 0);
}

#[tokio::test]
async fn nested_contracts_keep_the_init_decision() {
    let ledger = Arc::new(MockLedger::with_status(AccountStatus::Uninit));
    let sender = Arc::new(RecordingSender::new(Some(Arc::clone(&ledger))));
    let parent = ContractProvider::new(
        sample_init().address(0),
        None,
        ledger.clone(),
        Some(sender.clone()),
    );

    let child_init = ContractInit::new(
        Cell::new(b"child-code".to_vec()),
        Cell::new(vec![9]),
    );
    let child = parent.open(child_init.address(0), Some(child_init.clone()));

    child
        .internal(InternalMessage::new(10))
        .await
        .expect("deploy child");
    child
        .internal(InternalMessage::new(10))
        .await
        .expect("call child");

    let sent = sender.sent();
    assert_eq!(sent[0].init.as_ref(), Some(&child_init));
    assert!(sent[1].init.is_none());
}

#[tokio::test]
async fn internal_message_needs_a_sender() {
    let ledger = Arc::new(MockLedger::with_status(AccountStatus::Nonexist));
    let contract =
        ContractProvider::new(sample_init().address(0), Some(sample_init()), ledger, None);

    let err = contract
        .internal(InternalMessage::new(1))
        .await
        .expect_err("no sender");
    assert!(matches!(err, SendError::NotConnected));
}

#[tokio::test]
async fn unsupported_send_mode_fails_before_the_state_query() {
    let ledger = Arc::new(MockLedger::default().script([Poll::Fail]));
    let sender = Arc::new(RecordingSender::new(None));
    let init = sample_init();
    let contract = ContractProvider::new(
        init.address(0),
        Some(init),
        ledger.clone(),
        Some(sender.clone()),
    );

    let mut message = InternalMessage::new(1);
    message.send_mode = Some(3);
    let err = contract.internal(message).await.expect_err("bad mode");

    assert!(matches!(
        err,
        SendError::Config(ConfigError::UnsupportedSendMode(3))
    ));
    assert_eq!(ledger.state_queries(), 0);
    assert!(sender.sent().is_empty());
}

#[tokio::test]
async fn external_messages_go_straight_to_the_ledger() {
    let ledger = Arc::new(MockLedger::with_status(AccountStatus::Nonexist).activate_on_send());
    let init = sample_init();
    let contract = ContractProvider::new(init.address(0), Some(init), ledger.clone(), None);

    contract
        .external(&Cell::new(vec![0xaa]))
        .await
        .expect("first external");
    contract
        .external(&Cell::new(vec![0xbb]))
        .await
        .expect("second external");

    let sent = ledger.sent();
    assert_eq!(sent.len(), 2);
    let first: serde_json::Value = serde_json::from_slice(&sent[0]).expect("json");
    let second: serde_json::Value = serde_json::from_slice(&sent[1]).expect("json");
    assert!(first.get("init").is_some());
    assert!(second.get("init").is_none());
}
