mod common;

use common::{LOG_FAILURE_MARKER, LogRepository, MemberRepository, MemberService, ServiceError, manager};
use memtx::TxError;

fn failing_username(prefix: &str) -> String {
    format!("{}_{}", prefix, LOG_FAILURE_MARKER)
}

#[test]
fn test_outer_tx_off_success() {
    let manager = manager("member_outer_off_success");
    let service = MemberService::new(
        &manager,
        MemberRepository::new(&manager),
        LogRepository::new(&manager),
    );
    let mut ctx = manager.context();

    service.join_v1(&mut ctx, "outerTxOff_success").unwrap();

    assert!(service.members.find(&ctx, "outerTxOff_success").is_some());
    assert!(service.logs.find(&ctx, "outerTxOff_success").is_some());
    // each repository ran its own physical transaction
    assert_eq!(manager.metrics().commits, 2);
}

#[test]
fn test_outer_tx_off_fail() {
    let manager = manager("member_outer_off_fail");
    let service = MemberService::new(
        &manager,
        MemberRepository::new(&manager),
        LogRepository::new(&manager),
    );
    let mut ctx = manager.context();
    let username = failing_username("outerTxOff_fail");

    let result = service.join_v1(&mut ctx, &username);

    assert!(matches!(result, Err(ServiceError::LogWrite(_))));
    assert!(service.members.find(&ctx, &username).is_some());
    assert!(service.logs.find(&ctx, &username).is_none());
}

#[test]
fn test_single_tx() {
    let manager = manager("member_single_tx");
    let service = MemberService::new(
        &manager,
        MemberRepository::new(&manager).without_transaction(),
        LogRepository::new(&manager).without_transaction(),
    )
    .transactional();
    let mut ctx = manager.context();

    service.join_v1(&mut ctx, "singleTx").unwrap();

    assert!(service.members.find(&ctx, "singleTx").is_some());
    assert!(service.logs.find(&ctx, "singleTx").is_some());
    assert_eq!(manager.metrics().begins, 1);
}

#[test]
fn test_outer_tx_on_success() {
    let manager = manager("member_outer_on_success");
    let service = MemberService::new(
        &manager,
        MemberRepository::new(&manager),
        LogRepository::new(&manager),
    )
    .transactional();
    let mut ctx = manager.context();

    service.join_v1(&mut ctx, "outerTxOn_success").unwrap();

    assert!(service.members.find(&ctx, "outerTxOn_success").is_some());
    assert!(service.logs.find(&ctx, "outerTxOn_success").is_some());
    let metrics = manager.metrics();
    assert_eq!(metrics.begins, 1);
    assert_eq!(metrics.commits, 1);
}

#[test]
fn test_outer_tx_on_fail() {
    let manager = manager("member_outer_on_fail");
    let service = MemberService::new(
        &manager,
        MemberRepository::new(&manager),
        LogRepository::new(&manager),
    )
    .transactional();
    let mut ctx = manager.context();
    let username = failing_username("outerTxOn_fail");

    let result = service.join_v1(&mut ctx, &username);

    assert!(matches!(result, Err(ServiceError::LogWrite(_))));
    assert!(service.members.find(&ctx, &username).is_none());
    assert!(service.logs.find(&ctx, &username).is_none());
    assert!(!ctx.is_transaction_active());
}

#[test]
fn test_recover_exception_fail() {
    let manager = manager("member_recover_fail");
    let service = MemberService::new(
        &manager,
        MemberRepository::new(&manager),
        LogRepository::new(&manager),
    )
    .transactional();
    let mut ctx = manager.context();
    let username = failing_username("recoverException_fail");

    // the log participant poisons the shared transaction before join_v2 swallows its failure
    let result = service.join_v2(&mut ctx, &username);

    assert!(matches!(
        result,
        Err(ServiceError::Tx(TxError::UnexpectedRollback(_)))
    ));
    assert!(service.members.find(&ctx, &username).is_none());
    assert!(service.logs.find(&ctx, &username).is_none());
}

#[test]
fn test_recover_exception_success() {
    let manager = manager("member_recover_success");
    let service = MemberService::new(
        &manager,
        MemberRepository::new(&manager),
        LogRepository::new(&manager).requires_new(),
    )
    .transactional();
    let mut ctx = manager.context();
    let username = failing_username("recoverException_success");

    service.join_v2(&mut ctx, &username).unwrap();

    assert!(service.members.find(&ctx, &username).is_some());
    assert!(service.logs.find(&ctx, &username).is_none());
    let metrics = manager.metrics();
    assert_eq!(metrics.begins, 2);
    assert_eq!(metrics.commits, 1);
    assert_eq!(metrics.rollbacks, 1);
}
