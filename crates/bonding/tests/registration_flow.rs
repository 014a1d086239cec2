use provider_bonding::{
    BondOrchestrator, BondPhase, BondRequest, BondingError, MetadataParams, OrchestratorTimings,
    RegistrationRequest, SequenceSource,
};
use provider_chain::{ChainCall, ChainError, ScriptedChainClient, ServiceEntry, NO_EXIT_CODE};
use std::sync::Arc;
use std::time::Duration;

const MISMATCH_EXPECTED_6: &str = "code: 32\nraw_log: 'account sequence mismatch, expected 6, got 5: incorrect account sequence'";

fn request(service: &str) -> RegistrationRequest {
    RegistrationRequest {
        bond: BondRequest {
            key_name: "provider".into(),
            service: service.into(),
            bond_amount: "1".into(),
            fees: "200uarkeo".into(),
            keyring_backend: "test".into(),
        },
        metadata: MetadataParams {
            endpoint_uri: "http://127.0.0.1:3636/metadata.json".into(),
            metadata_nonce: "1".into(),
            status: "1".into(),
            min_contract_duration: "5".into(),
            max_contract_duration: "432000".into(),
            subscription_rate: "200uarkeo".into(),
            pay_as_you_go_rate: "200uarkeo".into(),
            settlement_duration: "1000".into(),
        },
    }
}

fn chain() -> ScriptedChainClient {
    ScriptedChainClient::new().with_key("provider", "pk1", "addr1")
}

fn orchestrator(stub: &ScriptedChainClient) -> BondOrchestrator {
    BondOrchestrator::new(Arc::new(stub.clone()), OrchestratorTimings::zero())
}

#[tokio::test]
async fn fresh_provider_is_bonded_then_described() {
    let stub = chain();
    stub.push_sequence(Ok(Some(5)));

    let report = orchestrator(&stub).register(&request("7")).await.unwrap();

    assert_eq!(report.identity.raw_public_key, "pk1");
    assert_eq!(report.identity.encoded_public_key, "addr1");
    assert_eq!(report.service.resolved_name, "7");
    assert!(report.service.resolution_note.is_some());
    assert!(matches!(report.bond, BondPhase::Submitted { .. }));
    assert_eq!(report.metadata.sequence, Some(5));
    assert!(!report.metadata.recovered());

    let bonds = stub.bond_submissions();
    assert_eq!(bonds.len(), 1);
    assert_eq!(bonds[0].identity, "addr1");
    assert_eq!(bonds[0].service, "7");

    let updates = stub.metadata_submissions();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].sequence, Some(5));
}

#[tokio::test]
async fn registered_provider_skips_bond() {
    let stub = chain().with_registered("addr1", "btc-mainnet-fullnode");
    stub.push_sequence(Ok(Some(3)));

    let report = orchestrator(&stub)
        .register(&request("btc-mainnet-fullnode"))
        .await
        .unwrap();

    assert!(report.bond.is_skipped());
    assert!(stub.bond_submissions().is_empty());
    assert_eq!(stub.metadata_submissions().len(), 1);
}

#[tokio::test]
async fn numeric_service_resolves_before_lookup() {
    let stub = chain()
        .with_services(vec![ServiceEntry::new("7", "btc-mainnet-fullnode")])
        .with_registered("addr1", "btc-mainnet-fullnode")
        .with_default_sequence(Some(1));

    let report = orchestrator(&stub).register(&request("7")).await.unwrap();

    assert_eq!(report.service.requested_id, "7");
    assert_eq!(report.service.resolved_name, "btc-mainnet-fullnode");
    assert!(report.bond.is_skipped());
    assert_eq!(
        stub.metadata_submissions()[0].service,
        "btc-mainnet-fullnode"
    );
}

#[tokio::test]
async fn second_run_is_idempotent() {
    let stub = chain().with_default_sequence(Some(5));
    let orchestrator = orchestrator(&stub);

    let first = orchestrator.register(&request("7")).await.unwrap();
    assert!(!first.bond.is_skipped());

    let second = orchestrator.register(&request("7")).await.unwrap();
    assert!(second.bond.is_skipped());
    assert!(second.metadata.outcome.succeeded);
    assert_eq!(stub.bond_submissions().len(), 1);
    assert_eq!(stub.metadata_submissions().len(), 2);
}

#[tokio::test]
async fn mismatch_uses_sequence_named_by_chain() {
    let stub = chain().with_default_sequence(Some(99));
    stub.push_sequence(Ok(Some(5)));
    stub.push_metadata_outcome(32, MISMATCH_EXPECTED_6);

    let report = orchestrator(&stub).register(&request("7")).await.unwrap();

    let updates = stub.metadata_submissions();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].sequence, Some(5));
    assert_eq!(updates[1].sequence, Some(6));
    // The refetch path was not taken even though it would have succeeded.
    assert_eq!(stub.sequence_lookups(), 1);

    let recovery = report.metadata.recovery.as_ref().unwrap();
    assert_eq!(recovery.source, SequenceSource::ReportedByChain);
    assert_eq!(recovery.sequence, Some(6));
    assert!(recovery.mismatched.raw_output.contains("expected 6"));
    assert_eq!(report.metadata.sequence, Some(6));

    let command = &report.metadata.outcome.command;
    let flag = command.iter().position(|arg| arg == "--sequence").unwrap();
    assert_eq!(command[flag + 1], "6");
}

#[tokio::test]
async fn mismatch_without_hint_refetches_sequence() {
    let stub = chain();
    stub.push_sequence(Ok(Some(5)));
    stub.push_sequence(Err(ChainError::Backend("rpc unavailable".into())));
    stub.push_sequence(Ok(Some(8)));
    stub.push_metadata_outcome(32, "account sequence mismatch");

    let report = orchestrator(&stub).register(&request("7")).await.unwrap();

    let recovery = report.metadata.recovery.unwrap();
    assert_eq!(recovery.source, SequenceSource::Refetched);
    assert_eq!(recovery.sequence, Some(8));
    assert_eq!(stub.metadata_submissions()[1].sequence, Some(8));
    assert_eq!(stub.sequence_lookups(), 3);
}

#[tokio::test]
async fn mismatch_without_any_sequence_lets_client_choose() {
    let stub = chain();
    stub.push_sequence(Ok(Some(5)));
    stub.push_metadata_outcome(32, "account sequence mismatch");

    let report = orchestrator(&stub).register(&request("7")).await.unwrap();

    let recovery = report.metadata.recovery.unwrap();
    assert_eq!(recovery.source, SequenceSource::Unknown);
    assert_eq!(stub.metadata_submissions()[1].sequence, None);
    // One initial read plus the two recovery attempts.
    assert_eq!(stub.sequence_lookups(), 3);
}

#[tokio::test]
async fn repeated_mismatch_recovers_only_once() {
    let stub = chain().with_default_sequence(Some(5));
    stub.push_metadata_outcome(32, MISMATCH_EXPECTED_6);
    stub.push_metadata_outcome(32, "account sequence mismatch, expected 7, got 6");

    let err = orchestrator(&stub).register(&request("7")).await.unwrap_err();

    assert_eq!(stub.metadata_submissions().len(), 2);
    match err {
        BondingError::SequenceMismatchRecoveryExhausted(ctx) => {
            assert!(ctx.failed.raw_output.contains("expected 7"));
            assert_eq!(ctx.identity.encoded_public_key, "addr1");
            assert!(ctx.bond.is_some());
            assert_eq!(ctx.recovery.unwrap().sequence, Some(6));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn metadata_failure_without_marker_is_terminal() {
    let stub = chain().with_default_sequence(Some(5));
    stub.push_metadata_outcome(1, "insufficient fees");

    let err = orchestrator(&stub).register(&request("7")).await.unwrap_err();

    assert_eq!(stub.metadata_submissions().len(), 1);
    let ctx = err.context().unwrap();
    assert!(matches!(err, BondingError::MetadataSubmissionFailed(_)));
    assert_eq!(ctx.failed.raw_output, "insufficient fees");
    assert!(ctx.failed.command.iter().any(|arg| arg == "mod-provider"));
}

#[tokio::test]
async fn bond_failure_stops_before_metadata() {
    let stub = chain();
    stub.push_bond_outcome(5, "insufficient funds");

    let err = orchestrator(&stub).register(&request("7")).await.unwrap_err();

    assert!(matches!(err, BondingError::BondSubmissionFailed(_)));
    assert_eq!(err.context().unwrap().failed.raw_output, "insufficient funds");
    assert_eq!(stub.bond_submissions().len(), 1);
    assert!(stub.metadata_submissions().is_empty());
    assert_eq!(stub.sequence_lookups(), 0);
}

#[tokio::test]
async fn unknown_key_makes_no_chain_writes() {
    let stub = ScriptedChainClient::new();

    let err = orchestrator(&stub).register(&request("7")).await.unwrap_err();

    assert!(matches!(err, BondingError::IdentityUnavailable { .. }));
    assert_eq!(
        stub.calls(),
        vec![ChainCall::PublicKey {
            key_name: "provider".into()
        }]
    );
}

#[tokio::test]
async fn missing_service_is_rejected_before_any_call() {
    let stub = chain();
    let mut bad = request("7");
    bad.bond.service = String::new();

    let err = orchestrator(&stub).register(&bad).await.unwrap_err();

    assert!(matches!(err, BondingError::MissingField("service")));
    assert!(stub.calls().is_empty());
}

#[tokio::test]
async fn sequence_exhaustion_submits_without_sequence() {
    let stub = chain();

    let report = orchestrator(&stub).register(&request("7")).await.unwrap();

    assert_eq!(stub.sequence_lookups(), 3);
    assert_eq!(report.metadata.sequence, None);
    assert_eq!(stub.metadata_submissions()[0].sequence, None);
}

#[tokio::test]
async fn bond_only_skips_registered_provider() {
    let stub = chain();
    let orchestrator = orchestrator(&stub);
    let bond_request = request("7").bond;

    let first = orchestrator.bond(&bond_request).await.unwrap();
    assert!(!first.bond.is_skipped());
    let second = orchestrator.bond(&bond_request).await.unwrap();
    assert!(second.bond.is_skipped());

    assert_eq!(stub.bond_submissions().len(), 1);
    assert!(stub.metadata_submissions().is_empty());
    assert_eq!(stub.sequence_lookups(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_for_one_identity_bond_once() {
    // Every query yields, so unserialized runs would all see "not registered".
    let stub = chain()
        .with_default_sequence(Some(5))
        .with_query_delay(Duration::from_millis(10));
    let orchestrator = Arc::new(orchestrator(&stub));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.register(&request("7")).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(stub.bond_submissions().len(), 1);
    assert_eq!(stub.metadata_submissions().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn settle_delay_only_follows_submitted_bond() {
    let timings = OrchestratorTimings {
        settle_delay: Duration::from_secs(2),
        ..OrchestratorTimings::zero()
    };

    let stub = chain().with_default_sequence(Some(1));
    let orchestrator = BondOrchestrator::new(Arc::new(stub.clone()), timings);

    let started = tokio::time::Instant::now();
    orchestrator.register(&request("7")).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(2));

    let started = tokio::time::Instant::now();
    orchestrator.register(&request("7")).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn hung_bond_submission_is_aborted() {
    let timings = OrchestratorTimings {
        call_timeout: Duration::from_secs(1),
        ..OrchestratorTimings::zero()
    };
    let stub = chain().with_submit_delay(Duration::from_secs(60));

    let err = BondOrchestrator::new(Arc::new(stub.clone()), timings)
        .register(&request("7"))
        .await
        .unwrap_err();

    match err {
        BondingError::BondSubmissionFailed(ctx) => {
            assert!(!ctx.failed.succeeded);
            assert_eq!(ctx.failed.exit_code, NO_EXIT_CODE);
            assert!(ctx.failed.raw_output.contains("timed out after 1000ms"));
            assert!(ctx.failed.command.iter().any(|arg| arg == "bond-provider"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(stub.bond_submissions().len(), 1);
    assert!(stub.metadata_submissions().is_empty());
    assert_eq!(stub.sequence_lookups(), 0);
}

#[tokio::test(start_paused = true)]
async fn hung_metadata_submission_is_aborted() {
    let timings = OrchestratorTimings {
        call_timeout: Duration::from_secs(1),
        ..OrchestratorTimings::zero()
    };
    let stub = chain()
        .with_registered("addr1", "7")
        .with_default_sequence(Some(5))
        .with_submit_delay(Duration::from_secs(60));

    let err = BondOrchestrator::new(Arc::new(stub.clone()), timings)
        .register(&request("7"))
        .await
        .unwrap_err();

    match err {
        BondingError::MetadataSubmissionFailed(ctx) => {
            assert_eq!(ctx.failed.exit_code, NO_EXIT_CODE);
            assert!(ctx.failed.raw_output.contains("timed out"));
            assert!(ctx.bond.as_ref().is_some_and(BondPhase::is_skipped));
            assert!(ctx.recovery.is_none());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(stub.bond_submissions().is_empty());
    assert_eq!(stub.metadata_submissions().len(), 1);
}
