mod common;

use common::{run_against, write_schema_corpus, MockSut};
use conformance_types::Status;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn conformant_service_records_no_failures() {
    let corpus = write_schema_corpus();
    let report = run_against(
        MockSut::default(),
        true,
        Some(corpus.path().to_path_buf()),
    )
    .await;

    assert_eq!(report.tally.failed, 0, "report: {:?}", report.assertions);
    // One representative verdict per check group.
    for id in [
        "6.1.1", "6.2.3", "6.5.2", "7.2.2", "7.3.2", "8.1.2", "9.2.3", "9.3.4",
    ] {
        assert_eq!(report.status_of(id), Some(Status::Pass), "assertion {id}");
    }
}

#[tokio::test]
async fn wrong_version_pointer_fails_the_version_check() {
    let mock = MockSut {
        version_body: json!({"v1": "/redfish/v2/"}),
        ..Default::default()
    };
    let report = run_against(mock, false, None).await;
    assert_eq!(report.status_of("6.1.1"), Some(Status::Fail));
}

#[tokio::test]
async fn destructive_probes_disabled_warns_the_lifecycle_checks() {
    let report = run_against(MockSut::default(), false, None).await;
    for id in ["7.3.2", "9.3.1", "9.3.2", "9.3.3", "9.3.4"] {
        assert_eq!(report.status_of(id), Some(Status::Warn), "assertion {id}");
    }
}

#[tokio::test]
async fn account_creation_unsupported_degrades_the_whole_lifecycle() {
    let mock = MockSut {
        accounts_allow_post: false,
        ..Default::default()
    };
    let report = run_against(mock, true, None).await;

    // The collection not advertising POST is the finding; the dependent
    // stages report that they could not be verified rather than failing.
    assert_eq!(report.status_of("9.3.1"), Some(Status::Fail));
    for id in ["9.3.2", "9.3.3", "9.3.4"] {
        assert_eq!(report.status_of(id), Some(Status::Warn), "assertion {id}");
    }
}

#[tokio::test]
async fn missing_member_count_fails_only_that_collection_rule() {
    let mock = MockSut {
        include_systems_count: false,
        ..Default::default()
    };
    let report = run_against(mock, false, None).await;

    assert_eq!(report.status_of("7.2.1"), Some(Status::Fail));
    // Count agreement is only checked where a count was declared.
    assert_eq!(report.status_of("7.2.2"), Some(Status::Pass));
}

#[tokio::test]
async fn unreachable_session_endpoint_warns_instead_of_failing() {
    // Session creation stalls past the client timeout, so every stage that
    // needs a session sees no usable response at all.
    let mock = MockSut {
        session_post_delay: Some(Duration::from_secs(2)),
        ..Default::default()
    };
    let report = run_against(mock, true, None).await;

    for id in ["8.1.1", "9.2.1", "9.2.2", "9.2.3"] {
        assert_eq!(report.status_of(id), Some(Status::Warn), "assertion {id}");
    }
    assert_eq!(report.tally.failed, 0, "report: {:?}", report.assertions);
}

#[tokio::test]
async fn resource_timeouts_during_review_warn_instead_of_passing() {
    // Discovery sees the Systems collection once; the per-resource checks
    // then time out and must surface that rather than reporting a clean pass.
    let corpus = write_schema_corpus();
    let mock = MockSut {
        systems_stall_after_first: true,
        ..Default::default()
    };
    let report = run_against(mock, false, Some(corpus.path().to_path_buf())).await;

    assert_eq!(report.status_of("7.3.1"), Some(Status::Warn));
    assert_eq!(report.status_of("7.4.1"), Some(Status::Warn));
    assert_eq!(report.tally.failed, 0, "report: {:?}", report.assertions);
}

#[tokio::test]
async fn creation_round_trip_mismatch_is_reported() {
    let mock = MockSut {
        forced_role_id: Some("Operator".to_string()),
        ..Default::default()
    };
    let report = run_against(mock, true, None).await;

    assert_eq!(report.status_of("9.3.1"), Some(Status::Fail));
    // The account still exists, so the rest of the lifecycle proceeds.
    assert_eq!(report.status_of("9.3.2"), Some(Status::Pass));
}
