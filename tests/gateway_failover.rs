//! Failover semantics through the full stack: encrypted vault, breaker
//! registry, per-account pools, and the connection manager.

use quarry_breaker::{BreakerConfig, BreakerRegistry, BreakerState};
use quarry_core::mock::ScriptedDriver;
use quarry_core::{names, AccessError, DriverError, ExecuteOptions, TemplateCatalog};
use quarry_gateway::{ConnectionManager, GatewayService, ManagerConfig, TemplateRequest};
use quarry_pool::PoolConfig;
use quarry_vault::{AccountConfig, CredentialVault};
use std::sync::Arc;
use std::time::Duration;
use tower::{Service, ServiceExt};

fn accounts() -> Vec<AccountConfig> {
    vec![
        AccountConfig {
            username: "svc_reporting_1".into(),
            password: "pw1".into(),
            priority: 1,
            options: Default::default(),
        },
        AccountConfig {
            username: "svc_reporting_2".into(),
            password: "pw2".into(),
            priority: 2,
            options: Default::default(),
        },
    ]
}

fn wire(driver: &ScriptedDriver, vault: Arc<CredentialVault>) -> ConnectionManager {
    let breakers = Arc::new(BreakerRegistry::new(
        BreakerConfig::builder()
            .failure_threshold(3)
            .recovery_timeout(Duration::from_millis(100))
            .build(),
    ));
    let mut catalog = TemplateCatalog::new();
    catalog.insert(names::CHECK_HEALTH, "SELECT 1");
    catalog.insert("DAILY_ROLLUP", "SELECT day, total FROM rollups");
    ConnectionManager::new(
        vault,
        breakers,
        Arc::new(driver.clone()),
        catalog,
        ManagerConfig::builder()
            .pool(
                PoolConfig::builder()
                    .min_size(0)
                    .max_size(2)
                    .connect_timeout(Duration::from_millis(200))
                    .build(),
            )
            .default_timeout(Duration::from_millis(500))
            .build(),
    )
}

/// Accounts come out of the encrypted credential file, not test
/// fixtures: seal, load, dispatch.
#[tokio::test]
async fn dispatch_works_from_a_sealed_vault() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("accounts.enc");
    CredentialVault::seal(&path, "operator-secret", &accounts(), 100_000).unwrap();

    let driver = ScriptedDriver::new();
    let vault = Arc::new(CredentialVault::load(&path, "operator-secret").unwrap());
    let manager = wire(&driver, vault);

    let rows = manager
        .execute_template("DAILY_ROLLUP", &[], ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(rows.row_count, 1);
    assert_eq!(driver.executed_on("svc_reporting_1"), 1);
}

/// An auth rejection on the preferred account advances only its breaker
/// and the caller transparently gets the second account's rows.
#[tokio::test]
async fn auth_rejection_fails_over_once() {
    let driver = ScriptedDriver::new();
    let vault = Arc::new(CredentialVault::from_accounts(accounts()).unwrap());
    let manager = wire(&driver, vault);

    driver.script_fail("svc_reporting_1", DriverError::auth("credentials rejected"));

    let rows = manager
        .execute_template("DAILY_ROLLUP", &[], ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(rows.row_count, 1);

    let first = manager.breakers().breaker_for("svc_reporting_1").metrics();
    let second = manager.breakers().breaker_for("svc_reporting_2").metrics();
    assert_eq!(first.total_failures, 1);
    assert_eq!(first.total_successes, 0);
    assert_eq!(second.total_successes, 1);
    assert_eq!(second.total_failures, 0);
}

/// A query error surfaces unchanged: no failover, no breaker movement on
/// either account.
#[tokio::test]
async fn query_error_neither_fails_over_nor_trips() {
    let driver = ScriptedDriver::new();
    let vault = Arc::new(CredentialVault::from_accounts(accounts()).unwrap());
    let manager = wire(&driver, vault);

    driver.script_fail(
        "svc_reporting_1",
        DriverError::query("object ROLLUPS does not exist"),
    );

    let err = manager
        .execute_template("DAILY_ROLLUP", &[], ExecuteOptions::default())
        .await
        .unwrap_err();
    match &err {
        AccessError::Query { account, source } => {
            assert_eq!(account, "svc_reporting_1");
            assert!(source.message.contains("ROLLUPS"));
        }
        other => panic!("expected query error, got {other:?}"),
    }

    assert_eq!(driver.executed_on("svc_reporting_2"), 0);
    let first = manager.breakers().breaker_for("svc_reporting_1").metrics();
    let second = manager.breakers().breaker_for("svc_reporting_2").metrics();
    assert_eq!(first.total_failures, 0);
    assert_eq!(second.total_failures + second.total_successes, 0);
}

/// Repeated breaker-worthy failures trip the first account; subsequent
/// calls skip it entirely until its backoff elapses, then a successful
/// probe path brings it back.
#[tokio::test]
async fn tripped_account_is_skipped_then_recovered() {
    let driver = ScriptedDriver::new();
    let vault = Arc::new(CredentialVault::from_accounts(accounts()).unwrap());
    let manager = wire(&driver, vault);

    for _ in 0..3 {
        driver.script_fail("svc_reporting_1", DriverError::network("connection reset"));
        let _ = manager
            .execute_template("DAILY_ROLLUP", &[], ExecuteOptions::default())
            .await
            .unwrap();
    }
    let breaker = manager.breakers().breaker_for("svc_reporting_1");
    assert_eq!(breaker.state(), BreakerState::Open);

    // While open, dispatch goes straight to the second account.
    let executed_before = driver.executed_on("svc_reporting_1");
    let _ = manager
        .execute_template("DAILY_ROLLUP", &[], ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(driver.executed_on("svc_reporting_1"), executed_before);

    // After the backoff the next dispatch probes it half-open; two
    // successes (success_threshold default) close it again.
    tokio::time::sleep(Duration::from_millis(120)).await;
    let _ = manager
        .execute_template("DAILY_ROLLUP", &[], ExecuteOptions::default())
        .await
        .unwrap();
    let _ = manager
        .execute_template("DAILY_ROLLUP", &[], ExecuteOptions::default())
        .await
        .unwrap();
    assert_eq!(breaker.state(), BreakerState::Closed);
    assert!(driver.executed_on("svc_reporting_1") > executed_before);
}

/// When every account is excluded the caller sees
/// `NoAccountsAvailable`, not the last driver error.
#[tokio::test]
async fn exhaustion_reports_no_accounts_available() {
    let driver = ScriptedDriver::new();
    let vault = Arc::new(CredentialVault::from_accounts(accounts()).unwrap());
    let manager = wire(&driver, vault);

    driver.script_fail("svc_reporting_1", DriverError::network("reset"));
    driver.script_fail("svc_reporting_2", DriverError::network("reset"));

    let err = manager
        .execute_template("DAILY_ROLLUP", &[], ExecuteOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_no_accounts());
}

/// The Tower facade dispatches like the manager it wraps.
#[tokio::test]
async fn tower_service_facade_round_trips() {
    let driver = ScriptedDriver::new();
    let vault = Arc::new(CredentialVault::from_accounts(accounts()).unwrap());
    let manager = Arc::new(wire(&driver, vault));

    let mut service = GatewayService::new(manager);
    let rows = service
        .ready()
        .await
        .unwrap()
        .call(TemplateRequest::new("DAILY_ROLLUP", vec![]))
        .await
        .unwrap();
    assert_eq!(rows.row_count, 1);

    let err = service
        .ready()
        .await
        .unwrap()
        .call(TemplateRequest::new("MISSING", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::UnknownTemplate(_)));
}
