//! Request gating through per-module circuit breakers.

mod common;

use common::{config_with_modules, FixedServices, ScriptedModule};
use integration_bridge::health::FlagValue;
use integration_bridge::resilience::{CircuitState, GateError, RequestError};
use integration_bridge::{IntegrationBridge, IntegrationBridgeBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

async fn active_bridge() -> IntegrationBridge {
    let bridge = IntegrationBridgeBuilder::new(config_with_modules(&["jira"]))
        .service_view(FixedServices::up())
        .build()
        .unwrap();
    bridge
        .discover("jira-1", ScriptedModule::new("jira", Vec::new()))
        .unwrap();
    bridge.scheduler().run_tick().await;
    bridge.scheduler().wait_for_idle().await;
    bridge
}

#[tokio::test(start_paused = true)]
async fn test_forbidden_opens_circuit_until_timeout() {
    let bridge = active_bridge().await;
    let gate = bridge.gate("jira-1").unwrap();
    let handled = &AtomicUsize::new(0);

    let result = gate
        .call(move || async move {
            handled.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(RequestError::<String>::Forbidden("401 from upstream".to_string()))
        })
        .await;
    assert!(matches!(result, Err(GateError::Forbidden { .. })));

    let record = bridge.module("jira-1").unwrap();
    assert!(record.circuit_open);
    assert_eq!(record.flags.user_authenticated, FlagValue::Nok);

    let rejected = gate
        .call(move || async move {
            handled.fetch_add(1, Ordering::SeqCst);
            Ok::<_, RequestError<String>>(())
        })
        .await;
    assert!(rejected.as_ref().is_err_and(GateError::is_unavailable));
    assert_eq!(handled.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(gate.breaker().state(), CircuitState::Closed);
    assert!(!bridge.module("jira-1").unwrap().circuit_open);

    let result = gate
        .call(move || async move {
            handled.fetch_add(1, Ordering::SeqCst);
            Ok::<_, RequestError<String>>("posted")
        })
        .await;
    assert_eq!(result.unwrap(), "posted");
    assert_eq!(handled.load(Ordering::SeqCst), 2);
    assert!(bridge
        .module("jira-1")
        .unwrap()
        .latest_post_timestamp
        .is_some());
}

#[tokio::test(start_paused = true)]
async fn test_handler_errors_do_not_open_circuit() {
    let bridge = active_bridge().await;
    let gate = bridge.gate("jira-1").unwrap();

    let result = gate
        .call(|| async { Err::<(), _>(RequestError::Failed("bad payload".to_string())) })
        .await;
    assert!(matches!(result, Err(GateError::Handler(ref e)) if e == "bad payload"));
    assert_eq!(gate.breaker().state(), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_stop_sending_shares_breaker_across_gates() {
    let bridge = active_bridge().await;

    let result = bridge
        .gate("jira-1")
        .unwrap()
        .call(|| async { Err::<(), _>(RequestError::<String>::StopSending("quota".to_string())) })
        .await;
    assert!(matches!(result, Err(GateError::StopSending { .. })));

    let other = bridge.gate("jira-1").unwrap();
    assert_eq!(other.breaker().state(), CircuitState::Open);
    assert_eq!(
        bridge.module("jira-1").unwrap().flags.user_authenticated,
        FlagValue::Ok
    );
}
