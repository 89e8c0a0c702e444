//! Scopes that read the process-wide configuration.
//!
//! The registry is shared by every test in this binary, so each test holds
//! `REGISTRY_LOCK` and starts from a fresh configuration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;
use serde_json::json;
use trail_core::{AuditProvider, CreationPolicy, MemoryProvider};
use trail_engine::{config, ActionType, AuditScope, Configuration, TargetSource};

static REGISTRY_LOCK: Mutex<()> = Mutex::new(());

fn fresh_registry() -> (MutexGuard<'static, ()>, Arc<MemoryProvider>) {
    let guard = REGISTRY_LOCK.lock();
    let provider = Arc::new(MemoryProvider::new());
    config::replace(
        Configuration::builder()
            .use_shared_provider(provider.clone())
            .build(),
    );
    (guard, provider)
}

#[derive(Serialize)]
struct Account {
    balance: i64,
}

#[test]
fn begin_uses_registry_defaults() {
    let (_guard, provider) = fresh_registry();
    config::set_default_creation_policy(CreationPolicy::InsertOnStartReplaceOnEnd);

    let account = Arc::new(RwLock::new(Account { balance: 10 }));
    let scope = AuditScope::begin("Account:Debit", TargetSource::shared(&account)).unwrap();
    assert_eq!(provider.insert_count(), 1);
    account.write().balance = 4;
    scope.end().unwrap();

    assert_eq!(provider.update_count(), 1);
    let records = provider.records();
    let (_, event) = &records[0];
    assert_eq!(event.target().unwrap().old["balance"], 10);
    assert_eq!(event.target().unwrap().new.as_ref().unwrap()["balance"], 4);
}

#[test]
fn log_writes_one_record() {
    let (_guard, provider) = fresh_registry();

    let id = AuditScope::log("Login", json!({ "User": "bob" }))
        .unwrap()
        .unwrap();
    let event = provider.get(&id).unwrap();
    assert!(event.is_final());
    assert_eq!(event.custom_field("User"), Some(&json!("bob")));
    assert!(event
        .environment()
        .calling_method_name
        .as_deref()
        .unwrap()
        .contains("registry.rs"));
}

#[test]
fn global_actions_can_be_reset() {
    let (_guard, provider) = fresh_registry();
    config::add_custom_action(ActionType::OnScopeCreated, |scope| {
        scope.discard();
        Ok(())
    });

    assert_eq!(AuditScope::log("Ignored", json!({})).unwrap(), None);
    assert!(provider.is_empty());

    config::reset_custom_actions();
    assert!(config::current().actions().is_empty());
    assert!(AuditScope::log("Kept", json!({})).unwrap().is_some());
    assert_eq!(provider.len(), 1);
}

#[test]
fn disable_switch_makes_registry_scopes_inert() {
    let (_guard, provider) = fresh_registry();
    config::set_audit_disabled(true);

    assert_eq!(AuditScope::log("Login", json!({})).unwrap(), None);
    assert!(provider.is_empty());

    config::set_audit_disabled(false);
    assert!(AuditScope::log("Login", json!({})).unwrap().is_some());
}

#[test]
fn scope_keeps_configuration_it_began_with() {
    let (_guard, provider) = fresh_registry();

    let scope = AuditScope::begin(
        "Account:Debit",
        TargetSource::from_fn(|| Account { balance: 1 }),
    )
    .unwrap();
    let replacement = Arc::new(MemoryProvider::new());
    config::configure(|setup| setup.use_shared_provider(replacement.clone()));
    scope.end().unwrap();

    assert_eq!(provider.len(), 1);
    assert!(replacement.is_empty());
}

#[test]
fn missing_default_provider_fails_begin() {
    let (_guard, _provider) = fresh_registry();
    config::replace(Configuration::default());

    assert!(AuditScope::log("Login", json!({})).is_err());
}

fn same_provider(a: &Arc<dyn AuditProvider>, b: &Arc<dyn AuditProvider>) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

#[test]
fn concurrent_begins_never_see_a_torn_configuration() {
    let (_guard, _provider) = fresh_registry();
    let first: Arc<dyn AuditProvider> = Arc::new(MemoryProvider::new());
    let second: Arc<dyn AuditProvider> = Arc::new(MemoryProvider::new());
    let pairs = [
        (Arc::clone(&first), CreationPolicy::InsertOnEnd),
        (Arc::clone(&second), CreationPolicy::Manual),
    ];
    config::configure(|setup| {
        setup
            .use_shared_provider(Arc::clone(&pairs[0].0))
            .with_creation_policy(pairs[0].1)
    });

    let done = AtomicBool::new(false);
    thread::scope(|s| {
        s.spawn(|| {
            for round in 0..500 {
                let (provider, policy) = &pairs[round % 2];
                config::configure(|setup| {
                    setup
                        .use_shared_provider(Arc::clone(provider))
                        .with_creation_policy(*policy)
                });
            }
            done.store(true, Ordering::SeqCst);
        });

        for _ in 0..4 {
            s.spawn(|| {
                let mut checked = 0;
                while !done.load(Ordering::SeqCst) || checked < 50 {
                    let mut scope = AuditScope::begin(
                        "Account:Read",
                        TargetSource::from_fn(|| Account { balance: 0 }),
                    )
                    .unwrap();
                    let provider = scope.configuration().provider().unwrap();
                    let expected = if same_provider(provider, &first) {
                        CreationPolicy::InsertOnEnd
                    } else {
                        assert!(same_provider(provider, &second));
                        CreationPolicy::Manual
                    };
                    assert_eq!(scope.creation_policy(), expected);
                    scope.discard();
                    checked += 1;
                }
            });
        }
    });
}
