//! Custom action dispatch around the scope lifecycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use trail_core::{CreationPolicy, MemoryProvider};
use trail_engine::{ActionType, Configuration, CustomAction, ScopeError, ScopeOptions};

fn counter(
    builder: trail_engine::ConfigurationBuilder,
    action_type: ActionType,
) -> (trail_engine::ConfigurationBuilder, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&count);
    let builder = builder.add_custom_action(action_type, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (builder, count)
}

#[test]
fn discard_on_created_suppresses_every_policy() {
    for policy in CreationPolicy::ALL {
        let provider = Arc::new(MemoryProvider::new());
        let config = Arc::new(
            Configuration::builder()
                .use_shared_provider(provider.clone())
                .with_creation_policy(policy)
                .add_custom_action(ActionType::OnScopeCreated, |scope| {
                    if scope.event().custom_field("Internal") == Some(&json!(true)) {
                        scope.discard();
                    }
                    Ok(())
                })
                .build(),
        );

        let mut skipped = ScopeOptions::new("Sync")
            .extra_field("Internal", &true)
            .configuration(Arc::clone(&config))
            .begin()
            .unwrap();
        assert!(skipped.is_discarded());
        skipped.save().unwrap();
        skipped.end().unwrap();
        assert!(provider.calls().is_empty(), "{policy}");

        let mut kept = ScopeOptions::new("Sync")
            .extra_field("Internal", &false)
            .configuration(config)
            .begin()
            .unwrap();
        kept.save().unwrap();
        kept.end().unwrap();
        assert!(!provider.calls().is_empty(), "{policy}");
    }
}

#[test]
fn on_created_runs_before_start_insert() {
    let provider = Arc::new(MemoryProvider::new());
    let config = Arc::new(
        Configuration::builder()
            .use_shared_provider(provider.clone())
            .with_creation_policy(CreationPolicy::InsertOnStartReplaceOnEnd)
            .add_custom_action(ActionType::OnScopeCreated, |scope| {
                scope.set_custom_field("Tenant", "acme")?;
                Ok(())
            })
            .build(),
    );

    let scope = ScopeOptions::new("Order:Update")
        .configuration(config)
        .begin()
        .unwrap();
    let calls = provider.calls();
    assert_eq!(calls[0].event().custom_field("Tenant"), Some(&json!("acme")));
    scope.end().unwrap();
}

#[test]
fn on_saving_sees_end_data() {
    let provider = Arc::new(MemoryProvider::new());
    let finals = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&finals);
    let config = Arc::new(
        Configuration::builder()
            .use_shared_provider(provider.clone())
            .add_custom_action(ActionType::OnEventSaving, move |scope| {
                seen.lock().push(scope.event().is_final());
                scope.comment("stamped");
                Ok(())
            })
            .build(),
    );

    ScopeOptions::new("Order:Update")
        .configuration(config)
        .begin()
        .unwrap()
        .end()
        .unwrap();

    assert_eq!(*finals.lock(), [true]);
    assert_eq!(provider.records()[0].1.comments(), ["stamped"]);
}

#[test]
fn on_saving_fires_once_per_end_save() {
    let expected = [
        (CreationPolicy::InsertOnEnd, 1),
        (CreationPolicy::InsertOnStartReplaceOnEnd, 1),
        (CreationPolicy::InsertOnStartInsertOnEnd, 1),
        (CreationPolicy::Manual, 0),
    ];
    for (policy, saves) in expected {
        let provider = Arc::new(MemoryProvider::new());
        let (builder, created) = counter(
            Configuration::builder()
                .use_shared_provider(provider)
                .with_creation_policy(policy),
            ActionType::OnScopeCreated,
        );
        let (builder, saving) = counter(builder, ActionType::OnEventSaving);

        ScopeOptions::new("Order:Update")
            .configuration(Arc::new(builder.build()))
            .begin()
            .unwrap()
            .end()
            .unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 1, "{policy}");
        assert_eq!(saving.load(Ordering::SeqCst), saves, "{policy}");
    }
}

#[test]
fn explicit_save_fires_on_saving() {
    let provider = Arc::new(MemoryProvider::new());
    let (builder, saving) = counter(
        Configuration::builder()
            .use_shared_provider(provider.clone())
            .with_creation_policy(CreationPolicy::Manual),
        ActionType::OnEventSaving,
    );

    let mut scope = ScopeOptions::new("Order:Update")
        .configuration(Arc::new(builder.build()))
        .begin()
        .unwrap();
    scope.save().unwrap();
    scope.save().unwrap();
    scope.end().unwrap();

    assert_eq!(saving.load(Ordering::SeqCst), 2);
    assert_eq!(provider.calls().len(), 2);
}

#[test]
fn discard_on_saving_suppresses_end_save() {
    let provider = Arc::new(MemoryProvider::new());
    let config = Arc::new(
        Configuration::builder()
            .use_shared_provider(provider.clone())
            .with_creation_policy(CreationPolicy::InsertOnStartReplaceOnEnd)
            .add_custom_action(ActionType::OnEventSaving, |scope| {
                scope.discard();
                Ok(())
            })
            .build(),
    );

    ScopeOptions::new("Order:Update")
        .configuration(config)
        .begin()
        .unwrap()
        .end()
        .unwrap();

    assert_eq!(provider.insert_count(), 1);
    assert_eq!(provider.update_count(), 0);
}

#[test]
fn actions_run_in_registration_order() {
    let provider = Arc::new(MemoryProvider::new());
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut builder = Configuration::builder().use_shared_provider(provider);
    for label in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        builder = builder.add_action(CustomAction::named(
            label,
            ActionType::OnScopeCreated,
            move |_| {
                order.lock().push(label);
                Ok(())
            },
        ));
    }

    ScopeOptions::new("Order:Update")
        .configuration(Arc::new(builder.build()))
        .begin()
        .unwrap()
        .end()
        .unwrap();
    assert_eq!(*order.lock(), ["first", "second", "third"]);
}

#[test]
fn failing_action_stops_pipeline_and_surfaces() {
    let provider = Arc::new(MemoryProvider::new());
    let (builder, after) = counter(
        Configuration::builder()
            .use_shared_provider(provider.clone())
            .add_action(CustomAction::named(
                "guard",
                ActionType::OnScopeCreated,
                |_| Err("tenant missing".into()),
            )),
        ActionType::OnScopeCreated,
    );

    let err = ScopeOptions::new("Order:Update")
        .configuration(Arc::new(builder.build()))
        .begin()
        .unwrap_err();

    match err {
        ScopeError::Action {
            name, action_type, ..
        } => {
            assert_eq!(name, "guard");
            assert_eq!(action_type, ActionType::OnScopeCreated);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(after.load(Ordering::SeqCst), 0);
    assert!(provider.calls().is_empty());
}

#[test]
fn failing_saving_action_fails_end_without_save() {
    let provider = Arc::new(MemoryProvider::new());
    let config = Arc::new(
        Configuration::builder()
            .use_shared_provider(provider.clone())
            .add_custom_action(ActionType::OnEventSaving, |_| Err("rejected".into()))
            .build(),
    );

    let scope = ScopeOptions::new("Order:Update")
        .configuration(config)
        .begin()
        .unwrap();
    let err = scope.end().unwrap_err();
    assert!(err.to_string().contains("rejected"));
    assert!(provider.calls().is_empty());
}

#[test]
fn hook_cannot_shadow_event_keys() {
    let provider = Arc::new(MemoryProvider::new());
    let config = Arc::new(
        Configuration::builder()
            .use_shared_provider(provider.clone())
            .add_custom_action(ActionType::OnEventSaving, |scope| {
                if let Some(event) = scope.event_mut() {
                    event.insert_custom_field("Target", json!("clobbered"))?;
                }
                Ok(())
            })
            .build(),
    );

    let scope = ScopeOptions::new("Order:Update")
        .target(trail_engine::TargetSource::from_fn(|| json!({ "status": 2 })))
        .configuration(config)
        .begin()
        .unwrap();
    let err = scope.end().unwrap_err();

    match err {
        ScopeError::Action { source, .. } => {
            assert_eq!(source.to_string(), "custom field key 'Target' is reserved");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(provider.calls().is_empty());
}
