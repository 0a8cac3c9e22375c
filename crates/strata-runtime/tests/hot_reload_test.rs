//! Hot module replacement integration tests

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strata_runtime::{
    BoxError, Exports, HotEvent, Module, ModuleDefinition, ModuleId, ModuleState, Require, Runtime, RuntimeConfig,
    RuntimeError, Value,
};

/// Install `increment` / `getCount` closures counting from `start` by `step`
fn counter(exports: &Exports, start: f64, step: f64) {
    let count = Arc::new(Mutex::new(start));
    let c = count.clone();
    exports.define_fn("increment", move |_| {
        let mut n = c.lock();
        *n += step;
        Ok(Value::Number(*n))
    });
    exports.define_fn("getCount", move |_| Ok(Value::Number(*count.lock())));
}

fn number(exports: &Exports, name: &str) -> f64 {
    exports.call(name, &[]).unwrap().as_number().unwrap()
}

fn register_counter(rt: &Runtime) {
    rt.register(
        ModuleDefinition::new(1, |_, module, exports| {
            counter(exports, 0.0, 1.0);
            module.hot().accept();
            Ok(())
        })
        .path("counter.js"),
    )
    .unwrap();
}

/// Math module whose `add` sums its arguments plus `offset`
fn add(offset: f64) -> impl Fn(&Require, &Module, &Exports) -> Result<(), BoxError> + Send + Sync + 'static {
    move |_, _, exports| {
        exports.define_fn("add", move |args| {
            let sum: f64 = args.iter().filter_map(Value::as_number).sum();
            Ok(Value::Number(sum + offset))
        });
        Ok(())
    }
}

#[test]
fn test_accepted_update_keeps_identity_and_state() {
    let rt = Runtime::new();
    register_counter(&rt);

    let handle = rt.require("1").unwrap();
    assert_eq!(number(&handle, "increment"), 1.0);

    rt.queue_update(1, |_, module, exports| {
        assert_eq!(module.generation(), 2);
        assert!(module.hot().previous_exports().is_some());
        let previous = exports.call("getCount", &[])?.as_number().unwrap_or(0.0);
        counter(exports, previous, 2.0);
        module.hot().accept();
        Ok(())
    });
    assert_eq!(rt.pending_updates(), vec!["1"]);

    let report = rt.apply_updates();
    assert!(report.is_success());
    assert_eq!(report.applied, vec![ModuleId::from(1)]);
    assert!(rt.pending_updates().is_empty());

    // The handle taken before the update sees the new implementation
    assert_eq!(number(&handle, "increment"), 3.0);
    assert!(rt.require("1").unwrap().ptr_eq(&handle));
    assert_eq!(rt.get(1).unwrap().generation, 2);
}

#[test]
fn test_update_without_accept_uses_fresh_exports() {
    let rt = Runtime::new();
    rt.register(ModuleDefinition::new(2, add(0.0)).path("math.js")).unwrap();

    let old = rt.require("2").unwrap();
    let updated = rt.update(2, add(1.0)).unwrap();

    assert!(!updated.ptr_eq(&old));
    let args = [Value::Number(2.0), Value::Number(3.0)];
    assert_eq!(rt.require("2").unwrap().call("add", &args).unwrap().as_number(), Some(6.0));
    // Consumers holding the old handle keep the old generation
    assert_eq!(old.call("add", &args).unwrap().as_number(), Some(5.0));
}

#[test]
fn test_failed_update_keeps_previous_generation() {
    let rt = Runtime::new();
    register_counter(&rt);
    let handle = rt.require("1").unwrap();
    number(&handle, "increment");

    let err = rt
        .update(1, |_, _, exports| {
            exports.set("broken", true);
            counter(exports, 100.0, 100.0);
            Err("syntax error in counter.js".into())
        })
        .unwrap_err();

    match &err {
        RuntimeError::HotUpdateFailed { id, cause } => {
            assert_eq!(id, &ModuleId::from(1));
            assert!(cause.to_string().contains("syntax error"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(rt.state_of(1), Some(ModuleState::Executed));
    assert!(!handle.has("broken"));
    assert_eq!(number(&handle, "increment"), 2.0);
    assert_eq!(rt.get(1).unwrap().generation, 1);
    assert!(rt.get(1).unwrap().hot_accept.is_some());

    // The previous factory is back in place
    let again = rt
        .update(1, |_, module, exports| {
            let previous = exports.call("getCount", &[])?.as_number().unwrap_or(0.0);
            counter(exports, previous, 10.0);
            module.hot().accept();
            Ok(())
        })
        .unwrap();
    assert_eq!(number(&again, "increment"), 12.0);
}

#[test]
fn test_update_preconditions() {
    let rt = Runtime::new();
    register_counter(&rt);

    assert!(matches!(
        rt.update("missing", |_, _, _| Ok(())),
        Err(RuntimeError::UnknownModule(_))
    ));
    // Registered but never executed
    assert!(matches!(
        rt.update(1, |_, _, _| Ok(())),
        Err(RuntimeError::HotUpdateFailed { .. })
    ));
    assert_eq!(rt.state_of(1), Some(ModuleState::Unexecuted));
}

#[test]
fn test_hot_reload_can_be_disabled() {
    let config = RuntimeConfig {
        hot_reload: false,
        ..RuntimeConfig::default()
    };
    let rt = Runtime::with_config(config);
    register_counter(&rt);
    rt.require("1").unwrap();

    let err = rt.update(1, |_, _, _| Ok(())).unwrap_err();
    assert!(err.to_string().contains("disabled"));
}

#[test]
fn test_accept_callback_receives_new_exports() {
    let rt = Runtime::new();
    let events: Arc<Mutex<Vec<(ModuleId, u64)>>> = Arc::default();
    let sink = events.clone();
    rt.register(ModuleDefinition::new("widget", move |_, module, exports| {
        exports.set("version", module.generation() as f64);
        let sink = sink.clone();
        module.hot().accept_with(move |event: &HotEvent| {
            sink.lock().push((event.updated.clone(), event.generation));
            Ok(())
        });
        Ok(())
    }))
    .unwrap();

    let handle = rt.require("widget").unwrap();
    let factory = rt.get("widget").unwrap().factory;
    rt.update("widget", move |require, module, exports| factory(require, module, exports))
        .unwrap();

    assert_eq!(*events.lock(), vec![(ModuleId::from("widget"), 2)]);
    assert_eq!(handle.get("version").as_number(), Some(2.0));
}

#[test]
fn test_invalidation_stops_at_accepting_consumers() {
    let rt = Runtime::new();
    let mid_runs = Arc::new(AtomicUsize::new(0));
    let accepted: Arc<Mutex<Vec<(ModuleId, f64)>>> = Arc::default();

    rt.register(ModuleDefinition::new("dep", |_, _, exports| {
        exports.set("value", 1.0);
        Ok(())
    }))
    .unwrap();

    let runs = mid_runs.clone();
    rt.register(ModuleDefinition::new("mid", move |require, _, exports| {
        runs.fetch_add(1, Ordering::SeqCst);
        exports.set("value", require.call("dep")?.get("value"));
        Ok(())
    }))
    .unwrap();

    let sink = accepted.clone();
    rt.register(ModuleDefinition::new("top", move |require, module, exports| {
        exports.set("mid", require.call("mid")?);
        let sink = sink.clone();
        module.hot().accept_with(move |event| {
            let value = event.exports.get("value").as_number().unwrap_or(f64::NAN);
            sink.lock().push((event.updated.clone(), value));
            Ok(())
        });
        Ok(())
    }))
    .unwrap();

    rt.register(ModuleDefinition::new("side", |require, _, _| {
        require.call("dep")?;
        Ok(())
    }))
    .unwrap();

    rt.require("top").unwrap();
    rt.require("side").unwrap();
    assert_eq!(mid_runs.load(Ordering::SeqCst), 1);

    rt.queue_update("dep", |_, _, exports| {
        exports.set("value", 2.0);
        Ok(())
    });
    let report = rt.apply_updates();

    assert!(report.is_success());
    assert_eq!(report.invalidated.iter().collect::<Vec<_>>(), vec!["mid", "side"]);
    assert_eq!(report.accepted_by, vec![ModuleId::from("top")]);
    assert_eq!(*accepted.lock(), vec![(ModuleId::from("dep"), 2.0)]);

    assert_eq!(rt.state_of("mid"), Some(ModuleState::Invalidated));
    assert_eq!(rt.state_of("side"), Some(ModuleState::Invalidated));
    assert_eq!(rt.state_of("top"), Some(ModuleState::Executed));

    // Stale consumers re-execute on their next require
    let mid = rt.require("mid").unwrap();
    assert_eq!(mid.get("value").as_number(), Some(2.0));
    assert_eq!(mid_runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_self_accepted_update_does_not_propagate() {
    let rt = Runtime::new();
    register_counter(&rt);
    rt.register(ModuleDefinition::new("consumer", |require, _, exports| {
        exports.set("counter", require.id(1)?);
        Ok(())
    }))
    .unwrap();
    rt.require("consumer").unwrap();

    rt.queue_update(1, |_, module, exports| {
        counter(exports, 0.0, 5.0);
        module.hot().accept();
        Ok(())
    });
    let report = rt.apply_updates();

    assert!(report.invalidated.is_empty());
    assert!(report.accepted_by.is_empty());
    assert_eq!(rt.state_of("consumer"), Some(ModuleState::Executed));
}

#[test]
fn test_queue_applies_in_order_and_reports_failures() {
    let rt = Runtime::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for id in ["a", "b"] {
        rt.register(ModuleDefinition::new(id, |_, _, _| Ok(()))).unwrap();
        rt.require(id).unwrap();
    }

    for id in ["b", "missing", "a"] {
        let order = order.clone();
        rt.queue_update(id, move |_, module, _| {
            order.lock().push(module.id().to_string());
            Ok(())
        });
    }
    let report = rt.apply_updates();

    assert_eq!(*order.lock(), vec!["b", "a"]);
    assert_eq!(report.applied, vec![ModuleId::from("b"), ModuleId::from("a")]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, ModuleId::from("missing"));
    assert!(matches!(report.failed[0].1, RuntimeError::UnknownModule(_)));
}
