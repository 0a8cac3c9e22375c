//! Plugin hook integration tests

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strata_runtime::{HookPlugin, ModuleDefinition, ModuleId, ModuleState, Runtime, RuntimeError};

type Log = Arc<Mutex<Vec<String>>>;

/// A plugin that records every hook into `log`
fn recorder(name: &'static str, log: &Log) -> HookPlugin {
    let (registered, before, after) = (log.clone(), log.clone(), log.clone());
    HookPlugin::new(name)
        .on_registered(move |id| {
            registered.lock().push(format!("{name}:registered:{id}"));
            Ok(())
        })
        .on_before_execute(move |id| {
            before.lock().push(format!("{name}:before:{id}"));
            Ok(())
        })
        .on_after_execute(move |id, _| {
            after.lock().push(format!("{name}:after:{id}"));
            Ok(())
        })
}

#[test]
fn test_hooks_run_in_registration_order() {
    let log = Log::default();
    let rt = Runtime::new();
    rt.register_plugin(recorder("first", &log));
    rt.register_plugin(recorder("second", &log));

    rt.register(ModuleDefinition::new("b", |_, _, _| Ok(()))).unwrap();
    rt.register(ModuleDefinition::new("a", |require, _, _| {
        require.call("b")?;
        Ok(())
    }))
    .unwrap();
    rt.require("a").unwrap();
    // Cache hits fire no hooks
    rt.require("a").unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            "first:registered:b",
            "second:registered:b",
            "first:registered:a",
            "second:registered:a",
            "first:before:a",
            "second:before:a",
            "first:before:b",
            "second:before:b",
            "first:after:b",
            "second:after:b",
            "first:after:a",
            "second:after:a",
        ]
    );
}

#[test]
fn test_before_execute_failure_aborts_execution() {
    let ran = Arc::new(AtomicBool::new(false));
    let rt = Runtime::new();
    rt.register_plugin(HookPlugin::new("policy").on_before_execute(|id| {
        if id == "blocked" {
            return Err("execution not permitted".into());
        }
        Ok(())
    }));

    let flag = ran.clone();
    rt.register(ModuleDefinition::new("blocked", move |_, _, _| {
        flag.store(true, Ordering::SeqCst);
        Ok(())
    }))
    .unwrap();

    match rt.require("blocked") {
        Err(RuntimeError::PluginHook { plugin, cause }) => {
            assert_eq!(plugin, "policy");
            assert_eq!(cause.to_string(), "execution not permitted");
        }
        other => panic!("expected PluginHook, got {:?}", other),
    }
    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(rt.state_of("blocked"), Some(ModuleState::Unexecuted));
    assert!(rt.execution_stack().is_empty());
}

#[test]
fn test_rejected_registration_restores_previous_record() {
    let reject = Arc::new(AtomicBool::new(false));
    let rt = Runtime::new();
    let gate = reject.clone();
    rt.register_plugin(HookPlugin::new("gate").on_registered(move |_| {
        if gate.load(Ordering::SeqCst) {
            Err("registration closed".into())
        } else {
            Ok(())
        }
    }));

    rt.register(
        ModuleDefinition::new("x", |_, _, exports| {
            exports.set("version", 1.0);
            Ok(())
        })
        .path("x.js"),
    )
    .unwrap();

    reject.store(true, Ordering::SeqCst);
    let err = rt
        .register(
            ModuleDefinition::new("x", |_, _, exports| {
                exports.set("version", 2.0);
                Ok(())
            })
            .path("x2.js"),
        )
        .unwrap_err();
    assert!(matches!(err, RuntimeError::PluginHook { .. }));

    assert!(matches!(
        rt.register(ModuleDefinition::new("y", |_, _, _| Ok(()))),
        Err(RuntimeError::PluginHook { .. })
    ));
    assert!(!rt.registry().contains(&ModuleId::from("y")));

    assert_eq!(rt.require("x").unwrap().get("version").as_number(), Some(1.0));
    assert_eq!(rt.resolve("./x", None).unwrap(), ModuleId::from("x"));
    assert!(rt.resolve("./x2", None).is_err());
}

#[test]
fn test_after_execute_failure_keeps_module_executed() {
    let rt = Runtime::new();
    rt.register_plugin(HookPlugin::new("audit").on_after_execute(|_, exports| {
        if exports.has("secret") {
            return Err("exports leak a secret".into());
        }
        Ok(())
    }));
    rt.register(ModuleDefinition::new("leaky", |_, _, exports| {
        exports.set("secret", "hunter2");
        Ok(())
    }))
    .unwrap();

    assert!(matches!(
        rt.require("leaky"),
        Err(RuntimeError::PluginHook { .. })
    ));
    assert_eq!(rt.state_of("leaky"), Some(ModuleState::Executed));
    // Served from cache on the next require, without hooks
    assert!(rt.require("leaky").is_ok());
}

#[test]
fn test_hook_may_require_other_modules() {
    let rt = Runtime::new();
    let inner = rt.clone();
    let seen = Log::default();
    let sink = seen.clone();
    rt.register(ModuleDefinition::new("config", |_, _, exports| {
        exports.set("mode", "strict");
        Ok(())
    }))
    .unwrap();
    rt.register_plugin(HookPlugin::new("reader").on_after_execute(move |id, _| {
        if id != "config" {
            let mode = inner.require("config")?.get("mode");
            sink.lock().push(format!("{id} loaded in {mode} mode"));
        }
        Ok(())
    }));
    rt.register(ModuleDefinition::new("app", |_, _, _| Ok(()))).unwrap();

    rt.require("app").unwrap();
    assert_eq!(*seen.lock(), vec!["app loaded in strict mode"]);
}
