// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Built-in demonstration bundles

use crate::cli::Demo;
use anyhow::{anyhow, Result};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use strata_runtime::{
    Exports, HookPlugin, MemoryFetcher, ModuleDefinition, Runtime, RuntimeBuilder, RuntimeConfig, RuntimeError, Value,
};

/// Build a runtime for `demo` and run it
pub async fn run(demo: Demo, config: RuntimeConfig) -> Result<()> {
    let builder = Runtime::builder().config(config);
    match demo {
        Demo::Circular => circular(builder.build()),
        Demo::Chunks => chunks(builder).await,
        Demo::Hot => hot(builder.build()),
        Demo::Plugins => plugins(builder.build()),
    }
}

fn heading(title: &str) {
    println!("{} {}", "==>".cyan().bold(), title.bold());
}

fn show(label: &str, value: impl std::fmt::Display) {
    println!("  {} {}", format!("{}:", label).dimmed(), value);
}

/// Call an exported function, turning its boxed error into anyhow
fn call(exports: &Exports, name: &str, args: &[Value]) -> Result<Value> {
    exports.call(name, args).map_err(|e| anyhow!("{}() failed: {}", name, e))
}

fn circular(rt: Runtime) -> Result<()> {
    heading("Circular requires");

    rt.register(
        ModuleDefinition::new(1, |require, _, exports| {
            let b = require.id(2)?;
            exports.set("a", "Module A");
            exports.set("b", b);
            Ok(())
        })
        .dependencies(["2"])
        .path("moduleA.js"),
    )?;
    rt.register(
        ModuleDefinition::new(2, |require, _, exports| {
            let a = require.id(1)?;
            // Module 1 is still executing: this is its partial exports object.
            exports.set("keys_seen_during_load", a.keys().len() as f64);
            exports.set("b", "Module B");
            exports.set("a", a);
            Ok(())
        })
        .dependencies(["1"])
        .path("moduleB.js"),
    )?;

    let a = rt.require("1")?;
    let b = rt.require("2")?;
    show("module 1", a.to_json());
    show("module 2", b.to_json());
    show(
        "fields of module 1 visible while it was loading",
        b.get("keys_seen_during_load"),
    );
    Ok(())
}

async fn chunks(builder: RuntimeBuilder) -> Result<()> {
    heading("Code splitting");

    let fetcher = Arc::new(MemoryFetcher::new().with_latency(Duration::from_millis(50)));
    fetcher.insert(
        "1",
        vec![
            ModuleDefinition::new(2, |_, _, exports| {
                exports.set("message", "I'm in a separate chunk");
                Ok(())
            })
            .path("lazy.js"),
            ModuleDefinition::new(101, |require, _, exports| {
                let lazy = require.call("./lazy")?;
                exports.set("greeting", format!("chunk says: {}", lazy.get("message")));
                Ok(())
            })
            .path("chunk1/index.js"),
        ],
    );

    let rt = builder.fetcher(fetcher.clone()).build();
    rt.register(
        ModuleDefinition::new(1, |_, _, exports| {
            exports.set("message", "I'm in the main bundle");
            Ok(())
        })
        .path("main.js"),
    )?;
    rt.declare_chunk("1", fetcher.manifest(&"1".into()));

    show("main", rt.require("1")?.get("message"));

    match rt.require("2") {
        Err(err @ RuntimeError::ChunkNotLoaded { .. }) => show("before load", err.yellow()),
        other => return Err(anyhow!("expected the chunk gate, got {:?}", other)),
    }

    // Two concurrent loads share a single fetch.
    let (first, second) = tokio::join!(rt.load_chunk("1"), rt.load_chunk("1"));
    first?;
    second?;
    show("fetches", fetcher.fetch_count());
    show("lazy", rt.require("2")?.get("message"));
    show("101", rt.require("101")?.get("greeting"));
    Ok(())
}

/// Counter module whose `increment` adds `step`, starting from `start`
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

fn hot(rt: Runtime) -> Result<()> {
    heading("Hot module replacement");

    rt.register(
        ModuleDefinition::new(1, |_, module, exports| {
            counter(exports, 0.0, 1.0);
            module.hot().accept();
            Ok(())
        })
        .path("counter.js"),
    )?;

    let handle = rt.require("1")?;
    show("increment()", call(&handle, "increment", &[])?);

    rt.queue_update(1, |_, module, exports| {
        // Same exports object as the previous generation: carry the count over.
        let previous = exports.call("getCount", &[])?.as_number().unwrap_or(0.0);
        counter(exports, previous, 2.0);
        module.hot().accept();
        Ok(())
    });
    let report = rt.apply_updates();
    show("applied", format!("{:?}", report.applied));

    show("increment() on the old handle", call(&handle, "increment", &[])?);

    let failed = rt.update(1, |_, _, _| Err("syntax error in counter.js".into()));
    if let Err(err) = failed {
        show("failed update", err.red());
    }
    show("getCount() after failed update", call(&handle, "getCount", &[])?);
    Ok(())
}

fn plugins(rt: Runtime) -> Result<()> {
    heading("Plugins and resolution");

    let log = Arc::new(Mutex::new(Vec::new()));
    let before = log.clone();
    let after = log.clone();
    rt.register_plugin(
        HookPlugin::new("LoggingPlugin")
            .on_before_execute(move |id| {
                before.lock().push(format!("Loading module {}", id));
                Ok(())
            })
            .on_after_execute(move |id, _| {
                after.lock().push(format!("Loaded module {}", id));
                Ok(())
            }),
    );

    rt.alias_prefix("@components/", "src/components/");
    rt.alias_prefix("~/", "src/");

    let named = |id: &'static str, path: &'static str| {
        ModuleDefinition::new(id, move |_, _, exports| {
            exports.set("name", id);
            Ok(())
        })
        .path(path)
    };
    rt.register(named("button", "src/components/Button.js"))?;
    rt.register(named("helper", "src/utils/helper.js"))?;
    rt.register(named("subfolder", "src/app/subfolder/index.js"))?;
    rt.register(
        ModuleDefinition::new("app", |require, _, exports| {
            for request in ["@components/Button", "~/utils/helper", "./subfolder"] {
                let target = require.call(request)?;
                exports.set(request, target.get("name"));
            }
            Ok(())
        })
        .path("src/app/main.js"),
    )?;

    let app = rt.require("app")?;
    for request in app.keys() {
        show(&request, app.get(&request));
    }
    for line in log.lock().iter() {
        println!("  {}", line.dimmed());
    }
    Ok(())
}
