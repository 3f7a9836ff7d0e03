mod common;

use common::fixtures::*;
use common::{CountingResolver, TestResult, init_logger, resolver_with, text_engine};
use std::fs;
use std::sync::{Arc, Barrier};
use std::time::{Duration, SystemTime};
use stencil::{Dialect, TemplateEngine, TemplateError, TemplateId};

fn text_id(name: &str) -> TemplateId {
    TemplateId::new(name, Dialect::Text)
}

// ============================================================================
// Compile-once guarantees
// ============================================================================

#[test]
fn test_concurrent_cold_lookups_compile_once() -> TestResult {
    init_logger();
    let counting = Arc::new(CountingResolver::new(resolver_with(
        &[("hello", HELLO)],
        Dialect::Text,
    )));
    let engine = TemplateEngine::builder()
        .with_resolver(counting.clone())
        .build()?;

    const THREADS: usize = 8;
    let barrier = Barrier::new(THREADS);
    let id = text_id("hello");

    let compiled: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    engine.compiled(&id)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("lookup thread panicked"))
            .collect()
    });

    let compiled: Vec<_> = compiled.into_iter().collect::<Result<_, _>>()?;
    assert!(compiled.iter().all(|c| Arc::ptr_eq(c, &compiled[0])));
    assert_eq!(counting.loads(), 1);

    let stats = engine.cache().stats();
    assert_eq!(stats.compilations, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, (THREADS - 1) as u64);
    Ok(())
}

#[test]
fn test_concurrent_cold_lookups_share_the_failure() -> TestResult {
    init_logger();
    let counting = Arc::new(CountingResolver::new(resolver_with(
        &[("broken", "{{b:open}}never closed")],
        Dialect::Text,
    )));
    let engine = TemplateEngine::builder()
        .with_resolver(counting.clone())
        .build()?;

    const THREADS: usize = 8;
    let barrier = Barrier::new(THREADS);
    let id = text_id("broken");

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    engine.compiled(&id)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("lookup thread panicked"))
            .collect()
    });

    let errors: Vec<TemplateError> = results
        .into_iter()
        .map(|r| r.expect_err("broken template compiled"))
        .collect();
    assert!(errors[0].parse_kind().is_some());
    assert!(errors.iter().all(|e| *e == errors[0]));
    assert_eq!(counting.loads(), 1);

    let stats = engine.cache().stats();
    assert_eq!(stats.failures, 1);
    assert_eq!(stats.compilations, 1);
    assert_eq!(stats.hits, (THREADS - 1) as u64);
    Ok(())
}

#[test]
fn test_instances_from_threads_render_independently() -> TestResult {
    let engine = text_engine(&[("hello", HELLO)]);
    let names = ["Ada", "Grace", "Barbara", "Frances"];

    let rendered: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = names
            .iter()
            .map(|name| {
                let engine = &engine;
                scope.spawn(move || {
                    let mut template = engine.template("hello", Dialect::Text)?;
                    template.set_value("name", *name)?;
                    template.render_to_string()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("render thread panicked"))
            .collect::<Result<_, TemplateError>>()
    })?;

    for (name, output) in names.iter().zip(&rendered) {
        assert_eq!(output, &format!("Hello {}, welcome to Earth.", name));
    }
    assert_eq!(engine.cache().stats().compilations, 1);
    Ok(())
}

#[test]
fn test_compile_failures_are_cached() {
    let counting = Arc::new(CountingResolver::new(resolver_with(
        &[("broken", "{{v:bad name/}}")],
        Dialect::Text,
    )));
    let engine = TemplateEngine::builder()
        .with_resolver(counting.clone())
        .build()
        .unwrap();

    let first = engine.template("broken", Dialect::Text).unwrap_err();
    let second = engine.template("broken", Dialect::Text).unwrap_err();
    assert_eq!(first, second);
    assert!(first.is_compile_failure());
    assert_eq!(counting.loads(), 1);
    assert_eq!(engine.cache().stats().failures, 1);
}

#[test]
fn test_missing_templates_are_retried() -> TestResult {
    let resolver = resolver_with(&[], Dialect::Text);
    let engine = TemplateEngine::builder()
        .with_resolver(resolver.clone())
        .build()?;

    let err = engine.template("late", Dialect::Text).unwrap_err();
    assert!(matches!(err, TemplateError::ResourceUnavailable { .. }));

    resolver.add("late", Dialect::Text, "arrived")?;
    assert_eq!(engine.template("late", Dialect::Text)?.render_to_string()?, "arrived");
    Ok(())
}

#[test]
fn test_invalidate_forces_recompilation() -> TestResult {
    let resolver = resolver_with(&[("note", "v1")], Dialect::Text);
    let engine = TemplateEngine::builder()
        .with_resolver(resolver.clone())
        .build()?;

    assert_eq!(engine.template("note", Dialect::Text)?.render_to_string()?, "v1");
    resolver.add("note", Dialect::Text, "v2")?;
    // Without hot reload the cached version keeps being served.
    assert_eq!(engine.template("note", Dialect::Text)?.render_to_string()?, "v1");

    assert!(engine.cache().invalidate(&text_id("note"))?);
    assert!(!engine.cache().invalidate(&text_id("note"))?);
    assert_eq!(engine.template("note", Dialect::Text)?.render_to_string()?, "v2");
    assert_eq!(engine.cache().stats().invalidations, 1);
    Ok(())
}

// ============================================================================
// Hot reload
// ============================================================================

#[test]
fn test_hot_reload_picks_up_changes() -> TestResult {
    init_logger();
    let resolver = resolver_with(&[("note", "v1 {{v:x/}}")], Dialect::Text);
    let engine = TemplateEngine::builder()
        .with_resolver(resolver.clone())
        .with_hot_reload(true)
        .build()?;

    let before = engine.compiled(&text_id("note"))?;
    let unchanged = engine.compiled(&text_id("note"))?;
    assert!(Arc::ptr_eq(&before, &unchanged));

    resolver.add("note", Dialect::Text, "v2 {{v:y/}}")?;
    let mut template = engine.template("note", Dialect::Text)?;
    template.set_value("y", "!")?;
    assert_eq!(template.render_to_string()?, "v2 !");
    assert!(!template.contains("x"));

    // Instances created before the reload keep their compiled form.
    assert!(before.contains("x"));

    let stats = engine.cache().stats();
    assert_eq!(stats.reloads, 1);
    assert_eq!(stats.compilations, 2);
    Ok(())
}

#[test]
fn test_hot_reload_recovers_from_fixed_source() -> TestResult {
    let resolver = resolver_with(&[("draft", "{{b:open}}")], Dialect::Text);
    let engine = TemplateEngine::builder()
        .with_resolver(resolver.clone())
        .with_hot_reload(true)
        .build()?;

    assert!(engine.template("draft", Dialect::Text).is_err());
    resolver.add("draft", Dialect::Text, "{{b:open}}done{{/b:open}}")?;
    assert_eq!(engine.template("draft", Dialect::Text)?.render_to_string()?, "done");
    Ok(())
}

#[test]
fn test_hot_reload_drops_deleted_templates() -> TestResult {
    let resolver = resolver_with(&[("gone", "here")], Dialect::Text);
    let engine = TemplateEngine::builder()
        .with_resolver(resolver.clone())
        .with_hot_reload(true)
        .build()?;

    engine.compiled(&text_id("gone"))?;
    resolver.remove("gone", Dialect::Text);
    let err = engine.compiled(&text_id("gone")).unwrap_err();
    assert!(matches!(err, TemplateError::ResourceUnavailable { .. }));
    assert!(!engine.cache().contains(&text_id("gone")));
    Ok(())
}

#[test]
fn test_hot_reload_follows_includes_on_disk() -> TestResult {
    init_logger();
    let dir = tempfile::tempdir()?;
    let page = dir.path().join("page.txt");
    let footer = dir.path().join("footer.txt");
    fs::write(&page, "Body {{i:footer/}}")?;
    fs::write(&footer, "(old footer)")?;

    let engine = TemplateEngine::builder()
        .with_template_dir(dir.path())
        .with_hot_reload(true)
        .build()?;
    assert_eq!(
        engine.template("page", Dialect::Text)?.render_to_string()?,
        "Body (old footer)"
    );

    fs::write(&footer, "(new footer)")?;
    // Modification times can be coarse; move the clock forward explicitly.
    let later = SystemTime::now() + Duration::from_secs(10);
    fs::File::options().write(true).open(&footer)?.set_modified(later)?;

    assert_eq!(
        engine.template("page", Dialect::Text)?.render_to_string()?,
        "Body (new footer)"
    );
    assert_eq!(engine.cache().stats().reloads, 1);
    Ok(())
}

// ============================================================================
// Preloading
// ============================================================================

#[test]
fn test_preload_compiles_everything() -> TestResult {
    let engine = text_engine(&[("hello", HELLO), ("orders", ORDERS), ("bad", "{{/b:x}}")]);
    let ids = [text_id("hello"), text_id("orders"), text_id("bad"), text_id("missing")];

    let results = engine.preload(&ids);
    assert_eq!(results.len(), 4);
    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert!(results[2].as_ref().is_err_and(|e| e.is_compile_failure()));
    assert!(matches!(
        results[3],
        Err(TemplateError::ResourceUnavailable { .. })
    ));

    assert_eq!(engine.cache().len(), 3);
    engine.template("hello", Dialect::Text)?;
    assert_eq!(engine.cache().stats().compilations, 3);
    Ok(())
}

#[test]
fn test_clear_empties_the_cache() -> TestResult {
    let engine = text_engine(&[("hello", HELLO), ("orders", ORDERS)]);
    engine.preload(&[text_id("hello"), text_id("orders")]);
    assert_eq!(engine.cache().len(), 2);

    engine.cache().clear()?;
    assert!(engine.cache().is_empty());
    assert_eq!(engine.cache().stats().invalidations, 2);
    Ok(())
}
