//! Template compile and render throughput benchmarks
//!
//! Measures:
//! - Cold compilation of templates with a growing number of tags
//! - Rendering repeated rows into a reused instance
//! - Cached lookups with and without hot reload probing
//!
//! Run benchmarks: `cargo bench --bench render_throughput`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use stencil::{Dialect, InMemoryResolver, TemplateEngine, TemplateId, compile_str};

const ROW_TEMPLATE: &str = "\
<table>{{b:rows/}}{{b:row}}<tr><td>{{v:id/}}</td><td>{{v:name/}}</td><td>{{v:value/}}</td></tr>
{{/b:row}}</table>";

/// A template with `count` value tags and filtered sections.
fn generated_template(count: usize) -> String {
    let mut source = String::from("<html><body>\n");
    for i in 0..count {
        source.push_str(&format!(
            "<p>{{{{v:field{i}}}}}default {i}{{{{/v:field{i}}}}} \
             {{{{f:lang:label{i}}}}}Label{{{{/f:lang:label{i}}}}}\
             {{{{a:label{i}:fr}}}}Libellé{{{{/a:label{i}:fr}}}}</p>\n"
        ));
    }
    source.push_str("</body></html>");
    source
}

fn benchmark_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    for count in [10, 100, 1000] {
        let source = generated_template(count);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::new("tags", count), &source, |b, source| {
            b.iter(|| {
                compile_str("generated", black_box(source), Dialect::Markup)
                    .expect("Failed to compile template")
            });
        });
    }

    group.finish();
}

fn benchmark_render_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_rows");
    let compiled = Arc::new(
        compile_str("rows", ROW_TEMPLATE, Dialect::Markup).expect("Failed to compile template"),
    );

    for count in [1, 10, 100, 1000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("records", count), &count, |b, &count| {
            b.iter(|| {
                let mut template = compiled.instantiate();
                for i in 0..count {
                    template.set_value("id", i.to_string()).expect("id");
                    template
                        .set_value_encoded("name", &format!("Record <{}>", i))
                        .expect("name");
                    template.set_value("value", (i * 100).to_string()).expect("value");
                    let row = template.render_block_to_string("row").expect("row");
                    template.append_value("rows", row).expect("rows");
                }
                template.blank("row").expect("blank");
                template.render_to_string().expect("Failed to render")
            });
        });
    }

    group.finish();
}

fn benchmark_cached_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("cached_lookup");
    let resolver = Arc::new(InMemoryResolver::new());
    resolver
        .add("rows", Dialect::Markup, ROW_TEMPLATE)
        .expect("Failed to add template");
    let id = TemplateId::new("rows", Dialect::Markup);

    for hot_reload in [false, true] {
        let engine = TemplateEngine::builder()
            .with_resolver(resolver.clone())
            .with_hot_reload(hot_reload)
            .build()
            .expect("Failed to build engine");
        engine.compiled(&id).expect("Failed to compile template");

        let label = if hot_reload { "hot_reload" } else { "static" };
        group.bench_function(label, |b| {
            b.iter(|| engine.template_for(black_box(&id)).expect("Failed to load template"));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_compile,
    benchmark_render_rows,
    benchmark_cached_lookup
);
criterion_main!(benches);
