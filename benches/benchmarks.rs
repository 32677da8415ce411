use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value as JsonValue};
use std::hint::black_box;

use attrmodel::{ChangeEvent, Model, Validations};

fn model_creation_benchmark(c: &mut Criterion) {
    let raw = json!({
        "name": "Ada",
        "address": { "city": "London", "street": { "number": 12 } },
        "tags": ["math", "engines"],
    });

    c.bench_function("model_creation", |b| {
        b.iter(|| {
            let model = Model::new(black_box(raw.clone()));
            model
        });
    });
}

fn attribute_read_benchmark(c: &mut Criterion) {
    let model = Model::new(json!({ "name": "Ada" }));

    c.bench_function("attribute_read", |b| {
        b.iter(|| {
            black_box(model.get("name"));
        });
    });
}

fn absent_chain_read_benchmark(c: &mut Criterion) {
    let model = Model::new(JsonValue::Null);

    c.bench_function("absent_chain_read", |b| {
        b.iter(|| {
            black_box(model.get("a").get("b").get("c").get("d").is_nil());
        });
    });
}

fn attribute_write_benchmark(c: &mut Criterion) {
    let model = Model::new(json!({ "count": 0 }));

    c.bench_function("attribute_write", |b| {
        let mut i = 0i64;
        b.iter(|| {
            model.set("count", black_box(i)).unwrap();
            i += 1;
        });
    });
}

fn deep_materialization_benchmark(c: &mut Criterion) {
    c.bench_function("deep_materialization", |b| {
        b.iter(|| {
            let root = Model::new(JsonValue::Null);
            root.get("a").get("b").get("c").set("d", black_box(1)).unwrap();
            root
        });
    });
}

fn observer_rerun_benchmark(c: &mut Criterion) {
    let model = Model::new(json!({ "first": "Ada", "last": "Lovelace" }));
    let _observer = model.observe({
        let model = model.clone();
        move || {
            black_box(model.get("first"));
            black_box(model.get("last"));
        }
    });

    c.bench_function("observer_rerun", |b| {
        let mut i = 0i64;
        b.iter(|| {
            model.set("first", black_box(i)).unwrap();
            i += 1;
        });
    });
}

fn errors_benchmark(c: &mut Criterion) {
    let model = Model::new(json!({ "name": "Al", "email": "" })).with_validations(
        Validations::from_json(json!({
            "name": { "length": { "minimum": 3, "maximum": 20 } },
            "email": { "presence": true },
        }))
        .unwrap(),
    );

    c.bench_function("errors", |b| {
        b.iter(|| {
            black_box(model.errors());
        });
    });
}

fn nested_listeners_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("nested_listeners");

    for listener_count in [1, 10, 100].iter() {
        let root = Model::new(json!({ "user": { "profile": { "name": "Ada" } } }));
        let profile = root.get("user").get("profile");

        let registrations: Vec<_> = (0..*listener_count)
            .map(|_| {
                root.on_change(|_: &ChangeEvent| {
                    // Empty listener
                })
            })
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(listener_count),
            listener_count,
            |b, _| {
                let mut i = 0i64;
                b.iter(|| {
                    profile.set("name", black_box(i)).unwrap();
                    i += 1;
                });
            },
        );
        drop(registrations);
    }
    group.finish();
}

criterion_group!(
    benches,
    model_creation_benchmark,
    attribute_read_benchmark,
    absent_chain_read_benchmark,
    attribute_write_benchmark,
    deep_materialization_benchmark,
    observer_rerun_benchmark,
    errors_benchmark,
    nested_listeners_benchmark,
);
criterion_main!(benches);
