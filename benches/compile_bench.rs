use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use weft::template::lex;
use weft::{Bindings, Engine, MockSource, PromptTemplate};

const TEMPLATE: &str = "What is an {x}? An {x} is [answer]. \
    Compared to {data.other}, a {x} differs in [difference]. \
    In short: [summary:(\\.|!)]. Escaped \\[brackets\\] stay literal.";

fn bench_lex(c: &mut Criterion) {
    c.bench_function("lex_template", |b| {
        b.iter(|| lex(black_box(TEMPLATE)));
    });
}

fn bench_compile(c: &mut Criterion) {
    let engine = Engine::new(MockSource::new(Vec::<String>::new()));
    let template = PromptTemplate::parse(TEMPLATE);
    let bindings = Bindings::new()
        .bind("x", "owl")
        .bind("data", json!({"other": "a hawk"}));

    c.bench_function("compile_template", |b| {
        b.iter(|| {
            template
                .instantiate_deferred(black_box(&bindings), &engine)
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_lex, bench_compile);
criterion_main!(benches);
