use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pgshape::{
    BindMap, Compiler, Cond, IdentStyle, JoinSpec, QuerySpec, Quoter, Relation, Where, literal_sql,
    raw,
};
use serde_json::json;

/// SELECT with `n` equality conditions and an `n`-element IN list.
fn build_spec(n: usize) -> QuerySpec {
    let mut filter = Where::new();
    for i in 0..n {
        filter = filter.eq(format!("col{i}"), i as i64);
    }
    filter = filter
        .in_list("id", 0..n as i64)
        .push(Cond::or(vec![Cond::is_null("deleted_at"), Cond::eq("kind", "x")]))
        .order_desc("id")
        .limit(50);

    QuerySpec::new("users(u)")
        .join(JoinSpec::new().join("[><]roles(r)", Relation::on([("role_id", "id")])))
        .columns((0..n).map(|i| format!("u.col{i}")).collect::<Vec<_>>())
        .filter(filter)
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile/select");

    for n in [1, 5, 10, 50, 100] {
        let spec = build_spec(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &spec, |b, spec| {
            let mut compiler = Compiler::new(Quoter::new("app_"));
            b.iter(|| black_box(compiler.select(spec).unwrap()));
        });
    }

    group.finish();
}

fn bench_from_json(c: &mut Criterion) {
    let args = [
        json!({"[><]roles(r)": {"role_id": "id"}}),
        json!(["users.id", "r.title(role)"]),
        json!({"age": [">", 18], "OR": {"a": 1, "b": null}, "ORDER": {"id": "DESC"}, "LIMIT": [0, 20]}),
    ];

    c.bench_function("compile/from_json", |b| {
        let mut compiler = Compiler::default();
        b.iter(|| {
            let spec = QuerySpec::from_args("users", black_box(&args)).unwrap();
            black_box(compiler.select(&spec).unwrap())
        });
    });
}

fn bench_raw_expand(c: &mut Criterion) {
    let fragment = raw(
        "SELECT <u.id>, COUNT(<p.id>) FROM <users> JOIN <posts> ON <p.uid> = <u.id> \
         WHERE <u.name> = :name AND <u.note> <> '<not a marker>' GROUP BY <u.id>",
    )
    .bind("name", "ann");
    let quoter = Quoter::new("app_");

    c.bench_function("compile/raw_expand", |b| {
        b.iter(|| {
            let mut binds = BindMap::new();
            black_box(fragment.expand(&quoter, &mut binds).unwrap())
        });
    });
}

fn bench_literal(c: &mut Criterion) {
    let compiled = Compiler::default().select(&build_spec(20)).unwrap();

    c.bench_function("compile/literal_sql", |b| {
        b.iter(|| black_box(literal_sql(&compiled.sql, &compiled.binds, IdentStyle::Ansi)));
    });
}

criterion_group!(benches, bench_select, bench_from_json, bench_raw_expand, bench_literal);
criterion_main!(benches);
