use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use dynabind::marshal::{from_dynamic, to_dynamic};
use dynabind::{
    Direction, DynamicValue, Engine, FunctionInfo, Kind, Namespace, ParamInfo, Registry,
    TypeDescriptor, TypeInfo, TypeTag,
};

extern "C" fn add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

fn engine_with_add() -> Engine {
    let mut ns = Namespace::new("Bench");
    let i32_ty = TypeInfo::scalar(TypeTag::Int32);
    ns.define(TypeDescriptor::new(
        "Bench",
        "add",
        Kind::Function(
            FunctionInfo::new(
                "add",
                vec![
                    ParamInfo::new("a", Direction::In, i32_ty.clone()),
                    ParamInfo::new("b", Direction::In, i32_ty.clone()),
                ],
                i32_ty,
            )
            .at_address(add as *const () as usize),
        ),
    ));
    let registry = Registry::new();
    registry.install(ns);
    Engine::new(Arc::new(registry))
}

fn bench_scalar_conversion(c: &mut Criterion) {
    let engine = Engine::new(Arc::new(Registry::new()));
    let ty = TypeInfo::scalar(TypeTag::Int32);
    let value = DynamicValue::Int(1234);

    c.bench_function("from_dynamic_i32", |b| {
        b.iter(|| {
            let mut keepalive = Vec::new();
            black_box(from_dynamic(black_box(&value), &ty, false, &mut keepalive).unwrap());
        });
    });

    let mut keepalive = Vec::new();
    let slot = from_dynamic(&value, &ty, false, &mut keepalive).unwrap();
    c.bench_function("to_dynamic_i32", |b| {
        b.iter(|| {
            black_box(to_dynamic(&engine, &ty, black_box(&slot)).unwrap());
        });
    });
}

fn bench_string_conversion(c: &mut Criterion) {
    let ty = TypeInfo::scalar(TypeTag::Utf8);
    let value = DynamicValue::Str("a moderately sized argument string".to_string());

    c.bench_function("from_dynamic_string", |b| {
        b.iter(|| {
            let mut keepalive = Vec::new();
            black_box(from_dynamic(black_box(&value), &ty, false, &mut keepalive).unwrap());
        });
    });
}

fn bench_invoke(c: &mut Criterion) {
    let engine = engine_with_add();
    let descriptor = engine.resolve("Bench", None, "add").unwrap();
    let callable = engine.bind(&descriptor).unwrap();
    let args = [DynamicValue::Int(40), DynamicValue::Int(2)];

    c.bench_function("invoke_add_i32", |b| {
        b.iter(|| {
            black_box(engine.invoke(&callable, black_box(&args)).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_scalar_conversion,
    bench_string_conversion,
    bench_invoke
);
criterion_main!(benches);
