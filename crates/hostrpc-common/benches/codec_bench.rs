// Criterion benchmarks for the hostrpc-common codec
//
// Run benchmarks with:
//   cargo bench -p hostrpc-common
//
// For detailed output with plots:
//   cargo bench -p hostrpc-common -- --save-baseline main

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hostrpc_common::protocol::{Envelope, ErrorPayload, Notification, Request, RequestId, Response};
use hostrpc_common::transport::JsonCodec;
use serde_json::json;

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    let request = Envelope::from(Request::new(RequestId::from(42), "Store.set", json!(["key", 42])));
    group.bench_function("request", |b| {
        b.iter(|| JsonCodec::encode(black_box(&request)))
    });

    let large = Envelope::from(Response::success(
        RequestId::from(42),
        json!({"values": (0..1000).collect::<Vec<_>>()}),
    ));
    group.bench_function("large_response", |b| {
        b.iter(|| JsonCodec::encode(black_box(&large)))
    });

    let notification = Envelope::from(Notification::new(
        "Ticker.SubscribedEvent",
        json!({"event": "tick", "data": 1}),
    ));
    group.bench_function("notification", |b| {
        b.iter(|| JsonCodec::encode(black_box(&notification)))
    });

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let request = r#"{"id":42,"method":"Store.set","params":["key",42]}"#;
    group.bench_function("request", |b| b.iter(|| JsonCodec::decode(black_box(request))));

    let error = JsonCodec::encode(&Envelope::from(Response::error(
        RequestId::from(42),
        ErrorPayload::method_not_found("Store.missing"),
    )))
    .unwrap();
    group.bench_function("error_response", |b| {
        b.iter(|| JsonCodec::decode(black_box(&error)))
    });

    group.bench_function("malformed", |b| {
        b.iter(|| JsonCodec::decode(black_box(r#"{"id":1}"#)))
    });

    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
