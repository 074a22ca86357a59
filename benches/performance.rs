use carabao_chat::{FrameReassembler, StreamSession, decode};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

// Helper to build a realistic response body with `deltas` text fragments
fn create_body(deltas: usize) -> String {
    let mut body = String::from("{\"type\":\"start\",\"content\":{\"message\":\"Processing\"}}\n");
    body.push_str(
        "{\"type\":\"tool_call_start\",\"tool_id\":\"t1\",\"tool_name\":\"show_query_store\",\"arguments\":{\"sql\":\"select * from orders\"}}\n",
    );
    for i in 0..deltas {
        body.push_str(&format!(
            "{{\"type\":\"text_delta\",\"content\":\"token {} with ünïcödé \"}}\n",
            i
        ));
    }
    body.push_str(
        "{\"type\":\"tool_call_result\",\"tool_id\":\"t1\",\"content\":{\"query_id\":42},\"status\":\"success\"}\n",
    );
    body.push_str("{\"type\":\"end\",\"content\":{\"message\":\"done\"}}\n");
    body
}

// Benchmark: reassembling frames at varying chunk sizes
fn bench_reassemble_by_chunk_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassemble_by_chunk_size");
    let body = create_body(500);
    group.throughput(Throughput::Bytes(body.len() as u64));

    for size in [1usize, 16, 256, 4096, 65536].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut frames = FrameReassembler::new();
                let mut count = 0;
                for chunk in body.as_bytes().chunks(size) {
                    count += frames.feed(black_box(chunk)).unwrap().len();
                }
                count += frames.flush().into_iter().count();
                count
            });
        });
    }

    group.finish();
}

// Benchmark: decoding each event kind
fn bench_decode_by_kind(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_by_kind");

    let frames = [
        ("text_delta", r#"{"type":"text_delta","content":"hello world"}"#),
        (
            "tool_call_start",
            r#"{"type":"tool_call_start","tool_id":"t1","tool_name":"run_sql","arguments":{"sql":"select 1","limit":10}}"#,
        ),
        (
            "tool_call_result",
            r#"{"type":"tool_call_result","tool_id":"t1","content":{"rows":[[1,2],[3,4]]},"status":"success"}"#,
        ),
        ("unknown", r#"{"type":"heartbeat","ts":1700000000}"#),
        ("malformed", r#"{"type":"text_delta","content":"#),
    ];

    for (name, frame) in frames.iter() {
        group.bench_with_input(BenchmarkId::from_parameter(name), frame, |b, frame| {
            b.iter(|| decode(black_box(frame)));
        });
    }

    group.finish();
}

// Benchmark: realistic pipeline - reassemble, decode, apply
fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pipeline");

    for deltas in [10usize, 100, 1000].iter() {
        let body = create_body(*deltas);
        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(deltas), &body, |b, body| {
            b.iter(|| {
                let mut frames = FrameReassembler::new();
                let mut session = StreamSession::new();
                session.begin();
                for chunk in body.as_bytes().chunks(512) {
                    for frame in frames.feed(chunk).unwrap() {
                        if let Ok(Some(event)) = decode(&frame) {
                            session.apply(event);
                        }
                    }
                }
                black_box(session.final_text().len())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_reassemble_by_chunk_size,
    bench_decode_by_kind,
    bench_full_pipeline,
);
criterion_main!(benches);
