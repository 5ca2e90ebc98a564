//! Benchmarks do parser SSE da Interactions API.
//!
//! Testa performance de:
//! - Parse de um stream completo de uma vez
//! - Parse incremental em chunks pequenos (como chegam do socket)
//! - Frames com texto multibyte partido entre chunks
//!
//! Executar: `cargo bench --bench sse_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gemini_research::upstream::SseStreamParser;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HELPERS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Stream típico: start, raciocínio, `deltas` fragmentos de texto, complete.
fn build_stream(deltas: usize, text: &str) -> String {
    let mut out = String::new();
    out.push_str(
        "data: {\"event_type\":\"interaction.start\",\"interaction\":{\"id\":\"int-bench\"},\"event_id\":\"e0\"}\n\n",
    );
    out.push_str(
        "data: {\"event_type\":\"content.delta\",\"delta\":{\"type\":\"thought_summary\",\"content\":{\"text\":\"Planning the search\"}}}\n\n",
    );
    for i in 0..deltas {
        out.push_str(&format!(
            "id: e{}\ndata: {{\"event_type\":\"content.delta\",\"delta\":{{\"type\":\"text\",\"text\":\"{} {}\"}}}}\n\n",
            i + 1,
            text,
            i
        ));
    }
    out.push_str("data: {\"event_type\":\"interaction.complete\",\"interaction\":{\"id\":\"int-bench\",\"status\":\"completed\"}}\n\n");
    out.push_str("data: [DONE]\n\n");
    out
}

fn feed_in_chunks(input: &[u8], chunk: usize) -> usize {
    let mut parser = SseStreamParser::default();
    let mut count = 0;
    for piece in input.chunks(chunk) {
        count += parser.feed(piece).len();
    }
    count + parser.finish().len()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BENCHMARKS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn bench_parse_whole(c: &mut Criterion) {
    let mut group = c.benchmark_group("sse_parse_whole");

    for deltas in [10, 100, 1000] {
        let input = build_stream(deltas, "Quantum error correction is maturing");
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(deltas), &input, |b, input| {
            b.iter(|| SseStreamParser::parse_frames(black_box(input)))
        });
    }

    group.finish();
}

fn bench_parse_chunked(c: &mut Criterion) {
    let mut group = c.benchmark_group("sse_parse_chunked");
    let input = build_stream(200, "Battery chemistry outlook");
    group.throughput(Throughput::Bytes(input.len() as u64));

    for chunk in [16, 256, 4096] {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk| {
            b.iter(|| feed_in_chunks(black_box(input.as_bytes()), chunk))
        });
    }

    group.finish();
}

fn bench_parse_multibyte(c: &mut Criterion) {
    // Chunks de 7 bytes partem quase todo caractere de 3 bytes
    let input = build_stream(200, "量子誤り訂正の最新動向");
    c.bench_function("sse_parse_multibyte_split", |b| {
        b.iter(|| feed_in_chunks(black_box(input.as_bytes()), 7))
    });
}

criterion_group!(
    benches,
    bench_parse_whole,
    bench_parse_chunked,
    bench_parse_multibyte,
);

criterion_main!(benches);
