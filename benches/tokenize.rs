use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use rtok::{BpeLearner, BpeLearnerConfig, Mode, SubwordLearner, Tokenizer, TokenizerOptions};

fn build_corpus() -> Vec<String> {
    let words = [
        "the", "quick", "brown", "fox", "jumps", "over", "lazy", "dog", "so-called", "1,000.5",
        "Hello", "WORLD", "naïve", "café", "don't",
    ];
    (0..2048)
        .map(|line| {
            (0..12)
                .map(|offset| words[(line * 7 + offset * 3) % words.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn bench_tokenize(c: &mut Criterion) {
    let corpus = build_corpus();
    let total_bytes: usize = corpus.iter().map(String::len).sum();
    let tokenizer = Tokenizer::new(TokenizerOptions {
        mode: Mode::Aggressive,
        joiner_annotate: true,
        case_markup: true,
        ..TokenizerOptions::default()
    })
    .expect("tokenizer");

    let mut group = c.benchmark_group("tokenize_lines");
    group.throughput(Throughput::Bytes(total_bytes as u64));
    group.bench_function(BenchmarkId::from_parameter("aggressive_joiner"), |b| {
        b.iter(|| {
            for line in &corpus {
                black_box(tokenizer.tokenize(line));
            }
        });
    });
    group.finish();
}

fn bench_learn_bpe(c: &mut Criterion) {
    let corpus = build_corpus().join("\n");
    let cfg = BpeLearnerConfig::builder()
        .symbols(500)
        .min_frequency(2)
        .build()
        .expect("configuration");

    let mut group = c.benchmark_group("learn_bpe");
    group.throughput(Throughput::Bytes(corpus.len() as u64));
    group.sampling_mode(SamplingMode::Flat);
    group.bench_function(BenchmarkId::from_parameter("symbols_500"), |b| {
        b.iter(|| {
            let mut learner = BpeLearner::new(cfg.clone(), None).expect("learner");
            learner.ingest_text(&corpus).expect("ingest");
            black_box(learner.learn_merges());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_tokenize, bench_learn_bpe);
criterion_main!(benches);
