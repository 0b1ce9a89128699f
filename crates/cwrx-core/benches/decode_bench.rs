//! Benchmarks for the CW decode pipeline
//!
//! Run with: cargo bench -p cwrx-core --bench decode_bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use cwrx_core::config::CwConfig;
use cwrx_core::filters::ButterworthLowpass;
use cwrx_core::sdr::SdrDemodulator;
use cwrx_core::synth::{synthesize, SynthConfig};
use cwrx_core::{CwPipeline, LanguageModel};

fn bench_butterworth(c: &mut Criterion) {
    let mut group = c.benchmark_group("butterworth");
    let samples: Vec<f64> = (0..48_000)
        .map(|i| (2.0 * std::f64::consts::PI * 700.0 * i as f64 / 48_000.0).sin())
        .collect();

    group.throughput(Throughput::Elements(samples.len() as u64));
    group.bench_function("order4_one_second", |b| {
        let mut lpf = ButterworthLowpass::new(4, 48_000.0, 50.0).unwrap();
        b.iter(|| {
            let mut acc = 0.0;
            for &s in &samples {
                acc += lpf.process(black_box(s));
            }
            acc
        })
    });
    group.finish();
}

fn bench_sdr_demod(c: &mut Criterion) {
    let mut group = c.benchmark_group("sdr_demod");
    let cfg = CwConfig::default();
    let samples: Vec<f64> = (0..48_000)
        .map(|i| 0.5 * (2.0 * std::f64::consts::PI * 700.0 * i as f64 / 48_000.0).sin())
        .collect();

    group.throughput(Throughput::Elements(samples.len() as u64));
    group.bench_function("one_second", |b| {
        let mut sdr = SdrDemodulator::new(48_000.0, 700.0, &cfg.sdr).unwrap();
        b.iter(|| {
            let mut acc = 0.0;
            for &s in &samples {
                acc += sdr.process(black_box(s));
            }
            acc
        })
    });
    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    let audio = synthesize(
        "CQ CQ DE W1AW",
        &SynthConfig {
            snr_db: Some(20.0),
            ..SynthConfig::default()
        },
    );

    group.throughput(Throughput::Elements(audio.len() as u64));
    group.bench_function("decode_cq", |b| {
        b.iter(|| {
            let mut cfg = CwConfig::default();
            cfg.monitor.enabled = false;
            let mut pipeline =
                CwPipeline::new(cfg, LanguageModel::empty(), |_| {}).unwrap();
            for chunk in audio.chunks(1024) {
                pipeline.process_chunk(black_box(chunk));
            }
            pipeline.finish()
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_butterworth,
    bench_sdr_demod,
    bench_full_pipeline
);
criterion_main!(benches);
