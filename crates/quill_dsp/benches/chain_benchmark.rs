//! Performance benchmarks for the DSP module
//!
//! Run with: cargo bench -p quill_dsp

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use quill_dsp::{
    design_low_cut_filter, design_peak_filter, ChainSettings, EqProcessor, FftDataGenerator,
    FftOrder, Slope, ANALYZER_FLOOR_DB,
};

fn full_settings() -> ChainSettings {
    ChainSettings {
        peak_freq: 1000.0,
        peak_gain_db: 6.0,
        peak_quality: 1.0,
        low_cut_freq: 100.0,
        low_cut_slope: Slope::Db48,
        high_cut_freq: 10_000.0,
        high_cut_slope: Slope::Db48,
        ..Default::default()
    }
}

fn benchmark_chain_processing(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_chain");

    // Common buffer sizes in audio applications
    for size in [64, 128, 256, 512, 1024, 2048] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("process_interleaved_{}_frames", size), |b| {
            let mut eq = EqProcessor::new(48_000.0);
            eq.apply_settings(&full_settings()).unwrap();
            let mut buffer: Vec<f32> = (0..size * 2).map(|i| (i as f32 * 0.001).sin()).collect();

            b.iter(|| {
                eq.process_interleaved(black_box(&mut buffer));
            });
        });

        group.bench_function(format!("process_planar_{}_frames", size), |b| {
            let mut eq = EqProcessor::new(48_000.0);
            eq.apply_settings(&full_settings()).unwrap();
            let mut left: Vec<f32> = (0..size).map(|i| (i as f32 * 0.001).sin()).collect();
            let mut right: Vec<f32> = (0..size).map(|i| (i as f32 * 0.002).sin()).collect();

            b.iter(|| {
                eq.process_planar(black_box(&mut left), black_box(&mut right));
            });
        });
    }

    group.finish();
}

fn benchmark_coefficient_design(c: &mut Criterion) {
    let settings = full_settings();

    c.bench_function("design_peak_filter", |b| {
        b.iter(|| design_peak_filter(black_box(&settings), black_box(48_000.0)).unwrap());
    });

    c.bench_function("design_low_cut_cascade_48db", |b| {
        b.iter(|| design_low_cut_filter(black_box(&settings), black_box(48_000.0)).unwrap());
    });
}

fn benchmark_single_sample(c: &mut Criterion) {
    c.bench_function("chain_process_single_frame", |b| {
        let mut eq = EqProcessor::new(48_000.0);
        eq.apply_settings(&full_settings()).unwrap();

        b.iter(|| {
            black_box(eq.process_frame(black_box(0.5), black_box(-0.5)));
        });
    });
}

fn benchmark_fft_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("spectrum");

    for order in [FftOrder::Order2048, FftOrder::Order4096, FftOrder::Order8192] {
        let size = order.size();
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("produce_fft_data_{}", size), |b| {
            let mut generator = FftDataGenerator::new(order);
            let samples: Vec<f32> = (0..size)
                .map(|i| (std::f32::consts::TAU * 1000.0 * i as f32 / 48_000.0).sin())
                .collect();
            let mut frame = Vec::new();

            b.iter(|| {
                generator.produce_fft_data(black_box(&samples), ANALYZER_FLOOR_DB);
                // Drain so the fifo never saturates during the run
                generator.pull_frame(&mut frame);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_chain_processing,
    benchmark_coefficient_design,
    benchmark_single_sample,
    benchmark_fft_frame
);

criterion_main!(benches);
