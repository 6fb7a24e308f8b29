//! Cost of one feature tick at the microphone and media resolutions.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use sonosphere::audio::{
    FeatureSnapshot, FeatureTicker, PerceptualExtractor, PitchConfig, SpectrumAnalyser,
};

fn tone(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / 44100.0).sin() * 0.5)
        .collect()
}

fn bench_tick(c: &mut Criterion) {
    for fft_size in [2048usize, 8192] {
        let analyser = Arc::new(SpectrumAnalyser::new(44100.0, fft_size));
        let mut extractor = PerceptualExtractor::new(44100.0, 512);
        let samples = tone(fft_size);
        analyser.push_samples(&samples);
        extractor.process(&samples);

        let mut ticker = FeatureTicker::new(analyser, Some(extractor.output()), 0.8, PitchConfig::default());
        let mut snapshot = FeatureSnapshot::default();

        c.bench_function(&format!("tick_fft_{}", fft_size), |b| {
            b.iter(|| ticker.tick(black_box(&mut snapshot)));
        });
    }
}

fn bench_extractor_block(c: &mut Criterion) {
    let mut extractor = PerceptualExtractor::new(44100.0, 512);
    let block = tone(512);
    c.bench_function("extractor_block_512", |b| {
        b.iter(|| extractor.analyze_block(black_box(&block)));
    });
}

criterion_group!(benches, bench_tick, bench_extractor_block);
criterion_main!(benches);
