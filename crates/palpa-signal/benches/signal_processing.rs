//! Benchmarks for the pulse signal path.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use palpa_core::{PulsePosition, SessionId};
use palpa_signal::extractor::FeatureExtractor;
use palpa_signal::filtering::BandpassFilter;
use palpa_signal::spectrum::SpectrumAnalyzer;
use palpa_signal::synthetic::SyntheticPulse;
use palpa_signal::wavelet::{MotherWavelet, WaveletTransform};

fn benchmark_bandpass(c: &mut Criterion) {
    let waveform = SyntheticPulse::default().waveform(60.0);

    c.bench_function("bandpass_60s_1khz", |b| {
        b.iter(|| {
            let mut filter = BandpassFilter::new(0.1, 20.0, 1000.0);
            filter.filter_signal(black_box(&waveform))
        })
    });
}

fn benchmark_spectrum(c: &mut Criterion) {
    let waveform = SyntheticPulse::default()
        .with_sampling(200.0, 20)
        .waveform(60.0);
    let analyzer = SpectrumAnalyzer::for_length(waveform.len(), 200.0);

    c.bench_function("spectrum_60s_200hz", |b| {
        b.iter(|| analyzer.analyze(black_box(&waveform)))
    });
}

fn benchmark_wavelet(c: &mut Criterion) {
    let waveform = SyntheticPulse::default()
        .with_sampling(200.0, 20)
        .waveform(60.0);
    let dwt = WaveletTransform::new(MotherWavelet::Daubechies4, 5);

    c.bench_function("dwt_db4_level5", |b| {
        b.iter(|| dwt.decompose(black_box(&waveform)))
    });
}

fn benchmark_extraction(c: &mut Criterion) {
    let session = SessionId::new();
    let extractor = FeatureExtractor::default();

    let short = SyntheticPulse::default().packets(session, PulsePosition::LeftCun, 10.0);
    let long = SyntheticPulse::default().packets(session, PulsePosition::LeftCun, 180.0);

    c.bench_function("extract_10s", |b| {
        b.iter(|| extractor.extract(session, black_box(&short), false))
    });

    c.bench_function("extract_3min", |b| {
        b.iter(|| extractor.extract(session, black_box(&long), false))
    });
}

criterion_group!(
    benches,
    benchmark_bandpass,
    benchmark_spectrum,
    benchmark_wavelet,
    benchmark_extraction
);
criterion_main!(benches);
