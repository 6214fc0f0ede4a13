//! Engine benchmarks
//!
//! Measures the audio callback and the analysis tick.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use heron_core::{BandSettings, EngineConfig, Equalizer, FilterSettings, StreamConfig};

fn benchmark_processor(c: &mut Criterion) {
    let mut group = c.benchmark_group("audio_processor");

    // Typical buffer sizes used in real-time audio
    for buffer_size in [64_u32, 128, 256, 512, 1024].iter() {
        let (engine, mut processor) = Equalizer::new(EngineConfig::default()).unwrap();
        processor
            .prepare(StreamConfig {
                buffer_size: *buffer_size,
                ..StreamConfig::default()
            })
            .unwrap();

        // Create test buffer (stereo interleaved)
        let mut buffer: Vec<f32> = (0..*buffer_size as usize * 2)
            .map(|i| (i as f32 * 0.001).sin())
            .collect();

        group.throughput(Throughput::Elements(*buffer_size as u64 * 2));
        group.bench_function(format!("process_{}_frames", buffer_size), |b| {
            b.iter(|| {
                processor.process(black_box(&mut buffer));
            })
        });
        drop(engine);
    }

    group.finish();
}

fn benchmark_settings_pickup(c: &mut Criterion) {
    let (engine, mut processor) = Equalizer::new(EngineConfig::default()).unwrap();
    processor.prepare(StreamConfig::default()).unwrap();
    let mut buffer = vec![0.0_f32; 512 * 2];
    let mut gain = 0.0_f32;

    c.bench_function("publish_and_process_512", |b| {
        b.iter(|| {
            // Simulate a slider drag: one publish per audio block
            let mut settings = FilterSettings::default();
            settings.peaks[0] = BandSettings::new(250.0).with_gain(gain);
            engine.publish(black_box(settings)).unwrap();
            processor.process(black_box(&mut buffer));
            gain = (gain + 1.0) % 24.0;
        })
    });
}

fn benchmark_analysis_tick(c: &mut Criterion) {
    let (mut engine, mut processor) = Equalizer::new(EngineConfig::default()).unwrap();
    processor.prepare(StreamConfig::default()).unwrap();
    let mut buffer: Vec<f32> = (0..512 * 2).map(|i| (i as f32 * 0.01).sin()).collect();

    c.bench_function("analysis_tick_with_response", |b| {
        b.iter(|| {
            processor.process(black_box(&mut buffer));
            engine.refresh_response().unwrap();
            black_box(engine.analyze_now().unwrap());
        })
    });
}

criterion_group!(
    benches,
    benchmark_processor,
    benchmark_settings_pickup,
    benchmark_analysis_tick
);
criterion_main!(benches);
