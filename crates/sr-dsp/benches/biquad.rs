use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sr_dsp::biquad::{BiquadCoeffs, BiquadTdf2};

fn bench_biquad_block(c: &mut Criterion) {
    let coeffs = BiquadCoeffs::peaking(1000.0, 1.0, 6.0, 48000.0);
    let mut filter = BiquadTdf2::with_coeffs(coeffs);
    let mut block = vec![0.0f64; 1152];
    for (i, s) in block.iter_mut().enumerate() {
        *s = (i as f64 * 0.01).sin();
    }

    c.bench_function("biquad_process_block_1152", |b| {
        b.iter(|| {
            filter.process_block(black_box(&mut block));
        })
    });
}

criterion_group!(benches, bench_biquad_block);
criterion_main!(benches);
