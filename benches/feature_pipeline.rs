use camlink::codec::{FrameDecoder, FrameEncoder, JpegCodec};
use camlink::displacement::{extract_features, EstimatorConfig};
use camlink::edge::block_texture;
use camlink::DisplacementEstimator;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{imageops, DynamicImage};

fn benchmark_extract_features(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_features");
    let config = EstimatorConfig::default();

    // Typical camera resolutions
    for (width, height) in [(320, 240), (640, 480), (1280, 720)] {
        let image = block_texture(width, height, 8, 1);

        group.bench_with_input(
            BenchmarkId::new("resolution", format!("{}x{}", width, height)),
            &image,
            |b, image| {
                b.iter(|| extract_features(black_box(image), &config));
            },
        );
    }

    group.finish();
}

fn benchmark_measure(c: &mut Criterion) {
    let texture = block_texture(680, 520, 8, 2);
    let reference = imageops::crop_imm(&texture, 20, 20, 640, 480).to_image();
    let target = imageops::crop_imm(&texture, 32, 12, 640, 480).to_image();
    let estimator = DisplacementEstimator::default();

    c.bench_function("measure_640x480", |b| {
        b.iter(|| estimator.measure(black_box(&reference), black_box(&target)));
    });
}

fn benchmark_jpeg_decode(c: &mut Criterion) {
    let codec = JpegCodec::default();
    let payload = codec
        .encode(&DynamicImage::ImageLuma8(block_texture(640, 480, 8, 3)))
        .unwrap();

    c.bench_function("decode_jpeg_640x480", |b| {
        b.iter(|| codec.decode(black_box(&payload)));
    });
}

criterion_group!(
    benches,
    benchmark_extract_features,
    benchmark_measure,
    benchmark_jpeg_decode
);
criterion_main!(benches);
