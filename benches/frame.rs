use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wsnet::frame::codec::FrameCodec;
use wsnet::frame::Frame;

fn benchmark_encode(c: &mut Criterion) {
    let codec = FrameCodec::client();
    let small = Frame::binary(vec![0xAA; 125]);
    let large = Frame::binary(vec![0xAA; 64 * 1024]);

    c.bench_function("encode_masked_125b", |b| {
        b.iter(|| codec.encode(black_box(&small)).unwrap())
    });
    c.bench_function("encode_masked_64k", |b| {
        b.iter(|| codec.encode(black_box(&large)).unwrap())
    });
}

fn benchmark_decode(c: &mut Criterion) {
    // Server-to-client direction: unmasked payload, no XOR pass.
    let unmasked = FrameCodec::server()
        .encode(&Frame::binary(vec![0xAA; 64 * 1024]))
        .unwrap();
    let client = FrameCodec::client();
    c.bench_function("decode_unmasked_64k", |b| {
        b.iter(|| client.decode(black_box(&unmasked)).unwrap().unwrap())
    });

    // Client-to-server direction: the rotating XOR unmask is the hot path.
    let masked = FrameCodec::client()
        .encode(&Frame::binary(vec![0xAA; 64 * 1024]))
        .unwrap();
    let server = FrameCodec::server();
    c.bench_function("decode_masked_64k", |b| {
        b.iter(|| server.decode(black_box(&masked)).unwrap().unwrap())
    });
}

criterion_group!(benches, benchmark_encode, benchmark_decode);
criterion_main!(benches);
