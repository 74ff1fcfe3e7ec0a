// braidstream benchmarks using criterion.
//
// Measures:
//   - Header encode / decode throughput
//   - Data write + dispatch round trips over the in-memory transport
//   - Ping round-trip dispatch

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use braidstream::frame::{Flags, FrameType, Header};
use braidstream::transport::mem::MemoryTransport;
use braidstream::{Config, Session, Stream};

// ---------------------------------------------------------------------------
// Header codec
// ---------------------------------------------------------------------------

fn bench_header_codec(c: &mut Criterion) {
    let header = Header::new(FrameType::Data, Flags::NONE, 1, 16384);

    c.bench_function("header_encode", |b| {
        b.iter(|| black_box(black_box(&header).encode()));
    });

    let bytes = header.encode();
    c.bench_function("header_decode", |b| {
        b.iter(|| black_box(Header::decode(black_box(&bytes)).unwrap()));
    });
}

// ---------------------------------------------------------------------------
// Data round trips
// ---------------------------------------------------------------------------

fn established_pair() -> (Session, Session, Stream, Stream) {
    let (cio, sio) = MemoryTransport::pair();
    let client = Session::client(cio, Config::default());
    let server = Session::server(sio, Config::default());
    let stream = client.open_stream().unwrap();
    server.process().unwrap();
    client.process().unwrap();
    let peer = server.accept_stream().unwrap().unwrap();
    (client, server, stream, peer)
}

fn bench_data_round_trip(c: &mut Criterion) {
    let sizes: &[usize] = &[64, 1024, 16 * 1024];

    let mut group = c.benchmark_group("data_round_trip");
    for &size in sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}B")),
            &size,
            |b, &size| {
                let (client, server, stream, peer) = established_pair();
                let payload = vec![0xABu8; size];
                let mut out = vec![0u8; size];
                b.iter(|| {
                    stream.write(&payload).unwrap();
                    server.process().unwrap();
                    let n = peer.read(&mut out).unwrap();
                    // Consume the credit grant so the window stays balanced.
                    client.process().unwrap();
                    black_box(n);
                });
            },
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Ping dispatch
// ---------------------------------------------------------------------------

fn bench_ping_round_trip(c: &mut Criterion) {
    let (cio, sio) = MemoryTransport::pair();
    let client = Session::client(cio, Config::default());
    let server = Session::server(sio, Config::default());

    c.bench_function("ping_round_trip", |b| {
        b.iter(|| {
            client.ping().unwrap();
            server.process().unwrap();
            client.process().unwrap();
        });
    });
}

// ---------------------------------------------------------------------------
// Criterion harness
// ---------------------------------------------------------------------------

criterion_group! {
    name = mux_benches;
    config = Criterion::default()
        .sample_size(100)
        .measurement_time(Duration::from_secs(5));
    targets =
        bench_header_codec,
        bench_data_round_trip,
        bench_ping_round_trip
}

criterion_main!(mux_benches);
