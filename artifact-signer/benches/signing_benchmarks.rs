//! Signing and verification benchmarks
//!
//! - Ed25519 key generation
//! - Raw sign / verify
//! - Signature encoding
//! - Service-level sign_data / verify_signature
//! - Payload size impact

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use artifact_signer::{
    ArtifactSignature, ArtifactSigningKey, InMemoryKeyManager, ServiceContext,
    SignatureConfig, SignatureFormat, Signer, Verifier, VerifyOptions,
};

fn bench_key_generation(c: &mut Criterion) {
    c.bench_function("ed25519_key_generation", |b| {
        b.iter(|| black_box(ArtifactSigningKey::generate()))
    });
}

fn bench_raw_sign_verify(c: &mut Criterion) {
    let key = ArtifactSigningKey::generate();
    let vk = key.verifying_key();
    let message = b"release-2024.06.tar.gz sha256=...";
    let signature = key.sign(message);

    c.bench_function("ed25519_sign", |b| {
        b.iter(|| black_box(key.sign(black_box(message))))
    });
    c.bench_function("ed25519_verify", |b| {
        b.iter(|| black_box(vk.verify(black_box(message), black_box(&signature))))
    });
}

fn bench_encoding(c: &mut Criterion) {
    let key = ArtifactSigningKey::generate();
    let signature = key.sign(b"payload");

    let mut group = c.benchmark_group("signature_encoding");
    for format in [SignatureFormat::Base64, SignatureFormat::Hex] {
        let encoded = signature.encode(format);
        group.bench_with_input(
            BenchmarkId::new("decode", format.as_str()),
            &encoded,
            |b, encoded| b.iter(|| black_box(ArtifactSignature::decode(encoded, format))),
        );
    }
    group.finish();
}

fn bench_service_round_trip(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::TempDir::new().unwrap();
    let keys = Arc::new(InMemoryKeyManager::new());
    let public_key = runtime
        .block_on(keys.generate_key("bench", None))
        .unwrap();
    let ctx = ServiceContext::new(SignatureConfig::fast(dir.path()), keys.clone());
    let signer = Signer::new(ctx.clone());
    let verifier = Verifier::new(ctx);
    let options = VerifyOptions::default().without_trust();

    let payload = vec![0x5au8; 4096];
    let record = runtime
        .block_on(signer.sign_data(&payload, None, None))
        .unwrap();

    c.bench_function("service_sign_data_4k", |b| {
        b.to_async(&runtime)
            .iter(|| async { black_box(signer.sign_data(&payload, None, None).await) })
    });
    c.bench_function("service_verify_signature_4k", |b| {
        b.to_async(&runtime).iter(|| async {
            black_box(
                verifier
                    .verify_signature(&payload, &record.signature, &public_key, &options)
                    .await,
            )
        })
    });
}

fn bench_payload_size(c: &mut Criterion) {
    let key = ArtifactSigningKey::generate();

    let mut group = c.benchmark_group("payload_size_impact");
    for size in [64usize, 4 * 1024, 256 * 1024, 4 * 1024 * 1024] {
        let payload = vec![0u8; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| black_box(key.sign(black_box(payload))))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_key_generation,
    bench_raw_sign_verify,
    bench_encoding,
    bench_service_round_trip,
    bench_payload_size,
);

criterion_main!(benches);
