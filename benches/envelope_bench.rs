//! Envelope and open throughput.
//!
//! Run with: cargo bench -p cmsenv-cms

use std::sync::Arc;

use cmsenv_cms::{CmsEngine, DecryptionKey, EngineConfig, RecipientSpec};
use cmsenv_crypto::DefaultProvider;
use cmsenv_types::ContentEncryptionAlg;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn engine() -> CmsEngine {
    let config = EngineConfig::builder()
        .pbkdf2_iterations(1000)
        .build()
        .expect("valid config");
    CmsEngine::with_config(Arc::new(DefaultProvider::new()), config)
}

fn bench_content(c: &mut Criterion) {
    let e = engine();
    let spec = [RecipientSpec::kek(b"bench", &[0x42u8; 32])];
    let key = [DecryptionKey::kek(b"bench", &[0x42u8; 32])];

    let mut group = c.benchmark_group("envelope_kek");
    for size in [64usize, 1024, 16 * 1024, 256 * 1024] {
        let payload = vec![0xA5u8; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("aes256_cbc", size), &payload, |b, p| {
            b.iter(|| e.envelope(p, ContentEncryptionAlg::Aes256Cbc, &spec, None).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("aes256_gcm", size), &payload, |b, p| {
            b.iter(|| {
                e.envelope_auth(p, ContentEncryptionAlg::Aes256Gcm, &spec, None, None)
                    .unwrap()
            });
        });

        let der = e
            .envelope(&payload, ContentEncryptionAlg::Aes256Cbc, &spec, None)
            .unwrap();
        group.bench_with_input(BenchmarkId::new("open_aes256_cbc", size), &der, |b, d| {
            b.iter(|| e.open(d, &key).unwrap());
        });
    }
    group.finish();
}

fn bench_recipients(c: &mut Criterion) {
    let e = engine();
    let payload = vec![0u8; 1024];
    let mut group = c.benchmark_group("recipients");

    for count in [1usize, 4, 16] {
        let specs: Vec<RecipientSpec> = (0..count)
            .map(|i| RecipientSpec::kek(&[i as u8], &[i as u8; 16]))
            .collect();
        group.bench_with_input(BenchmarkId::new("kek", count), &specs, |b, s| {
            b.iter(|| e.envelope(&payload, ContentEncryptionAlg::Aes128Cbc, s, None).unwrap());
        });
    }

    let pw = [RecipientSpec::password(b"benchmark password")];
    group.bench_function("password_pbkdf2_1000", |b| {
        b.iter(|| e.envelope(&payload, ContentEncryptionAlg::Aes128Cbc, &pw, None).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_content, bench_recipients);
criterion_main!(benches);
