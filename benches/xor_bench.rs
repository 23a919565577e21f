use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::io::Cursor;
use xp3arc::crypto::{apply_keystream, apply_keystream_scalar, PROFILE_NEKO_VOL0, PROFILE_NONE};
use xp3arc::Xp3Writer;

fn bench_keystream(c: &mut Criterion) {
    let mut data = vec![0x5Au8; 1024 * 1024];
    let checksum = 0xDEAD_BEEF;

    c.bench_function("keystream_1mb_vectorized", |b| {
        b.iter(|| apply_keystream(black_box(&mut data), checksum, &PROFILE_NEKO_VOL0))
    });
    c.bench_function("keystream_1mb_scalar", |b| {
        b.iter(|| apply_keystream_scalar(black_box(&mut data), checksum, &PROFILE_NEKO_VOL0))
    });
}

fn bench_pack_single_file(c: &mut Criterion) {
    let data = vec![42u8; 1024 * 1024];

    c.bench_function("pack_1mb_plain", |b| {
        b.iter(|| {
            let mut writer = Xp3Writer::new(Cursor::new(Vec::new())).unwrap();
            writer.add("bench.bin", black_box(&data), &PROFILE_NONE, 0).unwrap();
            writer.finalize().unwrap();
        })
    });

    c.bench_function("pack_1mb_encrypted", |b| {
        b.iter(|| {
            let mut writer = Xp3Writer::new(Cursor::new(Vec::new())).unwrap();
            writer.add("bench.bin", black_box(&data), &PROFILE_NEKO_VOL0, 0).unwrap();
            writer.finalize().unwrap();
        })
    });
}

criterion_group!(benches, bench_keystream, bench_pack_single_file);
criterion_main!(benches);
