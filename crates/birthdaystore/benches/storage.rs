use birthdaystore::{Birthday, BirthdayStore, Name};
use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::TempDir;

fn birthday(day: u32) -> Birthday {
    Birthday::new(NaiveDate::from_ymd_opt(2000, 1, 1 + day % 28).unwrap())
}

fn bench_upsert(c: &mut Criterion) {
    let mut group = c.benchmark_group("upsert");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("upsert_changing", |b| {
        let dir = TempDir::new().unwrap();
        let store = BirthdayStore::open(dir.path()).unwrap();
        let name = Name::from("lewis");

        let mut counter = 0u32;
        b.iter(|| {
            // Alternate dates so every upsert appends a record
            store.upsert(&name, birthday(counter % 2)).unwrap();
            counter += 1;
        });
    });
    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("lookup_hit", |b| {
        let dir = TempDir::new().unwrap();
        let store = BirthdayStore::open(dir.path()).unwrap();

        // Pre-populate with 100 names
        for i in 0..100 {
            store.upsert(&Name::new(format!("name{}", i)), birthday(i)).unwrap();
        }

        let name = Name::from("Name50");
        b.iter(|| {
            black_box(store.lookup(&name).unwrap());
        });
    });
    group.finish();
}

fn bench_reopen(c: &mut Criterion) {
    let mut group = c.benchmark_group("open");
    group.sample_size(20);

    group.bench_function("replay_10k_records", |b| {
        let dir = TempDir::new().unwrap();
        {
            let store = BirthdayStore::open(dir.path()).unwrap();
            for i in 0..10_000 {
                store.upsert(&Name::new(format!("name{}", i % 500)), birthday(i)).unwrap();
            }
        }

        b.iter(|| {
            black_box(BirthdayStore::open(dir.path()).unwrap());
        });
    });
    group.finish();
}

criterion_group!(benches, bench_upsert, bench_lookup, bench_reopen);
criterion_main!(benches);
