use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use bson::oid::ObjectId;
use bson::{Document, doc};
use docrepo_core::FormatTranslator;
use docrepo_infra::entities::{self, User};
use docrepo_infra::{InMemoryDocumentStore, RepositoryConfig, Repositories};
use std::sync::Arc;

/// A stored project with `width` populated members, each carrying nested
/// sub-documents, as `get_by_id` would see it before translation.
fn nested_document(width: usize) -> Document {
    let members: Vec<Document> = (0..width)
        .map(|i| {
            doc! {
                "_id": ObjectId::new(),
                "__v": 0,
                "email": format!("user{i}@example.com"),
                "prefs": { "__v": 1, "tags": [ { "__v": 2, "t": "x" } ] },
            }
        })
        .collect();
    doc! {
        "_id": ObjectId::new(),
        "__v": 3,
        "name": "bench",
        "account": { "_id": ObjectId::new(), "__v": 0, "name": "acme" },
        "members": members,
    }
}

fn bench_translation(c: &mut Criterion) {
    let translator = FormatTranslator::default();
    let mut group = c.benchmark_group("translate");

    for width in [1usize, 16, 128] {
        let raw = nested_document(width);
        let domain = translator.to_domain(&raw).unwrap();
        group.throughput(Throughput::Elements(width as u64));

        group.bench_with_input(BenchmarkId::new("to_domain", width), &raw, |b, raw| {
            b.iter(|| translator.to_domain(black_box(raw)).unwrap())
        });
        group.bench_with_input(BenchmarkId::new("to_storage", width), &domain, |b, domain| {
            b.iter(|| translator.to_storage(black_box(domain)).unwrap())
        });
    }
    group.finish();
}

fn bench_paged_query(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let repos = Repositories::new(
        entities::registry().unwrap(),
        Arc::new(InMemoryDocumentStore::new()),
        RepositoryConfig::default(),
    )
    .unwrap();
    let users = repos.repository::<User>().unwrap();

    runtime.block_on(async {
        for i in 0..1_000 {
            users
                .create(doc! { "email": format!("user{i}@example.com") })
                .await
                .unwrap();
        }
    });

    let mut group = c.benchmark_group("query");
    for page in [0u64, 50, 99] {
        group.bench_with_input(BenchmarkId::new("in_memory_page", page), &page, |b, &page| {
            b.iter(|| {
                runtime
                    .block_on(users.query(doc! {}, black_box(page), 10))
                    .unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_translation, bench_paged_query);
criterion_main!(benches);
