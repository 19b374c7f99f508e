#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use viewkit::{
    metadata::{FieldMetadata, FieldType, MetadataCache, SchemaDescriber},
    plugin::PluginRegistry,
    query::InMemoryBackend,
    types::{HandlerType, Row, Value},
    view::{Display, HandlerConfig, View},
    Engine, RequestContext, ViewStatus,
};

const NUM_THREADS: usize = 8;
const READS_PER_THREAD: usize = 200;

/// Describes `articles` with one column per schema version; the version is
/// bumped from outside to simulate schema changes.
struct VersionedSchema {
    version: Arc<AtomicUsize>,
    builds: Arc<AtomicUsize>,
}

impl SchemaDescriber for VersionedSchema {
    fn tables(&self) -> Vec<String> {
        vec!["articles".into()]
    }

    fn describe_table(&self, _name: &str) -> Vec<FieldMetadata> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let columns = self.version.load(Ordering::SeqCst);
        (0..columns)
            .map(|i| {
                let name = if i == 0 { "id".to_owned() } else { format!("c{i}") };
                FieldMetadata::new("articles", name, FieldType::Integer)
            })
            .collect()
    }
}

fn versioned(columns: usize) -> (MetadataCache, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let version = Arc::new(AtomicUsize::new(columns));
    let builds = Arc::new(AtomicUsize::new(0));
    let cache = MetadataCache::with_describer(VersionedSchema {
        version: Arc::clone(&version),
        builds: Arc::clone(&builds),
    });
    (cache, version, builds)
}

#[test]
fn concurrent_readers_share_one_snapshot() {
    let (cache, _version, builds) = versioned(3);
    let cache = Arc::new(cache);
    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..READS_PER_THREAD)
                    .map(|_| cache.snapshot().field_count())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        let counts = handle.join().expect("reader");
        assert!(counts.iter().all(|&count| count == 3));
    }
    assert!(cache.is_populated());
    // Racing first readers may each build once; steady-state reads never do.
    assert!(builds.load(Ordering::SeqCst) <= NUM_THREADS);
}

#[test]
fn readers_never_observe_a_partial_snapshot_across_invalidations() {
    let (cache, version, _builds) = versioned(2);
    let cache = Arc::new(cache);
    let barrier = Arc::new(Barrier::new(NUM_THREADS + 1));

    let readers: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..READS_PER_THREAD {
                    let snapshot = cache.snapshot();
                    let table = snapshot.table("articles").expect("articles");
                    let count = table.fields().len();
                    assert!(count == 2 || count == 5, "partial snapshot: {count} fields");
                    assert_eq!(snapshot.field_count(), count);
                }
            })
        })
        .collect();

    let writer = {
        let cache = Arc::clone(&cache);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for round in 0..50 {
                version.store(if round % 2 == 0 { 5 } else { 2 }, Ordering::SeqCst);
                cache.invalidate();
                thread::yield_now();
            }
            version.store(5, Ordering::SeqCst);
            cache.invalidate();
        })
    };

    for reader in readers {
        reader.join().expect("reader");
    }
    writer.join().expect("writer");

    assert_eq!(cache.snapshot().field_count(), 5);
}

#[test]
fn snapshots_held_across_invalidate_stay_intact() {
    let (cache, version, _builds) = versioned(2);
    let before = cache.snapshot();

    version.store(4, Ordering::SeqCst);
    cache.invalidate();
    let after = cache.snapshot();

    assert_eq!(before.field_count(), 2);
    assert_eq!(after.field_count(), 4);
    assert!(after.epoch() > before.epoch());
    assert!(after.field("articles", "c3").is_some());
    assert!(before.field("articles", "c3").is_none());
}

#[test]
fn engines_execute_in_parallel_while_metadata_is_invalidated() {
    let (cache, _version, _builds) = versioned(1);
    let metadata = Arc::new(cache);
    let rows: Vec<Row> = (1..=20)
        .map(|id| {
            let mut row = Row::new();
            row.insert("id".into(), Value::Int(id));
            row
        })
        .collect();
    let backend = Arc::new(InMemoryBackend::new().with_table("articles", rows));
    let engine = Engine::new(
        Arc::new(PluginRegistry::with_builtins()),
        Arc::clone(&metadata),
        backend,
    );
    let view = Arc::new(
        View::new("articles", "articles").with_display(
            Display::new("page_1", "page")
                .with_option("path", "articles")
                .with_handler(HandlerConfig::new(HandlerType::Argument, "numeric", "articles.id"))
                .with_handler(HandlerConfig::new(HandlerType::Field, "standard", "articles.id")),
        ),
    );
    let barrier = Arc::new(Barrier::new(NUM_THREADS + 1));

    let workers: Vec<_> = (0..NUM_THREADS)
        .map(|thread_id| {
            let engine = engine.clone();
            let view = Arc::clone(&view);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..25 {
                    let id = (thread_id * 25 + i) % 20 + 1;
                    let ctx = RequestContext::from_path(&format!("articles/{id}"));
                    let rendered = engine.run(&view, "page_1", &ctx).expect("run");
                    assert_eq!(rendered.status, ViewStatus::Ok);
                    assert_eq!(rendered.rows, 1);
                }
            })
        })
        .collect();

    barrier.wait();
    for _ in 0..20 {
        metadata.invalidate();
        thread::yield_now();
    }

    for worker in workers {
        worker.join().expect("worker");
    }
}
