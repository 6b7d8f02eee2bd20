//! Readers racing a writer never observe a partially written index.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use docschat_rag::document::Chunk;
use docschat_rag::index::{EmbeddingIndex, index_file};
use docschat_rag::mock::HashingEmbedder;
use docschat_rag::RagError;

const DIM: usize = 16;

fn index_with(entries: usize, tag: &str) -> EmbeddingIndex {
    let mut index = EmbeddingIndex::new("hashing-bow", DIM);
    for i in 0..entries {
        let chunk = Chunk {
            content: format!("{tag} chunk {i} {}", "padding ".repeat(20)),
            source_document: format!("{tag}.txt"),
            position: i,
        };
        let vector = (0..DIM).map(|d| ((i + d) % 7) as f32 + 1.0).collect();
        index.insert(&chunk, vector).unwrap();
    }
    index
}

#[test]
fn concurrent_loads_see_old_or_new_index_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();
    let small = index_with(5, "old");
    let large = index_with(400, "new");
    small.persist(&path).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let path = path.clone();
            let done = done.clone();
            let (small, large) = (small.clone(), large.clone());
            thread::spawn(move || {
                let embedder = HashingEmbedder::new(DIM);
                let mut loads = 0usize;
                loop {
                    let loaded = EmbeddingIndex::load(&path, &embedder).unwrap();
                    assert!(loaded == small || loaded == large, "observed a mixed index");
                    loads += 1;
                    if done.load(Ordering::SeqCst) {
                        return loads;
                    }
                }
            })
        })
        .collect();

    for round in 0..50 {
        let next = if round % 2 == 0 { &large } else { &small };
        next.persist(&path).unwrap();
    }
    done.store(true, Ordering::SeqCst);

    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    let names: Vec<_> = std::fs::read_dir(&path)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(names, ["index.json"]);
}

#[test]
fn truncated_index_file_is_corrupt_not_silently_short() {
    let dir = tempfile::tempdir().unwrap();
    index_with(10, "doc").persist(dir.path()).unwrap();
    let file = index_file(dir.path());
    let bytes = std::fs::read(&file).unwrap();
    std::fs::write(&file, &bytes[..bytes.len() / 2]).unwrap();

    let err = EmbeddingIndex::load(dir.path(), &HashingEmbedder::new(DIM)).unwrap_err();
    assert!(matches!(err, RagError::IndexCorrupt { .. }));
}

#[test]
fn interrupted_write_leaves_previous_index_readable() {
    let dir = tempfile::tempdir().unwrap();
    let original = index_with(3, "old");
    original.persist(dir.path()).unwrap();

    // A writer that died mid-way leaves only its temporary file behind.
    std::fs::write(dir.path().join(".index-crashed.tmp"), b"{\"format_version\":1,\"entr").unwrap();

    let loaded = EmbeddingIndex::load(dir.path(), &HashingEmbedder::new(DIM)).unwrap();
    assert_eq!(loaded, original);
}
