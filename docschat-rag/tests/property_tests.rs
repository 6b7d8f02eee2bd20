//! Property tests for chunking bounds, search ordering and persistence.

use docschat_rag::document::{Chunk, Document};
use docschat_rag::index::EmbeddingIndex;
use docschat_rag::{Chunker, RecursiveChunker};
use proptest::prelude::*;

/// Generate a non-zero embedding of the given dimension.
fn arb_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter(
        "non-zero embedding",
        |v| v.iter().map(|x| x * x).sum::<f32>().sqrt() > 1e-4,
    )
}

fn chunk(i: usize) -> Chunk {
    Chunk { content: format!("chunk {i}"), source_document: "doc.txt".to_string(), position: i }
}

fn index_from(vectors: &[Vec<f32>], dim: usize) -> EmbeddingIndex {
    let mut index = EmbeddingIndex::new("prop-model", dim);
    for (i, vector) in vectors.iter().enumerate() {
        index.insert(&chunk(i), vector.clone()).unwrap();
    }
    index
}

/// Every chunk fits the size bound, contains no tab and is non-empty,
/// and positions count up from zero.
mod prop_chunk_bounds {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_respect_size_and_contain_no_tabs(
            text in "[a-zé \t\n.?!]{0,400}",
            size in 1usize..120,
            overlap_ratio in 0.0f64..1.0,
        ) {
            let overlap = ((size as f64) * overlap_ratio) as usize % size;
            let chunker = RecursiveChunker::new(size, overlap).unwrap();
            let chunks = chunker.chunk(&Document::new("p.txt", text.as_str()));

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert!(chunk.content.chars().count() <= size);
                prop_assert!(!chunk.content.contains('\t'));
                prop_assert!(!chunk.content.trim().is_empty());
                prop_assert_eq!(chunk.position, i);
                prop_assert_eq!(chunk.source_document.as_str(), "p.txt");
            }
            if text.trim().is_empty() {
                prop_assert!(chunks.is_empty());
            }
        }

        #[test]
        fn chunks_cover_every_word(
            words in proptest::collection::vec("[a-z]{1,8}", 1..60),
            size in 10usize..80,
        ) {
            let text = words.join(" ");
            let chunker = RecursiveChunker::new(size, size / 4).unwrap();
            let chunks = chunker.split_text(&text);
            let joined = chunks.join(" ");
            for word in &words {
                prop_assert!(joined.contains(word.as_str()));
            }
        }
    }
}

/// Consecutive chunks share at most `chunk_overlap` characters, and share
/// something whenever the pieces at the split level fit inside the overlap.
mod prop_chunk_overlap {
    use super::*;

    /// Length in characters of the longest token run that ends `left` and starts `right`.
    fn shared_chars(left: &str, right: &str) -> usize {
        let left: Vec<&str> = left.split_whitespace().collect();
        let right: Vec<&str> = right.split_whitespace().collect();
        (1..=left.len().min(right.len()))
            .rev()
            .find(|&n| left[left.len() - n..] == right[..n])
            .map(|n| right[..n].join(" ").chars().count())
            .unwrap_or(0)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn consecutive_chunks_overlap_within_bound(
            lengths in proptest::collection::vec(1usize..=6, 1..120),
            size in 30usize..120,
            overlap_ratio in 0.0f64..1.0,
        ) {
            // Unique tokens of at most 9 chars, so word pieces are at most 10.
            let words: Vec<String> = lengths
                .iter()
                .enumerate()
                .map(|(i, &len)| format!("{i:03}{}", "q".repeat(len)))
                .collect();
            let text = words.join(" ");
            let overlap = 10 + ((size - 20) as f64 * overlap_ratio) as usize;
            let chunker = RecursiveChunker::new(size, overlap).unwrap();
            let chunks = chunker.split_text(&text);

            for pair in chunks.windows(2) {
                let shared = shared_chars(&pair[0], &pair[1]);
                prop_assert!(shared <= overlap, "{} shared chars > {}", shared, overlap);
                prop_assert!(shared > 0, "no overlap between {:?} and {:?}", pair[0], pair[1]);
            }
        }

        #[test]
        fn zero_overlap_shares_nothing(
            lengths in proptest::collection::vec(1usize..=6, 1..120),
            size in 10usize..120,
        ) {
            let words: Vec<String> = lengths
                .iter()
                .enumerate()
                .map(|(i, &len)| format!("{i:03}{}", "q".repeat(len)))
                .collect();
            let chunks = RecursiveChunker::new(size, 0).unwrap().split_text(&words.join(" "));
            for pair in chunks.windows(2) {
                prop_assert_eq!(shared_chars(&pair[0], &pair[1]), 0);
            }
        }
    }
}

/// Search returns at most k results, sorted by descending score, with ties
/// in insertion order.
mod prop_search_ordering {
    use super::*;

    const DIM: usize = 8;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_k(
            vectors in proptest::collection::vec(arb_embedding(DIM), 0..30),
            query in arb_embedding(DIM),
            k in 1usize..40,
        ) {
            let index = index_from(&vectors, DIM);
            let result = index.search(&query, k).unwrap();

            prop_assert_eq!(result.len(), k.min(vectors.len()));
            for pair in result.hits.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
                if pair[0].score == pair[1].score {
                    prop_assert!(pair[0].chunk.position < pair[1].chunk.position);
                }
            }
            for hit in &result.hits {
                prop_assert!(hit.score <= 1.0 + 1e-4 && hit.score >= -1.0 - 1e-4);
            }
        }

        #[test]
        fn duplicate_vectors_keep_insertion_order(
            vector in arb_embedding(DIM),
            copies in 2usize..10,
        ) {
            let vectors = vec![vector.clone(); copies];
            let index = index_from(&vectors, DIM);
            let result = index.search(&vector, copies).unwrap();
            let positions: Vec<usize> = result.hits.iter().map(|h| h.chunk.position).collect();
            prop_assert_eq!(positions, (0..copies).collect::<Vec<_>>());
        }
    }
}

/// `load(persist(index))` is search-equivalent to the in-memory index.
mod prop_persistence_round_trip {
    use super::*;
    use docschat_rag::mock::HashingEmbedder;

    const DIM: usize = 12;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(40))]

        #[test]
        fn persisted_index_searches_identically(
            vectors in proptest::collection::vec(arb_embedding(DIM), 0..15),
            query in arb_embedding(DIM),
            k in 1usize..20,
        ) {
            let dir = tempfile::tempdir().unwrap();
            let mut index = EmbeddingIndex::new("hashing-bow", DIM);
            for (i, vector) in vectors.iter().enumerate() {
                index.insert(&chunk(i), vector.clone()).unwrap();
            }
            index.persist(dir.path()).unwrap();

            let loaded = EmbeddingIndex::load(dir.path(), &HashingEmbedder::new(DIM)).unwrap();
            let before = index.search(&query, k).unwrap();
            let after = loaded.search(&query, k).unwrap();

            prop_assert_eq!(before.len(), after.len());
            for (a, b) in before.hits.iter().zip(&after.hits) {
                prop_assert_eq!(&a.chunk, &b.chunk);
                prop_assert!((a.score - b.score).abs() < 1e-5);
            }
        }
    }
}
