//! Chunking behaviour across whole pages

use thesis_qa::config::ChunkingConfig;
use thesis_qa::text::{PageText, TextChunker};

fn pages() -> Vec<PageText> {
    let paragraphs = [
        "Chapter 2. Methods",
        "Water samples were collected weekly from the harbour station between March and October. \
         Each sample was filtered, stained and imaged under the microscope. Particle counts were \
         recorded together with temperature and salinity.",
        "Short note.",
        "Zooplankton were classified into copepods, cladocerans and rotifers. The classifier was \
         trained on manually annotated images and validated against a held-out set from the \
         following year. Misclassified images were reviewed by two annotators.",
    ];

    vec![
        PageText {
            source: "thesis.pdf".to_string(),
            page: 1,
            text: paragraphs.join("\n\n"),
        },
        PageText {
            source: "thesis.pdf".to_string(),
            page: 2,
            text: paragraphs[1..].join("\n"),
        },
    ]
}

fn chunker() -> TextChunker {
    TextChunker::new(ChunkingConfig {
        chunk_size: 180,
        overlap: 40,
        min_content_length: 30,
    })
    .unwrap()
}

#[test]
fn test_chunking_is_deterministic() {
    let chunker = chunker();
    let first = chunker.chunk_pages(&pages());
    let second = chunker.chunk_pages(&pages());
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn test_every_chunk_exceeds_minimum_length() {
    let chunks = chunker().chunk_pages(&pages());
    for chunk in &chunks {
        assert!(
            chunk.text.trim().chars().count() > 30,
            "chunk too short: {:?}",
            chunk.text
        );
    }
    assert!(chunks.iter().all(|c| c.text != "Short note."));
}

#[test]
fn test_chunks_follow_page_order() {
    let chunks = chunker().chunk_pages(&pages());
    let pages: Vec<u32> = chunks.iter().map(|c| c.page).collect();
    let mut sorted = pages.clone();
    sorted.sort();
    assert_eq!(pages, sorted);
    assert!(pages.contains(&1) && pages.contains(&2));

    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.id, i);
    }
}

#[test]
fn test_adjacent_chunks_overlap() {
    let chunker = TextChunker::new(ChunkingConfig {
        chunk_size: 100,
        overlap: 30,
        min_content_length: 0,
    })
    .unwrap();

    let text = (0..200)
        .map(|i| format!("word{:03}", i))
        .collect::<Vec<_>>()
        .join(" ");
    let splits = chunker.split_text(&text);
    assert!(splits.len() > 2);

    // Each piece is a word plus its leading space
    let word_len = "word000 ".len();
    for pair in splits.windows(2) {
        let first_of_next = pair[1].split_whitespace().next().unwrap();
        let tail: Vec<&str> = pair[0].split_whitespace().rev().take(4).collect();
        assert!(
            tail.contains(&first_of_next),
            "{:?} does not start inside the tail of {:?}",
            pair[1],
            pair[0]
        );

        let shared = shared_span(&pair[0], &pair[1]);
        assert!(
            shared >= 30 - word_len && shared <= 30,
            "shared span of {} chars between {:?} and {:?}",
            shared,
            pair[0],
            pair[1]
        );
    }
}

/// Length of the longest suffix of `earlier` that is also a prefix of `later`
fn shared_span(earlier: &str, later: &str) -> usize {
    (1..=earlier.len().min(later.len()))
        .rev()
        .find(|&len| later.is_char_boundary(len) && earlier.ends_with(&later[..len]))
        .unwrap_or(0)
}

#[test]
fn test_chunks_never_exceed_size_for_wordy_text() {
    let chunker = chunker();
    for chunk in chunker.chunk_pages(&pages()) {
        assert!(chunk.char_len() <= 180, "chunk of {} chars", chunk.char_len());
    }
}
