//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use thesis_qa::ml::embedding::{Embedder, Embedding, EmbeddingBackend, HashingEmbedder};
use thesis_qa::{Config, Generator, Result};

/// Write a PDF with one text line per page
pub fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 10.into()]),
                Operation::new("Td", vec![40.into(), 780.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// Offline configuration rooted in a scratch directory
pub fn test_config(root: &TempDir) -> Config {
    let mut config = Config::default();
    config.paths.documents_dir = root.path().join("data");
    config.paths.index_dir = root.path().join("vector_db");
    config.paths.prompt_template = root.path().join("qa_prompt.txt");
    config.embedding.backend = EmbeddingBackend::Hashing;
    config.embedding.dimension = 128;
    config.embedding.query_cache_size = 0;
    config.chunking.chunk_size = 300;
    config.chunking.overlap = 60;
    config.chunking.min_content_length = 40;
    config.llm.api_key_env = "THESIS_QA_TEST_KEY_NEVER_SET".to_string();
    config.llm.secrets_file = None;
    config
}

/// Hashing embedder that counts every text it embeds
pub struct CountingEmbedder {
    inner: HashingEmbedder,
    pub calls: Arc<AtomicUsize>,
}

impl CountingEmbedder {
    pub fn new(dimension: usize) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let embedder = Arc::new(Self {
            inner: HashingEmbedder::new(dimension).unwrap(),
            calls: calls.clone(),
        });
        (embedder, calls)
    }
}

impl Embedder for CountingEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(text)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

/// Generator that counts calls and echoes a fixed answer
pub struct CountingGenerator {
    pub calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Generator for CountingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("An answer from the context.".to_string())
    }

    fn model_name(&self) -> &str {
        "counting"
    }
}

/// Page text long enough to survive the minimum-content filter
pub fn page_text(topic: &str) -> String {
    format!(
        "This page discusses {topic} in detail. The {topic} measurements were repeated \
         across three seasons and compared against the reference station. Results for \
         {topic} are summarised in the concluding section of the chapter."
    )
}
