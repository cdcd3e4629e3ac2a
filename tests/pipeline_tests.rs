//! End-to-end pipeline behaviour with offline embedders

mod common;

use common::{CountingEmbedder, CountingGenerator, page_text, test_config, write_pdf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use thesis_qa::{
    Availability, Chunk, PipelineState, PromptTemplate, QaError, QaService, RagPipeline,
    SetupAction,
};

fn write_corpus(root: &TempDir) {
    let data = root.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    write_pdf(
        &data.join("fieldwork.pdf"),
        &[&page_text("salinity"), &page_text("temperature")],
    );
    write_pdf(&data.join("methods.pdf"), &[&page_text("microscopy")]);
}

fn chunk(id: usize, text: &str) -> Chunk {
    Chunk {
        id,
        text: text.to_string(),
        source: "notes.pdf".to_string(),
        page: id as u32 + 1,
        split_index: 0,
    }
}

#[test]
fn test_setup_builds_then_loads() {
    let root = TempDir::new().unwrap();
    write_corpus(&root);

    let (embedder, calls) = CountingEmbedder::new(128);
    let mut pipeline = RagPipeline::with_embedder(test_config(&root), embedder).unwrap();
    let report = pipeline.setup(false).unwrap();

    assert_eq!(report.action, SetupAction::Built);
    assert_eq!(report.documents, 2);
    assert_eq!(report.pages, 3);
    assert!(report.chunks >= 3);
    assert_eq!(calls.load(Ordering::SeqCst), report.chunks);
    assert_eq!(pipeline.state(), PipelineState::Indexed);

    // A fresh service object loads the persisted index without embedding
    let (embedder, calls) = CountingEmbedder::new(128);
    let mut reloaded = RagPipeline::with_embedder(test_config(&root), embedder).unwrap();
    let report = reloaded.setup(false).unwrap();

    assert_eq!(report.action, SetupAction::Loaded);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(reloaded.stats().unwrap().total_chunks, report.chunks);

    let results = reloaded.retrieve("salinity measurements", 1).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.source, "fieldwork.pdf");
    assert_eq!(results[0].chunk.page, 1);
}

#[test]
fn test_forced_rebuild_replaces_index() {
    let root = TempDir::new().unwrap();
    write_corpus(&root);

    let (embedder, _) = CountingEmbedder::new(128);
    let mut pipeline = RagPipeline::with_embedder(test_config(&root), embedder).unwrap();
    let first = pipeline.setup(false).unwrap();

    // Drop a document; the rebuild must not keep its chunks
    std::fs::remove_file(root.path().join("data").join("methods.pdf")).unwrap();

    let (embedder, calls) = CountingEmbedder::new(128);
    let mut rebuilt = RagPipeline::with_embedder(test_config(&root), embedder).unwrap();
    let report = rebuilt.setup(true).unwrap();

    assert_eq!(report.action, SetupAction::Built);
    assert_eq!(report.documents, 1);
    assert!(report.chunks < first.chunks);
    assert_eq!(calls.load(Ordering::SeqCst), report.chunks);

    let stats = rebuilt.stats().unwrap();
    assert_eq!(stats.documents, 1);
    assert!(rebuilt.index().unwrap().chunks().iter().all(|c| c.source == "fieldwork.pdf"));
}

#[test]
fn test_rebuild_only_removes_index_files() {
    let root = TempDir::new().unwrap();
    write_corpus(&root);
    let index_dir = root.path().join("vector_db");
    std::fs::create_dir_all(&index_dir).unwrap();
    std::fs::write(index_dir.join("notes.txt"), "kept beside the index").unwrap();

    let (embedder, _) = CountingEmbedder::new(128);
    let mut pipeline = RagPipeline::with_embedder(test_config(&root), embedder).unwrap();
    pipeline.setup(false).unwrap();
    let report = pipeline.setup(true).unwrap();

    assert_eq!(report.action, SetupAction::Built);
    assert!(index_dir.join("notes.txt").exists());
    assert!(root.path().join("data").join("fieldwork.pdf").exists());
    assert!(pipeline.index_exists());
}

#[test]
fn test_index_dir_over_documents_rejected() {
    let root = TempDir::new().unwrap();
    write_corpus(&root);

    let mut config = test_config(&root);
    config.paths.index_dir = config.paths.documents_dir.clone();
    let (embedder, calls) = CountingEmbedder::new(128);
    let result = RagPipeline::with_embedder(config, embedder);

    assert!(matches!(result, Err(QaError::Config(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(root.path().join("data").join("fieldwork.pdf").exists());
}

#[test]
fn test_top_k_against_three_chunks() {
    let root = TempDir::new().unwrap();
    let (embedder, _) = CountingEmbedder::new(128);
    let mut pipeline = RagPipeline::with_embedder(test_config(&root), embedder).unwrap();
    pipeline
        .build_index(vec![
            chunk(0, "copepods dominate the summer zooplankton community"),
            chunk(1, "the ferry route crosses the harbour twice a day"),
            chunk(2, "zooplankton samples were fixed in formalin"),
        ])
        .unwrap();

    let results = pipeline.retrieve("zooplankton community", 2).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].score >= results[1].score);
    assert_eq!(results[0].chunk.id, 0);
}

#[tokio::test]
async fn test_missing_key_makes_no_calls() {
    let root = TempDir::new().unwrap();
    let (embedder, calls) = CountingEmbedder::new(128);
    let mut pipeline = RagPipeline::with_embedder(test_config(&root), embedder).unwrap();
    pipeline
        .build_index(vec![chunk(0, "an indexed chunk about sediment cores")])
        .unwrap();
    calls.store(0, Ordering::SeqCst);

    let template = PromptTemplate::default_template().unwrap();
    let mut service = QaService::new(pipeline, None, template);

    assert!(matches!(
        service.availability(),
        Availability::MissingConfiguration { .. }
    ));
    let result = service.ask("what about sediment cores?").await;
    assert!(matches!(result, Err(QaError::MissingConfiguration(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_service_without_key_from_config() {
    let root = TempDir::new().unwrap();
    let service = QaService::from_config(test_config(&root)).unwrap();

    match service.availability() {
        Availability::MissingConfiguration { guidance } => {
            assert!(guidance.contains("THESIS_QA_TEST_KEY_NEVER_SET"));
        }
        Availability::Ready => panic!("no key should be configured"),
    }
}

#[tokio::test]
async fn test_empty_documents_folder() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("data")).unwrap();

    let (embedder, _) = CountingEmbedder::new(128);
    let pipeline = RagPipeline::with_embedder(test_config(&root), embedder).unwrap();
    let generator_calls = Arc::new(AtomicUsize::new(0));
    let generator = CountingGenerator {
        calls: generator_calls.clone(),
    };
    let mut service = QaService::new(
        pipeline,
        Some(Box::new(generator)),
        PromptTemplate::default_template().unwrap(),
    );

    let report = service.setup(false).unwrap();
    assert_eq!(report.chunks, 0);
    assert_eq!(report.warnings.len(), 1);
    assert!(service.pipeline().index_exists());

    let answer = service.ask("anything at all?").await.unwrap();
    assert!(answer.no_context);
    assert!(answer.sources.is_empty());
    assert_eq!(answer.text, thesis_qa::api::NO_CONTEXT_ANSWER);
    assert_eq!(generator_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_answer_cites_pages() {
    let root = TempDir::new().unwrap();
    write_corpus(&root);

    let (embedder, _) = CountingEmbedder::new(128);
    let pipeline = RagPipeline::with_embedder(test_config(&root), embedder).unwrap();
    let generator_calls = Arc::new(AtomicUsize::new(0));
    let mut service = QaService::new(
        pipeline,
        Some(Box::new(CountingGenerator {
            calls: generator_calls.clone(),
        })),
        PromptTemplate::default_template().unwrap(),
    )
    .with_top_k(2);
    service.setup(false).unwrap();

    let answer = service.ask("How was the temperature measured?").await.unwrap();
    assert!(!answer.no_context);
    assert_eq!(answer.sources.len(), 2);
    assert_eq!(answer.sources[0].document, "fieldwork.pdf");
    assert_eq!(answer.sources[0].page, 2);
    assert_eq!(generator_calls.load(Ordering::SeqCst), 1);
}
