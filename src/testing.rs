// Shared fixtures for unit tests

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use wiremock::{Request, Respond, ResponseTemplate};

use crate::config::{Backend, OpenAiConfig};
use crate::database::PineconeClient;
use crate::embeddings::{ChunkingConfig, Embedder, TextChunker, TextGenerator};
use crate::indexer::Indexer;
use crate::pipeline::Pipeline;
use crate::qa::QuestionAnswerer;

pub const FAKE_DIMENSION: usize = 16;

/// Write a PDF with one page per entry of `pages`, each holding that text
pub fn write_pdf(path: &Path, pages: &[&str]) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content should encode"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let page_count = i64::try_from(kids.len()).expect("page count fits");
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("pdf should save");
}

/// Bag-of-words embedding: each lowercase word bumps one of `FAKE_DIMENSION` buckets
pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; FAKE_DIMENSION];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(7usize, |acc, b| acc.wrapping_mul(31).wrapping_add(usize::from(b)))
            % FAKE_DIMENSION;
        vector[bucket] += 1.0;
    }
    vector
}

#[derive(Debug, Default)]
pub struct FakeEmbedder {
    pub query_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
}

impl Embedder for FakeEmbedder {
    fn embed_query(&self, text: &str) -> crate::Result<Vec<f32>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Ok(bag_of_words(text))
    }

    fn embed_documents(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|text| bag_of_words(text)).collect())
    }

    fn dimension(&self) -> usize {
        FAKE_DIMENSION
    }
}

/// Records every prompt and answers with a fixed reply
#[derive(Debug)]
pub struct FakeGenerator {
    reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt lock").clone()
    }
}

impl TextGenerator for FakeGenerator {
    fn generate(&self, prompt: &str) -> crate::Result<String> {
        self.prompts
            .lock()
            .expect("prompt lock")
            .push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

/// Answers OpenAI-style embedding requests with one vector per input
pub struct EmbeddingResponder {
    dimension: usize,
}

impl EmbeddingResponder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Respond for EmbeddingResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let inputs = body["input"].as_array().map_or(0, Vec::len);
        let data: Vec<Value> = (0..inputs)
            .map(|index| {
                let mut embedding = vec![0.0_f32; self.dimension];
                embedding[index % self.dimension] = 1.0;
                json!({ "object": "embedding", "index": index, "embedding": embedding })
            })
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": data,
            "model": body["model"],
        }))
    }
}

pub fn openai_test_config(server_uri: &str, dimension: u32) -> OpenAiConfig {
    OpenAiConfig {
        base_url: format!("{}/v1/", server_uri),
        embedding_dimension: dimension,
        timeout_seconds: 5,
        ..OpenAiConfig::default()
    }
}

/// Pipeline over the fake embedder, chunking at 200 characters
pub fn fake_pipeline(
    backend: Backend,
    generator: Arc<FakeGenerator>,
    remote: Option<PineconeClient>,
) -> Pipeline {
    let embedder: Arc<dyn Embedder> = Arc::new(FakeEmbedder::default());
    let chunker = TextChunker::new(ChunkingConfig {
        chunk_size: 200,
        chunk_overlap: 20,
        separator: "\n".to_string(),
    })
    .expect("chunking config should be valid");

    Pipeline::new(
        backend,
        Indexer::new(Arc::clone(&embedder), chunker, 10),
        QuestionAnswerer::new(embedder, generator, 5, 80),
        remote,
    )
}
