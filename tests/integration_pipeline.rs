#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use pdf_rag::commands::run_chat_loop;
use pdf_rag::config::{Backend, Config, Credentials, OpenAiConfig};
use pdf_rag::history::SessionHistory;
use pdf_rag::pipeline::{IndexSource, Pipeline};
use serde_json::{Value, json};
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const DIMENSION: usize = 8;

/// One Courier page holding `text`.
///
/// The crate's own PDF fixture lives behind `cfg(test)` and is not visible here.
fn write_single_page_pdf(path: &Path, text: &str) {
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
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
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
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("pdf should save");
}

/// Same unit vector for every input so every chunk is equally relevant
struct UniformEmbeddings;

impl Respond for UniformEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let inputs = body["input"].as_array().map_or(0, Vec::len);
        let mut embedding = vec![0.0_f32; DIMENSION];
        embedding[0] = 1.0;
        let data: Vec<Value> = (0..inputs)
            .map(|index| json!({ "object": "embedding", "index": index, "embedding": embedding }))
            .collect();

        ResponseTemplate::new(200).set_body_json(json!({ "object": "list", "data": data }))
    }
}

async fn mock_openai(reply: &str) -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(UniformEmbeddings)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/completions"))
        .and(body_partial_json(json!({
            "model": "gpt-3.5-turbo-instruct",
            "max_tokens": 256
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "text": reply, "index": 0 }]
        })))
        .mount(&mock_server)
        .await;

    mock_server
}

fn test_config(server: &MockServer) -> Config {
    Config {
        openai: OpenAiConfig {
            base_url: format!("{}/v1/", server.uri()),
            embedding_dimension: u32::try_from(DIMENSION).expect("dimension fits"),
            timeout_seconds: 5,
            retry_attempts: 1,
            ..OpenAiConfig::default()
        },
        credentials: Credentials::from_lookup(|key| {
            (key == "OPENAI_API_KEY").then(|| "sk-integration".to_string())
        }),
        ..Config::default()
    }
}

#[tokio::test]
async fn local_pipeline_answers_from_pdf_directory() {
    let mock_server = mock_openai("\n\nEmployees   receive twenty\nvacation days per year.").await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let dir = temp_dir.path().join("policies");
    std::fs::create_dir(&dir).expect("should create policies dir");
    write_single_page_pdf(&dir.join("CBA.pdf"), "Employees receive twenty vacation days");
    write_single_page_pdf(&dir.join("leave.pdf"), "Sick leave requires a doctor note");
    let config = test_config(&mock_server);

    let answer = tokio::task::spawn_blocking(move || {
        let pipeline = Pipeline::from_config(&config, Backend::Local).expect("pipeline should build");
        let prepared = pipeline
            .prepare_index(&IndexSource::Directory(dir), true)
            .expect("index should build");
        assert_eq!(prepared.index.name(), "pdf-policies");
        assert!(prepared.upload.is_none());

        pipeline
            .answer(prepared.index.as_ref(), "How many vacation days?")
            .expect("should answer")
    })
    .await
    .expect("task should join");

    assert_eq!(answer.text, "Employees receive twenty vacation days per year.");
    assert_eq!(answer.sources.len(), 2);

    let requests = mock_server.received_requests().await.expect("requests recorded");
    let completion = requests
        .iter()
        .find(|request| request.url.path() == "/v1/completions")
        .expect("completion request sent");
    let body: Value = serde_json::from_slice(&completion.body).expect("json body");
    let prompt = body["prompt"].as_str().expect("prompt string");
    assert!(prompt.contains("twenty vacation days"));
    assert!(prompt.contains("doctor note"));
    assert!(prompt.ends_with("Question: How many vacation days?\nHelpful Answer:"));
}

#[tokio::test]
async fn chat_loop_replays_history_through_the_model() {
    let mock_server = mock_openai(" Twenty days.").await;
    let temp_dir = TempDir::new().expect("should create temp dir");
    let file = temp_dir.path().join("CBA.pdf");
    write_single_page_pdf(&file, "Employees receive twenty vacation days");
    let config = test_config(&mock_server);

    let output = tokio::task::spawn_blocking(move || {
        let pipeline = Pipeline::from_config(&config, Backend::Local).expect("pipeline should build");
        let prepared = pipeline
            .prepare_index(&IndexSource::File(file), true)
            .expect("index should build");
        let mut history = SessionHistory::with_capacity(config.history.max_turns);
        let mut output = Vec::new();

        run_chat_loop(
            &pipeline,
            prepared.index.as_ref(),
            Some(&mut history),
            Cursor::new("How many days?\nCan they carry over?\nexit\n"),
            &mut output,
        )
        .expect("loop should finish");

        assert_eq!(history.len(), 2);
        String::from_utf8(output).expect("utf8 output")
    })
    .await
    .expect("task should join");

    assert_eq!(output.matches("Answer: Twenty days.").count(), 2);

    let requests = mock_server.received_requests().await.expect("requests recorded");
    let prompts: Vec<String> = requests
        .iter()
        .filter(|request| request.url.path() == "/v1/completions")
        .map(|request| {
            let body: Value = serde_json::from_slice(&request.body).expect("json body");
            body["prompt"].as_str().expect("prompt string").to_string()
        })
        .collect();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("Q: How many days?\nA: Twenty days.\nCan they carry over?"));
}
