//! Question answering over the indexed documents
//!
//! [`QaService`] couples the retrieval pipeline with a [`Generator`]. Each
//! question is answered in a single turn: retrieve the top chunks, render the
//! prompt, make one generation request, and return the answer with its
//! citations. Nothing is retried.

use crate::api::pipeline::{RagPipeline, SetupReport};
use crate::api::prompt::PromptTemplate;
use crate::config::{Config, LlmConfig};
use crate::error::{QaError, Result};
use crate::ml::index::ScoredChunk;
use crate::utils::truncate_chars;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequestArgs,
};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Answer given when retrieval finds nothing to ground a response on
pub const NO_CONTEXT_ANSWER: &str =
    "I couldn't find any relevant passages in the indexed documents, so I can't answer that.";

/// Maximum characters of chunk text shown in a citation
pub const SNIPPET_CHARS: usize = 300;

/// Text generation backend
#[async_trait]
pub trait Generator: Send + Sync {
    /// Complete a fully rendered prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Generator backed by an OpenAI-compatible chat completions API
pub struct OpenAiGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiGenerator {
    pub fn new(config: &LlmConfig, api_key: String) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let messages = vec![ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
            name: None,
        })];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .build()
            .map_err(|e| QaError::ExternalCall(format!("Invalid chat request: {}", e)))?;

        log::debug!("Sending chat completion request to {}", self.model);
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| QaError::ExternalCall(format!("Chat completion failed: {}", e)))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                log::error!("No content in chat response: {:?}", response);
                QaError::ExternalCall("No content in response".to_string())
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Excerpt shown beneath an answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// Source document name
    pub document: String,
    /// 1-based page number
    pub page: u32,
    pub snippet: String,
    pub score: f32,
}

impl Citation {
    pub fn from_scored(scored: &ScoredChunk) -> Self {
        Self {
            document: scored.chunk.source.clone(),
            page: scored.chunk.page,
            snippet: truncate_chars(&scored.chunk.text, SNIPPET_CHARS),
            score: scored.score,
        }
    }
}

/// A grounded answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Chunks passed to the model, most similar first
    pub sources: Vec<Citation>,
    /// Set when retrieval returned nothing and no model call was made
    pub no_context: bool,
}

impl Answer {
    fn without_context() -> Self {
        Self {
            text: NO_CONTEXT_ANSWER.to_string(),
            sources: Vec::new(),
            no_context: true,
        }
    }
}

/// Whether questions can be answered right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    Ready,
    /// No API key; retrieval still works
    MissingConfiguration { guidance: String },
}

/// Long-lived question answering service
pub struct QaService {
    pipeline: RagPipeline,
    generator: Option<Box<dyn Generator>>,
    template: PromptTemplate,
    top_k: usize,
    api_key_env: String,
}

impl QaService {
    pub fn new(pipeline: RagPipeline, generator: Option<Box<dyn Generator>>, template: PromptTemplate) -> Self {
        let top_k = pipeline.config().search.top_k;
        let api_key_env = pipeline.config().llm.api_key_env.clone();
        Self {
            pipeline,
            generator,
            template,
            top_k,
            api_key_env,
        }
    }

    /// Build the embedder, prompt and generator from configuration
    ///
    /// A missing API key is not an error here. The service starts in the
    /// missing-configuration state and only retrieval is available.
    pub fn from_config(config: Config) -> Result<Self> {
        let template = PromptTemplate::from_file(&config.paths.prompt_template)?;

        let generator = match config.llm.resolve_api_key() {
            Some(key) => Some(Box::new(OpenAiGenerator::new(&config.llm, key)) as Box<dyn Generator>),
            None => {
                log::warn!(
                    "{} is not set; question answering is disabled",
                    config.llm.api_key_env
                );
                None
            }
        };

        let pipeline = RagPipeline::new(config)?;
        Ok(Self::new(pipeline, generator, template))
    }

    /// Override the number of chunks retrieved per question
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn setup(&mut self, force_rebuild: bool) -> Result<SetupReport> {
        self.pipeline.setup(force_rebuild)
    }

    pub fn availability(&self) -> Availability {
        if self.generator.is_some() {
            Availability::Ready
        } else {
            Availability::MissingConfiguration {
                guidance: format!(
                    "Set {} in the environment or a secrets file to enable answers.",
                    self.api_key_env
                ),
            }
        }
    }

    pub fn pipeline(&self) -> &RagPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut RagPipeline {
        &mut self.pipeline
    }

    /// Answer a question from the top `top_k` chunks
    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        self.ask_with_k(question, self.top_k).await
    }

    /// Answer a question from the top `k` chunks
    pub async fn ask_with_k(&mut self, question: &str, k: usize) -> Result<Answer> {
        let Some(generator) = self.generator.as_ref() else {
            return Err(QaError::MissingConfiguration(format!(
                "{} is not set",
                self.api_key_env
            )));
        };

        let question = question.trim();
        if question.is_empty() {
            return Err(QaError::TextProcessing("Question is empty".to_string()));
        }

        let chunks = self.pipeline.retrieve(question, k)?;
        if chunks.is_empty() {
            log::info!("No chunks retrieved; answering without calling the model");
            return Ok(Answer::without_context());
        }

        let context = chunks
            .iter()
            .map(|scored| scored.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = self.template.render(&context, question);

        log::info!(
            "Asking {} with {} context chunks",
            generator.model_name(),
            chunks.len()
        );
        let text = generator.generate(&prompt).await?;

        Ok(Answer {
            text: text.trim().to_string(),
            sources: chunks.iter().map(Citation::from_scored).collect(),
            no_context: false,
        })
    }
}
