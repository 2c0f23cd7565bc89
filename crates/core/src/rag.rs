use crate::embeddings::Embedder;
use crate::error::{ConfigError, QueryError, RetrievalError};
use crate::index::DatasetIndex;
use crate::llm::GenerationParams;
use crate::models::ScoredChunk;
use crate::traits::LanguageModel;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

pub const DEFAULT_TOP_K: usize = 5;
pub const NO_ANSWER: &str = "No answer found in response";

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";

pub const DEFAULT_PROMPT_TEMPLATE: &str = "Human:

You are an assistant answering questions about a company's documents, such as policies, \
financial statements, investment documents and corporate reports.

Instructions:

Use only the context below to answer. If the context does not contain the answer, say \"I don't know\" \
instead of inventing details.
Start answering directly; do not open with phrases like \"Based on the context\".
Answer thoroughly when asked for detail and briefly when asked for a short answer.
Only present tables when the question asks for tabular data.
Use bullet points or numbering when the answer is a list.
Do not emit HTML tags.
End the response as soon as the question is answered; do not ask follow-up questions.

context = {context}
Question = {question}

Assistant:";

/// Prompt template and generation settings used for every question.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptConfig {
    template: String,
    pub top_k: usize,
    pub generation: GenerationParams,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            top_k: DEFAULT_TOP_K,
            generation: GenerationParams::default(),
        }
    }
}

impl PromptConfig {
    pub fn new(
        template: impl Into<String>,
        top_k: usize,
        generation: GenerationParams,
    ) -> Result<Self, ConfigError> {
        let template = template.into();
        for slot in [CONTEXT_SLOT, QUESTION_SLOT] {
            if !template.contains(slot) {
                return Err(ConfigError::PromptTemplate(format!(
                    "template is missing the {slot} placeholder"
                )));
            }
        }
        if top_k == 0 {
            return Err(ConfigError::PromptTemplate(
                "top_k must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            template,
            top_k,
            generation,
        })
    }

    pub fn from_file(
        path: &Path,
        top_k: usize,
        generation: GenerationParams,
    ) -> Result<Self, ConfigError> {
        let template = std::fs::read_to_string(path)?;
        Self::new(template, top_k, generation)
    }

    /// Single pass, so placeholders inside the substituted text stay literal.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut rendered =
            String::with_capacity(self.template.len() + context.len() + question.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            rendered.push_str(&rest[..start]);
            let tail = &rest[start..];
            if let Some(after) = tail.strip_prefix(CONTEXT_SLOT) {
                rendered.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_SLOT) {
                rendered.push_str(question);
                rest = after;
            } else {
                rendered.push('{');
                rest = &tail[1..];
            }
        }

        rendered.push_str(rest);
        rendered
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    Completed,
    NoAnswer,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub outcome: AnswerOutcome,
    pub sources: Vec<ScoredChunk>,
}

impl Answer {
    fn failed(error: impl std::fmt::Display, sources: Vec<ScoredChunk>) -> Self {
        Self {
            text: format!("Error processing question: {error}"),
            outcome: AnswerOutcome::Failed,
            sources,
        }
    }
}

/// Retrieves the closest chunks for a question and asks the model about them.
pub struct RetrievalAnswerer {
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    prompt: PromptConfig,
}

impl RetrievalAnswerer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        prompt: PromptConfig,
    ) -> Self {
        Self {
            embedder,
            model,
            prompt,
        }
    }

    /// Rejects indexes whose vectors this answerer's embedder cannot query.
    pub fn check_compatible(&self, index: &DatasetIndex) -> Result<(), QueryError> {
        let stored = (index.embedding_model(), index.dimensions());
        let configured = (self.embedder.model_name(), self.embedder.dimensions());
        if stored == configured {
            return Ok(());
        }
        Err(QueryError::EmbedderMismatch {
            dataset: index.dataset().to_string(),
            stored: format!("{} ({} dimensions)", stored.0, stored.1),
            configured: format!("{} ({} dimensions)", configured.0, configured.1),
        })
    }

    pub async fn retrieve(
        &self,
        index: &DatasetIndex,
        question: &str,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let query = self.embedder.embed(question).await?;
        Ok(index.search(&query, self.prompt.top_k)?)
    }

    /// Never fails: provider errors come back as a fallback answer string.
    pub async fn answer(&self, index: &DatasetIndex, question: &str) -> Answer {
        let sources = match self.retrieve(index, question).await {
            Ok(sources) => sources,
            Err(error) => {
                warn!(dataset = index.dataset(), %error, "retrieval failed");
                return Answer::failed(error, Vec::new());
            }
        };

        let context = sources
            .iter()
            .map(|scored| scored.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = self.prompt.render(&context, question);
        debug!(
            dataset = index.dataset(),
            retrieved = sources.len(),
            prompt_len = prompt.len(),
            model = self.model.model_name(),
            "submitting prompt"
        );

        match self.model.complete(&prompt, &self.prompt.generation).await {
            Ok(completion) => match completion.into_text() {
                Some(text) => Answer {
                    text,
                    outcome: AnswerOutcome::Completed,
                    sources,
                },
                None => Answer {
                    text: NO_ANSWER.to_string(),
                    outcome: AnswerOutcome::NoAnswer,
                    sources,
                },
            },
            Err(error) => {
                warn!(dataset = index.dataset(), %error, "completion failed");
                Answer::failed(error, sources)
            }
        }
    }
}
