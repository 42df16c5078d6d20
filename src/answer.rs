//! Answer orchestration: retrieve → assemble → generate → sanitize.

use std::sync::Arc;

use tracing::{debug, info};

use crate::completion::{create_provider, CompletionProvider, CompletionRequest};
use crate::config::Config;
use crate::dates::{today_in, Clock, DateNormalizer, SystemClock};
use crate::error::Result;
use crate::ingest::open_and_ingest;
use crate::prompt::{build_system_prompt, AssistantContext};
use crate::sanitize::sanitize;
use crate::search::{format_context, Retriever};

/// The persona-constrained assistant. Built once, then answers one message
/// at a time.
pub struct Assistant {
    context: AssistantContext,
    retriever: Arc<dyn Retriever>,
    provider: Arc<dyn CompletionProvider>,
    clock: Arc<dyn Clock>,
    top_k: usize,
    model: String,
    max_output_tokens: u32,
}

impl Assistant {
    pub fn new(
        context: AssistantContext,
        retriever: Arc<dyn Retriever>,
        provider: Arc<dyn CompletionProvider>,
        config: &Config,
    ) -> Self {
        Self {
            context,
            retriever,
            provider,
            clock: Arc::new(SystemClock),
            top_k: config.retrieval.top_k,
            model: config.completion.model.clone(),
            max_output_tokens: config.completion.max_output_tokens,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn context(&self) -> &AssistantContext {
        &self.context
    }

    /// Startup: open the store, ingest if empty, load persona and BrainLift,
    /// build the completion backend. Any ingestion failure aborts.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let (store, report) = open_and_ingest(config).await?;
        info!(
            skipped = report.skipped,
            stored = report.stored,
            "document store ready"
        );

        let context = AssistantContext::load(config, SystemClock.now());
        let provider = create_provider(&config.completion)?;
        info!(provider = provider.name(), model = %config.completion.model, "assistant ready");

        Ok(Self::new(context, Arc::new(store), provider, config))
    }

    /// Answer one message.
    ///
    /// `history` is accepted for interface compatibility but not used: every
    /// answer is grounded on the current message only.
    pub async fn answer(&self, message: &str, history: &[(String, String)]) -> Result<String> {
        debug!(history_turns = history.len(), "history is not used for grounding");

        let now = self.clock.now();
        let normalizer = DateNormalizer::new(today_in(self.clock.as_ref(), self.context.tz));

        let hits = self.retriever.retrieve(message, self.top_k).await?;
        let context = normalizer.normalize(&format_context(&hits));
        let system = build_system_prompt(&self.context, now, &context);

        let request = CompletionRequest {
            system,
            user: message.to_string(),
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
        };
        let raw = self.provider.complete(&request).await?;
        debug!(provider = self.provider.name(), raw_chars = raw.len(), "completion received");

        Ok(sanitize(&raw, &self.context.persona_name))
    }
}

/// `joe ask`
pub async fn run_ask(config: &Config, message: &str) -> Result<()> {
    let assistant = Assistant::from_config(config).await?;
    let answer = assistant.answer(message, &[]).await?;
    println!("{}", answer);
    Ok(())
}
