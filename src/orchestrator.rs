//! Request orchestration
//!
//! Wires enhancement, routing, history windowing, context ranking (with the
//! formatting cache and optional semantic index), generation streaming, and
//! metrics finalization into one fixed-sequence request lifecycle. Stages
//! never overlap within a request; the only suspension points are the
//! summarization call, the semantic-index query, and the generation stream.

use crate::config::Config;
use crate::enhance::{enhance, Enhancement};
use crate::error::{EngineError, Result};
use crate::history::{ChatMessage, ChatSummarizer, ConversationWindow, HistoryManager};
use crate::metrics::{Metrics, METRICS};
use crate::ranking::{
    format_ranked, rank, CachedSelection, ContextCache, ContextItem, RankedContext,
    ScoringContext,
};
use crate::routing::{classify, RoutingDecision};
use crate::session::SessionStore;
use crate::stream::{FlushSink, StreamBuffer, StreamStats};
use crate::tokens::{TiktokenEstimator, TokenEstimator};
use crate::transport::{
    CancelToken, GenerationRequest, ModelTransport, SemanticIndex, StreamEvent, TokenUsage,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Number of chunks requested from the semantic index.
const SEMANTIC_TOP_K: usize = 8;

/// One user turn handed to the engine
pub struct EngineRequest {
    pub prompt: String,
    pub history: Vec<ChatMessage>,
    pub cancel: CancelToken,
    pub sink: FlushSink,
}

/// Everything produced by one completed request
pub struct CompletedRequest {
    pub message_id: String,
    pub response: String,
    pub enhancement: Enhancement,
    pub decision: RoutingDecision,
    pub window: ConversationWindow,
    pub selected: Vec<RankedContext>,
    pub usage: TokenUsage,
    pub stream_stats: StreamStats,
}

/// Sequences one request through the engine's stages
pub struct RequestOrchestrator {
    config: Config,
    store: Arc<SessionStore>,
    cache: ContextCache,
    history: HistoryManager,
    transport: Arc<dyn ModelTransport>,
    semantic: Option<Arc<dyn SemanticIndex>>,
    metrics: Arc<Metrics>,
    precise_estimator: Option<TiktokenEstimator>,
}

impl RequestOrchestrator {
    pub fn new(config: Config, transport: Arc<dyn ModelTransport>) -> Result<Self> {
        config.validate()?;

        let summarizer = ChatSummarizer::new(config.summarizer.clone())
            .map_err(|e| EngineError::Configuration(e.to_string()))?;
        let history = HistoryManager::new(config.history.clone(), Arc::new(summarizer));

        let metrics = METRICS.clone();
        let eviction_metrics = metrics.clone();
        let cache = ContextCache::new(&config.cache).with_observer(Arc::new(
            move |_key, reason| {
                eviction_metrics.record_cache_eviction(reason.as_str());
            },
        ));

        // Precise token accounting is best-effort; the chars/4 proxy covers
        // budgets either way.
        let precise_estimator = TiktokenEstimator::new().ok();

        Ok(Self {
            config,
            store: Arc::new(SessionStore::new()),
            cache,
            history,
            transport,
            semantic: None,
            metrics,
            precise_estimator,
        })
    }

    pub fn with_semantic_index(mut self, index: Arc<dyn SemanticIndex>) -> Self {
        self.semantic = Some(index);
        self
    }

    /// The session's context item store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one request end to end.
    ///
    /// Cancellation still flushes buffered partial output and finalizes
    /// metrics; unexpected failures release the same state so the session
    /// stays usable for the next request.
    pub async fn handle(&self, request: EngineRequest) -> Result<CompletedRequest> {
        let started = Instant::now();
        let items = self.store.snapshot();

        // 1. Enhance
        let enhancement = if self.config.enhancement.enabled {
            enhance(&request.prompt, &items)
        } else {
            Enhancement {
                original: request.prompt.clone(),
                enhanced: request.prompt.clone(),
                was_enhanced: false,
                reason: None,
                pattern: None,
            }
        };
        if enhancement.was_enhanced {
            self.metrics.prompts_enhanced.inc();
        }

        // 2. Route
        let decision = classify(&enhancement.enhanced, &items, &self.config);
        self.metrics
            .record_routing(decision.tier.as_str(), decision.fallback_used);
        info!(
            tier = decision.tier.as_str(),
            model = %decision.model,
            budget = decision.context_budget,
            "routing decision"
        );

        // 3. Conversation window
        let window = self.history.prepare(&request.history).await;
        if window.summarized {
            self.metrics.summarizations.inc();
        }
        self.metrics
            .history_tokens_saved
            .observe(window.tokens_saved as f64);

        // 4. Rank context through the cache
        let selection = self
            .select_context(&items, &enhancement.enhanced, decision.context_budget, &window)
            .await;
        self.metrics
            .context_tokens_selected
            .observe(selection.token_count as f64);

        // 5. Usage bookkeeping write-back
        let user_message = ChatMessage::user(enhancement.enhanced.clone());
        let used_ids: Vec<String> =
            selection.ranked.iter().map(|r| r.item.id.clone()).collect();
        self.store.mark_used(&used_ids, &user_message.id);

        // 6. Generate and stream
        let buffer = StreamBuffer::new(self.config.stream.clone(), request.sink.clone());
        let outcome = self
            .run_generation(&decision, &window, &selection, user_message.clone(), &request.cancel, &buffer)
            .await;

        // 7. Finalize, regardless of outcome
        let stream_stats = buffer.finalize();
        self.metrics.stream_flushes.observe(stream_stats.flushes as f64);
        let elapsed = started.elapsed().as_secs_f64();

        match outcome {
            Ok((response, usage)) => {
                let usage = self.account_usage(
                    usage,
                    &window,
                    &selection,
                    &enhancement.enhanced,
                    &response,
                );
                self.metrics
                    .record_request("success", decision.tier.as_str(), elapsed);
                self.metrics
                    .record_usage(usage.input_tokens, usage.output_tokens);
                Ok(CompletedRequest {
                    message_id: user_message.id,
                    response,
                    enhancement,
                    decision,
                    window,
                    selected: selection.ranked,
                    usage,
                    stream_stats,
                })
            }
            Err(e) if e.is_cancelled() => {
                self.metrics
                    .record_request("cancelled", decision.tier.as_str(), elapsed);
                Err(e)
            }
            Err(e) => {
                self.metrics
                    .record_request("error", decision.tier.as_str(), elapsed);
                Err(e)
            }
        }
    }

    /// Select context for the query: cache first, then the semantic index
    /// when eligible, then the keyword ranker. All paths are total.
    async fn select_context(
        &self,
        items: &[ContextItem],
        query: &str,
        budget: usize,
        window: &ConversationWindow,
    ) -> CachedSelection {
        if let Some(cached) = self.cache.get(items, query) {
            self.metrics.record_cache_lookup(true);
            return cached;
        }
        self.metrics.record_cache_lookup(false);

        let ranked = match self.semantic_selection(items, query, budget).await {
            Some(ranked) => ranked,
            None => {
                let ctx = ScoringContext::new(
                    query,
                    window.recent(),
                    self.config.mode,
                    &self.config.ranking,
                );
                rank(items, budget, &ctx)
            }
        };

        let formatted = format_ranked(&ranked);
        let token_count = ranked.iter().map(|r| r.token_cost).sum();
        self.cache
            .set(items, query, ranked.clone(), formatted.clone(), token_count);
        CachedSelection {
            ranked,
            formatted,
            token_count,
        }
    }

    /// Semantic-index attempt; `None` means "use the keyword ranker", which
    /// covers ineligibility and every failure mode.
    async fn semantic_selection(
        &self,
        items: &[ContextItem],
        query: &str,
        budget: usize,
    ) -> Option<Vec<RankedContext>> {
        let index = self.semantic.as_ref()?;
        let model = self.config.embedding_model.as_ref()?;
        if items.len() < self.config.ranking.semantic_min_items {
            return None;
        }

        match index.query(model, items, query, SEMANTIC_TOP_K).await {
            Ok(chunks) if !chunks.is_empty() => {
                let mut ranked = Vec::new();
                let mut used_tokens = 0usize;
                for chunk in chunks {
                    let Some(item) = items.iter().find(|i| i.id == chunk.item_id) else {
                        continue;
                    };
                    let token_cost =
                        crate::tokens::approx_tokens(item.effective_content());
                    if used_tokens + token_cost > budget && !ranked.is_empty() {
                        break;
                    }
                    used_tokens += token_cost;
                    ranked.push(RankedContext {
                        item: item.clone(),
                        score: (chunk.score * 100.0).clamp(0.0, 100.0),
                        breakdown: Default::default(),
                        token_cost,
                    });
                }
                debug!(selected = ranked.len(), "semantic index selection");
                Some(ranked)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "semantic index failed, using keyword ranker");
                self.metrics.semantic_index_fallbacks.inc();
                None
            }
        }
    }

    /// Consume the generation stream into the buffer.
    async fn run_generation(
        &self,
        decision: &RoutingDecision,
        window: &ConversationWindow,
        selection: &CachedSelection,
        user_message: ChatMessage,
        cancel: &CancelToken,
        buffer: &StreamBuffer,
    ) -> Result<(String, Option<TokenUsage>)> {
        let system_prompt = if selection.formatted.is_empty() {
            String::new()
        } else {
            format!("Relevant terminal context:\n\n{}", selection.formatted)
        };
        let mut messages = window.messages.clone();
        messages.push(user_message);

        let generation = GenerationRequest {
            model: decision.model.clone(),
            system_prompt,
            messages,
            temperature: decision.temperature,
        };

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut stream = self.transport.generate(generation).await?;
        let mut response = String::new();
        let mut usage = None;

        while let Some(event) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match event {
                StreamEvent::TextDelta { text } => {
                    response.push_str(&text);
                    buffer.append(&text);
                }
                StreamEvent::ToolCall { name, .. } => {
                    // Tool execution is external; the call only passes through.
                    debug!(tool = %name, "tool call event");
                }
                StreamEvent::ToolResult { name, .. } => {
                    debug!(tool = %name, "tool result event");
                }
                StreamEvent::Finish { usage: reported } => {
                    usage = Some(reported);
                }
                StreamEvent::Error { message } => {
                    return Err(EngineError::Transport(message));
                }
            }
        }

        Ok((response, usage))
    }

    /// Prefer transport-reported usage. When the stream ended without a
    /// finish event, estimate both sides from what was actually sent and
    /// received so neither histogram records a spurious zero.
    fn account_usage(
        &self,
        reported: Option<TokenUsage>,
        window: &ConversationWindow,
        selection: &CachedSelection,
        prompt: &str,
        response: &str,
    ) -> TokenUsage {
        if let Some(usage) = reported {
            return usage;
        }
        let estimate = |text: &str| match &self.precise_estimator {
            Some(estimator) => estimator.estimate(text),
            None => crate::tokens::approx_tokens(text),
        };
        let input_tokens = estimate(&selection.formatted)
            + window
                .messages
                .iter()
                .map(|m| estimate(&m.content))
                .sum::<usize>()
            + estimate(prompt);
        TokenUsage {
            input_tokens,
            output_tokens: estimate(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::ContextItemKind;
    use crate::transport::ScoredChunk;
    use async_trait::async_trait;
    use futures::stream::BoxStream;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedTransport {
        // One event script per call; the last script repeats.
        scripts: Vec<Vec<StreamEvent>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedTransport {
        fn new(events: Vec<StreamEvent>) -> Arc<Self> {
            Self::with_scripts(vec![events])
        }

        fn with_scripts(scripts: Vec<Vec<StreamEvent>>) -> Arc<Self> {
            Arc::new(Self {
                scripts,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn reply(text: &str) -> Arc<Self> {
            Self::new(vec![
                StreamEvent::TextDelta {
                    text: text.to_string(),
                },
                StreamEvent::Finish {
                    usage: TokenUsage {
                        input_tokens: 100,
                        output_tokens: 20,
                    },
                },
            ])
        }
    }

    #[async_trait]
    impl ModelTransport for ScriptedTransport {
        async fn generate(
            &self,
            request: GenerationRequest,
        ) -> Result<BoxStream<'static, StreamEvent>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request);
            let script = self.scripts[call.min(self.scripts.len() - 1)].clone();
            Ok(futures::stream::iter(script).boxed())
        }
    }

    struct FailingIndex;

    #[async_trait]
    impl SemanticIndex for FailingIndex {
        async fn query(
            &self,
            _model: &str,
            _items: &[ContextItem],
            _query: &str,
            _top_k: usize,
        ) -> Result<Vec<ScoredChunk>> {
            Err(EngineError::Transport("index offline".to_string()))
        }
    }

    fn null_sink() -> FlushSink {
        Arc::new(|_text: &str| {})
    }

    fn request(prompt: &str) -> EngineRequest {
        EngineRequest {
            prompt: prompt.to_string(),
            history: Vec::new(),
            cancel: CancelToken::new(),
            sink: null_sink(),
        }
    }

    fn failing_npm_item() -> ContextItem {
        let mut item = ContextItem::new(ContextItemKind::CommandOutput, "npm ERR! code ENOENT");
        item.metadata.command = Some("npm install".to_string());
        item.metadata.exit_code = Some(1);
        item
    }

    #[tokio::test]
    async fn test_full_request_lifecycle() {
        let transport = ScriptedTransport::reply("The install failed because of a missing file.");
        let orchestrator =
            RequestOrchestrator::new(Config::default(), transport.clone()).unwrap();
        orchestrator.store().upsert(failing_npm_item());

        let completed = orchestrator
            .handle(request("why did npm install fail?"))
            .await
            .unwrap();

        assert_eq!(
            completed.response,
            "The install failed because of a missing file."
        );
        assert_eq!(completed.usage.input_tokens, 100);
        assert!(!completed.selected.is_empty());
        assert_eq!(
            completed.selected[0].item.metadata.command.as_deref(),
            Some("npm install")
        );

        // The failing command made it into the system prompt
        let seen = transport.seen.lock().unwrap();
        assert!(seen[0].system_prompt.contains("npm install"));
        assert_eq!(seen[0].temperature, 0.2);

        // Usage bookkeeping was written back
        let item = orchestrator.store().snapshot().remove(0);
        assert_eq!(item.usage_count, 1);
        assert_eq!(
            item.last_used_in_message_id.as_deref(),
            Some(completed.message_id.as_str())
        );
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_before_any_network() {
        let mut config = Config::default();
        config.routing.main_model = String::new();
        let transport = ScriptedTransport::reply("unused");
        let result = RequestOrchestrator::new(config, transport.clone());
        assert!(matches!(result, Err(EngineError::Configuration(_))));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_before_stream_consumption() {
        let transport = ScriptedTransport::reply("never delivered");
        let orchestrator = RequestOrchestrator::new(Config::default(), transport).unwrap();

        let req = request("hello there");
        req.cancel.cancel();
        let result = orchestrator.handle(req).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancellation_flushes_partial_output() {
        // Cancel once the first delta reaches the sink; the second delta is
        // never consumed. Threshold of 1 makes the first flush synchronous.
        let transport = ScriptedTransport::new(vec![
            StreamEvent::TextDelta {
                text: "partial answer".to_string(),
            },
            StreamEvent::TextDelta {
                text: " never seen".to_string(),
            },
        ]);
        let mut config = Config::default();
        config.stream.flush_threshold_chars = 1;
        let orchestrator = RequestOrchestrator::new(config, transport).unwrap();

        let flushed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_target = flushed.clone();
        let cancel = CancelToken::new();
        let cancel_after_first = cancel.clone();
        let req = EngineRequest {
            prompt: "tell me something".to_string(),
            history: Vec::new(),
            cancel,
            sink: Arc::new(move |text: &str| {
                sink_target.lock().unwrap().push(text.to_string());
                cancel_after_first.cancel();
            }),
        };

        let result = orchestrator.handle(req).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(flushed.lock().unwrap().as_slice(), ["partial answer"]);
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_and_session_stays_usable() {
        let transport = ScriptedTransport::with_scripts(vec![
            vec![StreamEvent::Error {
                message: "upstream 500".to_string(),
            }],
            vec![
                StreamEvent::TextDelta {
                    text: "fine now".to_string(),
                },
                StreamEvent::Finish {
                    usage: TokenUsage::default(),
                },
            ],
        ]);
        let orchestrator = RequestOrchestrator::new(Config::default(), transport).unwrap();

        let result = orchestrator.handle(request("hello")).await;
        assert!(matches!(result, Err(EngineError::Transport(_))));

        // The next request on the same session completes normally
        let completed = orchestrator.handle(request("hello again")).await.unwrap();
        assert_eq!(completed.response, "fine now");
    }

    #[tokio::test]
    async fn test_semantic_index_failure_falls_back_to_ranker() {
        let transport = ScriptedTransport::reply("answer");
        let orchestrator = RequestOrchestrator::new(
            {
                let mut config = Config::default();
                config.embedding_model = Some("embed-small".to_string());
                config
            },
            transport,
        )
        .unwrap()
        .with_semantic_index(Arc::new(FailingIndex));

        for i in 0..12 {
            orchestrator
                .store()
                .upsert(ContextItem::new(ContextItemKind::CommandOutput, format!("output {}", i)));
        }

        let completed = orchestrator.handle(request("show me the output")).await.unwrap();
        // Keyword ranker still selected context despite the index failure
        assert!(!completed.selected.is_empty());
    }

    #[tokio::test]
    async fn test_usage_estimated_when_stream_lacks_finish() {
        // No finish event: both sides of the usage are estimated, input from
        // the assembled prompt rather than reported as zero.
        let transport = ScriptedTransport::new(vec![StreamEvent::TextDelta {
            text: "an answer several tokens long".to_string(),
        }]);
        let orchestrator = RequestOrchestrator::new(Config::default(), transport).unwrap();
        orchestrator.store().upsert(failing_npm_item());

        let completed = orchestrator
            .handle(EngineRequest {
                prompt: "why did npm install fail?".to_string(),
                history: vec![
                    ChatMessage::user("I ran the install".to_string()),
                    ChatMessage::assistant("It started but did not finish".to_string()),
                ],
                cancel: CancelToken::new(),
                sink: null_sink(),
            })
            .await
            .unwrap();

        assert!(completed.usage.input_tokens > 0);
        assert!(completed.usage.output_tokens > 0);
    }

    #[tokio::test]
    async fn test_enhancement_disabled_passthrough() {
        let mut config = Config::default();
        config.enhancement.enabled = false;
        let transport = ScriptedTransport::reply("ok");
        let orchestrator = RequestOrchestrator::new(config, transport).unwrap();
        orchestrator.store().upsert(failing_npm_item());

        let completed = orchestrator.handle(request("fix this")).await.unwrap();
        assert!(!completed.enhancement.was_enhanced);
        assert_eq!(completed.enhancement.enhanced, "fix this");
    }
}
