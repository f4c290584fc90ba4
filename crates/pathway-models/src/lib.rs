//! Routes model invocations to a specialized provider client or a generic
//! backend. Specialized clients are built lazily per `(model, api_key)` and
//! kept in a bounded LRU cache shared by every [`BoundModel`] derived from a
//! [`ModelMultiplexer`].

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures_util::StreamExt;
use pathway_protocol::{
    ChatModel, ModelChunkStream, ModelClientFactory, ModelConfig, ModelOutput, Prompt,
    ResearchError, ResearchResult, RunConfig,
};
use tracing::{debug, info, instrument};

mod cache;
mod route;

pub use cache::{ClientCache, DEFAULT_CACHE_CAPACITY};
pub use route::{ClientKey, Route, select_route};

/// Factory registered for every model whose name starts with `prefix`.
#[derive(Clone)]
pub struct SpecializedProvider {
    pub prefix: String,
    pub factory: Arc<dyn ModelClientFactory>,
}

pub struct MultiplexerBuilder {
    generic: Arc<dyn ChatModel>,
    providers: Vec<SpecializedProvider>,
    default_api_key: Option<String>,
    cache_capacity: usize,
}

impl MultiplexerBuilder {
    pub fn new(generic: Arc<dyn ChatModel>) -> Self {
        Self {
            generic,
            providers: Vec::new(),
            default_api_key: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    pub fn provider(
        mut self,
        prefix: impl Into<String>,
        factory: Arc<dyn ModelClientFactory>,
    ) -> Self {
        self.providers.push(SpecializedProvider {
            prefix: prefix.into().to_ascii_lowercase(),
            factory,
        });
        self
    }

    /// Key used for specialized clients when the effective config has none.
    pub fn default_api_key(mut self, api_key: Option<String>) -> Self {
        self.default_api_key = api_key;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn build(self) -> ModelMultiplexer {
        ModelMultiplexer {
            inner: Arc::new(MultiplexerInner {
                generic: self.generic,
                providers: self.providers,
                default_api_key: self.default_api_key,
                cache: ClientCache::new(self.cache_capacity),
            }),
        }
    }
}

struct MultiplexerInner {
    generic: Arc<dyn ChatModel>,
    providers: Vec<SpecializedProvider>,
    default_api_key: Option<String>,
    cache: ClientCache,
}

#[derive(Clone)]
pub struct ModelMultiplexer {
    inner: Arc<MultiplexerInner>,
}

impl ModelMultiplexer {
    pub fn builder(generic: Arc<dyn ChatModel>) -> MultiplexerBuilder {
        MultiplexerBuilder::new(generic)
    }

    /// Binds `defaults`; per-call configuration is merged over them.
    pub fn bind(&self, defaults: ModelConfig) -> BoundModel {
        BoundModel {
            multiplexer: self.clone(),
            defaults,
        }
    }

    pub fn route_for(&self, effective: &ModelConfig) -> Route {
        select_route(
            effective,
            self.inner
                .providers
                .iter()
                .map(|provider| provider.prefix.as_str()),
            self.inner.default_api_key.as_deref(),
        )
    }

    pub fn cached_clients(&self) -> usize {
        self.inner.cache.len()
    }

    async fn resolve(&self, effective: &ModelConfig) -> ResearchResult<Arc<dyn ChatModel>> {
        let (prefix, key) = match self.route_for(effective) {
            Route::Generic => {
                debug!(model = ?effective.model, "routing to generic backend");
                return Ok(self.inner.generic.clone());
            }
            Route::Specialized { prefix, key } => (prefix, key),
        };

        let factory = self
            .inner
            .providers
            .iter()
            .find(|provider| provider.prefix == prefix)
            .map(|provider| provider.factory.clone())
            .ok_or_else(|| {
                ResearchError::InvalidConfig(format!("no factory registered for `{prefix}`"))
            })?;

        debug!(model = %key.model, prefix = %prefix, "routing to specialized client");
        self.inner
            .cache
            .get_or_try_build(&key, || async {
                let client = factory.build(&key.model, &key.api_key, effective).await?;
                info!(model = %key.model, prefix = %prefix, "model client constructed");
                Ok(client)
            })
            .await
    }
}

/// An invocation interface with bound default configuration.
#[derive(Clone)]
pub struct BoundModel {
    multiplexer: ModelMultiplexer,
    defaults: ModelConfig,
}

impl BoundModel {
    pub fn defaults(&self) -> &ModelConfig {
        &self.defaults
    }

    /// New interface whose defaults are `self`'s overridden by `configurable`.
    /// Per-call configuration still takes precedence over both.
    pub fn with_configurable(&self, configurable: ModelConfig) -> ResearchResult<BoundModel> {
        Ok(BoundModel {
            multiplexer: self.multiplexer.clone(),
            defaults: self.defaults.merged_with(&configurable)?,
        })
    }

    pub fn effective_config(&self, run: Option<&RunConfig>) -> ResearchResult<ModelConfig> {
        let effective = match run {
            Some(run) => self.defaults.merged_with(&run.configurable)?,
            None => self.defaults.clone(),
        };
        effective.validate()?;
        Ok(effective)
    }

    #[instrument(skip(self, prompt, run))]
    pub async fn invoke(
        &self,
        prompt: impl Into<Prompt>,
        run: Option<&RunConfig>,
    ) -> ResearchResult<ModelOutput> {
        let effective = self.effective_config(run)?;
        let client = self.multiplexer.resolve(&effective).await?;
        let messages = prompt.into().into_messages();

        match effective.timeout_ms {
            Some(timeout_ms) => {
                tokio::time::timeout(
                    Duration::from_millis(timeout_ms),
                    client.invoke(messages, &effective),
                )
                .await
                .map_err(|_| ResearchError::Timeout(timeout_ms))?
            }
            None => client.invoke(messages, &effective).await,
        }
    }

    /// Routes like [`BoundModel::invoke`]. The returned stream is consumed
    /// lazily; dropping it cancels the underlying request. A configured
    /// timeout bounds establishing the stream, not draining it.
    #[instrument(skip(self, prompt, run))]
    pub async fn stream(
        &self,
        prompt: impl Into<Prompt>,
        run: Option<&RunConfig>,
    ) -> ResearchResult<ModelChunkStream> {
        let effective = self.effective_config(run)?;
        let client = self.multiplexer.resolve(&effective).await?;
        let messages = prompt.into().into_messages();

        let mut inner = match effective.timeout_ms {
            Some(timeout_ms) => tokio::time::timeout(
                Duration::from_millis(timeout_ms),
                client.stream(messages, &effective),
            )
            .await
            .map_err(|_| ResearchError::Timeout(timeout_ms))??,
            None => client.stream(messages, &effective).await?,
        };

        let model = effective.model.unwrap_or_default();
        Ok(Box::pin(stream! {
            let mut chunks = 0_u64;
            while let Some(item) = inner.next().await {
                chunks += 1;
                yield item;
            }
            debug!(model = %model, chunks, "model stream finished");
        }))
    }
}
