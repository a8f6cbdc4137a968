//! Engine - generation source + scheduler + sampling defaults
//!
//! The engine bundles everything a template needs to fill its holes: which
//! generation source to call, which scheduler carries the consumption
//! tasks, and the default model/temperature. One engine is shared across
//! any number of templates and standalone completions.

use std::sync::Arc;

use crate::completion::CompletionBuilder;
use crate::config::WeftConfig;
use crate::error::{Result, WeftError};
use crate::provider::{Context, GenerationSource, OpenAiSource};
use crate::runtime::Scheduler;
use crate::util::constants::DEFAULT_TEMPERATURE;

pub struct Engine {
    source: Arc<dyn GenerationSource>,
    scheduler: Arc<Scheduler>,
    model: String,
    temperature: f64,
}

impl Engine {
    /// Engine over a source with shared scheduler and source defaults.
    pub fn new(source: Arc<dyn GenerationSource>) -> Arc<Self> {
        let model = source.default_model().to_string();
        Arc::new(Self {
            source,
            scheduler: Scheduler::shared(),
            model,
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    pub fn builder(source: Arc<dyn GenerationSource>) -> EngineBuilder {
        EngineBuilder {
            source,
            scheduler: None,
            model: None,
            temperature: None,
        }
    }

    /// Engine over the OpenAI-compatible source described by a config.
    pub fn from_config(config: &WeftConfig) -> Result<Arc<Self>> {
        if config.resolved_api_key().is_none() {
            return Err(WeftError::MissingApiKey);
        }
        let source = OpenAiSource::from_config(config).map_err(|e| WeftError::Config {
            reason: format!("{e:#}"),
        })?;
        Ok(Arc::new(Self {
            source: Arc::new(source),
            scheduler: Scheduler::shared(),
            model: config.resolved_model(),
            temperature: config.resolved_temperature(),
        }))
    }

    pub fn source(&self) -> &Arc<dyn GenerationSource> {
        &self.source
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// A completion builder pre-wired to this engine.
    pub fn completion(&self, context: impl Into<Context>) -> CompletionBuilder {
        self.hole().context(context)
    }

    /// Pre-wired builder without a context; the graph compiler supplies a
    /// cell-prefix context after the sequence freezes.
    pub(crate) fn hole(&self) -> CompletionBuilder {
        crate::completion::Completion::builder()
            .source(Arc::clone(&self.source))
            .scheduler(Arc::clone(&self.scheduler))
            .model(self.model.clone())
            .temperature(self.temperature)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("source", &self.source.name())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

pub struct EngineBuilder {
    source: Arc<dyn GenerationSource>,
    scheduler: Option<Arc<Scheduler>>,
    model: Option<String>,
    temperature: Option<f64>,
}

impl EngineBuilder {
    pub fn scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn build(self) -> Arc<Engine> {
        let model = self
            .model
            .unwrap_or_else(|| self.source.default_model().to_string());
        Arc::new(Engine {
            source: self.source,
            scheduler: self.scheduler.unwrap_or_else(Scheduler::shared),
            model,
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockSource;

    #[test]
    fn engine_defaults_come_from_the_source() {
        let engine = Engine::new(MockSource::new(["x"]));
        assert_eq!(engine.model(), "gpt-4o-mini");
        assert_eq!(engine.temperature(), DEFAULT_TEMPERATURE);
    }

    #[test]
    fn builder_overrides_defaults() {
        let scheduler = Scheduler::new().unwrap();
        let engine = Engine::builder(MockSource::new(["x"]))
            .model("gpt-4o")
            .temperature(0.2)
            .scheduler(Arc::clone(&scheduler))
            .build();
        assert_eq!(engine.model(), "gpt-4o");
        assert_eq!(engine.temperature(), 0.2);
        assert!(Arc::ptr_eq(engine.scheduler(), &scheduler));
        scheduler.shutdown();
    }
}
