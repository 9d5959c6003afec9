use crate::config::PipelineConfig;
use crate::error::{ErrorCategory, MarketContextError, Result, SchemaViolation};
use crate::events::{returns_from_prices, DailyReturn, IndexEvent};
use crate::generator::TextGenerator;
use crate::pipeline::{CommentaryPipeline, CommentaryStats, GeneratedCommentary};
use crate::presets::{benchmark_symbol, benchmarks, preset_by_label, RegionPreset, REGION_PRESETS};
use crate::schema::{NormalizedPayload, RawMarketContext};
use crate::utils::{last_complete_quarter, period_bounds, quarters_desc};
use crate::validator::CheckKind;
use chrono::NaiveDate;
use futures::future::BoxFuture;
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentaryRequest {
    pub period: String,
    pub market_region: String,
    /// Falls back to the region preset's benchmark when omitted.
    #[serde(default)]
    pub benchmark: Option<String>,
    #[serde(default)]
    pub para_min: Option<usize>,
    #[serde(default)]
    pub para_max: Option<usize>,
    #[serde(default)]
    pub z_threshold: Option<f64>,
    #[serde(default)]
    pub max_events: Option<usize>,
}

impl CommentaryRequest {
    pub fn new(period: impl Into<String>, market_region: impl Into<String>) -> Self {
        Self {
            period: period.into(),
            market_region: market_region.into(),
            benchmark: None,
            para_min: None,
            para_max: None,
            z_threshold: None,
            max_events: None,
        }
    }

    pub fn with_benchmark(mut self, benchmark: impl Into<String>) -> Self {
        self.benchmark = Some(benchmark.into());
        self
    }

    /// The requested benchmark, or the preset default for the region.
    pub fn resolved_benchmark(&self) -> Option<String> {
        self.benchmark
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .or_else(|| preset_by_label(&self.market_region).map(|p| p.benchmark.to_string()))
    }

    fn apply_overrides(&self, base: &PipelineConfig) -> Result<PipelineConfig> {
        let mut config = base.clone();
        if let Some(v) = self.para_min {
            config.style.min_paragraphs = v;
        }
        if let Some(v) = self.para_max {
            config.style.max_paragraphs = v;
        }
        if let Some(v) = self.z_threshold {
            config.detector.threshold_sigma = v;
        }
        if let Some(v) = self.max_events {
            config.detector.max_events = Some(v);
        }
        config.validate().map_err(|e| {
            MarketContextError::schema(SchemaViolation::InvalidFormat, "request", e.to_string())
        })?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentaryResponse {
    pub markdown: String,
    pub flagged_events: Vec<IndexEvent>,
    pub normalized_payload: NormalizedPayload,
    pub stats: CommentaryStats,
}

impl From<GeneratedCommentary> for CommentaryResponse {
    fn from(c: GeneratedCommentary) -> Self {
        Self {
            markdown: c.markdown_text,
            flagged_events: c.flagged_events,
            normalized_payload: c.source_payload,
            stats: c.stats,
        }
    }
}

/// Body of a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub category: ErrorCategory,
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_checks: Vec<CheckKind>,
}

impl From<&MarketContextError> for ErrorBody {
    fn from(err: &MarketContextError) -> Self {
        let category = err.category();
        let failed_checks = match err {
            MarketContextError::ValidationFailure { report } => report.failed_checks(),
            _ => Vec::new(),
        };
        Self {
            category,
            status: category.http_status(),
            message: err.to_string(),
            failed_checks,
        }
    }
}

/// Oldest quarter offered in the preset catalog.
pub const EARLIEST_QUARTER: &str = "Q1 2023";

/// Selectable periods, regions and benchmarks for a request form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresetCatalog {
    pub quarters: Vec<String>,
    pub regions: &'static [RegionPreset],
    pub benchmarks: Vec<&'static str>,
}

/// The upstream data collaborator.
///
/// Raw context is infallible: adapter failures must already have become
/// missing values, which normalization turns into placeholders. The return
/// series fetch may fail with a transport error.
pub trait MarketDataSource: Send + Sync {
    fn market_context<'a>(
        &'a self,
        period: &'a str,
        market_region: &'a str,
        benchmark: &'a str,
    ) -> BoxFuture<'a, RawMarketContext>;

    /// `symbol` is the tradable proxy for the benchmark when one is known,
    /// otherwise the benchmark name itself.
    fn daily_returns<'a>(
        &'a self,
        symbol: &'a str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BoxFuture<'a, Result<Vec<DailyReturn>>>;
}

/// In-memory data source: one context template and one return series.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    template: RawMarketContext,
    returns: Vec<DailyReturn>,
}

impl StaticMarketData {
    pub fn new(template: RawMarketContext, returns: Vec<DailyReturn>) -> Self {
        Self { template, returns }
    }

    pub fn from_prices(template: RawMarketContext, prices: &[(NaiveDate, f64)]) -> Self {
        Self::new(template, returns_from_prices(prices))
    }

    pub fn from_json_file(path: impl AsRef<std::path::Path>, returns: Vec<DailyReturn>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&text)?, returns))
    }
}

impl MarketDataSource for StaticMarketData {
    fn market_context<'a>(
        &'a self,
        period: &'a str,
        market_region: &'a str,
        benchmark: &'a str,
    ) -> BoxFuture<'a, RawMarketContext> {
        Box::pin(async move {
            RawMarketContext {
                period: Some(period.to_string()),
                market_region: Some(market_region.to_string()),
                benchmark: Some(benchmark.to_string()),
                ..self.template.clone()
            }
        })
    }

    fn daily_returns<'a>(
        &'a self,
        _symbol: &'a str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> BoxFuture<'a, Result<Vec<DailyReturn>>> {
        Box::pin(async move {
            Ok(self
                .returns
                .iter()
                .filter(|r| r.date >= start && r.date <= end)
                .copied()
                .collect())
        })
    }
}

/// Request/response contract for exposing the pipeline over a service boundary.
///
/// Routing is left to the host application. A request becomes either a response
/// body or a categorized error body with the status code the host should send.
pub struct CommentaryService<G, D> {
    config: PipelineConfig,
    generator: G,
    data: D,
}

impl<G: TextGenerator, D: MarketDataSource> CommentaryService<G, D> {
    pub fn new(config: PipelineConfig, generator: G, data: D) -> Self {
        Self {
            config,
            generator,
            data,
        }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// request -> fetch -> construct -> detect -> pipeline.
    pub async fn handle(&self, request: &CommentaryRequest) -> Result<CommentaryResponse> {
        let config = request.apply_overrides(&self.config)?;
        let benchmark = request.resolved_benchmark().ok_or_else(|| {
            MarketContextError::schema(
                SchemaViolation::MissingField,
                "benchmark",
                "no benchmark given and no preset for this region",
            )
        })?;

        let raw = self
            .data
            .market_context(&request.period, &request.market_region, &benchmark)
            .await;
        let payload = NormalizedPayload::construct(raw)?;
        info!(
            "Payload ready for {} / {} / {}",
            payload.period(),
            payload.market_region(),
            payload.benchmark()
        );

        let (start, end) = period_bounds(payload.period())?;
        let symbol = benchmark_symbol(payload.benchmark()).unwrap_or(payload.benchmark());
        info!(
            "Fetching daily returns for {} ({}) from {} to {}",
            payload.benchmark(),
            symbol,
            start,
            end
        );
        let returns = self.data.daily_returns(symbol, start, end).await?;

        let region = payload.market_region().to_string();
        let pipeline = CommentaryPipeline::new(config, &self.generator);
        let commentary = pipeline.run_with_returns(payload, &returns, &region).await?;
        Ok(commentary.into())
    }

    /// Completed quarters back to [`EARLIEST_QUARTER`], newest first, plus the
    /// region presets and known benchmarks.
    pub fn presets(&self, today: NaiveDate) -> Result<PresetCatalog> {
        Ok(PresetCatalog {
            quarters: quarters_desc(&last_complete_quarter(today), EARLIEST_QUARTER)?,
            regions: REGION_PRESETS,
            benchmarks: benchmarks().collect(),
        })
    }

    /// Status code and JSON body the host should send back.
    pub async fn respond(&self, request: &CommentaryRequest) -> (u16, serde_json::Value) {
        let outcome = self
            .handle(request)
            .await
            .and_then(|resp| Ok(serde_json::to_value(resp)?));
        match outcome {
            Ok(body) => (200, body),
            Err(err) => {
                warn!("Request failed ({:?}): {}", err.category(), err);
                let body = ErrorBody::from(&err);
                let status = body.status;
                let value = serde_json::to_value(&body).unwrap_or_else(
                    |_| serde_json::json!({ "category": "internal_error", "status": 500 }),
                );
                (status, value)
            }
        }
    }
}
