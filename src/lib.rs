//! # Market Context Builder
//!
//! A library for turning already-fetched market and macro data into a short,
//! region-specific "Market Context" commentary whose every number traces back
//! to the input.
//!
//! ## Core Concepts
//!
//! - **Normalized payload**: the validated facts for one period and region. Missing values
//!   are the literal placeholder "not provided"; fund-attribution language is rejected.
//! - **Index events**: single trading days whose benchmark return deviates from the window
//!   mean by at least a configured multiple of its standard deviation.
//! - **Region salience**: a closed table deciding which fields a region foregrounds.
//! - **Bounded repair**: a rejected draft gets exactly one critique-and-regenerate cycle.
//!
//! ## Example
//!
//! ```rust,ignore
//! use market_context_builder::*;
//!
//! let raw = RawMarketContext {
//!     benchmark_return_total_pct: Some(-1.79),
//!     ..RawMarketContext::new("Q2 2025", "U.S. equities (small-cap)", "Russell 2000")
//! };
//! let payload = NormalizedPayload::construct(raw)?;
//!
//! let pipeline = CommentaryPipeline::new(PipelineConfig::default(), my_generator);
//! let commentary = pipeline
//!     .run_with_returns(payload, &daily_returns, "U.S. equities (small-cap)")
//!     .await?;
//! println!("{}", commentary.markdown_text);
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod generator;
pub mod lexicon;
pub mod pipeline;
pub mod presets;
pub mod prompts;
pub mod relevance;
pub mod schema;
pub mod service;
pub mod utils;
pub mod validator;

#[cfg(feature = "gemini")]
pub mod llm;

pub use config::{GeneratorSettings, PipelineConfig, StyleRules, DEFAULT_HEADING};
pub use error::{ErrorCategory, MarketContextError, Result, SchemaViolation};
pub use events::{
    describe_events, detect, returns_from_prices, Baseline, DailyReturn, DetectorConfig,
    EventDetector, IndexEvent,
};
pub use generator::TextGenerator;
pub use lexicon::{
    contains_forbidden_term, extract_numerals, find_forbidden_terms, is_placeholder,
    FORBIDDEN_TERMS, PLACEHOLDER,
};
pub use pipeline::{attach_events, CommentaryPipeline, CommentaryStats, GeneratedCommentary};
pub use presets::{
    benchmark_symbol, benchmarks, preset_by_id, preset_by_label, RegionPreset, REGION_PRESETS,
};
pub use prompts::{PromptAssembler, PromptMessages};
pub use relevance::{select, RegionProfile, Salience, TrimmedPayload};
pub use schema::*;
pub use service::{
    CommentaryRequest, CommentaryResponse, CommentaryService, ErrorBody, MarketDataSource,
    PresetCatalog, StaticMarketData, EARLIEST_QUARTER,
};
pub use utils::*;
pub use validator::{
    critique, paragraph_count, referenced_events, word_count, CheckKind, CheckResult,
    DraftValidator, ValidationReport,
};

/// Validates raw input and attaches the events detected in `returns`.
///
/// This is the deterministic half of the pipeline: no generator involved.
pub fn build_payload(
    raw: RawMarketContext,
    returns: &[DailyReturn],
    detector: &DetectorConfig,
) -> Result<NormalizedPayload> {
    let payload = NormalizedPayload::construct(raw)?;
    attach_events(payload, returns, &EventDetector::new(detector.clone()))
}
