use crate::config::PipelineConfig;
use crate::error::{MarketContextError, Result};
use crate::events::{describe_events, DailyReturn, EventDetector, IndexEvent};
use crate::generator::TextGenerator;
use crate::prompts::{PromptAssembler, PromptMessages};
use crate::relevance::select;
use crate::schema::NormalizedPayload;
use crate::validator::{critique, paragraph_count, referenced_events, word_count, DraftValidator};
use log::{debug, info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommentaryStats {
    pub words: usize,
    pub paragraphs: usize,
}

/// A validated commentary together with the facts it was written from.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedCommentary {
    pub markdown_text: String,
    /// Detected events whose dates the accepted draft actually mentions.
    pub flagged_events: Vec<IndexEvent>,
    pub source_payload: NormalizedPayload,
    pub stats: CommentaryStats,
    /// True when the accepted draft came from the repair cycle.
    pub repaired: bool,
}

/// Detects outsized moves in `returns`, describes them and attaches them to
/// the payload.
pub fn attach_events(
    payload: NormalizedPayload,
    returns: &[DailyReturn],
    detector: &EventDetector,
) -> Result<NormalizedPayload> {
    let events = detector.detect(returns);
    info!(
        "Detected {} index-level events across {} observations",
        events.len(),
        returns.len()
    );
    let events = describe_events(&events, payload.benchmark());
    payload.with_events(events)
}

/// Sequences selection, prompting, generation and validation for one request.
///
/// A rejected draft gets exactly one critique-and-regenerate cycle. A second
/// rejection ends the run with `ValidationFailure`.
pub struct CommentaryPipeline<G> {
    config: PipelineConfig,
    generator: G,
}

impl<G: TextGenerator> CommentaryPipeline<G> {
    pub fn new(config: PipelineConfig, generator: G) -> Self {
        Self { config, generator }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn detector(&self) -> EventDetector {
        EventDetector::new(self.config.detector.clone())
    }

    /// Detects events in `returns`, attaches them to the payload and runs.
    /// A degenerate series simply yields no events.
    pub async fn run_with_returns(
        &self,
        payload: NormalizedPayload,
        returns: &[DailyReturn],
        region: &str,
    ) -> Result<GeneratedCommentary> {
        let payload = attach_events(payload, returns, &self.detector())?;
        self.run(payload, region).await
    }

    /// Runs the pipeline on a payload whose events are already attached.
    pub async fn run(&self, payload: NormalizedPayload, region: &str) -> Result<GeneratedCommentary> {
        let style = self.config.style.clone();
        let validator = DraftValidator::for_payload(style.clone(), &payload)?;

        let messages = {
            let trimmed = select(&payload, region);
            info!(
                "Generating commentary for {} / {} ({:?} profile)",
                payload.period(),
                region,
                trimmed.profile
            );
            PromptAssembler::new(style.clone()).assemble(
                &trimmed,
                region,
                payload.index_level_events(),
            )?
        };

        let draft = self.generate(&messages).await?;
        let report = validator.validate(&draft);
        if report.is_valid() {
            return Ok(self.finish(draft, payload, false));
        }

        warn!("Draft rejected: {}", report.summary());
        let correction = critique(&report, &style);
        debug!("Issuing repair with critique:\n{}", correction);

        let draft = self.generate(&messages.with_correction(&correction)).await?;
        let report = validator.validate(&draft);
        if report.is_valid() {
            info!("Repaired draft accepted");
            return Ok(self.finish(draft, payload, true));
        }

        warn!("Repaired draft rejected: {}", report.summary());
        Err(MarketContextError::ValidationFailure { report })
    }

    async fn generate(&self, messages: &PromptMessages) -> Result<String> {
        let text = self
            .generator
            .complete(&messages.system, &messages.user)
            .await?;
        Ok(text.trim().to_string())
    }

    fn finish(&self, draft: String, payload: NormalizedPayload, repaired: bool) -> GeneratedCommentary {
        let flagged_events = referenced_events(&draft, payload.index_level_events());
        let stats = CommentaryStats {
            words: word_count(&draft),
            paragraphs: paragraph_count(&draft, &self.config.style.heading),
        };
        info!(
            "Commentary accepted: {} words, {} paragraphs, {} of {} events cited",
            stats.words,
            stats.paragraphs,
            flagged_events.len(),
            payload.index_level_events().len()
        );
        GeneratedCommentary {
            markdown_text: draft,
            flagged_events,
            source_payload: payload,
            stats,
            repaired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use crate::schema::RawMarketContext;
    use crate::validator::CheckKind;
    use chrono::NaiveDate;
    use futures::future::BoxFuture;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned drafts and records every user message it receives.
    struct ScriptedGenerator {
        drafts: Mutex<VecDeque<Result<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(drafts: Vec<Result<String>>) -> Self {
            Self {
                drafts: Mutex::new(drafts.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn prompt(&self, idx: usize) -> String {
            self.prompts.lock().unwrap()[idx].clone()
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn complete<'a>(&'a self, _system: &'a str, user: &'a str) -> BoxFuture<'a, Result<String>> {
            Box::pin(async move {
                self.prompts.lock().unwrap().push(user.to_string());
                self.drafts
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Err(MarketContextError::Transport("script exhausted".into())))
            })
        }
    }

    const REGION: &str = "U.S. equities (small-cap)";

    fn payload() -> NormalizedPayload {
        NormalizedPayload::construct(RawMarketContext {
            benchmark_return_total_pct: Some(-1.79),
            ..RawMarketContext::new("Q2 2025", REGION, "Russell 2000")
        })
        .unwrap()
    }

    fn april_returns() -> Vec<DailyReturn> {
        [0.3, -0.2, 0.1, -0.4, 0.2, 0.5, -0.1, 9.5, 0.0, -0.3]
            .iter()
            .enumerate()
            .map(|(i, r)| DailyReturn::new(NaiveDate::from_ymd_opt(2025, 4, i as u32 + 1).unwrap(), *r))
            .collect()
    }

    fn words(n: usize) -> String {
        vec!["markets"; n].join(" ")
    }

    /// Heading plus two paragraphs; the closing sentence lands in the second.
    fn draft(closing: &str) -> String {
        format!(
            "## Market Context\n\n{}\n\n{} {}",
            words(90),
            words(80),
            closing
        )
    }

    #[tokio::test]
    async fn test_valid_first_draft_needs_one_call() {
        let gen = ScriptedGenerator::new(vec![Ok(draft(
            "The Russell 2000 returned -1.79% in Q2 2025.",
        ))]);
        let pipeline = CommentaryPipeline::new(PipelineConfig::default(), gen);

        let out = pipeline.run(payload(), REGION).await.unwrap();
        assert_eq!(pipeline.generator().calls(), 1);
        assert!(!out.repaired);
        assert!(out.markdown_text.starts_with("## Market Context"));
        assert_eq!(out.stats.paragraphs, 2);
        assert_eq!(out.source_payload.benchmark(), "Russell 2000");
    }

    #[tokio::test]
    async fn test_missing_heading_twice_fails_after_one_repair() {
        let no_heading = draft("Returns were -1.79%.").replacen("## Market Context\n\n", "", 1);
        let gen = ScriptedGenerator::new(vec![
            Ok(no_heading.clone()),
            Ok(no_heading.clone()),
            Ok(draft("never requested")),
        ]);
        let pipeline = CommentaryPipeline::new(PipelineConfig::default(), gen);

        let err = pipeline.run(payload(), REGION).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::ValidationFailure);
        match err {
            MarketContextError::ValidationFailure { report } => {
                assert!(report.has_failed(CheckKind::Heading));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(pipeline.generator().calls(), 2);
        let repair_prompt = pipeline.generator().prompt(1);
        assert!(repair_prompt.starts_with(&pipeline.generator().prompt(0)));
        assert!(repair_prompt.contains("CORRECTION REQUIRED"));
        assert!(repair_prompt.contains("- heading: expected first line is '## Market Context'"));
    }

    #[tokio::test]
    async fn test_repair_can_succeed() {
        let gen = ScriptedGenerator::new(vec![
            Ok(draft("We saw returns of -1.79%.")),
            Ok(draft("The index returned -1.79%.")),
        ]);
        let pipeline = CommentaryPipeline::new(PipelineConfig::default(), gen);

        let out = pipeline.run(payload(), REGION).await.unwrap();
        assert!(out.repaired);
        assert_eq!(pipeline.generator().calls(), 2);
        assert!(pipeline.generator().prompt(1).contains("forbidden terms"));
    }

    #[tokio::test]
    async fn test_transport_error_is_not_repaired() {
        let gen = ScriptedGenerator::new(vec![Err(MarketContextError::Transport(
            "timed out".into(),
        ))]);
        let pipeline = CommentaryPipeline::new(PipelineConfig::default(), gen);

        let err = pipeline.run(payload(), REGION).await.unwrap_err();
        assert_eq!(err.category(), ErrorCategory::TransportError);
        assert_eq!(pipeline.generator().calls(), 1);
    }

    #[tokio::test]
    async fn test_outsized_move_must_be_cited_verbatim() {
        let gen = ScriptedGenerator::new(vec![
            Ok(draft("On April 8 the index jumped 9.50%, ending the quarter at -1.79%.")),
            Ok(draft("On April 8 the index jumped 9.5%, ending the quarter at -1.79%.")),
        ]);
        let pipeline = CommentaryPipeline::new(PipelineConfig::default(), gen);

        let out = pipeline
            .run_with_returns(payload(), &april_returns(), REGION)
            .await
            .unwrap();

        let events = out.source_payload.index_level_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].date, NaiveDate::from_ymd_opt(2025, 4, 8).unwrap());
        assert_eq!(events[0].one_day_move_pct, 9.5);

        assert!(out.repaired);
        assert_eq!(out.flagged_events, events.to_vec());
        assert!(pipeline.generator().prompt(0).contains("\"one_day_move_pct\":9.5"));
    }

    #[tokio::test]
    async fn test_unreferenced_event_is_not_flagged() {
        let mut config = PipelineConfig::default();
        config.style.require_event_citations = false;
        let gen = ScriptedGenerator::new(vec![Ok(draft("The quarter ended at -1.79%."))]);
        let pipeline = CommentaryPipeline::new(config, gen);

        let out = pipeline
            .run_with_returns(payload(), &april_returns(), REGION)
            .await
            .unwrap();
        assert_eq!(out.source_payload.index_level_events().len(), 1);
        assert!(out.flagged_events.is_empty());
    }

    #[tokio::test]
    async fn test_flat_series_yields_no_events() {
        let flat: Vec<DailyReturn> = (1..=10)
            .map(|d| DailyReturn::new(NaiveDate::from_ymd_opt(2025, 4, d).unwrap(), 0.4))
            .collect();
        let gen = ScriptedGenerator::new(vec![Ok(draft("Returns were -1.79%."))]);
        let pipeline = CommentaryPipeline::new(PipelineConfig::default(), gen);

        let out = pipeline.run_with_returns(payload(), &flat, REGION).await.unwrap();
        assert!(out.source_payload.index_level_events().is_empty());
        assert!(!pipeline.generator().prompt(0).contains("one_day_move_pct"));
    }
}
