use crate::config::StyleRules;
use crate::error::Result;
use crate::events::IndexEvent;
use crate::lexicon::{FORBIDDEN_TERMS, PLACEHOLDER};
use crate::relevance::TrimmedPayload;
use serde::{Deserialize, Serialize};

/// The two messages sent to the text-completion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessages {
    pub system: String,
    pub user: String,
}

impl PromptMessages {
    /// The original prompt with a correction directive appended to the user turn.
    pub fn with_correction(&self, critique: &str) -> Self {
        Self {
            system: self.system.clone(),
            user: format!(
                "{}\n\nCORRECTION REQUIRED:\nYour previous draft was rejected. {}\n\
                 Rewrite the full Market Context from scratch. Keep every fact and number from INPUT unchanged.",
                self.user, critique
            ),
        }
    }
}

pub struct PromptAssembler {
    rules: StyleRules,
}

impl PromptAssembler {
    pub fn new(rules: StyleRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &StyleRules {
        &self.rules
    }

    pub fn system_message(&self) -> String {
        let r = &self.rules;
        let forbidden = FORBIDDEN_TERMS
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "You are a factual investment commentator. Write the Market Context for the specified period.\n\
             \n\
             ## HARD RULES\n\
             - Use only the data in INPUT and EVENTS.\n\
             - No fund or portfolio mentions and no first-person voice. Never use these words: {forbidden}.\n\
             - If a data point is missing, write \"{placeholder}\". Do not invent numbers.\n\
             - Copy every number exactly as written in INPUT or EVENTS, with the same digits and decimals. Do not round.\n\
             - Do not leave bracketed placeholders such as [value].\n\
             \n\
             ## DELIVERABLE\n\
             - Begin with the line '{heading}' followed by a blank line.\n\
             - {min_words} to {max_words} words; {min_paras} to {max_paras} paragraphs after the heading, separated by blank lines.\n\
             - Paragraph 1: macro and policy (inflation, rates, growth, FX and credit, notable policy or geopolitics).\n\
             - Paragraph 2: market behavior (index return, volatility, sector trends, style rotation, breadth and concentration).\n\
             - Add a paragraph on notable events only if EVENTS is non-empty; cite each event's date and one_day_move_pct exactly, neutrally.\n\
             \n\
             ## STYLE\n\
             Factual, concise, client-friendly. No forecasts.",
            forbidden = forbidden,
            placeholder = PLACEHOLDER,
            heading = r.heading,
            min_words = r.min_words,
            max_words = r.max_words,
            min_paras = r.min_paragraphs,
            max_paras = r.max_paragraphs,
        )
    }

    pub fn assemble(
        &self,
        trimmed: &TrimmedPayload<'_>,
        region: &str,
        flagged_events: &[IndexEvent],
    ) -> Result<PromptMessages> {
        let input_json = trimmed.to_prompt_json()?;
        let events_json = serde_json::to_string(flagged_events)?;

        let foreground = trimmed
            .foreground_keys()
            .iter()
            .map(|k| k.path())
            .collect::<Vec<_>>()
            .join(", ");
        let hints = trimmed.profile.hints().join(" ");
        let fx_pairs = trimmed.profile.fx_pairs().join(", ");
        let us_guard = if trimmed.profile.is_us() {
            ""
        } else {
            " Avoid U.S.-centric details if region is not U.S."
        };

        let user = format!(
            "INPUT JSON:\n{input}\n\n\
             EVENTS:\n{events}\n\n\
             Region focus: {region}. Tailor all context to this region and the stated benchmark. \
             Do not generalize across regions; if inputs are U.S.-only, treat them as global backdrop.{us_guard}\n\n\
             Salience guidance: foreground these categories, in order: {foreground}. \
             Fields marked background are secondary context. {hints} \
             FX pairs of interest: {fx_pairs}.",
            input = input_json,
            events = events_json,
            region = region.trim(),
            us_guard = us_guard,
            foreground = foreground,
            hints = hints,
            fx_pairs = fx_pairs,
        );

        Ok(PromptMessages {
            system: self.system_message(),
            user,
        })
    }
}
