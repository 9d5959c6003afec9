use crate::error::Result;
use crate::schema::{
    BreadthMeasure, FieldKey, MacroCategory, NormalizedPayload, SectorTheme, StyleFactor,
};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// "ex-Japan", "ex U.S." and similar exclusions inside a region label.
static EXCLUSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bex[-\s]+(?:u\.s\.|u\.k\.|[a-z]+)").expect("exclusion pattern is valid")
});

/// Region salience: which macro and thematic fields a narrative for a given
/// market region should foreground.
///
/// The table is closed. Unknown regions resolve to [`RegionProfile::Default`],
/// so every declared region still produces a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionProfile {
    UsSmallCap,
    UsBroad,
    EmergingMarkets,
    Europe,
    UnitedKingdom,
    Japan,
    InternationalDeveloped,
    Global,
    /// Domestic-macro ordering used for any region the table does not know.
    Default,
}

use BreadthMeasure as B;
use FieldKey::{Breadth, Macro, SectorThemes, Style};
use MacroCategory as M;
use StyleFactor as S;

impl RegionProfile {
    /// Matches on the label with any "ex-<market>" exclusion removed, so
    /// "Asia ex-Japan" never picks up the Japan profile.
    pub fn resolve(region: &str) -> Self {
        let lower = EXCLUSION_RE
            .replace_all(&region.to_lowercase(), " ")
            .into_owned();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has_word = |w: &str| words.contains(&w);

        let profile = if lower.contains("emerging") {
            Self::EmergingMarkets
        } else if lower.contains("europe") || lower.contains("euro area") {
            Self::Europe
        } else if lower.contains("united kingdom") || has_word("uk") || lower.contains("u.k.") {
            Self::UnitedKingdom
        } else if lower.contains("japan") {
            Self::Japan
        } else if lower.contains("international")
            || has_word("eafe")
            || has_word("pacific")
            || has_word("asia")
        {
            Self::InternationalDeveloped
        } else if lower.contains("global") || lower.contains("world") || has_word("acwi") {
            Self::Global
        } else if lower.contains("small-cap") || lower.contains("small cap") {
            Self::UsSmallCap
        } else if lower.contains("u.s.") || has_word("us") || lower.contains("united states") {
            Self::UsBroad
        } else {
            Self::Default
        };

        debug!("Region '{}' resolved to profile {:?}", region, profile);
        profile
    }

    /// Fields to foreground, most salient first.
    pub fn priorities(self) -> &'static [FieldKey] {
        match self {
            Self::UsSmallCap => &[
                Breadth(B::Description),
                Breadth(B::TopNamesContributionPct),
                Breadth(B::AdvanceDecline),
                Style(S::Size),
                Style(S::Quality),
                Macro(M::PolicyRate),
                Macro(M::Credit),
                Macro(M::Growth),
                Macro(M::Inflation),
            ],
            Self::UsBroad => &[
                Macro(M::Inflation),
                Macro(M::PolicyRate),
                Macro(M::Employment),
                Macro(M::Yields),
                Macro(M::Growth),
                Style(S::ValueVsGrowth),
                Breadth(B::Description),
                SectorThemes,
            ],
            Self::EmergingMarkets => &[
                Macro(M::Fx),
                Macro(M::PolicyGeopolitics),
                Macro(M::Commodities),
                Macro(M::Yields),
                Macro(M::Growth),
            ],
            Self::Europe => &[
                Macro(M::Fx),
                Macro(M::PolicyRate),
                Macro(M::Yields),
                Macro(M::Inflation),
                Macro(M::Commodities),
            ],
            Self::UnitedKingdom => &[
                Macro(M::Fx),
                Macro(M::PolicyRate),
                Macro(M::Inflation),
                Macro(M::Yields),
            ],
            Self::Japan => &[
                Macro(M::Fx),
                Macro(M::PolicyRate),
                Macro(M::Yields),
                Macro(M::Growth),
            ],
            Self::InternationalDeveloped => &[
                Macro(M::Fx),
                Macro(M::PolicyRate),
                Macro(M::Growth),
                Macro(M::Commodities),
            ],
            Self::Global => &[
                Macro(M::Growth),
                Macro(M::PolicyRate),
                Macro(M::Yields),
                Macro(M::Fx),
                Macro(M::PolicyGeopolitics),
                SectorThemes,
            ],
            Self::Default => &[
                Macro(M::Inflation),
                Macro(M::PolicyRate),
                Macro(M::Employment),
                Macro(M::Yields),
                Macro(M::Growth),
                Macro(M::Fx),
            ],
        }
    }

    /// Fields explicitly irrelevant to the region. Only these may be dropped.
    pub fn suppressed(self) -> &'static [FieldKey] {
        match self {
            // U.S. labor data is not local context for EM equities.
            Self::EmergingMarkets => &[Macro(M::Employment)],
            _ => &[],
        }
    }

    pub fn is_us(self) -> bool {
        matches!(self, Self::UsSmallCap | Self::UsBroad)
    }

    /// Currency pairs worth citing for the region.
    pub fn fx_pairs(self) -> &'static [&'static str] {
        match self {
            Self::EmergingMarkets => &["USD/CNY", "USD/INR", "USD/BRL"],
            Self::Europe => &["EUR/USD", "EUR/GBP", "USD/CHF"],
            Self::UnitedKingdom => &["GBP/USD", "EUR/GBP"],
            Self::Japan => &["USD/JPY"],
            Self::UsSmallCap | Self::UsBroad => &["USD/JPY", "EUR/USD"],
            Self::InternationalDeveloped | Self::Global | Self::Default => &["EUR/USD", "USD/JPY"],
        }
    }

    pub fn hints(self) -> &'static [&'static str] {
        match self {
            Self::EmergingMarkets => &[
                "Prioritize USD vs EM FX changes and commodities.",
                "Use global rates as backdrop; avoid U.S.-centric labor data.",
                "Reference policy or geopolitical keywords generically.",
            ],
            Self::Europe => &[
                "Prioritize EUR/USD and EUR/GBP and rate changes that affect Europe.",
                "Commodities relevant to Europe can be mentioned briefly.",
            ],
            Self::UnitedKingdom => &[
                "Prioritize sterling moves and the domestic policy rate path.",
            ],
            Self::Japan => &["Prioritize yen moves and domestic policy rate and yields."],
            Self::InternationalDeveloped => &[
                "Prioritize currency moves against the USD and growth across developed markets.",
            ],
            Self::UsSmallCap => &[
                "Prioritize market breadth and concentration, and the size factor.",
                "Treat rates and credit conditions as drivers for smaller companies.",
            ],
            Self::UsBroad | Self::Default => &[
                "Prioritize domestic inflation, policy rate, unemployment and the ten-year yield.",
                "Include USD FX only as secondary context.",
            ],
            Self::Global => &[
                "Prioritize global growth, rates and broad currency moves.",
                "Do not generalize from a single region.",
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Salience {
    Foreground,
    Background,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue<'a> {
    Text(&'a str),
    Themes(&'a [SectorTheme]),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedField<'a> {
    #[serde(rename = "field")]
    pub key: FieldKey,
    pub salience: Salience,
    pub value: FieldValue<'a>,
}

/// A payload view reordered for one region. Borrowed from the source payload.
#[derive(Debug, Clone)]
pub struct TrimmedPayload<'a> {
    pub profile: RegionProfile,
    pub source: &'a NormalizedPayload,
    pub fields: Vec<SelectedField<'a>>,
    pub suppressed: Vec<FieldKey>,
}

impl<'a> TrimmedPayload<'a> {
    pub fn foreground(&self) -> impl Iterator<Item = &SelectedField<'a>> {
        self.fields
            .iter()
            .filter(|f| f.salience == Salience::Foreground)
    }

    pub fn foreground_keys(&self) -> Vec<FieldKey> {
        self.foreground().map(|f| f.key).collect()
    }

    /// Compact JSON for the prompt. Numbers are emitted exactly as the source
    /// payload serializes them.
    pub fn to_prompt_json(&self) -> Result<String> {
        let fields: Vec<serde_json::Value> = self
            .fields
            .iter()
            .map(|f| {
                json!({
                    "field": f.key.path(),
                    "salience": f.salience,
                    "value": f.value,
                })
            })
            .collect();

        let src = self.source;
        let mut doc = json!({
            "period": src.period(),
            "market_region": src.market_region(),
            "benchmark": src.benchmark(),
            "benchmark_return_total_pct": src.benchmark_return_total_pct(),
            "fields": fields,
            "index_level_events": src.index_level_events(),
        });
        if let Some(obj) = doc.as_object_mut() {
            if let Some(q) = src.qualitative_market_move() {
                obj.insert("qualitative_market_move".to_string(), json!(q));
            }
            if let Some(d) = src.disclaimers() {
                obj.insert("disclaimers".to_string(), json!(d));
            }
        }
        Ok(serde_json::to_string(&doc)?)
    }
}

/// Reorders the payload's fields by the region's priority list.
///
/// Prioritized fields come first in priority order; every other field is kept
/// as background in canonical order. Only fields named by the region's
/// suppression rule are dropped.
pub fn select<'a>(payload: &'a NormalizedPayload, region: &str) -> TrimmedPayload<'a> {
    let profile = RegionProfile::resolve(region);
    let suppressed: Vec<FieldKey> = profile.suppressed().to_vec();

    let value_of = |key: FieldKey| -> FieldValue<'a> {
        match payload.field_text(key) {
            Some(text) => FieldValue::Text(text),
            None => FieldValue::Themes(payload.sector_themes()),
        }
    };

    let mut fields: Vec<SelectedField<'a>> = profile
        .priorities()
        .iter()
        .filter(|k| !suppressed.contains(*k))
        .map(|&key| SelectedField {
            key,
            salience: Salience::Foreground,
            value: value_of(key),
        })
        .collect();

    for key in FieldKey::all() {
        if suppressed.contains(&key) || profile.priorities().contains(&key) {
            continue;
        }
        fields.push(SelectedField {
            key,
            salience: Salience::Background,
            value: value_of(key),
        });
    }

    debug!(
        "Selected {} fields for {:?} ({} foreground, {} suppressed)",
        fields.len(),
        profile,
        profile.priorities().len(),
        suppressed.len()
    );

    TrimmedPayload {
        profile,
        source: payload,
        fields,
        suppressed,
    }
}
