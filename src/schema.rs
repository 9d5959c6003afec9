use crate::error::{MarketContextError, Result, SchemaViolation};
use crate::events::IndexEvent;
use crate::lexicon::{extract_numerals, find_forbidden_terms, is_placeholder, or_placeholder};
use crate::utils::validate_period;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const RETURN_PCT_BOUNDS: (f64, f64) = (-100.0, 100.0);

// ---------------------------------------------------------------------------
// Raw input, as handed over by the upstream data adapters.
// ---------------------------------------------------------------------------

/// Free text, or a list of free-text items joined on normalisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TextOrList {
    Text(String),
    List(Vec<String>),
}

impl TextOrList {
    fn joined(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::List(items) => {
                let kept: Vec<&str> = items
                    .iter()
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .collect();
                if kept.is_empty() {
                    None
                } else {
                    Some(kept.join("; "))
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawMacro {
    pub inflation: Option<String>,
    pub policy_rate: Option<String>,
    pub yields: Option<String>,
    pub growth: Option<String>,
    pub employment: Option<String>,
    #[schemars(description = "FX moves, e.g. 'USD/CNY -0.84%; USD/INR +0.31%'")]
    pub fx: Option<String>,
    pub credit: Option<String>,
    pub commodities: Option<String>,
    #[schemars(description = "Policy or geopolitical themes, as one string or a list of keywords")]
    pub policy_geopolitics: Option<TextOrList>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawBreadth {
    pub description: Option<String>,
    pub top_names_contribution_pct: Option<String>,
    pub advance_decline: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawStyleRotation {
    pub value_vs_growth: Option<String>,
    pub size: Option<String>,
    pub quality: Option<String>,
    pub volatility: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawSectorTheme {
    pub sector: Option<String>,
    pub theme: Option<String>,
}

/// Already-fetched market facts for one period and region.
///
/// Every field is optional at this stage; `NormalizedPayload::construct`
/// decides what is required. Index events are not accepted here: they are
/// produced by the event detector and attached with `with_events`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawMarketContext {
    #[schemars(description = "Reporting interval: 'Q# YYYY' or 'YYYY-MM-DD to YYYY-MM-DD'")]
    pub period: Option<String>,

    #[schemars(description = "Market region label, e.g. 'U.S. equities (small-cap)'")]
    pub market_region: Option<String>,

    #[schemars(description = "Display name of the reference index, e.g. 'Russell 2000'")]
    pub benchmark: Option<String>,

    #[schemars(description = "Total return for the period in percent (8.5 means +8.5%). Range -100 to 100.")]
    pub benchmark_return_total_pct: Option<f64>,

    pub qualitative_market_move: Option<String>,

    #[serde(rename = "macro")]
    pub macro_data: Option<RawMacro>,

    pub breadth_concentration: Option<RawBreadth>,

    pub sector_themes: Option<Vec<RawSectorTheme>>,

    pub style_rotation: Option<RawStyleRotation>,

    pub disclaimers: Option<String>,
}

impl RawMarketContext {
    pub fn new(
        period: impl Into<String>,
        market_region: impl Into<String>,
        benchmark: impl Into<String>,
    ) -> Self {
        Self {
            period: Some(period.into()),
            market_region: Some(market_region.into()),
            benchmark: Some(benchmark.into()),
            ..Self::default()
        }
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RawMarketContext)
    }

    pub fn json_schema() -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(Self::generate_json_schema())
    }
}

// ---------------------------------------------------------------------------
// Field addressing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroCategory {
    Inflation,
    PolicyRate,
    Yields,
    Growth,
    Employment,
    Fx,
    Credit,
    Commodities,
    PolicyGeopolitics,
}

impl MacroCategory {
    pub const ALL: [MacroCategory; 9] = [
        Self::Inflation,
        Self::PolicyRate,
        Self::Yields,
        Self::Growth,
        Self::Employment,
        Self::Fx,
        Self::Credit,
        Self::Commodities,
        Self::PolicyGeopolitics,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Inflation => "inflation",
            Self::PolicyRate => "policy_rate",
            Self::Yields => "yields",
            Self::Growth => "growth",
            Self::Employment => "employment",
            Self::Fx => "fx",
            Self::Credit => "credit",
            Self::Commodities => "commodities",
            Self::PolicyGeopolitics => "policy_geopolitics",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleFactor {
    ValueVsGrowth,
    Size,
    Quality,
    Volatility,
}

impl StyleFactor {
    pub const ALL: [StyleFactor; 4] = [
        Self::ValueVsGrowth,
        Self::Size,
        Self::Quality,
        Self::Volatility,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::ValueVsGrowth => "value_vs_growth",
            Self::Size => "size",
            Self::Quality => "quality",
            Self::Volatility => "volatility",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadthMeasure {
    Description,
    TopNamesContributionPct,
    AdvanceDecline,
}

impl BreadthMeasure {
    pub const ALL: [BreadthMeasure; 3] = [
        Self::Description,
        Self::TopNamesContributionPct,
        Self::AdvanceDecline,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::Description => "description",
            Self::TopNamesContributionPct => "top_names_contribution_pct",
            Self::AdvanceDecline => "advance_decline",
        }
    }
}

/// Addresses one macro or thematic field of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "group", content = "field", rename_all = "snake_case")]
pub enum FieldKey {
    Macro(MacroCategory),
    Style(StyleFactor),
    Breadth(BreadthMeasure),
    SectorThemes,
}

impl FieldKey {
    /// Every addressable field in canonical payload order.
    pub fn all() -> Vec<FieldKey> {
        let mut keys: Vec<FieldKey> = MacroCategory::ALL.into_iter().map(Self::Macro).collect();
        keys.push(Self::SectorThemes);
        keys.extend(StyleFactor::ALL.into_iter().map(Self::Style));
        keys.extend(BreadthMeasure::ALL.into_iter().map(Self::Breadth));
        keys
    }

    pub fn path(self) -> String {
        match self {
            Self::Macro(c) => format!("macro.{}", c.key()),
            Self::Style(s) => format!("style_rotation.{}", s.key()),
            Self::Breadth(b) => format!("breadth_concentration.{}", b.key()),
            Self::SectorThemes => "sector_themes".to_string(),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

// ---------------------------------------------------------------------------
// Normalized payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroContext {
    pub inflation: String,
    pub policy_rate: String,
    pub yields: String,
    pub growth: String,
    pub employment: String,
    pub fx: String,
    pub credit: String,
    pub commodities: String,
    pub policy_geopolitics: String,
}

impl MacroContext {
    fn from_raw(raw: Option<&RawMacro>) -> Self {
        let raw = raw.cloned().unwrap_or_default();
        let geo = raw.policy_geopolitics.as_ref().and_then(TextOrList::joined);
        Self {
            inflation: or_placeholder(raw.inflation.as_deref()),
            policy_rate: or_placeholder(raw.policy_rate.as_deref()),
            yields: or_placeholder(raw.yields.as_deref()),
            growth: or_placeholder(raw.growth.as_deref()),
            employment: or_placeholder(raw.employment.as_deref()),
            fx: or_placeholder(raw.fx.as_deref()),
            credit: or_placeholder(raw.credit.as_deref()),
            commodities: or_placeholder(raw.commodities.as_deref()),
            policy_geopolitics: or_placeholder(geo.as_deref()),
        }
    }

    pub fn get(&self, category: MacroCategory) -> &str {
        match category {
            MacroCategory::Inflation => &self.inflation,
            MacroCategory::PolicyRate => &self.policy_rate,
            MacroCategory::Yields => &self.yields,
            MacroCategory::Growth => &self.growth,
            MacroCategory::Employment => &self.employment,
            MacroCategory::Fx => &self.fx,
            MacroCategory::Credit => &self.credit,
            MacroCategory::Commodities => &self.commodities,
            MacroCategory::PolicyGeopolitics => &self.policy_geopolitics,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (MacroCategory, &str)> {
        MacroCategory::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StyleRotation {
    pub value_vs_growth: String,
    pub size: String,
    pub quality: String,
    pub volatility: String,
}

impl StyleRotation {
    fn from_raw(raw: Option<&RawStyleRotation>) -> Self {
        let raw = raw.cloned().unwrap_or_default();
        Self {
            value_vs_growth: or_placeholder(raw.value_vs_growth.as_deref()),
            size: or_placeholder(raw.size.as_deref()),
            quality: or_placeholder(raw.quality.as_deref()),
            volatility: or_placeholder(raw.volatility.as_deref()),
        }
    }

    pub fn get(&self, factor: StyleFactor) -> &str {
        match factor {
            StyleFactor::ValueVsGrowth => &self.value_vs_growth,
            StyleFactor::Size => &self.size,
            StyleFactor::Quality => &self.quality,
            StyleFactor::Volatility => &self.volatility,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreadthConcentration {
    pub description: String,
    pub top_names_contribution_pct: String,
    pub advance_decline: String,
}

impl BreadthConcentration {
    fn from_raw(raw: Option<&RawBreadth>) -> Self {
        let raw = raw.cloned().unwrap_or_default();
        Self {
            description: or_placeholder(raw.description.as_deref()),
            top_names_contribution_pct: or_placeholder(raw.top_names_contribution_pct.as_deref()),
            advance_decline: or_placeholder(raw.advance_decline.as_deref()),
        }
    }

    pub fn get(&self, measure: BreadthMeasure) -> &str {
        match measure {
            BreadthMeasure::Description => &self.description,
            BreadthMeasure::TopNamesContributionPct => &self.top_names_contribution_pct,
            BreadthMeasure::AdvanceDecline => &self.advance_decline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorTheme {
    pub sector: String,
    pub theme: String,
}

/// The validated facts for one period and region.
///
/// Instances only exist in a valid state: construction checks presence and
/// format, then numeric bounds, then the forbidden-term filter, and fails on
/// the first violated class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPayload {
    period: String,
    market_region: String,
    benchmark: String,
    benchmark_return_total_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    qualitative_market_move: Option<String>,
    #[serde(rename = "macro")]
    macro_context: MacroContext,
    sector_themes: Vec<SectorTheme>,
    style_rotation: StyleRotation,
    breadth_concentration: BreadthConcentration,
    index_level_events: Vec<IndexEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disclaimers: Option<String>,
}

/// Field path reported when neither market-move field is present.
pub const MARKET_MOVE_FIELDS: &str = "benchmark_return_total_pct|qualitative_market_move";

impl NormalizedPayload {
    pub fn construct(raw: RawMarketContext) -> Result<Self> {
        // 1. Required fields and formats
        let period = required_text(raw.period.as_deref(), "period")?;
        let market_region = required_text(raw.market_region.as_deref(), "market_region")?;
        let benchmark = required_text(raw.benchmark.as_deref(), "benchmark")?;

        let mut sector_themes = Vec::new();
        for (idx, st) in raw.sector_themes.iter().flatten().enumerate() {
            let sector = required_text(st.sector.as_deref(), &format!("sector_themes[{}].sector", idx))?;
            sector_themes.push(SectorTheme {
                sector,
                theme: or_placeholder(st.theme.as_deref()),
            });
        }

        let qualitative_market_move = optional_text(raw.qualitative_market_move.as_deref())
            .filter(|text| !is_placeholder(text));
        if raw.benchmark_return_total_pct.is_none() && qualitative_market_move.is_none() {
            return Err(MarketContextError::schema(
                SchemaViolation::MissingField,
                MARKET_MOVE_FIELDS,
                "either a benchmark return or a qualitative market move is required",
            ));
        }

        validate_period(&period)?;

        // 2. Numeric bounds
        if let Some(ret) = raw.benchmark_return_total_pct {
            check_return_bounds(ret, "benchmark_return_total_pct")?;
        }

        let payload = Self {
            period,
            market_region,
            benchmark,
            benchmark_return_total_pct: raw.benchmark_return_total_pct,
            qualitative_market_move,
            macro_context: MacroContext::from_raw(raw.macro_data.as_ref()),
            sector_themes,
            style_rotation: StyleRotation::from_raw(raw.style_rotation.as_ref()),
            breadth_concentration: BreadthConcentration::from_raw(
                raw.breadth_concentration.as_ref(),
            ),
            index_level_events: Vec::new(),
            disclaimers: optional_text(raw.disclaimers.as_deref()),
        };

        // 3. Lexical filter
        payload.check_lexicon()?;

        Ok(payload)
    }

    /// Builds a payload from an arbitrary JSON mapping. Shape mismatches (for
    /// instance a string where a number is expected) are schema errors.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        let raw: RawMarketContext = serde_json::from_value(value).map_err(|e| {
            MarketContextError::schema(SchemaViolation::InvalidFormat, "payload", e.to_string())
        })?;
        Self::construct(raw)
    }

    /// Returns a new payload carrying the detected events, ordered by date.
    /// The events go through the same bounds and lexical checks as the rest.
    pub fn with_events(self, mut events: Vec<IndexEvent>) -> Result<Self> {
        events.sort_by_key(|e| e.date);
        for (idx, event) in events.iter().enumerate() {
            check_return_bounds(
                event.one_day_move_pct,
                &format!("index_level_events[{}].one_day_move_pct", idx),
            )?;
        }
        for (idx, event) in events.iter().enumerate() {
            check_text(
                &event.description,
                &format!("index_level_events[{}].description", idx),
            )?;
        }
        Ok(Self {
            index_level_events: events,
            ..self
        })
    }

    fn check_lexicon(&self) -> Result<()> {
        for (field, value) in self.text_fields() {
            check_text(value, &field)?;
        }
        Ok(())
    }

    fn text_fields(&self) -> Vec<(String, &str)> {
        let mut fields: Vec<(String, &str)> = vec![
            ("period".to_string(), self.period.as_str()),
            ("market_region".to_string(), self.market_region.as_str()),
            ("benchmark".to_string(), self.benchmark.as_str()),
        ];
        if let Some(q) = &self.qualitative_market_move {
            fields.push(("qualitative_market_move".to_string(), q.as_str()));
        }
        for key in FieldKey::all() {
            if key == FieldKey::SectorThemes {
                continue;
            }
            if let Some(value) = self.field_text(key) {
                fields.push((key.path(), value));
            }
        }
        for (idx, st) in self.sector_themes.iter().enumerate() {
            fields.push((format!("sector_themes[{}].sector", idx), st.sector.as_str()));
            fields.push((format!("sector_themes[{}].theme", idx), st.theme.as_str()));
        }
        if let Some(d) = &self.disclaimers {
            fields.push(("disclaimers".to_string(), d.as_str()));
        }
        fields
    }

    /// Text of a single-valued field; `None` for `SectorThemes`.
    pub fn field_text(&self, key: FieldKey) -> Option<&str> {
        match key {
            FieldKey::Macro(c) => Some(self.macro_context.get(c)),
            FieldKey::Style(s) => Some(self.style_rotation.get(s)),
            FieldKey::Breadth(b) => Some(self.breadth_concentration.get(b)),
            FieldKey::SectorThemes => None,
        }
    }

    pub fn period(&self) -> &str {
        &self.period
    }

    pub fn market_region(&self) -> &str {
        &self.market_region
    }

    pub fn benchmark(&self) -> &str {
        &self.benchmark
    }

    pub fn benchmark_return_total_pct(&self) -> Option<f64> {
        self.benchmark_return_total_pct
    }

    pub fn qualitative_market_move(&self) -> Option<&str> {
        self.qualitative_market_move.as_deref()
    }

    pub fn macro_context(&self) -> &MacroContext {
        &self.macro_context
    }

    pub fn sector_themes(&self) -> &[SectorTheme] {
        &self.sector_themes
    }

    pub fn style_rotation(&self) -> &StyleRotation {
        &self.style_rotation
    }

    pub fn breadth_concentration(&self) -> &BreadthConcentration {
        &self.breadth_concentration
    }

    pub fn index_level_events(&self) -> &[IndexEvent] {
        &self.index_level_events
    }

    pub fn disclaimers(&self) -> Option<&str> {
        self.disclaimers.as_deref()
    }

    pub fn to_compact_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Every numeral present in the serialized payload, in canonical form.
    ///
    /// Numbers contribute both their JSON rendering ("10.0") and their plain
    /// rendering ("10") so prose citing either form traces back.
    pub fn numerals(&self) -> Result<BTreeSet<String>> {
        let value = serde_json::to_value(self)?;
        let mut out = BTreeSet::new();
        collect_numerals(&value, &mut out);
        Ok(out)
    }
}

fn collect_numerals(value: &serde_json::Value, out: &mut BTreeSet<String>) {
    match value {
        serde_json::Value::String(s) => out.extend(extract_numerals(s)),
        serde_json::Value::Number(n) => {
            out.extend(extract_numerals(&n.to_string()));
            if let Some(f) = n.as_f64() {
                out.extend(extract_numerals(&f.to_string()));
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_numerals(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_numerals(item, out);
            }
        }
        serde_json::Value::Bool(_) | serde_json::Value::Null => {}
    }
}

fn required_text(value: Option<&str>, field: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(MarketContextError::schema(
            SchemaViolation::MissingField,
            field,
            "required field is absent or empty",
        )),
    }
}

fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn check_return_bounds(value: f64, field: &str) -> Result<()> {
    let (lo, hi) = RETURN_PCT_BOUNDS;
    if !value.is_finite() || value < lo || value > hi {
        return Err(MarketContextError::schema(
            SchemaViolation::OutOfRange,
            field,
            format!("{} must be between {} and {}", value, lo, hi),
        ));
    }
    Ok(())
}

fn check_text(value: &str, field: &str) -> Result<()> {
    let terms = find_forbidden_terms(value);
    if terms.is_empty() {
        return Ok(());
    }
    Err(MarketContextError::schema(
        SchemaViolation::ForbiddenTerm,
        field,
        format!("contains forbidden fund-specific language: {}", terms.join(", ")),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::PLACEHOLDER;
    use chrono::NaiveDate;
    use serde_json::json;

    fn sample_raw() -> RawMarketContext {
        RawMarketContext {
            benchmark_return_total_pct: Some(-1.79),
            macro_data: Some(RawMacro {
                inflation: Some("Headline CPI 3.1% YoY, easing".to_string()),
                yields: Some("10y UST ~4.22%".to_string()),
                policy_geopolitics: Some(TextOrList::List(vec![
                    "Tariffs narrative volatility".to_string(),
                    "Geopolitical flare-ups".to_string(),
                ])),
                ..RawMacro::default()
            }),
            ..RawMarketContext::new("Q2 2025", "U.S. equities (small-cap)", "Russell 2000")
        }
    }

    fn schema_kind(err: MarketContextError) -> SchemaViolation {
        match err {
            MarketContextError::Schema { kind, .. } => kind,
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_macro_categories_become_placeholders() {
        let payload = NormalizedPayload::construct(sample_raw()).unwrap();
        let macro_ctx = payload.macro_context();
        assert_eq!(macro_ctx.iter().count(), MacroCategory::ALL.len());
        assert_eq!(macro_ctx.employment, PLACEHOLDER);
        assert_eq!(macro_ctx.fx, PLACEHOLDER);
        assert_eq!(
            macro_ctx.policy_geopolitics,
            "Tariffs narrative volatility; Geopolitical flare-ups"
        );
        assert_eq!(payload.style_rotation().size, PLACEHOLDER);
        assert_eq!(payload.breadth_concentration().advance_decline, PLACEHOLDER);

        let json = serde_json::to_value(&payload).unwrap();
        for category in MacroCategory::ALL {
            assert!(json["macro"].get(category.key()).is_some());
        }
    }

    #[test]
    fn test_blank_values_become_placeholders() {
        let mut raw = sample_raw();
        raw.macro_data.as_mut().unwrap().credit = Some("   ".to_string());
        raw.sector_themes = Some(vec![RawSectorTheme {
            sector: Some("Energy".to_string()),
            theme: Some(String::new()),
        }]);
        let payload = NormalizedPayload::construct(raw).unwrap();
        assert_eq!(payload.macro_context().credit, PLACEHOLDER);
        assert_eq!(payload.sector_themes()[0].theme, PLACEHOLDER);
    }

    #[test]
    fn test_required_fields() {
        let mut raw = sample_raw();
        raw.benchmark = None;
        assert_eq!(
            schema_kind(NormalizedPayload::construct(raw).unwrap_err()),
            SchemaViolation::MissingField
        );

        let mut raw = sample_raw();
        raw.period = Some("  ".to_string());
        assert_eq!(
            schema_kind(NormalizedPayload::construct(raw).unwrap_err()),
            SchemaViolation::MissingField
        );
    }

    #[test]
    fn test_market_move_requires_return_or_description() {
        let mut raw = sample_raw();
        raw.benchmark_return_total_pct = None;
        raw.qualitative_market_move = Some("not provided".to_string());
        match NormalizedPayload::construct(raw).unwrap_err() {
            MarketContextError::Schema { kind, field, .. } => {
                assert_eq!(kind, SchemaViolation::MissingField);
                assert_eq!(field, MARKET_MOVE_FIELDS);
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut raw = sample_raw();
        raw.benchmark_return_total_pct = None;
        raw.qualitative_market_move = Some("Small caps lagged".to_string());
        let payload = NormalizedPayload::construct(raw).unwrap();
        assert_eq!(payload.benchmark_return_total_pct(), None);

        let mut raw = sample_raw();
        raw.qualitative_market_move = None;
        assert!(NormalizedPayload::construct(raw).is_ok());

        // Presence is reported before the period format.
        let mut raw = sample_raw();
        raw.benchmark_return_total_pct = None;
        raw.period = Some("second quarter".to_string());
        assert_eq!(
            schema_kind(NormalizedPayload::construct(raw).unwrap_err()),
            SchemaViolation::MissingField
        );
    }

    #[test]
    fn test_period_format() {
        let mut raw = sample_raw();
        raw.period = Some("second quarter".to_string());
        assert_eq!(
            schema_kind(NormalizedPayload::construct(raw).unwrap_err()),
            SchemaViolation::InvalidFormat
        );

        let mut raw = sample_raw();
        raw.period = Some("2025-04-01 to 2025-06-30".to_string());
        assert!(NormalizedPayload::construct(raw).is_ok());
    }

    #[test]
    fn test_return_bounds() {
        for bad in [100.01, -100.5, 250.0, f64::NAN] {
            let mut raw = sample_raw();
            raw.benchmark_return_total_pct = Some(bad);
            assert_eq!(
                schema_kind(NormalizedPayload::construct(raw).unwrap_err()),
                SchemaViolation::OutOfRange
            );
        }
        for ok in [100.0, -100.0, 0.0] {
            let mut raw = sample_raw();
            raw.benchmark_return_total_pct = Some(ok);
            assert!(NormalizedPayload::construct(raw).is_ok());
        }
    }

    #[test]
    fn test_forbidden_terms_rejected_whole_word_only() {
        let mut raw = sample_raw();
        raw.macro_data.as_mut().unwrap().credit = Some("Our view: spreads tight".to_string());
        let err = NormalizedPayload::construct(raw).unwrap_err();
        match err {
            MarketContextError::Schema { kind, field, .. } => {
                assert_eq!(kind, SchemaViolation::ForbiddenTerm);
                assert_eq!(field, "macro.credit");
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut raw = sample_raw();
        raw.macro_data.as_mut().unwrap().credit = Some("spreads are ours to watch".to_string());
        assert!(NormalizedPayload::construct(raw).is_ok());
    }

    #[test]
    fn test_validation_order_reports_first_class() {
        // Out of range and forbidden at once: bounds are checked first.
        let mut raw = sample_raw();
        raw.benchmark_return_total_pct = Some(140.0);
        raw.disclaimers = Some("The fund may differ".to_string());
        assert_eq!(
            schema_kind(NormalizedPayload::construct(raw).unwrap_err()),
            SchemaViolation::OutOfRange
        );

        // Missing and out of range at once: presence is checked first.
        let mut raw = sample_raw();
        raw.market_region = None;
        raw.benchmark_return_total_pct = Some(140.0);
        assert_eq!(
            schema_kind(NormalizedPayload::construct(raw).unwrap_err()),
            SchemaViolation::MissingField
        );
    }

    #[test]
    fn test_from_json_value() {
        let payload = NormalizedPayload::from_json_value(json!({
            "period": "Q2 2025",
            "market_region": "Emerging Markets equities",
            "benchmark": "MSCI Emerging Markets",
            "qualitative_market_move": "EM equities outpaced developed markets",
            "macro": { "fx": "USD/CNY -0.84%", "policy_geopolitics": "Tariff headlines" },
            "index_level_events": [{ "date": "2025-04-08", "description": "x", "one_day_move_pct": 2.0 }]
        }))
        .unwrap();
        assert_eq!(payload.macro_context().fx, "USD/CNY -0.84%");
        assert!(payload.index_level_events().is_empty());

        let err = NormalizedPayload::from_json_value(json!({
            "period": "Q2 2025",
            "market_region": "Global equities",
            "benchmark": "MSCI ACWI",
            "benchmark_return_total_pct": "high"
        }))
        .unwrap_err();
        assert_eq!(schema_kind(err), SchemaViolation::InvalidFormat);
    }

    #[test]
    fn test_with_events_checks_bounds_and_orders() {
        let payload = NormalizedPayload::construct(sample_raw()).unwrap();
        let events = vec![
            IndexEvent {
                date: NaiveDate::from_ymd_opt(2025, 5, 2).unwrap(),
                description: String::new(),
                one_day_move_pct: -4.1,
            },
            IndexEvent {
                date: NaiveDate::from_ymd_opt(2025, 4, 8).unwrap(),
                description: String::new(),
                one_day_move_pct: 9.5,
            },
        ];
        let with_events = payload.clone().with_events(events).unwrap();
        assert_eq!(
            with_events.index_level_events()[0].date,
            NaiveDate::from_ymd_opt(2025, 4, 8).unwrap()
        );

        let bad = vec![IndexEvent {
            date: NaiveDate::from_ymd_opt(2025, 4, 8).unwrap(),
            description: String::new(),
            one_day_move_pct: 120.0,
        }];
        assert_eq!(
            schema_kind(payload.with_events(bad).unwrap_err()),
            SchemaViolation::OutOfRange
        );
    }

    #[test]
    fn test_numerals_cover_serialized_values() {
        let payload = NormalizedPayload::construct(sample_raw()).unwrap();
        let numerals = payload.numerals().unwrap();
        for expected in ["1.79", "3.1", "4.22", "10", "2", "2025"] {
            assert!(numerals.contains(expected), "missing {}", expected);
        }
        assert!(!numerals.contains("9.5"));
    }

    #[test]
    fn test_json_schema_lists_fields() {
        let schema = serde_json::to_string(&RawMarketContext::json_schema().unwrap()).unwrap();
        assert!(schema.contains("benchmark_return_total_pct"));
        assert!(schema.contains("policy_geopolitics"));
    }
}
