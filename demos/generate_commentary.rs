use chrono::{Local, NaiveDate};
use dotenv::dotenv;
use market_context_builder::llm::GeminiClient;
use market_context_builder::{
    CommentaryRequest, CommentaryService, PipelineConfig, RawBreadth, RawMacro,
    RawMarketContext, StaticMarketData, TextOrList,
};
use std::error::Error;

/// Usage: generate_commentary [PERIOD] [REGION] [CONTEXT_JSON]
///        generate_commentary --presets
///
/// Without CONTEXT_JSON a built-in Q2 2025 small-cap context is used.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    env_logger::init();

    let api_key = std::env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY must be set");
    let config = PipelineConfig::from_env()?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let data = match args.get(2) {
        Some(path) => StaticMarketData::from_json_file(path, Vec::new())?,
        None => StaticMarketData::from_prices(sample_context(), &sample_prices()),
    };

    let client = GeminiClient::with_settings(api_key, config.generator.clone())?;
    let service = CommentaryService::new(config, client, data);

    if args.first().map(String::as_str) == Some("--presets") {
        let catalog = service.presets(Local::now().date_naive())?;
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    let period = args.first().cloned().unwrap_or_else(|| "Q2 2025".to_string());
    let region = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| "U.S. equities (small-cap)".to_string());

    println!("Generating Market Context for {} / {}...\n", period, region);
    let (status, body) = service
        .respond(&CommentaryRequest::new(period, region))
        .await;

    if status == 200 {
        println!("{}\n", body["markdown"].as_str().unwrap_or_default());
        println!("Flagged events: {}", body["flagged_events"]);
        println!("Stats: {}", body["stats"]);
    } else {
        eprintln!("Request failed with status {}:", status);
        eprintln!("{}", serde_json::to_string_pretty(&body)?);
    }

    Ok(())
}

fn sample_context() -> RawMarketContext {
    RawMarketContext {
        benchmark_return_total_pct: Some(-1.79),
        macro_data: Some(RawMacro {
            inflation: Some("Headline CPI 2.7% YoY in June".to_string()),
            policy_rate: Some("Fed funds target held at 4.25-4.50%".to_string()),
            yields: Some("10-year UST 4.24% at quarter end".to_string()),
            credit: Some("High-yield spreads tightened after widening in April".to_string()),
            policy_geopolitics: Some(TextOrList::List(vec![
                "Tariff announcements".to_string(),
                "Tariff pause".to_string(),
            ])),
            ..RawMacro::default()
        }),
        breadth_concentration: Some(RawBreadth {
            description: Some("Leadership concentrated in large-cap growth".to_string()),
            ..RawBreadth::default()
        }),
        ..RawMarketContext::default()
    }
}

fn sample_prices() -> Vec<(NaiveDate, f64)> {
    let closes = [
        (2025, 4, 1, 200.10),
        (2025, 4, 2, 202.40),
        (2025, 4, 3, 190.20),
        (2025, 4, 4, 181.30),
        (2025, 4, 7, 180.60),
        (2025, 4, 8, 178.10),
        (2025, 4, 9, 195.02),
        (2025, 4, 10, 188.40),
        (2025, 4, 11, 190.10),
        (2025, 4, 14, 191.30),
        (2025, 4, 15, 192.00),
        (2025, 4, 16, 189.90),
        (2025, 4, 17, 190.50),
    ];
    closes
        .iter()
        .filter_map(|&(y, m, d, close)| NaiveDate::from_ymd_opt(y, m, d).map(|date| (date, close)))
        .collect()
}
