use serde::Serialize;

/// A selectable region with its default benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegionPreset {
    pub id: &'static str,
    pub label: &'static str,
    pub benchmark: &'static str,
}

pub const REGION_PRESETS: &[RegionPreset] = &[
    RegionPreset {
        id: "us_large_core",
        label: "U.S. equities (large-cap core)",
        benchmark: "S&P 500",
    },
    RegionPreset {
        id: "us_all_cap_core",
        label: "U.S. equities (all-cap core)",
        benchmark: "Russell 3000",
    },
    RegionPreset {
        id: "us_small_cap",
        label: "U.S. equities (small-cap)",
        benchmark: "Russell 2000",
    },
    RegionPreset {
        id: "us_large_growth",
        label: "U.S. equities (large-cap growth)",
        benchmark: "Russell 1000 Growth",
    },
    RegionPreset {
        id: "us_large_value",
        label: "U.S. equities (large-cap value)",
        benchmark: "Russell 1000 Value",
    },
    RegionPreset {
        id: "us_mid_cap",
        label: "U.S. equities (mid-cap)",
        benchmark: "Russell Midcap",
    },
    RegionPreset {
        id: "global_equity",
        label: "Global equities",
        benchmark: "MSCI ACWI",
    },
    RegionPreset {
        id: "intl_dev",
        label: "International developed equities",
        benchmark: "MSCI EAFE",
    },
    RegionPreset {
        id: "em_equity",
        label: "Emerging markets equities",
        benchmark: "MSCI Emerging Markets",
    },
    RegionPreset {
        id: "us_equal_weight",
        label: "U.S. equities (equal-weight)",
        benchmark: "S&P 500 Equal Weight",
    },
    RegionPreset {
        id: "global_growth_tech",
        label: "Global large-cap growth (tech tilt)",
        benchmark: "NASDAQ-100",
    },
];

/// Benchmark display name to the exchange-traded proxy used for daily prices.
const BENCHMARK_SYMBOLS: &[(&str, &str)] = &[
    ("S&P 500", "SPY"),
    ("S&P 500 Equal Weight", "RSP"),
    ("Russell 3000", "IWV"),
    ("Russell 1000", "IWB"),
    ("Russell 1000 Growth", "IWF"),
    ("Russell 1000 Value", "IWD"),
    ("Russell Midcap", "IWR"),
    ("Russell 2000", "IWM"),
    ("MSCI ACWI", "ACWI"),
    ("MSCI EAFE", "EFA"),
    ("MSCI Emerging Markets", "EEM"),
    ("NASDAQ-100", "QQQ"),
];

pub fn preset_by_id(id: &str) -> Option<&'static RegionPreset> {
    REGION_PRESETS.iter().find(|p| p.id == id)
}

pub fn preset_by_label(label: &str) -> Option<&'static RegionPreset> {
    let label = label.trim();
    REGION_PRESETS
        .iter()
        .find(|p| p.label.eq_ignore_ascii_case(label))
}

pub fn benchmark_symbol(benchmark: &str) -> Option<&'static str> {
    let benchmark = benchmark.trim();
    BENCHMARK_SYMBOLS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(benchmark))
        .map(|(_, symbol)| *symbol)
}

pub fn benchmarks() -> impl Iterator<Item = &'static str> {
    BENCHMARK_SYMBOLS.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relevance::RegionProfile;

    #[test]
    fn test_every_preset_has_a_symbol_and_profile() {
        for preset in REGION_PRESETS {
            assert!(
                benchmark_symbol(preset.benchmark).is_some(),
                "{} has no proxy",
                preset.benchmark
            );
            assert_ne!(RegionProfile::resolve(preset.label), RegionProfile::Default);
        }
    }

    #[test]
    fn test_lookups() {
        assert_eq!(preset_by_id("us_small_cap").unwrap().benchmark, "Russell 2000");
        assert_eq!(
            preset_by_label("emerging markets equities").unwrap().id,
            "em_equity"
        );
        assert_eq!(benchmark_symbol(" russell 2000 "), Some("IWM"));
        assert_eq!(benchmark_symbol("Nikkei 225"), None);
        assert!(preset_by_id("mars").is_none());
        assert_eq!(benchmarks().count(), 12);
    }
}
