use std::sync::LazyLock;

use regex::Regex;

// the trailing word is captured whole so a unit can't be read out of "4.5k"
static DOLLAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:US)?\$\s*(\d[\d,]*(?:\.\d+)?|\.\d+)(\s*)([a-z]*)").unwrap()
});
static BARE_AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d[\d,]*(?:\.\d+)?)\s*(billion|million|bn|mn|b|m)?\s*$").unwrap()
});
static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?(?:\s*[-–]\s*(\d{1,3}(?:,\d{3})+|\d+))?").unwrap()
});
static YEARS_AGO_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d+\s+years?\s+ago\s*\([^)]*\)").unwrap());
static YEARS_AGO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d+\s+years?\s+ago").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{4})\b").unwrap());
static BRACKETS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static US_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bU\.\s?S\.(?:\s?A\.)?").unwrap());
static LABEL_RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d[\d,]*)\s*[-–]\s*(\d[\d,]*)").unwrap());
static LABEL_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d[\d,]*)\s*\+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoneyUnit {
    M,
    B,
}

impl MoneyUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            MoneyUnit::M => "M",
            MoneyUnit::B => "B",
        }
    }

    /// Millions per one unit.
    pub fn scale(self) -> f64 {
        match self {
            MoneyUnit::M => 1.0,
            MoneyUnit::B => 1000.0,
        }
    }
}

/// A currency amount expressed in millions, remembering the unit it was written in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Money {
    pub millions: f64,
    pub unit: MoneyUnit,
}

/// Magnitude words we do not convert; an amount carrying one is rejected.
const UNSUPPORTED_UNITS: &[&str] = &["k", "thousand", "t", "tn", "trillion"];

/// Parse `US$12.3 billion`, `US$4M`, `$4.5B` or a bare number into millions.
///
/// A missing unit means millions. Thousands, trillions and anything else
/// yield `None`.
pub fn normalize_currency(raw: &str) -> Option<Money> {
    let (amount, unit) = match DOLLAR_RE.captures(raw) {
        Some(caps) => {
            let word = caps[3].to_ascii_lowercase();
            let unit = match unit_word(&word) {
                Some(unit) => unit,
                None if word.is_empty() => MoneyUnit::M,
                // letters glued to the number ("4.5k", "12x") are not a unit we know
                None if caps[2].is_empty() => return None,
                None if UNSUPPORTED_UNITS.contains(&word.as_str()) => return None,
                None => MoneyUnit::M,
            };
            (caps[1].to_string(), unit)
        }
        None => {
            let caps = BARE_AMOUNT_RE.captures(raw)?;
            let unit = caps
                .get(2)
                .and_then(|m| unit_word(&m.as_str().to_ascii_lowercase()))
                .unwrap_or(MoneyUnit::M);
            (caps[1].to_string(), unit)
        }
    };
    let amount: f64 = amount.replace(',', "").parse().ok()?;
    if !amount.is_finite() {
        return None;
    }
    Some(Money {
        millions: amount * unit.scale(),
        unit,
    })
}

fn unit_word(word: &str) -> Option<MoneyUnit> {
    match word {
        "billion" | "bn" | "b" => Some(MoneyUnit::B),
        "million" | "mn" | "m" => Some(MoneyUnit::M),
        _ => None,
    }
}

/// First integer in free text; a `low-high` range yields its floor midpoint.
///
/// `"1,234 employees"` → 1234, `"~500"` → 500, `"201-500 employees"` → 350,
/// `"5000+ employees"` → 5000.
pub fn parse_employee_count(raw: &str) -> Option<u64> {
    let caps = COUNT_RE.captures(raw)?;
    let low = parse_grouped(&caps[1])?;
    match caps.get(2).and_then(|m| parse_grouped(m.as_str())) {
        Some(high) => Some(midpoint(low, high)),
        None => Some(low),
    }
}

/// Floor midpoint that cannot overflow; bounds may come in either order.
fn midpoint(a: u64, b: u64) -> u64 {
    let (low, high) = (a.min(b), a.max(b));
    low + (high - low) / 2
}

/// Earliest 4-digit year, after dropping "N years ago (...)" qualifiers.
pub fn parse_founded_year(raw: &str) -> Option<i32> {
    let cleaned = YEARS_AGO_PAREN_RE.replace_all(raw, "");
    let cleaned = YEARS_AGO_RE.replace_all(&cleaned, "");
    YEAR_RE
        .captures_iter(&cleaned)
        .filter_map(|c| c[1].parse::<i32>().ok())
        .min()
}

/// Drop bracketed annotations, canonicalise "U.S." to "US", squash whitespace.
pub fn normalize_location(raw: &str) -> String {
    let cleaned = BRACKETS_RE.replace_all(raw, " ");
    let cleaned = US_RE.replace_all(&cleaned, "US");
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(" ,", ",")
}

fn parse_grouped(digits: &str) -> Option<u64> {
    digits.replace(',', "").parse().ok()
}

/// Employee-count band, closed at `low` and open above `high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeBand {
    pub low: u64,
    pub high: Option<u64>,
}

const BANDS: &[SizeBand] = &[
    SizeBand { low: 1, high: Some(10) },
    SizeBand { low: 11, high: Some(50) },
    SizeBand { low: 51, high: Some(200) },
    SizeBand { low: 201, high: Some(500) },
    SizeBand { low: 501, high: Some(1000) },
    SizeBand { low: 1001, high: Some(5000) },
    SizeBand { low: 5001, high: Some(10000) },
    SizeBand { low: 10001, high: None },
];

impl SizeBand {
    /// Counts below the second threshold land in the first band.
    pub fn for_count(count: u64) -> SizeBand {
        BANDS
            .iter()
            .skip(1)
            .rev()
            .find(|b| count >= b.low)
            .copied()
            .unwrap_or(BANDS[0])
    }

    /// Rebuild a band from the bounds written in a label such as "51-200 employees".
    pub fn from_label(label: &str) -> Option<SizeBand> {
        if let Some(caps) = LABEL_RANGE_RE.captures(label) {
            let low = parse_grouped(&caps[1])?;
            let high = parse_grouped(&caps[2])?;
            return Some(SizeBand {
                low: low.min(high),
                high: Some(low.max(high)),
            });
        }
        let caps = LABEL_OPEN_RE.captures(label)?;
        Some(SizeBand {
            low: parse_grouped(&caps[1])?,
            high: None,
        })
    }

    pub fn midpoint(&self) -> u64 {
        match self.high {
            Some(high) => midpoint(self.low, high),
            None => self.low,
        }
    }

    pub fn label(&self) -> String {
        match self.high {
            Some(high) => format!("{}-{} employees", self.low, high),
            None => format!("{}+ employees", self.low),
        }
    }
}
