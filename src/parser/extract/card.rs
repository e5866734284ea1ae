use std::sync::LazyLock;

use scraper::{ElementRef, Selector};

use super::{nth, Fields};
use crate::parser::dom::{find_label, non_empty, squash, text_after, visible_text};
use crate::report::{Issue, Reporter};

static NAME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h3").unwrap());
static INDUSTRY_TAGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.badge.rounded-pill.bg-success").unwrap());
static SIZE_TAGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"span[id="company-size-tags"]"#).unwrap());
static FUNDING_TAGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"span[id="funding-tags"]"#).unwrap());
static WEBSITE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[id="startup-website-link"]"#).unwrap());

const INDUSTRY_TAG_ID: &str = "industry-tags";
const DESCRIPTION_LABEL: &str = "What they do:";
const QUICK_FACTS_LABEL: &str = "Quick facts:";
const HQ_MARKER: char = '📍';
const HQ_PREFIX: &str = "HQ:";
const FOUNDED_PREFIX: &str = "Founded:";

/// The size tag row is positional: [size, founded].
const SIZE_SLOT: usize = 0;
const FOUNDED_SLOT: usize = 1;

/// Everything a directory card can tell us, still as raw text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartupFields {
    pub name: Option<String>,
    pub description: Option<String>,
    pub industries: Vec<String>,
    pub location: Option<String>,
    pub company_size: Option<String>,
    pub founded_year: Option<String>,
    pub investors: Vec<String>,
    pub latest_funding: Option<String>,
    pub valuation: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FundingKind {
    Round,
    Valuation,
    Investor,
}

/// "Series …"/"… seed …" is a round, "… valuation" a valuation, anything else an investor.
pub fn classify_funding(tag: &str) -> FundingKind {
    let lower = tag.to_lowercase();
    if lower.contains("series") || lower.contains("seed") {
        FundingKind::Round
    } else if lower.contains("valuation") {
        FundingKind::Valuation
    } else {
        FundingKind::Investor
    }
}

pub fn extract(card: ElementRef, ordinal: usize, reporter: &mut dyn Reporter) -> StartupFields {
    let mut fields = Fields::new(format!("card#{ordinal}"), reporter);

    let name = fields.field("name", name(card));
    if let Some(n) = &name {
        fields.rename(n.clone());
    }

    let size_tags = tag_texts(card, &SIZE_TAGS);
    let funding_tags = tag_texts(card, &FUNDING_TAGS);

    let mut investors = Vec::new();
    let mut latest_funding = None;
    let mut valuation = None;
    for tag in funding_tags {
        match classify_funding(&tag) {
            // later rounds on the card overwrite earlier ones
            FundingKind::Round => latest_funding = Some(tag),
            FundingKind::Valuation => valuation = Some(tag),
            FundingKind::Investor => investors.push(tag),
        }
    }
    if latest_funding.is_none() {
        fields.issue("latest_funding", Issue::Missing);
    }

    StartupFields {
        name,
        description: fields.field("description", description(card)),
        industries: fields.list("industries", industries(card)),
        location: fields.field("location", location(card)),
        company_size: fields.field("company_size", company_size(&size_tags)),
        founded_year: fields.field("founded_year", founded_year(&size_tags)),
        investors,
        latest_funding,
        valuation,
        website: fields.field("website", website(card)),
    }
}

fn name(card: ElementRef) -> Result<String, Issue> {
    let h3 = card.select(&NAME).next().ok_or(Issue::Missing)?;
    non_empty(&visible_text(h3))
}

fn description(card: ElementRef) -> Result<String, Issue> {
    let label = find_label(card, DESCRIPTION_LABEL).ok_or(Issue::Missing)?;
    non_empty(&text_after(label))
}

fn industries(card: ElementRef) -> Result<Vec<String>, Issue> {
    let tags: Vec<String> = card
        .select(&INDUSTRY_TAGS)
        .filter(|span| span.value().id() == Some(INDUSTRY_TAG_ID))
        .map(|span| squash(&visible_text(span)))
        .filter(|t| !t.is_empty())
        .collect();
    if tags.is_empty() {
        Err(Issue::Missing)
    } else {
        Ok(tags)
    }
}

/// "📍HQ: San Francisco, CA\n…" inside the Quick facts block, cut at the line break.
fn location(card: ElementRef) -> Result<String, Issue> {
    let label = find_label(card, QUICK_FACTS_LABEL).ok_or(Issue::Missing)?;
    let facts = text_after(label);
    let (_, rest) = facts.split_once(HQ_MARKER).ok_or(Issue::Missing)?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix(HQ_PREFIX).unwrap_or(rest);
    non_empty(rest.lines().next().unwrap_or_default())
}

fn company_size(tags: &[String]) -> Result<String, Issue> {
    let tag = nth(tags, SIZE_SLOT)?;
    if tag.starts_with(FOUNDED_PREFIX) {
        return Err(Issue::Implausible(tag));
    }
    Ok(tag)
}

/// Only a bare 4-digit value is accepted; anything else means the tag row moved.
fn founded_year(tags: &[String]) -> Result<String, Issue> {
    let tag = nth(tags, FOUNDED_SLOT)?;
    let year = tag.strip_prefix(FOUNDED_PREFIX).unwrap_or(&tag).trim();
    if year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()) {
        Ok(year.to_string())
    } else {
        Err(Issue::Implausible(tag))
    }
}

fn website(card: ElementRef) -> Result<String, Issue> {
    let href = card
        .select(&WEBSITE)
        .find_map(|a| a.value().attr("href"))
        .ok_or(Issue::Missing)?;
    non_empty(href.split('?').next().unwrap_or_default())
}

fn tag_texts(card: ElementRef, selector: &Selector) -> Vec<String> {
    card.select(selector)
        .map(|span| squash(&visible_text(span)))
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::IssueLog;
    use scraper::Html;

    static CARD: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("div.card.card-body").unwrap());

    fn cards(fixture: &str) -> Html {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", fixture)).unwrap();
        Html::parse_document(&html)
    }

    fn extract_nth(doc: &Html, i: usize, log: &mut IssueLog) -> StartupFields {
        let card = doc.select(&CARD).nth(i).unwrap();
        extract(card, i, log)
    }

    #[test]
    fn full_card() {
        let doc = cards("directory_page");
        let mut log = IssueLog::default();
        let s = extract_nth(&doc, 0, &mut log);
        assert_eq!(s.name.as_deref(), Some("Orbital Labs"));
        assert_eq!(
            s.description.as_deref(),
            Some("Reusable launch vehicles for small satellites.")
        );
        assert_eq!(s.industries, vec!["Aerospace", "Hardware"]);
        assert_eq!(s.location.as_deref(), Some("San Francisco, CA"));
        assert_eq!(s.company_size.as_deref(), Some("51-200 employees"));
        assert_eq!(s.founded_year.as_deref(), Some("2018"));
        assert_eq!(s.latest_funding.as_deref(), Some("Series B ($45M)"));
        assert_eq!(s.valuation.as_deref(), Some("$1.2B valuation"));
        assert_eq!(s.investors, vec!["Sequoia Capital", "Founders Fund"]);
        assert_eq!(s.website.as_deref(), Some("https://orbitallabs.example.com/"));
        assert!(log.reports().is_empty(), "{:?}", log.reports());
    }

    #[test]
    fn industry_spans_need_the_marker_id() {
        let doc = cards("directory_page");
        let mut log = IssueLog::default();
        let s = extract_nth(&doc, 0, &mut log);
        // the "Hiring" badge shares the classes but not the id
        assert!(!s.industries.iter().any(|t| t == "Hiring"));
    }

    #[test]
    fn name_only_card_defaults_everything_else() {
        let doc = cards("directory_page");
        let mut log = IssueLog::default();
        let s = extract_nth(&doc, 1, &mut log);
        assert_eq!(s.name.as_deref(), Some("Quiet Co"));
        assert_eq!(
            s,
            StartupFields {
                name: Some("Quiet Co".into()),
                ..Default::default()
            }
        );
        assert!(log.reports().iter().all(|r| r.entity == "Quiet Co"));
        assert!(log
            .reports()
            .iter()
            .any(|r| r.field == "founded_year" && r.issue == Issue::OutOfRange { index: 1, len: 0 }));
    }

    #[test]
    fn swapped_size_tags_are_rejected() {
        let doc = cards("directory_page");
        let mut log = IssueLog::default();
        let s = extract_nth(&doc, 2, &mut log);
        assert_eq!(s.company_size, None);
        assert_eq!(s.founded_year, None);
        let implausible = log
            .reports()
            .iter()
            .filter(|r| matches!(r.issue, Issue::Implausible(_)))
            .count();
        assert_eq!(implausible, 2);
    }

    #[test]
    fn nameless_card_keeps_its_ordinal() {
        let doc = cards("directory_page");
        let mut log = IssueLog::default();
        let s = extract_nth(&doc, 3, &mut log);
        assert_eq!(s.name, None);
        assert_eq!(s.website.as_deref(), Some("https://ghost.example.com"));
        assert!(log.reports().iter().any(|r| r.entity == "card#3" && r.field == "name"));
    }

    #[test]
    fn funding_keywords() {
        assert_eq!(classify_funding("Series A ($12M)"), FundingKind::Round);
        assert_eq!(classify_funding("Pre-Seed"), FundingKind::Round);
        assert_eq!(classify_funding("$3B Valuation"), FundingKind::Valuation);
        assert_eq!(classify_funding("Y Combinator"), FundingKind::Investor);
    }
}
