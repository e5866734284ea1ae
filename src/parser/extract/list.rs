use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::parser::dom::{own_text, squash, visible_text};
use crate::report::Issue;

static BLOCKS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2, h3, ul").unwrap());
static HEADLINE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.mw-headline").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

static DASH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+[–-]\s+").unwrap());
static RANK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\((\d+)\)").unwrap());
static RANK_STRIP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\(\d+\)").unwrap());
static NOTES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*(?:\((.*?)\))?$").unwrap());

/// Section headings that end the company listing.
const NON_INDUSTRY_HEADINGS: &[&str] = &[
    "Contents",
    "See also",
    "References",
    "Notes",
    "External links",
    "Further reading",
];

/// One `<li>` of the list page, before parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem {
    pub industry: String,
    pub text: String,
    pub link: Option<String>,
}

/// `"<name> (<rank>) – <headquarters> (<notes>)"` split into parts.
#[derive(Debug, Clone, PartialEq)]
pub struct ListEntry {
    pub name: String,
    pub headquarters: String,
    pub fortune_rank: Option<u32>,
    pub notes: Option<String>,
}

/// Walk headings and lists in document order; every list item under an
/// industry heading becomes a [`ListItem`].
pub fn parse_company_list(doc: &Html) -> Vec<ListItem> {
    let mut industry: Option<String> = None;
    let mut items = Vec::new();

    for el in doc.select(&BLOCKS) {
        match el.value().name() {
            "h2" | "h3" => {
                let heading = heading_text(el);
                industry = if heading.is_empty() || NON_INDUSTRY_HEADINGS.contains(&heading.as_str()) {
                    None
                } else {
                    Some(heading)
                };
            }
            _ => {
                let Some(current) = &industry else {
                    continue;
                };
                for li in el.children().filter_map(ElementRef::wrap) {
                    if li.value().name() != "li" {
                        continue;
                    }
                    let text = squash(&own_text(li));
                    if text.is_empty() {
                        continue;
                    }
                    let link = li
                        .select(&LINK)
                        .next()
                        .and_then(|a| a.value().attr("href"))
                        .map(str::to_string);
                    items.push(ListItem {
                        industry: current.clone(),
                        text,
                        link,
                    });
                }
            }
        }
    }

    items
}

fn heading_text(el: ElementRef) -> String {
    match el.select(&HEADLINE).next() {
        Some(span) => squash(&visible_text(span)),
        None => {
            let text = squash(&visible_text(el));
            match text.strip_suffix("[edit]") {
                Some(t) => t.trim_end().to_string(),
                None => text,
            }
        }
    }
}

/// Split a list line on its first spaced dash. Without one the line is not
/// a company entry.
pub fn parse_list_entry(text: &str) -> Result<ListEntry, Issue> {
    let mut parts = DASH_RE.splitn(text, 2);
    let (Some(name), Some(location)) = (parts.next(), parts.next()) else {
        return Err(Issue::NoSeparator(text.to_string()));
    };
    let mut name = name.trim().to_string();
    let mut headquarters = location.trim().to_string();

    let mut notes = None;
    if headquarters.contains('(') {
        if let Some(caps) = NOTES_RE.captures(&headquarters) {
            notes = caps.get(2).map(|m| m.as_str().trim().to_string());
            headquarters = caps[1].trim().to_string();
        }
    }

    // a rank too large for u32 is dropped but still stripped from the name
    let ranked = RANK_RE
        .captures(&name)
        .map(|c| c[1].parse::<u32>().ok());
    if ranked.is_some() {
        name = RANK_STRIP_RE.replace_all(&name, "").trim().to_string();
    }
    let fortune_rank = ranked.flatten();

    if name.is_empty() {
        return Err(Issue::NoName);
    }

    Ok(ListEntry {
        name,
        headquarters,
        fortune_rank,
        notes,
    })
}

/// Absolute URL of the item's article, if it links to one.
pub fn detail_url(base: &str, link: Option<&str>) -> Option<String> {
    let href = link?;
    let title = href.strip_prefix("/wiki/")?;
    // namespaced pages (File:, Category:, …) are not company articles
    if title.is_empty() || title.contains(':') {
        return None;
    }
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_with_rank_and_notes() {
        let e = parse_list_entry("Acme Corp (42) – San Francisco, California (formerly Acme Inc.)").unwrap();
        assert_eq!(e.name, "Acme Corp");
        assert_eq!(e.fortune_rank, Some(42));
        assert_eq!(e.headquarters, "San Francisco, California");
        assert_eq!(e.notes.as_deref(), Some("formerly Acme Inc."));
    }

    #[test]
    fn oversized_rank_is_still_stripped() {
        let e = parse_list_entry("Bigco (99999999999) – San Jose").unwrap();
        assert_eq!(e.name, "Bigco");
        assert_eq!(e.fortune_rank, None);
        assert_eq!(e.headquarters, "San Jose");
    }

    #[test]
    fn entry_plain_hyphen() {
        let e = parse_list_entry("Zeta Systems - Palo Alto").unwrap();
        assert_eq!(e.name, "Zeta Systems");
        assert_eq!(e.headquarters, "Palo Alto");
        assert_eq!(e.fortune_rank, None);
        assert_eq!(e.notes, None);
    }

    #[test]
    fn entry_splits_on_first_dash_only() {
        let e = parse_list_entry("Hewlett-Packard – Palo Alto – est. 1939").unwrap();
        assert_eq!(e.name, "Hewlett-Packard");
        assert_eq!(e.headquarters, "Palo Alto – est. 1939");
    }

    #[test]
    fn entry_without_separator_fails() {
        assert_eq!(
            parse_list_entry("Acme Corp, San Francisco"),
            Err(Issue::NoSeparator("Acme Corp, San Francisco".into()))
        );
    }

    #[test]
    fn entry_without_name_fails() {
        assert_eq!(parse_list_entry(" – Oakland"), Err(Issue::NoName));
        assert_eq!(parse_list_entry("(12) – Oakland"), Err(Issue::NoName));
    }

    #[test]
    fn list_page_items() {
        let html = std::fs::read_to_string("tests/fixtures/wiki_list.html").unwrap();
        let doc = Html::parse_document(&html);
        let items = parse_company_list(&doc);
        let industries: Vec<&str> = items.iter().map(|i| i.industry.as_str()).collect();
        assert!(industries.iter().all(|i| *i == "Technology" || *i == "Biotechnology"));
        assert_eq!(items.len(), 5);
        assert_eq!(items[0].text, "Acme Corp (42) – San Francisco, California (formerly Acme Inc.)");
        assert_eq!(items[0].link.as_deref(), Some("/wiki/Acme_Corp"));
        // nested sub-list lines are their own items
        assert!(items.iter().any(|i| i.text == "Acme Labs – Berkeley"));
        assert!(items.iter().any(|i| i.text == "Orphan Industries"));
    }

    #[test]
    fn detail_urls() {
        let base = "https://en.wikipedia.org";
        assert_eq!(
            detail_url(base, Some("/wiki/Acme_Corp")).as_deref(),
            Some("https://en.wikipedia.org/wiki/Acme_Corp")
        );
        assert_eq!(detail_url(base, Some("/wiki/File:Logo.png")), None);
        assert_eq!(detail_url(base, Some("/w/index.php?title=X&action=edit&redlink=1")), None);
        assert_eq!(detail_url(base, Some("https://acme.example.com")), None);
        assert_eq!(detail_url(base, None), None);
    }
}
