pub mod assemble;
pub mod dom;
pub mod extract;
pub mod normalize;

use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::report::{Issue, Reporter};
use assemble::{assemble_company, assemble_startup, CompanyRecord, CompanySource, StartupRecord};
use extract::{card, infobox, list};

static CARD: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.card.card-body#item-card-filter").unwrap());
static MORE_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.infinite-more-link").unwrap());

/// One page of the startup directory.
#[derive(Debug)]
pub struct DirectoryPage {
    pub records: Vec<StartupRecord>,
    /// Cards seen, including the ones dropped for lack of a name.
    pub cards: usize,
    pub has_more: bool,
}

impl DirectoryPage {
    pub fn is_empty(&self) -> bool {
        self.cards == 0
    }
}

/// Card count and more-link of a directory page, without extracting anything.
pub fn directory_pagination(html: &str) -> (usize, bool) {
    let doc = Html::parse_document(html);
    (doc.select(&CARD).count(), has_more_link(&doc))
}

/// Card → fields → record, in document order.
pub fn process_directory_page(html: &str, reporter: &mut dyn Reporter) -> DirectoryPage {
    let doc = Html::parse_document(html);
    let mut records = Vec::new();
    let mut cards = 0;

    for (ordinal, node) in doc.select(&CARD).enumerate() {
        cards += 1;
        let fields = card::extract(node, ordinal, reporter);
        let entity = format!("card#{ordinal}");
        if let Some(record) = assemble_startup(fields, &entity, reporter) {
            records.push(record);
        }
    }

    DirectoryPage {
        records,
        cards,
        has_more: has_more_link(&doc),
    }
}

fn has_more_link(doc: &Html) -> bool {
    doc.select(&MORE_LINK).next().is_some()
}

/// Article URLs linked from the list page, deduplicated. Nested sub-lists
/// come after their parent list.
pub fn detail_urls(html: &str, base: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let mut urls: Vec<String> = Vec::new();
    for item in list::parse_company_list(&doc) {
        if let Some(url) = list::detail_url(base, item.link.as_deref()) {
            if !urls.contains(&url) {
                urls.push(url);
            }
        }
    }
    urls
}

/// Turn the wiki list page into company records. `lookup_detail` returns the
/// stored HTML of an article URL, if it was fetched.
pub fn process_company_list(
    html: &str,
    base: &str,
    lookup_detail: impl Fn(&str) -> Option<String>,
    as_of_year: i32,
    reporter: &mut dyn Reporter,
) -> Vec<CompanyRecord> {
    let doc = Html::parse_document(html);
    let mut records = Vec::new();

    for item in list::parse_company_list(&doc) {
        let entry = match list::parse_list_entry(&item.text) {
            Ok(entry) => entry,
            Err(issue) => {
                reporter.report(&item.text, "entry", issue);
                continue;
            }
        };

        let mut infobox = None;
        let mut wikipedia_url = None;
        if let Some(url) = list::detail_url(base, item.link.as_deref()) {
            if let Some(detail_html) = lookup_detail(&url) {
                let detail = Html::parse_document(&detail_html);
                match infobox::find(&detail) {
                    Some(table) => infobox = Some(infobox::extract(table, &entry.name, reporter)),
                    None => reporter.report(&entry.name, "infobox", Issue::Missing),
                }
                wikipedia_url = Some(url);
            }
        }

        let source = CompanySource {
            entry,
            industry: &item.industry,
            infobox,
            wikipedia_url,
        };
        if let Some(record) = assemble_company(source, as_of_year, reporter) {
            records.push(record);
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::IssueLog;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    #[test]
    fn directory_page_end_to_end() {
        let mut log = IssueLog::default();
        let page = process_directory_page(&fixture("directory_page"), &mut log);
        assert_eq!(page.cards, 4);
        assert!(page.has_more);
        assert!(!page.is_empty());

        let names: Vec<&str> = page.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Orbital Labs", "Quiet Co", "Shuffled Inc"]);

        let orbital = &page.records[0];
        assert_eq!(orbital.employee_estimate, Some(125));
        assert_eq!(orbital.founded_year, Some(2018));
        assert_eq!(orbital.valuation_amount.map(|m| m.millions), Some(1200.0));

        let shuffled = &page.records[2];
        assert_eq!(shuffled.location, "Palo Alto, California, US");
        assert_eq!(shuffled.company_size, "");
        assert_eq!(shuffled.founded_year, None);

        assert_eq!(log.dropped(), 1);
    }

    #[test]
    fn empty_directory_page() {
        let mut log = IssueLog::default();
        let page = process_directory_page("<html><body><p>No results</p></body></html>", &mut log);
        assert!(page.is_empty());
        assert!(!page.has_more);
        assert!(page.records.is_empty());
        assert_eq!(directory_pagination("<p>No results</p>"), (0, false));
    }

    #[test]
    fn pagination_matches_full_parse() {
        assert_eq!(directory_pagination(&fixture("directory_page")), (4, true));
    }

    #[test]
    fn detail_urls_skip_redlinks() {
        let urls = detail_urls(&fixture("wiki_list"), "https://en.wikipedia.org");
        assert_eq!(
            urls,
            vec![
                "https://en.wikipedia.org/wiki/Acme_Corp",
                "https://en.wikipedia.org/wiki/Zeta_Systems",
                "https://en.wikipedia.org/wiki/Acme_Labs",
            ]
        );
    }

    #[test]
    fn company_list_end_to_end() {
        let detail = fixture("company_detail");
        let lookup = |url: &str| url.ends_with("/wiki/Acme_Corp").then(|| detail.clone());
        let mut log = IssueLog::default();
        let records = process_company_list(
            &fixture("wiki_list"),
            "https://en.wikipedia.org",
            lookup,
            2024,
            &mut log,
        );

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Acme Corp", "Zeta Systems", "Acme Labs", "Genetech Bio"]);

        // the line without a dash is dropped and reported
        assert!(log
            .reports()
            .iter()
            .any(|r| r.field == "entry" && r.issue == Issue::NoSeparator("Orphan Industries".into())));

        let acme = &records[0];
        assert_eq!(acme.fortune_500_rank, Some(42));
        assert_eq!(acme.notes, "formerly Acme Inc.");
        assert_eq!(acme.industry, "Software, Cloud computing");
        assert_eq!(acme.headquarters, "San Francisco, California, US");
        assert_eq!(acme.founded_year, Some(1999));
        assert_eq!(acme.revenue_amount.map(|m| m.millions), Some(4500.0));
        assert_eq!(acme.employees_numeric, Some(12_400));
        assert_eq!(acme.company_size, "10001+ employees");
        assert!(!acme.startup);
        assert_eq!(acme.wikipedia_url, "https://en.wikipedia.org/wiki/Acme_Corp");

        let zeta = &records[1];
        assert_eq!(zeta.industry, "Technology");
        assert_eq!(zeta.headquarters, "Palo Alto");
        assert_eq!(zeta.wikipedia_url, "");

        let genetech = &records[3];
        assert_eq!(genetech.industry, "Biotechnology");
        assert_eq!(genetech.fortune_500_rank, Some(301));
        assert_eq!(genetech.headquarters, "South San Francisco, US");
    }
}
