use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::Fields;
use crate::parser::dom::{non_empty, squash, visible_text};
use crate::report::{Issue, Reporter};

static INFOBOX: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table.infobox").unwrap());
static ROW: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static HEADER: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th").unwrap());
static CELL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").unwrap());
static ITEM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("li").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Industry,
    Founded,
    Headquarters,
    Revenue,
    Employees,
    Type,
    TradedAs,
    Founders,
    KeyPeople,
    Services,
    Subsidiaries,
    Website,
    Formerly,
}

impl Label {
    pub fn from_header(text: &str) -> Option<Label> {
        let label = match squash(text).as_str() {
            "Industry" => Label::Industry,
            "Founded" => Label::Founded,
            "Headquarters" => Label::Headquarters,
            "Revenue" => Label::Revenue,
            "Number of employees" => Label::Employees,
            "Type" => Label::Type,
            "Traded as" => Label::TradedAs,
            "Founders" | "Founder" => Label::Founders,
            "Key people" => Label::KeyPeople,
            "Services" => Label::Services,
            "Subsidiaries" => Label::Subsidiaries,
            "Website" => Label::Website,
            "Formerly" => Label::Formerly,
            _ => return None,
        };
        Some(label)
    }

    pub fn field(self) -> &'static str {
        match self {
            Label::Industry => "industry",
            Label::Founded => "founded",
            Label::Headquarters => "headquarters",
            Label::Revenue => "revenue",
            Label::Employees => "employees",
            Label::Type => "type",
            Label::TradedAs => "traded_as",
            Label::Founders => "founders",
            Label::KeyPeople => "key_people",
            Label::Services => "services",
            Label::Subsidiaries => "subsidiaries",
            Label::Website => "website",
            Label::Formerly => "formerly",
        }
    }
}

/// Raw infobox values of one wiki detail page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfoboxFields {
    pub industry: Option<String>,
    pub founded: Option<String>,
    pub headquarters: Option<String>,
    pub revenue: Option<String>,
    pub employees: Option<String>,
    pub company_type: Option<String>,
    pub traded_as: Option<String>,
    pub founders: Vec<String>,
    pub key_people: Vec<String>,
    pub services: Vec<String>,
    pub subsidiaries: Vec<String>,
    pub website: Option<String>,
    pub formerly: Option<String>,
}

pub fn find(doc: &Html) -> Option<ElementRef<'_>> {
    doc.select(&INFOBOX).next()
}

pub fn extract(infobox: ElementRef, entity: &str, reporter: &mut dyn Reporter) -> InfoboxFields {
    let mut fields = Fields::new(entity, reporter);

    // first row wins for repeated labels
    let mut cells: Vec<(Label, ElementRef)> = Vec::new();
    for row in infobox.select(&ROW) {
        let Some(th) = row.select(&HEADER).next() else {
            continue;
        };
        let Some(label) = Label::from_header(&visible_text(th)) else {
            continue;
        };
        if let Some(td) = row.select(&CELL).next() {
            if !cells.iter().any(|(l, _)| *l == label) {
                cells.push((label, td));
            }
        }
    }
    let cells = cells.as_slice();

    InfoboxFields {
        industry: scalar(&mut fields, cells, Label::Industry),
        founded: scalar(&mut fields, cells, Label::Founded),
        headquarters: scalar(&mut fields, cells, Label::Headquarters),
        revenue: scalar(&mut fields, cells, Label::Revenue),
        employees: scalar(&mut fields, cells, Label::Employees),
        company_type: scalar(&mut fields, cells, Label::Type),
        traded_as: scalar(&mut fields, cells, Label::TradedAs),
        founders: list(&mut fields, cells, Label::Founders),
        key_people: list(&mut fields, cells, Label::KeyPeople),
        services: list(&mut fields, cells, Label::Services),
        subsidiaries: list(&mut fields, cells, Label::Subsidiaries),
        website: scalar(&mut fields, cells, Label::Website),
        formerly: scalar(&mut fields, cells, Label::Formerly),
    }
}

fn cell<'a>(cells: &[(Label, ElementRef<'a>)], label: Label) -> Result<ElementRef<'a>, Issue> {
    cells
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, td)| *td)
        .ok_or(Issue::Missing)
}

fn scalar(fields: &mut Fields, cells: &[(Label, ElementRef)], label: Label) -> Option<String> {
    let value = cell(cells, label).and_then(|td| non_empty(&visible_text(td)));
    fields.field(label.field(), value)
}

fn list(fields: &mut Fields, cells: &[(Label, ElementRef)], label: Label) -> Vec<String> {
    fields.list(label.field(), cell(cells, label).and_then(list_items))
}

/// Nested `<li>` items when present, else the cell text split on commas and line breaks.
fn list_items(td: ElementRef) -> Result<Vec<String>, Issue> {
    let from_items: Vec<String> = td.select(&ITEM).map(|li| squash(&visible_text(li))).collect();
    let items: Vec<String> = if from_items.is_empty() {
        visible_text(td)
            .split([',', '\n'])
            .map(squash)
            .filter(|s| !s.is_empty())
            .collect()
    } else {
        from_items.into_iter().filter(|s| !s.is_empty()).collect()
    };
    if items.is_empty() {
        Err(Issue::Missing)
    } else {
        Ok(items)
    }
}
