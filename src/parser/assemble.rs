use std::fmt;

use super::extract::card::StartupFields;
use super::extract::infobox::InfoboxFields;
use super::extract::list::ListEntry;
use super::normalize::{
    normalize_currency, normalize_location, parse_employee_count, parse_founded_year, Money,
    SizeBand,
};
use crate::report::{Issue, Reporter};

/// Flattened list cells are joined with this.
pub const LIST_SEPARATOR: &str = ", ";

const STARTUP_MAX_AGE: i32 = 10;
const STARTUP_MAX_EMPLOYEES: u64 = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct StartupRecord {
    pub name: String,
    pub description: String,
    pub industries: Vec<String>,
    pub location: String,
    pub company_size: String,
    pub employee_estimate: Option<u64>,
    pub founded_year: Option<i32>,
    pub investors: Vec<String>,
    pub latest_funding: String,
    pub latest_funding_amount: Option<Money>,
    pub valuation: String,
    pub valuation_amount: Option<Money>,
    pub website: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompanyRecord {
    pub name: String,
    pub industry: String,
    pub headquarters: String,
    pub fortune_500_rank: Option<u32>,
    pub notes: String,
    pub company_type: String,
    pub traded_as: String,
    pub founded: String,
    pub founded_year: Option<i32>,
    pub revenue: String,
    pub revenue_amount: Option<Money>,
    pub employees: String,
    pub employees_numeric: Option<u64>,
    pub company_size: String,
    pub startup: bool,
    pub founders: Vec<String>,
    pub key_people: Vec<String>,
    pub services: Vec<String>,
    pub subsidiaries: Vec<String>,
    pub formerly: String,
    pub website: String,
    pub wikipedia_url: String,
}

/// A list entry, its section heading and (if fetched) its detail page.
pub struct CompanySource<'a> {
    pub entry: ListEntry,
    pub industry: &'a str,
    pub infobox: Option<InfoboxFields>,
    pub wikipedia_url: Option<String>,
}

/// Build a startup row; `None` when the card had no name.
pub fn assemble_startup(
    fields: StartupFields,
    entity: &str,
    reporter: &mut dyn Reporter,
) -> Option<StartupRecord> {
    let Some(name) = fields.name.filter(|n| !n.trim().is_empty()) else {
        reporter.report(entity, "name", Issue::NoName);
        return None;
    };

    let company_size = fields.company_size.unwrap_or_default();
    let employee_estimate = SizeBand::from_label(&company_size)
        .map(|band| band.midpoint())
        .or_else(|| parse_employee_count(&company_size));
    let founded_year = fields.founded_year.as_deref().and_then(parse_founded_year);

    let latest_funding = fields.latest_funding.unwrap_or_default();
    let latest_funding_amount = money(&name, "latest_funding", &latest_funding, reporter);
    let valuation = fields.valuation.unwrap_or_default();
    let valuation_amount = money(&name, "valuation", &valuation, reporter);

    Some(StartupRecord {
        description: fields.description.unwrap_or_default(),
        industries: fields.industries,
        location: fields.location.as_deref().map(normalize_location).unwrap_or_default(),
        company_size,
        employee_estimate,
        founded_year,
        investors: fields.investors,
        latest_funding,
        latest_funding_amount,
        valuation,
        valuation_amount,
        website: fields.website.unwrap_or_default(),
        name,
    })
}

/// Merge a list entry with its infobox. Infobox industry and headquarters win
/// over the list values when present.
pub fn assemble_company(
    source: CompanySource,
    as_of_year: i32,
    reporter: &mut dyn Reporter,
) -> Option<CompanyRecord> {
    let CompanySource {
        entry,
        industry,
        infobox,
        wikipedia_url,
    } = source;
    if entry.name.trim().is_empty() {
        reporter.report(&format!("{} – {}", entry.name, entry.headquarters), "name", Issue::NoName);
        return None;
    }
    let name = entry.name;
    let info = infobox.unwrap_or_default();

    let industry = info.industry.unwrap_or_else(|| industry.to_string());
    let headquarters = normalize_location(&info.headquarters.unwrap_or(entry.headquarters));

    let founded = info.founded.unwrap_or_default();
    let founded_year = if founded.is_empty() {
        None
    } else {
        let year = parse_founded_year(&founded);
        if year.is_none() {
            reporter.report(&name, "founded_year", Issue::Unparseable(founded.clone()));
        }
        year
    };

    let revenue = info.revenue.unwrap_or_default();
    let revenue_amount = money(&name, "revenue", &revenue, reporter);

    let employees = info.employees.unwrap_or_default();
    let employees_numeric = if employees.is_empty() {
        None
    } else {
        let count = parse_employee_count(&employees);
        if count.is_none() {
            reporter.report(&name, "employees", Issue::Unparseable(employees.clone()));
        }
        count
    };
    let company_size = employees_numeric
        .map(|n| SizeBand::for_count(n).label())
        .unwrap_or_default();

    Some(CompanyRecord {
        industry,
        headquarters,
        fortune_500_rank: entry.fortune_rank,
        notes: entry.notes.unwrap_or_default(),
        company_type: info.company_type.unwrap_or_default(),
        traded_as: info.traded_as.unwrap_or_default(),
        founded,
        founded_year,
        revenue,
        revenue_amount,
        employees,
        employees_numeric,
        company_size,
        startup: is_startup(founded_year, employees_numeric, as_of_year),
        founders: info.founders,
        key_people: info.key_people,
        services: info.services,
        subsidiaries: info.subsidiaries,
        formerly: info.formerly.unwrap_or_default(),
        website: info.website.unwrap_or_default(),
        wikipedia_url: wikipedia_url.unwrap_or_default(),
        name,
    })
}

/// Young and small: founded under ten years before `as_of_year`, under 500 people.
pub fn is_startup(founded_year: Option<i32>, employees: Option<u64>, as_of_year: i32) -> bool {
    match (founded_year, employees) {
        (Some(year), Some(count)) => {
            let age = as_of_year - year;
            (0..STARTUP_MAX_AGE).contains(&age) && count < STARTUP_MAX_EMPLOYEES
        }
        _ => false,
    }
}

fn money(entity: &str, field: &'static str, raw: &str, reporter: &mut dyn Reporter) -> Option<Money> {
    if raw.is_empty() {
        return None;
    }
    let amount = normalize_currency(raw);
    if amount.is_none() {
        reporter.report(entity, field, Issue::Unparseable(raw.to_string()));
    }
    amount
}

// ── Tabular rows ──

/// One typed output cell. `Empty` is an absent numeric derivation; it is
/// stored as NULL and written as "".
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Integer(i64),
    Real(f64),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Integer(n) => write!(f, "{}", n),
            Cell::Real(x) => write!(f, "{}", x),
        }
    }
}

fn text(s: &str) -> Cell {
    Cell::Text(s.to_string())
}

fn list(items: &[String]) -> Cell {
    Cell::Text(items.join(LIST_SEPARATOR))
}

/// Counts past `i64::MAX` have no stored form and become empty.
fn count(n: Option<u64>) -> Cell {
    n.and_then(|n| i64::try_from(n).ok())
        .map_or(Cell::Empty, Cell::Integer)
}

fn int(n: Option<impl Into<i64>>) -> Cell {
    n.map_or(Cell::Empty, |n| Cell::Integer(n.into()))
}

fn amount_cells(m: Option<Money>) -> [Cell; 2] {
    match m {
        Some(m) => [Cell::Real(m.millions), text(m.unit.as_str())],
        None => [Cell::Empty, Cell::Empty],
    }
}

impl StartupRecord {
    pub const COLUMNS: &'static [&'static str] = &[
        "name",
        "description",
        "industries",
        "location",
        "company_size",
        "employee_estimate",
        "founded_year",
        "investors",
        "latest_funding",
        "latest_funding_in_millions",
        "latest_funding_original_unit",
        "valuation",
        "valuation_in_millions",
        "valuation_original_unit",
        "website",
    ];

    /// One cell per column; list fields are joined here and nowhere else.
    pub fn to_row(&self) -> Vec<Cell> {
        let [lf_amount, lf_unit] = amount_cells(self.latest_funding_amount);
        let [val_amount, val_unit] = amount_cells(self.valuation_amount);
        vec![
            text(&self.name),
            text(&self.description),
            list(&self.industries),
            text(&self.location),
            text(&self.company_size),
            count(self.employee_estimate),
            int(self.founded_year),
            list(&self.investors),
            text(&self.latest_funding),
            lf_amount,
            lf_unit,
            text(&self.valuation),
            val_amount,
            val_unit,
            text(&self.website),
        ]
    }
}

impl CompanyRecord {
    pub const COLUMNS: &'static [&'static str] = &[
        "name",
        "industry",
        "headquarters",
        "fortune_500_rank",
        "notes",
        "type",
        "traded_as",
        "founded",
        "founded_year",
        "revenue",
        "revenue_in_millions",
        "revenue_original_unit",
        "employees",
        "employees_numeric",
        "company_size",
        "startup",
        "founders",
        "key_people",
        "services",
        "subsidiaries",
        "formerly",
        "website",
        "wikipedia_url",
    ];

    pub fn to_row(&self) -> Vec<Cell> {
        let [rev_amount, rev_unit] = amount_cells(self.revenue_amount);
        vec![
            text(&self.name),
            text(&self.industry),
            text(&self.headquarters),
            int(self.fortune_500_rank),
            text(&self.notes),
            text(&self.company_type),
            text(&self.traded_as),
            text(&self.founded),
            int(self.founded_year),
            text(&self.revenue),
            rev_amount,
            rev_unit,
            text(&self.employees),
            count(self.employees_numeric),
            text(&self.company_size),
            text(if self.startup { "Yes" } else { "No" }),
            list(&self.founders),
            list(&self.key_people),
            list(&self.services),
            list(&self.subsidiaries),
            text(&self.formerly),
            text(&self.website),
            text(&self.wikipedia_url),
        ]
    }
}
