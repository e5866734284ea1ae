use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};

use crate::parser::assemble::{Cell, CompanyRecord, StartupRecord, LIST_SEPARATOR};
use crate::report::Report;

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("cannot open {}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            id         INTEGER PRIMARY KEY,
            url        TEXT UNIQUE NOT NULL,
            kind       TEXT NOT NULL CHECK(kind IN ('directory','wiki_list','wiki_detail')),
            html       TEXT,
            status     INTEGER,
            error      TEXT,
            latency_ms INTEGER,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_pages_kind ON pages(kind);

        CREATE TABLE IF NOT EXISTS startups (
            id                           INTEGER PRIMARY KEY,
            name                         TEXT NOT NULL,
            description                  TEXT,
            industries                   TEXT,
            location                     TEXT,
            company_size                 TEXT,
            employee_estimate            INTEGER,
            founded_year                 INTEGER,
            investors                    TEXT,
            latest_funding               TEXT,
            latest_funding_in_millions   REAL,
            latest_funding_original_unit TEXT CHECK(latest_funding_original_unit IN ('M','B')),
            valuation                    TEXT,
            valuation_in_millions        REAL,
            valuation_original_unit      TEXT CHECK(valuation_original_unit IN ('M','B')),
            website                      TEXT
        );

        CREATE TABLE IF NOT EXISTS companies (
            id                    INTEGER PRIMARY KEY,
            name                  TEXT NOT NULL,
            industry              TEXT,
            headquarters          TEXT,
            fortune_500_rank      INTEGER,
            notes                 TEXT,
            type                  TEXT,
            traded_as             TEXT,
            founded               TEXT,
            founded_year          INTEGER,
            revenue               TEXT,
            revenue_in_millions   REAL,
            revenue_original_unit TEXT CHECK(revenue_original_unit IN ('M','B')),
            employees             TEXT,
            employees_numeric     INTEGER,
            company_size          TEXT,
            startup               TEXT NOT NULL CHECK(startup IN ('Yes','No')),
            founders              TEXT,
            key_people            TEXT,
            services              TEXT,
            subsidiaries          TEXT,
            formerly              TEXT,
            website               TEXT,
            wikipedia_url         TEXT
        );

        CREATE TABLE IF NOT EXISTS issues (
            id         INTEGER PRIMARY KEY,
            run_id     TEXT NOT NULL,
            entity     TEXT NOT NULL,
            field      TEXT NOT NULL,
            kind       TEXT NOT NULL,
            reason     TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_issues_run ON issues(run_id);
        ",
    )?;
    Ok(())
}

// ── Pages ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Directory,
    WikiList,
    WikiDetail,
}

impl PageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PageKind::Directory => "directory",
            PageKind::WikiList => "wiki_list",
            PageKind::WikiDetail => "wiki_detail",
        }
    }
}

/// One fetch attempt's outcome; `html` is `None` when the fetch failed.
#[derive(Debug, Clone)]
pub struct PageRow {
    pub url: String,
    pub kind: PageKind,
    pub html: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

/// Insert or refresh a page; the latest fetch wins.
pub fn upsert_page(conn: &Connection, row: &PageRow) -> Result<()> {
    conn.execute(
        "INSERT INTO pages (url, kind, html, status, error, latency_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(url) DO UPDATE SET
            kind = excluded.kind, html = excluded.html, status = excluded.status,
            error = excluded.error, latency_ms = excluded.latency_ms,
            fetched_at = datetime('now')",
        rusqlite::params![
            row.url,
            row.kind.as_str(),
            row.html,
            row.status,
            row.error,
            row.latency_ms,
        ],
    )?;
    Ok(())
}

/// URLs of `kind` already stored with content.
pub fn known_urls(conn: &Connection, kind: PageKind) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT url FROM pages WHERE kind = ?1 AND html IS NOT NULL")?;
    let rows = stmt
        .query_map([kind.as_str()], |row| row.get(0))?
        .collect::<Result<HashSet<String>, _>>()?;
    Ok(rows)
}

pub struct StoredPage {
    pub url: String,
    pub html: String,
}

/// Successfully fetched pages of `kind`, in insertion order.
pub fn fetch_pages(conn: &Connection, kind: PageKind) -> Result<Vec<StoredPage>> {
    let mut stmt = conn.prepare(
        "SELECT url, html FROM pages WHERE kind = ?1 AND html IS NOT NULL ORDER BY id",
    )?;
    let rows = stmt
        .query_map([kind.as_str()], |row| {
            Ok(StoredPage {
                url: row.get(0)?,
                html: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Detail-page HTML keyed by URL.
pub fn detail_pages(conn: &Connection) -> Result<HashMap<String, String>> {
    Ok(fetch_pages(conn, PageKind::WikiDetail)?
        .into_iter()
        .map(|p| (p.url, p.html))
        .collect())
}

// ── Records ──

impl From<Cell> for Value {
    fn from(cell: Cell) -> Value {
        match cell {
            Cell::Empty => Value::Null,
            Cell::Text(s) => Value::Text(s),
            Cell::Integer(n) => Value::Integer(n),
            Cell::Real(x) => Value::Real(x),
        }
    }
}

fn insert_sql(table: Table) -> String {
    let columns = table.columns();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table.name(),
        columns.join(", "),
        placeholders.join(",")
    )
}

/// Replace both record tables in one transaction. Rows are bound straight
/// from each record's cells, in column order.
pub fn save_records(
    conn: &Connection,
    startups: &[StartupRecord],
    companies: &[CompanyRecord],
) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM startups", [])?;
    tx.execute("DELETE FROM companies", [])?;
    {
        let mut s_stmt = tx.prepare(&insert_sql(Table::Startups))?;
        for s in startups {
            s_stmt.execute(rusqlite::params_from_iter(s.to_row().into_iter().map(Value::from)))?;
        }

        let mut c_stmt = tx.prepare(&insert_sql(Table::Companies))?;
        for c in companies {
            c_stmt.execute(rusqlite::params_from_iter(c.to_row().into_iter().map(Value::from)))?;
        }
    }
    tx.commit()?;
    Ok(())
}

pub fn save_issues(conn: &Connection, run_id: &str, reports: &[Report]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO issues (run_id, entity, field, kind, reason) VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for r in reports {
            count += stmt.execute(rusqlite::params![
                run_id,
                r.entity,
                r.field,
                r.issue.kind(),
                r.issue.to_string(),
            ])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Export ──

#[derive(Debug, Clone, Copy)]
pub enum Table {
    Startups,
    Companies,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Startups => "startups",
            Table::Companies => "companies",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Startups => StartupRecord::COLUMNS,
            Table::Companies => CompanyRecord::COLUMNS,
        }
    }
}

/// Every stored row as text cells in column order; NULL becomes "".
pub fn export_rows(conn: &Connection, table: Table) -> Result<Vec<Vec<String>>> {
    let columns = table.columns();
    let sql = format!(
        "SELECT {} FROM {} ORDER BY id",
        columns.join(", "),
        table.name()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            (0..columns.len())
                .map(|i| row.get::<_, Value>(i).map(cell_text))
                .collect::<Result<Vec<_>, _>>()
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn cell_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Integer(n) => n.to_string(),
        Value::Real(f) => f.to_string(),
        Value::Text(s) => s,
        Value::Blob(b) => String::from_utf8_lossy(&b).into_owned(),
    }
}

// ── Stats ──

pub struct Stats {
    pub directory_pages: usize,
    pub wiki_pages: usize,
    pub fetch_errors: usize,
    pub startups: usize,
    pub companies: usize,
    pub issues: usize,
    pub latest_run: Option<String>,
    /// (field, count) of the latest run, missing fields excluded.
    pub latest_fields: Vec<(String, usize)>,
    pub startup_data: StartupSummary,
    pub company_data: CompanySummary,
}

#[derive(Debug, Default, PartialEq)]
pub struct StartupSummary {
    pub unique_industries: usize,
    pub common_size: Option<String>,
    pub founded_range: Option<(i32, i32)>,
}

#[derive(Debug, Default, PartialEq)]
pub struct CompanySummary {
    /// Five largest industries by company count.
    pub top_industries: Vec<(String, usize)>,
    pub total_employees: Option<i64>,
    pub avg_employees: Option<f64>,
    pub fortune_500: usize,
}

const TOP_INDUSTRIES: usize = 5;

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let directory_pages: usize = conn.query_row(
        "SELECT COUNT(*) FROM pages WHERE kind = 'directory'",
        [],
        |r| r.get(0),
    )?;
    let wiki_pages: usize = conn.query_row(
        "SELECT COUNT(*) FROM pages WHERE kind != 'directory'",
        [],
        |r| r.get(0),
    )?;
    let fetch_errors: usize = conn.query_row(
        "SELECT COUNT(*) FROM pages WHERE error IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let startups: usize = conn.query_row("SELECT COUNT(*) FROM startups", [], |r| r.get(0))?;
    let companies: usize = conn.query_row("SELECT COUNT(*) FROM companies", [], |r| r.get(0))?;
    let issues: usize = conn.query_row("SELECT COUNT(*) FROM issues", [], |r| r.get(0))?;
    let latest_run: Option<String> = conn
        .query_row(
            "SELECT run_id FROM issues ORDER BY id DESC LIMIT 1",
            [],
            |r| r.get(0),
        )
        .optional()?;

    let mut latest_fields = Vec::new();
    if let Some(run) = &latest_run {
        let mut stmt = conn.prepare(
            "SELECT field, COUNT(*) FROM issues
             WHERE run_id = ?1 AND kind != 'missing'
             GROUP BY field ORDER BY COUNT(*) DESC, field",
        )?;
        latest_fields = stmt
            .query_map([run], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
    }

    Ok(Stats {
        directory_pages,
        wiki_pages,
        fetch_errors,
        startups,
        companies,
        issues,
        latest_run,
        latest_fields,
        startup_data: startup_summary(conn)?,
        company_data: company_summary(conn)?,
    })
}

fn startup_summary(conn: &Connection) -> Result<StartupSummary> {
    let mut stmt = conn.prepare("SELECT industries FROM startups WHERE industries != ''")?;
    let joined = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    let industries: HashSet<&str> = joined
        .iter()
        .flat_map(|s| s.split(LIST_SEPARATOR))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let common_size: Option<String> = conn
        .query_row(
            "SELECT company_size FROM startups WHERE company_size != ''
             GROUP BY company_size ORDER BY COUNT(*) DESC, company_size LIMIT 1",
            [],
            |r| r.get(0),
        )
        .optional()?;

    let (first, last): (Option<i32>, Option<i32>) = conn.query_row(
        "SELECT MIN(founded_year), MAX(founded_year) FROM startups",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    Ok(StartupSummary {
        unique_industries: industries.len(),
        common_size,
        founded_range: first.zip(last),
    })
}

fn company_summary(conn: &Connection) -> Result<CompanySummary> {
    let mut stmt = conn.prepare(
        "SELECT industry, COUNT(*) FROM companies WHERE industry != ''
         GROUP BY industry ORDER BY COUNT(*) DESC, industry LIMIT ?1",
    )?;
    let top_industries = stmt
        .query_map([TOP_INDUSTRIES as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let (total_employees, avg_employees): (Option<i64>, Option<f64>) = conn.query_row(
        "SELECT SUM(employees_numeric), AVG(employees_numeric) FROM companies",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    let fortune_500: usize = conn.query_row(
        "SELECT COUNT(fortune_500_rank) FROM companies",
        [],
        |r| r.get(0),
    )?;

    Ok(CompanySummary {
        top_industries,
        total_employees,
        avg_employees,
        fortune_500,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::normalize::{Money, MoneyUnit};
    use crate::report::Issue;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn page(url: &str, kind: PageKind, html: Option<&str>) -> PageRow {
        PageRow {
            url: url.to_string(),
            kind,
            html: html.map(str::to_string),
            status: html.map(|_| 200),
            error: if html.is_none() { Some("HTTP 503".into()) } else { None },
            latency_ms: Some(12),
        }
    }

    fn text_row(s: &StartupRecord) -> Vec<String> {
        s.to_row().iter().map(Cell::to_string).collect()
    }

    fn startup(name: &str) -> StartupRecord {
        StartupRecord {
            name: name.to_string(),
            description: String::new(),
            industries: vec!["AI".into(), "Robotics".into()],
            location: "San Francisco, CA".into(),
            company_size: "11-50 employees".into(),
            employee_estimate: Some(30),
            founded_year: Some(2021),
            investors: vec![],
            latest_funding: "Series A ($12M)".into(),
            latest_funding_amount: Some(Money { millions: 12.0, unit: MoneyUnit::M }),
            valuation: String::new(),
            valuation_amount: None,
            website: String::new(),
        }
    }

    fn company(name: &str) -> CompanyRecord {
        CompanyRecord {
            name: name.to_string(),
            industry: "Software".into(),
            headquarters: "San Francisco, California, US".into(),
            fortune_500_rank: Some(42),
            notes: String::new(),
            company_type: "Public".into(),
            traded_as: String::new(),
            founded: "1999".into(),
            founded_year: Some(1999),
            revenue: "US$4.5 billion".into(),
            revenue_amount: Some(Money { millions: 4500.0, unit: MoneyUnit::B }),
            employees: "12,400".into(),
            employees_numeric: Some(12_400),
            company_size: "10001+ employees".into(),
            startup: false,
            founders: vec!["Ada Park".into(), "Ben Ortiz".into()],
            key_people: vec![],
            services: vec![],
            subsidiaries: vec![],
            formerly: String::new(),
            website: String::new(),
            wikipedia_url: String::new(),
        }
    }

    #[test]
    fn upsert_keeps_latest_fetch() {
        let conn = memory();
        let url = "https://en.wikipedia.org/wiki/Acme_Corp";
        upsert_page(&conn, &page(url, PageKind::WikiDetail, None)).unwrap();
        assert!(known_urls(&conn, PageKind::WikiDetail).unwrap().is_empty());

        upsert_page(&conn, &page(url, PageKind::WikiDetail, Some("<p>ok</p>"))).unwrap();
        let known = known_urls(&conn, PageKind::WikiDetail).unwrap();
        assert!(known.contains(url));
        assert_eq!(detail_pages(&conn).unwrap()[url], "<p>ok</p>");

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.wiki_pages, 1);
        assert_eq!(s.fetch_errors, 0);
    }

    #[test]
    fn records_are_rebuilt_not_appended() {
        let conn = memory();
        save_records(&conn, &[startup("A"), startup("B")], &[]).unwrap();
        save_records(&conn, &[startup("C")], &[]).unwrap();
        let rows = export_rows(&conn, Table::Startups).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0], text_row(&startup("C")));
    }

    #[test]
    fn export_matches_record_rows() {
        let conn = memory();
        let company = company("Acme Corp");
        save_records(&conn, &[], std::slice::from_ref(&company)).unwrap();
        let rows = export_rows(&conn, Table::Companies).unwrap();
        let expected: Vec<String> = company.to_row().iter().map(Cell::to_string).collect();
        assert_eq!(rows, vec![expected]);
        assert_eq!(rows[0][10], "4500");
        assert_eq!(rows[0][15], "No");
    }

    #[test]
    fn oversized_counts_are_stored_as_null() {
        let conn = memory();
        let mut big = startup("Huge");
        big.employee_estimate = Some(u64::MAX);
        save_records(&conn, &[big], &[]).unwrap();
        let stored: Option<i64> = conn
            .query_row("SELECT employee_estimate FROM startups", [], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, None);
        assert_eq!(export_rows(&conn, Table::Startups).unwrap()[0][5], "");
    }

    #[test]
    fn stats_summarize_stored_records() {
        let conn = memory();
        let empty = get_stats(&conn).unwrap();
        assert_eq!(empty.startup_data, StartupSummary::default());
        assert_eq!(empty.company_data, CompanySummary::default());

        let mut older = startup("B");
        older.founded_year = Some(2015);
        older.industries = vec!["Fintech".into(), "AI".into()];
        let mut bigger = startup("C");
        bigger.company_size = "201-500 employees".into();
        bigger.founded_year = None;

        let companies: Vec<CompanyRecord> = [
            ("Acme", "Software", Some(1), Some(1000)),
            ("Beta", "Software", None, Some(3000)),
            ("Gamma", "Semiconductors", Some(80), None),
        ]
        .into_iter()
        .map(|(name, industry, rank, employees)| CompanyRecord {
            industry: industry.into(),
            fortune_500_rank: rank,
            employees_numeric: employees,
            ..company(name)
        })
        .collect();
        save_records(&conn, &[startup("A"), older, bigger], &companies).unwrap();

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.startup_data.unique_industries, 3);
        assert_eq!(s.startup_data.common_size.as_deref(), Some("11-50 employees"));
        assert_eq!(s.startup_data.founded_range, Some((2015, 2021)));
        assert_eq!(
            s.company_data.top_industries,
            vec![("Software".to_string(), 2), ("Semiconductors".to_string(), 1)]
        );
        assert_eq!(s.company_data.total_employees, Some(4000));
        assert_eq!(s.company_data.avg_employees, Some(2000.0));
        assert_eq!(s.company_data.fortune_500, 2);
    }

    #[test]
    fn stats_count_latest_run_fields() {
        let conn = memory();
        let report = |field, issue| Report {
            entity: "Acme".into(),
            field,
            issue,
        };
        save_issues(&conn, "run-1", &[report("revenue", Issue::Unparseable("n/a".into()))]).unwrap();
        save_issues(
            &conn,
            "run-2",
            &[
                report("website", Issue::Missing),
                report("founded_year", Issue::Implausible("11-50".into())),
                report("founded_year", Issue::Implausible("x".into())),
            ],
        )
        .unwrap();
        let s = get_stats(&conn).unwrap();
        assert_eq!(s.issues, 4);
        assert_eq!(s.latest_run.as_deref(), Some("run-2"));
        assert_eq!(s.latest_fields, vec![("founded_year".to_string(), 2)]);
    }
}
