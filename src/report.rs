use thiserror::Error;
use tracing::{debug, trace, warn};

/// Why a field (or a whole entity) came out empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Issue {
    #[error("not present")]
    Missing,
    #[error("unparseable value {0:?}")]
    Unparseable(String),
    #[error("position {index} out of range ({len} present)")]
    OutOfRange { index: usize, len: usize },
    #[error("implausible value {0:?}")]
    Implausible(String),
    #[error("no dash separator in {0:?}")]
    NoSeparator(String),
    #[error("identity field is empty")]
    NoName,
}

impl Issue {
    /// Entity-level issues mean the record was dropped.
    pub fn drops_entity(&self) -> bool {
        matches!(self, Issue::NoSeparator(_) | Issue::NoName)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Issue::Missing => "missing",
            Issue::Unparseable(_) => "unparseable",
            Issue::OutOfRange { .. } => "out_of_range",
            Issue::Implausible(_) => "implausible",
            Issue::NoSeparator(_) => "no_separator",
            Issue::NoName => "no_name",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub entity: String,
    pub field: &'static str,
    pub issue: Issue,
}

/// Sink for extraction issues. The parser only ever talks to this trait.
pub trait Reporter {
    fn report(&mut self, entity: &str, field: &'static str, issue: Issue);
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn report(&mut self, entity: &str, field: &'static str, issue: Issue) {
        (**self).report(entity, field, issue);
    }
}

impl<A: Reporter, B: Reporter> Reporter for (A, B) {
    fn report(&mut self, entity: &str, field: &'static str, issue: Issue) {
        self.0.report(entity, field, issue.clone());
        self.1.report(entity, field, issue);
    }
}

/// Forwards reports to `tracing`.
#[derive(Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&mut self, entity: &str, field: &'static str, issue: Issue) {
        match &issue {
            Issue::Missing => trace!(entity, field, "field missing"),
            i if i.drops_entity() => warn!(entity, field, reason = %i, "entity skipped"),
            i => debug!(entity, field, reason = %i, "field discarded"),
        }
    }
}

/// Keeps every report in memory, in arrival order.
#[derive(Debug, Default)]
pub struct IssueLog {
    reports: Vec<Report>,
}

impl IssueLog {
    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    pub fn dropped(&self) -> usize {
        self.reports.iter().filter(|r| r.issue.drops_entity()).count()
    }

    /// (field, count) pairs for non-missing issues, most frequent first.
    pub fn field_counts(&self) -> Vec<(&'static str, usize)> {
        let mut counts: Vec<(&'static str, usize)> = Vec::new();
        for r in self.reports.iter().filter(|r| r.issue != Issue::Missing) {
            match counts.iter_mut().find(|(f, _)| *f == r.field) {
                Some((_, n)) => *n += 1,
                None => counts.push((r.field, 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        counts
    }
}

impl Reporter for IssueLog {
    fn report(&mut self, entity: &str, field: &'static str, issue: Issue) {
        self.reports.push(Report {
            entity: entity.to_string(),
            field,
            issue,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_fans_out_to_both() {
        let mut a = IssueLog::default();
        let mut b = IssueLog::default();
        {
            let mut both = (&mut a, &mut b);
            both.report("Acme", "website", Issue::Missing);
        }
        assert_eq!(a.reports().len(), 1);
        assert_eq!(b.reports()[0].field, "website");
    }

    #[test]
    fn field_counts_skip_missing() {
        let mut log = IssueLog::default();
        log.report("a", "founded_year", Issue::Implausible("20x5".into()));
        log.report("b", "founded_year", Issue::Implausible("n/a".into()));
        log.report("c", "website", Issue::Missing);
        log.report("d", "entry", Issue::NoSeparator("Acme".into()));
        assert_eq!(log.field_counts(), vec![("founded_year", 2), ("entry", 1)]);
        assert_eq!(log.dropped(), 1);
    }
}
