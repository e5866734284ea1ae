pub mod card;
pub mod infobox;
pub mod list;

use crate::report::{Issue, Reporter};

/// Per-entity field collector: every field extractor's `Result` passes
/// through here, so a failed field is reported and becomes its default
/// without touching its neighbours.
pub struct Fields<'r> {
    entity: String,
    reporter: &'r mut dyn Reporter,
}

impl<'r> Fields<'r> {
    pub fn new(entity: impl Into<String>, reporter: &'r mut dyn Reporter) -> Self {
        Fields {
            entity: entity.into(),
            reporter,
        }
    }

    /// Re-key later reports, e.g. once the name is known.
    pub fn rename(&mut self, entity: impl Into<String>) {
        self.entity = entity.into();
    }

    pub fn field<T>(&mut self, field: &'static str, value: Result<T, Issue>) -> Option<T> {
        match value {
            Ok(v) => Some(v),
            Err(issue) => {
                self.reporter.report(&self.entity, field, issue);
                None
            }
        }
    }

    pub fn list(&mut self, field: &'static str, value: Result<Vec<String>, Issue>) -> Vec<String> {
        self.field(field, value).unwrap_or_default()
    }

    pub fn issue(&mut self, field: &'static str, issue: Issue) {
        self.reporter.report(&self.entity, field, issue);
    }
}

/// Positional lookup with the range check made explicit.
pub fn nth<T: Clone>(items: &[T], index: usize) -> Result<T, Issue> {
    items.get(index).cloned().ok_or(Issue::OutOfRange {
        index,
        len: items.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::IssueLog;

    #[test]
    fn failed_field_is_reported_and_defaulted() {
        let mut log = IssueLog::default();
        let mut fields = Fields::new("card#3", &mut log);
        let name = fields.field("name", Ok::<_, Issue>("Acme".to_string()));
        fields.rename("Acme");
        let site: Option<String> = fields.field("website", Err(Issue::Missing));
        let tags = fields.list("industries", Err(Issue::Missing));
        assert_eq!(name.as_deref(), Some("Acme"));
        assert!(site.is_none());
        assert!(tags.is_empty());
        assert_eq!(log.reports().len(), 2);
        assert_eq!(log.reports()[0].entity, "Acme");
    }

    #[test]
    fn nth_out_of_range() {
        let tags = vec!["11-50 employees".to_string()];
        assert_eq!(nth(&tags, 0).as_deref(), Ok("11-50 employees"));
        assert_eq!(nth(&tags, 1), Err(Issue::OutOfRange { index: 1, len: 1 }));
    }
}
