//! Include/exclude table selection.
//!
//! A selection is an ordered list of glob patterns over qualified table ids.
//! Patterns prefixed with `!` exclude, all others include. For each table the
//! most specific matching pattern decides; on equal specificity the later
//! pattern wins. Tables no pattern matches stay included.

use regex::Regex;
use thiserror::Error;

use crate::error::{Error, Result};
use crate::schema::SchemaGraph;

/// Whether a rule keeps or drops the tables it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Include,
    Exclude,
}

/// One compiled include/exclude pattern.
#[derive(Debug, Clone)]
pub struct SelectRule {
    raw: String,
    pattern: String,
    polarity: Polarity,
    specificity: usize,
    matcher: Regex,
}

impl SelectRule {
    pub fn parse(raw: &str) -> Result<Self> {
        let (polarity, pattern) = match raw.strip_prefix('!') {
            Some(rest) => (Polarity::Exclude, rest),
            None => (Polarity::Include, raw),
        };

        let source = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let matcher = Regex::new(&format!("^{source}$")).map_err(|err| Error::InvalidPattern {
            pattern: raw.to_string(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            raw: raw.to_string(),
            pattern: pattern.to_string(),
            polarity,
            specificity: pattern.chars().filter(|ch| *ch != '*').count(),
            matcher,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    /// Count of literal (non-wildcard) characters.
    pub fn specificity(&self) -> usize {
        self.specificity
    }

    pub fn matches(&self, table_id: &str) -> bool {
        self.matcher.is_match(table_id)
    }
}

/// Ordered list of select rules.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    rules: Vec<SelectRule>,
}

impl Selection {
    pub fn parse<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let rules = patterns
            .iter()
            .map(|pattern| SelectRule::parse(pattern.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[SelectRule] {
        &self.rules
    }

    /// The rule deciding `table_id`, if any matches.
    pub fn deciding_rule(&self, table_id: &str) -> Option<&SelectRule> {
        let mut best: Option<&SelectRule> = None;
        for rule in self.rules.iter().filter(|rule| rule.matches(table_id)) {
            match best {
                Some(current) if current.specificity > rule.specificity => {}
                _ => best = Some(rule),
            }
        }
        best
    }

    pub fn includes(&self, table_id: &str) -> bool {
        self.deciding_rule(table_id)
            .map(|rule| rule.polarity == Polarity::Include)
            .unwrap_or(true)
    }

    /// Included ids, preserving input order.
    pub fn apply<S: AsRef<str>>(&self, table_ids: &[S]) -> Vec<String> {
        table_ids
            .iter()
            .map(|id| id.as_ref())
            .filter(|id| self.includes(id))
            .map(str::to_string)
            .collect()
    }
}

/// Resolve raw patterns against table ids.
pub fn compute_included_tables<S: AsRef<str>, P: AsRef<str>>(
    table_ids: &[S],
    patterns: &[P],
) -> Result<Vec<String>> {
    Ok(Selection::parse(patterns)?.apply(table_ids))
}

/// A selected table requires a parent the selection excludes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "table '{table}' is selected but relationship '{relationship}' requires excluded parent '{parent}'"
)]
pub struct SelectionError {
    pub table: String,
    pub relationship: String,
    pub parent: String,
}

/// Derive the graph restricted to the selected tables.
///
/// Relationships whose child is dropped disappear. Relationships whose parent
/// is dropped disappear too when nullable, leaving their fields always null;
/// otherwise the selection is unsatisfiable.
pub fn filter_schema(schema: &SchemaGraph, selection: &Selection) -> Result<SchemaGraph> {
    if selection.is_empty() {
        return Ok(schema.clone());
    }

    let included = selection.apply(&schema.table_ids());
    let mut filtered = SchemaGraph {
        tables: schema
            .tables
            .iter()
            .filter(|table| included.contains(&table.id()))
            .cloned()
            .collect(),
        relationships: Vec::new(),
        enums: schema.enums.clone(),
    };

    for relationship in &schema.relationships {
        if !included.contains(&relationship.child) {
            continue;
        }

        if included.contains(&relationship.parent) {
            filtered.relationships.push(relationship.clone());
            continue;
        }

        if !relationship.is_nullable {
            return Err(SelectionError {
                table: relationship.child.clone(),
                relationship: relationship.name.clone(),
                parent: relationship.parent.clone(),
            }
            .into());
        }

        if let Some(child) = filtered
            .tables
            .iter_mut()
            .find(|table| table.id() == relationship.child)
        {
            for name in &relationship.from_fields {
                if let Some(field) = child.field_mut(name) {
                    field.always_null = true;
                }
            }
        }
    }

    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDS: [&str; 5] = [
        "public.table1",
        "public.table2",
        "public.table3",
        "public._table4",
        "public._table5",
    ];

    #[test]
    fn specificity_counts_literal_characters() {
        assert_eq!(SelectRule::parse("*").expect("rule").specificity(), 0);
        assert_eq!(SelectRule::parse("!public*").expect("rule").specificity(), 6);
        assert_eq!(
            SelectRule::parse("public.table1").expect("rule").specificity(),
            13
        );
    }

    #[test]
    fn glob_is_full_string_and_case_sensitive() {
        let rule = SelectRule::parse("public.user*").expect("rule");
        assert!(rule.matches("public.users"));
        assert!(rule.matches("public.user"));
        assert!(!rule.matches("Public.users"));
        assert!(!rule.matches("xpublic.users"));

        let literal = SelectRule::parse("public.a.b").expect("rule");
        assert!(!literal.matches("public.aXb"));
    }

    #[test]
    fn most_specific_rule_decides() {
        let result =
            compute_included_tables(&IDS, &["!public*", "public.table1", "!public._*"])
                .expect("select");
        assert_eq!(result, vec!["public.table1"]);
    }

    #[test]
    fn unmatched_tables_stay_included() {
        let result = compute_included_tables(&IDS, &["public.table1", "!public._*"])
            .expect("select");
        assert_eq!(
            result,
            vec!["public.table1", "public.table2", "public.table3"]
        );

        let result = compute_included_tables(&IDS, &["!public.table1", "!public._*"])
            .expect("select");
        assert_eq!(result, vec!["public.table2", "public.table3"]);
    }

    #[test]
    fn narrower_include_overrides_broader_exclude() {
        let ids = [
            "public.table1",
            "public.table2",
            "public.table3",
            "public._table4",
            "public._prisma_migrations",
        ];
        let result = compute_included_tables(
            &ids,
            &["!public.table1", "!public._*", "public._prisma*"],
        )
        .expect("select");
        assert_eq!(
            result,
            vec!["public.table2", "public.table3", "public._prisma_migrations"]
        );
    }

    #[test]
    fn empty_selection_keeps_everything() {
        let patterns: [&str; 0] = [];
        let result = compute_included_tables(&IDS, &patterns).expect("select");
        assert_eq!(result, IDS.to_vec());
    }

    #[test]
    fn later_rule_wins_on_equal_specificity() {
        let ids = ["public.ab"];
        let include_last = compute_included_tables(&ids, &["!public.a*", "public.*b"])
            .expect("select");
        assert_eq!(include_last, vec!["public.ab"]);

        let exclude_last = compute_included_tables(&ids, &["public.*b", "!public.a*"])
            .expect("select");
        assert!(exclude_last.is_empty());
    }
}
