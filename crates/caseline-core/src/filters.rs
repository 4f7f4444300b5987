//! Filter algebra for timeline queries.
//!
//! A filter is a small expression tree of leaf predicates combined with
//! AND/OR nodes. Compilation produces the SQL fragment executed by the event
//! store together with flags for the join tables the fragment references.
//! The compiled text is canonical: two filters are equivalent exactly when
//! their compiled fragments are equal.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::event::KnownStatus;
use crate::models::event_type::{BaseType, EventType};
use crate::models::zoom::DescriptionLevel;

/// Whether a description filter keeps or drops matching events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    Include,
    Exclude,
}

/// Selection over the event-type hierarchy. An exhaustive selection collapses
/// to the unconditional-true predicate so fully-zoomed-out queries skip the
/// IN-list entirely; an empty selection is treated as inactive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeFilter {
    selected: BTreeSet<EventType>,
}

impl TypeFilter {
    /// Every type selected.
    pub fn all() -> TypeFilter {
        TypeFilter {
            selected: EventType::ALL.iter().copied().collect(),
        }
    }

    /// No type selected (inactive).
    pub fn none() -> TypeFilter {
        TypeFilter {
            selected: BTreeSet::new(),
        }
    }

    pub fn of(types: impl IntoIterator<Item = EventType>) -> TypeFilter {
        TypeFilter {
            selected: types.into_iter().collect(),
        }
    }

    /// Every sub type under one base type.
    pub fn base(base: BaseType) -> TypeFilter {
        TypeFilter {
            selected: EventType::ALL
                .iter()
                .copied()
                .filter(|t| t.base() == base)
                .collect(),
        }
    }

    pub fn selected(&self) -> &BTreeSet<EventType> {
        &self.selected
    }

    fn is_exhaustive(&self) -> bool {
        self.selected.len() == EventType::ALL.len()
    }
}

/// One node of the filter tree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Filter {
    Intersection(Vec<Filter>),
    Union(Vec<Filter>),
    /// Hide events whose file is classified known-good.
    HideKnown,
    /// Substring match over all three description columns. Blank text is
    /// inactive.
    Text(String),
    /// Match (or reject) one exact description at the given detail level.
    Description {
        level: DescriptionLevel,
        text: String,
        mode: FilterMode,
    },
    /// Events carrying a tag with one of the given tag-name ids.
    Tags(BTreeSet<i64>),
    /// Events with a hit in one of the given hash sets.
    HashSets(BTreeSet<i64>),
    DataSource(i64),
    DataSources(BTreeSet<i64>),
    Types(TypeFilter),
}

/// Result of compiling a filter: the WHERE fragment plus which join tables
/// the fragment references.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
    pub where_clause: String,
    pub needs_hash_join: bool,
    pub needs_tag_join: bool,
}

/// The unconditional-true fragment every inactive node compiles to.
const TRUE_CLAUSE: &str = "1";

impl Filter {
    /// An intersection with no children: passes everything until sub-filters
    /// are added.
    pub fn everything() -> Filter {
        Filter::Intersection(Vec::new())
    }

    pub fn compile(&self) -> Predicate {
        Predicate {
            where_clause: self.where_sql(),
            needs_hash_join: self.uses_hash_sets(),
            needs_tag_join: self.uses_tags(),
        }
    }

    /// Canonical textual form of the compiled predicate, used for
    /// equivalence testing.
    pub fn canonical(&self) -> String {
        self.where_sql()
    }

    fn where_sql(&self) -> String {
        match self {
            Filter::Intersection(children) => combine(children, " AND "),
            Filter::Union(children) => combine(children, " OR "),
            Filter::HideKnown => {
                format!("(known_state != {})", KnownStatus::Known.code())
            }
            Filter::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return TRUE_CLAUSE.to_string();
                }
                let pattern = sql_quote(&format!("%{text}%"));
                format!(
                    "((med_description LIKE {pattern}) OR (full_description LIKE {pattern}) OR (short_description LIKE {pattern}))"
                )
            }
            Filter::Description { level, text, mode } => {
                let operator = match mode {
                    FilterMode::Include => "LIKE",
                    FilterMode::Exclude => "NOT LIKE",
                };
                format!("({} {} {})", level.column(), operator, sql_quote(text))
            }
            Filter::Tags(tag_name_ids) => {
                if tag_name_ids.is_empty() {
                    TRUE_CLAUSE.to_string()
                } else {
                    format!("(tags.tag_name_id IN ({}))", join_ids(tag_name_ids))
                }
            }
            Filter::HashSets(hash_set_ids) => {
                if hash_set_ids.is_empty() {
                    TRUE_CLAUSE.to_string()
                } else {
                    format!(
                        "(hash_set_hits.hash_set_id IN ({}))",
                        join_ids(hash_set_ids)
                    )
                }
            }
            Filter::DataSource(id) => format!("(datasource_id = {id})"),
            Filter::DataSources(ids) => {
                if ids.is_empty() {
                    TRUE_CLAUSE.to_string()
                } else {
                    format!("(datasource_id IN ({}))", join_ids(ids))
                }
            }
            Filter::Types(type_filter) => {
                if type_filter.is_exhaustive() || type_filter.selected.is_empty() {
                    TRUE_CLAUSE.to_string()
                } else {
                    let codes: Vec<String> = type_filter
                        .selected
                        .iter()
                        .map(|t| t.code().to_string())
                        .collect();
                    format!("(sub_type IN ({}))", codes.join(", "))
                }
            }
        }
    }

    fn uses_hash_sets(&self) -> bool {
        match self {
            Filter::HashSets(ids) => !ids.is_empty(),
            Filter::Intersection(children) | Filter::Union(children) => {
                children.iter().any(Filter::uses_hash_sets)
            }
            _ => false,
        }
    }

    fn uses_tags(&self) -> bool {
        match self {
            Filter::Tags(ids) => !ids.is_empty(),
            Filter::Intersection(children) | Filter::Union(children) => {
                children.iter().any(Filter::uses_tags)
            }
            _ => false,
        }
    }
}

/// Two filters are equivalent when their compiled canonical forms match,
/// regardless of tree shape.
pub fn filters_equivalent(first: &Filter, second: &Filter) -> bool {
    first.canonical() == second.canonical()
}

fn combine(children: &[Filter], separator: &str) -> String {
    if children.is_empty() {
        return TRUE_CLAUSE.to_string();
    }
    let parts: Vec<String> = children.iter().map(Filter::where_sql).collect();
    format!("({})", parts.join(separator))
}

fn join_ids(ids: &BTreeSet<i64>) -> String {
    let parts: Vec<String> = ids.iter().map(i64::to_string).collect();
    parts.join(", ")
}

/// Render a string literal for embedding in a fragment, doubling any
/// embedded single quotes.
fn sql_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_combinators_are_neutral() {
        assert_eq!(Filter::Intersection(Vec::new()).canonical(), "1");
        assert_eq!(Filter::Union(Vec::new()).canonical(), "1");
        assert_eq!(Filter::everything().canonical(), "1");
    }

    #[test]
    fn test_inactive_leaves_are_neutral() {
        assert_eq!(Filter::Text("   ".to_string()).canonical(), "1");
        assert_eq!(Filter::Tags(BTreeSet::new()).canonical(), "1");
        assert_eq!(Filter::HashSets(BTreeSet::new()).canonical(), "1");
        assert_eq!(Filter::DataSources(BTreeSet::new()).canonical(), "1");
    }

    #[test]
    fn test_exhaustive_type_filter_collapses_to_true() {
        assert_eq!(Filter::Types(TypeFilter::all()).canonical(), "1");
        assert_eq!(Filter::Types(TypeFilter::none()).canonical(), "1");

        let partial = Filter::Types(TypeFilter::of([EventType::FileAccessed]));
        assert_eq!(
            partial.canonical(),
            format!("(sub_type IN ({}))", EventType::FileAccessed.code())
        );
    }

    #[test]
    fn test_base_type_filter_lists_its_subtypes() {
        let filter = Filter::Types(TypeFilter::base(BaseType::FileSystem));
        assert_eq!(filter.canonical(), "(sub_type IN (0, 1, 2, 3))");
    }

    #[test]
    fn test_hide_known_keeps_unknown_and_notable() {
        assert_eq!(Filter::HideKnown.canonical(), "(known_state != 1)");
    }

    #[test]
    fn test_text_filter_spans_all_description_columns() {
        let filter = Filter::Text("invoice".to_string());
        let clause = filter.canonical();
        assert!(clause.contains("med_description LIKE '%invoice%'"));
        assert!(clause.contains("full_description LIKE '%invoice%'"));
        assert!(clause.contains("short_description LIKE '%invoice%'"));
    }

    #[test]
    fn test_quotes_are_escaped() {
        let filter = Filter::Description {
            level: DescriptionLevel::Full,
            text: "/img/O'Brien/".to_string(),
            mode: FilterMode::Include,
        };
        assert_eq!(
            filter.canonical(),
            "(full_description LIKE '/img/O''Brien/')"
        );
    }

    #[test]
    fn test_join_flags_follow_leaf_usage() {
        let filter = Filter::Intersection(vec![
            Filter::HideKnown,
            Filter::Union(vec![Filter::Tags([7].into_iter().collect())]),
        ]);
        let predicate = filter.compile();
        assert!(predicate.needs_tag_join);
        assert!(!predicate.needs_hash_join);

        let predicate = Filter::HashSets([3].into_iter().collect()).compile();
        assert!(predicate.needs_hash_join);
        assert!(!predicate.needs_tag_join);
    }

    #[test]
    fn test_equivalence_is_textual_not_structural() {
        let flat = Filter::HideKnown;
        let nested = Filter::Intersection(vec![Filter::HideKnown]);
        // same semantics, different canonical text: not equivalent
        assert!(!filters_equivalent(&flat, &nested));

        let first = Filter::Intersection(vec![Filter::HideKnown, Filter::Text(String::new())]);
        let second = Filter::Intersection(vec![Filter::HideKnown, Filter::Tags(BTreeSet::new())]);
        // both compile to (known_state != 1 AND 1)
        assert!(filters_equivalent(&first, &second));
        assert_ne!(first, second);
    }

    #[test]
    fn test_data_source_filters() {
        assert_eq!(Filter::DataSource(4).canonical(), "(datasource_id = 4)");
        let ids: BTreeSet<i64> = [9, 4].into_iter().collect();
        assert_eq!(
            Filter::DataSources(ids).canonical(),
            "(datasource_id IN (4, 9))"
        );
    }
}
