// Filter/sort engine: a pure function from rows + cells + criteria to the
// displayed row order. Inputs are never mutated.

use std::cmp::{Ordering, Reverse};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

use crate::index::CellIndex;
use crate::model::{CellData, CellValue, Column, Row};

// ── Criteria ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("invalid sort direction `{other}` (expected asc or desc)")),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        })
    }
}

/// Sort by one column. Only a single key is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDirective {
    pub column_id: Uuid,
    pub direction: SortDirection,
}

/// A constraint on one column's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "arg", rename_all = "snake_case")]
pub enum FilterOp {
    /// Case-insensitive substring of the display string.
    Contains(String),
    /// Case-insensitive equality with the display string.
    Equals(String),
    IsEmpty,
    NotEmpty,
    /// Inclusive bounds; `None` leaves that side open.
    NumberRange { min: Option<f64>, max: Option<f64> },
    DateRange { from: Option<NaiveDate>, to: Option<NaiveDate> },
    /// Absent boolean cells count as `false`.
    Boolean(bool),
    /// Exact match against any of the listed options.
    OneOf(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub column_id: Uuid,
    pub op: FilterOp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub search: String,
    #[serde(default)]
    pub filters: Vec<ColumnFilter>,
    #[serde(default)]
    pub sort: Option<SortDirective>,
}

// ── Engine ─────────────────────────────────────────────────────────

/// Compute the displayed rows for `query`.
///
/// `columns` scopes the global search: only searchable columns in this list
/// are matched against the search string. Column filters apply by id
/// regardless. The sort is stable, so ties keep their input order.
pub fn apply_view<'a>(
    rows: &'a [Row],
    index: &CellIndex,
    columns: &[Column],
    query: &ViewQuery,
) -> Vec<&'a Row> {
    let needle = query.search.trim().to_lowercase();
    let searchable: Vec<&Column> = columns.iter().filter(|c| c.data_type.is_searchable()).collect();

    let mut view: Vec<&Row> = rows
        .iter()
        .filter(|row| needle.is_empty() || matches_search(row, index, &searchable, &needle))
        .filter(|row| {
            query
                .filters
                .iter()
                .all(|filter| matches_filter(index.get(row.id, filter.column_id), &filter.op))
        })
        .collect();

    if let Some(sort) = query.sort {
        let key = |row: &&Row| SortKey::new(&sort_text(index.get(row.id, sort.column_id)));
        match sort.direction {
            SortDirection::Asc => view.sort_by_cached_key(key),
            SortDirection::Desc => view.sort_by_cached_key(|row| Reverse(key(row))),
        }
    }

    view
}

fn matches_search(row: &Row, index: &CellIndex, columns: &[&Column], needle: &str) -> bool {
    columns.iter().any(|column| {
        index
            .get(row.id, column.id)
            .is_some_and(|cell| cell.value.display().to_lowercase().contains(needle))
    })
}

fn is_blank(cell: Option<&CellData>) -> bool {
    match cell.map(|c| &c.value) {
        None => true,
        Some(CellValue::Text(s)) | Some(CellValue::Select(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn numeric_value(cell: Option<&CellData>) -> Option<f64> {
    let value = &cell?.value;
    value.as_number().or_else(|| value.display().trim().parse().ok())
}

pub fn matches_filter(cell: Option<&CellData>, op: &FilterOp) -> bool {
    let display = || cell.map(|c| c.value.display()).unwrap_or_default();
    match op {
        FilterOp::Contains(s) => display().to_lowercase().contains(&s.trim().to_lowercase()),
        FilterOp::Equals(s) => display().trim().to_lowercase() == s.trim().to_lowercase(),
        FilterOp::IsEmpty => is_blank(cell),
        FilterOp::NotEmpty => !is_blank(cell),
        FilterOp::NumberRange { min, max } => numeric_value(cell).is_some_and(|n| {
            min.map_or(true, |lo| n >= lo) && max.map_or(true, |hi| n <= hi)
        }),
        FilterOp::DateRange { from, to } => {
            cell.and_then(|c| c.value.as_date()).is_some_and(|d| {
                from.map_or(true, |lo| d >= lo) && to.map_or(true, |hi| d <= hi)
            })
        }
        FilterOp::Boolean(expected) => {
            let actual = matches!(cell.map(|c| &c.value), Some(CellValue::Boolean(true)));
            actual == *expected
        }
        FilterOp::OneOf(options) => {
            let value = display();
            options.iter().any(|option| *option == value)
        }
    }
}

/// Sort representation: text, else number, else date, else empty.
fn sort_text(cell: Option<&CellData>) -> String {
    cell.map(|c| c.value.display()).unwrap_or_default()
}

/// Orders two displayed values the way a sorted view does.
pub fn compare_values(left: &str, right: &str) -> Ordering {
    SortKey::new(left).cmp(&SortKey::new(right))
}

/// Ranked sort key. Blanks sort before numbers, numbers before text, so
/// mixed columns such as `9`, `10`, `10a` still form a total order.
#[derive(Debug, Clone)]
enum SortKey {
    Blank,
    Number(f64),
    Text { folded: String, raw: String },
}

impl SortKey {
    fn new(s: &str) -> Self {
        if s.trim().is_empty() {
            return SortKey::Blank;
        }
        match parse_number(s) {
            // -0.0 + 0.0 == +0.0, so both zeros share one key.
            Some(n) => SortKey::Number(n + 0.0),
            None => SortKey::Text { folded: collation_key(s), raw: s.to_owned() },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Blank => 0,
            SortKey::Number(_) => 1,
            SortKey::Text { .. } => 2,
        }
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (
                SortKey::Text { folded: a, raw: ra },
                SortKey::Text { folded: b, raw: rb },
            ) => a.cmp(b).then_with(|| ra.cmp(rb)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Accent- and case-folded key: NFD, drop combining marks, lowercase.
fn collation_key(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).flat_map(char::to_lowercase).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DataType;

    struct Fixture {
        rows: Vec<Row>,
        columns: Vec<Column>,
        index: CellIndex,
    }

    impl Fixture {
        fn name(&self) -> Uuid {
            self.columns[0].id
        }

        fn qty(&self) -> Uuid {
            self.columns[1].id
        }

        fn names(&self, view: &[&Row]) -> Vec<String> {
            view.iter()
                .map(|row| self.index.get(row.id, self.name()).unwrap().value.display())
                .collect()
        }
    }

    fn fixture(data: &[(&str, f64)]) -> Fixture {
        let doc_id = Uuid::new_v4();
        let columns = vec![
            Column::new(doc_id, "Name", DataType::Text, 0),
            Column::new(doc_id, "Qty", DataType::Number, 1),
        ];
        let mut rows = Vec::new();
        let mut cells = Vec::new();
        for (i, (name, qty)) in data.iter().enumerate() {
            let row = Row::new(doc_id, i as i32, None);
            cells.push(CellData::new(row.id, columns[0].id, CellValue::Text((*name).into())));
            cells.push(CellData::new(row.id, columns[1].id, CellValue::Number(*qty)));
            rows.push(row);
        }
        Fixture { rows, columns, index: CellIndex::build(cells) }
    }

    #[test]
    fn empty_query_keeps_store_order() {
        let fx = fixture(&[("Apple", 3.0), ("Banana", 10.0)]);
        let view = apply_view(&fx.rows, &fx.index, &fx.columns, &ViewQuery::default());
        assert_eq!(fx.names(&view), ["Apple", "Banana"]);
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let fx = fixture(&[("Apple", 3.0), ("Banana", 10.0)]);
        let query = ViewQuery { search: "AN".into(), ..Default::default() };
        let view = apply_view(&fx.rows, &fx.index, &fx.columns, &query);
        assert_eq!(fx.names(&view), ["Banana"]);
    }

    #[test]
    fn search_matches_number_display() {
        let fx = fixture(&[("Apple", 3.0), ("Banana", 10.0)]);
        let query = ViewQuery { search: "10".into(), ..Default::default() };
        let view = apply_view(&fx.rows, &fx.index, &fx.columns, &query);
        assert_eq!(fx.names(&view), ["Banana"]);
    }

    #[test]
    fn search_ignores_columns_outside_scope() {
        let fx = fixture(&[("Apple", 3.0), ("Banana", 10.0)]);
        let only_qty = vec![fx.columns[1].clone()];
        let query = ViewQuery { search: "apple".into(), ..Default::default() };
        assert!(apply_view(&fx.rows, &fx.index, &only_qty, &query).is_empty());
    }

    #[test]
    fn numeric_sort_desc() {
        let fx = fixture(&[("Apple", 3.0), ("Banana", 10.0), ("Cherry", 9.0)]);
        let query = ViewQuery {
            sort: Some(SortDirective { column_id: fx.qty(), direction: SortDirection::Desc }),
            ..Default::default()
        };
        let view = apply_view(&fx.rows, &fx.index, &fx.columns, &query);
        assert_eq!(fx.names(&view), ["Banana", "Cherry", "Apple"]);
    }

    #[test]
    fn text_sort_folds_case_and_accents() {
        let fx = fixture(&[("éclair", 1.0), ("Zebra", 2.0), ("apple", 3.0), ("Eagle", 4.0)]);
        let query = ViewQuery {
            sort: Some(SortDirective { column_id: fx.name(), direction: SortDirection::Asc }),
            ..Default::default()
        };
        let view = apply_view(&fx.rows, &fx.index, &fx.columns, &query);
        assert_eq!(fx.names(&view), ["apple", "Eagle", "éclair", "Zebra"]);
    }

    #[test]
    fn sort_places_missing_cells_first_ascending() {
        let mut fx = fixture(&[("Apple", 3.0), ("Banana", 10.0)]);
        let extra = Row::new(fx.rows[0].document_id, 2, None);
        fx.index.insert(CellData::new(extra.id, fx.name(), CellValue::Text("Zed".into())));
        fx.rows.push(extra);

        let query = ViewQuery {
            sort: Some(SortDirective { column_id: fx.qty(), direction: SortDirection::Asc }),
            ..Default::default()
        };
        let view = apply_view(&fx.rows, &fx.index, &fx.columns, &query);
        assert_eq!(fx.names(&view), ["Zed", "Apple", "Banana"]);
    }

    #[test]
    fn filters_are_conjunctive() {
        let fx = fixture(&[("Apple", 3.0), ("Banana", 10.0), ("Avocado", 12.0)]);
        let query = ViewQuery {
            filters: vec![
                ColumnFilter { column_id: fx.name(), op: FilterOp::Contains("a".into()) },
                ColumnFilter {
                    column_id: fx.qty(),
                    op: FilterOp::NumberRange { min: Some(5.0), max: None },
                },
            ],
            ..Default::default()
        };
        let view = apply_view(&fx.rows, &fx.index, &fx.columns, &query);
        assert_eq!(fx.names(&view), ["Banana", "Avocado"]);
    }

    #[test]
    fn filter_ops_on_single_cells() {
        let (r, c) = (Uuid::new_v4(), Uuid::new_v4());
        let blank = CellData::new(r, c, CellValue::Text("  ".into()));
        let checked = CellData::new(r, c, CellValue::Boolean(true));
        let status = CellData::new(r, c, CellValue::Select("open".into()));
        let day = CellData::new(
            r,
            c,
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()),
        );

        assert!(matches_filter(None, &FilterOp::IsEmpty));
        assert!(matches_filter(Some(&blank), &FilterOp::IsEmpty));
        assert!(matches_filter(Some(&checked), &FilterOp::NotEmpty));
        assert!(matches_filter(Some(&checked), &FilterOp::Boolean(true)));
        assert!(matches_filter(None, &FilterOp::Boolean(false)));
        assert!(matches_filter(Some(&status), &FilterOp::OneOf(vec!["open".into()])));
        assert!(matches_filter(Some(&status), &FilterOp::Equals(" OPEN ".into())));
        assert!(!matches_filter(Some(&status), &FilterOp::OneOf(vec!["closed".into()])));
        assert!(matches_filter(
            Some(&day),
            &FilterOp::DateRange { from: NaiveDate::from_ymd_opt(2024, 1, 1), to: None }
        ));
        assert!(!matches_filter(
            Some(&day),
            &FilterOp::DateRange { from: None, to: NaiveDate::from_ymd_opt(2024, 4, 30) }
        ));
    }

    #[test]
    fn compare_values_mixes_numbers_and_text() {
        assert_eq!(compare_values("9", "10"), Ordering::Less);
        assert_eq!(compare_values("b", "10"), Ordering::Greater);
        assert_eq!(compare_values("", "a"), Ordering::Less);
        assert_eq!(compare_values("a", "A"), Ordering::Greater);
        assert_eq!(compare_values("-0", "0"), Ordering::Equal);
    }

    #[test]
    fn mixed_number_and_text_values_are_transitive() {
        assert_eq!(compare_values("9", "10"), Ordering::Less);
        assert_eq!(compare_values("10", "10a"), Ordering::Less);
        assert_eq!(compare_values("9", "10a"), Ordering::Less);
        assert_eq!(compare_values("10a", "9"), Ordering::Greater);
    }

    #[test]
    fn sorting_many_mixed_references_orders_every_class() {
        let data: Vec<(String, f64)> = (0..2000)
            .map(|i| {
                let name = match i % 4 {
                    0 => format!("{}", i % 97),
                    1 => format!("{}a", i % 89),
                    2 => format!("x{}", i % 83),
                    _ => String::new(),
                };
                (name, i as f64)
            })
            .collect();
        let borrowed: Vec<(&str, f64)> = data.iter().map(|(n, q)| (n.as_str(), *q)).collect();
        let fx = fixture(&borrowed);
        let query = ViewQuery {
            sort: Some(SortDirective { column_id: fx.name(), direction: SortDirection::Asc }),
            ..Default::default()
        };

        let names = fx.names(&apply_view(&fx.rows, &fx.index, &fx.columns, &query));
        assert_eq!(names.len(), 2000);
        assert!(names.windows(2).all(|w| compare_values(&w[0], &w[1]) != Ordering::Greater));
        assert_eq!(names[0], "");
        assert_eq!(names[500], "0");
        assert!(names[1999].starts_with('x'));
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Desc);
        assert!("up".parse::<SortDirection>().is_err());
    }
}
