use crate::error::{DatabusError, Result};

/// A single GTFS text file held in memory.
///
/// Cells are kept as the raw text read from the feed. Blank cells are stored
/// as `None` so that "absent" and "present but empty" never get confused with
/// real values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

/// Borrowed view over one row of a [`Table`].
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    table: &'a Table,
    cells: &'a [Option<String>],
}

impl<'a> Row<'a> {
    /// Value of the named column, `None` when the column is missing or blank.
    pub fn get(&self, column: &str) -> Option<&'a str> {
        self.table
            .column_index(column)
            .and_then(|idx| self.at(idx))
    }

    pub fn at(&self, idx: usize) -> Option<&'a str> {
        self.cells.get(idx).and_then(|c| c.as_deref())
    }
}

impl Table {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Builder form of [`Table::push_row`].
    pub fn with_row<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.push_row(values);
        self
    }

    /// Appends a row. Short rows are padded with blanks, extra cells dropped.
    pub fn push_row<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cells: Vec<Option<String>> = values
            .into_iter()
            .take(self.columns.len())
            .map(|v| {
                let v = v.as_ref();
                if v.trim().is_empty() {
                    None
                } else {
                    Some(v.to_string())
                }
            })
            .collect();
        cells.resize(self.columns.len(), None);
        self.rows.push(cells);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Like [`Table::column_index`] but treats a missing column as a data error.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| DatabusError::DataFormat(format!("column '{name}' not found")))
    }

    pub fn value(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .and_then(|c| c.as_deref())
    }

    /// All values of one column in row order.
    pub fn column_values(&self, column: usize) -> impl Iterator<Item = Option<&str>> + '_ {
        self.rows
            .iter()
            .map(move |cells| cells.get(column).and_then(|c| c.as_deref()))
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        self.rows.iter().map(move |cells| Row {
            table: self,
            cells: cells.as_slice(),
        })
    }

    /// Copy of the table keeping only rows matching `keep`.
    pub fn filter_rows(&self, mut keep: impl FnMut(&Row<'_>) -> bool) -> Table {
        let rows = self
            .rows
            .iter()
            .filter(|cells| {
                keep(&Row {
                    table: self,
                    cells: cells.as_slice(),
                })
            })
            .cloned()
            .collect();

        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Copy keeping rows whose `column` value is in `keys`. A missing column
    /// yields an empty copy.
    pub fn retain_keys(&self, column: &str, keys: &std::collections::HashSet<&str>) -> Table {
        match self.column_index(column) {
            Some(idx) => self.filter_rows(|row| row.at(idx).is_some_and(|v| keys.contains(v))),
            None => self.filter_rows(|_| false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stops() -> Table {
        Table::new(["stop_id", "stop_name", "stop_lat"])
            .with_row(["S1", "Central", "9.93"])
            .with_row(["S2", "  ", "9.94"])
            .with_row(["S3"])
    }

    #[test]
    fn test_blank_cells_are_absent() {
        let table = stops();
        assert_eq!(table.value(1, 1), None);
        assert_eq!(table.value(2, 2), None);
        assert_eq!(table.value(0, 1), Some("Central"));
    }

    #[test]
    fn test_extra_cells_are_dropped() {
        let table = Table::new(["a"]).with_row(["1", "2", "3"]);
        assert_eq!(table.columns().len(), 1);
        assert_eq!(table.value(0, 0), Some("1"));
        assert_eq!(table.value(0, 1), None);
    }

    #[test]
    fn test_require_column_reports_name() {
        let err = stops().require_column("stop_lon").unwrap_err();
        assert!(err.to_string().contains("stop_lon"));
    }

    #[test]
    fn test_row_lookup_by_name() {
        let table = stops();
        let names: Vec<_> = table.rows().map(|r| r.get("stop_name")).collect();
        assert_eq!(names, vec![Some("Central"), None, None]);
        assert_eq!(table.rows().next().unwrap().get("missing"), None);
    }

    #[test]
    fn test_filter_rows_keeps_columns() {
        let table = stops();
        let filtered = table.filter_rows(|r| r.get("stop_id") == Some("S2"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.columns(), table.columns());
    }

    #[test]
    fn test_retain_keys_on_missing_column_is_empty() {
        let table = stops();
        let keys = ["S1"].into_iter().collect();
        assert_eq!(table.retain_keys("stop_id", &keys).len(), 1);
        assert!(table.retain_keys("parent_station", &keys).is_empty());
    }
}
