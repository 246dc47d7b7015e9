//! Row values and statement results.

use std::sync::Arc;

use bytes::Bytes;

/// A column or parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL value.
    Null,
    /// Boolean value (BOOL / TINYINT(1)).
    Bool(bool),
    /// Signed integer (TINYINT .. BIGINT).
    Int(i64),
    /// Unsigned integer (BIGINT UNSIGNED, CONNECTION_ID()).
    UInt(u64),
    /// Floating point (FLOAT, DOUBLE).
    Double(f64),
    /// String value (CHAR, VARCHAR, TEXT, DECIMAL, and dates with `date_strings`).
    String(String),
    /// Binary value (BINARY, VARBINARY, BLOB).
    Bytes(Bytes),
    /// Date value (DATE).
    #[cfg(feature = "chrono")]
    Date(chrono::NaiveDate),
    /// DateTime value (DATETIME, TIMESTAMP).
    #[cfg(feature = "chrono")]
    DateTime(chrono::NaiveDateTime),
}

impl Value {
    /// Check if the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the value as an i64, if it fits.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::UInt(v) => i64::try_from(*v).ok(),
            Self::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as a u64, if it is a non-negative integer.
    ///
    /// Numeric strings are accepted as well, since some clients return
    /// `BIGINT UNSIGNED` columns as text.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(v) => Some(*v),
            Self::Int(v) => u64::try_from(*v).ok(),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render date/time values as MySQL literal strings.
    ///
    /// Used by clients honouring [`crate::ConnectOptions::date_strings`].
    #[must_use]
    pub fn into_date_string(self) -> Self {
        match self {
            #[cfg(feature = "chrono")]
            Self::Date(d) => Self::String(d.format("%Y-%m-%d").to_string()),
            #[cfg(feature = "chrono")]
            Self::DateTime(dt) => Self::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            other => other,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A result row.
///
/// Column names are shared between all rows of one result.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    /// Create a row from shared column names and its values.
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Get a value by column name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value by position.
    #[must_use]
    pub fn get_index(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    /// Column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of values in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume the row, returning its values.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

/// Result of one executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Rows returned by the statement.
    pub rows: Vec<Row>,
    /// Rows affected, for DML.
    pub affected_rows: u64,
}

impl QueryResult {
    /// A result with no rows and nothing affected.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A result with nothing but an affected-rows count.
    #[must_use]
    pub fn affected(count: u64) -> Self {
        Self {
            rows: Vec::new(),
            affected_rows: count,
        }
    }

    /// Build a result from column names and row values.
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Arc<[String]> = columns.into_iter().map(Into::into).collect();
        Self {
            rows: rows
                .into_iter()
                .map(|values| Row::new(Arc::clone(&columns), values))
                .collect(),
            affected_rows: 0,
        }
    }

    /// A one-row, one-column result.
    pub fn scalar(column: impl Into<String>, value: Value) -> Self {
        Self::from_rows([column.into()], vec![vec![value]])
    }

    /// First row, if any.
    #[must_use]
    pub fn first_row(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Check if the result has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup_by_name_and_index() {
        let result = QueryResult::from_rows(
            ["id", "name"],
            vec![vec![Value::Int(1), Value::from("alice")]],
        );
        let row = result.first_row().unwrap();
        assert_eq!(row.get("name"), Some(&Value::String("alice".into())));
        assert_eq!(row.get_index(0), Some(&Value::Int(1)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.columns(), ["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_rows_share_columns() {
        let result = QueryResult::from_rows(["n"], vec![vec![Value::Int(1)], vec![Value::Int(2)]]);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[1].get("n"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_as_u64_accepts_text_and_signed() {
        assert_eq!(Value::UInt(17).as_u64(), Some(17));
        assert_eq!(Value::Int(17).as_u64(), Some(17));
        assert_eq!(Value::Int(-1).as_u64(), None);
        assert_eq!(Value::from("42").as_u64(), Some(42));
        assert_eq!(Value::Null.as_u64(), None);
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(3i64)), Value::Int(3));
    }

    #[cfg(feature = "chrono")]
    #[test]
    fn test_date_strings_rendering() {
        let dt = chrono::NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(13, 5, 9)
            .unwrap();
        assert_eq!(
            Value::DateTime(dt).into_date_string(),
            Value::String("2024-02-29 13:05:09".into())
        );
        assert_eq!(
            Value::Date(dt.date()).into_date_string(),
            Value::String("2024-02-29".into())
        );
        assert_eq!(Value::Int(5).into_date_string(), Value::Int(5));
    }
}
