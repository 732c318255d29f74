//! Annual energy targets and one-row monthly constraint templates.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::table::{CALENDAR_YEAR_COLUMN, FISCAL_YEAR_COLUMN, RawTable, TOTAL_DEMAND_COLUMN};
use crate::calendar::fiscal::FISCAL_MONTH_LABELS;
use crate::error::DataError;

/// Annual energy target per fiscal year.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnualTargets {
    by_year: BTreeMap<i32, f64>,
}

impl AnnualTargets {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (i32, f64)>) -> Self {
        Self {
            by_year: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, fiscal_year: i32) -> Option<f64> {
        self.by_year.get(&fiscal_year).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, f64)> + '_ {
        self.by_year.iter().map(|(y, v)| (*y, *v))
    }

    pub fn len(&self) -> usize {
        self.by_year.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_year.is_empty()
    }

    /// Targets restricted to `start..=end`.
    pub fn within(&self, start: i32, end: i32) -> Self {
        Self {
            by_year: self
                .by_year
                .range(start..=end)
                .map(|(y, v)| (*y, *v))
                .collect(),
        }
    }

    /// Parses the annual-target table.
    ///
    /// With an explicit fiscal-year column the value is used as is (`2025`,
    /// `FY2025` and `2024-25` all mean FY2025). With only a calendar `Year`
    /// column the fiscal year is `Year + 1`. Rows with a non-positive or
    /// non-numeric total are skipped; a repeated year keeps the last row.
    ///
    /// # Errors
    ///
    /// `MissingColumn` if no year or total column exists, `NoValidRows` if no
    /// row survives.
    pub fn from_table(table: &RawTable) -> Result<Self, DataError> {
        let (year_col, calendar_offset) = match FISCAL_YEAR_COLUMN.resolve(table) {
            Some(col) => (col, 0),
            None => match CALENDAR_YEAR_COLUMN.resolve(table) {
                Some(col) => (col, 1),
                None => {
                    return Err(DataError::MissingColumn {
                        table: "annual targets".to_string(),
                        expected: format!(
                            "{} or {}",
                            FISCAL_YEAR_COLUMN.expected(),
                            CALENDAR_YEAR_COLUMN.expected()
                        ),
                    });
                }
            },
        };
        let total_col = TOTAL_DEMAND_COLUMN
            .resolve(table)
            .ok_or_else(|| DataError::MissingColumn {
                table: "annual targets".to_string(),
                expected: TOTAL_DEMAND_COLUMN.expected(),
            })?;

        let mut by_year = BTreeMap::new();
        for row in 0..table.rows.len() {
            let year = table.cell(row, year_col).and_then(parse_fiscal_label);
            let total = table
                .cell(row, total_col)
                .and_then(|c| c.replace(',', "").parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v > 0.0);
            match (year, total) {
                (Some(y), Some(t)) => {
                    by_year.insert(y + calendar_offset, t);
                }
                _ => debug!(row, "skipping unusable annual target row"),
            }
        }
        if by_year.is_empty() {
            return Err(DataError::NoValidRows {
                table: "annual targets".to_string(),
            });
        }
        Ok(Self { by_year })
    }
}

fn parse_fiscal_label(raw: &str) -> Option<i32> {
    let trimmed = raw.trim_start_matches(['F', 'Y', 'f', 'y']).trim();
    if let Some((start, end)) = trimmed.split_once(['-', '/']) {
        let start: i32 = start.trim().parse().ok()?;
        let end: i32 = end.trim().parse().ok()?;
        // "2024-25" or "2024-2025"; "2099-00" ends in 2100.
        if end >= 100 {
            return Some(end);
        }
        let mut year = start / 100 * 100 + end;
        if end < start % 100 {
            year += 100;
        }
        return Some(year);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.fract() == 0.0)
        .map(|v| v as i32)
}

/// One value per fiscal month (index 0 = April), `None` where the template
/// has no usable value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MonthlyTemplate {
    pub values: [Option<f64>; 12],
}

impl MonthlyTemplate {
    pub fn from_values(values: [f64; 12]) -> Self {
        Self {
            values: values.map(Some),
        }
    }

    /// Fiscal months (1-based) that have no value.
    pub fn missing_months(&self) -> Vec<u32> {
        self.values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_none())
            .map(|(i, _)| i as u32 + 1)
            .collect()
    }

    pub fn get(&self, fiscal_month: u32) -> Option<f64> {
        let idx = fiscal_month.checked_sub(1)? as usize;
        self.values.get(idx).copied().flatten()
    }

    /// Reads the first data row of a table whose headers are month names.
    ///
    /// Headers match on their first three letters, so `Apr`, `APRIL` and
    /// `april` are equivalent.
    ///
    /// # Errors
    ///
    /// `MissingColumn` when no month header is present, `NoValidRows` when
    /// the table has no data row.
    pub fn from_table(table: &RawTable, name: &str) -> Result<Self, DataError> {
        let mut columns = [None; 12];
        for (col, header) in table.headers.iter().enumerate() {
            let key: String = header.trim().chars().take(3).collect::<String>().to_ascii_lowercase();
            if let Some(idx) = FISCAL_MONTH_LABELS
                .iter()
                .position(|l| l.to_ascii_lowercase() == key)
            {
                columns[idx].get_or_insert(col);
            }
        }
        if columns.iter().all(Option::is_none) {
            return Err(DataError::MissingColumn {
                table: name.to_string(),
                expected: FISCAL_MONTH_LABELS.join(", "),
            });
        }
        if table.rows.is_empty() {
            return Err(DataError::NoValidRows {
                table: name.to_string(),
            });
        }
        if table.rows.len() > 1 {
            warn!(table = name, rows = table.rows.len(), "monthly template has extra rows; using the first");
        }

        let mut values = [None; 12];
        for (idx, col) in columns.iter().enumerate() {
            values[idx] = col
                .and_then(|c| table.cell(0, c))
                .and_then(|c| c.trim_end_matches('%').parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0);
        }
        Ok(Self { values })
    }
}
