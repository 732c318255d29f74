//! Untyped tables as delivered by the loading collaborator, plus the
//! alias-based column resolution applied once during normalisation.

/// Header row plus string cells, as read from a CSV or spreadsheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Builds a table from string slices; handy for fixtures.
    pub fn from_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            headers: headers.iter().map(|h| (*h).to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| (*c).to_string()).collect())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first header equal to `name`, ignoring case and padding.
    pub fn column(&self, name: &str) -> Option<usize> {
        let wanted = normalise_header(name);
        self.headers
            .iter()
            .position(|h| normalise_header(h) == wanted)
    }

    /// Trimmed cell content, `None` for ragged rows or blank cells.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
    }
}

fn normalise_header(h: &str) -> String {
    h.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

/// Canonical column name with its accepted header spellings, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct ColumnAlias {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
}

impl ColumnAlias {
    /// First alias present in `table`.
    pub fn resolve(&self, table: &RawTable) -> Option<usize> {
        self.aliases.iter().find_map(|a| table.column(a))
    }

    /// Alias list for error messages.
    pub fn expected(&self) -> String {
        self.aliases.join(", ")
    }
}

pub const DATETIME_COLUMN: ColumnAlias = ColumnAlias {
    canonical: "datetime",
    aliases: &["datetime", "timestamp", "date_time", "date time"],
};

pub const DATE_COLUMN: ColumnAlias = ColumnAlias {
    canonical: "date",
    aliases: &["date", "day"],
};

pub const TIME_COLUMN: ColumnAlias = ColumnAlias {
    canonical: "time",
    aliases: &["time", "hour"],
};

pub const DEMAND_COLUMN: ColumnAlias = ColumnAlias {
    canonical: "demand",
    aliases: &["demand", "load", "power", "demand_kw", "load_kw", "power_kw"],
};

pub const FISCAL_YEAR_COLUMN: ColumnAlias = ColumnAlias {
    canonical: "financial_year",
    aliases: &["financial_year", "fiscal_year", "fy"],
};

pub const CALENDAR_YEAR_COLUMN: ColumnAlias = ColumnAlias {
    canonical: "year",
    aliases: &["year"],
};

pub const TOTAL_DEMAND_COLUMN: ColumnAlias = ColumnAlias {
    canonical: "total_demand",
    aliases: &[
        "total_demand",
        "total demand",
        "demand",
        "load",
        "power",
        "energy",
    ],
};

/// Resolution order for the historical-demand table.
pub const HISTORY_COLUMNS: [ColumnAlias; 4] =
    [DATETIME_COLUMN, DATE_COLUMN, TIME_COLUMN, DEMAND_COLUMN];
