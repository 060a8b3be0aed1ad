use std::{
    collections::HashSet,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::FeaturePipeline;

/// Column holding the category.
pub const CATEGORY_COLUMN: &str = "categoria";
/// Column holding the block.
pub const BLOCK_COLUMN: &str = "bloque";
/// Column holding the weekday.
pub const WEEKDAY_COLUMN: &str = "dia";
/// Column holding the principle name.
pub const PRINCIPLE_COLUMN: &str = "principio";
/// Column holding the season identifier.
pub const SEASON_COLUMN: &str = "id_temporada";
/// Column holding the microcycle identifier.
pub const UNIT_COLUMN: &str = "nombre_microciclo";

/// Columns required to train.
pub const TRAINING_COLUMNS: [&str; 4] = [
    CATEGORY_COLUMN,
    BLOCK_COLUMN,
    WEEKDAY_COLUMN,
    PRINCIPLE_COLUMN,
];
/// Columns required for similarity ranking.
pub const SIMILARITY_COLUMNS: [&str; 2] = [UNIT_COLUMN, PRINCIPLE_COLUMN];
/// Columns required for workload estimation.
pub const WORKLOAD_COLUMNS: [&str; 3] = [CATEGORY_COLUMN, UNIT_COLUMN, WEEKDAY_COLUMN];

/// Errors raised while loading planning records.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The CSV file could not be opened.
    #[error("cannot open planning data at {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Malformed CSV content.
    #[error("malformed planning data: {0}")]
    Csv(#[from] csv::Error),
    /// Required columns absent from the header.
    #[error("missing required columns: {}", columns.join(", "))]
    MissingColumns {
        /// Absent column names.
        columns: Vec<String>,
    },
}

/// One planning row: a principle scheduled for a category, block and weekday.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanningRecord {
    /// Category (`categoria`).
    #[serde(rename = "categoria", default)]
    pub category: Option<String>,
    /// Block (`bloque`).
    #[serde(rename = "bloque", default)]
    pub block: Option<String>,
    /// Weekday (`dia`).
    #[serde(rename = "dia", default)]
    pub weekday: Option<String>,
    /// Principle (`principio`).
    #[serde(rename = "principio", default)]
    pub principle: Option<String>,
    /// Season identifier (`id_temporada`), usually `YYYY-MM`.
    #[serde(rename = "id_temporada", default)]
    pub season_id: Option<String>,
    /// Microcycle identifier (`nombre_microciclo`).
    #[serde(rename = "nombre_microciclo", default)]
    pub unit_id: Option<String>,
}

impl PlanningRecord {
    /// Record with the four training fields set.
    #[must_use]
    pub fn new(
        category: impl Into<String>,
        block: impl Into<String>,
        weekday: impl Into<String>,
        principle: impl Into<String>,
    ) -> Self {
        Self {
            category: Some(category.into()),
            block: Some(block.into()),
            weekday: Some(weekday.into()),
            principle: Some(principle.into()),
            ..Self::default()
        }
    }

    /// Sets the season identifier.
    #[must_use]
    pub fn with_season(mut self, season: impl Into<String>) -> Self {
        self.season_id = Some(season.into());
        self
    }

    /// Sets the microcycle identifier.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit_id = Some(unit.into());
        self
    }

    /// Raw value of a column by its CSV name.
    #[must_use]
    pub fn field(&self, column: &str) -> Option<&str> {
        match column {
            CATEGORY_COLUMN => self.category.as_deref(),
            BLOCK_COLUMN => self.block.as_deref(),
            WEEKDAY_COLUMN => self.weekday.as_deref(),
            PRINCIPLE_COLUMN => self.principle.as_deref(),
            SEASON_COLUMN => self.season_id.as_deref(),
            UNIT_COLUMN => self.unit_id.as_deref(),
            _ => None,
        }
    }

    /// Normalized value of a column.
    #[must_use]
    pub fn normalized(&self, column: &str) -> Option<String> {
        FeaturePipeline::normalize(self.field(column))
    }
}

/// Counts describing a record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSummary {
    /// Rows loaded.
    pub records: usize,
    /// Distinct categories.
    pub categories: usize,
    /// Distinct (category, block, weekday) combinations.
    pub combinations: usize,
}

/// Whether a record set holds enough distinct combinations to train.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    /// True when training can proceed.
    pub ready: bool,
    /// Human-readable explanation.
    pub message: String,
}

/// Planning records plus the header they were loaded with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordTable {
    columns: Vec<String>,
    records: Vec<PlanningRecord>,
}

impl RecordTable {
    /// Wraps in-memory records; columns are those populated in at least one row.
    #[must_use]
    pub fn from_records(records: Vec<PlanningRecord>) -> Self {
        let columns = [
            CATEGORY_COLUMN,
            BLOCK_COLUMN,
            WEEKDAY_COLUMN,
            PRINCIPLE_COLUMN,
            SEASON_COLUMN,
            UNIT_COLUMN,
        ]
        .iter()
        .filter(|column| records.iter().any(|r| r.field(column).is_some()))
        .map(|column| (*column).to_owned())
        .collect();
        Self { columns, records }
    }

    /// Loads a CSV file with a header row.
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| RecordError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    /// Loads CSV from any reader. Unknown columns are ignored; empty cells become `None`.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RecordError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);
        let columns = reader
            .headers()?
            .iter()
            .map(str::to_owned)
            .collect::<Vec<_>>();
        let records = reader
            .deserialize::<PlanningRecord>()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { columns, records })
    }

    /// Fails with [`RecordError::MissingColumns`] listing every absent column.
    pub fn require_columns(&self, required: &[&str]) -> Result<(), RecordError> {
        let missing: Vec<String> = required
            .iter()
            .filter(|column| !self.columns.iter().any(|c| c == *column))
            .map(|column| (*column).to_owned())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RecordError::MissingColumns { columns: missing })
        }
    }

    /// Header columns.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Loaded rows.
    #[must_use]
    pub fn records(&self) -> &[PlanningRecord] {
        &self.records
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no rows were loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Row, category and combination counts over normalized values.
    #[must_use]
    pub fn summary(&self) -> DataSummary {
        let categories: HashSet<String> = self
            .records
            .iter()
            .filter_map(|r| r.normalized(CATEGORY_COLUMN))
            .collect();
        DataSummary {
            records: self.records.len(),
            categories: categories.len(),
            combinations: self.combinations(),
        }
    }

    /// Checks that at least `min_combinations` distinct (category, block, weekday) triples exist.
    #[must_use]
    pub fn readiness(&self, min_combinations: usize) -> Readiness {
        if self.records.is_empty() {
            return Readiness {
                ready: false,
                message: "no planning records available".into(),
            };
        }
        let combinations = self.combinations();
        if combinations < min_combinations {
            Readiness {
                ready: false,
                message: format!(
                    "only {combinations} distinct combinations; \
                     at least {min_combinations} are needed"
                ),
            }
        } else {
            Readiness {
                ready: true,
                message: format!("{combinations} distinct combinations available for training"),
            }
        }
    }

    fn combinations(&self) -> usize {
        self.records
            .iter()
            .filter_map(|r| {
                Some((
                    r.normalized(CATEGORY_COLUMN)?,
                    r.normalized(BLOCK_COLUMN)?,
                    r.normalized(WEEKDAY_COLUMN)?,
                ))
            })
            .collect::<HashSet<_>>()
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
categoria,bloque,dia,principio,id_temporada,nombre_microciclo
Cadete,Inicial,Lunes,Amplitud,2024-03,MC1
Cadete,Inicial,Lunes,Presion alta,2024-03,MC1
Cadete, Inicial ,Martes,Repliegue,,MC1
Juvenil,Final,Jueves,,2024-04,MC2
";

    #[test]
    fn loads_csv_with_empty_cells_as_none() {
        let table = RecordTable::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.columns().len(), 6);
        assert_eq!(table.records()[2].season_id, None);
        assert_eq!(table.records()[3].principle, None);
        assert_eq!(table.records()[0].unit_id.as_deref(), Some("MC1"));
    }

    #[test]
    fn summary_counts_normalized_values() {
        let table = RecordTable::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(
            table.summary(),
            DataSummary {
                records: 4,
                categories: 2,
                combinations: 3,
            }
        );
    }

    #[test]
    fn readiness_reports_shortfall() {
        let table = RecordTable::from_reader(CSV.as_bytes()).unwrap();
        let readiness = table.readiness(10);
        assert!(!readiness.ready);
        assert!(readiness.message.contains("only 3"));
        assert!(table.readiness(3).ready);
        assert!(!RecordTable::default().readiness(1).ready);
    }

    #[test]
    fn require_columns_lists_every_missing_one() {
        let table = RecordTable::from_reader("categoria,dia\nCadete,Lunes\n".as_bytes()).unwrap();
        let err = table.require_columns(&TRAINING_COLUMNS).unwrap_err();
        match err {
            RecordError::MissingColumns { columns } => {
                assert_eq!(columns, vec!["bloque", "principio"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(table.require_columns(&[CATEGORY_COLUMN]).is_ok());
    }

    #[test]
    fn in_memory_tables_infer_columns() {
        let table = RecordTable::from_records(vec![
            PlanningRecord::new("Cadete", "Inicial", "Lunes", "Amplitud").with_unit("MC1"),
        ]);
        assert!(table.require_columns(&SIMILARITY_COLUMNS).is_ok());
        assert!(table.require_columns(&[SEASON_COLUMN]).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = RecordTable::from_csv_path("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, RecordError::Io { .. }));
    }
}
