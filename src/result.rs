//! Test results and their aggregation
//!
//! A [`ResultSet`] collects one [`TestResult`] per executed cell and renders
//! them as a test × capability matrix. Cells that were skipped never produce
//! a result, so they show up as "N/A" and do not count towards the total.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use colored::Colorize;
use serde::Serialize;

use crate::capability::Capability;
use crate::common::Result;

/// Outcome of one (test, capability) cell
#[derive(Debug, Clone)]
pub struct TestResult {
    test: &'static str,
    capability: Capability,
    success: bool,
    message: Option<String>,
}

impl TestResult {
    pub fn passed(test: &'static str, capability: Capability) -> Self {
        Self {
            test,
            capability,
            success: true,
            message: None,
        }
    }

    pub fn failed(test: &'static str, capability: Capability, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            test,
            capability,
            success: false,
            message: (!message.is_empty()).then_some(message),
        }
    }

    /// Name of the test
    pub fn test(&self) -> &'static str {
        self.test
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} on {}",
            if self.success { "Pass" } else { "Fail" },
            self.test,
            self.capability.description()
        )?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

/// Derived lookup structure, rebuilt after every `include`
#[derive(Debug, Default)]
struct Index {
    tests: Vec<&'static str>,
    capabilities: Vec<String>,
    outcomes: HashMap<(&'static str, String), bool>,
}

impl Index {
    /// Rows and columns follow the order in which cells were recorded
    fn build(results: &[TestResult], cells: &[(&'static str, String)]) -> Self {
        let mut index = Index::default();
        for (test, label) in cells {
            index.add_cell(*test, label);
        }
        for result in results {
            let label = result.capability.short_label().to_string();
            index.outcomes.insert((result.test, label), result.success);
        }
        index
    }

    fn add_cell(&mut self, test: &'static str, label: &str) {
        if !self.tests.contains(&test) {
            self.tests.push(test);
        }
        if !self.capabilities.iter().any(|c| c == label) {
            self.capabilities.push(label.to_string());
        }
    }

    fn cell(&self, test: &'static str, capability: &str) -> &'static str {
        match self.outcomes.get(&(test, capability.to_string())) {
            Some(true) => "Pass",
            Some(false) => "Fail",
            None => "N/A",
        }
    }
}

/// Serializable summary of a result set
#[derive(Debug, Serialize)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
    pub percentage: u32,
    pub results: Vec<ResultRow>,
}

/// Serializable form of one result
#[derive(Debug, Serialize)]
pub struct ResultRow {
    pub test: String,
    pub capability: String,
    pub description: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Append-only collection of test results
#[derive(Debug, Default)]
pub struct ResultSet {
    results: Vec<TestResult>,
    /// Every recorded cell, executed or skipped, in recording order
    cells: Vec<(&'static str, String)>,
    index: OnceLock<Index>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one result
    pub fn include(&mut self, result: TestResult) {
        self.cells
            .push((result.test, result.capability.short_label().to_string()));
        self.results.push(result);
        self.index = OnceLock::new();
    }

    /// Append many results
    pub fn include_all(&mut self, results: impl IntoIterator<Item = TestResult>) {
        for result in results {
            self.include(result);
        }
    }

    /// Record a cell that was skipped as incompatible
    ///
    /// It shows up as "N/A" in the matrix and never counts towards totals.
    pub fn note_skipped(&mut self, test: &'static str, capability: &str) {
        self.cells.push((test, capability.to_string()));
        self.index = OnceLock::new();
    }

    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn number_passed(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn number_failed(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }

    /// Share of passed results, rounded to the nearest integer percent
    pub fn percentage_passed(&self) -> u32 {
        let total = self.results.len();
        if total == 0 {
            return 0;
        }
        (100.0 * self.number_passed() as f64 / total as f64).round() as u32
    }

    /// Outcome of one cell, `None` if it has no result
    pub fn outcome(&self, test: &'static str, capability: &str) -> Option<bool> {
        self.index()
            .outcomes
            .get(&(test, capability.to_string()))
            .copied()
    }

    fn index(&self) -> &Index {
        self.index
            .get_or_init(|| Index::build(&self.results, &self.cells))
    }

    /// Header row plus one row per test, with a leading label column
    pub fn matrix(&self) -> Vec<Vec<String>> {
        let index = self.index();
        let mut rows = Vec::with_capacity(index.tests.len() + 1);

        let mut header = vec![String::new()];
        header.extend(index.capabilities.iter().cloned());
        rows.push(header);

        for &test in &index.tests {
            let mut row = vec![test.to_string()];
            row.extend(
                index
                    .capabilities
                    .iter()
                    .map(|cap| index.cell(test, cap).to_string()),
            );
            rows.push(row);
        }
        rows
    }

    fn column_widths(matrix: &[Vec<String>]) -> Vec<usize> {
        let columns = matrix.first().map(Vec::len).unwrap_or(0);
        (0..columns)
            .map(|col| {
                matrix
                    .iter()
                    .map(|row| row[col].chars().count())
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    fn summary_line(&self) -> String {
        format!(
            "{}/{} - {}% passed",
            self.number_passed(),
            self.results.len(),
            self.percentage_passed()
        )
    }

    /// Fixed-width matrix followed by a summary line
    pub fn report(&self) -> String {
        let matrix = self.matrix();
        let widths = Self::column_widths(&matrix);

        let table: Vec<String> = matrix
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&widths)
                    .map(|(cell, width)| format!("{:<width$}", cell, width = width))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();

        format!("{}\n\n{}", table.join("\n"), self.summary_line())
    }

    /// Same as [`report`](Self::report) with colored cells, for terminals
    pub fn report_colored(&self) -> String {
        let matrix = self.matrix();
        let widths = Self::column_widths(&matrix);

        let table: Vec<String> = matrix
            .iter()
            .enumerate()
            .map(|(row_idx, row)| {
                row.iter()
                    .zip(&widths)
                    .enumerate()
                    .map(|(col_idx, (cell, width))| {
                        let padded = format!("{:<width$}", cell, width = width);
                        if row_idx == 0 || col_idx == 0 {
                            return padded.bold().to_string();
                        }
                        match cell.as_str() {
                            "Pass" => padded.green().to_string(),
                            "Fail" => padded.red().to_string(),
                            _ => padded.dimmed().to_string(),
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();

        let summary = if self.number_failed() == 0 {
            self.summary_line().green().bold()
        } else {
            self.summary_line().red().bold()
        };
        format!("{}\n\n{}", table.join("\n"), summary)
    }

    /// Serializable summary of all results
    pub fn summary(&self) -> Summary {
        Summary {
            passed: self.number_passed(),
            failed: self.number_failed(),
            total: self.results.len(),
            percentage: self.percentage_passed(),
            results: self
                .results
                .iter()
                .map(|r| ResultRow {
                    test: r.test.to_string(),
                    capability: r.capability.short_label().to_string(),
                    description: r.capability.description(),
                    success: r.success,
                    message: r.message.clone(),
                })
                .collect(),
        }
    }

    /// Pretty-printed JSON summary
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.summary())?)
    }
}

impl Extend<TestResult> for ResultSet {
    fn extend<I: IntoIterator<Item = TestResult>>(&mut self, iter: I) {
        self.include_all(iter);
    }
}

impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.results.iter().map(ToString::to_string).collect();
        write!(f, "{}", lines.join("\n"))
    }
}
