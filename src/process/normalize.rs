// src/process/normalize.rs
//! Map one program-year batch onto the canonical schema.
//!
//! The steps run in a fixed order and each one assumes the previous has run:
//! header cleanup, alias resolution, program/year corrections, then gap
//! reporting and projection.

use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use super::utils::{
    clean_column_name, coerce_numeric, format_number, has_numeric_suffix, strip_layout_suffix,
};
use super::RawTable;
use crate::config::PipelineConfig;
use crate::error::HarmonizeError;
use crate::schema::columns::{PROGRAM, TOTAL_WORKERS, WAGE_RATE_FROM, WAGE_RATE_TO};
use crate::schema::rules::WAGE_RANGE_DELIMITER;
use crate::schema::{AliasConflictPolicy, AliasMap, CanonicalSchema, SpecialCaseRules};

/// Prefix of prevailing-wage columns that duplicate the offered wage in the
/// multi-worksite form layout.
const LAYOUT_DROP_PREFIX: &str = "PW_";

/// What happened to one batch, kept alongside the log output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeReport {
    pub program: String,
    pub year: u16,
    pub rows_in: usize,
    pub rows_out: usize,
    /// `(source, canonical)` for every alias rename.
    pub renamed: Vec<(String, String)>,
    /// Canonical group → columns absent from the batch before projection.
    pub missing: BTreeMap<String, Vec<String>>,
    /// Columns removed by the form-layout rule.
    pub dropped: Vec<String>,
    /// Source columns discarded under the last-wins conflict policy.
    pub overridden: Vec<String>,
    /// Non-empty wage values that could not be read as numbers.
    pub coercion_failures: usize,
    /// Rows whose worker count is present but not a positive number.
    pub worker_count_anomalies: usize,
}

impl NormalizeReport {
    pub fn missing_columns(&self) -> impl Iterator<Item = &str> {
        self.missing.values().flatten().map(String::as_str)
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// A batch restricted to the canonical schema, plus what it took to get there.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub table: RawTable,
    pub report: NormalizeReport,
}

pub struct Normalizer<'a> {
    schema: &'a CanonicalSchema,
    aliases: &'a AliasMap,
    rules: &'a SpecialCaseRules,
    policy: AliasConflictPolicy,
}

impl<'a> Normalizer<'a> {
    pub fn new(
        schema: &'a CanonicalSchema,
        aliases: &'a AliasMap,
        rules: &'a SpecialCaseRules,
        policy: AliasConflictPolicy,
    ) -> Self {
        Self {
            schema,
            aliases,
            rules,
            policy,
        }
    }

    pub fn from_config(config: &'a PipelineConfig) -> Self {
        Self::new(
            &config.schema,
            &config.aliases,
            &config.rules,
            config.alias_conflicts,
        )
    }

    pub fn schema(&self) -> &CanonicalSchema {
        self.schema
    }

    /// Normalize `batch` for `program` in `year`.
    ///
    /// Never fails on bad values or missing columns; those are nulled and
    /// reported. Fails only when two source columns claim the same canonical
    /// column under [`AliasConflictPolicy::Reject`].
    #[instrument(level = "debug", skip(self, batch), fields(rows = batch.num_rows()))]
    pub fn normalize(
        &self,
        mut batch: RawTable,
        year: u16,
        program: &str,
    ) -> Result<Normalized, HarmonizeError> {
        let mut report = NormalizeReport {
            program: program.to_string(),
            year,
            rows_in: batch.num_rows(),
            ..NormalizeReport::default()
        };

        // 1) header cleanup
        for h in &mut batch.headers {
            *h = clean_column_name(h);
        }

        // 2) alias resolution
        let cleaned = batch.headers.clone();
        for h in &mut batch.headers {
            if let Some(target) = self.aliases.resolve(h) {
                report.renamed.push((h.clone(), target.to_string()));
                *h = target.to_string();
            }
        }
        self.resolve_collisions(&mut batch, &cleaned, program, year, &mut report)?;

        // 3) program/year corrections
        self.apply_corrections(&mut batch, program, year, &mut report)?;

        // 4) gap reporting + projection
        self.report_gaps(&batch, program, year, &mut report);
        batch.fill_column(PROGRAM, Some(program));
        let table = batch.project(&self.schema.output_columns());
        report.rows_out = table.num_rows();

        Ok(Normalized { table, report })
    }

    /// Every canonical column must come from at most one source column.
    ///
    /// `previous` holds each column's name before the last renaming step and
    /// is used to name the colliding sources.
    fn resolve_collisions(
        &self,
        batch: &mut RawTable,
        previous: &[String],
        program: &str,
        year: u16,
        report: &mut NormalizeReport,
    ) -> Result<(), HarmonizeError> {
        let mut positions: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, h) in batch.headers.iter().enumerate() {
            if self.schema.contains(h) {
                positions.entry(h.as_str()).or_default().push(i);
            }
        }

        let mut losers = Vec::new();
        for (target, idx) in positions.into_iter().filter(|(_, idx)| idx.len() > 1) {
            let sources: Vec<String> = idx
                .iter()
                .map(|&i| previous.get(i).unwrap_or(&batch.headers[i]).clone())
                .collect();
            match self.policy {
                AliasConflictPolicy::Reject => {
                    return Err(HarmonizeError::AliasConflict {
                        program: program.to_string(),
                        year,
                        target: target.to_string(),
                        sources,
                    });
                }
                AliasConflictPolicy::LastWins => {
                    warn!(
                        program,
                        year,
                        column = target,
                        sources = ?sources,
                        "alias conflict, keeping the last column"
                    );
                    report.overridden.extend(sources[..sources.len() - 1].iter().cloned());
                    losers.extend_from_slice(&idx[..idx.len() - 1]);
                }
            }
        }
        batch.remove_columns(&losers);
        Ok(())
    }

    fn apply_corrections(
        &self,
        batch: &mut RawTable,
        program: &str,
        year: u16,
        report: &mut NormalizeReport,
    ) -> Result<(), HarmonizeError> {
        if self.rules.is_single_worker(program) {
            batch.fill_column(TOTAL_WORKERS, Some("1"));
        }

        for col in &self.rules.late_columns {
            if !batch.has_column(col) {
                batch.fill_column(col, None);
            }
        }

        if self.rules.splits_wage_range(program, year) {
            match split_wage_range(batch) {
                Some(failures) => {
                    report.coercion_failures += failures;
                    if failures > 0 {
                        warn!(program, year, failures, "unparseable wage range values set to null");
                    }
                }
                None => warn!(
                    program,
                    year,
                    column = WAGE_RATE_FROM,
                    "cannot split wage range, column is missing"
                ),
            }
        }

        if self.rules.uses_form_layout(program, year) {
            let suffixed = batch.headers.clone();
            for h in &mut batch.headers {
                if let Some(stem) = strip_layout_suffix(h) {
                    *h = stem.to_string();
                }
            }
            self.resolve_collisions(batch, &suffixed, program, year, report)?;

            report.worker_count_anomalies = audit_worker_counts(batch);
            let kept = batch.num_rows();
            info!(
                program,
                year,
                rows = kept,
                anomalies = report.worker_count_anomalies,
                "worker count audit, all rows kept"
            );

            report.dropped = batch
                .drop_columns(|name| name.starts_with(LAYOUT_DROP_PREFIX) || has_numeric_suffix(name));
            debug!(program, year, dropped = report.dropped.len(), "dropped form-layout columns");
        }
        Ok(())
    }

    fn report_gaps(&self, batch: &RawTable, program: &str, year: u16, report: &mut NormalizeReport) {
        for group in self.schema.groups() {
            let missing: Vec<String> = group
                .columns
                .iter()
                .filter(|c| !batch.has_column(c))
                .cloned()
                .collect();
            if missing.is_empty() {
                continue;
            }
            warn!(
                program,
                year,
                group = %group.name,
                missing = %missing.join(", "),
                "missing canonical columns"
            );
            report.missing.insert(group.name.clone(), missing);
        }
        if report.is_complete() {
            info!(program, year, "all canonical columns present");
        }
    }
}

fn range_parts(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once(WAGE_RANGE_DELIMITER) {
        Some((from, to)) => (from, Some(to)),
        None => (raw, None),
    }
}

/// Split a `"<from> - <to>"` string into two numbers; either side is `None`
/// when absent or unparseable.
pub fn split_wage_range_value(raw: &str) -> (Option<f64>, Option<f64>) {
    let (from, to) = range_parts(raw);
    (coerce_numeric(from), to.and_then(coerce_numeric))
}

/// Rewrite the wage-from column in place as two numeric columns.
/// Cells holding a range fill both columns; any other cell only has its
/// wage-from value coerced, so an existing wage-to value is kept.
/// Returns the number of non-empty parts that failed to parse, or `None`
/// when the batch has no wage-from column.
fn split_wage_range(batch: &mut RawTable) -> Option<usize> {
    if !batch.has_column(WAGE_RATE_TO) {
        batch.fill_column(WAGE_RATE_TO, None);
    }
    let from_idx = batch.column_index(WAGE_RATE_FROM)?;
    let to_idx = batch.column_index(WAGE_RATE_TO)?;

    let mut failures = 0;
    for row in &mut batch.rows {
        let Some(raw) = row[from_idx].take() else {
            continue;
        };
        let (from_part, to_part) = range_parts(&raw);
        let (from, to) = split_wage_range_value(&raw);
        if !from_part.trim().is_empty() && from.is_none() {
            failures += 1;
        }
        row[from_idx] = from.map(format_number);

        let Some(to_part) = to_part else {
            continue;
        };
        if !to_part.trim().is_empty() && to.is_none() {
            failures += 1;
        }
        row[to_idx] = to.map(format_number);
    }
    Some(failures)
}

/// Count rows whose worker count is present but not a positive number.
/// Rows are never removed here; the count only feeds the report and logs.
fn audit_worker_counts(batch: &RawTable) -> usize {
    let Some(idx) = batch.column_index(TOTAL_WORKERS) else {
        return 0;
    };
    batch
        .column_values(idx)
        .flatten()
        .filter(|v| !coerce_numeric(v).is_some_and(|n| n > 0.0))
        .count()
}

/// Normalize with the built-in alias map, rules and conflict policy.
pub fn normalize(
    batch: RawTable,
    year: u16,
    program: &str,
    schema: &CanonicalSchema,
) -> Result<Normalized, HarmonizeError> {
    let aliases = AliasMap::default();
    let rules = SpecialCaseRules::default();
    Normalizer::new(schema, &aliases, &rules, AliasConflictPolicy::default())
        .normalize(batch, year, program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io,
        sync::{Arc, Mutex},
    };

    fn schema() -> CanonicalSchema {
        CanonicalSchema::default()
    }

    /// A batch carrying every canonical column under its canonical name.
    fn canonical_batch(rows: usize) -> RawTable {
        let headers: Vec<String> = schema()
            .columns()
            .into_iter()
            .map(str::to_string)
            .collect();
        let rows: Vec<Vec<String>> = (0..rows)
            .map(|r| headers.iter().map(|h| format!("{h}-{r}")).collect())
            .collect();
        RawTable::from_rows(headers, rows)
    }

    #[test]
    fn output_columns_are_exactly_canonical_plus_program() -> anyhow::Result<()> {
        let batch = RawTable::from_rows(
            ["Case_No", "Status", "WAGE_OFFERED_FROM", "Visa Class", "EMPLOYER_ADDRESS1"],
            [["A-1", "CERTIFIED", "52000", "H-1B", "1 Main St"]],
        );
        let out = normalize(batch, 2012, "LCA", &schema())?;

        assert_eq!(out.table.headers, schema().output_columns());
        let row = &out.table.rows[0];
        let get = |c: &str| row[out.table.column_index(c).unwrap()].as_deref();
        assert_eq!(get("CASE_NUMBER"), Some("A-1"));
        assert_eq!(get("CASE_STATUS"), Some("CERTIFIED"));
        assert_eq!(get("WAGE_RATE_FROM"), Some("52000"));
        assert_eq!(get("EMPLOYER_ADDRESS"), Some("1 Main St"));
        assert_eq!(get("SOC_CODE"), None);
        assert_eq!(get("PROGRAM"), Some("LCA"));
        assert!(!out.table.headers.iter().any(|h| h == "VISA_CLASS"));
        Ok(())
    }

    #[test]
    fn normalizing_a_canonical_batch_is_a_no_op() -> anyhow::Result<()> {
        // plain years, the wage-range year, a form-layout year and a
        // single-worker program
        for (year, program) in [(2012, "LCA"), (2015, "LCA"), (2020, "LCA"), (2018, "PERM")] {
            let mut input = canonical_batch(3);
            input.fill_column(WAGE_RATE_FROM, Some("50000"));
            input.fill_column(WAGE_RATE_TO, Some("60000"));
            input.fill_column(TOTAL_WORKERS, Some("1"));
            input.fill_column(PROGRAM, Some(program));

            let once = normalize(input.clone(), year, program, &schema())?;
            assert!(once.report.renamed.is_empty(), "{program} {year}");
            assert_eq!(once.table, input, "{program} {year}");

            let twice = normalize(once.table.clone(), year, program, &schema())?;
            assert_eq!(twice.table, once.table, "{program} {year}");
        }
        Ok(())
    }

    #[test]
    fn wage_range_year_keeps_an_existing_upper_bound() -> anyhow::Result<()> {
        let batch = RawTable::from_rows(
            ["CASE_NUMBER", "WAGE_RATE_FROM", "WAGE_RATE_TO"],
            [["I-1", "50000", "60000"], ["I-2", "40000 - 45000", "99999"]],
        );
        let out = normalize(batch, 2015, "LCA", &schema())?;
        assert_eq!(
            out.table.column(WAGE_RATE_FROM),
            Some(vec![Some("50000"), Some("40000")])
        );
        assert_eq!(
            out.table.column(WAGE_RATE_TO),
            Some(vec![Some("60000"), Some("45000")])
        );
        assert_eq!(out.report.coercion_failures, 0);
        Ok(())
    }

    #[test]
    fn missing_column_is_null_filled_and_reported() -> anyhow::Result<()> {
        let mut batch = canonical_batch(2);
        let idx = batch.column_index("NAICS_CODE").unwrap();
        batch.remove_columns(&[idx]);

        let out = normalize(batch, 2013, "PERM", &schema())?;
        assert_eq!(out.table.column("NAICS_CODE"), Some(vec![None, None]));
        assert_eq!(
            out.report.missing.get("industry_columns"),
            Some(&vec!["NAICS_CODE".to_string()])
        );
        assert_eq!(out.report.missing_columns().collect::<Vec<_>>(), vec!["NAICS_CODE"]);
        Ok(())
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn missing_column_warning_names_column_program_and_year() {
        let buf = SharedBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();

        let mut batch = canonical_batch(1);
        let idx = batch.column_index("SOC_CODE").unwrap();
        batch.remove_columns(&[idx]);
        tracing::subscriber::with_default(subscriber, || {
            normalize(batch, 2016, "LCA", &schema()).unwrap();
        });

        let logged = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        let line = logged
            .lines()
            .find(|l| l.contains("missing canonical columns"))
            .expect("no missing-column warning");
        assert!(line.contains("WARN"));
        assert!(line.contains("SOC_CODE"));
        assert!(line.contains("program=\"LCA\""));
        assert!(line.contains("year=2016"));
    }

    #[test]
    fn single_worker_program_forces_total_workers() -> anyhow::Result<()> {
        let batch = RawTable::from_rows(
            ["CASE_NUMBER", "TOTAL_WORKER_POSITIONS"],
            [["P-1", "7"], ["P-2", ""], ["P-3", "bad"]],
        );
        let out = normalize(batch, 2018, "PERM", &schema())?;
        assert_eq!(
            out.table.column(TOTAL_WORKERS),
            Some(vec![Some("1"), Some("1"), Some("1")])
        );

        // created when the source has no worker column at all
        let batch = RawTable::from_rows(["CASE_NUMBER"], [["P-4"]]);
        let out = normalize(batch, 2009, "PERM", &schema())?;
        assert_eq!(out.table.column(TOTAL_WORKERS), Some(vec![Some("1")]));
        Ok(())
    }

    #[test]
    fn wage_range_values_split_into_numbers() {
        assert_eq!(
            split_wage_range_value("50000 - 60000"),
            (Some(50000.0), Some(60000.0))
        );
        assert_eq!(split_wage_range_value("bad-data"), (None, None));
        assert_eq!(split_wage_range_value("45000"), (Some(45000.0), None));
        assert_eq!(split_wage_range_value("45000 - "), (Some(45000.0), None));
    }

    #[test]
    fn wage_range_batch_is_split_for_lca_2015() -> anyhow::Result<()> {
        let batch = RawTable::from_rows(
            ["LCA_CASE_NUMBER", "WAGE_RATE_OF_PAY", "WAGE_RATE_OF_PAY_TO"],
            [
                ["I-1", "50000 - 60000", "ignored"],
                ["I-2", "bad-data", ""],
                ["I-3", "", ""],
            ],
        );
        let out = normalize(batch, 2015, "LCA", &schema())?;
        assert_eq!(
            out.table.column(WAGE_RATE_FROM),
            Some(vec![Some("50000"), None, None])
        );
        assert_eq!(
            out.table.column(WAGE_RATE_TO),
            Some(vec![Some("60000"), None, None])
        );
        assert_eq!(out.report.coercion_failures, 1);
        Ok(())
    }

    #[test]
    fn wage_range_left_alone_outside_2015() -> anyhow::Result<()> {
        let batch = RawTable::from_rows(["WAGE_RATE_OF_PAY"], [["50000 - 60000"]]);
        let out = normalize(batch, 2014, "LCA", &schema())?;
        assert_eq!(out.table.column(WAGE_RATE_FROM), Some(vec![Some("50000 - 60000")]));
        Ok(())
    }

    #[test]
    fn wage_range_without_wage_column_does_not_fail() -> anyhow::Result<()> {
        let batch = RawTable::from_rows(["CASE_NUMBER"], [["I-1"]]);
        let out = normalize(batch, 2015, "LCA", &schema())?;
        assert_eq!(out.table.column(WAGE_RATE_FROM), Some(vec![None]));
        assert_eq!(out.table.column(WAGE_RATE_TO), Some(vec![None]));
        Ok(())
    }

    #[test]
    fn form_layout_years_strip_suffixes_and_drop_columns() -> anyhow::Result<()> {
        let batch = RawTable::from_rows(
            [
                "CASE_NUMBER",
                "EMPLOYER_CITY_1",
                "WORKSITE_CITY_1",
                "WORKSITE_CITY_2",
                "PW_WAGE_LEVEL_1",
                "TOTAL_WORKER_POSITIONS",
            ],
            [
                ["I-1", "Austin", "Dallas", "Houston", "II", "2"],
                ["I-2", "Boston", "Salem", "", "I", "n/a"],
            ],
        );
        let out = normalize(batch, 2020, "LCA", &schema())?;

        assert_eq!(
            out.table.column("EMPLOYER_CITY"),
            Some(vec![Some("Austin"), Some("Boston")])
        );
        assert_eq!(
            out.table.column("WORKSITE_CITY"),
            Some(vec![Some("Dallas"), Some("Salem")])
        );
        assert!(out.report.dropped.contains(&"WORKSITE_CITY_2".to_string()));
        assert!(out.report.dropped.contains(&"PW_WAGE_LEVEL".to_string()));
        // the audit flags but never removes rows
        assert_eq!(out.report.worker_count_anomalies, 1);
        assert_eq!(out.report.rows_out, 2);
        Ok(())
    }

    #[test]
    fn late_worksite_columns_are_created() -> anyhow::Result<()> {
        let batch = RawTable::from_rows(["CASE_NUMBER"], [["I-1"]]);
        let out = normalize(batch, 2011, "LCA", &schema())?;
        // created before gap reporting, so never reported missing
        assert!(!out.report.missing_columns().any(|c| c == "WORKSITE_POSTAL_CODE"));
        assert!(!out.report.missing_columns().any(|c| c == "WORKSITE_ADDRESS1"));
        assert!(out.report.missing_columns().any(|c| c == "WORKSITE_CITY"));
        Ok(())
    }

    #[test]
    fn alias_conflict_is_rejected_by_default() {
        let batch = RawTable::from_rows(
            ["CASE_NO", "WAGE_OFFER_FROM", "WAGE_RATE_OF_PAY_FROM"],
            [["A-1", "10", "20"]],
        );
        let err = normalize(batch, 2012, "LCA", &schema()).unwrap_err();
        assert_eq!(
            err,
            HarmonizeError::AliasConflict {
                program: "LCA".to_string(),
                year: 2012,
                target: "WAGE_RATE_FROM".to_string(),
                sources: vec![
                    "WAGE_OFFER_FROM".to_string(),
                    "WAGE_RATE_OF_PAY_FROM".to_string()
                ],
            }
        );
    }

    #[test]
    fn alias_conflict_with_canonical_column_names_both_sources() {
        let batch = RawTable::from_rows(["CASE_NUMBER", "CASE_NO"], [["A-1", "A-2"]]);
        let err = normalize(batch, 2012, "PERM", &schema()).unwrap_err();
        match err {
            HarmonizeError::AliasConflict { target, sources, .. } => {
                assert_eq!(target, "CASE_NUMBER");
                assert_eq!(sources, vec!["CASE_NUMBER", "CASE_NO"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn layout_suffix_strip_can_collide() {
        let batch = RawTable::from_rows(
            ["EMPLOYER_CITY", "EMPLOYER_CITY_1"],
            [["Austin", "Dallas"]],
        );
        let err = normalize(batch, 2021, "LCA", &schema()).unwrap_err();
        match err {
            HarmonizeError::AliasConflict { target, sources, year, .. } => {
                assert_eq!(year, 2021);
                assert_eq!(target, "EMPLOYER_CITY");
                assert_eq!(sources, vec!["EMPLOYER_CITY", "EMPLOYER_CITY_1"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn last_wins_policy_keeps_later_column() -> anyhow::Result<()> {
        let schema = schema();
        let aliases = AliasMap::default();
        let rules = SpecialCaseRules::default();
        let normalizer =
            Normalizer::new(&schema, &aliases, &rules, AliasConflictPolicy::LastWins);

        let batch = RawTable::from_rows(
            ["WAGE_OFFER_FROM", "WAGE_RATE_OF_PAY_FROM"],
            [["10", "20"]],
        );
        let out = normalizer.normalize(batch, 2012, "LCA")?;
        assert_eq!(out.table.column(WAGE_RATE_FROM), Some(vec![Some("20")]));
        assert_eq!(out.report.overridden, vec!["WAGE_OFFER_FROM".to_string()]);
        Ok(())
    }

    #[test]
    fn non_canonical_duplicates_are_not_conflicts() -> anyhow::Result<()> {
        // both resolve to WAGE_RATE_UNIT, which the schema does not carry
        let batch = RawTable::from_rows(
            ["WAGE_UNIT_OF_PAY", "WAGE_UNIT_OF_PAY_1", "CASE_NUMBER"],
            [["Year", "Hour", "I-1"]],
        );
        let out = normalize(batch, 2012, "LCA", &schema())?;
        assert_eq!(out.table.column("CASE_NUMBER"), Some(vec![Some("I-1")]));
        Ok(())
    }
}
