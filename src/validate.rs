//! Record validation against a resolved concept
//!
//! Validates tabular records (column name to raw cell value) against a
//! concept's column set: null sentinels, required-column presence,
//! primitive syntax, CV membership, named patterns, array-separator
//! ladders and compound members. Findings are reported per record and
//! never abort a batch; the driver decides whether to continue.

use std::collections::HashMap;

use crate::error::{ModelError, Result};
use crate::model::{Column, Concept, Model, Restriction, Usage};

/// Default number of records per ingest batch
pub const DEFAULT_BATCH_SIZE: usize = 20_000;

/// Kinds of per-column findings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingCode {
    MissingRequired,
    NullInRequired,
    TypeMismatch,
    NotInCv,
    CvUnresolved,
    PatternMismatch,
    NullCollision,
    UnknownColumn,
}

/// One finding on one column of one record
#[derive(Debug, Clone)]
pub struct Finding {
    pub column: String,
    pub code: FindingCode,
    pub message: String,
}

/// Validation result for a single record
#[derive(Debug, Clone, Default)]
pub struct RecordReport {
    pub row: usize,
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl RecordReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, column: &str, code: FindingCode, message: impl Into<String>) {
        self.errors.push(Finding {
            column: column.to_string(),
            code,
            message: message.into(),
        });
    }

    fn warning(&mut self, column: &str, code: FindingCode, message: impl Into<String>) {
        self.warnings.push(Finding {
            column: column.to_string(),
            code,
            message: message.into(),
        });
    }
}

/// Validates records against one concept of a resolved model
pub struct RecordValidator<'a> {
    model: &'a Model,
    concept: &'a Concept,
}

impl<'a> RecordValidator<'a> {
    pub fn new(model: &'a Model, domain: &str, concept: &str) -> Result<Self> {
        let concept = model
            .concept(domain, concept)
            .ok_or_else(|| ModelError::UnknownReference {
                kind: "concept",
                name: format!("{domain}.{concept}"),
                referrer: "record validator".to_string(),
            })?;
        Ok(Self { model, concept })
    }

    pub fn concept(&self) -> &Concept {
        self.concept
    }

    /// Validate one record
    pub fn validate_record(
        &self,
        row: usize,
        record: &HashMap<String, String>,
    ) -> RecordReport {
        let mut report = RecordReport {
            row,
            ..RecordReport::default()
        };

        for column in self.concept.columns.iter() {
            match record.get(&column.name) {
                None => self.check_missing(column, &mut report),
                Some(value) => self.check_value(column, value, &mut report),
            }
        }
        for name in record.keys() {
            if !self.concept.columns.contains(name) {
                report.warning(
                    name,
                    FindingCode::UnknownColumn,
                    format!("column not declared on {}", self.concept.qualified_name()),
                );
            }
        }
        report
    }

    fn check_missing(&self, column: &Column, report: &mut RecordReport) {
        match column.ctype.usage {
            Usage::IdRef | Usage::Required => {
                if column.ctype.default.is_none() {
                    report.error(
                        &column.name,
                        FindingCode::MissingRequired,
                        "required column absent",
                    );
                }
            }
            Usage::Desirable => {
                report.warning(
                    &column.name,
                    FindingCode::MissingRequired,
                    "desirable column absent",
                );
            }
            Usage::Optional => {}
        }
    }

    fn check_value(&self, column: &Column, value: &str, report: &mut RecordReport) {
        if self.model.is_valid_null(value) {
            match column.ctype.usage {
                Usage::IdRef | Usage::Required => {
                    report.error(
                        &column.name,
                        FindingCode::NullInRequired,
                        format!("null sentinel '{value}' in required column"),
                    );
                }
                _ => {}
            }
            // a null sentinel colliding with a live CV term is ambiguous
            if let Some(Restriction::Cv(cv_id)) = &column.ctype.restriction {
                if matches!(self.model.cv_validate(cv_id, value), Ok(true)) {
                    report.error(
                        &column.name,
                        FindingCode::NullCollision,
                        format!("'{value}' is both a null sentinel and a term of CV '{cv_id}'"),
                    );
                }
            }
            return;
        }
        self.check_dimension(column, value, &column.ctype.separators, report);
    }

    /// Peel array dimensions separator by separator, then check scalars
    fn check_dimension(
        &self,
        column: &Column,
        value: &str,
        separators: &[char],
        report: &mut RecordReport,
    ) {
        // for compound columns the innermost separator splits members
        let is_compound = matches!(
            column.ctype.restriction,
            Some(Restriction::Compound(_))
        );
        match separators {
            [] => self.check_scalar(column, value, report),
            [last] if is_compound => self.check_compound(column, value, *last, report),
            [first, rest @ ..] => {
                for element in value.split(*first) {
                    self.check_dimension(column, element, rest, report);
                }
            }
        }
    }

    fn check_scalar(&self, column: &Column, value: &str, report: &mut RecordReport) {
        if !self.model.type_table.is_valid(column.ctype.primitive, value) {
            report.error(
                &column.name,
                FindingCode::TypeMismatch,
                format!(
                    "'{value}' is not a valid {}",
                    column.ctype.primitive.tag()
                ),
            );
            return;
        }
        match &column.ctype.restriction {
            Some(Restriction::Cv(cv_id)) => match self.model.cv_validate(cv_id, value) {
                Ok(true) => {}
                Ok(false) => report.error(
                    &column.name,
                    FindingCode::NotInCv,
                    format!("'{value}' not in CV '{cv_id}'"),
                ),
                Err(ModelError::CvUnresolved { cv }) => report.warning(
                    &column.name,
                    FindingCode::CvUnresolved,
                    format!("CV '{cv}' is unresolved"),
                ),
                Err(e) => report.error(&column.name, FindingCode::NotInCv, e.to_string()),
            },
            Some(Restriction::Pattern(name)) => {
                let matched = self
                    .model
                    .patterns
                    .get(name)
                    .map(|re| re.is_match(value))
                    .unwrap_or(false);
                if !matched {
                    report.error(
                        &column.name,
                        FindingCode::PatternMismatch,
                        format!("'{value}' does not match pattern '{name}'"),
                    );
                }
            }
            Some(Restriction::Compound(name)) => {
                // compound without a separator ladder: single-member only
                self.check_compound_members(column, name, &[value], report);
            }
            None => {}
        }
    }

    fn check_compound(
        &self,
        column: &Column,
        value: &str,
        separator: char,
        report: &mut RecordReport,
    ) {
        let Some(Restriction::Compound(name)) = &column.ctype.restriction else {
            return self.check_scalar(column, value, report);
        };
        let members: Vec<&str> = value.split(separator).collect();
        self.check_compound_members(column, name, &members, report);
    }

    fn check_compound_members(
        &self,
        column: &Column,
        compound_name: &str,
        members: &[&str],
        report: &mut RecordReport,
    ) {
        let Some(compound) = self.model.compound_types.get(compound_name) else {
            return;
        };
        if members.len() != compound.columns.len() {
            report.error(
                &column.name,
                FindingCode::TypeMismatch,
                format!(
                    "compound '{compound_name}' expects {} members, got {}",
                    compound.columns.len(),
                    members.len()
                ),
            );
            return;
        }
        for (member_column, member_value) in compound.columns.iter().zip(members) {
            self.check_dimension(
                member_column,
                member_value,
                &member_column.ctype.separators,
                report,
            );
        }
    }
}

/// Batch driver for bulk ingest validation
///
/// Processes records batch by batch; the sink receives each finished batch
/// and returns whether to continue, so ingest is cancellable between
/// batches but never inside one.
pub struct BatchValidator<'a> {
    validator: RecordValidator<'a>,
    batch_size: usize,
}

impl<'a> BatchValidator<'a> {
    pub fn new(validator: RecordValidator<'a>, batch_size: usize) -> Self {
        Self {
            validator,
            batch_size: batch_size.max(1),
        }
    }

    /// Validate all records, reporting per batch. Returns the number of
    /// records processed.
    pub fn run<I>(&self, records: I, mut sink: impl FnMut(&[RecordReport]) -> bool) -> usize
    where
        I: IntoIterator<Item = HashMap<String, String>>,
    {
        let mut processed = 0usize;
        let mut batch: Vec<RecordReport> = Vec::with_capacity(self.batch_size);
        for (row, record) in records.into_iter().enumerate() {
            batch.push(self.validator.validate_record(row, &record));
            processed += 1;
            if batch.len() == self.batch_size {
                let keep_going = sink(&batch);
                batch.clear();
                if !keep_going {
                    return processed;
                }
            }
        }
        if !batch.is_empty() {
            sink(&batch);
        }
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{build_model, CvSource, LoadOptions};

    struct NoCvs;
    impl CvSource for NoCvs {
        fn read(&mut self, path: &str) -> Result<Vec<u8>> {
            Err(ModelError::corrupt(path, "no CV source"))
        }
    }

    fn model() -> Model {
        let xml = r#"<model project="demo" schemaVer="1">
  <collections><collection name="main" path="db.main"/></collections>
  <patterns><pattern name="accession">^EGA[0-9]+$</pattern></patterns>
  <cvs>
    <cv id="nullCV"><term key="-"/><term key="NA"/></cv>
    <cv id="sex"><term key="m" name="Male"/><term key="f" name="Female"/></cv>
  </cvs>
  <compoundTypes>
    <compoundType name="interval">
      <column name="start" type="integer" use="required"/>
      <column name="end" type="integer" use="required"/>
    </compoundType>
  </compoundTypes>
  <conceptDomain name="s" fullName="Samples">
    <concept name="donor" fullName="Donor" collection="main">
      <column name="id" type="string" use="idref" pattern="accession"/>
      <column name="sex" type="string" use="required" cv="sex"/>
      <column name="age" type="integer"/>
      <column name="regions" type="compound" compound="interval" arraySep=";:"/>
    </concept>
  </conceptDomain>
</model>"#;
        build_model(
            xml.as_bytes(),
            b"schema".to_vec(),
            &mut NoCvs,
            &LoadOptions::default(),
            None,
        )
        .unwrap()
    }

    fn record(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_clean_record() {
        let model = model();
        let validator = RecordValidator::new(&model, "s", "donor").unwrap();
        let report = validator.validate_record(
            0,
            &record(&[
                ("id", "EGA1"),
                ("sex", "m"),
                ("age", "41"),
                ("regions", "1:10;20:30"),
            ]),
        );
        assert!(report.is_clean(), "findings: {:?}", report.errors);
    }

    #[test]
    fn test_required_and_null_findings() {
        let model = model();
        let validator = RecordValidator::new(&model, "s", "donor").unwrap();

        let report = validator.validate_record(0, &record(&[("id", "EGA1"), ("sex", "-")]));
        assert!(report
            .errors
            .iter()
            .any(|f| f.code == FindingCode::NullInRequired));

        let report = validator.validate_record(1, &record(&[("id", "EGA1")]));
        assert!(report
            .errors
            .iter()
            .any(|f| f.code == FindingCode::MissingRequired && f.column == "sex"));
    }

    #[test]
    fn test_cv_pattern_and_type_findings() {
        let model = model();
        let validator = RecordValidator::new(&model, "s", "donor").unwrap();
        let report = validator.validate_record(
            0,
            &record(&[
                ("id", "XYZ"),
                ("sex", "x"),
                ("age", "forty"),
                ("extra", "?"),
            ]),
        );
        let codes: Vec<FindingCode> = report.errors.iter().map(|f| f.code).collect();
        assert!(codes.contains(&FindingCode::PatternMismatch));
        assert!(codes.contains(&FindingCode::NotInCv));
        assert!(codes.contains(&FindingCode::TypeMismatch));
        assert!(report
            .warnings
            .iter()
            .any(|f| f.code == FindingCode::UnknownColumn));
    }

    #[test]
    fn test_compound_member_count() {
        let model = model();
        let validator = RecordValidator::new(&model, "s", "donor").unwrap();
        let report = validator.validate_record(
            0,
            &record(&[("id", "EGA1"), ("sex", "f"), ("regions", "1:2:3")]),
        );
        assert!(report
            .errors
            .iter()
            .any(|f| f.code == FindingCode::TypeMismatch && f.column == "regions"));
    }

    #[test]
    fn test_batch_driver_cancellation() {
        let model = model();
        let validator = RecordValidator::new(&model, "s", "donor").unwrap();
        let driver = BatchValidator::new(validator, 10);
        let records = (0..35).map(|_| record(&[("id", "EGA1"), ("sex", "m")]));

        let mut batches = 0;
        let processed = driver.run(records, |batch| {
            batches += 1;
            assert!(batch.len() <= 10);
            batches < 2 // cancel after the second batch
        });
        assert_eq!(batches, 2);
        assert_eq!(processed, 20);
    }
}
