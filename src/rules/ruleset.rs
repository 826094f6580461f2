use rayon::prelude::*;
use serde_json::Value;

use crate::error::{KubesecError, Result};
use crate::manifest::{document_name, parse_documents};
use crate::schema::{KubeSchemaValidator, SchemaConfig, SchemaValidator, ValidationStatus};

use super::{builtin, Evaluation, Report, Rule, RuleRef, RuleScoring};

pub const NOT_SUPPORTED_MESSAGE: &str = "This resource kind is not supported by kubesec";

/// The rule catalogue plus schema validation, run once per document.
pub struct Ruleset {
    rules: Vec<Rule>,
    schema: SchemaConfig,
    validator: Option<Box<dyn SchemaValidator>>,
}

impl Ruleset {
    /// Build a ruleset validating against the configured schema locations.
    pub fn new(schema: SchemaConfig) -> Self {
        let validator: Option<Box<dyn SchemaValidator>> = if schema.disable_validation {
            None
        } else {
            Some(Box::new(KubeSchemaValidator::new(&schema)))
        };
        Self {
            rules: builtin::all_rules(),
            schema,
            validator,
        }
    }

    /// Build a ruleset around a caller-supplied validator.
    pub fn with_validator(schema: SchemaConfig, validator: Box<dyn SchemaValidator>) -> Self {
        Self {
            rules: builtin::all_rules(),
            schema,
            validator: Some(validator),
        }
    }

    /// The catalogue, sorted by id.
    pub fn rules(&self) -> Vec<&Rule> {
        let mut rules: Vec<&Rule> = self.rules.iter().collect();
        rules.sort_by_key(|r| r.id);
        rules
    }

    /// Scan every document of a manifest. Reports come back in document
    /// order.
    pub fn run(&self, file_name: &str, bytes: &[u8]) -> Result<Vec<Report>> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| KubesecError::InvalidInput(format!("{file_name}: {e}")))?;
        let documents = parse_documents(file_name, text)?;

        Ok(documents
            .iter()
            .map(|document| self.generate_report(file_name, document))
            .collect())
    }

    /// Validate one document, then score it against every applicable rule.
    pub fn generate_report(&self, file_name: &str, document: &Value) -> Report {
        let mut report = Report {
            object: document_name(document),
            file_name: file_name.to_string(),
            ..Report::default()
        };

        if let Some(message) = self.schema_errors(file_name, document) {
            report.message = message;
            return report;
        }
        report.valid = true;

        // collect() is the join point; results stay in catalogue order
        let evaluations: Vec<(&Rule, Evaluation)> = self
            .rules
            .par_iter()
            .map(|rule| (rule, rule.eval(document)))
            .collect();

        let mut seen: Vec<RuleRef> = Vec::new();
        let mut scoring = RuleScoring::default();
        let mut score = 0;

        for (rule, evaluation) in evaluations {
            let count = match evaluation {
                Evaluation::Applicable(count) => count,
                Evaluation::NotApplicable { .. } => continue,
                Evaluation::Error(error) => {
                    tracing::warn!(rule = rule.id, object = %report.object, %error, "rule evaluation failed");
                    continue;
                }
            };

            let rule_ref = rule.to_ref(count);
            if seen.contains(&rule_ref) {
                continue;
            }
            seen.push(rule_ref.clone());

            match (count > 0, rule.points >= 0) {
                (true, true) => {
                    score += rule.points;
                    scoring.passed.push(rule_ref);
                }
                (true, false) => {
                    score += rule.points;
                    scoring.critical.push(rule_ref);
                }
                (false, true) => scoring.advise.push(rule_ref),
                // the dangerous condition is absent
                (false, false) => {}
            }
        }

        report.message = if seen.is_empty() {
            NOT_SUPPORTED_MESSAGE.to_string()
        } else if score >= 0 {
            format!("Passed with a score of {score} points")
        } else {
            format!("Failed with a score of {score} points")
        };
        report.score = score;
        scoring.sort();
        report.scoring = scoring;
        report
    }

    /// Concatenated validation messages, or `None` when the document passed
    /// (or validation is off).
    fn schema_errors(&self, file_name: &str, document: &Value) -> Option<String> {
        if self.schema.disable_validation {
            return None;
        }
        let validator = self.validator.as_ref()?;

        let mut message = String::new();
        for result in validator.validate(file_name, document) {
            match result.status {
                ValidationStatus::Invalid => {
                    message.push_str(&result.message);
                    message.push('\n');
                }
                ValidationStatus::Error => message.push_str(&result.message),
                ValidationStatus::Valid | ValidationStatus::Skipped => {}
            }
        }
        (!message.is_empty()).then_some(message)
    }
}
