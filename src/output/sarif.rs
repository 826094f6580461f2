use std::collections::BTreeMap;

use crate::error::Result;
use crate::rules::{Report, RuleRef};

use serde_json::{json, Value};

/// Render reports as SARIF 2.1.0.
///
/// Matched critical rules become `error` results and missing hardening
/// becomes `note` results. Passed rules are not reported.
pub fn render(reports: &[Report]) -> Result<String> {
    let mut rules: BTreeMap<&str, Value> = BTreeMap::new();
    let mut results: Vec<Value> = Vec::new();

    for report in reports {
        let findings = report
            .scoring
            .critical
            .iter()
            .map(|r| (r, "error"))
            .chain(report.scoring.advise.iter().map(|r| (r, "note")));

        for (rule, level) in findings {
            rules.entry(rule.id.as_str()).or_insert_with(|| rule_descriptor(rule, level));
            results.push(json!({
                "ruleId": rule.id,
                "level": level,
                "message": { "text": format!("{}: {}", report.object, rule.reason) },
                "locations": [{
                    "physicalLocation": {
                        "artifactLocation": { "uri": report.file_name },
                    },
                    "logicalLocations": [{ "name": report.object }],
                }],
                "properties": { "points": rule.points },
            }));
        }
    }

    let sarif = json!({
        "$schema": "https://docs.oasis-open.org/sarif/sarif/v2.1.0/errata01/os/schemas/sarif-schema-2.1.0.json",
        "version": "2.1.0",
        "runs": [{
            "tool": {
                "driver": {
                    "name": "kubesec",
                    "informationUri": "https://kubesec.io",
                    "version": env!("CARGO_PKG_VERSION"),
                    "semanticVersion": env!("CARGO_PKG_VERSION"),
                    "rules": rules.into_values().collect::<Vec<_>>(),
                },
            },
            "results": results,
        }],
    });

    let mut output = serde_json::to_string_pretty(&sarif)?;
    output.push('\n');
    Ok(output)
}

fn rule_descriptor(rule: &RuleRef, level: &str) -> Value {
    let mut descriptor = json!({
        "id": rule.id,
        "name": rule.id,
        "shortDescription": { "text": rule.selector },
        "fullDescription": { "text": rule.reason },
        "defaultConfiguration": { "level": level },
    });
    if !rule.link.is_empty() {
        descriptor["helpUri"] = json!(rule.link);
    }
    descriptor
}
