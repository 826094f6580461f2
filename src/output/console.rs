use crate::rules::{Report, Rule, RuleRef};

/// Render reports as a plain-text summary, one block per object.
pub fn render(reports: &[Report]) -> String {
    let mut output = String::new();

    if reports.is_empty() {
        output.push_str("\n  No resources scanned.\n\n");
        return output;
    }

    for report in reports {
        let status = if report.passed() { "PASS" } else { "FAIL" };
        output.push_str(&format!(
            "\n  {} {} (score: {})\n",
            status, report.object, report.score
        ));
        output.push_str(&format!("           file: {}\n", report.file_name));
        if !report.message.is_empty() {
            for line in report.message.lines() {
                output.push_str(&format!("           {line}\n"));
            }
        }

        push_bucket(&mut output, "[CRITICAL]", &report.scoring.critical);
        push_bucket(&mut output, "[PASSED]  ", &report.scoring.passed);
        push_bucket(&mut output, "[ADVISE]  ", &report.scoring.advise);
    }
    output.push('\n');

    output
}

fn push_bucket(output: &mut String, tag: &str, bucket: &[RuleRef]) {
    for rule in bucket {
        output.push_str(&format!(
            "  {} {:<36} {:>4}  {}\n",
            tag, rule.id, rule.points, rule.reason
        ));
    }
}

/// Render the rule catalogue as a table.
pub fn render_rules(rules: &[&Rule]) -> String {
    let mut output = format!(
        "{:<36} {:>6} {:>6}  {:<24} SELECTOR\n",
        "ID", "POINTS", "ADVISE", "KINDS"
    );
    output.push_str(&"-".repeat(100));
    output.push('\n');
    for rule in rules {
        output.push_str(&format!(
            "{:<36} {:>6} {:>6}  {:<24} {}\n",
            rule.id,
            rule.points,
            rule.advise,
            rule.kinds.join(","),
            rule.selector,
        ));
    }
    output
}
