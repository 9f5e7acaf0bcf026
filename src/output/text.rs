//! Human-friendly text output formatting
//!
//! Used when --format text is specified.

use super::types::*;

/// Format GenInputsSummary as human-readable text
pub fn format_gen_inputs_summary(summary: &GenInputsSummary) -> String {
    let mut output = String::new();

    output.push_str(&format!("Regexes read:      {}\n", summary.n_regexes));
    output.push_str(&format!("Inputs generated:  {}\n", summary.n_completed));
    output.push_str(&format!("Failures:          {}\n", summary.n_failed));
    output.push_str(&format!("Unique inputs:     {}\n", summary.n_unique_inputs));
    output.push('\n');
    output.push_str(&format!("Wrote {}\n", summary.out_file));

    output
}

/// Format TestSummary as human-readable text
pub fn format_test_summary(summary: &TestSummary) -> String {
    let mut output = String::new();

    output.push_str(&format!("Regexes read:      {}\n", summary.n_regexes));
    output.push_str(&format!("Completed:         {}\n", summary.n_completed));
    output.push_str(&format!("Failures:          {}\n", summary.n_failed));
    output.push_str(&format!(
        "With witnesses:    {} ({:.2}%)\n",
        summary.n_with_witnesses, summary.pct_with_witnesses
    ));
    output.push('\n');
    output.push_str(&format!("Wrote {}\n", summary.out_file));

    output
}

/// Format AnalyzeReport as human-readable text
pub fn format_analyze_report(report: &AnalyzeReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("Analyzed {} regexes\n", report.n_regexes));

    output.push_str("\nUnique inputs tested per regex:\n");
    let stats = &report.input_stats;
    output.push_str(&format!("  count:  {}\n", stats.count));
    output.push_str(&format!("  mean:   {:.1}\n", stats.mean));
    output.push_str(&format!("  min:    {}\n", stats.min));
    output.push_str(&format!("  median: {:.1}\n", stats.median));
    output.push_str(&format!("  max:    {}\n", stats.max));

    output.push_str("\nWitness kinds:\n");
    let n = report.n_regexes.max(1) as f64;
    let counts = &report.witness_counts;
    output.push_str(&format!(
        "  {:<22} {:>10} {:>10}\n",
        "Kind", "Regexes", "Percent"
    ));
    for (label, count) in [
        ("no witness", counts.no_witness),
        ("any witness", counts.any_witness),
        ("match witness", counts.match_witness),
        ("substring witness", counts.substring_witness),
        ("capture witness", counts.capture_witness),
    ] {
        output.push_str(&format!(
            "  {:<22} {:>10} {:>9.1}%\n",
            label,
            count,
            100.0 * count as f64 / n
        ));
    }

    if report.language_pairs.is_empty() {
        output.push_str("\nNo language-pair disagreements\n");
    } else {
        output.push_str("\nLanguage-pair disagreements:\n");
        output.push_str(&format!(
            "  {:<28} {:>8} {:>8} {:>10} {:>8}\n",
            "Pair", "Any", "Match", "Substring", "Capture"
        ));
        for pair in &report.language_pairs {
            output.push_str(&format!(
                "  {:<28} {:>8} {:>8} {:>10} {:>8}\n",
                format!("{} - {}", pair.language_a, pair.language_b),
                pair.witnesses,
                pair.match_witnesses,
                pair.substring_witnesses,
                pair.capture_witnesses
            ));
        }
    }

    if !report.causes.is_empty() {
        output.push_str("\nCauses of disagreement:\n");
        for cause in &report.causes {
            output.push_str(&format!("  {:<38} {:>8}\n", cause.cause, cause.count));
        }
    }

    if !report.unexplained.is_empty() {
        output.push_str(&format!(
            "\n{} regex{} with unexplained witnesses:\n",
            report.unexplained.len(),
            if report.unexplained.len() == 1 {
                ""
            } else {
                "es"
            }
        ));
        for regex in &report.unexplained {
            output.push_str(&format!(
                "  /{}/ with {}/{} witnesses unexplained\n",
                regex.pattern, regex.n_unexplained, regex.n_witnesses
            ));
            for input in &regex.inputs {
                output.push_str(&format!("    input: {:?}\n", input));
            }
        }
    }

    output
}
