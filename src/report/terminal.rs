use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::models::{
    AnalysisResult, DependencyIssue, FixApplicationResult, FixSuggestion, RiskLevel,
    SecurityIssue, SecuritySeverity, Severity,
};

/// Render the analysis: header, summary box, then issue and vulnerability tables.
pub fn render_analysis(analysis: &AnalysisResult, verbose: bool, quiet: bool) {
    let critical = count_issues(&analysis.issues, Severity::Critical);
    let high = count_issues(&analysis.issues, Severity::High);
    let other = analysis.issues.len() - critical - high;
    let vulns = analysis.security_vulnerabilities.len();

    if quiet {
        println!(
            "Health: {}  Issues: {}  Critical: {}  Vulnerabilities: {}",
            score_colored(analysis.health_score),
            analysis.issues.len(),
            critical.to_string().red(),
            vulns.to_string().magenta(),
        );
        return;
    }

    println!("\n {} v{}", "dep-doctor".bold(), env!("CARGO_PKG_VERSION"));
    println!(
        " Project: {}@{} ({})",
        analysis.project.name, analysis.project.version, analysis.package_manager
    );
    println!(" Path:    {}\n", analysis.project.path.display());

    println!(" ┌────────────────────────────────────────────────────┐");
    println!(" │  {:<48} │", "SUMMARY".bold());
    println!(
        " │  {:<48} │",
        format!(
            "Declared           : {} (+{} dev)",
            analysis.project.dependency_count, analysis.project.dev_dependency_count
        )
    );
    println!(
        " │  {:<48} │",
        format!("Installed          : {}", analysis.project.installed_count)
    );
    println!(
        " │  {:<48} │",
        format!("{}  Critical        : {:>4}", "✗".red(), critical)
    );
    println!(
        " │  {:<48} │",
        format!("{}  High            : {:>4}", "⚠".yellow(), high)
    );
    println!(
        " │  {:<48} │",
        format!("{}  Medium / Low    : {:>4}", "·".dimmed(), other)
    );
    println!(
        " │  {:<48} │",
        format!("{}  Vulnerabilities : {:>4}", "☣".magenta(), vulns)
    );
    println!(" └────────────────────────────────────────────────────┘");
    println!(" Health score: {}/100\n", score_colored(analysis.health_score));

    let shown: Vec<&DependencyIssue> = analysis
        .issues
        .iter()
        .filter(|i| verbose || i.severity >= Severity::Medium)
        .collect();
    if !shown.is_empty() {
        println!(" {} Dependency issues:\n", "[ISSUES]".yellow().bold());
        render_issue_table(&shown);
        println!();
    }
    let hidden = analysis.issues.len() - shown.len();
    if hidden > 0 {
        println!(" {} low-severity issues hidden; use --verbose to list them\n", hidden);
    }

    if vulns > 0 {
        println!(" {} Known vulnerabilities:\n", "[SECURITY]".red().bold());
        render_vulnerability_table(&analysis.security_vulnerabilities);
        println!();
    }

    if analysis.issues.is_empty() && vulns == 0 {
        println!(" {} No problems found.\n", "✓".green());
    }
}

fn render_issue_table(issues: &[&DependencyIssue]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Kind").add_attribute(Attribute::Bold),
            Cell::new("Severity").add_attribute(Attribute::Bold),
            Cell::new("Installed").add_attribute(Attribute::Bold),
            Cell::new("Wanted").add_attribute(Attribute::Bold),
            Cell::new("Details").add_attribute(Attribute::Bold),
            Cell::new("Fixable").add_attribute(Attribute::Bold),
        ]);

    for issue in issues {
        let wanted = issue
            .latest_version
            .as_deref()
            .or(issue.expected_version.as_deref())
            .unwrap_or("-");
        table.add_row(vec![
            Cell::new(&issue.package_name),
            Cell::new(issue.kind.to_string()),
            Cell::new(issue.severity.to_string()).fg(severity_color(issue.severity)),
            Cell::new(issue.current_version.as_deref().unwrap_or("-")),
            Cell::new(wanted),
            Cell::new(&issue.description),
            Cell::new(if issue.fixable { "yes" } else { "no" }).set_alignment(CellAlignment::Center),
        ]);
    }

    println!("{}", table);
}

fn render_vulnerability_table(vulns: &[SecurityIssue]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Version").add_attribute(Attribute::Bold),
            Cell::new("Advisory").add_attribute(Attribute::Bold),
            Cell::new("Severity").add_attribute(Attribute::Bold),
            Cell::new("CVSS").add_attribute(Attribute::Bold),
            Cell::new("Fixed in").add_attribute(Attribute::Bold),
            Cell::new("Title").add_attribute(Attribute::Bold),
        ]);

    for vuln in vulns {
        let color = match vuln.severity {
            SecuritySeverity::Critical => Color::Red,
            SecuritySeverity::High => Color::Magenta,
            SecuritySeverity::Moderate => Color::Yellow,
            SecuritySeverity::Low => Color::DarkGrey,
        };
        table.add_row(vec![
            Cell::new(&vuln.package_name),
            Cell::new(&vuln.version),
            Cell::new(&vuln.vulnerability.id),
            Cell::new(vuln.severity.to_string()).fg(color),
            Cell::new(format!("{:.1}", vuln.vulnerability.cvss_score)).set_alignment(CellAlignment::Right),
            Cell::new(vuln.fixed_in_version.as_deref().unwrap_or("none")),
            Cell::new(&vuln.vulnerability.title),
        ]);
    }

    println!("{}", table);
}

/// List the suggested fixes in application order.
pub fn render_suggestions(suggestions: &[FixSuggestion]) {
    if suggestions.is_empty() {
        println!(" {} Nothing to fix.\n", "✓".green());
        return;
    }

    println!(" {} Suggested fixes:\n", "[FIX]".cyan().bold());
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Fix").add_attribute(Attribute::Bold),
            Cell::new("Risk").add_attribute(Attribute::Bold),
            Cell::new("Actions").add_attribute(Attribute::Bold),
            Cell::new("Impact").add_attribute(Attribute::Bold),
        ]);

    for (i, suggestion) in suggestions.iter().enumerate() {
        let actions: Vec<String> = suggestion.actions.iter().map(ToString::to_string).collect();
        table.add_row(vec![
            Cell::new(i + 1).set_alignment(CellAlignment::Right),
            Cell::new(&suggestion.description),
            Cell::new(suggestion.risk.to_string()).fg(risk_color(suggestion.risk)),
            Cell::new(actions.join("\n")),
            Cell::new(&suggestion.estimated_impact),
        ]);
    }

    println!("{}\n", table);
}

pub fn render_fix_result(result: &FixApplicationResult) {
    if let Some(backup) = &result.backup {
        println!(
            " Manifest backed up to {} ({})",
            backup.backup_path.display(),
            backup.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
    }

    for fix in &result.applied_fixes {
        println!("  {} {}", "✓".green(), fix.description);
    }
    for error in &result.errors {
        println!("  {} {}", "✗".red(), error);
    }
    if result.rolled_back {
        println!(
            " {} a critical fix failed; the manifest was restored from the backup",
            "[ROLLBACK]".red().bold()
        );
    }

    let status = if result.success {
        "all fixes applied".green().bold()
    } else {
        "some fixes failed".red().bold()
    };
    println!(
        "\n {} ({} applied, {} errors)\n",
        status,
        result.applied_fixes.len(),
        result.errors.len()
    );
}

fn count_issues(issues: &[DependencyIssue], severity: Severity) -> usize {
    issues.iter().filter(|i| i.severity == severity).count()
}

fn score_colored(score: u8) -> ColoredString {
    let text = score.to_string();
    match score {
        80..=100 => text.green().bold(),
        50..=79 => text.yellow().bold(),
        _ => text.red().bold(),
    }
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Critical => Color::Red,
        Severity::High => Color::Magenta,
        Severity::Medium => Color::Yellow,
        Severity::Low => Color::DarkGrey,
    }
}

fn risk_color(risk: RiskLevel) -> Color {
    match risk {
        RiskLevel::Critical => Color::Red,
        RiskLevel::High => Color::Magenta,
        RiskLevel::Medium => Color::Yellow,
        RiskLevel::Low => Color::Green,
    }
}
