//! `dep-doctor`: scan a JavaScript/TypeScript project for dependency problems and fix them.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]) and install the logger ([`logging`]).
//! 2. Load config ([`config::load_config`]) and pick the scanners to run.
//! 3. Analyze the project ([`DependencyAnalyzer`]).
//! 4. Optionally generate and apply fixes (`--fix`, `--dry-run`, [`AutoFixer`]).
//! 5. Render the requested report.
//! 6. Exit `0` (healthy), `1` (critical finding or failed fix) or `2` (could not run).

mod cli;
mod logging;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;

use cli::{Cli, ReportFormat};
use dep_doctor::adapter;
use dep_doctor::analyzer::DependencyAnalyzer;
use dep_doctor::config::load_config;
use dep_doctor::fixer::AutoFixer;
use dep_doctor::models::{FixApplicationResult, FixSuggestion, RiskLevel};
use dep_doctor::report;
use dep_doctor::scanner::ScannerKind;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            std::process::exit(2);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let path = cli
        .path
        .canonicalize()
        .unwrap_or_else(|_| cli.path.clone());

    let mut config = load_config(&path, cli.config.as_deref())?;

    let mut kinds: Vec<ScannerKind> = if cli.scanners.is_empty() {
        config.scanners.enabled.clone()
    } else {
        cli.scanners.clone()
    };
    if cli.offline {
        if !cli.scanners.is_empty() {
            for kind in kinds.iter().filter(|k| k.is_online()) {
                warn!("--offline skips the {} scanner", kind);
            }
        }
        kinds.retain(|k| !k.is_online());
    }
    kinds.sort();
    kinds.dedup();
    config.scanners.enabled = kinds.clone();

    let json = cli.report == ReportFormat::Json;
    let analyzer = DependencyAnalyzer::from_config(&config)?;

    let spinner = (!cli.quiet && !json).then(|| {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(format!("Scanning {} ...", path.display()));
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let analysis = analyzer.analyze_with(&path, Some(&kinds)).await;
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }
    let analysis = analysis?;

    let mut suggestions: Option<Vec<FixSuggestion>> = None;
    let mut fix_result: Option<FixApplicationResult> = None;

    if cli.fix || cli.dry_run {
        let adapter = adapter::detect(&path, config.fix.command_timeout());
        let fixer = AutoFixer::new(adapter, &path).with_backup_dir(config.fix.backup_dir.clone());
        let max_risk = RiskLevel::from(cli.max_risk);

        let all = fixer.generate_fixes(&analysis);
        let skipped = all.iter().filter(|s| s.risk > max_risk).count();
        if skipped > 0 && !cli.quiet {
            eprintln!(
                "  {} {} fix(es) above {} risk left out; raise --max-risk to include them",
                "→".cyan(),
                skipped,
                max_risk
            );
        }
        let selected: Vec<FixSuggestion> = all.into_iter().filter(|s| s.risk <= max_risk).collect();

        if cli.fix && !cli.dry_run && !selected.is_empty() {
            fix_result = Some(fixer.apply_fixes(&selected));
        }
        suggestions = Some(selected);
    }

    match cli.report {
        ReportFormat::Terminal => {
            report::terminal::render_analysis(&analysis, cli.verbose > 0, cli.quiet);
            if !cli.quiet {
                if let Some(suggestions) = &suggestions {
                    report::terminal::render_suggestions(suggestions);
                }
            }
            if let Some(result) = &fix_result {
                report::terminal::render_fix_result(result);
            }
        }
        ReportFormat::Json => {
            println!(
                "{}",
                report::json::render(&analysis, suggestions.as_deref(), fix_result.as_ref())?
            );
        }
    }

    let fix_failed = fix_result.as_ref().map_or(false, |r| !r.success);
    if analysis.has_critical() || fix_failed {
        return Ok(1);
    }
    Ok(0)
}
