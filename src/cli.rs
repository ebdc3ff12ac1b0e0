use std::path::PathBuf;

use clap::Parser;

use dep_doctor::models::RiskLevel;
use dep_doctor::scanner::ScannerKind;

#[derive(Parser, Debug)]
#[command(
    name = "dep-doctor",
    about = "Diagnose and repair dependency health problems in JavaScript/TypeScript projects",
    version
)]
pub struct Cli {
    /// Project path to scan
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Config file [default: ./.dep-doctor/config.toml, fallback ~/.config/dep-doctor/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run only this scanner (repeatable) [default: all enabled in config]
    #[arg(long = "scanner", value_name = "KIND")]
    pub scanners: Vec<ScannerKind>,

    /// Skip the scanners that need network access (outdated, security)
    #[arg(long)]
    pub offline: bool,

    /// Report format
    #[arg(long, default_value = "terminal", value_name = "FORMAT")]
    pub report: ReportFormat,

    /// Apply suggested fixes up to --max-risk
    #[arg(long)]
    pub fix: bool,

    /// Print suggested fixes without applying them
    #[arg(long)]
    pub dry_run: bool,

    /// Highest risk level of fix to include
    #[arg(long, default_value = "medium", value_name = "LEVEL")]
    pub max_risk: RiskArg,

    /// Show low-severity issues too; repeat for debug logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print summary line
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum RiskArg {
    Low,
    Medium,
    High,
    Critical,
}

impl From<RiskArg> for RiskLevel {
    fn from(arg: RiskArg) -> Self {
        match arg {
            RiskArg::Low => RiskLevel::Low,
            RiskArg::Medium => RiskLevel::Medium,
            RiskArg::High => RiskLevel::High,
            RiskArg::Critical => RiskLevel::Critical,
        }
    }
}
