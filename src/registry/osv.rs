use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use semver::Version;

use super::{Advisory, AdvisorySource};
use crate::version::parse_version;

pub const DEFAULT_OSV_URL: &str = "https://api.osv.dev/v1/query";

#[derive(Debug, Serialize)]
struct OsvQuery<'a> {
    package: OsvPackage<'a>,
    version: &'a str,
}

#[derive(Debug, Serialize)]
struct OsvPackage<'a> {
    name: &'a str,
    ecosystem: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct OsvResponse {
    #[serde(default)]
    vulns: Vec<OsvVulnerability>,
}

#[derive(Debug, Deserialize)]
struct OsvVulnerability {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    severity: Vec<OsvSeverity>,
    #[serde(default)]
    affected: Vec<OsvAffected>,
    #[serde(default)]
    references: Vec<OsvReference>,
    #[serde(default)]
    database_specific: Option<OsvDatabaseSpecific>,
}

#[derive(Debug, Deserialize)]
struct OsvSeverity {
    #[serde(rename = "type")]
    kind: String,
    score: String,
}

#[derive(Debug, Deserialize)]
struct OsvAffected {
    #[serde(default)]
    ranges: Vec<OsvRange>,
}

#[derive(Debug, Deserialize)]
struct OsvRange {
    #[serde(default)]
    events: Vec<OsvEvent>,
}

#[derive(Debug, Deserialize)]
struct OsvEvent {
    #[serde(default)]
    introduced: Option<String>,
    #[serde(default)]
    fixed: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OsvReference {
    url: String,
}

#[derive(Debug, Deserialize)]
struct OsvDatabaseSpecific {
    #[serde(default)]
    cwe_ids: Vec<String>,
    #[serde(default)]
    severity: Option<String>,
}

/// Client for the OSV `query` endpoint, restricted to the npm ecosystem.
#[derive(Clone)]
pub struct OsvClient {
    client: Client,
    url: String,
}

impl OsvClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub async fn query(&self, name: &str, version: &str) -> Result<Vec<Advisory>> {
        let body = OsvQuery {
            package: OsvPackage {
                name,
                ecosystem: "npm",
            },
            version,
        };

        let response = self.client.post(&self.url).json(&body).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("OSV query for {}@{} returned {}", name, version, response.status());
        }

        let data: OsvResponse = response.json().await?;
        Ok(data
            .vulns
            .into_iter()
            .map(|vuln| to_advisory(vuln, version))
            .collect())
    }
}

impl AdvisorySource for OsvClient {
    fn advisories<'a>(
        &'a self,
        name: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Advisory>>> {
        self.query(name, version).boxed()
    }
}

fn to_advisory(vuln: OsvVulnerability, installed: &str) -> Advisory {
    let label = vuln
        .database_specific
        .as_ref()
        .and_then(|d| d.severity.as_deref());
    let cvss_score = vuln
        .severity
        .iter()
        .find_map(|s| score_from(&s.kind, &s.score))
        .or_else(|| label.map(score_from_label))
        .unwrap_or(5.0);

    let fixed_in = fixed_for(&vuln.affected, installed);

    let summary = vuln.summary.unwrap_or_default();
    let title = if summary.is_empty() {
        vuln.id.clone()
    } else {
        summary
    };

    Advisory {
        title,
        description: vuln.details.unwrap_or_default(),
        cvss_score,
        cwe_ids: vuln
            .database_specific
            .map(|d| d.cwe_ids)
            .unwrap_or_default(),
        references: vuln.references.into_iter().map(|r| r.url).collect(),
        fixed_in,
        id: vuln.id,
    }
}

/// The release that fixes `installed`: the `fixed` event closing the range
/// that contains it, else the lowest fix above it. Falls back to the first
/// fix listed when `installed` is not a version.
fn fixed_for(affected: &[OsvAffected], installed: &str) -> Option<String> {
    let fixes = affected.iter().flat_map(|a| a.ranges.iter()).flat_map(|r| {
        let mut introduced: Option<&str> = None;
        r.events.iter().filter_map(move |e| {
            if let Some(start) = e.introduced.as_deref() {
                introduced = Some(start);
            }
            e.fixed.as_deref().map(|fixed| (introduced, fixed))
        })
    });

    let Some(current) = parse_version(installed) else {
        return fixes.map(|(_, fixed)| fixed.to_string()).next();
    };

    let mut lowest_above: Option<(Version, &str)> = None;
    for (introduced, fixed) in fixes {
        let Some(fixed_version) = parse_version(fixed) else { continue };
        if fixed_version <= current {
            continue;
        }
        let opened = introduced
            .and_then(parse_version)
            .map_or(true, |start| start <= current);
        if opened {
            return Some(fixed.to_string());
        }
        if lowest_above.as_ref().map_or(true, |(lowest, _)| fixed_version < *lowest) {
            lowest_above = Some((fixed_version, fixed));
        }
    }
    lowest_above.map(|(_, fixed)| fixed.to_string())
}

fn score_from(kind: &str, score: &str) -> Option<f64> {
    if let Ok(numeric) = score.parse::<f64>() {
        return Some(numeric.clamp(0.0, 10.0));
    }
    match kind {
        "CVSS_V3" => cvss3_base_score(score),
        _ => None,
    }
}

/// Representative scores for advisory databases that only publish a label.
fn score_from_label(label: &str) -> f64 {
    match label.to_ascii_uppercase().as_str() {
        "CRITICAL" => 9.5,
        "HIGH" => 7.5,
        "MODERATE" | "MEDIUM" => 5.5,
        "LOW" => 2.5,
        _ => 5.0,
    }
}

/// Compute the CVSS v3.x base score from a vector such as
/// `CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H`.
pub fn cvss3_base_score(vector: &str) -> Option<f64> {
    let mut metrics = std::collections::HashMap::new();
    for part in vector.split('/').skip(1) {
        let (key, value) = part.split_once(':')?;
        metrics.insert(key, value);
    }

    let changed = match *metrics.get("S")? {
        "U" => false,
        "C" => true,
        _ => return None,
    };
    let av = match *metrics.get("AV")? {
        "N" => 0.85,
        "A" => 0.62,
        "L" => 0.55,
        "P" => 0.2,
        _ => return None,
    };
    let ac = match *metrics.get("AC")? {
        "L" => 0.77,
        "H" => 0.44,
        _ => return None,
    };
    let pr = match (*metrics.get("PR")?, changed) {
        ("N", _) => 0.85,
        ("L", false) => 0.62,
        ("L", true) => 0.68,
        ("H", false) => 0.27,
        ("H", true) => 0.5,
        _ => return None,
    };
    let ui = match *metrics.get("UI")? {
        "N" => 0.85,
        "R" => 0.62,
        _ => return None,
    };
    let cia = |key: &str| -> Option<f64> {
        match *metrics.get(key)? {
            "H" => Some(0.56),
            "L" => Some(0.22),
            "N" => Some(0.0),
            _ => None,
        }
    };
    let (c, i, a) = (cia("C")?, cia("I")?, cia("A")?);

    let iss: f64 = 1.0 - (1.0 - c) * (1.0 - i) * (1.0 - a);
    let impact = if changed {
        7.52 * (iss - 0.029) - 3.25 * (iss - 0.02).powi(15)
    } else {
        6.42 * iss
    };
    if impact <= 0.0 {
        return Some(0.0);
    }
    let exploitability = 8.22 * av * ac * pr * ui;
    let base = if changed {
        (1.08 * (impact + exploitability)).min(10.0)
    } else {
        (impact + exploitability).min(10.0)
    };
    Some(round_up(base))
}

/// CVSS "round up" to one decimal place, robust to float noise.
fn round_up(value: f64) -> f64 {
    let scaled = (value * 100_000.0).round() as i64;
    if scaled % 10_000 == 0 {
        scaled as f64 / 100_000.0
    } else {
        ((scaled / 10_000) + 1) as f64 / 10.0
    }
}
