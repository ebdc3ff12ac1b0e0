//! npm-flavoured version ranges on top of the `semver` crate.
//!
//! `semver::VersionReq` follows Cargo's grammar, so npm syntax is rewritten
//! before parsing:
//!
//! - `a || b` becomes a list of alternatives, any of which may match
//! - `1.2.3 - 2.3.4` becomes `>=1.2.3, <=2.3.4`
//! - space-separated comparators are joined with `,`
//! - a bare full version (`1.2.3`) is an exact pin, a bare partial one (`1.2`) a wildcard
//! - `x`/`X` placeholders become `*`

use std::fmt;

use semver::{Comparator, Op, Prerelease, Version, VersionReq};

/// Parse an installed version string. A leading `v` or `=` is tolerated.
pub fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches('=').trim_start_matches('v');
    Version::parse(trimmed).ok()
}

/// A parsed npm range such as `^4.0.0 || >=5.2 <6`.
#[derive(Debug, Clone)]
pub struct NpmRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl NpmRange {
    /// Returns `None` for anything that is not a semver range: dist-tags, git
    /// URLs, `file:`/`workspace:`/`npm:` specifiers and malformed input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.contains(':') || trimmed.contains('/') {
            return None;
        }

        let mut alternatives = Vec::new();
        for alt in trimmed.split("||") {
            let translated = translate_alternative(alt)?;
            alternatives.push(VersionReq::parse(&translated).ok()?);
        }

        Some(Self {
            raw: trimmed.to_string(),
            alternatives,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn satisfies(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    /// The version this range pins exactly, if it is a single `=x.y.z`.
    pub fn pinned(&self) -> Option<Version> {
        let [req] = self.alternatives.as_slice() else {
            return None;
        };
        let [cmp] = req.comparators.as_slice() else {
            return None;
        };
        match (cmp.op, cmp.minor, cmp.patch) {
            (Op::Exact, Some(minor), Some(patch)) => Some(Version {
                major: cmp.major,
                minor,
                patch,
                pre: cmp.pre.clone(),
                build: semver::BuildMetadata::EMPTY,
            }),
            _ => None,
        }
    }

    /// Lowest version satisfying the range, or `None` when no lower bound
    /// derived from the comparators actually satisfies it.
    pub fn min_version(&self) -> Option<Version> {
        self.alternatives
            .iter()
            .filter_map(|req| {
                let candidate = req
                    .comparators
                    .iter()
                    .map(lower_bound)
                    .max()
                    .unwrap_or_else(|| Version::new(0, 0, 0));
                req.matches(&candidate).then_some(candidate)
            })
            .min()
    }

    /// Whether the range names a prerelease anywhere in its comparators.
    pub fn mentions_prerelease(&self) -> bool {
        self.alternatives
            .iter()
            .flat_map(|req| req.comparators.iter())
            .any(|cmp| !cmp.pre.is_empty())
    }
}

impl fmt::Display for NpmRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

fn translate_alternative(alt: &str) -> Option<String> {
    let alt = alt.trim();
    if alt.is_empty() {
        return Some("*".to_string());
    }

    // Hyphen range: "1.2.3 - 2.3.4"
    if let Some((low, high)) = alt.split_once(" - ") {
        let low = normalize_partial(low.trim())?;
        let high = normalize_partial(high.trim())?;
        let bounds: Vec<String> = [(">=", low), ("<=", high)]
            .into_iter()
            .filter(|(_, v)| v != "*")
            .map(|(op, v)| format!("{}{}", op, v.trim_end_matches(".*")))
            .collect();
        return Some(if bounds.is_empty() {
            "*".to_string()
        } else {
            bounds.join(", ")
        });
    }

    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;

    for token in alt.split_whitespace() {
        let (op, version) = split_operator(token);
        match (pending_op.take(), op, version.is_empty()) {
            // Operator written apart from its version: ">= 1.2.3"
            (None, Some(op), true) => pending_op = Some(op),
            (Some(_), _, true) => return None,
            (Some(op), None, false) => tokens.push(comparator(Some(op), version)?),
            (Some(_), Some(_), false) => return None,
            (None, op, false) => tokens.push(comparator(op, version)?),
            (None, None, true) => {}
        }
    }
    if pending_op.is_some() {
        return None;
    }

    // `*` must stand alone in a semver::VersionReq.
    let concrete: Vec<String> = tokens.into_iter().filter(|t| t != "*").collect();
    if concrete.is_empty() {
        Some("*".to_string())
    } else {
        Some(concrete.join(", "))
    }
}

fn split_operator(token: &str) -> (Option<&str>, &str) {
    for op in [">=", "<=", ">", "<", "=", "^", "~"] {
        if let Some(rest) = token.strip_prefix(op) {
            return (Some(op), rest);
        }
    }
    (None, token)
}

fn comparator(op: Option<&str>, version: &str) -> Option<String> {
    let version = version.trim_start_matches('v');
    if is_wildcard(version) {
        return Some("*".to_string());
    }

    let normalized = normalize_partial(version)?;
    let partial = normalized.contains('*');

    Some(match op {
        // Bare full versions pin exactly in npm; Cargo would read them as caret.
        None if !partial => format!("={}", normalized),
        None => normalized,
        Some(op) => format!("{}{}", op, normalized.trim_end_matches(".*")),
    })
}

/// Normalise `1`, `1.2`, `1.x`, `1.2.X` into the `semver` wildcard form and
/// leave full versions alone.
fn normalize_partial(version: &str) -> Option<String> {
    let version = version.trim_start_matches('v');
    let (core, suffix) = match version.find(['-', '+']) {
        Some(idx) => version.split_at(idx),
        None => (version, ""),
    };

    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    if let Some(pos) = parts.iter().position(|p| is_wildcard(p)) {
        parts.truncate(pos);
    }
    if parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }

    match parts.len() {
        0 => Some("*".to_string()),
        3 => Some(format!("{}{}", parts.join("."), suffix)),
        _ if !suffix.is_empty() => None,
        _ => Some(format!("{}.*", parts.join("."))),
    }
}

fn is_wildcard(part: &str) -> bool {
    matches!(part, "*" | "x" | "X")
}

fn lower_bound(cmp: &Comparator) -> Version {
    let minor = cmp.minor.unwrap_or(0);
    let patch = cmp.patch.unwrap_or(0);
    match cmp.op {
        Op::Less | Op::LessEq => Version::new(0, 0, 0),
        Op::Greater => match (cmp.minor, cmp.patch) {
            (Some(_), Some(_)) if !cmp.pre.is_empty() => Version::new(cmp.major, minor, patch),
            (Some(_), Some(_)) => Version::new(cmp.major, minor, patch.saturating_add(1)),
            (Some(_), None) => Version::new(cmp.major, minor.saturating_add(1), 0),
            (None, _) => Version::new(cmp.major.saturating_add(1), 0, 0),
        },
        _ => Version {
            major: cmp.major,
            minor,
            patch,
            pre: cmp.pre.clone(),
            build: semver::BuildMetadata::EMPTY,
        },
    }
}

/// Size of the difference between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VersionDelta {
    None,
    Prerelease,
    Patch,
    Minor,
    Major,
}

pub fn delta(from: &Version, to: &Version) -> VersionDelta {
    if from.major != to.major {
        VersionDelta::Major
    } else if from.minor != to.minor {
        VersionDelta::Minor
    } else if from.patch != to.patch {
        VersionDelta::Patch
    } else if from.pre != to.pre {
        VersionDelta::Prerelease
    } else {
        VersionDelta::None
    }
}

/// `version` with any prerelease tag dropped.
pub fn release_of(version: &Version) -> Version {
    Version {
        pre: Prerelease::EMPTY,
        build: semver::BuildMetadata::EMPTY,
        ..version.clone()
    }
}

const GRID_MAJORS: u64 = 10;
const GRID_MINORS: u64 = 5;
const GRID_PATCHES: u64 = 2;

/// Whether some version satisfies every range.
///
/// This is an approximation: instead of intersecting intervals it samples a
/// fixed grid of `0..=10` majors, `0..=5` minors and `0..=2` patches. Ranges
/// that only admit versions outside the grid are reported as incompatible.
pub fn ranges_compatible(ranges: &[&NpmRange]) -> bool {
    if ranges.len() < 2 {
        return true;
    }
    (0..=GRID_MAJORS).any(|major| {
        (0..=GRID_MINORS).any(|minor| {
            (0..=GRID_PATCHES).any(|patch| {
                let sample = Version::new(major, minor, patch);
                ranges.iter().all(|range| range.satisfies(&sample))
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn range(s: &str) -> NpmRange {
        NpmRange::parse(s).unwrap_or_else(|| panic!("failed to parse {s}"))
    }

    #[test]
    fn test_caret_and_tilde() {
        assert!(range("^4.0.0").satisfies(&v("4.18.2")));
        assert!(!range("^4.0.0").satisfies(&v("5.0.0")));
        assert!(range("~1.2.3").satisfies(&v("1.2.9")));
        assert!(!range("~1.2.3").satisfies(&v("1.3.0")));
        assert!(!range("^0.2.3").satisfies(&v("0.3.0")));
    }

    #[test]
    fn test_bare_version_is_exact() {
        let r = range("1.2.3");
        assert!(r.satisfies(&v("1.2.3")));
        assert!(!r.satisfies(&v("1.2.4")));
        assert_eq!(r.pinned(), Some(v("1.2.3")));
        assert_eq!(range("=2.0.0").pinned(), Some(v("2.0.0")));
        assert_eq!(range("^2.0.0").pinned(), None);
    }

    #[test]
    fn test_partial_and_wildcards() {
        assert!(range("1.2").satisfies(&v("1.2.7")));
        assert!(!range("1.2").satisfies(&v("1.3.0")));
        assert!(range("1.x").satisfies(&v("1.9.0")));
        assert!(range("*").satisfies(&v("42.0.0")));
        assert!(range("").satisfies(&v("0.0.1")));
    }

    #[test]
    fn test_space_separated_and_or() {
        let r = range(">=1.2.0 <2.0.0 || >= 3.0.0");
        assert!(r.satisfies(&v("1.5.0")));
        assert!(!r.satisfies(&v("2.5.0")));
        assert!(r.satisfies(&v("3.1.0")));
    }

    #[test]
    fn test_hyphen_range() {
        let r = range("1.2.3 - 2.3.4");
        assert!(r.satisfies(&v("2.0.0")));
        assert!(!r.satisfies(&v("2.3.5")));
    }

    #[test]
    fn test_non_semver_specifiers() {
        assert!(NpmRange::parse("latest").is_none());
        assert!(NpmRange::parse("file:../local").is_none());
        assert!(NpmRange::parse("github:user/repo").is_none());
        assert!(NpmRange::parse("workspace:*").is_none());
    }

    #[test]
    fn test_min_version() {
        assert_eq!(range("^4.1.0").min_version(), Some(v("4.1.0")));
        assert_eq!(range(">1.2.3").min_version(), Some(v("1.2.4")));
        assert_eq!(range("<2.0.0").min_version(), Some(v("0.0.0")));
        assert_eq!(range("^3.0.0 || ^2.1.0").min_version(), Some(v("2.1.0")));
    }

    #[test]
    fn test_lower_bound_at_numeric_ceiling() {
        let cmp: Comparator = ">18446744073709551615".parse().unwrap();
        assert_eq!(lower_bound(&cmp), Version::new(u64::MAX, 0, 0));
        let cmp: Comparator = ">1.18446744073709551615".parse().unwrap();
        assert_eq!(lower_bound(&cmp), Version::new(1, u64::MAX, 0));
        let cmp: Comparator = ">1.2.18446744073709551615".parse().unwrap();
        assert_eq!(lower_bound(&cmp), Version::new(1, 2, u64::MAX));

        assert!(NpmRange::parse(">1.2.18446744073709551615")
            .and_then(|r| r.min_version())
            .is_none());
    }

    #[test]
    fn test_delta() {
        assert_eq!(delta(&v("1.0.0"), &v("2.0.0")), VersionDelta::Major);
        assert_eq!(delta(&v("1.0.0"), &v("1.1.0")), VersionDelta::Minor);
        assert_eq!(delta(&v("1.0.0"), &v("1.0.1")), VersionDelta::Patch);
        assert_eq!(delta(&v("1.0.0-rc.1"), &v("1.0.0")), VersionDelta::Prerelease);
    }

    #[test]
    fn test_ranges_compatible_grid() {
        assert!(ranges_compatible(&[&range("^1.0.0"), &range(">=1.2.0")]));
        assert!(!ranges_compatible(&[&range("^1.0.0"), &range("^2.0.0")]));
        // Outside the sampled grid, so reported as incompatible.
        assert!(!ranges_compatible(&[&range("^16.0.0"), &range("^18.0.0")]));
    }

    #[test]
    fn test_parse_version_tolerates_prefix() {
        assert_eq!(parse_version("v1.2.3"), Some(v("1.2.3")));
        assert_eq!(parse_version("not-a-version"), None);
    }
}
