//! Async HTTP clients for the data sources the scanners consult.
//!
//! - [`npm`]: latest published version of a package ([`VersionSource`]).
//! - [`osv`]: known advisories for a package version ([`AdvisorySource`]).
//!
//! Both return `Err` on transport failures; callers treat any error as
//! "no information available".

use anyhow::Result;
use futures::future::BoxFuture;

pub mod npm;
pub mod osv;

pub use npm::NpmRegistry;
pub use osv::OsvClient;

/// Looks up the latest published version of a package.
pub trait VersionSource: Send + Sync {
    /// `Ok(None)` when the registry has no usable answer.
    fn latest_version<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<String>>>;
}

/// One advisory affecting a specific package version.
#[derive(Debug, Clone, PartialEq)]
pub struct Advisory {
    pub id: String,
    pub title: String,
    pub description: String,
    pub cvss_score: f64,
    pub cwe_ids: Vec<String>,
    pub references: Vec<String>,
    pub fixed_in: Option<String>,
}

/// Looks up the advisories affecting `name@version`.
pub trait AdvisorySource: Send + Sync {
    fn advisories<'a>(
        &'a self,
        name: &'a str,
        version: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Advisory>>>;
}

/// Build the shared HTTP client used by every data source.
pub fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("dep-doctor/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// URL-encode a package name for a registry path: `@scope/pkg` → `%40scope%2Fpkg`.
pub fn encode_name(name: &str) -> String {
    name.replace('@', "%40").replace('/', "%2F")
}
