//! `--diagnose`: what the process can see of its environment, with secrets hidden.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{ENV_CA_BUNDLE, ENV_NETRC, ENV_PASSWORD, ENV_PROXY, ENV_USERNAME, Environment};
use crate::credentials::{self, SourceCheck};
use crate::util::redact_url_password;

#[derive(Debug, Clone, Serialize)]
pub struct PathStatus {
    pub path: PathBuf,
    pub exists: bool,
}

impl PathStatus {
    fn of(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            exists: path.exists(),
        }
    }
}

impl fmt::Display for PathStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.exists { "exists" } else { "missing" };
        write!(f, "{} ({})", self.path.display(), state)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub platform: &'static str,
    pub home: Option<PathBuf>,
    /// Value of `NETRC`, if set.
    pub netrc_override: Option<PathStatus>,
    pub default_netrc: Vec<PathStatus>,
    pub username_set: bool,
    pub password_set: bool,
    /// Proxy variables that are set, with their values.
    pub proxies: Vec<(String, String)>,
    pub ca_bundle: Option<(String, PathStatus)>,
    pub credential_checks: Vec<SourceCheck>,
    /// Masked username of the login that would be used.
    pub resolved_user: Option<String>,
}

pub fn diagnose(env: &Environment, auth_host: &str) -> DiagnosticReport {
    let report = credentials::probe(env, auth_host);
    DiagnosticReport {
        platform: if env.is_windows() { "windows" } else { "unix" },
        home: env.home().map(Path::to_path_buf),
        netrc_override: env.var(ENV_NETRC).map(|p| PathStatus::of(Path::new(p))),
        default_netrc: env
            .default_netrc_candidates()
            .iter()
            .map(|p| PathStatus::of(p))
            .collect(),
        username_set: env.var(ENV_USERNAME).is_some(),
        password_set: env.var(ENV_PASSWORD).is_some(),
        proxies: ENV_PROXY
            .iter()
            .filter_map(|k| env.var(k).map(|v| (k.to_string(), redact_url_password(v))))
            .collect(),
        ca_bundle: env
            .ca_bundle()
            .map(|(k, p)| (k.to_string(), PathStatus::of(&p))),
        credential_checks: report.checks,
        resolved_user: report.resolved.map(|c| c.masked_username()),
    }
}

fn set(flag: bool) -> &'static str {
    if flag { "Set" } else { "Not set" }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Environment diagnostic")?;
        writeln!(f, "  platform: {}", self.platform)?;
        match &self.home {
            Some(h) => writeln!(f, "  home directory: {}", h.display())?,
            None => writeln!(f, "  home directory: unknown")?,
        }
        match &self.netrc_override {
            Some(p) => writeln!(f, "  {}: {}", ENV_NETRC, p)?,
            None => writeln!(f, "  {}: {}", ENV_NETRC, set(false))?,
        }
        for p in &self.default_netrc {
            writeln!(f, "  default netrc: {}", p)?;
        }
        writeln!(f, "  {}: {}", ENV_USERNAME, set(self.username_set))?;
        writeln!(f, "  {}: {}", ENV_PASSWORD, set(self.password_set))?;
        if self.proxies.is_empty() {
            writeln!(f, "  proxy: none")?;
        }
        for (k, v) in &self.proxies {
            writeln!(f, "  {}: {}", k, v)?;
        }
        match &self.ca_bundle {
            Some((k, p)) => writeln!(f, "  CA bundle ({}): {}", k, p)?,
            None => writeln!(f, "  CA bundle: system default ({} not set)", ENV_CA_BUNDLE.join("/"))?,
        }
        writeln!(f, "Credential sources:")?;
        for check in &self.credential_checks {
            writeln!(f, "  {}", check)?;
        }
        match &self.resolved_user {
            Some(u) => write!(f, "  => using {} (password: <redacted>)", u),
            None => write!(f, "  => no usable credentials"),
        }
    }
}
