//! Earthdata login discovery.
//!
//! Sources are tried in order, first complete match wins:
//! 1. `EARTHDATA_USERNAME` / `EARTHDATA_PASSWORD`
//! 2. the netrc file named by `NETRC`
//! 3. the default netrc in the home directory (`_netrc` is tried first on Windows)

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{ENV_NETRC, ENV_PASSWORD, ENV_USERNAME, Environment};
use crate::error::ConfigError;
use crate::util::mask_username;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialSource {
    NetrcFile,
    Environment,
    None,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub source: CredentialSource,
}

impl Credentials {
    /// Placeholder used when no login is available; never sent anywhere.
    pub fn none() -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            source: CredentialSource::None,
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn masked_username(&self) -> String {
        mask_username(&self.username)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.masked_username())
            .field("password", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// What one source yielded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Matched(Credentials),
    NoMatch(String),
}

/// One line of the credential diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCheck {
    pub source: String,
    pub matched: bool,
    pub detail: String,
}

impl fmt::Display for SourceCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({})",
            self.source,
            if self.matched { "match" } else { "no match" },
            self.detail
        )
    }
}

#[derive(Debug, Clone)]
pub struct CredentialReport {
    pub checks: Vec<SourceCheck>,
    pub resolved: Option<Credentials>,
}

impl fmt::Display for CredentialReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            writeln!(f, "  {}", check)?;
        }
        match &self.resolved {
            Some(c) => write!(f, "  => using {} (password: <redacted>)", c.masked_username()),
            None => write!(f, "  => no usable credentials"),
        }
    }
}

struct Strategy {
    name: String,
    probe: Box<dyn Fn(&Environment, &str) -> Probe>,
}

fn strategies(env: &Environment) -> Vec<Strategy> {
    let mut list = vec![Strategy {
        name: format!("environment ({}/{})", ENV_USERNAME, ENV_PASSWORD),
        probe: Box::new(|env: &Environment, _: &str| from_env_vars(env)),
    }];

    if let Some(p) = env.var(ENV_NETRC) {
        let path = PathBuf::from(p);
        list.push(Strategy {
            name: format!("{} file {}", ENV_NETRC, path.display()),
            probe: Box::new(move |env: &Environment, host: &str| from_netrc(env, &path, host)),
        });
    }

    let defaults = env.default_netrc_candidates();
    if defaults.is_empty() {
        list.push(Strategy {
            name: "default netrc".to_string(),
            probe: Box::new(|_: &Environment, _: &str| Probe::NoMatch("home directory unknown".into())),
        });
    }
    for path in defaults {
        list.push(Strategy {
            name: format!("default netrc {}", path.display()),
            probe: Box::new(move |env: &Environment, host: &str| from_netrc(env, &path, host)),
        });
    }
    list
}

fn from_env_vars(env: &Environment) -> Probe {
    match (env.var(ENV_USERNAME), env.var(ENV_PASSWORD)) {
        (Some(u), Some(p)) => Probe::Matched(Credentials {
            username: u.to_string(),
            password: p.to_string(),
            source: CredentialSource::Environment,
        }),
        (Some(_), None) => Probe::NoMatch(format!("{} set, {} not set", ENV_USERNAME, ENV_PASSWORD)),
        (None, Some(_)) => Probe::NoMatch(format!("{} set, {} not set", ENV_PASSWORD, ENV_USERNAME)),
        (None, None) => Probe::NoMatch("not set".into()),
    }
}

fn from_netrc(env: &Environment, path: &Path, host: &str) -> Probe {
    let text = match env.read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Probe::NoMatch("file not found".into());
        }
        Err(e) => return Probe::NoMatch(format!("unreadable: {}", e)),
    };

    let entry = match parse_netrc(&text) {
        Ok(entries) => entries.into_iter().find(|e| e.machine.as_deref() == Some(host)),
        Err(reason) => return Probe::NoMatch(format!("parse error: {}", reason)),
    };

    match entry {
        Some(NetrcEntry {
            login: Some(login),
            password: Some(password),
            ..
        }) if !login.is_empty() && !password.is_empty() => Probe::Matched(Credentials {
            username: login,
            password,
            source: CredentialSource::NetrcFile,
        }),
        Some(_) => Probe::NoMatch(format!("machine {} lacks login or password", host)),
        None => Probe::NoMatch(format!("no machine {}", host)),
    }
}

/// Runs every source and records the result of each, stopping at nothing.
pub fn probe(env: &Environment, auth_host: &str) -> CredentialReport {
    let mut checks = Vec::new();
    let mut resolved = None;
    for strategy in strategies(env) {
        let outcome = (strategy.probe)(env, auth_host);
        let (matched, detail) = match outcome {
            Probe::Matched(c) => {
                let detail = format!("user {}", c.masked_username());
                if resolved.is_none() {
                    resolved = Some(c);
                }
                (true, detail)
            }
            Probe::NoMatch(reason) => (false, reason),
        };
        checks.push(SourceCheck {
            source: strategy.name,
            matched,
            detail,
        });
    }
    CredentialReport { checks, resolved }
}

pub fn resolve(env: &Environment, auth_host: &str) -> Result<Credentials, ConfigError> {
    let mut checked = Vec::new();
    for strategy in strategies(env) {
        match (strategy.probe)(env, auth_host) {
            Probe::Matched(c) => {
                log::debug!("using credentials from {} for user {}", strategy.name, c.masked_username());
                return Ok(c);
            }
            Probe::NoMatch(reason) => {
                log::debug!("{}: {}", strategy.name, reason);
                checked.push(strategy.name);
            }
        }
    }
    Err(ConfigError::NoCredentials { checked })
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct NetrcEntry {
    /// `None` for the `default` entry.
    pub machine: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
    pub account: Option<String>,
}

pub(crate) fn parse_netrc(text: &str) -> Result<Vec<NetrcEntry>, String> {
    let mut entries: Vec<NetrcEntry> = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let mut tokens = line.split_whitespace();
        while let Some(token) = tokens.next() {
            if token.starts_with('#') {
                break;
            }
            match token {
                "machine" => {
                    let name = tokens.next().ok_or("`machine` without a name")?;
                    entries.push(NetrcEntry {
                        machine: Some(name.to_string()),
                        ..NetrcEntry::default()
                    });
                }
                "default" => entries.push(NetrcEntry::default()),
                "login" | "password" | "account" => {
                    let value = tokens
                        .next()
                        .ok_or_else(|| format!("`{}` without a value", token))?;
                    let entry = entries
                        .last_mut()
                        .ok_or_else(|| format!("`{}` before any machine", token))?;
                    let value = Some(strip_quotes(value).to_string());
                    match token {
                        "login" => entry.login = value,
                        "password" => entry.password = value,
                        _ => entry.account = value,
                    }
                }
                "macdef" => {
                    // Macro body runs until the next blank line.
                    for body in lines.by_ref() {
                        if body.trim().is_empty() {
                            break;
                        }
                    }
                    break;
                }
                other => return Err(format!("unexpected token `{}`", other)),
            }
        }
    }

    Ok(entries)
}

fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::EARTHDATA_AUTH_HOST;

    const HOST: &str = EARTHDATA_AUTH_HOST;

    fn netrc(user: &str, pass: &str) -> String {
        format!("machine {HOST}\n    login {user}\n    password {pass}\n")
    }

    #[test]
    fn env_vars_win_over_netrc() {
        let env = Environment::empty()
            .with_var(ENV_USERNAME, "envuser")
            .with_var(ENV_PASSWORD, "envpass")
            .with_home("/home/a")
            .with_files([("/home/a/.netrc", netrc("fileuser", "filepass"))]);
        let c = resolve(&env, HOST).unwrap();
        assert_eq!(c.username, "envuser");
        assert_eq!(c.source, CredentialSource::Environment);
    }

    #[test]
    fn half_set_env_falls_through_to_netrc() {
        let env = Environment::empty()
            .with_var(ENV_USERNAME, "envuser")
            .with_home("/home/a")
            .with_files([("/home/a/.netrc", netrc("fileuser", "filepass"))]);
        let c = resolve(&env, HOST).unwrap();
        assert_eq!(c.username, "fileuser");
        assert_eq!(c.source, CredentialSource::NetrcFile);
    }

    #[test]
    fn netrc_override_beats_home() {
        let env = Environment::empty()
            .with_var(ENV_NETRC, "/etc/cddis.netrc")
            .with_home("/home/a")
            .with_files([
                ("/etc/cddis.netrc", netrc("override", "p1")),
                ("/home/a/.netrc", netrc("home", "p2")),
            ]);
        assert_eq!(resolve(&env, HOST).unwrap().username, "override");
    }

    #[test]
    fn windows_dotless_netrc_is_found() {
        let env = Environment::empty()
            .with_home("C:/Users/a")
            .with_windows(true)
            .with_files([("C:/Users/a/_netrc", netrc("winuser", "p"))]);
        assert_eq!(resolve(&env, HOST).unwrap().username, "winuser");
    }

    #[test]
    fn machine_must_match_exactly() {
        let text = "machine urs.earthdata.nasa.gov.evil login x password y\n\
                    default login d password d\n";
        let env = Environment::empty()
            .with_home("/h")
            .with_files([("/h/.netrc", text)]);
        let err = resolve(&env, HOST).unwrap_err();
        match err {
            ConfigError::NoCredentials { checked } => assert_eq!(checked.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn single_line_entries_and_macdef() {
        let text = "# comment\n\
                    macdef init\ncd /pub\nls\n\n\
                    machine other.host login a password b\n\
                    machine urs.earthdata.nasa.gov login alice password \"s3cr3t\" account x\n";
        let entries = parse_netrc(text).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].login.as_deref(), Some("alice"));
        assert_eq!(entries[1].password.as_deref(), Some("s3cr3t"));
        assert_eq!(entries[1].account.as_deref(), Some("x"));
    }

    #[test]
    fn malformed_netrc_is_reported_not_fatal() {
        let env = Environment::empty()
            .with_var(ENV_NETRC, "/bad")
            .with_home("/h")
            .with_files([("/bad", "login nobody".to_string()), ("/h/.netrc", netrc("good", "p"))]);
        assert_eq!(resolve(&env, HOST).unwrap().username, "good");
        let report = probe(&env, HOST);
        assert!(report.checks[1].detail.starts_with("parse error"));
    }

    #[test]
    fn missing_password_is_no_match() {
        let env = Environment::empty()
            .with_home("/h")
            .with_files([("/h/.netrc", format!("machine {HOST} login alice"))]);
        assert!(matches!(resolve(&env, HOST), Err(ConfigError::NoCredentials { .. })));
    }

    #[test]
    fn diagnostic_never_contains_password() {
        let env = Environment::empty()
            .with_var(ENV_NETRC, "/n")
            .with_home("/h")
            .with_files([("/n", netrc("alice", "hunter2-very-secret"))]);
        let report = probe(&env, HOST);
        let text = report.to_string();
        assert!(!text.contains("hunter2-very-secret"));
        assert!(!text.contains("alice"));
        assert!(text.contains("ali***"));

        let debug = format!("{:?}", report);
        assert!(!debug.contains("hunter2-very-secret"));
        assert!(!debug.contains("alice"));
    }

    #[test]
    fn probe_checks_every_source() {
        let env = Environment::empty()
            .with_var(ENV_USERNAME, "u1")
            .with_var(ENV_PASSWORD, "p1")
            .with_home("/h")
            .with_files([("/h/.netrc", netrc("u2", "p2"))]);
        let report = probe(&env, HOST);
        assert_eq!(report.checks.len(), 2);
        assert!(report.checks.iter().all(|c| c.matched));
        assert_eq!(report.resolved.unwrap().username, "u1");
    }
}
