use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const ENV_USERNAME: &str = "EARTHDATA_USERNAME";
pub const ENV_PASSWORD: &str = "EARTHDATA_PASSWORD";
pub const ENV_NETRC: &str = "NETRC";
/// Checked in order for a PEM bundle of extra trusted roots.
pub const ENV_CA_BUNDLE: [&str; 3] = ["CDDIS_CA_BUNDLE", "REQUESTS_CA_BUNDLE", "SSL_CERT_FILE"];
pub const ENV_PROXY: [&str; 4] = ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"];

type FileReader = dyn Fn(&Path) -> std::io::Result<String> + Send + Sync;

/// Snapshot of the process environment the resolvers read from.
///
/// Everything that would otherwise reach for `std::env` or the filesystem goes
/// through this, so tests can supply their own.
pub struct Environment {
    vars: HashMap<String, String>,
    home: Option<PathBuf>,
    windows: bool,
    read_file: Box<FileReader>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("vars", &self.vars.keys().collect::<Vec<_>>())
            .field("home", &self.home)
            .field("windows", &self.windows)
            .finish()
    }
}

impl Environment {
    /// Captures the real process environment.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
            home: dirs::home_dir(),
            windows: cfg!(windows),
            read_file: Box::new(|p: &Path| std::fs::read_to_string(p)),
        }
    }

    /// An empty environment whose file reader finds nothing.
    pub fn empty() -> Self {
        Self {
            vars: HashMap::new(),
            home: None,
            windows: false,
            read_file: Box::new(|p: &Path| {
                Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} not found", p.display()),
                ))
            }),
        }
    }

    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn with_windows(mut self, windows: bool) -> Self {
        self.windows = windows;
        self
    }

    /// Serves file contents from memory instead of disk.
    pub fn with_files<I, P, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = (P, S)>,
        P: Into<PathBuf>,
        S: Into<String>,
    {
        let files: HashMap<PathBuf, String> = files
            .into_iter()
            .map(|(p, s)| (p.into(), s.into()))
            .collect();
        self.read_file = Box::new(move |p: &Path| {
            files.get(p).cloned().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} not found", p.display()),
                )
            })
        });
        self
    }

    /// Non-empty value of an environment variable.
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn home(&self) -> Option<&Path> {
        self.home.as_deref()
    }

    pub fn is_windows(&self) -> bool {
        self.windows
    }

    pub fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        (self.read_file)(path)
    }

    /// Default netrc locations in lookup order: `_netrc` then `.netrc` on
    /// Windows, `.netrc` elsewhere.
    pub fn default_netrc_candidates(&self) -> Vec<PathBuf> {
        let Some(home) = self.home() else {
            return Vec::new();
        };
        if self.windows {
            vec![home.join("_netrc"), home.join(".netrc")]
        } else {
            vec![home.join(".netrc")]
        }
    }

    pub fn ca_bundle(&self) -> Option<(&'static str, PathBuf)> {
        ENV_CA_BUNDLE
            .iter()
            .find_map(|k| self.var(k).map(|v| (*k, PathBuf::from(v))))
    }
}
