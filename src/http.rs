use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{HeaderMap, HeaderValue, LOCATION, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Certificate, Proxy, Url};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Environment;
use crate::credentials::Credentials;
use crate::error::ConfigError;
use crate::path::Archive;
use crate::request::RequestTemplate;
use crate::transfer::{AttemptError, Transport};

const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    /// Explicit proxy for every scheme. Without it reqwest's own
    /// `HTTP_PROXY`/`HTTPS_PROXY` handling applies.
    pub proxy: Option<String>,
    /// Extra PEM roots, e.g. a corporate CA bundle.
    pub ca_bundle: Option<PathBuf>,
    /// Host that receives HTTP Basic credentials during the login redirect.
    pub auth_host: String,
    pub progress: bool,
}

impl HttpSettings {
    /// Settings for a run: timeout, proxy and progress from the template, the
    /// archive's login host, and a CA bundle from the environment if one is named.
    pub fn from_template(template: &RequestTemplate, archive: &Archive, env: &Environment) -> Self {
        let ca_bundle = env.ca_bundle().map(|(var, path)| {
            log::debug!("using CA bundle from {}: {}", var, path.display());
            path
        });
        Self {
            timeout: template.timeout,
            proxy: template.proxy.clone(),
            ca_bundle,
            auth_host: archive.auth_host.clone(),
            progress: template.progress,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            proxy: None,
            ca_bundle: None,
            auth_host: crate::path::EARTHDATA_AUTH_HOST.to_string(),
            progress: false,
        }
    }
}

/// Blocking HTTPS transport that follows the Earthdata login flow.
///
/// The archive redirects unauthenticated requests to the login host, which
/// accepts Basic credentials, sets a session cookie and redirects back.
/// Redirects are followed by hand so credentials are only ever sent to
/// `auth_host`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
    auth_host: String,
    progress: bool,
}

impl HttpTransport {
    pub fn new(settings: HttpSettings) -> Result<Self, ConfigError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cddis-fetch/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("cddis-fetch")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(settings.timeout)
            .cookie_store(true)
            .redirect(Policy::none());

        if let Some(url) = &settings.proxy {
            let proxy = Proxy::all(url.as_str()).map_err(|e| ConfigError::Proxy {
                url: url.clone(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(proxy);
        }

        if let Some(path) = &settings.ca_bundle {
            let pem = std::fs::read(path)
                .map_err(|e| ConfigError::io("failed to read CA bundle", path, e))?;
            let certs = Certificate::from_pem_bundle(&pem)
                .map_err(|e| ConfigError::Tls(format!("{}: {}", path.display(), e)))?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
            log::debug!("trusting extra CA bundle {}", path.display());
        }

        let http = builder
            .build()
            .map_err(|e| ConfigError::Tls(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            auth_host: settings.auth_host,
            progress: settings.progress,
        })
    }

    fn send(&self, url: &Url, credentials: &Credentials) -> Result<Response, AttemptError> {
        let mut req = self.http.get(url.clone());
        if url.host_str() == Some(self.auth_host.as_str()) && credentials.is_complete() {
            req = req.basic_auth(&credentials.username, Some(&credentials.password));
        }
        req.send().map_err(classify)
    }

    fn stream(&self, mut resp: Response, sink: &mut dyn Write) -> Result<u64, AttemptError> {
        let expected = resp.content_length();

        let pb = match (self.progress, expected) {
            (true, Some(len)) => {
                let pb = ProgressBar::new(len);
                let style = ProgressStyle::with_template(
                    "{spinner:.green} {bytes}/{total_bytes} ({bytes_per_sec}) {wide_bar} {eta}",
                )
                .map(|s| s.progress_chars("=>-"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
                pb.set_style(style);
                Some(pb)
            }
            _ => None,
        };

        let mut written: u64 = 0;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = match resp.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(AttemptError::Body(e)),
            };
            sink.write_all(&buf[..n]).map_err(AttemptError::Local)?;
            written += n as u64;
            if let Some(pb) = &pb {
                pb.inc(n as u64);
            }
        }
        sink.flush().map_err(AttemptError::Local)?;

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }

        match expected {
            Some(len) if written != len => Err(AttemptError::Body(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("received {} of {} byte(s)", written, len),
            ))),
            _ => Ok(written),
        }
    }
}

impl Transport for HttpTransport {
    fn get(
        &self,
        url: &str,
        credentials: &Credentials,
        sink: &mut dyn Write,
    ) -> Result<u64, AttemptError> {
        let mut current = Url::parse(url).map_err(|e| {
            AttemptError::Config(ConfigError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })
        })?;

        for _ in 0..=MAX_REDIRECTS {
            let resp = self.send(&current, credentials)?;
            let status = resp.status();

            if status.is_redirection() {
                let location = resp
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        AttemptError::Connect(format!("HTTP {} without Location header", status))
                    })?;
                let next = current.join(location).map_err(|e| {
                    AttemptError::Connect(format!("bad redirect target `{}`: {}", location, e))
                })?;
                log::debug!("redirected to {}", without_query(&next));
                current = next;
                continue;
            }

            if !status.is_success() {
                return Err(AttemptError::Status(status.as_u16()));
            }
            return self.stream(resp, sink);
        }

        Err(AttemptError::Connect(format!(
            "more than {} redirects for {}",
            MAX_REDIRECTS, url
        )))
    }
}

fn classify(err: reqwest::Error) -> AttemptError {
    if err.is_timeout() {
        AttemptError::Timeout(err.to_string())
    } else if err.is_builder() {
        AttemptError::Config(ConfigError::InvalidUrl {
            url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            reason: err.to_string(),
        })
    } else {
        AttemptError::Connect(err.to_string())
    }
}

/// Login redirects carry OAuth state in the query; keep it out of logs.
fn without_query(url: &Url) -> String {
    let mut u = url.clone();
    u.set_query(None);
    u.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::CredentialSource;
    use httpmock::prelude::*;

    fn creds() -> Credentials {
        Credentials {
            username: "alice".into(),
            password: "secret".into(),
            source: CredentialSource::Environment,
        }
    }

    fn transport(auth_host: &str) -> HttpTransport {
        HttpTransport::new(HttpSettings {
            timeout: Duration::from_secs(5),
            auth_host: auth_host.to_string(),
            ..HttpSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn ok_body_is_streamed() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/archive/a.gz");
            then.status(200).body("abcdef");
        });

        let mut sink = Vec::new();
        let n = transport("login.invalid")
            .get(&server.url("/archive/a.gz"), &creds(), &mut sink)
            .unwrap();
        mock.assert();
        assert_eq!(n, 6);
        assert_eq!(sink, b"abcdef");
    }

    #[test]
    fn error_statuses_are_reported() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/missing");
            then.status(404);
        });
        server.mock(|when, then| {
            when.method(GET).path("/denied");
            then.status(401);
        });
        server.mock(|when, then| {
            when.method(GET).path("/busy");
            then.status(503);
        });

        let t = transport("login.invalid");
        for (path, expected) in [("/missing", 404), ("/denied", 401), ("/busy", 503)] {
            let mut sink = Vec::new();
            match t.get(&server.url(path), &creds(), &mut sink) {
                Err(AttemptError::Status(s)) => assert_eq!(s, expected),
                other => panic!("{path}: unexpected {other:?}"),
            }
            assert!(sink.is_empty());
        }
    }

    #[test]
    fn credentials_only_go_to_auth_host() {
        let archive = MockServer::start();
        let login = MockServer::start();

        // Both servers listen on loopback; the archive is addressed as
        // "localhost" so only the login server matches the auth host.
        let login_url = format!("http://127.0.0.1:{}/oauth", login.port());
        let archive_mock = archive.mock(|when, then| {
            when.method(GET).path("/file").header_missing("authorization");
            then.status(302).header("Location", login_url.as_str());
        });
        let login_mock = login.mock(|when, then| {
            when.method(GET)
                .path("/oauth")
                .header("authorization", "Basic YWxpY2U6c2VjcmV0");
            then.status(200).body("granted");
        });

        let url = format!("http://localhost:{}/file", archive.port());
        let mut sink = Vec::new();
        let n = transport("127.0.0.1").get(&url, &creds(), &mut sink).unwrap();
        archive_mock.assert();
        login_mock.assert();
        assert_eq!(n, 7);
        assert_eq!(sink, b"granted");
    }

    #[test]
    fn bad_proxy_is_config_error() {
        let err = HttpTransport::new(HttpSettings {
            proxy: Some("not a url".into()),
            ..HttpSettings::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Proxy { .. }));
    }

    #[test]
    fn missing_ca_bundle_is_config_error() {
        let err = HttpTransport::new(HttpSettings {
            ca_bundle: Some(PathBuf::from("/nonexistent/ca.pem")),
            ..HttpSettings::default()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn query_is_dropped_from_logged_redirects() {
        let u = Url::parse("https://urs.earthdata.nasa.gov/oauth/authorize?client_id=x&state=y").unwrap();
        assert_eq!(without_query(&u), "https://urs.earthdata.nasa.gov/oauth/authorize");
    }
}
