use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde_json::Value;

use crate::error::Error;
use crate::types::{ErrorResponse, SearchFilter, SearchResponse, StatusResponse, SubmitResponse};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Forward-proxy settings. Either all four fields are present, or none.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub ip: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ProxyConfig {
    /// Build from the four optional components, failing if only some were given.
    pub fn from_parts(
        ip: Option<String>,
        port: Option<u16>,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<Option<Self>, Error> {
        let given = [
            ip.is_some(),
            port.is_some(),
            username.is_some(),
            password.is_some(),
        ];
        if given.iter().all(|g| !g) {
            return Ok(None);
        }
        if !given.iter().all(|g| *g) {
            return Err(Error::Misconfigured(
                "some proxy settings were given, but not all of them".to_string(),
            ));
        }
        Ok(Some(Self {
            ip: ip.unwrap(),
            port: port.unwrap(),
            username: username.unwrap(),
            password: password.unwrap(),
        }))
    }

    fn to_url(&self) -> String {
        format!(
            "http://{}:{}@{}:{}",
            self.username, self.password, self.ip, self.port
        )
    }
}

/// Construction parameters for [`HttpRemoteAdapter`].
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub base_url: String,
    pub version: u32,
    pub key: String,
    pub proxy: Option<ProxyConfig>,
    pub timeout: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            version: 0,
            key: String::new(),
            proxy: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Typed operations over the remote traffic-stats HTTP service.
///
/// A trait so the daemon/core can be exercised against [`crate::dummy::DummyRemoteAdapter`]
/// without a network.
pub trait RemoteAdapter {
    fn submit_route(&self, job: &Value) -> Result<SubmitResponse, Error>;
    fn submit_area(&self, job: &Value) -> Result<SubmitResponse, Error>;
    fn submit_density(&self, job: &Value) -> Result<SubmitResponse, Error>;
    fn status(&self, remote_job_id: i64) -> Result<StatusResponse, Error>;
    fn search(&self, filter: &SearchFilter) -> Result<SearchResponse, Error>;
    fn cancel(&self, remote_job_id: i64) -> Result<(), Error>;
    fn delete(&self, remote_job_id: i64) -> Result<(), Error>;
}

/// Blocking HTTP client over the remote traffic-stats API.
///
/// The daemon is single-threaded and cooperative: there is no benefit to an
/// async client here, so this wraps `reqwest::blocking`.
pub struct HttpRemoteAdapter {
    http: reqwest::blocking::Client,
    base_url: Url,
    version: u32,
    key: String,
}

impl HttpRemoteAdapter {
    pub fn new(cfg: AdapterConfig) -> Result<Self, Error> {
        if cfg.base_url.is_empty() {
            return Err(Error::Misconfigured("base url is not set".to_string()));
        }
        if cfg.version == 0 {
            return Err(Error::Misconfigured("api version is not set".to_string()));
        }
        if cfg.key.is_empty() {
            return Err(Error::Misconfigured("api key is not set".to_string()));
        }

        let base_url = Url::parse(&cfg.base_url)
            .map_err(|err| Error::Misconfigured(format!("invalid base url: {err}")))?;

        let mut builder = reqwest::blocking::Client::builder().timeout(cfg.timeout);
        if let Some(proxy) = &cfg.proxy {
            let proxy_url = proxy.to_url();
            let proxy = reqwest::Proxy::all(&proxy_url)
                .map_err(|err| Error::Misconfigured(format!("invalid proxy: {err}")))?;
            builder = builder.proxy(proxy);
        }

        let http = builder
            .build()
            .map_err(|err| Error::Misconfigured(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            base_url,
            version: cfg.version,
            key: cfg.key,
        })
    }

    fn url(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .expect("base url is not a cannot-be-a-base URL");
            segments.pop_if_empty();
            for segment in path.split('/') {
                segments.push(segment);
            }
        }
        url.query_pairs_mut().append_pair("key", &self.key);
        url
    }

    fn submit(&self, endpoint: &str, job: &Value) -> Result<SubmitResponse, Error> {
        let url = self.url(&format!("{endpoint}/{}", self.version));
        let res = self.http.post(url).json(job).send()?;
        self.handle_submit_response(res)
    }

    fn handle_submit_response(
        &self,
        res: reqwest::blocking::Response,
    ) -> Result<SubmitResponse, Error> {
        let status = res.status();
        if status == StatusCode::FORBIDDEN {
            return Err(Error::Forbidden);
        }
        if status == StatusCode::BAD_REQUEST {
            let body = res.text()?;
            if let Ok(err) = serde_json::from_str::<ErrorResponse>(&body) {
                tracing::debug!(?err, "remote rejected submission with structured error");
            }
            // Fall back to the analysis-response shape: it still carries a job id
            // and messages, so the caller can record the failure against the job.
            return serde_json::from_str::<SubmitResponse>(&body).map_err(Error::from);
        }
        if !status.is_success() {
            let body = res.text().unwrap_or_default();
            return Err(Error::RemoteError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(res.json()?)
    }
}

impl RemoteAdapter for HttpRemoteAdapter {
    fn submit_route(&self, job: &Value) -> Result<SubmitResponse, Error> {
        self.submit("routeanalysis", job)
    }

    fn submit_area(&self, job: &Value) -> Result<SubmitResponse, Error> {
        self.submit("areaanalysis", job)
    }

    fn submit_density(&self, job: &Value) -> Result<SubmitResponse, Error> {
        self.submit("trafficdensity", job)
    }

    fn status(&self, remote_job_id: i64) -> Result<StatusResponse, Error> {
        let url = self.url(&format!("status/{}/{remote_job_id}", self.version));
        let res = self.http.get(url).send()?;
        let status = res.status();
        if status == StatusCode::FORBIDDEN {
            return Err(Error::Forbidden);
        }
        if !status.is_success() {
            let body = res.text().unwrap_or_default();
            return Err(Error::RemoteError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(res.json()?)
    }

    fn search(&self, filter: &SearchFilter) -> Result<SearchResponse, Error> {
        let url = self.url(&format!("job/search/{}", self.version));
        let mut req = self.http.get(url);
        if let Some(page_index) = filter.page_index {
            req = req.query(&[("pageIndex", page_index)]);
        }
        if let Some(per_page) = filter.per_page {
            req = req.query(&[("perPage", per_page)]);
        }
        if let Some(job_id) = filter.job_id {
            req = req.query(&[("id", job_id)]);
        }
        if let Some(name) = &filter.name {
            req = req.query(&[("name", name)]);
        }
        if !filter.states.is_empty() {
            let states = filter
                .states
                .iter()
                .map(|s| {
                    serde_json::to_value(s)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_else(|| format!("{s:?}").to_uppercase())
                })
                .collect::<Vec<_>>()
                .join(",");
            req = req.query(&[("state", states)]);
        }

        let res = req.send()?;
        let status = res.status();
        if status == StatusCode::FORBIDDEN {
            return Err(Error::Forbidden);
        }
        if !status.is_success() {
            let body = res.text().unwrap_or_default();
            return Err(Error::RemoteError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(res.json()?)
    }

    fn cancel(&self, remote_job_id: i64) -> Result<(), Error> {
        let url = self.url(&format!("status/{}/{remote_job_id}/cancel", self.version));
        let res = self.http.post(url).send()?;
        let status = res.status();
        if status == StatusCode::FORBIDDEN {
            return Err(Error::Forbidden);
        }
        if !status.is_success() {
            let body = res.text().unwrap_or_default();
            return Err(Error::RemoteError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    fn delete(&self, remote_job_id: i64) -> Result<(), Error> {
        let url = self.url(&format!("reports/{remote_job_id}/"));
        let res = self.http.delete(url).send()?;
        let status = res.status();
        if status == StatusCode::FORBIDDEN {
            return Err(Error::Forbidden);
        }
        if !status.is_success() {
            let body = res.text().unwrap_or_default();
            return Err(Error::RemoteError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_requires_all_or_nothing() {
        assert!(
            ProxyConfig::from_parts(None, None, None, None)
                .unwrap()
                .is_none()
        );
        assert!(ProxyConfig::from_parts(Some("1.2.3.4".into()), None, None, None).is_err());
        assert!(ProxyConfig::from_parts(
            Some("1.2.3.4".into()),
            Some(8080),
            Some("u".into()),
            Some("p".into())
        )
        .unwrap()
        .is_some());
    }

    #[test]
    fn construction_fails_without_required_fields() {
        let err = HttpRemoteAdapter::new(AdapterConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Misconfigured(_)));
    }
}
