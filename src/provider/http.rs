//! Blocking HTTP plumbing shared by the providers
use super::ProviderError;
use crate::session::{Cookie, Session};
use log::debug;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{COOKIE, USER_AGENT};

const BROWSER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// A cookie-aware client that never follows redirects
///
/// Login endpoints answer with a redirect that carries the session cookies,
/// so redirects are surfaced instead of followed.
pub(super) struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    /// GETs `url` with the session cookies and returns the body
    pub fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
        session: &Session,
    ) -> Result<String, ProviderError> {
        let request = self.client.get(url).query(query);
        let response = Self::send(with_session(request, session), url)?;
        response
            .text()
            .map_err(|e| ProviderError::RequestError(e.to_string()))
    }

    /// POSTs a form with the session cookies and returns the body
    pub fn post_form_text(
        &self,
        url: &str,
        form: &[(&str, &str)],
        session: &Session,
    ) -> Result<String, ProviderError> {
        let request = self.client.post(url).form(form);
        let response = Self::send(with_session(request, session), url)?;
        response
            .text()
            .map_err(|e| ProviderError::RequestError(e.to_string()))
    }

    /// POSTs a login form and returns every cookie the provider set
    pub fn post_login(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<Vec<Cookie>, ProviderError> {
        let request = self
            .client
            .post(url)
            .header(USER_AGENT, BROWSER_AGENT)
            .form(form);
        let response = Self::send(request, url)?;

        Ok(response
            .cookies()
            .map(|cookie| Cookie {
                name: cookie.name().to_string(),
                value: cookie.value().to_string(),
            })
            .collect())
    }

    fn send(request: RequestBuilder, url: &str) -> Result<Response, ProviderError> {
        debug!("requesting {}", url);
        let response = request
            .send()
            .map_err(|e| ProviderError::RequestError(e.to_string()))?;

        let status = response.status();
        if !(status.is_success() || status.is_redirection()) {
            return Err(ProviderError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response)
    }
}

fn with_session(request: RequestBuilder, session: &Session) -> RequestBuilder {
    let request = request.header(USER_AGENT, BROWSER_AGENT);
    if session.cookies.is_empty() {
        request
    } else {
        request.header(COOKIE, session.cookie_header())
    }
}

/// Headers the stream downloader needs to replay the session
pub(super) fn stream_headers(session: &Session) -> Vec<(String, String)> {
    let mut headers = vec![("User-Agent".to_string(), BROWSER_AGENT.to_string())];
    if !session.cookies.is_empty() {
        headers.push(("Cookie".to_string(), session.cookie_header()));
    }
    headers
}
