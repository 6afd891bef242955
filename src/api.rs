//! REST client for the animation service.
//!
//! Thin wrapper used by hosts to fetch animation records before wiring them
//! into playback and export. Every request attaches the persisted bearer
//! token through the same accessor the streaming transport uses.

use std::time::Duration;

use reqwest::Url;

use crate::auth::AuthSession;
use crate::error::{SvgmotionError, SvgmotionResult};
use crate::model::Animation;

pub const DEFAULT_API_BASE: &str = "http://localhost:5000/api";

/// Default per-request timeout, matching the long tail of export renders.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(240);

pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
    auth: AuthSession,
}

impl ApiClient {
    pub fn new(base: &str, auth: AuthSession) -> SvgmotionResult<Self> {
        let mut base = Url::parse(base)
            .map_err(|err| SvgmotionError::precondition(format!("invalid api base url: {err}")))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(SvgmotionError::from)?;
        Ok(Self { base, http, auth })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> SvgmotionResult<T> {
        let url = self
            .base
            .join(path)
            .map_err(|err| SvgmotionError::precondition(format!("invalid request path: {err}")))?;
        let mut request = self.http.get(url);
        if let Some(token) = self.auth.token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SvgmotionError::http(status.as_u16(), body));
        }
        response
            .json::<T>()
            .await
            .map_err(|err| SvgmotionError::decode(format!("unexpected response body: {err}")))
    }

    /// Fetch an animation record, trying the community route first and the
    /// owner route when the record is not publicly visible.
    pub async fn fetch_animation(&self, id: u64) -> SvgmotionResult<Animation> {
        match self.get_json(&format!("community/animations/{id}")).await {
            Ok(animation) => Ok(animation),
            Err(err) if matches!(err.status(), Some(403 | 404)) => {
                self.get_json(&format!("animations/{id}")).await
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_a_trailing_slash() {
        let auth = AuthSession::new(std::env::temp_dir());
        let client = ApiClient::new("http://localhost:5000/api", auth).unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:5000/api/");
    }

    #[test]
    fn rejects_a_malformed_base_url() {
        let auth = AuthSession::new(std::env::temp_dir());
        assert!(ApiClient::new("not a url", auth).is_err());
    }
}
