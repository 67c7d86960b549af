use reqwest::{
    RequestBuilder,
    header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue},
};
use tracing::{debug, trace};

use crate::{
    ExpressApiClient, ExpressApiError,
    error::ExpressApiErrorResponse,
};

const API_KEY_HEADER: &str = "api-key";
const USER_ID_HEADER: &str = "user-id";
const SESSION_ID_HEADER: &str = "session-id";

impl ExpressApiClient {
    pub(crate) async fn get_request<S, D>(
        &self,
        endpoint: &str,
        query: Option<S>,
    ) -> Result<D, ExpressApiError>
    where
        S: serde::Serialize,
        D: serde::de::DeserializeOwned,
    {
        let query = match query {
            Some(q) => {
                let qs_config =
                    serde_qs::Config::new().array_format(serde_qs::ArrayFormat::Unindexed);
                let qs = qs_config.serialize_string(&q).map_err(|e| {
                    ExpressApiError::Request {
                        reason: format!("Failed to serialize query parameters: {e}"),
                        code: None,
                    }
                })?;
                format!("?{qs}")
            }
            None => String::new(),
        };
        let url = format!("{}/{}{}", self.config.base_url, endpoint, query);
        debug!("GET {url}");
        let builder = self.http_client.get(&url).headers(self.get_headers()?);

        self.request_inner(endpoint, builder).await
    }

    pub(crate) async fn post_request<S, D>(
        &self,
        endpoint: &str,
        body: &S,
    ) -> Result<D, ExpressApiError>
    where
        S: serde::Serialize + std::fmt::Debug,
        D: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.config.base_url, endpoint);
        debug!("POST {url} with body: {body:?}");
        let builder = self
            .http_client
            .post(&url)
            .headers(self.get_headers()?)
            .json(body);

        self.request_inner(endpoint, builder).await
    }

    fn get_headers(&self) -> Result<HeaderMap, ExpressApiError> {
        let credentials = &self.config.credentials;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in [
            (API_KEY_HEADER, &credentials.api_key),
            (USER_ID_HEADER, &credentials.user_id),
            (SESSION_ID_HEADER, &credentials.session_id),
        ] {
            let value = HeaderValue::from_str(value).map_err(|_| ExpressApiError::Request {
                reason: format!("Invalid {name} header"),
                code: None,
            })?;
            headers.insert(HeaderName::from_static(name), value);
        }

        Ok(headers)
    }

    async fn request_inner<D>(
        &self,
        endpoint: &str,
        builder: RequestBuilder,
    ) -> Result<D, ExpressApiError>
    where
        D: serde::de::DeserializeOwned,
    {
        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let err = ExpressApiError::from(e);
                debug!("Request to {endpoint} failed: {err}");
                return Err(err);
            }
        };
        let status_code = response.status();
        let text = response.text().await?;
        trace!("Response from {endpoint} ({status_code}): {text:?}");

        if !status_code.is_success() {
            let err = match serde_json::from_str::<ExpressApiErrorResponse>(&text) {
                Ok(response) => ExpressApiError::Api(response.error),
                Err(e) => {
                    trace!("Response from {endpoint} is not an error payload: {e}");
                    ExpressApiError::Request {
                        reason: text,
                        code: Some(status_code.as_u16()),
                    }
                }
            };
            debug!("Request to {endpoint} failed: {err}");
            return Err(err);
        }

        serde_json::from_str::<D>(&text).map_err(|e| {
            debug!("Failed to decode response from {endpoint}: {e}");
            ExpressApiError::Decoding(format!("Failed to parse response JSON: {e}"))
        })
    }
}
