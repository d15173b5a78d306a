//! HTTP client adapter for the conformance engine.
//!
//! Wraps `reqwest` with the baseline content-negotiation headers the checks
//! rely on (`Accept: application/json`, `OData-Version: 4.0`) and encodes
//! connection-level failures as a normal [`Response`] with `status: None`
//! instead of an error, so a check can record WARN and move on.

mod error;

pub use error::{ClientError, ClientResult};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Credential mode attached to a single request.
#[derive(Debug, Clone)]
pub enum Auth {
    /// No credentials. A 401/403 from the service is a normal response here.
    None,
    /// HTTP basic with the configured username/password.
    Basic,
    /// Basic with an explicit (usually wrong-on-purpose) credential pair.
    BasicOverride { username: String, password: String },
    /// Redfish session token sent as `X-Auth-Token`.
    Session(String),
}

/// Decoded outcome of one HTTP interaction.
///
/// `status == None` is the transport-failure sentinel: DNS, TLS, refused
/// connection, or timeout. `payload` holds the JSON body when one decoded;
/// non-JSON bodies stay in `raw`.
#[derive(Debug)]
pub struct Response {
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub payload: Option<Value>,
    pub raw: String,
}

impl Response {
    fn transport_failure(reason: String) -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            payload: None,
            raw: reason,
        }
    }

    /// True when no usable response was obtained at all.
    pub fn is_transport_failure(&self) -> bool {
        self.status.is_none()
    }

    pub fn status_u16(&self) -> Option<u16> {
        self.status.map(|s| s.as_u16())
    }

    /// True for 200 OK specifically.
    pub fn is_ok(&self) -> bool {
        self.status == Some(StatusCode::OK)
    }

    /// True for any 2xx status.
    pub fn is_success(&self) -> bool {
        self.status.map(|s| s.is_success()).unwrap_or(false)
    }

    /// First value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Top-level payload property by name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.payload.as_ref().and_then(|p| p.get(name))
    }

    /// The `@odata.type` identifier of the payload, if any.
    pub fn odata_type(&self) -> Option<&str> {
        self.property("@odata.type").and_then(Value::as_str)
    }
}

/// HTTP client bound to one SUT.
pub struct HttpClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpClient {
    /// Builds a client for the given SUT base URL.
    ///
    /// Self-signed TLS certificates are accepted: conformance targets are
    /// usually management controllers with factory certificates.
    pub fn new(
        base_url: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves a root-relative path against the SUT base URL.
    pub fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base_url, url)
        } else {
            format!("{}/{}", self.base_url, url)
        }
    }

    /// Issues one request and decodes the outcome.
    ///
    /// Extra headers override the baseline `Accept`/`OData-Version` pair.
    /// Never returns an error for connection-level failures; see [`Response`].
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        extra_headers: &[(&str, &str)],
        body: Option<&Value>,
        auth: Auth,
    ) -> ClientResult<Response> {
        let url = self.absolute_url(url);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("odata-version"),
            HeaderValue::from_static("4.0"),
        );
        for (name, value) in extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::InvalidUrl(format!("bad header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::InvalidUrl(format!("bad header value: {e}")))?;
            headers.insert(name, value);
        }

        let mut builder = self.client.request(method.clone(), &url).headers(headers);

        builder = match auth {
            Auth::None => builder,
            Auth::Basic => builder.basic_auth(&self.username, Some(&self.password)),
            Auth::BasicOverride { username, password } => {
                builder.basic_auth(username, Some(password))
            }
            Auth::Session(token) => builder.header("X-Auth-Token", token),
        };

        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%method, %url, error = %e, "no usable response");
                return Ok(Response::transport_failure(e.to_string()));
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let raw = response.text().await.unwrap_or_default();
        let payload = serde_json::from_str::<Value>(&raw).ok();

        Ok(Response {
            status: Some(status),
            headers,
            payload,
            raw,
        })
    }

    pub async fn get(&self, url: &str, auth: Auth) -> ClientResult<Response> {
        self.request(Method::GET, url, &[], None, auth).await
    }

    pub async fn head(&self, url: &str, auth: Auth) -> ClientResult<Response> {
        self.request(Method::HEAD, url, &[], None, auth).await
    }

    pub async fn post(&self, url: &str, body: &Value, auth: Auth) -> ClientResult<Response> {
        self.request(Method::POST, url, &[], Some(body), auth).await
    }

    pub async fn patch(&self, url: &str, body: &Value, auth: Auth) -> ClientResult<Response> {
        self.request(Method::PATCH, url, &[], Some(body), auth)
            .await
    }

    pub async fn put(&self, url: &str, body: &Value, auth: Auth) -> ClientResult<Response> {
        self.request(Method::PUT, url, &[], Some(body), auth).await
    }

    pub async fn delete(&self, url: &str, auth: Auth) -> ClientResult<Response> {
        self.request(Method::DELETE, url, &[], None, auth).await
    }

    pub async fn trace(&self, url: &str, auth: Auth) -> ClientResult<Response> {
        self.request(Method::TRACE, url, &[], None, auth).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(base: &str) -> HttpClient {
        HttpClient::new(base, "admin", "secret", Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn absolute_url_resolution() {
        let client = client_for("http://10.0.0.5/");
        assert_eq!(
            client.absolute_url("/redfish/v1/Systems"),
            "http://10.0.0.5/redfish/v1/Systems"
        );
        assert_eq!(
            client.absolute_url("https://other/x"),
            "https://other/x"
        );
        assert_eq!(client.absolute_url("redfish"), "http://10.0.0.5/redfish");
    }

    #[tokio::test]
    async fn connection_refused_is_status_none() {
        // Bind then drop a listener so the port is known-closed.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client_for(&format!("http://{addr}"));
        let response = client.get("/redfish/v1/", Auth::Basic).await.unwrap();
        assert!(response.is_transport_failure());
        assert!(response.status_u16().is_none());
    }

    #[tokio::test]
    async fn get_decodes_json_payload_and_headers() {
        use axum::routing::get;

        let app = axum::Router::new().route(
            "/redfish/v1/",
            get(|| async {
                (
                    [("ETag", "\"abc\"")],
                    axum::Json(serde_json::json!({"@odata.type": "#ServiceRoot.v1_5_0.ServiceRoot"})),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let client = client_for(&format!("http://{addr}"));
        let response = client.get("/redfish/v1/", Auth::None).await.unwrap();
        assert!(response.is_ok());
        assert_eq!(response.header("ETag"), Some("\"abc\""));
        assert_eq!(
            response.odata_type(),
            Some("#ServiceRoot.v1_5_0.ServiceRoot")
        );
    }
}
