// ABOUTME: HTTP client whose calls are routed through the request coordinator.
// ABOUTME: Keys are METHOD:path:params so identical calls share one round trip.

use reqwest::{Method, Url};
use serde::Serialize;
use serde_json::Value;

use super::RequestKey;
use crate::coordinator::{CoordinatorConfig, ExecuteOptions, RequestCoordinator};
use crate::error::{ApiError, ConfigError, HttpError};

/// Environment variable holding the API base URL.
pub const BASE_URL_VAR: &str = "DEDUPE_BASE_URL";

/// A decoded API response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    /// JSON body; `Value::Null` when the body was empty.
    pub body: Value,
}

/// HTTP client for a single backend with deduplicated, throttled calls.
///
/// GET and DELETE params travel as a query string; POST and PUT params as a
/// JSON body. Non-2xx responses count as failures and are retried according
/// to the call's [`ExecuteOptions`]. Malformed URLs and query params are
/// rejected before anything is dispatched.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    coordinator: RequestCoordinator<ApiResponse, HttpError>,
}

impl ApiClient {
    /// Create a client with default coordinator limits.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_config(base_url, CoordinatorConfig::default())
    }

    /// Create a client with custom coordinator limits.
    pub fn with_config(base_url: impl Into<String>, config: CoordinatorConfig) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            coordinator: RequestCoordinator::with_config(config),
        }
    }

    /// Create a client from `DEDUPE_BASE_URL` and the `DEDUPE_*` coordinator variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var(BASE_URL_VAR)
            .map_err(|_| ConfigError::Missing(BASE_URL_VAR.to_string()))?;
        Url::parse(&base_url).map_err(|e| ConfigError::Invalid {
            var: BASE_URL_VAR.to_string(),
            value: base_url.clone(),
            reason: e.to_string(),
        })?;
        let config = CoordinatorConfig::from_env()?;
        Ok(Self::with_config(base_url, config))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The coordinator shared by every call of this client.
    pub fn coordinator(&self) -> &RequestCoordinator<ApiResponse, HttpError> {
        &self.coordinator
    }

    pub async fn get<Q>(&self, path: &str, query: &Q) -> Result<ApiResponse, ApiError>
    where
        Q: Serialize + ?Sized,
    {
        self.send(Method::GET, path, query, self.default_options())
            .await
    }

    pub async fn post<B>(&self, path: &str, body: &B) -> Result<ApiResponse, ApiError>
    where
        B: Serialize + ?Sized,
    {
        self.send(Method::POST, path, body, self.default_options())
            .await
    }

    pub async fn put<B>(&self, path: &str, body: &B) -> Result<ApiResponse, ApiError>
    where
        B: Serialize + ?Sized,
    {
        self.send(Method::PUT, path, body, self.default_options())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.send(Method::DELETE, path, &(), self.default_options())
            .await
    }

    /// Send a request through the coordinator.
    pub async fn send<P>(
        &self,
        method: Method,
        path: &str,
        params: &P,
        options: ExecuteOptions,
    ) -> Result<ApiResponse, ApiError>
    where
        P: Serialize + ?Sized,
    {
        let params = serde_json::to_value(params).map_err(ApiError::Params)?;
        if sends_query(&method) {
            check_query(&params).map_err(ApiError::Params)?;
        }
        let url = self.url_for(path)?;
        let key = RequestKey::new(&method, path, &params).map_err(ApiError::Params)?;
        let http = self.http.clone();

        let operation = move || {
            let http = http.clone();
            let method = method.clone();
            let url = url.clone();
            let params = params.clone();
            async move { perform(&http, method, url, &params).await }
        };

        let response = self
            .coordinator
            .execute_with_options(key, operation, options)
            .await?;
        Ok(response)
    }

    fn default_options(&self) -> ExecuteOptions {
        self.coordinator.config().defaults.clone()
    }

    fn url_for(&self, path: &str) -> Result<Url, HttpError> {
        if !path.starts_with('/') {
            return Err(HttpError::InvalidUrl(format!(
                "path '{}' must start with '/'",
                path
            )));
        }
        let raw = format!("{}{}", self.base_url, path);
        Url::parse(&raw).map_err(|e| HttpError::InvalidUrl(format!("{}: {}", raw, e)))
    }
}

fn sends_query(method: &Method) -> bool {
    *method == Method::GET || *method == Method::DELETE
}

/// Query params must be a flat object of scalars.
fn check_query(params: &Value) -> Result<(), serde_json::Error> {
    let fields = match params {
        Value::Null => return Ok(()),
        Value::Object(fields) => fields,
        other => {
            return Err(<serde_json::Error as serde::ser::Error>::custom(format!(
                "query params must be an object, got {}",
                other
            )));
        }
    };

    match fields
        .iter()
        .find(|(_, value)| !(value.is_string() || value.is_number() || value.is_boolean()))
    {
        Some((name, _)) => Err(<serde_json::Error as serde::ser::Error>::custom(format!(
            "query param '{}' must be a string, number or bool",
            name
        ))),
        None => Ok(()),
    }
}

async fn perform(
    http: &reqwest::Client,
    method: Method,
    url: Url,
    params: &Value,
) -> Result<ApiResponse, HttpError> {
    let query = sends_query(&method);
    let mut request = http.request(method, url);
    if !params.is_null() {
        request = if query {
            request.query(params)
        } else {
            request.json(params)
        };
    }

    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        return Err(HttpError::Status {
            status: status.as_u16(),
            body: text,
        });
    }

    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text)?
    };

    Ok(ApiResponse {
        status: status.as_u16(),
        body,
    })
}
