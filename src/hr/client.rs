use async_trait::async_trait;
use bytes::Bytes;
use color_eyre::{eyre::eyre, Result};
use reqwest::{header, Client, Method, Request, Response};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::ApiConfig;
use crate::hr::api_types::{ApiEmployee, ApiEmployeePage, ApiLoginRequest, ApiLoginResponse};
use crate::hr::error::{HrError, HrResult};
use crate::hr::types::{Employee, EmployeeSummary, Page};
use crate::pending::ChangeSet;
use crate::resource::{BlobSource, FetchedBlob};
use crate::search::PageSource;
use crate::session::Credential;

/// HR API client. Attaches the bearer credential to every authenticated call;
/// the token itself never leaves this type.
#[derive(Clone)]
pub struct HrClient {
  http: Client,
  base_url: Url,
  timeout: Option<Duration>,
  credential: Option<Credential>,
}

impl fmt::Debug for HrClient {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("HrClient")
      .field("base_url", &self.base_url)
      .field("authenticated", &self.credential.is_some())
      .finish_non_exhaustive()
  }
}

impl HrClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    // Relative joins drop the last path segment unless the base ends in '/'
    let mut base = config.url.trim_end_matches('/').to_string();
    base.push('/');
    let base_url = Url::parse(&base).map_err(|e| eyre!("Invalid API url {}: {}", config.url, e))?;

    let timeout = config.timeout_secs.map(Duration::from_secs);
    let mut builder = Client::builder().user_agent(concat!("hrdesk/", env!("CARGO_PKG_VERSION")));
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    let http = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url,
      timeout,
      credential: None,
    })
  }

  /// Client that authenticates with `credential`.
  pub fn with_credential(mut self, credential: Credential) -> Self {
    self.credential = Some(credential);
    self
  }

  /// Resolve a path or absolute URL against the API base.
  pub fn resolve(&self, path_or_url: &str) -> HrResult<Url> {
    self
      .base_url
      .join(path_or_url)
      .map_err(|e| HrError::InvalidRequest(format!("invalid url {}: {}", path_or_url, e)))
  }

  /// Build an authenticated request without sending it.
  pub fn build_request(&self, method: Method, url: Url) -> HrResult<reqwest::RequestBuilder> {
    let credential = self.credential.as_ref().ok_or(HrError::Unauthenticated)?;
    Ok(
      self
        .http
        .request(method, url)
        .bearer_auth(&credential.token)
        .header(header::ACCEPT, "application/json"),
    )
  }

  /// Exchange login and password for a credential.
  pub async fn login(&self, login: &str, password: &str) -> HrResult<Credential> {
    let url = self.resolve("api/auth/login")?;
    let request = self
      .http
      .post(url)
      .json(&ApiLoginRequest { login, password })
      .build()?;

    let response: ApiLoginResponse = decode_json(self.execute(request).await?).await?;
    Ok(Credential {
      token: response.token,
      user_id: response.uid,
      employee_id: response.employee_id,
      is_manager: response.is_manager,
      is_internal: response.is_internal,
    })
  }

  /// Get a single employee record
  pub async fn get_employee(&self, id: u64) -> HrResult<Employee> {
    let url = self.resolve(&format!("api/employees/{}", id))?;
    let request = self.build_request(Method::GET, url)?.build()?;
    let employee: ApiEmployee = decode_json(self.execute(request).await?).await?;
    Ok(employee.into())
  }

  /// Get one page of the employee directory
  pub async fn list_employees(&self, offset: u64, limit: u64) -> HrResult<Page<EmployeeSummary>> {
    let mut url = self.resolve("api/employees")?;
    url
      .query_pairs_mut()
      .append_pair("offset", &offset.to_string())
      .append_pair("limit", &limit.to_string());

    let request = self.build_request(Method::GET, url)?.build()?;
    let page: ApiEmployeePage = decode_json(self.execute(request).await?).await?;
    Ok(page.into())
  }

  /// Write profile field changes to an employee record
  pub async fn update_employee(&self, id: u64, changes: &ChangeSet) -> HrResult<()> {
    let url = self.resolve(&format!("api/employees/{}", id))?;
    let request = self
      .build_request(Method::PATCH, url)?
      .json(changes)
      .build()?;
    self.execute(request).await?;
    Ok(())
  }

  /// Download an authorization-gated resource
  pub async fn fetch_bytes(&self, url: &str) -> HrResult<FetchedBlob> {
    let request = self.blob_request(url)?;
    let response = self.execute(request).await?;
    let content_type = response
      .headers()
      .get(header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let bytes = response
      .bytes()
      .await
      .map_err(|e| HrError::Decode(format!("failed to read body: {}", e)))?;

    Ok(FetchedBlob {
      bytes,
      content_type,
    })
  }

  /// GET request for a resource URL. The credential is required either way,
  /// but the token is only sent to the API's own origin.
  fn blob_request(&self, url: &str) -> HrResult<Request> {
    let url = self.resolve(url)?;
    let builder = if url.origin() == self.base_url.origin() {
      self.build_request(Method::GET, url)?
    } else {
      self.credential.as_ref().ok_or(HrError::Unauthenticated)?;
      debug!(host = ?url.host_str(), "fetching foreign resource without credential");
      self.http.get(url)
    };
    Ok(builder.header(header::ACCEPT, "*/*").build()?)
  }

  /// Send a request and turn non-2xx responses into `HrError::Status`.
  async fn execute(&self, request: Request) -> HrResult<Response> {
    debug!(method = %request.method(), url = %request.url(), "sending request");

    let response = self
      .http
      .execute(request)
      .await
      .map_err(|e| self.map_transport(e))?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      warn!(%status, "HR API error");
      return Err(HrError::Status { status, body });
    }

    Ok(response)
  }

  fn map_transport(&self, e: reqwest::Error) -> HrError {
    match self.timeout {
      Some(timeout) if e.is_timeout() => HrError::Timeout(timeout),
      _ => HrError::from(e),
    }
  }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> HrResult<T> {
  let body: Bytes = response
    .bytes()
    .await
    .map_err(|e| HrError::Decode(format!("failed to read body: {}", e)))?;
  Ok(serde_json::from_slice(&body)?)
}

#[async_trait]
impl BlobSource for HrClient {
  async fn fetch(&self, url: &str) -> HrResult<FetchedBlob> {
    self.fetch_bytes(url).await
  }
}

#[async_trait]
impl PageSource<EmployeeSummary> for HrClient {
  async fn fetch_page(&self, offset: u64, limit: u64) -> HrResult<Page<EmployeeSummary>> {
    self.list_employees(offset, limit).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client() -> HrClient {
    let config = ApiConfig {
      url: "https://hr.example.com/portal".into(),
      timeout_secs: Some(10),
    };
    HrClient::new(&config).unwrap()
  }

  fn credential() -> Credential {
    Credential {
      token: "abc123".into(),
      user_id: 1,
      employee_id: 7,
      is_manager: false,
      is_internal: true,
    }
  }

  #[test]
  fn test_resolve_relative_and_absolute() {
    let client = client();
    assert_eq!(
      client.resolve("api/employees/7").unwrap().as_str(),
      "https://hr.example.com/portal/api/employees/7"
    );
    assert_eq!(
      client
        .resolve("https://cdn.example.com/a.png")
        .unwrap()
        .as_str(),
      "https://cdn.example.com/a.png"
    );
  }

  #[test]
  fn test_build_request_requires_credential() {
    let client = client();
    let url = client.resolve("api/employees").unwrap();
    assert!(matches!(
      client.build_request(Method::GET, url),
      Err(HrError::Unauthenticated)
    ));
  }

  #[test]
  fn test_build_request_attaches_bearer() {
    let client = client().with_credential(credential());
    let url = client.resolve("api/employees/7").unwrap();
    let request = client
      .build_request(Method::GET, url)
      .unwrap()
      .build()
      .unwrap();

    let auth = request.headers().get(header::AUTHORIZATION).unwrap();
    assert_eq!(auth.to_str().unwrap(), "Bearer abc123");
  }

  #[test]
  fn test_blob_request_same_origin_carries_bearer() {
    let client = client().with_credential(credential());
    let request = client.blob_request("avatar/7.png").unwrap();
    assert_eq!(
      request.url().as_str(),
      "https://hr.example.com/portal/avatar/7.png"
    );
    assert_eq!(
      request.headers().get(header::AUTHORIZATION).unwrap(),
      "Bearer abc123"
    );
  }

  #[test]
  fn test_blob_request_foreign_origin_omits_bearer() {
    let client = client().with_credential(credential());

    let request = client
      .blob_request("https://cdn.example.com/a.png")
      .unwrap();
    assert!(request.headers().get(header::AUTHORIZATION).is_none());

    // Same host on another scheme is another origin
    let request = client
      .blob_request("http://hr.example.com/portal/avatar/7.png")
      .unwrap();
    assert!(request.headers().get(header::AUTHORIZATION).is_none());
  }

  #[test]
  fn test_debug_hides_token() {
    let client = client().with_credential(credential());
    let rendered = format!("{:?}", client);
    assert!(!rendered.contains("abc123"));
  }

  #[tokio::test]
  async fn test_unauthenticated_fetch_fails_without_network() {
    let client = client();
    let err = client.fetch_bytes("avatar/7.png").await.unwrap_err();
    assert_eq!(err, HrError::Unauthenticated);
  }
}
