//! YAML mock files.
//!
//! A file lists mock definitions in match-priority order plus a few global
//! settings, and loads into an [`InterceptionRegistry`].

use crate::error::{FailureKind, InterceptError};
use crate::matcher::RequestPattern;
use crate::mock::{Mock, MockId, MockSpec};
use crate::registry::{InterceptionRegistry, RegistrySettings};
use crate::response::{ResponseOutcome, ResponseTemplate, JSON_CONTENT_TYPE};
use crate::template::{TemplateContext, TemplateEngine};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Top-level mock file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MockFileConfig {
    /// Mock definitions, first match wins
    #[serde(default)]
    pub mocks: Vec<MockDefinition>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl MockFileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        Self::from_yaml(&content)
    }

    /// Parse and validate YAML.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for (i, mock) in self.mocks.iter().enumerate() {
            mock.validate()
                .map_err(|e| anyhow::anyhow!("Mock {}: {}", i, e))?;
            if !seen.insert(mock.id.as_str()) {
                anyhow::bail!("Mock {}: duplicate id {:?}", i, mock.id);
            }
        }
        Ok(())
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            log_matches: self.settings.log_matches,
            log_unmatched: self.settings.log_unmatched,
        }
    }

    /// Build every mock, in file order.
    pub fn to_specs(&self) -> anyhow::Result<Vec<MockSpec>> {
        let engine = Arc::new(TemplateEngine::new());
        self.mocks
            .iter()
            .map(|mock| {
                mock.to_spec(&self.settings, Arc::clone(&engine))
                    .map_err(|e| anyhow::anyhow!("Mock {:?}: {}", mock.id, e))
            })
            .collect()
    }

    /// Register every mock into `registry`. Nothing is registered if any
    /// mock fails to build.
    pub fn register_all(&self, registry: &InterceptionRegistry) -> anyhow::Result<Vec<MockId>> {
        let specs = self.to_specs()?;
        let ids = specs
            .into_iter()
            .map(|spec| registry.register(spec).id())
            .collect::<Vec<_>>();
        info!(mocks = ids.len(), "Mock file loaded");
        Ok(ids)
    }
}

/// A single mock definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockDefinition {
    /// Unique identifier for this mock
    pub id: String,

    /// Request matcher
    #[serde(default)]
    pub request: RequestPattern,

    /// Response to return
    #[serde(default)]
    pub response: ResponseDefinition,

    /// Latency simulation
    #[serde(default)]
    pub delay: Option<DelayConfig>,

    /// Failure simulation, replaces the response
    #[serde(default)]
    pub fault: Option<FaultConfig>,
}

impl MockDefinition {
    /// Validate the mock definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.id.is_empty() {
            anyhow::bail!("Mock id cannot be empty");
        }
        self.request.compile()?;
        self.response.validate()?;
        Ok(())
    }

    /// Build the mock. The delay is sampled once, here.
    pub fn to_spec(
        &self,
        settings: &GlobalSettings,
        engine: Arc<TemplateEngine>,
    ) -> anyhow::Result<MockSpec> {
        let pattern = Arc::new(self.request.compile()?);
        let delay_ms = self.delay.as_ref().map(DelayConfig::calculate).unwrap_or(0);

        let matcher = Arc::clone(&pattern);
        let mock = Mock::when(move |req| matcher.matches(req))
            .named(self.id.clone())
            .delay(Duration::from_millis(delay_ms));

        if let Some(fault) = &self.fault {
            debug!(mock = %self.id, fault = ?fault, "Mock simulates failure");
            return Ok(mock.fail_with(fault.to_error(&self.id)).build());
        }

        let response = &self.response;
        let status = StatusCode::from_u16(response.status)
            .map_err(|_| anyhow::anyhow!("Invalid status code: {}", response.status))?;
        let mut template = ResponseTemplate::with_status(status).headers(response.headers.clone());
        if let Some(body) = &response.body {
            if !response.has_content_type() {
                template = template.header("Content-Type", body.content_type(settings));
            }
        }

        let dynamic_body = match &response.body {
            Some(ResponseBody::Text { content }) if response.template => {
                Some(DynamicBody::Text(content.clone()))
            }
            Some(ResponseBody::Json { content }) if response.template => {
                Some(DynamicBody::Json(content.clone()))
            }
            Some(body) => {
                template = template.bytes_body(body.to_bytes()?);
                None
            }
            None => None,
        };

        let Some(dynamic_body) = dynamic_body else {
            return Ok(mock.respond_with(template).build());
        };

        let id = self.id.clone();
        Ok(mock
            .respond_with_fn(move |req| {
                let match_ctx = pattern.match_context(req).unwrap_or_default();
                let ctx = TemplateContext::new(&match_ctx, req);
                let rendered = match &dynamic_body {
                    DynamicBody::Text(text) => engine.render(text, &ctx).map(String::into_bytes),
                    DynamicBody::Json(json) => engine
                        .render_json(json, &ctx)
                        .map(|v| v.to_string().into_bytes()),
                };
                match rendered {
                    Ok(bytes) => template.clone().bytes_body(bytes).to_outcome(req),
                    Err(e) => ResponseOutcome::Failure(InterceptError::simulated(
                        FailureKind::Other,
                        format!("template for mock {id} failed to render: {e}"),
                    )),
                }
            })
            .build())
    }
}

enum DynamicBody {
    Text(String),
    Json(serde_json::Value),
}

/// Response definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponseDefinition {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Response headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Response body; absent means an empty body
    #[serde(default)]
    pub body: Option<ResponseBody>,

    /// Whether text/JSON bodies are Handlebars templates
    #[serde(default)]
    pub template: bool,
}

impl Default for ResponseDefinition {
    fn default() -> Self {
        Self {
            status: default_status(),
            headers: HashMap::new(),
            body: None,
            template: false,
        }
    }
}

fn default_status() -> u16 {
    200
}

impl ResponseDefinition {
    /// Validate the response definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.status < 100 || self.status > 599 {
            anyhow::bail!("Invalid status code: {}", self.status);
        }
        if let Some(body @ ResponseBody::Base64 { .. }) = &self.body {
            body.to_bytes()?;
        }
        Ok(())
    }

    fn has_content_type(&self) -> bool {
        self.headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"))
    }
}

/// Response body configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBody {
    /// Plain text body
    Text { content: String },
    /// JSON body
    Json { content: serde_json::Value },
    /// Base64 encoded binary
    Base64 { content: String },
    /// Load from file
    File { path: String },
}

impl ResponseBody {
    /// Get the body content as bytes.
    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        match self {
            ResponseBody::Text { content } => Ok(content.as_bytes().to_vec()),
            ResponseBody::Json { content } => Ok(serde_json::to_vec(content)?),
            ResponseBody::Base64 { content } => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .decode(content)
                    .map_err(|e| anyhow::anyhow!("Invalid base64: {}", e))
            }
            ResponseBody::File { path } => std::fs::read(path)
                .map_err(|e| anyhow::anyhow!("Failed to read file {}: {}", path, e)),
        }
    }

    /// Get content type for this body.
    pub fn content_type(&self, settings: &GlobalSettings) -> String {
        match self {
            ResponseBody::Text { .. } => "text/plain; charset=utf-8".to_string(),
            ResponseBody::Json { .. } => settings.default_content_type.clone(),
            ResponseBody::Base64 { .. } | ResponseBody::File { .. } => {
                "application/octet-stream".to_string()
            }
        }
    }
}

/// Delay/latency simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayConfig {
    /// Fixed delay in milliseconds
    #[serde(default)]
    pub fixed_ms: u64,

    /// Minimum delay for random range (ms)
    #[serde(default)]
    pub min_ms: u64,

    /// Maximum delay for random range (ms)
    #[serde(default)]
    pub max_ms: u64,
}

impl DelayConfig {
    /// Calculate the actual delay to apply.
    pub fn calculate(&self) -> u64 {
        if self.fixed_ms > 0 {
            return self.fixed_ms;
        }
        if self.max_ms > self.min_ms {
            use rand::Rng;
            let mut rng = rand::thread_rng();
            return rng.gen_range(self.min_ms..=self.max_ms);
        }
        self.min_ms
    }
}

/// Failure simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FaultConfig {
    /// Generic network error
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    /// Request times out
    Timeout,
    /// Connection refused
    ConnectionRefused,
    /// Connection reset mid-request
    ConnectionReset,
}

impl FaultConfig {
    pub fn to_error(&self, mock_id: &str) -> InterceptError {
        let (kind, message) = match self {
            FaultConfig::Error { message } => (
                FailureKind::Other,
                message
                    .clone()
                    .unwrap_or_else(|| format!("mock {mock_id} failed")),
            ),
            FaultConfig::Timeout => (FailureKind::Timeout, format!("mock {mock_id} timed out")),
            FaultConfig::ConnectionRefused => (
                FailureKind::ConnectionRefused,
                format!("mock {mock_id} refused the connection"),
            ),
            FaultConfig::ConnectionReset => (
                FailureKind::ConnectionReset,
                format!("mock {mock_id} reset the connection"),
            ),
        };
        InterceptError::simulated(kind, message)
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log all matched mocks
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log requests claimed without a mock
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Content type for JSON bodies without an explicit header
    #[serde(default = "default_content_type")]
    pub default_content_type: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            default_content_type: default_content_type(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_content_type() -> String {
    JSON_CONTENT_TYPE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use crate::request::Request;
    use crate::response::Body;
    use std::io::Write;

    fn spec_for(yaml: &str) -> MockSpec {
        let config = MockFileConfig::from_yaml(yaml).unwrap();
        config.to_specs().unwrap().remove(0)
    }

    #[test]
    fn test_parse_simple_mock() {
        let yaml = r#"
mocks:
  - id: hello-world
    request:
      method: [GET]
      url:
        type: exact
        value: http://localhost/hello
    response:
      status: 200
      body:
        type: text
        content: "Hello, World!"
"#;
        let config = MockFileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.mocks.len(), 1);
        assert_eq!(config.mocks[0].id, "hello-world");

        let spec = config.to_specs().unwrap().remove(0);
        let req = Request::get("http://localhost/hello").unwrap();
        assert!(spec.matches(&req));
        match spec.respond(&req) {
            ResponseOutcome::Success(meta, Body::Content(bytes)) => {
                assert_eq!(meta.headers["Content-Type"], "text/plain; charset=utf-8");
                assert_eq!(&bytes[..], b"Hello, World!");
            }
            other => panic!("Expected content, got {:?}", other),
        }
    }

    #[test]
    fn test_json_body_gets_default_content_type() {
        let spec = spec_for(
            r#"
mocks:
  - id: json-response
    response:
      body:
        type: json
        content:
          message: "success"
"#,
        );
        let req = Request::get("http://localhost/anything").unwrap();
        match spec.respond(&req) {
            ResponseOutcome::Success(meta, Body::Content(bytes)) => {
                assert_eq!(meta.headers.len(), 1);
                assert_eq!(meta.headers["Content-Type"], JSON_CONTENT_TYPE);
                let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(json["message"], "success");
            }
            other => panic!("Expected content, got {:?}", other),
        }
    }

    #[test]
    fn test_no_body_means_empty() {
        let spec = spec_for(
            r#"
mocks:
  - id: redirect
    response:
      status: 302
      headers:
        Location: http://localhost/elsewhere
"#,
        );
        let req = Request::get("http://localhost/").unwrap();
        match spec.respond(&req) {
            ResponseOutcome::Success(meta, Body::Empty) => {
                assert_eq!(meta.status, 302);
                assert_eq!(meta.headers.len(), 1);
            }
            other => panic!("Expected empty success, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_delay_config() {
        let yaml = r#"
mocks:
  - id: slow-response
    response:
      status: 200
    delay:
      fixed_ms: 1000
"#;
        let config = MockFileConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.mocks[0].delay.as_ref().unwrap().fixed_ms, 1000);
        assert_eq!(
            config.to_specs().unwrap()[0].delay(),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_fault_replaces_response() {
        let spec = spec_for(
            r#"
mocks:
  - id: refused
    response:
      status: 200
    fault:
      type: connection_refused
"#,
        );
        let req = Request::get("http://localhost/").unwrap();
        match spec.respond(&req) {
            ResponseOutcome::Failure(InterceptError::Simulated { kind, .. }) => {
                assert_eq!(kind, FailureKind::ConnectionRefused);
            }
            other => panic!("Expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_error_fault_message() {
        let fault = FaultConfig::Error {
            message: Some("Internal Server Error".to_string()),
        };
        assert_eq!(
            fault.to_error("x"),
            InterceptError::simulated(FailureKind::Other, "Internal Server Error")
        );
    }

    #[test]
    fn test_template_response() {
        let spec = spec_for(
            r#"
mocks:
  - id: user-by-id
    request:
      method: [GET]
      url:
        type: template
        template: /users/{id}
    response:
      status: 200
      template: true
      body:
        type: json
        content:
          id: "{{params.id}}"
          name: "User {{params.id}}"
"#,
        );
        let req = Request::get("http://localhost/users/42").unwrap();
        assert!(spec.matches(&req));
        match spec.respond(&req) {
            ResponseOutcome::Success(_, Body::Content(bytes)) => {
                let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(json["id"], "42");
                assert_eq!(json["name"], "User 42");
            }
            other => panic!("Expected content, got {:?}", other),
        }
    }

    #[test]
    fn test_validation_errors() {
        let empty_id = "mocks:\n  - id: \"\"\n";
        assert!(MockFileConfig::from_yaml(empty_id).is_err());

        let duplicate = "mocks:\n  - id: a\n  - id: a\n";
        assert!(MockFileConfig::from_yaml(duplicate).is_err());

        let bad_status = "mocks:\n  - id: a\n    response:\n      status: 42\n";
        assert!(MockFileConfig::from_yaml(bad_status).is_err());

        let bad_regex =
            "mocks:\n  - id: a\n    request:\n      url:\n        type: regex\n        pattern: \"(\"\n";
        assert!(MockFileConfig::from_yaml(bad_regex).is_err());

        let unknown_field = "mocks:\n  - id: a\n    priority: 3\n";
        assert!(MockFileConfig::from_yaml(unknown_field).is_err());
    }

    #[test]
    fn test_delay_calculation() {
        let fixed = DelayConfig {
            fixed_ms: 100,
            min_ms: 0,
            max_ms: 0,
        };
        assert_eq!(fixed.calculate(), 100);

        let range = DelayConfig {
            fixed_ms: 0,
            min_ms: 50,
            max_ms: 150,
        };
        let delay = range.calculate();
        assert!((50..=150).contains(&delay));
    }

    #[test]
    fn test_response_body_to_bytes() {
        let text = ResponseBody::Text {
            content: "hello".to_string(),
        };
        assert_eq!(text.to_bytes().unwrap(), b"hello");

        let b64 = ResponseBody::Base64 {
            content: "aGk=".to_string(),
        };
        assert_eq!(b64.to_bytes().unwrap(), b"hi");

        let bad = ResponseBody::Base64 {
            content: "!!".to_string(),
        };
        assert!(bad.to_bytes().is_err());
    }

    #[test]
    fn test_from_file_and_register_all() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
settings:
  log_matches: false
mocks:
  - id: first
    request:
      url:
        type: prefix
        value: http://localhost/
  - id: second
    request:
      url:
        type: exact
        value: http://localhost/a
"#
        )
        .unwrap();

        let config = MockFileConfig::from_file(file.path()).unwrap();
        assert!(!config.registry_settings().log_matches);

        let registry = InterceptionRegistry::new(Arc::new(ClientConfig::new()));
        let ids = config.register_all(&registry).unwrap();
        assert_eq!(ids.len(), 2);

        let found = registry
            .resolve(&Request::get("http://localhost/a").unwrap())
            .unwrap();
        assert_eq!(found.id(), ids[0]);
        assert_eq!(found.label(), "first");
    }
}
