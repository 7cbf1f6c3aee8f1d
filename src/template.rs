//! Template engine for dynamic responses.
//!
//! Uses Handlebars to render response bodies from the intercepted request.

use crate::matcher::MatchContext;
use crate::request::Request;
use handlebars::{handlebars_helper, Handlebars};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Template engine for rendering dynamic responses.
pub struct TemplateEngine {
    handlebars: Handlebars<'static>,
}

/// Context for template rendering.
#[derive(Debug, Serialize)]
pub struct TemplateContext {
    /// Request method
    pub method: String,
    /// Full request URL
    pub url: String,
    /// URL path
    pub path: String,
    /// Parameters from URL template matching
    pub params: HashMap<String, String>,
    /// Regex capture groups
    pub captures: HashMap<String, String>,
    /// Query parameters
    pub query: HashMap<String, String>,
    /// Request headers, names lowercased
    pub headers: HashMap<String, String>,
    /// Request body (as string, if text)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Request body as JSON (if parseable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
}

impl TemplateContext {
    pub fn new(match_ctx: &MatchContext, request: &Request) -> Self {
        let body = request.body_str().map(String::from);
        let json = body.as_deref().and_then(|s| serde_json::from_str(s).ok());

        Self {
            method: request.method.to_string(),
            url: request.url.to_string(),
            path: request.url.path().to_string(),
            params: match_ctx.path_params.clone(),
            captures: match_ctx.captures.clone(),
            query: request.query_params(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
            body,
            json,
        }
    }
}

impl TemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();

        handlebars.register_helper("json", Box::new(json_helper));
        handlebars.register_helper("default", Box::new(default_helper));
        handlebars.register_helper("upper", Box::new(upper_helper));
        handlebars.register_helper("lower", Box::new(lower_helper));

        // Bodies are not HTML
        handlebars.register_escape_fn(handlebars::no_escape);

        Self { handlebars }
    }

    /// Render a template string against the request.
    pub fn render(
        &self,
        template: &str,
        ctx: &TemplateContext,
    ) -> Result<String, handlebars::RenderError> {
        self.handlebars.render_template(template, ctx)
    }

    /// Render every templated string inside a JSON value.
    pub fn render_json(
        &self,
        value: &Value,
        ctx: &TemplateContext,
    ) -> Result<Value, handlebars::RenderError> {
        match value {
            Value::String(s) if s.contains("{{") => Ok(Value::String(self.render(s, ctx)?)),
            Value::Array(items) => items
                .iter()
                .map(|v| self.render_json(v, ctx))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(fields) => fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), self.render_json(v, ctx)?)))
                .collect::<Result<serde_json::Map<_, _>, _>>()
                .map(Value::Object),
            _ => Ok(value.clone()),
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

handlebars_helper!(json_helper: |v: Json| match v {
    Value::String(s) => s.clone(),
    other => other.to_string(),
});

handlebars_helper!(default_helper: |v: Json, fallback: str| match v {
    Value::Null => fallback.to_string(),
    Value::String(s) if s.is_empty() => fallback.to_string(),
    Value::String(s) => s.clone(),
    other => other.to_string(),
});

handlebars_helper!(upper_helper: |v: Json| v.as_str().unwrap_or("").to_uppercase());

handlebars_helper!(lower_helper: |v: Json| v.as_str().unwrap_or("").to_lowercase());
