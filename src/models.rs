//! Core data types - HTTP methods, URL entries and the endpoint tree

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::template::{Template, TemplateError};

/// HTTP Method enum
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    #[default]
    GET,
    POST,
    PUT,
    PATCH,
    DELETE,
    HEAD,
    OPTIONS,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 7] = [
        HttpMethod::GET,
        HttpMethod::POST,
        HttpMethod::PUT,
        HttpMethod::PATCH,
        HttpMethod::DELETE,
        HttpMethod::HEAD,
        HttpMethod::OPTIONS,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
        }
    }

    pub fn has_body(&self) -> bool {
        matches!(self, HttpMethod::POST | HttpMethod::PUT | HttpMethod::PATCH)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method name outside the whitelist
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported HTTP method '{0}'")]
pub struct UnknownMethod(pub String);

impl FromStr for HttpMethod {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownMethod(s.to_string()))
    }
}

/// A templated endpoint with its user-entered values
#[derive(Clone, Debug, PartialEq)]
pub struct UrlEntry {
    template: Template,
    pub method: HttpMethod,
    pub fields: Vec<String>,
    pub bound: BTreeMap<String, String>,
}

impl UrlEntry {
    pub fn new(template: Template, method: HttpMethod, fields: Vec<String>) -> Self {
        UrlEntry {
            template,
            method,
            fields,
            bound: BTreeMap::new(),
        }
    }

    /// Parse `url` and build a `GET` entry without extra fields
    pub fn parse(url: &str) -> Result<Self, TemplateError> {
        Ok(Self::new(Template::parse(url)?, HttpMethod::GET, Vec::new()))
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Template variables plus extra form fields, in input order
    pub fn input_fields(&self) -> Vec<String> {
        let mut names: Vec<String> = self.template.variable_order().to_vec();
        for field in &self.fields {
            if !names.contains(field) {
                names.push(field.clone());
            }
        }
        names
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.bound.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> &str {
        self.bound.get(name).map(String::as_str).unwrap_or("")
    }

    /// Absolute URL for the current bound values
    pub fn render(&self, base_url: &str) -> String {
        self.template.render(&self.bound, base_url)
    }

    /// Bound values of extra fields that do not appear in the URL
    pub fn form_body(&self) -> Vec<(String, String)> {
        self.fields
            .iter()
            .filter(|f| !self.template.variables().contains(*f))
            .map(|f| (f.clone(), self.get(f).to_string()))
            .collect()
    }
}

/// A node in the endpoint tree
#[derive(Clone, Debug, PartialEq)]
pub enum UrlNode {
    Leaf(UrlEntry),
    Group(UrlTree),
}

/// Ordered tree of named endpoints and groups
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UrlTree {
    nodes: Vec<(String, UrlNode)>,
}

impl UrlTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &UrlNode)> {
        self.nodes.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn get(&self, name: &str) -> Option<&UrlNode> {
        self.nodes.iter().find(|(n, _)| n == name).map(|(_, node)| node)
    }

    /// Insert a node, replacing one with the same name in place
    pub fn insert(&mut self, name: impl Into<String>, node: UrlNode) {
        let name = name.into();
        match self.nodes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = node,
            None => self.nodes.push((name, node)),
        }
    }

    /// Look up a leaf by dotted path, e.g. `users.detail`
    pub fn entry(&self, path: &str) -> Option<&UrlEntry> {
        let mut tree = self;
        let mut parts = path.split('.').peekable();
        while let Some(part) = parts.next() {
            match (tree.get(part)?, parts.peek()) {
                (UrlNode::Leaf(entry), None) => return Some(entry),
                (UrlNode::Group(sub), Some(_)) => tree = sub,
                _ => return None,
            }
        }
        None
    }

    /// All leaves as `(dotted path, entry)` in tree order
    pub fn leaves(&self) -> Vec<(String, &UrlEntry)> {
        let mut out = Vec::new();
        self.collect_leaves("", &mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a UrlEntry)>) {
        for (name, node) in &self.nodes {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            match node {
                UrlNode::Leaf(entry) => out.push((path, entry)),
                UrlNode::Group(sub) => sub.collect_leaves(&path, out),
            }
        }
    }

    /// JSON view of the tree with each leaf rendered to its absolute URL
    pub fn to_context(&self, base_url: &str) -> Value {
        let mut map = Map::new();
        for (name, node) in &self.nodes {
            let value = match node {
                UrlNode::Leaf(entry) => Value::String(entry.render(base_url)),
                UrlNode::Group(sub) => sub.to_context(base_url),
            };
            map.insert(name.clone(), value);
        }
        Value::Object(map)
    }
}

/// Response from HTTP request
#[derive(Clone, Debug)]
pub struct Response {
    pub status_code: Option<u16>,
    pub body: String,
    pub time_ms: u64,
    pub received_at: chrono::DateTime<chrono::Utc>,
}

impl Response {
    pub fn new(status_code: Option<u16>, body: String, time_ms: u64) -> Self {
        Response {
            status_code,
            body,
            time_ms,
            received_at: chrono::Utc::now(),
        }
    }
}
