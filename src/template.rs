//! URL templates - `{{ placeholder }}` parsing, variable discovery and rendering
//!
//! A template is parsed once into literal text and placeholder expressions.
//! Syntax problems are reported by [`Template::parse`]; rendering a parsed
//! template never fails, unbound placeholders simply render as empty text.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Errors raised while parsing a template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unclosed placeholder starting at byte {offset}")]
    Unclosed { offset: usize },

    #[error("empty placeholder at byte {offset}")]
    Empty { offset: usize },

    #[error("invalid placeholder expression '{expr}'")]
    InvalidExpression { expr: String },

    #[error("unknown filter '{name}'")]
    UnknownFilter { name: String },
}

#[derive(Debug, Clone, PartialEq)]
enum Filter {
    Lower,
    Upper,
    Trim,
    UrlEncode,
    Default(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Path(Vec<String>),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Expression {
    operand: Operand,
    filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Expr(Expression),
}

/// Anything placeholders can be looked up in
pub trait Bindings {
    /// Resolve a dotted placeholder path (`["urls", "login"]`) to its text
    fn lookup(&self, path: &[String]) -> Option<String>;
}

impl Bindings for BTreeMap<String, String> {
    fn lookup(&self, path: &[String]) -> Option<String> {
        match path {
            [name] => self.get(name).cloned(),
            _ => None,
        }
    }
}

impl Bindings for HashMap<String, String> {
    fn lookup(&self, path: &[String]) -> Option<String> {
        match path {
            [name] => self.get(name).cloned(),
            _ => None,
        }
    }
}

impl Bindings for Value {
    fn lookup(&self, path: &[String]) -> Option<String> {
        let mut current = self;
        for segment in path {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(value_text(current))
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A parsed URL template
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
    variables: Arc<BTreeSet<String>>,
    order: Vec<String>,
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Template {
    /// Parse template text, rejecting malformed placeholders
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let inner = &rest[start + 2..];
            let end = find_close(inner).ok_or(TemplateError::Unclosed {
                offset: offset + start,
            })?;
            segments.push(Segment::Expr(parse_expression(&inner[..end], offset + start)?));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        let mut order: Vec<String> = Vec::new();
        for segment in &segments {
            if let Segment::Expr(Expression {
                operand: Operand::Path(path),
                ..
            }) = segment
            {
                if !order.contains(&path[0]) {
                    order.push(path[0].clone());
                }
            }
        }

        Ok(Template {
            source: source.to_string(),
            variables: Arc::new(order.iter().cloned().collect()),
            segments,
            order,
        })
    }

    /// Template that renders `source` verbatim, placeholders included
    pub fn literal(source: &str) -> Self {
        let segments = if source.is_empty() {
            Vec::new()
        } else {
            vec![Segment::Text(source.to_string())]
        };
        Template {
            source: source.to_string(),
            segments,
            variables: Arc::default(),
            order: Vec::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Undeclared variable names used by this template
    pub fn variables(&self) -> &BTreeSet<String> {
        &self.variables
    }

    /// Variable names in order of first appearance (for laying out inputs)
    pub fn variable_order(&self) -> &[String] {
        &self.order
    }

    pub fn is_static(&self) -> bool {
        self.order.is_empty()
    }

    /// Substitute placeholders without joining onto a base URL
    pub fn fill(&self, bindings: &dyn Bindings) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Expr(expr) => out.push_str(&evaluate(expr, bindings)),
            }
        }
        out
    }

    /// Substitute placeholders and resolve the result against `base_url`
    pub fn render(&self, bindings: &dyn Bindings, base_url: &str) -> String {
        join_url(base_url, &self.fill(bindings))
    }
}

fn evaluate(expr: &Expression, bindings: &dyn Bindings) -> String {
    let mut value = match &expr.operand {
        Operand::Literal(text) => text.clone(),
        Operand::Path(path) => bindings.lookup(path).unwrap_or_default(),
    };
    for filter in &expr.filters {
        value = match filter {
            Filter::Lower => value.to_lowercase(),
            Filter::Upper => value.to_uppercase(),
            Filter::Trim => value.trim().to_string(),
            Filter::UrlEncode => url::form_urlencoded::byte_serialize(value.as_bytes()).collect(),
            // Applies to empty values as well, so half-filled forms still render
            Filter::Default(fallback) if value.is_empty() => fallback.clone(),
            Filter::Default(_) => value,
        };
    }
    value
}

/// Find the closing `}}`, skipping over quoted string literals
fn find_close(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '}' && bytes.get(i + 1) == Some(&b'}') => return Some(i),
            None => {}
        }
    }
    None
}

/// Split on `|` outside of quotes
fn split_pipes(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '|' => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            None => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*$").expect("valid path regex")
    })
}

fn filter_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^([a-z_]+)\s*(?:\(\s*(?:"([^"]*)"|'([^']*)')?\s*\))?$"#)
            .expect("valid filter regex")
    })
}

fn parse_expression(body: &str, offset: usize) -> Result<Expression, TemplateError> {
    if body.trim().is_empty() {
        return Err(TemplateError::Empty { offset });
    }
    let invalid = || TemplateError::InvalidExpression {
        expr: body.trim().to_string(),
    };

    let parts = split_pipes(body);
    let head = parts[0].trim();
    let operand = if let Some(literal) = quoted(head) {
        Operand::Literal(literal.to_string())
    } else {
        match head {
            "none" | "None" => Operand::Literal(String::new()),
            "true" | "True" => Operand::Literal("true".to_string()),
            "false" | "False" => Operand::Literal("false".to_string()),
            _ if path_regex().is_match(head) => {
                Operand::Path(head.split('.').map(String::from).collect())
            }
            _ => return Err(invalid()),
        }
    };

    let mut filters = Vec::new();
    for part in &parts[1..] {
        let caps = filter_regex().captures(part.trim()).ok_or_else(invalid)?;
        let arg = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str().to_string());
        let filter = match &caps[1] {
            "lower" => Filter::Lower,
            "upper" => Filter::Upper,
            "trim" => Filter::Trim,
            "urlencode" => Filter::UrlEncode,
            "default" | "d" => Filter::Default(arg.unwrap_or_default()),
            name => {
                return Err(TemplateError::UnknownFilter {
                    name: name.to_string(),
                })
            }
        };
        filters.push(filter);
    }

    Ok(Expression { operand, filters })
}

fn quoted(s: &str) -> Option<&str> {
    let first = s.chars().next()?;
    if s.len() >= 2 && (first == '"' || first == '\'') && s.ends_with(first) {
        Some(&s[1..s.len() - 1])
    } else {
        None
    }
}

/// Resolve `reference` against `base` using standard URL-join semantics.
///
/// An absolute reference or one starting with `/` replaces the base path;
/// a relative one is resolved against the base directory. When the base is
/// not a valid URL the reference is returned untouched.
pub fn join_url(base: &str, reference: &str) -> String {
    match Url::parse(base) {
        Ok(base) => match base.join(reference) {
            Ok(joined) => joined.into(),
            Err(_) => reference.to_string(),
        },
        Err(_) => reference.to_string(),
    }
}

fn variable_cache() -> &'static Mutex<HashMap<String, Arc<BTreeSet<String>>>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Arc<BTreeSet<String>>>>> = OnceLock::new();
    CACHE.get_or_init(Default::default)
}

/// Undeclared variables of `template`, cached per distinct template text
pub fn parse_variables(template: &str) -> Result<Arc<BTreeSet<String>>, TemplateError> {
    let cache = variable_cache();
    if let Some(hit) = cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(template)
    {
        return Ok(Arc::clone(hit));
    }

    let variables = Arc::clone(&Template::parse(template)?.variables);
    cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(template.to_string(), Arc::clone(&variables));
    Ok(variables)
}

/// Render raw template text against `bindings` and `base_url`.
///
/// Malformed template text degrades to its literal form instead of failing.
pub fn render(template: &str, bindings: &dyn Bindings, base_url: &str) -> String {
    match Template::parse(template) {
        Ok(parsed) => parsed.render(bindings, base_url),
        Err(e) => {
            tracing::debug!(template, error = %e, "Rendering malformed template literally");
            join_url(base_url, template)
        }
    }
}

/// Resolve a deferred auth URL eagerly against the config context
pub fn resolve_auth_url(
    template: &str,
    context: &Value,
    base_url: &str,
) -> Result<String, TemplateError> {
    Ok(Template::parse(template)?.render(context, base_url))
}
