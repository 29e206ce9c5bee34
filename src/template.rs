//! URL templating: `{name}` placeholder substitution and query-string cleanup.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

// Same unreserved set as a URI component: A-Z a-z 0-9 - _ . ! ~ * ' ( )
const COMPONENT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// The value bound to a placeholder.
///
/// Deserializes from `null`, a string, or an array of strings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// No value: the placeholder is removed.
    #[default]
    Null,
    /// A single value.
    Text(String),
    /// A list of values, joined with commas.
    List(Vec<String>),
}

impl ParamValue {
    /// Renders the value, or `None` when the placeholder should be removed.
    fn render(&self) -> Option<String> {
        let rendered = match self {
            ParamValue::Null => return None,
            ParamValue::Text(text) => text.clone(),
            ParamValue::List(items) => items.join(","),
        };
        (!rendered.is_empty()).then_some(rendered)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl<T: Into<String>> From<Vec<T>> for ParamValue {
    fn from(values: Vec<T>) -> Self {
        ParamValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParamValue::Null, Into::into)
    }
}

/// A named value to substitute into a path template.
///
/// # Examples
///
/// ```
/// use apiengine::template::{build_url, PathQueryParameter};
///
/// let url = build_url(
///     "https://api.example.com",
///     "/posts?keyword={keyword}&page={page}",
///     &[
///         PathQueryParameter::new("keyword", ""),
///         PathQueryParameter::new("page", "1"),
///     ],
/// );
/// assert_eq!(url, "https://api.example.com/posts?page=1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathQueryParameter {
    /// Placeholder name, without braces.
    pub name: String,

    /// The value to inject.
    #[serde(default)]
    pub value: ParamValue,

    /// Percent-encode the value before substitution. Defaults to `true`.
    #[serde(default = "default_encode")]
    pub encode: bool,
}

fn default_encode() -> bool {
    true
}

impl PathQueryParameter {
    /// Creates an encoded parameter.
    pub fn new(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            encode: true,
        }
    }

    /// Creates a parameter injected verbatim, e.g. an already-encoded query string.
    pub fn raw(name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        Self {
            encode: false,
            ..Self::new(name, value)
        }
    }

    fn substitution(&self) -> Option<String> {
        let value = self.value.render()?;
        if self.encode {
            Some(utf8_percent_encode(&value, COMPONENT_ENCODE_SET).to_string())
        } else {
            Some(value)
        }
    }
}

enum Piece<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn pieces(text: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        let Some(len) = rest[open..].find('}') else {
            break;
        };
        let close = open + len;
        let name = &rest[open + 1..close];

        if is_placeholder_name(name) {
            pieces.push(Piece::Literal(&rest[..open]));
            pieces.push(Piece::Placeholder(name));
        } else {
            pieces.push(Piece::Literal(&rest[..=close]));
        }
        rest = &rest[close + 1..];
    }

    pieces.push(Piece::Literal(rest));
    pieces
}

fn lookup(parameters: &[PathQueryParameter], name: &str) -> Option<String> {
    parameters
        .iter()
        .find(|p| p.name == name)
        .and_then(PathQueryParameter::substitution)
}

fn substitute(text: &str, parameters: &[PathQueryParameter]) -> String {
    pieces(text)
        .into_iter()
        .map(|piece| match piece {
            Piece::Literal(literal) => literal.to_string(),
            Piece::Placeholder(name) => lookup(parameters, name).unwrap_or_default(),
        })
        .collect()
}

fn has_unfilled_placeholder(text: &str, parameters: &[PathQueryParameter]) -> bool {
    pieces(text).into_iter().any(|piece| match piece {
        Piece::Placeholder(name) => lookup(parameters, name).is_none(),
        Piece::Literal(_) => false,
    })
}

/// Collapses empty query segments left by removed placeholders.
fn normalize_query(url: String) -> String {
    let Some((head, query)) = url.split_once('?') else {
        return url;
    };

    let query = query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("&");

    if query.is_empty() {
        head.to_string()
    } else {
        format!("{head}?{query}")
    }
}

/// Builds a URL from a base, a path template and its parameters.
///
/// - Encoded parameters are percent-encoded like a URI component; raw ones are
///   injected verbatim.
/// - A query segment whose placeholder has no value (null, empty, or no
///   matching parameter) is dropped entirely, so `key=` never appears.
/// - Placeholders in the path part without a value are removed.
/// - Parameters whose name does not appear in the template are ignored.
pub fn build_url(base_url: &str, template: &str, parameters: &[PathQueryParameter]) -> String {
    let (path, query) = match template.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (template, None),
    };

    let mut url = String::from(base_url);
    url.push_str(&substitute(path, parameters));

    if let Some(query) = query {
        let segments = query
            .split('&')
            .filter(|segment| !has_unfilled_placeholder(segment, parameters))
            .map(|segment| substitute(segment, parameters))
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>();

        if !segments.is_empty() {
            url.push('?');
            url.push_str(&segments.join("&"));
        }
    }

    normalize_query(url)
}
