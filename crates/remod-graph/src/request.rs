//! Unresolved module requests.
//!
//! A request may carry attributes inline, e.g. `./worker.js<async>` or
//! `./logo.svg<static,href=/img/logo.svg>`. The attribute block is stripped
//! before resolution.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static ATTRIBUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([^>]+)>").expect("attribute pattern is valid"));

/// Attributes attached to a request. Flags are stored with the value `"true"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestAttributes(BTreeMap<String, String>);

impl RequestAttributes {
    /// Parse a comma-separated attribute list (`async,href=/x`).
    pub fn parse(list: &str) -> Self {
        let map = list
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| match item.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (item.to_string(), "true".to_string()),
            })
            .collect();
        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// True when `key` is present and not `"false"`.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v != "false")
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RequestAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .0
            .iter()
            .filter(|(_, v)| v.as_str() != "false")
            .map(|(k, v)| if v == "true" { k.clone() } else { format!("{k}={v}") })
            .collect();
        if keys.is_empty() {
            Ok(())
        } else {
            write!(f, "<{}>", keys.join(","))
        }
    }
}

/// An unresolved reference to a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    /// Request string with any attribute block removed.
    pub value: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_async: bool,
    #[serde(default, skip_serializing_if = "RequestAttributes::is_empty")]
    pub attributes: RequestAttributes,
}

impl Request {
    /// A synchronous request with no attributes.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_async: false,
            attributes: RequestAttributes::default(),
        }
    }

    /// Split inline attributes off `raw`.
    ///
    /// ```
    /// use remod_graph::Request;
    ///
    /// let request = Request::parse("./worker.js<async>");
    /// assert_eq!(request.value, "./worker.js");
    /// assert!(request.is_async());
    /// ```
    pub fn parse(raw: &str) -> Self {
        let Some(captures) = ATTRIBUTES.captures(raw) else {
            return Self::new(raw.trim());
        };
        let attributes = RequestAttributes::parse(&captures[1]);
        let value = ATTRIBUTES.replace(raw, "").trim().to_string();
        Self {
            value,
            is_async: false,
            attributes,
        }
    }

    pub fn with_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    /// Whether the request is loaded on demand rather than up front.
    pub fn is_async(&self) -> bool {
        self.is_async || self.attributes.flag("async")
    }

    /// Whether the request stands for the resource's URL instead of its
    /// exports. `static` implies `href` unless `href` is set explicitly.
    pub fn is_href(&self) -> bool {
        match self.attributes.get("href") {
            Some(_) => self.attributes.flag("href"),
            None => self.attributes.flag("static"),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.attributes)
    }
}

impl From<&str> for Request {
    fn from(value: &str) -> Self {
        Request::parse(value)
    }
}
