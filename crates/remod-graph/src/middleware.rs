//! Context middleware: rules that rewrite or classify a request before and
//! after structural resolution.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::context::Context;
use crate::ids::is_absolute_url;

type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;
type RewriteFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Test applied to a request string.
#[derive(Clone)]
pub enum Matcher {
    Exact(String),
    /// Matches the value itself or anything below it (`react`, `react/dom`).
    Package(String),
    Prefix(String),
    Pattern(Regex),
    Predicate(Predicate),
}

impl Matcher {
    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Matcher::Predicate(Arc::new(f))
    }

    /// Build from a config entry: `/.../` is a regex, anything else a package name.
    pub fn from_pattern(pattern: &str) -> Result<Self, regex::Error> {
        match pattern
            .strip_prefix('/')
            .and_then(|p| p.strip_suffix('/'))
        {
            Some(inner) if !inner.is_empty() => Ok(Matcher::Pattern(Regex::new(inner)?)),
            _ => Ok(Matcher::Package(pattern.to_string())),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(exact) => value == exact,
            Matcher::Package(name) => {
                value == name
                    || value
                        .strip_prefix(name.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
            Matcher::Prefix(prefix) => value.starts_with(prefix.as_str()),
            Matcher::Pattern(re) => re.is_match(value),
            Matcher::Predicate(f) => f(value),
        }
    }

    /// Replace the matched part of `value` with `target`.
    fn substitute(&self, value: &str, target: &str) -> String {
        match self {
            Matcher::Package(name) | Matcher::Prefix(name) => {
                format!("{target}{}", &value[name.len().min(value.len())..])
            }
            Matcher::Pattern(re) => re.replace(value, target).into_owned(),
            Matcher::Exact(_) | Matcher::Predicate(_) => target.to_string(),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Exact(v) => f.debug_tuple("Exact").field(v).finish(),
            Matcher::Package(v) => f.debug_tuple("Package").field(v).finish(),
            Matcher::Prefix(v) => f.debug_tuple("Prefix").field(v).finish(),
            Matcher::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Matcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A `(test, apply)` rule run against a [`Context`] until no rule mutates it.
#[derive(Clone)]
pub enum ContextMiddleware {
    /// Delegate to the runtime loader under the request's own name.
    External(Matcher),
    /// Replace the request with nothing.
    Null(Matcher),
    /// Rewrite the matched part of the request.
    Alias { matcher: Matcher, target: String },
    /// Pin the module id.
    Force { matcher: Matcher, module_id: String },
    /// Arbitrary rewrite; returning `None` leaves the request alone.
    Rewrite { matcher: Matcher, rewrite: RewriteFn },
}

impl ContextMiddleware {
    pub fn rewrite(
        matcher: Matcher,
        rewrite: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        ContextMiddleware::Rewrite {
            matcher,
            rewrite: Arc::new(rewrite),
        }
    }

    /// Absolute URLs and `data:` URIs are always external.
    pub fn defaults() -> Vec<Self> {
        vec![
            ContextMiddleware::External(Matcher::predicate(is_absolute_url)),
            ContextMiddleware::External(Matcher::Prefix("data:".to_string())),
        ]
    }

    fn matcher(&self) -> &Matcher {
        match self {
            ContextMiddleware::External(m) | ContextMiddleware::Null(m) => m,
            ContextMiddleware::Alias { matcher, .. }
            | ContextMiddleware::Force { matcher, .. }
            | ContextMiddleware::Rewrite { matcher, .. } => matcher,
        }
    }

    /// Apply to `ctx` if the rule matches. Returns whether anything changed.
    pub fn apply(&self, ctx: &mut Context) -> bool {
        let Some(request) = ctx.request.clone() else {
            return false;
        };
        if !self.matcher().matches(&request) {
            return false;
        }

        match self {
            ContextMiddleware::External(_) => {
                let changed = !ctx.external || ctx.force.as_deref() != Some(request.as_str());
                ctx.external = true;
                ctx.force = Some(request);
                changed
            }
            ContextMiddleware::Null(_) => {
                ctx.request = None;
                true
            }
            ContextMiddleware::Alias { matcher, target } => {
                let next = matcher.substitute(&request, target);
                set_request(ctx, request, next)
            }
            ContextMiddleware::Force { module_id, .. } => {
                let changed = ctx.force.as_deref() != Some(module_id.as_str());
                ctx.force = Some(module_id.clone());
                changed
            }
            ContextMiddleware::Rewrite { rewrite, .. } => match rewrite(&request) {
                Some(next) => set_request(ctx, request, next),
                None => false,
            },
        }
    }
}

fn set_request(ctx: &mut Context, current: String, next: String) -> bool {
    if next == current {
        return false;
    }
    ctx.request = Some(next);
    true
}

impl fmt::Debug for ContextMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextMiddleware::External(m) => f.debug_tuple("External").field(m).finish(),
            ContextMiddleware::Null(m) => f.debug_tuple("Null").field(m).finish(),
            ContextMiddleware::Alias { matcher, target } => f
                .debug_struct("Alias")
                .field("matcher", matcher)
                .field("target", target)
                .finish(),
            ContextMiddleware::Force { matcher, module_id } => f
                .debug_struct("Force")
                .field("matcher", matcher)
                .field("module_id", module_id)
                .finish(),
            ContextMiddleware::Rewrite { matcher, .. } => f
                .debug_struct("Rewrite")
                .field("matcher", matcher)
                .finish_non_exhaustive(),
        }
    }
}
