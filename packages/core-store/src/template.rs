//! Reference resolution inside stored strings.
//!
//! A string that is exactly one reference, e.g. `{{/app/port}}`, is replaced
//! by the referenced value with its type intact. References embedded in
//! other text are replaced by their rendering and the result stays a string.
//!
//! ```rust
//! use structkv_core_store::{Delimiters, EvalOptions, Error, Resolve, Value};
//! use structkv_core_store::template::evaluate;
//!
//! struct Fixed;
//!
//! impl Resolve for Fixed {
//!     fn locate(&self, reference: &str) -> String {
//!         reference.to_string()
//!     }
//!
//!     fn read(&self, _logical: &str, _tag: Option<&str>) -> Result<Value, Error> {
//!         Ok(Value::Float(8080.0))
//!     }
//! }
//!
//! let delims = Delimiters::default();
//! let opts = EvalOptions::default();
//! let port = evaluate(&Fixed, Value::from("{{/app/port}}"), &delims, &opts, 8).unwrap();
//! assert_eq!(port, Value::Float(8080.0));
//! let url = evaluate(&Fixed, Value::from("http://host:{{/app/port}}/"), &delims, &opts, 8).unwrap();
//! assert_eq!(url, Value::from("http://host:8080/"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::{path, Delimiters, Error, Value};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Rewrites the raw reference text (delimiters included) before it is used.
pub type FormatHook = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Validates formatted reference text; an error aborts the evaluation.
pub type CheckHook = Arc<dyn Fn(&str) -> Result<(), BoxError> + Send + Sync>;

/// Where references point and how to read them.
pub trait Resolve {
    /// Absolute logical path of `reference` (already stripped of delimiters).
    fn locate(&self, reference: &str) -> String;

    /// Read the raw value at an absolute logical path, as of `tag` if given.
    fn read(&self, logical: &str, tag: Option<&str>) -> Result<Value, Error>;
}

impl<R: Resolve + ?Sized> Resolve for &R {
    fn locate(&self, reference: &str) -> String {
        (**self).locate(reference)
    }

    fn read(&self, logical: &str, tag: Option<&str>) -> Result<Value, Error> {
        (**self).read(logical, tag)
    }
}

/// Hooks and tag scoping for one evaluation.
#[derive(Clone, Default)]
pub struct EvalOptions {
    tags: BTreeMap<String, String>,
    format: Option<FormatHook>,
    check: Option<CheckHook>,
}

impl EvalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read references below the top-level directory `dir` as of tag `name`.
    pub fn with_tag(mut self, dir: &str, name: impl Into<String>) -> Self {
        self.tags.insert(path::clean(dir), name.into());
        self
    }

    pub fn format_with(mut self, hook: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.format = Some(Arc::new(hook));
        self
    }

    pub fn check_with(
        mut self,
        hook: impl Fn(&str) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Self {
        self.check = Some(Arc::new(hook));
        self
    }

    pub fn tag_for(&self, dir: &str) -> Option<&str> {
        self.tags.get(&path::clean(dir)).map(String::as_str)
    }
}

impl fmt::Debug for EvalOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalOptions")
            .field("tags", &self.tags)
            .field("format", &self.format.is_some())
            .field("check", &self.check.is_some())
            .finish()
    }
}

/// Resolve every reference in `value`, following at most `max_depth` levels
/// of references to references.
pub fn evaluate<R: Resolve + ?Sized>(
    resolver: &R,
    value: Value,
    delims: &Delimiters,
    opts: &EvalOptions,
    max_depth: usize,
) -> Result<Value, Error> {
    Evaluator {
        resolver,
        delims,
        opts,
        max_depth,
    }
    .eval(value, 0)
}

struct Evaluator<'a, R: ?Sized> {
    resolver: &'a R,
    delims: &'a Delimiters,
    opts: &'a EvalOptions,
    max_depth: usize,
}

impl<R: Resolve + ?Sized> Evaluator<'_, R> {
    fn eval(&self, value: Value, depth: usize) -> Result<Value, Error> {
        match value {
            Value::String(s) => self.eval_str(s, depth),
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.eval(item, depth))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Map(map) => map
                .into_iter()
                .map(|(k, v)| Ok((k, self.eval(v, depth)?)))
                .collect::<Result<BTreeMap<_, _>, Error>>()
                .map(Value::Map),
            other => Ok(other),
        }
    }

    fn eval_str(&self, s: String, depth: usize) -> Result<Value, Error> {
        let Delimiters { open, close } = self.delims;
        if !s.contains(open.as_str()) || !s.contains(close.as_str()) {
            return Ok(Value::String(s));
        }
        if self.is_single_reference(&s) {
            return self.resolve(&s, depth);
        }

        let mut out = String::with_capacity(s.len());
        let mut rest = s.as_str();
        while let Some(start) = rest.find(open.as_str()) {
            let Some(len) = rest[start + open.len()..].find(close.as_str()) else {
                break;
            };
            let end = start + open.len() + len + close.len();
            out.push_str(&rest[..start]);
            let resolved = self.resolve(&rest[start..end], depth)?;
            out.push_str(&resolved.to_string());
            rest = &rest[end..];
        }
        out.push_str(rest);
        Ok(Value::String(out))
    }

    fn is_single_reference(&self, s: &str) -> bool {
        let Delimiters { open, close } = self.delims;
        s.strip_prefix(open.as_str())
            .and_then(|inner| inner.strip_suffix(close.as_str()))
            .is_some_and(|inner| !inner.contains(open.as_str()) && !inner.contains(close.as_str()))
    }

    /// Resolve one delimited reference to its evaluated value.
    fn resolve(&self, raw: &str, depth: usize) -> Result<Value, Error> {
        if depth >= self.max_depth {
            return Err(Error::template(format!(
                "reference chain deeper than {} at {}",
                self.max_depth, raw
            )));
        }

        let formatted = match &self.opts.format {
            Some(format) => (**format)(raw),
            None => raw.to_string(),
        };
        if let Some(check) = &self.opts.check {
            (**check)(&formatted).map_err(|source| Error::Hook {
                reference: formatted.clone(),
                source,
            })?;
        }

        let Delimiters { open, close } = self.delims;
        let reference = formatted
            .trim()
            .trim_start_matches(open.as_str())
            .trim_end_matches(close.as_str())
            .trim();
        if reference.is_empty() {
            return Err(Error::template(format!("empty reference {:?}", raw)));
        }

        let logical = self.resolver.locate(reference);
        let root = path::parent_d(&logical, 1);
        let tag = self.opts.tag_for(&root);
        tracing::debug!(reference, path = %logical, tag, depth, "resolving reference");

        let value = self.resolver.read(&logical, tag)?;
        self.eval(value, depth + 1)
    }
}
