//! Per-call options for node operations.

use crate::{EvalOptions, WriteMode};

/// Options accepted by [`Node`](crate::Node) operations.
///
/// Each operation reads only the options that apply to it:
///
/// | option      | get | put | delete | for_each | kind |
/// |-------------|-----|-----|--------|----------|------|
/// | `tag`       | read as of the tag | bind the tag to the write | bind the tag to the delete | read as of the tag | read as of the tag |
/// | `eval`      | resolve references | | | resolve references | |
/// | `keys_only` | child-order keys only | | | | |
/// | `tags_only` | tag names only | | | | |
/// | `lock`      | | atomic write | | | |
///
/// ```rust
/// use structkv_core_store::{EvalOptions, Options};
///
/// let opts = Options::new().tag("v1").eval(EvalOptions::new());
/// assert_eq!(opts.tag_name(), Some("v1"));
/// assert!(opts.eval_options().is_some());
/// assert!(!opts.is_locked());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Options {
    tag: Option<String>,
    eval: Option<EvalOptions>,
    keys_only: bool,
    tags_only: bool,
    lock: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(mut self, name: impl Into<String>) -> Self {
        self.tag = Some(name.into());
        self
    }

    pub fn eval(mut self, eval: EvalOptions) -> Self {
        self.eval = Some(eval);
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    pub fn tags_only(mut self) -> Self {
        self.tags_only = true;
        self
    }

    pub fn lock(mut self) -> Self {
        self.lock = true;
        self
    }

    pub fn tag_name(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn eval_options(&self) -> Option<&EvalOptions> {
        self.eval.as_ref()
    }

    pub fn is_keys_only(&self) -> bool {
        self.keys_only
    }

    pub fn is_tags_only(&self) -> bool {
        self.tags_only
    }

    pub fn is_locked(&self) -> bool {
        self.lock
    }

    pub fn write_mode(&self) -> WriteMode {
        if self.lock {
            WriteMode::Locked
        } else {
            WriteMode::Unlocked
        }
    }
}
