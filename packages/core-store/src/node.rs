//! The public surface: a store handle and the nodes it addresses.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;

use structkv_ll_store::{KvBackend, RangeRequest, Revision};

use crate::codec;
use crate::engine;
use crate::metadata::MetaStore;
use crate::tag::Tags;
use crate::template::{self, Resolve};
use crate::translate::translate;
use crate::{path, Config, Error, Kind, Location, Options, Value};

/// A backend plus the configuration used to lay values out on it.
///
/// Cloning is cheap; clones share the backend.
///
/// ```rust
/// use structkv_core_store::{Options, TreeStore, Value};
/// use structkv_mem_store::MemoryKv;
///
/// let store = TreeStore::with_defaults(MemoryKv::new());
/// let app = store.node("/app").unwrap();
/// app.put(&Value::from(vec!["a", "b"]), &Options::new().lock()).unwrap();
///
/// let second = store.node("/app/1").unwrap();
/// assert_eq!(second.get(&Options::new()).unwrap(), Value::from("b"));
/// ```
#[derive(Clone)]
pub struct TreeStore {
    backend: Arc<dyn KvBackend>,
    config: Arc<Config>,
}

impl TreeStore {
    /// Wrap `backend`, rejecting an invalid `config`.
    pub fn new(backend: impl KvBackend + 'static, config: Config) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            backend: Arc::new(backend),
            config: Arc::new(config),
        })
    }

    pub fn with_defaults(backend: impl KvBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
            config: Arc::new(Config::default()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &dyn KvBackend {
        self.backend.as_ref()
    }

    /// The node at absolute (or root-relative) path `dir`.
    pub fn node(&self, dir: &str) -> Result<Node, Error> {
        Node {
            store: self.clone(),
            location: Location::root(&self.config.metadata),
        }
        .node(dir)
    }

    fn meta(&self) -> MetaStore<'_> {
        MetaStore::new(self.backend.as_ref(), &self.config.metadata)
    }

    fn tags(&self) -> Tags<'_> {
        Tags::new(self.backend.as_ref(), &self.config.metadata)
    }
}

impl fmt::Debug for TreeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// One addressed node of the tree.
///
/// A node is just a [`Location`] bound to a store: creating one translates
/// its path but reads no data, and nothing is cached between calls.
#[derive(Clone, Debug)]
pub struct Node {
    store: TreeStore,
    location: Location,
}

impl Node {
    /// A node addressed relative to this one, or absolutely.
    ///
    /// Positional segments under sequences are resolved to element ids now,
    /// so the returned node keeps addressing the same element if earlier
    /// elements are later deleted.
    pub fn node(&self, dir: &str) -> Result<Node, Error> {
        let target = if path::is_abs(dir) {
            path::clean(dir)
        } else {
            path::join(&[self.location.logical(), dir])
        };
        self.check_data_path(&target)?;

        let physical = translate(
            &self.store.meta(),
            self.location.physical(),
            self.location.logical(),
            &target,
        )?;
        Ok(Node {
            store: self.store.clone(),
            location: Location::new(&target, &physical, &self.store.config.metadata),
        })
    }

    fn check_data_path(&self, target: &str) -> Result<(), Error> {
        if path::is_root(target) {
            return Err(Error::invalid_argument("the store root is not a data path"));
        }
        let layout = &self.store.config.metadata;
        let meta_root = layout.root();
        if path::is_ancestor(&meta_root, target) || path::is_ancestor(target, &meta_root) {
            return Err(Error::invalid_argument(format!(
                "{} overlaps the metadata namespace {}",
                target, meta_root
            )));
        }
        if let Some(segment) = path::branches(target)
            .into_iter()
            .find(|s| layout.is_reserved(s))
        {
            return Err(Error::invalid_argument(format!(
                "segment {:?} of {} is reserved for metadata",
                segment, target
            )));
        }
        Ok(())
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn logical(&self) -> &str {
        self.location.logical()
    }

    pub fn physical(&self) -> &str {
        self.location.physical()
    }

    pub fn metadata(&self) -> &str {
        self.location.metadata()
    }

    fn root_name(&self) -> &str {
        self.location.top_level().unwrap_or_default()
    }

    fn revision(&self, opts: &Options) -> Result<Option<Revision>, Error> {
        opts.tag_name()
            .map(|tag| self.store.tags().resolve(self.root_name(), tag))
            .transpose()
    }

    pub fn kind(&self, opts: &Options) -> Result<Kind, Error> {
        self.store
            .meta()
            .kind_at(self.physical(), self.revision(opts)?)
    }

    /// Read the node.
    ///
    /// With `tags_only` the result is the array of tag names of this node's
    /// top-level root; with `keys_only` it is the array of child-order keys
    /// (see [`Node::keys`]). Otherwise the decoded value, with references
    /// resolved when `eval` is set.
    pub fn get(&self, opts: &Options) -> Result<Value, Error> {
        if opts.is_tags_only() {
            return Ok(Value::from(self.tags()?));
        }
        let revision = self.revision(opts)?;
        if opts.is_keys_only() {
            return Ok(Value::from(self.keys_at(revision)?));
        }
        let value = self.read_at(revision)?;
        self.evaluate(value, opts)
    }

    /// Stored child-order keys: map keys, or stable element ids for a
    /// sequence, in insertion order.
    pub fn keys(&self, opts: &Options) -> Result<Vec<String>, Error> {
        self.keys_at(self.revision(opts)?)
    }

    /// Tag names bound under this node's top-level root, oldest first.
    pub fn tags(&self) -> Result<Vec<String>, Error> {
        self.store.tags().list(self.root_name(), None)
    }

    fn keys_at(&self, revision: Option<Revision>) -> Result<Vec<String>, Error> {
        self.store
            .meta()
            .child_order(self.physical(), revision, None)
    }

    fn read_at(&self, revision: Option<Revision>) -> Result<Value, Error> {
        let resp = self
            .store
            .backend
            .range(&RangeRequest::prefix(self.physical()).at_revision(revision))?;
        codec::decode(&self.store.meta(), self.physical(), &resp.kvs, revision)
    }

    fn evaluate(&self, value: Value, opts: &Options) -> Result<Value, Error> {
        match opts.eval_options() {
            Some(eval) => template::evaluate(
                self,
                value,
                &self.store.config.delimiters,
                eval,
                self.store.config.max_eval_depth,
            ),
            None => Ok(value),
        }
    }

    /// Write `value` here and return the revision of the write.
    ///
    /// Maps merge into an existing map and sequences append to an existing
    /// sequence. With `lock` the write is atomic; with `tag` the resulting
    /// revision is bound to that tag name.
    pub fn put(&self, value: &Value, opts: &Options) -> Result<Revision, Error> {
        if let Some(tag) = opts.tag_name() {
            self.store.tags().ensure_free(self.root_name(), tag)?;
        }
        let revision = engine::put(
            &self.store.meta(),
            &self.store.config,
            self.physical(),
            value,
            opts.write_mode(),
        )?;
        self.bind_tag(opts, revision)?;
        Ok(revision)
    }

    /// Delete this node, its descendants and its metadata in one transaction.
    pub fn delete(&self, opts: &Options) -> Result<Revision, Error> {
        if let Some(tag) = opts.tag_name() {
            self.store.tags().ensure_free(self.root_name(), tag)?;
        }
        let revision = engine::delete(&self.store.meta(), &self.store.config, self.physical())?;
        self.bind_tag(opts, revision)?;
        Ok(revision)
    }

    fn bind_tag(&self, opts: &Options, revision: Revision) -> Result<(), Error> {
        match opts.tag_name() {
            Some(tag) => self.store.tags().create(self.root_name(), tag, revision),
            None => Ok(()),
        }
    }

    /// Visit the direct children in insertion order.
    ///
    /// The visitor receives the map key, or the position for a sequence
    /// element, and the child's value. Returning `ControlFlow::Break` stops
    /// the iteration.
    pub fn for_each<F>(&self, mut visitor: F, opts: &Options) -> Result<(), Error>
    where
        F: FnMut(&str, Value) -> ControlFlow<()>,
    {
        let revision = self.revision(opts)?;
        let meta = self.store.meta();
        let kind = meta.kind_at(self.physical(), revision)?;
        match kind {
            Kind::Map | Kind::Sequence => {}
            Kind::Scalar => {
                return Err(Error::unsupported_operation(format!(
                    "cannot iterate scalar {}",
                    self.logical()
                )))
            }
            Kind::Nil => {
                return Err(Error::unsupported_operation(format!(
                    "cannot iterate {}: nothing stored",
                    self.logical()
                )))
            }
            Kind::Invalid => {
                return Err(Error::unsupported_operation(format!(
                    "cannot iterate {}: kind unknown",
                    self.logical()
                )))
            }
        }

        let layout = &self.store.config.metadata;
        for (position, stored) in meta
            .child_order(self.physical(), revision, None)?
            .into_iter()
            .enumerate()
        {
            let key = match kind {
                Kind::Sequence => position.to_string(),
                _ => stored.clone(),
            };
            let child = Node {
                store: self.store.clone(),
                location: self.location.child(&key, &stored, layout),
            };
            let value = child.read_at(revision)?;
            let value = child.evaluate(value, opts)?;
            if visitor(&key, value).is_break() {
                break;
            }
        }
        Ok(())
    }
}

impl Resolve for Node {
    fn locate(&self, reference: &str) -> String {
        if path::is_abs(reference) {
            path::clean(reference)
        } else {
            path::join(&[self.logical(), reference])
        }
    }

    fn read(&self, logical: &str, tag: Option<&str>) -> Result<Value, Error> {
        let opts = match tag {
            Some(tag) => Options::new().tag(tag),
            None => Options::new(),
        };
        self.node(logical)?.get(&opts)
    }
}
