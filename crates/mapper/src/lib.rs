//! Corral mapper: pure, bidirectional translation between declarative records and remote objects.
//!
//! `expand` turns a record into the typed wire object, `flatten` writes a wire object back into a
//! record. Neither direction performs I/O. Kinds with mutually exclusive sub-configurations model
//! them as enums and go through [`variant`] to decide which one is in use.

#![forbid(unsafe_code)]

use corral_core::{EngineResult, Record, RemoteObject, ResourceKind};

pub mod alert;
pub mod auth;
pub mod cluster;
pub mod credential;
pub mod diff;
pub mod fields;
pub mod network;
pub mod node_pool;
pub mod project;
pub mod variant;

pub use fields::Reader;

/// Record <-> wire object translation for one resource kind.
pub trait Mapper: Default + Send + Sync + 'static {
    type Remote: RemoteObject;

    fn expand(&self, record: &Record) -> EngineResult<Self::Remote>;

    /// Write every mapped field of `remote` into `record`. Fields the mapper does not own are
    /// left alone, and sensitive values the remote omits are kept.
    fn flatten(&self, remote: &Self::Remote, record: &mut Record) -> EngineResult<()>;

    fn kind(&self) -> ResourceKind { Self::Remote::KIND }
}

/// A nested block with its own expand/flatten pair.
pub trait Block: Sized {
    fn expand(r: &Reader<'_>) -> EngineResult<Self>;

    /// `prior` is the caller's previous value of this block, if any.
    fn flatten(&self, prior: Option<&Record>) -> Record;

    /// Remote-side consistency, checked before a remote object is flattened.
    fn check(&self) -> EngineResult<()> { Ok(()) }
}

pub fn expand_block<T: Block>(r: &Reader<'_>, key: &str) -> EngineResult<Option<T>> {
    r.block(key)?.map(|b| T::expand(&b)).transpose()
}

pub fn expand_blocks<T: Block>(r: &Reader<'_>, key: &str) -> EngineResult<Vec<T>> {
    r.blocks(key)?.iter().map(T::expand).collect()
}

/// Flatten an optional block; `prior` is the enclosing record the block previously lived in.
pub fn flatten_block<T: Block>(out: &mut Record, key: &str, item: Option<&T>, prior: Option<&Record>) {
    let rec = item.map(|t| t.flatten(fields::prior_block(prior, key, 0)));
    fields::put_block(out, key, rec);
}

pub fn flatten_blocks<T: Block>(out: &mut Record, key: &str, items: &[T], prior: Option<&Record>) {
    let recs = items.iter().enumerate().map(|(i, t)| t.flatten(fields::prior_block(prior, key, i))).collect();
    fields::put_blocks(out, key, recs);
}

macro_rules! remote_object {
    ($ty:ty, $kind:expr) => {
        impl corral_core::RemoteObject for $ty {
            const KIND: corral_core::ResourceKind = $kind;
            fn meta(&self) -> &corral_core::ResourceMeta { &self.meta }
            fn meta_mut(&mut self) -> &mut corral_core::ResourceMeta { &mut self.meta }
        }
    };
}
pub(crate) use remote_object;
