//! The Adapter Runtime: the lazy multi-consumer `Stream`, the adapter
//! contract and built-in catalogue, the Request Context that makes the
//! local/scheduler/execute/uplink routing decision, and the content-addressed
//! caching collaborator.

pub mod adapter;
pub mod adapters;
pub mod caching;
pub mod combinators;
pub mod filesystem;
pub mod request;
pub mod stream;

pub use adapter::{read_single_input, AdapterBody, AdapterHandle, Item};
pub use caching::{cached_or_produce, compute_hash_key, CachingIterator, FileCachingIterator};
pub use combinators::{join_discarding, zip_into};
pub use filesystem::{join_paths, FileSystem, LocalFileSystem};
pub use request::DfmRequest;
pub use stream::{Stream, StreamCursor, Terminal};
