//! # lancslru
//!
//! Concurrency-safe, capacity-bounded LRU cache with a single lookup-or-load
//! entry point.
//!
//! ## Architecture
//! - **HashMap**: AHash index from key to arena slot (O(1))
//! - **LRU List**: arena-backed doubly-linked list, oldest to youngest (O(1))
//! - **Locking**: one structural mutex, released while loaders run
//! - **Singleflight**: at most one in-flight load per key
//!
//! ```
//! use lancslru::Cache;
//!
//! let cache = Cache::<String, usize>::new(2).unwrap();
//! let len = cache
//!     .lookup("hello".to_string(), |k| Ok::<_, std::io::Error>(k.len()))
//!     .unwrap();
//! assert_eq!(len, 5);
//! ```

#![warn(missing_docs)]

mod cache;
mod error;
mod lru;

pub use cache::Cache;
pub use error::{CapacityError, LoadError};
