//! Session state: the current identity, its validity and its persistence.
//!
//! A persisted session is two entries under a common prefix:
//!
//! | Key | Value |
//! |---|---|
//! | `{prefix}identity` | 32-byte session key scalar |
//! | `{prefix}delegation` | JSON delegation chain |

pub mod identity;
pub mod storage;
pub mod store;

pub use identity::{DelegatedIdentity, Identity, RequestSignature};
pub use storage::{KeyValueStorage, MemoryStorage, RedisStorage, StorageError};
pub use store::{SessionAction, SessionStore};
