//! # aparte-shared
//!
//! Types shared by every Aparte crate: the directory identity record, the
//! canonical thread-key resolver, and the symmetric message codec applied at
//! the edges of the message log (encrypt on write, decrypt on read).

pub mod constants;
pub mod crypto;
pub mod identity;
pub mod thread;

mod error;

pub use crypto::{DecryptPolicy, MessageCodec};
pub use error::{CodecError, ResolveError};
pub use identity::Identity;
pub use thread::ThreadKey;
