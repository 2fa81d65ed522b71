//! Eldercare directory lookups for Care Companion.
//!
//! Exposes the directory contract used by the tool invoker, the record type
//! with its condensed one-line rendering, and a SOAP client for the public
//! Eldercare Locator service.

pub mod eldercare;
pub mod record;
pub mod service;

pub use eldercare::EldercareClient;
pub use record::{condense, DirectoryRecord};
pub use service::{DirectoryService, Lookup, StaticDirectory};
