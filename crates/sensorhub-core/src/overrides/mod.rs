// ── Local overrides ──
//
// Durable per-device configuration and the saved-devices fallback list.

mod kv;
mod store;

pub use kv::{FileKv, KeyValueStore, MemoryKv};
pub use store::{ApiUplink, ConfigUplink, LocalOverrideStore};
