// ── Authoritative device store ──
//
// The reconciler and the reactive collection it owns.

mod collection;
mod reconciler;

pub use reconciler::Reconciler;
