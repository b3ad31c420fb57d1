//! Playlist reconciliation between MPV and the display.
//!
//! - `item.rs` - Display-side items, seeds and update actions
//! - `reconcile.rs` - Id/handle mapping and the update policy
//! - `error.rs` - Reconciliation failures

mod error;
mod item;
mod reconcile;

pub use error::PlaylistError;
pub use item::{
  build_items, can_markdown, markdown_line, PlaylistItem, PlaylistSeed, QueryPredicate,
  UpdateAction,
};
pub use reconcile::{DeltaPlan, LoadResolution, Reconciler};
