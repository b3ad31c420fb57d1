//! Playlist items and update actions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::display::DisplayHandle;

/// What to do with the display when MPV expands one entry into several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
  /// Keep the display as is; new entries map back to the original line.
  #[default]
  Stay,
  /// Overwrite the original line with one line per new entry.
  Paste,
  /// Open a new surface holding the new entries.
  #[serde(alias = "new")]
  Replace,
}

impl UpdateAction {
  /// Actions that only make sense for a playlist of one item.
  pub fn is_single_item_only(self) -> bool {
    matches!(self, UpdateAction::Paste | UpdateAction::Replace)
  }
}

/// One playlist entry as the display knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistItem {
  /// File path or URL handed to MPV.
  pub filename: String,
  /// Line this item lives on.
  pub handle: DisplayHandle,
  /// Rewrite the line as `[title](filename)` once the title is known.
  pub rewrite: bool,
  /// Show the now-playing title next to the line.
  pub show_current: bool,
}

/// References found on one display line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistSeed {
  /// Line number on the surface.
  pub line: usize,
  /// Files or URLs, in order.
  pub references: Vec<String>,
  /// The line holds nothing but this single reference and may be rewritten.
  pub rewritable: bool,
}

/// Player ids are assigned 1, 2, 3... in load order, matching what a fresh
/// MPV assigns to appended files.
pub fn build_items(
  seeds: &[PlaylistSeed],
  handles: &[DisplayHandle],
  markdown: bool,
) -> BTreeMap<i64, PlaylistItem> {
  let mut items = BTreeMap::new();
  let mut next_id = 1;
  for (seed, handle) in seeds.iter().zip(handles) {
    for reference in &seed.references {
      items.insert(
        next_id,
        PlaylistItem {
          filename: reference.clone(),
          handle: *handle,
          rewrite: seed.rewritable && markdown,
          show_current: !seed.rewritable,
        },
      );
      next_id += 1;
    }
  }
  items
}

/// Markdown link for a loaded title. Brackets in the title would break the
/// link, so they become parentheses.
pub fn markdown_line(title: &str, filename: &str) -> String {
  format!("[{}]({})", title.replace('[', "(").replace(']', ")"), filename)
}

/// Filenames with parentheses cannot be the target of a markdown link.
pub fn can_markdown(filename: &str) -> bool {
  !filename.contains('(') && !filename.contains(')')
}

/// Decides the update action for a playlist that starts as a single query
/// reference. `None` means "not a query, use the configured default".
#[derive(Clone)]
pub struct QueryPredicate(Arc<dyn Fn(&str) -> Option<UpdateAction> + Send + Sync>);

impl QueryPredicate {
  pub fn new(predicate: impl Fn(&str) -> Option<UpdateAction> + Send + Sync + 'static) -> Self {
    Self(Arc::new(predicate))
  }

  /// youtube-dl searches: one result is pasted in place, several get their
  /// own surface.
  pub fn youtube_search() -> Self {
    let Ok(search) = Regex::new(r"^ytdl://\s*ytsearch(\d*):") else {
      return Self::new(|_| None);
    };
    Self::new(move |reference| {
      let captures = search.captures(reference)?;
      match captures.get(1).map(|m| m.as_str()) {
        None | Some("") | Some("1") => Some(UpdateAction::Paste),
        Some(_) => Some(UpdateAction::Replace),
      }
    })
  }

  pub fn evaluate(&self, reference: &str) -> Option<UpdateAction> {
    (self.0)(reference)
  }
}

impl Default for QueryPredicate {
  fn default() -> Self {
    Self::youtube_search()
  }
}

impl fmt::Debug for QueryPredicate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("QueryPredicate(..)")
  }
}
