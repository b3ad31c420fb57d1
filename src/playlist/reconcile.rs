//! Mapping between MPV playlist ids and display handles.
//!
//! MPV and the editor both mutate their side of the playlist. The
//! [`Reconciler`] keeps the id → handle table consistent and decides what a
//! redirect, a load or a deletion means for the other side. It never performs
//! I/O: callers execute the returned plans.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::error::PlaylistError;
use super::item::{markdown_line, PlaylistItem, UpdateAction};
use crate::display::DisplayHandle;
use crate::mpv::{PlaylistDelta, PlaylistEntry};

/// Where a `file-loaded` points.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadResolution {
  /// The event belongs to a different `start-file` than the cached one.
  Stale { expected: Option<i64>, got: i64 },
  /// A known item.
  Direct { id: i64, item: PlaylistItem },
  /// An entry created by a redirect, shown on its origin's line.
  Remapped {
    id: i64,
    origin_id: i64,
    origin: PlaylistItem,
  },
  /// Nothing known about this id.
  Unresolved { id: Option<i64> },
}

/// Display work required by a redirect.
#[derive(Debug, Clone, PartialEq)]
pub enum DeltaPlan {
  /// Only the id tables changed.
  Stay { remapped: usize },
  /// Overwrite the origin line with `lines`.
  Paste {
    origin_id: i64,
    origin: DisplayHandle,
    lines: Vec<String>,
    /// 1-based line of the entry playing now.
    current_line: usize,
    markdown: bool,
    entries: Vec<PlaylistEntry>,
  },
  /// Move everything to a new surface seeded with `lines`.
  Replace {
    origin_id: i64,
    origin: DisplayHandle,
    lines: Vec<String>,
    entries: Vec<PlaylistEntry>,
  },
}

/// Id/handle bookkeeping for one session.
#[derive(Debug, Default)]
pub struct Reconciler {
  items: BTreeMap<i64, PlaylistItem>,
  /// New id → id of the entry it was expanded from.
  remap: HashMap<i64, i64>,
  /// Expanded id → first id inserted in its place.
  updated_indices: HashMap<i64, i64>,
  /// Titles MPV reported, by filename.
  loaded_titles: HashMap<String, String>,
  pending_start: Option<i64>,
  stay_latched: bool,
}

impl Reconciler {
  pub fn new(items: BTreeMap<i64, PlaylistItem>) -> Self {
    Self {
      items,
      ..Default::default()
    }
  }

  pub fn items(&self) -> &BTreeMap<i64, PlaylistItem> {
    &self.items
  }

  pub fn item(&self, id: i64) -> Option<&PlaylistItem> {
    self.items.get(&id)
  }

  pub fn remap(&self) -> &HashMap<i64, i64> {
    &self.remap
  }

  /// Filenames in the order MPV should load them.
  pub fn load_order(&self) -> Vec<String> {
    self.items.values().map(|item| item.filename.clone()).collect()
  }

  /// Number of logical entries: every item plus every remapped entry, minus
  /// the origins those remaps replaced.
  pub fn len(&self) -> usize {
    let targets: HashSet<i64> = self.remap.values().copied().collect();
    (self.items.len() + self.remap.len()).saturating_sub(targets.len())
  }

  /// Action used for a redirect. Once a single-item-only action meets a
  /// playlist of more than one entry, every later redirect stays.
  pub fn effective_action(&mut self, configured: UpdateAction) -> UpdateAction {
    if self.stay_latched {
      return UpdateAction::Stay;
    }
    if configured.is_single_item_only() && self.len() > 1 {
      log::debug!("Playlist has {} entries, staying instead of {:?}", self.len(), configured);
      self.stay_latched = true;
      return UpdateAction::Stay;
    }
    configured
  }

  /// `start-file`: remember which entry is about to load.
  pub fn on_start_file(&mut self, id: Option<i64>) {
    self.pending_start = id;
  }

  /// `file-loaded`: resolve the loaded entry.
  pub fn on_file_loaded(&mut self, entry: Option<i64>) -> LoadResolution {
    let id = match (entry, self.pending_start) {
      (Some(got), Some(expected)) if got != expected => {
        return LoadResolution::Stale {
          expected: Some(expected),
          got,
        };
      }
      (Some(got), _) => got,
      (None, Some(expected)) => expected,
      (None, None) => return LoadResolution::Unresolved { id: None },
    };

    if let Some(item) = self.items.get(&id) {
      return LoadResolution::Direct {
        id,
        item: item.clone(),
      };
    }

    if let Some(origin_id) = self.remap.get(&id).copied() {
      if let Some(origin) = self.items.get(&origin_id) {
        return LoadResolution::Remapped {
          id,
          origin_id,
          origin: origin.clone(),
        };
      }
    }

    log::debug!(
      "Playlist transition failed! Mpv id {} does not exist in {:?}",
      id,
      self.items
    );
    LoadResolution::Unresolved { id: Some(id) }
  }

  /// Record a title MPV reported for `filename`.
  pub fn remember_title(&mut self, filename: &str, title: &str) {
    self
      .loaded_titles
      .insert(filename.to_string(), title.to_string());
  }

  /// Title to show for the entry `id`: the live playlist's, or one seen
  /// before for the same file.
  pub fn current_title(&self, id: i64, snapshot: &[PlaylistEntry]) -> Option<String> {
    let entry = snapshot.iter().find(|entry| entry.id == id)?;
    entry
      .title
      .clone()
      .or_else(|| self.loaded_titles.get(&entry.filename).cloned())
  }

  /// Work out what a redirect means for the display.
  pub fn plan_delta(
    &mut self,
    delta: &PlaylistDelta,
    configured: UpdateAction,
  ) -> Result<DeltaPlan, PlaylistError> {
    let original = delta.original_id;
    let start = delta.insert_start;
    let end = start + delta.insert_count;

    // An expanded entry may itself come from an earlier expansion. Everything
    // maps to the item that owns the display line.
    let root = self.remap.get(&original).copied().unwrap_or(original);
    if root == original || self.updated_indices.get(&root) == Some(&original) {
      self.updated_indices.insert(root, start);
    }

    let action = self.effective_action(configured);
    if action == UpdateAction::Stay {
      if root != original {
        self.remap.remove(&original);
      }
      for id in start..end {
        self.remap.insert(id, root);
      }
      log::debug!("Remapped {}..{} to {}", start, end, root);
      return Ok(DeltaPlan::Stay {
        remapped: delta.insert_count.max(0) as usize,
      });
    }

    let origin = self
      .items
      .get(&original)
      .cloned()
      .ok_or(PlaylistError::MissingOrigin(original))?;
    let entries = delta.inserted();
    let markdown = origin.rewrite;
    let lines: Vec<String> = entries
      .iter()
      .map(|entry| {
        if markdown {
          markdown_line(entry.title.as_deref().unwrap_or(&entry.filename), &entry.filename)
        } else {
          entry.filename.clone()
        }
      })
      .collect();

    match action {
      UpdateAction::Paste => {
        let current_line = match entries.iter().position(|entry| entry.current) {
          Some(index) => index + 1,
          None => {
            log::debug!("No current entry among inserted items, assuming the first");
            1
          }
        };
        Ok(DeltaPlan::Paste {
          origin_id: original,
          origin: origin.handle,
          lines,
          current_line,
          markdown,
          entries,
        })
      }
      _ => Ok(DeltaPlan::Replace {
        origin_id: original,
        origin: origin.handle,
        lines,
        entries,
      }),
    }
  }

  /// Bind pasted entries to the handles the display created for them.
  pub fn bind_pasted(
    &mut self,
    origin_id: i64,
    entries: &[PlaylistEntry],
    handles: &[DisplayHandle],
    markdown: bool,
  ) {
    self.items.remove(&origin_id);
    for (entry, handle) in entries.iter().zip(handles) {
      self.items.insert(
        entry.id,
        PlaylistItem {
          filename: entry.filename.clone(),
          handle: *handle,
          rewrite: markdown,
          show_current: false,
        },
      );
    }
  }

  /// Discard the whole mapping in favour of a fresh surface.
  pub fn rebuild(&mut self, entries: &[PlaylistEntry], handles: &[DisplayHandle]) {
    self.items = entries
      .iter()
      .zip(handles)
      .map(|(entry, handle)| {
        (
          entry.id,
          PlaylistItem {
            filename: entry.filename.clone(),
            handle: *handle,
            rewrite: false,
            show_current: false,
          },
        )
      })
      .collect();
    self.remap.clear();
    self.updated_indices.clear();
  }

  /// Player id currently bound to `handle`.
  pub fn resolve_handle(&self, handle: DisplayHandle) -> Option<i64> {
    self
      .items
      .iter()
      .find(|(_, item)| item.handle == handle)
      .map(|(id, _)| *id)
  }

  /// Live playlist index to jump to for `handle`.
  pub fn play_index(
    &self,
    handle: DisplayHandle,
    snapshot: &[PlaylistEntry],
  ) -> Result<usize, PlaylistError> {
    if snapshot.len() < 2 {
      return Err(PlaylistError::SmallPlaylist);
    }
    let id = self
      .resolve_handle(handle)
      .ok_or(PlaylistError::UnknownHandle(handle))?;
    let id = self.updated_indices.get(&id).copied().unwrap_or(id);

    let index = snapshot
      .iter()
      .position(|entry| entry.id == id)
      .ok_or(PlaylistError::NotInPlaylist(id))?;

    log::debug!(
      "Setting current playlist item: handle {:?} -> id {} -> index {}",
      handle,
      id,
      index
    );
    Ok(index)
  }

  /// Live indices to remove for deleted handles, highest first, so earlier
  /// removals do not shift later ones. The ids are forgotten.
  pub fn deletion_indices(
    &mut self,
    removed: &[DisplayHandle],
    snapshot: &[PlaylistEntry],
  ) -> Vec<usize> {
    let removed: HashSet<DisplayHandle> = removed.iter().copied().collect();

    let mut ids: HashSet<i64> = self
      .items
      .iter()
      .filter(|(_, item)| removed.contains(&item.handle))
      .map(|(id, _)| *id)
      .collect();
    let remapped: Vec<i64> = self
      .remap
      .iter()
      .filter(|(_, origin)| ids.contains(origin))
      .map(|(id, _)| *id)
      .collect();
    ids.extend(remapped);

    let mut indices: Vec<usize> = snapshot
      .iter()
      .enumerate()
      .filter(|(_, entry)| ids.contains(&entry.id))
      .map(|(index, _)| index)
      .collect();
    indices.sort_unstable_by(|a, b| b.cmp(a));

    log::debug!("Removing mpv ids {:?} at indices {:?}", ids, indices);
    self.items.retain(|id, _| !ids.contains(id));
    self.remap.retain(|id, _| !ids.contains(id));
    self.updated_indices.retain(|id, _| !ids.contains(id));
    indices
  }

  /// Re-key everything by position in `snapshot`, as a freshly launched MPV
  /// loading `load_order()` will number it. Entries the display knows nothing
  /// about are dropped. Returns where `position` lands in the new numbering.
  pub fn reorder_by_index(&mut self, snapshot: &[PlaylistEntry], position: i64) -> i64 {
    let mut items = BTreeMap::new();
    let mut new_position = None;

    for (index, entry) in snapshot.iter().enumerate() {
      let item = if let Some(item) = self.items.get(&entry.id) {
        Some(item.clone())
      } else {
        self
          .remap
          .get(&entry.id)
          .and_then(|origin| self.items.get(origin))
          .map(|origin| PlaylistItem {
            filename: entry.filename.clone(),
            handle: origin.handle,
            rewrite: false,
            show_current: true,
          })
      };

      if let Some(item) = item {
        if new_position.is_none() && index as i64 >= position {
          new_position = Some(items.len() as i64);
        }
        items.insert(items.len() as i64 + 1, item);
      }
    }

    log::info!("Reordered playlist!");
    log::debug!("items: {:?}", items);

    self.items = items;
    self.remap.clear();
    self.updated_indices.clear();
    self.pending_start = None;
    new_position.unwrap_or(0)
  }
}
