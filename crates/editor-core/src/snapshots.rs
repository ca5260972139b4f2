/// Default byte budget for retained history snapshots.
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 10_000_000;

/// Bounded, indexable history buffer of serialized editor-state snapshots.
///
/// The cursor always points at the snapshot matching current content after a
/// successful `add_snapshot`. Adding discards any redoable entries beyond the
/// cursor; exceeding the byte bound evicts the oldest entries first. Every add
/// is a discrete history entry, consecutive duplicates included.
#[derive(Debug)]
pub struct SnapshotsService {
    snapshots: Vec<String>,
    current_index: isize,
    total_size: usize,
    max_size: usize,
}

impl SnapshotsService {
    pub fn new(max_size: usize) -> Self {
        Self {
            snapshots: Vec::new(),
            current_index: -1,
            total_size: 0,
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// The snapshot under the cursor, if any.
    pub fn current(&self) -> Option<&str> {
        usize::try_from(self.current_index)
            .ok()
            .and_then(|ix| self.snapshots.get(ix))
            .map(String::as_str)
    }

    /// Whether moving the cursor by `delta` steps stays within bounds.
    /// Negative deltas move toward older snapshots, positive toward newer.
    pub fn can_move(&self, delta: isize) -> bool {
        let target = self.current_index + delta;
        target >= 0 && target < self.snapshots.len() as isize
    }

    /// Moves the cursor by `delta` and returns the snapshot at the new
    /// position, or `None` (without moving) when out of bounds.
    pub fn move_by(&mut self, delta: isize) -> Option<String> {
        if !self.can_move(delta) {
            return None;
        }
        self.current_index += delta;
        self.snapshots
            .get(self.current_index as usize)
            .cloned()
    }

    /// Appends `snapshot` at the cursor, discarding previously-redoable
    /// entries, then advances the cursor to the new entry.
    pub fn add_snapshot(&mut self, snapshot: String) {
        self.clear_redo();
        self.total_size += snapshot.len();
        self.snapshots.push(snapshot);
        self.current_index = self.snapshots.len() as isize - 1;

        // The entry under the cursor is never evicted.
        while self.total_size > self.max_size && self.snapshots.len() > 1 {
            self.total_size -= self.snapshots[0].len();
            self.snapshots.remove(0);
            self.current_index -= 1;
        }
    }

    fn clear_redo(&mut self) {
        while self.snapshots.len() as isize - 1 > self.current_index {
            if let Some(dropped) = self.snapshots.pop() {
                self.total_size -= dropped.len();
            }
        }
    }
}
