//! Loaded-id bookkeeping and the fetch state machine shared by list consumers.

use std::collections::BTreeSet;

pub const DEFAULT_PAGE_SIZE: i32 = 50;
pub const MAX_PAGE_SIZE: i32 = 200;

/// Clamps a configured page size: `0` or negative picks `default`, anything
/// above [`MAX_PAGE_SIZE`] is capped.
pub fn normalized_page_size(value: i32, default: i32) -> i32 {
    match value {
        value if value <= 0 => default.clamp(1, MAX_PAGE_SIZE),
        value if value > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
        value => value,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaginationState {
    #[default]
    Idle,
    Loading,
    LoadingHistory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Newer,
    Older,
}

/// A page fetch the consumer is allowed to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub direction: Direction,
    /// Max loaded id for [`Direction::Newer`], min for [`Direction::Older`];
    /// `None` before anything was loaded.
    pub anchor: Option<i64>,
    pub generation: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMerge {
    pub inserted: Vec<i64>,
    pub exhausted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PaginationController {
    state: PaginationState,
    loaded_ids: BTreeSet<i64>,
    exhausted_newer: bool,
    exhausted_older: bool,
    generation: u64,
}

impl PaginationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PaginationState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_ids(&self) -> &BTreeSet<i64> {
        &self.loaded_ids
    }

    pub fn contains(&self, id: i64) -> bool {
        self.loaded_ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.loaded_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded_ids.is_empty()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn is_exhausted(&self, direction: Direction) -> bool {
        match direction {
            Direction::Newer => self.exhausted_newer,
            Direction::Older => self.exhausted_older,
        }
    }

    pub fn can_fetch_more(&self) -> bool {
        self.state == PaginationState::Idle && !self.exhausted_newer
    }

    pub fn can_load_history(&self) -> bool {
        self.state == PaginationState::Idle && !self.exhausted_older
    }

    pub fn fetch_more(&mut self) -> Option<PageRequest> {
        if !self.can_fetch_more() {
            return None;
        }

        self.state = PaginationState::Loading;
        Some(self.request(Direction::Newer))
    }

    pub fn load_history(&mut self) -> Option<PageRequest> {
        if !self.can_load_history() {
            return None;
        }

        self.state = PaginationState::LoadingHistory;
        Some(self.request(Direction::Older))
    }

    /// Merges a page answer. Returns `None` for an answer that belongs to an
    /// earlier generation or to a fetch that is no longer in flight.
    pub fn complete(
        &mut self,
        direction: Direction,
        generation: u64,
        ids: impl IntoIterator<Item = i64>,
    ) -> Option<PageMerge> {
        if !self.is_in_flight(direction, generation) {
            return None;
        }

        let was_empty = self.loaded_ids.is_empty();
        let inserted: Vec<i64> = ids
            .into_iter()
            .filter(|id| self.loaded_ids.insert(*id))
            .collect();
        let exhausted = inserted.is_empty();

        if exhausted {
            self.mark_exhausted(direction);
            if was_empty {
                // Nothing on either side of an empty first page.
                self.exhausted_newer = true;
                self.exhausted_older = true;
            }
        }

        self.state = PaginationState::Idle;
        Some(PageMerge {
            inserted,
            exhausted,
        })
    }

    /// Ends the in-flight fetch without merging anything.
    pub fn fail(&mut self, direction: Direction, generation: u64) -> bool {
        if !self.is_in_flight(direction, generation) {
            return false;
        }

        self.state = PaginationState::Idle;
        true
    }

    pub fn mark_exhausted(&mut self, direction: Direction) {
        match direction {
            Direction::Newer => self.exhausted_newer = true,
            Direction::Older => self.exhausted_older = true,
        }
    }

    /// Allows fetching in `direction` again after new data showed up there.
    pub fn rearm(&mut self, direction: Direction) {
        match direction {
            Direction::Newer => self.exhausted_newer = false,
            Direction::Older => self.exhausted_older = false,
        }
    }

    /// Merges a pushed id right away, whatever fetch is in flight.
    pub fn insert_live(&mut self, id: i64) -> bool {
        self.loaded_ids.insert(id)
    }

    pub fn remove(&mut self, ids: &[i64]) -> Vec<i64> {
        ids.iter()
            .copied()
            .filter(|id| self.loaded_ids.remove(id))
            .collect()
    }

    pub fn replace(&mut self, old_id: i64, new_id: i64) -> bool {
        if !self.loaded_ids.remove(&old_id) {
            return false;
        }
        self.loaded_ids.insert(new_id);
        true
    }

    /// Forgets everything; answers to fetches issued before this call are
    /// dropped by [`Self::complete`].
    pub fn reset(&mut self) {
        self.state = PaginationState::Idle;
        self.loaded_ids.clear();
        self.exhausted_newer = false;
        self.exhausted_older = false;
        self.generation += 1;
    }

    fn request(&self, direction: Direction) -> PageRequest {
        let anchor = match direction {
            Direction::Newer => self.loaded_ids.last(),
            Direction::Older => self.loaded_ids.first(),
        };

        PageRequest {
            direction,
            anchor: anchor.copied(),
            generation: self.generation,
        }
    }

    fn is_in_flight(&self, direction: Direction, generation: u64) -> bool {
        let expected = match direction {
            Direction::Newer => PaginationState::Loading,
            Direction::Older => PaginationState::LoadingHistory,
        };

        generation == self.generation && self.state == expected
    }
}
