//! Index-addressable row order with minimal structural change reporting.

use std::{cmp::Ordering, collections::HashSet};

/// Structural change of a projection. Ranges are inclusive and refer to
/// row indices at the moment the change is applied, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowChange {
    Updated { index: usize },
    Inserted { first: usize, last: usize },
    Removed { first: usize, last: usize },
    /// The row at `from` now lives at `to`.
    Moved { from: usize, to: usize },
    Reset,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListProjection {
    rows: Vec<i64>,
}

impl ListProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[i64] {
        &self.rows
    }

    pub fn id_at(&self, index: usize) -> Option<i64> {
        self.rows.get(index).copied()
    }

    pub fn index_of(&self, id: i64) -> Option<usize> {
        self.rows.iter().position(|row| *row == id)
    }

    pub fn updated(&self, id: i64) -> Option<RowChange> {
        self.index_of(id).map(|index| RowChange::Updated { index })
    }

    /// Inserts `id` before the first row that sorts after it.
    pub fn insert_sorted<F>(&mut self, id: i64, compare: F) -> Option<RowChange>
    where
        F: Fn(i64, i64) -> Ordering,
    {
        if self.index_of(id).is_some() {
            return None;
        }

        let index = self
            .rows
            .iter()
            .position(|row| compare(id, *row) == Ordering::Less)
            .unwrap_or(self.rows.len());
        self.rows.insert(index, id);

        Some(RowChange::Inserted {
            first: index,
            last: index,
        })
    }

    /// Removes the given ids, reporting contiguous ranges from the bottom up
    /// so that every range is valid when it is applied.
    pub fn remove_ids(&mut self, ids: &[i64]) -> Vec<RowChange> {
        let doomed: HashSet<i64> = ids.iter().copied().collect();
        self.remove_where(|id| doomed.contains(&id))
    }

    pub fn reset(&mut self, rows: Vec<i64>) -> RowChange {
        self.rows = rows;
        RowChange::Reset
    }

    /// Turns the current rows into `target` with removals first, then moves
    /// and inserts walking `target` top-down.
    pub fn apply_order(&mut self, target: &[i64]) -> Vec<RowChange> {
        let wanted: HashSet<i64> = target.iter().copied().collect();
        let mut changes = self.remove_where(|id| !wanted.contains(&id));

        let mut present: HashSet<i64> = self.rows.iter().copied().collect();
        let mut index = 0;
        while index < target.len() {
            let id = target[index];

            if self.rows.get(index) == Some(&id) {
                index += 1;
                continue;
            }

            if present.contains(&id) {
                if let Some(from) = self.rows[index..].iter().position(|row| *row == id) {
                    let from = from + index;
                    self.rows.remove(from);
                    self.rows.insert(index, id);
                    changes.push(RowChange::Moved { from, to: index });
                }
                index += 1;
                continue;
            }

            let run: Vec<i64> = target[index..]
                .iter()
                .copied()
                .take_while(|candidate| !present.contains(candidate))
                .collect();
            let first = index;
            let last = index + run.len() - 1;
            for (offset, id) in run.iter().enumerate() {
                self.rows.insert(first + offset, *id);
                present.insert(*id);
            }
            changes.push(RowChange::Inserted { first, last });
            index = last + 1;
        }

        changes
    }

    fn remove_where<F>(&mut self, doomed: F) -> Vec<RowChange>
    where
        F: Fn(i64) -> bool,
    {
        let mut ranges: Vec<(usize, usize)> = Vec::new();
        for (index, id) in self.rows.iter().enumerate() {
            if !doomed(*id) {
                continue;
            }
            match ranges.last_mut() {
                Some((_, last)) if *last + 1 == index => *last = index,
                _ => ranges.push((index, index)),
            }
        }

        ranges
            .into_iter()
            .rev()
            .map(|(first, last)| {
                self.rows.drain(first..=last);
                RowChange::Removed { first, last }
            })
            .collect()
    }
}
