//! Per-list chat order derived from chat positions.
//!
//! The index is a cache: it never holds anything the store cannot rebuild.
//! Lists touched by position events are marked stale and re-sorted in one
//! batch by [`OrderingIndex::refresh`].

use std::{
    cmp::Ordering,
    collections::{BTreeSet, HashMap},
};

use super::{chat::ChatPosition, chat_list::ChatList, store::EntityStore};

#[derive(Debug, Default)]
pub struct OrderingIndex {
    lists: HashMap<ChatList, Vec<i64>>,
    stale: BTreeSet<ChatList>,
}

impl OrderingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last sorted order of `list`; empty until the list is first built.
    pub fn chats(&self, list: ChatList) -> &[i64] {
        self.lists.get(&list).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn mark_stale(&mut self, lists: impl IntoIterator<Item = ChatList>) {
        self.stale.extend(lists);
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn has_stale(&self) -> bool {
        !self.stale.is_empty()
    }

    /// Re-sorts every stale list and returns the ones whose order changed.
    pub fn refresh(&mut self, store: &EntityStore) -> Vec<ChatList> {
        let stale = std::mem::take(&mut self.stale);
        stale
            .into_iter()
            .filter(|list| self.rebuild(store, *list))
            .collect()
    }

    /// Sorts one list immediately. Returns whether the order changed.
    pub fn rebuild(&mut self, store: &EntityStore, list: ChatList) -> bool {
        let sorted = sorted_chat_ids(store, list);
        self.stale.remove(&list);

        let previous = self.lists.insert(list, sorted).unwrap_or_default();
        previous.as_slice() != self.chats(list)
    }
}

/// Chat ids with a non-zero position in `list`, highest order first. Equal
/// orders put pinned chats first, then fall back to the larger chat id.
pub fn sorted_chat_ids(store: &EntityStore, list: ChatList) -> Vec<i64> {
    let mut entries = store.listed_chats(list);
    entries.sort_by(|left, right| compare_positions(left, right));
    entries.into_iter().map(|(chat_id, _)| chat_id).collect()
}

fn compare_positions(left: &(i64, ChatPosition), right: &(i64, ChatPosition)) -> Ordering {
    let (left_id, left_position) = left;
    let (right_id, right_position) = right;

    right_position
        .order
        .cmp(&left_position.order)
        .then_with(|| right_position.is_pinned.cmp(&left_position.is_pinned))
        .then_with(|| right_id.cmp(left_id))
}
