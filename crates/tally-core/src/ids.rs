//! Record identity.
//!
//! Ids are opaque strings. Freshly generated ids are UUIDv7, which combine a
//! millisecond timestamp with random bits, so collisions inside one
//! collection are practically impossible.

use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{Character, Task};

pub trait Identified {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
}

impl Identified for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

impl Identified for Character {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Returns an id not present in `taken`.
pub fn fresh_id(taken: &HashSet<String>) -> String {
    loop {
        let id = new_id();
        if !taken.contains(&id) {
            return id;
        }
    }
}

/// Gives every record a unique id, in order. The first record holding an id
/// keeps it; blank ids and later duplicates get fresh ones. Returns how many
/// records were re-identified.
pub fn assign_ids<T: Identified>(records: &mut [T]) -> usize {
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    let mut pending = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let id = record.id();
        if id.trim().is_empty() || !seen.insert(id.to_string()) {
            pending.push(index);
        }
    }

    // Fresh ids must not collide with ids that appear later in the slice either.
    for &index in &pending {
        let id = fresh_id(&seen);
        seen.insert(id.clone());
        records[index].set_id(id);
    }

    pending.len()
}
