//! Keyed diff between two snapshots of an ordered sequence.
//!
//! The walk only decides what happens to which item; applying it is up to
//! the [`ListOps`] implementation. `relocate` and `insert` name the item the
//! target should end up in front of (`None` for the end of the list), as
//! seen by someone replaying the operations in the order they are issued.

use std::collections::HashMap;
use std::mem;
use std::ops::Range;

use crate::error::{Error, Result};
use crate::value::Key;

pub trait ListOps<T, V> {
    /// Re-binds a reused item to its new value.
    fn update(&mut self, item: &mut T, value: V) -> Result<()>;
    /// Creates an item. A failed insert leaves nothing behind.
    fn insert(&mut self, value: V, before: Option<&T>) -> Result<T>;
    fn relocate(&mut self, item: &T, before: Option<&T>) -> Result<()>;
    fn remove(&mut self, item: T) -> Result<()>;
}

/// A walk stopped by a failing operation. `items` holds every item the walk
/// still owned, placed or not, in no particular order.
#[derive(Debug)]
pub struct Interrupted<T> {
    pub error: Error,
    pub items: Vec<T>,
}

fn index_window(keys: &[Key], window: Range<usize>) -> HashMap<&Key, usize> {
    window.map(|i| (&keys[i], i)).collect()
}

/// Four-way scan from both ends; falls back to key lookups only for the
/// scrambled middle. Keys must be unique within each snapshot.
pub fn reconcile<T, V, O>(
    old_keys: &[Key],
    old_items: Vec<T>,
    new_keys: &[Key],
    new_values: Vec<V>,
    ops: &mut O,
) -> std::result::Result<Vec<T>, Interrupted<T>>
where
    V: Default,
    O: ListOps<T, V>,
{
    debug_assert_eq!(old_keys.len(), old_items.len());
    debug_assert_eq!(new_keys.len(), new_values.len());

    let mut old: Vec<Option<T>> = old_items.into_iter().map(Some).collect();
    let mut new: Vec<Option<T>> = (0..new_keys.len()).map(|_| None).collect();
    match walk(old_keys, &mut old, new_keys, &mut new, new_values, ops) {
        Ok(()) => Ok(new.into_iter().flatten().collect()),
        Err(error) => Err(Interrupted {
            error,
            items: new.into_iter().chain(old).flatten().collect(),
        }),
    }
}

/// Items are parked in their `new` slot before being updated, so a failing
/// update never loses one.
fn walk<T, V, O>(
    old_keys: &[Key],
    old: &mut [Option<T>],
    new_keys: &[Key],
    new: &mut [Option<T>],
    mut values: Vec<V>,
    ops: &mut O,
) -> Result<()>
where
    V: Default,
    O: ListOps<T, V>,
{
    let (mut old_head, mut old_tail) = (0, old.len());
    let (mut new_head, mut new_tail) = (0, new.len());
    let mut old_index: Option<HashMap<&Key, usize>> = None;
    let mut new_index: Option<HashMap<&Key, usize>> = None;

    while old_head < old_tail && new_head < new_tail {
        if old[old_head].is_none() {
            old_head += 1;
            continue;
        }
        if old[old_tail - 1].is_none() {
            old_tail -= 1;
            continue;
        }

        if old_keys[old_head] == new_keys[new_head] {
            new[new_head] = old[old_head].take();
            if let Some(item) = &mut new[new_head] {
                ops.update(item, mem::take(&mut values[new_head]))?;
            }
            old_head += 1;
            new_head += 1;
        } else if old_keys[old_tail - 1] == new_keys[new_tail - 1] {
            new[new_tail - 1] = old[old_tail - 1].take();
            if let Some(item) = &mut new[new_tail - 1] {
                ops.update(item, mem::take(&mut values[new_tail - 1]))?;
            }
            old_tail -= 1;
            new_tail -= 1;
        } else if old_keys[old_head] == new_keys[new_tail - 1] {
            new[new_tail - 1] = old[old_head].take();
            if let Some(item) = &mut new[new_tail - 1] {
                ops.update(item, mem::take(&mut values[new_tail - 1]))?;
            }
            if let Some(item) = &new[new_tail - 1] {
                ops.relocate(item, new.get(new_tail).and_then(Option::as_ref))?;
            }
            old_head += 1;
            new_tail -= 1;
        } else if old_keys[old_tail - 1] == new_keys[new_head] {
            new[new_head] = old[old_tail - 1].take();
            if let Some(item) = &mut new[new_head] {
                ops.update(item, mem::take(&mut values[new_head]))?;
            }
            if let Some(item) = &new[new_head] {
                ops.relocate(item, old[old_head].as_ref())?;
            }
            old_tail -= 1;
            new_head += 1;
        } else {
            let new_window = new_index.get_or_insert_with(|| index_window(new_keys, new_head..new_tail));
            let in_new_window = |key: &Key| {
                new_window
                    .get(key)
                    .is_some_and(|i| (new_head..new_tail).contains(i))
            };

            if !in_new_window(&old_keys[old_head]) {
                if let Some(item) = old[old_head].take() {
                    ops.remove(item)?;
                }
                old_head += 1;
            } else if !in_new_window(&old_keys[old_tail - 1]) {
                if let Some(item) = old[old_tail - 1].take() {
                    ops.remove(item)?;
                }
                old_tail -= 1;
            } else {
                let old_window = old_index.get_or_insert_with(|| index_window(old_keys, old_head..old_tail));
                let reusable = old_window
                    .get(&new_keys[new_head])
                    .copied()
                    .filter(|i| (old_head..old_tail).contains(i));
                let value = mem::take(&mut values[new_head]);
                match reusable.and_then(|i| old[i].take()) {
                    Some(item) => {
                        new[new_head] = Some(item);
                        if let Some(item) = &mut new[new_head] {
                            ops.update(item, value)?;
                        }
                        if let Some(item) = &new[new_head] {
                            ops.relocate(item, old[old_head].as_ref())?;
                        }
                    }
                    None => {
                        let item = ops.insert(value, old[old_head].as_ref())?;
                        new[new_head] = Some(item);
                    }
                }
                new_head += 1;
            }
        }
    }

    while new_head < new_tail {
        let value = mem::take(&mut values[new_head]);
        let item = ops.insert(value, new.get(new_tail).and_then(Option::as_ref))?;
        new[new_head] = Some(item);
        new_head += 1;
    }
    while old_head < old_tail {
        if let Some(item) = old[old_head].take() {
            ops.remove(item)?;
        }
        old_head += 1;
    }
    Ok(())
}

/// Position-for-position rebind: update the common prefix, then append or
/// drop the difference.
pub fn reconcile_positional<T, V, O>(
    old_items: Vec<T>,
    new_values: Vec<V>,
    ops: &mut O,
) -> std::result::Result<Vec<T>, Interrupted<T>>
where
    O: ListOps<T, V>,
{
    let mut items = Vec::with_capacity(new_values.len());
    let mut old = old_items.into_iter();
    let walked = (|| -> Result<()> {
        for value in new_values {
            match old.next() {
                Some(item) => {
                    items.push(item);
                    if let Some(item) = items.last_mut() {
                        ops.update(item, value)?;
                    }
                }
                None => {
                    let item = ops.insert(value, None)?;
                    items.push(item);
                }
            }
        }
        for item in old.by_ref() {
            ops.remove(item)?;
        }
        Ok(())
    })();
    match walked {
        Ok(()) => Ok(items),
        Err(error) => Err(Interrupted {
            error,
            items: items.into_iter().chain(old).collect(),
        }),
    }
}
