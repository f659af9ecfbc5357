//! Child List Diffing
//!
//! Two strategies, picked per children list by the renderer:
//!
//! - **Unkeyed**: children are matched by position.
//! - **Keyed**: children are matched by key, and host nodes follow their key
//!   when the list is reordered.
//!
//! # How the Keyed Diff Works
//!
//! 1. Patch the common prefix, then the common suffix.
//! 2. If only new nodes remain, mount them. If only old nodes remain,
//!    unmount them.
//! 3. Otherwise index the old middle by key and walk the new middle once,
//!    patching matches and recording for each new position which old index
//!    it came from. Old nodes nobody claimed are unmounted.
//! 4. If the recorded old indices are not already increasing, the longest
//!    increasing subsequence of them is the largest set of nodes that can
//!    stay where they are. Walking right to left, every other matched node
//!    is moved and every unmatched new node is mounted, each before the node
//!    to its right.

use std::collections::{HashMap, HashSet};

use smallvec::{smallvec, SmallVec};
use tracing::trace;

use super::host::{HostAdapter, HostNode};
use super::renderer::Renderer;
use super::vnode::VNode;
use crate::error::{Error, Result};

fn same_node(a: &VNode, b: &VNode) -> bool {
    a.key() == b.key() && a.ty().is_same(b.ty())
}

impl<H: HostAdapter> Renderer<H> {
    pub(crate) fn patch_unkeyed_children(
        &self,
        old: &[VNode],
        new: &[VNode],
        container: HostNode,
        anchor: Option<HostNode>,
    ) -> Result<()> {
        let common = old.len().min(new.len());
        for (prev, next) in old.iter().zip(new) {
            self.patch(Some(prev), next, container, anchor)?;
        }

        for prev in &old[common..] {
            self.unmount(prev, container, true);
        }
        self.mount_children(&new[common..], container, anchor)
    }

    pub(crate) fn patch_keyed_children(
        &self,
        old: &[VNode],
        new: &[VNode],
        container: HostNode,
        parent_anchor: Option<HostNode>,
    ) -> Result<()> {
        let mut seen = HashSet::with_capacity(new.len());
        for node in new {
            if let Some(key) = node.key() {
                if !seen.insert(key) {
                    return Err(Error::invalid(format!("duplicate sibling key `{key}`")));
                }
            }
        }

        let mut start = 0;
        let mut old_end = old.len();
        let mut new_end = new.len();

        // 1. Prefix
        while start < old_end && start < new_end && same_node(&old[start], &new[start]) {
            self.patch(Some(&old[start]), &new[start], container, None)?;
            start += 1;
        }

        // 1. Suffix
        while start < old_end
            && start < new_end
            && same_node(&old[old_end - 1], &new[new_end - 1])
        {
            self.patch(Some(&old[old_end - 1]), &new[new_end - 1], container, None)?;
            old_end -= 1;
            new_end -= 1;
        }

        // 2. Pure insertion or pure removal
        if start >= old_end {
            let anchor = self.anchor_after(new, new_end, parent_anchor);
            return self.mount_children(&new[start..new_end], container, anchor);
        }
        if start >= new_end {
            for prev in &old[start..old_end] {
                self.unmount(prev, container, true);
            }
            return Ok(());
        }

        // 3. Match the middle by key
        let lookup: HashMap<_, usize> = {
            let mut lookup = HashMap::with_capacity(old_end - start);
            for (index, prev) in old.iter().enumerate().take(old_end).skip(start) {
                if let Some(key) = prev.key() {
                    lookup.entry(key).or_insert(index);
                }
            }
            lookup
        };

        let middle = new_end - start;
        let mut sources: SmallVec<[Option<usize>; 16]> = smallvec![None; middle];
        let mut claimed: SmallVec<[bool; 16]> = smallvec![false; old_end - start];
        let mut moved = false;
        let mut max_so_far = 0;

        for (offset, next) in new[start..new_end].iter().enumerate() {
            let Some(&index) = next.key().and_then(|key| lookup.get(key)) else {
                continue;
            };
            let prev = &old[index];
            if !prev.ty().is_same(next.ty()) {
                continue;
            }

            sources[offset] = Some(index);
            claimed[index - start] = true;
            if index < max_so_far {
                moved = true;
            } else {
                max_so_far = index;
            }
            self.patch(Some(prev), next, container, None)?;
        }

        for (prev, claimed) in old[start..old_end].iter().zip(&claimed) {
            if !claimed {
                self.unmount(prev, container, true);
            }
        }

        // 4. Move and mount, right to left
        let stable = if moved {
            longest_increasing_subsequence(&sources)
        } else {
            SmallVec::new()
        };
        let mut stable_cursor = stable.len();
        let mut moves = 0usize;

        for offset in (0..middle).rev() {
            let index = start + offset;
            let next = &new[index];
            let anchor = self.anchor_after(new, index + 1, parent_anchor);

            match sources[offset] {
                None => self.patch(None, next, container, anchor)?,
                Some(_) if moved => {
                    if stable_cursor > 0 && stable[stable_cursor - 1] == offset {
                        stable_cursor -= 1;
                    } else {
                        self.move_vnode(next, container, anchor);
                        moves += 1;
                    }
                }
                Some(_) => {}
            }
        }

        trace!(
            old = old.len(),
            new = new.len(),
            moves,
            "keyed children patched"
        );
        Ok(())
    }

    /// Host position of `nodes[index]`, or the parent anchor past the end.
    fn anchor_after(
        &self,
        nodes: &[VNode],
        index: usize,
        parent_anchor: Option<HostNode>,
    ) -> Option<HostNode> {
        match nodes.get(index) {
            Some(node) => self.first_host(node),
            None => parent_anchor,
        }
    }
}

/// Positions of a longest strictly increasing subsequence of the present
/// values. `None` entries are skipped.
///
/// ```rust,ignore
/// let lis = longest_increasing_subsequence(&[Some(3), Some(0), None, Some(1), Some(2)]);
/// assert_eq!(lis.as_slice(), &[1, 3, 4]);
/// ```
pub fn longest_increasing_subsequence(values: &[Option<usize>]) -> SmallVec<[usize; 16]> {
    // tails[k]: position ending the best subsequence of length k + 1
    let mut tails: SmallVec<[usize; 16]> = SmallVec::new();
    let mut tail_values: SmallVec<[usize; 16]> = SmallVec::new();
    let mut predecessors: SmallVec<[Option<usize>; 16]> = smallvec![None; values.len()];

    for (position, value) in values.iter().enumerate() {
        let Some(value) = *value else {
            continue;
        };
        let slot = tail_values.partition_point(|&tail| tail < value);
        if slot > 0 {
            predecessors[position] = Some(tails[slot - 1]);
        }
        if slot == tails.len() {
            tails.push(position);
            tail_values.push(value);
        } else {
            tails[slot] = position;
            tail_values[slot] = value;
        }
    }

    let mut result: SmallVec<[usize; 16]> = SmallVec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(position) = cursor {
        result.push(position);
        cursor = predecessors[position];
    }
    result.reverse();
    result
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
