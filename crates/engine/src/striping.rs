// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hand-out order for a job's tasks.
//!
//! Tasks are sorted most expensive first and then striped across lanes, so
//! the expensive ones land on different workers instead of queueing behind
//! each other on the first one to ask.

/// Reorder `items` (already sorted by descending cost) into hand-out order
/// for `lanes` workers. Returns the input unchanged when every item gets a
/// lane of its own.
pub fn stripe<T>(items: Vec<T>, lanes: usize) -> Vec<T> {
    let n = items.len();
    let lanes = lanes.max(1);
    if lanes >= n {
        return items;
    }
    let stripes = n.div_ceil(lanes);

    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(n);
    let mut source = 0;
    for taken in 1..=n {
        if let Some(item) = slots.get_mut(source).and_then(Option::take) {
            out.push(item);
        }
        source += stripes;
        if source >= n {
            // Wrap to the next column
            source = taken * stripes / n;
        }
    }
    // The walk visits every index once; keep anything it could have missed
    out.extend(slots.into_iter().flatten());
    out
}

/// Sort descending by cost (stable), then stripe across `lanes`
pub fn distribution_order<T>(mut items: Vec<T>, lanes: usize, cost: impl Fn(&T) -> u32) -> Vec<T> {
    items.sort_by_key(|item| std::cmp::Reverse(cost(item)));
    stripe(items, lanes)
}

#[cfg(test)]
#[path = "striping_tests.rs"]
mod tests;
