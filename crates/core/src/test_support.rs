// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::specification::TaskSpecification;

// ── Proptest strategies ─────────────────────────────────────────────────

pub mod strategies {
    use crate::specification::TaskSpecification;
    use proptest::prelude::*;

    /// A batch of tasks with arbitrary (possibly repeated) costs
    pub fn arb_tasks(max: usize) -> impl Strategy<Value = Vec<TaskSpecification>> {
        proptest::collection::vec(0u32..1000, 0..max).prop_map(|costs| {
            costs
                .into_iter()
                .enumerate()
                .map(|(i, c)| TaskSpecification::new(i.to_string(), c))
                .collect()
        })
    }
}

// ── Factories ───────────────────────────────────────────────────────────

/// Tasks with the given costs, parameters set to their index
pub fn tasks_with_costs(costs: &[u32]) -> Vec<TaskSpecification> {
    costs.iter().enumerate().map(|(i, &c)| TaskSpecification::new(format!("task-{i}"), c)).collect()
}
