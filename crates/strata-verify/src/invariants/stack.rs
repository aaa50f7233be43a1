//! Stack traffic invariants.
//!
//! | Property | Description |
//! |----------|-------------|
//! | NoLostElements | Every pushed element was popped or is still present |
//! | NoDuplicates | No element surfaced twice (pop or final contents) |
//! | NoInventedElements | Every popped element was actually pushed |
//! | LifoOrder | Sequential histories replay exactly against a model stack |
//!
//! The audit is recorded by the test harness, not by the stack under
//! test: the harness knows what it pushed and what it got back, and the
//! checker compares that against the drained contents. `LifoOrder` is
//! only meaningful for a single-threaded recording and is skipped for
//! audits created with [`StackAudit::unordered`].

use std::collections::HashSet;

use crate::counterexample::{Counterexample, StateSnapshot};
use crate::property::{PropertyChecker, PropertyResult};

/// History of stack operations in recording order.
#[derive(Debug, Clone, Default)]
pub struct StackHistory {
    /// Sequence of operations.
    pub operations: Vec<StackOperation>,
}

/// A single recorded stack operation.
#[derive(Debug, Clone)]
pub struct StackOperation {
    /// Thread that performed the operation.
    pub thread_id: u64,
    /// What the operation was.
    pub kind: StackOpKind,
    /// Element involved (pushed value, or pop result).
    pub element: Option<u64>,
    /// Monotonic step number.
    pub step: u64,
}

/// Kind of recorded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOpKind {
    Push,
    Pop,
    PopEmpty,
}

/// Recorded push/pop traffic for one stack under test.
#[derive(Debug, Default)]
pub struct StackAudit {
    pushed: HashSet<u64>,
    popped: HashSet<u64>,
    duplicate_pops: Vec<u64>,
    invented_pops: Vec<u64>,
    history: Option<StackHistory>,
    step: u64,
    seed: Option<u64>,
}

impl StackAudit {
    /// An audit for a single-threaded session. Records full history and
    /// checks LIFO replay.
    #[must_use]
    pub fn new() -> Self {
        Self {
            history: Some(StackHistory::default()),
            ..Self::default()
        }
    }

    /// An audit for traffic merged from concurrent threads. Element
    /// accounting only; no meaningful global order exists to replay.
    #[must_use]
    pub fn unordered() -> Self {
        Self::default()
    }

    /// Attach a seed so failures carry a reproduction line.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        debug_assert!(seed != 0, "seed should not be zero");
        self.seed = Some(seed);
        self
    }

    /// Record a push of `value` by `thread_id`.
    pub fn record_push(&mut self, thread_id: u64, value: u64) {
        self.step += 1;
        self.pushed.insert(value);
        if let Some(history) = &mut self.history {
            history.operations.push(StackOperation {
                thread_id,
                kind: StackOpKind::Push,
                element: Some(value),
                step: self.step,
            });
        }
    }

    /// Record a pop result by `thread_id`. `None` means the stack
    /// reported empty.
    pub fn record_pop(&mut self, thread_id: u64, value: Option<u64>) {
        self.step += 1;
        if let Some(v) = value {
            if !self.pushed.contains(&v) {
                self.invented_pops.push(v);
            }
            if !self.popped.insert(v) {
                self.duplicate_pops.push(v);
            }
        }
        if let Some(history) = &mut self.history {
            history.operations.push(StackOperation {
                thread_id,
                kind: if value.is_some() {
                    StackOpKind::Pop
                } else {
                    StackOpKind::PopEmpty
                },
                element: value,
                step: self.step,
            });
        }
    }

    /// Number of distinct elements pushed so far.
    #[must_use]
    pub fn pushed_count(&self) -> usize {
        self.pushed.len()
    }

    /// Whether `value` was recorded as popped.
    #[must_use]
    pub fn was_popped(&self, value: u64) -> bool {
        self.popped.contains(&value)
    }

    /// Finish the audit against the stack's remaining contents
    /// (typically obtained by draining it top to bottom).
    #[must_use]
    pub fn with_contents(&self, contents: Vec<u64>) -> StackChecker<'_> {
        StackChecker {
            audit: self,
            contents,
        }
    }
}

/// Checks the recorded audit against observed final contents.
pub struct StackChecker<'a> {
    audit: &'a StackAudit,
    contents: Vec<u64>,
}

impl StackChecker<'_> {
    fn counterexample(&self, description: String) -> Counterexample {
        let mut ce = match self.audit.seed {
            Some(seed) => Counterexample::with_seed(seed),
            None => Counterexample::new(),
        };
        let mut pushed: Vec<u64> = self.audit.pushed.iter().copied().collect();
        let mut popped: Vec<u64> = self.audit.popped.iter().copied().collect();
        pushed.sort_unstable();
        popped.sort_unstable();
        ce.add_state(StateSnapshot {
            step: 1,
            description: description.clone(),
            variables: vec![
                ("pushed".to_string(), format!("{:?}", pushed)),
                ("popped".to_string(), format!("{:?}", popped)),
                ("contents".to_string(), format!("{:?}", self.contents)),
            ],
        });
        ce.with_description(description)
    }

    /// Every element that was pushed must have been popped or remain in
    /// the final contents. No element may be lost.
    fn check_no_lost_elements(&self) -> PropertyResult {
        let contents: HashSet<u64> = self.contents.iter().copied().collect();
        for element in &self.audit.pushed {
            if !contents.contains(element) && !self.audit.popped.contains(element) {
                let description = format!(
                    "element {} was pushed but is neither in the stack nor popped",
                    element
                );
                return PropertyResult::fail(
                    "NoLostElements",
                    description.clone(),
                    Some(self.counterexample(description)),
                );
            }
        }
        PropertyResult::pass("NoLostElements")
    }

    /// No element may surface twice: not popped twice, not popped and
    /// also still present, not present twice in the final contents.
    fn check_no_duplicates(&self) -> PropertyResult {
        if let Some(dup) = self.audit.duplicate_pops.first() {
            return PropertyResult::fail(
                "NoDuplicates",
                format!("element {} was popped more than once", dup),
                None,
            );
        }

        let mut seen = HashSet::new();
        for element in &self.contents {
            if !seen.insert(*element) {
                return PropertyResult::fail(
                    "NoDuplicates",
                    format!("element {} appears twice in the final contents", element),
                    None,
                );
            }
            if self.audit.popped.contains(element) {
                return PropertyResult::fail(
                    "NoDuplicates",
                    format!("element {} was popped yet remains in the stack", element),
                    None,
                );
            }
        }

        PropertyResult::pass("NoDuplicates")
    }

    /// Every popped element must have been pushed first.
    fn check_no_invented_elements(&self) -> PropertyResult {
        match self.audit.invented_pops.first() {
            Some(v) => PropertyResult::fail(
                "NoInventedElements",
                format!("pop returned {} which was never pushed", v),
                None,
            ),
            None => PropertyResult::pass("NoInventedElements"),
        }
    }

    /// Replay the recorded history against a model stack and verify
    /// that every pop result matches last-in-first-out order. Skipped
    /// (trivially passing) for unordered audits.
    fn check_lifo_order(&self) -> PropertyResult {
        let Some(history) = &self.audit.history else {
            return PropertyResult::pass("LifoOrder");
        };

        let mut model: Vec<u64> = Vec::new();

        for op in &history.operations {
            match op.kind {
                StackOpKind::Push => {
                    if let Some(e) = op.element {
                        model.push(e);
                    }
                }
                StackOpKind::Pop => {
                    let expected = op.element.unwrap_or_default();
                    match model.pop() {
                        Some(actual) if actual != expected => {
                            return PropertyResult::fail(
                                "LifoOrder",
                                format!(
                                    "pop returned {} but the model expected {} (step {})",
                                    expected, actual, op.step
                                ),
                                None,
                            );
                        }
                        None => {
                            return PropertyResult::fail(
                                "LifoOrder",
                                format!(
                                    "pop returned {} but the model stack was empty (step {})",
                                    expected, op.step
                                ),
                                None,
                            );
                        }
                        _ => {}
                    }
                }
                StackOpKind::PopEmpty => {
                    if !model.is_empty() {
                        return PropertyResult::fail(
                            "LifoOrder",
                            format!(
                                "pop reported empty but the model holds {} elements (step {})",
                                model.len(),
                                op.step
                            ),
                            None,
                        );
                    }
                }
            }
        }

        PropertyResult::pass("LifoOrder")
    }
}

impl PropertyChecker for StackChecker<'_> {
    fn check_all(&self) -> Vec<PropertyResult> {
        vec![
            self.check_no_lost_elements(),
            self.check_no_duplicates(),
            self.check_no_invented_elements(),
            self.check_lifo_order(),
        ]
    }
}
