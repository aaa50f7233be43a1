//! Counterexample representation and rendering.
//!
//! When a property violation is detected, a counterexample shows the
//! sequence of operations that led to the failure, rendered as a
//! thread diagram. A seeded counterexample leads with the
//! `STRATA_SEED=<n>` line needed to replay the run.

use std::fmt;

/// A counterexample showing the failure path.
#[derive(Debug, Clone, Default)]
pub struct Counterexample {
    /// Sequence of state snapshots.
    pub states: Vec<StateSnapshot>,
    /// Thread interleaving that caused the failure.
    pub interleaving: Vec<ThreadAction>,
    /// Memory-related issues detected.
    pub memory_issues: Vec<MemoryIssue>,
    /// Seed for reproduction, if the run was seeded.
    pub seed: Option<u64>,
    /// Human-readable description of the failure.
    pub description: Option<String>,
}

/// Snapshot of system state at a point in time.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    /// Step number in the execution.
    pub step: u64,
    /// Description of the state.
    pub description: String,
    /// Variable values at this point.
    pub variables: Vec<(String, String)>,
}

/// Action taken by a thread.
#[derive(Debug, Clone)]
pub struct ThreadAction {
    /// Thread identifier.
    pub thread_id: u64,
    /// Step number when this action occurred.
    pub step: u64,
    /// Description of the action.
    pub action: String,
    /// Whether this action succeeded.
    pub success: bool,
}

/// Memory-related issue detected by the pool instrumentation.
#[derive(Debug, Clone)]
pub enum MemoryIssue {
    /// The same node address was handed to the deallocation path twice.
    DoubleFree { address: u64, step: u64 },
    /// A freed node was dereferenced.
    UseAfterFree {
        address: u64,
        freed_at_step: u64,
        used_at_step: u64,
    },
    /// A node was allocated and never reclaimed.
    NodeLeak { address: u64, allocated_at_step: u64 },
}

impl Counterexample {
    /// Create a new empty counterexample.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a counterexample carrying a seed for reproduction.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        debug_assert!(seed != 0, "seed should not be zero");
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Set the description for this counterexample.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a state snapshot. Snapshots must arrive in step order.
    pub fn add_state(&mut self, state: StateSnapshot) {
        debug_assert!(
            self.states.is_empty() || state.step > self.states.last().unwrap().step,
            "states must be added in order"
        );
        self.states.push(state);
    }

    /// Add a thread action.
    pub fn add_action(&mut self, action: ThreadAction) {
        self.interleaving.push(action);
    }

    /// Add a memory issue.
    pub fn add_memory_issue(&mut self, issue: MemoryIssue) {
        self.memory_issues.push(issue);
    }

    /// Render the counterexample as a human-readable thread diagram.
    ///
    /// Format:
    /// ```text
    /// STRATA_SEED=12345
    ///
    /// Step | Thread 0     | Thread 1     | State
    /// -----|--------------|--------------|-------
    ///    1 | push(42)     |              | head=N1
    ///    2 |              | pop() start  | head=N1
    ///    3 |              | CAS [FAIL]   | head=N2
    /// ```
    #[must_use]
    pub fn render_diagram(&self) -> String {
        let mut output = String::new();

        if let Some(seed) = self.seed {
            output.push_str(&format!("STRATA_SEED={}\n\n", seed));
        }

        if let Some(ref desc) = self.description {
            output.push_str("Failure: ");
            output.push_str(desc);
            output.push_str("\n\n");
        }

        let mut threads: Vec<u64> = self.interleaving.iter().map(|a| a.thread_id).collect();
        threads.sort_unstable();
        threads.dedup();

        if threads.is_empty() {
            output.push_str("(no thread actions recorded)\n");
        } else {
            output.push_str("Step |");
            for tid in &threads {
                output.push_str(&format!(" Thread {} |", tid));
            }
            output.push_str(" State\n");

            output.push_str("-----|");
            for _ in &threads {
                output.push_str("----------|");
            }
            output.push_str("------\n");

            let max_step = self.interleaving.iter().map(|a| a.step).max().unwrap_or(0);

            for step in 1..=max_step {
                output.push_str(&format!("{:4} |", step));

                for tid in &threads {
                    let action = self
                        .interleaving
                        .iter()
                        .find(|a| a.step == step && a.thread_id == *tid);

                    match action {
                        Some(a) => {
                            let status = if a.success { "" } else { " [FAIL]" };
                            output.push_str(&format!(" {}{} |", a.action, status));
                        }
                        None => output.push_str("          |"),
                    }
                }

                if let Some(state) = self.states.iter().find(|s| s.step == step) {
                    output.push_str(&format!(" {}", state.description));
                }

                output.push('\n');
            }
        }

        if !self.memory_issues.is_empty() {
            output.push_str("\nMemory issues:\n");
            for issue in &self.memory_issues {
                output.push_str(&format!("  - {}\n", issue));
            }
        }

        output
    }
}

impl fmt::Display for MemoryIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryIssue::DoubleFree { address, step } => write!(
                f,
                "Double free: address 0x{:x} reached the deallocation path twice (step {})",
                address, step
            ),
            MemoryIssue::UseAfterFree {
                address,
                freed_at_step,
                used_at_step,
            } => write!(
                f,
                "Use-after-free: address 0x{:x} freed at step {}, used at step {}",
                address, freed_at_step, used_at_step
            ),
            MemoryIssue::NodeLeak {
                address,
                allocated_at_step,
            } => write!(
                f,
                "Node leak: address 0x{:x} allocated at step {}, never reclaimed",
                address, allocated_at_step
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counterexample_creation() {
        let ce = Counterexample::new();
        assert!(ce.states.is_empty());
        assert!(ce.interleaving.is_empty());
        assert!(ce.seed.is_none());
    }

    #[test]
    fn test_counterexample_with_seed() {
        let ce = Counterexample::with_seed(12345);
        assert_eq!(ce.seed, Some(12345));
    }

    #[test]
    fn test_render_diagram() {
        let mut ce = Counterexample::with_seed(42).with_description("element 7 lost");

        ce.add_action(ThreadAction {
            thread_id: 0,
            step: 1,
            action: "push(7)".to_string(),
            success: true,
        });

        ce.add_action(ThreadAction {
            thread_id: 1,
            step: 2,
            action: "pop()".to_string(),
            success: false,
        });

        ce.add_state(StateSnapshot {
            step: 1,
            description: "head=N1".to_string(),
            variables: vec![],
        });

        let diagram = ce.render_diagram();
        assert!(diagram.contains("STRATA_SEED=42"));
        assert!(diagram.contains("element 7 lost"));
        assert!(diagram.contains("Thread 0"));
        assert!(diagram.contains("push(7)"));
        assert!(diagram.contains("[FAIL]"));
    }

    #[test]
    fn test_memory_issue_display() {
        let issue = MemoryIssue::DoubleFree {
            address: 0xdead,
            step: 3,
        };
        assert!(issue.to_string().contains("0xdead"));
        assert!(issue.to_string().contains("twice"));
    }
}
