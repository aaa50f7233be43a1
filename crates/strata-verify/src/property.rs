//! Named property results and the checker trait.

use crate::counterexample::Counterexample;

/// Outcome of checking a single named invariant.
#[derive(Debug, Clone)]
pub struct PropertyResult {
    /// Invariant name, e.g. `"NoLostElements"`.
    pub name: &'static str,
    /// Whether the invariant held.
    pub holds: bool,
    /// Violation description when it did not.
    pub violation: Option<String>,
    /// Optional failure path for rendering.
    pub counterexample: Option<Counterexample>,
}

impl PropertyResult {
    /// A passing result.
    #[must_use]
    pub fn pass(name: &'static str) -> Self {
        Self {
            name,
            holds: true,
            violation: None,
            counterexample: None,
        }
    }

    /// A failing result with a violation description.
    #[must_use]
    pub fn fail(
        name: &'static str,
        violation: impl Into<String>,
        counterexample: Option<Counterexample>,
    ) -> Self {
        Self {
            name,
            holds: false,
            violation: Some(violation.into()),
            counterexample,
        }
    }
}

/// Anything that can check a set of named invariants.
pub trait PropertyChecker {
    /// Check every invariant and return one result per property.
    fn check_all(&self) -> Vec<PropertyResult>;

    /// True when every invariant holds.
    fn all_hold(&self) -> bool {
        self.check_all().iter().all(|r| r.holds)
    }

    /// The subset of results that failed.
    fn failures(&self) -> Vec<PropertyResult> {
        self.check_all().into_iter().filter(|r| !r.holds).collect()
    }

    /// Render all failures as one report string, empty when clean.
    fn failure_report(&self) -> String {
        let mut out = String::new();
        for failure in self.failures() {
            out.push_str(failure.name);
            out.push_str(": ");
            out.push_str(failure.violation.as_deref().unwrap_or("violated"));
            out.push('\n');
            if let Some(ce) = &failure.counterexample {
                out.push_str(&ce.render_diagram());
                out.push('\n');
            }
        }
        out
    }
}
