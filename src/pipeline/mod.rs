//! The transformation pipeline driver.
//!
//! Orchestrates the full run: directive resolution, one reachability shake,
//! the Rebind → Inline → Merge triad iterated to an explicit fixed point
//! (bounded iterations plus a stability window), then desugaring, renaming and
//! a final rebind. Every pass consumes the previous committed snapshot and
//! produces a new one; the loop exits when a full round reports no change.
//!
//! With dispatch verification enabled, the driver captures a dispatch snapshot
//! around every structural pass and checks that the set of resolvable virtual
//! targets per call site survived, translated through the identity rewrites
//! the pass declared. A divergence aborts the run: unsound output is never
//! emitted.

mod events;

pub use events::{Event, EventKind, EventLog};

use std::collections::BTreeMap;

use crate::directives::{self, Directive};
use crate::inlining::{run_inline_pass, InlineBudget, InlineOutcome};
use crate::merging::{run_horizontal_pass, run_vertical_pass, MergePass};
use crate::model::{verify_preserved, DispatchSnapshot, ItemId, Program};
use crate::naming::{rename, RenameMap};
use crate::reachability::{shake, LiveSet, RemovalReport};
use crate::rebinding::rebind;
use crate::Result;

/// Configuration for the pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Maximum iterations of the rewrite triad (default: 10).
    pub max_iterations: usize,

    /// Number of change-free iterations before the loop settles (default: 2).
    pub stable_iterations: usize,

    /// Code-size limits for the inliner.
    pub inline_budget: InlineBudget,

    /// Enable call-site inlining.
    pub enable_inlining: bool,

    /// Enable vertical class merging.
    pub enable_vertical_merging: bool,

    /// Enable horizontal class merging.
    pub enable_horizontal_merging: bool,

    /// Enable symbol renaming.
    pub enable_renaming: bool,

    /// Desugar interface default and static methods (the target runtime lacks
    /// native default dispatch).
    pub desugar_default_methods: bool,

    /// Verify dispatch preservation around every structural pass (slower).
    pub verify_dispatch: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            max_iterations: 10,
            stable_iterations: 2,
            inline_budget: InlineBudget::default(),
            enable_inlining: true,
            enable_vertical_merging: true,
            enable_horizontal_merging: true,
            enable_renaming: true,
            desugar_default_methods: true,
            verify_dispatch: true,
        }
    }
}

/// Everything a finished run hands to the external collaborators.
#[derive(Debug)]
pub struct PipelineResult {
    /// The transformed program, for the encoding/packaging collaborator.
    pub program: Program,
    /// Old → new identities, for the mapping-file writer.
    pub rename_map: RenameMap,
    /// Identities pruned by reachability, for the reporting collaborator.
    pub removed: RemovalReport,
    /// The live subset and edge sets computed by the shake.
    pub live: LiveSet,
    /// Non-fatal pass decisions.
    pub events: EventLog,
    /// Triad iterations executed before the fixed point.
    pub iterations: usize,
}

/// The whole-program transformation pipeline.
#[derive(Clone, Debug, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Creates a pipeline with the given configuration.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline { config }
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the full pipeline over an input snapshot and directive set.
    ///
    /// # Errors
    ///
    /// Fatal errors abort the run with no transformed output: unknown directive
    /// targets, broken references after a transformation, unresolved
    /// default-method diamonds, and model-commit failures.
    pub fn run(&self, program: &Program, directives: &[Directive]) -> Result<PipelineResult> {
        let events = EventLog::new();

        // Constraints become part of the model; the shake prunes from the
        // directive roots.
        let program = directives::resolve(program, directives)?;
        let shaken = shake(&program)?;
        let live = shaken.live;
        let removed = shaken.removed;
        let mut program = shaken.program;

        program = rebind(&program)?.program;

        let mut iterations = 0usize;
        let mut stable = 0usize;
        for iteration in 0..self.config.max_iterations {
            iterations = iteration + 1;
            let mut changed = false;

            if self.config.enable_inlining {
                program = self.inline_step(program, &events, &mut changed)?;
            }
            if self.config.enable_vertical_merging {
                program = self.merge_step(program, &events, &mut changed, run_vertical_pass)?;
            }
            if self.config.enable_horizontal_merging {
                program = self.merge_step(program, &events, &mut changed, run_horizontal_pass)?;
            }

            if changed {
                stable = 0;
            } else {
                stable += 1;
                if stable >= self.config.stable_iterations {
                    break;
                }
            }
        }

        if self.config.desugar_default_methods {
            let pass = crate::desugar::desugar(&program)?;
            for companion in &pass.companions {
                events.record(
                    EventKind::CompanionSynthesized,
                    ItemId::Class(companion.clone()),
                    "",
                );
            }
            for forwarder in &pass.forwarders {
                events.record(
                    EventKind::ForwarderSynthesized,
                    ItemId::Method(forwarder.clone()),
                    "",
                );
            }
            program = pass.program;
            program = rebind(&program)?.program;
        }

        let rename_map = if self.config.enable_renaming {
            let pass = rename(&program)?;
            program = pass.program;
            pass.map
        } else {
            RenameMap::identity(&program)
        };

        // Final canonicalization; also the last line of defense against any
        // reference a pass failed to rewrite.
        program = rebind(&program)?.program;

        Ok(PipelineResult {
            program,
            rename_map,
            removed,
            live,
            events,
            iterations,
        })
    }

    /// One inlining round with optional dispatch verification.
    fn inline_step(
        &self,
        program: Program,
        events: &EventLog,
        changed: &mut bool,
    ) -> Result<Program> {
        let before = self
            .config
            .verify_dispatch
            .then(|| DispatchSnapshot::capture(&program));

        let pass = run_inline_pass(&program, &self.config.inline_budget)?;
        for (caller, target, outcome) in &pass.decisions {
            match outcome {
                InlineOutcome::Inlined => {
                    events.record(
                        EventKind::Inlined,
                        ItemId::Method(caller.clone()),
                        target.to_string(),
                    );
                }
                InlineOutcome::Declined(reason) => {
                    events.record(
                        EventKind::NotInlined,
                        ItemId::Method(caller.clone()),
                        format!("{target}: {reason}"),
                    );
                }
            }
        }

        if let Some(before) = before {
            let after = DispatchSnapshot::capture(&pass.program);
            verify_preserved(&before, &after, &BTreeMap::new(), &BTreeMap::new())?;
        }
        *changed |= pass.changed();
        Ok(pass.program)
    }

    /// One merging round (either strategy) with verification and the rebind
    /// the merger requires before any subsequent pass.
    fn merge_step(
        &self,
        program: Program,
        events: &EventLog,
        changed: &mut bool,
        strategy: fn(&Program) -> Result<MergePass>,
    ) -> Result<Program> {
        let before = self
            .config
            .verify_dispatch
            .then(|| DispatchSnapshot::capture(&program));

        let pass = strategy(&program)?;
        for unit in &pass.merged {
            events.record(
                EventKind::ClassMerged,
                ItemId::Class(unit.eliminated.clone()),
                format!("into {}", unit.survivor),
            );
        }
        for (survivor, candidate, reason) in &pass.rejected {
            events.record(
                EventKind::MergeRejected,
                ItemId::Class(candidate.clone()),
                format!("with {survivor}: {reason}"),
            );
        }

        if let Some(before) = before {
            let after = DispatchSnapshot::capture(&pass.program);
            verify_preserved(&before, &after, &pass.class_map, &pass.method_map)?;
        }

        let mut next = pass.program;
        if !pass.merged.is_empty() {
            *changed = true;
            next = rebind(&next)?.program;
        }
        Ok(next)
    }
}
