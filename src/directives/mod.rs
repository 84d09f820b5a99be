//! Preservation directives and their resolution onto program entities.
//!
//! Directives are the external constraint surface of the pipeline: explicit
//! reachability roots plus per-entity "never-X" constraints. They arrive from an
//! external keep-rule/annotation-parsing collaborator as a flat list and are
//! resolved here into a per-entity [`DirectiveSet`] stamped onto the committed
//! program. No pass ever consults global state for constraints; the stamped
//! snapshot is the single source of truth threaded through the pipeline.
//!
//! Class-level `no-rename` and `no-merge` constraints propagate implicitly to the
//! class's declared members. A member-level entry for the same constraint is more
//! specific and wins, which is why directives carry a polarity: a member can opt
//! back out of an inherited class-level constraint.

use std::collections::BTreeMap;

use bitflags::bitflags;
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::model::{ItemId, Program};
use crate::{Error, Result};

bitflags! {
    /// The constraint set attached to a class, method or field.
    ///
    /// Sets are union-merged when entities are merged, so a combined entity always
    /// carries the strictest constraints of both sides.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    pub struct DirectiveSet: u8 {
        /// Entity must stay live with its identity intact: never removed, renamed
        /// or merged away.
        const PINNED = 1 << 0;
        /// Method must never be inlined into a call site.
        const NO_INLINE = 1 << 1;
        /// Entity must never be merged (vertically or horizontally).
        const NO_MERGE = 1 << 2;
        /// Entity must keep its source name.
        const NO_RENAME = 1 << 3;
        /// Class must never participate in a vertical merge.
        const NO_VERTICAL_MERGE = 1 << 4;
        /// Entity seeds the reachability traversal.
        const ROOT = 1 << 5;
    }
}

impl DirectiveSet {
    /// Returns `true` if this entity seeds reachability: an explicit root or a
    /// pinned entity (pinned implies live).
    #[must_use]
    pub fn is_reachability_seed(&self) -> bool {
        self.intersects(DirectiveSet::ROOT | DirectiveSet::PINNED)
    }

    /// Returns `true` if inlining this entity's body is forbidden.
    #[must_use]
    pub fn blocks_inlining(&self) -> bool {
        self.intersects(DirectiveSet::NO_INLINE | DirectiveSet::PINNED)
    }

    /// Returns `true` if any merge involving this entity is forbidden.
    #[must_use]
    pub fn blocks_merging(&self) -> bool {
        self.intersects(DirectiveSet::NO_MERGE | DirectiveSet::PINNED)
    }

    /// Returns `true` if a vertical merge involving this entity is forbidden.
    #[must_use]
    pub fn blocks_vertical_merging(&self) -> bool {
        self.blocks_merging() || self.contains(DirectiveSet::NO_VERTICAL_MERGE)
    }

    /// Returns `true` if renaming this entity is forbidden.
    #[must_use]
    pub fn blocks_renaming(&self) -> bool {
        self.intersects(DirectiveSet::NO_RENAME | DirectiveSet::PINNED)
    }
}

/// A single named constraint, as it appears in external directives.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum Constraint {
    /// Keep the entity live with its identity intact.
    Pinned,
    /// Never inline the method.
    NoInline,
    /// Never merge the entity.
    NoMerge,
    /// Never rename the entity.
    NoRename,
    /// Never merge the class vertically.
    NoVerticalMerge,
    /// Seed the reachability traversal at the entity.
    Root,
}

impl Constraint {
    /// Returns the bit this constraint occupies in a [`DirectiveSet`].
    #[must_use]
    pub fn bit(self) -> DirectiveSet {
        match self {
            Constraint::Pinned => DirectiveSet::PINNED,
            Constraint::NoInline => DirectiveSet::NO_INLINE,
            Constraint::NoMerge => DirectiveSet::NO_MERGE,
            Constraint::NoRename => DirectiveSet::NO_RENAME,
            Constraint::NoVerticalMerge => DirectiveSet::NO_VERTICAL_MERGE,
            Constraint::Root => DirectiveSet::ROOT,
        }
    }

    /// Returns `true` if a class-level entry of this constraint propagates to the
    /// class's declared members.
    #[must_use]
    pub fn propagates_to_members(self) -> bool {
        matches!(
            self,
            Constraint::NoRename | Constraint::NoMerge | Constraint::NoVerticalMerge
        )
    }
}

/// Whether a directive adds or removes a constraint at its specificity level.
///
/// `Allow` only matters at the member level, where it overrides a class-level
/// `Forbid` that would otherwise propagate down.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DirectiveAction {
    /// Apply the constraint to the target.
    Forbid,
    /// Release the target from an inherited constraint.
    Allow,
}

/// One external preservation directive.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Directive {
    /// The entity the directive names.
    pub target: ItemId,
    /// The constraint it applies or releases.
    pub constraint: Constraint,
    /// Apply or release.
    pub action: DirectiveAction,
}

impl Directive {
    /// Creates a directive applying `constraint` to `target`.
    #[must_use]
    pub fn forbid(target: impl Into<ItemId>, constraint: Constraint) -> Self {
        Directive {
            target: target.into(),
            constraint,
            action: DirectiveAction::Forbid,
        }
    }

    /// Creates a directive releasing `target` from an inherited `constraint`.
    #[must_use]
    pub fn allow(target: impl Into<ItemId>, constraint: Constraint) -> Self {
        Directive {
            target: target.into(),
            constraint,
            action: DirectiveAction::Allow,
        }
    }
}

/// Per-item explicit directive entries, before propagation.
type ExplicitEntries = BTreeMap<ItemId, BTreeMap<Constraint, DirectiveAction>>;

/// Resolves external directives onto the program.
///
/// Validates every directive target against the model (a directive naming a
/// nonexistent entity is fatal), computes the effective constraint set per entity
/// with class-to-member propagation and most-specific-wins overrides, and returns
/// a new program snapshot with the sets stamped onto every definition.
///
/// # Errors
///
/// Returns [`Error::UnknownReference`] if a directive names an entity that does
/// not exist in the program.
pub fn resolve(program: &Program, directives: &[Directive]) -> Result<Program> {
    let explicit = collect_explicit(program, directives)?;

    let mut builder = program.to_builder();
    for class_id in program.class_ids() {
        let class_item = ItemId::Class(class_id.clone());
        let class_set = effective_set(&explicit, &class_item, None);

        let class = builder
            .class_mut(&class_id)
            .ok_or_else(|| Error::UnknownReference(class_id.to_string()))?;
        class.directives = class_set;

        // Propagating class-level constraints become the default for members
        let inherited: Vec<Constraint> = Constraint::iter()
            .filter(|c| c.propagates_to_members() && class_set.contains(c.bit()))
            .collect();

        for method in &mut class.methods {
            let item = ItemId::Method(method.id.clone());
            method.directives = effective_set(&explicit, &item, Some(&inherited));
        }
        for field in &mut class.fields {
            let item = ItemId::Field(field.id.clone());
            field.directives = effective_set(&explicit, &item, Some(&inherited));
        }
    }
    builder.commit()
}

/// Computes the effective constraint bitset for one item.
///
/// Explicit entries at the item's own level win; constraints without an explicit
/// entry fall back to the inherited class-level default, if any.
fn effective_set(
    explicit: &ExplicitEntries,
    item: &ItemId,
    inherited: Option<&[Constraint]>,
) -> DirectiveSet {
    let own = explicit.get(item);
    let mut set = DirectiveSet::empty();

    for constraint in Constraint::iter() {
        let applied = match own.and_then(|m| m.get(&constraint)) {
            Some(DirectiveAction::Forbid) => true,
            Some(DirectiveAction::Allow) => false,
            None => inherited.is_some_and(|i| i.contains(&constraint)),
        };
        if applied {
            set |= constraint.bit();
        }
    }
    set
}

/// Validates directive targets and groups explicit entries per item.
///
/// A `Forbid` and an `Allow` for the same item and constraint collapse to
/// `Forbid`: at equal specificity the stricter entry wins.
fn collect_explicit(program: &Program, directives: &[Directive]) -> Result<ExplicitEntries> {
    let mut explicit: ExplicitEntries = BTreeMap::new();
    for directive in directives {
        validate_target(program, &directive.target)?;
        let entry = explicit
            .entry(directive.target.clone())
            .or_default()
            .entry(directive.constraint)
            .or_insert(directive.action);
        if directive.action == DirectiveAction::Forbid {
            *entry = DirectiveAction::Forbid;
        }
    }
    Ok(explicit)
}

fn validate_target(program: &Program, target: &ItemId) -> Result<()> {
    let found = match target {
        ItemId::Class(id) => program.class(id).is_some(),
        ItemId::Method(id) => program.method(id).is_some(),
        ItemId::Field(id) => program.field(id).is_some(),
    };
    if found {
        Ok(())
    } else {
        Err(Error::UnknownReference(format!(
            "directive names nonexistent entity {target}"
        )))
    }
}
