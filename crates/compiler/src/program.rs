//! The compiled form of a template: a flat instruction array over a single
//! constant pool, plus a table of slots.

use std::collections::HashMap;
use std::sync::Arc;
use stencil_parser::DeclarationKind;
use stencil_template_core::{Dialect, DuplicatePolicy};

use crate::template::Template;

/// Index into [`CompiledTemplate::slots`].
pub type SlotId = usize;

/// A half-open range of instruction indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeRange {
    pub start: usize,
    pub end: usize,
}

impl CodeRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Write `constants[start..end]`.
    Text { start: usize, end: usize },
    /// Render a slot, then continue at `next`. An inline body between this
    /// instruction and `next` is only reached through the slot's ranges.
    Slot { slot: SlotId, next: usize },
    /// Continue at `next`. Skips alternative bodies in document flow.
    Jump { next: usize },
}

/// Everything the render loop needs to know about one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub id: String,
    pub kind: DeclarationKind,
    /// Code of the canonical default, when the declaration has a body.
    pub default: Option<CodeRange>,
    /// Source text of the canonical default.
    pub default_source: Option<String>,
    pub filter_key: Option<String>,
    /// Alternatives in document order.
    pub alternatives: Vec<(String, CodeRange)>,
    /// Names of `alternatives`, in the same order, as handed to a selector.
    pub alternative_names: Vec<String>,
}

impl SlotInfo {
    pub fn alternative(&self, name: &str) -> Option<CodeRange> {
        self.alternatives
            .iter()
            .find(|(alt, _)| alt == name)
            .map(|(_, range)| *range)
    }
}

/// An immutable, shareable compiled template.
///
/// Runtime state lives in [`Template`] instances created with
/// [`instantiate`](CompiledTemplate::instantiate); the compiled unit itself is
/// never mutated after compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    pub(crate) name: String,
    pub(crate) dialect: Dialect,
    pub(crate) policy: DuplicatePolicy,
    pub(crate) code: Vec<Instruction>,
    pub(crate) constants: String,
    pub(crate) slots: Vec<SlotInfo>,
    pub(crate) slot_index: HashMap<String, SlotId>,
}

impl CompiledTemplate {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// All identifiers, in order of first occurrence.
    pub fn identifiers(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn value_ids(&self) -> Vec<&str> {
        self.ids_of(DeclarationKind::Value)
    }

    pub fn block_ids(&self) -> Vec<&str> {
        self.ids_of(DeclarationKind::Block)
    }

    pub fn filtered_ids(&self) -> Vec<&str> {
        self.ids_of(DeclarationKind::Filtered)
    }

    fn ids_of(&self, kind: DeclarationKind) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|s| s.kind == kind)
            .map(|s| s.id.as_str())
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slot_index.contains_key(id)
    }

    pub fn slot(&self, id: &str) -> Option<SlotId> {
        self.slot_index.get(id).copied()
    }

    pub fn slot_info(&self, slot: SlotId) -> &SlotInfo {
        &self.slots[slot]
    }

    pub fn slots(&self) -> &[SlotInfo] {
        &self.slots
    }

    /// Source text of an identifier's default content.
    pub fn default_content(&self, id: &str) -> Option<&str> {
        self.slot(id)
            .and_then(|slot| self.slots[slot].default_source.as_deref())
    }

    /// Alternative names registered for a filtered identifier.
    pub fn alternatives(&self, id: &str) -> &[String] {
        self.slot(id)
            .map(|slot| self.slots[slot].alternative_names.as_slice())
            .unwrap_or(&[])
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.code
    }

    pub fn instruction_count(&self) -> usize {
        self.code.len()
    }

    /// The whole document.
    pub fn root(&self) -> CodeRange {
        CodeRange::new(0, self.code.len())
    }

    pub(crate) fn constant(&self, start: usize, end: usize) -> &str {
        &self.constants[start..end]
    }

    /// Creates a fresh runtime instance with no bindings.
    pub fn instantiate(self: &Arc<Self>) -> Template {
        Template::new(Arc::clone(self))
    }
}
