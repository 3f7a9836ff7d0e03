//! Lowers a [`Document`] into a [`CompiledTemplate`].
//!
//! Literal segments are appended to one constant pool and become `Text`
//! instructions; every declaring tag becomes a `Slot` dispatch with its body
//! laid out inline right after it. Alternatives are laid out inline too, behind
//! a `Jump` so document flow never enters them.

use std::collections::HashMap;
use std::ops::Range;
use stencil_parser::{Document, Parser, Segment, Tag, TagKind};
use stencil_template_core::{Dialect, TemplateError};

use crate::program::{CodeRange, CompiledTemplate, Instruction, SlotId, SlotInfo};

struct Compiler<'d> {
    doc: &'d Document,
    code: Vec<Instruction>,
    constants: String,
    slots: Vec<SlotInfo>,
    slot_index: HashMap<String, SlotId>,
}

/// Compiles a validated document.
pub fn compile(doc: &Document, name: impl Into<String>, dialect: Dialect) -> CompiledTemplate {
    let name = name.into();
    let mut compiler = Compiler::new(doc);
    compiler.emit_range(0..doc.len());

    log::debug!(
        "Compiled '{}': {} instructions, {} slots, {} bytes of text",
        name,
        compiler.code.len(),
        compiler.slots.len(),
        compiler.constants.len()
    );

    CompiledTemplate {
        name,
        dialect,
        policy: doc.policy(),
        code: compiler.code,
        constants: compiler.constants,
        slots: compiler.slots,
        slot_index: compiler.slot_index,
    }
}

/// Parses and compiles a source that contains no include tags.
pub fn compile_str(
    name: impl Into<String>,
    source: &str,
    dialect: Dialect,
) -> Result<CompiledTemplate, TemplateError> {
    let doc = Parser::new(dialect).parse(source)?;
    Ok(compile(&doc, name, dialect))
}

impl<'d> Compiler<'d> {
    fn new(doc: &'d Document) -> Self {
        let slots: Vec<SlotInfo> = doc
            .declarations()
            .iter()
            .map(|decl| SlotInfo {
                id: decl.id.clone(),
                kind: decl.kind,
                default: None,
                default_source: doc.default_content(&decl.id),
                filter_key: decl.filter_key.clone(),
                alternatives: Vec::new(),
                alternative_names: doc
                    .alternatives(&decl.id)
                    .iter()
                    .map(|alt| alt.name.clone())
                    .collect(),
            })
            .collect();
        let slot_index = slots
            .iter()
            .enumerate()
            .map(|(slot, info)| (info.id.clone(), slot))
            .collect();

        Self {
            doc,
            code: Vec::new(),
            constants: String::new(),
            slots,
            slot_index,
        }
    }

    fn emit_range(&mut self, range: Range<usize>) {
        let doc = self.doc;
        // Index of a Text instruction that the next literal may extend. Reset
        // after any other instruction so jump targets stay exact.
        let mut open_text: Option<usize> = None;
        let mut i = range.start;

        while i < range.end {
            match &doc.segments()[i] {
                Segment::Text { text, .. } => {
                    self.emit_text(text, &mut open_text);
                    i += 1;
                }
                Segment::Tag(tag) => {
                    match tag.kind {
                        TagKind::Value | TagKind::BlockOpen | TagKind::Filtered => {
                            self.emit_slot(i, tag);
                            open_text = None;
                        }
                        TagKind::Alternative => {
                            self.emit_alternative(tag);
                            open_text = None;
                        }
                        TagKind::Comment | TagKind::BlockClose => {}
                    }
                    i = match &tag.body {
                        Some(body) => body.end + 1,
                        None => i + 1,
                    };
                }
            }
        }
    }

    fn emit_text(&mut self, text: &str, open_text: &mut Option<usize>) {
        if text.is_empty() {
            return;
        }
        let start = self.constants.len();
        self.constants.push_str(text);
        let end = self.constants.len();

        if let Some(pc) = *open_text {
            if let Instruction::Text { end: previous, .. } = &mut self.code[pc] {
                *previous = end;
                return;
            }
        }
        *open_text = Some(self.code.len());
        self.code.push(Instruction::Text { start, end });
    }

    fn emit_slot(&mut self, segment: usize, tag: &Tag) {
        let Some(&slot) = self.slot_index.get(&tag.id) else {
            return;
        };
        let pc = self.code.len();
        self.code.push(Instruction::Slot { slot, next: pc + 1 });

        // Only the canonical declaration's body is ever rendered.
        let canonical = self
            .doc
            .declaration(&tag.id)
            .is_some_and(|decl| decl.segment == segment);
        if !canonical {
            return;
        }
        if let Some(body) = &tag.body {
            self.emit_range(body.clone());
            let end = self.code.len();
            self.code[pc] = Instruction::Slot { slot, next: end };
            self.slots[slot].default = Some(CodeRange::new(pc + 1, end));
        }
    }

    fn emit_alternative(&mut self, tag: &Tag) {
        let Some(&slot) = self.slot_index.get(&tag.id) else {
            return;
        };
        let pc = self.code.len();
        self.code.push(Instruction::Jump { next: pc + 1 });
        if let Some(body) = &tag.body {
            self.emit_range(body.clone());
        }
        let end = self.code.len();
        self.code[pc] = Instruction::Jump { next: end };

        let name = tag.qualifier.clone().unwrap_or_default();
        self.slots[slot]
            .alternatives
            .push((name, CodeRange::new(pc + 1, end)));
    }
}
