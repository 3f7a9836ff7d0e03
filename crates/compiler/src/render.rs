//! The render loop and the sinks it writes to.

use std::io::{self, Write};
use stencil_template_core::{RenderError, TemplateError};
use stencil_traits::FilterSelector;

use crate::program::{CodeRange, CompiledTemplate, Instruction, SlotId};

/// Maximum number of slots a render may be inside at once.
pub const MAX_RENDER_DEPTH: usize = 128;

/// Receives rendered text in document order.
pub trait OutputSink {
    fn write_fragment(&mut self, fragment: &str) -> io::Result<()>;
}

impl OutputSink for String {
    fn write_fragment(&mut self, fragment: &str) -> io::Result<()> {
        self.push_str(fragment);
        Ok(())
    }
}

impl OutputSink for Vec<u8> {
    fn write_fragment(&mut self, fragment: &str) -> io::Result<()> {
        self.extend_from_slice(fragment.as_bytes());
        Ok(())
    }
}

/// Adapts any [`io::Write`] into an [`OutputSink`].
#[derive(Debug)]
pub struct IoSink<W: Write>(pub W);

impl<W: Write> IoSink<W> {
    pub fn into_inner(self) -> W {
        self.0
    }
}

impl<W: Write> OutputSink for IoSink<W> {
    fn write_fragment(&mut self, fragment: &str) -> io::Result<()> {
        self.0.write_all(fragment.as_bytes())
    }
}

/// A filtered tag that rendered empty because no alternative applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAlternative {
    pub identifier: String,
    pub filter_key: String,
    /// What the selector asked for, if it chose anything.
    pub selected: Option<String>,
}

/// Non-fatal findings from one render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub missing_alternatives: Vec<MissingAlternative>,
}

impl RenderReport {
    pub fn is_clean(&self) -> bool {
        self.missing_alternatives.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) enum Binding {
    #[default]
    Unset,
    Blank,
    Content(Vec<Fragment>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Fragment {
    Text(String),
    /// Whatever the referenced slot renders at render time.
    Block(SlotId),
}

pub(crate) struct Renderer<'t> {
    program: &'t CompiledTemplate,
    bindings: &'t [Binding],
    selector: Option<&'t dyn FilterSelector>,
    active: Vec<SlotId>,
    report: RenderReport,
}

impl<'t> Renderer<'t> {
    pub(crate) fn new(
        program: &'t CompiledTemplate,
        bindings: &'t [Binding],
        selector: Option<&'t dyn FilterSelector>,
    ) -> Self {
        Self {
            program,
            bindings,
            selector,
            active: Vec::new(),
            report: RenderReport::default(),
        }
    }

    pub(crate) fn finish(self) -> RenderReport {
        self.report
    }

    /// Executes the instructions in `range`.
    pub(crate) fn run(
        &mut self,
        range: CodeRange,
        sink: &mut dyn OutputSink,
    ) -> Result<(), TemplateError> {
        let program = self.program;
        let mut pc = range.start;
        while pc < range.end {
            match program.code[pc] {
                Instruction::Text { start, end } => {
                    sink.write_fragment(program.constant(start, end))
                        .map_err(RenderError::from)?;
                    pc += 1;
                }
                Instruction::Slot { slot, next } => {
                    self.dispatch(slot, sink)?;
                    pc = next;
                }
                Instruction::Jump { next } => pc = next,
            }
        }
        Ok(())
    }

    /// Renders one slot: its binding if bound, otherwise its default.
    pub(crate) fn dispatch(
        &mut self,
        slot: SlotId,
        sink: &mut dyn OutputSink,
    ) -> Result<(), TemplateError> {
        if self.active.contains(&slot) {
            let id = &self.program.slot_info(slot).id;
            return Err(RenderError::CircularReference(id.clone()).into());
        }
        if self.active.len() >= MAX_RENDER_DEPTH {
            return Err(RenderError::DepthExceeded {
                identifier: self.program.slot_info(slot).id.clone(),
                limit: MAX_RENDER_DEPTH,
            }
            .into());
        }
        self.active.push(slot);
        let result = self.dispatch_inner(slot, sink);
        self.active.pop();
        result
    }

    fn dispatch_inner(&mut self, slot: SlotId, sink: &mut dyn OutputSink) -> Result<(), TemplateError> {
        let bindings = self.bindings;
        match &bindings[slot] {
            Binding::Blank => Ok(()),
            Binding::Content(fragments) => {
                for fragment in fragments {
                    match fragment {
                        Fragment::Text(text) => {
                            sink.write_fragment(text).map_err(RenderError::from)?
                        }
                        Fragment::Block(source) => self.dispatch(*source, sink)?,
                    }
                }
                Ok(())
            }
            Binding::Unset => self.render_default(slot, sink),
        }
    }

    fn render_default(&mut self, slot: SlotId, sink: &mut dyn OutputSink) -> Result<(), TemplateError> {
        let program = self.program;
        let info = program.slot_info(slot);
        let Some(filter_key) = info.filter_key.as_deref() else {
            return match info.default {
                Some(range) => self.run(range, sink),
                None => Ok(()),
            };
        };

        let selected = self
            .selector
            .and_then(|selector| selector.select(filter_key, &info.alternative_names));
        if let Some(range) = selected.as_deref().and_then(|name| info.alternative(name)) {
            return self.run(range, sink);
        }
        if let Some(range) = info.default {
            return self.run(range, sink);
        }

        log::warn!(
            "No alternative for filtered tag '{}' ({}={}) in '{}'; rendering empty",
            info.id,
            filter_key,
            selected.as_deref().unwrap_or("<none>"),
            program.name()
        );
        self.report.missing_alternatives.push(MissingAlternative {
            identifier: info.id.clone(),
            filter_key: filter_key.to_string(),
            selected,
        });
        Ok(())
    }
}
