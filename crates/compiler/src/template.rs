//! Runtime template instances.
//!
//! A [`Template`] pairs a shared [`CompiledTemplate`] with per-instance
//! bindings. Instances are cheap to create, owned by one thread at a time, and
//! never affect one another.

use std::fmt;
use std::io::Write;
use std::sync::Arc;
use stencil_template_core::{Dialect, RenderError, TemplateError};
use stencil_traits::FilterSelector;

use crate::program::{CompiledTemplate, SlotId};
use crate::render::{
    Binding, Fragment, IoSink, MAX_RENDER_DEPTH, OutputSink, RenderReport, Renderer,
};

pub struct Template {
    program: Arc<CompiledTemplate>,
    bindings: Vec<Binding>,
    selector: Option<Arc<dyn FilterSelector>>,
    /// Set by every binding change until [`clear`](Template::clear).
    modified: bool,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.program.name())
            .field("dialect", &self.program.dialect())
            .field("bound", &self.bindings.iter().filter(|b| **b != Binding::Unset).count())
            .field("selector", &self.selector)
            .field("modified", &self.modified)
            .finish()
    }
}

impl Clone for Template {
    fn clone(&self) -> Self {
        Self {
            program: Arc::clone(&self.program),
            bindings: self.bindings.clone(),
            selector: self.selector.clone(),
            modified: self.modified,
        }
    }
}

impl Template {
    pub fn new(program: Arc<CompiledTemplate>) -> Self {
        let bindings = vec![Binding::Unset; program.slots().len()];
        Self {
            program,
            bindings,
            selector: None,
            modified: false,
        }
    }

    pub fn with_selector(mut self, selector: Arc<dyn FilterSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn set_selector(&mut self, selector: Option<Arc<dyn FilterSelector>>) {
        self.selector = selector;
    }

    pub fn name(&self) -> &str {
        self.program.name()
    }

    pub fn dialect(&self) -> Dialect {
        self.program.dialect()
    }

    pub fn compiled(&self) -> &Arc<CompiledTemplate> {
        &self.program
    }

    pub fn identifiers(&self) -> Vec<&str> {
        self.program.identifiers()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.program.contains(id)
    }

    fn slot(&self, id: &str) -> Result<SlotId, TemplateError> {
        self.program
            .slot(id)
            .ok_or_else(|| TemplateError::unknown_identifier(id))
    }

    // --- Binding ---

    fn bind(&mut self, slot: SlotId, binding: Binding) {
        self.bindings[slot] = binding;
        self.modified = true;
    }

    /// Binds literal text. The text is written as-is when rendered.
    pub fn set_value(&mut self, id: &str, value: impl Into<String>) -> Result<(), TemplateError> {
        let slot = self.slot(id)?;
        self.bind(slot, Binding::Content(vec![Fragment::Text(value.into())]));
        Ok(())
    }

    /// Binds text after passing it through the dialect's encoder.
    pub fn set_value_encoded(&mut self, id: &str, raw: &str) -> Result<(), TemplateError> {
        let encoded = self.program.dialect().encode(raw).into_owned();
        self.set_value(id, encoded)
    }

    /// Binds several values at once. Nothing is bound if any identifier is unknown.
    pub fn set_values<I, K, V>(&mut self, values: I) -> Result<(), TemplateError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let resolved = values
            .into_iter()
            .map(|(id, value)| self.slot(id.as_ref()).map(|slot| (slot, value.into())))
            .collect::<Result<Vec<_>, _>>()?;
        for (slot, value) in resolved {
            self.bind(slot, Binding::Content(vec![Fragment::Text(value)]));
        }
        Ok(())
    }

    /// Binds `id` to whatever `source` renders, evaluated lazily at render time.
    pub fn set_block(&mut self, id: &str, source: &str) -> Result<(), TemplateError> {
        let slot = self.slot(id)?;
        let source = self.slot(source)?;
        self.bind(slot, Binding::Content(vec![Fragment::Block(source)]));
        Ok(())
    }

    /// Appends literal text to the current binding. An unbound or blanked
    /// identifier starts from empty, not from its default.
    pub fn append_value(&mut self, id: &str, value: impl Into<String>) -> Result<(), TemplateError> {
        let slot = self.slot(id)?;
        self.append(slot, Fragment::Text(value.into()));
        Ok(())
    }

    pub fn append_block(&mut self, id: &str, source: &str) -> Result<(), TemplateError> {
        let slot = self.slot(id)?;
        let source = self.slot(source)?;
        self.append(slot, Fragment::Block(source));
        Ok(())
    }

    fn append(&mut self, slot: SlotId, fragment: Fragment) {
        match &mut self.bindings[slot] {
            Binding::Content(fragments) => fragments.push(fragment),
            other => *other = Binding::Content(vec![fragment]),
        }
        self.modified = true;
    }

    /// Drops the binding so the identifier renders its default again.
    pub fn remove_value(&mut self, id: &str) -> Result<(), TemplateError> {
        let slot = self.slot(id)?;
        self.bind(slot, Binding::Unset);
        Ok(())
    }

    /// Makes the identifier render nothing, overriding any binding and default.
    pub fn blank(&mut self, id: &str) -> Result<(), TemplateError> {
        let slot = self.slot(id)?;
        self.bind(slot, Binding::Blank);
        Ok(())
    }

    /// Drops every binding and resets [`is_modified`](Self::is_modified).
    pub fn clear(&mut self) {
        self.bindings.fill(Binding::Unset);
        self.modified = false;
    }

    // --- Queries ---

    /// The text an identifier currently stands for.
    ///
    /// Blanked identifiers give an empty string; bound identifiers give their
    /// bound text, with block references replaced by the referenced
    /// identifier's value; unbound identifiers give their default source text.
    /// A reference back to an identifier already being expanded contributes
    /// nothing.
    ///
    /// # Errors
    ///
    /// `UnknownIdentifier`, or `DepthExceeded` when block references chain
    /// more than [`MAX_RENDER_DEPTH`] deep.
    pub fn get_value(&self, id: &str) -> Result<String, TemplateError> {
        let slot = self.slot(id)?;
        let mut visiting = Vec::new();
        self.value_of(slot, &mut visiting)
    }

    fn value_of(&self, slot: SlotId, visiting: &mut Vec<SlotId>) -> Result<String, TemplateError> {
        if visiting.contains(&slot) {
            return Ok(String::new());
        }
        match &self.bindings[slot] {
            Binding::Blank => Ok(String::new()),
            Binding::Unset => Ok(self
                .program
                .slot_info(slot)
                .default_source
                .clone()
                .unwrap_or_default()),
            Binding::Content(fragments) => {
                if visiting.len() >= MAX_RENDER_DEPTH {
                    return Err(RenderError::DepthExceeded {
                        identifier: self.program.slot_info(slot).id.clone(),
                        limit: MAX_RENDER_DEPTH,
                    }
                    .into());
                }
                visiting.push(slot);
                let value = fragments
                    .iter()
                    .map(|fragment| match fragment {
                        Fragment::Text(text) => Ok(text.clone()),
                        Fragment::Block(source) => self.value_of(*source, visiting),
                    })
                    .collect::<Result<String, _>>();
                visiting.pop();
                value
            }
        }
    }

    /// Whether the identifier is explicitly bound (blanked does not count).
    pub fn has_value(&self, id: &str) -> Result<bool, TemplateError> {
        let slot = self.slot(id)?;
        Ok(matches!(self.bindings[slot], Binding::Content(_)))
    }

    pub fn is_blank(&self, id: &str) -> Result<bool, TemplateError> {
        let slot = self.slot(id)?;
        Ok(self.bindings[slot] == Binding::Blank)
    }

    pub fn default_content(&self, id: &str) -> Result<Option<&str>, TemplateError> {
        let slot = self.slot(id)?;
        Ok(self.program.slot_info(slot).default_source.as_deref())
    }

    /// Whether any binding operation ran since creation or the last
    /// [`clear`](Self::clear), even one that restored a default.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    // --- Rendering ---

    pub fn render(&self, sink: &mut dyn OutputSink) -> Result<RenderReport, TemplateError> {
        let mut renderer = self.renderer();
        renderer.run(self.program.root(), sink)?;
        Ok(renderer.finish())
    }

    /// Renders a single identifier as it would appear in the document.
    pub fn render_block(&self, id: &str, sink: &mut dyn OutputSink) -> Result<RenderReport, TemplateError> {
        let slot = self.slot(id)?;
        let mut renderer = self.renderer();
        renderer.dispatch(slot, sink)?;
        Ok(renderer.finish())
    }

    pub fn render_to_string(&self) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.render(&mut out)?;
        Ok(out)
    }

    pub fn render_block_to_string(&self, id: &str) -> Result<String, TemplateError> {
        let mut out = String::new();
        self.render_block(id, &mut out)?;
        Ok(out)
    }

    pub fn render_to_writer<W: Write>(&self, writer: W) -> Result<RenderReport, TemplateError> {
        let mut sink = IoSink(writer);
        let report = self.render(&mut sink)?;
        sink.0.flush().map_err(RenderError::from)?;
        Ok(report)
    }

    fn renderer(&self) -> Renderer<'_> {
        Renderer::new(&self.program, &self.bindings, self.selector.as_deref())
    }
}
