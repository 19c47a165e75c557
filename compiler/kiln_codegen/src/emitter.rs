//! Text buffers for generated source.
//!
//! A shader is assembled from several independently filled buffers (global
//! declarations, stage structs, signature, body, ...). Each one is a
//! [`SourceBuffer`].

/// Append-only text buffer with two-space indentation.
#[derive(Clone, Debug, Default)]
pub(crate) struct SourceBuffer {
    buffer: String,
}

impl SourceBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn emit(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub(crate) fn emit_newline(&mut self) {
        self.buffer.push('\n');
    }

    pub(crate) fn emit_indent(&mut self, level: usize) {
        for _ in 0..level {
            self.buffer.push_str("  ");
        }
    }

    /// Indent, emit `text`, end the line.
    pub(crate) fn emit_line(&mut self, level: usize, text: &str) {
        self.emit_indent(level);
        self.emit(text);
        self.emit_newline();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.buffer
    }

    pub(crate) fn output(self) -> String {
        self.buffer
    }
}
