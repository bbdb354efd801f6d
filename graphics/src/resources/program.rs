//! Program descriptors and binding layouts.
//!
//! A program is either a compute kernel or a draw pipeline. Its optional
//! [`ProgramLayout`] lists the bindings the program expects; when present,
//! command buffer recording checks every binding against it.

/// Which kind of work a program performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    /// Launched with a dispatch.
    Compute,
    /// Launched with a draw into a framebuffer.
    Graphics,
}

/// The kind of resource a binding slot accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// Uniform or storage buffer range.
    Buffer,
    /// Sampled texture.
    Texture,
    /// Storage image (read/write texture view).
    Image,
    /// Per-vertex or per-instance attribute stream.
    VertexAttribute,
}

/// Address of a binding: by declared name or by binding index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingSlot {
    /// Binding name as declared by the program.
    Name(String),
    /// Binding index.
    Index(u32),
}

impl From<&str> for BindingSlot {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<u32> for BindingSlot {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

impl std::fmt::Display for BindingSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => write!(f, "'{name}'"),
            Self::Index(index) => write!(f, "#{index}"),
        }
    }
}

/// One binding declared by a program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingDecl {
    /// Declared name.
    pub name: String,
    /// Binding index.
    pub index: u32,
    /// Expected resource kind.
    pub kind: BindingKind,
}

/// Binding layout of a program, as produced by program reflection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProgramLayout {
    bindings: Vec<BindingDecl>,
}

impl ProgramLayout {
    /// Create an empty layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a binding.
    pub fn with_binding(mut self, name: impl Into<String>, index: u32, kind: BindingKind) -> Self {
        self.bindings.push(BindingDecl {
            name: name.into(),
            index,
            kind,
        });
        self
    }

    /// All declared bindings.
    pub fn bindings(&self) -> &[BindingDecl] {
        &self.bindings
    }

    /// Find the declaration addressed by `slot`.
    pub fn find(&self, slot: &BindingSlot) -> Option<&BindingDecl> {
        self.bindings.iter().find(|decl| match slot {
            BindingSlot::Name(name) => &decl.name == name,
            BindingSlot::Index(index) => decl.index == *index,
        })
    }
}

/// Descriptor for registering a program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramDescriptor {
    /// Debug label.
    pub label: Option<String>,
    /// Compute or graphics.
    pub kind: ProgramKind,
    /// Binding layout, if reflection data is available.
    pub layout: Option<ProgramLayout>,
}

impl ProgramDescriptor {
    /// Descriptor for a compute kernel.
    pub fn compute() -> Self {
        Self {
            label: None,
            kind: ProgramKind::Compute,
            layout: None,
        }
    }

    /// Descriptor for a draw pipeline.
    pub fn graphics() -> Self {
        Self {
            label: None,
            kind: ProgramKind::Graphics,
            layout: None,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attach a binding layout.
    pub fn with_layout(mut self, layout: ProgramLayout) -> Self {
        self.layout = Some(layout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_lookup_by_name_and_index() {
        let layout = ProgramLayout::new()
            .with_binding("params", 0, BindingKind::Buffer)
            .with_binding("field", 1, BindingKind::Image);

        assert_eq!(layout.find(&"field".into()).map(|d| d.index), Some(1));
        assert_eq!(layout.find(&0u32.into()).map(|d| d.kind), Some(BindingKind::Buffer));
        assert!(layout.find(&"missing".into()).is_none());
    }

    #[test]
    fn test_slot_display() {
        assert_eq!(BindingSlot::from("params").to_string(), "'params'");
        assert_eq!(BindingSlot::from(3u32).to_string(), "#3");
    }
}
