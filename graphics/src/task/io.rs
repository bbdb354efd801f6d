//! Resource references declared by present tasks.

use thistle_core::arena::Index;

use crate::resources::{BufferId, TextureId, TextureViewId};

/// Kind of resource a [`TaskIo`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IoKind {
    /// A buffer.
    Buffer,
    /// A whole texture.
    Texture,
    /// One mip level of a texture. Distinct from the texture itself.
    TextureView,
}

/// One resource read or written by a present task.
///
/// Two `TaskIo`s are equal when they name the same allocation: same kind,
/// same arena slot and generation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskIo {
    kind: IoKind,
    index: Index,
}

impl TaskIo {
    /// Kind of the named resource.
    pub fn kind(&self) -> IoKind {
        self.kind
    }

    /// Buffer handle, if this names a buffer.
    pub fn as_buffer(&self) -> Option<BufferId> {
        (self.kind == IoKind::Buffer).then(|| BufferId::from_index(self.index))
    }

    /// Texture handle, if this names a texture.
    pub fn as_texture(&self) -> Option<TextureId> {
        (self.kind == IoKind::Texture).then(|| TextureId::from_index(self.index))
    }

    /// View handle, if this names a texture view.
    pub fn as_texture_view(&self) -> Option<TextureViewId> {
        (self.kind == IoKind::TextureView).then(|| TextureViewId::from_index(self.index))
    }
}

impl From<BufferId> for TaskIo {
    fn from(id: BufferId) -> Self {
        Self {
            kind: IoKind::Buffer,
            index: id.index(),
        }
    }
}

impl From<TextureId> for TaskIo {
    fn from(id: TextureId) -> Self {
        Self {
            kind: IoKind::Texture,
            index: id.index(),
        }
    }
}

impl From<TextureViewId> for TaskIo {
    fn from(id: TextureViewId) -> Self {
        Self {
            kind: IoKind::TextureView,
            index: id.index(),
        }
    }
}

impl std::fmt::Debug for TaskIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            IoKind::Buffer => write!(f, "{}", BufferId::from_index(self.index)),
            IoKind::Texture => write!(f, "{}", TextureId::from_index(self.index)),
            IoKind::TextureView => write!(f, "{}", TextureViewId::from_index(self.index)),
        }
    }
}

impl std::fmt::Display for TaskIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_includes_kind() {
        let index = Index::from_raw_parts(2, 0);
        let buffer = TaskIo::from(BufferId::from_index(index));
        let texture = TaskIo::from(TextureId::from_index(index));
        let view = TaskIo::from(TextureViewId::from_index(index));

        assert_ne!(buffer, texture);
        assert_ne!(texture, view);
        assert_eq!(buffer, TaskIo::from(BufferId::from_index(index)));
        assert_eq!(texture.as_texture(), Some(TextureId::from_index(index)));
        assert_eq!(texture.as_buffer(), None);
        assert_eq!(view.to_string(), "view#2v0");
    }

    #[test]
    fn test_generation_distinguishes_reused_slots() {
        let old = TaskIo::from(BufferId::from_index(Index::from_raw_parts(0, 0)));
        let new = TaskIo::from(BufferId::from_index(Index::from_raw_parts(0, 1)));
        assert_ne!(old, new);
    }
}
