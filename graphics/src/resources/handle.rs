//! Typed handles into the [`ResourceRegistry`](super::ResourceRegistry).
//!
//! Every handle wraps an arena [`Index`], so two handles are equal exactly
//! when they name the same live allocation. A handle whose resource was
//! destroyed stays distinct from any handle issued later for the same slot.

use thistle_core::arena::Index;

macro_rules! resource_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) Index);

        impl $name {
            /// Underlying arena index.
            pub fn index(self) -> Index {
                self.0
            }

            /// Build a handle from a raw arena index.
            ///
            /// The handle only resolves if the registry holds a live
            /// resource at that index.
            pub fn from_index(index: Index) -> Self {
                Self(index)
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Debug::fmt(self, f)
            }
        }
    };
}

resource_handle!(
    /// Handle to a buffer.
    BufferId,
    "buffer"
);
resource_handle!(
    /// Handle to a texture.
    TextureId,
    "texture"
);
resource_handle!(
    /// Handle to a view of one mip level of a texture.
    TextureViewId,
    "view"
);
resource_handle!(
    /// Handle to a framebuffer (a set of attachment views).
    FramebufferId,
    "framebuffer"
);
resource_handle!(
    /// Handle to a compiled program (compute kernel or draw pipeline).
    ProgramId,
    "program"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_debug_format() {
        let id = BufferId::from_index(Index::from_raw_parts(3, 1));
        assert_eq!(format!("{id:?}"), "buffer#3v1");
        assert_eq!(id.to_string(), "buffer#3v1");
    }

    #[test]
    fn test_handle_equality_is_by_index() {
        let a = TextureId::from_index(Index::from_raw_parts(0, 0));
        let b = TextureId::from_index(Index::from_raw_parts(0, 1));
        assert_ne!(a, b);
        assert_eq!(a, TextureId::from_index(Index::from_raw_parts(0, 0)));
    }
}
