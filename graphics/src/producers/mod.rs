//! Reference producers.
//!
//! Each producer owns a few resources, records its command buffer once, and
//! keeps a [`CachedTaskPair`] so that frames in which nothing changed cost
//! a pass-through instead of a recompute.
//!
//! | Producer | Output | Dirty on |
//! |----------|--------|----------|
//! | [`MetaballField`] | 3D `R32Float` scalar field | metaball count, positions, radii |
//! | [`IsoSurfaceMesh`] | vertex buffer + indirect draw args | isolevel, source field swap |
//! | [`ControlRasterizer`] | `Rgba8Unorm` target texture | control list |
//!
//! Producers allocate through [`ResourceAllocator`](crate::resources::ResourceAllocator)
//! and take their [`ProgramId`](crate::resources::ProgramId) from the
//! caller. Every module exposes the program descriptor it expects and a
//! CPU implementation of that program for the
//! [`SoftwareBackend`](crate::backend::SoftwareBackend).

mod cache;
mod control;
mod isosurface;
mod metaballs;

pub use cache::CachedTaskPair;
pub use control::{Control, ControlInstance, ControlRasterizer, ControlRasterizerConfig};
pub use isosurface::{IsoSurfaceConfig, IsoSurfaceMesh, MeshUniforms, MeshVertex};
pub use metaballs::{field_value, FieldUniforms, Metaball, MetaballField, MAX_METABALLS};

use crate::resources::{TextureId, TextureViewId};
use crate::task::SharedTask;

/// A producer that hands one present task to the runner per frame.
pub trait TaskProducer {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// The producer's cached task pair.
    fn cache(&self) -> &CachedTaskPair;

    /// Task to run this frame; see [`CachedTaskPair::present_task`].
    fn present_task(&self) -> SharedTask {
        self.cache().present_task()
    }

    /// Whether the next frame recomputes.
    fn is_dirty(&self) -> bool {
        self.cache().is_dirty()
    }

    /// Force a recompute on the next frame.
    fn mark_dirty(&self) {
        self.cache().mark_dirty();
    }
}

/// A cubic scalar field stored in a 3D `R32Float` texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldSource {
    /// Field texture.
    pub texture: TextureId,
    /// View of mip level 0.
    pub view: TextureViewId,
    /// Samples per axis.
    pub resolution: u32,
}

/// Lower corner of the cube every field covers.
pub const FIELD_MIN: f32 = -1.0;
/// Upper corner of the cube every field covers.
pub const FIELD_MAX: f32 = 1.0;

/// World position of grid sample `index` along one axis.
pub(crate) fn grid_coord(index: u32, resolution: u32) -> f32 {
    let span = resolution.saturating_sub(1).max(1) as f32;
    FIELD_MIN + (FIELD_MAX - FIELD_MIN) * index as f32 / span
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_coord_spans_cube() {
        assert_eq!(grid_coord(0, 5), -1.0);
        assert_eq!(grid_coord(2, 5), 0.0);
        assert_eq!(grid_coord(4, 5), 1.0);
    }
}
