//! Texture types and descriptors.

use super::Extent3d;
use bitflags::bitflags;

/// Texture format enumeration.
///
/// Limited to the formats the procedural producers and UI rasterizer
/// actually write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum TextureFormat {
    /// 8-bit red channel, unsigned normalized.
    R8Unorm,
    /// 32-bit red channel, float.
    R32Float,
    /// 32-bit red channel, unsigned integer.
    R32Uint,
    /// 8-bit RGBA channels, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA channels, sRGB.
    Rgba8UnormSrgb,
    /// 32-bit RGBA channels, float.
    Rgba32Float,
    /// 32-bit depth, float.
    Depth32Float,
}

impl TextureFormat {
    /// Returns true if this is a depth format.
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth32Float)
    }

    /// Returns the size in bytes per texel.
    pub fn block_size(&self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::R32Float
            | Self::R32Uint
            | Self::Rgba8Unorm
            | Self::Rgba8UnormSrgb
            | Self::Depth32Float => 4,
            Self::Rgba32Float => 16,
        }
    }

    /// Encode a normalized RGBA color into one texel of this format.
    ///
    /// Single-channel formats take the red component.
    pub fn encode_color(&self, rgba: [f32; 4]) -> Vec<u8> {
        let unorm = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        match self {
            Self::R8Unorm => vec![unorm(rgba[0])],
            Self::R32Float | Self::Depth32Float => rgba[0].to_ne_bytes().to_vec(),
            Self::R32Uint => (rgba[0].max(0.0) as u32).to_ne_bytes().to_vec(),
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb => rgba.iter().map(|&c| unorm(c)).collect(),
            Self::Rgba32Float => bytemuck::cast_slice(&rgba).to_vec(),
        }
    }
}

bitflags! {
    /// Usage flags for textures.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be copied to.
        const COPY_DST = 1 << 1;
        /// Texture can be sampled in a shader.
        const TEXTURE_BINDING = 1 << 2;
        /// Texture can be used as a storage image.
        const STORAGE_BINDING = 1 << 3;
        /// Texture can be used as a framebuffer attachment.
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Debug label for the texture.
    pub label: Option<String>,
    /// Size of mip level 0.
    pub size: Extent3d,
    /// Mip level count.
    pub mip_level_count: u32,
    /// Texture format.
    pub format: TextureFormat,
    /// Usage flags.
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            size: Extent3d::new_2d(width, height),
            mip_level_count: 1,
            format,
            usage,
        }
    }

    /// Create a new 3D texture descriptor, e.g. a scalar field volume.
    pub fn new_3d(
        width: u32,
        height: u32,
        depth: u32,
        format: TextureFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            label: None,
            size: Extent3d::new_3d(width, height, depth),
            mip_level_count: 1,
            format,
            usage,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_level_count = count;
        self
    }

    /// Length of the full mip chain for the level 0 size.
    pub fn max_mip_levels(&self) -> u32 {
        let largest = self
            .size
            .width
            .max(self.size.height)
            .max(self.size.depth);
        u32::BITS - largest.leading_zeros()
    }

    /// Extent of a mip level, clamped to at least one texel per axis.
    pub fn mip_extent(&self, mip_level: u32) -> Extent3d {
        let shrink = |v: u32| v.checked_shr(mip_level).unwrap_or(0).max(1);
        Extent3d::new_3d(
            shrink(self.size.width),
            shrink(self.size.height),
            shrink(self.size.depth),
        )
    }

    /// Byte size of a mip level, `None` if it does not fit in a `u64`.
    pub fn mip_byte_size(&self, mip_level: u32) -> Option<u64> {
        let extent = self.mip_extent(mip_level);
        u64::from(extent.width)
            .checked_mul(u64::from(extent.height))?
            .checked_mul(u64::from(extent.depth))?
            .checked_mul(u64::from(self.format.block_size()))
    }

    /// Byte size of every mip level together.
    pub fn byte_size(&self) -> Option<u64> {
        (0..self.mip_level_count).try_fold(0u64, |total, mip| {
            total.checked_add(self.mip_byte_size(mip)?)
        })
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            label: None,
            size: Extent3d::default(),
            mip_level_count: 1,
            format: TextureFormat::default(),
            usage: TextureUsage::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_extent() {
        let desc = TextureDescriptor::new_2d(64, 16, TextureFormat::Rgba8Unorm, TextureUsage::COPY_DST)
            .with_mip_levels(7);
        assert_eq!(desc.mip_extent(0), Extent3d::new_2d(64, 16));
        assert_eq!(desc.mip_extent(2), Extent3d::new_2d(16, 4));
        assert_eq!(desc.mip_extent(6), Extent3d::new_2d(1, 1));
        assert_eq!(desc.mip_byte_size(2), Some(16 * 4 * 4));
        assert_eq!(desc.max_mip_levels(), 7);
    }

    #[test]
    fn test_mip_extent_past_chain_end() {
        let desc = TextureDescriptor::new_2d(4, 4, TextureFormat::R32Float, TextureUsage::COPY_DST);
        assert_eq!(desc.max_mip_levels(), 3);
        assert_eq!(desc.mip_extent(32), Extent3d::new_2d(1, 1));
        assert_eq!(desc.mip_extent(40), Extent3d::new_2d(1, 1));
        assert_eq!(desc.mip_byte_size(u32::MAX), Some(4));
    }

    #[test]
    fn test_byte_size_overflow() {
        let small = TextureDescriptor::new_2d(4, 4, TextureFormat::Rgba8Unorm, TextureUsage::COPY_DST)
            .with_mip_levels(3);
        assert_eq!(small.byte_size(), Some(64 + 16 + 4));

        let huge = TextureDescriptor::new_3d(
            u32::MAX,
            u32::MAX,
            u32::MAX,
            TextureFormat::Rgba32Float,
            TextureUsage::COPY_DST,
        );
        assert_eq!(huge.mip_byte_size(0), None);
        assert_eq!(huge.byte_size(), None);
    }

    #[test]
    fn test_encode_color() {
        assert_eq!(
            TextureFormat::Rgba8Unorm.encode_color([1.0, 0.0, 0.5, 1.0]),
            vec![255, 0, 128, 255]
        );
        assert_eq!(
            TextureFormat::R32Float.encode_color([2.5, 0.0, 0.0, 0.0]),
            2.5f32.to_ne_bytes().to_vec()
        );
        assert_eq!(TextureFormat::Rgba32Float.encode_color([0.0; 4]).len(), 16);
    }
}
