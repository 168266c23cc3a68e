//! Sampled textures loaded from image files.
//!
//! Pixels are decoded to RGBA8, staged in a host-visible buffer and copied
//! into a device-local image with three single-use submissions.

use crate::capabilities::PREFERRED_ANISOTROPY;
use crate::error::{GpuError, Result};
use crate::factory::ResourceFactory;
use crate::handle::Owned;
use crate::memory::{image_2d_info, Buffer, Image};
use ash::vk;
use std::path::Path;

/// Format of every texture created from decoded pixels.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Decoded RGBA8 pixels, row-major, 4 bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureData {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextureData {
    /// Decode an image file into RGBA8.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)
            .map_err(|source| GpuError::TextureDecode {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        Ok(Self {
            width,
            height,
            pixels: decoded.into_raw(),
        })
    }

    /// Wrap already-decoded RGBA8 pixels.
    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(GpuError::InvalidState(format!(
                "Expected {expected} bytes for a {width}x{height} RGBA8 image, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    /// All pixel bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA value at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        self.pixels
            .get(offset..offset + 4)
            .and_then(|p| p.try_into().ok())
    }
}

/// Access and stage masks for an image layout barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier masks for the two transitions used by texture uploads.
pub fn layout_transition_masks(
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) -> Result<TransitionMasks> {
    match (from, to) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            })
        }
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        _ => Err(GpuError::UnsupportedLayoutTransition { from, to }),
    }
}

/// Record a color image layout transition.
///
/// # Safety
/// `cmd` must be recording and `image` must be a single-level color image.
pub unsafe fn record_layout_transition(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    from: vk::ImageLayout,
    to: vk::ImageLayout,
) -> Result<()> {
    let masks = layout_transition_masks(from, to)?;
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(from)
        .new_layout(to)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
    Ok(())
}

/// Subresource range covering the single color mip and layer.
pub const fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// A device-local sampled texture.
pub struct Texture {
    sampler: Owned<vk::Sampler>,
    view: Owned<vk::ImageView>,
    image: Image,
    pixels: Option<TextureData>,
}

impl Texture {
    /// Upload `data` to a new device-local texture.
    ///
    /// With `keep_pixels` the decoded pixels stay available through
    /// [`Texture::pixel`].
    pub fn upload(factory: &ResourceFactory, data: TextureData, keep_pixels: bool) -> Result<Self> {
        let staging = Buffer::new(
            factory.context(),
            data.bytes().len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_bytes(data.bytes())?;

        let image = factory.create_image(
            &image_2d_info(
                data.width(),
                data.height(),
                TEXTURE_FORMAT,
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            ),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        factory.transition_image_layout(
            image.handle(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        factory.copy_buffer_to_image(staging.handle(), image.handle(), data.width(), data.height())?;
        factory.transition_image_layout(
            image.handle(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
        drop(staging);

        let view = factory.create_image_view(
            &vk::ImageViewCreateInfo::default()
                .image(image.handle())
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(TEXTURE_FORMAT)
                .subresource_range(color_subresource_range()),
        )?;

        let max_anisotropy = factory
            .context()
            .capabilities()
            .clamp_anisotropy(PREFERRED_ANISOTROPY);
        let sampler = factory.create_sampler(&texture_sampler_info(max_anisotropy))?;

        Ok(Self {
            sampler,
            view,
            image,
            pixels: keep_pixels.then_some(data),
        })
    }

    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }

    pub fn view(&self) -> vk::ImageView {
        self.view.raw()
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler.raw()
    }

    pub fn width(&self) -> u32 {
        self.image.extent().width
    }

    pub fn height(&self) -> u32 {
        self.image.extent().height
    }

    /// Retained pixel data, if the texture was uploaded with `keep_pixels`.
    pub fn data(&self) -> Option<&TextureData> {
        self.pixels.as_ref()
    }

    /// RGBA value at `(x, y)` from the retained pixels.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.pixels.as_ref().and_then(|data| data.pixel(x, y))
    }
}

/// Nearest-filtered, repeating sampler with anisotropy.
pub fn texture_sampler_info(max_anisotropy: f32) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::NEAREST)
        .min_filter(vk::Filter::NEAREST)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(max_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32) -> Vec<u8> {
        (0..height)
            .flat_map(|y| (0..width).flat_map(move |x| [x as u8, y as u8, (x ^ y) as u8, 255]))
            .collect()
    }

    #[test]
    fn pixel_returns_source_bytes_for_every_coordinate() {
        let data = TextureData::from_rgba8(5, 3, checker(5, 3)).unwrap();
        for y in 0..3 {
            for x in 0..5 {
                assert_eq!(
                    data.pixel(x, y),
                    Some([x as u8, y as u8, (x ^ y) as u8, 255])
                );
            }
        }
        assert_eq!(data.pixel(5, 0), None);
        assert_eq!(data.pixel(0, 3), None);
    }

    #[test]
    fn from_rgba8_rejects_wrong_length() {
        assert!(TextureData::from_rgba8(2, 2, vec![0; 15]).is_err());
    }

    #[test]
    fn load_decodes_png_to_rgba8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sprite.png");
        let source = image::RgbaImage::from_raw(4, 2, checker(4, 2)).unwrap();
        source.save(&path).unwrap();

        let data = TextureData::load(&path).unwrap();
        assert_eq!((data.width(), data.height()), (4, 2));
        assert_eq!(data.bytes(), source.as_raw().as_slice());
        assert_eq!(data.pixel(3, 1), Some([3, 1, 2, 255]));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TextureData::load(dir.path().join("missing.png")).unwrap_err();
        assert!(matches!(err, GpuError::TextureDecode { .. }));
    }

    #[test]
    fn upload_transitions_have_expected_masks() {
        let to_transfer = layout_transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_transfer.src_access, vk::AccessFlags::empty());
        assert_eq!(to_transfer.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_transfer.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_transfer.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let to_sampled = layout_transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_sampled.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_sampled.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(to_sampled.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn other_transitions_are_rejected() {
        let err = layout_transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap_err();
        assert!(matches!(err, GpuError::UnsupportedLayoutTransition { .. }));
    }
}
