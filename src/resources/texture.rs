//! Texture handles
//!
//! Pixel decoding happens outside the renderer; this type only owns a device
//! texture and knows how to bind it.

use crate::backend::traits::*;
use crate::backend::types::*;

/// A device texture
#[derive(Debug)]
pub struct Texture {
    name: String,
    handle: TextureHandle,
    target: TextureTarget,
    format: TextureFormat,
    width: u32,
    height: u32,
}

impl Texture {
    /// Allocate an empty texture on the device.
    pub fn create<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        descriptor: &TextureDescriptor,
    ) -> BackendResult<Self> {
        let handle = device.create_texture(descriptor)?;
        log::debug!(
            "Created {:?} texture {:?} ({}x{})",
            descriptor.target,
            descriptor.label,
            descriptor.width,
            descriptor.height
        );
        Ok(Self {
            name: descriptor.label.clone().unwrap_or_default(),
            handle,
            target: descriptor.target,
            format: descriptor.format,
            width: descriptor.width,
            height: descriptor.height,
        })
    }

    /// Create a 2D RGBA texture
    pub fn create_2d<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        name: &str,
        width: u32,
        height: u32,
    ) -> BackendResult<Self> {
        Self::create(
            device,
            &TextureDescriptor {
                label: Some(name.to_string()),
                width,
                height,
                ..Default::default()
            },
        )
    }

    /// Create a cube map with square faces
    pub fn create_cube<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        name: &str,
        face_size: u32,
    ) -> BackendResult<Self> {
        Self::create(
            device,
            &TextureDescriptor {
                label: Some(name.to_string()),
                width: face_size,
                height: face_size,
                target: TextureTarget::CubeMap,
                ..Default::default()
            },
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> TextureHandle {
        self.handle
    }

    pub fn target(&self) -> TextureTarget {
        self.target
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn bind_to_slot(&self, device: &mut dyn GraphicsDevice, unit: u32) {
        device.bind_texture(unit, self.target, self.handle);
    }

    pub fn destroy<D: GraphicsDevice + ?Sized>(self, device: &mut D) {
        device.destroy_texture(self.handle);
    }
}
