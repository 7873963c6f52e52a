//! Offscreen render targets

use std::cell::RefCell;
use std::rc::Rc;

use crate::backend::{
    BackendResult, FramebufferHandle, GraphicsDevice, Rect, TextureDescriptor, TextureFormat,
    TextureHandle,
};
use crate::resources::Texture;

/// Render target shared between the renderer and its owner
pub type SharedRenderTarget = Rc<RefCell<RenderTarget>>;

/// Attachment layout of a [`RenderTarget`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTargetDesc {
    /// Number of color attachments, in draw-buffer order
    pub color_attachments: u32,
    pub color_format: TextureFormat,
    pub depth: bool,
    pub depth_format: TextureFormat,
}

impl Default for RenderTargetDesc {
    fn default() -> Self {
        Self {
            color_attachments: 1,
            color_format: TextureFormat::Rgba8Unorm,
            depth: true,
            depth_format: TextureFormat::Depth24PlusStencil8,
        }
    }
}

impl RenderTargetDesc {
    pub fn with_color_attachments(mut self, count: u32) -> Self {
        self.color_attachments = count;
        self
    }

    pub fn with_color_format(mut self, format: TextureFormat) -> Self {
        self.color_format = format;
        self
    }

    pub fn with_depth(mut self, format: Option<TextureFormat>) -> Self {
        self.depth = format.is_some();
        if let Some(format) = format {
            self.depth_format = format;
        }
        self
    }
}

/// Device objects backing one size of a target
struct Attachments {
    framebuffer: FramebufferHandle,
    colors: Vec<Texture>,
    depth: Option<Texture>,
}

impl Attachments {
    fn create(
        device: &mut dyn GraphicsDevice,
        desc: &RenderTargetDesc,
        width: u32,
        height: u32,
    ) -> BackendResult<Self> {
        let mut colors = Vec::with_capacity(desc.color_attachments as usize);
        for index in 0..desc.color_attachments {
            let created = Texture::create(
                device,
                &TextureDescriptor {
                    label: Some(format!("render target color {}", index)),
                    width,
                    height,
                    format: desc.color_format,
                    ..Default::default()
                },
            );
            match created {
                Ok(texture) => colors.push(texture),
                Err(err) => {
                    destroy_all(device, colors, None);
                    return Err(err);
                }
            }
        }

        let depth = if desc.depth {
            let created = Texture::create(
                device,
                &TextureDescriptor {
                    label: Some("render target depth".into()),
                    width,
                    height,
                    format: desc.depth_format,
                    ..Default::default()
                },
            );
            match created {
                Ok(texture) => Some(texture),
                Err(err) => {
                    destroy_all(device, colors, None);
                    return Err(err);
                }
            }
        } else {
            None
        };

        let color_ids: Vec<TextureHandle> = colors.iter().map(Texture::id).collect();
        let depth_id = depth.as_ref().map(Texture::id);
        match device.create_framebuffer(&color_ids, depth_id) {
            Ok(framebuffer) => Ok(Self {
                framebuffer,
                colors,
                depth,
            }),
            Err(err) => {
                destroy_all(device, colors, depth);
                Err(err)
            }
        }
    }

    fn destroy(self, device: &mut dyn GraphicsDevice) {
        device.destroy_framebuffer(self.framebuffer);
        destroy_all(device, self.colors, self.depth);
    }
}

fn destroy_all(device: &mut dyn GraphicsDevice, colors: Vec<Texture>, depth: Option<Texture>) {
    for texture in colors {
        texture.destroy(device);
    }
    if let Some(texture) = depth {
        texture.destroy(device);
    }
}

/// A framebuffer with its color attachments and an optional depth attachment
pub struct RenderTarget {
    desc: RenderTargetDesc,
    attachments: Attachments,
    width: u32,
    height: u32,
}

impl std::fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderTarget")
            .field("framebuffer", &self.attachments.framebuffer)
            .field("desc", &self.desc)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl RenderTarget {
    /// One color attachment plus depth-stencil.
    pub fn create(
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> BackendResult<Self> {
        Self::with_desc(device, width, height, RenderTargetDesc::default())
    }

    pub fn with_desc(
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
        desc: RenderTargetDesc,
    ) -> BackendResult<Self> {
        let attachments = Attachments::create(device, &desc, width, height)?;
        log::debug!(
            "Created render target {:?} ({}x{}, {} color)",
            attachments.framebuffer,
            width,
            height,
            desc.color_attachments
        );
        Ok(Self {
            desc,
            attachments,
            width,
            height,
        })
    }

    pub fn shared(self) -> SharedRenderTarget {
        Rc::new(RefCell::new(self))
    }

    /// Resize, recreating every attachment and the framebuffer.
    ///
    /// Sizes are clamped to 1x1. Returns `Ok(false)` when the size is unchanged.
    /// On error the target keeps its previous attachments.
    pub fn set_size(
        &mut self,
        device: &mut dyn GraphicsDevice,
        width: u32,
        height: u32,
    ) -> BackendResult<bool> {
        let (width, height) = (width.max(1), height.max(1));
        if (width, height) == (self.width, self.height) {
            return Ok(false);
        }

        let attachments = Attachments::create(device, &self.desc, width, height)?;
        std::mem::replace(&mut self.attachments, attachments).destroy(device);
        self.width = width;
        self.height = height;
        log::debug!(
            "Resized render target to {}x{} ({:?})",
            width,
            height,
            self.attachments.framebuffer
        );
        Ok(true)
    }

    pub fn desc(&self) -> &RenderTargetDesc {
        &self.desc
    }

    pub fn framebuffer(&self) -> FramebufferHandle {
        self.attachments.framebuffer
    }

    /// First color attachment
    pub fn color_texture(&self) -> Option<&Texture> {
        self.attachments.colors.first()
    }

    pub fn color_textures(&self) -> &[Texture] {
        &self.attachments.colors
    }

    pub fn depth_texture(&self) -> Option<&Texture> {
        self.attachments.depth.as_ref()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Full-size viewport
    pub fn viewport(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    pub fn destroy(self, device: &mut dyn GraphicsDevice) {
        self.attachments.destroy(device);
    }
}
