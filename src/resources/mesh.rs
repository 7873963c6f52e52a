//! Drawable payload of mesh nodes

use std::cell::RefCell;
use std::rc::Rc;

use crate::resources::{Geometry, Material};

pub type SharedGeometry = Rc<RefCell<Geometry>>;
pub type SharedMaterial = Rc<RefCell<Material>>;

/// Geometry + material pair with instancing and wireframe flags.
///
/// Geometry and material are shared references; a cloned mesh draws the same
/// buffers with the same material.
#[derive(Clone)]
pub struct Mesh {
    geometry: Option<SharedGeometry>,
    material: Option<SharedMaterial>,
    instance_count: u32,
    wireframe: bool,
}

impl Default for Mesh {
    fn default() -> Self {
        Self {
            geometry: None,
            material: None,
            instance_count: 1,
            wireframe: false,
        }
    }
}

impl std::fmt::Debug for Mesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mesh")
            .field("geometry", &self.geometry.is_some())
            .field("material", &self.material.is_some())
            .field("instance_count", &self.instance_count)
            .field("wireframe", &self.wireframe)
            .finish()
    }
}

impl Mesh {
    pub fn new(geometry: SharedGeometry, material: SharedMaterial) -> Self {
        Self {
            geometry: Some(geometry),
            material: Some(material),
            ..Default::default()
        }
    }

    /// Wrap owned values into shared references.
    pub fn from_parts(geometry: Geometry, material: Material) -> Self {
        Self::new(
            Rc::new(RefCell::new(geometry)),
            Rc::new(RefCell::new(material)),
        )
    }

    pub fn geometry(&self) -> Option<&SharedGeometry> {
        self.geometry.as_ref()
    }

    pub fn set_geometry(&mut self, geometry: Option<SharedGeometry>) {
        self.geometry = geometry;
    }

    pub fn material(&self) -> Option<&SharedMaterial> {
        self.material.as_ref()
    }

    pub fn set_material(&mut self, material: Option<SharedMaterial>) {
        self.material = material;
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Set how many instances one draw submits (at least one).
    pub fn set_instance_count(&mut self, count: u32) {
        self.instance_count = count.max(1);
    }

    pub fn with_instance_count(mut self, count: u32) -> Self {
        self.set_instance_count(count);
        self
    }

    pub fn is_wireframe(&self) -> bool {
        self.wireframe
    }

    pub fn set_wireframe(&mut self, wireframe: bool) {
        self.wireframe = wireframe;
    }
}
