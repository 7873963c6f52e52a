//! Transform hierarchy
//!
//! Nodes live behind [`Rc`]: a parent owns its children, children hold a [`Weak`]
//! back-reference used only for matrix composition and lookups. Local and world
//! matrices are cached and recomputed lazily. Any TRS mutation marks the node and
//! every current descendant stale; the next matrix read recomputes from the root
//! down through the stale chain.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use glam::{Mat4, Quat, Vec3};
use thiserror::Error;

use crate::clock::FrameContext;
use crate::resources::Mesh;
use crate::scene::{Light, Projection, SceneBackground, Transform};

/// Scene structure error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    #[error("Node {0} cannot be added to itself")]
    AddSelf(NodeId),
    #[error("Node {child} is an ancestor of {parent} and cannot become its child")]
    AddAncestor { parent: NodeId, child: NodeId },
}

/// Unique node identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        NodeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub type NodeRef = Rc<Node>;

/// Per-frame callback run by [`Node::update_tree`].
pub type UpdateHook = Box<dyn FnMut(&NodeRef, &FrameContext)>;

/// What a node is, beyond its transform.
pub enum NodeKind {
    /// Plain group/object node
    Object,
    /// Drawable
    Mesh(RefCell<Mesh>),
    /// Camera; looks down -Z
    Camera(Cell<Projection>),
    /// Light; looks down -Z
    Light(Cell<Light>),
    /// Scene root carrying an optional background
    Scene(RefCell<Option<SceneBackground>>),
}

impl NodeKind {
    fn duplicate(&self) -> NodeKind {
        match self {
            NodeKind::Object => NodeKind::Object,
            NodeKind::Mesh(mesh) => NodeKind::Mesh(RefCell::new(mesh.borrow().clone())),
            NodeKind::Camera(projection) => NodeKind::Camera(Cell::new(projection.get())),
            NodeKind::Light(light) => NodeKind::Light(Cell::new(light.get())),
            NodeKind::Scene(background) => {
                NodeKind::Scene(RefCell::new(background.borrow().clone()))
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            NodeKind::Object => "Object",
            NodeKind::Mesh(_) => "Mesh",
            NodeKind::Camera(_) => "Camera",
            NodeKind::Light(_) => "Light",
            NodeKind::Scene(_) => "Scene",
        }
    }
}

/// A node in the scene hierarchy.
pub struct Node {
    id: NodeId,
    name: RefCell<String>,
    visible: Cell<bool>,
    transform: Cell<Transform>,
    local: Cell<Mat4>,
    world: Cell<Mat4>,
    stale: Cell<bool>,
    parent: RefCell<Weak<Node>>,
    children: RefCell<Vec<NodeRef>>,
    kind: NodeKind,
    on_update: RefCell<Option<UpdateHook>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind.label())
            .field("name", &*self.name.borrow())
            .field("visible", &self.visible.get())
            .field("transform", &self.transform.get())
            .field("children", &self.children.borrow().len())
            .finish()
    }
}

impl Node {
    /// Create a detached node of the given kind.
    pub fn with_kind(name: impl Into<String>, kind: NodeKind) -> NodeRef {
        Rc::new(Self {
            id: NodeId::next(),
            name: RefCell::new(name.into()),
            visible: Cell::new(true),
            transform: Cell::new(Transform::default()),
            local: Cell::new(Mat4::IDENTITY),
            world: Cell::new(Mat4::IDENTITY),
            stale: Cell::new(true),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
            kind,
            on_update: RefCell::new(None),
        })
    }

    pub fn new(name: impl Into<String>) -> NodeRef {
        Self::with_kind(name, NodeKind::Object)
    }

    pub fn mesh(name: impl Into<String>, mesh: Mesh) -> NodeRef {
        Self::with_kind(name, NodeKind::Mesh(RefCell::new(mesh)))
    }

    pub fn camera(name: impl Into<String>, projection: Projection) -> NodeRef {
        Self::with_kind(name, NodeKind::Camera(Cell::new(projection)))
    }

    pub fn light(name: impl Into<String>, light: Light) -> NodeRef {
        Self::with_kind(name, NodeKind::Light(Cell::new(light)))
    }

    pub fn scene(name: impl Into<String>) -> NodeRef {
        Self::with_kind(name, NodeKind::Scene(RefCell::new(None)))
    }

    // ------------------------------------------------------------------
    // Identity and payload
    // ------------------------------------------------------------------

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> String {
        self.name.borrow().clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.borrow_mut() = name.into();
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.set(visible);
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_mesh(&self) -> bool {
        matches!(self.kind, NodeKind::Mesh(_))
    }

    /// Cameras and lights face -Z, everything else +Z.
    pub fn looks_down_negative_z(&self) -> bool {
        matches!(self.kind, NodeKind::Camera(_) | NodeKind::Light(_))
    }

    pub fn mesh_data(&self) -> Option<Ref<'_, Mesh>> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh.borrow()),
            _ => None,
        }
    }

    pub fn mesh_data_mut(&self) -> Option<RefMut<'_, Mesh>> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh.borrow_mut()),
            _ => None,
        }
    }

    pub fn projection(&self) -> Option<Projection> {
        match &self.kind {
            NodeKind::Camera(projection) => Some(projection.get()),
            _ => None,
        }
    }

    /// Replace a camera node's projection. Returns `false` for other kinds.
    pub fn set_projection(&self, value: Projection) -> bool {
        match &self.kind {
            NodeKind::Camera(projection) => {
                projection.set(value);
                true
            }
            _ => false,
        }
    }

    pub fn light_data(&self) -> Option<Light> {
        match &self.kind {
            NodeKind::Light(light) => Some(light.get()),
            _ => None,
        }
    }

    pub fn background(&self) -> Option<SceneBackground> {
        match &self.kind {
            NodeKind::Scene(background) => background.borrow().clone(),
            _ => None,
        }
    }

    /// Set a scene node's background. Returns `false` for other kinds.
    pub fn set_background(&self, value: Option<SceneBackground>) -> bool {
        match &self.kind {
            NodeKind::Scene(background) => {
                *background.borrow_mut() = value;
                true
            }
            _ => {
                log::warn!("Node {} is not a scene, background ignored", self.id);
                false
            }
        }
    }

    pub fn set_on_update(&self, hook: impl FnMut(&NodeRef, &FrameContext) + 'static) {
        *self.on_update.borrow_mut() = Some(Box::new(hook));
    }

    pub fn clear_on_update(&self) {
        self.on_update.borrow_mut().take();
    }

    // ------------------------------------------------------------------
    // Local transform
    // ------------------------------------------------------------------

    pub fn transform(&self) -> Transform {
        self.transform.get()
    }

    pub fn position(&self) -> Vec3 {
        self.transform.get().position
    }

    pub fn rotation(&self) -> Quat {
        self.transform.get().rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.transform.get().scale
    }

    pub fn set_transform(&self, transform: Transform) {
        self.transform.set(Transform {
            rotation: transform.rotation.normalize(),
            ..transform
        });
        self.mark_stale();
    }

    pub fn set_position(&self, position: Vec3) {
        self.update_transform(|t| t.position = position);
    }

    pub fn set_rotation(&self, rotation: Quat) {
        self.update_transform(|t| t.rotation = rotation.normalize());
    }

    pub fn set_scale(&self, scale: Vec3) {
        self.update_transform(|t| t.scale = scale);
    }

    /// Rotate around a local axis (post-multiplied).
    pub fn rotate_on_axis(&self, axis: Vec3, angle: f32) {
        let delta = Quat::from_axis_angle(axis.normalize(), angle);
        self.update_transform(|t| t.rotation = (t.rotation * delta).normalize());
    }

    /// Rotate around an axis expressed in the parent's frame (pre-multiplied).
    pub fn rotate_on_world_axis(&self, axis: Vec3, angle: f32) {
        let delta = Quat::from_axis_angle(axis.normalize(), angle);
        self.update_transform(|t| t.rotation = (delta * t.rotation).normalize());
    }

    /// Move along a local axis.
    pub fn translate_on_axis(&self, axis: Vec3, distance: f32) {
        self.update_transform(|t| t.translate_on_axis(axis, distance));
    }

    fn update_transform(&self, f: impl FnOnce(&mut Transform)) {
        let mut transform = self.transform.get();
        f(&mut transform);
        self.transform.set(transform);
        self.mark_stale();
    }

    // ------------------------------------------------------------------
    // Cached matrices
    // ------------------------------------------------------------------

    /// Invalidate the cached matrices of this node and every descendant.
    pub fn mark_stale(&self) {
        self.stale.set(true);
        for child in self.children.borrow().iter() {
            child.mark_stale();
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale.get()
    }

    pub fn local_matrix(&self) -> Mat4 {
        self.refresh();
        self.local.get()
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.refresh();
        self.world.get()
    }

    fn refresh(&self) {
        if !self.stale.get() {
            return;
        }
        let local = self.transform.get().matrix();
        let world = match self.parent() {
            Some(parent) => parent.world_matrix() * local,
            None => local,
        };
        self.local.set(local);
        self.world.set(world);
        self.stale.set(false);
    }

    pub fn world_position(&self) -> Vec3 {
        self.world_matrix().w_axis.truncate()
    }

    pub fn world_rotation(&self) -> Quat {
        let (_, rotation, _) = self.world_matrix().to_scale_rotation_translation();
        rotation
    }

    /// World-space +Z axis of this node.
    pub fn world_direction(&self) -> Vec3 {
        self.world_matrix()
            .transform_vector3(Vec3::Z)
            .normalize_or_zero()
    }

    /// Move the node so that its world position becomes `position`.
    pub fn set_world_position(&self, position: Vec3) {
        let local = match self.parent() {
            Some(parent) => parent.world_matrix().inverse().transform_point3(position),
            None => position,
        };
        self.set_position(local);
    }

    /// Orient the node towards a world-space point.
    ///
    /// Cameras and lights end up with -Z pointing at the target; other nodes with
    /// +Z. A target coincident with the node leaves the rotation unchanged.
    pub fn look_at(&self, target: Vec3) {
        let eye = self.world_position();
        let mut forward = target - eye;
        if forward.length_squared() <= f32::EPSILON {
            return;
        }
        if !self.looks_down_negative_z() {
            forward = -forward;
        }
        // -Z of the resulting frame points along `forward`
        let forward = forward.normalize();
        let up = if forward.cross(Vec3::Y).length_squared() <= f32::EPSILON {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(Vec3::ZERO, forward, up);
        let world_rotation = Quat::from_mat4(&view.inverse()).normalize();

        let rotation = match self.parent() {
            Some(parent) => parent.world_rotation().inverse() * world_rotation,
            None => world_rotation,
        };
        self.set_rotation(rotation);
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.borrow().upgrade()
    }

    /// Snapshot of the current children, in order.
    pub fn children(&self) -> Vec<NodeRef> {
        self.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    fn is_ancestor_of(&self, node: &Node) -> bool {
        let mut current = node.parent();
        while let Some(ancestor) = current {
            if std::ptr::eq(Rc::as_ptr(&ancestor), self) {
                return true;
            }
            current = ancestor.parent();
        }
        false
    }

    /// Attach `child`, detaching it from its previous parent first.
    pub fn add(self: &Rc<Self>, child: &NodeRef) -> Result<(), SceneError> {
        if Rc::ptr_eq(self, child) {
            return Err(SceneError::AddSelf(self.id));
        }
        if child.is_ancestor_of(self) {
            return Err(SceneError::AddAncestor {
                parent: self.id,
                child: child.id,
            });
        }
        if let Some(old_parent) = child.parent() {
            old_parent.detach(child);
        }
        *child.parent.borrow_mut() = Rc::downgrade(self);
        self.children.borrow_mut().push(Rc::clone(child));
        child.mark_stale();
        Ok(())
    }

    /// Detach `child`. Returns `false` when it is not a child of this node.
    pub fn remove(&self, child: &NodeRef) -> bool {
        if !self.detach(child) {
            return false;
        }
        *child.parent.borrow_mut() = Weak::new();
        child.mark_stale();
        true
    }

    pub fn remove_from_parent(self: &Rc<Self>) -> bool {
        match self.parent() {
            Some(parent) => parent.remove(self),
            None => false,
        }
    }

    fn detach(&self, child: &NodeRef) -> bool {
        let mut children = self.children.borrow_mut();
        match children.iter().position(|c| Rc::ptr_eq(c, child)) {
            Some(index) => {
                children.remove(index);
                true
            }
            None => false,
        }
    }

    /// Pre-order visit of this node and every descendant, regardless of visibility.
    pub fn traverse(self: &Rc<Self>, visit: &mut impl FnMut(&NodeRef)) {
        visit(self);
        for child in self.children() {
            child.traverse(visit);
        }
    }

    pub fn find_by_name(self: &Rc<Self>, name: &str) -> Option<NodeRef> {
        let mut found = None;
        self.traverse(&mut |node| {
            if found.is_none() && *node.name.borrow() == name {
                found = Some(Rc::clone(node));
            }
        });
        found
    }

    /// Run every node's update hook in pre-order.
    ///
    /// Invisible nodes are updated too; visibility only affects drawing.
    pub fn update_tree(self: &Rc<Self>, frame: &FrameContext) {
        self.traverse(&mut |node| {
            let hook = node.on_update.borrow_mut().take();
            if let Some(mut hook) = hook {
                hook(node, frame);
                let mut slot = node.on_update.borrow_mut();
                if slot.is_none() {
                    *slot = Some(hook);
                }
            }
        });
    }

    /// Copy this node into a new detached node.
    ///
    /// The copy gets a fresh id and starts stale. Meshes share geometry and
    /// material with the original. Update hooks are not copied.
    pub fn clone_node(self: &Rc<Self>, recursive: bool) -> NodeRef {
        let copy = Self::with_kind(self.name(), self.kind.duplicate());
        copy.visible.set(self.visible.get());
        copy.transform.set(self.transform.get());

        if recursive {
            for child in self.children() {
                let child_copy = child.clone_node(true);
                *child_copy.parent.borrow_mut() = Rc::downgrade(&copy);
                copy.children.borrow_mut().push(child_copy);
            }
        }
        copy
    }
}
