//! `pNext` structure chains
//!
//! A [`StructureChain`] owns an ordered list of extension structures and keeps
//! their `p_next` pointers linked in insertion order, so the head can be
//! handed to any Vulkan call that takes a `pNext` value. Chains deep-copy on
//! `clone`, compare and hash by content, and are empty after being moved out
//! of with `std::mem::take`.

use std::any::Any;
use std::ffi::c_void;
use std::fmt;
use std::hash::{Hash, Hasher};

use ash::vk;

use super::structure::ExtensionStructure;
use crate::foundation::hash::{hash_sequence, hasher};

/// Type-erased chain node
trait ChainLink: Send + Sync {
    fn structure_type(&self) -> vk::StructureType;
    fn name(&self) -> &'static str;
    fn as_ptr(&self) -> *const c_void;
    fn as_raw(&mut self) -> *mut c_void;
    fn set_next(&mut self, next: *mut c_void);
    fn content_hash(&self) -> u64;
    fn content_eq(&self, other: &dyn ChainLink) -> bool;
    fn clone_link(&self) -> Box<dyn ChainLink>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Node<T: ExtensionStructure>(T);

// SAFETY: registered structures carry no pointer besides `p_next`, and every
// `p_next` of a chain points into nodes owned by that same chain.
unsafe impl<T: ExtensionStructure> Send for Node<T> {}
// SAFETY: shared access never writes through the payload.
unsafe impl<T: ExtensionStructure> Sync for Node<T> {}

impl<T: ExtensionStructure> Node<T> {
    fn fields(&self) -> Vec<u64> {
        let mut fields = Vec::new();
        self.0.visit_fields(&mut |bits| fields.push(bits));
        fields
    }
}

impl<T: ExtensionStructure> ChainLink for Node<T> {
    fn structure_type(&self) -> vk::StructureType {
        T::STRUCTURE_TYPE
    }

    fn name(&self) -> &'static str {
        T::NAME
    }

    fn as_ptr(&self) -> *const c_void {
        std::ptr::addr_of!(self.0).cast()
    }

    fn as_raw(&mut self) -> *mut c_void {
        std::ptr::addr_of_mut!(self.0).cast()
    }

    fn set_next(&mut self, next: *mut c_void) {
        self.0.set_next(next);
    }

    fn content_hash(&self) -> u64 {
        let mut state = hasher();
        state.write_i32(T::STRUCTURE_TYPE.as_raw());
        self.0.visit_fields(&mut |bits| state.write_u64(bits));
        state.finish()
    }

    fn content_eq(&self, other: &dyn ChainLink) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self.fields() == other.fields())
    }

    fn clone_link(&self) -> Box<dyn ChainLink> {
        let mut copy = self.0;
        copy.set_next(std::ptr::null_mut());
        Box::new(Node(copy))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Ordered, owning list of Vulkan extension structures
#[derive(Default)]
pub struct StructureChain {
    nodes: Vec<Box<dyn ChainLink>>,
}

impl StructureChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a structure at the tail.
    ///
    /// The structure's `p_next` is overwritten: the previous tail now points
    /// at it and it becomes the terminating node. Structure types already in
    /// the chain are not rejected.
    pub fn link_node<T: ExtensionStructure>(&mut self, mut structure: T) -> &mut Self {
        structure.set_next(std::ptr::null_mut());
        let mut node: Box<dyn ChainLink> = Box::new(Node(structure));
        let raw = node.as_raw();
        if let Some(tail) = self.nodes.last_mut() {
            tail.set_next(raw);
        }
        self.nodes.push(node);
        self
    }

    /// First node of type `T`
    pub fn find_node<T: ExtensionStructure>(&self) -> Option<&T> {
        self.nodes
            .iter()
            .find_map(|node| node.as_any().downcast_ref::<Node<T>>())
            .map(|node| &node.0)
    }

    /// First node with the given structure type, as a raw pointer to the
    /// structure
    pub fn find_node_by_type(&self, structure_type: vk::StructureType) -> Option<*const c_void> {
        self.nodes
            .iter()
            .find(|node| node.structure_type() == structure_type)
            .map(|node| node.as_ptr())
    }

    /// Mutate the first node of type `T` in place.
    ///
    /// The node's `p_next` is restored afterwards, so the closure cannot
    /// break the chain. Returns `false` when no such node exists.
    pub fn modify_node<T: ExtensionStructure>(&mut self, modify: impl FnOnce(&mut T)) -> bool {
        let Some(node) = self
            .nodes
            .iter_mut()
            .find_map(|node| node.as_any_mut().downcast_mut::<Node<T>>())
        else {
            return false;
        };
        let next = node.0.next();
        modify(&mut node.0);
        node.0.set_next(next);
        true
    }

    /// Pointer to the first structure, null when the chain is empty
    pub fn head_node(&self) -> *const c_void {
        self.nodes
            .first()
            .map_or(std::ptr::null(), |node| node.as_ptr())
    }

    /// Mutable pointer to the first structure, for queries the driver fills
    /// in (e.g. `vkGetPhysicalDeviceFeatures2`)
    pub fn head_node_mut(&mut self) -> *mut c_void {
        self.nodes
            .first_mut()
            .map_or(std::ptr::null_mut(), |node| node.as_raw())
    }

    /// Number of linked structures
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the chain has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Release every node
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Structure types in `pNext` order
    pub fn structure_types(&self) -> impl Iterator<Item = vk::StructureType> + '_ {
        self.nodes.iter().map(|node| node.structure_type())
    }

    /// Combined content hash of every node in order; `0` for an empty chain
    pub fn content_hash(&self) -> u64 {
        hash_sequence(self.nodes.iter().map(|node| node.content_hash()))
    }

    fn relink(&mut self) {
        let raw: Vec<*mut c_void> = self.nodes.iter_mut().map(|node| node.as_raw()).collect();
        for (index, node) in self.nodes.iter_mut().enumerate() {
            let next = raw.get(index + 1).copied().unwrap_or(std::ptr::null_mut());
            node.set_next(next);
        }
    }
}

impl Clone for StructureChain {
    fn clone(&self) -> Self {
        let mut chain = Self {
            nodes: self.nodes.iter().map(|node| node.clone_link()).collect(),
        };
        chain.relink();
        chain
    }
}

impl PartialEq for StructureChain {
    fn eq(&self, other: &Self) -> bool {
        self.nodes.len() == other.nodes.len()
            && self
                .nodes
                .iter()
                .zip(&other.nodes)
                .all(|(a, b)| a.content_eq(b.as_ref()))
    }
}

impl Eq for StructureChain {}

impl Hash for StructureChain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.content_hash());
    }
}

impl fmt::Debug for StructureChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.nodes.iter().map(|node| node.name()))
            .finish()
    }
}
