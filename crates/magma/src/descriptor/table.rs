//! Descriptor set tables
//!
//! An application declares the shader interface of one descriptor set as a
//! plain struct of typed descriptors. [`DescriptorSetTable`] exposes those
//! fields as an ordered list so sets can build their layout from it,
//! validate it against shader reflection and flush the dirty members.
//!
//! ```
//! use magma::descriptor::{CombinedImageSampler, DescriptorSetTable, UniformBuffer};
//! use magma::descriptor_set_table;
//!
//! descriptor_set_table! {
//!     /// Per-material bindings
//!     pub struct MaterialTable {
//!         pub constants: UniformBuffer = UniformBuffer::new(0),
//!         pub albedo: CombinedImageSampler = CombinedImageSampler::new(1),
//!     }
//! }
//!
//! let table = MaterialTable::new();
//! assert_eq!(table.len(), 2);
//! assert!(!table.dirty());
//! ```

use std::collections::HashSet;

use super::binding::Descriptor;
use crate::error::{MagmaError, MagmaResult};

/// A declared set of descriptors
pub trait DescriptorSetTable {
    /// Member descriptors in declaration order
    fn descriptors(&self) -> Vec<&Descriptor>;

    /// Mutable member descriptors in declaration order
    fn descriptors_mut(&mut self) -> Vec<&mut Descriptor>;

    /// Whether any member changed since it was last written
    fn dirty(&self) -> bool {
        self.descriptors().iter().any(|descriptor| descriptor.is_dirty())
    }

    /// Number of members
    fn len(&self) -> usize {
        self.descriptors().len()
    }

    /// Whether the table declares no descriptors
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of members waiting to be written
    fn dirty_count(&self) -> usize {
        self.descriptors().iter().filter(|descriptor| descriptor.is_dirty()).count()
    }

    /// Fail if two members share a binding index
    fn validate_unique_bindings(&self) -> MagmaResult<()> {
        let mut seen = HashSet::new();
        for descriptor in self.descriptors() {
            if !seen.insert(descriptor.binding()) {
                return Err(MagmaError::DuplicateBinding { binding: descriptor.binding() });
            }
        }
        Ok(())
    }
}

/// Declare a descriptor set table struct.
///
/// Every field is a typed descriptor with its initializer; the generated
/// `new()` builds the table and the [`DescriptorSetTable`] impl lists the
/// fields in declaration order.
#[macro_export]
macro_rules! descriptor_set_table {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty = $init:expr
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $name {
            /// Create the table with every descriptor unset
            $vis fn new() -> Self {
                Self { $($field: $init,)* }
            }
        }

        impl ::std::default::Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $crate::descriptor::DescriptorSetTable for $name {
            fn descriptors(&self) -> ::std::vec::Vec<&$crate::descriptor::Descriptor> {
                ::std::vec![$(&*self.$field),*]
            }

            fn descriptors_mut(&mut self) -> ::std::vec::Vec<&mut $crate::descriptor::Descriptor> {
                ::std::vec![$(&mut *self.$field),*]
            }
        }
    };
}
