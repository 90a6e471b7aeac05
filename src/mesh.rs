//! Mesh topology and nodal coordinate storage.
//!
//! The mesh is the collaborator the geometry engine reads: it owns the
//! element-to-dof connectivity table, a monotonically increasing modification
//! sequence, and (optionally) a nodal coordinate [`GridFunction`] with an
//! explicit storage ordering. The geometry engine only ever reads
//! connectivity; coordinates may be transparently reordered and restored
//! around a gather.

use crate::element::ElementType;
use crate::Real;
use eyre::bail;
use serde::{Deserialize, Serialize};

/// Storage ordering of a vector-valued nodal field.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeOrdering {
    /// Blocked: all x-components first, then all y-components, and so on.
    ByNodes,
    /// Interleaved: the components of each node are adjacent.
    ByVdim,
}

/// A flat vector-valued nodal field, e.g. the coordinates of every mesh node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: serde::Serialize", deserialize = "T: serde::Deserialize<'de>"))]
pub struct GridFunction<T: Real> {
    data: Vec<T>,
    num_dofs: usize,
    vdim: usize,
    ordering: NodeOrdering,
}

impl<T: Real> GridFunction<T> {
    pub fn from_parts(
        data: Vec<T>,
        num_dofs: usize,
        vdim: usize,
        ordering: NodeOrdering,
    ) -> eyre::Result<Self> {
        if data.len() != num_dofs * vdim {
            bail!(
                "grid function buffer has length {}, expected num_dofs * vdim = {}",
                data.len(),
                num_dofs * vdim
            );
        }
        Ok(Self {
            data,
            num_dofs,
            vdim,
            ordering,
        })
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn vdim(&self) -> usize {
        self.vdim
    }

    pub fn ordering(&self) -> NodeOrdering {
        self.ordering
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable access to the raw buffer.
    ///
    /// The buffer is interpreted according to [`GridFunction::ordering`];
    /// use [`crate::reorder`] to change the layout, never this accessor alone.
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub(crate) fn set_ordering(&mut self, ordering: NodeOrdering) {
        self.ordering = ordering;
    }
}

/// Index-based mesh with a single element type and a fixed number of local
/// dofs per element.
///
/// `vertices` always stores the interleaved coordinates of every global dof.
/// The optional nodal grid function is the coordinate field consumed by the
/// geometry engine; meshes without one are upgraded on demand via
/// [`Mesh::ensure_nodes`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "T: serde::Serialize", deserialize = "T: serde::Deserialize<'de>"))]
pub struct Mesh<T: Real> {
    element_type: ElementType,
    dofs_per_element: usize,
    // Interleaved (component, node) coordinates of every global dof
    vertices: Vec<T>,
    // Global dof indices, local dof fastest
    element_dofs: Vec<usize>,
    nodes: Option<GridFunction<T>>,
    sequence: u64,
}

impl<T: Real> Mesh<T> {
    /// Constructs a mesh from raw vertex coordinates and connectivity.
    ///
    /// `vertices` must hold interleaved coordinates (`dim` components per
    /// global dof), and every index in `element_dofs` must be in bounds.
    pub fn from_raw_parts(
        element_type: ElementType,
        vertices: Vec<T>,
        dofs_per_element: usize,
        element_dofs: Vec<usize>,
    ) -> eyre::Result<Self> {
        let dim = element_type.dim();
        if dofs_per_element == 0 {
            bail!("meshes require at least one dof per element");
        }
        if vertices.len() % dim != 0 {
            bail!(
                "vertex buffer length {} is not a multiple of the spatial dimension {}",
                vertices.len(),
                dim
            );
        }
        if element_dofs.len() % dofs_per_element != 0 {
            bail!(
                "connectivity length {} is not a multiple of the local dof count {}",
                element_dofs.len(),
                dofs_per_element
            );
        }
        let num_nodes = vertices.len() / dim;
        if let Some(&bad) = element_dofs.iter().find(|&&index| index >= num_nodes) {
            bail!(
                "connectivity references dof {} but the mesh has only {} dofs",
                bad,
                num_nodes
            );
        }
        Ok(Self {
            element_type,
            dofs_per_element,
            vertices,
            element_dofs,
            nodes: None,
            sequence: 0,
        })
    }

    pub fn dim(&self) -> usize {
        self.element_type.dim()
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn num_elements(&self) -> usize {
        self.element_dofs.len() / self.dofs_per_element
    }

    /// The number of global (scalar) dofs.
    pub fn num_dofs(&self) -> usize {
        self.vertices.len() / self.dim()
    }

    pub fn dofs_per_element(&self) -> usize {
        self.dofs_per_element
    }

    /// The global dof indices of element `element_index`.
    pub fn element_dofs(&self, element_index: usize) -> &[usize] {
        let n = self.dofs_per_element;
        &self.element_dofs[element_index * n..(element_index + 1) * n]
    }

    /// The full element-to-dof table, local dof fastest.
    pub fn element_dof_table(&self) -> &[usize] {
        &self.element_dofs
    }

    /// The monotonically increasing modification counter.
    ///
    /// Every geometric or topological state change increments this; cached
    /// quantities derived from the mesh record the sequence they were computed
    /// at and must be discarded when it moves on.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Marks the mesh as modified, invalidating all derived caches.
    ///
    /// Call this after mutating coordinate data through [`Mesh::nodes_mut`].
    pub fn mark_modified(&mut self) {
        self.sequence += 1;
    }

    pub fn nodes(&self) -> Option<&GridFunction<T>> {
        self.nodes.as_ref()
    }

    /// Mutable access to the nodal grid function.
    ///
    /// Mutating coordinates through this accessor does *not* bump the
    /// modification sequence; callers that change the geometry must follow up
    /// with [`Mesh::mark_modified`].
    pub fn nodes_mut(&mut self) -> Option<&mut GridFunction<T>> {
        self.nodes.as_mut()
    }

    /// Ensures the mesh carries a nodal coordinate grid function.
    ///
    /// A mesh without one gains an interleaved copy of its vertex coordinates
    /// (the curvature-order-1 upgrade). The upgrade is a persistent,
    /// caller-visible state change and bumps the modification sequence; calling
    /// this on a mesh that already has nodes is a no-op.
    pub fn ensure_nodes(&mut self) {
        if self.nodes.is_none() {
            let gf = GridFunction::from_parts(
                self.vertices.clone(),
                self.num_dofs(),
                self.dim(),
                NodeOrdering::ByVdim,
            )
            .expect("Vertex buffer length is validated at construction");
            self.nodes = Some(gf);
            self.sequence += 1;
        }
    }

    /// Replaces the nodal coordinates and marks the mesh modified.
    ///
    /// The replacement buffer must match the layout (length and ordering) of
    /// the existing grid function.
    pub fn set_node_positions(&mut self, positions: &[T]) {
        let nodes = self
            .nodes
            .as_mut()
            .expect("Mesh has no nodal grid function; call ensure_nodes first");
        assert_eq!(
            positions.len(),
            nodes.data().len(),
            "Replacement coordinate buffer length mismatch"
        );
        nodes.data_mut().copy_from_slice(positions);
        self.sequence += 1;
    }
}
