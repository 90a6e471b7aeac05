//! Finite element spaces: a mesh paired with the element describing every cell.

use crate::element::FiniteElement;
use crate::mesh::Mesh;
use crate::Real;
use eyre::bail;

/// A finite element space over a single-element-type mesh.
///
/// The space owns its mesh; geometry operations that transparently reorder
/// the nodal grid function or upgrade the mesh with node storage go through
/// [`FeSpace::mesh_mut`].
#[derive(Debug, Clone)]
pub struct FeSpace<T: Real> {
    mesh: Mesh<T>,
    fe: FiniteElement,
}

impl<T: Real> FeSpace<T> {
    /// Pairs a mesh with a reference element.
    ///
    /// The element must match the mesh's element type, and its local dof
    /// count must match the mesh connectivity.
    pub fn new(mesh: Mesh<T>, fe: FiniteElement) -> eyre::Result<Self> {
        if fe.element_type() != mesh.element_type() {
            bail!(
                "element type {:?} does not match the mesh element type {:?}",
                fe.element_type(),
                mesh.element_type()
            );
        }
        if fe.num_dofs() != mesh.dofs_per_element() {
            bail!(
                "element has {} local dofs but the mesh connectivity has {} per element",
                fe.num_dofs(),
                mesh.dofs_per_element()
            );
        }
        Ok(Self { mesh, fe })
    }

    pub fn mesh(&self) -> &Mesh<T> {
        &self.mesh
    }

    pub fn mesh_mut(&mut self) -> &mut Mesh<T> {
        &mut self.mesh
    }

    pub fn into_mesh(self) -> Mesh<T> {
        self.mesh
    }

    pub fn finite_element(&self) -> &FiniteElement {
        &self.fe
    }

    pub fn dim(&self) -> usize {
        self.mesh.dim()
    }

    pub fn num_elements(&self) -> usize {
        self.mesh.num_elements()
    }

    /// The number of global (scalar) dofs.
    pub fn num_dofs(&self) -> usize {
        self.mesh.num_dofs()
    }
}
