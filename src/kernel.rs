//! The interface between local physics and the assemblers.
//!
//! A kernel computes contributions of one kind of mesh entity
//! (cell edges, vertices, or facets) to the discrete system,
//! restricted to the entities selected by a [`Mask`].
//! The assemblers in [`assembly`][crate::assembly] and [`jacobian`][crate::jacobian]
//! resolve the masks for each of a kernel's regions and scatter the results.
//!
//! Contributions follow the sign convention of a residual `F(u) = A u + b = 0`:
//! kernels return `A` and `b`, and the assembler moves `b` to the right-hand side.
//! A source term `f` in `-Δu = f` is therefore returned as `-f`.

pub mod builtin;

use nalgebra as na;

use crate::mesh::{Mask, Region, SimplicialMesh};

/// Contribution of a single cell-edge incidence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeBlock {
    /// Global vertex ids of the edge's endpoints.
    pub endpoints: [usize; 2],
    /// `matrix[a][b]` couples endpoint `a`'s equation to endpoint `b`'s unknown.
    pub matrix: [[f64; 2]; 2],
    pub rhs: [f64; 2],
}

/// Contributions of a vertex kernel,
/// aligned with the indices of the mask it was evaluated on.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexValues {
    pub matrix: Vec<f64>,
    pub rhs: Vec<f64>,
}

/// Contribution of a facet to a single vertex's diagonal entry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceBlock {
    pub vertex: usize,
    pub matrix: f64,
    pub rhs: f64,
}

/// A kernel acting on the edges of selected cells, e.g. a flux term.
pub trait EdgeKernel<const DIM: usize> {
    fn regions(&self) -> &[Region<DIM>];
    /// Compute one block per edge of every cell selected by `cells`.
    fn eval(&self, mesh: &SimplicialMesh<DIM>, cells: &Mask) -> Vec<EdgeBlock>;
}

/// A kernel acting on selected vertices, e.g. a reaction or source term.
pub trait VertexKernel<const DIM: usize> {
    fn regions(&self) -> &[Region<DIM>];
    /// Compute one diagonal and one right-hand side value
    /// per vertex selected by `vertices`, in ascending order.
    fn eval(&self, mesh: &SimplicialMesh<DIM>, vertices: &Mask) -> VertexValues;
}

/// A kernel acting on selected facets, e.g. a boundary flux.
///
/// Which vertices of a facet receive its contribution is up to the kernel.
pub trait FaceKernel<const DIM: usize> {
    fn regions(&self) -> &[Region<DIM>];
    fn eval(&self, mesh: &SimplicialMesh<DIM>, faces: &Mask) -> Vec<FaceBlock>;
}

/// Any one of the three kinds of kernel.
pub enum Kernel<const DIM: usize> {
    Edge(Box<dyn EdgeKernel<DIM>>),
    Vertex(Box<dyn VertexKernel<DIM>>),
    Face(Box<dyn FaceKernel<DIM>>),
}

impl<const DIM: usize> Kernel<DIM> {
    pub fn edge(kernel: impl EdgeKernel<DIM> + 'static) -> Self {
        Self::Edge(Box::new(kernel))
    }

    pub fn vertex(kernel: impl VertexKernel<DIM> + 'static) -> Self {
        Self::Vertex(Box::new(kernel))
    }

    pub fn face(kernel: impl FaceKernel<DIM> + 'static) -> Self {
        Self::Face(Box::new(kernel))
    }

    /// The regions this kernel is evaluated on.
    pub fn regions(&self) -> &[Region<DIM>] {
        match self {
            Self::Edge(k) => k.regions(),
            Self::Vertex(k) => k.regions(),
            Self::Face(k) => k.regions(),
        }
    }
}

impl<const DIM: usize> std::fmt::Debug for Kernel<DIM> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Edge(_) => "Edge",
            Self::Vertex(_) => "Vertex",
            Self::Face(_) => "Face",
        };
        f.debug_tuple(kind).field(&self.regions()).finish()
    }
}

/// Replacement values for a row of the system fixed by a Dirichlet condition.
///
/// The row becomes `coefficient * u = rhs`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirichletValue {
    pub coefficient: f64,
    pub rhs: f64,
}

/// A condition prescribing the value of the unknown on a region.
pub trait DirichletCondition<const DIM: usize> {
    fn region(&self) -> &Region<DIM>;
    /// Values for the row of the given vertex in a linear system.
    fn eval(&self, mesh: &SimplicialMesh<DIM>, vertex: usize) -> DirichletValue;
    /// Diagonal of the given vertex's row in a Jacobian at `state`.
    fn jacobian_diagonal(
        &self,
        _mesh: &SimplicialMesh<DIM>,
        _state: &na::DVector<f64>,
        _vertex: usize,
    ) -> f64 {
        1.0
    }
}
