//! Assembly of Jacobian matrices for nonlinear problems.
//!
//! This mirrors [`assembly`][crate::assembly],
//! except that kernels see the current state and only a matrix is produced.
//! Evaluating the residual itself is left to the nonlinear solver.

use nalgebra as na;
use nalgebra_sparse as nas;

use itertools::izip;

use crate::{
    assembly::{check_length, Accumulator, AssemblyError},
    kernel::DirichletCondition,
    mesh::{EntityKind, Mask, Region, SimplicialMesh},
    operator::{replace_csr_rows, MatrixOperator},
};

/// Derivative of a single cell-edge contribution with respect to the endpoint values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeJacobianBlock {
    pub endpoints: [usize; 2],
    pub matrix: [[f64; 2]; 2],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceJacobianBlock {
    pub vertex: usize,
    pub value: f64,
}

/// Jacobian counterpart of [`EdgeKernel`][crate::kernel::EdgeKernel].
pub trait EdgeJacobianKernel<const DIM: usize> {
    fn regions(&self) -> &[Region<DIM>];
    fn eval(
        &self,
        mesh: &SimplicialMesh<DIM>,
        cells: &Mask,
        state: &na::DVector<f64>,
    ) -> Vec<EdgeJacobianBlock>;
}

/// Jacobian counterpart of [`VertexKernel`][crate::kernel::VertexKernel].
/// Returns one diagonal value per selected vertex.
pub trait VertexJacobianKernel<const DIM: usize> {
    fn regions(&self) -> &[Region<DIM>];
    fn eval(
        &self,
        mesh: &SimplicialMesh<DIM>,
        vertices: &Mask,
        state: &na::DVector<f64>,
    ) -> Vec<f64>;
}

/// Jacobian counterpart of [`FaceKernel`][crate::kernel::FaceKernel].
pub trait FaceJacobianKernel<const DIM: usize> {
    fn regions(&self) -> &[Region<DIM>];
    fn eval(
        &self,
        mesh: &SimplicialMesh<DIM>,
        faces: &Mask,
        state: &na::DVector<f64>,
    ) -> Vec<FaceJacobianBlock>;
}

/// Any one of the three kinds of Jacobian kernel.
pub enum JacobianKernel<const DIM: usize> {
    Edge(Box<dyn EdgeJacobianKernel<DIM>>),
    Vertex(Box<dyn VertexJacobianKernel<DIM>>),
    Face(Box<dyn FaceJacobianKernel<DIM>>),
}

impl<const DIM: usize> JacobianKernel<DIM> {
    pub fn edge(kernel: impl EdgeJacobianKernel<DIM> + 'static) -> Self {
        Self::Edge(Box::new(kernel))
    }

    pub fn vertex(kernel: impl VertexJacobianKernel<DIM> + 'static) -> Self {
        Self::Vertex(Box::new(kernel))
    }

    pub fn face(kernel: impl FaceJacobianKernel<DIM> + 'static) -> Self {
        Self::Face(Box::new(kernel))
    }
}

/// Assemble the Jacobian matrix of a nonlinear problem at `state`.
///
/// Rows of vertices covered by Dirichlet conditions are cleared
/// and their diagonal set from [`DirichletCondition::jacobian_diagonal`],
/// later conditions taking precedence.
pub fn assemble_matrix<const DIM: usize>(
    mesh: &SimplicialMesh<DIM>,
    state: &na::DVector<f64>,
    edge_kernels: &[&dyn EdgeJacobianKernel<DIM>],
    vertex_kernels: &[&dyn VertexJacobianKernel<DIM>],
    face_kernels: &[&dyn FaceJacobianKernel<DIM>],
    dirichlets: &[&dyn DirichletCondition<DIM>],
) -> Result<nas::CsrMatrix<f64>, AssemblyError> {
    let n = mesh.vertex_count();
    if state.len() != n {
        return Err(AssemblyError::StateLength {
            expected: n,
            actual: state.len(),
        });
    }
    let mut acc = Accumulator::new(n);

    for kernel in edge_kernels {
        for region in kernel.regions() {
            let cells = mesh.mask_for(region, EntityKind::Cell);
            for block in kernel.eval(mesh, &cells, state) {
                acc.add_edge(block.endpoints, block.matrix, [0.0; 2])?;
            }
        }
    }

    for kernel in vertex_kernels {
        for region in kernel.regions() {
            let vertices = mesh.mask_for(region, EntityKind::Vertex);
            let values = kernel.eval(mesh, &vertices, state);
            check_length(vertices.count(n), values.len())?;
            for (v, &value) in izip!(vertices.indices(n), &values) {
                acc.add_vertex(v, value, 0.0)?;
            }
        }
    }

    for kernel in face_kernels {
        for region in kernel.regions() {
            let faces = mesh.mask_for(region, EntityKind::Face);
            for block in kernel.eval(mesh, &faces, state) {
                acc.add_face(block.vertex, block.value, 0.0)?;
            }
        }
    }

    let (matrix, _) = acc.finish();

    let mut replacements: Vec<Option<f64>> = vec![None; n];
    for dirichlet in dirichlets {
        let vertices = mesh.mask_for(dirichlet.region(), EntityKind::Vertex);
        for v in vertices.indices(n) {
            replacements[v] = Some(dirichlet.jacobian_diagonal(mesh, state, v));
        }
    }

    Ok(replace_csr_rows(matrix, &replacements))
}

/// The Jacobian of a nonlinear problem,
/// made of Jacobian kernels and Dirichlet conditions.
#[derive(Default)]
pub struct Jacobian<const DIM: usize> {
    pub kernels: Vec<JacobianKernel<DIM>>,
    pub dirichlets: Vec<Box<dyn DirichletCondition<DIM>>>,
}

impl<const DIM: usize> Jacobian<DIM> {
    pub fn new() -> Self {
        Self {
            kernels: Vec::new(),
            dirichlets: Vec::new(),
        }
    }

    pub fn with_kernel(mut self, kernel: JacobianKernel<DIM>) -> Self {
        self.kernels.push(kernel);
        self
    }

    pub fn with_dirichlet(mut self, dirichlet: impl DirichletCondition<DIM> + 'static) -> Self {
        self.dirichlets.push(Box::new(dirichlet));
        self
    }

    /// Assemble the Jacobian matrix at `state`.
    pub fn assemble(
        &self,
        mesh: &SimplicialMesh<DIM>,
        state: &na::DVector<f64>,
    ) -> Result<nas::CsrMatrix<f64>, AssemblyError> {
        let mut edge: Vec<&dyn EdgeJacobianKernel<DIM>> = Vec::new();
        let mut vertex: Vec<&dyn VertexJacobianKernel<DIM>> = Vec::new();
        let mut face: Vec<&dyn FaceJacobianKernel<DIM>> = Vec::new();
        for kernel in &self.kernels {
            match kernel {
                JacobianKernel::Edge(k) => edge.push(k.as_ref()),
                JacobianKernel::Vertex(k) => vertex.push(k.as_ref()),
                JacobianKernel::Face(k) => face.push(k.as_ref()),
            }
        }
        let dirichlets: Vec<&dyn DirichletCondition<DIM>> =
            self.dirichlets.iter().map(|d| d.as_ref()).collect();

        assemble_matrix(mesh, state, &edge, &vertex, &face, &dirichlets)
    }

    /// The Jacobian at `state` as an operator for use in a linear solver.
    pub fn linear_operator(
        &self,
        mesh: &SimplicialMesh<DIM>,
        state: &na::DVector<f64>,
    ) -> Result<MatrixOperator, AssemblyError> {
        self.assemble(mesh, state).map(MatrixOperator::from)
    }
}
