//! Assembly of linear systems from kernels and Dirichlet conditions.

use nalgebra as na;
use nalgebra_sparse as nas;

use itertools::izip;

use crate::{
    kernel::{DirichletCondition, DirichletValue, EdgeKernel, FaceKernel, Kernel, VertexKernel},
    mesh::{EntityKind, SimplicialMesh},
    operator::replace_csr_rows,
};

/// Errors caused by kernels or states inconsistent with the mesh.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("kernel returned {actual} values for a mask of {expected} entities")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("kernel referred to vertex {vertex}, but the mesh only has {vertex_count} vertices")]
    VertexOutOfRange { vertex: usize, vertex_count: usize },
    #[error("state has {actual} values but the mesh has {expected} vertices")]
    StateLength { expected: usize, actual: usize },
}

/// An assembled linear system `matrix * u = rhs`
/// with one row and column per mesh vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearSystem {
    pub matrix: nas::CsrMatrix<f64>,
    pub rhs: na::DVector<f64>,
}

/// Scatter-add buffers for global contributions.
///
/// Diagonal entries are summed densely,
/// off-diagonal ones collected as coordinate triples.
pub(crate) struct Accumulator {
    diag: Vec<f64>,
    rhs: Vec<f64>,
    triples: nas::CooMatrix<f64>,
}

impl Accumulator {
    pub(crate) fn new(vertex_count: usize) -> Self {
        Self {
            diag: vec![0.0; vertex_count],
            rhs: vec![0.0; vertex_count],
            triples: nas::CooMatrix::new(vertex_count, vertex_count),
        }
    }

    #[inline]
    fn check(&self, vertex: usize) -> Result<(), AssemblyError> {
        if vertex < self.diag.len() {
            Ok(())
        } else {
            Err(AssemblyError::VertexOutOfRange {
                vertex,
                vertex_count: self.diag.len(),
            })
        }
    }

    /// Add a 2x2 block coupling the endpoints of an edge,
    /// subtracting its right-hand side contributions.
    pub(crate) fn add_edge(
        &mut self,
        endpoints: [usize; 2],
        matrix: [[f64; 2]; 2],
        rhs: [f64; 2],
    ) -> Result<(), AssemblyError> {
        let [a, b] = endpoints;
        self.check(a)?;
        self.check(b)?;
        self.diag[a] += matrix[0][0];
        self.diag[b] += matrix[1][1];
        self.triples.push(a, b, matrix[0][1]);
        self.triples.push(b, a, matrix[1][0]);
        self.rhs[a] -= rhs[0];
        self.rhs[b] -= rhs[1];
        Ok(())
    }

    pub(crate) fn add_vertex(
        &mut self,
        vertex: usize,
        matrix: f64,
        rhs: f64,
    ) -> Result<(), AssemblyError> {
        self.check(vertex)?;
        self.diag[vertex] += matrix;
        self.rhs[vertex] -= rhs;
        Ok(())
    }

    pub(crate) fn add_face(
        &mut self,
        vertex: usize,
        matrix: f64,
        rhs: f64,
    ) -> Result<(), AssemblyError> {
        self.check(vertex)?;
        self.triples.push(vertex, vertex, matrix);
        self.rhs[vertex] -= rhs;
        Ok(())
    }

    /// Append the diagonal to the triples and convert them to a CSR matrix,
    /// summing duplicate entries.
    pub(crate) fn finish(mut self) -> (nas::CsrMatrix<f64>, Vec<f64>) {
        for (i, &d) in self.diag.iter().enumerate() {
            self.triples.push(i, i, d);
        }
        log::debug!(
            "assembled {} triples into a {n}x{n} matrix",
            self.triples.nnz(),
            n = self.diag.len(),
        );
        (nas::CsrMatrix::from(&self.triples), self.rhs)
    }
}

/// Check that a vertex kernel returned one value per selected vertex.
pub(crate) fn check_length(expected: usize, actual: usize) -> Result<(), AssemblyError> {
    if expected == actual {
        Ok(())
    } else {
        Err(AssemblyError::LengthMismatch { expected, actual })
    }
}

/// Assemble a linear system from kernels and Dirichlet conditions.
///
/// Kernels are evaluated on every one of their regions
/// and their contributions summed.
/// Then the rows of vertices covered by each Dirichlet condition,
/// in the order given, are replaced with the condition's value.
/// If several conditions cover the same vertex, the last one wins.
pub fn assemble<const DIM: usize>(
    mesh: &SimplicialMesh<DIM>,
    edge_kernels: &[&dyn EdgeKernel<DIM>],
    vertex_kernels: &[&dyn VertexKernel<DIM>],
    face_kernels: &[&dyn FaceKernel<DIM>],
    dirichlets: &[&dyn DirichletCondition<DIM>],
) -> Result<LinearSystem, AssemblyError> {
    let n = mesh.vertex_count();
    let mut acc = Accumulator::new(n);

    for kernel in edge_kernels {
        for region in kernel.regions() {
            let cells = mesh.mask_for(region, EntityKind::Cell);
            for block in kernel.eval(mesh, &cells) {
                acc.add_edge(block.endpoints, block.matrix, block.rhs)?;
            }
        }
    }

    for kernel in vertex_kernels {
        for region in kernel.regions() {
            let vertices = mesh.mask_for(region, EntityKind::Vertex);
            let values = kernel.eval(mesh, &vertices);
            let count = vertices.count(n);
            check_length(count, values.matrix.len())?;
            check_length(count, values.rhs.len())?;
            for (v, &m, &r) in izip!(vertices.indices(n), &values.matrix, &values.rhs) {
                acc.add_vertex(v, m, r)?;
            }
        }
    }

    for kernel in face_kernels {
        for region in kernel.regions() {
            let faces = mesh.mask_for(region, EntityKind::Face);
            for block in kernel.eval(mesh, &faces) {
                acc.add_face(block.vertex, block.matrix, block.rhs)?;
            }
        }
    }

    let (matrix, mut rhs) = acc.finish();

    let mut replacements: Vec<Option<f64>> = vec![None; n];
    for dirichlet in dirichlets {
        let vertices = mesh.mask_for(dirichlet.region(), EntityKind::Vertex);
        for v in vertices.indices(n) {
            let DirichletValue { coefficient, rhs: value } = dirichlet.eval(mesh, v);
            replacements[v] = Some(coefficient);
            rhs[v] = value;
        }
    }
    log::debug!(
        "replaced {} rows with Dirichlet conditions",
        replacements.iter().filter(|r| r.is_some()).count()
    );

    Ok(LinearSystem {
        matrix: replace_csr_rows(matrix, &replacements),
        rhs: na::DVector::from_vec(rhs),
    })
}

/// A set of kernels and Dirichlet conditions making up a linear problem.
///
/// ```
/// # use finvol::{mesh::{tiny_mesh_2d, Region}, kernel::{Kernel, builtin::*}, assembly::LinearProblem};
/// let mesh = tiny_mesh_2d();
/// let problem = LinearProblem::new()
///     .with_kernel(Kernel::edge(Diffusion::new(1.0)))
///     .with_kernel(Kernel::vertex(Source::new(|_| 1.0)))
///     .with_dirichlet(Dirichlet::new(Region::boundary(), |_| 0.0));
/// let system = problem.assemble(&mesh).unwrap();
/// assert_eq!(system.rhs.len(), mesh.vertex_count());
/// ```
#[derive(Default)]
pub struct LinearProblem<const DIM: usize> {
    pub kernels: Vec<Kernel<DIM>>,
    pub dirichlets: Vec<Box<dyn DirichletCondition<DIM>>>,
}

impl<const DIM: usize> LinearProblem<DIM> {
    pub fn new() -> Self {
        Self {
            kernels: Vec::new(),
            dirichlets: Vec::new(),
        }
    }

    pub fn with_kernel(mut self, kernel: Kernel<DIM>) -> Self {
        self.kernels.push(kernel);
        self
    }

    /// Add a Dirichlet condition.
    /// Conditions added later take precedence where their regions overlap.
    pub fn with_dirichlet(mut self, dirichlet: impl DirichletCondition<DIM> + 'static) -> Self {
        self.dirichlets.push(Box::new(dirichlet));
        self
    }

    /// Assemble the system on a mesh.
    pub fn assemble(&self, mesh: &SimplicialMesh<DIM>) -> Result<LinearSystem, AssemblyError> {
        let mut edge: Vec<&dyn EdgeKernel<DIM>> = Vec::new();
        let mut vertex: Vec<&dyn VertexKernel<DIM>> = Vec::new();
        let mut face: Vec<&dyn FaceKernel<DIM>> = Vec::new();
        for kernel in &self.kernels {
            match kernel {
                Kernel::Edge(k) => edge.push(k.as_ref()),
                Kernel::Vertex(k) => vertex.push(k.as_ref()),
                Kernel::Face(k) => face.push(k.as_ref()),
            }
        }
        let dirichlets: Vec<&dyn DirichletCondition<DIM>> =
            self.dirichlets.iter().map(|d| d.as_ref()).collect();

        assemble(mesh, &edge, &vertex, &face, &dirichlets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        kernel::{builtin::*, EdgeBlock, VertexValues},
        mesh::{tiny_mesh_2d, tiny_mesh_3d, Mask, Region, Subdomain},
    };
    use approx::relative_eq;

    type Vec2 = na::SVector<f64, 2>;

    struct HalfPlane {
        name: &'static str,
        sign: f64,
    }

    impl Subdomain<2> for HalfPlane {
        fn name(&self) -> &str {
            self.name
        }

        fn is_inside(&self, point: &Vec2) -> bool {
            self.sign * point.x >= 0.0
        }
    }

    /// Boundary vertices strictly right of the center line.
    struct RightBoundary;

    impl Subdomain<2> for RightBoundary {
        fn name(&self) -> &str {
            "right boundary"
        }

        fn is_inside(&self, point: &Vec2) -> bool {
            point.x > 0.0
        }

        fn is_boundary_only(&self) -> bool {
            true
        }
    }

    fn left() -> Region<2> {
        Region::new(HalfPlane {
            name: "left",
            sign: -1.0,
        })
    }

    fn right() -> Region<2> {
        Region::new(HalfPlane {
            name: "right",
            sign: 1.0,
        })
    }

    #[test]
    fn dirichlet_rows_only_have_the_diagonal() {
        let mesh = tiny_mesh_3d();
        let system = LinearProblem::new()
            .with_kernel(Kernel::edge(Diffusion::new(1.0)))
            .with_kernel(Kernel::vertex(Reaction::new(1.0)))
            .with_dirichlet(Dirichlet::new(Region::boundary(), |x: &na::Vector3<f64>| x.z))
            .assemble(&mesh)
            .unwrap();

        for (v, row) in system.matrix.row_iter().enumerate() {
            assert!(mesh.is_boundary_vertex(v));
            assert_eq!(row.col_indices(), &[v]);
            assert_eq!(row.values(), &[1.0]);
            assert_eq!(system.rhs[v], mesh.vertices[v].z);
        }
    }

    #[test]
    fn last_dirichlet_wins() {
        let mesh = tiny_mesh_2d();
        let system = LinearProblem::new()
            .with_kernel(Kernel::edge(Diffusion::new(1.0)))
            .with_dirichlet(Dirichlet::new(Region::boundary(), |_| 1.0))
            .with_dirichlet(Dirichlet::new(Region::new(RightBoundary), |_| 2.0))
            .assemble(&mesh)
            .unwrap();

        for v in mesh.boundary_vertices().ones() {
            let expected = if mesh.vertices[v].x > 0.0 { 2.0 } else { 1.0 };
            assert_eq!(system.rhs[v], expected, "vertex {v}");
        }
        // the interior vertex is untouched by either condition
        let center = system.matrix.row(3);
        assert_eq!(center.nnz(), 7);
        assert_eq!(system.rhs[3], 0.0);
    }

    #[test]
    fn region_order_does_not_matter() {
        let mesh = tiny_mesh_2d();
        let assemble_with = |regions: Vec<Region<2>>| {
            LinearProblem::new()
                .with_kernel(Kernel::edge(Diffusion::new(1.5).on(regions.clone())))
                .with_kernel(Kernel::vertex(Reaction::new(2.0).on(regions.clone())))
                .with_kernel(Kernel::vertex(
                    Source::new(|x: &Vec2| x.y * x.y).on(regions),
                ))
                .assemble(&mesh)
                .unwrap()
        };

        let forward = assemble_with(vec![left(), right()]);
        let backward = assemble_with(vec![right(), left()]);
        assert!(relative_eq!(
            na::DMatrix::from(&forward.matrix),
            na::DMatrix::from(&backward.matrix),
            epsilon = 1e-14
        ));
        assert!(relative_eq!(forward.rhs, backward.rhs, epsilon = 1e-14));
    }

    #[test]
    fn rhs_is_moved_to_the_right_side() {
        let mesh = tiny_mesh_2d();
        let system = LinearProblem::new()
            .with_kernel(Kernel::vertex(Source::new(|_| 3.0)))
            .assemble(&mesh)
            .unwrap();
        for (r, cv) in system.rhs.iter().zip(mesh.control_volumes()) {
            assert!(relative_eq!(*r, 3.0 * cv));
        }
    }

    #[test]
    fn laplacian_rows_sum_to_zero() {
        let mesh = tiny_mesh_2d();
        let system = LinearProblem::new()
            .with_kernel(Kernel::edge(Diffusion::new(1.0)))
            .assemble(&mesh)
            .unwrap();
        let ones = na::DVector::from_element(mesh.vertex_count(), 1.0);
        let product = &system.matrix * &ones;
        assert!(product.iter().all(|p| p.abs() < 1e-14));
        // symmetric
        let dense = na::DMatrix::from(&system.matrix);
        assert!(relative_eq!(dense, dense.transpose()));
    }

    struct Broken(Vec<Region<2>>);
    impl VertexKernel<2> for Broken {
        fn regions(&self) -> &[Region<2>] {
            &self.0
        }

        fn eval(&self, _mesh: &SimplicialMesh<2>, _vertices: &Mask) -> VertexValues {
            VertexValues {
                matrix: vec![1.0],
                rhs: vec![1.0],
            }
        }
    }

    struct OutOfRange(Vec<Region<2>>);
    impl EdgeKernel<2> for OutOfRange {
        fn regions(&self) -> &[Region<2>] {
            &self.0
        }

        fn eval(&self, _mesh: &SimplicialMesh<2>, _cells: &Mask) -> Vec<EdgeBlock> {
            vec![EdgeBlock {
                endpoints: [0, 100],
                matrix: [[1.0; 2]; 2],
                rhs: [0.0; 2],
            }]
        }
    }

    #[test]
    fn inconsistent_kernels_are_rejected() {
        let mesh = tiny_mesh_2d();
        let everywhere = || vec![Region::Everywhere];
        assert_eq!(
            assemble(&mesh, &[], &[&Broken(everywhere())], &[], &[]),
            Err(AssemblyError::LengthMismatch {
                expected: 7,
                actual: 1
            })
        );
        assert_eq!(
            assemble(&mesh, &[&OutOfRange(everywhere())], &[], &[], &[]),
            Err(AssemblyError::VertexOutOfRange {
                vertex: 100,
                vertex_count: 7
            })
        );
    }
}
