//! Kernels for the terms that appear in most convection-diffusion-reaction problems.
//!
//! Each kernel implements the linear protocol of [`crate::kernel`]
//! and, where the term has a meaningful derivative,
//! the Jacobian protocol of [`crate::jacobian`] as well.

use nalgebra as na;

use super::{
    DirichletCondition, DirichletValue, EdgeBlock, EdgeKernel, FaceBlock, FaceKernel,
    VertexKernel, VertexValues,
};
use crate::{
    jacobian::{
        EdgeJacobianBlock, EdgeJacobianKernel, FaceJacobianBlock, FaceJacobianKernel,
        VertexJacobianKernel,
    },
    mesh::{Mask, Region, SimplicialMesh},
};

type Point<const DIM: usize> = na::SVector<f64, DIM>;

/// The flux term `-κ ∇u · n` integrated over the boundary of each control volume,
/// discretized with the two-point flux `κ (covolume / length) (u_a - u_b)`.
#[derive(Clone, Debug)]
pub struct Diffusion<const DIM: usize> {
    pub coefficient: f64,
    regions: Vec<Region<DIM>>,
}

impl<const DIM: usize> Diffusion<DIM> {
    pub fn new(coefficient: f64) -> Self {
        Self {
            coefficient,
            regions: vec![Region::Everywhere],
        }
    }

    /// Restrict the kernel to the cells of the given regions.
    pub fn on(mut self, regions: impl IntoIterator<Item = Region<DIM>>) -> Self {
        self.regions = regions.into_iter().collect();
        self
    }

    fn blocks<'a>(
        &'a self,
        mesh: &'a SimplicialMesh<DIM>,
        cells: &'a Mask,
    ) -> impl 'a + Iterator<Item = ([usize; 2], [[f64; 2]; 2])> {
        mesh.cell_edges_in(cells).map(move |cell_edge| {
            let c = self.coefficient * cell_edge.ce_ratio();
            (cell_edge.endpoints(), [[c, -c], [-c, c]])
        })
    }
}

impl<const DIM: usize> EdgeKernel<DIM> for Diffusion<DIM> {
    fn regions(&self) -> &[Region<DIM>] {
        &self.regions
    }

    fn eval(&self, mesh: &SimplicialMesh<DIM>, cells: &Mask) -> Vec<EdgeBlock> {
        self.blocks(mesh, cells)
            .map(|(endpoints, matrix)| EdgeBlock {
                endpoints,
                matrix,
                rhs: [0.0; 2],
            })
            .collect()
    }
}

impl<const DIM: usize> EdgeJacobianKernel<DIM> for Diffusion<DIM> {
    fn regions(&self) -> &[Region<DIM>] {
        &self.regions
    }

    fn eval(
        &self,
        mesh: &SimplicialMesh<DIM>,
        cells: &Mask,
        _state: &na::DVector<f64>,
    ) -> Vec<EdgeJacobianBlock> {
        self.blocks(mesh, cells)
            .map(|(endpoints, matrix)| EdgeJacobianBlock { endpoints, matrix })
            .collect()
    }
}

/// The convective flux `(a · n) u` of a velocity field `a`
/// integrated over the boundary of each control volume.
///
/// The velocity is evaluated at the midpoint of each cell edge
/// and the value on the dual facet is the average of the endpoint values,
/// so the flux leaving one control volume enters its neighbor exactly.
pub struct Convection<V, const DIM: usize> {
    velocity: V,
    regions: Vec<Region<DIM>>,
}

impl<V, const DIM: usize> Convection<V, DIM>
where
    V: Fn(&Point<DIM>) -> Point<DIM>,
{
    pub fn new(velocity: V) -> Self {
        Self {
            velocity,
            regions: vec![Region::Everywhere],
        }
    }

    pub fn on(mut self, regions: impl IntoIterator<Item = Region<DIM>>) -> Self {
        self.regions = regions.into_iter().collect();
        self
    }

    fn blocks<'a>(
        &'a self,
        mesh: &'a SimplicialMesh<DIM>,
        cells: &'a Mask,
    ) -> impl 'a + Iterator<Item = ([usize; 2], [[f64; 2]; 2])> {
        mesh.cell_edges_in(cells).map(move |cell_edge| {
            let length = cell_edge.length();
            // volumetric flux through this cell's part of the dual facet,
            // positive from the first endpoint to the second
            let flux = if length > 0.0 {
                let velocity = (self.velocity)(&cell_edge.midpoint());
                cell_edge.covolume() * velocity.dot(&cell_edge.vector()) / length
            } else {
                0.0
            };
            let half = 0.5 * flux;
            (cell_edge.endpoints(), [[half, half], [-half, -half]])
        })
    }
}

impl<V, const DIM: usize> EdgeKernel<DIM> for Convection<V, DIM>
where
    V: Fn(&Point<DIM>) -> Point<DIM>,
{
    fn regions(&self) -> &[Region<DIM>] {
        &self.regions
    }

    fn eval(&self, mesh: &SimplicialMesh<DIM>, cells: &Mask) -> Vec<EdgeBlock> {
        self.blocks(mesh, cells)
            .map(|(endpoints, matrix)| EdgeBlock {
                endpoints,
                matrix,
                rhs: [0.0; 2],
            })
            .collect()
    }
}

impl<V, const DIM: usize> EdgeJacobianKernel<DIM> for Convection<V, DIM>
where
    V: Fn(&Point<DIM>) -> Point<DIM>,
{
    fn regions(&self) -> &[Region<DIM>] {
        &self.regions
    }

    fn eval(
        &self,
        mesh: &SimplicialMesh<DIM>,
        cells: &Mask,
        _state: &na::DVector<f64>,
    ) -> Vec<EdgeJacobianBlock> {
        self.blocks(mesh, cells)
            .map(|(endpoints, matrix)| EdgeJacobianBlock { endpoints, matrix })
            .collect()
    }
}

/// The linear reaction term `c u` integrated over control volumes.
#[derive(Clone, Debug)]
pub struct Reaction<const DIM: usize> {
    pub coefficient: f64,
    regions: Vec<Region<DIM>>,
}

impl<const DIM: usize> Reaction<DIM> {
    pub fn new(coefficient: f64) -> Self {
        Self {
            coefficient,
            regions: vec![Region::Everywhere],
        }
    }

    pub fn on(mut self, regions: impl IntoIterator<Item = Region<DIM>>) -> Self {
        self.regions = regions.into_iter().collect();
        self
    }

    fn diagonal(&self, mesh: &SimplicialMesh<DIM>, vertices: &Mask) -> Vec<f64> {
        let cv = mesh.control_volumes();
        vertices
            .indices(mesh.vertex_count())
            .map(|v| self.coefficient * cv[v])
            .collect()
    }
}

impl<const DIM: usize> VertexKernel<DIM> for Reaction<DIM> {
    fn regions(&self) -> &[Region<DIM>] {
        &self.regions
    }

    fn eval(&self, mesh: &SimplicialMesh<DIM>, vertices: &Mask) -> VertexValues {
        let matrix = self.diagonal(mesh, vertices);
        let rhs = vec![0.0; matrix.len()];
        VertexValues { matrix, rhs }
    }
}

impl<const DIM: usize> VertexJacobianKernel<DIM> for Reaction<DIM> {
    fn regions(&self) -> &[Region<DIM>] {
        &self.regions
    }

    fn eval(
        &self,
        mesh: &SimplicialMesh<DIM>,
        vertices: &Mask,
        _state: &na::DVector<f64>,
    ) -> Vec<f64> {
        self.diagonal(mesh, vertices)
    }
}

/// The source term `-f` integrated over control volumes,
/// i.e. the right-hand side of `-Δu = f`.
pub struct Source<F, const DIM: usize> {
    f: F,
    regions: Vec<Region<DIM>>,
}

impl<F, const DIM: usize> Source<F, DIM>
where
    F: Fn(&Point<DIM>) -> f64,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            regions: vec![Region::Everywhere],
        }
    }

    pub fn on(mut self, regions: impl IntoIterator<Item = Region<DIM>>) -> Self {
        self.regions = regions.into_iter().collect();
        self
    }
}

impl<F, const DIM: usize> VertexKernel<DIM> for Source<F, DIM>
where
    F: Fn(&Point<DIM>) -> f64,
{
    fn regions(&self) -> &[Region<DIM>] {
        &self.regions
    }

    fn eval(&self, mesh: &SimplicialMesh<DIM>, vertices: &Mask) -> VertexValues {
        let cv = mesh.control_volumes();
        let rhs: Vec<f64> = vertices
            .indices(mesh.vertex_count())
            .map(|v| -(self.f)(&mesh.vertices[v]) * cv[v])
            .collect();
        VertexValues {
            matrix: vec![0.0; rhs.len()],
            rhs,
        }
    }
}

/// The boundary term `a u + g` integrated over facets,
/// used for Neumann (`a = 0`) and Robin conditions.
///
/// Each facet's measure is split evenly among its vertices.
/// The default region is the mesh boundary;
/// with [`Region::Everywhere`] interior facets are integrated too.
pub struct BoundaryTerm<G, const DIM: usize> {
    pub coefficient: f64,
    value: G,
    regions: Vec<Region<DIM>>,
}

impl<G, const DIM: usize> BoundaryTerm<G, DIM>
where
    G: Fn(&Point<DIM>) -> f64,
{
    pub fn new(coefficient: f64, value: G) -> Self {
        Self {
            coefficient,
            value,
            regions: vec![Region::boundary()],
        }
    }

    pub fn on(mut self, regions: impl IntoIterator<Item = Region<DIM>>) -> Self {
        self.regions = regions.into_iter().collect();
        self
    }
}

/// Iterate over (vertex, share of facet measure) for every vertex of every selected facet.
fn facet_shares<'a, const DIM: usize>(
    mesh: &'a SimplicialMesh<DIM>,
    faces: &'a Mask,
) -> impl 'a + Iterator<Item = (usize, f64)> {
    let facet_size = mesh.facet_dim() + 1;
    faces.indices(mesh.facet_count()).flat_map(move |face| {
        let share = mesh.facet_volumes()[face] / facet_size as f64;
        mesh.facet_vertices(face).iter().map(move |&v| (v, share))
    })
}

impl<G, const DIM: usize> FaceKernel<DIM> for BoundaryTerm<G, DIM>
where
    G: Fn(&Point<DIM>) -> f64,
{
    fn regions(&self) -> &[Region<DIM>] {
        &self.regions
    }

    fn eval(&self, mesh: &SimplicialMesh<DIM>, faces: &Mask) -> Vec<FaceBlock> {
        facet_shares(mesh, faces)
            .map(|(vertex, share)| FaceBlock {
                vertex,
                matrix: self.coefficient * share,
                rhs: (self.value)(&mesh.vertices[vertex]) * share,
            })
            .collect()
    }
}

impl<G, const DIM: usize> FaceJacobianKernel<DIM> for BoundaryTerm<G, DIM>
where
    G: Fn(&Point<DIM>) -> f64,
{
    fn regions(&self) -> &[Region<DIM>] {
        &self.regions
    }

    fn eval(
        &self,
        mesh: &SimplicialMesh<DIM>,
        faces: &Mask,
        _state: &na::DVector<f64>,
    ) -> Vec<FaceJacobianBlock> {
        facet_shares(mesh, faces)
            .map(|(vertex, share)| FaceJacobianBlock {
                vertex,
                value: self.coefficient * share,
            })
            .collect()
    }
}

/// The nonlinear reaction term `-λ exp(u)` of the Bratu problem.
///
/// Only the Jacobian is provided,
/// the residual being evaluated by the nonlinear solver.
#[derive(Clone, Debug)]
pub struct ExponentialReaction<const DIM: usize> {
    pub lambda: f64,
    regions: Vec<Region<DIM>>,
}

impl<const DIM: usize> ExponentialReaction<DIM> {
    pub fn new(lambda: f64) -> Self {
        Self {
            lambda,
            regions: vec![Region::Everywhere],
        }
    }

    pub fn on(mut self, regions: impl IntoIterator<Item = Region<DIM>>) -> Self {
        self.regions = regions.into_iter().collect();
        self
    }
}

impl<const DIM: usize> VertexJacobianKernel<DIM> for ExponentialReaction<DIM> {
    fn regions(&self) -> &[Region<DIM>] {
        &self.regions
    }

    fn eval(
        &self,
        mesh: &SimplicialMesh<DIM>,
        vertices: &Mask,
        state: &na::DVector<f64>,
    ) -> Vec<f64> {
        let cv = mesh.control_volumes();
        vertices
            .indices(mesh.vertex_count())
            .map(|v| -self.lambda * state[v].exp() * cv[v])
            .collect()
    }
}

/// The condition `u = g` on a region.
pub struct Dirichlet<G, const DIM: usize> {
    region: Region<DIM>,
    value: G,
}

impl<G, const DIM: usize> Dirichlet<G, DIM>
where
    G: Fn(&Point<DIM>) -> f64,
{
    pub fn new(region: Region<DIM>, value: G) -> Self {
        Self { region, value }
    }
}

impl<G, const DIM: usize> DirichletCondition<DIM> for Dirichlet<G, DIM>
where
    G: Fn(&Point<DIM>) -> f64,
{
    fn region(&self) -> &Region<DIM> {
        &self.region
    }

    fn eval(&self, mesh: &SimplicialMesh<DIM>, vertex: usize) -> DirichletValue {
        DirichletValue {
            coefficient: 1.0,
            rhs: (self.value)(&mesh.vertices[vertex]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{tiny_mesh_2d, tiny_mesh_3d, EntityKind};
    use approx::relative_eq;

    #[test]
    fn diffusion_blocks_reproduce_covolumes() {
        let mesh = tiny_mesh_2d();
        let kernel = Diffusion::new(2.0);
        let blocks = EdgeKernel::eval(&kernel, &mesh, &Mask::All);
        assert_eq!(blocks.len(), 3 * mesh.cell_count());

        // summing the per-cell blocks must give the global edge coefficients
        let mut summed = vec![0.0; mesh.edge_count()];
        for block in &blocks {
            let [a, b] = block.endpoints;
            let edge = mesh.find_edge([a, b]).expect("block endpoints form an edge");
            assert_eq!(block.matrix[0][0], block.matrix[1][1]);
            assert_eq!(block.matrix[0][1], -block.matrix[0][0]);
            assert_eq!(block.rhs, [0.0; 2]);
            summed[edge] += block.matrix[0][0];
        }
        for (s, ce) in summed.iter().zip(mesh.ce_ratios()) {
            assert!(relative_eq!(*s, 2.0 * ce, epsilon = 1e-14));
        }

        let state = na::DVector::zeros(mesh.vertex_count());
        let jac_blocks = EdgeJacobianKernel::eval(&kernel, &mesh, &Mask::All, &state);
        for (lin, jac) in blocks.iter().zip(&jac_blocks) {
            assert_eq!(lin.endpoints, jac.endpoints);
            assert_eq!(lin.matrix, jac.matrix);
        }
    }

    #[test]
    fn convection_conserves_mass() {
        let mesh = tiny_mesh_2d();
        let kernel = Convection::new(|_: &Point<2>| Point::<2>::new(1.0, 0.5));
        let system = crate::assembly::LinearProblem::new()
            .with_kernel(crate::kernel::Kernel::edge(Convection::new(|_: &Point<2>| {
                Point::<2>::new(1.0, 0.5)
            })))
            .assemble(&mesh)
            .unwrap();
        let matrix = na::DMatrix::from(&system.matrix);

        // whatever leaves one control volume enters another
        for (col, sum) in matrix.row_sum().iter().enumerate() {
            assert!(sum.abs() < 1e-14, "column {col} sums to {sum}");
        }
        // a constant field has no net flux out of an interior control volume
        let interior_row: f64 = matrix.row(3).sum();
        assert!(interior_row.abs() < 1e-12, "row sums to {interior_row}");
        // at vertex (1, 0) the inflow through the dual facets
        // balances the outflow a · n = 1 through the boundary
        assert!(relative_eq!(matrix.row(4).sum(), -1.0, epsilon = 1e-12));

        let state = na::DVector::zeros(mesh.vertex_count());
        let lin_blocks = EdgeKernel::eval(&kernel, &mesh, &Mask::All);
        let jac_blocks = EdgeJacobianKernel::eval(&kernel, &mesh, &Mask::All, &state);
        assert_eq!(lin_blocks.len(), jac_blocks.len());
        for (lin, jac) in lin_blocks.iter().zip(&jac_blocks) {
            assert_eq!(lin.matrix, jac.matrix);
            assert_eq!(lin.rhs, [0.0; 2]);
        }
    }

    #[test]
    fn vertex_kernels_follow_the_mask() {
        let mesh = tiny_mesh_2d();
        let boundary = mesh.mask_for(&Region::boundary(), EntityKind::Vertex);
        let cv = mesh.control_volumes();

        let reaction = VertexKernel::eval(&Reaction::new(3.0), &mesh, &boundary);
        assert_eq!(reaction.matrix.len(), boundary.count(mesh.vertex_count()));
        for (v, m) in boundary.indices(mesh.vertex_count()).zip(&reaction.matrix) {
            assert_eq!(*m, 3.0 * cv[v]);
        }

        let source = Source::new(|x: &Point<2>| x.x + 1.0);
        let values = source.eval(&mesh, &Mask::All);
        assert_eq!(values.rhs.len(), mesh.vertex_count());
        for (v, r) in values.rhs.iter().enumerate() {
            assert!(relative_eq!(*r, -(mesh.vertices[v].x + 1.0) * cv[v]));
        }
        assert!(values.matrix.iter().all(|m| *m == 0.0));
    }

    #[test]
    fn boundary_term_integrates_facet_measure() {
        let mesh = tiny_mesh_3d();
        let kernel = BoundaryTerm::new(0.5, |_: &Point<3>| 2.0);
        let faces = mesh.mask_for(&Region::boundary(), EntityKind::Face);
        let blocks = FaceKernel::eval(&kernel, &mesh, &faces);
        assert_eq!(blocks.len(), 3 * mesh.boundary_facets().count_ones(..));

        let area: f64 = mesh
            .boundary_facets()
            .ones()
            .map(|f| mesh.facet_volumes()[f])
            .sum();
        let matrix_total: f64 = blocks.iter().map(|b| b.matrix).sum();
        let rhs_total: f64 = blocks.iter().map(|b| b.rhs).sum();
        assert!(relative_eq!(matrix_total, 0.5 * area));
        assert!(relative_eq!(rhs_total, 2.0 * area));
    }

    #[test]
    fn exponential_reaction_depends_on_state() {
        let mesh = tiny_mesh_2d();
        let state = na::DVector::from_fn(mesh.vertex_count(), |i, _| 0.1 * i as f64);
        let values = ExponentialReaction::new(2.0).eval(&mesh, &Mask::All, &state);
        for (v, val) in values.iter().enumerate() {
            let expected = -2.0 * (0.1 * v as f64).exp() * mesh.control_volumes()[v];
            assert!(relative_eq!(*val, expected));
        }
    }

    #[test]
    fn dirichlet_evaluates_at_vertices() {
        let mesh = tiny_mesh_2d();
        let dirichlet = Dirichlet::new(Region::boundary(), |x: &Point<2>| x.x - x.y);
        let value = dirichlet.eval(&mesh, 0);
        assert_eq!(value.coefficient, 1.0);
        assert_eq!(value.rhs, -1.5);
        let state = na::DVector::zeros(mesh.vertex_count());
        assert_eq!(dirichlet.jacobian_diagonal(&mesh, &state, 0), 1.0);
    }
}
