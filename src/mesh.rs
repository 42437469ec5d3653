//! The simplicial mesh and the finite volume geometry derived from it.

/// Low-level mesh construction and corresponding tests.
mod mesh_construction;
/// re-export the testing meshes for use in other modules' tests
#[doc(hidden)]
pub use mesh_construction::{tiny_mesh_2d, tiny_mesh_3d};

pub mod subdomain;
pub use subdomain::{Boundary, EntityKind, Mask, Region, Subdomain};

mod views;
pub use views::{CellEdgeView, SimplexIter, SimplexView};

//

use fixedbitset as fb;
use itertools::izip;
use nalgebra as na;
use nalgebra_sparse as nas;

use std::{cell::RefCell, collections::HashMap, fmt, rc::Rc, str::FromStr};

use crate::operator::DiagonalOperator;

/// Errors that can occur when constructing a [`SimplicialMesh`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    #[error("index count {count} is not a multiple of the cell size {cell_size}")]
    IndexCountMismatch { count: usize, cell_size: usize },
    #[error("unsupported cell dimension {0} (only triangles and tetrahedra are supported)")]
    UnsupportedCellDim(usize),
    #[error("{cell_dim}-dimensional cells cannot be embedded in {embedding_dim}-dimensional space")]
    CellDimExceedsEmbedding {
        cell_dim: usize,
        embedding_dim: usize,
    },
    #[error("cell {cell} refers to vertex {vertex}, but the mesh only has {vertex_count} vertices")]
    VertexOutOfRange {
        cell: usize,
        vertex: usize,
        vertex_count: usize,
    },
    #[error("cell {cell} contains vertex {vertex} more than once")]
    RepeatedVertex { cell: usize, vertex: usize },
    #[error(
        "control volumes sum to {control} but cell volumes sum to {cells} (difference {difference:e})"
    )]
    VolumeMismatch {
        control: f64,
        cells: f64,
        difference: f64,
    },
    #[error("unknown covolume mode `{0}`, expected `geometric` or `algebraic`")]
    UnknownCovolumeMode(String),
    #[error("expected one value per vertex ({expected}), got {actual}")]
    ValueCountMismatch { expected: usize, actual: usize },
}

/// Method used to compute the covolume of each edge.
///
/// Both methods agree on meshes where every cell contains its own circumcenter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CovolumeMode {
    /// Signed volumes of the dual cell pieces between circumcenters.
    /// Negative on edges where the mesh is not Delaunay.
    #[default]
    Geometric,
    /// Per-cell coefficients solved from the requirement that
    /// `|T| ‖u‖² = Σ αᵢ ⟨u, eᵢ⟩²` holds for the cell's own edge vectors.
    Algebraic,
}

impl FromStr for CovolumeMode {
    type Err = MeshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "geometric" => Ok(Self::Geometric),
            "algebraic" => Ok(Self::Algebraic),
            _ => Err(MeshError::UnknownCovolumeMode(s.to_string())),
        }
    }
}

impl fmt::Display for CovolumeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geometric => write!(f, "geometric"),
            Self::Algebraic => write!(f, "algebraic"),
        }
    }
}

/// Parameters for mesh construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshOptions {
    /// How edge covolumes are computed.
    pub covolume_mode: CovolumeMode,
    /// Relative tolerance for the check that control volumes
    /// add up to the total volume of the cells.
    pub volume_tolerance: f64,
    /// A cell whose volume is below this times the `d`th power
    /// of its longest edge is considered degenerate
    /// and contributes nothing to covolumes.
    pub degeneracy_tolerance: f64,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            covolume_mode: CovolumeMode::default(),
            volume_tolerance: 1e-8,
            degeneracy_tolerance: 1e-12,
        }
    }
}

/// A mesh of triangles or tetrahedra, embedded in `DIM`-dimensional space,
/// along with the dual geometry needed for finite volume discretization.
///
/// All geometry is computed once at construction and is immutable afterwards.
/// The mesh uses reference counting and a mask cache with interior mutability,
/// so it cannot be shared between threads.
#[derive(Clone, Debug)]
pub struct SimplicialMesh<const DIM: usize> {
    /// Vertices stored in a Rc so that they can be accessed from multiple locations.
    /// Mutation after creation is not supported.
    pub vertices: Rc<[na::SVector<f64, DIM>]>,
    /// dimension of the cells, 2 for triangles and 3 for tetrahedra
    cell_dim: usize,
    /// Storage for each dimension of simplex in the mesh, from vertices up to cells.
    pub(crate) simplices: Vec<SimplexCollection<DIM>>,
    /// global edge indices of each cell, in the order given by `local_edges`
    cell_edges: Vec<usize>,
    /// rows correspond to edges, columns to cells,
    /// and values to the local slot of the edge in the cell
    edge_cells: nas::CsrMatrix<i8>,
    /// covolume contribution of each cell to each of its edges,
    /// laid out like `cell_edges`
    cell_covolumes: Vec<f64>,
    covolumes: Vec<f64>,
    ce_ratios: Vec<f64>,
    control_volumes: Vec<f64>,
    degenerate_cells: fb::FixedBitSet,
    delaunay_violations: usize,
    interior_facets: usize,
    covolume_mode: CovolumeMode,
    /// lazily computed entity masks of named subdomains
    subdomain_masks: RefCell<HashMap<(String, EntityKind), Rc<fb::FixedBitSet>>>,
}

/// Identity of a simplex for lookup by its sorted vertex indices.
/// Unused trailing slots are filled with `usize::MAX`.
pub(crate) type SimplexKey = [usize; 4];

pub(crate) fn simplex_key(indices: &[usize]) -> SimplexKey {
    let mut key = [usize::MAX; 4];
    key[..indices.len()].copy_from_slice(indices);
    key
}

/// Pairs of cell-local vertices forming each local edge slot of a cell.
///
/// For triangles, slot `k` is the edge opposite vertex `k`.
/// For tetrahedra, slots follow lexicographic order.
pub(crate) fn local_edges(cell_dim: usize) -> &'static [[usize; 2]] {
    const TRIANGLE: [[usize; 2]; 3] = [[1, 2], [0, 2], [0, 1]];
    const TETRAHEDRON: [[usize; 2]; 6] = [[0, 1], [0, 2], [0, 3], [1, 2], [1, 3], [2, 3]];
    if cell_dim == 2 {
        &TRIANGLE
    } else {
        &TETRAHEDRON
    }
}

/// Column indices and values of a row of an incidence matrix,
/// borrowed from the matrix itself.
fn csr_row_entries(
    mat: &nas::CsrMatrix<i8>,
    row: usize,
) -> impl '_ + Iterator<Item = (usize, usize)> {
    let range = mat.row_offsets()[row]..mat.row_offsets()[row + 1];
    mat.col_indices()[range.clone()]
        .iter()
        .zip(&mat.values()[range])
        .map(|(&col, &slot)| (col, slot as usize))
}

#[derive(Clone, Debug)]
pub(crate) struct SimplexCollection<const MESH_DIM: usize> {
    /// points per simplex in the storage Vec
    simplex_size: usize,
    /// indices stored in a flat Vec to avoid generics for dimension
    pub indices: Vec<usize>,
    /// map from the sorted vertex indices of a simplex to its index in this collection
    index_map: HashMap<SimplexKey, usize>,
    /// indices of the (DIM-1)-simplices on the boundary of each simplex,
    /// `simplex_size` per simplex, where slot k is opposite local vertex k
    facets: Vec<usize>,
    /// matrix where the rows correspond to DIM-simplices,
    /// the columns to DIM+1-simplices,
    /// and the values to the slot of this simplex in the `facets` of the upper one
    coboundary_map: nas::CsrMatrix<i8>,
    /// simplices on the boundary of the mesh.
    mesh_boundary: fb::FixedBitSet,
    /// circumcenters Rc'd so that 0-simplices
    /// can have the mesh vertices here without duplicating data
    circumcenters: Rc<[na::SVector<f64, MESH_DIM>]>,
    /// barycentric coordinates of each circumcenter, `simplex_size` per simplex
    circumcenter_bary: Vec<f64>,
    /// unsigned volumes of the simplices
    volumes: Vec<f64>,
}

impl<const DIM: usize> Default for SimplexCollection<DIM> {
    fn default() -> Self {
        Self {
            simplex_size: 0,
            indices: Vec::new(),
            index_map: HashMap::new(),
            facets: Vec::new(),
            coboundary_map: nas::CsrMatrix::zeros(0, 0),
            mesh_boundary: fb::FixedBitSet::default(),
            circumcenters: Rc::from([]),
            circumcenter_bary: Vec::new(),
            volumes: Vec::new(),
        }
    }
}

impl<const DIM: usize> SimplexCollection<DIM> {
    /// Get the number of simplices in the collection.
    #[inline]
    fn len(&self) -> usize {
        self.indices.len() / self.simplex_size
    }

    /// Get the slice of vertex indices corresponding to a single simplex.
    #[inline]
    fn simplex_indices(&self, simplex_idx: usize) -> &[usize] {
        let start_idx = simplex_idx * self.simplex_size;
        &self.indices[start_idx..start_idx + self.simplex_size]
    }

    /// Get the facets of a single simplex, slot k opposite local vertex k.
    #[inline]
    fn simplex_facets(&self, simplex_idx: usize) -> &[usize] {
        let start_idx = simplex_idx * self.simplex_size;
        &self.facets[start_idx..start_idx + self.simplex_size]
    }

    #[inline]
    fn simplex_bary(&self, simplex_idx: usize) -> &[f64] {
        let start_idx = simplex_idx * self.simplex_size;
        &self.circumcenter_bary[start_idx..start_idx + self.simplex_size]
    }

    /// Look up a simplex by its sorted vertex indices.
    fn find(&self, indices: &[usize]) -> Option<usize> {
        if self.simplex_size == 1 {
            return indices.first().copied().filter(|&v| v < self.len());
        }
        if indices.len() != self.simplex_size {
            return None;
        }
        self.index_map.get(&simplex_key(indices)).copied()
    }
}

impl<const MESH_DIM: usize> SimplicialMesh<MESH_DIM> {
    /// Construct a mesh from raw vertices and indices
    /// using the default [`MeshOptions`].
    ///
    /// The indices are given as a flat array,
    /// where every `cell_dim + 1` indices correspond to one cell.
    /// `cell_dim` must be 2 (triangles) or 3 (tetrahedra).
    #[inline]
    pub fn new(
        vertices: Vec<na::SVector<f64, MESH_DIM>>,
        indices: Vec<usize>,
        cell_dim: usize,
    ) -> Result<Self, MeshError> {
        Self::with_options(vertices, indices, cell_dim, MeshOptions::default())
    }

    /// Construct a mesh with explicitly given options.
    #[inline]
    pub fn with_options(
        vertices: Vec<na::SVector<f64, MESH_DIM>>,
        indices: Vec<usize>,
        cell_dim: usize,
        options: MeshOptions,
    ) -> Result<Self, MeshError> {
        mesh_construction::build_mesh(vertices, indices, cell_dim, &options)
    }

    /// Construct a triangle mesh.
    pub fn from_triangles(
        vertices: Vec<na::SVector<f64, MESH_DIM>>,
        triangles: &[[usize; 3]],
    ) -> Result<Self, MeshError> {
        Self::new(vertices, triangles.concat(), 2)
    }

    /// Construct a tetrahedral mesh.
    pub fn from_tetrahedra(
        vertices: Vec<na::SVector<f64, MESH_DIM>>,
        tetrahedra: &[[usize; 4]],
    ) -> Result<Self, MeshError> {
        Self::new(vertices, tetrahedra.concat(), 3)
    }

    /// Dimension of the cells, 2 for triangles and 3 for tetrahedra.
    #[inline]
    pub fn cell_dim(&self) -> usize {
        self.cell_dim
    }

    /// Dimension of the facets (the boundary simplices of cells).
    #[inline]
    pub fn facet_dim(&self) -> usize {
        self.cell_dim - 1
    }

    /// The method that was used to compute covolumes.
    #[inline]
    pub fn covolume_mode(&self) -> CovolumeMode {
        self.covolume_mode
    }

    /// Get the number of `dim`-simplices in the mesh.
    ///
    /// Returns 0 for dimensions above the cell dimension.
    #[inline]
    pub fn simplex_count(&self, dim: usize) -> usize {
        self.simplices.get(dim).map_or(0, |s| s.len())
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn edge_count(&self) -> usize {
        self.simplex_count(1)
    }

    /// Number of triangles that are faces of tetrahedra.
    /// Zero for triangle meshes, whose faces are their edges.
    #[inline]
    pub fn face_count(&self) -> usize {
        if self.cell_dim == 3 {
            self.simplex_count(2)
        } else {
            0
        }
    }

    #[inline]
    pub fn facet_count(&self) -> usize {
        self.simplex_count(self.facet_dim())
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.simplex_count(self.cell_dim)
    }

    /// Access the vertex indices of `dim`-simplices
    /// as a chunked iterator where each element is a `dim + 1`-length slice
    /// containing the sorted indices of one simplex.
    #[inline]
    pub fn indices(&self, dim: usize) -> std::slice::ChunksExact<'_, usize> {
        self.simplices[dim].indices.chunks_exact(dim + 1)
    }

    /// Sorted vertex indices of a cell.
    #[inline]
    pub fn cell_vertices(&self, cell: usize) -> &[usize] {
        self.simplices[self.cell_dim].simplex_indices(cell)
    }

    /// Vertex indices of an edge, in ascending order.
    #[inline]
    pub fn edge_vertices(&self, edge: usize) -> [usize; 2] {
        let indices = self.simplices[1].simplex_indices(edge);
        [indices[0], indices[1]]
    }

    /// Sorted vertex indices of a facet.
    #[inline]
    pub fn facet_vertices(&self, facet: usize) -> &[usize] {
        self.simplices[self.facet_dim()].simplex_indices(facet)
    }

    /// Global edge indices of a cell, one per local edge slot.
    ///
    /// For triangles, slot k is the edge opposite local vertex k.
    /// For tetrahedra, slots are ordered (0,1), (0,2), (0,3), (1,2), (1,3), (2,3)
    /// in terms of local vertices.
    #[inline]
    pub fn cell_edges(&self, cell: usize) -> &[usize] {
        let edge_count = local_edges(self.cell_dim).len();
        &self.cell_edges[cell * edge_count..(cell + 1) * edge_count]
    }

    /// Global facet indices of a cell, slot k opposite local vertex k.
    #[inline]
    pub fn cell_facets(&self, cell: usize) -> &[usize] {
        self.simplices[self.cell_dim].simplex_facets(cell)
    }

    /// Global edge indices of a face of a tetrahedral mesh,
    /// slot k opposite local vertex k of the face.
    #[inline]
    pub fn face_edges(&self, face: usize) -> &[usize] {
        self.simplices[2].simplex_facets(face)
    }

    /// Iterate over the cells incident to an edge,
    /// along with the local edge slot of the edge in each cell.
    pub fn edge_cells(&self, edge: usize) -> impl '_ + Iterator<Item = (usize, usize)> {
        csr_row_entries(&self.edge_cells, edge)
    }

    /// Iterate over the faces incident to an edge of a tetrahedral mesh,
    /// along with the local edge slot of the edge in each face.
    pub fn edge_faces(&self, edge: usize) -> impl '_ + Iterator<Item = (usize, usize)> {
        let count = if self.cell_dim == 3 { usize::MAX } else { 0 };
        csr_row_entries(&self.simplices[1].coboundary_map, edge).take(count)
    }

    /// Iterate over the one or two cells incident to a facet,
    /// along with the local facet slot of the facet in each cell.
    pub fn facet_cells(&self, facet: usize) -> impl '_ + Iterator<Item = (usize, usize)> {
        csr_row_entries(&self.simplices[self.facet_dim()].coboundary_map, facet)
    }

    /// Find the index of an edge by its vertex indices, given in any order.
    pub fn find_edge(&self, vertices: [usize; 2]) -> Option<usize> {
        let mut vertices = vertices;
        vertices.sort_unstable();
        self.simplices[1].find(&vertices)
    }

    /// Find the index of a triangle by its vertex indices, given in any order.
    ///
    /// In a triangle mesh these are cells, in a tetrahedral mesh faces.
    pub fn find_face(&self, vertices: [usize; 3]) -> Option<usize> {
        let mut vertices = vertices;
        vertices.sort_unstable();
        self.simplices[2].find(&vertices)
    }

    /// Volumes (areas for triangles) of the cells.
    #[inline]
    pub fn cell_volumes(&self) -> &[f64] {
        &self.simplices[self.cell_dim].volumes
    }

    /// Volumes of the facets (lengths in 2D, areas in 3D).
    #[inline]
    pub fn facet_volumes(&self) -> &[f64] {
        &self.simplices[self.facet_dim()].volumes
    }

    #[inline]
    pub fn edge_lengths(&self) -> &[f64] {
        &self.simplices[1].volumes
    }

    #[inline]
    pub fn cell_circumcenters(&self) -> &[na::SVector<f64, MESH_DIM>] {
        &self.simplices[self.cell_dim].circumcenters
    }

    /// Circumcenters of `dim`-simplices.
    /// For vertices these are the vertices themselves.
    #[inline]
    pub fn circumcenters(&self, dim: usize) -> &[na::SVector<f64, MESH_DIM>] {
        &self.simplices[dim].circumcenters
    }

    /// Covolume of each edge, i.e. the measure of the dual facet crossing it.
    #[inline]
    pub fn covolumes(&self) -> &[f64] {
        &self.covolumes
    }

    /// Covolume divided by edge length for each edge.
    /// This is the coefficient of the two-point flux across the edge.
    #[inline]
    pub fn ce_ratios(&self) -> &[f64] {
        &self.ce_ratios
    }

    /// Covolume contributions of a single cell to its edges,
    /// laid out like [`cell_edges`][Self::cell_edges].
    #[inline]
    pub fn cell_covolumes(&self, cell: usize) -> &[f64] {
        let edge_count = local_edges(self.cell_dim).len();
        &self.cell_covolumes[cell * edge_count..(cell + 1) * edge_count]
    }

    /// Volume of the dual cell around each vertex.
    #[inline]
    pub fn control_volumes(&self) -> &[f64] {
        &self.control_volumes
    }

    /// Control volumes obtained by splitting each cell's volume
    /// evenly among its vertices.
    ///
    /// These are always positive, unlike the circumcentric ones,
    /// but are not compatible with the two-point flux.
    pub fn barycentric_control_volumes(&self) -> Vec<f64> {
        let mut cv = vec![0.0; self.vertex_count()];
        let share = 1.0 / (self.cell_dim + 1) as f64;
        for (cell, &vol) in self.indices(self.cell_dim).zip(self.cell_volumes()) {
            for &v in cell {
                cv[v] += share * vol;
            }
        }
        cv
    }

    /// The lumped mass matrix, i.e. the control volumes on a diagonal.
    pub fn lumped_mass(&self) -> DiagonalOperator {
        DiagonalOperator::from(na::DVector::from_column_slice(&self.control_volumes))
    }

    /// Cells that were too flat to contribute to covolumes.
    #[inline]
    pub fn degenerate_cells(&self) -> &fb::FixedBitSet {
        &self.degenerate_cells
    }

    /// Number of interior facets whose neighboring circumcenters are
    /// in the wrong order, i.e. where the mesh is not Delaunay.
    #[inline]
    pub fn num_delaunay_violations(&self) -> usize {
        self.delaunay_violations
    }

    /// Number of facets shared by two cells.
    #[inline]
    pub fn num_interior_facets(&self) -> usize {
        self.interior_facets
    }

    /// Vertices on the boundary of the mesh.
    #[inline]
    pub fn boundary_vertices(&self) -> &fb::FixedBitSet {
        &self.simplices[0].mesh_boundary
    }

    /// Facets incident to only one cell.
    #[inline]
    pub fn boundary_facets(&self) -> &fb::FixedBitSet {
        &self.simplices[self.facet_dim()].mesh_boundary
    }

    #[inline]
    pub fn is_boundary_vertex(&self, vertex: usize) -> bool {
        self.simplices[0].mesh_boundary.contains(vertex)
    }

    /// Outward unit normal of the facet in the given local slot of a cell.
    ///
    /// The normal lies in the affine hull of the cell,
    /// so this also works for triangles embedded in 3D.
    /// Returns a zero vector for degenerate cells.
    pub fn facet_normal(&self, cell: usize, slot: usize) -> na::SVector<f64, MESH_DIM> {
        let cell_verts = self.cell_vertices(cell);
        let opposite = self.vertices[cell_verts[slot]];
        let facet_verts: Vec<na::SVector<f64, MESH_DIM>> = cell_verts
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != slot)
            .map(|(_, &v)| self.vertices[v])
            .collect();
        let base = facet_verts[0];
        let basis: Vec<na::SVector<f64, MESH_DIM>> =
            facet_verts[1..].iter().map(|v| v - base).collect();
        let to_opposite = opposite - base;

        // project the opposite vertex onto the facet's affine hull
        // by solving the normal equations of the facet basis
        let gram = na::DMatrix::from_fn(basis.len(), basis.len(), |r, c| basis[r].dot(&basis[c]));
        let rhs = na::DVector::from_iterator(basis.len(), basis.iter().map(|b| b.dot(&to_opposite)));
        let Some(coefs) = gram.lu().solve(&rhs) else {
            return na::SVector::zeros();
        };
        let projection: na::SVector<f64, MESH_DIM> = basis
            .iter()
            .zip(coefs.iter())
            .map(|(b, c)| *c * b)
            .sum();

        (projection - to_opposite)
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(na::SVector::zeros)
    }

    /// Approximate the gradient of a function given by its vertex values.
    ///
    /// Each edge contributes the difference of its endpoint values
    /// weighted by the first moment of its dual facet about the endpoint
    /// (Lu, Qian and Han (2008), Discrete gradient method in solid mechanics).
    /// The sum is multiplied with the inverse of the same sum taken over
    /// the edge vectors instead of value differences,
    /// which removes the error that control volumes cut off by the boundary
    /// would otherwise cause, so that affine functions have their exact gradient
    /// at every vertex.
    ///
    /// On triangle meshes embedded in 3D, and at vertices where the correction
    /// is singular, the uncorrected sum is divided by the control volume instead.
    pub fn compute_gradient(
        &self,
        values: &na::DVector<f64>,
    ) -> Result<Vec<na::SVector<f64, MESH_DIM>>, MeshError> {
        let n = self.vertex_count();
        if values.len() != n {
            return Err(MeshError::ValueCountMismatch {
                expected: n,
                actual: values.len(),
            });
        }

        // first moments of the dual facets, gathered from each cell's piece.
        // the piece of a cell is approximated as having its centroid
        // at the mean of the circumcenters it is spanned by
        let cell_centers = self.cell_circumcenters();
        let edge_centers = self.circumcenters(1);
        let facet_centers = self.circumcenters(self.facet_dim());
        let mut moments = vec![na::SVector::<f64, MESH_DIM>::zeros(); self.edge_count()];
        for cell in 0..self.cell_count() {
            let cell_facets = self.cell_facets(cell);
            for (&edge, &covol, pair) in izip!(
                self.cell_edges(cell),
                self.cell_covolumes(cell),
                local_edges(self.cell_dim)
            ) {
                let mut centroid = cell_centers[cell] + edge_centers[edge];
                let mut point_count = 2.0;
                if self.cell_dim == 3 {
                    // the faces containing the edge are opposite the other two vertices
                    for (slot, &facet) in cell_facets.iter().enumerate() {
                        if !pair.contains(&slot) {
                            centroid += facet_centers[facet];
                            point_count += 1.0;
                        }
                    }
                }
                moments[edge] += centroid * (covol / point_count);
            }
        }

        let mut sums = vec![na::SVector::<f64, MESH_DIM>::zeros(); n];
        let mut corrections = vec![na::SMatrix::<f64, MESH_DIM, MESH_DIM>::zeros(); n];
        for (edge, (&covol, &len, moment)) in
            izip!(&self.covolumes, self.edge_lengths(), &moments).enumerate()
        {
            if len == 0.0 {
                continue;
            }
            let [a, b] = self.edge_vertices(edge);
            let edge_vec = self.vertices[b] - self.vertices[a];
            let diff = values[b] - values[a];
            let r_a = (moment - self.vertices[a] * covol) / len;
            let r_b = (moment - self.vertices[b] * covol) / len;
            // seen from b, both the difference and the edge vector flip sign
            sums[a] += r_a * diff;
            sums[b] -= r_b * diff;
            corrections[a] += r_a * edge_vec.transpose();
            corrections[b] -= r_b * edge_vec.transpose();
        }

        // on embedded meshes the correction only has rank `cell_dim`
        let embedded = self.cell_dim < MESH_DIM;
        let gradient = izip!(sums, corrections, &self.control_volumes)
            .map(|(sum, correction, &cv)| match correction.try_inverse() {
                Some(inv) if !embedded && inv.iter().all(|x| x.is_finite()) => inv * sum,
                _ if cv != 0.0 => sum / cv,
                _ => na::SVector::zeros(),
            })
            .collect();
        Ok(gradient)
    }
}

//
// tests
//

#[cfg(test)]
mod tests {
    use super::*;
    use approx::relative_eq;

    type Vec2 = na::SVector<f64, 2>;

    #[test]
    fn covolume_mode_parses() {
        assert_eq!(
            "geometric".parse::<CovolumeMode>(),
            Ok(CovolumeMode::Geometric)
        );
        assert_eq!(
            "Algebraic".parse::<CovolumeMode>(),
            Ok(CovolumeMode::Algebraic)
        );
        assert_eq!(
            "voronoi".parse::<CovolumeMode>(),
            Err(MeshError::UnknownCovolumeMode("voronoi".to_string()))
        );
        assert_eq!(CovolumeMode::Algebraic.to_string(), "algebraic");
    }

    #[test]
    fn malformed_input_is_rejected() {
        let verts = || vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)];

        assert_eq!(
            SimplicialMesh::new(verts(), vec![0, 1], 2).unwrap_err(),
            MeshError::IndexCountMismatch {
                count: 2,
                cell_size: 3
            }
        );
        assert_eq!(
            SimplicialMesh::new(verts(), vec![0, 1], 1).unwrap_err(),
            MeshError::UnsupportedCellDim(1)
        );
        assert_eq!(
            SimplicialMesh::new(verts(), vec![0, 1, 2, 2], 3).unwrap_err(),
            MeshError::CellDimExceedsEmbedding {
                cell_dim: 3,
                embedding_dim: 2
            }
        );
        assert_eq!(
            SimplicialMesh::new(verts(), vec![0, 1, 3], 2).unwrap_err(),
            MeshError::VertexOutOfRange {
                cell: 0,
                vertex: 3,
                vertex_count: 3
            }
        );
        assert_eq!(
            SimplicialMesh::new(verts(), vec![0, 1, 1], 2).unwrap_err(),
            MeshError::RepeatedVertex { cell: 0, vertex: 1 }
        );
    }

    #[test]
    fn entities_can_be_looked_up() {
        let mesh = tiny_mesh_3d();

        for (edge_idx, edge) in mesh.indices(1).enumerate() {
            assert_eq!(mesh.find_edge([edge[1], edge[0]]), Some(edge_idx));
        }
        for (face_idx, face) in mesh.indices(2).enumerate() {
            assert_eq!(mesh.find_face([face[2], face[0], face[1]]), Some(face_idx));
        }
        // 4 and 5 are the tips of the diamond and never share an edge
        assert_eq!(mesh.find_edge([4, 5]), None);
        assert_eq!(mesh.find_face([0, 3, 4]), None);
    }

    #[test]
    fn facet_normals_point_outward() {
        let mesh = tiny_mesh_2d();
        for cell in 0..mesh.cell_count() {
            let center = mesh.simplex(2, cell).barycenter();
            for slot in 0..3 {
                let normal = mesh.facet_normal(cell, slot);
                assert!(relative_eq!(normal.magnitude(), 1.0));
                let [a, b] = mesh.edge_vertices(mesh.cell_facets(cell)[slot]);
                let edge = mesh.vertices[b] - mesh.vertices[a];
                assert!(normal.dot(&edge).abs() < 1e-12, "normal not orthogonal to its edge");
                let midpoint = 0.5 * (mesh.vertices[a] + mesh.vertices[b]);
                assert!(normal.dot(&(midpoint - center)) > 0.0, "normal points inward");
            }
        }

        let mesh = tiny_mesh_3d();
        let normal = mesh.facet_normal(0, 3);
        // cell 0 is [0, 1, 2, 4] with the tip 4 below the xy plane,
        // so the facet opposite it faces up
        assert!(relative_eq!(normal, na::Vector3::z()));

        // the two cells sharing an interior facet see opposite normals
        for facet in mesh.facets() {
            let cells: Vec<(usize, usize)> = mesh.facet_cells(facet.index()).collect();
            assert_eq!(cells.len(), if facet.is_on_boundary() { 1 } else { 2 });
            for &(cell, slot) in &cells {
                assert_eq!(mesh.cell_facets(cell)[slot], facet.index());
            }
            if let [(c0, s0), (c1, s1)] = cells[..] {
                let sum = mesh.facet_normal(c0, s0) + mesh.facet_normal(c1, s1);
                assert!(sum.magnitude() < 1e-12);
            }
        }
    }

    #[test]
    fn barycentric_control_volumes_partition_the_mesh() {
        let mesh = tiny_mesh_3d();
        let total: f64 = mesh.cell_volumes().iter().sum();
        let cv = mesh.barycentric_control_volumes();
        assert!(relative_eq!(cv.iter().sum::<f64>(), total));
        assert!(cv.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn affine_functions_have_exact_gradients() {
        let mesh = tiny_mesh_2d();
        let values = na::DVector::from_iterator(
            mesh.vertex_count(),
            mesh.vertices.iter().map(|x| 1.0 + 7.0 * x.x + 3.0 * x.y),
        );
        let gradient = mesh.compute_gradient(&values).unwrap();
        assert_eq!(gradient.len(), 7);
        // boundary vertices included
        for (v, grad) in gradient.iter().enumerate() {
            assert!(
                relative_eq!(*grad, Vec2::new(7.0, 3.0), epsilon = 1e-12),
                "vertex {v}: {grad}"
            );
        }

        let mesh = tiny_mesh_3d();
        let values = na::DVector::from_iterator(
            mesh.vertex_count(),
            mesh.vertices
                .iter()
                .map(|x| 0.5 - x.x + 2.0 * x.y + 4.0 * x.z),
        );
        let expected = na::Vector3::new(-1.0, 2.0, 4.0);
        for (v, grad) in mesh.compute_gradient(&values).unwrap().iter().enumerate() {
            assert!(
                relative_eq!(*grad, expected, epsilon = 1e-10),
                "vertex {v}: {grad}"
            );
        }

        assert_eq!(
            mesh.compute_gradient(&na::DVector::zeros(2)),
            Err(MeshError::ValueCountMismatch {
                expected: 6,
                actual: 2
            })
        );
    }

    #[test]
    fn lumped_mass_scales_by_control_volume() {
        use crate::operator::Operator;

        let mesh = tiny_mesh_2d();
        let ones = na::DVector::from_element(mesh.vertex_count(), 1.0);
        let masses = mesh.lumped_mass().apply(&ones);
        assert_eq!(masses.as_slice(), mesh.control_volumes());
    }
}
