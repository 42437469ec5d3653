use super::{local_edges, Mask, SimplicialMesh};

use fixedbitset as fb;
use nalgebra as na;

/// A view into a single simplex's data.
#[derive(Clone, Copy, Debug)]
pub struct SimplexView<'a, const MESH_DIM: usize> {
    pub(super) mesh: &'a SimplicialMesh<MESH_DIM>,
    pub(super) dim: usize,
    pub(super) index: usize,
    pub(super) indices: &'a [usize],
}

impl<'a, const MESH_DIM: usize> PartialEq for SimplexView<'a, MESH_DIM> {
    fn eq(&self, other: &Self) -> bool {
        self.dim == other.dim && self.index == other.index
    }
}
impl<'a, const MESH_DIM: usize> Eq for SimplexView<'a, MESH_DIM> {}

impl<'a, const MESH_DIM: usize> SimplexView<'a, MESH_DIM> {
    /// Get the index of this simplex in the ordering of simplices of its dimension.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Iterate over the vertex indices of this simplex.
    #[inline]
    pub fn vertex_indices(&self) -> impl 'a + Iterator<Item = usize> {
        self.indices.iter().copied()
    }

    /// Iterate over the vertices of this simplex.
    #[inline]
    pub fn vertices(&self) -> impl 'a + Iterator<Item = na::SVector<f64, MESH_DIM>> {
        let mesh = self.mesh;
        self.indices.iter().map(move |i| mesh.vertices[*i])
    }

    /// Get the unsigned volume of this simplex.
    #[inline]
    pub fn volume(&self) -> f64 {
        self.mesh.simplices[self.dim].volumes[self.index]
    }

    #[inline]
    pub fn circumcenter(&self) -> na::SVector<f64, MESH_DIM> {
        self.mesh.simplices[self.dim].circumcenters[self.index]
    }

    /// Average of the vertices.
    pub fn barycenter(&self) -> na::SVector<f64, MESH_DIM> {
        self.vertices().sum::<na::SVector<f64, MESH_DIM>>() / self.indices.len() as f64
    }

    /// Whether this simplex lies on the boundary of the mesh.
    #[inline]
    pub fn is_on_boundary(&self) -> bool {
        self.mesh.simplices[self.dim].mesh_boundary.contains(self.index)
    }
}

/// A set of indices to iterate over,
/// defined either as a contiguous range
/// or an arbitrary set represented by a bitset.
pub(super) enum IndexIter<'a> {
    All(std::ops::Range<usize>),
    Subset(fb::Ones<'a>),
}

impl<'a> IndexIter<'a> {
    pub(super) fn from_mask(mask: &'a Mask, count: usize) -> Self {
        match mask {
            Mask::All => Self::All(0..count),
            Mask::Indices(set) => Self::Subset(set.ones()),
        }
    }
}

impl<'a> Iterator for IndexIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::All(range) => range.next(),
            Self::Subset(indices) => indices.next(),
        }
    }
}

/// Iterator over a set of simplices of one dimension in a mesh.
pub struct SimplexIter<'a, const MESH_DIM: usize> {
    pub(super) mesh: &'a SimplicialMesh<MESH_DIM>,
    pub(super) dim: usize,
    pub(super) idx_iter: IndexIter<'a>,
}

impl<'a, const MESH_DIM: usize> Iterator for SimplexIter<'a, MESH_DIM> {
    type Item = SimplexView<'a, MESH_DIM>;

    fn next(&mut self) -> Option<Self::Item> {
        let next_idx = self.idx_iter.next()?;
        if next_idx >= self.mesh.simplex_count(self.dim) {
            return None;
        }
        Some(self.mesh.simplex(self.dim, next_idx))
    }
}

/// One edge of one cell, carrying that cell's share of the edge's covolume.
///
/// Edge kernels are evaluated on these rather than on global edges
/// so that coefficients can vary from cell to cell.
#[derive(Clone, Copy, Debug)]
pub struct CellEdgeView<'a, const MESH_DIM: usize> {
    mesh: &'a SimplicialMesh<MESH_DIM>,
    cell: usize,
    slot: usize,
    edge: usize,
}

impl<'a, const MESH_DIM: usize> CellEdgeView<'a, MESH_DIM> {
    #[inline]
    pub fn cell(&self) -> usize {
        self.cell
    }

    /// Local edge slot within the cell, see [`SimplicialMesh::cell_edges`].
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Global index of the edge.
    #[inline]
    pub fn edge(&self) -> usize {
        self.edge
    }

    /// Global vertex indices of the edge's endpoints,
    /// ordered by the cell's local vertex order (which is ascending).
    #[inline]
    pub fn endpoints(&self) -> [usize; 2] {
        let [a, b] = local_edges(self.mesh.cell_dim)[self.slot];
        let cell = self.mesh.cell_vertices(self.cell);
        [cell[a], cell[b]]
    }

    /// Vector from the first endpoint to the second.
    #[inline]
    pub fn vector(&self) -> na::SVector<f64, MESH_DIM> {
        let [a, b] = self.endpoints();
        self.mesh.vertices[b] - self.mesh.vertices[a]
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.mesh.edge_lengths()[self.edge]
    }

    /// This cell's contribution to the covolume of the edge.
    #[inline]
    pub fn covolume(&self) -> f64 {
        self.mesh.cell_covolumes(self.cell)[self.slot]
    }

    /// This cell's contribution to the covolume-to-length ratio of the edge.
    /// Zero for zero-length edges.
    #[inline]
    pub fn ce_ratio(&self) -> f64 {
        let length = self.length();
        if length > 0.0 {
            self.covolume() / length
        } else {
            0.0
        }
    }

    #[inline]
    pub fn midpoint(&self) -> na::SVector<f64, MESH_DIM> {
        self.mesh.circumcenters(1)[self.edge]
    }
}

impl<const MESH_DIM: usize> SimplicialMesh<MESH_DIM> {
    /// Get a view of the simplex with the given dimension and index.
    #[inline]
    pub fn simplex(&self, dim: usize, index: usize) -> SimplexView<'_, MESH_DIM> {
        SimplexView {
            mesh: self,
            dim,
            index,
            indices: self.simplices[dim].simplex_indices(index),
        }
    }

    /// Iterate over all simplices of the given dimension.
    pub fn simplices_of_dim(&self, dim: usize) -> SimplexIter<'_, MESH_DIM> {
        SimplexIter {
            mesh: self,
            dim,
            idx_iter: IndexIter::All(0..self.simplex_count(dim)),
        }
    }

    #[inline]
    pub fn cells(&self) -> SimplexIter<'_, MESH_DIM> {
        self.simplices_of_dim(self.cell_dim)
    }

    #[inline]
    pub fn facets(&self) -> SimplexIter<'_, MESH_DIM> {
        self.simplices_of_dim(self.facet_dim())
    }

    #[inline]
    pub fn edges(&self) -> SimplexIter<'_, MESH_DIM> {
        self.simplices_of_dim(1)
    }

    /// Iterate over the simplices of a dimension selected by a mask.
    pub fn simplices_in<'a>(&'a self, dim: usize, mask: &'a Mask) -> SimplexIter<'a, MESH_DIM> {
        SimplexIter {
            mesh: self,
            dim,
            idx_iter: IndexIter::from_mask(mask, self.simplex_count(dim)),
        }
    }

    /// Iterate over every (cell, edge) pair of the cells selected by a mask.
    pub fn cell_edges_in<'a>(
        &'a self,
        cells: &'a Mask,
    ) -> impl 'a + Iterator<Item = CellEdgeView<'a, MESH_DIM>> {
        IndexIter::from_mask(cells, self.cell_count())
            .take_while(move |&cell| cell < self.cell_count())
            .flat_map(move |cell| {
                self.cell_edges(cell)
                    .iter()
                    .enumerate()
                    .map(move |(slot, &edge)| CellEdgeView {
                        mesh: self,
                        cell,
                        slot,
                        edge,
                    })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::super::*;
    use approx::relative_eq;
    use itertools::izip;

    #[test]
    fn views_access_the_right_data() {
        let mesh = tiny_mesh_3d();
        for dim in 0..=3 {
            itertools::assert_equal(
                mesh.simplices_of_dim(dim).map(|s| s.volume()),
                mesh.simplices[dim].volumes.iter().cloned(),
            );
            itertools::assert_equal(
                mesh.simplices_of_dim(dim).map(|s| s.circumcenter()),
                mesh.simplices[dim].circumcenters.iter().cloned(),
            );
            for (view, indices) in izip!(mesh.simplices_of_dim(dim), mesh.indices(dim)) {
                itertools::assert_equal(view.vertex_indices(), indices.iter().cloned());
            }
        }
        assert_eq!(mesh.cells().count(), mesh.cell_count());
        assert_eq!(mesh.facets().count(), mesh.facet_count());
        assert_eq!(mesh.edges().count(), mesh.edge_count());

        let boundary_facets = mesh.facets().filter(|f| f.is_on_boundary()).count();
        assert_eq!(boundary_facets, mesh.boundary_facets().count_ones(..));
    }

    #[test]
    fn cell_edges_carry_cell_covolumes() {
        let mesh = tiny_mesh_2d();

        let mut summed = vec![0.0; mesh.edge_count()];
        for ce in mesh.cell_edges_in(&Mask::All) {
            let [a, b] = ce.endpoints();
            assert!(a < b);
            assert_eq!(mesh.find_edge([a, b]), Some(ce.edge()));
            assert_eq!(mesh.cell_edges(ce.cell())[ce.slot()], ce.edge());
            assert!(relative_eq!(ce.vector().magnitude(), ce.length()));
            summed[ce.edge()] += ce.covolume();
        }
        for (s, cov) in izip!(&summed, mesh.covolumes()) {
            assert!(relative_eq!(*s, *cov, epsilon = 1e-14));
        }
    }

    #[test]
    fn masked_iteration_visits_only_selected_cells() {
        let mesh = tiny_mesh_2d();
        let mut set = fb::FixedBitSet::with_capacity(mesh.cell_count());
        set.insert(1);
        set.insert(4);
        let mask = Mask::Indices(Rc::new(set));

        let cells: Vec<usize> = mesh.cell_edges_in(&mask).map(|ce| ce.cell()).collect();
        assert_eq!(cells, vec![1, 1, 1, 4, 4, 4]);

        let visited: Vec<usize> = mesh
            .simplices_in(mesh.cell_dim(), &mask)
            .map(|c| c.index())
            .collect();
        assert_eq!(visited, vec![1, 4]);
    }
}
