use fixedbitset as fb;
use nalgebra as na;
use nalgebra_sparse as nas;

use itertools::{izip, Itertools};
use std::{cell::RefCell, collections::HashMap, rc::Rc};

use super::{
    local_edges, simplex_key, CovolumeMode, MeshError, MeshOptions, SimplexCollection,
    SimplicialMesh,
};

/// Construct a mesh from raw vertices and indices.
///
/// The indices are given as a flat array,
/// where every `cell_dim + 1` indices correspond to one cell.
pub fn build_mesh<const MESH_DIM: usize>(
    vertices: Vec<na::SVector<f64, MESH_DIM>>,
    mut indices: Vec<usize>,
    cell_dim: usize,
    options: &MeshOptions,
) -> Result<SimplicialMesh<MESH_DIM>, MeshError> {
    validate_cells(&mut indices, vertices.len(), cell_dim, MESH_DIM)?;

    let vertices: Rc<[na::SVector<f64, MESH_DIM>]> = Rc::from(vertices);
    let cell_size = cell_dim + 1;
    // collection for every dimension of simplex, including 0
    // (even though those are just the vertices),
    // for unified storage and iteration
    let mut simplices: Vec<SimplexCollection<MESH_DIM>> = (0..=cell_dim)
        .map(|i| SimplexCollection {
            simplex_size: i + 1,
            ..Default::default()
        })
        .collect();

    simplices[0].indices = (0..vertices.len()).collect();
    simplices[0].circumcenters = vertices.clone();
    simplices[0].volumes.resize(vertices.len(), 1.0);

    //
    // compute sub-simplices
    //

    // cells are already sorted by `validate_cells`,
    // so every combination of their vertices is sorted as well
    // and can be used directly as a key for deduplication.
    // ids are handed out in order of first appearance
    {
        let (sub_simplices, cells) = simplices.split_at_mut(cell_dim);
        let cells = &mut cells[0];
        for (cell_idx, cell) in indices.chunks_exact(cell_size).enumerate() {
            for sub_collection in &mut sub_simplices[1..] {
                for sub_simplex in cell.iter().copied().combinations(sub_collection.simplex_size) {
                    insert_simplex(sub_collection, &sub_simplex);
                }
            }
            cells.index_map.insert(simplex_key(cell), cell_idx);
        }
        cells.indices = indices;
    }

    // facets of every simplex in the order opposite to their vertices,
    // and the transposed relation as a sparse matrix
    for dim in 1..=cell_dim {
        let (lower, upper) = simplices.split_at_mut(dim);
        let lower = &mut lower[dim - 1];
        let upper = &mut upper[0];

        let mut facets = Vec::with_capacity(upper.indices.len());
        let mut coboundary_coo = nas::CooMatrix::new(lower.len(), upper.len());
        let mut curr_facet: Vec<usize> = Vec::with_capacity(dim);
        for (simplex_idx, simplex) in upper.indices.chunks_exact(upper.simplex_size).enumerate() {
            for exclude_idx in 0..upper.simplex_size {
                curr_facet.clear();
                curr_facet.extend(
                    simplex
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != exclude_idx)
                        .map(|(_, v)| *v),
                );
                let facet_idx = lower
                    .find(&curr_facet)
                    .expect("Facet missing from sub-simplices. This is a bug in finvol");
                facets.push(facet_idx);
                coboundary_coo.push(facet_idx, simplex_idx, exclude_idx as i8);
            }
        }
        upper.facets = facets;
        lower.coboundary_map = nas::CsrMatrix::from(&coboundary_coo);
    }
    // set dimensions of the empty top-level coboundary
    // so that row indexing works on it too
    let cell_count = simplices[cell_dim].len();
    simplices[cell_dim].coboundary_map = nas::CsrMatrix::zeros(cell_count, 0);

    // edges of every cell in the slot order given by `local_edges`,
    // and the corresponding edge-to-cell map

    let local_edge_pairs = local_edges(cell_dim);
    let mut cell_edges: Vec<usize> = Vec::with_capacity(cell_count * local_edge_pairs.len());
    let mut edge_cells_coo = nas::CooMatrix::new(simplices[1].len(), cell_count);
    for (cell_idx, cell) in simplices[cell_dim]
        .indices
        .chunks_exact(cell_size)
        .enumerate()
    {
        for (slot, [a, b]) in local_edge_pairs.iter().enumerate() {
            let edge_idx = simplices[1]
                .find(&[cell[*a], cell[*b]])
                .expect("Cell edge missing from edges. This is a bug in finvol");
            cell_edges.push(edge_idx);
            edge_cells_coo.push(edge_idx, cell_idx, slot as i8);
        }
    }
    let edge_cells = nas::CsrMatrix::from(&edge_cells_coo);

    //
    // identify mesh boundary
    //

    for simplices in &mut simplices {
        simplices.mesh_boundary.grow(simplices.len());
    }

    // if a facet is only on the boundary of one cell,
    // then it is on the boundary of the mesh
    let facet_dim = cell_dim - 1;
    let facets = &mut simplices[facet_dim];
    let coboundary_map = &facets.coboundary_map;
    let mesh_boundary = &mut facets.mesh_boundary;
    for (row_idx, facet_coboundary) in coboundary_map.row_iter().enumerate() {
        if facet_coboundary.nnz() == 1 {
            mesh_boundary.insert(row_idx);
        }
    }

    // also mark the facets of those, all the way down to vertices
    for dim in (1..=facet_dim).rev() {
        let (lower, upper) = simplices.split_at_mut(dim);
        let upper = &upper[0];
        let lower = &mut lower[dim - 1];
        for simplex_idx in upper.mesh_boundary.ones() {
            for &facet_idx in upper.simplex_facets(simplex_idx) {
                lower.mesh_boundary.insert(facet_idx);
            }
        }
    }

    //
    // compute circumcenters
    //

    let mut degenerate_cells = fb::FixedBitSet::with_capacity(cell_count);

    // for 1-simplices (line segments) the circumcenter is simply the midpoint,
    // compute those as a special case for efficiency
    let simplices_1 = &mut simplices[1];
    let mut midpoints = Vec::with_capacity(simplices_1.len());
    for indices in simplices_1.indices.chunks_exact(2) {
        midpoints.push(0.5 * (vertices[indices[0]] + vertices[indices[1]]));
        simplices_1.circumcenter_bary.extend_from_slice(&[0.5, 0.5]);
    }
    simplices_1.circumcenters = Rc::from(midpoints);

    // for the rest, solve for the circumcenter relative to the first vertex.
    // with edge vectors E = [x_1 - x_0, ..., x_d - x_0],
    // the offset E μ is equidistant from all vertices when
    // E^T E μ = diag(E^T E) / 2.
    // going through the QR factorization of E instead of forming E^T E
    // keeps thin simplices accurate
    for (dim, simplices) in simplices.iter_mut().enumerate().skip(2) {
        let edge_count = simplices.simplex_size - 1;
        let mut circumcenters = Vec::with_capacity(simplices.len());
        let mut edge_mat = na::DMatrix::zeros(MESH_DIM, edge_count);
        let mut half_sq_lengths = na::DVector::zeros(edge_count);

        for (simplex_idx, indices) in simplices
            .indices
            .chunks_exact(simplices.simplex_size)
            .enumerate()
        {
            let origin = vertices[indices[0]];
            for edge_idx in 0..edge_count {
                let edge = vertices[indices[edge_idx + 1]] - origin;
                edge_mat.set_column(edge_idx, &edge);
                half_sq_lengths[edge_idx] = 0.5 * edge.norm_squared();
            }

            let qr = edge_mat.clone().qr();
            let r = qr.r();
            let solved = r.tr_solve_upper_triangular(&half_sq_lengths).and_then(|y| {
                let offset = qr.q() * &y;
                r.solve_upper_triangular(&y).map(|mu| (offset, mu))
            });

            match solved {
                Some((offset, mu)) if mu.iter().all(|m| m.is_finite()) => {
                    let circumcenter: na::SVector<f64, MESH_DIM> =
                        origin + na::SVector::from_iterator(offset.iter().copied());
                    circumcenters.push(circumcenter);
                    simplices.circumcenter_bary.push(1.0 - mu.sum());
                    simplices.circumcenter_bary.extend(mu.iter());
                }
                _ => {
                    // degenerate simplex.
                    // the barycenter is as good a placeholder as any,
                    // this simplex won't contribute to covolumes
                    log::warn!(
                        "{dim}-simplex {simplex_idx} with vertices {indices:?} is degenerate, \
                         using its barycenter as the circumcenter"
                    );
                    let weight = 1.0 / simplices.simplex_size as f64;
                    let barycenter = indices
                        .iter()
                        .fold(na::SVector::zeros(), |acc, i| acc + vertices[*i])
                        * weight;
                    circumcenters.push(barycenter);
                    simplices
                        .circumcenter_bary
                        .extend(std::iter::repeat(weight).take(simplices.simplex_size));
                    if dim == cell_dim {
                        degenerate_cells.insert(simplex_idx);
                    }
                }
            }
        }
        simplices.circumcenters = Rc::from(circumcenters);
    }

    //
    // compute primal volumes
    //

    // again, simplified special case for line segments
    let simplices_1 = &mut simplices[1];
    let indices_1 = &simplices_1.indices;
    for indices in indices_1.chunks_exact(2) {
        let verts = [vertices[indices[0]], vertices[indices[1]]];
        simplices_1.volumes.push((verts[1] - verts[0]).magnitude());
    }

    // for the rest, the volume is the product of the diagonal of R
    // in the QR factorization of the edge matrix, divided by p!
    for simplices in &mut simplices[2..] {
        let indices = &simplices.indices;

        let edge_count = simplices.simplex_size - 1;
        let mut edges: Vec<na::SVector<f64, MESH_DIM>> = vec![na::SVector::zeros(); edge_count];

        for indices in indices.chunks_exact(simplices.simplex_size) {
            for edge_idx in 0..edge_count {
                edges[edge_idx] = vertices[indices[edge_idx + 1]] - vertices[indices[0]];
            }
            simplices.volumes.push(spanned_volume(&edges));
        }
    }

    // flag flat cells whose circumcenter solve happened to go through
    let edge_lengths = &simplices[1].volumes;
    for (cell_idx, (&vol, edges)) in izip!(
        &simplices[cell_dim].volumes,
        cell_edges.chunks_exact(local_edge_pairs.len())
    )
    .enumerate()
    {
        let longest = edges
            .iter()
            .map(|&e| edge_lengths[e])
            .fold(0.0, f64::max);
        if vol <= options.degeneracy_tolerance * longest.powi(cell_dim as i32)
            && !degenerate_cells.contains(cell_idx)
        {
            log::warn!("cell {cell_idx} has near-zero volume {vol:e}, skipping its covolumes");
            degenerate_cells.insert(cell_idx);
        }
    }

    //
    // compute covolumes
    //

    let cell_covolumes = match options.covolume_mode {
        CovolumeMode::Geometric => {
            geometric_covolumes(&simplices, cell_dim, &cell_edges, &degenerate_cells)
        }
        CovolumeMode::Algebraic => algebraic_covolumes(
            &vertices,
            &simplices[cell_dim],
            cell_dim,
            &mut degenerate_cells,
        ),
    };

    let edge_count = simplices[1].len();
    let mut covolumes = vec![0.0; edge_count];
    for (&edge_idx, &covol) in izip!(&cell_edges, &cell_covolumes) {
        covolumes[edge_idx] += covol;
    }
    let ce_ratios: Vec<f64> = izip!(&covolumes, &simplices[1].volumes)
        .map(|(&covol, &len)| if len > 0.0 { covol / len } else { 0.0 })
        .collect();

    //
    // compute control volumes
    //

    // each edge contributes the pyramid (or triangle in 2D)
    // spanned by the edge and its covolume, split between its two endpoints
    let pyramid_factor = 1.0 / (2 * cell_dim) as f64;
    let mut control_volumes = vec![0.0; vertices.len()];
    for (edge, &len, &covol) in izip!(
        simplices[1].indices.chunks_exact(2),
        &simplices[1].volumes,
        &covolumes
    ) {
        let vol = pyramid_factor * len * covol;
        control_volumes[edge[0]] += vol;
        control_volumes[edge[1]] += vol;
    }

    let control_total: f64 = control_volumes.iter().sum();
    let cell_total: f64 = simplices[cell_dim].volumes.iter().sum();
    let difference = (control_total - cell_total).abs();
    // written this way around so that NaNs also fail the check
    if !(difference <= options.volume_tolerance * cell_total) {
        return Err(MeshError::VolumeMismatch {
            control: control_total,
            cells: cell_total,
            difference,
        });
    }

    let negative_count = control_volumes.iter().filter(|&&cv| cv < 0.0).count();
    if negative_count > 0 {
        log::warn!(
            "{negative_count} of {} control volumes are negative, the mesh is not Delaunay",
            control_volumes.len()
        );
    }

    //
    // count Delaunay violations
    //

    let (interior_facets, delaunay_violations) =
        count_delaunay_violations(&vertices, &simplices, cell_dim);
    if delaunay_violations > 0 {
        log::warn!(
            "{delaunay_violations} of {interior_facets} interior facets violate the Delaunay condition"
        );
    }

    log::debug!(
        "built mesh with {} vertices, {} edges, {} cells ({} mode covolumes)",
        vertices.len(),
        edge_count,
        cell_count,
        options.covolume_mode,
    );

    Ok(SimplicialMesh {
        vertices,
        cell_dim,
        simplices,
        cell_edges,
        edge_cells,
        cell_covolumes,
        covolumes,
        ce_ratios,
        control_volumes,
        degenerate_cells,
        delaunay_violations,
        interior_facets,
        covolume_mode: options.covolume_mode,
        subdomain_masks: RefCell::new(HashMap::new()),
    })
}

/// Check the connectivity array for consistency
/// and sort the vertices of each cell.
fn validate_cells(
    indices: &mut [usize],
    vertex_count: usize,
    cell_dim: usize,
    embedding_dim: usize,
) -> Result<(), MeshError> {
    if !(2..=3).contains(&cell_dim) {
        return Err(MeshError::UnsupportedCellDim(cell_dim));
    }
    if cell_dim > embedding_dim {
        return Err(MeshError::CellDimExceedsEmbedding {
            cell_dim,
            embedding_dim,
        });
    }
    let cell_size = cell_dim + 1;
    if indices.len() % cell_size != 0 {
        return Err(MeshError::IndexCountMismatch {
            count: indices.len(),
            cell_size,
        });
    }

    for (cell_idx, cell) in indices.chunks_exact_mut(cell_size).enumerate() {
        if let Some(&vertex) = cell.iter().find(|&&v| v >= vertex_count) {
            return Err(MeshError::VertexOutOfRange {
                cell: cell_idx,
                vertex,
                vertex_count,
            });
        }
        // by convention, sort simplices to have their indices in ascending order.
        // this enables a consistent way to identify a simplex with its vertices
        cell.sort_unstable();
        if let Some(pair) = cell.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(MeshError::RepeatedVertex {
                cell: cell_idx,
                vertex: pair[0],
            });
        }
    }

    Ok(())
}

/// Add a simplex to the collection unless it's already there,
/// returning its index either way.
fn insert_simplex<const MESH_DIM: usize>(
    collection: &mut SimplexCollection<MESH_DIM>,
    indices: &[usize],
) -> usize {
    let next_idx = collection.indices.len() / collection.simplex_size;
    let indices_storage = &mut collection.indices;
    *collection
        .index_map
        .entry(simplex_key(indices))
        .or_insert_with(|| {
            indices_storage.extend_from_slice(indices);
            next_idx
        })
}

/// Covolume contributions of each cell to each of its edges
/// as signed volumes of the elementary duals of the circumcentric subdivision.
///
/// The sign of each elementary dual is determined by
/// whether the previous circumcenter is in the same halfspace
/// relative to the facet as the opposite vertex,
/// i.e. the sign of the barycentric coordinate of the opposite vertex.
/// See Hirani et al. (2012). Delaunay Hodge Star
/// https://www.sciencedirect.com/science/article/pii/S0010448512002436
fn geometric_covolumes<const MESH_DIM: usize>(
    simplices: &[SimplexCollection<MESH_DIM>],
    cell_dim: usize,
    cell_edges: &[usize],
    degenerate_cells: &fb::FixedBitSet,
) -> Vec<f64> {
    let edges_per_cell = local_edges(cell_dim).len();
    let mut cell_covolumes = vec![0.0; cell_edges.len()];

    // named parameters for the `traverse` function to keep them readable
    // (can't use a closure because closures can't be recursive)
    struct TraversalState<'a, const MESH_DIM: usize> {
        // dimension of the primal simplex whose facets we'll look at next
        curr_dim: usize,
        // index of the aforementioned simplex
        curr_simplex_idx: usize,
        // sign of the current elementary dual's volume
        curr_sign: f64,
        simplices: &'a [SimplexCollection<MESH_DIM>],
        // edges of the elementary dual simplex being processed
        edges: &'a mut Vec<na::SVector<f64, MESH_DIM>>,
        // circumcenter of the cell we started from
        root_vertex: &'a na::SVector<f64, MESH_DIM>,
        // global edges of the cell, in local slot order
        cell_edges: &'a [usize],
        // covolume accumulators for the same slots
        cell_covolumes: &'a mut [f64],
    }

    fn traverse<const MESH_DIM: usize>(s: TraversalState<'_, MESH_DIM>) {
        if s.curr_dim == 1 {
            // arrived at a primal edge,
            // the elementary dual spanned so far is a piece of its covolume
            let vol = spanned_volume(s.edges.as_slice());
            if let Some(slot) = s.cell_edges.iter().position(|&e| e == s.curr_simplex_idx) {
                s.cell_covolumes[slot] += vol.copysign(s.curr_sign);
            }
            return;
        }

        let curr_simplices = &s.simplices[s.curr_dim];
        let facets = curr_simplices.simplex_facets(s.curr_simplex_idx);
        let bary = curr_simplices.simplex_bary(s.curr_simplex_idx);
        // facet k is opposite vertex k,
        // so the barycentric coordinates line up with the facets
        for (&facet_idx, &opposite_bary) in izip!(facets, bary) {
            let facet_center = s.simplices[s.curr_dim - 1].circumcenters[facet_idx];
            s.edges.push(facet_center - s.root_vertex);

            traverse(TraversalState {
                curr_dim: s.curr_dim - 1,
                curr_simplex_idx: facet_idx,
                curr_sign: s.curr_sign * opposite_bary.signum(),
                simplices: s.simplices,
                edges: s.edges,
                root_vertex: s.root_vertex,
                cell_edges: s.cell_edges,
                cell_covolumes: s.cell_covolumes,
            });

            s.edges.pop();
        }
    }

    let mut edges: Vec<na::SVector<f64, MESH_DIM>> = Vec::with_capacity(cell_dim);
    for cell_idx in 0..simplices[cell_dim].len() {
        if degenerate_cells.contains(cell_idx) {
            continue;
        }
        let slots = cell_idx * edges_per_cell..(cell_idx + 1) * edges_per_cell;
        edges.clear();
        traverse(TraversalState {
            curr_dim: cell_dim,
            curr_simplex_idx: cell_idx,
            curr_sign: 1.0,
            simplices,
            edges: &mut edges,
            root_vertex: &simplices[cell_dim].circumcenters[cell_idx],
            cell_edges: &cell_edges[slots.clone()],
            cell_covolumes: &mut cell_covolumes[slots],
        });
    }

    cell_covolumes
}

/// Covolume contributions of each cell to each of its edges
/// from the per-cell coefficients α satisfying
/// `|T| ‖u‖² = Σ αᵢ ⟨u, eᵢ⟩²` for every vector u in the cell's affine hull.
/// The coefficient is the covolume-to-length ratio,
/// so it is scaled by the edge length on the way out.
///
/// The system has the unique solution `α_ab = -|T| ∇φ_a · ∇φ_b`
/// in terms of the gradients of the linear hat functions of the cell,
/// which stays accurate on thin cells where
/// solving the system with coefficients `⟨eᵢ, eⱼ⟩²` would not.
fn algebraic_covolumes<const MESH_DIM: usize>(
    vertices: &[na::SVector<f64, MESH_DIM>],
    cells: &SimplexCollection<MESH_DIM>,
    cell_dim: usize,
    degenerate_cells: &mut fb::FixedBitSet,
) -> Vec<f64> {
    let local_edge_pairs = local_edges(cell_dim);
    let edge_count = local_edge_pairs.len();
    let mut cell_covolumes = vec![0.0; cells.len() * edge_count];

    let mut edge_mat = na::DMatrix::zeros(MESH_DIM, cell_dim);
    let mut grads = na::DMatrix::zeros(cell_dim + 1, MESH_DIM);

    for (cell_idx, (cell, &vol)) in izip!(
        cells.indices.chunks_exact(cells.simplex_size),
        &cells.volumes
    )
    .enumerate()
    {
        if degenerate_cells.contains(cell_idx) {
            continue;
        }
        let origin = vertices[cell[0]];
        for (col, &v) in cell[1..].iter().enumerate() {
            edge_mat.set_column(col, &(vertices[v] - origin));
        }

        // gradients of the hat functions of vertices 1..=d are the rows
        // of the pseudoinverse R⁻¹ Qᵀ of the edge matrix
        let qr = edge_mat.clone().qr();
        let Some(pinv) = qr.r().solve_upper_triangular(&qr.q().transpose()) else {
            log::warn!("singular covolume system in cell {cell_idx}, skipping its covolumes");
            degenerate_cells.insert(cell_idx);
            continue;
        };
        grads.rows_mut(1, cell_dim).copy_from(&pinv);
        let origin_grad = -pinv.row_sum();
        grads.row_mut(0).copy_from(&origin_grad);

        for (slot, [a, b]) in local_edge_pairs.iter().enumerate() {
            let alpha = -vol * grads.row(*a).dot(&grads.row(*b));
            let length = (vertices[cell[*b]] - vertices[cell[*a]]).magnitude();
            cell_covolumes[cell_idx * edge_count + slot] = alpha * length;
        }
    }

    cell_covolumes
}

/// Unsigned volume of the simplex spanned by the given edge vectors
/// from a common vertex.
///
/// Computed from the QR factorization of the edge matrix,
/// which keeps precision on thin simplices.
fn spanned_volume<const MESH_DIM: usize>(edges: &[na::SVector<f64, MESH_DIM>]) -> f64 {
    let edge_count = edges.len();
    if edge_count == 1 {
        return edges[0].magnitude();
    }
    let factorial: usize = (1..=edge_count).product();
    let edge_mat = na::DMatrix::from_fn(MESH_DIM, edge_count, |row, col| edges[col][row]);
    let r_diag_product: f64 = edge_mat.qr().r().diagonal().iter().product();
    r_diag_product.abs() / factorial as f64
}

/// Relative tolerance for the Delaunay check.
const DELAUNAY_TOLERANCE: f64 = 1e-12;

/// Count the facets shared by two cells
/// and those among them where the segment between the cell circumcenters
/// points the wrong way relative to the first cell's opposite vertex.
fn count_delaunay_violations<const MESH_DIM: usize>(
    vertices: &[na::SVector<f64, MESH_DIM>],
    simplices: &[SimplexCollection<MESH_DIM>],
    cell_dim: usize,
) -> (usize, usize) {
    let cells = &simplices[cell_dim];
    let facets = &simplices[cell_dim - 1];
    let mut interior = 0;
    let mut violations = 0;
    for (facet_idx, coboundary) in facets.coboundary_map.row_iter().enumerate() {
        let ([cell_0, cell_1], [slot_0, _]) = (coboundary.col_indices(), coboundary.values())
        else {
            continue;
        };
        interior += 1;

        let opposite = vertices[cells.simplex_indices(*cell_0)[*slot_0 as usize]];
        // any point on the facet works here,
        // since the circumcenters lie on a line orthogonal to it
        let facet_point = facets.circumcenters[facet_idx];
        let to_facet = facet_point - opposite;
        let center_step = cells.circumcenters[*cell_1] - cells.circumcenters[*cell_0];
        // cells sharing a circumsphere have the same circumcenter up to rounding,
        // which must not count as a violation
        if to_facet.dot(&center_step) < -DELAUNAY_TOLERANCE * to_facet.norm_squared() {
            violations += 1;
        }
    }
    (interior, violations)
}

//
// tests
//

type Vec2 = na::SVector<f64, 2>;
type Vec3 = na::SVector<f64, 3>;

/// A small hexagon-shaped 2D mesh for testing basic functionality.
/// Shaped somewhat like this:
///    ____
///   /\  /\
///  /__\/__\
///  \  /\  /
///   \/__\/
///
/// with vertices and triangles ordered left to right, top to bottom.
///
/// This is public for visibility in other modules' tests.
/// It is not meant to be used by users and thus hidden from docs.
#[doc(hidden)]
pub fn tiny_mesh_2d() -> SimplicialMesh<2> {
    let vertices = vec![
        Vec2::new(-0.5, 1.0),
        Vec2::new(0.5, 1.0),
        Vec2::new(-1.0, 0.0),
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(-0.5, -1.0),
        Vec2::new(0.5, -1.0),
    ];
    #[rustfmt::skip]
    let indices = vec![
        0, 2, 3,
        0, 1, 3,
        1, 3, 4,
        2, 3, 5,
        3, 5, 6,
        3, 4, 6,
    ];
    SimplicialMesh::new(vertices, indices, 2).expect("tiny 2d mesh is valid")
}

/// A small 3D mesh for testing basic functionality.
/// Four tetrahedra arranged into a diamond shape,
/// split like this down the x,y plane:
///
///    /\
///   /__\
///   \  /
///    \/
///
/// and with a single point both up and down the z-axis.
///
/// This is public for visibility in other modules' tests.
/// It is not meant to be used by users and thus hidden from docs.
#[doc(hidden)]
pub fn tiny_mesh_3d() -> SimplicialMesh<3> {
    let vertices = vec![
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(-0.5, 0.0, 0.0),
        Vec3::new(0.5, 0.0, 0.0),
        Vec3::new(0.0, -1.0, 0.0),
        Vec3::new(0.0, 0.0, -1.0),
        Vec3::new(0.0, 0.0, 1.0),
    ];
    #[rustfmt::skip]
    let indices = vec![
        0, 1, 2, 4,
        0, 1, 2, 5,
        1, 2, 3, 4,
        1, 2, 3, 5,
    ];
    SimplicialMesh::new(vertices, indices, 3).expect("tiny 3d mesh is valid")
}
