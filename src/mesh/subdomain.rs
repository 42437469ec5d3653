//! Selecting the parts of a mesh that kernels and boundary conditions act on.

use fixedbitset as fb;
use itertools::Either;
use nalgebra as na;

use std::{fmt, rc::Rc};

use super::SimplicialMesh;

/// A geometric region of a mesh, defined by a predicate on points.
///
/// Masks computed for a subdomain are cached by the mesh under its [`name`][Self::name],
/// so two different subdomains used with the same mesh must have different names.
pub trait Subdomain<const DIM: usize> {
    /// Identity of the subdomain for caching purposes.
    fn name(&self) -> &str;
    /// Whether a point is inside the subdomain.
    fn is_inside(&self, point: &na::SVector<f64, DIM>) -> bool;
    /// If true, only vertices on the boundary of the mesh are considered
    /// as candidates for being inside.
    fn is_boundary_only(&self) -> bool {
        false
    }
}

/// The entire boundary of the mesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Boundary;

impl<const DIM: usize> Subdomain<DIM> for Boundary {
    fn name(&self) -> &str {
        "boundary"
    }

    fn is_inside(&self, _point: &na::SVector<f64, DIM>) -> bool {
        true
    }

    fn is_boundary_only(&self) -> bool {
        true
    }
}

/// The region a kernel or boundary condition applies to.
#[derive(Clone)]
pub enum Region<const DIM: usize> {
    /// The whole mesh.
    Everywhere,
    Subdomain(Rc<dyn Subdomain<DIM>>),
}

impl<const DIM: usize> Region<DIM> {
    pub fn new(subdomain: impl Subdomain<DIM> + 'static) -> Self {
        Self::Subdomain(Rc::new(subdomain))
    }

    /// The entire boundary of the mesh.
    pub fn boundary() -> Self {
        Self::new(Boundary)
    }

    /// Name of the region, `"everywhere"` for the whole mesh.
    pub fn name(&self) -> &str {
        match self {
            Self::Everywhere => "everywhere",
            Self::Subdomain(subdomain) => subdomain.name(),
        }
    }
}

impl<const DIM: usize> Default for Region<DIM> {
    fn default() -> Self {
        Self::Everywhere
    }
}

impl<const DIM: usize> fmt::Debug for Region<DIM> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Everywhere => write!(f, "Everywhere"),
            Self::Subdomain(subdomain) => f.debug_tuple("Subdomain").field(&subdomain.name()).finish(),
        }
    }
}

/// Kind of mesh entity a mask selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Vertex,
    Cell,
    /// The facets of cells, i.e. edges in a triangle mesh
    /// and triangles in a tetrahedral mesh.
    Face,
}

/// A selection of mesh entities of one kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mask {
    /// Every entity, without materializing the indices.
    All,
    /// The entities whose indices are in the set.
    Indices(Rc<fb::FixedBitSet>),
}

impl Mask {
    /// Whether the entity with the given index is selected.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        match self {
            Self::All => true,
            Self::Indices(set) => set.contains(index),
        }
    }

    /// Iterate over the selected indices in ascending order,
    /// given the total number of entities of this kind.
    pub fn indices(&self, entity_count: usize) -> impl '_ + Iterator<Item = usize> {
        match self {
            Self::All => Either::Left(0..entity_count),
            Self::Indices(set) => Either::Right(set.ones().take_while(move |&i| i < entity_count)),
        }
    }

    /// Number of selected entities.
    pub fn count(&self, entity_count: usize) -> usize {
        match self {
            Self::All => entity_count,
            Self::Indices(set) => set.count_ones(..entity_count.min(set.len())),
        }
    }
}

impl<const MESH_DIM: usize> SimplicialMesh<MESH_DIM> {
    /// Get the mask of entities of the given kind inside a region.
    ///
    /// A vertex is inside a subdomain if the subdomain's predicate holds at it
    /// (and it is on the mesh boundary, for boundary-only subdomains).
    /// Cells and faces are inside if all of their vertices are.
    /// Boundary-only subdomains contain no cells,
    /// and only faces on the mesh boundary.
    ///
    /// Results are cached by subdomain name for the lifetime of the mesh.
    pub fn mask_for(&self, region: &Region<MESH_DIM>, on: EntityKind) -> Mask {
        let subdomain = match region {
            Region::Everywhere => return Mask::All,
            Region::Subdomain(subdomain) => subdomain,
        };

        let key = (subdomain.name().to_string(), on);
        let cached = self.subdomain_masks.borrow().get(&key).cloned();
        if let Some(set) = cached {
            return Mask::Indices(set);
        }

        let set = Rc::new(match on {
            EntityKind::Vertex => self.vertices_inside(subdomain.as_ref()),
            EntityKind::Cell if subdomain.is_boundary_only() => {
                fb::FixedBitSet::with_capacity(self.cell_count())
            }
            EntityKind::Cell => {
                let vertices = self.mask_for(region, EntityKind::Vertex);
                self.simplices_inside(self.cell_dim, &vertices, None)
            }
            EntityKind::Face => {
                let vertices = self.mask_for(region, EntityKind::Vertex);
                let boundary = subdomain
                    .is_boundary_only()
                    .then(|| self.boundary_facets());
                self.simplices_inside(self.facet_dim(), &vertices, boundary)
            }
        });
        log::debug!(
            "subdomain `{}` contains {} of {} {on:?} entities",
            subdomain.name(),
            set.count_ones(..),
            set.len(),
        );

        self.subdomain_masks.borrow_mut().insert(key, set.clone());
        Mask::Indices(set)
    }

    fn vertices_inside(&self, subdomain: &dyn Subdomain<MESH_DIM>) -> fb::FixedBitSet {
        let mut set = fb::FixedBitSet::with_capacity(self.vertex_count());
        let inside = |v: &usize| subdomain.is_inside(&self.vertices[*v]);
        if subdomain.is_boundary_only() {
            set.extend(self.boundary_vertices().ones().filter(inside));
        } else {
            set.extend((0..self.vertex_count()).filter(inside));
        }
        set
    }

    fn simplices_inside(
        &self,
        dim: usize,
        vertices: &Mask,
        restrict_to: Option<&fb::FixedBitSet>,
    ) -> fb::FixedBitSet {
        let mut set = fb::FixedBitSet::with_capacity(self.simplex_count(dim));
        for (simplex_idx, simplex) in self.indices(dim).enumerate() {
            let allowed = restrict_to.map_or(true, |r| r.contains(simplex_idx));
            if allowed && simplex.iter().all(|&v| vertices.contains(v)) {
                set.insert(simplex_idx);
            }
        }
        set
    }
}
