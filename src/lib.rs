//! Finite volume discretization on simplicial meshes.
//!
//! A [`SimplicialMesh`] of triangles or tetrahedra computes the circumcentric dual
//! geometry needed by the finite volume method:
//! edge covolumes, their ratios to edge lengths, and control volumes of vertices.
//! Physical terms are expressed as [kernels][kernel] acting on cell edges,
//! vertices, or facets, and the [`assembly`] and [`jacobian`] modules
//! sum their contributions into sparse systems with Dirichlet conditions applied.
//!
//! Solving the resulting systems is left to other crates.
//!
//! ```
//! use finvol::{
//!     assembly::LinearProblem,
//!     kernel::{builtin::*, Kernel},
//!     mesh::Region,
//!     SimplicialMesh, Vec2,
//! };
//!
//! let mesh = SimplicialMesh::from_triangles(
//!     vec![
//!         Vec2::new(0.0, 0.0),
//!         Vec2::new(1.0, 0.0),
//!         Vec2::new(1.0, 1.0),
//!         Vec2::new(0.0, 1.0),
//!     ],
//!     &[[0, 1, 2], [0, 2, 3]],
//! )
//! .unwrap();
//! // -Δu = 1 with u = 0 on the boundary
//! let system = LinearProblem::new()
//!     .with_kernel(Kernel::edge(Diffusion::new(1.0)))
//!     .with_kernel(Kernel::vertex(Source::new(|_| 1.0)))
//!     .with_dirichlet(Dirichlet::new(Region::boundary(), |_| 0.0))
//!     .assemble(&mesh)
//!     .unwrap();
//! assert_eq!(system.matrix.nrows(), 4);
//! ```

pub mod mesh;
#[doc(inline)]
pub use mesh::{CovolumeMode, MeshError, MeshOptions, SimplicialMesh};

pub mod kernel;
#[doc(inline)]
pub use kernel::{DirichletCondition, EdgeKernel, FaceKernel, Kernel, VertexKernel};

pub mod assembly;
#[doc(inline)]
pub use assembly::{assemble, AssemblyError, LinearProblem, LinearSystem};

pub mod jacobian;
#[doc(inline)]
pub use jacobian::{assemble_matrix, Jacobian, JacobianKernel};

pub mod operator;
#[doc(inline)]
pub use operator::{DiagonalOperator, MatrixOperator, Operator};

// nalgebra re-exports of common types for convenience

pub use nalgebra as na;
pub use nalgebra_sparse as nas;
/// Type alias for a 2D `nalgebra` vector.
pub type Vec2 = na::Vector2<f64>;
/// Type alias for a 3D `nalgebra` vector.
pub type Vec3 = na::Vector3<f64>;
