//! Solving small Poisson problems end to end with a dense solver.

use approx::relative_eq;
use finvol::{
    assembly::LinearProblem,
    kernel::{builtin::*, Kernel},
    mesh::{tiny_mesh_2d, Region},
    na, LinearSystem, SimplicialMesh, Vec2, Vec3,
};

fn solve(system: &LinearSystem) -> na::DVector<f64> {
    na::DMatrix::from(&system.matrix)
        .lu()
        .solve(&system.rhs)
        .expect("system should be nonsingular")
}

/// An octahedron with a vertex in the middle,
/// split into eight tetrahedra around it.
fn octahedron() -> SimplicialMesh<3> {
    let vertices = vec![
        Vec3::zeros(),
        Vec3::x(),
        -Vec3::x(),
        Vec3::y(),
        -Vec3::y(),
        Vec3::z(),
        -Vec3::z(),
    ];
    let mut tets = Vec::new();
    for x in [1, 2] {
        for y in [3, 4] {
            for z in [5, 6] {
                tets.push([0, x, y, z]);
            }
        }
    }
    SimplicialMesh::from_tetrahedra(vertices, &tets).expect("octahedron is valid")
}

/// A square split into a regular grid of right triangles.
fn square_grid(n: usize) -> SimplicialMesh<2> {
    let h = 1.0 / n as f64;
    let vertices: Vec<Vec2> = (0..=n)
        .flat_map(|j| (0..=n).map(move |i| Vec2::new(i as f64 * h, j as f64 * h)))
        .collect();
    let idx = |i: usize, j: usize| j * (n + 1) + i;
    let mut triangles = Vec::new();
    for j in 0..n {
        for i in 0..n {
            triangles.push([idx(i, j), idx(i + 1, j), idx(i + 1, j + 1)]);
            triangles.push([idx(i, j), idx(i + 1, j + 1), idx(i, j + 1)]);
        }
    }
    SimplicialMesh::from_triangles(vertices, &triangles).expect("grid is valid")
}

#[test]
fn laplace_reproduces_affine_boundary_data_in_2d() {
    let mesh = tiny_mesh_2d();
    let g = |x: &Vec2| 1.0 + 2.0 * x.x - 3.0 * x.y;
    let system = LinearProblem::new()
        .with_kernel(Kernel::edge(Diffusion::new(1.0)))
        .with_dirichlet(Dirichlet::new(Region::boundary(), g))
        .assemble(&mesh)
        .unwrap();

    for v in mesh.boundary_vertices().ones() {
        let row = system.matrix.row(v);
        assert_eq!(row.col_indices(), &[v]);
    }

    let u = solve(&system);
    for (v, x) in mesh.vertices.iter().enumerate() {
        assert!(relative_eq!(u[v], g(x), epsilon = 1e-12), "vertex {v}");
    }
}

#[test]
fn laplace_reproduces_affine_boundary_data_in_3d() {
    let mesh = octahedron();
    assert_eq!(mesh.boundary_vertices().count_ones(..), 6);
    let total: f64 = mesh.cell_volumes().iter().sum();
    assert!(relative_eq!(total, 4.0 / 3.0));

    let g = |x: &Vec3| 0.5 - x.x + 2.0 * x.y + 0.25 * x.z;
    let system = LinearProblem::new()
        .with_kernel(Kernel::edge(Diffusion::new(3.0)))
        .with_dirichlet(Dirichlet::new(Region::boundary(), g))
        .assemble(&mesh)
        .unwrap();

    let u = solve(&system);
    for (v, x) in mesh.vertices.iter().enumerate() {
        assert!(relative_eq!(u[v], g(x), epsilon = 1e-12), "vertex {v}");
    }
}

#[test]
fn poisson_converges_on_a_grid() {
    // -Δu = f with the exact solution u = sin(πx) sin(πy)
    let pi = std::f64::consts::PI;
    let exact = move |x: &Vec2| (pi * x.x).sin() * (pi * x.y).sin();
    let f = move |x: &Vec2| 2.0 * pi * pi * exact(x);

    let max_error = |n: usize| {
        let mesh = square_grid(n);
        let system = LinearProblem::new()
            .with_kernel(Kernel::edge(Diffusion::new(1.0)))
            .with_kernel(Kernel::vertex(Source::new(f)))
            .with_dirichlet(Dirichlet::new(Region::boundary(), |_: &Vec2| 0.0))
            .assemble(&mesh)
            .unwrap();
        let u = solve(&system);
        mesh.vertices
            .iter()
            .enumerate()
            .map(|(v, x)| (u[v] - exact(x)).abs())
            .fold(0.0, f64::max)
    };

    let coarse = max_error(4);
    let fine = max_error(8);
    assert!(fine < 0.05, "error {fine} too large");
    // second order convergence
    assert!(coarse / fine > 3.0, "errors {coarse} -> {fine}");
}

#[test]
fn robin_boundary_fixes_the_constant() {
    // the flux vanishes on constants, so the solution is the constant
    // that makes a u + g vanish on the boundary
    let mesh = tiny_mesh_2d();
    let system = LinearProblem::new()
        .with_kernel(Kernel::edge(Diffusion::new(1.0)))
        .with_kernel(Kernel::face(BoundaryTerm::new(2.0, |_: &Vec2| -4.0)))
        .assemble(&mesh)
        .unwrap();

    let u = solve(&system);
    for v in 0..mesh.vertex_count() {
        assert!(relative_eq!(u[v], 2.0, epsilon = 1e-12));
    }
}
