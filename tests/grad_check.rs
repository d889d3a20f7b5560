//! Property tests from spec §8: JVP matches finite differences, VJP/JVP
//! agree over the identity seed, and HVP is symmetric under two random
//! tangent directions. Each property is checked across a handful of graph
//! shapes spanning the unary/binary/n-ary/softmax/max rule families.

use adcore::autograd::check::{numerical_hvp, DEFAULT_EPS};
use adcore::{Graph, GraphResult, NodeId};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type Build = dyn Fn(&mut Graph, &[NodeId]) -> GraphResult<NodeId>;

fn graphs() -> Vec<(Vec<f64>, Box<Build>)> {
    vec![
        (
            vec![0.8],
            Box::new(|g: &mut Graph, ids: &[NodeId]| g.sin(ids[0])),
        ),
        (
            vec![1.3, -0.4],
            Box::new(|g: &mut Graph, ids: &[NodeId]| {
                let d = g.div(ids[0], ids[1])?;
                g.tanh(d)
            }),
        ),
        (
            vec![2.0, 3.0, 5.0],
            Box::new(|g: &mut Graph, ids: &[NodeId]| g.mul(ids)),
        ),
        (
            vec![1.0, 2.0, 3.0],
            Box::new(|g: &mut Graph, ids: &[NodeId]| g.softmax(ids)),
        ),
        (
            vec![0.4, 1.7],
            Box::new(|g: &mut Graph, ids: &[NodeId]| {
                let m = g.max(ids[0], ids[1])?;
                g.silu(m)
            }),
        ),
    ]
}

#[test]
fn forward_jvp_matches_finite_difference_directional_derivative() {
    const H: f64 = 1e-5;
    for (xs, build) in graphs() {
        let dirs: Vec<f64> = xs.iter().map(|x| 0.37 + 0.21 * x).collect();

        let eval = |perturbed: &[f64]| -> f64 {
            let mut g = Graph::new();
            let ids: Vec<NodeId> = perturbed.iter().map(|&x| g.var(x)).collect();
            let out = build(&mut g, &ids).unwrap();
            let order = g.topo_order(out);
            g.forward(&order);
            g.value(out)
        };

        let plus: Vec<f64> = xs.iter().zip(&dirs).map(|(x, d)| x + H * d).collect();
        let minus: Vec<f64> = xs.iter().zip(&dirs).map(|(x, d)| x - H * d).collect();
        let fd = (eval(&plus) - eval(&minus)) / (2.0 * H);

        let mut g = Graph::new();
        let ids: Vec<NodeId> = xs.iter().map(|&x| g.var(x)).collect();
        for (&id, &d) in ids.iter().zip(&dirs) {
            g.set_dot(id, d);
        }
        let out = build(&mut g, &ids).unwrap();
        let order = g.topo_order(out);
        g.forward(&order);
        g.forward_dot(&order);

        assert!(
            (g.dot(out) - fd).abs() < 1e-6,
            "jvp {} vs fd {} for xs={:?}",
            g.dot(out),
            fd,
            xs
        );
    }
}

#[test]
fn reverse_vjp_matches_forward_jvp_over_identity_seed() {
    for (xs, build) in graphs() {
        let dirs: Vec<f64> = xs.iter().map(|x| 0.6 - 0.15 * x).collect();

        let mut g = Graph::new();
        let ids: Vec<NodeId> = xs.iter().map(|&x| g.var(x)).collect();
        for (&id, &d) in ids.iter().zip(&dirs) {
            g.set_dot(id, d);
        }
        let out = build(&mut g, &ids).unwrap();
        let order = g.topo_order(out);
        g.forward(&order);
        g.forward_dot(&order);
        let forward_dot = g.dot(out);

        let rev = g.reverse_topo_order(out);
        g.backward(&rev, &[(out, 1.0)]);
        let vjp_dot: f64 = ids
            .iter()
            .zip(&dirs)
            .map(|(&id, &d)| g.gradient(id) * d)
            .sum();

        assert!(
            (vjp_dot - forward_dot).abs() < 1e-9,
            "sum(gradient*xdot) {} vs forward dot {} for xs={:?}",
            vjp_dot,
            forward_dot,
            xs
        );
    }
}

#[test]
fn hvp_is_symmetric_under_swapped_random_tangent_directions() {
    let mut rng = StdRng::seed_from_u64(7);
    for (xs, build) in graphs() {
        let n = xs.len();
        let u: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let v: Vec<f64> = (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let hvp = |tangent: &[f64]| -> Vec<f64> {
            let mut g = Graph::new();
            let ids: Vec<NodeId> = xs.iter().map(|&x| g.var(x)).collect();
            for (&id, &d) in ids.iter().zip(tangent) {
                g.set_dot(id, d);
            }
            let out = build(&mut g, &ids).unwrap();
            let order = g.topo_order(out);
            g.forward(&order);
            g.forward_dot(&order);
            let rev = g.reverse_topo_order(out);
            g.hvp_backward(&rev, &[(out, 1.0)], &[(out, 0.0)]);
            ids.iter().map(|&id| g.grad_dot(id)).collect()
        };

        let hv = hvp(&v);
        let hu = hvp(&u);

        let u_t_hv: f64 = u.iter().zip(&hv).map(|(a, b)| a * b).sum();
        let v_t_hu: f64 = v.iter().zip(&hu).map(|(a, b)| a * b).sum();

        assert!(
            (u_t_hv - v_t_hu).abs() < 1e-6,
            "u^T(Hv) {} vs v^T(Hu) {} for xs={:?}",
            u_t_hv,
            v_t_hu,
            xs
        );
    }
}

#[test]
fn analytic_hvp_agrees_with_finite_difference_hvp() {
    for (xs, build) in graphs() {
        let n = xs.len();
        let v: Vec<f64> = (0..n).map(|i| 0.5 + 0.1 * i as f64).collect();

        let mut g = Graph::new();
        let ids: Vec<NodeId> = xs.iter().map(|&x| g.var(x)).collect();
        for (&id, &d) in ids.iter().zip(&v) {
            g.set_dot(id, d);
        }
        let out = build(&mut g, &ids).unwrap();
        let order = g.topo_order(out);
        g.forward(&order);
        g.forward_dot(&order);
        let rev = g.reverse_topo_order(out);
        g.hvp_backward(&rev, &[(out, 1.0)], &[(out, 0.0)]);
        let analytic: Vec<f64> = ids.iter().map(|&id| g.grad_dot(id)).collect();

        let numeric = numerical_hvp(&xs, &v, &build, DEFAULT_EPS * 10.0).unwrap();
        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert!((a - n).abs() < 1e-2, "analytic {a} vs numeric {n} for xs={xs:?}");
        }
    }
}
