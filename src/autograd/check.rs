//! Numerical gradient/Hessian check: finite difference vs autograd, used to
//! verify the rule table's first- and second-order partials against the
//! primal function each rule claims to differentiate (spec §8).

use crate::autograd::{Graph, GraphResult, NodeId};

/// Epsilon for first-order central difference: `(f(x+eps) - f(x-eps)) / (2*eps)`.
pub const DEFAULT_EPS: f64 = 1e-5;

/// Epsilon for second-order central difference: `(f(x+eps) - 2f(x) + f(x-eps)) / eps^2`.
pub const DEFAULT_EPS2: f64 = 1e-4;

/// First-order central-difference derivative of a scalar function at `x`.
pub fn numerical_derivative(f: impl Fn(f64) -> f64, x: f64, eps: f64) -> f64 {
    (f(x + eps) - f(x - eps)) / (2.0 * eps)
}

/// Second-order central-difference derivative of a scalar function at `x`.
pub fn numerical_second_derivative(f: impl Fn(f64) -> f64, x: f64, eps: f64) -> f64 {
    (f(x + eps) - 2.0 * f(x) + f(x - eps)) / (eps * eps)
}

/// Build a graph with one `Var` per entry of `xs`, evaluate `build_output`
/// on those inputs, run `forward`, and return the output node's value.
/// Used as the inner evaluator for multi-input finite-difference checks.
fn eval_at(
    xs: &[f64],
    build_output: &impl Fn(&mut Graph, &[NodeId]) -> GraphResult<NodeId>,
) -> GraphResult<f64> {
    let mut g = Graph::new();
    let ids: Vec<NodeId> = xs.iter().map(|&x| g.var(x)).collect();
    let out = build_output(&mut g, &ids)?;
    let order = g.topo_order(out);
    g.forward(&order);
    Ok(g.value(out))
}

/// Numerical gradient of a scalar-output graph with respect to every input,
/// by perturbing one input at a time (spec §8, "Round-trip / laws").
pub fn numerical_gradient(
    xs: &[f64],
    build_output: &impl Fn(&mut Graph, &[NodeId]) -> GraphResult<NodeId>,
    eps: f64,
) -> GraphResult<Vec<f64>> {
    let mut grad = vec![0.0; xs.len()];
    for i in 0..xs.len() {
        let mut plus = xs.to_vec();
        let mut minus = xs.to_vec();
        plus[i] += eps;
        minus[i] -= eps;
        let fp = eval_at(&plus, build_output)?;
        let fm = eval_at(&minus, build_output)?;
        grad[i] = (fp - fm) / (2.0 * eps);
    }
    Ok(grad)
}

/// Build a graph over `xs`, run the full forward/backward pair seeded with
/// `gradient_output = 1`, and return the analytic gradient at every input
/// alongside the finite-difference gradient, asserting agreement within
/// `rtol`/`atol` (relative to the numerical value, floored at `1e-8`).
///
/// Mirrors the shape of a tensor-framework `check_gradients` harness, but
/// one scalar graph per call rather than one tensor per input.
pub fn check_gradients(
    xs: &[f64],
    build_output: &impl Fn(&mut Graph, &[NodeId]) -> GraphResult<NodeId>,
    eps: f64,
    rtol: f64,
    atol: f64,
) -> Result<(), String> {
    let mut g = Graph::new();
    let ids: Vec<NodeId> = xs.iter().map(|&x| g.var(x)).collect();
    let out = build_output(&mut g, &ids).map_err(|e| e.to_string())?;
    let order = g.topo_order(out);
    g.forward(&order);
    let rev = g.reverse_topo_order(out);
    g.backward(&rev, &[(out, 1.0)]);
    let analytic: Vec<f64> = ids.iter().map(|&id| g.gradient(id)).collect();

    let numeric = numerical_gradient(xs, build_output, eps).map_err(|e| e.to_string())?;

    for (i, (&a, &n)) in analytic.iter().zip(numeric.iter()).enumerate() {
        let diff = (a - n).abs();
        if diff > atol && diff > rtol * n.abs().max(1e-8) {
            return Err(format!(
                "input {i}: analytic gradient {a} vs numerical {n} (diff {diff})"
            ));
        }
    }
    Ok(())
}

/// Hessian-vector product `H . v` at `xs`, computed purely by finite
/// differences on the analytic *gradient* (central difference of
/// `gradient(x + eps*v)` against `gradient(x - eps*v)`), used to cross-check
/// `Graph::hvp_backward`'s `grad_dot` output without relying on it.
pub fn numerical_hvp(
    xs: &[f64],
    v: &[f64],
    build_output: &impl Fn(&mut Graph, &[NodeId]) -> GraphResult<NodeId>,
    eps: f64,
) -> GraphResult<Vec<f64>> {
    let grad_at = |xs: &[f64]| -> GraphResult<Vec<f64>> {
        let mut g = Graph::new();
        let ids: Vec<NodeId> = xs.iter().map(|&x| g.var(x)).collect();
        let out = build_output(&mut g, &ids)?;
        let order = g.topo_order(out);
        g.forward(&order);
        let rev = g.reverse_topo_order(out);
        g.backward(&rev, &[(out, 1.0)]);
        Ok(ids.iter().map(|&id| g.gradient(id)).collect())
    };
    let plus: Vec<f64> = xs.iter().zip(v).map(|(&x, &d)| x + eps * d).collect();
    let minus: Vec<f64> = xs.iter().zip(v).map(|(&x, &d)| x - eps * d).collect();
    let gp = grad_at(&plus)?;
    let gm = grad_at(&minus)?;
    Ok(gp
        .iter()
        .zip(gm.iter())
        .map(|(&p, &m)| (p - m) / (2.0 * eps))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numerical_derivative_matches_sin_cos() {
        let d = numerical_derivative(f64::sin, 0.7, DEFAULT_EPS);
        assert!((d - 0.7_f64.cos()).abs() < 1e-6);
    }

    #[test]
    fn numerical_second_derivative_matches_neg_sin() {
        let d2 = numerical_second_derivative(f64::sin, 0.7, DEFAULT_EPS2);
        assert!((d2 - (-0.7_f64.sin())).abs() < 1e-2);
    }

    #[test]
    fn check_gradients_passes_for_sin_times_exp() {
        let build = |g: &mut Graph, ids: &[NodeId]| -> GraphResult<NodeId> {
            let s = g.sin(ids[0])?;
            let e = g.exp(ids[1])?;
            g.mul(&[s, e])
        };
        check_gradients(&[0.6, -0.3], &build, DEFAULT_EPS, 1e-4, 1e-6).unwrap();
    }

    #[test]
    fn numerical_hvp_matches_analytic_for_quadratic_product() {
        let build = |g: &mut Graph, ids: &[NodeId]| -> GraphResult<NodeId> { g.mul(ids) };
        let xs = [2.0, 3.0];
        let v = [1.0, 0.0];

        let mut g = Graph::new();
        let vids: Vec<NodeId> = xs.iter().map(|&x| g.var(x)).collect();
        for (&id, &d) in vids.iter().zip(&v) {
            g.set_dot(id, d);
        }
        let out = build(&mut g, &vids).unwrap();
        let order = g.topo_order(out);
        g.forward(&order);
        g.forward_dot(&order);
        let rev = g.reverse_topo_order(out);
        g.hvp_backward(&rev, &[(out, 1.0)], &[(out, 0.0)]);
        let analytic: Vec<f64> = vids.iter().map(|&id| g.grad_dot(id)).collect();

        let numeric = numerical_hvp(&xs, &v, &build, 1e-4).unwrap();
        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert!((a - n).abs() < 1e-3, "analytic {a} vs numeric {n}");
        }
    }
}
