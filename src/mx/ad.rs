//! Graph-level forward and reverse sweeps.
//!
//! Both sweeps walk the topologically sorted graph once and call each
//! node's `ad_forward`/`ad_reverse` for all directions at a time. Tangents
//! and adjoints are projected onto the pattern of the node they belong to
//! at every step, so downstream nodes only ever see seeds that fit.

use std::collections::HashMap;

use log::trace;

use crate::error::{Error, Result};

use super::{topo_sort, Mx};

fn check_seeds(op: &'static str, targets: &[Mx], seeds: &[Vec<Mx>]) -> Result<()> {
    for dir in seeds {
        if dir.len() != targets.len() {
            return Err(Error::dimension(
                op,
                format!("{} seeds per direction, expected {}", dir.len(), targets.len()),
            ));
        }
        for (s, t) in dir.iter().zip(targets) {
            if s.shape() != t.shape() {
                return Err(Error::dimension(
                    op,
                    format!(
                        "seed {} for {}",
                        s.sparsity().dim_string(),
                        t.sparsity().dim_string()
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn check_shape(op: &'static str, got: &Mx, expected: &Mx) -> Result<()> {
    if cfg!(debug_assertions) && got.shape() != expected.shape() {
        return Err(Error::AdjointInconsistency {
            op,
            detail: format!(
                "produced {} for a {} operand",
                got.sparsity().dim_string(),
                expected.sparsity().dim_string()
            ),
        });
    }
    Ok(())
}

/// Forward-mode directional derivatives of `outputs` with respect to
/// `inputs`. `fseeds[d][i]` seeds input `i` in direction `d`; the result is
/// indexed `[d][o]`.
pub fn forward(outputs: &[Mx], inputs: &[Mx], fseeds: &[Vec<Mx>]) -> Result<Vec<Vec<Mx>>> {
    check_seeds("forward", inputs, fseeds)?;
    let nfwd = fseeds.len();
    if nfwd == 0 {
        return Ok(Vec::new());
    }
    let order = topo_sort(outputs);
    trace!("forward sweep over {} nodes, {} directions", order.len(), nfwd);

    let mut tangent: HashMap<usize, Vec<Mx>> = HashMap::with_capacity(order.len());
    for (i, input) in inputs.iter().enumerate() {
        let t = fseeds
            .iter()
            .map(|dir| dir[i].project(input.sparsity()))
            .collect::<Result<Vec<_>>>()?;
        tangent.insert(input.key(), t);
    }

    for node in &order {
        if tangent.contains_key(&node.key()) {
            continue;
        }
        let seeds: Vec<Vec<Mx>> = (0..nfwd)
            .map(|d| {
                node.deps()
                    .iter()
                    .map(|dep| match tangent.get(&dep.key()) {
                        Some(t) => t[d].clone(),
                        None => Mx::zeros(dep.nrow(), dep.ncol()),
                    })
                    .collect()
            })
            .collect();
        let fsens = node.op().contract().ad_forward(node, &seeds)?;
        let mut projected = Vec::with_capacity(nfwd);
        for t in &fsens {
            check_shape("forward", t, node)?;
            projected.push(t.project(node.sparsity())?);
        }
        tangent.insert(node.key(), projected);
    }

    (0..nfwd)
        .map(|d| {
            Ok(outputs
                .iter()
                .map(|o| match tangent.get(&o.key()) {
                    Some(t) => t[d].clone(),
                    None => Mx::zeros(o.nrow(), o.ncol()),
                })
                .collect())
        })
        .collect()
}

/// Reverse-mode adjoint sensitivities. `aseeds[d][o]` seeds output `o` in
/// direction `d`; the result is indexed `[d][i]` over `inputs`.
pub fn reverse(outputs: &[Mx], inputs: &[Mx], aseeds: &[Vec<Mx>]) -> Result<Vec<Vec<Mx>>> {
    check_seeds("reverse", outputs, aseeds)?;
    let nadj = aseeds.len();
    if nadj == 0 {
        return Ok(Vec::new());
    }
    let order = topo_sort(outputs);
    trace!("reverse sweep over {} nodes, {} directions", order.len(), nadj);

    let mut adjoint: HashMap<usize, Vec<Mx>> = HashMap::with_capacity(order.len());
    let accumulate = |adjoint: &mut HashMap<usize, Vec<Mx>>, target: &Mx, d: usize, c: Mx| -> Result<()> {
        let c = c.project(target.sparsity())?;
        let slot = adjoint
            .entry(target.key())
            .or_insert_with(|| vec![Mx::zeros(target.nrow(), target.ncol()); nadj]);
        slot[d] = slot[d].add(&c)?;
        Ok(())
    };

    for (d, dir) in aseeds.iter().enumerate() {
        for (o, seed) in outputs.iter().zip(dir) {
            accumulate(&mut adjoint, o, d, seed.clone())?;
        }
    }

    for node in order.iter().rev() {
        if node.n_dep() == 0 {
            continue;
        }
        let seeds = match adjoint.get(&node.key()) {
            Some(s) if !s.iter().all(Mx::is_structural_zero) => s
                .iter()
                .map(|s| s.project(node.sparsity()))
                .collect::<Result<Vec<_>>>()?,
            _ => continue,
        };
        let asens = node.op().contract().ad_reverse(node, &seeds)?;
        if cfg!(debug_assertions) && asens.len() != nadj {
            return Err(Error::AdjointInconsistency {
                op: "reverse",
                detail: format!("{} directions returned, expected {}", asens.len(), nadj),
            });
        }
        for (d, contributions) in asens.into_iter().enumerate() {
            if cfg!(debug_assertions) && contributions.len() != node.n_dep() {
                return Err(Error::AdjointInconsistency {
                    op: "reverse",
                    detail: format!(
                        "{} contributions for a node with {} dependencies",
                        contributions.len(),
                        node.n_dep()
                    ),
                });
            }
            for (dep, c) in node.deps().iter().zip(contributions) {
                check_shape("reverse", &c, dep)?;
                if c.is_structural_zero() {
                    continue;
                }
                accumulate(&mut adjoint, dep, d, c)?;
            }
        }
    }

    (0..nadj)
        .map(|d| {
            inputs
                .iter()
                .map(|i| match adjoint.get(&i.key()) {
                    Some(a) => a[d].project(i.sparsity()),
                    None => Ok(Mx::zeros(i.nrow(), i.ncol())),
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparsity::Sparsity;

    #[test]
    fn forward_of_sum_is_sum_of_seeds() {
        let x = Mx::sym_dense("x", 2, 1);
        let y = Mx::sym_dense("y", 2, 1);
        let f = x.add(&y).unwrap();
        let dx = Mx::sym_dense("dx", 2, 1);
        let dy = Mx::sym_dense("dy", 2, 1);
        let t = forward(&[f], &[x, y], &[vec![dx, dy]]).unwrap();
        assert_eq!(t[0][0].to_string(), "(dx+dy)");
    }

    #[test]
    fn reverse_of_unused_input_is_zero() {
        let x = Mx::sym_dense("x", 2, 1);
        let y = Mx::sym_dense("y", 3, 1);
        let s = Mx::sym_dense("s", 2, 1);
        let a = reverse(&[x.clone()], &[x, y], &[vec![s.clone()]]).unwrap();
        assert!(a[0][0].ptr_eq(&s));
        assert!(a[0][1].is_structural_zero());
        assert_eq!(a[0][1].shape(), (3, 1));
    }

    #[test]
    fn seed_shape_is_checked() {
        let x = Mx::sym(String::from("x"), Sparsity::column(2));
        let bad = Mx::sym_dense("s", 3, 1);
        assert!(matches!(
            forward(&[x.clone()], &[x], &[vec![bad]]),
            Err(Error::DimensionMismatch { .. })
        ));
    }
}
