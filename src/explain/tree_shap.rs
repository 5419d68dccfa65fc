//! Exact path-dependent TreeSHAP
//!
//! Polynomial-time Shapley values for tree ensembles (Lundberg et al.,
//! "Consistent Individualized Feature Attribution for Tree Ensembles").
//! Missing features are handled through the training cover of each node,
//! so no background data is needed. Values satisfy local accuracy:
//! `expected_value[k] + sum_j phi[j][k] == ensemble output k`.

use super::budget::AttributionBudget;
use super::AttributionError;
use crate::training::{ScaledTree, TreeEnsemble, TreeNode};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

/// One entry of the unique feature path from the root
#[derive(Debug, Clone, Copy)]
struct PathElement {
    /// Model column, `None` for the root sentinel
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// Attributions of all rows, one `(rows, columns)` matrix per output
#[derive(Debug, Clone)]
pub(crate) struct TreeShapValues {
    pub values: Vec<Array2<f64>>,
    pub expected_value: Vec<f64>,
}

/// Explain every row of `x` (full model width)
pub(crate) fn explain(
    ensemble: &TreeEnsemble<'_>,
    x: ArrayView2<f64>,
    budget: &AttributionBudget,
) -> Result<TreeShapValues, AttributionError> {
    let n_outputs = ensemble.n_outputs;
    let n_cols = x.ncols();
    if ensemble.trees.is_empty() {
        return Err(AttributionError::Unsupported("ensemble has no trees".to_string()));
    }

    let expected_value = expected_value(ensemble)?;

    let rows: Vec<Vec<Vec<f64>>> = (0..x.nrows())
        .into_par_iter()
        .map(|i| {
            budget.check()?;
            let mut phi = vec![vec![0.0; n_outputs]; n_cols];
            for tree in &ensemble.trees {
                explain_tree(tree, x.row(i), &mut phi)?;
            }
            Ok(phi)
        })
        .collect::<Result<_, AttributionError>>()?;

    let mut values = vec![Array2::<f64>::zeros((x.nrows(), n_cols)); n_outputs];
    for (i, phi) in rows.iter().enumerate() {
        for (j, per_output) in phi.iter().enumerate() {
            for (k, v) in per_output.iter().enumerate() {
                values[k][[i, j]] = *v;
            }
        }
    }

    Ok(TreeShapValues {
        values,
        expected_value,
    })
}

/// Cover-weighted mean output of the ensemble
fn expected_value(ensemble: &TreeEnsemble<'_>) -> Result<Vec<f64>, AttributionError> {
    let mut expected = ensemble.base_value.clone();
    for tree in &ensemble.trees {
        let tree_mean = node_expectation(tree.root)?;
        for (e, v) in expected.iter_mut().zip(tree_mean) {
            *e += tree.scale * v;
        }
    }
    Ok(expected)
}

fn node_expectation(node: &TreeNode) -> Result<Vec<f64>, AttributionError> {
    match node {
        TreeNode::Leaf { value, .. } => Ok(value.clone()),
        TreeNode::Split { left, right, n_samples, .. } => {
            let total = cover(*n_samples)?;
            let wl = left.n_samples() as f64 / total;
            let wr = right.n_samples() as f64 / total;
            let l = node_expectation(left)?;
            let r = node_expectation(right)?;
            Ok(l.iter().zip(&r).map(|(a, b)| wl * a + wr * b).collect())
        }
    }
}

fn cover(n_samples: usize) -> Result<f64, AttributionError> {
    if n_samples == 0 {
        return Err(AttributionError::Unsupported(
            "tree node without training cover".to_string(),
        ));
    }
    Ok(n_samples as f64)
}

fn explain_tree(
    tree: &ScaledTree<'_>,
    row: ArrayView1<f64>,
    phi: &mut [Vec<f64>],
) -> Result<(), AttributionError> {
    let mut path = Vec::with_capacity(tree.root.depth() + 2);
    recurse(tree, tree.root, row, phi, &mut path, 1.0, 1.0, None)
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &ScaledTree<'_>,
    node: &TreeNode,
    row: ArrayView1<f64>,
    phi: &mut [Vec<f64>],
    path: &mut Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) -> Result<(), AttributionError> {
    extend_path(path, zero_fraction, one_fraction, feature);

    match node {
        TreeNode::Leaf { value, .. } => {
            for i in 1..path.len() {
                let weight = unwound_path_sum(path, i);
                let el = path[i];
                let Some(f) = el.feature else { continue };
                let delta = weight * (el.one_fraction - el.zero_fraction) * tree.scale;
                for (p, v) in phi[f].iter_mut().zip(value) {
                    *p += delta * v;
                }
            }
        }
        TreeNode::Split {
            feature_idx,
            threshold,
            left,
            right,
            n_samples,
            ..
        } => {
            let f = tree.global_feature(*feature_idx);
            // NaN fails the comparison and follows the right branch
            let (hot, cold) = if row[f] <= *threshold {
                (&**left, &**right)
            } else {
                (&**right, &**left)
            };
            let total = cover(*n_samples)?;
            let hot_zero = hot.n_samples() as f64 / total;
            let cold_zero = cold.n_samples() as f64 / total;

            // A feature already on the path is unwound and its fractions carried over
            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(k) = (1..path.len()).find(|&k| path[k].feature == Some(f)) {
                incoming_zero = path[k].zero_fraction;
                incoming_one = path[k].one_fraction;
                unwind_path(path, k);
            }

            let mut hot_path = path.clone();
            recurse(
                tree,
                hot,
                row,
                phi,
                &mut hot_path,
                hot_zero * incoming_zero,
                incoming_one,
                Some(f),
            )?;
            let mut cold_path = path.clone();
            recurse(
                tree,
                cold,
                row,
                phi,
                &mut cold_path,
                cold_zero * incoming_zero,
                0.0,
                Some(f),
            )?;
        }
    }
    Ok(())
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let d = depth as f64;
    for i in (0..depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i as f64 + 1.0) / (d + 1.0);
        path[i].pweight = zero_fraction * path[i].pweight * (d - i as f64) / (d + 1.0);
    }
}

fn unwind_path(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let d = depth as f64;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let mut next = path[depth].pweight;

    for j in (0..depth).rev() {
        let jf = j as f64;
        if one != 0.0 {
            let tmp = path[j].pweight;
            path[j].pweight = next * (d + 1.0) / ((jf + 1.0) * one);
            next = tmp - path[j].pweight * zero * (d - jf) / (d + 1.0);
        } else {
            path[j].pweight = path[j].pweight * (d + 1.0) / (zero * (d - jf));
        }
    }

    for j in index..depth {
        path[j].feature = path[j + 1].feature;
        path[j].zero_fraction = path[j + 1].zero_fraction;
        path[j].one_fraction = path[j + 1].one_fraction;
    }
    path.pop();
}

fn unwound_path_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let d = depth as f64;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let mut next = path[depth].pweight;
    let mut total = 0.0;

    for j in (0..depth).rev() {
        let jf = j as f64;
        if one != 0.0 {
            let tmp = next * (d + 1.0) / ((jf + 1.0) * one);
            total += tmp;
            next = path[j].pweight - tmp * zero * (d - jf) / (d + 1.0);
        } else if zero != 0.0 {
            total += (path[j].pweight / zero) / ((d - jf) / (d + 1.0));
        }
    }
    total
}
