// block.rs
// 4-D derivative blocks and the contractions used by the chain rule.
//
// A block for a value of shape (m, n) differentiated with respect to a
// variable of shape (k, l) has shape (m, n, k, l) and element
// [i, j, p, q] = d value[i, j] / d variable[p, q]. Scalars count as (1, 1).
// In the reverse pass the same layout holds with the final output in the
// leading pair of axes and the intermediate node in the trailing pair.

use crate::error::{Error, Result};
use crate::value::Value;
use ndarray::{Array2, Array4, s};
use std::collections::BTreeMap;

pub type Block = Array4<f64>;

#[inline]
fn broadcast_index(dim: usize, index: usize) -> usize {
    if dim == 1 { 0 } else { index }
}

fn check_broadcast(from: (usize, usize), to: (usize, usize)) -> Result<()> {
    let fits = |f: usize, t: usize| f == t || f == 1;
    if fits(from.0, to.0) && fits(from.1, to.1) {
        Ok(())
    } else {
        Err(Error::shape_mismatch(&[to.0, to.1], &[from.0, from.1]))
    }
}

/// Seeded identity block: `block[i, j, i, j] = seed[i, j]`, zero elsewhere.
pub fn identity(seed: &Array2<f64>) -> Block {
    let (rows, cols) = seed.dim();
    let mut block = Block::zeros((rows, cols, rows, cols));
    for ((i, j), &v) in seed.indexed_iter() {
        block[[i, j, i, j]] = v;
    }
    block
}

/// Plain identity block for a value: the derivative of a value with respect
/// to itself.
pub fn identity_for(value: &Value) -> Block {
    identity(&Array2::ones(value.dims()))
}

/// Forward chain rule for element-wise operations (`ijkl,ij->ijkl`).
///
/// `block` is an operand's derivative, `local` the local derivative of the
/// result with respect to that operand. Both are broadcast to `out`, the
/// shape of the result, so a scalar operand feeding a matrix result yields a
/// full `(m, n, k, l)` block.
pub fn scale_forward(block: &Block, local: &Value, out: (usize, usize)) -> Result<Block> {
    let (bm, bn, k, l) = block.dim();
    let (lm, ln) = local.dims();
    check_broadcast((bm, bn), out)?;
    check_broadcast((lm, ln), out)?;

    Ok(Block::from_shape_fn((out.0, out.1, k, l), |(i, j, p, q)| {
        block[[broadcast_index(bm, i), broadcast_index(bn, j), p, q]]
            * local.get(broadcast_index(lm, i), broadcast_index(ln, j))
    }))
}

/// Reverse chain rule for element-wise operations (`ijkl,kl->ijkl`).
///
/// `adjoint` holds d output / d result. The product with the local
/// derivative is summed back over the axes where the operand was broadcast,
/// so the returned block always ends in the operand's own shape.
pub fn scale_reverse(adjoint: &Block, local: &Value, operand: (usize, usize)) -> Result<Block> {
    let (fm, fn_, cm, cn) = adjoint.dim();
    let (lm, ln) = local.dims();
    check_broadcast((lm, ln), (cm, cn))?;
    check_broadcast(operand, (cm, cn))?;

    let mut out = Block::zeros((fm, fn_, operand.0, operand.1));
    for ((i, j, p, q), &v) in adjoint.indexed_iter() {
        let local = local.get(broadcast_index(lm, p), broadcast_index(ln, q));
        out[[i, j, broadcast_index(operand.0, p), broadcast_index(operand.1, q)]] += v * local;
    }
    Ok(out)
}

/// Combine a node's own forward derivative `dcdx` (shape `(i, j, p, q)`) with
/// the adjoint `dfdc` (shape `(k, l, i, j)`) into `dfdx` (`ijpq,klij->klpq`).
pub fn merge(dcdx: &Block, dfdc: &Block) -> Result<Block> {
    let (i, j, p, q) = dcdx.dim();
    let (k, l, ci, cj) = dfdc.dim();
    if (ci, cj) != (i, j) {
        return Err(Error::shape_mismatch(&[k, l, i, j], dfdc.shape()));
    }

    let lhs = dfdc.to_shape((k * l, i * j))?;
    let rhs = dcdx.to_shape((i * j, p * q))?;
    Ok(lhs.dot(&rhs).into_shape_with_order((k, l, p, q))?)
}

/// Forward rule for `c = a @ b` with respect to `a` (`pqkl,qr->prkl`).
pub fn matmul_forward_lhs(da: &Block, b: &Array2<f64>) -> Result<Block> {
    let (p, q, k, l) = da.dim();
    if q != b.nrows() {
        return Err(Error::shape_mismatch(&[p, b.nrows()], &[p, q]));
    }
    let mut out = Block::zeros((p, b.ncols(), k, l));
    for kk in 0..k {
        for ll in 0..l {
            let product = da.slice(s![.., .., kk, ll]).dot(b);
            out.slice_mut(s![.., .., kk, ll]).assign(&product);
        }
    }
    Ok(out)
}

/// Forward rule for `c = a @ b` with respect to `b` (`qrkl,pq->prkl`).
pub fn matmul_forward_rhs(a: &Array2<f64>, db: &Block) -> Result<Block> {
    let (q, r, k, l) = db.dim();
    if a.ncols() != q {
        return Err(Error::shape_mismatch(&[a.ncols(), r], &[q, r]));
    }
    let mut out = Block::zeros((a.nrows(), r, k, l));
    for kk in 0..k {
        for ll in 0..l {
            let product = a.dot(&db.slice(s![.., .., kk, ll]));
            out.slice_mut(s![.., .., kk, ll]).assign(&product);
        }
    }
    Ok(out)
}

/// Reverse rule for `c = a @ b` towards `a` (`mnpr,qr->mnpq`).
pub fn matmul_reverse_lhs(dfdc: &Block, b: &Array2<f64>) -> Result<Block> {
    let (m, n, p, r) = dfdc.dim();
    if r != b.ncols() {
        return Err(Error::shape_mismatch(&[m, n, p, b.ncols()], dfdc.shape()));
    }
    let mut out = Block::zeros((m, n, p, b.nrows()));
    for mm in 0..m {
        for nn in 0..n {
            let product = dfdc.slice(s![mm, nn, .., ..]).dot(&b.t());
            out.slice_mut(s![mm, nn, .., ..]).assign(&product);
        }
    }
    Ok(out)
}

/// Reverse rule for `c = a @ b` towards `b` (`mnpr,pq->mnqr`).
pub fn matmul_reverse_rhs(dfdc: &Block, a: &Array2<f64>) -> Result<Block> {
    let (m, n, p, r) = dfdc.dim();
    if p != a.nrows() {
        return Err(Error::shape_mismatch(&[m, n, a.nrows(), r], dfdc.shape()));
    }
    let mut out = Block::zeros((m, n, a.ncols(), r));
    for mm in 0..m {
        for nn in 0..n {
            let product = a.t().dot(&dfdc.slice(s![mm, nn, .., ..]));
            out.slice_mut(s![mm, nn, .., ..]).assign(&product);
        }
    }
    Ok(out)
}

/// Forward rule for transpose: swap the value axes (`ijkl->jikl`).
pub fn transpose_forward(block: &Block) -> Block {
    block
        .view()
        .permuted_axes([1, 0, 2, 3])
        .as_standard_layout()
        .into_owned()
}

/// Reverse rule for transpose: swap the intermediate axes (`ijkl->ijlk`).
pub fn transpose_reverse(block: &Block) -> Block {
    block
        .view()
        .permuted_axes([0, 1, 3, 2])
        .as_standard_layout()
        .into_owned()
}

/// Add `block` into `map[key]`, inserting it when the key is new.
/// Contributions along different paths are summed, never overwritten.
pub fn accumulate<K: Ord>(map: &mut BTreeMap<K, Block>, key: K, block: Block) -> Result<()> {
    match map.get_mut(&key) {
        Some(existing) => {
            if existing.dim() != block.dim() {
                return Err(Error::shape_mismatch(existing.shape(), block.shape()));
            }
            *existing += &block;
        }
        None => {
            map.insert(key, block);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::arr2;

    #[test]
    fn test_seeded_identity() {
        let block = identity(&arr2(&[[2.0], [2.0]]));
        assert_eq!(block.dim(), (2, 1, 2, 1));
        assert_eq!(block[[0, 0, 0, 0]], 2.0);
        assert_eq!(block[[1, 0, 1, 0]], 2.0);
        assert_eq!(block[[0, 0, 1, 0]], 0.0);
        assert_eq!(block[[1, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_scale_forward_broadcasts_scalar_operand() {
        // d(x * M)/dx for scalar x and a 2x2 constant M is M itself.
        let dx = identity_for(&Value::from(1.0));
        let m = Value::from(arr2(&[[1.0, 2.0], [3.0, 4.0]]));
        let block = scale_forward(&dx, &m, (2, 2)).unwrap();
        assert_eq!(block.dim(), (2, 2, 1, 1));
        assert_eq!(block[[1, 0, 0, 0]], 3.0);
    }

    #[test]
    fn test_scale_reverse_sums_broadcast_axes() {
        let adjoint = identity_for(&Value::from(arr2(&[[0.0, 0.0]])));
        let local = Value::from(arr2(&[[5.0, 7.0]]));
        let block = scale_reverse(&adjoint, &local, (1, 1)).unwrap();
        assert_eq!(block.dim(), (1, 2, 1, 1));
        assert_eq!(block[[0, 0, 0, 0]], 5.0);
        assert_eq!(block[[0, 1, 0, 0]], 7.0);
    }

    #[test]
    fn test_merge_contracts_intermediate_axes() {
        // c = 3x (scalar), f = c^2 at c = 6: df/dc = 12, dc/dx = 3.
        let dcdx = Block::from_elem((1, 1, 1, 1), 3.0);
        let dfdc = Block::from_elem((1, 1, 1, 1), 12.0);
        let dfdx = merge(&dcdx, &dfdc).unwrap();
        assert_abs_diff_eq!(dfdx[[0, 0, 0, 0]], 36.0);

        let wrong = Block::zeros((1, 1, 2, 1));
        assert!(merge(&dcdx, &wrong).is_err());
    }

    #[test]
    fn test_matmul_rules_agree() {
        // x: (2, 1), c = x^T @ x. Forward and reverse must give 2 * x^T.
        let x = arr2(&[[1.0], [2.0]]);
        let xt = x.t().to_owned();
        let dx = identity_for(&Value::from(x.clone()));
        let dxt = transpose_forward(&dx);

        let forward = &matmul_forward_lhs(&dxt, &x).unwrap() + &matmul_forward_rhs(&xt, &dx).unwrap();
        assert_eq!(forward.dim(), (1, 1, 2, 1));

        let seed = Block::ones((1, 1, 1, 1));
        let to_xt = matmul_reverse_lhs(&seed, &x).unwrap();
        let to_x = matmul_reverse_rhs(&seed, &xt).unwrap();
        let reverse = &transpose_reverse(&to_xt) + &to_x;
        assert_eq!(reverse.dim(), (1, 1, 2, 1));

        for p in 0..2 {
            assert_abs_diff_eq!(forward[[0, 0, p, 0]], 2.0 * x[[p, 0]]);
            assert_abs_diff_eq!(reverse[[0, 0, p, 0]], 2.0 * x[[p, 0]]);
        }
    }

    #[test]
    fn test_accumulate_sums_contributions() {
        let mut map = BTreeMap::new();
        accumulate(&mut map, "x", Block::ones((1, 1, 1, 1))).unwrap();
        accumulate(&mut map, "x", Block::ones((1, 1, 1, 1))).unwrap();
        assert_eq!(map["x"][[0, 0, 0, 0]], 2.0);
        assert!(accumulate(&mut map, "x", Block::ones((2, 1, 1, 1))).is_err());
    }
}
