//! Symmetric eigendecomposition: Householder tridiagonalization followed by
//! implicit-shift QL iteration, with rotations accumulated into the
//! eigenvector columns. Operates in place on the output matrix; only the
//! lower triangle of the input is read.

use ndarray::{Array1, Array2};

/// Machine epsilon used as the QL convergence threshold.
const EPS: f64 = 2.220446049250313e-16; // 2^-52

/// Decompose the symmetric matrix `c` (lower triangle authoritative) into
/// eigenvalues `d` (unsorted) and orthonormal eigenvectors stored as the
/// columns of `q`. `e` is scratch of length >= n.
pub(crate) fn decompose(c: &Array2<f64>, q: &mut Array2<f64>, d: &mut Array1<f64>, e: &mut [f64]) {
    let n = d.len();
    for i in 0..n {
        for j in 0..=i {
            let v = c[[i, j]];
            q[[i, j]] = v;
            q[[j, i]] = v;
        }
    }
    householder(q, d, e);
    ql(d, e, q);
}

/// Householder reduction of `v` to symmetric tridiagonal form; `v` becomes
/// the accumulated similarity transform, `d` the diagonal and `e` the
/// subdiagonal. Each reflection vector is scaled before its norm is taken so
/// that neither squaring nor the square root can overflow.
fn householder(v: &mut Array2<f64>, d: &mut Array1<f64>, e: &mut [f64]) {
    let n = d.len();

    for j in 0..n {
        d[j] = v[[n - 1, j]];
    }

    for i in (1..n).rev() {
        let mut scale = 0.0;
        let mut h = 0.0;
        for k in 0..i {
            scale += d[k].abs();
        }
        if scale == 0.0 {
            // zero subcolumn, no reflection needed
            e[i] = d[i - 1];
            for j in 0..i {
                d[j] = v[[i - 1, j]];
                v[[i, j]] = 0.0;
                v[[j, i]] = 0.0;
            }
        } else {
            for k in 0..i {
                d[k] /= scale;
                h += d[k] * d[k];
            }
            let f = d[i - 1];
            let g = if f > 0.0 { -h.sqrt() } else { h.sqrt() };
            e[i] = scale * g;
            h -= f * g;
            d[i - 1] = f - g;
            for j in 0..i {
                e[j] = 0.0;
            }

            // apply similarity transformation to remaining columns
            for j in 0..i {
                let f = d[j];
                v[[j, i]] = f;
                let mut g = e[j] + v[[j, j]] * f;
                for k in (j + 1)..i {
                    g += v[[k, j]] * d[k];
                    e[k] += v[[k, j]] * f;
                }
                e[j] = g;
            }
            let mut f = 0.0;
            for j in 0..i {
                e[j] /= h;
                f += e[j] * d[j];
            }
            let hh = f / (h + h);
            for j in 0..i {
                e[j] -= hh * d[j];
            }
            for j in 0..i {
                let f = d[j];
                let g = e[j];
                for k in j..i {
                    v[[k, j]] -= f * e[k] + g * d[k];
                }
                d[j] = v[[i - 1, j]];
                v[[i, j]] = 0.0;
            }
        }
        d[i] = h;
    }

    // accumulate transformations
    for i in 0..n.saturating_sub(1) {
        v[[n - 1, i]] = v[[i, i]];
        v[[i, i]] = 1.0;
        let h = d[i + 1];
        if h != 0.0 {
            for k in 0..=i {
                d[k] = v[[k, i + 1]] / h;
            }
            for j in 0..=i {
                let mut g = 0.0;
                for k in 0..=i {
                    g += v[[k, i + 1]] * v[[k, j]];
                }
                for k in 0..=i {
                    v[[k, j]] -= g * d[k];
                }
            }
        }
        for k in 0..=i {
            v[[k, i + 1]] = 0.0;
        }
    }
    for j in 0..n {
        d[j] = v[[n - 1, j]];
        v[[n - 1, j]] = 0.0;
    }
    v[[n - 1, n - 1]] = 1.0;
    e[0] = 0.0;
}

/// Implicit-shift QL iteration on the tridiagonal (d, e), accumulating the
/// Givens rotations into the columns of `v`. On entry `e[i]` holds the
/// subdiagonal pair of `d[i-1]`; the off-diagonal is consumed left-shifted
/// and zero-terminated. Convergence is tested against a running estimate of
/// the tridiagonal infinity norm.
fn ql(d: &mut Array1<f64>, e: &mut [f64], v: &mut Array2<f64>) {
    let n = d.len();
    let mut f = 0.0;
    let mut tst1: f64 = 0.0;

    for i in 1..n {
        e[i - 1] = e[i];
    }
    e[n - 1] = 0.0; // never changed again

    for l in 0..n {
        let small_sd = d[l].abs() + e[l].abs();
        if tst1 < small_sd {
            tst1 = small_sd;
        }
        let eps_tst1 = EPS * tst1;
        let mut m = l;
        while m < n {
            if e[m].abs() <= eps_tst1 {
                break;
            }
            m += 1;
        }

        // if m == l, d[l] is already an eigenvalue; otherwise iterate
        if m > l {
            loop {
                // compute implicit shift
                let g = d[l];
                let mut p = (d[l + 1] - g) / (2.0 * e[l]);
                let mut r = p.hypot(1.0);
                if p < 0.0 {
                    r = -r;
                }
                let pr = p + r;
                d[l] = e[l] / pr;
                let mut h = g - d[l];
                let dl1 = e[l] * pr;
                d[l + 1] = dl1;
                for i in (l + 2)..n {
                    d[i] -= h;
                }
                f += h;

                // chase the bulge with Givens rotations
                p = d[m];
                let mut c = 1.0;
                let mut c2 = 1.0;
                let mut c3 = 1.0;
                let el1 = e[l + 1];
                let mut s = 0.0;
                let mut s2 = 0.0;
                for i in (l..m).rev() {
                    c3 = c2;
                    c2 = c;
                    s2 = s;
                    let ei = e[i];
                    let g = c * ei;
                    h = c * p;
                    r = p.hypot(ei);
                    e[i + 1] = s * r;
                    s = ei / r;
                    c = p / r;
                    let di = d[i];
                    p = c * di - s * g;
                    d[i + 1] = h + s * (c * g + s * di);

                    // accumulate transformation
                    for k in 0..n {
                        h = v[[k, i + 1]];
                        v[[k, i + 1]] = s * v[[k, i]] + c * h;
                        v[[k, i]] = c * v[[k, i]] - s * h;
                    }
                }
                p = -s * s2 * c3 * el1 * e[l] / dl1;
                e[l] = s * p;
                d[l] = c * p;

                if e[l].abs() <= eps_tst1 {
                    break;
                }
            }
        }
        d[l] += f;
        e[l] = 0.0;
    }
}

/// Exhaustive O(n^3) consistency check of a decomposition: element-wise
/// residuals of `Q diag(d) Q^T - C` and `Q Q^T - I`. Returns one complaint
/// per element whose relative error exceeds 1e-10 while its absolute error
/// also exceeds 3e-14.
pub(crate) fn residual_report(c: &Array2<f64>, q: &Array2<f64>, d: &Array1<f64>) -> Vec<String> {
    let n = d.len();
    let mut complaints = Vec::new();
    for i in 0..n {
        for j in 0..n {
            let mut cc = 0.0;
            let mut dd = 0.0;
            for k in 0..n {
                cc += d[k] * q[[i, k]] * q[[j, k]];
                dd += q[[i, k]] * q[[j, k]];
            }
            let c_ref = c[[i.max(j), i.min(j)]];
            let abs_err = (cc - c_ref).abs();
            let rel_err = abs_err / (c[[i, i]] * c[[j, j]]).sqrt();
            if rel_err > 1e-10 && abs_err > 3e-14 {
                complaints.push(format!(
                    "eigen: imprecise reconstruction at ({i}, {j}): {cc} vs {c_ref}, diff {}",
                    cc - c_ref
                ));
            }
            let id = if i == j { 1.0 } else { 0.0 };
            if (dd - id).abs() > 1e-10 {
                complaints.push(format!(
                    "eigen: eigenvectors not orthonormal at ({i}, {j}): {dd}"
                ));
            }
        }
    }
    complaints
}
