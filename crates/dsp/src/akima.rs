//! Akima cubic interpolation for the pitch-bend curve.
//!
//! Akima's method picks up less overshoot than a natural cubic spline
//! near sharp corners, which matters for a pitch curve built from
//! coarse per-tick control points.

use crate::error::{DspError, DspResult};

struct Segment {
    // Coefficients for p(x) = a + b*dx + c*dx^2 + d*dx^3, dx = x - x0.
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

pub struct AkimaInterpolator {
    xs: Vec<f64>,
    segments: Vec<Segment>,
}

impl AkimaInterpolator {
    /// Builds an interpolator over `xs`/`ys`, which must be the same
    /// length, strictly increasing in `xs`, and have at least two
    /// points.
    pub fn new(xs: &[f64], ys: &[f64]) -> DspResult<AkimaInterpolator> {
        if xs.len() != ys.len() {
            return Err(DspError::InvalidArgument(
                "xs and ys must have equal length".into(),
            ));
        }
        if xs.len() < 2 {
            return Err(DspError::InvalidArgument(
                "need at least two points to interpolate".into(),
            ));
        }
        for w in xs.windows(2) {
            if w[1] <= w[0] {
                return Err(DspError::InvalidArgument(
                    "xs must be strictly increasing".into(),
                ));
            }
        }

        let n = xs.len();
        // Extend with two mirrored points on each side so the slope
        // estimate at the real endpoints has a well-defined neighborhood.
        let mut ext_x = Vec::with_capacity(n + 4);
        let mut ext_y = Vec::with_capacity(n + 4);
        let dx0 = xs[1] - xs[0];
        let dx_last = xs[n - 1] - xs[n - 2];
        ext_x.push(xs[0] - 2.0 * dx0);
        ext_x.push(xs[0] - dx0);
        ext_x.extend_from_slice(xs);
        ext_x.push(xs[n - 1] + dx_last);
        ext_x.push(xs[n - 1] + 2.0 * dx_last);

        ext_y.push(2.0 * ys[0] - ys[1]);
        ext_y.push(ys[0] - (ys[1] - ys[0]));
        ext_y.extend_from_slice(ys);
        ext_y.push(ys[n - 1] + (ys[n - 1] - ys[n - 2]));
        ext_y.push(2.0 * ys[n - 1] - ys[n - 2]);

        let m = ext_x.len();
        let mut slopes = vec![0.0; m - 1];
        for i in 0..m - 1 {
            slopes[i] = (ext_y[i + 1] - ext_y[i]) / (ext_x[i + 1] - ext_x[i]);
        }

        // slopes[] is indexed so that slopes[2 + i] is the secant over
        // the real interval [xs[i], xs[i+1]].
        let mut derivatives = vec![0.0; n];
        for i in 0..n {
            let s_idx = i + 2; // index of slopes[] aligned to ext_x
            let s_m2 = slopes[s_idx - 2];
            let s_m1 = slopes[s_idx - 1];
            let s_p0 = slopes[s_idx];
            let s_p1 = slopes[s_idx + 1];
            let w1 = (s_p1 - s_p0).abs();
            let w2 = (s_m1 - s_m2).abs();
            derivatives[i] = if w1 + w2 > 1e-12 {
                (w1 * s_m1 + w2 * s_p0) / (w1 + w2)
            } else {
                0.5 * (s_m1 + s_p0)
            };
        }

        let mut segments = Vec::with_capacity(n - 1);
        for i in 0..n - 1 {
            let h = xs[i + 1] - xs[i];
            let secant = (ys[i + 1] - ys[i]) / h;
            let a = ys[i];
            let b = derivatives[i];
            let c = (3.0 * secant - 2.0 * derivatives[i] - derivatives[i + 1]) / h;
            let d = (derivatives[i] + derivatives[i + 1] - 2.0 * secant) / (h * h);
            segments.push(Segment { a, b, c, d });
        }

        Ok(AkimaInterpolator {
            xs: xs.to_vec(),
            segments,
        })
    }

    /// Evaluates the interpolant at `x`, extrapolating linearly from
    /// the nearest endpoint segment outside `[xs[0], xs[last]]`.
    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        let idx = if x <= self.xs[0] {
            0
        } else if x >= self.xs[n - 1] {
            n - 2
        } else {
            match self
                .xs
                .binary_search_by(|probe| probe.partial_cmp(&x).unwrap())
            {
                Ok(i) => i.min(n - 2),
                Err(i) => (i - 1).min(n - 2),
            }
        };
        let seg = &self.segments[idx];
        let dx = x - self.xs[idx];
        seg.a + dx * (seg.b + dx * (seg.c + dx * seg.d))
    }

    pub fn eval_many(&self, xs: &[f64]) -> Vec<f64> {
        xs.iter().map(|&x| self.eval(x)).collect()
    }
}
