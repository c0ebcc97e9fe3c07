#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
pub fn smoothstep(e0: f32, e1: f32, x: f32) -> f32 {
    let t = ((x - e0) / (e1 - e0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Piecewise-smooth 1D curve over sorted (input, output) knots. Raw noise in
/// [-1, 1] goes in, a shaped terrain contribution comes out. Inputs outside
/// the knot domain clamp to the endpoints.
#[derive(Clone, Debug)]
pub struct Spline {
    knots: Vec<(f32, f32)>,
}

impl Spline {
    pub fn new(knots: Vec<(f32, f32)>) -> Self {
        debug_assert!(knots.windows(2).all(|w| w[0].0 <= w[1].0), "spline knots must be sorted");
        Self { knots }
    }

    pub fn evaluate(&self, input: f32) -> f32 {
        let Some(&(first_in, first_out)) = self.knots.first() else { return 0.0 };
        let &(last_in, last_out) = self.knots.last().unwrap();
        if self.knots.len() == 1 || input <= first_in {
            return first_out;
        }
        if input >= last_in {
            return last_out;
        }

        for pair in self.knots.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            if input >= x0 && input <= x1 {
                let t = (input - x0) / (x1 - x0);
                return lerp(y0, y1, smoothstep(0.0, 1.0, t));
            }
        }
        last_out
    }
}
