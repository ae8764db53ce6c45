// Biquad sections, 2nd order (RBJ cookbook coefficients)

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterType {
    HighPass,
    LowPass,
    /// Band-stop centred on `f0` with quality factor `q`
    Notch { q: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondOrderFilter {
    // normalised so a0 == 1
    b: [f64; 3],
    a: [f64; 2],
}

impl SecondOrderFilter {
    pub fn new(f0: f64, fs: f64, filter_type: FilterType) -> Self {
        // Butterworth, Q set to sqrt(2)/2: maximally flat in the passband
        let butterworth_q = (2.0f64).sqrt() / 2.0;
        let omega = 2.0 * PI * f0 / fs;
        let cos = f64::cos(omega);

        let (b0, b1, b2, a0, a1, a2) = match filter_type {
            FilterType::HighPass => {
                let alpha = f64::sin(omega) / (2.0 * butterworth_q);
                (
                    (1.0 + cos) / 2.0,
                    -(1.0 + cos),
                    (1.0 + cos) / 2.0,
                    1.0 + alpha,
                    -2.0 * cos,
                    1.0 - alpha,
                )
            }
            FilterType::LowPass => {
                let alpha = f64::sin(omega) / (2.0 * butterworth_q);
                (
                    (1.0 - cos) / 2.0,
                    1.0 - cos,
                    (1.0 - cos) / 2.0,
                    1.0 + alpha,
                    -2.0 * cos,
                    1.0 - alpha,
                )
            }
            FilterType::Notch { q } => {
                let alpha = f64::sin(omega) / (2.0 * q);
                (1.0, -2.0 * cos, 1.0, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
            }
        };

        SecondOrderFilter {
            b: [b0 / a0, b1 / a0, b2 / a0],
            a: [a1 / a0, a2 / a0],
        }
    }

    /// Gain at DC, used to seed the state for a constant input.
    pub fn dc_gain(&self) -> f64 {
        let denominator = 1.0 + self.a[0] + self.a[1];
        (self.b[0] + self.b[1] + self.b[2]) / denominator
    }

    /// Magnitude response at `f` Hz.
    pub fn gain_at(&self, f: f64, fs: f64) -> f64 {
        let w = 2.0 * PI * f / fs;
        let (c1, s1, c2, s2) = (w.cos(), w.sin(), (2.0 * w).cos(), (2.0 * w).sin());
        let num_re = self.b[0] + self.b[1] * c1 + self.b[2] * c2;
        let num_im = -(self.b[1] * s1 + self.b[2] * s2);
        let den_re = 1.0 + self.a[0] * c1 + self.a[1] * c2;
        let den_im = -(self.a[0] * s1 + self.a[1] * s2);
        (num_re.hypot(num_im)) / (den_re.hypot(den_im))
    }

    /// Filters `signal` in place (transposed direct form II), starting from
    /// the steady state for a constant input equal to the first sample.
    pub fn run(&self, signal: &mut [f64]) {
        let Some(&first) = signal.first() else {
            return;
        };
        let [b0, b1, b2] = self.b;
        let [a1, a2] = self.a;

        let steady = self.dc_gain() * first;
        let mut z2 = b2 * first - a2 * steady;
        let mut z1 = steady - b0 * first;

        for value in signal.iter_mut() {
            let input = *value;
            let output = b0 * input + z1;
            z1 = b1 * input - a1 * output + z2;
            z2 = b2 * input - a2 * output;
            *value = output;
        }
    }
}
