// Forward-backward filtering with odd-reflection edge padding

use super::biquad::SecondOrderFilter;

/// Edge padding per section, as in the usual forward-backward scheme
const PAD_PER_SECTION: usize = 6;

/// Runs `sections` forward then backward over `signal`, so the result has
/// zero phase shift and squared magnitude response. Edges are extended by odd
/// reflection about the end samples before filtering and trimmed afterwards.
pub fn filtfilt(sections: &[SecondOrderFilter], signal: &mut [f64]) {
    let n = signal.len();
    if n < 2 || sections.is_empty() {
        return;
    }
    let pad = (PAD_PER_SECTION * sections.len() + 3).min(n - 1);

    let mut extended = odd_extension(signal, pad);
    for section in sections {
        section.run(&mut extended);
    }
    extended.reverse();
    for section in sections {
        section.run(&mut extended);
    }
    extended.reverse();

    signal.copy_from_slice(&extended[pad..pad + n]);
}

fn odd_extension(signal: &[f64], pad: usize) -> Vec<f64> {
    let n = signal.len();
    let (first, last) = (signal[0], signal[n - 1]);
    let mut extended = Vec::with_capacity(n + 2 * pad);
    extended.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
    extended.extend_from_slice(signal);
    extended.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));
    extended
}
