pub mod biquad;
pub mod zero_phase;

use crate::error::{P300Error, Result};

use self::biquad::{FilterType, SecondOrderFilter};
use self::zero_phase::filtfilt;

/// Numerical filtering collaborator used by the conditioning pipeline. The
/// pipeline only picks parameters and order; implementations own the math.
pub trait DspBackend: Send + Sync {
    /// Zero-phase band-pass of one channel, in place.
    fn bandpass_zero_phase(&self, signal: &mut [f64], fs: f64, low: f64, high: f64) -> Result<()>;

    /// Zero-phase band-stop of one channel at `freq` with quality `q`, in place.
    fn notch_zero_phase(&self, signal: &mut [f64], fs: f64, freq: f64, q: f64) -> Result<()>;
}

/// Butterworth high-pass plus low-pass sections for the band, an RBJ notch
/// for line noise, both run forward and backward.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadBackend;

impl BiquadBackend {
    pub fn new() -> Self {
        Self
    }
}

fn check_frequency(name: &str, f: f64, fs: f64) -> Result<()> {
    if !(fs > 0.0) {
        return Err(P300Error::Config(format!("sampling rate must be positive, got {}", fs)));
    }
    if !(f > 0.0 && f < fs / 2.0) {
        return Err(P300Error::Config(format!(
            "{} frequency {} Hz must lie in (0, {}) Hz",
            name,
            f,
            fs / 2.0
        )));
    }
    Ok(())
}

impl DspBackend for BiquadBackend {
    fn bandpass_zero_phase(&self, signal: &mut [f64], fs: f64, low: f64, high: f64) -> Result<()> {
        check_frequency("band-pass low", low, fs)?;
        check_frequency("band-pass high", high, fs)?;
        if low >= high {
            return Err(P300Error::Config(format!(
                "band-pass low edge {} Hz must be below high edge {} Hz",
                low, high
            )));
        }

        let sections = [
            SecondOrderFilter::new(low, fs, FilterType::HighPass),
            SecondOrderFilter::new(high, fs, FilterType::LowPass),
        ];
        filtfilt(&sections, signal);
        Ok(())
    }

    fn notch_zero_phase(&self, signal: &mut [f64], fs: f64, freq: f64, q: f64) -> Result<()> {
        check_frequency("notch", freq, fs)?;
        if !(q > 0.0) {
            return Err(P300Error::Config(format!("notch quality must be positive, got {}", q)));
        }
        filtfilt(&[SecondOrderFilter::new(freq, fs, FilterType::Notch { q })], signal);
        Ok(())
    }
}
