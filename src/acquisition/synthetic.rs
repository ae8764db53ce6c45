// src/acquisition/synthetic.rs

use rand::rngs::StdRng;
use rand::Rng;
use std::f64::consts::PI;
use std::time::Instant;
use tracing::{info, warn};

use super::{AcquisitionGateway, Marker, RawFrame, CHANNEL_COUNT};
use crate::error::{P300Error, Result};
use crate::utils::seeded_rng;

// -----------------------------------------------------------------------------
// SETUP FOR THE SIMULATED SIGNALS
// -----------------------------------------------------------------------------

const BASELINE_AMPLITUDE: f64 = 20.0;

const BACKGROUND_I_FREQ: f64 = 0.5;
const BACKGROUND_II_FREQ: f64 = 10.0;
const BACKGROUND_III_FREQ: f64 = 2.0;
const LINE_NOISE_FREQ: f64 = 60.0;
const LINE_NOISE_AMPLITUDE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceState {
    Idle,
    Prepared,
    Streaming,
    Stopped,
    Released,
}

/// Software stand-in for the acquisition hardware: an 8-channel mixture of
/// background rhythms, line noise and uniform noise, produced at the sampling
/// rate from wall time since `start_stream`.
pub struct SyntheticGateway {
    sampling_rate: f64,
    noise_uv: f64,
    rng: StdRng,
    state: DeviceState,
    started: Option<Instant>,
    emitted: u64,
    buffer_size: usize,
    pending_marker: Marker,
}

impl SyntheticGateway {
    pub fn new(sampling_rate: f64, noise_uv: f64, seed: Option<u64>) -> Self {
        Self {
            sampling_rate,
            noise_uv,
            rng: seeded_rng(seed),
            state: DeviceState::Idle,
            started: None,
            emitted: 0,
            buffer_size: 0,
            pending_marker: Marker::None,
        }
    }

    fn expect_state(&self, operation: &'static str, expected: DeviceState) -> Result<()> {
        if self.state != expected {
            return Err(P300Error::hardware(
                operation,
                format!("device is {:?}, expected {:?}", self.state, expected),
            ));
        }
        Ok(())
    }

    fn sample_at(&mut self, index: u64) -> RawFrame {
        let time = index as f64 / self.sampling_rate;
        let mut channels = [0.0; CHANNEL_COUNT];
        for (channel, value) in channels.iter_mut().enumerate() {
            let phase = channel as f64 * PI / CHANNEL_COUNT as f64;
            let noise = if self.noise_uv > 0.0 {
                self.rng.gen_range(-self.noise_uv..self.noise_uv)
            } else {
                0.0
            };
            *value = 10.0 * (2.0 * PI * BACKGROUND_I_FREQ * time + phase).sin()
                + BASELINE_AMPLITUDE / 2.0 * (2.0 * PI * BACKGROUND_II_FREQ * time + phase).sin()
                + 5.0 * (2.0 * PI * BACKGROUND_III_FREQ * time).sin()
                + LINE_NOISE_AMPLITUDE * (2.0 * PI * LINE_NOISE_FREQ * time).sin()
                + noise;
        }

        RawFrame {
            timestamp: None,
            channels,
            marker: std::mem::take(&mut self.pending_marker),
        }
    }

    /// Produces every frame due up to `target` total frames since stream
    /// start, keeping only the newest `buffer_size` when the backlog overflows.
    fn generate_until(&mut self, target: u64) -> Vec<RawFrame> {
        let due = target.saturating_sub(self.emitted);
        if due as usize > self.buffer_size {
            let dropped = due as usize - self.buffer_size;
            warn!(dropped, buffer_size = self.buffer_size, "synthetic ring buffer overflowed");
            self.emitted += dropped as u64;
        }
        let frames: Vec<RawFrame> = (self.emitted..target).map(|i| self.sample_at(i)).collect();
        self.emitted = self.emitted.max(target);
        frames
    }
}

impl AcquisitionGateway for SyntheticGateway {
    fn prepare_session(&mut self) -> Result<()> {
        self.expect_state("prepare_session", DeviceState::Idle)?;
        self.state = DeviceState::Prepared;
        info!(sampling_rate = self.sampling_rate, "synthetic board prepared");
        Ok(())
    }

    fn start_stream(&mut self, buffer_size: usize) -> Result<()> {
        self.expect_state("start_stream", DeviceState::Prepared)?;
        if buffer_size == 0 {
            return Err(P300Error::hardware("start_stream", "buffer size must be positive"));
        }
        self.buffer_size = buffer_size;
        self.started = Some(Instant::now());
        self.emitted = 0;
        self.state = DeviceState::Streaming;
        Ok(())
    }

    fn poll_buffer(&mut self) -> Result<Vec<RawFrame>> {
        self.expect_state("poll_buffer", DeviceState::Streaming)?;
        let elapsed = self.started.map_or(0.0, |s| s.elapsed().as_secs_f64());
        let target = (elapsed * self.sampling_rate).floor() as u64;
        Ok(self.generate_until(target))
    }

    fn insert_marker(&mut self, marker: Marker) -> Result<()> {
        self.expect_state("insert_marker", DeviceState::Streaming)?;
        self.pending_marker = marker;
        Ok(())
    }

    fn stop_stream(&mut self) -> Result<()> {
        self.expect_state("stop_stream", DeviceState::Streaming)?;
        self.state = DeviceState::Stopped;
        Ok(())
    }

    fn release_session(&mut self) -> Result<()> {
        if self.state == DeviceState::Released || self.state == DeviceState::Idle {
            return Err(P300Error::hardware("release_session", "no prepared session"));
        }
        self.state = DeviceState::Released;
        info!(frames = self.emitted, "synthetic board released");
        Ok(())
    }

    fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn streaming(seed: u64) -> SyntheticGateway {
        let mut gateway = SyntheticGateway::new(256.0, 10.0, Some(seed));
        gateway.prepare_session().unwrap();
        gateway.start_stream(1000).unwrap();
        gateway
    }

    #[test]
    fn lifecycle_out_of_order_is_a_hardware_error() {
        let mut gateway = SyntheticGateway::new(256.0, 0.0, Some(1));
        assert!(matches!(
            gateway.poll_buffer(),
            Err(P300Error::HardwareIo { operation: "poll_buffer", .. })
        ));
        assert!(gateway.start_stream(10).is_err());
        assert!(gateway.release_session().is_err());
    }

    #[test]
    fn frames_follow_wall_time() {
        let mut gateway = streaming(2);
        std::thread::sleep(Duration::from_millis(100));
        let frames = gateway.poll_buffer().unwrap();
        // 100 ms at 256 Hz, with scheduling slack
        assert!(frames.len() >= 25 && frames.len() <= 256, "{}", frames.len());
    }

    #[test]
    fn overflowing_backlog_keeps_only_the_newest_frames() {
        let mut gateway = streaming(3);
        gateway.buffer_size = 8;
        let frames = gateway.generate_until(20);
        assert_eq!(frames.len(), 8);
        assert_eq!(gateway.emitted, 20);
    }

    #[test]
    fn inserted_marker_lands_on_the_next_frame_only() {
        let mut gateway = streaming(4);
        gateway.insert_marker(Marker::Target).unwrap();
        let frames = gateway.generate_until(3);
        let markers: Vec<Marker> = frames.iter().map(|f| f.marker).collect();
        assert_eq!(markers, vec![Marker::Target, Marker::None, Marker::None]);
    }

    #[test]
    fn noiseless_signal_is_deterministic_and_bounded() {
        let mut a = SyntheticGateway::new(256.0, 0.0, Some(1));
        let mut b = SyntheticGateway::new(256.0, 0.0, Some(2));
        for i in 0..256 {
            let (fa, fb) = (a.sample_at(i), b.sample_at(i));
            assert_eq!(fa.channels, fb.channels);
            assert!(fa.channels.iter().all(|v| v.abs() <= 30.0));
        }
    }

    #[test]
    fn full_lifecycle_succeeds_once() {
        let mut gateway = streaming(5);
        gateway.stop_stream().unwrap();
        assert!(gateway.stop_stream().is_err());
        gateway.release_session().unwrap();
        assert!(gateway.release_session().is_err());
    }
}
