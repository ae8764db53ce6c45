// src/acquisition/mod.rs

pub mod acquisition_loop;
pub mod marker;
pub mod playback;
pub mod synthetic;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{AcquisitionConfig, GatewayConfig};
use crate::error::Result;
use parking_lot::Mutex;

use self::playback::PlaybackGateway;
use self::synthetic::SyntheticGateway;

pub const CHANNEL_COUNT: usize = 8;

// -----------------------------------------------------------------------------
// LABELS
// -----------------------------------------------------------------------------

/// Event label carried by every acquired sample. `Excluded` only appears after
/// offline balancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Marker {
    #[default]
    None = 0,
    NonTarget = 1,
    Target = 2,
    Excluded = 3,
}

impl Marker {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Marker::None),
            1 => Some(Marker::NonTarget),
            2 => Some(Marker::Target),
            3 => Some(Marker::Excluded),
            _ => None,
        }
    }

    pub fn is_none(self) -> bool {
        self == Marker::None
    }
}

// -----------------------------------------------------------------------------
// SAMPLES AND FRAMES
// -----------------------------------------------------------------------------

/// One tagged acquisition sample, immutable once appended to the session log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds since session open
    pub timestamp: f64,
    /// Channel values in µV
    pub channels: [f64; CHANNEL_COUNT],
    pub marker: Marker,
}

/// A frame as delivered by the gateway, before tagging.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawFrame {
    /// Device timestamp in session seconds, when the gateway provides one
    pub timestamp: Option<f64>,
    pub channels: [f64; CHANNEL_COUNT],
    /// Device-side marker channel, only populated in hardware tagging mode
    pub marker: Marker,
}

impl RawFrame {
    pub fn new(channels: [f64; CHANNEL_COUNT]) -> Self {
        Self {
            timestamp: None,
            channels,
            marker: Marker::None,
        }
    }
}

// -----------------------------------------------------------------------------
// GATEWAY
// -----------------------------------------------------------------------------

/// Hardware acquisition SDK surface. Every call is fallible and reports
/// failures as `P300Error::HardwareIo`.
pub trait AcquisitionGateway: Send {
    fn prepare_session(&mut self) -> Result<()>;
    fn start_stream(&mut self, buffer_size: usize) -> Result<()>;
    /// Drains every frame buffered since the previous call, in arrival order.
    fn poll_buffer(&mut self) -> Result<Vec<RawFrame>>;
    /// Hardware-side tagging path; gateways without a marker channel refuse it.
    fn insert_marker(&mut self, marker: Marker) -> Result<()> {
        Err(crate::error::P300Error::hardware(
            "insert_marker",
            format!("gateway has no marker channel (marker {})", marker.code()),
        ))
    }
    fn stop_stream(&mut self) -> Result<()>;
    fn release_session(&mut self) -> Result<()>;
    fn sampling_rate(&self) -> f64;
    /// True once a finite source has handed out its last frame.
    fn is_exhausted(&self) -> bool {
        false
    }
}

pub type SharedGateway = Arc<Mutex<Box<dyn AcquisitionGateway>>>;

/// Builds the gateway named in the acquisition config.
pub fn build_gateway(config: &AcquisitionConfig) -> Box<dyn AcquisitionGateway> {
    match &config.gateway {
        GatewayConfig::Synthetic { seed, noise_uv } => {
            Box::new(SyntheticGateway::new(config.sampling_rate, *noise_uv, *seed))
        }
        GatewayConfig::Playback { path, layout } => {
            Box::new(PlaybackGateway::new(path.clone(), *layout, config.sampling_rate))
        }
    }
}

pub fn share_gateway(gateway: Box<dyn AcquisitionGateway>) -> SharedGateway {
    Arc::new(Mutex::new(gateway))
}

// -----------------------------------------------------------------------------
// CLOCK
// -----------------------------------------------------------------------------

/// Monotonic time base shared by the scheduler and the acquisition loop.
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}
