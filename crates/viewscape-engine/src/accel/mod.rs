//! Data-parallel accelerator backend with host-emulated kernel dispatch.
//!
//! Terrain is uploaded once into device buffers; every query is a single
//! kernel dispatch whose output is read back into the shared result types.
//! See `device` for what the device is and how a GPU would slot in.

pub mod device;
pub mod kernel;

use std::sync::Arc;

use log::{info, warn};

use viewscape_core::config::ViewConfig;
use viewscape_core::enums::BackendPreference;
use viewscape_terrain::{ScaleData, TileStack};

use crate::cpu::CpuEngine;
use crate::error::EngineError;
use crate::query::{check_angular_resolution, ShedPlan, TanPlan};
use crate::sweep::TanColumn;
use crate::view::ViewEngine;

pub use device::{dispatch, Device, DeviceBuffers, ACCELERATOR_ENV};
use kernel::{ShedParams, TanParams};

pub struct AccelEngine {
    stack: Arc<TileStack>,
    device: Device,
    buffers: Option<DeviceBuffers>,
    angular_resolution: f64,
    rows_per_chunk: usize,
}

impl AccelEngine {
    /// Engine on the detected device.
    pub fn new(tile: Arc<ScaleData>, config: &ViewConfig) -> Result<Self, EngineError> {
        let device = Device::detect()
            .cloned()
            .ok_or_else(|| EngineError::AcceleratorUnavailable("no compute device found".into()))?;
        Self::with_device(tile, config, device)
    }

    pub fn with_device(tile: Arc<ScaleData>, config: &ViewConfig, device: Device) -> Result<Self, EngineError> {
        config.validate()?;
        let buffers = DeviceBuffers::upload(&tile);
        info!(
            "accelerator engine on {}: {}x{} tile, {} bytes resident",
            device.name,
            buffers.width,
            buffers.height,
            buffers.size_bytes()
        );
        Ok(Self {
            stack: Arc::new(TileStack::single(tile)),
            device,
            buffers: Some(buffers),
            angular_resolution: config.angular_resolution,
            rows_per_chunk: config.rows_per_chunk,
        })
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// True while terrain buffers are resident.
    pub fn is_resident(&self) -> bool {
        self.buffers.is_some()
    }

    /// Release device buffers. Queries fail with `Disposed` until
    /// [`AccelEngine::upload`] is called.
    pub fn dispose(&mut self) {
        if self.buffers.take().is_some() {
            info!("accelerator buffers released on {}", self.device.name);
        }
    }

    /// Re-acquire device buffers after [`AccelEngine::dispose`].
    pub fn upload(&mut self) {
        if self.buffers.is_none() {
            self.buffers = Some(DeviceBuffers::upload(self.stack.primary()));
        }
    }

    fn buffers(&self) -> Result<&DeviceBuffers, EngineError> {
        self.buffers.as_ref().ok_or(EngineError::Disposed)
    }
}

impl ViewEngine for AccelEngine {
    fn backend(&self) -> &'static str {
        "accelerator"
    }

    fn stack(&self) -> &Arc<TileStack> {
        &self.stack
    }

    fn angular_resolution(&self) -> f64 {
        self.angular_resolution
    }

    fn set_angular_resolution(&mut self, a: f64) -> Result<(), EngineError> {
        self.angular_resolution = check_angular_resolution(a)?;
        Ok(())
    }

    fn rows_per_chunk(&self) -> usize {
        self.rows_per_chunk
    }

    fn shed_rows(&self, plan: &ShedPlan, row0: usize, rows: usize) -> Result<Vec<i8>, EngineError> {
        let buf = self.buffers()?;
        let params = ShedParams::new(plan, row0);
        if params.cols == 0 {
            return Ok(Vec::new());
        }
        Ok(dispatch(params.cols * rows, |gid| kernel::shed_cell(buf, &params, gid)))
    }

    fn tan_columns(&self, plan: &TanPlan) -> Result<Vec<TanColumn>, EngineError> {
        let buf = self.buffers()?;
        let params = TanParams::new(plan);
        Ok(dispatch(plan.geometry.n_azimuth, |gid| kernel::tan_column(buf, &params, gid)))
    }
}

/// Engine for the configured backend preference. An unavailable
/// accelerator falls back to the CPU engine.
pub fn select_engine(config: &ViewConfig, tile: Arc<ScaleData>) -> Result<Box<dyn ViewEngine>, EngineError> {
    select_on(config, tile, Device::detect().cloned())
}

pub(crate) fn select_on(
    config: &ViewConfig,
    tile: Arc<ScaleData>,
    device: Option<Device>,
) -> Result<Box<dyn ViewEngine>, EngineError> {
    if config.backend == BackendPreference::Cpu {
        return Ok(Box::new(CpuEngine::new(tile, config)?));
    }
    match device {
        Some(device) => Ok(Box::new(AccelEngine::with_device(tile, config, device)?)),
        None => {
            warn!("accelerator unavailable; falling back to cpu");
            Ok(Box::new(CpuEngine::new(tile, config)?))
        }
    }
}
