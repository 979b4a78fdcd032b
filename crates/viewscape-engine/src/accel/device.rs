//! Host-emulated kernel dispatch: device detection, resident buffers and
//! launches.
//!
//! There is no GPU here. The "device" is a rayon pool over the host's
//! cores, kept behind a kernel boundary: kernels are launched over a flat
//! work-item range and may only touch the flat buffers uploaded for them.
//! All arithmetic stays in f64, so results match the CPU engine bit for bit.
//!
//! A real device would keep `DeviceBuffers` and the kernels' signatures and
//! replace `dispatch` with a wgpu compute pass: storage buffers bound in a
//! bind group, one `dispatch_workgroups` over the work items, and a mapped
//! staging buffer for read-back, as the sky view factor pass in
//! UMEP-dev-umep-rust (`skyview.rs`) does.

use std::num::NonZeroUsize;
use std::sync::OnceLock;

use log::info;
use rayon::prelude::*;

use viewscape_terrain::ScaleData;

/// Environment switch; `0`, `off` or `false` disables the accelerator.
pub const ACCELERATOR_ENV: &str = "VIEWSCAPE_ACCELERATOR";

static DEVICE: OnceLock<Option<Device>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub compute_units: usize,
}

impl Device {
    /// The process-wide device, detected once.
    pub fn detect() -> Option<&'static Device> {
        DEVICE.get_or_init(discover).as_ref()
    }
}

fn discover() -> Option<Device> {
    if let Ok(v) = std::env::var(ACCELERATOR_ENV) {
        if matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "off" | "false") {
            info!("accelerator disabled by {ACCELERATOR_ENV}={v}");
            return None;
        }
    }
    let compute_units = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    let device = Device {
        name: "host-parallel".to_string(),
        compute_units,
    };
    info!(
        "accelerator: {} with {} compute unit(s)",
        device.name, device.compute_units
    );
    Some(device)
}

/// Terrain resident on the device, as flat row-major arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBuffers {
    pub elevation: Vec<f64>,
    /// Above-ground offset, zeros when the tile has none.
    pub offset: Vec<f64>,
    pub width: usize,
    pub height: usize,
    pub resolution: f64,
}

impl DeviceBuffers {
    pub fn upload(tile: &ScaleData) -> Self {
        let elevation = tile.elevations().to_vec();
        let offset = tile
            .offsets()
            .map_or_else(|| vec![0.0; elevation.len()], <[f64]>::to_vec);
        Self {
            elevation,
            offset,
            width: tile.width(),
            height: tile.height(),
            resolution: tile.resolution(),
        }
    }

    /// Bytes held on the device.
    pub fn size_bytes(&self) -> usize {
        (self.elevation.len() + self.offset.len()) * std::mem::size_of::<f64>()
    }
}

/// Launch `kernel` over work items `0..n` and read the results back in
/// work-item order.
pub fn dispatch<T, F>(n: usize, kernel: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    (0..n).into_par_iter().map(kernel).collect()
}
