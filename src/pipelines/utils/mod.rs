use candle_core::{Device, DeviceLocation};

/// Where the classifier should run.
#[derive(Clone, Debug, Default)]
pub enum DevicePreference {
    /// First CUDA device, then Metal, then CPU.
    #[default]
    Auto,
    /// CPU even when an accelerator is present (`FORCE_CPU`).
    Cpu,
    /// A specific CUDA ordinal; an error if it cannot be opened.
    Cuda(usize),
    Explicit(Device),
}

impl DevicePreference {
    pub fn resolve(self) -> anyhow::Result<Device> {
        let device = match self {
            DevicePreference::Auto => {
                let cuda = Device::cuda_if_available(0)?;
                if cuda.is_cpu() {
                    Device::metal_if_available(0)?
                } else {
                    cuda
                }
            }
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Cuda(ordinal) => Device::new_cuda(ordinal)?,
            DevicePreference::Explicit(device) => device,
        };
        tracing::debug!(device = %device_label(&device), "device resolved");
        Ok(device)
    }
}

/// Device selection shared by pipeline builders.
pub trait DeviceSelectable: Sized {
    fn device_preference_mut(&mut self) -> &mut DevicePreference;

    fn cpu(mut self) -> Self {
        *self.device_preference_mut() = DevicePreference::Cpu;
        self
    }

    fn cuda_device(mut self, ordinal: usize) -> Self {
        *self.device_preference_mut() = DevicePreference::Cuda(ordinal);
        self
    }

    fn device(mut self, device: Device) -> Self {
        *self.device_preference_mut() = DevicePreference::Explicit(device);
        self
    }
}

/// Short name reported by `/health`: `cpu`, `cuda:0`, `metal:0`.
pub fn device_label(device: &Device) -> String {
    match device.location() {
        DeviceLocation::Cpu => "cpu".to_string(),
        DeviceLocation::Cuda { gpu_id } => format!("cuda:{gpu_id}"),
        DeviceLocation::Metal { gpu_id } => format!("metal:{gpu_id}"),
    }
}
