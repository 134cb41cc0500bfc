//! 🜂 Уровень 1: Жрецы Железа - Выбор устройства
//!
//! Выбор GPU/CPU для candle моделей (эмбеддинги и локальная генерация)
//! с автоматическим fallback на CPU

use anyhow::Result;
use candle_core::Device;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Тип устройства
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeviceType {
    Cpu { cores: usize },
    Cuda { device_id: usize },
    Metal { device_id: usize },
}

impl DeviceType {
    /// Возвращает человекочитаемое имя типа
    pub fn name(&self) -> &str {
        match self {
            DeviceType::Cpu { .. } => "CPU",
            DeviceType::Cuda { .. } => "CUDA",
            DeviceType::Metal { .. } => "Metal",
        }
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, DeviceType::Cuda { .. } | DeviceType::Metal { .. })
    }
}

/// Выбирает лучшее доступное устройство
pub fn select_device(force_cpu: bool) -> Result<Device> {
    let (device, device_type) = discover(force_cpu)?;
    info!(device = device_type.name(), ?device_type, "compute device selected");
    Ok(device)
}

fn discover(force_cpu: bool) -> Result<(Device, DeviceType)> {
    let cpu = (
        Device::Cpu,
        DeviceType::Cpu {
            cores: num_cpus::get(),
        },
    );

    if force_cpu {
        return Ok(cpu);
    }

    if candle_core::utils::cuda_is_available() {
        match Device::new_cuda(0) {
            Ok(device) => return Ok((device, DeviceType::Cuda { device_id: 0 })),
            Err(e) => warn!(error = %e, "CUDA reported available but failed to initialise"),
        }
    }

    if candle_core::utils::metal_is_available() {
        match Device::new_metal(0) {
            Ok(device) => return Ok((device, DeviceType::Metal { device_id: 0 })),
            Err(e) => warn!(error = %e, "Metal reported available but failed to initialise"),
        }
    }

    Ok(cpu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_cpu() {
        let (device, device_type) = discover(true).unwrap();
        assert!(matches!(device, Device::Cpu));
        assert!(!device_type.is_gpu());
        assert_eq!(device_type.name(), "CPU");
    }
}
