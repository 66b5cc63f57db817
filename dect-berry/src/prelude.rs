//! 🦴欢迎光临🦴
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::consts::rod::{BACKGROUND, ROD_A, ROD_B, ROD_C, ROD_D, ROD_E};
pub use crate::consts::{
    rod_density, CALIBRATED_IMAGE_FILENAME, CALIBRATION_LOG_FILENAME, DEFAULT_MASK_NAME,
    ROD_COUNT, ROD_DENSITY_TABLE,
};

pub use crate::data::{DectData3d, MonoScan, NiftiHeaderAttr, RodMask};

pub use crate::calib::{CalibrationLog, Channel, DectCalibration, LinearCalibration, LogMode};
pub use crate::phantom::{collect_rod_means, rod_mean_hu, RodMeans};
pub use crate::pipeline::{CalibrationTask, PipelineError};
