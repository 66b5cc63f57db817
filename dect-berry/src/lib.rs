#![warn(missing_docs)]

//! 核心库. 提供基于 Mindways K2HPO4 固体标定模体的双能 CT (DECT)
//! 骨密度标定功能: 从模体扫描推导标定参数, 并将一对单能量图像转换为
//! mg K2HPO4/ccm 等效骨密度图.
//!
//! # 注意
//!
//! 1. 标定方法基于 Sfeir et al., Bone 2018 与 Gluer et al.,
//!   J Computer Assisted Tomography 1988 所述的双能分解公式.
//! 2. 模体掩膜应以 1 到 5 标注五根标定棒 (A 到 E), 参考密度见
//!   [`consts::ROD_DENSITY_TABLE`].
//! 3. 在非期望情况下, 程序会直接 panic, 而不会导致内存错误.
//!   As what Rust promises.
//!
//! # 流程
//!
//! 整个标定是一条无分支的流水线, 参见 [`pipeline`] 模块:
//!
//! 1. 载入两幅共配准的单能量扫描和一幅标定棒掩膜 ([`data`](DectData3d)),
//!   并校验三者位于同一体素网格;
//! 2. 对五根标定棒分别统计两个能量通道上的平均 HU ([`phantom`]);
//! 3. 每个通道独立拟合一条 `HU = m * density + b` 直线
//!   ([`fitting`], [`calib`]);
//! 4. 将四个拟合标量写入参数日志 ([`calib::CalibrationLog`]);
//! 5. 以闭式双能分解公式逐体素合成密度图并写出
//!   ([`calib::DectCalibration::synthesize`]).

/// 三维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx3d = (usize, usize, usize);

pub mod consts;

/// 3D nii 文件基础数据结构.
mod data;

pub use data::{
    ensure_same_grid, DectData3d, GeometryMismatchError, MonoScan, NiftiHeaderAttr, OpenDectError,
    RodMask,
};

pub mod calib;
pub mod fitting;
pub mod phantom;
pub mod pipeline;
pub mod prelude;
