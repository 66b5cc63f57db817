//! 一次完整的标定批处理流程.
//!
//! 数据流严格线性: 载入 -> 区域统计 -> 两次拟合 -> {参数持久化, 密度合成}.
//! 流程一次性跑完或整体失败: 没有部分结果, 没有重试, 也没有恢复路径.
//! 失败时错误中携带足以定位问题的上下文 (哪根棒、哪个通道),
//! 以便操作者修正模体分割或重新扫描.

use std::path::PathBuf;

use crate::calib::{
    CalibrationLog, ChannelFitError, DectCalibration, LogError, LogMode, SynthesisError,
};
use crate::consts::{CALIBRATED_IMAGE_FILENAME, CALIBRATION_LOG_FILENAME, DEFAULT_MASK_NAME};
use crate::data::{DectData3d, NiftiHeaderAttr, OpenDectError};
use crate::phantom::{self, InvalidMaskError};

/// 流程运行错误.
#[derive(Debug)]
pub enum PipelineError {
    /// 输入数据载入失败 (文件缺失、格式损坏或体素网格不一致).
    Open(OpenDectError),

    /// 掩膜中缺失标定棒区域.
    Mask(InvalidMaskError),

    /// 某个能量通道的标定直线拟合退化.
    Fit(ChannelFitError),

    /// 参数日志写入失败.
    Log(LogError),

    /// 密度合成失败.
    Synthesis(SynthesisError),

    /// 输出图像写入失败.
    Write(nifti::NiftiError),
}

/// 标定任务参数.
#[derive(Debug, Clone)]
pub struct CalibrationTask {
    /// 输入与输出所在目录.
    pub dir: PathBuf,

    /// 低能量单能扫描的文件名 (不含 `.nii` 后缀).
    pub low_name: String,

    /// 高能量单能扫描的文件名 (不含 `.nii` 后缀).
    pub high_name: String,

    /// 标定棒掩膜的文件名 (不含 `.nii` 后缀).
    pub mask_name: String,

    /// 参数日志写入模式.
    pub log_mode: LogMode,
}

impl CalibrationTask {
    /// 创建使用默认掩膜文件名和默认日志模式 (追加) 的标定任务.
    pub fn new<P, S>(dir: P, low_name: S, high_name: S) -> Self
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        Self {
            dir: dir.into(),
            low_name: low_name.into(),
            high_name: high_name.into(),
            mask_name: DEFAULT_MASK_NAME.to_owned(),
            log_mode: LogMode::default(),
        }
    }

    /// 输入文件的全路径: `{dir}/{name}.nii`.
    fn input_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.nii"))
    }

    /// 输出标定图像的全路径.
    pub fn output_path(&self) -> PathBuf {
        self.dir.join(CALIBRATED_IMAGE_FILENAME)
    }

    /// 参数日志的全路径.
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(CALIBRATION_LOG_FILENAME)
    }

    /// 运行整个标定流程, 成功时返回输出图像路径.
    ///
    /// 效果顺序与参数日志语义见各子模块文档: 参数先于合成图像落盘,
    /// 拟合失败时两者都不会产生.
    pub fn run(&self) -> Result<PathBuf, PipelineError> {
        let data = DectData3d::open(
            self.input_path(&self.low_name),
            self.input_path(&self.high_name),
            self.input_path(&self.mask_name),
        )
        .map_err(PipelineError::Open)?;
        log::info!(
            "输入载入完成: 形状 {:?}, 体素分辨率 {:?} mm, 体素体积 {:.6} mm^3",
            data.shape(),
            data.low.pix_dim(),
            data.low.voxel(),
        );

        let means = phantom::collect_rod_means(&data).map_err(PipelineError::Mask)?;
        let calib = DectCalibration::fit(&means).map_err(PipelineError::Fit)?;

        CalibrationLog::with_mode(self.log_path(), self.log_mode)
            .record(&calib)
            .map_err(PipelineError::Log)?;

        let out = calib
            .synthesize(&data.low, &data.high)
            .map_err(PipelineError::Synthesis)?;
        let out_path = self.output_path();
        out.save(&out_path).map_err(PipelineError::Write)?;
        log::info!("标定图像已写入 {}", out_path.display());

        Ok(out_path)
    }
}
