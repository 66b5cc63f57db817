//! 双能标定参数与密度合成.
//!
//! 两个能量通道各自拟合一条 `HU = slope * density + intercept` 直线,
//! 然后以闭式双能分解公式将整幅图像从 HU 转换为 mg K2HPO4/ccm.
//! 方法参考 Sfeir et al., Bone 2018 与 Gluer et al., JCAT 1988.

use ndarray::{ArrayView1, Zip};

use crate::consts::ROD_COUNT;
use crate::data::{ensure_same_grid, GeometryMismatchError, MonoScan, NiftiHeaderAttr};
use crate::fitting::{self, DegenerateFitError};
use crate::phantom::RodMeans;

mod log;

pub use self::log::{CalibrationLog, LogError, LogMode};

/// 能量通道.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Channel {
    /// 低能量单能通道.
    Low,

    /// 高能量单能通道.
    High,
}

impl Channel {
    /// 通道的诊断名称.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Channel::Low => "低能量",
            Channel::High => "高能量",
        }
    }
}

/// 单通道线性标定参数: `HU = slope * density + intercept`.
///
/// 拟合完成后不可变.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LinearCalibration {
    /// 直线斜率.
    pub slope: f64,

    /// 直线截距.
    pub intercept: f64,
}

impl LinearCalibration {
    /// 以最小二乘法从 `(参考密度, 观测平均 HU)` 点集拟合标定直线.
    pub fn fit(density: &[f64], mean_hu: &[f64]) -> Result<Self, DegenerateFitError> {
        let (slope, intercept) =
            fitting::linear_f64(ArrayView1::from(density), ArrayView1::from(mean_hu))?;
        Ok(Self { slope, intercept })
    }

    /// 求标定直线在给定密度处的 HU 预测值.
    #[inline]
    pub fn eval(&self, density: f64) -> f64 {
        self.slope * density + self.intercept
    }
}

/// 单个能量通道拟合失败.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFitError {
    /// 失败的能量通道.
    pub channel: Channel,

    /// 具体退化原因.
    pub error: DegenerateFitError,
}

/// 密度合成错误.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisError {
    /// 两个通道的标定直线斜率相同, 分解公式分母为零.
    DegenerateSlopes {
        /// 两侧共同的斜率值.
        slope: f64,
    },

    /// 两个输入扫描的体素网格不一致.
    Geometry(GeometryMismatchError),
}

/// 一次 DECT 标定得到的全部参数: 低能量与高能量通道各一条标定直线.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DectCalibration {
    /// 低能量通道标定.
    pub low: LinearCalibration,

    /// 高能量通道标定.
    pub high: LinearCalibration,
}

impl DectCalibration {
    /// 从五根标定棒的区域统计结果分别拟合两个通道.
    ///
    /// 两次拟合相互独立, 不共享任何状态; 任一通道退化即失败,
    /// 错误中携带失败的通道.
    pub fn fit(means: &RodMeans) -> Result<Self, ChannelFitError> {
        let fit_one = |channel: Channel, y: &[f64; ROD_COUNT]| {
            let calib = LinearCalibration::fit(&means.density, y)
                .map_err(|error| ChannelFitError { channel, error })?;
            ::log::info!(
                "{}通道: m = {}, b = {}",
                channel.name(),
                calib.slope,
                calib.intercept,
            );
            Ok(calib)
        };

        Ok(Self {
            low: fit_one(Channel::Low, &means.low)?,
            high: fit_one(Channel::High, &means.high)?,
        })
    }

    /// 两个通道的斜率差, 即双能分解公式的分母.
    #[inline]
    pub fn slope_gap(&self) -> f64 {
        self.high.slope - self.low.slope
    }

    /// 以双能分解公式将整幅图像从 HU 合成为 mg K2HPO4/ccm:
    ///
    /// ```text
    /// density = ((I_high - b_high) - (I_low - b_low)) / (m_high - m_low)
    /// ```
    ///
    /// 公式作用于全部体素, 不限于掩膜区域. 输入不会被修改;
    /// 输出继承低能量扫描的几何信息 (分辨率与空间定位).
    ///
    /// 斜率差为零时在任何体素计算发生前返回
    /// [`SynthesisError::DegenerateSlopes`]; 两个输入网格不一致时返回
    /// [`SynthesisError::Geometry`].
    pub fn synthesize(&self, low: &MonoScan, high: &MonoScan) -> Result<MonoScan, SynthesisError> {
        ensure_same_grid(low, high).map_err(SynthesisError::Geometry)?;

        let gap = self.slope_gap();
        if gap == 0.0 {
            return Err(SynthesisError::DegenerateSlopes {
                slope: self.low.slope,
            });
        }

        let (b_low, b_high) = (self.low.intercept, self.high.intercept);
        let data = Zip::from(low.data())
            .and(high.data())
            .map_collect(|&l, &h| ((((h as f64) - b_high) - ((l as f64) - b_low)) / gap) as f32);

        Ok(MonoScan::with_header(
            Box::new(low.header().clone()),
            data,
        ))
    }
}
