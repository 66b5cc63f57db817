//! 直线拟合.
//!
//! 给定一系列点 `(x, y)`, 该模块以最小二乘法拟合一次多项式
//! `y = m * x + b`, 残差在 y 方向上最小化.

use ndarray::ArrayView1;

mod linear;

/// 退化拟合错误.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegenerateFitError {
    /// 所有观测响应值完全相同, 拟合对斜率不提供任何信息.
    ConstantResponse,

    /// 正规方程组奇异 (自变量取值退化).
    SingularNormalEquations,
}

/// 基于最小二乘法拟合一次直线, 返回 `(斜率, 截距)`.
///
/// `x` 是自变量数组, `y` 是对应观测值, 两者必须一一对应且至少有两个点.
/// 解与一次多项式拟合的经典正规方程组闭式解一致.
pub fn linear_f64<'a>(
    x: ArrayView1<'a, f64>,
    y: ArrayView1<'a, f64>,
) -> Result<(f64, f64), DegenerateFitError> {
    linear::LinearImp::new(x, y).fit()
}

/// 基于最小二乘法拟合一次直线, 返回 `(斜率, 截距)`.
///
/// `x` 是自变量数组, `y` 是对应观测值, 两者必须一一对应且至少有两个点.
/// 解与一次多项式拟合的经典正规方程组闭式解一致.
pub fn linear_f32<'a>(
    x: ArrayView1<'a, f32>,
    y: ArrayView1<'a, f32>,
) -> Result<(f32, f32), DegenerateFitError> {
    linear::LinearImp::new(x, y).fit()
}
