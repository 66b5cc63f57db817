//! 一次多项式最小二乘拟合实现.

// ref: 经典正规方程组 (V^T V) theta = V^T y 的一次特例.

use ndarray::{Array2, ArrayView1, LinalgScalar};
use num::Float;

use super::DegenerateFitError;

pub(crate) struct LinearImp<'a, T> {
    x: ArrayView1<'a, T>,
    y: ArrayView1<'a, T>,
}

impl<'a, T: Float + LinalgScalar> LinearImp<'a, T> {
    pub fn new(x: ArrayView1<'a, T>, y: ArrayView1<'a, T>) -> Self {
        assert_eq!(x.len(), y.len(), "x 值和 y 值必须一一对应");
        assert!(x.len() >= 2, "至少需要拟合两个点");

        Self { x, y }
    }

    /// 解正规方程组 `(V^T V) theta = V^T y`, 返回 `(斜率, 截距)`.
    pub fn fit(&self) -> Result<(T, T), DegenerateFitError> {
        if self.is_constant_response() {
            return Err(DegenerateFitError::ConstantResponse);
        }

        let v = self.vandermonde();
        let vt = v.t();
        // 一次拟合的正规矩阵恒为 2x2.
        let a = vt.dot(&v);
        let rhs = vt.dot(&self.y);

        let det = a[(0, 0)] * a[(1, 1)] - a[(0, 1)] * a[(1, 0)];
        let scale = (a[(0, 0)] * a[(1, 1)]).abs().max(T::one());
        if det.abs() <= scale * T::epsilon() {
            return Err(DegenerateFitError::SingularNormalEquations);
        }

        // 2x2 闭式逆. theta 按升幂排列: [截距, 斜率].
        let intercept = (a[(1, 1)] * rhs[0] - a[(0, 1)] * rhs[1]) / det;
        let slope = (a[(0, 0)] * rhs[1] - a[(1, 0)] * rhs[0]) / det;

        Ok((slope, intercept))
    }

    /// 观测响应是否为常值?
    ///
    /// 常值响应下最小二乘解仍然存在 (斜率为零),
    /// 但对标定而言它不携带任何通道信息, 统一视为退化.
    fn is_constant_response(&self) -> bool {
        let first = self.y[0];
        self.y.iter().all(|v| *v == first)
    }

    fn vandermonde(&self) -> Array2<T> {
        // shape: (m, 2); m = x.len()
        Array2::<T>::from_shape_fn((self.x.len(), 2), |(m, n)| self.x[m].powi(n as i32))
    }
}
