//! 模体标定棒区域统计.
//!
//! 对掩膜中的每根标定棒, 以 0/1 指示权重计算两个能量通道上的平均 HU.
//! 由于权重只有 0 和 1, 加权平均严格等于被选中体素子集上的算术平均.

use crate::consts::{rod, ROD_COUNT, ROD_DENSITY_TABLE};
use crate::data::{DectData3d, MonoScan, RodMask};

/// 标定棒区域无效错误: 掩膜中不存在给定标签的任何体素.
///
/// 空区域的加权平均没有定义 (除零). 若任其以 NaN 的形式进入拟合,
/// 下游标定会在毫无诊断信息的情况下被污染, 因此这里将其显式暴露.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidMaskError {
    /// 缺失的标定棒标签值.
    pub rod: u8,
}

/// 五根标定棒的区域统计结果. 所有数组均按标签值升序排列.
#[derive(Debug, Clone, PartialEq)]
pub struct RodMeans {
    /// 各棒参考密度, 单位 mg K2HPO4/ccm.
    pub density: [f64; ROD_COUNT],

    /// 低能量通道各棒平均 HU.
    pub low: [f64; ROD_COUNT],

    /// 高能量通道各棒平均 HU.
    pub high: [f64; ROD_COUNT],
}

/// 计算 `scan` 在掩膜 `mask` 中标签值为 `label` 的区域上的平均 HU.
///
/// 区域为空时返回 [`InvalidMaskError`].
pub fn rod_mean_hu(scan: &MonoScan, mask: &RodMask, label: u8) -> Result<f64, InvalidMaskError> {
    let pos = mask.rod_pos(label);
    if pos.is_empty() {
        return Err(InvalidMaskError { rod: label });
    }
    Ok(scan.mean_hu(pos))
}

/// 统计全部五根标定棒在两个能量通道上的平均 HU.
///
/// 任一标定棒在掩膜中不存在体素时返回 [`InvalidMaskError`],
/// 错误中携带缺失的标签值.
pub fn collect_rod_means(data: &DectData3d) -> Result<RodMeans, InvalidMaskError> {
    let mut ans = RodMeans {
        density: [0.0; ROD_COUNT],
        low: [0.0; ROD_COUNT],
        high: [0.0; ROD_COUNT],
    };

    for (i, &(label, density)) in ROD_DENSITY_TABLE.iter().enumerate() {
        let pos = data.mask.rod_pos(label);
        if pos.is_empty() {
            return Err(InvalidMaskError { rod: label });
        }

        let low = data.low.mean_hu(pos.iter().copied());
        let high = data.high.mean_hu(pos.iter().copied());
        log::info!(
            "{} 棒 ({} 体素): 低能量平均 HU = {low}, 高能量平均 HU = {high}",
            rod::letter(label).unwrap(),
            pos.len(),
        );

        ans.density[i] = density;
        ans.low[i] = low;
        ans.high[i] = high;
    }

    Ok(ans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// 构造一组 3x3x3 的测试数据: 掩膜按 `labels` 给出的位置标注五根棒,
    /// 扫描值由闭包按 (w, h, z) 给出.
    fn fake_data<F, G>(labels: &[(u8, (usize, usize, usize))], low: F, high: G) -> DectData3d
    where
        F: Fn((usize, usize, usize)) -> f32,
        G: Fn((usize, usize, usize)) -> f32,
    {
        let mut mask = Array3::zeros((3, 3, 3));
        for &(label, pos) in labels {
            mask[pos] = label;
        }
        DectData3d {
            low: MonoScan::fake(Array3::from_shape_fn((3, 3, 3), low), [1.0; 3], 1, [0.0; 3]),
            high: MonoScan::fake(Array3::from_shape_fn((3, 3, 3), high), [1.0; 3], 1, [0.0; 3]),
            mask: RodMask::fake(mask, [1.0; 3], 1, [0.0; 3]),
        }
    }

    #[test]
    fn test_rod_mean_equals_subset_mean() {
        // A 棒占据三个体素, 其余棒各占一个.
        let labels = [
            (1u8, (0, 0, 0)),
            (1, (1, 0, 0)),
            (1, (2, 1, 0)),
            (2, (0, 1, 1)),
            (3, (1, 1, 1)),
            (4, (2, 2, 1)),
            (5, (0, 2, 2)),
        ];
        let data = fake_data(&labels, |(w, h, z)| (w + 10 * h + 100 * z) as f32, |_| 7.0);

        // 0/1 权重下的加权平均 == 被选中体素上的算术平均.
        let manual: f64 = labels[..3]
            .iter()
            .map(|&(_, (w, h, z))| (w + 10 * h + 100 * z) as f64)
            .sum::<f64>()
            / 3.0;
        let got = rod_mean_hu(&data.low, &data.mask, 1).unwrap();
        assert!((got - manual).abs() < 1e-12);

        // 常值扫描的任意区域平均都是该常值.
        assert_eq!(rod_mean_hu(&data.high, &data.mask, 1).unwrap(), 7.0);
        assert_eq!(rod_mean_hu(&data.high, &data.mask, 5).unwrap(), 7.0);
    }

    #[test]
    fn test_missing_rod_is_an_error() {
        // 只标注了 1, 2, 4, 5 四根棒.
        let labels = [
            (1u8, (0, 0, 0)),
            (2, (1, 1, 1)),
            (4, (2, 2, 2)),
            (5, (0, 2, 1)),
        ];
        let data = fake_data(&labels, |_| 0.0, |_| 0.0);

        assert_eq!(
            rod_mean_hu(&data.low, &data.mask, 3).unwrap_err(),
            InvalidMaskError { rod: 3 }
        );
        assert_eq!(
            collect_rod_means(&data).unwrap_err(),
            InvalidMaskError { rod: 3 }
        );
    }

    #[test]
    fn test_collect_rod_means() {
        // 每棒一个体素, 低能量值 = 标签 * 10, 高能量值 = 标签 * 10 + 1.
        let positions = [(0, 0, 0), (1, 0, 0), (2, 0, 0), (0, 1, 0), (1, 1, 0)];
        let labels: Vec<_> = positions
            .iter()
            .enumerate()
            .map(|(i, &pos)| ((i + 1) as u8, pos))
            .collect();

        let by_label = |pos: (usize, usize, usize), labels: &[(u8, _)]| {
            labels
                .iter()
                .find(|(_, p)| *p == pos)
                .map_or(0.0, |(l, _)| *l as f32 * 10.0)
        };
        let l2 = labels.clone();
        let l3 = labels.clone();
        let data = fake_data(
            &labels,
            move |pos| by_label(pos, &l2),
            move |pos| by_label(pos, &l3) + 1.0,
        );

        let means = collect_rod_means(&data).unwrap();
        assert_eq!(means.density, [-51.83, -53.40, 58.88, 157.05, 375.83]);
        for i in 0..5 {
            assert_eq!(means.low[i], (i + 1) as f64 * 10.0);
            assert_eq!(means.high[i], (i + 1) as f64 * 10.0 + 1.0);
        }
    }
}
