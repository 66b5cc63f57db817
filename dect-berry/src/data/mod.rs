use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, ArrayView, ArrayViewMut, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::Idx3d;

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 3D nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    ///
    /// 该值也可以通过 `self.{z_mm, height_mm, width_mm}` 分别获取.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, w, h, z, ..] = self.header().pixdim;
        [z as f64, h as f64, w as f64]
    }

    /// 获取 width 方向 (自然 2D 图像的水平方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn width_mm(&self) -> f64 {
        self.header().pixdim[1] as f64
    }

    /// 获取 height 方向 (自然 2D 图像的垂直方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn height_mm(&self) -> f64 {
        self.header().pixdim[2] as f64
    }

    /// 获取空间方向 (相邻 2D 切片的方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn z_mm(&self) -> f64 {
        self.header().pixdim[3] as f64
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [z, h, w] = self.pix_dim();
        z == h && z == w
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }
}

/// 体素网格不一致错误.
///
/// 双能分解公式只在两个输入逐体素对齐时才有意义,
/// 因此网格不一致会使后续所有输出体素失效, 必须在载入阶段显式暴露.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryMismatchError {
    /// 两侧数据形状不一致. 格式为 (z, H, W).
    Shape {
        /// 基准一侧的形状.
        expected: Idx3d,
        /// 实际一侧的形状.
        found: Idx3d,
    },

    /// 两侧体素分辨率不一致. 格式为 \[z, H, W\], 单位为毫米.
    Spacing {
        /// 基准一侧的分辨率.
        expected: [f64; 3],
        /// 实际一侧的分辨率.
        found: [f64; 3],
    },
}

/// 校验两个 nii 对象是否位于同一体素网格 (形状与体素分辨率完全一致).
pub fn ensure_same_grid<A, B>(a: &A, b: &B) -> Result<(), GeometryMismatchError>
where
    A: NiftiHeaderAttr,
    B: NiftiHeaderAttr,
{
    if a.shape() != b.shape() {
        return Err(GeometryMismatchError::Shape {
            expected: a.shape(),
            found: b.shape(),
        });
    }
    if a.pix_dim() != b.pix_dim() {
        return Err(GeometryMismatchError::Spacing {
            expected: a.pix_dim(),
            found: b.pix_dim(),
        });
    }
    Ok(())
}

/// nii 格式的 3D 单能量 CT 扫描, 包括 header 和 CT 扫描 (HU). HU 值以 `f32` 保存.
///
/// 无论硬盘上的标量类型是什么, 载入时都会统一转换为 `f32`.
#[derive(Debug, Clone)]
pub struct MonoScan {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl NiftiHeaderAttr for MonoScan {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for MonoScan {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for MonoScan {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl MonoScan {
    /// 打开 nii 文件格式的 3D 单能量扫描. `path` 为 nii 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // [W, H, z] -> [z, H, W].
        // hint: 原第一维向下增长, 原第二维向右增长.
        let data = obj
            .into_volume()
            .into_ndarray::<f32>()?
            .permuted_axes([2, 1, 0].as_slice());

        // The nature of nifti data field layout.
        debug_assert!(data.is_standard_layout());

        // 该操作不会生成 `Err`, 可直接 unwrap.
        let data =
            Array3::<f32>::from_shape_vec(get_shape_from_header(&header), data.into_raw_vec())
                .unwrap();

        Ok(Self { header, data })
    }

    /// 将扫描以 nii 格式写入 `path`. 输出 header 继承自本扫描的 header,
    /// 因此体素分辨率与空间定位信息 (qform/sform) 会原样保留.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> nifti::Result<()> {
        // [z, H, W] -> [W, H, z], 即 nifti 数据的原始布局.
        let data = self.data.view().permuted_axes([2, 1, 0]);
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&data)
    }

    /// 根据裸数据和既有 header 直接创建 `MonoScan` 实体.
    ///
    /// `data` 按照本 crate 惯用的 \[z, H, W\] 格式组织,
    /// 其形状必须与 `header` 的 dim 字段一致.
    pub(crate) fn with_header(header: BoxedHeader, data: Array3<f32>) -> Self {
        debug_assert_eq!(get_shape_from_header(&header), data.dim());
        Self { header, data }
    }

    /// 根据裸数据和部分元信息直接创建 `MonoScan` 实体.
    ///
    /// # 参数
    ///
    /// 1. `data` 按照 nifti 惯用标准以 \[w, h, z\] 格式存储.
    /// 2. `pix_dim` 按照 \[w, h, z\] 格式存储, 单位为毫米.
    ///
    /// # 注意
    ///
    /// 该方法可能会创建不一致的实体, 因此你应仅将其用于实验目的.
    pub fn fake(
        data: Array3<f32>,
        pix_dim: [f32; 3],
        qform_code: i16,
        quatern_bcd: [f32; 3],
    ) -> Self {
        let (header, data) = fake_parts(data, pix_dim, qform_code, quatern_bcd);
        Self { header, data }
    }

    /// 判断该结构是否是由 `fake` 方法手动拼接的.
    pub fn is_faked(&self) -> bool {
        self.header.intent_name.starts_with(b"fake")
    }

    /// 计算由 `it` 给出的所有索引对应的 CT HU 值的平均值.
    ///
    /// 如果存在越界索引, 则程序 panic.
    pub fn mean_hu<I: IntoIterator<Item = Idx3d>>(&self, it: I) -> f64 {
        let mut count = 0u64;
        let mut hu = 0.0;
        for pos in it.into_iter() {
            count += 1;
            hu += self[pos] as f64;
        }
        hu / (count as f64)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }
}

/// nii 格式的 3D 标定棒掩膜, 包括 header 和标签数据. 标签值以 `u8` 保存.
#[derive(Debug, Clone)]
pub struct RodMask {
    header: BoxedHeader,
    data: Array3<u8>,
}

impl NiftiHeaderAttr for RodMask {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for RodMask {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for RodMask {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl RodMask {
    /// 打开 nii 文件格式的 3D 标定棒掩膜. `path` 为 nii 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // [W, H, z] -> [z, H, W]
        // hint: 原第一维向下增长, 原第二维向右增长.
        let data = obj
            .into_volume()
            .into_ndarray::<u8>()?
            .permuted_axes([2, 1, 0].as_slice());

        // The nature of nifti data field layout.
        debug_assert!(data.is_standard_layout());

        // 该操作不会生成 `Err`, 可直接 unwrap.
        let data =
            Array3::<u8>::from_shape_vec(get_shape_from_header(&header), data.into_raw_vec())
                .unwrap();

        Ok(Self { header, data })
    }

    /// 将掩膜以 nii 格式写入 `path`. 输出 header 继承自本掩膜的 header.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> nifti::Result<()> {
        // [z, H, W] -> [W, H, z], 即 nifti 数据的原始布局.
        let data = self.data.view().permuted_axes([2, 1, 0]);
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&data)
    }

    /// 根据裸标签数据和部分元信息直接创建 `RodMask` 实体.
    ///
    /// # 参数
    ///
    /// 1. `data` 的标签值应为 0 到 5, 其他值会被视为背景.
    /// 2. `data` 按照 nifti 惯用标准以 \[w, h, z\] 格式存储.
    /// 3. `pix_dim` 按照 \[w, h, z\] 格式存储, 单位为毫米.
    ///
    /// # 注意
    ///
    /// 该方法可能会创建不一致的实体, 因此你应仅将其用于实验目的.
    pub fn fake(
        data: Array3<u8>,
        pix_dim: [f32; 3],
        qform_code: i16,
        quatern_bcd: [f32; 3],
    ) -> Self {
        let (header, data) = fake_parts(data, pix_dim, qform_code, quatern_bcd);
        Self { header, data }
    }

    /// 判断该结构是否是由 `fake` 方法手动拼接的.
    pub fn is_faked(&self) -> bool {
        self.header.intent_name.starts_with(b"fake")
    }

    /// 获取掩膜中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 获取掩膜的基本统计信息.
    ///
    /// 统计信息格式为: \[背景体素数, A 棒体素数, ..., E 棒体素数\].
    /// 该操作不会统计任何其他体素信息.
    pub fn rod_statistics(&self) -> [usize; crate::consts::ROD_COUNT + 1] {
        let mut ans = [0; crate::consts::ROD_COUNT + 1];
        for p in self.data.iter().filter(|p| **p <= crate::consts::rod::ROD_E) {
            ans[*p as usize] += 1;
        }
        ans
    }

    /// 收集满足谓词 `pred` 的所有体素对应的下标, 结果按行优先存储.
    pub fn filter_pos<F: Fn(u8) -> bool>(&self, pred: F) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(ref pos, p)| pred(*p).then_some(*pos))
            .collect()
    }

    /// 收集标签值为 `label` 的标定棒全部体素下标. 结果按行优先存储.
    #[inline]
    pub fn rod_pos(&self, label: u8) -> Vec<Idx3d> {
        self.filter_pos(|p| p == label)
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u8, Ix3> {
        self.data.view_mut()
    }
}

/// `fake` 构造器的公共部分: 将 \[w, h, z\] 数据转为标准布局的 \[z, h, w\],
/// 并拼接出仅含必要字段的 header.
fn fake_parts<T: Clone>(
    data: Array3<T>,
    pix_dim: [f32; 3],
    qform_code: i16,
    quatern_bcd: [f32; 3],
) -> (BoxedHeader, Array3<T>) {
    let (w, h, z) = data.dim();
    let data = data.permuted_axes([2, 1, 0]);
    let data = if data.is_standard_layout() {
        data
    } else {
        data.as_standard_layout().to_owned()
    };
    debug_assert!(data.is_standard_layout());

    let mut header = Box::<NiftiHeader>::default();
    header.dim = [3, w as u16, h as u16, z as u16, 1, 1, 1, 1];
    let [_, pw, ph, pz, ..] = &mut header.pixdim;
    let [w_mm, h_mm, z_mm] = &pix_dim;
    (*pw, *ph, *pz) = (*w_mm, *h_mm, *z_mm);
    header.qform_code = qform_code;
    let [qb, qc, qd] = &quatern_bcd;
    (header.quatern_b, header.quatern_c, header.quatern_d) = (*qb, *qc, *qd);
    header.intent_name[..4].copy_from_slice(b"fake");

    (header, data)
}

/// 打开 DECT 数据错误.
#[derive(Debug)]
pub enum OpenDectError {
    /// 底层 nii 文件读取失败 (文件不存在、格式损坏等).
    Nifti(nifti::NiftiError),

    /// 输入数据的体素网格不一致.
    Geometry(GeometryMismatchError),
}

/// nii 格式的一组 DECT 标定输入: 低能量扫描、高能量扫描与标定棒掩膜.
///
/// 该结构完全透明, 仅包含三个公开的子结构,
/// 用户可以直接使用它们来实现相关上层功能.
///
/// # 注意
///
/// 经由 [`DectData3d::open`] 创建的实体保证三者位于同一体素网格;
/// 手动拼接时该一致性由用户保证, 否则程序行为未定义.
#[derive(Debug, Clone)]
pub struct DectData3d {
    /// 低能量单能扫描.
    pub low: MonoScan,

    /// 高能量单能扫描.
    pub high: MonoScan,

    /// 标定棒掩膜.
    pub mask: RodMask,
}

impl DectData3d {
    /// 分别打开 nii 文件格式的低能量扫描、高能量扫描与标定棒掩膜.
    /// 任一文件打开失败, 或三者体素网格不一致时返回 `Err`.
    pub fn open<P: AsRef<Path>>(
        low_path: P,
        high_path: P,
        mask_path: P,
    ) -> Result<Self, OpenDectError> {
        let low = MonoScan::open(low_path).map_err(OpenDectError::Nifti)?;
        let high = MonoScan::open(high_path).map_err(OpenDectError::Nifti)?;
        ensure_same_grid(&low, &high).map_err(OpenDectError::Geometry)?;

        let mask = RodMask::open(mask_path).map_err(OpenDectError::Nifti)?;
        ensure_same_grid(&low, &mask).map_err(OpenDectError::Geometry)?;

        Ok(Self { low, high, mask })
    }

    /// 获取体素网格形状, 格式为 (z, H, W).
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.low.shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn checker_scan(shape: (usize, usize, usize), pix_dim: [f32; 3]) -> MonoScan {
        let data = Array3::from_shape_fn(shape, |(w, h, z)| (w + 2 * h + 4 * z) as f32);
        MonoScan::fake(data, pix_dim, 1, [0.0, 0.0, 0.0])
    }

    #[test]
    fn test_fake_scan_shape_and_spacing() {
        // [w, h, z] = [2, 3, 4]
        let scan = checker_scan((2, 3, 4), [0.5, 0.5, 1.25]);
        assert!(scan.is_faked());
        assert_eq!(scan.shape(), (4, 3, 2));
        assert_eq!(scan.size(), 24);
        assert_eq!(scan.pix_dim(), [1.25, 0.5, 0.5]);
        assert_eq!(scan.width_mm(), 0.5);
        assert_eq!(scan.height_mm(), 0.5);
        assert_eq!(scan.z_mm(), 1.25);
        assert!(!scan.is_isotropic());
        assert!((scan.voxel() - 0.3125).abs() < 1e-12);

        // 索引按 (z, h, w) 访问, 与 fake 输入的 (w, h, z) 互为转置.
        assert_eq!(scan[(3, 2, 1)], (1 + 2 * 2 + 4 * 3) as f32);
        assert!(scan.check(&(3, 2, 1)));
        assert!(!scan.check(&(4, 0, 0)));
    }

    #[test]
    fn test_mean_hu_subset() {
        let scan = checker_scan((2, 2, 2), [1.0, 1.0, 1.0]);
        let all: Vec<_> = (0..2)
            .flat_map(|z| (0..2).flat_map(move |h| (0..2).map(move |w| (z, h, w))))
            .collect();
        let manual: f64 = all.iter().map(|&p| scan[p] as f64).sum::<f64>() / 8.0;
        assert!((scan.mean_hu(all) - manual).abs() < 1e-12);

        // 单点均值就是该点的值.
        assert_eq!(scan.mean_hu([(0, 0, 0)]), scan[(0, 0, 0)] as f64);
    }

    #[test]
    fn test_ensure_same_grid() {
        let a = checker_scan((2, 3, 4), [1.0, 1.0, 2.0]);
        let b = checker_scan((2, 3, 4), [1.0, 1.0, 2.0]);
        assert_eq!(ensure_same_grid(&a, &b), Ok(()));

        let c = checker_scan((2, 3, 5), [1.0, 1.0, 2.0]);
        assert_eq!(
            ensure_same_grid(&a, &c),
            Err(GeometryMismatchError::Shape {
                expected: (4, 3, 2),
                found: (5, 3, 2),
            })
        );

        let d = checker_scan((2, 3, 4), [1.0, 1.0, 2.5]);
        assert_eq!(
            ensure_same_grid(&a, &d),
            Err(GeometryMismatchError::Spacing {
                expected: [2.0, 1.0, 1.0],
                found: [2.5, 1.0, 1.0],
            })
        );
    }

    #[test]
    fn test_rod_mask_statistics() {
        let mut data = Array3::zeros((3, 3, 3));
        data[(0, 0, 0)] = 1u8;
        data[(1, 1, 1)] = 2;
        data[(2, 2, 2)] = 2;
        data[(0, 2, 1)] = 5;
        let mask = RodMask::fake(data, [1.0, 1.0, 1.0], 1, [0.0, 0.0, 0.0]);

        assert_eq!(mask.count(0), 23);
        assert_eq!(mask.count(1), 1);
        assert_eq!(mask.count(2), 2);
        assert_eq!(mask.count(5), 1);
        assert_eq!(mask.rod_statistics(), [23, 1, 2, 0, 0, 1]);

        assert_eq!(mask.rod_pos(1), vec![(0, 0, 0)]);
        assert_eq!(mask.rod_pos(2).len(), 2);
        assert!(mask.rod_pos(3).is_empty());
    }

    #[test]
    fn test_scan_save_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.nii");

        let scan = checker_scan((3, 4, 5), [0.75, 0.75, 1.5]);
        scan.save(&path).unwrap();

        let loaded = MonoScan::open(&path).unwrap();
        assert_eq!(loaded.shape(), scan.shape());
        assert_eq!(loaded.pix_dim(), scan.pix_dim());
        assert_eq!(loaded.data(), scan.data());
    }

    #[test]
    fn test_mask_save_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.nii");

        let mut data = Array3::zeros((3, 4, 5));
        for label in 1..=5u8 {
            data[(label as usize % 3, label as usize % 4, label as usize % 5)] = label;
        }
        let mask = RodMask::fake(data, [1.0, 1.0, 1.0], 1, [0.0, 0.0, 0.0]);
        mask.save(&path).unwrap();

        let loaded = RodMask::open(&path).unwrap();
        assert_eq!(loaded.shape(), mask.shape());
        assert_eq!(loaded.data(), mask.data());
    }

    #[test]
    fn test_dect_data_open_geometry_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let low_path = dir.path().join("low.nii");
        let high_path = dir.path().join("high.nii");
        let mask_path = dir.path().join("mask.nii");

        checker_scan((2, 2, 2), [1.0, 1.0, 1.0]).save(&low_path).unwrap();
        checker_scan((2, 2, 3), [1.0, 1.0, 1.0]).save(&high_path).unwrap();
        RodMask::fake(Array3::zeros((2, 2, 2)), [1.0, 1.0, 1.0], 1, [0.0; 3])
            .save(&mask_path)
            .unwrap();

        let err = DectData3d::open(&low_path, &high_path, &mask_path).unwrap_err();
        assert!(matches!(
            err,
            OpenDectError::Geometry(GeometryMismatchError::Shape { .. })
        ));

        // 高能量一侧换成一致网格后可正常打开.
        checker_scan((2, 2, 2), [1.0, 1.0, 1.0]).save(&high_path).unwrap();
        let data = DectData3d::open(&low_path, &high_path, &mask_path).unwrap();
        assert_eq!(data.shape(), (2, 2, 2));
    }

    #[test]
    fn test_dect_data_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("no_such.nii");
        let err = DectData3d::open(&missing, &missing, &missing).unwrap_err();
        assert!(matches!(err, OpenDectError::Nifti(_)));
    }
}
