//! 标定参数日志的持久化存储.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use super::DectCalibration;

/// 日志写入模式.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum LogMode {
    /// 追加到既有日志尾部, 从不改写已有行. 多次标定会在日志中累积,
    /// 形成跨会话的参数审计记录.
    #[default]
    Append,

    /// 清空既有日志后重写, 日志中只保留本次标定的参数.
    Overwrite,
}

/// 写日志错误.
#[derive(Debug)]
pub enum LogError {
    /// 底层 I/O 错误.
    Io(io::Error),

    /// CSV 编码错误.
    Csv(csv::Error),
}

/// 标定参数日志.
///
/// 每次标定向 CSV 文件写入一行四个标量: `m_low, b_low, m_high, b_high`.
/// 表头只在文件为空时写入一次.
///
/// # 注意
///
/// 该日志不加文件锁. 多进程并发写入时各行可能交错,
/// 单操作者批处理场景下可以接受.
pub struct CalibrationLog {
    path: PathBuf,
    mode: LogMode,
}

impl CalibrationLog {
    /// 以默认的追加模式创建日志句柄. 文件不存在时会在首次写入时创建.
    #[inline]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_mode(path, LogMode::Append)
    }

    /// 以指定模式创建日志句柄.
    pub fn with_mode<P: AsRef<Path>>(path: P, mode: LogMode) -> Self {
        Self {
            path: path.as_ref().to_owned(),
            mode,
        }
    }

    /// 日志文件路径.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 将一组标定参数作为单独一行写入日志.
    pub fn record(&self, calib: &DectCalibration) -> Result<(), LogError> {
        let (file, fresh) = self.open_file().map_err(LogError::Io)?;
        let mut wtr = csv::Writer::from_writer(file);

        if fresh {
            wtr.write_record(["m_low", "b_low", "m_high", "b_high"])
                .map_err(LogError::Csv)?;
        }
        wtr.write_record(&[
            calib.low.slope.to_string(),
            calib.low.intercept.to_string(),
            calib.high.slope.to_string(),
            calib.high.intercept.to_string(),
        ])
        .map_err(LogError::Csv)?;

        wtr.flush().map_err(LogError::Io)?;
        Ok(())
    }

    /// 按模式打开底层文件, 并指示当前文件是否为空 (即是否需要写表头).
    fn open_file(&self) -> io::Result<(File, bool)> {
        match self.mode {
            LogMode::Append => {
                let file = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&self.path)?;
                let fresh = file.metadata()?.len() == 0;
                Ok((file, fresh))
            }
            LogMode::Overwrite => Ok((File::create(&self.path)?, true)),
        }
    }
}
