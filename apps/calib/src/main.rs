//! 基于 Mindways K2HPO4 固体标定模体的 DECT 骨密度标定命令行入口.

use std::path::PathBuf;

use clap::Parser;
use dect_berry::calib::LogMode;
use dect_berry::consts::DEFAULT_MASK_NAME;
use dect_berry::pipeline::{CalibrationTask, PipelineError};
use simple_logger::SimpleLogger;

const LONG_ABOUT: &str = "\
读入两幅模拟单能量图像 (由 GE 设备生成) 和一幅标定棒掩膜, 基于 Mindways
固体 CT 标定模体推导 DECT 标定, 并将整幅图像从 HU 转换为 mg K2HPO4/ccm.

掩膜图像应使用如下标签值:
    375.83 mg K2HPO4 棒 = 5
    157.05 mg K2HPO4 棒 = 4
    58.88  mg K2HPO4 棒 = 3
    -53.40 mg K2HPO4 棒 = 2
    -51.83 mg K2HPO4 棒 = 1

输出为 <file_path>/Calibrated_DECT.nii, 四个拟合标量会同时写入
<file_path>/CalibrationSlope&Offset_DECT.csv.

标定方法参考 Sfeir et al., Bone 2018 与 Gluer et al., JCAT 1988.";

/// DECT 骨密度标定.
#[derive(Parser, Debug)]
#[command(
    name = "dect-calib",
    version,
    about = "基于 K2HPO4 模体的 DECT 骨密度标定",
    long_about = LONG_ABOUT
)]
struct Cli {
    /// 输入与输出所在目录.
    file_path: PathBuf,

    /// 低能量模拟单能量图像的文件名 (不含 .nii 后缀).
    #[arg(long = "lowenergy_filename", visible_alias = "le")]
    lowenergy_filename: String,

    /// 高能量模拟单能量图像的文件名 (不含 .nii 后缀).
    #[arg(long = "highenergy_filename", visible_alias = "he")]
    highenergy_filename: String,

    /// K2HPO4 标定棒掩膜的文件名 (不含 .nii 后缀).
    #[arg(long = "mask_fnm", short = 'm', default_value = DEFAULT_MASK_NAME)]
    mask_fnm: String,

    /// 重写参数日志, 而不是向其追加.
    #[arg(long = "overwrite_log")]
    overwrite_log: bool,
}

fn main() -> Result<(), PipelineError> {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()
        .unwrap();

    let cli = Cli::parse();
    log::info!("file_path: {}", cli.file_path.display());
    log::info!("lowenergy_filename: {}", cli.lowenergy_filename);
    log::info!("highenergy_filename: {}", cli.highenergy_filename);
    log::info!("mask_fnm: {}", cli.mask_fnm);
    log::info!("overwrite_log: {}", cli.overwrite_log);

    let task = CalibrationTask {
        dir: cli.file_path,
        low_name: cli.lowenergy_filename,
        high_name: cli.highenergy_filename,
        mask_name: cli.mask_fnm,
        log_mode: if cli.overwrite_log {
            LogMode::Overwrite
        } else {
            LogMode::Append
        },
    };

    let out = task.run()?;
    log::info!("标定完成: {}", out.display());
    Ok(())
}
