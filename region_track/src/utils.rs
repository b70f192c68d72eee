//! 工具函数模块
//!
//! 包含通用的工具函数，如音乐时间格式化等。

use crate::structure::{ppqn, Ppqn};

/// 将脉冲格式化为 "小节.拍.十六分音符:tick" 格式（均从 1 开始计数，tick 除外）
///
/// # 示例
///
/// ```
/// use region_track::utils::format_pulses;
///
/// assert_eq!(format_pulses(0), "1.1.1:0");
/// assert_eq!(format_pulses(3840 + 960 + 250), "2.2.2:10");
/// ```
pub fn format_pulses(pulses: Ppqn) -> String {
    let sign = if pulses < 0 { "-" } else { "" };
    let pulses = pulses.abs();
    let bars = pulses / ppqn::BAR;
    let beats = (pulses % ppqn::BAR) / ppqn::QUARTER;
    let semiquavers = (pulses % ppqn::QUARTER) / ppqn::SEMI_QUAVER;
    let ticks = pulses % ppqn::SEMI_QUAVER;
    format!("{}{}.{}.{}:{}", sign, bars + 1, beats + 1, semiquavers + 1, ticks)
}
