//! 时间轴与网格对齐模块
//!
//! `TimelineState` 负责像素与脉冲之间的换算，`Snapping` 在其上提供网格对齐。

use crate::structure::{ppqn, Ppqn};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineState {
    pub zoom_x: f32,   // 水平缩放（像素/四分音符）
    pub scroll_x: f64, // 水平滚动位置（脉冲），即 x = 0 处的时间
    pub scroll_y: f32, // 垂直滚动位置（像素）
}

impl Default for TimelineState {
    fn default() -> Self {
        Self {
            zoom_x: 100.0,
            scroll_x: 0.0,
            scroll_y: 0.0,
        }
    }
}

impl TimelineState {
    pub fn units_per_pixel(&self) -> f64 {
        ppqn::QUARTER as f64 / self.zoom_x.max(f32::EPSILON) as f64
    }

    /// 将 x 坐标（像素）转换为脉冲（未取整）
    pub fn x_to_unit(&self, x: f32) -> f64 {
        self.scroll_x + x as f64 * self.units_per_pixel()
    }

    /// 将脉冲转换为 x 坐标（像素）
    pub fn unit_to_x(&self, unit: Ppqn) -> f32 {
        ((unit as f64 - self.scroll_x) / self.units_per_pixel()) as f32
    }
}

const SMART_MIN_PIXEL: f32 = 16.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapUnit {
    pub name: &'static str,
    // None 表示随缩放变化的 Smart 单位
    pulses: Option<Ppqn>,
}

pub const SNAP_UNITS: [SnapUnit; 13] = [
    SnapUnit { name: "Smart", pulses: None },
    SnapUnit { name: "Bar", pulses: Some(ppqn::from_signature(1, 1)) },
    SnapUnit { name: "1/2", pulses: Some(ppqn::from_signature(1, 2)) },
    SnapUnit { name: "1/4", pulses: Some(ppqn::from_signature(1, 4)) },
    SnapUnit { name: "1/8", pulses: Some(ppqn::from_signature(1, 8)) },
    SnapUnit { name: "1/8T", pulses: Some(ppqn::from_signature(1, 4) / 3) },
    SnapUnit { name: "1/16", pulses: Some(ppqn::from_signature(1, 16)) },
    SnapUnit { name: "1/16T", pulses: Some(ppqn::from_signature(1, 8) / 3) },
    SnapUnit { name: "1/32", pulses: Some(ppqn::from_signature(1, 32)) },
    SnapUnit { name: "1/32T", pulses: Some(ppqn::from_signature(1, 16) / 3) },
    SnapUnit { name: "1/64", pulses: Some(ppqn::from_signature(1, 64)) },
    SnapUnit { name: "1/128", pulses: Some(ppqn::from_signature(1, 128)) },
    SnapUnit { name: "Off", pulses: Some(1) },
];

// Math.round 语义：0.5 向正无穷取整
fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

#[derive(Clone, Debug)]
pub struct Snapping {
    timeline: TimelineState,
    enabled: bool,
    index: usize,
    smart_min_pixel: f32,
}

impl Default for Snapping {
    fn default() -> Self {
        Self::new(TimelineState::default())
    }
}

impl Snapping {
    pub fn new(timeline: TimelineState) -> Self {
        Self {
            timeline,
            enabled: true,
            index: 0,
            smart_min_pixel: SMART_MIN_PIXEL,
        }
    }

    pub fn timeline(&self) -> &TimelineState {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut TimelineState {
        &mut self.timeline
    }

    pub fn units(&self) -> &'static [SnapUnit] {
        &SNAP_UNITS
    }

    pub fn unit(&self) -> SnapUnit {
        SNAP_UNITS[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// 超出范围的索引会被截断到最后一个单位
    pub fn set_index(&mut self, index: usize) {
        self.index = index.min(SNAP_UNITS.len() - 1);
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn set_smart_min_pixel(&mut self, pixels: f32) {
        self.smart_min_pixel = pixels.max(1.0);
    }

    /// 当前单位的脉冲数；禁用时为 1
    pub fn value(&self) -> Ppqn {
        if !self.enabled {
            return 1;
        }
        self.unit().pulses.unwrap_or_else(|| self.smart_pulses())
    }

    fn smart_pulses(&self) -> Ppqn {
        let min_units = self.smart_min_pixel as f64 * self.timeline.units_per_pixel();
        let step_exp = (min_units / ppqn::BAR as f64).log2().ceil();
        let pulses = (ppqn::BAR as f64 * 2f64.powf(step_exp) + 0.5).floor() as Ppqn;
        pulses.clamp(ppqn::from_signature(1, 16), ppqn::BAR)
    }

    pub fn floor(&self, value: Ppqn) -> Ppqn {
        let units = self.value();
        value.div_euclid(units) * units
    }

    pub fn round(&self, value: Ppqn) -> Ppqn {
        self.round_f64(value as f64)
    }

    pub fn ceil(&self, value: Ppqn) -> Ppqn {
        let units = self.value();
        -((-value).div_euclid(units)) * units
    }

    fn round_f64(&self, value: f64) -> Ppqn {
        let units = self.value();
        round_half_up(value / units as f64) as Ppqn * units
    }

    pub fn x_to_unit_floor(&self, x: f32) -> Ppqn {
        let units = self.value();
        (self.timeline.x_to_unit(x) / units as f64).floor() as Ppqn * units
    }

    pub fn x_to_unit_round(&self, x: f32) -> Ppqn {
        self.round_f64(self.timeline.x_to_unit(x))
    }

    /// 计算拖拽增量：分别按相对网格（保持原偏移）与绝对网格对齐，
    /// 取更接近指针实际位置的那一个。
    pub fn compute_delta(&self, begin_pointer_pulse: Ppqn, pointer_x: f32, begin_value: Ppqn) -> Ppqn {
        let pointer_ticks =
            self.timeline.x_to_unit(pointer_x) - (begin_pointer_pulse - begin_value) as f64;
        let local_delta = self.round_f64(pointer_ticks - begin_value as f64);
        let global_delta = self.round_f64(pointer_ticks) - begin_value;
        let local_distance = ((begin_value + local_delta) as f64 - pointer_ticks).abs();
        let global_distance = ((begin_value + global_delta) as f64 - pointer_ticks).abs();
        if local_distance < global_distance {
            local_delta
        } else {
            global_delta
        }
    }
}
