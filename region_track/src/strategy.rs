//! 修改策略模块
//!
//! 策略是只读视图：回答“手势进行中，这个区域此刻在哪里”，不修改任何数据。
//! 预览渲染、重叠求解和最终提交都通过同一组读取函数，因此所见即所得。

use crate::structure::{Ppqn, Region};
use serde::{Deserialize, Serialize};

pub trait ModifyStrategy {
    fn read_position(&self, region: &Region) -> Ppqn;
    fn read_complete(&self, region: &Region) -> Ppqn;
    fn read_duration(&self, region: &Region) -> Ppqn {
        self.read_complete(region) - self.read_position(region)
    }
    fn read_loop_offset(&self, region: &Region) -> Ppqn;
    fn read_loop_duration(&self, region: &Region) -> Ppqn;
    fn read_mirror(&self, region: &Region) -> bool;
    /// 显示在 `index` 音轨上的区域来自哪条源音轨
    fn translate_track_index(&self, index: isize) -> isize;
}

/// 原样返回存储值的策略
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

pub static IDENTITY: Identity = Identity;

impl ModifyStrategy for Identity {
    fn read_position(&self, region: &Region) -> Ppqn {
        region.position
    }

    fn read_complete(&self, region: &Region) -> Ppqn {
        region.complete()
    }

    fn read_loop_offset(&self, region: &Region) -> Ppqn {
        region.loop_offset
    }

    fn read_loop_duration(&self, region: &Region) -> Ppqn {
        region.loop_duration
    }

    fn read_mirror(&self, region: &Region) -> bool {
        region.is_mirrored()
    }

    fn translate_track_index(&self, index: isize) -> isize {
        index
    }
}

/// 一个手势对外暴露的两种策略：已选区域与其余区域
pub trait ModifyStrategies {
    /// 为 true 时，被拖拽区域的原位置仍参与重叠求解（复制模式）
    fn show_origin(&self) -> bool;
    fn selected_strategy(&self) -> &dyn ModifyStrategy;
    fn unselected_strategy(&self) -> &dyn ModifyStrategy;

    fn strategy_for(&self, region: &Region) -> &dyn ModifyStrategy {
        if region.selected {
            self.selected_strategy()
        } else {
            self.unselected_strategy()
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct IdentityStrategies {
    include_origin: bool,
}

/// 没有手势时使用
pub static IDENTITY_STRATEGIES: IdentityStrategies = IdentityStrategies { include_origin: false };
/// 已选区域同样作为地面区域被裁剪
pub static IDENTITY_INCLUDE_ORIGIN: IdentityStrategies = IdentityStrategies { include_origin: true };

impl ModifyStrategies for IdentityStrategies {
    fn show_origin(&self) -> bool {
        self.include_origin
    }

    fn selected_strategy(&self) -> &dyn ModifyStrategy {
        &IDENTITY
    }

    fn unselected_strategy(&self) -> &dyn ModifyStrategy {
        &IDENTITY
    }
}

/// 区域在当前手势下的实时预览
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionPreview {
    pub position: Ppqn,
    pub complete: Ppqn,
    pub loop_offset: Ppqn,
    pub loop_duration: Ppqn,
    pub mirrored: bool,
    pub track_index: usize,
}

impl RegionPreview {
    /// `track_index` 是区域所在的源音轨索引
    pub fn read(strategy: &dyn ModifyStrategy, region: &Region, track_index: usize) -> Self {
        let index = track_index as isize;
        let shift = index - strategy.translate_track_index(index);
        Self {
            position: strategy.read_position(region),
            complete: strategy.read_complete(region),
            loop_offset: strategy.read_loop_offset(region),
            loop_duration: strategy.read_loop_duration(region),
            mirrored: strategy.read_mirror(region),
            track_index: (index + shift).max(0) as usize,
        }
    }

    pub fn duration(&self) -> Ppqn {
        self.complete - self.position
    }
}
