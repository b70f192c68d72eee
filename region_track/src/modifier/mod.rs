//! 手势修改器模块
//!
//! 每个修改器都是一个由指针事件驱动的小状态机：`update` 只重新计算增量，
//! 预览通过修改器暴露的策略读取；只有 `approve` 才会在一个事务中写入数据。

mod duration;
mod loop_duration;
mod moving;
mod start;

pub use duration::RegionDurationModifier;
pub use loop_duration::RegionLoopDurationModifier;
pub use moving::RegionMoveModifier;
pub use start::RegionStartModifier;

use crate::arrangement::Arrangement;
use crate::editing::Editing;
use crate::error::EditError;
use crate::resolver::{validate_tracks, RegionClipResolver};
use crate::strategy::{ModifyStrategies, ModifyStrategy};
use crate::structure::{Ppqn, Region, RegionId, Track, TrackId};
use crate::timeline::Snapping;
use egui::{Modifiers, Pos2};

/// 指针事件。`position.x` 相对于时间轴内容区左侧，`position.y` 相对于音轨区顶部。
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PointerEvent {
    pub position: Pos2,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            position: Pos2::new(x, y),
            modifiers: Modifiers::NONE,
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// 手势开始时的指针上下文
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PointerContext {
    pub pointer_pulse: Ppqn,
    pub pointer_index: usize,
    pub reference: RegionId,
}

/// `update` 期间修改器可见的只读环境
pub struct GestureEnv<'a> {
    pub arrangement: &'a Arrangement,
    pub snapping: &'a Snapping,
    /// 当前指针所在的音轨索引（可能等于音轨数量）
    pub pointer_index: usize,
}

/// `approve` 的结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Approval {
    /// 需要重绘的音轨
    pub tracks: Vec<TrackId>,
    /// 是否写入了一个撤销步骤
    pub committed: bool,
}

pub enum RegionModifier {
    Move(RegionMoveModifier),
    Start(RegionStartModifier),
    Duration(RegionDurationModifier),
    LoopDuration(RegionLoopDurationModifier),
}

impl RegionModifier {
    pub fn name(&self) -> &'static str {
        match self {
            RegionModifier::Move(_) => "RegionMoveModifier",
            RegionModifier::Start(_) => "RegionStartModifier",
            RegionModifier::Duration(_) => "RegionDurationModifier",
            RegionModifier::LoopDuration(_) => "RegionLoopDurationModifier",
        }
    }

    /// 返回预览发生变化的音轨；没有变化时为空
    pub fn update(&mut self, event: &PointerEvent, env: &GestureEnv<'_>) -> Vec<TrackId> {
        match self {
            RegionModifier::Move(m) => m.update(event, env),
            RegionModifier::Start(m) => m.update(event, env),
            RegionModifier::Duration(m) => m.update(event, env),
            RegionModifier::LoopDuration(m) => m.update(event, env),
        }
    }

    pub fn approve(self, arrangement: &mut Arrangement, editing: &mut Editing) -> Result<Approval, EditError> {
        match self {
            RegionModifier::Move(m) => m.approve(arrangement, editing),
            RegionModifier::Start(m) => m.approve(arrangement, editing),
            RegionModifier::Duration(m) => m.approve(arrangement, editing),
            RegionModifier::LoopDuration(m) => m.approve(arrangement, editing),
        }
    }

    /// 丢弃手势，返回需要重绘的音轨。不修改任何数据。
    pub fn cancel(&mut self, arrangement: &Arrangement) -> Vec<TrackId> {
        match self {
            RegionModifier::Move(m) => m.cancel(arrangement),
            RegionModifier::Start(m) => m.cancel(),
            RegionModifier::Duration(m) => m.cancel(),
            RegionModifier::LoopDuration(m) => m.cancel(),
        }
    }

    fn strategies(&self) -> &dyn ModifyStrategies {
        match self {
            RegionModifier::Move(m) => m,
            RegionModifier::Start(m) => m,
            RegionModifier::Duration(m) => m,
            RegionModifier::LoopDuration(m) => m,
        }
    }
}

impl ModifyStrategies for RegionModifier {
    fn show_origin(&self) -> bool {
        self.strategies().show_origin()
    }

    fn selected_strategy(&self) -> &dyn ModifyStrategy {
        self.strategies().selected_strategy()
    }

    fn unselected_strategy(&self) -> &dyn ModifyStrategy {
        self.strategies().unselected_strategy()
    }
}

/// 修剪类手势开始时的区域快照
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct TrimTarget {
    pub id: RegionId,
    pub track: TrackId,
    pub position: Ppqn,
    pub duration: Ppqn,
    pub loop_offset: Ppqn,
    pub loop_duration: Ppqn,
    /// 相邻区域给出的边界
    pub limiter: Option<Ppqn>,
}

impl TrimTarget {
    pub fn complete(&self) -> Ppqn {
        self.position + self.duration
    }
}

/// 收集所选区域中可循环的区域；`limiter` 根据所在音轨计算边界
pub(crate) fn trim_targets<L>(arrangement: &Arrangement, selection: &[RegionId], limiter: L) -> Vec<TrimTarget>
where
    L: Fn(&Track, &Region) -> Option<Ppqn>,
{
    arrangement
        .tracks()
        .iter()
        .flat_map(|track| track.regions.iter().map(move |region| (track, region)))
        .filter(|(_, region)| selection.contains(&region.id) && region.is_loopable())
        .map(|(track, region)| TrimTarget {
            id: region.id,
            track: track.id,
            position: region.position,
            duration: region.duration,
            loop_offset: region.loop_offset,
            loop_duration: region.loop_duration,
            limiter: limiter(track, region),
        })
        .collect()
}

pub(crate) fn distinct_tracks(targets: &[TrimTarget]) -> Vec<TrackId> {
    let mut tracks: Vec<TrackId> = Vec::new();
    for target in targets {
        if !tracks.contains(&target.track) {
            tracks.push(target.track);
        }
    }
    tracks
}

/// 修剪类手势的提交：在一个事务内写入所有区域。
/// 给出 `clip_with` 时先按其预览求解，并在事务末尾裁剪被覆盖的未选区域。
pub(crate) fn commit_trim<F>(
    arrangement: &mut Arrangement,
    editing: &mut Editing,
    targets: &[TrimTarget],
    clip_with: Option<&dyn ModifyStrategies>,
    apply: F,
) -> Result<Approval, EditError>
where
    F: Fn(&mut Arrangement, &TrimTarget),
{
    let tracks = distinct_tracks(targets);
    let indices = tracks
        .iter()
        .map(|&id| arrangement.track_index(id).ok_or(EditError::UnknownTrack(id)))
        .collect::<Result<Vec<_>, _>>()?;
    let solver = clip_with.map(|strategies| {
        let ids: Vec<RegionId> = targets.iter().map(|t| t.id).collect();
        RegionClipResolver::from_selection(arrangement, &indices, &ids, strategies, 0)
    });
    editing.try_modify(arrangement, |arrangement| {
        for target in targets {
            apply(arrangement, target);
        }
        if let Some(solver) = solver {
            solver.execute(arrangement);
        }
        Ok(())
    })?;
    validate_tracks(arrangement, &indices);
    Ok(Approval {
        tracks,
        committed: true,
    })
}
