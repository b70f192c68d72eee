use super::{commit_trim, distinct_tracks, trim_targets, Approval, GestureEnv, PointerContext, PointerEvent, TrimTarget};
use crate::arrangement::Arrangement;
use crate::editing::Editing;
use crate::error::EditError;
use crate::strategy::{ModifyStrategies, ModifyStrategy, IDENTITY};
use crate::structure::{Ppqn, Region, RegionId, TrackId};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
struct SelectedStrategy {
    completes: BTreeMap<RegionId, Ppqn>,
}

impl ModifyStrategy for SelectedStrategy {
    fn read_position(&self, region: &Region) -> Ppqn {
        region.position
    }

    fn read_complete(&self, region: &Region) -> Ppqn {
        self.completes
            .get(&region.id)
            .copied()
            .unwrap_or_else(|| region.complete())
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

/// 拖拽右边缘：只改变长度
pub struct RegionDurationModifier {
    targets: Vec<TrimTarget>,
    reference: Region,
    pointer_pulse: Ppqn,
    aligned: bool,
    delta_duration: Ppqn,
    selected: SelectedStrategy,
}

impl RegionDurationModifier {
    pub fn create(arrangement: &Arrangement, selection: &[RegionId], context: PointerContext) -> Option<Self> {
        let reference = arrangement.region(context.reference)?.clone();
        // 不能越过后一个区域的起点，因此提交时不需要求解器
        let targets = trim_targets(arrangement, selection, |track, region| {
            track
                .regions
                .greater_equal(region.complete(), |_| true)
                .map(|next| next.position)
        });
        if targets.is_empty() {
            return None;
        }
        Some(Self {
            targets,
            reference,
            pointer_pulse: context.pointer_pulse,
            aligned: false,
            delta_duration: 0,
            selected: SelectedStrategy::default(),
        })
    }

    pub fn aligned(&self) -> bool {
        self.aligned
    }

    pub fn delta_duration(&self) -> Ppqn {
        self.delta_duration
    }

    pub fn update(&mut self, event: &PointerEvent, env: &GestureEnv<'_>) -> Vec<TrackId> {
        let aligned = event.modifiers.ctrl;
        let delta_duration = env
            .snapping
            .compute_delta(self.pointer_pulse, event.position.x, self.reference.duration);
        if self.aligned == aligned && self.delta_duration == delta_duration {
            return Vec::new();
        }
        self.aligned = aligned;
        self.delta_duration = delta_duration;
        let snap = env.snapping.value();
        self.selected.completes = self
            .targets
            .iter()
            .map(|target| (target.id, self.clamped_complete(target, snap)))
            .collect();
        distinct_tracks(&self.targets)
    }

    fn clamped_complete(&self, target: &TrimTarget, snap: Ppqn) -> Ppqn {
        let duration = if self.aligned {
            self.reference.complete() + self.delta_duration - target.position
        } else {
            target.duration + self.delta_duration
        };
        let complete = target.position + snap.min(target.duration).max(duration);
        match target.limiter {
            Some(limit) if complete > limit => limit,
            _ => complete,
        }
    }

    pub fn approve(self, arrangement: &mut Arrangement, editing: &mut Editing) -> Result<Approval, EditError> {
        let unchanged = self
            .targets
            .iter()
            .all(|t| self.selected.completes.get(&t.id).map_or(true, |&c| c == t.complete()));
        if unchanged {
            return Ok(Approval {
                tracks: distinct_tracks(&self.targets),
                committed: false,
            });
        }
        let completes = &self.selected.completes;
        let approval = commit_trim(arrangement, editing, &self.targets, None, |arrangement, target| {
            if let Some(&complete) = completes.get(&target.id) {
                arrangement.modify_region(target.id, |region| region.duration = complete - region.position);
            }
        })?;
        log::info!("trimmed duration of {} region(s)", self.targets.len());
        Ok(approval)
    }

    pub fn cancel(&mut self) -> Vec<TrackId> {
        self.aligned = false;
        self.delta_duration = 0;
        self.selected.completes.clear();
        distinct_tracks(&self.targets)
    }
}

impl ModifyStrategies for RegionDurationModifier {
    fn show_origin(&self) -> bool {
        false
    }

    fn selected_strategy(&self) -> &dyn ModifyStrategy {
        &self.selected
    }

    fn unselected_strategy(&self) -> &dyn ModifyStrategy {
        &IDENTITY
    }
}
