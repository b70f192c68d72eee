//! 重叠求解模块
//!
//! 手势决定被编辑区域的落点（遮罩）后，求解器改写受影响音轨上的其余区域，
//! 使音轨重新满足“按位置排序后互不重叠、长度为正”。
//!
//! 求解分两步：先在任何修改发生前生成任务（`Solver`），再在事务末尾执行。
//! 删除任务总是最后执行。

use crate::arrangement::Arrangement;
use crate::error::InvariantViolation;
use crate::strategy::{ModifyStrategies, IDENTITY_INCLUDE_ORIGIN};
use crate::structure::{fold_loop_offset, Ppqn, Region, RegionId, Track};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 区域在编辑完成后将占据的区间
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mask {
    pub position: Ppqn,
    pub complete: Ppqn,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipTask {
    Delete { region: RegionId },
    Separate { region: RegionId, begin: Ppqn, end: Ppqn },
    TrimStart { region: RegionId, position: Ppqn },
    TrimComplete { region: RegionId, position: Ppqn },
}

impl ClipTask {
    pub fn region(&self) -> RegionId {
        match *self {
            ClipTask::Delete { region }
            | ClipTask::Separate { region, .. }
            | ClipTask::TrimStart { region, .. }
            | ClipTask::TrimComplete { region, .. } => region,
        }
    }

    fn is_delete(&self) -> bool {
        matches!(self, ClipTask::Delete { .. })
    }
}

/// 预先计算好的裁剪任务
#[must_use = "a solver does nothing until executed"]
#[derive(Clone, Debug, Default)]
pub struct Solver {
    tasks: Vec<ClipTask>,
}

impl Solver {
    pub fn tasks(&self) -> &[ClipTask] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 执行任务。各任务读取区域在执行时刻的值。
    pub fn execute(mut self, arrangement: &mut Arrangement) {
        // stable: relative order inside both groups is kept
        self.tasks.sort_by_key(ClipTask::is_delete);
        if !self.tasks.is_empty() {
            log::debug!("executing {} clip task(s)", self.tasks.len());
        }
        for task in self.tasks {
            match task {
                ClipTask::Delete { region } => {
                    if arrangement.delete_region(region).is_none() {
                        panic!("Cannot delete unknown region {:?}", region);
                    }
                }
                ClipTask::Separate { region, begin, end } => {
                    if arrangement.clip(region, begin, end).is_none() {
                        panic!("Cannot separate region {:?} at [{}, {})", region, begin, end);
                    }
                }
                ClipTask::TrimStart { region, position } => {
                    let found = arrangement.modify_region(region, |r| {
                        let delta = position - r.position;
                        r.position = position;
                        r.duration -= delta;
                        r.loop_offset = fold_loop_offset(r.loop_offset, delta, r.loop_duration);
                    });
                    assert!(found, "Cannot trim start of unknown region {:?}", region);
                }
                ClipTask::TrimComplete { region, position } => {
                    let found = arrangement.modify_region(region, |r| r.duration = position - r.position);
                    assert!(found, "Cannot trim complete of unknown region {:?}", region);
                }
            }
        }
    }
}

pub struct RegionClipResolver<'a> {
    strategies: &'a dyn ModifyStrategies,
    ground: &'a Track,
    masks: Vec<Mask>,
}

impl<'a> RegionClipResolver<'a> {
    pub fn new(strategies: &'a dyn ModifyStrategies, ground: &'a Track) -> Self {
        Self {
            strategies,
            ground,
            masks: Vec::new(),
        }
    }

    /// 针对多条目标音轨求解。每个区域的遮罩落在 `源索引 + delta_index` 的音轨上。
    pub fn from_selection(
        arrangement: &'a Arrangement,
        track_indices: &[usize],
        regions: &[RegionId],
        strategies: &'a dyn ModifyStrategies,
        delta_index: isize,
    ) -> Solver {
        let mut resolvers: BTreeMap<usize, RegionClipResolver<'a>> = track_indices
            .iter()
            .map(|&index| {
                let track = arrangement
                    .track_at(index)
                    .unwrap_or_else(|| panic!("Cannot find track at index({})", index));
                (index, RegionClipResolver::new(strategies, track))
            })
            .collect();
        for &id in regions {
            let (Some(region), Some(source)) = (arrangement.region(id), arrangement.region_track_index(id)) else {
                panic!("Cannot find region {:?}", id);
            };
            let Some(index) = source.checked_add_signed(delta_index) else {
                panic!("Track index out of range: source({}) + delta({})", source, delta_index);
            };
            match resolvers.get_mut(&index) {
                Some(resolver) => resolver.add_mask(region),
                None => panic!("Cannot find clip resolver for index({})", index),
            }
        }
        let tasks = resolvers
            .into_values()
            .flat_map(|resolver| resolver.create_solver().tasks)
            .collect();
        Solver { tasks }
    }

    /// 清空一段区间；已选区域同样会被裁剪
    pub fn from_range(track: &'a Track, position: Ppqn, complete: Ppqn) -> Solver {
        let mut resolver = RegionClipResolver::new(&IDENTITY_INCLUDE_ORIGIN, track);
        resolver.add_mask_range(position, complete);
        resolver.create_solver()
    }

    pub fn add_mask(&mut self, region: &Region) {
        let strategy = self.strategies.selected_strategy();
        self.add_mask_range(strategy.read_position(region), strategy.read_complete(region));
    }

    pub fn add_mask_range(&mut self, position: Ppqn, complete: Ppqn) {
        self.masks.push(Mask { position, complete });
    }

    pub fn create_solver(mut self) -> Solver {
        let masks = self.sort_and_join_masks();
        Solver {
            tasks: self.create_tasks(&masks),
        }
    }

    // Joins touching masks. The result is ordered by descending position so that
    // several tasks on one ground region apply right to left.
    fn sort_and_join_masks(&mut self) -> Vec<Mask> {
        assert!(!self.masks.is_empty(), "No clip-masks to solve");
        self.masks.sort_by_key(|mask| mask.position);
        let mut masks = Vec::with_capacity(self.masks.len());
        let Some(mut last) = self.masks.pop() else {
            return masks;
        };
        while let Some(prev) = self.masks.pop() {
            if prev.complete > last.position {
                panic!("Masks are overlapping: {:?} and {:?}", prev, last);
            } else if prev.complete == last.position {
                last = Mask {
                    position: prev.position,
                    complete: last.complete,
                };
            } else {
                masks.push(last);
                last = prev;
            }
        }
        masks.push(last);
        masks
    }

    fn create_tasks(&self, masks: &[Mask]) -> Vec<ClipTask> {
        let mut tasks = Vec::new();
        for &Mask { position, complete } in masks {
            for region in self.ground.regions.iterate_range(position, complete) {
                if region.selected && !self.strategies.show_origin() {
                    continue;
                }
                assert!(region.duration > 0, "Invalid duration({})", region.duration);
                assert!(
                    region.complete() > position && region.position < complete,
                    "Not overlapping: {} against [{}, {})",
                    region,
                    position,
                    complete
                );
                let position_in = region.position >= position;
                let complete_in = region.complete() <= complete;
                let task = match (position_in, complete_in) {
                    (true, true) => ClipTask::Delete { region: region.id },
                    (false, false) => ClipTask::Separate {
                        region: region.id,
                        begin: position,
                        end: complete,
                    },
                    (false, true) => ClipTask::TrimComplete {
                        region: region.id,
                        position,
                    },
                    (true, false) => ClipTask::TrimStart {
                        region: region.id,
                        position: complete,
                    },
                };
                tasks.push(task);
            }
        }
        tasks
    }
}

/// 校验音轨：所有区域长度为正，且按位置排序后互不重叠
pub fn validate_track(track: &Track) -> Result<(), InvariantViolation> {
    let regions = track.regions.as_slice();
    let violation = |reason: String| InvariantViolation {
        track: track.id,
        track_kind: track.kind,
        reason,
        dump: dump_regions(regions),
    };
    if let Some(region) = regions.iter().find(|r| r.duration <= 0) {
        return Err(violation(format!("duration({}) must be positive", region.duration)));
    }
    if regions.windows(2).any(|pair| pair[0].complete() > pair[1].position) {
        return Err(violation("Overlapping detected after clipping".to_string()));
    }
    Ok(())
}

/// 提交后的断言：任何违规都是程序错误，记录完整的区域转储后 panic
pub fn validate_tracks(arrangement: &Arrangement, track_indices: &[usize]) {
    for track in track_indices.iter().filter_map(|&index| arrangement.track_at(index)) {
        if let Err(violation) = validate_track(track) {
            log::error!(
                "{}",
                serde_json::json!({
                    "track": format!("{:?}", violation.track_kind),
                    "regions": serde_json::from_str::<serde_json::Value>(&violation.dump)
                        .unwrap_or(serde_json::Value::Null),
                })
            );
            panic!("{}", violation);
        }
    }
}

fn dump_regions(regions: &[Region]) -> String {
    serde_json::Value::Array(
        regions
            .iter()
            .map(|r| serde_json::json!({ "p": r.position, "d": r.duration }))
            .collect(),
    )
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{ModifyStrategy, IDENTITY};
    use crate::structure::{TrackId, TrackKind};

    fn arrangement(spans: &[(Ppqn, Ppqn)]) -> (Arrangement, TrackId, Vec<RegionId>) {
        let mut arrangement = Arrangement::new();
        let track = arrangement.add_track(Track::new("Notes".to_string(), TrackKind::Notes));
        let ids = spans
            .iter()
            .map(|&(position, duration)| {
                arrangement
                    .add_region(Region::new_note(track, position, duration, String::new()))
                    .unwrap()
            })
            .collect();
        (arrangement, track, ids)
    }

    fn clear(arrangement: &mut Arrangement, track: TrackId, position: Ppqn, complete: Ppqn) {
        let solver = RegionClipResolver::from_range(arrangement.track(track).unwrap(), position, complete);
        solver.execute(arrangement);
    }

    fn spans(arrangement: &Arrangement, track: TrackId) -> Vec<(Ppqn, Ppqn)> {
        arrangement
            .track(track)
            .unwrap()
            .regions
            .iter()
            .map(|r| (r.position, r.complete()))
            .collect()
    }

    #[test]
    fn mask_inside_region_separates_it() {
        let (mut arrangement, track, ids) = arrangement(&[(0, 100)]);
        let solver = RegionClipResolver::from_range(arrangement.track(track).unwrap(), 40, 60);
        assert_eq!(
            solver.tasks(),
            &[ClipTask::Separate { region: ids[0], begin: 40, end: 60 }]
        );
        solver.execute(&mut arrangement);
        assert_eq!(spans(&arrangement, track), vec![(0, 40), (60, 100)]);
        assert!(arrangement.region(ids[0]).is_some());
    }

    #[test]
    fn swallowed_region_is_deleted() {
        let (mut arrangement, track, ids) = arrangement(&[(10, 20)]);
        clear(&mut arrangement, track, 0, 40);
        assert!(arrangement.region(ids[0]).is_none());
        assert!(spans(&arrangement, track).is_empty());
    }

    #[test]
    fn swallowed_tail_trims_complete() {
        let (mut arrangement, track, _) = arrangement(&[(0, 50)]);
        clear(&mut arrangement, track, 30, 80);
        assert_eq!(spans(&arrangement, track), vec![(0, 30)]);
    }

    #[test]
    fn swallowed_head_trims_start_and_keeps_loop_phase() {
        let mut arrangement = Arrangement::new();
        let track = arrangement.add_track(Track::new("Notes".to_string(), TrackKind::Notes));
        let id = arrangement
            .add_region(Region::new_note(track, 0, 64, String::new()).with_loop(5, 16))
            .unwrap();
        clear(&mut arrangement, track, 0, 7);
        let region = arrangement.region(id).unwrap();
        assert_eq!((region.position, region.duration, region.loop_offset), (7, 57, 12));
    }

    #[test]
    fn several_masks_on_one_region_apply_right_to_left() {
        let (mut arrangement, track, _) = arrangement(&[(0, 100)]);
        let solver = {
            let ground = arrangement.track(track).unwrap();
            let mut resolver = RegionClipResolver::new(&IDENTITY_INCLUDE_ORIGIN, ground);
            resolver.add_mask_range(20, 30);
            resolver.add_mask_range(90, 120);
            resolver.add_mask_range(50, 60);
            resolver.create_solver()
        };
        solver.execute(&mut arrangement);
        assert_eq!(spans(&arrangement, track), vec![(0, 20), (30, 50), (60, 90)]);
        assert!(validate_track(arrangement.track(track).unwrap()).is_ok());
    }

    #[test]
    fn touching_masks_are_joined() {
        let (arrangement, track, _) = arrangement(&[]);
        let mut resolver = RegionClipResolver::new(&IDENTITY_INCLUDE_ORIGIN, arrangement.track(track).unwrap());
        resolver.add_mask_range(10, 20);
        resolver.add_mask_range(0, 10);
        resolver.add_mask_range(40, 50);
        assert_eq!(
            resolver.sort_and_join_masks(),
            vec![Mask { position: 40, complete: 50 }, Mask { position: 0, complete: 20 }]
        );
    }

    #[test]
    #[should_panic(expected = "Masks are overlapping")]
    fn overlapping_masks_fail_fast() {
        let (arrangement, track, _) = arrangement(&[(0, 100)]);
        let mut resolver = RegionClipResolver::new(&IDENTITY_INCLUDE_ORIGIN, arrangement.track(track).unwrap());
        resolver.add_mask_range(10, 30);
        resolver.add_mask_range(20, 40);
        let _ = resolver.create_solver();
    }

    #[test]
    fn deletes_run_after_trims() {
        let (mut arrangement, track, ids) = arrangement(&[(0, 10), (10, 10), (20, 10), (30, 10)]);
        let solver = RegionClipResolver::from_range(arrangement.track(track).unwrap(), 5, 35);
        assert_eq!(solver.tasks().len(), 4);
        solver.execute(&mut arrangement);
        assert_eq!(spans(&arrangement, track), vec![(0, 5), (35, 40)]);
        assert!(arrangement.region(ids[1]).is_none());
        assert!(arrangement.region(ids[2]).is_none());
    }

    struct Shift(Ppqn);

    impl ModifyStrategy for Shift {
        fn read_position(&self, region: &Region) -> Ppqn {
            region.position + self.0
        }
        fn read_complete(&self, region: &Region) -> Ppqn {
            region.complete() + self.0
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

    impl ModifyStrategies for Shift {
        fn show_origin(&self) -> bool {
            false
        }
        fn selected_strategy(&self) -> &dyn ModifyStrategy {
            self
        }
        fn unselected_strategy(&self) -> &dyn ModifyStrategy {
            &IDENTITY
        }
    }

    #[test]
    fn selection_masks_skip_selected_regions() {
        let (mut arrangement, _, ids) = arrangement(&[(0, 100), (200, 20)]);
        arrangement.set_selected(ids[1], true);
        let strategies = Shift(-160);
        let solver = RegionClipResolver::from_selection(&arrangement, &[0], &[ids[1]], &strategies, 0);
        assert_eq!(solver.tasks(), &[ClipTask::Separate { region: ids[0], begin: 40, end: 60 }]);
    }

    #[test]
    #[should_panic(expected = "Track index out of range: source(0) + delta(-1)")]
    fn negative_destination_index_names_source_and_delta() {
        let (arrangement, _, ids) = arrangement(&[(0, 100)]);
        let strategies = Shift(0);
        let _ = RegionClipResolver::from_selection(&arrangement, &[0], &[ids[0]], &strategies, -1);
    }

    #[test]
    fn validation_reports_overlap_with_dump() {
        let mut track = Track::new("Notes".to_string(), TrackKind::Notes);
        track.regions.add(Region::new_note(track.id, 0, 50, String::new()));
        track.regions.add(Region::new_note(track.id, 40, 20, String::new()));
        let violation = validate_track(&track).unwrap_err();
        assert_eq!(violation.reason, "Overlapping detected after clipping");
        assert_eq!(violation.dump, r#"[{"d":50,"p":0},{"d":20,"p":40}]"#);
    }
}
