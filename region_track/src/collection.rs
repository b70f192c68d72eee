//! 区域集合模块
//!
//! 每条音轨持有一个按 `position` 排序的区域序列，并提供范围与邻居查询。

use crate::structure::{Ppqn, Region, RegionId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegionCollection {
    regions: Vec<Region>,
}

impl RegionCollection {
    pub fn new() -> Self {
        Self { regions: Vec::new() }
    }

    /// Inserts after every region with an equal or lower position.
    pub fn add(&mut self, region: Region) {
        let index = self.regions.partition_point(|r| r.position <= region.position);
        self.regions.insert(index, region);
    }

    pub fn remove(&mut self, id: RegionId) -> Option<Region> {
        let index = self.regions.iter().position(|r| r.id == id)?;
        Some(self.regions.remove(index))
    }

    pub fn get(&self, id: RegionId) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: RegionId) -> bool {
        self.get(id).is_some()
    }

    /// 修改一个区域；位置改变后重新排序
    pub fn modify<F>(&mut self, id: RegionId, f: F) -> bool
    where
        F: FnOnce(&mut Region),
    {
        let Some(index) = self.regions.iter().position(|r| r.id == id) else {
            return false;
        };
        let position = self.regions[index].position;
        f(&mut self.regions[index]);
        if self.regions[index].position != position {
            let region = self.regions.remove(index);
            self.add(region);
        }
        true
    }

    // The closure must not touch `position`.
    pub(crate) fn for_each_mut<F>(&mut self, mut f: F)
    where
        F: FnMut(&mut Region),
    {
        for region in &mut self.regions {
            f(region);
        }
    }

    pub fn as_slice(&self) -> &[Region] {
        &self.regions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// 最后一个 `position <= position` 的索引
    pub fn floor_last_index(&self, position: Ppqn) -> Option<usize> {
        self.regions.partition_point(|r| r.position <= position).checked_sub(1)
    }

    /// 第一个 `position >= position` 的索引
    pub fn ceil_first_index(&self, position: Ppqn) -> usize {
        self.regions.partition_point(|r| r.position < position)
    }

    /// 位置不大于 `position` 且满足谓词的最近区域
    pub fn lower_equal<P>(&self, position: Ppqn, predicate: P) -> Option<&Region>
    where
        P: Fn(&Region) -> bool,
    {
        let end = self.regions.partition_point(|r| r.position <= position);
        self.regions[..end].iter().rev().find(|r| predicate(r))
    }

    /// 位置不小于 `position` 且满足谓词的最近区域
    pub fn greater_equal<P>(&self, position: Ppqn, predicate: P) -> Option<&Region>
    where
        P: Fn(&Region) -> bool,
    {
        let start = self.ceil_first_index(position);
        self.regions[start..].iter().find(|r| predicate(r))
    }

    /// 与区间 `[from, to)` 相交的所有区域
    pub fn iterate_range(&self, from: Ppqn, to: Ppqn) -> impl Iterator<Item = &Region> + '_ {
        let start = self.floor_last_index(from).unwrap_or(0);
        self.regions[start..]
            .iter()
            .skip_while(move |r| r.complete() <= from)
            .take_while(move |r| r.position < to)
    }
}
