//! 编辑事务模块
//!
//! 每次 `modify` 都是一个原子批次，对应一个撤销步骤。撤销栈保存编排的快照。

use crate::arrangement::Arrangement;
use crate::error::EditError;
use std::collections::VecDeque;

pub struct Editing {
    undo: VecDeque<Arrangement>,
    redo: Vec<Arrangement>,
    depth: usize,
}

impl Editing {
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    /// 执行一个批次并记录撤销步骤。
    /// 没有回滚：只用于不会失败的批次，可能失败的批次用 `try_modify`。
    pub fn modify<F, R>(&mut self, arrangement: &mut Arrangement, f: F) -> R
    where
        F: FnOnce(&mut Arrangement) -> R,
    {
        self.mark(arrangement);
        f(arrangement)
    }

    /// Like `modify`, but an `Err` rolls the arrangement back and records nothing.
    pub fn try_modify<F, R>(&mut self, arrangement: &mut Arrangement, f: F) -> Result<R, EditError>
    where
        F: FnOnce(&mut Arrangement) -> Result<R, EditError>,
    {
        let snapshot = arrangement.clone();
        match f(arrangement) {
            Ok(value) => {
                self.push_undo(snapshot);
                self.redo.clear();
                Ok(value)
            }
            Err(err) => {
                *arrangement = snapshot;
                Err(err)
            }
        }
    }

    /// 记录一个没有批次内容的撤销检查点
    pub fn mark(&mut self, arrangement: &Arrangement) {
        self.push_undo(arrangement.clone());
        self.redo.clear();
    }

    pub fn undo(&mut self, arrangement: &mut Arrangement) -> Result<(), EditError> {
        let previous = self.undo.pop_back().ok_or(EditError::EmptyHistory("undo"))?;
        self.redo.push(std::mem::replace(arrangement, previous));
        Ok(())
    }

    pub fn redo(&mut self, arrangement: &mut Arrangement) -> Result<(), EditError> {
        let next = self.redo.pop().ok_or(EditError::EmptyHistory("redo"))?;
        let current = std::mem::replace(arrangement, next);
        self.push_undo(current);
        Ok(())
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    fn push_undo(&mut self, snapshot: Arrangement) {
        if self.undo.len() == self.depth {
            self.undo.pop_front();
        }
        self.undo.push_back(snapshot);
    }
}

impl Default for Editing {
    fn default() -> Self {
        Self::new(100)
    }
}
