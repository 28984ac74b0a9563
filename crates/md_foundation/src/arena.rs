// crates/md_foundation/src/arena.rs

//! 代际验证元素池
//!
//! 网格单元存放在 `SafeArena` 中，外部通过 `SafeIdx<Tag>` 引用。
//! 每个槽位带代际号：单元被删除（例如加密时父单元被子单元替换）后，
//! 持有旧索引的一方在访问时得到 `None`，而不是读到另一个单元。
//!
//! # 核心概念
//!
//! - **Generation（代际）**: 槽位每次被重用时递增，从 1 开始，0 表示无效
//! - **Slot（槽位）**: 单元在池中的稳定位置，可用作外部平铺数组的行号
//! - **Stale Index（过期索引）**: 代际与槽位当前代际不一致的索引
//!
//! 迭代总是按槽位顺序进行，因此结果是确定的。

use crate::error::{MdError, MdResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// 无效槽位标记
pub const INVALID_SLOT: u32 = u32::MAX;

/// 无效代际标记
pub const INVALID_GENERATION: u32 = 0;

// =============================================================================
// 类型标记
// =============================================================================

/// 单元标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ElementTag;

/// 标记类型的可读名称，用于错误信息
pub trait TagName {
    /// 名称
    const NAME: &'static str;
}

impl TagName for ElementTag {
    const NAME: &'static str = "element";
}

// =============================================================================
// SafeIdx
// =============================================================================

/// 带代际验证的索引
///
/// 两个 u32 字段，共 8 字节。`slot` 在单元存活期间保持不变。
#[derive(Serialize, Deserialize)]
pub struct SafeIdx<Tag> {
    slot: u32,
    generation: u32,
    #[serde(skip)]
    _marker: PhantomData<fn() -> Tag>,
}

impl<Tag> Copy for SafeIdx<Tag> {}

impl<Tag> Clone for SafeIdx<Tag> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Tag> SafeIdx<Tag> {
    /// 无效索引常量
    pub const INVALID: Self = Self {
        slot: INVALID_SLOT,
        generation: INVALID_GENERATION,
        _marker: PhantomData,
    };

    /// 创建新索引
    #[inline]
    pub const fn new(slot: u32, generation: u32) -> Self {
        Self {
            slot,
            generation,
            _marker: PhantomData,
        }
    }

    /// 槽位号
    #[inline]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    /// 槽位号（usize）
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.slot as usize
    }

    /// 代际号
    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// 判断索引是否有效
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.slot != INVALID_SLOT && self.generation != INVALID_GENERATION
    }

    /// 两个索引是否指向同一槽位（忽略代际）
    #[inline]
    pub const fn same_slot(self, other: Self) -> bool {
        self.slot == other.slot
    }
}

impl<Tag> Default for SafeIdx<Tag> {
    fn default() -> Self {
        Self::INVALID
    }
}

impl<Tag> PartialEq for SafeIdx<Tag> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl<Tag> Eq for SafeIdx<Tag> {}

impl<Tag> PartialOrd for SafeIdx<Tag> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// 按槽位排序，再按代际排序，保证候选单元的确定性顺序
impl<Tag> Ord for SafeIdx<Tag> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.slot
            .cmp(&other.slot)
            .then(self.generation.cmp(&other.generation))
    }
}

impl<Tag> Hash for SafeIdx<Tag> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
        self.generation.hash(state);
    }
}

impl<Tag> fmt::Debug for SafeIdx<Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "SafeIdx({}@{})", self.slot, self.generation)
        } else {
            write!(f, "SafeIdx(INVALID)")
        }
    }
}

impl<Tag> fmt::Display for SafeIdx<Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}@{}", self.slot, self.generation)
        } else {
            write!(f, "INVALID")
        }
    }
}

/// 单元索引
pub type ElementIndex = SafeIdx<ElementTag>;

// =============================================================================
// SafeArena
// =============================================================================

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// 带代际验证的元素池
#[derive(Debug, Clone)]
pub struct SafeArena<T, Tag> {
    slots: Vec<Slot<T>>,
    /// 空闲槽位栈，后进先出
    free: Vec<u32>,
    len: usize,
    _marker: PhantomData<Tag>,
}

impl<T, Tag> Default for SafeArena<T, Tag> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Tag> SafeArena<T, Tag> {
    /// 创建空池
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 创建指定容量的池
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
            _marker: PhantomData,
        }
    }

    /// 存活元素数量
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 插入元素
    ///
    /// 优先复用空闲槽位，复用时代际加一。
    pub fn insert(&mut self, value: T) -> SafeIdx<Tag> {
        self.len += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            let next = entry.generation.wrapping_add(1);
            entry.generation = if next == INVALID_GENERATION { 1 } else { next };
            entry.value = Some(value);
            return SafeIdx::new(slot, entry.generation);
        }
        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            value: Some(value),
        });
        SafeIdx::new(slot, 1)
    }

    /// 移除元素，索引过期时返回 None
    pub fn remove(&mut self, idx: SafeIdx<Tag>) -> Option<T> {
        let entry = self.slots.get_mut(idx.as_usize())?;
        if entry.generation != idx.generation() {
            return None;
        }
        let value = entry.value.take()?;
        self.free.push(idx.slot());
        self.len -= 1;
        Some(value)
    }

    /// 获取元素，索引过期时返回 None
    #[inline]
    pub fn get(&self, idx: SafeIdx<Tag>) -> Option<&T> {
        let entry = self.slots.get(idx.as_usize())?;
        if entry.generation == idx.generation() {
            entry.value.as_ref()
        } else {
            None
        }
    }

    /// 获取可变元素，索引过期时返回 None
    #[inline]
    pub fn get_mut(&mut self, idx: SafeIdx<Tag>) -> Option<&mut T> {
        let entry = self.slots.get_mut(idx.as_usize())?;
        if entry.generation == idx.generation() {
            entry.value.as_mut()
        } else {
            None
        }
    }

    /// 索引是否仍指向存活元素
    #[inline]
    pub fn contains(&self, idx: SafeIdx<Tag>) -> bool {
        self.get(idx).is_some()
    }

    /// 按槽位顺序迭代存活元素
    pub fn iter(&self) -> impl Iterator<Item = (SafeIdx<Tag>, &T)> {
        self.slots.iter().enumerate().filter_map(|(slot, entry)| {
            entry
                .value
                .as_ref()
                .map(|v| (SafeIdx::new(slot as u32, entry.generation), v))
        })
    }

    /// 按槽位顺序可变迭代
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SafeIdx<Tag>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(slot, entry)| {
            let generation = entry.generation;
            entry
                .value
                .as_mut()
                .map(|v| (SafeIdx::new(slot as u32, generation), v))
        })
    }

    /// 清空
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }
}

impl<T, Tag: TagName> SafeArena<T, Tag> {
    /// 获取元素，失败时返回描述性错误
    pub fn get_checked(&self, idx: SafeIdx<Tag>) -> MdResult<&T> {
        match self.slots.get(idx.as_usize()) {
            None => Err(MdError::index_out_of_bounds(
                Tag::NAME,
                idx.as_usize(),
                self.slots.len(),
            )),
            Some(entry) if entry.generation == idx.generation() && entry.value.is_some() => {
                entry
                    .value
                    .as_ref()
                    .ok_or_else(|| MdError::stale_index(Tag::NAME, idx.slot(), idx.generation()))
            }
            Some(_) => Err(MdError::stale_index(
                Tag::NAME,
                idx.slot(),
                idx.generation(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena: SafeArena<i32, ElementTag> = SafeArena::new();
        let idx = arena.insert(42);
        assert!(idx.is_valid());
        assert_eq!(idx.generation(), 1);
        assert_eq!(arena.get(idx), Some(&42));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_removed_index_is_stale() {
        let mut arena: SafeArena<i32, ElementTag> = SafeArena::new();
        let idx = arena.insert(42);
        assert_eq!(arena.remove(idx), Some(42));
        assert_eq!(arena.get(idx), None);
        assert_eq!(arena.remove(idx), None);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut arena: SafeArena<&str, ElementTag> = SafeArena::new();
        let old = arena.insert("parent");
        arena.remove(old);
        let new = arena.insert("child");

        assert!(old.same_slot(new));
        assert!(new.generation() > old.generation());
        assert!(arena.get(old).is_none());
        assert_eq!(arena.get(new), Some(&"child"));
    }

    #[test]
    fn test_get_checked_reports_stale() {
        let mut arena: SafeArena<i32, ElementTag> = SafeArena::new();
        let idx = arena.insert(1);
        arena.remove(idx);
        arena.insert(2);

        let err = arena.get_checked(idx).unwrap_err();
        assert!(matches!(err, MdError::StaleIndex { .. }));

        let far = ElementIndex::new(99, 1);
        let err = arena.get_checked(far).unwrap_err();
        assert!(matches!(err, MdError::IndexOutOfBounds { .. }));
    }

    #[test]
    fn test_iteration_in_slot_order() {
        let mut arena: SafeArena<i32, ElementTag> = SafeArena::new();
        let a = arena.insert(1);
        arena.insert(2);
        arena.insert(3);
        arena.remove(a);
        arena.insert(4);

        let values: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![4, 2, 3]);
    }

    #[test]
    fn test_invalid_index() {
        let arena: SafeArena<i32, ElementTag> = SafeArena::new();
        assert!(!ElementIndex::INVALID.is_valid());
        assert!(arena.get(ElementIndex::INVALID).is_none());
        assert_eq!(format!("{}", ElementIndex::INVALID), "INVALID");
    }
}
