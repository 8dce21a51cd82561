// Weft - weft-runtime
// Module: tables
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Reference tables.
//!
//! A table is a resizable vector of reference values of a single element
//! type, initialized to null. Out-of-bounds accesses trap; `grow` beyond
//! the declared maximum fails with the `-1` sentinel instead.

use weft_foundation::{TableType, Value};

use crate::trap::{Trap, TrapKind};

type TrapResult<T> = core::result::Result<T, Trap>;

/// A table instance.
#[derive(Debug)]
pub struct Table {
    ty: TableType,
    elems: Vec<Value>,
}

impl Table {
    /// Allocates a table at its declared minimum size, null-filled.
    #[must_use]
    pub fn new(ty: TableType) -> Self {
        let null = Value::default_for(ty.element);
        let elems = vec![null; ty.limits.min as usize];
        Self { ty, elems }
    }

    /// The declared table type.
    #[must_use]
    pub fn ty(&self) -> &TableType {
        &self.ty
    }

    /// Current size in elements.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.elems.len() as u32
    }

    pub fn get(&self, idx: u32) -> TrapResult<Value> {
        self.elems
            .get(idx as usize)
            .cloned()
            .ok_or_else(|| Trap::new(TrapKind::OutOfBoundsTableAccess))
    }

    pub fn set(&mut self, idx: u32, value: Value) -> TrapResult<()> {
        match self.elems.get_mut(idx as usize) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Trap::new(TrapKind::OutOfBoundsTableAccess)),
        }
    }

    /// Grows by `delta` elements filled with `init`. Returns the previous
    /// size, or `-1` when the maximum would be exceeded. Never traps.
    pub fn grow(&mut self, delta: u32, init: Value) -> i32 {
        let old = self.size();
        let Some(new) = old.checked_add(delta) else {
            return -1;
        };
        if let Some(max) = self.ty.limits.max {
            if new > max {
                return -1;
            }
        }
        self.elems.resize(new as usize, init);
        old as i32
    }

    /// `table.init` / active element segments: copies resolved segment
    /// values into the table. Bounds-checked on both sides before any
    /// slot changes.
    pub fn init(&mut self, dst: u32, src: &[Value], src_off: u32, len: u32) -> TrapResult<()> {
        let src_end = u64::from(src_off) + u64::from(len);
        let dst_end = u64::from(dst) + u64::from(len);
        if src_end > src.len() as u64 || dst_end > self.elems.len() as u64 {
            return Err(Trap::new(TrapKind::OutOfBoundsTableAccess));
        }
        self.elems[dst as usize..dst_end as usize]
            .clone_from_slice(&src[src_off as usize..src_end as usize]);
        Ok(())
    }

    /// `table.copy` within one table; overlapping ranges are safe.
    pub fn copy_within(&mut self, dst: u32, src: u32, len: u32) -> TrapResult<()> {
        let dst_end = u64::from(dst) + u64::from(len);
        let src_end = u64::from(src) + u64::from(len);
        if dst_end > self.elems.len() as u64 || src_end > self.elems.len() as u64 {
            return Err(Trap::new(TrapKind::OutOfBoundsTableAccess));
        }
        if dst <= src {
            for i in 0..len {
                self.elems[(dst + i) as usize] = self.elems[(src + i) as usize].clone();
            }
        } else {
            for i in (0..len).rev() {
                self.elems[(dst + i) as usize] = self.elems[(src + i) as usize].clone();
            }
        }
        Ok(())
    }

    /// `table.fill`.
    pub fn fill(&mut self, dst: u32, value: &Value, len: u32) -> TrapResult<()> {
        let end = u64::from(dst) + u64::from(len);
        if end > self.elems.len() as u64 {
            return Err(Trap::new(TrapKind::OutOfBoundsTableAccess));
        }
        for slot in &mut self.elems[dst as usize..end as usize] {
            *slot = value.clone();
        }
        Ok(())
    }

    /// Snapshot of one slot range, used when copying across two tables.
    pub fn slice(&self, src: u32, len: u32) -> TrapResult<Vec<Value>> {
        let end = u64::from(src) + u64::from(len);
        if end > self.elems.len() as u64 {
            return Err(Trap::new(TrapKind::OutOfBoundsTableAccess));
        }
        Ok(self.elems[src as usize..end as usize].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_foundation::{Limits, ValueType};

    fn table(min: u32, max: Option<u32>) -> Table {
        Table::new(TableType {
            element: ValueType::FuncRef,
            limits: Limits::new(min, max),
        })
    }

    #[test]
    fn starts_null_filled() {
        let t = table(3, None);
        assert_eq!(t.get(2).unwrap(), Value::FuncRef(None));
        assert_eq!(
            t.get(3).unwrap_err().kind,
            TrapKind::OutOfBoundsTableAccess
        );
    }

    #[test]
    fn grow_respects_max() {
        let mut t = table(1, Some(2));
        assert_eq!(t.grow(1, Value::FuncRef(None)), 1);
        assert_eq!(t.grow(1, Value::FuncRef(None)), -1);
        assert_eq!(t.size(), 2);
    }

    #[test]
    fn overlapping_copy_is_safe_both_directions() {
        // Distinct extern addresses make the element moves observable.
        let mut t = Table::new(TableType {
            element: ValueType::ExternRef,
            limits: Limits::new(4, None),
        });
        for i in 0..4 {
            t.set(i, Value::ExternRef(Some(weft_foundation::ExternAddr(u64::from(i)))))
                .unwrap();
        }
        t.copy_within(1, 0, 3).unwrap();
        assert_eq!(
            t.get(3).unwrap(),
            Value::ExternRef(Some(weft_foundation::ExternAddr(2)))
        );
        t.copy_within(0, 2, 2).unwrap();
        assert_eq!(
            t.get(0).unwrap(),
            Value::ExternRef(Some(weft_foundation::ExternAddr(1)))
        );
    }
}
