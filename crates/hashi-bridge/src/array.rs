//! Array access: regions, element views, critical sections
//!
//! Primitive arrays cross the boundary three ways: region copies in and
//! out of caller buffers, [`ArrayView`] (a copy-out view that writes back
//! on drop unless aborted), and a critical closure that works on the
//! backing store directly. While a critical section is open the thread may
//! not call back into managed code; the invocation layer enforces this.
//!
//! Object arrays are element-typed: stores check assignability against the
//! element class.

use crate::error::{BridgeError, BridgeResult};
use crate::handle::{LocalRef, Reference};
use crate::resolver::ClassRef;
use crate::vm::Env;
use hashi_core::object::Body;
use hashi_core::{Obj, PrimArray, PrimKind};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Primitive element types that can live in a managed array.
pub trait PrimElem: Copy + Default + 'static {
    /// Matching array kind.
    const KIND: PrimKind;
    /// Borrow the backing storage if the kinds match.
    fn slice(arr: &PrimArray) -> Option<&[Self]>;
    /// Mutably borrow the backing storage if the kinds match.
    fn slice_mut(arr: &mut PrimArray) -> Option<&mut [Self]>;
}

macro_rules! prim_elem {
    ($ty:ty, $kind:ident) => {
        impl PrimElem for $ty {
            const KIND: PrimKind = PrimKind::$kind;
            fn slice(arr: &PrimArray) -> Option<&[Self]> {
                match arr {
                    PrimArray::$kind(v) => Some(v),
                    _ => None,
                }
            }
            fn slice_mut(arr: &mut PrimArray) -> Option<&mut [Self]> {
                match arr {
                    PrimArray::$kind(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

prim_elem!(bool, Bool);
prim_elem!(i8, Byte);
prim_elem!(u16, Char);
prim_elem!(i16, Short);
prim_elem!(i32, Int);
prim_elem!(i64, Long);
prim_elem!(f32, Float);
prim_elem!(f64, Double);

fn kind_error<T: PrimElem>(arr: &PrimArray) -> BridgeError {
    BridgeError::Conversion(format!(
        "array element kind mismatch: expected {:?}, found {:?}",
        T::KIND,
        arr.kind()
    ))
}

fn region_bounds(start: usize, len: usize, total: usize) -> BridgeResult<usize> {
    start
        .checked_add(len)
        .filter(|&end| end <= total)
        .ok_or_else(|| {
            BridgeError::Conversion(format!(
                "array region {start}..+{len} out of bounds (len {total})"
            ))
        })
}

/// Copy-out view of a primitive array.
///
/// Mutations apply to the view and reach the array on [`commit`] or on
/// drop; [`set_abort`] discards them instead.
///
/// [`commit`]: ArrayView::commit
/// [`set_abort`]: ArrayView::set_abort
pub struct ArrayView<'env, T: PrimElem> {
    env: &'env Env,
    obj: Obj,
    data: Vec<T>,
    write_back: bool,
}

impl<T: PrimElem> ArrayView<'_, T> {
    fn write(&self) -> BridgeResult<()> {
        let cell = self
            .obj
            .prim_array()
            .ok_or_else(|| BridgeError::Conversion("object is not a primitive array".into()))?;
        let mut arr = cell.lock();
        let kind = arr.kind();
        let slice = match T::slice_mut(&mut arr) {
            Some(s) => s,
            None => {
                return Err(BridgeError::Conversion(format!(
                    "array element kind mismatch: expected {:?}, found {kind:?}",
                    T::KIND
                )))
            }
        };
        slice.copy_from_slice(&self.data);
        Ok(())
    }

    /// Write the view's contents back now, keeping the view open.
    pub fn commit(&mut self) -> BridgeResult<()> {
        self.write()
    }

    /// Discard changes: the drop write-back is skipped.
    pub fn set_abort(&mut self) {
        self.write_back = false;
    }

    /// The environment this view was opened from.
    pub fn env(&self) -> &Env {
        self.env
    }
}

impl<T: PrimElem> Deref for ArrayView<'_, T> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        &self.data
    }
}

impl<T: PrimElem> DerefMut for ArrayView<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T: PrimElem> Drop for ArrayView<'_, T> {
    fn drop(&mut self) {
        if self.write_back {
            let _ = self.write();
        }
    }
}

impl Env {
    fn resolve_prim<R: Reference>(&self, reference: R) -> BridgeResult<Obj> {
        let obj = reference.resolve(self)?;
        if obj.prim_array().is_none() {
            return Err(BridgeError::Conversion("object is not a primitive array".into()));
        }
        Ok(obj)
    }

    /// Allocate a zero-filled primitive array.
    pub fn new_prim_array<T: PrimElem>(&self, len: usize) -> BridgeResult<LocalRef> {
        let obj = self.vm.runtime.alloc_prim_array(T::KIND, len)?;
        self.alloc_local(obj)
    }

    /// Allocate a primitive array initialized from `data`.
    pub fn new_prim_array_from<T: PrimElem>(&self, data: &[T]) -> BridgeResult<LocalRef> {
        let r = self.new_prim_array::<T>(data.len())?;
        self.set_array_region(r, 0, data)?;
        Ok(r)
    }

    /// Element count of a primitive or object array.
    pub fn array_len<R: Reference>(&self, reference: R) -> BridgeResult<usize> {
        let obj = reference.resolve(self)?;
        match obj.body() {
            Body::PrimArray(_) | Body::ObjArray { .. } => Ok(match obj.array_len() {
                Some(len) => len,
                None => 0,
            }),
            _ => Err(BridgeError::Conversion("object is not an array".into())),
        }
    }

    /// Copy `buf.len()` elements starting at `start` into `buf`.
    pub fn get_array_region<T: PrimElem, R: Reference>(
        &self,
        reference: R,
        start: usize,
        buf: &mut [T],
    ) -> BridgeResult<()> {
        let obj = self.resolve_prim(reference)?;
        let cell = match obj.prim_array() {
            Some(cell) => cell,
            None => return Err(BridgeError::Conversion("object is not a primitive array".into())),
        };
        let arr = cell.lock();
        let slice = T::slice(&arr).ok_or_else(|| kind_error::<T>(&arr))?;
        let end = region_bounds(start, buf.len(), slice.len())?;
        buf.copy_from_slice(&slice[start..end]);
        Ok(())
    }

    /// Copy `data` into the array starting at `start`.
    pub fn set_array_region<T: PrimElem, R: Reference>(
        &self,
        reference: R,
        start: usize,
        data: &[T],
    ) -> BridgeResult<()> {
        let obj = self.resolve_prim(reference)?;
        let cell = match obj.prim_array() {
            Some(cell) => cell,
            None => return Err(BridgeError::Conversion("object is not a primitive array".into())),
        };
        let mut arr = cell.lock();
        let kind = arr.kind();
        let slice = match T::slice_mut(&mut arr) {
            Some(s) => s,
            None => {
                return Err(BridgeError::Conversion(format!(
                    "array element kind mismatch: expected {:?}, found {kind:?}",
                    T::KIND
                )))
            }
        };
        let end = region_bounds(start, data.len(), slice.len())?;
        slice[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Read the whole array into a vector.
    pub fn get_array<T: PrimElem, R: Reference>(&self, reference: R) -> BridgeResult<Vec<T>> {
        let len = self.array_len(reference)?;
        let mut out = vec![T::default(); len];
        self.get_array_region(reference, 0, &mut out)?;
        Ok(out)
    }

    /// Open a copy-out element view; see [`ArrayView`].
    pub fn get_array_elements<T: PrimElem, R: Reference>(
        &self,
        reference: R,
    ) -> BridgeResult<ArrayView<'_, T>> {
        let obj = self.resolve_prim(reference)?;
        let data = {
            let cell = match obj.prim_array() {
                Some(cell) => cell,
                None => {
                    return Err(BridgeError::Conversion(
                        "object is not a primitive array".into(),
                    ))
                }
            };
            let arr = cell.lock();
            T::slice(&arr).ok_or_else(|| kind_error::<T>(&arr))?.to_vec()
        };
        Ok(ArrayView { env: self, obj, data, write_back: true })
    }

    /// Run `f` on the array's backing store without copying.
    ///
    /// The array's lock is held for the duration, and the thread is in a
    /// critical section: boundary calls back into managed code fail with
    /// `CriticalSection` until `f` returns.
    pub fn with_array_critical<T: PrimElem, R: Reference, Out>(
        &self,
        reference: R,
        f: impl FnOnce(&mut [T]) -> Out,
    ) -> BridgeResult<Out> {
        let obj = self.resolve_prim(reference)?;
        self.with_state(|st| {
            st.critical_depth += 1;
            Ok(())
        })?;
        let result = (|| {
            let cell = match obj.prim_array() {
                Some(cell) => cell,
                None => {
                    return Err(BridgeError::Conversion(
                        "object is not a primitive array".into(),
                    ))
                }
            };
            let mut arr = cell.lock();
            let kind = arr.kind();
            let slice = T::slice_mut(&mut arr).ok_or_else(|| {
                BridgeError::Conversion(format!(
                    "array element kind mismatch: expected {:?}, found {kind:?}",
                    T::KIND
                ))
            })?;
            Ok(f(slice))
        })();
        // Always leave the critical section, success or not.
        let _ = self.with_state(|st| {
            st.critical_depth = st.critical_depth.saturating_sub(1);
            Ok(())
        });
        result
    }

    /// Allocate an object array with every slot set to `init`.
    pub fn new_object_array<R: Reference>(
        &self,
        len: usize,
        elem: ClassRef,
        init: Option<R>,
    ) -> BridgeResult<LocalRef> {
        let arr = self.vm.runtime.alloc_obj_array(elem.0, len)?;
        if let Some(init) = init {
            let value = init.resolve(self)?;
            if !self.vm.runtime.instance_of(value.class(), elem.0) {
                return Err(BridgeError::SignatureMismatch {
                    expected: self.vm.runtime.class(elem.0)?.name().to_owned(),
                    got: self.vm.runtime.class(value.class())?.name().to_owned(),
                });
            }
            if let Body::ObjArray { elems, .. } = arr.body() {
                let mut elems = elems.lock();
                for slot in elems.iter_mut() {
                    *slot = Some(Arc::clone(&value));
                }
            }
        }
        self.alloc_local(arr)
    }

    /// Read one object array element, pinning it behind a local handle.
    pub fn get_object_array_element<R: Reference>(
        &self,
        reference: R,
        index: usize,
    ) -> BridgeResult<Option<LocalRef>> {
        let obj = reference.resolve(self)?;
        let elem = match obj.body() {
            Body::ObjArray { elems, .. } => {
                let elems = elems.lock();
                let slot = elems.get(index).ok_or_else(|| {
                    BridgeError::Conversion(format!(
                        "array index {index} out of bounds (len {})",
                        elems.len()
                    ))
                })?;
                slot.as_ref().map(Arc::clone)
            }
            _ => return Err(BridgeError::Conversion("object is not an object array".into())),
        };
        match elem {
            Some(obj) => Ok(Some(self.alloc_local(obj)?)),
            None => Ok(None),
        }
    }

    /// Store into one object array element; the value must be assignable
    /// to the array's element class.
    pub fn set_object_array_element<R: Reference, E: Reference>(
        &self,
        reference: R,
        index: usize,
        value: Option<E>,
    ) -> BridgeResult<()> {
        let obj = reference.resolve(self)?;
        let stored = match value {
            Some(v) => Some(v.resolve(self)?),
            None => None,
        };
        match obj.body() {
            Body::ObjArray { elem, elems } => {
                if let Some(stored) = &stored {
                    if !self.vm.runtime.instance_of(stored.class(), *elem) {
                        return Err(BridgeError::SignatureMismatch {
                            expected: self.vm.runtime.class(*elem)?.name().to_owned(),
                            got: self.vm.runtime.class(stored.class())?.name().to_owned(),
                        });
                    }
                }
                let mut elems = elems.lock();
                let len = elems.len();
                let slot = elems.get_mut(index).ok_or_else(|| {
                    BridgeError::Conversion(format!(
                        "array index {index} out of bounds (len {len})"
                    ))
                })?;
                *slot = stored;
                Ok(())
            }
            _ => Err(BridgeError::Conversion("object is not an object array".into())),
        }
    }
}
