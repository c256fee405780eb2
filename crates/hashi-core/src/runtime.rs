//! Runtime: class registry, heap allocation, method dispatch
//!
//! The runtime owns the class table and the heap budget. Allocation charges
//! bytes against the budget and fails with `OutOfMemory` when the budget is
//! exhausted; collection (dropping the last strong reference) returns the
//! bytes. A small set of built-in classes is registered at construction so
//! exceptions and strings always have somewhere to live.

use crate::class::{Class, ClassBuilder, MethodBody, MethodImpl};
use crate::object::{Body, HeapCharge, HeapObject, Obj, PrimArray, PrimKind};
use crate::value::{default_for_sig, Value};
use crate::{CoreError, CoreResult};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Opaque identifier of a registered class.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ClassId(pub(crate) u32);

/// Runtime construction options.
#[derive(Clone, Copy, Debug)]
pub struct RuntimeOptions {
    /// Heap budget in bytes; allocations beyond it fail.
    pub heap_limit: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { heap_limit: 64 * 1024 * 1024 }
    }
}

/// A managed exception in flight.
#[derive(Clone, Debug)]
pub struct Thrown(Obj);

impl Thrown {
    /// Wrap an existing throwable object.
    pub fn new(object: Obj) -> Self {
        Thrown(object)
    }

    /// The exception object.
    pub fn object(&self) -> &Obj {
        &self.0
    }

    /// Consume into the exception object.
    pub fn into_object(self) -> Obj {
        self.0
    }

    /// Class of the exception object.
    pub fn class_id(&self) -> ClassId {
        self.0.class()
    }

    /// Detail message, if the object follows the throwable layout
    /// (message string in the first field slot).
    pub fn message(&self) -> Option<String> {
        match self.0.get_field(0).ok()? {
            Value::Object(Some(s)) => s.str_units().map(String::from_utf16_lossy),
            _ => None,
        }
    }
}

/// Managed runtime: class table, heap budget, dispatch.
pub struct Runtime {
    classes: RwLock<Vec<Arc<Class>>>,
    by_name: DashMap<String, ClassId>,
    heap_used: Arc<AtomicUsize>,
    heap_limit: usize,
    /// Preallocated out-of-memory exception, thrown when even the
    /// exception object itself cannot be allocated.
    oom_reserve: Mutex<Option<Obj>>,
}

const OBJ_OVERHEAD: usize = 48;

impl Runtime {
    /// Create a runtime with the built-in classes registered.
    pub fn new(options: RuntimeOptions) -> Self {
        let rt = Self {
            classes: RwLock::new(Vec::new()),
            by_name: DashMap::new(),
            heap_used: Arc::new(AtomicUsize::new(0)),
            heap_limit: options.heap_limit,
            oom_reserve: Mutex::new(None),
        };
        rt.register_builtins();
        rt
    }

    fn register_builtins(&self) {
        let object = self.must_define(ClassBuilder::new("rt/Object"));
        self.must_define(ClassBuilder::new("rt/String").extends(object));

        let get_message: MethodImpl = Arc::new(|_rt, recv, _args| {
            let this = recv.cloned();
            Ok(Some(match this {
                Some(obj) => obj.get_field(0).unwrap_or(Value::null()),
                None => Value::null(),
            }))
        });
        let throwable = self.must_define(
            ClassBuilder::new("rt/Throwable")
                .extends(object)
                .field("message", "Lrt/String;")
                .method("getMessage", "()Lrt/String;", get_message),
        );
        self.must_define(ClassBuilder::new("rt/RuntimeException").extends(throwable));
        let error = self.must_define(ClassBuilder::new("rt/Error").extends(throwable));
        let oom_class = self.must_define(ClassBuilder::new("rt/OutOfMemoryError").extends(error));

        // Built outside the budget so it exists even when the heap is full.
        let msg = Arc::new(HeapObject::new(
            self.id_of("rt/String"),
            Body::Str("heap budget exhausted".encode_utf16().collect()),
            None,
        ));
        let oom = Arc::new(HeapObject::new(
            oom_class,
            Body::Fields(Mutex::new(vec![Value::Object(Some(msg))])),
            None,
        ));
        *self.oom_reserve.lock() = Some(oom);
    }

    fn must_define(&self, builder: ClassBuilder) -> ClassId {
        match self.define_class(builder) {
            Ok(id) => id,
            // Built-in definitions never reference missing supers.
            Err(_) => unreachable!("built-in class definition failed"),
        }
    }

    fn id_of(&self, name: &str) -> ClassId {
        match self.by_name.get(name) {
            Some(id) => *id,
            None => unreachable!("built-in class missing"),
        }
    }

    /// Register a class definition and return its id.
    pub fn define_class(&self, builder: ClassBuilder) -> CoreResult<ClassId> {
        let inherited = match builder.super_id {
            Some(super_id) => {
                let sup = self.class(super_id)?;
                (0..sup.field_count())
                    .filter_map(|slot| sup.field_def(slot).cloned())
                    .collect()
            }
            None => Vec::new(),
        };
        let mut classes = self.classes.write();
        let id = ClassId(classes.len() as u32);
        let class = Arc::new(builder.build(id, inherited));
        self.by_name.insert(class.name().to_owned(), id);
        classes.push(class);
        Ok(id)
    }

    /// Look up a class by name. Accepts `/` or `.` separators.
    pub fn find_class(&self, name: &str) -> CoreResult<ClassId> {
        let normalized = name.replace('.', "/");
        self.by_name
            .get(normalized.as_str())
            .map(|id| *id)
            .ok_or(CoreError::UnknownClass(normalized))
    }

    /// The class registered under `id`.
    pub fn class(&self, id: ClassId) -> CoreResult<Arc<Class>> {
        self.classes
            .read()
            .get(id.0 as usize)
            .cloned()
            .ok_or_else(|| CoreError::UnknownClass(format!("#{}", id.0)))
    }

    /// True if `class` is `target` or a subclass of it.
    pub fn instance_of(&self, class: ClassId, target: ClassId) -> bool {
        let mut cursor = Some(class);
        while let Some(id) = cursor {
            if id == target {
                return true;
            }
            cursor = match self.class(id) {
                Ok(c) => c.super_id(),
                Err(_) => None,
            };
        }
        false
    }

    /// Bytes currently charged against the heap budget.
    pub fn heap_used(&self) -> usize {
        self.heap_used.load(Ordering::Relaxed)
    }

    fn charge(&self, bytes: usize) -> CoreResult<HeapCharge> {
        let mut used = self.heap_used.load(Ordering::Relaxed);
        loop {
            let next = used.saturating_add(bytes);
            if next > self.heap_limit {
                return Err(CoreError::OutOfMemory { requested: bytes });
            }
            match self.heap_used.compare_exchange_weak(
                used,
                next,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(HeapCharge::new(bytes, Arc::clone(&self.heap_used))),
                Err(actual) => used = actual,
            }
        }
    }

    /// Allocate an instance of `class` with default-initialized fields.
    pub fn alloc_object(&self, class: ClassId) -> CoreResult<Obj> {
        let def = self.class(class)?;
        let fields: Vec<Value> = (0..def.field_count())
            .map(|slot| match def.field_def(slot) {
                Some(f) => default_for_sig(&f.sig),
                None => Value::null(),
            })
            .collect();
        let charge = self.charge(OBJ_OVERHEAD + fields.len() * 16)?;
        Ok(Arc::new(HeapObject::new(class, Body::Fields(Mutex::new(fields)), Some(charge))))
    }

    /// Allocate a string object from UTF-16 code units.
    pub fn alloc_string_utf16(&self, units: Vec<u16>) -> CoreResult<Obj> {
        let class = self.find_class("rt/String")?;
        let charge = self.charge(OBJ_OVERHEAD + units.len() * 2)?;
        Ok(Arc::new(HeapObject::new(class, Body::Str(units), Some(charge))))
    }

    /// Allocate a string object from Rust text.
    pub fn alloc_string(&self, text: &str) -> CoreResult<Obj> {
        self.alloc_string_utf16(text.encode_utf16().collect())
    }

    /// Allocate a zero-filled primitive array.
    pub fn alloc_prim_array(&self, kind: PrimKind, len: usize) -> CoreResult<Obj> {
        let elem_size = match kind {
            PrimKind::Bool | PrimKind::Byte => 1,
            PrimKind::Char | PrimKind::Short => 2,
            PrimKind::Int | PrimKind::Float => 4,
            PrimKind::Long | PrimKind::Double => 8,
        };
        let class = self.find_class("rt/Object")?;
        let charge = self.charge(OBJ_OVERHEAD + len * elem_size)?;
        Ok(Arc::new(HeapObject::new(
            class,
            Body::PrimArray(Mutex::new(PrimArray::new(kind, len))),
            Some(charge),
        )))
    }

    /// Allocate a null-filled object array whose elements must be
    /// assignable to `elem`.
    pub fn alloc_obj_array(&self, elem: ClassId, len: usize) -> CoreResult<Obj> {
        self.class(elem)?;
        let class = self.find_class("rt/Object")?;
        let charge = self.charge(OBJ_OVERHEAD + len * 8)?;
        Ok(Arc::new(HeapObject::new(
            class,
            Body::ObjArray { elem, elems: Mutex::new(vec![None; len]) },
            Some(charge),
        )))
    }

    /// Rust text of a string object, if `obj` is a string.
    pub fn string_value(&self, obj: &Obj) -> Option<String> {
        obj.str_units().map(String::from_utf16_lossy)
    }

    /// Resolve the method `name`/`sig` against `class` and its
    /// superclasses; returns the defining class and method index.
    pub fn select_method(&self, class: ClassId, name: &str, sig: &str) -> Option<(ClassId, usize)> {
        let mut cursor = Some(class);
        while let Some(id) = cursor {
            let def = self.class(id).ok()?;
            if let Some(index) = def.find_method(name, sig) {
                return Some((id, index));
            }
            cursor = def.super_id();
        }
        None
    }

    /// Invoke the method at `index` on `class`.
    ///
    /// Dispatch is exact: virtual selection happens before this call. The
    /// body reference is cloned out so no class lock is held during the
    /// call, which keeps reentrant calls from the body safe.
    pub fn call(
        &self,
        class: ClassId,
        index: usize,
        receiver: Option<&Obj>,
        args: &[Value],
    ) -> Result<Option<Value>, Thrown> {
        let def = match self.class(class) {
            Ok(c) => c,
            Err(e) => return Err(self.raise("rt/Error", &e.to_string())),
        };
        let method = match def.method_at(index) {
            Some(m) => m,
            None => {
                return Err(self.raise(
                    "rt/Error",
                    &format!("no method at index {index} in {}", def.name()),
                ))
            }
        };
        let body = {
            let guard = method.body.read();
            match &*guard {
                MethodBody::Host(f) | MethodBody::Native(f) => Arc::clone(f),
                MethodBody::NativeUnbound => {
                    let text =
                        format!("unbound native method {}{}", method.name, method.sig);
                    drop(guard);
                    return Err(self.raise("rt/Error", &text));
                }
            }
        };
        body(self, receiver, args)
    }

    /// Build a managed exception of `class_name` carrying `message`.
    ///
    /// Falls back to the preallocated out-of-memory exception when the
    /// exception object itself cannot be built.
    pub fn raise(&self, class_name: &str, message: &str) -> Thrown {
        match self.try_raise(class_name, message) {
            Ok(thrown) => thrown,
            Err(_) => {
                let reserve = self.oom_reserve.lock();
                match &*reserve {
                    Some(obj) => Thrown(Arc::clone(obj)),
                    None => unreachable!("out-of-memory reserve missing"),
                }
            }
        }
    }

    fn try_raise(&self, class_name: &str, message: &str) -> CoreResult<Thrown> {
        let class = self.find_class(class_name)?;
        let obj = self.alloc_object(class)?;
        let msg = self.alloc_string(message)?;
        obj.set_field(0, Value::Object(Some(msg)))?;
        Ok(Thrown(obj))
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeOptions::default())
    }
}
