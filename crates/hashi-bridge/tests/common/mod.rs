//! Shared fixture: a VM with the classes the integration tests bind to.

use hashi_bridge::{ClassBuilder, MethodImpl, Value, Vm, VmOptions};
use std::sync::Arc;

/// Build a VM with `geom/Point` and `fixture/Harness` defined.
///
/// `geom/Point` is a plain data class with a constructor and one managed
/// method. `fixture/Harness` carries one field of every primitive kind
/// plus a string and arrays, a getter/setter pair per field, matching
/// statics, managed helper methods, and a set of native-declared methods
/// the tests register implementations for.
pub fn fixture_vm() -> Vm {
    let vm = Vm::new(VmOptions::default());
    let rt = vm.runtime();

    let point_init: MethodImpl = Arc::new(|rt, recv, args| {
        let obj = recv.ok_or_else(|| rt.raise("rt/Error", "missing receiver"))?;
        obj.set_field(0, args[0].clone())
            .map_err(|e| rt.raise("rt/Error", &e.to_string()))?;
        obj.set_field(1, args[1].clone())
            .map_err(|e| rt.raise("rt/Error", &e.to_string()))?;
        Ok(None)
    });
    let point_offset: MethodImpl = Arc::new(|rt, recv, args| {
        let obj = recv.ok_or_else(|| rt.raise("rt/Error", "missing receiver"))?;
        let raise = |e: hashi_core::CoreError| rt.raise("rt/Error", &e.to_string());
        for (slot, delta) in args.iter().enumerate() {
            let base = obj.get_field(slot).map_err(raise)?.as_int().unwrap_or(0);
            let delta = delta.as_int().unwrap_or(0);
            obj.set_field(slot, Value::Int(base + delta)).map_err(raise)?;
        }
        Ok(None)
    });
    rt.define_class(
        ClassBuilder::new("geom/Point")
            .field("x", "I")
            .field("y", "I")
            .static_field("samplePoint", "Lgeom/Point;")
            .constructor("(II)V", point_init)
            .method("offset", "(II)V", point_offset),
    )
    .unwrap();

    let describe: MethodImpl = Arc::new(|rt, recv, _args| {
        let obj = recv.ok_or_else(|| rt.raise("rt/Error", "missing receiver"))?;
        let text = match obj.get_field(8) {
            Ok(Value::Object(Some(s))) => rt.string_value(&s).unwrap_or_default(),
            _ => String::new(),
        };
        let out = rt
            .alloc_string(&format!("Harness[{text}]"))
            .map_err(|e| rt.raise("rt/Error", &e.to_string()))?;
        Ok(Some(Value::Object(Some(out))))
    });
    let fail: MethodImpl =
        Arc::new(|rt, _recv, _args| Err(rt.raise("rt/RuntimeException", "std::runtime_error")));
    let mut harness = ClassBuilder::new("fixture/Harness")
        .field("flag", "Z")
        .field("byteVal", "B")
        .field("charVal", "C")
        .field("shortVal", "S")
        .field("intVal", "I")
        .field("longVal", "J")
        .field("floatVal", "F")
        .field("doubleVal", "D")
        .field("text", "Lrt/String;")
        .field("intArray", "[I")
        .field("names", "[Lrt/String;")
        .static_field("staticText", "Lrt/String;")
        .static_field("staticCount", "I")
        .constructor("()V", Arc::new(|_rt, _recv, _args| Ok(None)))
        .method("describe", "()Lrt/String;", describe)
        .method("fail", "()V", fail)
        .native_method("probe", "()Z", true)
        .native_method("echo", "(Lrt/String;)Lrt/String;", false)
        .native_method("plus", "(II)I", false);
    // A getter/setter pair per field, slots in declaration order.
    let accessors = [
        ("Flag", "Z"),
        ("ByteVal", "B"),
        ("CharVal", "C"),
        ("ShortVal", "S"),
        ("IntVal", "I"),
        ("LongVal", "J"),
        ("FloatVal", "F"),
        ("DoubleVal", "D"),
        ("Text", "Lrt/String;"),
        ("IntArray", "[I"),
    ];
    for (slot, (name, sig)) in accessors.into_iter().enumerate() {
        harness = harness
            .method(format!("get{name}"), format!("(){sig}"), field_getter(slot))
            .method(format!("set{name}"), format!("({sig})V"), field_setter(slot));
    }
    rt.define_class(harness).unwrap();

    vm
}

fn field_getter(slot: usize) -> MethodImpl {
    Arc::new(move |rt, recv, _args| {
        let obj = recv.ok_or_else(|| rt.raise("rt/Error", "missing receiver"))?;
        let value = obj
            .get_field(slot)
            .map_err(|e| rt.raise("rt/Error", &e.to_string()))?;
        Ok(Some(value))
    })
}

fn field_setter(slot: usize) -> MethodImpl {
    Arc::new(move |rt, recv, args| {
        let obj = recv.ok_or_else(|| rt.raise("rt/Error", "missing receiver"))?;
        obj.set_field(slot, args[0].clone())
            .map_err(|e| rt.raise("rt/Error", &e.to_string()))?;
        Ok(None)
    })
}
