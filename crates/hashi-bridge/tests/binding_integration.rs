//! End-to-end binding tests: resolution, fields, calls, strings
//!
//! Covers the full path a native caller takes: find a class, resolve
//! member ids, construct objects, read and write every primitive field
//! kind at its exact width, and call managed methods with argument
//! checking.

mod common;

use common::fixture_vm;
use hashi_bridge::{BridgeError, NativeValue};

#[test]
fn test_construct_point_and_move_it() {
    let vm = fixture_vm();
    let _attach = vm.attach().unwrap();
    let env = vm.env().unwrap();

    let point = env.find_class("geom/Point").unwrap();
    let ctor = env.get_method_id(point, "<init>", "(II)V").unwrap();
    let p = env
        .new_object(point, ctor, &[NativeValue::Int(3), NativeValue::Int(4)])
        .unwrap();

    let x = env.get_field_id(point, "x", "I").unwrap();
    let y = env.get_field_id(point, "y", "I").unwrap();
    assert_eq!(env.get_field(p, x).unwrap(), NativeValue::Int(3));
    assert_eq!(env.get_field(p, y).unwrap(), NativeValue::Int(4));

    let offset = env.get_method_id(point, "offset", "(II)V").unwrap();
    let out = env
        .call_method(p, offset, &[NativeValue::Int(10), NativeValue::Int(-1)])
        .unwrap();
    assert_eq!(out, NativeValue::Void);
    assert_eq!(env.get_field(p, x).unwrap(), NativeValue::Int(13));
    assert_eq!(env.get_field(p, y).unwrap(), NativeValue::Int(3));
}

#[test]
fn test_every_primitive_field_kind() {
    let vm = fixture_vm();
    let _attach = vm.attach().unwrap();
    let env = vm.env().unwrap();

    let harness = env.find_class("fixture/Harness").unwrap();
    let ctor = env.get_method_id(harness, "<init>", "()V").unwrap();
    let h = env.new_object(harness, ctor, &[]).unwrap();

    let cases = [
        ("flag", "Z", NativeValue::Bool(true)),
        ("byteVal", "B", NativeValue::Byte(-128)),
        // 'あ' as a UTF-16 code unit.
        ("charVal", "C", NativeValue::Char(0x3042)),
        ("shortVal", "S", NativeValue::Short(-32768)),
        ("intVal", "I", NativeValue::Int(i32::MIN)),
        ("longVal", "J", NativeValue::Long(i64::MIN)),
        ("floatVal", "F", NativeValue::Float(1.5)),
        ("doubleVal", "D", NativeValue::Double(-2.25)),
    ];
    for (name, sig, value) in cases {
        let id = env.get_field_id(harness, name, sig).unwrap();
        env.set_field(h, id, &value).unwrap();
        assert_eq!(env.get_field(h, id).unwrap(), value, "{name}");
    }
}

#[test]
fn test_string_field_and_managed_method() {
    let vm = fixture_vm();
    let _attach = vm.attach().unwrap();
    let env = vm.env().unwrap();

    let harness = env.find_class("fixture/Harness").unwrap();
    let ctor = env.get_method_id(harness, "<init>", "()V").unwrap();
    let h = env.new_object(harness, ctor, &[]).unwrap();

    let text = env.get_field_id(harness, "text", "Lrt/String;").unwrap();
    // Default is null.
    assert_eq!(env.get_field(h, text).unwrap(), NativeValue::null());

    let greeting = env.new_string("こんにちは、世界！").unwrap();
    env.set_field(h, text, &NativeValue::Object(Some(greeting))).unwrap();
    let back = env.get_field(h, text).unwrap().as_object().unwrap().unwrap();
    assert_eq!(env.get_string(back).unwrap(), "こんにちは、世界！");

    let describe = env.get_method_id(harness, "describe", "()Lrt/String;").unwrap();
    let out = env.call_method(h, describe, &[]).unwrap();
    let out = out.as_object().unwrap().unwrap();
    assert_eq!(env.get_string(out).unwrap(), "Harness[こんにちは、世界！]");
}

#[test]
fn test_accessor_methods_round_trip_every_kind() {
    let vm = fixture_vm();
    let _attach = vm.attach().unwrap();
    let env = vm.env().unwrap();

    let harness = env.find_class("fixture/Harness").unwrap();
    let ctor = env.get_method_id(harness, "<init>", "()V").unwrap();
    let h = env.new_object(harness, ctor, &[]).unwrap();

    let cases = [
        ("Flag", "Z", NativeValue::Bool(true)),
        ("ByteVal", "B", NativeValue::Byte(-8)),
        // 'さ' as a UTF-16 code unit.
        ("CharVal", "C", NativeValue::Char(0x3055)),
        ("ShortVal", "S", NativeValue::Short(-1234)),
        ("IntVal", "I", NativeValue::Int(1_234_567)),
        ("LongVal", "J", NativeValue::Long(9_876_543_210)),
        ("FloatVal", "F", NativeValue::Float(2.5)),
        ("DoubleVal", "D", NativeValue::Double(-0.25)),
    ];
    for (name, sig, value) in cases {
        let set = env
            .get_method_id(harness, &format!("set{name}"), &format!("({sig})V"))
            .unwrap();
        let get = env
            .get_method_id(harness, &format!("get{name}"), &format!("(){sig}"))
            .unwrap();
        assert_eq!(env.call_method(h, set, &[value]).unwrap(), NativeValue::Void, "{name}");
        assert_eq!(env.call_method(h, get, &[]).unwrap(), value, "{name}");
    }

    let set_text = env.get_method_id(harness, "setText", "(Lrt/String;)V").unwrap();
    let get_text = env.get_method_id(harness, "getText", "()Lrt/String;").unwrap();
    let greeting = env.new_string("こんにちは、世界！").unwrap();
    env.call_method(h, set_text, &[NativeValue::Object(Some(greeting))]).unwrap();
    let back = env.call_method(h, get_text, &[]).unwrap().as_object().unwrap().unwrap();
    assert_eq!(env.get_string(back).unwrap(), "こんにちは、世界！");

    let set_arr = env.get_method_id(harness, "setIntArray", "([I)V").unwrap();
    let get_arr = env.get_method_id(harness, "getIntArray", "()[I").unwrap();
    let arr = env.new_prim_array_from(&[11i32, 21, 31, 41, 51]).unwrap();
    env.call_method(h, set_arr, &[NativeValue::Object(Some(arr))]).unwrap();
    let back = env.call_method(h, get_arr, &[]).unwrap().as_object().unwrap().unwrap();
    assert_eq!(env.get_array::<i32, _>(back).unwrap(), vec![11, 21, 31, 41, 51]);
    assert!(env.is_same_object(Some(arr), Some(back)).unwrap());
}

#[test]
fn test_static_fields() {
    let vm = fixture_vm();
    let _attach = vm.attach().unwrap();
    let env = vm.env().unwrap();

    let harness = env.find_class("fixture/Harness").unwrap();
    let count = env.get_static_field_id(harness, "staticCount", "I").unwrap();
    assert_eq!(env.get_static_field(count).unwrap(), NativeValue::Int(0));
    env.set_static_field(count, &NativeValue::Int(7)).unwrap();
    assert_eq!(env.get_static_field(count).unwrap(), NativeValue::Int(7));

    let text = env.get_static_field_id(harness, "staticText", "Lrt/String;").unwrap();
    let s = env.new_string("shared").unwrap();
    env.set_static_field(text, &NativeValue::Object(Some(s))).unwrap();
    let back = env.get_static_field(text).unwrap().as_object().unwrap().unwrap();
    assert_eq!(env.get_string(back).unwrap(), "shared");
}

#[test]
fn test_point_sample_static_holds_object() {
    let vm = fixture_vm();
    let _attach = vm.attach().unwrap();
    let env = vm.env().unwrap();

    let point = env.find_class("geom/Point").unwrap();
    let ctor = env.get_method_id(point, "<init>", "(II)V").unwrap();
    let sample = env.get_static_field_id(point, "samplePoint", "Lgeom/Point;").unwrap();

    let p = env
        .new_object(point, ctor, &[NativeValue::Int(100), NativeValue::Int(200)])
        .unwrap();
    env.set_static_field(sample, &NativeValue::Object(Some(p))).unwrap();

    let back = env.get_static_field(sample).unwrap().as_object().unwrap().unwrap();
    assert!(env.is_same_object(Some(p), Some(back)).unwrap());
    assert!(env.is_instance_of(back, point).unwrap());
    let x = env.get_field_id(point, "x", "I").unwrap();
    assert_eq!(env.get_field(back, x).unwrap(), NativeValue::Int(100));
}

#[test]
fn test_resolution_failures_are_precise() {
    let vm = fixture_vm();
    let _attach = vm.attach().unwrap();
    let env = vm.env().unwrap();

    assert!(matches!(
        env.find_class("fixture/Missing"),
        Err(BridgeError::MemberNotFound { class, .. }) if class == "fixture/Missing"
    ));
    assert!(matches!(
        env.find_class("nonexistent.Type"),
        Err(BridgeError::MemberNotFound { .. })
    ));

    let harness = env.find_class("fixture/Harness").unwrap();
    // Wrong signature text.
    assert!(matches!(
        env.get_field_id(harness, "intVal", "J"),
        Err(BridgeError::MemberNotFound { .. })
    ));
    // Wrong arity in the method signature.
    assert!(matches!(
        env.get_method_id(harness, "describe", "(I)Lrt/String;"),
        Err(BridgeError::MemberNotFound { .. })
    ));
    // Field resolution and assignment reject mismatched widths.
    let h_ctor = env.get_method_id(harness, "<init>", "()V").unwrap();
    let h = env.new_object(harness, h_ctor, &[]).unwrap();
    let short_id = env.get_field_id(harness, "shortVal", "S").unwrap();
    assert!(matches!(
        env.set_field(h, short_id, &NativeValue::Int(1)),
        Err(BridgeError::SignatureMismatch { .. })
    ));
}

#[test]
fn test_field_id_rejects_wrong_receiver_class() {
    let vm = fixture_vm();
    let _attach = vm.attach().unwrap();
    let env = vm.env().unwrap();

    let point = env.find_class("geom/Point").unwrap();
    let x = env.get_field_id(point, "x", "I").unwrap();

    let s = env.new_string("not a point").unwrap();
    assert!(matches!(
        env.get_field(s, x),
        Err(BridgeError::SignatureMismatch { .. })
    ));
}
