// Weft - weft-runtime
// Module: linking and instantiation integration tests
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! Provider-chain resolution, cross-module state sharing, and the
//! start-function trap policy.

use std::rc::Rc;

use weft_decoder::{decode_module, DecodeConfig};
use weft_error::ErrorCategory;
use weft_foundation::Value;
use weft_format::Module;
use weft_runtime::{
    invoke_func, EngineConfig, Instance, InstantiationError, Provider, TrapKind,
};

fn decode(source: &str) -> Rc<Module> {
    let bytes = wat::parse_str(source).unwrap();
    Rc::new(decode_module(&bytes, &DecodeConfig::default()).unwrap())
}

fn call(instance: &Instance, name: &str, args: &[Value]) -> Vec<Value> {
    let func = instance.export_func(name).unwrap();
    invoke_func(&func, args, &EngineConfig::default()).unwrap()
}

#[test]
fn registered_exports_satisfy_later_imports() {
    // A owns the memory and writes to it; B imports it and must see
    // the write A made before B's call.
    let a = Instance::instantiate_no_init(
        &decode(
            r#"(module
                 (memory (export "mem") 1)
                 (func (export "add") (param i32 i32) (result i32)
                   local.get 0 local.get 1 i32.add)
                 (func (export "bump")
                   (i32.store8 (i32.const 1) (i32.const 7))))"#,
        ),
        &[],
    )
    .unwrap();
    call(&a, "bump", &[]);

    let math = Rc::new(a.export_provider("math"));
    let b = Instance::instantiate_no_init(
        &decode(
            r#"(module
                 (import "math" "mem" (memory 1))
                 (import "math" "add" (func $add (param i32 i32) (result i32)))
                 (func (export "read_plus") (param i32) (result i32)
                   (call $add (i32.load8_u (i32.const 1)) (local.get 0))))"#,
        ),
        &[math],
    )
    .unwrap();
    assert_eq!(call(&b, "read_plus", &[Value::I32(10)]), vec![Value::I32(17)]);

    // Writes through B's imported handle are visible from A's side.
    let b2 = Instance::instantiate_no_init(
        &decode(
            r#"(module
                 (import "math" "mem" (memory 1))
                 (func (export "poke")
                   (i32.store8 (i32.const 2) (i32.const 9))))"#,
        ),
        &[Rc::new(a.export_provider("math"))],
    )
    .unwrap();
    call(&b2, "poke", &[]);
    let c = Instance::instantiate_no_init(
        &decode(
            r#"(module
                 (import "math" "mem" (memory 1))
                 (func (export "read") (result i32)
                   (i32.load8_u (i32.const 2))))"#,
        ),
        &[Rc::new(a.export_provider("math"))],
    )
    .unwrap();
    assert_eq!(call(&c, "read", &[]), vec![Value::I32(9)]);
}

#[test]
fn unknown_import_is_a_link_error() {
    let module = decode(r#"(module (import "nowhere" "f" (func)))"#);
    match Instance::instantiate_no_init(&module, &[]) {
        Err(InstantiationError::Link(e)) => assert_eq!(e.category, ErrorCategory::Link),
        other => panic!("expected link error, got {other:?}"),
    }
}

#[test]
fn incompatible_import_signature_is_a_link_error() {
    let a = Instance::instantiate_no_init(
        &decode(r#"(module (func (export "f") (result i32) i32.const 0))"#),
        &[],
    )
    .unwrap();
    let module = decode(r#"(module (import "lib" "f" (func (result i64))))"#);
    match Instance::instantiate_no_init(&module, &[Rc::new(a.export_provider("lib"))]) {
        Err(InstantiationError::Link(e)) => assert_eq!(e.category, ErrorCategory::Link),
        other => panic!("expected link error, got {other:?}"),
    }
}

#[test]
fn out_of_bounds_active_segment_fails_instantiation() {
    let module = decode(
        r#"(module (memory 1)
             (data (i32.const 65535) "too long"))"#,
    );
    match Instance::instantiate_no_init(&module, &[]) {
        Err(InstantiationError::Trap(t)) => {
            assert_eq!(t.kind, TrapKind::OutOfBoundsMemoryAccess);
        }
        other => panic!("expected trap-class failure, got {other:?}"),
    }
}

#[test]
fn start_trap_leaves_the_instance_usable_for_a_tolerant_caller() {
    let module = decode(
        r#"(module
             (global $g (mut i32) (i32.const 0))
             (func $start
               (global.set $g (i32.const 1))
               unreachable)
             (start $start)
             (func (export "observed") (result i32) global.get $g))"#,
    );
    let instance = Instance::instantiate_no_init(&module, &[]).unwrap();
    let trap = instance.run_start(&EngineConfig::default()).unwrap_err();
    assert_eq!(trap.kind, TrapKind::Unreachable);
    // Tolerant caller keeps the handle; side effects before the trap
    // stay visible, nothing is rolled back.
    assert_eq!(call(&instance, "observed", &[]), vec![Value::I32(1)]);
}

#[test]
fn reencoded_module_behaves_identically() {
    let source = r#"(module
         (table 2 funcref)
         (elem (i32.const 0) $a $b)
         (func $a (result i32) i32.const 10)
         (func $b (result i32) i32.const 20)
         (func (export "pick") (param i32) (result i32)
           local.get 0 (call_indirect (result i32))))"#;
    let original = decode(source);
    let reencoded = Rc::new(
        decode_module(
            &weft_format::encode_module(&original).unwrap(),
            &DecodeConfig::default(),
        )
        .unwrap(),
    );
    let first = Instance::instantiate_no_init(&original, &[]).unwrap();
    let second = Instance::instantiate_no_init(&reencoded, &[]).unwrap();
    for arg in [0, 1] {
        assert_eq!(
            call(&first, "pick", &[Value::I32(arg)]),
            call(&second, "pick", &[Value::I32(arg)])
        );
    }
}

#[test]
fn provider_chain_prefers_the_front_namespace() {
    let newest = Rc::new(
        Provider::new(
            "env",
            vec![(
                "mem_size".to_string(),
                weft_runtime::ExternVal::Func(weft_runtime::FuncInstance::host(
                    weft_foundation::FuncType::new(vec![], vec![weft_foundation::ValueType::I32]),
                    Box::new(|_| Ok(vec![Value::I32(111)])),
                )),
            )],
        ),
    );
    let oldest = Rc::new(
        Provider::new(
            "env",
            vec![(
                "mem_size".to_string(),
                weft_runtime::ExternVal::Func(weft_runtime::FuncInstance::host(
                    weft_foundation::FuncType::new(vec![], vec![weft_foundation::ValueType::I32]),
                    Box::new(|_| Ok(vec![Value::I32(222)])),
                )),
            )],
        ),
    );
    let module = decode(
        r#"(module
             (import "env" "mem_size" (func $f (result i32)))
             (func (export "get") (result i32) call $f))"#,
    );
    let instance = Instance::instantiate_no_init(&module, &[newest, oldest]).unwrap();
    assert_eq!(call(&instance, "get", &[]), vec![Value::I32(111)]);
}
