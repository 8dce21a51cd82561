// Weft - weft-runtime
// Module: execution property tests
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! End-to-end semantic properties: determinism, dispatch-mode
//! equivalence, bounds, division, and the canonical trap examples.

use std::rc::Rc;

use proptest::prelude::*;

use weft_decoder::{decode_module, DecodeConfig};
use weft_foundation::Value;
use weft_runtime::{invoke_func, EngineConfig, Instance, InvokeError, TrapKind};

fn instantiate(source: &str, jump_table: bool) -> Instance {
    let bytes = wat::parse_str(source).unwrap();
    let config = DecodeConfig {
        generate_jump_table: jump_table,
    };
    let module = Rc::new(decode_module(&bytes, &config).unwrap());
    Instance::instantiate_no_init(&module, &[]).unwrap()
}

fn call(instance: &Instance, name: &str, args: &[Value]) -> Result<Vec<Value>, InvokeError> {
    let func = instance.export_func(name).unwrap();
    invoke_func(&func, args, &EngineConfig::default())
}

/// Collapses an invocation to something comparable across dispatch
/// modes: the results, or the trap identifier.
fn outcome(instance: &Instance, name: &str, args: &[Value]) -> Result<Vec<Value>, u32> {
    match call(instance, name, args) {
        Ok(results) => Ok(results),
        Err(InvokeError::Trap(t)) => Err(t.kind.id()),
        Err(InvokeError::Contract(e)) => panic!("unexpected contract error: {e}"),
    }
}

#[test]
fn add_returns_the_sum() {
    let inst = instantiate(
        r#"(module (func (export "add") (param i32 i32) (result i32)
             local.get 0 local.get 1 i32.add))"#,
        true,
    );
    let results = call(&inst, "add", &[Value::I32(1), Value::I32(2)]).unwrap();
    assert_eq!(results, vec![Value::I32(3)]);
    assert_eq!(results[0].to_string(), "3:i32");
}

#[test]
fn unreachable_yields_the_canonical_message_and_no_results() {
    let inst = instantiate(r#"(module (func (export "unreachable_fn") unreachable))"#, true);
    match call(&inst, "unreachable_fn", &[]) {
        Err(InvokeError::Trap(t)) => {
            assert_eq!(t.kind, TrapKind::Unreachable);
            assert_eq!(t.kind.message(), "unreachable executed");
        }
        other => panic!("expected trap, got {other:?}"),
    }
}

#[test]
fn repeated_invocation_is_deterministic() {
    let inst = instantiate(
        r#"(module (func (export "mix") (param i32) (result f64)
             (f64.add
               (f64.convert_i32_s (local.get 0))
               (f64.mul (f64.const 0.5) (f64.convert_i32_u (local.get 0))))))"#,
        true,
    );
    let first = call(&inst, "mix", &[Value::I32(-7)]).unwrap();
    for _ in 0..10 {
        assert_eq!(call(&inst, "mix", &[Value::I32(-7)]).unwrap(), first);
    }
}

// A deliberately branchy program: br_table into nested blocks, a loop
// with an early break, an inner call, and a trapping arm.
const BRANCHY: &str = r#"
(module
  (func $helper (param i32) (result i32)
    (i32.mul (local.get 0) (i32.const 3)))
  (func (export "classify") (param i32) (result i32)
    (block $b1
      (block $b0
        (br_table $b0 $b1 (i32.rem_u (local.get 0) (i32.const 3))))
      ;; case 0: count down by fives until at most 100
      (local.set 0 (i32.and (call $helper (local.get 0)) (i32.const 1023)))
      (loop $l
        (local.set 0 (i32.sub (local.get 0) (i32.const 5)))
        (br_if $l (i32.gt_s (local.get 0) (i32.const 100))))
      (return (local.get 0)))
    ;; other cases: divide, trapping when the argument is 1
    (i32.div_s (i32.const 1000) (i32.sub (local.get 0) (i32.const 1)))))
"#;

proptest! {
    #[test]
    fn dispatch_modes_are_observably_identical(arg in any::<i32>()) {
        let fast = instantiate(BRANCHY, true);
        let slow = instantiate(BRANCHY, false);
        prop_assert_eq!(
            outcome(&fast, "classify", &[Value::I32(arg)]),
            outcome(&slow, "classify", &[Value::I32(arg)])
        );
    }
}

#[test]
fn dispatch_modes_agree_on_trap_identity() {
    let fast = instantiate(BRANCHY, true);
    let slow = instantiate(BRANCHY, false);
    // argument 1 takes the dividing arm with a zero divisor
    let a = outcome(&fast, "classify", &[Value::I32(1)]);
    let b = outcome(&slow, "classify", &[Value::I32(1)]);
    assert_eq!(a, b);
    assert_eq!(a, Err(TrapKind::DivideByZero.id()));
}

#[test]
fn memory_access_traps_exactly_past_the_edge() {
    let inst = instantiate(
        r#"(module (memory 1)
             (func (export "load32") (param i32) (result i32)
               local.get 0 i32.load)
             (func (export "load8") (param i32) (result i32)
               local.get 0 i32.load8_u))"#,
        true,
    );
    // o + s == size is fine, one more byte traps
    assert!(call(&inst, "load32", &[Value::I32(65532)]).is_ok());
    assert!(call(&inst, "load8", &[Value::I32(65535)]).is_ok());
    for (name, addr) in [("load32", 65533), ("load8", 65536)] {
        match call(&inst, name, &[Value::I32(addr)]) {
            Err(InvokeError::Trap(t)) => {
                assert_eq!(t.kind, TrapKind::OutOfBoundsMemoryAccess);
            }
            other => panic!("expected trap at {addr}, got {other:?}"),
        }
    }
}

#[test]
fn table_access_traps_at_the_size() {
    let inst = instantiate(
        r#"(module (table 4 funcref)
             (func (export "probe") (param i32) (result i32)
               local.get 0 table.get 0 ref.is_null))"#,
        true,
    );
    assert_eq!(
        call(&inst, "probe", &[Value::I32(3)]).unwrap(),
        vec![Value::I32(1)]
    );
    match call(&inst, "probe", &[Value::I32(4)]) {
        Err(InvokeError::Trap(t)) => assert_eq!(t.kind, TrapKind::OutOfBoundsTableAccess),
        other => panic!("expected trap, got {other:?}"),
    }
}

#[test]
fn division_edge_cases() {
    let inst = instantiate(
        r#"(module
             (func (export "div_s") (param i32 i32) (result i32)
               local.get 0 local.get 1 i32.div_s)
             (func (export "div_u") (param i32 i32) (result i32)
               local.get 0 local.get 1 i32.div_u)
             (func (export "rem_s") (param i32 i32) (result i32)
               local.get 0 local.get 1 i32.rem_s))"#,
        true,
    );
    let trap_of = |name: &str, a: i32, b: i32| {
        match call(&inst, name, &[Value::I32(a), Value::I32(b)]) {
            Err(InvokeError::Trap(t)) => t.kind,
            other => panic!("expected trap, got {other:?}"),
        }
    };
    assert_eq!(trap_of("div_s", i32::MIN, -1), TrapKind::IntegerOverflow);
    assert_eq!(trap_of("div_s", 7, 0), TrapKind::DivideByZero);
    assert_eq!(trap_of("div_u", 7, 0), TrapKind::DivideByZero);
    assert_eq!(trap_of("rem_s", 7, 0), TrapKind::DivideByZero);
    // rem of MIN by -1 is defined, not a trap
    assert_eq!(
        call(&inst, "rem_s", &[Value::I32(i32::MIN), Value::I32(-1)]).unwrap(),
        vec![Value::I32(0)]
    );
    assert_eq!(
        call(&inst, "div_s", &[Value::I32(7), Value::I32(-2)]).unwrap(),
        vec![Value::I32(-3)]
    );
}

#[test]
fn float_to_int_conversion_traps() {
    let inst = instantiate(
        r#"(module
             (func (export "trunc") (param f64) (result i32)
               local.get 0 i32.trunc_f64_s)
             (func (export "trunc_sat") (param f64) (result i32)
               local.get 0 i32.trunc_sat_f64_s))"#,
        true,
    );
    let nan = Value::F64(weft_foundation::FloatBits64::from_float(f64::NAN));
    let big = Value::F64(weft_foundation::FloatBits64::from_float(1e300));
    match call(&inst, "trunc", std::slice::from_ref(&nan)) {
        Err(InvokeError::Trap(t)) => {
            assert_eq!(t.kind, TrapKind::InvalidConversionToInteger);
        }
        other => panic!("expected trap, got {other:?}"),
    }
    match call(&inst, "trunc", std::slice::from_ref(&big)) {
        Err(InvokeError::Trap(t)) => assert_eq!(t.kind, TrapKind::IntegerOverflow),
        other => panic!("expected trap, got {other:?}"),
    }
    // saturating forms never trap
    assert_eq!(
        call(&inst, "trunc_sat", &[nan]).unwrap(),
        vec![Value::I32(0)]
    );
    assert_eq!(
        call(&inst, "trunc_sat", &[big]).unwrap(),
        vec![Value::I32(i32::MAX)]
    );
}
