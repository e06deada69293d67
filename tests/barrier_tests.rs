//! Integration tests for store barrier insertion over TIR.
//!
//! Each test parses a small module, runs the phase and inspects where
//! `fenced_store_barrier` nodes ended up.

use store_barrier::barrier::{BarrierConfig, BarrierStats, ModeSelection, StoreBarrierInsertion};
use store_barrier::core::ir::{Opcode, UseKind};
use store_barrier::core::{BarrierError, BarrierResult};
use store_barrier::test_ir::{run_module, TestIR, TestIRAdaptor};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn parse(text: &str) -> TestIR {
    TestIR::parse(text).unwrap_or_else(|e| panic!("failed to parse test IR: {e}"))
}

fn run_with(text: &str, config: BarrierConfig) -> (TestIR, BarrierResult<BarrierStats>) {
    init_logging();
    let mut ir = parse(text);
    let result = run_module(&mut ir, &config);
    (ir, result)
}

fn run(text: &str) -> (TestIR, BarrierStats) {
    let (ir, result) = run_with(text, BarrierConfig::default());
    let stats = result.unwrap_or_else(|e| panic!("barrier insertion failed: {e}\n{ir}"));
    (ir, stats)
}

fn ops(ir: &TestIR, block: &str) -> Vec<&'static str> {
    let block = ir
        .block_by_name(0, block)
        .unwrap_or_else(|| panic!("no block {block}"));
    ir.block_ops(block)
}

fn barriers(ir: &TestIR) -> usize {
    ir.count_ops(0, Opcode::FencedStoreBarrier)
}

#[test]
fn test_end_to_end_single_barrier() {
    let (ir, stats) = run(
        r#"
e2e() {
entry:
    %a = new_object
    %c = const 42
    put_by_offset %a, %a, %c
    %b = new_object
    put_by_offset %a, %a, %b
    %r = call
    put_by_offset %a, %a, %b
    return
}
"#,
    );

    assert_eq!(
        ops(&ir, "entry"),
        vec![
            "new_object",
            "const",
            "put_by_offset",
            "new_object",
            "put_by_offset",
            "call",
            "put_by_offset",
            "fenced_store_barrier",
            "return",
        ]
    );
    assert_eq!(stats.barriers_inserted, 1);
    assert_eq!(stats.elided_non_cell, 1);
    assert_eq!(stats.elided_fresh, 1);

    let printed = ir.print();
    assert!(
        printed.contains("    put_by_offset %a, %a, %b\n    fenced_store_barrier %a !invalid_exit\n"),
        "{printed}"
    );
}

#[test]
fn test_barrier_edge_is_known_cell_and_points_at_store() {
    let (ir, _) = run(
        r#"
f(%o, %v) {
entry:
    put_by_offset %o, %o, %v
    return
}
"#,
    );
    let entry = &ir.blocks[0];
    // Arguments come first.
    let store = entry.insts[2];
    let barrier = &ir.values[entry.insts[3] as usize];
    assert_eq!(barrier.op, Opcode::FencedStoreBarrier);
    assert_eq!(barrier.operands[0].use_kind, UseKind::KnownCell);
    assert_eq!(Some(barrier.operands[0].value), ir.value_by_name(0, "o"));
    assert_eq!(barrier.origin, Some(store));
    assert!(!barrier.exit_ok);
}

#[test]
fn test_no_barrier_on_fresh_allocation() {
    let (ir, stats) = run(
        r#"
fresh(%v) {
entry:
    %a = new_object
    put_by_offset %a, %a, %v
    put_closure_var %a, %v
    %arr = new_array
    put_by_val.contiguous %arr, %v, %v
    return
}
"#,
    );
    assert_eq!(barriers(&ir), 0, "{ir}");
    assert_eq!(stats.elided_fresh, 3);
}

#[test]
fn test_gc_point_makes_allocation_stale() {
    let (ir, _) = run(
        r#"
stale(%v) {
entry:
    %a = new_object
    %r = call
    put_by_offset %a, %a, %v
    put_by_offset %a, %a, %v
    return
}
"#,
    );
    // A barrier ages its base, so the second store needs one too.
    assert_eq!(
        ops(&ir, "entry"),
        vec![
            "new_object",
            "call",
            "put_by_offset",
            "fenced_store_barrier",
            "put_by_offset",
            "fenced_store_barrier",
            "return",
        ]
    );
}

#[test]
fn test_store_that_may_collect_keeps_fresh_base() {
    let (ir, stats) = run(
        r#"
calls_out(%v) {
entry:
    %a = new_object
    put_by_id %a, %v
    return
}
"#,
    );
    assert_eq!(ops(&ir, "entry"), vec!["new_object", "put_by_id", "return"]);
    assert_eq!(stats.elided_fresh, 1);

    // The collection it may trigger ages the base for the next store.
    let (ir, _) = run(
        r#"
calls_out_twice(%v) {
entry:
    %a = new_object
    put_by_id %a, %v
    put_private_name_by_id %a, %v
    set_function_name %a, %v
    return
}
"#,
    );
    assert_eq!(
        ops(&ir, "entry"),
        vec![
            "new_object",
            "put_by_id",
            "put_private_name_by_id",
            "fenced_store_barrier",
            "set_function_name",
            "fenced_store_barrier",
            "return",
        ]
    );
}

#[test]
fn test_heap_escape_invalidates_value() {
    let (ir, stats) = run(
        r#"
escape(%o) {
entry:
    %a = new_object
    put_by_offset %o, %o, %a
    put_by_offset %a, %a, %o
    return
}
"#,
    );
    assert_eq!(
        ops(&ir, "entry"),
        vec![
            "new_object",
            "put_by_offset",
            "fenced_store_barrier",
            "put_by_offset",
            "fenced_store_barrier",
            "return",
        ]
    );
    assert_eq!(stats.escapes_invalidated, 1);
}

#[test]
fn test_non_cell_values_need_no_barrier() {
    let (ir, stats) = run(
        r#"
scalars(%o, %x) {
entry:
    %c = const 1.5
    %n = const null
    %s = add %x, %x
    %t = compare_eq %x, %x
    put_by_offset %o, %o, %c
    put_by_offset %o, %o, %n
    put_by_offset %o, %o, %s
    put_by_offset %o, %o, %t
    %k = const cell
    put_by_offset %o, %o, %k
    return
}
"#,
    );
    assert_eq!(stats.elided_non_cell, 4);
    assert_eq!(barriers(&ir), 1, "a cell constant still needs a barrier:\n{ir}");
}

#[test]
fn test_array_push_requests_one_barrier() {
    let (ir, stats) = run(
        r#"
push(%arr, %x, %y) {
entry:
    %n = array_push.contiguous %arr, %x, %y
    return
}
"#,
    );
    assert_eq!(ops(&ir, "entry"), vec!["array_push", "fenced_store_barrier", "return"]);
    assert_eq!(stats.barriers_inserted, 1);
}

#[test]
fn test_indexed_store_modes() {
    let (ir, _) = run(
        r#"
indexed(%o, %i, %v) {
entry:
    put_by_val.int32 %o, %i, %v
    put_by_val.double %o, %i, %v
    put_by_val.contiguous %o, %i, %v
    put_by_val.slow %o, %i, %v
    return
}
"#,
    );
    // Int32 and double storage never hold cells; a generic store compiled
    // to the slow path barriers itself.
    assert_eq!(
        ops(&ir, "entry"),
        vec![
            "put_by_val",
            "put_by_val",
            "put_by_val",
            "fenced_store_barrier",
            "put_by_val",
            "return",
        ]
    );
}

#[test]
fn test_generic_put_by_val_needs_cell_base() {
    let (ir, _) = run(
        r#"
generic(%o, %i, %v) {
entry:
    put_by_val %o:untyped, %i, %v
    put_by_val %o, %i, %v
    return
}
"#,
    );
    assert_eq!(
        ops(&ir, "entry"),
        vec!["put_by_val", "put_by_val", "fenced_store_barrier", "return"]
    );
}

#[test]
fn test_stack_pin_survives_until_read() {
    let (ir, stats) = run(
        r#"
pinned(%o) {
entry:
    %a = new_object
    put_stack %a, $1
    %y = get_stack $2
    put_by_offset %a, %a, %o
    %x = get_stack $1
    put_by_offset %a, %a, %o
    return
}
"#,
    );
    assert_eq!(
        ops(&ir, "entry"),
        vec![
            "new_object",
            "put_stack",
            "get_stack",
            "put_by_offset",
            "get_stack",
            "put_by_offset",
            "fenced_store_barrier",
            "return",
        ]
    );
    assert_eq!(stats.stack_pins, 1);
    assert_eq!(stats.escapes_invalidated, 1);
}

#[test]
fn test_stack_pin_lost_at_gc_point() {
    let (ir, _) = run(
        r#"
gc(%o) {
entry:
    %a = new_object
    put_stack %a, $1
    %r = call
    put_by_offset %a, %a, %o
    return
}
"#,
    );
    assert_eq!(barriers(&ir), 1);
}

#[test]
fn test_stack_pin_lost_on_generic_stack_access() {
    let (ir, _) = run(
        r#"
clobber(%o) {
entry:
    %a = new_object
    put_stack %a, $1
    clobber_stack
    put_by_offset %a, %a, %o
    return
}
"#,
    );
    assert_eq!(barriers(&ir), 1);
}

#[test]
fn test_stack_pin_eviction() {
    let text = r#"
evict(%o) {
entry:
    %a = new_object
    %b = new_object
    put_stack %a, $1
    put_stack %b, $2
    put_by_offset %a, %a, %o
    put_by_offset %b, %b, %o
    return
}
"#;
    let (ir, result) = run_with(text, BarrierConfig::default().with_stack_escape_capacity(1));
    result.unwrap();
    assert_eq!(
        ops(&ir, "entry"),
        vec![
            "new_object",
            "new_object",
            "put_stack",
            "put_stack",
            "put_by_offset",
            "fenced_store_barrier",
            "put_by_offset",
            "return",
        ]
    );

    let (ir, result) = run_with(text, BarrierConfig::default());
    result.unwrap();
    assert_eq!(barriers(&ir), 0);
}

#[test]
fn test_pinned_value_escapes_at_block_end() {
    let (ir, _) = run(
        r#"
block_end(%o) ssa {
entry:
    %a = new_object
    put_stack %a, $1
    jump ^next
next:
    put_by_offset %a, %a, %o
    return
}
"#,
    );
    assert_eq!(ops(&ir, "next"), vec!["put_by_offset", "fenced_store_barrier", "return"]);

    // Without the stack write the allocation stays fresh across the jump.
    let (ir, _) = run(
        r#"
no_pin(%o) ssa {
entry:
    %a = new_object
    jump ^next
next:
    put_by_offset %a, %a, %o
    return
}
"#,
    );
    assert_eq!(barriers(&ir), 0);
}

#[test]
fn test_fast_mode_assumes_block_boundaries_are_stale() {
    let (ir, _) = run(
        r#"
cps(%o) {
entry:
    %a = new_object
    jump ^next
next:
    put_by_offset %a, %a, %o
    return
}
"#,
    );
    assert_eq!(ops(&ir, "next"), vec!["put_by_offset", "fenced_store_barrier", "return"]);
}

const DIAMOND: &str = r#"
diamond(%c) ssa {
entry:
    %a = new_object
    branch %c, ^fresh, ^stale
fresh:
    jump ^join
stale:
    %r = call
    jump ^join
join:
    put_by_offset %a, %a, %c
    return
}
"#;

#[test]
fn test_conservative_merge() {
    let (ir, stats) = run(DIAMOND);
    assert_eq!(ops(&ir, "join"), vec!["put_by_offset", "fenced_store_barrier", "return"]);
    assert_eq!(barriers(&ir), 1);
    assert!(stats.fixpoint_sweeps >= 2);
}

#[test]
fn test_merge_of_fresh_paths_needs_no_barrier() {
    let (ir, _) = run(&DIAMOND.replace("    %r = call\n", ""));
    assert_eq!(barriers(&ir), 0, "{ir}");
}

#[test]
fn test_loop_back_edge_reaches_header() {
    let (ir, _) = run(
        r#"
looping(%o, %c) ssa {
entry:
    %a = new_object
    jump ^head
head:
    put_by_offset %a, %a, %o
    branch %c, ^body, ^exit
body:
    %r = call
    jump ^head
exit:
    return
}
"#,
    );
    assert_eq!(ops(&ir, "head"), vec!["put_by_offset", "fenced_store_barrier", "branch"]);
}

#[test]
fn test_phi_fed_by_fresh_value_needs_barrier() {
    let (ir, stats) = run(
        r#"
merged(%o) ssa {
entry:
    %a = new_object
    upsilon %a, %p
    jump ^next
next:
    %p = phi
    put_by_offset %p, %p, %o
    return
}
"#,
    );
    assert_eq!(ops(&ir, "entry"), vec!["new_object", "upsilon", "jump"]);
    assert_eq!(ops(&ir, "next"), vec!["phi", "put_by_offset", "fenced_store_barrier", "return"]);
    assert!(ir.print().contains("fenced_store_barrier %p !invalid_exit"), "{ir}");
    assert_eq!(stats.barriers_inserted, 1);
}

#[test]
fn test_upsilon_keeps_its_input_fresh() {
    let (ir, _) = run(
        r#"
loop_phi(%o, %c) ssa {
entry:
    %a = new_object
    upsilon %a, %p
    jump ^header
header:
    %p = phi
    put_by_offset %p, %p, %o
    %b = new_object
    upsilon %b, %p
    put_by_offset %b, %b, %o
    branch %c, ^header, ^exit
exit:
    return
}
"#,
    );
    // The phi is never fresh; feeding a value to it is not an escape.
    assert_eq!(
        ops(&ir, "header"),
        vec![
            "phi",
            "put_by_offset",
            "fenced_store_barrier",
            "new_object",
            "upsilon",
            "put_by_offset",
            "branch",
        ]
    );
}

#[test]
fn test_global_mode_uses_abstract_interpreter() {
    let text = r#"
proven(%o, %v, %w) ssa {
entry:
    check_not_cell %v
    put_by_offset %o, %o, %v
    put_by_offset %o, %o, %w:int32
    return
}
"#;
    let (ir, stats) = run(text);
    assert_eq!(barriers(&ir), 0, "{ir}");
    assert_eq!(stats.elided_non_cell, 2);

    // Fast mode only has the cheap local checks.
    let (ir, _) = run(&text.replace(") ssa {", ") cps {"));
    assert_eq!(barriers(&ir), 2, "{ir}");
}

#[test]
fn test_unreached_blocks_are_skipped() {
    let text = r#"
unreached(%o, %a) ssa {
entry:
    force_exit
    jump ^dead
dead:
    put_by_offset %o, %o, %a
    return
}
"#;
    let (ir, stats) = run(text);
    assert_eq!(barriers(&ir), 0);
    assert!(stats.blocks_skipped >= 2);

    let (ir, _) = run(&text.replace(") ssa {", ") cps {"));
    assert_eq!(barriers(&ir), 1);
}

#[test]
fn test_fast_mode_rejects_ssa() {
    let (_, result) = run_with(
        "f() ssa {\nentry:\n    return\n}\n",
        BarrierConfig::default().with_mode(ModeSelection::Fast),
    );
    assert!(matches!(
        result,
        Err(BarrierError::FormMismatch { mode: "fast", .. })
    ));
}

#[test]
fn test_global_mode_rejects_cps() {
    let (_, result) = run_with(
        "f() cps {\nentry:\n    return\n}\n",
        BarrierConfig::default().with_mode(ModeSelection::Global),
    );
    assert!(matches!(
        result,
        Err(BarrierError::FormMismatch { mode: "global", .. })
    ));
}

#[test]
fn test_global_mode_requires_interpreter() {
    let mut ir = parse("f() ssa {\nentry:\n    return\n}\n");
    let mut adaptor = TestIRAdaptor::new(&mut ir, 0);
    let mut phase = StoreBarrierInsertion::new(BarrierConfig::default());
    assert_eq!(phase.run(&mut adaptor, None), Err(BarrierError::MissingInterpreter));
    assert_eq!(phase.stats().functions, 0);
}

#[test]
fn test_untyped_base_is_fatal() {
    let (_, result) = run_with(
        r#"
untyped(%o, %v) {
entry:
    put_by_offset %o, %o:untyped, %v
    return
}
"#,
        BarrierConfig::default(),
    );
    assert!(matches!(
        result,
        Err(BarrierError::NotCell { use_kind: UseKind::Untyped, .. })
    ));
}

#[test]
fn test_imprecise_stack_write_of_fresh_value_is_fatal() {
    let (_, result) = run_with(
        r#"
imprecise() {
entry:
    %a = new_object
    put_stack %a
    return
}
"#,
        BarrierConfig::default(),
    );
    assert!(matches!(
        result,
        Err(BarrierError::StackEscape { precise_writes: 0, .. })
    ));
}

#[test]
fn test_imprecise_stack_write_of_stale_value_is_fine() {
    let (ir, _) = run(
        r#"
stale_stack(%o) {
entry:
    put_stack %o
    return
}
"#,
    );
    assert_eq!(barriers(&ir), 0);
}

#[test]
fn test_totals_accumulate_across_functions() {
    let (ir, stats) = run(
        r#"
first(%o, %v) {
entry:
    put_by_offset %o, %o, %v
    return
}
second(%o, %v) ssa {
entry:
    put_by_offset %o, %o, %v
    return
}
"#,
    );
    assert_eq!(stats.functions, 2);
    assert_eq!(stats.barriers_inserted, 2);
    assert_eq!(ir.count_ops(1, Opcode::FencedStoreBarrier), 1);
}
