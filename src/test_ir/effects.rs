//! Effect and GC tables for TIR instructions.
//!
//! Allocation is not a collection point in this host: objects come from a
//! thread-local bump region and only calls into the runtime may collect.

use super::Value;
use crate::core::heap::{AbstractHeap, Effects, HeapKind};
use crate::core::ir::{ArrayMode, Opcode, ResultKind};

const JS_CELL_FIELDS: AbstractHeap = AbstractHeap::new(HeapKind::JsCellFields);
const NAMED_PROPERTIES: AbstractHeap = AbstractHeap::new(HeapKind::NamedProperties);
const INDEXED_PROPERTIES: AbstractHeap = AbstractHeap::new(HeapKind::IndexedProperties);

/// Indexed stores that stay on the inline fast path.
fn is_fast_indexed_store(value: &Value) -> bool {
    !value.slow_put
        && matches!(
            value.array_mode,
            ArrayMode::Contiguous
                | ArrayMode::ArrayStorage
                | ArrayMode::SlowPutArrayStorage
                | ArrayMode::Int32
                | ArrayMode::Double
        )
}

/// Whether executing the instruction may start a collection.
pub fn does_gc(value: &Value) -> bool {
    use Opcode::*;
    match value.op {
        Call | GetById | PutById | PutByIdFlush | PutByIdDirect | PutByIdMegamorphic
        | PutPrivateName | PutPrivateNameById | SetPrivateBrand | DeleteById | DeleteByVal
        | EnumeratorPutByVal | PutByValMegamorphic | SetFunctionName | RegExpTestInline => true,
        PutByVal | PutByValDirect | PutByValAlias => !is_fast_indexed_store(value),
        _ => false,
    }
}

pub fn effects(value: &Value) -> Effects {
    use Opcode::*;
    let stack_slot = || match value.slot {
        Some(slot) => AbstractHeap::stack_slot(slot),
        None => AbstractHeap::STACK,
    };

    match value.op {
        op if op.allocates() => Effects::none().write(AbstractHeap::SIDE_STATE),
        PutByVal | PutByValDirect | PutByValAlias if is_fast_indexed_store(value) => {
            Effects::none()
                .read(INDEXED_PROPERTIES)
                .write(INDEXED_PROPERTIES)
        }
        ArrayPush => Effects::none()
            .read(INDEXED_PROPERTIES)
            .write(INDEXED_PROPERTIES),
        _ if does_gc(value) => Effects::top(),
        PutStructure | NukeStructureAndSetButterfly => Effects::none().write(JS_CELL_FIELDS),
        PutByOffset | PutClosureVar | PutGlobalVariable | PutInternalField | MultiPutByOffset
        | MultiDeleteByOffset | PutToArguments | RecordRegExpCachedResult
        | SetRegExpObjectLastIndex => Effects::none().write(NAMED_PROPERTIES),
        GetByOffset | GetClosureVar => Effects::none().read(NAMED_PROPERTIES),
        GetStack | GetLocal => Effects::none().read(stack_slot()),
        PutStack | SetLocal => Effects::none().write(stack_slot()),
        ClobberStack => Effects::none()
            .read(AbstractHeap::STACK)
            .write(AbstractHeap::STACK),
        _ => Effects::none(),
    }
}

/// Whether an OSR exit after this instruction would observe a modified heap.
pub fn clobbers_exit_state(value: &Value) -> bool {
    effects(value)
        .writes
        .iter()
        .any(|heap| heap.overlaps(&AbstractHeap::HEAP))
}

pub fn result_kind(value: &Value) -> ResultKind {
    use Opcode::*;
    match value.op {
        _ if !value.op.has_result() => ResultKind::None,
        ArithAdd | ArithSub => ResultKind::Number,
        CompareEq => ResultKind::Boolean,
        AllocatePropertyStorage | ReallocatePropertyStorage => ResultKind::Storage,
        _ => ResultKind::Js,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(op: Opcode) -> Value {
        Value::new("", op)
    }

    #[test]
    fn test_allocation_is_not_a_gc_point() {
        let alloc = value(Opcode::NewObject);
        assert!(!does_gc(&alloc));
        assert_eq!(effects(&alloc).writes, vec![AbstractHeap::SIDE_STATE]);
        assert!(!clobbers_exit_state(&alloc));
    }

    #[test]
    fn test_calls_clobber_the_world() {
        let call = value(Opcode::Call);
        assert!(does_gc(&call));
        assert_eq!(effects(&call), Effects::top());
        assert!(clobbers_exit_state(&call));
    }

    #[test]
    fn test_indexed_store_paths() {
        let mut put = value(Opcode::PutByVal);
        assert!(does_gc(&put), "generic put_by_val calls out");

        put.array_mode = ArrayMode::Contiguous;
        assert!(!does_gc(&put));
        assert_eq!(effects(&put).writes, vec![INDEXED_PROPERTIES]);

        put.slow_put = true;
        assert!(does_gc(&put));
    }

    #[test]
    fn test_stack_effects_use_slots() {
        let mut put = value(Opcode::PutStack);
        put.slot = Some(4);
        assert_eq!(effects(&put).writes, vec![AbstractHeap::stack_slot(4)]);
        assert!(!clobbers_exit_state(&put));

        let clobber = value(Opcode::ClobberStack);
        assert_eq!(effects(&clobber).reads, vec![AbstractHeap::STACK]);
    }

    #[test]
    fn test_result_kinds() {
        assert_eq!(result_kind(&value(Opcode::ArithAdd)), ResultKind::Number);
        assert_eq!(result_kind(&value(Opcode::PutByOffset)), ResultKind::None);
        assert_eq!(result_kind(&value(Opcode::Call)), ResultKind::Js);
    }
}
