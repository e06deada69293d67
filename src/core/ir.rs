// This module defines the vocabulary shared between the store barrier phase and
// the host compiler's IR: the graph form (CPS vs SSA), operand edges with their
// speculated use kinds, result and constant classifications used by the cheap
// non-cell checks, array modes that select which operands of an indexed store
// matter, and the opcode set the phase understands. None of these types own IR
// storage; they are plain values returned through the IrAdaptor trait.

//! IR contract types.
//!
//! The phase never looks inside the host's node representation. Everything it
//! needs to know about an instruction is expressed with the small value types
//! in this module.

use std::fmt;

/// Form of the graph handed to the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphForm {
    /// Load/store form, produced before CPS rethreading.
    LoadStore,
    /// Threaded CPS: locals flow through `GetLocal`/`SetLocal`, no SSA merges.
    ThreadedCps,
    /// SSA: every value has one definition and blocks carry liveness.
    Ssa,
}

impl GraphForm {
    pub fn name(self) -> &'static str {
        match self {
            GraphForm::LoadStore => "load_store",
            GraphForm::ThreadedCps => "cps",
            GraphForm::Ssa => "ssa",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "load_store" => Some(GraphForm::LoadStore),
            "cps" => Some(GraphForm::ThreadedCps),
            "ssa" => Some(GraphForm::Ssa),
            _ => None,
        }
    }
}

impl fmt::Display for GraphForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Speculated use kind of an operand edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UseKind {
    #[default]
    Untyped,
    Cell,
    KnownCell,
    Object,
    Int32,
    Number,
    Boolean,
    /// Speculated to be undefined or null.
    Other,
}

impl UseKind {
    /// Whether the edge guarantees a heap cell by the time the user runs.
    #[inline]
    pub fn is_cell(self) -> bool {
        matches!(self, UseKind::Cell | UseKind::KnownCell | UseKind::Object)
    }

    /// Whether the edge speculation rules out a heap cell.
    #[inline]
    pub fn is_known_non_cell(self) -> bool {
        matches!(
            self,
            UseKind::Int32 | UseKind::Number | UseKind::Boolean | UseKind::Other
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            UseKind::Untyped => "untyped",
            UseKind::Cell => "cell",
            UseKind::KnownCell => "known_cell",
            UseKind::Object => "object",
            UseKind::Int32 => "int32",
            UseKind::Number => "number",
            UseKind::Boolean => "boolean",
            UseKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "untyped" => Some(UseKind::Untyped),
            "cell" => Some(UseKind::Cell),
            "known_cell" => Some(UseKind::KnownCell),
            "object" => Some(UseKind::Object),
            "int32" => Some(UseKind::Int32),
            "number" => Some(UseKind::Number),
            "boolean" => Some(UseKind::Boolean),
            "other" => Some(UseKind::Other),
            _ => None,
        }
    }
}

/// An operand of an instruction: the defining instruction plus how it is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge<I> {
    pub node: I,
    pub use_kind: UseKind,
}

impl<I> Edge<I> {
    pub fn new(node: I, use_kind: UseKind) -> Self {
        Self { node, use_kind }
    }

    pub fn untyped(node: I) -> Self {
        Self::new(node, UseKind::Untyped)
    }

    /// Same node, re-typed with a different use kind.
    pub fn with_use_kind(self, use_kind: UseKind) -> Self {
        Self {
            node: self.node,
            use_kind,
        }
    }
}

/// Representation of the value an instruction produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultKind {
    /// Any JS value, possibly a cell.
    #[default]
    Js,
    Number,
    Double,
    Int32,
    Int52,
    Boolean,
    /// Raw out-of-line property storage.
    Storage,
    /// No result.
    None,
}

impl ResultKind {
    /// Result representations that can never hold a cell pointer.
    #[inline]
    pub fn is_non_cell(self) -> bool {
        matches!(
            self,
            ResultKind::Number
                | ResultKind::Double
                | ResultKind::Int32
                | ResultKind::Int52
                | ResultKind::Boolean
        )
    }
}

/// Value of a constant-folded instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constant {
    Int32(i32),
    Double(f64),
    Boolean(bool),
    Undefined,
    Null,
    /// A frozen heap object.
    Cell,
}

impl Constant {
    #[inline]
    pub fn is_cell(self) -> bool {
        matches!(self, Constant::Cell)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int32(v) => write!(f, "{}", v),
            Constant::Double(v) => write!(f, "{:?}", v),
            Constant::Boolean(v) => write!(f, "{}", v),
            Constant::Undefined => f.write_str("undefined"),
            Constant::Null => f.write_str("null"),
            Constant::Cell => f.write_str("cell"),
        }
    }
}

/// Indexing shape selected for an indexed store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArrayMode {
    #[default]
    Generic,
    Contiguous,
    ArrayStorage,
    SlowPutArrayStorage,
    Int32,
    Double,
    Float16Array,
    BigInt64Array,
    BigUint64Array,
    ForceExit,
}

impl ArrayMode {
    pub fn name(self) -> &'static str {
        match self {
            ArrayMode::Generic => "generic",
            ArrayMode::Contiguous => "contiguous",
            ArrayMode::ArrayStorage => "array_storage",
            ArrayMode::SlowPutArrayStorage => "slow_put_array_storage",
            ArrayMode::Int32 => "int32",
            ArrayMode::Double => "double",
            ArrayMode::Float16Array => "float16_array",
            ArrayMode::BigInt64Array => "bigint64_array",
            ArrayMode::BigUint64Array => "biguint64_array",
            ArrayMode::ForceExit => "force_exit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generic" => Some(ArrayMode::Generic),
            "contiguous" => Some(ArrayMode::Contiguous),
            "array_storage" => Some(ArrayMode::ArrayStorage),
            "slow_put_array_storage" => Some(ArrayMode::SlowPutArrayStorage),
            "int32" => Some(ArrayMode::Int32),
            "double" => Some(ArrayMode::Double),
            "float16_array" => Some(ArrayMode::Float16Array),
            "bigint64_array" => Some(ArrayMode::BigInt64Array),
            "biguint64_array" => Some(ArrayMode::BigUint64Array),
            "force_exit" => Some(ArrayMode::ForceExit),
            _ => None,
        }
    }
}

macro_rules! opcodes {
    ($($variant:ident => $name:literal,)*) => {
        /// Opcodes known to the store barrier phase.
        ///
        /// Hosts map their own node kinds onto this set; anything the phase
        /// has no special rule for can be reported as [`Opcode::Other`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Opcode {
            $($variant,)*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $name,)*
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($name => Some(Opcode::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    // Values
    Argument => "argument",
    Const => "const",
    Phi => "phi",
    Upsilon => "upsilon",
    ArithAdd => "add",
    ArithSub => "sub",
    CompareEq => "compare_eq",
    CheckNotCell => "check_not_cell",
    GetByOffset => "get_by_offset",
    GetById => "get_by_id",
    GetClosureVar => "get_closure_var",
    GetStack => "get_stack",
    PutStack => "put_stack",
    GetLocal => "get_local",
    SetLocal => "set_local",
    ClobberStack => "clobber_stack",
    Call => "call",
    ForceExit => "force_exit",

    // Allocation
    NewObject => "new_object",
    NewGenerator => "new_generator",
    NewAsyncGenerator => "new_async_generator",
    NewArray => "new_array",
    NewArrayWithSize => "new_array_with_size",
    NewArrayWithConstantSize => "new_array_with_constant_size",
    NewArrayBuffer => "new_array_buffer",
    NewInternalFieldObject => "new_internal_field_object",
    NewTypedArray => "new_typed_array",
    NewRegexp => "new_regexp",
    NewStringObject => "new_string_object",
    NewMap => "new_map",
    NewSet => "new_set",
    NewSymbol => "new_symbol",
    MaterializeNewObject => "materialize_new_object",
    MakeRope => "make_rope",
    CreateActivation => "create_activation",
    CreateDirectArguments => "create_direct_arguments",
    CreateScopedArguments => "create_scoped_arguments",
    CreateClonedArguments => "create_cloned_arguments",
    NewFunction => "new_function",
    NewBoundFunction => "new_bound_function",
    AllocatePropertyStorage => "allocate_property_storage",
    ReallocatePropertyStorage => "reallocate_property_storage",

    // Reference stores
    PutByVal => "put_by_val",
    PutByValDirect => "put_by_val_direct",
    PutByValAlias => "put_by_val_alias",
    ArrayPush => "array_push",
    PutPrivateName => "put_private_name",
    PutPrivateNameById => "put_private_name_by_id",
    SetPrivateBrand => "set_private_brand",
    PutById => "put_by_id",
    PutByIdFlush => "put_by_id_flush",
    PutByIdDirect => "put_by_id_direct",
    PutByIdMegamorphic => "put_by_id_megamorphic",
    PutStructure => "put_structure",
    DeleteById => "delete_by_id",
    DeleteByVal => "delete_by_val",
    RegExpTestInline => "regexp_test_inline",
    RecordRegExpCachedResult => "record_regexp_cached_result",
    PutClosureVar => "put_closure_var",
    PutToArguments => "put_to_arguments",
    SetRegExpObjectLastIndex => "set_regexp_object_last_index",
    PutInternalField => "put_internal_field",
    EnumeratorPutByVal => "enumerator_put_by_val",
    PutByValMegamorphic => "put_by_val_megamorphic",
    MultiPutByOffset => "multi_put_by_offset",
    MultiDeleteByOffset => "multi_delete_by_offset",
    PutByOffset => "put_by_offset",
    PutGlobalVariable => "put_global_variable",
    SetFunctionName => "set_function_name",
    NukeStructureAndSetButterfly => "nuke_structure_and_set_butterfly",

    // Inserted by this phase
    FencedStoreBarrier => "fenced_store_barrier",

    // Terminators
    Jump => "jump",
    Branch => "branch",
    Return => "return",

    Other => "other",
}

impl Opcode {
    /// Nodes that always produce the newest object in the heap.
    pub fn allocates(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            NewObject
                | NewGenerator
                | NewAsyncGenerator
                | NewArray
                | NewArrayWithSize
                | NewArrayWithConstantSize
                | NewArrayBuffer
                | NewInternalFieldObject
                | NewTypedArray
                | NewRegexp
                | NewStringObject
                | NewMap
                | NewSet
                | NewSymbol
                | MaterializeNewObject
                | MakeRope
                | CreateActivation
                | CreateDirectArguments
                | CreateScopedArguments
                | CreateClonedArguments
                | NewFunction
                | NewBoundFunction
                | AllocatePropertyStorage
                | ReallocatePropertyStorage
        )
    }

    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Jump | Opcode::Branch | Opcode::Return)
    }

    /// Whether an instruction with this opcode defines a value.
    pub fn has_result(self) -> bool {
        use Opcode::*;
        !matches!(
            self,
            Upsilon
                | CheckNotCell
                | PutStack
                | SetLocal
                | ClobberStack
                | ForceExit
                | PutByVal
                | PutByValDirect
                | PutByValAlias
                | PutPrivateName
                | PutPrivateNameById
                | SetPrivateBrand
                | PutById
                | PutByIdFlush
                | PutByIdDirect
                | PutByIdMegamorphic
                | PutStructure
                | PutClosureVar
                | PutToArguments
                | SetRegExpObjectLastIndex
                | PutInternalField
                | EnumeratorPutByVal
                | PutByValMegamorphic
                | MultiPutByOffset
                | PutByOffset
                | PutGlobalVariable
                | SetFunctionName
                | NukeStructureAndSetButterfly
                | FencedStoreBarrier
                | Jump
                | Branch
                | Return
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_names_round_trip() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::parse(op.name()), Some(op), "{op:?}");
        }
        assert_eq!(Opcode::parse("bogus"), None);
    }

    #[test]
    fn test_use_kind_classification() {
        assert!(UseKind::Cell.is_cell());
        assert!(UseKind::KnownCell.is_cell());
        assert!(!UseKind::Untyped.is_cell());
        assert!(UseKind::Int32.is_known_non_cell());
        assert!(!UseKind::Untyped.is_known_non_cell());
        assert!(!UseKind::Object.is_known_non_cell());
    }

    #[test]
    fn test_allocators_produce_values() {
        for &op in Opcode::ALL.iter().filter(|op| op.allocates()) {
            assert!(op.has_result(), "{op:?} allocates but has no result");
        }
        assert!(!Opcode::PutByOffset.has_result());
        assert!(!Opcode::FencedStoreBarrier.allocates());
    }

    #[test]
    fn test_result_kind_non_cell() {
        assert!(ResultKind::Int32.is_non_cell());
        assert!(ResultKind::Boolean.is_non_cell());
        assert!(!ResultKind::Js.is_non_cell());
        assert!(!ResultKind::Storage.is_non_cell());
    }
}
