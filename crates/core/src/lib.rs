//! `seq-core`: the `Value`/`Obj` model, the string pool, and the hash/array
//! containers built on top of them.
//!
//! This crate has no allocation policy of its own — it defines *what* a
//! heap object looks like, not *when* one is created or collected. Those
//! decisions (generations, marking, sweeping) live in `seq_runtime::gc`,
//! which is the sole consumer permitted to construct an `ObjBox` and hand
//! back a `GcRef`.
//!
//! # Modules
//!
//! - `value`: the `Value` tagged union
//! - `object`: heap objects (`Obj`), the GC header (`ObjHeader`), and the
//!   `Array`/`Map` containers
//! - `string_pool`: the FNV-1a interning table

pub mod object;
pub mod string_pool;
pub mod value;

pub use object::{
    fnv1a, ArrayObj, Color, EnvironmentObj, FunctionKind, FunctionObj, FutureObj, Generation,
    GcRef, MapKey, MapObj, ModuleObj, Obj, ObjBox, ObjHeader, ObjTag, ResourceObj, StringObj,
    StructDefObj, StructInstanceObj,
};
pub use string_pool::StringPool;
pub use value::Value;
