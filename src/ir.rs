//! The input contract between the type-annotated tree this crate produces
//! and the (out-of-scope) IR builder / code generator that lowers it (§6
//! "Runtime ABI consumed by the code generator"). This module documents
//! and collects the shapes a generator needs; it does not build or emit
//! IR — that stays a Non-goal (§1, §3 NON-GOALS: "the concrete IR builder
//! beyond its input contract").

use crate::ast::{Stmt, StmtKind};
use crate::intern::Symbol;
use crate::types::Type;
use crate::visitor::{walk_stmt, Visitor};

/// A function signature as the generator needs it: parameter types in
/// declaration order and the return type, both concrete once type
/// resolution has succeeded (every `FuncDef`/`Extern` symbol carries
/// this, either via `SymbolRec::params`/`ret_ty` or its composite
/// `Type::Func`).
pub struct IrFunctionSignature<'a> {
    pub name: Symbol,
    pub params: Vec<&'a Type<'a>>,
    pub ret: &'a Type<'a>,
    /// `true` for `extern` declarations: no body for the generator to
    /// lower, only a call target it must link against.
    pub is_extern: bool,
}

/// Walks a type-checked tree and collects every `FuncDef`/`Extern`
/// signature it declares, in the order they're declared. Intended as the
/// first step of handing a typed tree to a lowering pass; this crate does
/// not do anything with the result beyond returning it.
pub fn collect_function_signatures<'a>(root: &mut Stmt<'a>) -> Vec<IrFunctionSignature<'a>> {
    let mut collector = SignatureCollector { out: Vec::new() };
    collector.visit_stmt(root);
    collector.out
}

struct SignatureCollector<'a> {
    out: Vec<IrFunctionSignature<'a>>,
}

impl<'a> Visitor<'a> for SignatureCollector<'a> {
    fn visit_stmt(&mut self, stmt: &mut Stmt<'a>) {
        match &stmt.kind {
            StmtKind::FuncDef { symbol, .. } => {
                let sym = symbol.get().expect("Symbol Register sets this");
                let params = sym.params.borrow().iter().map(|p| p.ty().expect("type-checked")).collect();
                let ret = sym.ret_ty.get().expect("type-checked");
                self.out.push(IrFunctionSignature { name: sym.name, params, ret, is_extern: false });
            }
            StmtKind::Extern { symbol, .. } => {
                let sym = symbol.get().expect("Symbol Register sets this");
                let ty = sym.ty().expect("Symbol Resolver elaborates Extern types eagerly");
                let (params, ret) = ty.func_parts().expect("Extern symbols always carry a Func type");
                self.out.push(IrFunctionSignature { name: sym.name, params, ret, is_extern: true });
            }
            _ => {}
        }
        walk_stmt(self, stmt);
    }
}

/// Runtime ABI the front end assumes when it rewrites constructors and
/// string operations (§6). Not called from this crate — an eventual code
/// generator links against these names.
pub mod runtime_abi {
    pub const MALLOC: &str = "PRMalloc";
    pub const FREE: &str = "PRFree";
    pub const REALLOC: &str = "PRRealloc";

    pub const STRING_CTOR_CSTR: &str = "PRStringConstructorCStr";
    pub const STRING_CTOR_INT: &str = "PRStringConstructorInt";
    pub const STRING_CTOR_VOID: &str = "PRStringConstructorVoid";
    pub const STRING_CONCATENATE: &str = "PRStringConcatenate";
    pub const STRING_COMPARE: &str = "PRStringCompare";
    pub const STRING_LENGTH: &str = "PRStringLength";
    pub const STRING_DESTRUCTOR: &str = "PRStringDestructor";
}

/// In-memory layout of an Array value, visible to the IR generator (§6):
/// `{ int32 length; int32 capacity; int32 elementSize; T* elements }`.
/// Field order and widths are fixed by the runtime, not chosen here; this
/// type exists so a generator has something concrete to target, not to be
/// constructed by this crate.
#[repr(C)]
pub struct ArrayLayoutDescriptor {
    pub length: i32,
    pub capacity: i32,
    pub element_size: i32,
    pub elements: *const u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::config::CompilerConfig;
    use crate::scope::ScopeArena;
    use crate::symbol::SymbolArena;
    use crate::types::{Builtin, TypeArena};
    use std::fs;

    #[test]
    fn collects_function_and_extern_signatures() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.pr");
        fs::write(
            &main,
            "extern mes :: String -> Void\nfunc add(a :: Int, b :: Int) {\n    return a + b\n}\nmes \"hi\"\n",
        )
        .unwrap();
        let config = CompilerConfig::new();
        let scopes = ScopeArena::new();
        let symbols = SymbolArena::new();
        let types = TypeArena::new();
        let mut outcome = compile(&main, &config, &scopes, &symbols, &types)
            .unwrap_or_else(|f| panic!("{}", f.error.message()));

        let sigs = collect_function_signatures(&mut outcome.root);
        assert_eq!(sigs.len(), 2);

        let mes = sigs.iter().find(|s| outcome.interner.resolve(s.name) == "mes").unwrap();
        assert!(mes.is_extern);
        assert_eq!(mes.params.len(), 1);
        assert_eq!(mes.params[0].as_builtin(), Some(Builtin::String));

        let add = sigs.iter().find(|s| outcome.interner.resolve(s.name) == "add").unwrap();
        assert!(!add.is_extern);
        assert_eq!(add.params.len(), 2);
        assert_eq!(add.ret.as_builtin(), Some(Builtin::Int));
    }
}
