//! A minimal register-based IR for the code generator to target.
//!
//! Everything in the language is an `f64`, so the instruction set is tiny:
//! float constants, the three arithmetic ops, an unsigned-less-than compare
//! producing an `i1`, a widening of that `i1` back to `f64`, and calls.
//! Functions hold a list of basic blocks; a function with no blocks is a
//! declaration (from `extern` or a forward reference) awaiting a body.

use std::collections::HashSet;
use std::fmt;

/// A virtual register. Parameters occupy registers `0..arity`; instruction
/// results are numbered after them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VReg(pub u32);

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    FConst(f64),
    FAdd(VReg, VReg),
    FSub(VReg, VReg),
    FMul(VReg, VReg),
    /// Unordered-or-less-than float comparison (true if either operand is
    /// NaN); the result is an `i1`.
    FCmpULt(VReg, VReg),
    /// Widen an `i1` to `0.0` or `1.0`. The language has no boolean type, so
    /// every comparison is followed by one of these.
    UiToFp(VReg),
    Call { callee: String, args: Vec<VReg> },
}

/// One instruction together with its result register.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub result: VReg,
    pub kind: InstrKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Ret(VReg),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    pub instrs: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    fn new(label: impl Into<String>) -> Self {
        BasicBlock {
            label: label.into(),
            instrs: Vec::new(),
            terminator: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub blocks: Vec<BasicBlock>,
    next_vreg: u32,
}

impl Function {
    fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        let next_vreg = params.len() as u32;
        Function {
            name: name.into(),
            params,
            blocks: Vec::new(),
            next_vreg,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// A function with at least one block has a generated body; one without
    /// is a bare declaration.
    pub fn is_defined(&self) -> bool {
        !self.blocks.is_empty()
    }

    /// The registers holding this function's parameters, in order.
    pub fn param_values(&self) -> Vec<VReg> {
        (0..self.params.len() as u32).map(VReg).collect()
    }

    fn fresh_vreg(&mut self) -> VReg {
        let reg = VReg(self.next_vreg);
        self.next_vreg += 1;
        reg
    }

    /// Consistency check over a completed function: every block ends in a
    /// terminator, every operand is defined before use, and no result
    /// register is assigned twice.
    pub fn verify(&self) -> bool {
        let mut defined: HashSet<VReg> = self.param_values().into_iter().collect();
        for block in &self.blocks {
            for instr in &block.instrs {
                let operands: Vec<VReg> = match &instr.kind {
                    InstrKind::FConst(_) => vec![],
                    InstrKind::FAdd(a, b)
                    | InstrKind::FSub(a, b)
                    | InstrKind::FMul(a, b)
                    | InstrKind::FCmpULt(a, b) => vec![*a, *b],
                    InstrKind::UiToFp(v) => vec![*v],
                    InstrKind::Call { args, .. } => args.clone(),
                };
                if operands.iter().any(|op| !defined.contains(op)) {
                    return false;
                }
                if !defined.insert(instr.result) {
                    return false;
                }
            }
            match &block.terminator {
                Some(Terminator::Ret(value)) => {
                    if !defined.contains(value) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}

/// The compilation unit. Its function registry doubles as the global function
/// table consulted on every call site and redefinition attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    fn remove_function(&mut self, name: &str) -> Option<Function> {
        let index = self.functions.iter().position(|f| f.name == name)?;
        Some(self.functions.remove(index))
    }
}

/// Constructs IR into a module, one function at a time. The insertion point
/// is the entry block of whichever function `append_entry_block` last opened.
#[derive(Debug)]
pub struct Builder {
    module: Module,
    cursor: Option<String>,
}

impl Builder {
    pub fn new(module_name: impl Into<String>) -> Self {
        Builder {
            module: Module::new(module_name),
            cursor: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn finish(self) -> Module {
        self.module
    }

    /// Register a new function declaration in the module. The caller is
    /// responsible for checking that the name is not already taken.
    pub fn create_function(&mut self, name: &str, params: &[String]) {
        self.module
            .functions
            .push(Function::new(name, params.to_vec()));
    }

    /// Open a fresh entry block on `name` and move the insertion point there.
    /// Returns the parameter registers of the function.
    pub fn append_entry_block(&mut self, name: &str) -> Vec<VReg> {
        match self.module.get_function_mut(name) {
            Some(func) => {
                func.blocks.push(BasicBlock::new("entry"));
                self.cursor = Some(name.to_string());
                func.param_values()
            }
            None => Vec::new(),
        }
    }

    /// Drop a function from the module entirely, e.g. after its body failed
    /// to generate. Clears the insertion point if it pointed there.
    pub fn erase_function(&mut self, name: &str) {
        self.module.remove_function(name);
        if self.cursor.as_deref() == Some(name) {
            self.cursor = None;
        }
    }

    fn emit(&mut self, kind: InstrKind) -> VReg {
        let name = self
            .cursor
            .clone()
            .expect("no insertion point set before emitting");
        let func = self
            .module
            .get_function_mut(&name)
            .expect("insertion point names a missing function");
        let result = func.fresh_vreg();
        let block = func
            .blocks
            .last_mut()
            .expect("insertion point has no block");
        block.instrs.push(Instruction { result, kind });
        result
    }

    pub fn const_float(&mut self, value: f64) -> VReg {
        self.emit(InstrKind::FConst(value))
    }

    pub fn fadd(&mut self, lhs: VReg, rhs: VReg) -> VReg {
        self.emit(InstrKind::FAdd(lhs, rhs))
    }

    pub fn fsub(&mut self, lhs: VReg, rhs: VReg) -> VReg {
        self.emit(InstrKind::FSub(lhs, rhs))
    }

    pub fn fmul(&mut self, lhs: VReg, rhs: VReg) -> VReg {
        self.emit(InstrKind::FMul(lhs, rhs))
    }

    pub fn fcmp_ult(&mut self, lhs: VReg, rhs: VReg) -> VReg {
        self.emit(InstrKind::FCmpULt(lhs, rhs))
    }

    pub fn ui_to_fp(&mut self, value: VReg) -> VReg {
        self.emit(InstrKind::UiToFp(value))
    }

    pub fn call(&mut self, callee: &str, args: Vec<VReg>) -> VReg {
        self.emit(InstrKind::Call {
            callee: callee.to_string(),
            args,
        })
    }

    pub fn ret(&mut self, value: VReg) {
        let name = match self.cursor.clone() {
            Some(name) => name,
            None => return,
        };
        if let Some(func) = self.module.get_function_mut(&name) {
            if let Some(block) = func.blocks.last_mut() {
                block.terminator = Some(Terminator::Ret(value));
            }
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = ", self.result)?;
        match &self.kind {
            InstrKind::FConst(value) => write!(f, "fconst {}", value),
            InstrKind::FAdd(a, b) => write!(f, "fadd {}, {}", a, b),
            InstrKind::FSub(a, b) => write!(f, "fsub {}, {}", a, b),
            InstrKind::FMul(a, b) => write!(f, "fmul {}, {}", a, b),
            InstrKind::FCmpULt(a, b) => write!(f, "fcmp ult {}, {}", a, b),
            InstrKind::UiToFp(v) => write!(f, "uitofp {}", v),
            InstrKind::Call { callee, args } => {
                write!(f, "call @{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = self
            .param_values()
            .iter()
            .zip(&self.params)
            .map(|(reg, name)| format!("{} {}", reg, name))
            .collect::<Vec<_>>()
            .join(", ");
        if !self.is_defined() {
            return writeln!(f, "declare @{}({})", self.name, params);
        }
        writeln!(f, "define @{}({}) {{", self.name, params)?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for instr in &block.instrs {
                writeln!(f, "  {}", instr)?;
            }
            match &block.terminator {
                Some(Terminator::Ret(value)) => writeln!(f, "  ret {}", value)?,
                None => writeln!(f, "  <no terminator>")?,
            }
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for func in &self.functions {
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}
