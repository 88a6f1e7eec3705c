use std::collections::HashMap;

use crate::ir::{InstrKind, Module, Terminator, VReg};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum EvalError {
    #[error("no function named '{0}' in module")]
    UnknownFunction(String),
    #[error("function '{0}' expects {1} arguments, got {2}")]
    ArityMismatch(String, usize, usize),
    #[error("extern function '{0}' has no runtime binding")]
    UnresolvedExtern(String),
    #[error("function '{0}' has no return instruction")]
    MissingReturn(String),
    #[error("use of undefined register {0} in '{1}'")]
    UndefinedValue(VReg, String),
}

/// Executes generated functions by walking their instruction lists. Extern
/// declarations resolve against a small set of host math builtins, the way a
/// JIT would resolve them against libm symbols.
pub struct Interpreter<'m> {
    module: &'m Module,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module) -> Self {
        Interpreter { module }
    }

    pub fn call(&self, name: &str, args: &[f64]) -> Result<f64, EvalError> {
        let func = self
            .module
            .get_function(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        if func.arity() != args.len() {
            return Err(EvalError::ArityMismatch(
                name.to_string(),
                func.arity(),
                args.len(),
            ));
        }
        if !func.is_defined() {
            return call_builtin(name, args);
        }

        let mut regs: HashMap<VReg, f64> = HashMap::new();
        for (reg, value) in func.param_values().into_iter().zip(args) {
            regs.insert(reg, *value);
        }

        let read = |regs: &HashMap<VReg, f64>, reg: VReg| -> Result<f64, EvalError> {
            regs.get(&reg)
                .copied()
                .ok_or_else(|| EvalError::UndefinedValue(reg, name.to_string()))
        };

        for block in &func.blocks {
            for instr in &block.instrs {
                let value = match &instr.kind {
                    InstrKind::FConst(value) => *value,
                    InstrKind::FAdd(a, b) => read(&regs, *a)? + read(&regs, *b)?,
                    InstrKind::FSub(a, b) => read(&regs, *a)? - read(&regs, *b)?,
                    InstrKind::FMul(a, b) => read(&regs, *a)? * read(&regs, *b)?,
                    // i1 results live in the register file as 0.0/1.0, which
                    // is exactly what the following uitofp widens them to.
                    // ult is unordered-or-less-than: true whenever either
                    // operand is NaN.
                    InstrKind::FCmpULt(a, b) => {
                        let lhs = read(&regs, *a)?;
                        let rhs = read(&regs, *b)?;
                        if lhs.is_nan() || rhs.is_nan() || lhs < rhs {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    InstrKind::UiToFp(v) => read(&regs, *v)?,
                    InstrKind::Call { callee, args } => {
                        let mut values = Vec::with_capacity(args.len());
                        for arg in args {
                            values.push(read(&regs, *arg)?);
                        }
                        self.call(callee, &values)?
                    }
                };
                regs.insert(instr.result, value);
            }
            if let Some(Terminator::Ret(reg)) = &block.terminator {
                return read(&regs, *reg);
            }
        }
        Err(EvalError::MissingReturn(name.to_string()))
    }
}

fn call_builtin(name: &str, args: &[f64]) -> Result<f64, EvalError> {
    match (name, args) {
        ("sin", [x]) => Ok(x.sin()),
        ("cos", [x]) => Ok(x.cos()),
        ("sqrt", [x]) => Ok(x.sqrt()),
        ("fabs", [x]) => Ok(x.abs()),
        ("floor", [x]) => Ok(x.floor()),
        ("pow", [x, y]) => Ok(x.powf(*y)),
        ("fmod", [x, y]) => Ok(x % y),
        _ => Err(EvalError::UnresolvedExtern(name.to_string())),
    }
}
