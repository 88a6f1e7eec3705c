use crate::ast::{Expr, Function, Item, Prototype};
use crate::env::Environment;
use crate::ir::{Builder, Module, VReg};

#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum CodegenError {
    #[error("unknown variable name '{0}'")]
    UnknownVariable(String),
    #[error("invalid binary operator '{0}'")]
    InvalidOperator(char),
    #[error("unknown function referenced '{0}'")]
    UnknownFunction(String),
    #[error("incorrect number of arguments passed to '{0}': expected {1}, found {2}")]
    IncorrectArgCount(String, usize, usize),
    #[error("redefinition of function '{0}'")]
    Redefinition(String),
    #[error("redefinition of function '{0}' with different number of arguments: {1} vs {2}")]
    RedefinitionArity(String, usize, usize),
    #[error("function '{0}' failed verification")]
    InvalidFunction(String),
}

/// Lowers AST items into IR. Holds the builder (and through it the module,
/// whose function registry is the global function table) plus the per-body
/// variable environment.
///
/// Failures are recoverable at top-level-unit granularity: a function whose
/// body fails to generate is erased from the module rather than left behind
/// as a half-built declaration, so subsequent units see a consistent table.
#[derive(Debug)]
pub struct Codegen {
    builder: Builder,
    env: Environment,
}

impl Codegen {
    pub fn new(module_name: &str) -> Self {
        Codegen {
            builder: Builder::new(module_name),
            env: Environment::new(),
        }
    }

    pub fn module(&self) -> &Module {
        self.builder.module()
    }

    pub fn finish(self) -> Module {
        self.builder.finish()
    }

    /// Remove a generated function, e.g. the driver discarding an evaluated
    /// anonymous expression so the reserved name can be reused.
    pub fn erase_function(&mut self, name: &str) {
        self.builder.erase_function(name);
    }

    pub fn codegen_item(&mut self, item: &Item) -> Result<(), CodegenError> {
        match item {
            Item::Definition(func) => self.compile_fn(func),
            Item::Extern(proto) => self.compile_proto(proto),
        }
    }

    fn codegen_expr(&mut self, expr: &Expr) -> Result<VReg, CodegenError> {
        match expr {
            Expr::Number(value) => Ok(self.builder.const_float(*value)),
            Expr::Variable(name) => self
                .env
                .get(name)
                .ok_or_else(|| CodegenError::UnknownVariable(name.clone())),
            Expr::Binary(op, left, right) => {
                let lhs = self.codegen_expr(left)?;
                let rhs = self.codegen_expr(right)?;
                match op {
                    '+' => Ok(self.builder.fadd(lhs, rhs)),
                    '-' => Ok(self.builder.fsub(lhs, rhs)),
                    '*' => Ok(self.builder.fmul(lhs, rhs)),
                    '<' => {
                        // comparisons are f64 expressions like everything
                        // else, so widen the i1 back to 0.0/1.0
                        let cmp = self.builder.fcmp_ult(lhs, rhs);
                        Ok(self.builder.ui_to_fp(cmp))
                    }
                    _ => Err(CodegenError::InvalidOperator(*op)),
                }
            }
            Expr::Call(callee, args) => {
                let arity = match self.builder.module().get_function(callee) {
                    Some(func) => func.arity(),
                    None => return Err(CodegenError::UnknownFunction(callee.clone())),
                };
                if arity != args.len() {
                    return Err(CodegenError::IncorrectArgCount(
                        callee.clone(),
                        arity,
                        args.len(),
                    ));
                }
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.codegen_expr(arg)?);
                }
                Ok(self.builder.call(callee, arg_values))
            }
        }
    }

    /// Register a prototype in the function table, or reconcile it with an
    /// existing entry. Function identity only moves forward through
    /// {undeclared} -> {declared} -> {defined}; a declaration against an
    /// already defined name, or one changing the arity, is rejected.
    fn compile_proto(&mut self, proto: &Prototype) -> Result<(), CodegenError> {
        if let Some(existing) = self.builder.module().get_function(&proto.name) {
            if existing.is_defined() {
                return Err(CodegenError::Redefinition(proto.name.clone()));
            }
            if existing.arity() != proto.params.len() {
                return Err(CodegenError::RedefinitionArity(
                    proto.name.clone(),
                    existing.arity(),
                    proto.params.len(),
                ));
            }
            // compatible declaration already present, reuse it
            return Ok(());
        }
        self.builder.create_function(&proto.name, &proto.params);
        Ok(())
    }

    fn compile_fn(&mut self, function: &Function) -> Result<(), CodegenError> {
        let Function { proto, body } = function;
        // rejects bodies for already defined names and arity-changing
        // redeclarations before any IR is emitted
        self.compile_proto(proto)?;

        let params = self.builder.append_entry_block(&proto.name);
        self.env.clear();
        for (name, value) in proto.params.iter().zip(params) {
            self.env.define(name, value);
        }

        let result = self.codegen_expr(body);
        self.env.clear();

        let body_value = match result {
            Ok(value) => value,
            Err(err) => {
                // never leave a half-built function in the table
                self.builder.erase_function(&proto.name);
                return Err(err);
            }
        };
        self.builder.ret(body_value);

        let verified = self
            .builder
            .module()
            .get_function(&proto.name)
            .map_or(false, |f| f.verify());
        if !verified {
            self.builder.erase_function(&proto.name);
            return Err(CodegenError::InvalidFunction(proto.name.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ANON_FN_NAME;
    use crate::eval::Interpreter;
    use crate::parser::Parser;

    fn codegen_source(source: &str) -> Result<Codegen, CodegenError> {
        let mut codegen = Codegen::new("test");
        let mut parser = Parser::from_source(source).unwrap();
        while *parser.current() != crate::lexer::Token::Eof {
            if *parser.current() == crate::lexer::Token::Punct(';') {
                parser.advance().unwrap();
                continue;
            }
            let item = parser.parse_item().unwrap();
            codegen.codegen_item(&item)?;
        }
        Ok(codegen)
    }

    fn eval_expr(source: &str) -> f64 {
        let codegen = codegen_source(source).unwrap();
        Interpreter::new(codegen.module())
            .call(ANON_FN_NAME, &[])
            .unwrap()
    }

    #[test]
    fn precedence_evaluates_correctly() {
        assert_eq!(eval_expr("1+2*3"), 7.0);
    }

    #[test]
    fn definition_then_call() {
        assert_eq!(eval_expr("def foo(a b) a+b; foo(2,3)"), 5.0);
    }

    #[test]
    fn comparison_widens_to_float() {
        assert_eq!(eval_expr("1<2"), 1.0);
        assert_eq!(eval_expr("2<1"), 0.0);
    }

    #[test]
    fn subtraction_and_nesting() {
        assert_eq!(eval_expr("def dbl(x) x*2; dbl(dbl(3))-2"), 10.0);
    }

    #[test]
    fn unknown_variable_fails() {
        assert_eq!(
            codegen_source("def foo(a) a+b").unwrap_err(),
            CodegenError::UnknownVariable("b".to_string())
        );
    }

    #[test]
    fn failed_body_is_erased_from_the_table() {
        let mut codegen = Codegen::new("test");
        let mut parser = Parser::from_source("def foo(a) a+b").unwrap();
        let item = parser.parse_item().unwrap();
        assert!(codegen.codegen_item(&item).is_err());
        assert!(codegen.module().get_function("foo").is_none());
    }

    #[test]
    fn unknown_function_does_not_mutate_the_table() {
        let mut codegen = Codegen::new("test");
        let mut parser = Parser::from_source("bar(1)").unwrap();
        let item = parser.parse_item().unwrap();
        assert_eq!(
            codegen.codegen_item(&item).unwrap_err(),
            CodegenError::UnknownFunction("bar".to_string())
        );
        assert!(codegen.module().get_function("bar").is_none());
        // the synthetic wrapper was erased along with its failed body
        assert!(codegen.module().get_function(ANON_FN_NAME).is_none());
    }

    #[test]
    fn arity_mismatch_at_call_site() {
        assert_eq!(
            codegen_source("def foo(a b) a+b; foo(1)").unwrap_err(),
            CodegenError::IncorrectArgCount("foo".to_string(), 2, 1)
        );
    }

    #[test]
    fn invalid_operator_is_rejected() {
        let expr = Expr::Binary(
            '/',
            Box::new(Expr::Number(1.0)),
            Box::new(Expr::Number(2.0)),
        );
        let mut codegen = Codegen::new("test");
        let item = Item::Definition(Function {
            proto: Prototype::anonymous(),
            body: expr,
        });
        assert_eq!(
            codegen.codegen_item(&item).unwrap_err(),
            CodegenError::InvalidOperator('/')
        );
    }

    #[test]
    fn redefinition_of_defined_function_fails_and_keeps_old_body() {
        let mut codegen = codegen_source("def foo(a b) a+b").unwrap();
        let mut parser = Parser::from_source("def foo(a b) a*b").unwrap();
        let item = parser.parse_item().unwrap();
        assert_eq!(
            codegen.codegen_item(&item).unwrap_err(),
            CodegenError::Redefinition("foo".to_string())
        );
        // the original body still computes a+b
        let result = Interpreter::new(codegen.module())
            .call("foo", &[2.0, 3.0])
            .unwrap();
        assert_eq!(result, 5.0);
    }

    #[test]
    fn extern_then_matching_definition_is_allowed() {
        let codegen = codegen_source("extern foo(a b); def foo(a b) a*b").unwrap();
        assert!(codegen.module().get_function("foo").unwrap().is_defined());
    }

    #[test]
    fn extern_then_definition_with_different_arity_fails() {
        assert_eq!(
            codegen_source("extern foo(a b); def foo(a) a").unwrap_err(),
            CodegenError::RedefinitionArity("foo".to_string(), 2, 1)
        );
    }

    #[test]
    fn reextern_of_defined_function_fails() {
        assert_eq!(
            codegen_source("def foo(a) a; extern foo(a)").unwrap_err(),
            CodegenError::Redefinition("foo".to_string())
        );
    }

    #[test]
    fn repeated_compatible_extern_is_reused() {
        let codegen = codegen_source("extern sin(x); extern sin(x)").unwrap();
        assert_eq!(codegen.module().get_function("sin").unwrap().arity(), 1);
    }

    #[test]
    fn calling_an_extern_builtin() {
        let codegen = codegen_source("extern sqrt(x); def root(x) sqrt(x)").unwrap();
        let result = Interpreter::new(codegen.module())
            .call("root", &[9.0])
            .unwrap();
        assert_eq!(result, 3.0);
    }
}
