use std::collections::HashMap;

use crate::ir::VReg;

/// Per-function symbol table mapping in-scope names to their generated
/// values. Rebuilt from the parameter list at the start of every function
/// body and cleared when generation of that body finishes, so nothing leaks
/// between functions.
#[derive(Debug, Default)]
pub struct Environment {
    values: HashMap<String, VReg>,
}

impl Environment {
    pub fn new() -> Self {
        Environment::default()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn define(&mut self, name: &str, value: VReg) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<VReg> {
        self.values.get(name).copied()
    }
}
