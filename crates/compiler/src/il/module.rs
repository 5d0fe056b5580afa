//! IL modules: functions, globals, extern imports

use super::{ILFunction, ILType, StorageHint};
use indexmap::{IndexMap, IndexSet};

/// A module-level variable or hardware map in the IL.
#[derive(Debug, Clone)]
pub struct GlobalVar {
    pub name: String,
    pub ty: ILType,
    pub storage: StorageHint,
    /// Fixed address for hardware maps (`@map x at $D020`)
    pub address: Option<u16>,
    /// Constant initializer bytes/words, when the initializer folded
    pub initializer: Option<Vec<i64>>,
    pub exported: bool,
}

/// A function imported from another module, registered as an extern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternImport {
    pub name: String,
    pub from_module: String,
}

/// One compiled module: functions keyed by name, module-level globals,
/// externs, and the set of intrinsics the functions reference. All maps
/// iterate in insertion order.
#[derive(Debug, Default)]
pub struct ILModule {
    pub name: String,
    functions: IndexMap<String, ILFunction>,
    pub globals: IndexMap<String, GlobalVar>,
    pub imports: Vec<ExternImport>,
    /// Intrinsics referenced by this module, including stub functions
    /// registered as intrinsics
    pub intrinsics: IndexSet<String>,
}

impl ILModule {
    pub fn new(name: &str) -> Self {
        ILModule {
            name: name.to_string(),
            ..ILModule::default()
        }
    }

    pub fn add_function(&mut self, function: ILFunction) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn function(&self, name: &str) -> Option<&ILFunction> {
        self.functions.get(name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut ILFunction> {
        self.functions.get_mut(name)
    }

    /// Functions in insertion (declaration) order.
    pub fn functions(&self) -> impl Iterator<Item = &ILFunction> {
        self.functions.values()
    }

    pub fn functions_mut(&mut self) -> impl Iterator<Item = &mut ILFunction> {
        self.functions.values_mut()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    pub fn add_global(&mut self, global: GlobalVar) {
        self.globals.insert(global.name.clone(), global);
    }

    pub fn global(&self, name: &str) -> Option<&GlobalVar> {
        self.globals.get(name)
    }

    pub fn add_import(&mut self, name: &str, from_module: &str) {
        let import = ExternImport {
            name: name.to_string(),
            from_module: from_module.to_string(),
        };
        if !self.imports.contains(&import) {
            self.imports.push(import);
        }
    }

    pub fn register_intrinsic(&mut self, name: &str) {
        self.intrinsics.insert(name.to_string());
    }

    pub fn is_intrinsic(&self, name: &str) -> bool {
        self.intrinsics.contains(name)
    }
}

impl std::fmt::Display for ILModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "module {}", self.name)?;
        for import in &self.imports {
            writeln!(f, "extern {} from {}", import.name, import.from_module)?;
        }
        for global in self.globals.values() {
            write!(f, "global {}: {}", global.name, global.ty)?;
            if let Some(storage) = global.storage {
                write!(f, " {}", storage)?;
            }
            if let Some(address) = global.address {
                write!(f, " at ${:04X}", address)?;
            }
            writeln!(f)?;
        }
        for function in self.functions() {
            writeln!(f, "{}", function)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_functions_iterate_in_insertion_order() {
        let mut module = ILModule::new("m");
        module.add_function(ILFunction::new("first", vec![], ILType::Void));
        module.add_function(ILFunction::new("second", vec![], ILType::Void));
        module.add_function(ILFunction::new("third", vec![], ILType::Void));
        let names: Vec<&str> = module.functions().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_globals_and_maps() {
        let mut module = ILModule::new("m");
        module.add_global(GlobalVar {
            name: "border".to_string(),
            ty: ILType::Byte,
            storage: None,
            address: Some(0xD020),
            initializer: None,
            exported: false,
        });
        assert_eq!(module.global("border").unwrap().address, Some(0xD020));
        assert!(module.global("missing").is_none());
    }

    #[test]
    fn test_imports_deduplicate() {
        let mut module = ILModule::new("m");
        module.add_import("f", "lib");
        module.add_import("f", "lib");
        assert_eq!(module.imports.len(), 1);
    }

    #[test]
    fn test_intrinsic_registry() {
        let mut module = ILModule::new("m");
        module.register_intrinsic("poke");
        assert!(module.is_intrinsic("poke"));
        assert!(!module.is_intrinsic("peek"));
    }
}
