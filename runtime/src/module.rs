//! Module registry (spec §3.6). A module record owns its own `js_ast::Ast`
//! arena, environment and evaluation status; the registry maps specifiers
//! (already resolved by the host's `ModuleResolver`) to records so a module
//! imported from two different sites is evaluated exactly once, matching
//! the once-per-realm requirement of `HostResolveImportedModule`.

use crate::environment::EnvironmentRef;
use crate::error::EngineError;
use crate::value::Value;
use ahash::AHashMap;
use js_ast::{Ast, NodeRef};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Unlinked,
    Linked,
    Evaluating,
    Evaluated,
}

pub struct ModuleRecord {
    pub specifier: std::string::String,
    pub ast: Rc<Ast>,
    pub program: NodeRef,
    pub status: ModuleStatus,
    pub environment: Option<EnvironmentRef>,
    pub exports: AHashMap<std::string::String, Value>,
}

#[derive(Default)]
pub struct ModuleRegistry {
    pub records: AHashMap<std::string::String, Rc<std::cell::RefCell<ModuleRecord>>>,
}

impl ModuleRegistry {
    pub fn get(&self, specifier: &str) -> Option<Rc<std::cell::RefCell<ModuleRecord>>> {
        self.records.get(specifier).cloned()
    }

    pub fn insert_source(&mut self, specifier: &str, source: &str) -> Result<Rc<std::cell::RefCell<ModuleRecord>>, EngineError> {
        if let Some(existing) = self.get(specifier) {
            return Ok(existing);
        }
        let output = js_parser::Parser::parse_program(source, true)?;
        let record = ModuleRecord {
            specifier: specifier.to_string(),
            ast: Rc::new(output.ast),
            program: output.program,
            status: ModuleStatus::Unlinked,
            environment: None,
            exports: AHashMap::new(),
        };
        let rc = Rc::new(std::cell::RefCell::new(record));
        self.records.insert(specifier.to_string(), rc.clone());
        Ok(rc)
    }
}

/// Host hooks for specifier resolution and source loading (spec §6.1's
/// `set_module_loader`/`set_module_resolver`). Boxed trait objects so the
/// embedder can close over its own filesystem/bundler state.
pub trait ModuleResolver {
    fn resolve(&self, referrer: &str, specifier: &str) -> std::string::String;
}

pub trait ModuleLoader {
    fn load(&self, specifier: &str) -> Result<std::string::String, std::string::String>;
}

pub struct DefaultResolver;
impl ModuleResolver for DefaultResolver {
    fn resolve(&self, _referrer: &str, specifier: &str) -> std::string::String {
        specifier.to_string()
    }
}
