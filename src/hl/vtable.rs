//! Building the resolution tables ("virtual tables") of classes.
//!
//! Every member of every class in a hierarchy is entered into the tables of the most specific
//! class under each of its spellings: `x`, `Class::x`, `ns::Class::x` and so on up to the fully
//! qualified `::ns::Class::x`. The hierarchy is walked from the most specific class, and the
//! first definition to claim a spelling keeps it, so members of derived classes shadow members of
//! their bases.

use std::{collections::HashSet, rc::Rc};

use hashbrown::HashMap;
use tracing::trace;

use crate::{
    ll::arena::Arena, Class, ClassId, Engine, Error, FnLookup, FunctionKind, HeritageWalk,
    Protection, VarLookup,
};

type Tables = (HashMap<Rc<str>, Rc<VarLookup>>, HashMap<Rc<str>, Rc<FnLookup>>);

/// Returns all spellings of a fully qualified member name, from the least qualified one to the
/// fully qualified one.
pub(crate) fn spellings(full_name: &str) -> Vec<Rc<str>> {
    let relative = full_name.trim_start_matches("::");
    let parts: Vec<&str> = relative.split("::").collect();
    let mut spellings: Vec<Rc<str>> =
        (0..parts.len()).rev().map(|start| Rc::from(parts[start..].join("::"))).collect();
    spellings.push(Rc::from(format!("::{relative}")));
    spellings
}

fn build_tables(classes: &Arena<Class>, id: ClassId) -> Result<Tables, Error> {
    let mut variables: HashMap<Rc<str>, Rc<VarLookup>> = HashMap::new();
    let mut functions: HashMap<Rc<str>, Rc<FnLookup>> = HashMap::new();

    for base in HeritageWalk::new(classes, id) {
        let class = classes
            .get(base.0)
            .ok_or_else(|| Error::internal("class disappeared while building tables"))?;

        for variable in class.variables.values() {
            let fresh: Vec<Rc<str>> = spellings(&variable.full_name)
                .into_iter()
                .filter(|spelling| !variables.contains_key(spelling))
                .collect();
            let Some(least_qualified) = fresh.first().cloned() else { continue };
            let lookup = Rc::new(VarLookup {
                variable: Rc::clone(variable),
                usage: fresh.len(),
                least_qualified,
                accessible: variable.protection != Protection::Private || variable.class == id,
            });
            for spelling in fresh {
                variables.insert(spelling, Rc::clone(&lookup));
            }
        }

        for function in class.functions.values() {
            if matches!(function.kind, FunctionKind::Constructor | FunctionKind::Destructor) {
                continue;
            }
            let lookup = Rc::new(FnLookup {
                function: Rc::clone(function),
                accessible: function.protection != Protection::Private || function.class == id,
            });
            for spelling in spellings(&function.full_name) {
                functions.entry(spelling).or_insert_with(|| Rc::clone(&lookup));
            }
        }
    }

    Ok((variables, functions))
}

impl Engine {
    /// Rebuilds the resolution tables of a class and of every class that derives from it, and
    /// clears their dispatch caches.
    pub(crate) fn rebuild_virtual_tables(&mut self, id: ClassId) -> Result<(), Error> {
        let mut pending = vec![id];
        let mut seen = HashSet::new();
        while let Some(class) = pending.pop() {
            if !seen.insert(class) {
                continue;
            }
            let (variables, functions) = build_tables(&self.classes, class)?;
            let dump = self.options.debug.dump_virtual_tables;
            let class = self.class_mut(class)?;
            trace!(
                class = %class.full_name,
                variables = variables.len(),
                functions = functions.len(),
                "rebuilt virtual tables"
            );
            class.resolve_vars = variables;
            class.resolve_cmds = functions;
            class.method_cache.clear();
            class.proc_cache.clear();
            if dump {
                dump_tables(class);
            }
            pending.extend(class.derived.iter().copied());
        }
        Ok(())
    }
}

fn dump_tables(class: &Class) {
    eprintln!("virtual tables of {}:", class.full_name);
    let mut variables: Vec<_> = class.resolve_vars.iter().collect();
    variables.sort_by(|a, b| a.0.cmp(b.0));
    for (spelling, lookup) in variables {
        eprintln!(
            "  variable {spelling:<24} -> {} (usage {}, {})",
            lookup.variable.full_name,
            lookup.usage,
            if lookup.accessible { "accessible" } else { "inaccessible" },
        );
    }
    let mut functions: Vec<_> = class.resolve_cmds.iter().collect();
    functions.sort_by(|a, b| a.0.cmp(b.0));
    for (spelling, lookup) in functions {
        eprintln!("  function {spelling:<24} -> {}", lookup.function.full_name);
    }
}
