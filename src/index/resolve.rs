//! Reference resolution against the index.
//!
//! Lookup order: lexical scope (the source symbol's container chain, innermost
//! first), then the unit's import bindings, then every symbol in the project.
//! The first level that yields candidates wins.

use std::collections::BTreeSet;
use std::path::Path;

use super::{AmbiguityPolicy, SymbolIndex};
use crate::graph::types::{ImportBinding, Reference, ReferenceKind, Resolution, Symbol, SymbolId};

/// Declared names a reference can bind to: its literal name, plus the
/// original name of any import aliased to it.
pub(crate) fn lookup_names<'a>(reference: &'a Reference, bindings: &'a [ImportBinding]) -> Vec<&'a str> {
    let mut names = vec![reference.name.as_str()];
    for binding in bindings {
        if binding.alias.as_deref() == Some(reference.name.as_str())
            && !names.contains(&binding.name.as_str())
        {
            names.push(binding.name.as_str());
        }
    }
    names
}

pub(crate) fn resolve(index: &SymbolIndex, reference: &Reference) -> Resolution {
    let bindings = index.imports_of(&reference.path);
    let names = lookup_names(reference, bindings);

    let named: Vec<&Symbol> = names
        .iter()
        .flat_map(|n| index.named(n))
        .filter(|s| reference.kind.accepts(s.kind))
        .filter(|s| reference.kind != ReferenceKind::Imports || s.path != reference.path)
        .collect();
    if named.is_empty() {
        return Resolution::Unresolved;
    }

    // A qualifier that names a container, module or import alias narrows the
    // set. For static paths a qualifier that matches nothing means the target
    // lives outside the project.
    let mut dynamic = reference.dynamic;
    let pool = match reference.qualifier.as_deref() {
        Some(q) => {
            let narrowed: Vec<&Symbol> = named
                .iter()
                .copied()
                .filter(|s| qualifier_matches(index, s, q, bindings))
                .collect();
            if !narrowed.is_empty() {
                dynamic = false;
                narrowed
            } else if reference.dynamic {
                named
            } else {
                return Resolution::Unresolved;
            }
        }
        None => named,
    };

    let candidates = candidates_by_proximity(index, reference, &pool, bindings);
    decide(index, reference, candidates, dynamic)
}

fn candidates_by_proximity<'s>(
    index: &'s SymbolIndex,
    reference: &Reference,
    pool: &[&'s Symbol],
    bindings: &[ImportBinding],
) -> Vec<&'s Symbol> {
    if reference.kind != ReferenceKind::Imports {
        let mut scope = Some(reference.source.clone());
        while let Some(current) = scope {
            let here: Vec<&Symbol> = pool
                .iter()
                .copied()
                .filter(|s| s.container.as_ref() == Some(&current) || s.id == current)
                .collect();
            if !here.is_empty() {
                return here;
            }
            scope = index.symbol(&current).and_then(|s| s.container.clone());
        }
    }

    let imported: Vec<&Symbol> = pool
        .iter()
        .copied()
        .filter(|s| {
            bindings
                .iter()
                .any(|b| binding_covers(index, b, &reference.name, s))
        })
        .collect();
    if !imported.is_empty() {
        return imported;
    }

    pool.to_vec()
}

fn decide(
    index: &SymbolIndex,
    reference: &Reference,
    candidates: Vec<&Symbol>,
    dynamic: bool,
) -> Resolution {
    let ids: BTreeSet<SymbolId> = candidates.iter().map(|s| s.id.clone()).collect();
    let overloaded = candidates.iter().any(|s| s.overloaded);

    if ids.len() == 1 {
        let only = ids.into_iter().next();
        return match only {
            Some(id) if !dynamic && !overloaded => Resolution::Resolved(id),
            Some(id) => Resolution::Ambiguous {
                candidates: vec![id.clone()],
                preferred: Some(id),
            },
            None => Resolution::Unresolved,
        };
    }

    let preferred = prefer(index.policy(), reference, &candidates);
    Resolution::Ambiguous {
        candidates: ids.into_iter().collect(),
        preferred,
    }
}

fn prefer(
    policy: AmbiguityPolicy,
    reference: &Reference,
    candidates: &[&Symbol],
) -> Option<SymbolId> {
    match policy {
        AmbiguityPolicy::RecordOnly => None,
        AmbiguityPolicy::SameFile => candidates
            .iter()
            .filter(|s| s.path == reference.path)
            .map(|s| &s.id)
            .min()
            .cloned(),
        AmbiguityPolicy::FirstDeclared => candidates
            .iter()
            .min_by(|a, b| {
                (&a.path, a.span.line_start, a.span.col_start, &a.id).cmp(&(
                    &b.path,
                    b.span.line_start,
                    b.span.col_start,
                    &b.id,
                ))
            })
            .map(|s| s.id.clone()),
    }
}

fn file_stem(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
}

/// Names of every container above `symbol`, innermost first.
fn container_names<'s>(index: &'s SymbolIndex, symbol: &Symbol) -> Vec<&'s str> {
    let mut names = Vec::new();
    let mut current = symbol.container.as_ref();
    while let Some(id) = current {
        match index.symbol(id) {
            Some(parent) => {
                names.push(parent.name.as_str());
                current = parent.container.as_ref();
            }
            None => break,
        }
    }
    names
}

fn qualifier_matches(
    index: &SymbolIndex,
    symbol: &Symbol,
    qualifier: &str,
    bindings: &[ImportBinding],
) -> bool {
    let direct = symbol
        .container
        .as_ref()
        .and_then(|c| index.symbol(c))
        .is_some_and(|c| c.name == qualifier);
    if direct || file_stem(&symbol.path) == qualifier {
        return true;
    }
    // `import pkg.utils as u` ... `u.helper()`
    bindings
        .iter()
        .filter(|b| b.local_name() == qualifier)
        .any(|b| {
            file_stem(&symbol.path) == b.name || container_names(index, symbol).contains(&b.name.as_str())
        })
}

/// Whether the module path of `binding` can denote where `symbol` lives.
fn module_matches(index: &SymbolIndex, module: &str, symbol: &Symbol) -> bool {
    let Some(leaf) = module.rsplit('.').next().filter(|s| !s.is_empty()) else {
        return true;
    };
    if file_stem(&symbol.path) == leaf {
        return true;
    }
    if symbol.path.split('/').any(|component| component == leaf) {
        return true;
    }
    container_names(index, symbol).contains(&leaf)
}

fn binding_covers(index: &SymbolIndex, binding: &ImportBinding, name: &str, symbol: &Symbol) -> bool {
    if binding.is_wildcard() {
        return module_matches(index, &binding.module, symbol);
    }
    if binding.local_name() != name || binding.name != symbol.name {
        return false;
    }
    module_matches(index, &binding.module, symbol)
}
