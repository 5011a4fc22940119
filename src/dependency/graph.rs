use std::collections::HashSet;

use crate::error::{IsolateError, IsolateResult};
use crate::schema::SchemaRegistry;

/// One table on the traversal stack, with the index of its next unvisited dependency
#[derive(Debug)]
struct Frame<'r> {
    table: &'r str,
    deps: &'r [String],
    next: usize,
}

/// State shared across all requested roots of a single `resolve` call
struct Walk<'r> {
    registry: &'r SchemaRegistry,
    /// Tables already appended to `order`; their whole closure precedes them
    emitted: HashSet<&'r str>,
    order: Vec<&'r str>,
}

/// Expand requested tables into the list of tables to create, in creation order
///
/// ALGORITHM:
/// 1. For each requested table, in request order, walk its `deps` depth-first
/// 2. Emit a table only after all of its dependencies (post-order)
/// 3. Skip tables emitted earlier, so the first occurrence wins
/// 4. Track in-progress tables to reject cycles
///
/// Skipping an emitted table is the same as deduplicating the concatenated
/// per-table walks by first occurrence: everything below an emitted table was
/// emitted before it.
///
/// # Errors
/// `UnknownTable` if a requested table or any reachable dependency is not
/// registered, `DependencyCycle` if a reachable dependency chain loops.
pub fn resolve<'r, S: AsRef<str>>(
    registry: &'r SchemaRegistry,
    requested: &[S],
) -> IsolateResult<Vec<&'r str>> {
    let mut walk = Walk {
        registry,
        emitted: HashSet::new(),
        order: Vec::new(),
    };

    for name in requested {
        let name = name.as_ref();
        let root = registry.key(name).ok_or_else(|| IsolateError::UnknownTable {
            table: name.to_string(),
            referenced_by: None,
        })?;
        walk.visit(root)?;
    }

    log::debug!("resolved build list: {:?}", walk.order);
    Ok(walk.order)
}

impl<'r> Walk<'r> {
    fn visit(&mut self, root: &'r str) -> IsolateResult<()> {
        if self.emitted.contains(root) {
            return Ok(());
        }

        let registry = self.registry;
        let mut visiting: HashSet<&'r str> = HashSet::new();
        let mut stack = vec![Frame {
            table: root,
            deps: &registry.require(root, None)?.deps,
            next: 0,
        }];
        visiting.insert(root);

        while let Some(top) = stack.last_mut() {
            let deps = top.deps;
            let Some(dep) = deps.get(top.next) else {
                // All dependencies emitted: emit the table itself
                let table = top.table;
                stack.pop();
                visiting.remove(table);
                self.emitted.insert(table);
                self.order.push(table);
                continue;
            };
            top.next += 1;
            let parent = top.table;

            let dep = registry.key(dep).ok_or_else(|| IsolateError::UnknownTable {
                table: dep.clone(),
                referenced_by: Some(parent.to_string()),
            })?;

            if self.emitted.contains(dep) {
                continue;
            }

            if visiting.contains(dep) {
                return Err(IsolateError::DependencyCycle {
                    cycle: reconstruct_cycle(&stack, dep),
                });
            }

            visiting.insert(dep);
            stack.push(Frame {
                table: dep,
                deps: &registry.require(dep, Some(parent))?.deps,
                next: 0,
            });
        }

        Ok(())
    }
}

/// Path from the first occurrence of `repeated` on the stack back to itself
fn reconstruct_cycle(stack: &[Frame<'_>], repeated: &str) -> Vec<String> {
    let start = stack.iter().position(|f| f.table == repeated).unwrap_or(0);
    stack[start..]
        .iter()
        .map(|f| f.table.to_string())
        .chain(std::iter::once(repeated.to_string()))
        .collect()
}
