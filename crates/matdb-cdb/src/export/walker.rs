//! Material walker: collects every object a material export must contain.

use crate::arena::{NodeId, ObjectData};
use crate::database::MaterialDatabase;
use crate::graph::ObjectId;
use crate::strings::FxHashSet;

/// Walks a material's edge subtree and the objects its cross-reference
/// components point at.
///
/// The result starts with the root, followed by its subtree in depth-first
/// pre-order, followed by every further object reached through
/// `BSMaterial::*ID` links, each exactly once.
pub struct MaterialWalker<'a> {
    database: &'a MaterialDatabase,
    seen: FxHashSet<ObjectId>,
    order: Vec<ObjectId>,
}

impl<'a> MaterialWalker<'a> {
    pub fn walk(database: &'a MaterialDatabase, root: ObjectId) -> Vec<ObjectId> {
        let mut walker = Self {
            database,
            seen: FxHashSet::default(),
            order: Vec::new(),
        };

        walker.walk_edges(root);

        let mut next = 0;
        while next < walker.order.len() {
            let id = walker.order[next];
            walker.walk_cross_references(id);
            next += 1;
        }

        walker.order
    }

    fn visit(&mut self, id: ObjectId) {
        if self.seen.insert(id) {
            self.order.push(id);
        }
    }

    fn walk_edges(&mut self, root: ObjectId) {
        let store = self.database.store();
        let mut current = root;
        self.visit(root);
        while let Some(next) = store.next_child_object(root, current) {
            self.visit(next);
            current = next;
        }
    }

    fn walk_cross_references(&mut self, id: ObjectId) {
        let mut targets = Vec::new();
        for component in &self.database.object(id).components {
            if let Some(value) = component.value {
                self.collect_links(value, &mut targets);
            }
        }
        for target in targets {
            self.visit(target);
        }
    }

    fn collect_links(&self, node: NodeId, targets: &mut Vec<ObjectId>) {
        let object = self.database.node(node);
        let cross_reference = object.type_id.is_cross_reference();

        for child in object.children().iter().flatten() {
            if cross_reference {
                if let ObjectData::Link(Some(target)) = self.database.node(*child).data {
                    if !self.seen.contains(&target) {
                        targets.push(target);
                    }
                    continue;
                }
            }
            self.collect_links(*child, targets);
        }
    }
}
