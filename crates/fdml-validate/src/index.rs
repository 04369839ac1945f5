//! Id lookup tables built fresh for each validator run.

use std::collections::{HashMap, HashSet};

use fdml_core::{Action, Document, ElementKind, Entity};

pub(crate) struct ElementIndex<'d> {
    entities: HashMap<&'d str, &'d Entity>,
    actions: HashMap<&'d str, &'d Action>,
    features: HashSet<&'d str>,
    /// Every declared id with the kinds that declare it, in model order.
    kinds: HashMap<&'d str, Vec<ElementKind>>,
}

impl<'d> ElementIndex<'d> {
    pub(crate) fn build(doc: &'d Document) -> Self {
        let mut kinds: HashMap<&'d str, Vec<ElementKind>> = HashMap::new();
        let mut note = |id: &'d str, kind: ElementKind| {
            let list = kinds.entry(id).or_default();
            if !list.contains(&kind) {
                list.push(kind);
            }
        };
        doc.systems.iter().for_each(|s| note(&s.id, ElementKind::System));
        doc.entities.iter().for_each(|e| note(&e.id, ElementKind::Entity));
        doc.actions.iter().for_each(|a| note(&a.id, ElementKind::Action));
        doc.features.iter().for_each(|f| note(&f.id, ElementKind::Feature));
        doc.flows.iter().for_each(|f| note(&f.id, ElementKind::Flow));
        doc.constraints
            .iter()
            .for_each(|c| note(&c.id, ElementKind::Constraint));

        // First declaration wins for duplicated ids; the identity rule
        // reports the duplicate.
        let mut entities = HashMap::new();
        for e in &doc.entities {
            entities.entry(e.id.as_str()).or_insert(e);
        }
        let mut actions = HashMap::new();
        for a in &doc.actions {
            actions.entry(a.id.as_str()).or_insert(a);
        }
        ElementIndex {
            entities,
            actions,
            features: doc.features.iter().map(|f| f.id.as_str()).collect(),
            kinds,
        }
    }

    pub(crate) fn entity(&self, id: &str) -> Option<&'d Entity> {
        self.entities.get(id).copied()
    }

    pub(crate) fn action(&self, id: &str) -> Option<&'d Action> {
        self.actions.get(id).copied()
    }

    pub(crate) fn has_action(&self, id: &str) -> bool {
        self.actions.contains_key(id)
    }

    pub(crate) fn has_feature(&self, id: &str) -> bool {
        self.features.contains(id)
    }

    /// The first kind of element an id names, if any.
    pub(crate) fn kind_of(&self, id: &str) -> Option<ElementKind> {
        self.kinds.get(id).and_then(|k| k.first()).copied()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.kinds.contains_key(id)
    }
}
