//! Rule categories. Each rule reads the document and returns findings;
//! rules share nothing but the id index.

mod applicability;
mod cycles;
mod identity;
mod references;
mod types;

use fdml_core::Document;

use crate::index::ElementIndex;
use crate::report::{Finding, RuleCode};

pub(crate) fn run(rule: RuleCode, doc: &Document, index: &ElementIndex) -> Vec<Finding> {
    match rule {
        RuleCode::UniqueId => identity::check(doc),
        RuleCode::ReferenceIntegrity => references::check(doc, index),
        RuleCode::TypeConsistency => types::check(doc),
        RuleCode::CircularDependency => cycles::check(doc),
        RuleCode::ConstraintApplicability => applicability::check(doc, index),
    }
}
