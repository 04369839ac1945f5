//! Document model for FDML specifications.
//!
//! A specification is parsed into a [`Document`]: systems, entities,
//! actions, features, flows, constraints, and traceability links. Elements
//! reference one another by string id only. [`Migration`]s describe
//! reversible change-sets over a document as lists of [`Operation`]s.

pub mod error;
pub mod hash;
pub mod migration;
pub mod model;
pub mod types;

pub use error::{CoreError, DataTypeError};
pub use hash::ContentHash;
pub use migration::{
    ActionPatch, ConstraintPatch, EntityPatch, FeaturePatch, FieldAlteration, Migration,
    Operation, OPERATION_NAMES,
};
pub use model::{
    Action, ActionException, Constraint, Document, ElementKind, Entity, EntityRelationship,
    Feature, Field, Flow, FlowStep, Index, Metadata, Parameter, Relation, Relationship, Scenario,
    Step, StepKeyword, System, TraceabilityLink,
};
pub use types::{DataType, FieldConstraint, Value, CONSTRAINT_KEYWORDS, TYPE_NAMES};
