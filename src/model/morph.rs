//! Morph-one children.
//!
//! An owner type may carry one polymorphic child stored in another table and
//! keyed by `<morph_by>_id` (the owner's key) and `<morph_by>_type` (the
//! owner's type name). The owner validates the child's data together with its
//! own, routes filled input into it, saves it after itself and deletes it
//! before itself. See [`Entity::save`](super::Entity::save).
//!
//! ```rust,ignore
//! let profile = Arc::new(ModelType::builder("Profile").table("profiles")
//!     .rule("bio", "required|max:200")
//!     .rule("profileable_id", "required")
//!     .build());
//! let user = ModelType::builder("User")
//!     .morph_one("profile", profile, "profileable")
//!     .build();
//! ```

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::definition::ModelType;
use super::entity::Entity;
use super::relationships::Relation;
use crate::validation::RuleSet;

#[derive(Clone)]
pub struct MorphDescriptor {
    name: String,
    model: Arc<ModelType>,
    morph_by: String,
}

impl fmt::Debug for MorphDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MorphDescriptor")
            .field("name", &self.name)
            .field("model", &self.model.name())
            .field("morph_by", &self.morph_by)
            .finish()
    }
}

impl MorphDescriptor {
    pub fn new(name: impl Into<String>, model: Arc<ModelType>, morph_by: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model,
            morph_by: morph_by.into(),
        }
    }

    /// Relationship name the child is exposed under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn model(&self) -> &Arc<ModelType> {
        &self.model
    }

    #[must_use]
    pub fn morph_by(&self) -> &str {
        &self.morph_by
    }

    #[must_use]
    pub fn id_column(&self) -> String {
        format!("{}_id", self.morph_by)
    }

    #[must_use]
    pub fn type_column(&self) -> String {
        format!("{}_type", self.morph_by)
    }

    /// The child's rules minus the two columns the owner sets itself.
    #[must_use]
    pub fn rules(&self) -> RuleSet {
        let id_column = self.id_column();
        let type_column = self.type_column();
        self.model
            .rules()
            .without(&[id_column.as_str(), type_column.as_str()])
    }

    /// The child row of `owner`; empty while the owner has no key.
    #[must_use]
    pub fn relation(&self, owner: &Entity) -> Relation {
        let owner_type = Value::String(owner.model().name().to_string());
        let type_column = self.type_column();
        Relation::has_one(self.model.table(), &self.id_column(), owner.key().cloned())
            .constrain(|query| query.where_eq(type_column, owner_type))
    }
}
